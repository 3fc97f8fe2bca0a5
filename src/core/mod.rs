pub mod actions;
pub mod change_set;
pub mod event;
pub mod filter;
pub mod github;
pub mod pipeline;
pub mod prompt;
pub mod resolver;

pub use github::GitHubClient;
