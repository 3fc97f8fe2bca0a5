//! Workflow commands understood by the GitHub Actions runner.

fn running_in_actions() -> bool {
    std::env::var("GITHUB_ACTIONS").map_or(false, |v| v == "true")
}

fn escape_data(message: &str) -> String {
    message
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

/// Surfaces a warning annotation on the workflow run.
pub fn annotate_warning(message: &str) {
    if running_in_actions() {
        println!("::warning::{}", escape_data(message));
    }
}

/// Surfaces an error annotation on the workflow run.
pub fn annotate_error(message: &str) {
    if running_in_actions() {
        println!("::error::{}", escape_data(message));
    }
}
