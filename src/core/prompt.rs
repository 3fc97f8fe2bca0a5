use crate::core::change_set::ReviewableFile;
use serde::{Deserialize, Serialize};

pub const FEEDBACK_QUESTION: &str = "What is your feedback?";
const NO_PATCH_MARKER: &str = "(No patch data available)";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    pub system_prompt: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            system_prompt: r#"You are conducting a code review of changes in a pull request. Please analyze the following files and provide feedback on:

1. Code quality and best practices
2. Potential bugs or issues
3. Security concerns
4. Performance considerations
5. Suggestions for improvements

For each file, focus on the changed portions (indicated in the "patch")."#
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// The assembled review request: a persona plus the files, in listing order.
///
/// Rendering is pure, so the same files and persona always produce the same
/// bytes in either shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewPrompt {
    pub persona: String,
    pub files: Vec<ReviewableFile>,
}

impl ReviewPrompt {
    pub fn file_sections(&self) -> Vec<String> {
        self.files.iter().map(format_file_section).collect()
    }

    /// Single text block for completion-style backends.
    pub fn to_flat_prompt(&self) -> String {
        let mut output = String::new();
        output.push_str(&self.persona);
        output.push_str("\n\nHere are the files to review:\n");
        output.push_str(&self.file_sections().join("\n"));
        output
    }

    /// One user turn per file followed by the closing question.
    pub fn user_turns(&self) -> Vec<ChatTurn> {
        let mut turns: Vec<ChatTurn> = self
            .file_sections()
            .into_iter()
            .map(|section| ChatTurn::new(Role::User, section))
            .collect();
        turns.push(ChatTurn::new(Role::User, FEEDBACK_QUESTION));
        turns
    }

    /// The persona as a system turn, then [`Self::user_turns`].
    pub fn chat_messages(&self) -> Vec<ChatTurn> {
        let mut messages = vec![ChatTurn::new(Role::System, self.persona.clone())];
        messages.extend(self.user_turns());
        messages
    }
}

pub struct PromptBuilder {
    config: PromptConfig,
}

impl PromptBuilder {
    pub fn new(config: PromptConfig) -> Self {
        Self { config }
    }

    pub fn build(&self, files: Vec<ReviewableFile>) -> ReviewPrompt {
        ReviewPrompt {
            persona: self.config.system_prompt.clone(),
            files,
        }
    }
}

fn format_file_section(file: &ReviewableFile) -> String {
    let patch = file
        .file
        .patch
        .as_deref()
        .filter(|p| !p.is_empty())
        .unwrap_or(NO_PATCH_MARKER);

    format!(
        "---\nFilename: {}\nStatus: {}\n\nPatch:\n{}\n\nFull Content:\n```\n{}\n```\n",
        file.file.path, file.file.status, patch, file.content
    )
}
