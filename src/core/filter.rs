use crate::core::change_set::{ChangedFile, FileStatus};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

pub const DEFAULT_MAX_FILES: usize = 20;

static BINARY_EXTENSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\.(png|jpg|jpeg|gif|svg|ico|woff|woff2|ttf|eot|mp3|mp4|mov|zip|tar|gz)$")
        .unwrap()
});

/// Why a run skipped the model and posted a fixed message instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShortCircuit {
    NoRelevantFiles,
    TooManyFiles { count: usize, limit: usize },
}

impl ShortCircuit {
    pub fn message(&self) -> String {
        match self {
            ShortCircuit::NoRelevantFiles => "No relevant files to review.".to_string(),
            ShortCircuit::TooManyFiles { count, limit } => format!(
                "There are too many changed files to meaningfully review them ({} > {})",
                count, limit
            ),
        }
    }
}

impl fmt::Display for ShortCircuit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOutcome {
    Proceed(Vec<ChangedFile>),
    ShortCircuit(ShortCircuit),
}

pub struct FileFilter {
    max_files: usize,
}

impl FileFilter {
    pub fn new(max_files: usize) -> Self {
        Self { max_files }
    }

    pub fn is_reviewable(file: &ChangedFile) -> bool {
        file.status != FileStatus::Removed && !BINARY_EXTENSION.is_match(&file.path)
    }

    pub fn apply(&self, files: Vec<ChangedFile>) -> FilterOutcome {
        let relevant: Vec<ChangedFile> = files.into_iter().filter(Self::is_reviewable).collect();

        if relevant.is_empty() {
            FilterOutcome::ShortCircuit(ShortCircuit::NoRelevantFiles)
        } else if relevant.len() > self.max_files {
            FilterOutcome::ShortCircuit(ShortCircuit::TooManyFiles {
                count: relevant.len(),
                limit: self.max_files,
            })
        } else {
            FilterOutcome::Proceed(relevant)
        }
    }
}

impl Default for FileFilter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FILES)
    }
}
