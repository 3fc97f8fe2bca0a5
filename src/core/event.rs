use crate::error::{ReviewError, ReviewResult};
use serde::Deserialize;
use std::path::PathBuf;

pub const PULL_REQUEST_EVENT: &str = "pull_request";

/// Identity of the pull request a run reviews, built once at start-up and
/// passed to every stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    pub owner: String,
    pub repo: String,
    pub pull_number: u64,
    pub head_sha: String,
}

/// Raw trigger information, usually taken from the Actions runner environment.
#[derive(Debug, Clone, Default)]
pub struct TriggerInput {
    pub event_name: Option<String>,
    pub event_path: Option<PathBuf>,
    pub repository: Option<String>,
    pub pull_number: Option<u64>,
    pub head_sha: Option<String>,
}

#[derive(Deserialize)]
struct EventPayload {
    #[serde(default)]
    pull_request: Option<PullRequestPayload>,
    #[serde(default)]
    repository: Option<RepositoryPayload>,
}

#[derive(Deserialize)]
struct PullRequestPayload {
    number: u64,
    head: HeadPayload,
}

#[derive(Deserialize)]
struct HeadPayload {
    sha: String,
}

#[derive(Deserialize)]
struct RepositoryPayload {
    name: String,
    owner: OwnerPayload,
}

#[derive(Deserialize)]
struct OwnerPayload {
    login: String,
}

impl TriggerInput {
    /// Resolves the run context, or `None` when the event is not a pull request.
    ///
    /// An explicit `pull_number` bypasses the event payload entirely and then
    /// requires `repository` and `head_sha`.
    pub fn into_context(self) -> ReviewResult<Option<RunContext>> {
        if let Some(pull_number) = self.pull_number {
            let repository = self.repository.ok_or_else(|| {
                ReviewError::Trigger("--repo is required together with --pr".into())
            })?;
            let head_sha = self.head_sha.ok_or_else(|| {
                ReviewError::Trigger("--head-sha is required together with --pr".into())
            })?;
            let (owner, repo) = parse_repository(&repository)?;
            return Ok(Some(RunContext {
                owner,
                repo,
                pull_number,
                head_sha,
            }));
        }

        match self.event_name.as_deref() {
            Some(PULL_REQUEST_EVENT) => {}
            _ => return Ok(None),
        }

        let path = self
            .event_path
            .ok_or_else(|| ReviewError::Trigger("GITHUB_EVENT_PATH is not set".into()))?;
        let raw = std::fs::read_to_string(&path).map_err(|e| {
            ReviewError::Trigger(format!("cannot read event payload {}: {e}", path.display()))
        })?;

        context_from_payload(&raw, self.repository.as_deref()).map(Some)
    }
}

fn context_from_payload(raw: &str, repository: Option<&str>) -> ReviewResult<RunContext> {
    let payload: EventPayload = serde_json::from_str(raw)
        .map_err(|e| ReviewError::Trigger(format!("malformed event payload: {e}")))?;
    let pull_request = payload
        .pull_request
        .ok_or_else(|| ReviewError::Trigger("event payload has no pull_request".into()))?;

    let (owner, repo) = match (repository, payload.repository) {
        (Some(full_name), _) => parse_repository(full_name)?,
        (None, Some(repository)) => (repository.owner.login, repository.name),
        (None, None) => {
            return Err(ReviewError::Trigger(
                "repository is unknown: set GITHUB_REPOSITORY".into(),
            ))
        }
    };

    Ok(RunContext {
        owner,
        repo,
        pull_number: pull_request.number,
        head_sha: pull_request.head.sha,
    })
}

/// Splits `owner/repo`.
pub fn parse_repository(full_name: &str) -> ReviewResult<(String, String)> {
    match full_name.split_once('/') {
        Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') => {
            Ok((owner.to_string(), repo.to_string()))
        }
        _ => Err(ReviewError::Trigger(format!(
            "invalid repository '{full_name}', expected owner/repo"
        ))),
    }
}
