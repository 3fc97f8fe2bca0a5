use crate::adapters::llm::{LLMAdapter, LLMRequest, LLMResponse};
use crate::core::actions::annotate_warning;
use crate::core::event::RunContext;
use crate::core::filter::{FileFilter, FilterOutcome, ShortCircuit, DEFAULT_MAX_FILES};
use crate::core::github::GitHubClient;
use crate::core::prompt::{PromptBuilder, PromptConfig};
use crate::core::resolver::ContentResolver;
use crate::error::{ReviewError, ReviewResult};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct ReviewSettings {
    pub max_files: usize,
    pub attribution: bool,
    /// Fail the run when more files than this could not be fetched.
    pub max_dropped_files: Option<usize>,
    pub prompt: PromptConfig,
}

impl Default for ReviewSettings {
    fn default() -> Self {
        Self {
            max_files: DEFAULT_MAX_FILES,
            attribution: false,
            max_dropped_files: None,
            prompt: PromptConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Reviewed { files: usize, dropped: usize },
    ShortCircuited(ShortCircuit),
}

/// fetch -> filter -> resolve -> assemble -> invoke -> publish, once per run.
pub struct ReviewPipeline<'a> {
    github: &'a GitHubClient,
    adapter: &'a dyn LLMAdapter,
    settings: ReviewSettings,
}

impl<'a> ReviewPipeline<'a> {
    pub fn new(github: &'a GitHubClient, adapter: &'a dyn LLMAdapter, settings: ReviewSettings) -> Self {
        Self {
            github,
            adapter,
            settings,
        }
    }

    pub async fn run(&self, context: &RunContext) -> ReviewResult<RunOutcome> {
        info!(
            "Reviewing PR #{} in {}/{} at {}",
            context.pull_number, context.owner, context.repo, context.head_sha
        );

        let files = self
            .github
            .list_pr_files(&context.owner, &context.repo, context.pull_number)
            .await?;
        info!("PR lists {} changed files", files.len());

        let selected = match FileFilter::new(self.settings.max_files).apply(files) {
            FilterOutcome::Proceed(selected) => selected,
            FilterOutcome::ShortCircuit(reason) => return self.short_circuit(context, reason).await,
        };

        let paths: Vec<&str> = selected.iter().map(|f| f.path.as_str()).collect();
        info!("Reviewing the following files: {}", paths.join(", "));

        let resolution = ContentResolver::new(self.github)
            .resolve(context, selected)
            .await;
        for warning in &resolution.warnings {
            annotate_warning(warning);
        }
        let dropped = resolution.dropped.len();
        if let Some(limit) = self.settings.max_dropped_files {
            if dropped > limit {
                return Err(ReviewError::DropLimit {
                    dropped,
                    limit,
                    paths: resolution.dropped.join(", "),
                });
            }
        }
        if resolution.files.is_empty() {
            return self
                .short_circuit(context, ShortCircuit::NoRelevantFiles)
                .await;
        }

        let prompt = PromptBuilder::new(self.settings.prompt.clone()).build(resolution.files);
        let reviewed = prompt.files.len();

        info!("Code review request sent to model {}", self.adapter.model_name());
        let response = self.adapter.complete(LLMRequest { prompt }).await?;
        if let Some(usage) = &response.usage {
            debug!(
                "Model {} used {} prompt tokens, {} completion tokens",
                response.model, usage.prompt_tokens, usage.completion_tokens
            );
        }
        info!("Code review response: {}", response.content);

        let body = self.comment_body(&response);
        self.github
            .create_comment(&context.owner, &context.repo, context.pull_number, &body)
            .await?;
        info!("Code review completed and posted as a comment.");

        Ok(RunOutcome::Reviewed {
            files: reviewed,
            dropped,
        })
    }

    async fn short_circuit(
        &self,
        context: &RunContext,
        reason: ShortCircuit,
    ) -> ReviewResult<RunOutcome> {
        let message = reason.message();
        info!("{}", message);
        self.github
            .create_comment(&context.owner, &context.repo, context.pull_number, &message)
            .await?;
        Ok(RunOutcome::ShortCircuited(reason))
    }

    fn comment_body(&self, response: &LLMResponse) -> String {
        if !self.settings.attribution {
            return response.content.clone();
        }
        format!(
            "{}\n\n---\n_Automated review generated by `{}`._",
            response.content, response.model
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::llm::{BackendKind, ModelConfig};
    use crate::adapters::OllamaAdapter;
    use base64::Engine;
    use mockito::{Matcher, Mock, ServerGuard};
    use serde_json::json;

    const FILES_PATH: &str = "/repos/octo/demo/pulls/7/files";
    const COMMENTS_PATH: &str = "/repos/octo/demo/issues/7/comments";
    const GENERATE_PATH: &str = "/api/generate";

    fn context() -> RunContext {
        RunContext {
            owner: "octo".into(),
            repo: "demo".into(),
            pull_number: 7,
            head_sha: "headsha".into(),
        }
    }

    fn adapter(server: &ServerGuard) -> OllamaAdapter {
        OllamaAdapter::new(ModelConfig {
            backend: BackendKind::Ollama,
            model_name: "codellama".into(),
            url: Some(format!("{}{}", server.url(), GENERATE_PATH)),
            api_key: None,
            api_version: None,
            context_window: 16384,
            max_tokens: 4096,
        })
        .unwrap()
    }

    async fn mock_listing(server: &mut ServerGuard, files: serde_json::Value) -> Mock {
        server
            .mock("GET", FILES_PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(files.to_string())
            .create_async()
            .await
    }

    async fn mock_content(server: &mut ServerGuard, path: &str, body: Option<&str>) -> Mock {
        let mock = server
            .mock("GET", format!("/repos/octo/demo/contents/{path}").as_str())
            .match_query(Matcher::UrlEncoded("ref".into(), "headsha".into()));
        match body {
            Some(text) => mock
                .with_status(200)
                .with_body(
                    json!({
                        "type": "file",
                        "encoding": "base64",
                        "content": base64::engine::general_purpose::STANDARD.encode(text),
                    })
                    .to_string(),
                )
                .create_async()
                .await,
            None => mock
                .with_status(404)
                .with_body(r#"{"message": "Not Found"}"#)
                .create_async()
                .await,
        }
    }

    async fn mock_backend(server: &mut ServerGuard, review: &str, expected: usize) -> Mock {
        server
            .mock("POST", GENERATE_PATH)
            .with_status(200)
            .with_body(json!({"model": "codellama", "response": review, "done": true}).to_string())
            .expect(expected)
            .create_async()
            .await
    }

    async fn mock_comment(server: &mut ServerGuard, body: &str, expected: usize) -> Mock {
        server
            .mock("POST", COMMENTS_PATH)
            .match_body(Matcher::Json(json!({ "body": body })))
            .with_status(201)
            .with_body(r#"{"id": 1}"#)
            .expect(expected)
            .create_async()
            .await
    }

    async fn run(server: &ServerGuard, settings: ReviewSettings) -> ReviewResult<RunOutcome> {
        let github = GitHubClient::new("token", &server.url()).unwrap();
        let adapter = adapter(server);
        ReviewPipeline::new(&github, &adapter, settings)
            .run(&context())
            .await
    }

    #[tokio::test]
    async fn reviews_two_text_files_and_posts_one_comment() {
        let mut server = mockito::Server::new_async().await;
        let _listing = mock_listing(
            &mut server,
            json!([
                {"filename": "src/a.rs", "status": "modified", "patch": "@@ -1 +1 @@\n-x\n+y"},
                {"filename": "src/b.rs", "status": "added"}
            ]),
        )
        .await;
        let _content = mock_content(&mut server, "src/a.rs", Some("fn a() {}")).await;
        let _content = mock_content(&mut server, "src/b.rs", Some("fn b() {}")).await;
        let review = "src/a.rs: fine.\nsrc/b.rs: add tests.";
        let backend = server
            .mock("POST", GENERATE_PATH)
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex("Filename: src/a.rs".into()),
                Matcher::Regex("Filename: src/b.rs".into()),
                Matcher::Regex(r"\(No patch data available\)".into()),
            ]))
            .with_status(200)
            .with_body(json!({"response": review}).to_string())
            .expect(1)
            .create_async()
            .await;
        let comment = mock_comment(&mut server, review, 1).await;

        let outcome = run(&server, ReviewSettings::default()).await.unwrap();

        backend.assert_async().await;
        comment.assert_async().await;
        assert_eq!(outcome, RunOutcome::Reviewed { files: 2, dropped: 0 });
    }

    #[tokio::test]
    async fn image_only_pr_posts_no_relevant_files() {
        let mut server = mockito::Server::new_async().await;
        let _listing = mock_listing(&mut server, json!([{"filename": "docs/shot.png", "status": "added"}])).await;
        let backend = mock_backend(&mut server, "unused", 0).await;
        let comment = mock_comment(&mut server, "No relevant files to review.", 1).await;

        let outcome = run(&server, ReviewSettings::default()).await.unwrap();

        backend.assert_async().await;
        comment.assert_async().await;
        assert_eq!(outcome, RunOutcome::ShortCircuited(ShortCircuit::NoRelevantFiles));
    }

    #[tokio::test]
    async fn too_many_files_skip_content_and_model() {
        let mut server = mockito::Server::new_async().await;
        let files: Vec<_> = (0..21)
            .map(|i| json!({"filename": format!("src/f{i}.rs"), "status": "modified"}))
            .collect();
        let _listing = mock_listing(&mut server, json!(files)).await;
        let contents = server
            .mock("GET", Matcher::Regex(r"^/repos/octo/demo/contents/".into()))
            .expect(0)
            .create_async()
            .await;
        let backend = mock_backend(&mut server, "unused", 0).await;
        let comment = mock_comment(
            &mut server,
            "There are too many changed files to meaningfully review them (21 > 20)",
            1,
        )
        .await;

        let outcome = run(&server, ReviewSettings::default()).await.unwrap();

        contents.assert_async().await;
        backend.assert_async().await;
        comment.assert_async().await;
        assert_eq!(
            outcome,
            RunOutcome::ShortCircuited(ShortCircuit::TooManyFiles { count: 21, limit: 20 })
        );
    }

    #[tokio::test]
    async fn twenty_files_reach_the_model() {
        let mut server = mockito::Server::new_async().await;
        let files: Vec<_> = (0..20)
            .map(|i| json!({"filename": format!("src/f{i}.rs"), "status": "modified"}))
            .collect();
        let _listing = mock_listing(&mut server, json!(files)).await;
        let contents = server
            .mock("GET", Matcher::Regex(r"^/repos/octo/demo/contents/src/f\d+\.rs$".into()))
            .match_query(Matcher::UrlEncoded("ref".into(), "headsha".into()))
            .with_status(200)
            .with_body(
                json!({
                    "type": "file",
                    "encoding": "base64",
                    "content": base64::engine::general_purpose::STANDARD.encode("fn f() {}"),
                })
                .to_string(),
            )
            .expect(20)
            .create_async()
            .await;
        let backend = server
            .mock("POST", GENERATE_PATH)
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex("Filename: src/f0.rs".into()),
                Matcher::Regex("Filename: src/f19.rs".into()),
            ]))
            .with_status(200)
            .with_body(json!({"response": "All twenty look fine."}).to_string())
            .expect(1)
            .create_async()
            .await;
        let comment = mock_comment(&mut server, "All twenty look fine.", 1).await;

        let outcome = run(&server, ReviewSettings::default()).await.unwrap();

        contents.assert_async().await;
        backend.assert_async().await;
        comment.assert_async().await;
        assert_eq!(outcome, RunOutcome::Reviewed { files: 20, dropped: 0 });
    }

    #[tokio::test]
    async fn empty_model_reply_publishes_nothing() {
        let mut server = mockito::Server::new_async().await;
        let _listing = mock_listing(&mut server, json!([{"filename": "src/a.rs", "status": "modified"}])).await;
        let _content = mock_content(&mut server, "src/a.rs", Some("fn a() {}")).await;
        let _backend = mock_backend(&mut server, "", 1).await;
        let comment = server
            .mock("POST", COMMENTS_PATH)
            .expect(0)
            .create_async()
            .await;

        let err = run(&server, ReviewSettings::default()).await.unwrap_err();

        comment.assert_async().await;
        assert!(matches!(err, ReviewError::Backend(_)));
    }

    #[tokio::test]
    async fn backend_failure_publishes_nothing() {
        let mut server = mockito::Server::new_async().await;
        let _listing = mock_listing(&mut server, json!([{"filename": "src/a.rs", "status": "modified"}])).await;
        let _content = mock_content(&mut server, "src/a.rs", Some("fn a() {}")).await;
        let _mock = server
            .mock("POST", GENERATE_PATH)
            .with_status(500)
            .with_body("Internal Server Error")
            .create_async()
            .await;
        let comment = server
            .mock("POST", COMMENTS_PATH)
            .expect(0)
            .create_async()
            .await;

        let err = run(&server, ReviewSettings::default()).await.unwrap_err();

        comment.assert_async().await;
        assert!(matches!(err, ReviewError::Backend(_)));
    }

    #[tokio::test]
    async fn missing_file_is_dropped_and_review_continues() {
        let mut server = mockito::Server::new_async().await;
        let _listing = mock_listing(
            &mut server,
            json!([
                {"filename": "a.rs", "status": "modified"},
                {"filename": "b.rs", "status": "modified"},
                {"filename": "c.rs", "status": "modified"}
            ]),
        )
        .await;
        let _content = mock_content(&mut server, "a.rs", Some("a")).await;
        let _content = mock_content(&mut server, "b.rs", None).await;
        let _content = mock_content(&mut server, "c.rs", Some("c")).await;
        let backend = server
            .mock("POST", GENERATE_PATH)
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex("Filename: a.rs".into()),
                Matcher::Regex("Filename: c.rs".into()),
            ]))
            .with_status(200)
            .with_body(json!({"response": "Two files reviewed."}).to_string())
            .expect(1)
            .create_async()
            .await;
        let comment = mock_comment(&mut server, "Two files reviewed.", 1).await;

        let outcome = run(&server, ReviewSettings::default()).await.unwrap();

        backend.assert_async().await;
        comment.assert_async().await;
        assert_eq!(outcome, RunOutcome::Reviewed { files: 2, dropped: 1 });
    }

    #[tokio::test]
    async fn drop_limit_fails_the_run() {
        let mut server = mockito::Server::new_async().await;
        let _listing = mock_listing(
            &mut server,
            json!([
                {"filename": "a.rs", "status": "modified"},
                {"filename": "b.rs", "status": "modified"}
            ]),
        )
        .await;
        let _content = mock_content(&mut server, "a.rs", Some("a")).await;
        let _content = mock_content(&mut server, "b.rs", None).await;
        let backend = mock_backend(&mut server, "unused", 0).await;
        let comment = server
            .mock("POST", COMMENTS_PATH)
            .expect(0)
            .create_async()
            .await;

        let settings = ReviewSettings {
            max_dropped_files: Some(0),
            ..ReviewSettings::default()
        };
        let err = run(&server, settings).await.unwrap_err();

        backend.assert_async().await;
        comment.assert_async().await;
        assert!(matches!(
            err,
            ReviewError::DropLimit { dropped: 1, limit: 0, ref paths } if paths == "b.rs"
        ));
    }

    #[tokio::test]
    async fn every_fetch_failing_posts_no_relevant_files() {
        let mut server = mockito::Server::new_async().await;
        let _listing = mock_listing(&mut server, json!([{"filename": "gone.rs", "status": "modified"}])).await;
        let _content = mock_content(&mut server, "gone.rs", None).await;
        let backend = mock_backend(&mut server, "unused", 0).await;
        let comment = mock_comment(&mut server, "No relevant files to review.", 1).await;

        let outcome = run(&server, ReviewSettings::default()).await.unwrap();

        backend.assert_async().await;
        comment.assert_async().await;
        assert_eq!(outcome, RunOutcome::ShortCircuited(ShortCircuit::NoRelevantFiles));
    }

    #[tokio::test]
    async fn attribution_footer_names_the_model() {
        let mut server = mockito::Server::new_async().await;
        let _listing = mock_listing(&mut server, json!([{"filename": "a.rs", "status": "added"}])).await;
        let _content = mock_content(&mut server, "a.rs", Some("a")).await;
        let _backend = mock_backend(&mut server, "Nice.", 1).await;
        let comment = mock_comment(
            &mut server,
            "Nice.\n\n---\n_Automated review generated by `codellama`._",
            1,
        )
        .await;

        let settings = ReviewSettings {
            attribution: true,
            ..ReviewSettings::default()
        };
        run(&server, settings).await.unwrap();
        comment.assert_async().await;
    }

    #[tokio::test]
    async fn listing_failure_aborts_before_anything_else() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", FILES_PATH)
            .match_query(Matcher::Any)
            .with_status(401)
            .with_body(r#"{"message": "Bad credentials"}"#)
            .create_async()
            .await;
        let backend = mock_backend(&mut server, "unused", 0).await;
        let comment = server
            .mock("POST", COMMENTS_PATH)
            .expect(0)
            .create_async()
            .await;

        let err = run(&server, ReviewSettings::default()).await.unwrap_err();

        backend.assert_async().await;
        comment.assert_async().await;
        assert!(matches!(err, ReviewError::HostFetch(_)));
    }
}
