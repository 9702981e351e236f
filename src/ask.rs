//! The "ask" use case: translate, execute, format.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::answer::{DOMAIN_SCOPE_MESSAGE, EXECUTION_FAILED_MESSAGE, NO_RESULTS_MESSAGE, format_rows};
use crate::executor::{ExecutionError, QueryExecutor, Row};
use crate::schema::SchemaDescriptor;
use crate::translate::{TranslationError, Translator};

#[derive(Debug, Clone, Deserialize)]
pub struct AskRequest {
    pub question: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AskResponse {
    pub answer: String,
}

/// Terminal state of one ask request.
#[derive(Debug)]
pub enum AskOutcome {
    TranslationFailed(TranslationError),
    ExecutionFailed(ExecutionError),
    NoRows,
    Rows(Vec<Row>),
}

impl AskOutcome {
    pub fn name(&self) -> &'static str {
        match self {
            AskOutcome::TranslationFailed(_) => "translation_failed",
            AskOutcome::ExecutionFailed(_) => "execution_failed",
            AskOutcome::NoRows => "no_rows",
            AskOutcome::Rows(_) => "rows",
        }
    }

    pub fn message(&self) -> String {
        match self {
            AskOutcome::TranslationFailed(_) => DOMAIN_SCOPE_MESSAGE.to_string(),
            AskOutcome::ExecutionFailed(_) => EXECUTION_FAILED_MESSAGE.to_string(),
            AskOutcome::NoRows => NO_RESULTS_MESSAGE.to_string(),
            AskOutcome::Rows(rows) => format_rows(rows),
        }
    }
}

pub struct AskService {
    translator: Translator,
    executor: Arc<dyn QueryExecutor>,
    schema: &'static SchemaDescriptor,
}

impl AskService {
    pub fn new(
        translator: Translator,
        executor: Arc<dyn QueryExecutor>,
        schema: &'static SchemaDescriptor,
    ) -> Self {
        Self {
            translator,
            executor,
            schema,
        }
    }

    pub async fn ask(&self, question: &str) -> AskResponse {
        let outcome = self.resolve(question).await;
        match &outcome {
            AskOutcome::TranslationFailed(e) => {
                tracing::warn!("ask: {} ({}): {e}", outcome.name(), e.code())
            }
            AskOutcome::ExecutionFailed(e) => tracing::warn!("ask: {}: {e}", outcome.name()),
            AskOutcome::NoRows => tracing::info!("ask: {}", outcome.name()),
            AskOutcome::Rows(rows) => tracing::info!("ask: {} count={}", outcome.name(), rows.len()),
        }
        AskResponse {
            answer: outcome.message(),
        }
    }

    pub async fn resolve(&self, question: &str) -> AskOutcome {
        let query = match self.translator.translate(question, self.schema).await {
            Ok(q) => q,
            Err(e) => return AskOutcome::TranslationFailed(e),
        };

        match self.executor.execute(query.as_str(), &[]).await {
            Err(e) => AskOutcome::ExecutionFailed(e),
            Ok(rows) if rows.is_empty() => AskOutcome::NoRows,
            Ok(rows) => AskOutcome::Rows(rows),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::completion::{CompletionError, CompletionRequest, CompletionService};
    use crate::executor::Scalar;
    use crate::schema::PROVIDER_SCHEMA;

    struct FixedCompletion(Option<&'static str>);

    #[async_trait]
    impl CompletionService for FixedCompletion {
        async fn complete(&self, _: &CompletionRequest) -> Result<String, CompletionError> {
            self.0
                .map(str::to_string)
                .ok_or(CompletionError::EmptyChoice)
        }
    }

    struct ScriptedExecutor {
        result: Result<Vec<Row>, String>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedExecutor {
        fn new(result: Result<Vec<Row>, String>) -> Arc<Self> {
            Arc::new(Self {
                result,
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl QueryExecutor for ScriptedExecutor {
        async fn execute(
            &self,
            sql: &str,
            _: &[(&str, Scalar)],
        ) -> Result<Vec<Row>, ExecutionError> {
            self.calls.lock().unwrap().push(sql.to_string());
            self.result.clone().map_err(ExecutionError::Database)
        }
    }

    fn service(reply: Option<&'static str>, exec: Arc<ScriptedExecutor>) -> AskService {
        AskService::new(
            Translator::new(Arc::new(FixedCompletion(reply))),
            exec,
            &PROVIDER_SCHEMA,
        )
    }

    fn count_row(n: i64) -> Row {
        [("count", Scalar::Int(n))].into_iter().collect()
    }

    #[tokio::test]
    async fn count_question_end_to_end() {
        let exec = ScriptedExecutor::new(Ok(vec![count_row(5)]));
        let svc = service(Some("SELECT COUNT(*) FROM provider"), exec.clone());

        let resp = svc.ask("How many providers are there?").await;
        assert_eq!(resp.answer, "1. {count: 5}\n");
        assert_eq!(
            *exec.calls.lock().unwrap(),
            vec!["SELECT COUNT(*) FROM provider".to_string()]
        );
    }

    #[tokio::test]
    async fn rejected_translation_never_reaches_executor() {
        let exec = ScriptedExecutor::new(Ok(vec![count_row(1)]));
        let svc = service(Some("Sorry, I cannot help with that."), exec.clone());

        let resp = svc.ask("Tell me a joke").await;
        assert_eq!(resp.answer, DOMAIN_SCOPE_MESSAGE);
        assert!(exec.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn service_failure_collapses_to_domain_scope() {
        let exec = ScriptedExecutor::new(Ok(vec![]));
        let svc = service(None, exec.clone());

        let outcome = svc.resolve("cheapest knee replacement").await;
        assert!(matches!(
            outcome,
            AskOutcome::TranslationFailed(TranslationError::ServiceFailure(_))
        ));
        assert_eq!(outcome.message(), DOMAIN_SCOPE_MESSAGE);
        assert!(exec.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn execution_failure_message() {
        let exec = ScriptedExecutor::new(Err("Catalog Error: Table foo does not exist".into()));
        let svc = service(Some("SELECT * FROM foo"), exec);

        let resp = svc.ask("show me foo").await;
        assert_eq!(resp.answer, EXECUTION_FAILED_MESSAGE);
        assert!(!resp.answer.contains("Catalog"));
    }

    #[tokio::test]
    async fn zero_rows_message() {
        let exec = ScriptedExecutor::new(Ok(vec![]));
        let svc = service(Some("SELECT * FROM provider WHERE provider_state = 'ZZ'"), exec);

        let outcome = svc.resolve("hospitals in ZZ").await;
        assert!(matches!(outcome, AskOutcome::NoRows));
        assert_eq!(outcome.message(), NO_RESULTS_MESSAGE);
    }

    #[tokio::test]
    async fn each_branch_maps_to_exactly_one_message() {
        let cases: Vec<(Option<&'static str>, Result<Vec<Row>, String>, &str)> = vec![
            (Some("hello"), Ok(vec![count_row(1)]), "translation_failed"),
            (Some("SELECT 1"), Err("boom".into()), "execution_failed"),
            (Some("SELECT 1"), Ok(vec![]), "no_rows"),
            (Some("SELECT 1"), Ok((0..12).map(count_row).collect()), "rows"),
        ];

        let fixed = [DOMAIN_SCOPE_MESSAGE, EXECUTION_FAILED_MESSAGE, NO_RESULTS_MESSAGE];
        for (reply, result, expected) in cases {
            let svc = service(reply, ScriptedExecutor::new(result));
            let outcome = svc.resolve("q").await;
            assert_eq!(outcome.name(), expected);

            let msg = outcome.message();
            let hits = fixed.iter().filter(|m| **m == msg).count();
            if expected == "rows" {
                assert_eq!(hits, 0);
                assert!(msg.ends_with("... and 2 more results."));
                assert_eq!(msg.lines().count(), 11);
            } else {
                assert_eq!(hits, 1);
            }
        }
    }
}
