//! Natural language to SQL translation.
//!
//! The translator cannot parse or rewrite what the model returns, so business
//! rules travel as prompt text and the output check is only a shape gate: it
//! rejects empty or conversational replies, not malicious SQL.

use std::sync::Arc;

use crate::completion::{CompletionError, CompletionRequest, CompletionService, truncate_for_log};
use crate::schema::SchemaDescriptor;

pub const MAX_OUTPUT_TOKENS: u32 = 500;
pub const TEMPERATURE: f32 = 0.1;

pub const SYSTEM_ROLE: &str =
    "You are a SQL expert. Convert natural language to SQL queries against the given schema.";

/// Rules the model cannot infer from the schema alone.
pub const GUIDELINES: &[&str] = &[
    "Use ILIKE for ms_drg_definition matching (case-insensitive substring match)",
    "Assume that there is a database function calculate_zip_distance(zip1 TEXT, zip2 TEXT) that returns the distance in kilometers between two zip codes; use it for provider_zip_code proximity and never compute distances inline",
    "Provider overall rating is provider_rating.provider_overall_rating",
    "Only return the max overall rating for each provider_id",
    "Provider star rating is provider_rating.provider_star_rating",
    "Only return the max star rating for each provider_id",
    "Group by provider_id",
    "Ignore provider_pricing_year and provider_rating_year",
    "Limit to top 1 result unless the question asks for a list",
    "Only return the SQL query, no explanations",
];

pub const ALLOWED_VERBS: &[&str] = &["SELECT", "INSERT", "UPDATE", "DELETE"];

#[derive(Debug, thiserror::Error)]
pub enum TranslationError {
    #[error("completion service failed: {0}")]
    ServiceFailure(#[from] CompletionError),
    #[error("completion did not look like SQL: {reply:?}")]
    InvalidOutput { reply: String },
}

impl TranslationError {
    pub fn code(&self) -> &'static str {
        match self {
            TranslationError::ServiceFailure(_) => "service_failure",
            TranslationError::InvalidOutput { .. } => "invalid_output",
        }
    }
}

/// SQL text that passed the shape gate. Only [`validate_sql`] builds one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutableQuery(String);

impl ExecutableQuery {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Clone)]
pub struct Translator {
    completion: Arc<dyn CompletionService>,
}

impl Translator {
    pub fn new(completion: Arc<dyn CompletionService>) -> Self {
        Self { completion }
    }

    pub async fn translate(
        &self,
        question: &str,
        schema: &SchemaDescriptor,
    ) -> Result<ExecutableQuery, TranslationError> {
        let request = CompletionRequest {
            system: SYSTEM_ROLE.to_string(),
            prompt: build_prompt(question, schema),
            max_tokens: MAX_OUTPUT_TOKENS,
            temperature: TEMPERATURE,
        };

        let reply = self.completion.complete(&request).await.map_err(|e| {
            tracing::warn!("completion failed: {e}");
            TranslationError::from(e)
        })?;
        tracing::debug!("raw completion: {}", truncate_for_log(&reply));

        let query = validate_sql(&reply)?;
        tracing::info!("translated question to: {}", truncate_for_log(query.as_str()));
        Ok(query)
    }
}

pub fn build_prompt(question: &str, schema: &SchemaDescriptor) -> String {
    let mut prompt = String::from(
        "Convert the following natural language question to a SQL query.\n\nDatabase Schema:\n",
    );
    prompt.push_str(&schema.render());
    prompt.push_str("\nGuidelines:\n");
    for g in GUIDELINES {
        prompt.push_str("- ");
        prompt.push_str(g);
        prompt.push('\n');
    }
    prompt.push_str("\nQuestion: ");
    prompt.push_str(question);
    prompt.push('\n');
    prompt
}

pub fn validate_sql(reply: &str) -> Result<ExecutableQuery, TranslationError> {
    let sql = strip_code_fence(reply.trim()).trim();
    let upper = sql.to_uppercase();
    if sql.is_empty() || !ALLOWED_VERBS.iter().any(|v| upper.starts_with(v)) {
        return Err(TranslationError::InvalidOutput {
            reply: truncate_for_log(reply),
        });
    }
    Ok(ExecutableQuery(sql.to_string()))
}

/// Language tags models put on an opening fence, on its own line or inline.
const FENCE_INFO_TAGS: &[&str] = &["sql", "duckdb", "postgresql", "postgres", "psql"];

fn strip_code_fence(s: &str) -> &str {
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    let rest = match rest.find('\n') {
        Some(nl) if rest[..nl].trim().chars().all(|c| c.is_ascii_alphanumeric()) => {
            &rest[nl + 1..]
        }
        _ => strip_info_tag(rest),
    };
    rest.strip_suffix("```").unwrap_or(rest)
}

fn strip_info_tag(s: &str) -> &str {
    let word_end = s.find(char::is_whitespace).unwrap_or(s.len());
    let word = &s[..word_end];
    if FENCE_INFO_TAGS.iter().any(|t| word.eq_ignore_ascii_case(t)) {
        s[word_end..].trim_start()
    } else {
        s
    }
}
