//! Hospital pricing and quality lookups over HTTP, including natural-language
//! questions translated to SQL by a completion service.
//!
//! Pipeline for `POST /api/v1/ask`:
//! `translate` (LLM + shape gate) -> `executor` (DuckDB) -> `answer` (bounded text),
//! sequenced by [`ask::AskService`].

pub mod answer;
pub mod ask;
pub mod cli;
pub mod completion;
pub mod executor;
pub mod geo;
pub mod schema;
pub mod server;
pub mod storage;
pub mod store;
pub mod translate;
