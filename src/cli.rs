use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::completion::{DEFAULT_BASE_URL, DEFAULT_MODEL, OpenAiConfig};

const DEFAULT_DATA_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/data");

#[derive(Parser, Debug)]
#[command(name = "care-ask-backend")]
#[command(about = "Hospital pricing and quality API with natural-language questions (DuckDB + LLM)", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the DuckDB store: provider tables, ZIP centroids, distance macro.
    Init(InitArgs),
    /// Serve the HTTP API (requires a completed init).
    Serve(ServeArgs),
    /// Answer a single question from the command line.
    Ask(AskArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct InitArgs {
    /// Data directory holding the DuckDB file and meta.json.
    #[arg(long, env = "CARE_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    pub data_dir: String,

    /// GeoNames postal export (US.txt, tab separated) used for ZIP distances.
    #[arg(long)]
    pub zip_centroids_file: Option<String>,

    /// Reload ZIP centroids even if the table is already populated.
    #[arg(long)]
    pub rebuild: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct CompletionArgs {
    /// API key for the OpenAI-compatible completion service.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    #[arg(long, env = "OPENAI_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub openai_base_url: String,

    #[arg(long, env = "OPENAI_MODEL", default_value = DEFAULT_MODEL)]
    pub openai_model: String,

    /// Upper bound on one completion round trip.
    #[arg(long, default_value_t = 30)]
    pub completion_timeout_secs: u64,
}

impl CompletionArgs {
    pub fn to_config(&self) -> OpenAiConfig {
        OpenAiConfig {
            api_key: self.openai_api_key.clone(),
            base_url: self.openai_base_url.clone(),
            model: self.openai_model.clone(),
            timeout: Duration::from_secs(self.completion_timeout_secs),
        }
    }
}

#[derive(clap::Args, Debug, Clone)]
pub struct ServeArgs {
    /// Data directory holding the DuckDB file.
    #[arg(long, env = "CARE_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    pub data_dir: String,

    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, default_value_t = 8000)]
    pub port: u16,

    /// Upper bound on one generated query; longer statements are interrupted.
    #[arg(long, default_value_t = 30)]
    pub query_timeout_secs: u64,

    #[command(flatten)]
    pub completion: CompletionArgs,
}

#[derive(clap::Args, Debug, Clone)]
pub struct AskArgs {
    /// The question, e.g. "Which hospital has the best rating in 10001?"
    pub question: String,

    /// Data directory holding the DuckDB file.
    #[arg(long, env = "CARE_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    pub data_dir: String,

    #[arg(long, default_value_t = 30)]
    pub query_timeout_secs: u64,

    #[command(flatten)]
    pub completion: CompletionArgs,
}

impl ServeArgs {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

impl AskArgs {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}
