use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use care_ask::ask::AskService;
use care_ask::cli::{self, AskArgs};
use care_ask::completion::OpenAiCompletion;
use care_ask::executor::DuckDbExecutor;
use care_ask::schema::PROVIDER_SCHEMA;
use care_ask::storage::StoragePaths;
use care_ask::translate::Translator;
use care_ask::{server, store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = cli::Args::parse();

    match args.cmd {
        cli::Command::Init(cmd) => store::run(cmd).await.context("init failed"),
        cli::Command::Serve(cmd) => server::run(cmd).await.context("serve failed"),
        cli::Command::Ask(cmd) => ask_once(cmd).await.context("ask failed"),
    }
}

async fn ask_once(opts: AskArgs) -> anyhow::Result<()> {
    let conn = store::open_existing(&StoragePaths::new(&opts.data_dir))?;
    let completion =
        OpenAiCompletion::new(opts.completion.to_config()).context("build completion client")?;
    let service = AskService::new(
        Translator::new(Arc::new(completion)),
        Arc::new(DuckDbExecutor::with_timeout(conn, opts.query_timeout())),
        &PROVIDER_SCHEMA,
    );
    let resp = service.ask(&opts.question).await;
    println!("{}", resp.answer);
    Ok(())
}
