use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use toolz_web::analysis::{AnalysisDepth, FocusArea};

mod commands;

#[derive(Debug, Parser)]
#[command(name = "toolz", version, about = "Fetch landing pages through relays and review them")]
struct Cli {
    /// Config file (defaults to ./toolz.yaml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch a page and print the pipeline result as JSON
    Fetch(FetchArgs),
    /// Fetch a page and ask the model for a review
    Analyze(AnalyzeArgs),
}

#[derive(Debug, Args)]
struct FetchArgs {
    url: String,
    /// Never open a rendering surface
    #[arg(long)]
    no_render: bool,
    #[arg(long)]
    pretty: bool,
}

#[derive(Debug, Args)]
struct AnalyzeArgs {
    url: String,
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
    #[arg(long, default_value = "quick")]
    depth: AnalysisDepth,
    /// Comma separated: technical, content, conversion
    #[arg(long, value_delimiter = ',')]
    focus: Vec<FocusArea>,
    #[arg(long)]
    no_render: bool,
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = ?e, "toolz.failed");
            eprintln!("error: {}", commands::user_message(&e));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    // 1) Load config (env wins), then logging from its `logging` section
    let cfg = commands::load_config(cli.config.as_deref())?;
    let log_path = commands::init_logging_from(&cfg.logging)?;
    tracing::debug!(log = %log_path.display(), "toolz.start");

    match cli.command {
        Command::Fetch(args) => {
            let result = commands::fetch(&cfg, &args.url, args.no_render).await?;
            commands::print_json(&result, args.pretty)
        }
        Command::Analyze(args) => {
            let report = commands::analyze(
                &cfg,
                &args.url,
                args.api_key,
                args.depth,
                &args.focus,
                args.no_render,
            )
            .await?;
            commands::print_json(&report, args.pretty)
        }
    }
}
