use anyhow::{Context, Result};
use clap::Parser;
use docchat::analysis_api::HttpBackend;
use docchat::config::{AnswerPolicy, ClientConfig};
use docchat::display::{render_answer, AnswerSlot};
use docchat::flows::Flows;
use docchat::gui::run_gui;
use docchat::input::{InputController, SelectedFile};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// TOML configuration file (defaults to ./docchat.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Base URL of the analysis service
    #[arg(long)]
    base_url: Option<String>,

    /// HTTP timeout in seconds (none by default)
    #[arg(long)]
    timeout_seconds: Option<u64>,

    /// Which late response may replace the displayed answer
    #[arg(long, value_enum)]
    answer_policy: Option<AnswerPolicy>,

    /// Upload this file for analysis, then exit
    #[arg(long)]
    upload: Option<PathBuf>,

    /// Analysis instruction sent with --upload
    #[arg(long, default_value = "")]
    instruction: String,

    /// Send one chat query, then exit
    #[arg(long)]
    chat: Option<String>,
}

fn main() -> Result<()> {
    init_logging();

    let args = Args::parse();
    let mut config = ClientConfig::load(args.config.as_deref())?;
    if let Some(base_url) = args.base_url {
        config.base_url = base_url;
    }
    if let Some(secs) = args.timeout_seconds {
        config.timeout_seconds = Some(secs);
    }
    if let Some(policy) = args.answer_policy {
        config.answer_policy = policy;
    }

    if args.upload.is_some() || args.chat.is_some() {
        let mut input = InputController::new();
        input.set_file(args.upload.map(SelectedFile::from_path));
        input.set_instruction(args.instruction);
        let run_chat = args.chat.is_some();
        input.set_chat_query(args.chat.unwrap_or_default());
        run_cli(config, input, run_chat)?;
    } else {
        run_gui(config)?;
    }

    Ok(())
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Runs the requested flows concurrently and prints the answer left in
/// the display slot.
fn run_cli(config: ClientConfig, input: InputController, run_chat: bool) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("cannot create async runtime")?;
    let backend = HttpBackend::new(config.clone()).context("cannot create HTTP client")?;
    let flows = Flows::new(Arc::new(backend), AnswerSlot::new(config.answer_policy));

    let (upload, chat) = runtime.block_on(async {
        let upload = async {
            match input.file() {
                Some(_) => Some(flows.submit_upload(&input).await),
                None => None,
            }
        };
        let chat = async {
            if run_chat {
                Some(flows.submit_chat(&input).await)
            } else {
                None
            }
        };
        tokio::join!(upload, chat)
    });

    let mut failures = [upload, chat].into_iter().flatten().filter_map(Result::err);
    let first_failure = failures.next();
    for err in failures {
        eprintln!("{err}");
    }

    if flows.answer().revision() > 0 {
        println!("{}", render_answer(flows.answer()));
    }

    match first_failure {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}
