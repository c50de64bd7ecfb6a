//! # Cerberus Binary
//!
//! Entry point: loads settings, wires the adapters into the engine and
//! dispatches to the scheduled loop or one of the operator commands.

mod app;
mod review;

use std::path::PathBuf;

use cb_config::{LogFormat, Settings};
use cb_engine::run_maintenance;
use clap::{Parser, Subcommand};
use colored::Colorize;
use dialoguer::theme::ColorfulTheme;
use dialoguer::Confirm;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cerberus", version, about = "Scheduled content bot with a reviewed posting queue")]
struct Cli {
    /// Settings file (defaults to ./cerberus.toml when present)
    #[arg(short, long, global = true, env = "CERBERUS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Generate, publish and maintain on a randomized schedule (default)
    Run,
    /// Interactive queue review
    Review,
    /// Generate posts and queue them as pending
    Generate {
        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,
        /// Queue without asking for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Run one maintenance pass and exit
    Maintain,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // no signal handler available; run until killed
        std::future::pending::<()>().await;
    }
}

async fn generate(settings: &Settings, count: usize, yes: bool) -> anyhow::Result<()> {
    let mut engine = app::build_engine(settings, false).await?;
    let posts = engine.generate_batch(count).await;
    if posts.is_empty() {
        anyhow::bail!("no posts were generated");
    }

    for (n, post) in posts.iter().enumerate() {
        println!("{} {}", format!("[{}]", n + 1).bright_black(), post);
    }
    let confirmed = yes
        || Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("Queue these {} posts?", posts.len()))
            .default(true)
            .interact()?;
    if !confirmed {
        println!("{}", "Discarded.".yellow());
        return Ok(());
    }

    let stored = engine.store_batch(&posts).await?;
    println!("{}", format!("{stored} posts queued for review.").green());
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;
    init_tracing(settings.log_format);

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            let mut engine = app::build_engine(&settings, true).await?;
            info!("Cerberus starting");
            engine.run(shutdown_signal()).await;
        }
        Command::Review => {
            let mut engine = app::build_engine(&settings, false).await?;
            review::run(&mut engine, settings.content.bulk_count).await?;
        }
        Command::Generate { count, yes } => generate(&settings, count, yes).await?,
        Command::Maintain => {
            let repo = app::open_repo(&settings).await?;
            let report = run_maintenance(repo.as_ref(), &app::maintenance_policy(&settings)).await;
            if !report.is_clean() {
                anyhow::bail!("maintenance finished with {} failed step(s)", report.failures);
            }
        }
    }
    Ok(())
}
