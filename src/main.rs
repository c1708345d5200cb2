use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use benefits_walker::config::{load_settings, Settings};
use benefits_walker::model::SessionToken;
use benefits_walker::{ExtractionResult, HttpTransport, Layout, Orchestrator, SessionContext};

#[derive(Parser)]
#[command(name = "benefits_walker", about = "Extract the benefit tree of a JSF member portal")]
struct Cli {
    /// Settings file layered over config/default.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reset to the baseline view and list its categories
    Categories,
    /// Extract every category, procedure and detail panel as JSON
    Run {
        /// Write JSON here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Extract a single category by its position in the baseline listing
    Category {
        index: usize,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = load_settings(cli.config).context("loading settings")?;
    let mut orchestrator = connect(&settings).await?;

    let result = match cli.command {
        Commands::Categories => {
            let categories = orchestrator.categories().await?;
            if categories.is_empty() {
                println!("No categories found. Is the session cookie still valid?");
                return Ok(());
            }
            println!("{:>3} | {:<32} | {}", "#", "Category", "Expanded");
            println!("{}", "-".repeat(50));
            for c in &categories {
                println!(
                    "{:>3} | {:<32} | {}",
                    c.ordinal,
                    truncate(&c.name, 32),
                    if c.expanded { "yes" } else { "" }
                );
            }
            Ok(())
        }
        Commands::Run { output } => {
            let cancel = cancel_on_ctrl_c();
            let pb = progress_bar()?;
            let mut orchestrator = orchestrator.with_cancellation(cancel).with_progress(pb.clone());
            let outcome = orchestrator.run().await;
            pb.finish_and_clear();
            finish(outcome, output.as_ref())
        }
        Commands::Category { index, output } => {
            let cancel = cancel_on_ctrl_c();
            let mut orchestrator = orchestrator.with_cancellation(cancel);
            let outcome = orchestrator.run_category(index).await;
            finish(outcome, output.as_ref())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        eprintln!("Done in {}", format_duration(elapsed));
    }

    result
}

async fn connect(settings: &Settings) -> anyhow::Result<Orchestrator<HttpTransport>> {
    let transport = HttpTransport::new(&settings.portal).context("building HTTP client")?;
    let ctx = match &settings.portal.view_state {
        Some(token) => SessionContext::new(transport, SessionToken::new(token.clone())),
        None => SessionContext::discover(transport)
            .await
            .context("reading initial view state from the benefits page")?,
    };
    let layout = Layout::new(settings.layout.clone()).context("compiling category_ref_pattern")?;
    Ok(Orchestrator::new(ctx, layout, settings.retry.clone()))
}

/// Write whatever was collected. An aborted run still prints its partial
/// tree before failing.
fn finish(
    outcome: Result<ExtractionResult, benefits_walker::Aborted>,
    output: Option<&PathBuf>,
) -> anyhow::Result<()> {
    match outcome {
        Ok(result) => {
            write_json(&result, output)?;
            print_stats(&result);
            Ok(())
        }
        Err(aborted) => {
            warn!("Writing partial result");
            write_json(&aborted.partial, output)?;
            print_stats(&aborted.partial);
            Err(aborted.into())
        }
    }
}

fn write_json(result: &ExtractionResult, output: Option<&PathBuf>) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(result)?;
    match output {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), "Wrote result");
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn print_stats(result: &ExtractionResult) {
    let s = &result.stats;
    eprintln!(
        "Extracted {} categories, {} procedures ({} detailed, {} summary only).",
        s.categories, s.procedures, s.detailed, s.degraded
    );
    if !s.degraded_codes.is_empty() {
        eprintln!("Summary only: {}", s.degraded_codes.join(", "));
    }
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping at the next item boundary");
            trigger.cancel();
        }
    });
    cancel
}

fn progress_bar() -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
