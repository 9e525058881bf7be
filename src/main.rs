use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ferrite_ocr::ExperimentConfig;

/// Train a text-line recogniser from a JSON experiment file.
#[derive(Parser, Debug)]
#[command(name = "ferrite-ocr", version, about)]
struct Cli {
    /// Experiment configuration (JSON).
    #[arg(short, long)]
    config: PathBuf,

    /// Override `train.epochs`.
    #[arg(long)]
    epochs: Option<usize>,

    /// Continue from this checkpoint.
    #[arg(long)]
    resume: Option<PathBuf>,

    /// Show a progress bar during validation.
    #[arg(long)]
    progress: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = ExperimentConfig::load_json(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    if let Some(epochs) = cli.epochs {
        config.train.epochs = epochs;
    }
    if let Some(resume) = cli.resume {
        config.train.resume_checkpoint = Some(resume);
    }
    config.train.show_progress |= cli.progress;

    let mut orchestrator = config
        .build_orchestrator()
        .context("failed to set up the training run")?;
    let best = orchestrator.run().context("training failed")?;

    println!(
        "best epoch {}: val_acc {}, train_acc {}, checkpoint {}",
        best.best_model_epoch, best.val_acc, best.train_acc, best.best_model_path
    );
    Ok(())
}
