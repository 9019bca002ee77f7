use std::{
    path::PathBuf,
    process::ExitCode,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use console::style;
use keymoments_core::{
    Collaborators, Config, KeyMomentsError, Pipeline, PipelineRun, Provider, Stage,
    format_analysis_readable, silence_backend_logs,
};
use tracing_subscriber::EnvFilter;

mod progress;

use progress::TerminalProgress;

/// CLI wrapper for Provider enum (needed for clap ValueEnum)
#[derive(Clone, Copy, ValueEnum)]
enum CliProvider {
    Anthropic,
    Openai,
    Grok,
    Gemini,
}

impl From<CliProvider> for Provider {
    fn from(cli: CliProvider) -> Self {
        match cli {
            CliProvider::Anthropic => Provider::Anthropic,
            CliProvider::Openai => Provider::Openai,
            CliProvider::Grok => Provider::Grok,
            CliProvider::Gemini => Provider::Gemini,
        }
    }
}

/// Stages a run can resume at.
#[derive(Clone, Copy, ValueEnum)]
enum CliSkip {
    Transcribe,
    Analyze,
    Generate,
}

impl From<CliSkip> for Stage {
    fn from(cli: CliSkip) -> Self {
        match cli {
            CliSkip::Transcribe => Stage::Transcribe,
            CliSkip::Analyze => Stage::Analyze,
            CliSkip::Generate => Stage::Generate,
        }
    }
}

#[derive(Parser)]
#[command(name = "keymoments")]
#[command(
    about = "Transcribe a recorded meeting and build a navigable HTML summary of its key moments"
)]
struct Cli {
    /// Path to the meeting video
    video: PathBuf,

    /// Where artifacts are written. Defaults to the video's directory.
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Language model used for the analysis
    #[arg(short, long)]
    provider: CliProvider,

    /// API key; overrides the provider's environment variable
    #[arg(long)]
    api_key: Option<String>,

    /// Resume at a later stage, reusing artifacts from a previous run
    #[arg(long)]
    skip: Option<CliSkip>,

    /// Config file (defaults to <config dir>/keymoments/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

pub(crate) fn format_duration(d: Duration) -> String {
    if d < Duration::from_secs(60) {
        format!("{:.1}s", d.as_secs_f64())
    } else {
        let secs = d.as_secs();
        format!("{}m {}s", secs / 60, secs % 60)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    if cli.verbose < 2 {
        silence_backend_logs();
    }

    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    let run = PipelineRun::new(&cli.video, cli.output_dir.clone(), cli.provider.into())
        .with_skip(cli.skip.map(Stage::from))
        .with_config(config);
    let collaborators = Collaborators::standard(&run, cli.api_key.as_deref());

    println!(
        "\n{}  {}\n",
        style("keymoments").cyan().bold(),
        style("Meeting Summarizer").dim()
    );
    println!(
        "{} {}",
        style("Video:").dim(),
        style(run.video_path.display()).bold()
    );
    println!(
        "{} {}",
        style("Output:").dim(),
        style(run.output_dir.display()).bold()
    );
    println!("{}", style("─".repeat(60)).dim());

    let total_start = Instant::now();
    let mut progress = TerminalProgress::default();
    let result = Pipeline::new(&run, &collaborators).run(&mut progress).await;
    println!("{}", style("─".repeat(60)).dim());

    match result {
        Ok(report) => {
            if !report.notices.is_empty() {
                println!(
                    "{} {} repair notice(s) while validating the analysis",
                    style("!").yellow().bold(),
                    report.notices.len()
                );
            }
            println!(
                "{} Done in {}",
                style("✓").green().bold(),
                style(format_duration(total_start.elapsed())).cyan()
            );
            println!("\n{}", format_analysis_readable(&report.analysis));
            println!(
                "{} {}",
                style("Summary:").bold(),
                style(report.summary_path.display()).underlined()
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(failure) => {
            eprintln!("{} {}", style("Error:").red().bold(), failure);
            if let KeyMomentsError::AnalysisParse { raw, .. } = &failure.error {
                tracing::debug!(response = %raw, "unparseable analysis response");
            }
            for (kind, path) in &failure.checkpointed {
                eprintln!(
                    "  {} {} {}",
                    style("•").dim(),
                    kind,
                    style(path.display()).dim()
                );
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_switch_to_minutes_after_a_minute() {
        assert_eq!(format_duration(Duration::from_millis(4_300)), "4.3s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_duration(Duration::from_millis(119_600)), "1m 59s");
        assert_eq!(format_duration(Duration::from_secs(60)), "1m 0s");
    }

    #[test]
    fn provider_is_required() {
        assert!(Cli::try_parse_from(["keymoments", "meeting.mp4"]).is_err());
        let cli = Cli::try_parse_from([
            "keymoments",
            "meeting.mp4",
            "-p",
            "anthropic",
            "--skip",
            "generate",
            "-vv",
        ])
        .unwrap();
        assert!(matches!(cli.provider, CliProvider::Anthropic));
        assert!(matches!(cli.skip, Some(CliSkip::Generate)));
        assert_eq!(cli.verbose, 2);
    }
}
