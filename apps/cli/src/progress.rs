use std::{
    path::PathBuf,
    time::{Duration, Instant},
};

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use keymoments_core::{KeyMomentsError, Notice, PipelineObserver, Stage};

use crate::format_duration;

fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let template = ProgressStyle::default_spinner()
        .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
        .template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(template);
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Spinner per running stage, one summary line per finished stage.
#[derive(Default)]
pub struct TerminalProgress {
    active: Option<(ProgressBar, Instant)>,
}

impl TerminalProgress {
    pub fn skipped(&mut self, label: &str) {
        println!(
            "{} {} {}",
            style("✓").green().bold(),
            label,
            style("(checkpoint)").dim()
        );
    }

    pub fn start(&mut self, label: &str) {
        self.active = Some((create_spinner(&format!("{label}...")), Instant::now()));
    }

    pub fn finish(&mut self, label: &str, detail: &str) {
        if let Some((pb, started)) = self.active.take() {
            pb.finish_with_message(format!(
                "{} {} {} {}",
                style("✓").green().bold(),
                label,
                style(detail).dim(),
                style(format!("[{}]", format_duration(started.elapsed()))).dim()
            ));
        }
    }

    pub fn fail(&mut self, message: &str) {
        if let Some((pb, _)) = self.active.take() {
            pb.finish_with_message(format!("{} {}", style("✗").red().bold(), message));
        }
    }

    pub fn warn(&self, message: &str) {
        let line = format!("  {} {}", style("!").yellow(), message);
        match &self.active {
            Some((pb, _)) => pb.println(line),
            None => println!("{line}"),
        }
    }
}

fn labels(stage: Stage) -> (&'static str, &'static str) {
    match stage {
        Stage::Extract => ("Extracting audio", "Audio extracted"),
        Stage::Transcribe => ("Transcribing", "Transcribed"),
        Stage::Analyze => ("Analyzing transcript", "Analysis ready"),
        Stage::Generate => ("Rendering summary", "Summary generated"),
    }
}

impl PipelineObserver for TerminalProgress {
    fn stage_skipped(&mut self, stage: Stage) {
        self.skipped(labels(stage).1);
    }

    fn stage_started(&mut self, stage: Stage) {
        self.start(labels(stage).0);
    }

    fn stage_finished(&mut self, stage: Stage, artifacts: &[PathBuf]) {
        let written = artifacts
            .iter()
            .filter_map(|path| path.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(", ");
        self.finish(labels(stage).1, &written);
    }

    fn stage_failed(&mut self, stage: Stage, _error: &KeyMomentsError) {
        self.fail(&format!("{} failed", labels(stage).0));
    }

    fn notice(&mut self, notice: &Notice) {
        self.warn(&notice.to_string());
    }
}
