use std::sync::Arc;
use std::time::Duration;

use dashaudio_engine::fetcher::ProgressCallback;
use dashaudio_engine::pipeline::StateObserver;
use dashaudio_engine::{FetchProgress, PipelineState};
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};

const TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} segments {msg}";

/// Terminal progress display for one pipeline run.
pub struct SegmentProgress {
    bar: ProgressBar,
}

impl Default for SegmentProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl SegmentProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        bar.enable_steady_tick(Duration::from_millis(120));
        bar.set_message("resolving manifest");
        Self { bar }
    }

    /// Fetch progress, one call per finished segment.
    pub fn callback(&self) -> ProgressCallback {
        let bar = self.bar.clone();
        Arc::new(move |progress: FetchProgress| {
            bar.set_length(progress.total as u64);
            bar.set_position((progress.completed + progress.failed) as u64);
            let failed = if progress.failed > 0 {
                format!(", {} failed", progress.failed)
            } else {
                String::new()
            };
            bar.set_message(format!("({}{failed})", HumanBytes(progress.bytes)));
        })
    }

    /// Stage changes.
    pub fn observer(&self) -> StateObserver {
        let bar = self.bar.clone();
        Arc::new(move |state: &PipelineState| match state {
            PipelineState::Fetching { segments } => {
                bar.set_length(*segments as u64);
                bar.set_position(0);
                bar.set_message("");
            }
            PipelineState::Reassembling => bar.set_message("reassembling"),
            PipelineState::Transcoding => bar.set_message("transcoding"),
            PipelineState::Done { .. } | PipelineState::Failed { .. } => bar.finish_and_clear(),
        })
    }
}
