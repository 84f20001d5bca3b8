// Pipeline orchestration: manifest -> plan -> fetch -> reassemble -> transcode.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use mpd::{Manifest, SegmentPlan, SegmentSpec, sanitize_file_name};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::api::{CdnManifestSource, ManifestSource};
use crate::client::create_client;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Stage};
use crate::fetcher::{
    HttpSegmentDownloader, ProgressCallback, SegmentDownloader, SegmentFetcher, apply_gap_policy,
};
use crate::reassembler::{reassemble, remove_files};
use crate::transcoder::Transcoder;

/// Observable progress of a pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineState {
    Fetching { segments: usize },
    Reassembling,
    Transcoding,
    Done { output: PathBuf },
    Failed { stage: Stage, cause: String },
}

pub type StateObserver = Arc<dyn Fn(&PipelineState) + Send + Sync + 'static>;

/// Files produced for one asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    /// Raw manifest copy written when parsing fails
    pub diagnostic: PathBuf,
    /// Reassembled container handed to the transcoder
    pub master: PathBuf,
    /// Final audio file
    pub output: PathBuf,
}

impl OutputPaths {
    pub fn new(config: &PipelineConfig, asset_id: &str) -> Self {
        let dir = &config.output_dir;
        let id = sanitize_file_name(asset_id);
        Self {
            diagnostic: dir.join(format!("{id}_manifest.mpd")),
            master: dir.join(format!("{id}_master_audio.mp4")),
            output: dir
                .join(format!("AUD_STREAMID_{id}"))
                .join(&config.transcode.output_file_name),
        }
    }
}

/// Runs one asset through every stage. Nothing is retried at this level.
pub struct Pipeline {
    config: PipelineConfig,
    source: Arc<dyn ManifestSource>,
    downloader: Arc<dyn SegmentDownloader>,
    transcoder: Transcoder,
    token: CancellationToken,
    on_state: Option<StateObserver>,
    on_progress: Option<ProgressCallback>,
}

impl Pipeline {
    /// Build a pipeline that talks to the configured manifest API and
    /// downloads segments over HTTP.
    pub fn new(config: PipelineConfig, token: CancellationToken) -> Result<Self, PipelineError> {
        if config.fetch.concurrency == 0 {
            return Err(PipelineError::Configuration {
                reason: "concurrency must be greater than zero".to_string(),
            });
        }

        let client = create_client(&config.fetch).map_err(|e| PipelineError::Configuration {
            reason: format!("failed to create HTTP client: {e}"),
        })?;

        let source = Arc::new(
            CdnManifestSource::new(client.clone(), config.api_origin.clone())
                .with_headers(config.fetch.headers.clone()),
        );
        let downloader = Arc::new(HttpSegmentDownloader::new(
            client,
            config.fetch.retry.clone(),
            token.clone(),
        ));
        let transcoder = Transcoder::new(config.transcode.clone());

        Ok(Self {
            config,
            source,
            downloader,
            transcoder,
            token,
            on_state: None,
            on_progress: None,
        })
    }

    pub fn with_source(mut self, source: Arc<dyn ManifestSource>) -> Self {
        self.source = source;
        self
    }

    pub fn with_downloader(mut self, downloader: Arc<dyn SegmentDownloader>) -> Self {
        self.downloader = downloader;
        self
    }

    pub fn with_state_observer(mut self, observer: StateObserver) -> Self {
        self.on_state = Some(observer);
        self
    }

    pub fn with_progress(mut self, on_progress: ProgressCallback) -> Self {
        self.on_progress = Some(on_progress);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Produce the final audio file for `asset_id` and return its path.
    #[instrument(skip(self), fields(output_dir = %self.config.output_dir.display()))]
    pub async fn run(&self, asset_id: &str) -> Result<PathBuf, PipelineError> {
        match self.execute(asset_id).await {
            Ok(output) => {
                info!(output = %output.display(), "Pipeline finished");
                self.emit(PipelineState::Done {
                    output: output.clone(),
                });
                Ok(output)
            }
            Err(e) => {
                error!(stage = %e.stage(), error = %e, "Pipeline failed");
                self.emit(PipelineState::Failed {
                    stage: e.stage(),
                    cause: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn execute(&self, asset_id: &str) -> Result<PathBuf, PipelineError> {
        if asset_id.trim().is_empty() {
            return Err(PipelineError::Configuration {
                reason: "asset id must not be empty".to_string(),
            });
        }

        // fail fast, before any network traffic
        let program = self
            .transcoder
            .ensure_available()
            .map_err(|source| PipelineError::Transcode {
                kept_input: None,
                source,
            })?;
        info!(program = %program.display(), "Transcoder found");

        let paths = OutputPaths::new(&self.config, asset_id);
        let output_dir = &self.config.output_dir;
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|source| PipelineError::OutputDirectory {
                path: output_dir.clone(),
                source,
            })?;

        self.check_cancelled(Stage::ManifestFetch)?;
        let text = self.source.fetch_manifest(asset_id).await.map_err(|source| {
            PipelineError::ManifestFetch {
                asset_id: asset_id.to_string(),
                source,
            }
        })?;

        let manifest = parse_with_diagnostics(&text, &paths.diagnostic).await?;
        info!(
            base_url = %manifest.base_url,
            representation = %manifest.representation_id,
            expected_segments = manifest.expected_segment_count(),
            "Manifest parsed"
        );

        let file_prefix = format!("{}_", sanitize_file_name(asset_id));
        let plan = SegmentPlan::build_reserving(
            &manifest,
            output_dir,
            &file_prefix,
            &[paths.master.as_path(), paths.diagnostic.as_path()],
        )?;

        let master = self.fetch_and_reassemble(&plan, &paths.master).await?;
        self.transcode(&master, &paths.output).await?;

        remove_files([master.as_path()]).await;
        Ok(paths.output)
    }

    async fn fetch_and_reassemble(
        &self,
        plan: &SegmentPlan,
        master: &Path,
    ) -> Result<PathBuf, PipelineError> {
        self.check_cancelled(Stage::Fetching)?;

        let specs: Vec<SegmentSpec> = plan.iter().cloned().collect();
        self.emit(PipelineState::Fetching {
            segments: specs.len(),
        });

        let mut fetcher = SegmentFetcher::new(
            Arc::clone(&self.downloader),
            self.config.fetch.concurrency,
            self.token.clone(),
        )
        .with_gap_policy(self.config.fetch.gap_policy);
        if let Some(on_progress) = &self.on_progress {
            fetcher = fetcher.with_progress(Arc::clone(on_progress));
        }

        let mut results = fetcher.fetch_all(&specs).await;
        if self.token.is_cancelled() {
            discard_segments(&specs).await;
            return Err(PipelineError::Cancelled {
                stage: Stage::Fetching,
            });
        }

        // the init spec always comes first
        let media = results.split_off(1);
        let Some(init) = results.pop() else {
            return Err(PipelineError::Configuration {
                reason: "segment plan has no init segment".to_string(),
            });
        };

        let accepted = match apply_gap_policy(media, self.config.fetch.gap_policy) {
            Ok(accepted) => accepted,
            Err(e) => {
                discard_segments(&specs).await;
                return Err(e);
            }
        };

        self.emit(PipelineState::Reassembling);
        match reassemble(&init, &accepted.fetched, master).await {
            Ok(path) => Ok(path),
            Err(e) => {
                discard_segments(&specs).await;
                Err(e.into())
            }
        }
    }

    async fn transcode(&self, master: &Path, output: &Path) -> Result<(), PipelineError> {
        self.emit(PipelineState::Transcoding);

        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| PipelineError::OutputDirectory {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        tokio::select! {
            result = self.transcoder.transcode(master, output) => {
                if let Err(source) = result {
                    // only the master is kept for diagnosis
                    remove_files([output]).await;
                    return Err(PipelineError::Transcode {
                        kept_input: Some(master.to_path_buf()),
                        source,
                    });
                }
                Ok(())
            }
            _ = self.token.cancelled() => {
                // dropping the transcode future kills the child
                remove_files([master, output]).await;
                Err(PipelineError::Cancelled {
                    stage: Stage::Transcoding,
                })
            }
        }
    }

    fn check_cancelled(&self, stage: Stage) -> Result<(), PipelineError> {
        if self.token.is_cancelled() {
            return Err(PipelineError::Cancelled { stage });
        }
        Ok(())
    }

    fn emit(&self, state: PipelineState) {
        info!(state = ?state, "Pipeline state changed");
        if let Some(observer) = &self.on_state {
            observer(&state);
        }
    }
}

/// Parse the manifest, saving the raw text to `diagnostic_path` on failure.
pub async fn parse_with_diagnostics(
    text: &str,
    diagnostic_path: &Path,
) -> Result<Manifest, PipelineError> {
    match Manifest::parse(text) {
        Ok(manifest) => Ok(manifest),
        Err(source) => {
            let diagnostic_path = match tokio::fs::write(diagnostic_path, text).await {
                Ok(()) => {
                    warn!(path = %diagnostic_path.display(), "Saved unparseable manifest");
                    Some(diagnostic_path.to_path_buf())
                }
                Err(e) => {
                    warn!(
                        path = %diagnostic_path.display(),
                        error = %e,
                        "Failed to save unparseable manifest"
                    );
                    None
                }
            };
            Err(PipelineError::ManifestParse {
                diagnostic_path,
                source,
            })
        }
    }
}

async fn discard_segments(specs: &[SegmentSpec]) {
    let removed = remove_files(specs.iter().map(|s| s.local_path.as_path())).await;
    if removed > 0 {
        info!(removed, "Removed downloaded segments after failure");
    }
}
