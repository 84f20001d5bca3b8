// Segment fetcher: downloads a planned set of segments with a fixed ceiling
// on the number of requests in flight.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use mpd::{SegmentSequence, SegmentSpec};
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};
use url::Url;

use crate::config::GapPolicy;
use crate::error::{PipelineError, SegmentError, SegmentFailure};
use crate::retry::{RetryPolicy, retry_with_backoff};

/// Outcome of one segment download.
#[derive(Debug)]
pub struct FetchResult {
    pub sequence: SegmentSequence,
    pub local_path: PathBuf,
    /// Number of bytes written to `local_path` on success
    pub outcome: Result<u64, SegmentError>,
}

impl FetchResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn bytes(&self) -> Option<u64> {
        self.outcome.as_ref().ok().copied()
    }
}

/// Snapshot reported after every finished download.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchProgress {
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
    pub bytes: u64,
}

pub type ProgressCallback = Arc<dyn Fn(FetchProgress) + Send + Sync + 'static>;

#[async_trait]
pub trait SegmentDownloader: Send + Sync {
    /// Fetch `spec.remote_url` and store the full body at `spec.local_path`,
    /// returning the number of bytes written.
    async fn download(&self, spec: &SegmentSpec) -> Result<u64, SegmentError>;
}

/// Downloads segments over HTTP.
///
/// The body is streamed to `<local_path>.part` and renamed into place once
/// complete, so an interrupted download never leaves a truncated segment at
/// `local_path`.
pub struct HttpSegmentDownloader {
    http_client: Client,
    retry: RetryPolicy,
    token: CancellationToken,
}

impl HttpSegmentDownloader {
    pub fn new(http_client: Client, retry: RetryPolicy, token: CancellationToken) -> Self {
        Self {
            http_client,
            retry,
            token,
        }
    }

    async fn fetch_once(&self, url: &Url, dest: &Path) -> Result<u64, SegmentError> {
        let response = self.http_client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SegmentError::http_status(status, url.as_str()));
        }

        trace!(url = %url, http_version = ?response.version(), "Segment response received");

        let part = part_path(dest);
        match write_body(response, &part).await {
            Ok(written) => {
                tokio::fs::rename(&part, dest).await?;
                Ok(written)
            }
            Err(e) => {
                if let Err(remove_err) = tokio::fs::remove_file(&part).await
                    && remove_err.kind() != std::io::ErrorKind::NotFound
                {
                    warn!(path = %part.display(), error = %remove_err, "Failed to remove partial segment");
                }
                Err(e)
            }
        }
    }
}

#[async_trait]
impl SegmentDownloader for HttpSegmentDownloader {
    #[instrument(skip(self, spec), fields(seq = %spec.sequence))]
    async fn download(&self, spec: &SegmentSpec) -> Result<u64, SegmentError> {
        let url = Url::parse(&spec.remote_url)
            .map_err(|e| SegmentError::invalid_url(&spec.remote_url, e.to_string()))?;
        let url = &url;
        let dest = spec.local_path.as_path();
        let this = self;

        let written =
            retry_with_backoff(&self.retry, &self.token, move |_| this.fetch_once(url, dest))
                .await?;
        debug!(size = written, "Downloaded segment");
        Ok(written)
    }
}

async fn write_body(mut response: reqwest::Response, path: &Path) -> Result<u64, SegmentError> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut written: u64 = 0;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

/// `<path>.part`, the staging location used while a download is in flight.
pub fn part_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".part");
    PathBuf::from(name)
}

/// Runs downloads for a list of segment specs with bounded concurrency.
pub struct SegmentFetcher {
    downloader: Arc<dyn SegmentDownloader>,
    concurrency: usize,
    gap_policy: GapPolicy,
    token: CancellationToken,
    on_progress: Option<ProgressCallback>,
}

impl SegmentFetcher {
    /// A `concurrency` of 0 is treated as 1.
    pub fn new(
        downloader: Arc<dyn SegmentDownloader>,
        concurrency: usize,
        token: CancellationToken,
    ) -> Self {
        Self {
            downloader,
            concurrency: concurrency.max(1),
            gap_policy: GapPolicy::default(),
            token,
            on_progress: None,
        }
    }

    pub fn with_gap_policy(mut self, gap_policy: GapPolicy) -> Self {
        self.gap_policy = gap_policy;
        self
    }

    pub fn with_progress(mut self, on_progress: ProgressCallback) -> Self {
        self.on_progress = Some(on_progress);
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Download every spec, returning one result per spec in input order.
    ///
    /// At most `concurrency` downloads are in flight at any time. A failure
    /// does not affect downloads already running. Under [`GapPolicy::Strict`]
    /// no new downloads are started after the first failure; when the token is
    /// cancelled no new downloads are started at all. In both cases the
    /// running downloads are drained and the never-started specs are reported
    /// as [`SegmentError::Cancelled`].
    #[instrument(skip_all, fields(total = specs.len(), concurrency = self.concurrency))]
    pub async fn fetch_all(&self, specs: &[SegmentSpec]) -> Vec<FetchResult> {
        let total = specs.len();
        info!("Fetching {} segments", total);

        // One slot per input position, each written once by the collector below.
        let mut slots: Vec<Option<Result<u64, SegmentError>>> = (0..total).map(|_| None).collect();
        let mut pending = specs.iter().enumerate();
        let mut in_flight = FuturesUnordered::new();
        let mut progress = FetchProgress {
            total,
            ..FetchProgress::default()
        };
        let mut halted = false;

        loop {
            while !halted && in_flight.len() < self.concurrency {
                if self.token.is_cancelled() {
                    info!("Cancellation requested, no new segment downloads will be started");
                    halted = true;
                    break;
                }
                let Some((index, spec)) = pending.next() else {
                    break;
                };
                let downloader = &self.downloader;
                in_flight.push(async move { (index, downloader.download(spec).await) });
            }

            let Some((index, outcome)) = in_flight.next().await else {
                break;
            };

            let sequence = specs[index].sequence;
            match &outcome {
                Ok(bytes) => {
                    progress.completed += 1;
                    progress.bytes += bytes;
                    trace!(seq = %sequence, bytes, "Segment stored");
                }
                Err(err) => {
                    progress.failed += 1;
                    warn!(seq = %sequence, error = %err, "Segment download failed");
                    if self.gap_policy == GapPolicy::Strict && !halted {
                        info!("Strict gap policy, no new segment downloads will be started");
                        halted = true;
                    }
                }
            }
            slots[index] = Some(outcome);

            if let Some(on_progress) = &self.on_progress {
                on_progress(progress);
            }
        }

        debug!(
            completed = progress.completed,
            failed = progress.failed,
            bytes = progress.bytes,
            "Segment fetching finished"
        );

        specs
            .iter()
            .zip(slots)
            .map(|(spec, slot)| FetchResult {
                sequence: spec.sequence,
                local_path: spec.local_path.clone(),
                outcome: slot.unwrap_or(Err(SegmentError::Cancelled)),
            })
            .collect()
    }
}

/// Media results accepted by the gap policy.
#[derive(Debug)]
pub struct GapCheck {
    /// Successful results, in input order
    pub fetched: Vec<FetchResult>,
    /// Trailing segments the server reported as missing
    pub tolerated: Vec<SegmentSequence>,
}

/// Decide whether the media results are complete enough to reassemble.
///
/// Under [`GapPolicy::TolerateTrailing`] a run of 404/410 failures at the end
/// of the list is accepted, provided at least one media segment was fetched.
/// Every other failure, and every failure under [`GapPolicy::Strict`], yields
/// a single [`PipelineError::SegmentFetch`] naming all failed sequences.
pub fn apply_gap_policy(
    results: Vec<FetchResult>,
    policy: GapPolicy,
) -> Result<GapCheck, PipelineError> {
    let first_failure = results.iter().position(|r| !r.is_success());
    let Some(first_failure) = first_failure else {
        return Ok(GapCheck {
            fetched: results,
            tolerated: Vec::new(),
        });
    };

    let trailing_only = first_failure > 0
        && results[first_failure..]
            .iter()
            .all(|r| matches!(&r.outcome, Err(e) if e.is_not_found()));

    if policy == GapPolicy::TolerateTrailing && trailing_only {
        let mut fetched = results;
        let tolerated: Vec<_> = fetched
            .drain(first_failure..)
            .map(|r| r.sequence)
            .collect();
        let missing = tolerated
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        warn!(
            count = tolerated.len(),
            "Trailing segments [{}] not found on server, continuing without them",
            missing
        );
        return Ok(GapCheck { fetched, tolerated });
    }

    let failures = results
        .into_iter()
        .filter_map(|r| match r.outcome {
            Ok(_) => None,
            Err(error) => Some(SegmentFailure {
                sequence: r.sequence,
                error,
            }),
        })
        .collect();
    Err(PipelineError::SegmentFetch { failures })
}
