use std::fmt;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use mpd::{ManifestError, PlanError, SegmentSequence};
use reqwest::StatusCode;

/// Failure of a single segment download.
#[derive(Debug, thiserror::Error)]
pub enum SegmentError {
    #[error("request failed with HTTP {status} for {url}")]
    HttpStatus { status: StatusCode, url: String },

    #[error("HTTP request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("invalid URL `{input}`: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("download cancelled")]
    Cancelled,
}

impl SegmentError {
    pub fn http_status(status: StatusCode, url: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            url: url.into(),
        }
    }

    pub fn invalid_url(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            input: input.into(),
            reason: reason.into(),
        }
    }

    /// Server errors, throttling and transport hiccups.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::HttpStatus { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            Self::Network { source } => {
                source.is_connect() || source.is_timeout() || source.is_request() || source.is_body()
            }
            Self::Io { .. } | Self::InvalidUrl { .. } | Self::Cancelled => false,
        }
    }

    /// The server reported that the segment does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::HttpStatus { status, .. }
                if *status == StatusCode::NOT_FOUND || *status == StatusCode::GONE
        )
    }
}

/// A media segment that could not be fetched.
#[derive(Debug)]
pub struct SegmentFailure {
    pub sequence: SegmentSequence,
    pub error: SegmentError,
}

#[derive(Debug, thiserror::Error)]
pub enum ManifestFetchError {
    #[error("invalid manifest API URL `{input}`: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("HTTP request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("request failed with HTTP {status} for {url}")]
    HttpStatus { status: StatusCode, url: String },

    #[error("response is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("playlist payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("playlist payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ReassemblyError {
    #[error("init segment is unavailable: {reason}")]
    InitSegmentMissing { reason: String },

    #[error(
        "sequence number {sequence} is claimed by both {} and {}",
        first.display(),
        second.display()
    )]
    AmbiguousOrder {
        sequence: SegmentSequence,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ReassemblyError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TranscodeError {
    #[error("transcoder `{program}` was not found, install it or add it to PATH")]
    NotFound { program: String },

    #[error("failed to run transcoder `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("transcoder exited with {status}: {}", stderr.trim())]
    Failed {
        status: ExitStatus,
        stderr: String,
        stdout: String,
    },
}

/// Pipeline stage, used to report where a run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Preparing,
    ManifestFetch,
    ManifestParse,
    Planning,
    Fetching,
    Reassembling,
    Transcoding,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Preparing => "preparing",
            Self::ManifestFetch => "manifest fetch",
            Self::ManifestParse => "manifest parse",
            Self::Planning => "planning",
            Self::Fetching => "fetching",
            Self::Reassembling => "reassembling",
            Self::Transcoding => "transcoding",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("failed to fetch manifest for `{asset_id}`: {source}")]
    ManifestFetch {
        asset_id: String,
        #[source]
        source: ManifestFetchError,
    },

    #[error("failed to parse manifest{}: {source}", saved_note(.diagnostic_path.as_deref()))]
    ManifestParse {
        diagnostic_path: Option<PathBuf>,
        #[source]
        source: ManifestError,
    },

    #[error("failed to plan segments: {0}")]
    Planning(#[from] PlanError),

    #[error("{}", describe_failures(.failures))]
    SegmentFetch { failures: Vec<SegmentFailure> },

    #[error("reassembly failed: {0}")]
    Reassembly(#[from] ReassemblyError),

    #[error("transcoding failed{}: {source}", kept_note(.kept_input.as_deref()))]
    Transcode {
        kept_input: Option<PathBuf>,
        #[source]
        source: TranscodeError,
    },

    #[error("cannot prepare output directory {}: {source}", path.display())]
    OutputDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cancelled during {stage}")]
    Cancelled { stage: Stage },

    #[error("configuration error: {reason}")]
    Configuration { reason: String },
}

impl PipelineError {
    /// The stage in which the error was raised.
    pub fn stage(&self) -> Stage {
        match self {
            Self::ManifestFetch { .. } => Stage::ManifestFetch,
            Self::ManifestParse { .. } => Stage::ManifestParse,
            Self::Planning(_) => Stage::Planning,
            Self::SegmentFetch { .. } => Stage::Fetching,
            Self::Reassembly(_) => Stage::Reassembling,
            Self::Transcode {
                source: TranscodeError::NotFound { .. },
                ..
            } => Stage::Preparing,
            Self::Transcode { .. } => Stage::Transcoding,
            Self::OutputDirectory { .. } | Self::Configuration { .. } => Stage::Preparing,
            Self::Cancelled { stage } => *stage,
        }
    }

    /// Sequence numbers of the segments that could not be fetched.
    pub fn missing_segments(&self) -> Vec<SegmentSequence> {
        match self {
            Self::SegmentFetch { failures } => failures.iter().map(|f| f.sequence).collect(),
            _ => Vec::new(),
        }
    }
}

fn saved_note(path: Option<&Path>) -> String {
    path.map(|p| format!(" (raw manifest saved to {})", p.display()))
        .unwrap_or_default()
}

fn kept_note(path: Option<&Path>) -> String {
    path.map(|p| format!(" (input kept at {})", p.display()))
        .unwrap_or_default()
}

fn describe_failures(failures: &[SegmentFailure]) -> String {
    let sequences = failures
        .iter()
        .map(|f| f.sequence.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    match failures.first() {
        Some(first) => format!(
            "failed to fetch {} segment(s) [{sequences}], first error: {}",
            failures.len(),
            first.error
        ),
        None => "segment fetch failed".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_error_classification() {
        let not_found = SegmentError::http_status(StatusCode::NOT_FOUND, "https://x/1.m4s");
        assert!(not_found.is_not_found());
        assert!(!not_found.is_retryable());

        let unavailable = SegmentError::http_status(StatusCode::SERVICE_UNAVAILABLE, "u");
        assert!(unavailable.is_retryable());
        assert!(!unavailable.is_not_found());

        assert!(SegmentError::http_status(StatusCode::TOO_MANY_REQUESTS, "u").is_retryable());
        assert!(!SegmentError::Cancelled.is_retryable());
    }

    #[test]
    fn test_pipeline_error_stage_and_message() {
        let err = PipelineError::SegmentFetch {
            failures: vec![
                SegmentFailure {
                    sequence: SegmentSequence::Media(4),
                    error: SegmentError::http_status(StatusCode::BAD_GATEWAY, "https://x/4"),
                },
                SegmentFailure {
                    sequence: SegmentSequence::Media(9),
                    error: SegmentError::Cancelled,
                },
            ],
        };
        assert_eq!(err.stage(), Stage::Fetching);
        assert_eq!(
            err.missing_segments(),
            vec![SegmentSequence::Media(4), SegmentSequence::Media(9)]
        );
        let message = err.to_string();
        assert!(message.contains("[4, 9]"), "{message}");
        assert!(message.contains("502"), "{message}");

        let err = PipelineError::Transcode {
            kept_input: None,
            source: TranscodeError::NotFound {
                program: "ffmpeg".to_string(),
            },
        };
        assert_eq!(err.stage(), Stage::Preparing);

        let err = PipelineError::ManifestParse {
            diagnostic_path: Some(PathBuf::from("out/x_manifest.mpd")),
            source: ManifestError::MissingElement { element: "BaseURL" },
        };
        assert_eq!(err.stage(), Stage::ManifestParse);
        assert!(err.to_string().contains("x_manifest.mpd"));
    }
}
