use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::warn;

use crate::retry::RetryPolicy;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/142.0.0.0 Safari/537.36";

/// Number of segment downloads allowed in flight at once.
pub const DEFAULT_CONCURRENCY: usize = 15;

/// Origin of the manifest API.
pub const DEFAULT_API_ORIGIN: &str = "https://cdn.qstv.on.epicgames.com/";

/// What to do when some media segments cannot be fetched.
///
/// The manifest's declared duration does not prove that every computed
/// segment number exists on the server, so the last few numbers may 404.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum GapPolicy {
    /// Tolerate 404/410 failures that form a contiguous run at the end of the
    /// media list. Any other failure aborts the run.
    #[default]
    TolerateTrailing,
    /// Any failed segment aborts the run; no new downloads are started after
    /// the first failure.
    Strict,
}

/// Configurable options for segment fetching
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Maximum simultaneous segment downloads, must be > 0
    pub concurrency: usize,

    /// Overall timeout per request, zero disables it
    pub timeout: Duration,

    /// Connection timeout (time to establish initial connection)
    pub connect_timeout: Duration,

    /// Read timeout (maximum time between receiving data chunks)
    pub read_timeout: Duration,

    /// Whether to follow redirects
    pub follow_redirects: bool,

    /// User agent string
    pub user_agent: String,

    /// Extra headers sent to the manifest API only
    pub headers: HeaderMap,

    /// Per-request retry behaviour; no retries by default
    pub retry: RetryPolicy,

    pub gap_policy: GapPolicy,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            timeout: Duration::from_secs(0),
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(30),
            follow_redirects: true,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            headers: HeaderMap::new(),
            retry: RetryPolicy::default(),
            gap_policy: GapPolicy::default(),
        }
    }
}

impl FetchConfig {
    pub fn builder() -> FetchConfigBuilder {
        FetchConfigBuilder::new()
    }
}

/// Builder for [`FetchConfig`].
#[derive(Debug, Default)]
pub struct FetchConfigBuilder {
    config: FetchConfig,
}

impl FetchConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.config.concurrency = concurrency;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    pub fn with_follow_redirects(mut self, follow: bool) -> Self {
        self.config.follow_redirects = follow;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Add a header; invalid names or values are logged and skipped.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.config.headers.insert(name, value);
            }
            _ => warn!(header = %name, "Ignoring invalid HTTP header"),
        }
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.config.headers.extend(headers);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.config.retry.max_retries = max_retries;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    pub fn with_gap_policy(mut self, policy: GapPolicy) -> Self {
        self.config.gap_policy = policy;
        self
    }

    pub fn build(self) -> FetchConfig {
        self.config
    }
}

/// Settings for the external transcoder
#[derive(Debug, Clone)]
pub struct TranscodeConfig {
    /// Executable name or path
    pub program: String,
    /// Value for `-acodec`
    pub codec: String,
    /// Value for `-ar`, in Hz
    pub sample_rate: u32,
    /// File name of the final artifact, inside the per-asset directory
    pub output_file_name: String,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            program: std::env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string()),
            codec: "libopus".to_string(),
            sample_rate: 48_000,
            output_file_name: "preview.ogg".to_string(),
        }
    }
}

/// Configuration for one pipeline run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory holding transient segments and the final artifact
    pub output_dir: PathBuf,

    /// Origin of the manifest API, the asset id is appended to it
    pub api_origin: String,

    pub fetch: FetchConfig,

    pub transcode: TranscodeConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("out"),
            api_origin: DEFAULT_API_ORIGIN.to_string(),
            fetch: FetchConfig::default(),
            transcode: TranscodeConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FetchConfig::default();
        assert_eq!(config.concurrency, 15);
        assert_eq!(config.retry.max_retries, 0);
        assert_eq!(config.gap_policy, GapPolicy::TolerateTrailing);

        let transcode = TranscodeConfig {
            program: "ffmpeg".to_string(),
            ..TranscodeConfig::default()
        };
        assert_eq!(transcode.codec, "libopus");
        assert_eq!(transcode.sample_rate, 48_000);
    }

    #[test]
    fn test_builder() {
        let config = FetchConfig::builder()
            .with_concurrency(4)
            .with_timeout(Duration::from_secs(10))
            .with_header("authorization", "Bearer abc")
            .with_header("bad header", "x")
            .with_max_retries(2)
            .with_gap_policy(GapPolicy::Strict)
            .build();
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.headers.len(), 1);
        assert_eq!(config.headers["authorization"], "Bearer abc");
        assert_eq!(config.retry.max_retries, 2);
        assert_eq!(config.gap_policy, GapPolicy::Strict);
    }
}
