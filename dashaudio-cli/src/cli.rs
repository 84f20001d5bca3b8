use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use dashaudio_engine::config::{DEFAULT_API_ORIGIN, DEFAULT_CONCURRENCY};
use dashaudio_engine::{FetchConfig, GapPolicy, PipelineConfig, TranscodeConfig};

use crate::error::AppError;
use crate::params::parse_headers;

#[derive(Parser, Debug)]
#[command(name = "dashaudio", author, version, about = "MPEG-DASH audio downloader", long_about = None)]
pub struct Args {
    /// Asset id of the playlist to download
    #[arg(long)]
    pub pid: String,

    /// Output directory
    #[arg(long, default_value = "out")]
    pub out: PathBuf,

    /// Maximum number of segment downloads in flight
    #[arg(short = 'c', long, default_value_t = DEFAULT_CONCURRENCY, value_parser = parse_concurrency)]
    pub concurrency: usize,

    /// Retries per segment on server errors and timeouts
    #[arg(long, default_value_t = 0)]
    pub retries: u32,

    /// How to handle media segments that cannot be fetched
    #[arg(long, value_enum, default_value_t = GapPolicy::TolerateTrailing)]
    pub gap_policy: GapPolicy,

    /// Origin of the manifest API
    #[arg(long, default_value = DEFAULT_API_ORIGIN)]
    pub api_origin: String,

    /// Extra HTTP header sent to the manifest API, can be repeated
    #[arg(short = 'H', long = "header", value_name = "KEY=VALUE")]
    pub headers: Vec<String>,

    /// ffmpeg executable name or path
    #[arg(long, env = "FFMPEG_PATH", default_value = "ffmpeg")]
    pub ffmpeg: String,

    /// Per-request timeout in seconds, 0 disables it
    #[arg(long, default_value_t = 0)]
    pub timeout: u64,

    /// Hide the progress bar
    #[arg(long)]
    pub no_progress: bool,

    /// Enable debug logging
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Map the command line onto the engine configuration.
    pub fn pipeline_config(&self) -> Result<PipelineConfig, AppError> {
        let mut fetch = FetchConfig::builder()
            .with_concurrency(self.concurrency)
            .with_timeout(Duration::from_secs(self.timeout))
            .with_max_retries(self.retries)
            .with_gap_policy(self.gap_policy);
        for (name, value) in parse_headers(&self.headers)? {
            fetch = fetch.with_header(&name, &value);
        }

        Ok(PipelineConfig {
            output_dir: self.out.clone(),
            api_origin: self.api_origin.clone(),
            fetch: fetch.build(),
            transcode: TranscodeConfig {
                program: self.ffmpeg.clone(),
                ..TranscodeConfig::default()
            },
        })
    }
}

fn parse_concurrency(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}
