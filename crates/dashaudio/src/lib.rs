// DASH audio acquisition: segment fetching, reassembly and transcoding
pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod pipeline;
pub mod reassembler;
pub mod retry;
pub mod transcoder;

// Export common types for ease of use
pub use api::{CdnManifestSource, ManifestSource};
pub use client::create_client;
pub use config::{FetchConfig, GapPolicy, PipelineConfig, TranscodeConfig};
pub use error::{
    ManifestFetchError, PipelineError, ReassemblyError, SegmentError, Stage, TranscodeError,
};
pub use fetcher::{
    FetchProgress, FetchResult, HttpSegmentDownloader, SegmentDownloader, SegmentFetcher,
};
pub use pipeline::{OutputPaths, Pipeline, PipelineState};
pub use retry::RetryPolicy;
pub use transcoder::Transcoder;

pub use mpd;
