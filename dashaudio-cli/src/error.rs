use dashaudio_engine::PipelineError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{stage} failed: {0}", stage = .0.stage())]
    Pipeline(#[from] PipelineError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Failed to initialise logging: {0}")]
    Logging(#[from] tracing_subscriber::util::TryInitError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use dashaudio_engine::Stage;

    #[test]
    fn test_pipeline_error_names_stage() {
        let err = AppError::from(PipelineError::Cancelled {
            stage: Stage::Fetching,
        });
        assert_eq!(err.to_string(), "fetching failed: cancelled during fetching");
    }
}
