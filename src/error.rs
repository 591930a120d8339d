use std::path::PathBuf;
use thiserror::Error;

/// Failures opening the activity log
#[derive(Debug, Error)]
pub enum LogFileError {
    #[error("failed to create log directory {path}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to open log file {path}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write start banner to {path}")]
    Banner {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures surfaced to whoever starts the pipeline
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("sampler was lost by a previous run")]
    SamplerUnavailable,
    #[error(transparent)]
    LogFile(#[from] LogFileError),
}
