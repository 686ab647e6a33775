use thiserror::Error;

/// 管道错误类型
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("manifest parse error: {0}")]
    Parse(String),
    #[error("download failed for {url}: {reason}")]
    Download { url: String, reason: String },
    #[error("decryption failed: {0}")]
    Decryption(String),
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl PipelineError {
    pub fn download(url: impl Into<String>, reason: impl ToString) -> Self {
        PipelineError::Download {
            url: url.into(),
            reason: reason.to_string(),
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
