use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidateError {
    #[error("failed to parse Go source: {0}")]
    ParseError(String),

    #[error("source has no package clause")]
    MissingPackage,

    #[error(
        "unable to find an exported function with signature (string) (string, error){}",
        format_rejections(.rejected)
    )]
    SignatureError { rejected: Vec<Rejection> },

    #[error("{0}")]
    Other(String),
}

/// A function declaration that was considered and skipped, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub function: String,
    pub reason: String,
}

fn format_rejections(rejected: &[Rejection]) -> String {
    rejected
        .iter()
        .map(|r| format!("\n  {}: {}", r.function, r.reason))
        .collect()
}

pub type Result<T> = std::result::Result<T, ValidateError>;
