use std::path::PathBuf;

use thiserror::Error;

/// Failures loading an assignment configuration.
///
/// Grading itself never fails: problems with a submission end up in the
/// report as failed verdicts.
#[derive(Debug, Error)]
pub enum GradeError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid assignment config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid assignment config: {0}")]
    Invalid(String),
}
