use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeaMeshError {
    /// The requested structure index does not exist in the store
    #[error("Invalid FeaStructure selection {index} ({count} structures available)")]
    InvalidSelection { index: usize, count: usize },

    /// Surface intake produced nothing to mesh
    #[error("No surfaces loaded for the selected structure")]
    EmptyGeometry,

    #[error("Unable to open {path}: {source}")]
    FileOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Input error: {0}")]
    Input(String),

    #[error("Export error: {0}")]
    Export(String),
}

impl FeaMeshError {
    pub fn input(message: impl Into<String>) -> Self {
        FeaMeshError::Input(message.into())
    }

    /// Errors that abort the whole run, as opposed to per-format export failures.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, FeaMeshError::FileOpen { .. } | FeaMeshError::Export(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_selection() {
        let err = FeaMeshError::InvalidSelection { index: 3, count: 1 };
        assert_eq!(
            err.to_string(),
            "Invalid FeaStructure selection 3 (1 structures available)"
        );
        assert!(err.is_fatal());
    }

    #[test]
    fn file_open_is_not_fatal() {
        let err = FeaMeshError::FileOpen {
            path: PathBuf::from("/nope/out.msh"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };
        assert!(!err.is_fatal());
        assert!(err.to_string().starts_with("Unable to open /nope/out.msh"));
    }
}
