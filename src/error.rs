use thiserror::Error;

/// Errors crossing the controller boundary.
///
/// Configuration variants are durable: they are reported as a non-ready
/// condition and only go away when the user edits the resource.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("conflicting update to {kind} {key}, object will be re-read")]
    Conflict { kind: &'static str, key: String },

    #[error("{kind} {key} not found")]
    NotFound { kind: &'static str, key: String },

    #[error("object is missing {0}")]
    MissingObjectKey(&'static str),

    #[error("invalid image '{image}': {reason}")]
    InvalidImage { image: String, reason: String },

    #[error("invalid duration '{0}'")]
    InvalidInterval(String),

    #[error("invalid policy: {0}")]
    InvalidPolicy(String),

    #[error("invalid semver range '{range}': {source}")]
    InvalidRange {
        range: String,
        #[source]
        source: semver::Error,
    },

    #[error("invalid regular expression pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("finalizer error: {0}")]
    Finalizer(#[source] Box<kube::runtime::finalizer::Error<Error>>),
}

impl Error {
    /// Whether the error is caused by the resource's own spec.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::InvalidImage { .. }
                | Error::InvalidInterval(_)
                | Error::InvalidPolicy(_)
                | Error::InvalidRange { .. }
                | Error::InvalidPattern { .. }
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_pattern_message() {
        let source = regex::Regex::new("^test-(.*").unwrap_err();
        let err = Error::InvalidPattern {
            pattern: "^test-(.*".to_string(),
            source,
        };

        let message = err.to_string();
        assert!(message.contains("invalid regular expression pattern"));
        assert!(message.contains("^test-(.*"));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_conflict_is_not_configuration() {
        let err = Error::Conflict {
            kind: "ImagePolicy",
            key: "default/app".to_string(),
        };
        assert!(!err.is_configuration());
    }
}
