use thiserror::Error;

/// Unified error type for the reactor library.
#[derive(Debug, Error)]
pub enum ReactorError {
    /// The declared module dependencies form a cycle.
    #[error("dependency cycle detected: {}", cycle.join(" -> "))]
    CycleDetected { cycle: Vec<String> },

    /// Two modules in the same reactor share an identifying coordinate.
    #[error("duplicate module in reactor: {coordinate}")]
    DuplicateModule { coordinate: String },

    /// A lookup referenced a module that is not part of this reactor.
    #[error("unknown module: {coordinate}")]
    UnknownModule { coordinate: String },

    /// Configuration errors, fatal before any module executes.
    #[error("configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    /// Resumption store errors.
    #[error("resumption store operation failed: {operation}")]
    Storage {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Generic internal errors.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl ReactorError {
    /// Create a configuration error for a specific field.
    pub fn configuration<S: Into<String>>(message: S, field: Option<&str>) -> Self {
        Self::Configuration {
            message: message.into(),
            field: field.map(String::from),
        }
    }

    /// Create a storage error with its underlying cause.
    pub fn storage<S: Into<String>, E: std::error::Error + Send + Sync + 'static>(
        operation: S,
        source: E,
    ) -> Self {
        Self::Storage {
            operation: operation.into(),
            source: Box::new(source),
        }
    }

    pub fn unknown_module<S: Into<String>>(coordinate: S) -> Self {
        Self::UnknownModule {
            coordinate: coordinate.into(),
        }
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Result type alias using ReactorError.
pub type Result<T> = std::result::Result<T, ReactorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_includes_context() {
        let err = ReactorError::CycleDetected {
            cycle: vec!["a:b:1".to_string(), "a:c:1".to_string(), "a:b:1".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "dependency cycle detected: a:b:1 -> a:c:1 -> a:b:1"
        );

        let err = ReactorError::configuration("worker count must be at least 1", Some("parallelism"));
        assert!(err.to_string().contains("worker count"));
    }
}
