use thiserror::Error;

/// Main error type for graphnav
#[derive(Error, Debug)]
pub enum GraphnavError {
    /// A named id does not resolve to an Entity node
    #[error("Entity not found: {0}")]
    NotFound(String),

    /// A bound or argument is outside its declared domain
    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    /// The graph read itself failed
    #[error("Graph accessor error: {0}")]
    Accessor(String),

    /// Serialized response exceeds the configured token budget
    #[error("Result too large: ~{estimated} tokens exceeds budget of {limit}")]
    ResultTooLarge { estimated: usize, limit: usize },

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Parse errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// MCP protocol errors
    #[error("MCP protocol error: {0}")]
    McpProtocol(String),
}

impl GraphnavError {
    pub fn invalid(name: &str, reason: impl Into<String>) -> Self {
        GraphnavError::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// Stable code used in tool-level error responses.
    pub fn code(&self) -> &'static str {
        match self {
            GraphnavError::NotFound(_) => "NOT_FOUND",
            GraphnavError::InvalidParameter { .. } => "INVALID_ARGUMENT",
            GraphnavError::ResultTooLarge { .. } => "RESULT_TOO_LARGE",
            GraphnavError::Accessor(_) | GraphnavError::Database(_) | GraphnavError::Io(_) => {
                "ACCESSOR_ERROR"
            }
            GraphnavError::Config(_) | GraphnavError::Parse(_) | GraphnavError::McpProtocol(_) => {
                "INTERNAL_ERROR"
            }
        }
    }
}

/// Convenient Result type using GraphnavError
pub type Result<T> = std::result::Result<T, GraphnavError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GraphnavError::Config("Test error".to_string());
        assert!(err.to_string().contains("Configuration error"));
        assert!(err.to_string().contains("Test error"));
    }

    #[test]
    fn test_not_found_names_id() {
        let err = GraphnavError::NotFound("node-42".to_string());
        assert!(err.to_string().contains("node-42"));
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[test]
    fn test_invalid_parameter_names_parameter() {
        let err = GraphnavError::invalid("max_depth", "must be at least 1");
        let text = err.to_string();
        assert!(text.contains("max_depth"));
        assert!(text.contains("at least 1"));
        assert_eq!(err.code(), "INVALID_ARGUMENT");
    }

    #[test]
    fn test_error_from_rusqlite() {
        let rusqlite_err = rusqlite::Error::InvalidQuery;
        let err: GraphnavError = rusqlite_err.into();
        assert!(matches!(err, GraphnavError::Database(_)));
        assert_eq!(err.code(), "ACCESSOR_ERROR");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: GraphnavError = io_err.into();
        assert!(matches!(err, GraphnavError::Io(_)));
    }
}
