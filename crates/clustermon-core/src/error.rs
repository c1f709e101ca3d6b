//! Error types for clustermon-core
//!
//! Most failures in a monitored run are logged and degraded rather than
//! returned; each error therefore carries a short [`hint`](Error::hint)
//! that goes into the log line as the `hint` field.

use thiserror::Error;

/// Result type alias using the library's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for clustermon-core
#[derive(Error, Debug)]
pub enum Error {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("cluster error: {0}")]
    Cluster(#[from] ClusterError),

    #[error("classifier error: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("session error: {0}")]
    Session(#[from] SessionError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Watch task failures, closed channels, shutdown timeouts
    #[error("runtime error: {0}")]
    Runtime(String),
}

impl Error {
    /// One-line operator hint for log output
    #[must_use]
    pub fn hint(&self) -> &'static str {
        match self {
            Self::Config(err) => err.hint(),
            Self::Cluster(err) => err.hint(),
            Self::Classifier(err) => err.hint(),
            Self::Session(err) => err.hint(),
            Self::Io(_) => "check that the artifact directory exists and is writable",
            Self::Json(_) => "interval entries need level, locator, message, from and to",
            Self::Runtime(_) => {
                "a watch task did not stop cleanly; intervals recorded after shutdown are discarded"
            }
        }
    }
}

/// Errors talking to the cluster API
#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("{kind} {name} not found")]
    NotFound { kind: String, name: String },

    /// Connection reset, timeout, throttling
    #[error("cluster request failed: {0}")]
    Unavailable(String),

    #[error("unexpected cluster response: {0}")]
    Decode(String),
}

impl ClusterError {
    #[must_use]
    pub fn hint(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "object absent on this cluster; dependent checks use defaults",
            Self::Unavailable(_) => "verify the API server is reachable, or run without a client",
            Self::Decode(_) => "check that the API server version is supported",
        }
    }

    /// A missing object degrades to a zero value instead of failing the run.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// The same request may succeed later.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Errors raised while classifying repeated events
#[derive(Error, Debug)]
pub enum ClassifierError {
    /// A named allowance predicate could not reach a decision
    #[error("predicate {predicate} failed: {reason}")]
    Predicate {
        predicate: &'static str,
        reason: String,
    },
}

impl ClassifierError {
    #[must_use]
    pub fn hint(&self) -> &'static str {
        match self {
            Self::Predicate { .. } => "the predicate pattern no longer matches the message shape",
        }
    }
}

/// Monitor session lifecycle errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SessionError {
    #[error("monitor already started")]
    AlreadyStarted,

    #[error("monitor not started")]
    NotStarted,

    #[error("monitor already ended")]
    AlreadyEnded,
}

impl SessionError {
    #[must_use]
    pub fn hint(&self) -> &'static str {
        match self {
            Self::AlreadyStarted => "create a new session for each run",
            Self::NotStarted => "call start() before end()",
            Self::AlreadyEnded => "read results from the ended session",
        }
    }
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(String),

    #[error("failed to read config file {0}: {1}")]
    ReadFailed(String, String),

    #[error("failed to parse config: {0}")]
    ParseFailed(String),

    #[error("validation error: {0}")]
    ValidationError(String),
}

impl ConfigError {
    #[must_use]
    pub fn hint(&self) -> &'static str {
        match self {
            Self::FileNotFound(_) => "verify the path, or omit the file to run with defaults",
            Self::ReadFailed(..) => "check the config file permissions",
            Self::ParseFailed(_) => "fix the TOML syntax",
            Self::ValidationError(_) => "fix the named field and retry",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_error_has_a_hint() {
        let json_err = serde_json::from_str::<serde_json::Value>("").unwrap_err();
        let errors = vec![
            Error::Config(ConfigError::FileNotFound("clustermon.toml".to_string())),
            Error::Config(ConfigError::ReadFailed("a".to_string(), "b".to_string())),
            Error::Config(ConfigError::ParseFailed("bad".to_string())),
            Error::Config(ConfigError::ValidationError("bad".to_string())),
            Error::Cluster(ClusterError::NotFound {
                kind: "etcd".to_string(),
                name: "cluster".to_string(),
            }),
            Error::Cluster(ClusterError::Unavailable("reset".to_string())),
            Error::Cluster(ClusterError::Decode("garbage".to_string())),
            Error::Classifier(ClassifierError::Predicate {
                predicate: "console-readiness-during-install",
                reason: "empty group".to_string(),
            }),
            Error::Session(SessionError::AlreadyStarted),
            Error::Session(SessionError::NotStarted),
            Error::Session(SessionError::AlreadyEnded),
            Error::Io(std::io::Error::other("io")),
            Error::Json(json_err),
            Error::Runtime("join".to_string()),
        ];

        for error in errors {
            assert!(!error.hint().is_empty(), "empty hint for {error:?}");
        }
    }

    #[test]
    fn nested_errors_forward_their_hint() {
        let err = Error::from(SessionError::NotStarted);
        assert_eq!(err.hint(), SessionError::NotStarted.hint());
        assert_eq!(err.to_string(), "session error: monitor not started");
    }

    #[test]
    fn cluster_error_classification() {
        let missing = ClusterError::NotFound {
            kind: "etcd".to_string(),
            name: "cluster".to_string(),
        };
        assert!(missing.is_not_found());
        assert!(!missing.is_transient());
        assert!(ClusterError::Unavailable("timeout".to_string()).is_transient());
        assert!(!ClusterError::Decode("bad".to_string()).is_transient());
    }
}
