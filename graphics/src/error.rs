//! Graphics error types.

use std::fmt;

/// Errors that can occur in the graphics system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphicsError {
    /// Failed to initialize the graphics system.
    InitializationFailed(String),
    /// Failed to create a resource.
    ResourceCreationFailed(String),
    /// A requested feature is not supported.
    FeatureNotSupported(String),
    /// Out of GPU memory.
    OutOfMemory,
    /// The GPU device was lost.
    DeviceLost,
    /// An invalid parameter was provided.
    InvalidParameter(String),
    /// An internal error occurred.
    Internal(String),
    /// An aliased texture does not fit inside its host allocation.
    AliasTooLarge {
        alias: String,
        alias_bytes: u64,
        host: String,
        host_bytes: u64,
    },
    /// An alias handle outlived the acquisition it came from.
    StaleAliasHandle {
        resource: String,
        handle_generation: u64,
        current_generation: u64,
    },
    /// The frame's dependency graph contains a cycle.
    CyclicDependency(Vec<String>),
}

impl fmt::Display for GraphicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InitializationFailed(msg) => write!(f, "initialization failed: {msg}"),
            Self::ResourceCreationFailed(msg) => write!(f, "resource creation failed: {msg}"),
            Self::FeatureNotSupported(msg) => write!(f, "feature not supported: {msg}"),
            Self::OutOfMemory => write!(f, "out of GPU memory"),
            Self::DeviceLost => write!(f, "GPU device lost"),
            Self::InvalidParameter(msg) => write!(f, "invalid parameter: {msg}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
            Self::AliasTooLarge {
                alias,
                alias_bytes,
                host,
                host_bytes,
            } => write!(
                f,
                "alias {alias} needs {alias_bytes} bytes but host {host} only has {host_bytes}"
            ),
            Self::StaleAliasHandle {
                resource,
                handle_generation,
                current_generation,
            } => write!(
                f,
                "stale alias handle for {resource}: generation {handle_generation}, current {current_generation}"
            ),
            Self::CyclicDependency(involved) => {
                write!(f, "cyclic frame dependency involving: {}", involved.join(", "))
            }
        }
    }
}

impl std::error::Error for GraphicsError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GraphicsError::OutOfMemory;
        assert_eq!(err.to_string(), "out of GPU memory");

        let err = GraphicsError::InitializationFailed("no GPU found".to_string());
        assert_eq!(err.to_string(), "initialization failed: no GPU found");
    }

    #[test]
    fn test_alias_error_display() {
        let err = GraphicsError::AliasTooLarge {
            alias: "rtPostprocess".to_string(),
            alias_bytes: 16,
            host: "rtPrimitiveID".to_string(),
            host_bytes: 8,
        };
        assert_eq!(
            err.to_string(),
            "alias rtPostprocess needs 16 bytes but host rtPrimitiveID only has 8"
        );

        let err = GraphicsError::CyclicDependency(vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), "cyclic frame dependency involving: a, b");
    }
}
