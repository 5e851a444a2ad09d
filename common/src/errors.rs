pub use anyhow::{anyhow, bail, format_err, Context, Error, Result};
pub use log::{debug, error, info, trace, warn};

/// Everything that can go wrong between accepting a reference and having
/// an archive for every target. The `Display` output is what ends up as the
/// diagnostic of a failed build event.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("Invalid reference: {0}")]
    Validation(String),
    #[error("Failed to reset workspace: {0}")]
    Workspace(String),
    #[error("Failed to fetch source archive: {0}")]
    Fetch(String),
    #[error("Failed to extract source archive: {0}")]
    Extract(String),
    #[error("Unexpected source layout: {0}")]
    Layout(String),
    #[error("Failed to check out reference: {0}")]
    Checkout(String),
    #[error("Failed to get dependencies: {0}")]
    Dependency(String),
    #[error("Failed to build target: {0}")]
    Compile(String),
    #[error("Failed to package target: {0}")]
    Package(String),
    #[error("Failed to compress archive: {0}")]
    Archive(String),
    #[error("Failed to persist build event: {0}")]
    Persistence(String),
    #[error("Build queue is closed")]
    QueueClosed,
    #[error("Build panicked: {0}")]
    Panicked(String),
}

impl BuildError {
    pub fn is_validation(&self) -> bool {
        matches!(self, BuildError::Validation(_))
    }

    /// Prefix the detail with what was being worked on, eg. the target. The
    /// kind of error stays the same.
    pub fn within<D: std::fmt::Display>(self, what: D) -> BuildError {
        let prefix = |detail: String| format!("{}: {}", what, detail);
        match self {
            BuildError::Validation(s) => BuildError::Validation(prefix(s)),
            BuildError::Workspace(s) => BuildError::Workspace(prefix(s)),
            BuildError::Fetch(s) => BuildError::Fetch(prefix(s)),
            BuildError::Extract(s) => BuildError::Extract(prefix(s)),
            BuildError::Layout(s) => BuildError::Layout(prefix(s)),
            BuildError::Checkout(s) => BuildError::Checkout(prefix(s)),
            BuildError::Dependency(s) => BuildError::Dependency(prefix(s)),
            BuildError::Compile(s) => BuildError::Compile(prefix(s)),
            BuildError::Package(s) => BuildError::Package(prefix(s)),
            BuildError::Archive(s) => BuildError::Archive(prefix(s)),
            BuildError::Persistence(s) => BuildError::Persistence(prefix(s)),
            BuildError::Panicked(s) => BuildError::Panicked(prefix(s)),
            BuildError::QueueClosed => BuildError::QueueClosed,
        }
    }
}

pub trait ResultExt<T> {
    /// Classify any error as one of the build error kinds, keeping the full
    /// error chain as detail.
    fn or_build_err(self, kind: fn(String) -> BuildError) -> std::result::Result<T, BuildError>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn or_build_err(self, kind: fn(String) -> BuildError) -> std::result::Result<T, BuildError> {
        self.map_err(|err| kind(format!("{:#}", err.into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn classify_io_error() {
        let res: std::result::Result<(), io::Error> =
            Err(io::Error::new(io::ErrorKind::NotFound, "no such file"));
        let err = res.or_build_err(BuildError::Package).unwrap_err();
        assert_eq!(err, BuildError::Package("no such file".to_string()));
    }

    #[test]
    fn classify_keeps_context_chain() {
        let res: Result<()> = Err(anyhow!("connection refused")).context("Failed to download");
        let err = res.or_build_err(BuildError::Fetch).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to fetch source archive: Failed to download: connection refused"
        );
    }

    #[test]
    fn within_keeps_the_kind() {
        let err = BuildError::Compile("undefined: run".into()).within("linux arm 7");
        assert_eq!(err, BuildError::Compile("linux arm 7: undefined: run".into()));
        assert_eq!(
            err.to_string(),
            "Failed to build target: linux arm 7: undefined: run"
        );
        assert_eq!(BuildError::QueueClosed.within("x"), BuildError::QueueClosed);
    }

    #[test]
    fn validation_is_validation() {
        assert!(BuildError::Validation("empty".into()).is_validation());
        assert!(!BuildError::Compile("boom".into()).is_validation());
    }
}
