//! Error type shared by every sleep operation.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Unified error type for sleep operations.
///
/// Every variant maps to exactly one errno through [`SleepError::errno`],
/// which doubles as the process exit status. The mapping is an exhaustive
/// match so a new variant without an assigned errno is a compile error.
#[derive(Debug, Error)]
pub enum SleepError {
    /// A kernel interface could not be opened, read, written or queried.
    #[error("failed to {op} `{path}`: {source}")]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The discovered hibernation target cannot hold a resumable image.
    #[error("invalid hibernation target `{path}`: {reason}")]
    InvalidHibernationTarget { path: PathBuf, reason: String },

    /// The sleep configuration is unusable for the requested operation.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The requested sleep verb is disabled by configuration.
    #[error("sleep verb `{0}` is disabled by configuration, refusing")]
    Disabled(String),

    /// Bad command line invocation.
    #[error("{0}")]
    Usage(String),
}

impl SleepError {
    /// Shorthand for an I/O failure on a kernel interface file.
    pub fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }

    /// Returns the errno equivalent of the error.
    pub fn errno(&self) -> i32 {
        match self {
            Self::Io { source, .. } => source.raw_os_error().unwrap_or(libc::EIO),
            Self::InvalidHibernationTarget { .. } => libc::EINVAL,
            Self::InvalidConfiguration(_) => libc::EINVAL,
            Self::Disabled(_) => libc::EACCES,
            Self::Usage(_) => libc::EINVAL,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn errno_mapping() {
        let err = SleepError::io(
            "open",
            "/sys/power/state",
            io::Error::from_raw_os_error(libc::ENOENT),
        );
        assert_eq!(err.errno(), libc::ENOENT);

        assert_eq!(
            SleepError::Disabled("hibernate".to_owned()).errno(),
            libc::EACCES
        );
        assert_eq!(
            SleepError::Usage("missing command".to_owned()).errno(),
            libc::EINVAL
        );
        assert_eq!(
            SleepError::InvalidConfiguration("bad".to_owned()).errno(),
            libc::EINVAL
        );
    }

    #[test]
    fn io_error_without_errno_maps_to_eio() {
        let err = SleepError::io(
            "write",
            "/sys/power/disk",
            io::Error::new(io::ErrorKind::WriteZero, "short write"),
        );
        assert_eq!(err.errno(), libc::EIO);
    }
}
