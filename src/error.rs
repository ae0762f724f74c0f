//! Error taxonomy of the fingerprinting engine.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Bad configuration value. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A crawl target that is missing or not a directory.
    #[error("\"{}\" {reason}", .path.display())]
    Path { path: PathBuf, reason: &'static str },

    #[error("I/O error on \"{}\": {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Malformed identity record.
    #[error("malformed record: {0}")]
    Format(String),

    #[error("refusing to overwrite existing file \"{}\"", .0.display())]
    DumpExists(PathBuf),

    #[error("\"{}\" is not a dump file", .0.display())]
    NotADump(PathBuf),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn format(reason: impl Into<String>) -> Self {
        Error::Format(reason.into())
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Configuration(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_error_names_the_problem() {
        let err = Error::format("bad hex");
        assert_eq!(err.to_string(), "malformed record: bad hex");
    }

    #[test]
    fn only_configuration_errors_are_fatal() {
        assert!(Error::Configuration("x".into()).is_fatal());
        assert!(!Error::NotADump(PathBuf::from("/tmp/x")).is_fatal());
        assert!(!Error::format("y").is_fatal());
    }

    #[test]
    fn path_error_names_the_path() {
        let err = Error::Path {
            path: PathBuf::from("/nope"),
            reason: "does not exist",
        };
        assert_eq!(err.to_string(), "\"/nope\" does not exist");
    }
}
