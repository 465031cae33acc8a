use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Crash report '{}' does not exist.", .0.display())]
    CrashReportMissing(PathBuf),

    #[error("Crash report '{}' is not a file. Please select a valid crash report text file.", .0.display())]
    CrashReportNotAFile(PathBuf),

    #[error("Unsupported architecture '{code_type}' declared on line {line}")]
    UnsupportedArchitecture { code_type: String, line: usize },

    #[error("Could not read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Could not write symbolicated report: {0}")]
    Write(#[source] std::io::Error),
}

impl Error {
    /// Errors caused by the crash report path given on the command line.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Error::CrashReportMissing(_) | Error::CrashReportNotAFile(_)
        )
    }
}
