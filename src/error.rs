use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MrError {
    #[error("Not found: {location}")]
    NotFound { location: String },

    #[error("Error reading {location}: {source}")]
    Read {
        location: String,
        #[source]
        source: io::Error,
    },

    #[error("Error writing {location}: {source}")]
    Write {
        location: String,
        #[source]
        source: io::Error,
    },

    /// A key or value the line format cannot carry.
    #[error("Unencodable record for {location}: {record:?}")]
    Unencodable { location: String, record: String },

    /// Misuse of the coordinator. Never raised by a correct worker loop.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Reduce function failed for key {key:?}: {source}")]
    Application {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Worker panicked: {0}")]
    WorkerPanicked(String),
}

impl MrError {
    /// Maps a failed read, keeping `NotFound` distinct from other I/O failures.
    pub fn read(location: impl Into<String>, source: io::Error) -> Self {
        let location = location.into();
        if source.kind() == io::ErrorKind::NotFound {
            MrError::NotFound { location }
        } else {
            MrError::Read { location, source }
        }
    }

    pub fn write(location: impl Into<String>, source: io::Error) -> Self {
        MrError::Write {
            location: location.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, MrError>;
