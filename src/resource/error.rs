use std::fmt;

use super::types::Pid;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid container id: {0}")]
    InvalidContainerID(String),

    #[error("invalid pod id: {0}")]
    InvalidPodID(String),

    #[error("invalid vm id: {0}")]
    InvalidVmID(String),

    #[error("failed to enumerate processes: {0}")]
    ProcTable(#[source] std::io::Error),

    #[error("failed to read process {pid}: {source}")]
    ProcRead {
        pid: Pid,
        #[source]
        source: std::io::Error,
    },

    #[error("container lookup failed for process {pid}: {source}")]
    ContainerLookup {
        pid: Pid,
        #[source]
        source: std::io::Error,
    },

    #[error("vm lookup failed for process {pid}: {source}")]
    VmLookup {
        pid: Pid,
        #[source]
        source: std::io::Error,
    },

    #[error("classification task for process {0} was aborted")]
    ClassifyAborted(Pid),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Accumulates non-fatal errors over one refresh cycle.
///
/// A refresh processes every readable process even when some fail; the
/// failures are collected here and surfaced together once the cycle is done.
#[derive(Debug, Default)]
pub struct ErrorList(Vec<Error>);

impl ErrorList {
    pub fn push(&mut self, err: Error) {
        self.0.push(err);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn errors(&self) -> &[Error] {
        &self.0
    }

    /// `Ok(())` if no errors were recorded, `Err(self)` otherwise.
    pub fn into_result(self) -> std::result::Result<(), ErrorList> {
        if self.0.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error(s): ", self.0.len())?;
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorList {}
