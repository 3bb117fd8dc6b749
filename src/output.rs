use crate::params::ParamError;
use log::{error, info, warn};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EcError {
    #[error(transparent)]
    Param(#[from] ParamError),
    #[error("Fatal: {0}")]
    Fatal(String),
    #[error("Aborting: {0} setup error(s) were reported")]
    ErrorsQueued(usize),
}

/// The run's reporting sink.
///
/// Three severities: informational messages and warnings go straight to the
/// log and the run continues; recoverable errors are logged and queued so
/// that setup code can report several problems before `exit_if_errors`
/// aborts; `fatal` aborts immediately, flushing anything queued first.
///
/// One `Output` is owned by the `EvolutionState` and borrowed by components
/// that need it. There is deliberately no global instance.
#[derive(Debug, Default)]
pub struct Output {
    errors: Vec<String>,
}

impl Output {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message(&self, msg: &str) {
        info!("{msg}");
    }

    pub fn warning(&self, msg: &str) {
        warn!("{msg}");
    }

    /// Reports a recoverable error. The run keeps going until someone calls
    /// `exit_if_errors`.
    pub fn error(&mut self, msg: &str) {
        error!("{msg}");
        self.errors.push(msg.to_string());
    }

    /// Reports an unrecoverable error. Any queued errors are flushed to the
    /// log, then the returned `EcError` is handed back for the caller to
    /// propagate with `?`.
    pub fn fatal(&mut self, msg: &str) -> EcError {
        for queued in self.errors.drain(..) {
            error!("(queued) {queued}");
        }
        error!("FATAL: {msg}");
        EcError::Fatal(msg.to_string())
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Aborts if any recoverable errors have been queued since the last
    /// check. Called at the validation barriers during setup.
    pub fn exit_if_errors(&mut self) -> Result<(), EcError> {
        if self.errors.is_empty() {
            return Ok(());
        }
        let count = self.errors.len();
        self.errors.clear();
        Err(EcError::ErrorsQueued(count))
    }
}
