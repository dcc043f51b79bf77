use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;

/// How an injected fault manifests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultType {
    /// An error the backoff retries.
    Transient,
    /// An error that aborts the cycle immediately.
    Permanent,
    Panic,
}

/// A fault injected into the calls of one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fault {
    pub fault_type: FaultType,
    /// Number of calls that fail before the operation recovers, `None` to fail forever.
    pub times: Option<usize>,
}

impl Fault {
    pub fn always(fault_type: FaultType) -> Self {
        Self {
            fault_type,
            times: None,
        }
    }

    pub fn times(fault_type: FaultType, times: usize) -> Self {
        Self {
            fault_type,
            times: Some(times),
        }
    }
}

/// A [`Fault`] together with the number of calls it already failed.
#[derive(Debug, Clone)]
pub(crate) struct ArmedFault {
    fault: Option<Fault>,
    fired: Arc<AtomicUsize>,
}

impl ArmedFault {
    pub(crate) fn new(fault: Option<Fault>) -> Self {
        Self {
            fault,
            fired: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of calls failed so far.
    pub(crate) fn fired(&self) -> usize {
        self.fired.load(Ordering::SeqCst)
    }

    /// Fails the current call of `operation` if the fault is still active.
    ///
    /// `transient_kind` is the error kind raised for [`FaultType::Transient`].
    pub(crate) fn fire(&self, operation: &str, transient_kind: ErrorKind) -> EtlResult<()> {
        let Some(fault) = self.fault else {
            return Ok(());
        };

        let fired = self.fired.fetch_add(1, Ordering::SeqCst);
        if fault.times.is_some_and(|times| fired >= times) {
            self.fired.fetch_sub(1, Ordering::SeqCst);
            return Ok(());
        }

        match fault.fault_type {
            FaultType::Transient => Err(etl_error!(
                transient_kind,
                "Injected transient fault",
                format!("Operation '{operation}' failed")
            )),
            FaultType::Permanent => Err(etl_error!(
                ErrorKind::InvalidData,
                "Injected permanent fault",
                format!("Operation '{operation}' failed")
            )),
            FaultType::Panic => panic!("injected panic in operation '{operation}'"),
        }
    }
}
