use crate::handle_table::ObjectHandle;
use crate::registry::ObjectKind;
use crate::result::{ContractViolation, Error};

/// Bridge events that might be interesting to log or aggregate into metrics.
///
/// Events only ever carry handles, kinds and lengths. Key material and shared secrets never
/// appear in an event.
#[allow(missing_docs)]
#[derive(Debug)]
pub enum LogEvent<'a> {
    KeyGenerated(ObjectHandle),
    KeyImported(ObjectHandle),
    SharedSecretComputed { key: ObjectHandle, secret: ObjectHandle },
    RandomPublicKeyGenerated,
    /// `(handle, bytes_written)`
    ObjectCopied(ObjectHandle, usize),
    ObjectReleased(ObjectHandle, ObjectKind),
    CryptoFailure(&'a Error),
    ContractViolation(&'a ContractViolation),
}

impl<'a> LogEvent<'a> {
    /// Forward this event to the `tracing` subscriber installed by the application.
    pub fn emit(&self) {
        match self {
            Self::ContractViolation(v) => tracing::error!(violation = %v, "handle contract violated"),
            Self::CryptoFailure(e) => tracing::warn!(error = %e, "enclave operation failed"),
            Self::ObjectCopied(..) | Self::RandomPublicKeyGenerated => tracing::trace!(event = ?self),
            _ => tracing::debug!(event = ?self),
        }
    }
}

/// Macro to turn off logging at compile time.
macro_rules! log {
    ($event:expr) => {
        #[cfg(feature = "logging")]
        $event.emit();
    };
}
pub(crate) use log;
