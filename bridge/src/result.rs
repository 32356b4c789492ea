use crate::registry::ObjectKind;

/// An error that can occur when asking the enclave to create or use a key.
/// Every variant except `ContractViolation` is a recoverable cryptographic failure; the caller
/// may retry, fall back, or report it, and no handle was created.
#[derive(Debug, PartialEq, Eq, Clone, Hash, thiserror::Error)]
pub enum Error {
    /// The device or platform cannot provide an enclave-backed P-256 key.
    /// Typical causes are missing secure hardware, running in a simulator, or a policy denial.
    #[error("the platform cannot provide an enclave-backed P-256 key")]
    EnclaveUnavailable,

    /// The bytes passed to import are not a key representation this enclave produced.
    #[error("private key representation is malformed or belongs to another enclave")]
    InvalidKeyEncoding,

    /// The peer public key is not an uncompressed X9.63 P-256 point.
    /// Wrong length, wrong prefix byte and points off the curve all end up here.
    #[error("peer public key is not a valid uncompressed P-256 point")]
    InvalidPeerKey,

    /// The enclave refused to perform the key agreement, e.g. because the key was revoked or
    /// because of a hardware fault.
    #[error("the enclave rejected the key agreement")]
    AgreementFailed,

    /// The registry already holds the configured maximum number of live objects.
    /// This almost always means the caller is leaking handles.
    #[error("handle registry is full ({0} live objects)")]
    RegistryFull(usize),

    /// The caller broke the handle protocol. See `ContractViolation`.
    #[error("contract violation: {0}")]
    ContractViolation(#[from] ContractViolation),
}

/// A misuse of the handle protocol by the caller.
///
/// These are programming errors, not runtime conditions. They are reported so that bindings can
/// surface them during development, but no recovery is meaningful once they occur. Builds with
/// the `fail-fast` feature abort the process instead of returning one of these.
#[derive(Debug, PartialEq, Eq, Clone, Hash, thiserror::Error)]
pub enum ContractViolation {
    /// The handle was never issued by this registry.
    #[error("handle {0:#x} was never issued")]
    UnknownHandle(u64),

    /// The handle was issued but has since been released.
    #[error("handle {0:#x} has already been released")]
    StaleHandle(u64),

    /// The handle refers to a live object of a different kind than the operation expects.
    #[error("handle {handle:#x} refers to a {found:?}, expected a {expected:?}")]
    KindMismatch { handle: u64, expected: ObjectKind, found: ObjectKind },

    /// The destination buffer cannot hold the object's bytes.
    #[error("destination buffer holds {provided} bytes, {required} required")]
    BufferTooSmall { required: usize, provided: usize },

    /// A null pointer was passed across the C ABI where a buffer was required.
    #[error("null pointer passed for a required buffer")]
    NullPointer,
}
