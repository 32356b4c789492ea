use zeroize::Zeroizing;

use super::{P256PublicKey, SharedSecret};
use crate::result::Error;

/// A secure hardware enclave able to hold P-256 key agreement keys.
///
/// The enclave is treated as a trusted oracle. Its private keys never leave it in plaintext; what
/// the host gets is an opaque *representation* that only the same enclave can turn back into a
/// usable key. Implementations must never log or otherwise expose key material.
pub trait EnclaveKeyAgreement: Send + Sync {
    /// The public key type the enclave accepts for key agreement.
    type PublicKey: P256PublicKey;
    /// A usable private key, reconstructed inside the enclave.
    /// Must securely delete any host-side key material when dropped.
    type PrivateKey;

    /// Ask the enclave for a fresh P-256 key agreement private key.
    ///
    /// Must fail with `Error::EnclaveUnavailable` if the platform cannot provide one.
    fn generate(&self) -> Result<Self::PrivateKey, Error>;

    /// Reconstruct a private key from a representation previously returned by `representation`.
    ///
    /// Must fail with `Error::InvalidKeyEncoding` if `representation` is malformed or was not
    /// produced by this enclave.
    fn import(&self, representation: &[u8]) -> Result<Self::PrivateKey, Error>;

    /// The exportable representation of a private key.
    /// Always the same length for a given enclave.
    fn representation(&self, key: &Self::PrivateKey) -> Zeroizing<Vec<u8>>;

    /// The public half of a private key.
    fn public_key(&self, key: &Self::PrivateKey) -> Self::PublicKey;

    /// Perform ECDH between the private key and `peer`, returning the raw ECDH secret.
    ///
    /// The result must be deterministic for a given pair of keys. Fails with
    /// `Error::AgreementFailed` if the enclave rejects the operation.
    fn agree(&self, key: &Self::PrivateKey, peer: &Self::PublicKey) -> Result<SharedSecret, Error>;
}
