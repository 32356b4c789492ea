use zeroize::Zeroizing;

use crate::crypto::*;
use crate::result::Error;

use super::CrateP256PublicKey;

/// The enclave of a platform that has none: no secure hardware, a simulator, or a policy that
/// forbids its use. Every key operation fails with `Error::EnclaveUnavailable`.
///
/// Software-only operations such as `Bridge::random_public_key` keep working on such a platform.
#[derive(Default)]
pub struct UnavailableEnclave;

/// No value of this type can exist.
pub enum NoPrivateKey {}

impl EnclaveKeyAgreement for UnavailableEnclave {
    type PublicKey = CrateP256PublicKey;
    type PrivateKey = NoPrivateKey;

    fn generate(&self) -> Result<NoPrivateKey, Error> {
        Err(Error::EnclaveUnavailable)
    }

    fn import(&self, _: &[u8]) -> Result<NoPrivateKey, Error> {
        Err(Error::EnclaveUnavailable)
    }

    fn representation(&self, key: &NoPrivateKey) -> Zeroizing<Vec<u8>> {
        match *key {}
    }

    fn public_key(&self, key: &NoPrivateKey) -> CrateP256PublicKey {
        match *key {}
    }

    fn agree(&self, key: &NoPrivateKey, _: &CrateP256PublicKey) -> Result<SharedSecret, Error> {
        match *key {}
    }
}
