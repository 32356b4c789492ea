use hmac::{Hmac, Mac};
use p256::{ecdh, SecretKey};
use rand_core::{OsRng, RngCore};
use sha2::Sha256;
use zeroize::{Zeroize, Zeroizing};

use crate::crypto::*;
use crate::result::Error;

use super::CrateP256PublicKey;

const SEALED_KEY_VERSION: u8 = 1;
const SCALAR_SIZE: usize = 32;
const SEAL_TAG_SIZE: usize = 32;
/// The size of the key representation produced by `SoftwareEnclave`.
pub const SEALED_KEY_SIZE: usize = 1 + SCALAR_SIZE + SEAL_TAG_SIZE;
/// The size of the key that binds sealed keys to one `SoftwareEnclave`.
pub const SEALING_KEY_SIZE: usize = 32;

/// An enclave emulated in software with the p256 crate, for hosts without secure hardware and
/// for tests.
///
/// Keys are exported as sealed blobs: `version || scalar || HMAC-SHA256(sealing_key, version || scalar)`.
/// The tag binds a blob to the enclave instance that produced it, so a corrupted blob, or one from
/// a different instance, fails to import just like a hardware key blob from another device would.
///
/// **The scalar is not encrypted.** This type offers none of the confidentiality of a real secure
/// element and must not be used where that matters.
pub struct SoftwareEnclave {
    sealing_key: Zeroizing<[u8; SEALING_KEY_SIZE]>,
}

/// A private key held by a `SoftwareEnclave`. The scalar is erased on drop.
pub struct SoftwarePrivateKey(SecretKey);

impl SoftwareEnclave {
    /// Create an enclave with a random sealing key.
    /// Keys it exports can only be imported back into this instance.
    pub fn new() -> Self {
        let mut sealing_key = Zeroizing::new([0u8; SEALING_KEY_SIZE]);
        OsRng.fill_bytes(&mut sealing_key[..]);
        Self { sealing_key }
    }

    /// Create an enclave with a known sealing key, so that keys survive across instances.
    pub fn with_sealing_key(sealing_key: [u8; SEALING_KEY_SIZE]) -> Self {
        Self { sealing_key: Zeroizing::new(sealing_key) }
    }

    fn seal(&self, body: &[u8]) -> Hmac<Sha256> {
        // HMAC accepts keys of any length.
        let mut hm = <Hmac<Sha256> as Mac>::new_from_slice(&self.sealing_key[..]).unwrap_or_else(|_| unreachable!());
        hm.update(body);
        hm
    }
}

impl Default for SoftwareEnclave {
    fn default() -> Self {
        Self::new()
    }
}

impl EnclaveKeyAgreement for SoftwareEnclave {
    type PublicKey = CrateP256PublicKey;
    type PrivateKey = SoftwarePrivateKey;

    fn generate(&self) -> Result<SoftwarePrivateKey, Error> {
        Ok(SoftwarePrivateKey(SecretKey::random(&mut OsRng)))
    }

    fn import(&self, representation: &[u8]) -> Result<SoftwarePrivateKey, Error> {
        if representation.len() != SEALED_KEY_SIZE || representation[0] != SEALED_KEY_VERSION {
            return Err(Error::InvalidKeyEncoding);
        }
        let (body, tag) = representation.split_at(1 + SCALAR_SIZE);
        self.seal(body).verify_slice(tag).map_err(|_| Error::InvalidKeyEncoding)?;
        SecretKey::from_slice(&body[1..]).map(SoftwarePrivateKey).map_err(|_| Error::InvalidKeyEncoding)
    }

    fn representation(&self, key: &SoftwarePrivateKey) -> Zeroizing<Vec<u8>> {
        let mut out = Zeroizing::new(Vec::with_capacity(SEALED_KEY_SIZE));
        let mut scalar = key.0.to_bytes();
        out.push(SEALED_KEY_VERSION);
        out.extend_from_slice(&scalar);
        scalar.zeroize();
        let tag = self.seal(&out).finalize().into_bytes();
        out.extend_from_slice(&tag);
        out
    }

    fn public_key(&self, key: &SoftwarePrivateKey) -> CrateP256PublicKey {
        key.0.public_key()
    }

    fn agree(&self, key: &SoftwarePrivateKey, peer: &CrateP256PublicKey) -> Result<SharedSecret, Error> {
        let shared = ecdh::diffie_hellman(key.0.to_nonzero_scalar(), peer.as_affine());
        let mut out = Zeroizing::new([0u8; P256_ECDH_SHARED_SECRET_SIZE]);
        out.copy_from_slice(shared.raw_secret_bytes());
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn representation_round_trip() {
        let enclave = SoftwareEnclave::new();
        let key = enclave.generate().unwrap();
        let repr = enclave.representation(&key);
        assert_eq!(repr.len(), SEALED_KEY_SIZE);
        let imported = enclave.import(&repr).unwrap();
        assert_eq!(enclave.representation(&imported).as_slice(), repr.as_slice());
    }

    #[test]
    fn tampered_blob_is_rejected() {
        let enclave = SoftwareEnclave::new();
        let key = enclave.generate().unwrap();
        let mut repr = enclave.representation(&key);
        repr[5] ^= 1;
        assert_eq!(enclave.import(&repr).err(), Some(Error::InvalidKeyEncoding));
        assert_eq!(enclave.import(&repr[..10]).err(), Some(Error::InvalidKeyEncoding));
        assert_eq!(enclave.import(&[]).err(), Some(Error::InvalidKeyEncoding));
    }

    #[test]
    fn blob_is_bound_to_its_enclave() {
        let a = SoftwareEnclave::new();
        let b = SoftwareEnclave::new();
        let repr = a.representation(&a.generate().unwrap());
        assert_eq!(b.import(&repr).err(), Some(Error::InvalidKeyEncoding));

        let c = SoftwareEnclave::with_sealing_key([7; SEALING_KEY_SIZE]);
        let d = SoftwareEnclave::with_sealing_key([7; SEALING_KEY_SIZE]);
        let repr = c.representation(&c.generate().unwrap());
        assert!(d.import(&repr).is_ok());
    }

    #[test]
    fn agreement_is_symmetric() {
        let enclave = SoftwareEnclave::new();
        let a = enclave.generate().unwrap();
        let b = enclave.generate().unwrap();
        let ab = enclave.agree(&a, &enclave.public_key(&b)).unwrap();
        let ba = enclave.agree(&b, &enclave.public_key(&a)).unwrap();
        assert_eq!(ab, ba);
    }
}
