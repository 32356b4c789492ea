use rand_core::{CryptoRng, RngCore};
use zeroize::Zeroizing;

/// The size in bytes of a P-256 public key in uncompressed ANSI X9.63 format.
pub const P256_PUBLIC_KEY_SIZE: usize = 65;
/// The first byte of every uncompressed X9.63 point.
pub const P256_UNCOMPRESSED_POINT_TAG: u8 = 0x04;
/// The size in bytes of the raw output of ECDH between a P-256 public and private key.
pub const P256_ECDH_SHARED_SECRET_SIZE: usize = 32;

/// The raw (un-hashed!) output of ECDH. Erased on drop.
pub type SharedSecret = Zeroizing<[u8; P256_ECDH_SHARED_SECRET_SIZE]>;

/// A NIST P-256 ECDH public key.
pub trait P256PublicKey: Sized + Send + Sync {
    /// Create a P-256 public key from raw bytes.
    ///
    /// **CRITICAL**: This function must return `None` if the input `raw_key` is not on the P-256
    /// curve, or if it is invalid in any other way.
    fn from_bytes(raw_key: &[u8; P256_PUBLIC_KEY_SIZE]) -> Option<Self>;

    /// Get the raw bytes that uniquely define the public key.
    ///
    /// This must output the uncompressed X9.63 encoding of P-256 public keys.
    fn to_bytes(&self) -> [u8; P256_PUBLIC_KEY_SIZE];
}

/// A throwaway NIST P-256 key pair generated in software, outside of any enclave.
///
/// Instances must securely delete the private key when dropped.
pub trait P256KeyPair<Rng: RngCore + CryptoRng> {
    /// Randomly generate a new P-256 keypair. This keypair must be fully valid.
    ///
    /// This function may use the provided RNG or its own, so long as the output is cryptographically random.
    fn generate(rng: &mut Rng) -> Self;

    /// Get the uncompressed X9.63 encoding of the public key.
    fn public_key_bytes(&self) -> [u8; P256_PUBLIC_KEY_SIZE];
}

/// The X9.63 encoding of a P-256 public key: `0x04 || x || y`.
///
/// Holding one of these only guarantees the length and prefix are right. Whether the point is
/// actually on the curve is checked by `P256PublicKey::from_bytes` when the key is used.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct PublicKeyBytes([u8; P256_PUBLIC_KEY_SIZE]);

impl PublicKeyBytes {
    /// Check the length and prefix byte of an X9.63 encoded point.
    pub fn from_x963(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; P256_PUBLIC_KEY_SIZE] = bytes.try_into().ok()?;
        (raw[0] == P256_UNCOMPRESSED_POINT_TAG).then_some(Self(raw))
    }

    pub(crate) fn from_array(raw: [u8; P256_PUBLIC_KEY_SIZE]) -> Self {
        Self(raw)
    }

    pub fn as_bytes(&self) -> &[u8; P256_PUBLIC_KEY_SIZE] {
        &self.0
    }
}

impl AsRef<[u8]> for PublicKeyBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
