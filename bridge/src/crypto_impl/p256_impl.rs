use p256::{ecdh::EphemeralSecret, elliptic_curve::sec1::ToEncodedPoint, PublicKey};
use rand_core::{CryptoRng, RngCore};

use crate::crypto::*;

/// An alias for the PublicKey type from the p256 crate.
pub type CrateP256PublicKey = PublicKey;
impl P256PublicKey for CrateP256PublicKey {
    fn from_bytes(raw_key: &[u8; P256_PUBLIC_KEY_SIZE]) -> Option<Self> {
        // A 65 byte input can only decode as an uncompressed point, which the crate checks is on
        // the curve.
        PublicKey::from_sec1_bytes(raw_key).ok()
    }

    fn to_bytes(&self) -> [u8; P256_PUBLIC_KEY_SIZE] {
        let mut out = [0u8; P256_PUBLIC_KEY_SIZE];
        out.copy_from_slice(self.to_encoded_point(false).as_bytes());
        out
    }
}

/// An alias for the EphemeralSecret type from the p256 crate.
pub type CrateP256KeyPair = EphemeralSecret;
impl<Rng: RngCore + CryptoRng> P256KeyPair<Rng> for CrateP256KeyPair {
    fn generate(rng: &mut Rng) -> Self {
        EphemeralSecret::random(rng)
    }

    fn public_key_bytes(&self) -> [u8; P256_PUBLIC_KEY_SIZE] {
        P256PublicKey::to_bytes(&self.public_key())
    }
}
