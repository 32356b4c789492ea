use rand_core::{CryptoRng, RngCore};

use crate::crypto::*;

/// A container for the dynamic settings of the bridge.
pub struct Settings {
    /// The maximum number of objects the registry will hold at once.
    /// Creation operations fail with `Error::RegistryFull` once this many handles are live.
    ///
    /// Handles are never garbage collected, so this is what bounds the damage a caller that leaks
    /// handles can do.
    pub max_live_objects: usize,
    /// The prefix of key URIs produced by `Bridge::export_key_uri`.
    /// Key URIs with any other prefix are refused on import.
    pub key_uri_prefix: &'static str,
}
impl Settings {
    /// Default value for the `max_live_objects`.
    pub const MAX_LIVE_OBJECTS: usize = 4096;
    /// Default value for the `key_uri_prefix`.
    pub const KEY_URI_PREFIX: &'static str = "enclave-p256://version/1/";
    /// Create an instance of Settings with all default values.
    pub const fn new() -> Self {
        Self { max_live_objects: Self::MAX_LIVE_OBJECTS, key_uri_prefix: Self::KEY_URI_PREFIX }
    }
}
impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}

/// Trait to implement to bind the bridge to a platform.
///
/// Templating the bridge on this trait keeps the handle protocol independent of which enclave,
/// if any, the platform offers.
pub trait PlatformLayer: Sized {
    /// Settings can be redefined from their defaults by overriding this constant.
    const SETTINGS: Settings = Settings::new();

    /// The random number generator used for software key pairs.
    /// It should be cryptographically secure.
    type Rng: CryptoRng + RngCore;
    /// The implementation of P-256 public keys used to validate peer keys.
    type PublicKey: P256PublicKey;
    /// The implementation of throwaway software P-256 key pairs, used by `random_public_key`.
    type KeyPair: P256KeyPair<Self::Rng>;
    /// The enclave that generates and holds private keys.
    type Enclave: EnclaveKeyAgreement<PublicKey = Self::PublicKey>;
}

/// The platform used by the C ABI: the p256 crate, the OS random number generator and a software
/// enclave.
#[cfg(feature = "default-crypto")]
pub struct DefaultPlatform;
#[cfg(feature = "default-crypto")]
impl PlatformLayer for DefaultPlatform {
    type Rng = rand_core::OsRng;
    type PublicKey = crate::crypto_impl::CrateP256PublicKey;
    type KeyPair = crate::crypto_impl::CrateP256KeyPair;
    type Enclave = crate::crypto_impl::SoftwareEnclave;
}

/// A platform without an enclave. Only `random_public_key` succeeds.
#[cfg(feature = "default-crypto")]
pub struct FallbackPlatform;
#[cfg(feature = "default-crypto")]
impl PlatformLayer for FallbackPlatform {
    type Rng = rand_core::OsRng;
    type PublicKey = crate::crypto_impl::CrateP256PublicKey;
    type KeyPair = crate::crypto_impl::CrateP256KeyPair;
    type Enclave = crate::crypto_impl::UnavailableEnclave;
}
