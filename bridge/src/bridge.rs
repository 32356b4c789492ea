/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 *
 * (c) ZeroTier, Inc.
 * https://www.zerotier.com/
 */
use std::sync::{Arc, Mutex};

use zeroize::Zeroizing;

use crate::application::*;
use crate::crypto::*;
use crate::handle_table::ObjectHandle;
use crate::key_uri;
use crate::log_event::{log, LogEvent};
use crate::registry::{Object, ObjectKind, Registry};
use crate::result::Error;

/// A handle owned by the caller, referring to an object in a `Registry`.
///
/// Handles are neither `Clone` nor `Copy` and releasing one consumes it. Re-typing a copied
/// `ObjectHandle` with `from_object_handle` can still produce a released handle; the registry
/// reports any use of one as `ContractViolation::StaleHandle`, as it does for raw handles coming
/// through the C ABI.
pub trait Handle: Sized {
    /// The kind of object this handle refers to.
    const KIND: ObjectKind;
    /// The untyped handle.
    fn object_handle(&self) -> ObjectHandle;
    /// Re-type a raw handle received from a caller. The registry still checks the kind on use.
    fn from_object_handle(handle: ObjectHandle) -> Self;
}

/// A handle to the exportable representation of an enclave private key.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct PrivateKeyHandle(ObjectHandle);

/// A handle to the raw output of an ECDH key agreement.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct SharedSecretHandle(ObjectHandle);

impl Handle for PrivateKeyHandle {
    const KIND: ObjectKind = ObjectKind::PrivateKey;
    fn object_handle(&self) -> ObjectHandle {
        self.0
    }
    fn from_object_handle(handle: ObjectHandle) -> Self {
        Self(handle)
    }
}

impl Handle for SharedSecretHandle {
    const KIND: ObjectKind = ObjectKind::SharedSecret;
    fn object_handle(&self) -> ObjectHandle {
        self.0
    }
    fn from_object_handle(handle: ObjectHandle) -> Self {
        Self(handle)
    }
}

/// Log a cryptographic failure. These are always returned to the caller, even with `fail-fast`.
fn crypto_failure(e: Error) -> Error {
    log!(LogEvent::CryptoFailure(&e));
    e
}

/// The key agreement bridge.
///
/// Each application using the bridge creates an instance of this, normally one per process.
/// It pairs the platform's enclave with a handle registry: every key and secret the enclave
/// produces is handed to the registry, and the caller only ever holds a handle.
///
/// Internally this is just a clonable Arc, so it can be safely shared with multiple threads.
pub struct Bridge<P: PlatformLayer>(pub Arc<BridgeInner<P>>);
impl<P: PlatformLayer> Clone for Bridge<P> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

/// The internal memory of the bridge.
/// See `Bridge::new`.
pub struct BridgeInner<P: PlatformLayer> {
    /// The `CryptoRng` instance that was passed to the bridge when it was created.
    pub rng: Mutex<P::Rng>,
    enclave: P::Enclave,
    registry: Registry,
}

impl<P: PlatformLayer> Bridge<P> {
    /// Create a new bridge around the platform's enclave.
    pub fn new(rng: P::Rng, enclave: P::Enclave) -> Self {
        Self(Arc::new(BridgeInner {
            rng: Mutex::new(rng),
            enclave,
            registry: Registry::new(P::SETTINGS.max_live_objects),
        }))
    }

    /// The registry that owns every object this bridge has created.
    pub fn registry(&self) -> &Registry {
        &self.0.registry
    }

    fn retain_key(&self, key: &<P::Enclave as EnclaveKeyAgreement>::PrivateKey) -> Result<ObjectHandle, Error> {
        let repr = self.0.enclave.representation(key);
        self.0.registry.retain(Object::PrivateKey(repr))
    }

    /// Reconstruct the enclave key behind a private key handle.
    fn load_key(
        &self,
        key: &PrivateKeyHandle,
    ) -> Result<<P::Enclave as EnclaveKeyAgreement>::PrivateKey, Error> {
        let repr = self
            .0
            .registry
            .with_object(key.0, ObjectKind::PrivateKey, |object| Zeroizing::new(object.bytes().to_vec()))?;
        self.0.enclave.import(&repr).map_err(crypto_failure)
    }

    /// Ask the enclave for a fresh P-256 key agreement key.
    ///
    /// Fails with `Error::EnclaveUnavailable` if the platform has no usable enclave.
    pub fn generate_enclave_key(&self) -> Result<PrivateKeyHandle, Error> {
        let key = self.0.enclave.generate().map_err(crypto_failure)?;
        let handle = self.retain_key(&key)?;
        log!(LogEvent::KeyGenerated(handle));
        Ok(PrivateKeyHandle(handle))
    }

    /// Reconstruct an enclave key from bytes previously copied out of a private key handle.
    ///
    /// Fails with `Error::InvalidKeyEncoding` if the bytes are not a representation this enclave
    /// produced. Each call yields a new handle, even for the same bytes.
    pub fn import_private_key(&self, representation: &[u8]) -> Result<PrivateKeyHandle, Error> {
        let key = self.0.enclave.import(representation).map_err(crypto_failure)?;
        let handle = self.retain_key(&key)?;
        log!(LogEvent::KeyImported(handle));
        Ok(PrivateKeyHandle(handle))
    }

    /// The X9.63 encoded public key matching a private key handle.
    pub fn public_key(&self, key: &PrivateKeyHandle) -> Result<PublicKeyBytes, Error> {
        let key = self.load_key(key)?;
        Ok(PublicKeyBytes::from_array(self.0.enclave.public_key(&key).to_bytes()))
    }

    /// Compute the ECDH shared secret between an enclave key and a peer's public key.
    ///
    /// `peer_public_key` must be a 65 byte uncompressed X9.63 P-256 point, otherwise this fails
    /// with `Error::InvalidPeerKey`. Calling this twice with the same key and peer yields
    /// byte-identical secrets, under two distinct handles.
    pub fn compute_shared_secret(
        &self,
        key: &PrivateKeyHandle,
        peer_public_key: &[u8],
    ) -> Result<SharedSecretHandle, Error> {
        let peer = PublicKeyBytes::from_x963(peer_public_key)
            .and_then(|bytes| P::PublicKey::from_bytes(bytes.as_bytes()))
            .ok_or(Error::InvalidPeerKey)
            .map_err(crypto_failure)?;
        let private = self.load_key(key)?;
        let secret = self.0.enclave.agree(&private, &peer).map_err(crypto_failure)?;
        let handle = self.0.registry.retain(Object::SharedSecret(secret))?;
        log!(LogEvent::SharedSecretComputed { key: key.0, secret: handle });
        Ok(SharedSecretHandle(handle))
    }

    /// Generate a throwaway software key pair and return only its public key.
    /// Does not touch the enclave, so it works even where no enclave is available.
    pub fn random_public_key(&self) -> PublicKeyBytes {
        let pair = {
            let mut rng = self.0.rng.lock().unwrap_or_else(|e| e.into_inner());
            P::KeyPair::generate(&mut *rng)
        };
        log!(LogEvent::RandomPublicKeyGenerated);
        PublicKeyBytes::from_array(pair.public_key_bytes())
    }

    /// The exact number of bytes `copy` will write for this handle.
    pub fn len<H: Handle>(&self, handle: &H) -> Result<usize, Error> {
        Ok(self.0.registry.len_of(handle.object_handle(), H::KIND)?)
    }

    /// Copy the object's bytes into `dst`, which must hold at least `len(handle)` bytes.
    pub fn copy<H: Handle>(&self, handle: &H, dst: &mut [u8]) -> Result<usize, Error> {
        Ok(self.0.registry.copy_of(handle.object_handle(), H::KIND, dst)?)
    }

    /// Release a handle. The object and its bytes are dropped and erased.
    pub fn release<H: Handle>(&self, handle: H) -> Result<(), Error> {
        self.0.registry.release_checked(handle.object_handle(), Some(H::KIND))?;
        Ok(())
    }

    /// Copy the object's bytes out and release the handle in one step.
    pub fn take<H: Handle>(&self, handle: H) -> Result<Zeroizing<Vec<u8>>, Error> {
        let object = self.0.registry.release_checked(handle.object_handle(), Some(H::KIND))?;
        Ok(Zeroizing::new(object.bytes().to_vec()))
    }

    /// Export a private key as a key URI, `<key_uri_prefix><base64url(representation)>`.
    pub fn export_key_uri(&self, key: &PrivateKeyHandle) -> Result<Zeroizing<String>, Error> {
        let uri = self.0.registry.with_object(key.0, ObjectKind::PrivateKey, |object| {
            key_uri::encode(P::SETTINGS.key_uri_prefix, object.bytes())
        })?;
        Ok(uri)
    }

    /// Import a private key from a key URI produced by `export_key_uri`.
    ///
    /// Fails with `Error::InvalidKeyEncoding` if the URI is malformed or has the wrong prefix.
    pub fn import_key_uri(&self, uri: &str) -> Result<PrivateKeyHandle, Error> {
        let repr = key_uri::decode(P::SETTINGS.key_uri_prefix, uri).map_err(crypto_failure)?;
        self.import_private_key(&repr)
    }
}

#[cfg(all(test, feature = "default-crypto"))]
mod tests {
    use rand_core::OsRng;

    use super::*;
    use crate::crypto_impl::*;
    use crate::result::ContractViolation;

    type TestBridge = Bridge<DefaultPlatform>;

    fn bridge() -> TestBridge {
        Bridge::new(OsRng, SoftwareEnclave::new())
    }

    fn secret_bytes(bridge: &TestBridge, handle: &SharedSecretHandle) -> Vec<u8> {
        let mut buf = vec![0u8; bridge.len(handle).unwrap()];
        bridge.copy(handle, &mut buf).unwrap();
        buf
    }

    #[test]
    fn shared_secret_is_deterministic() {
        let bridge = bridge();
        let key = bridge.generate_enclave_key().unwrap();
        let peer = bridge.random_public_key();

        let s1 = bridge.compute_shared_secret(&key, peer.as_ref()).unwrap();
        let s2 = bridge.compute_shared_secret(&key, peer.as_ref()).unwrap();
        assert_ne!(s1, s2);
        assert_eq!(bridge.len(&s1).unwrap(), P256_ECDH_SHARED_SECRET_SIZE);
        assert_eq!(secret_bytes(&bridge, &s1), secret_bytes(&bridge, &s2));

        bridge.release(s1).unwrap();
        bridge.release(s2).unwrap();
        bridge.release(key).unwrap();
        assert_eq!(bridge.registry().live_count(), 0);
    }

    #[test]
    fn key_agreement_is_symmetric() {
        let bridge = bridge();
        let a = bridge.generate_enclave_key().unwrap();
        let b = bridge.generate_enclave_key().unwrap();
        let a_pub = bridge.public_key(&a).unwrap();
        let b_pub = bridge.public_key(&b).unwrap();

        let ab = bridge.compute_shared_secret(&a, b_pub.as_ref()).unwrap();
        let ba = bridge.compute_shared_secret(&b, a_pub.as_ref()).unwrap();
        assert_eq!(bridge.take(ab).unwrap(), bridge.take(ba).unwrap());
    }

    #[test]
    fn imported_key_agrees_like_the_exported_one() {
        let bridge = bridge();
        let key = bridge.generate_enclave_key().unwrap();
        let peer = bridge.random_public_key();

        let mut repr = vec![0u8; bridge.len(&key).unwrap()];
        bridge.copy(&key, &mut repr).unwrap();
        let imported = bridge.import_private_key(&repr).unwrap();
        assert_ne!(imported, key);

        let original = bridge.compute_shared_secret(&key, peer.as_ref()).unwrap();
        let restored = bridge.compute_shared_secret(&imported, peer.as_ref()).unwrap();
        assert_eq!(bridge.take(original).unwrap(), bridge.take(restored).unwrap());
        assert_eq!(bridge.public_key(&key).unwrap(), bridge.public_key(&imported).unwrap());
    }

    #[test]
    fn wrong_length_peer_key_is_rejected() {
        let bridge = bridge();
        let key = bridge.generate_enclave_key().unwrap();
        assert_eq!(bridge.compute_shared_secret(&key, &[4u8; 10]).err(), Some(Error::InvalidPeerKey));

        let peer = bridge.random_public_key();
        let mut compressed_prefix = *peer.as_bytes();
        compressed_prefix[0] = 0x02;
        assert_eq!(bridge.compute_shared_secret(&key, &compressed_prefix).err(), Some(Error::InvalidPeerKey));

        let mut off_curve = *peer.as_bytes();
        off_curve[64] ^= 1;
        assert_eq!(bridge.compute_shared_secret(&key, &off_curve).err(), Some(Error::InvalidPeerKey));

        // Only the key is live; no handle was created for any failed agreement.
        assert_eq!(bridge.registry().live_count(), 1);
    }

    #[test]
    fn random_public_keys_differ() {
        let bridge = bridge();
        let a = bridge.random_public_key();
        let b = bridge.random_public_key();
        assert_ne!(a, b);
        assert_eq!(a.as_bytes()[0], P256_UNCOMPRESSED_POINT_TAG);
        assert_eq!(bridge.registry().live_count(), 0);
    }

    #[test]
    fn invalid_import_creates_no_handle() {
        let bridge = bridge();
        assert_eq!(bridge.import_private_key(&[0u8; 12]).err(), Some(Error::InvalidKeyEncoding));
        assert_eq!(bridge.registry().live_count(), 0);
    }

    #[test]
    fn handle_kinds_are_enforced() {
        let bridge = bridge();
        let key = bridge.generate_enclave_key().unwrap();
        let peer = bridge.random_public_key();
        let secret = bridge.compute_shared_secret(&key, peer.as_ref()).unwrap();

        // A secret handle smuggled in as a key handle is rejected, not reinterpreted.
        let forged = PrivateKeyHandle::from_object_handle(secret.object_handle());
        assert!(matches!(
            bridge.compute_shared_secret(&forged, peer.as_ref()),
            Err(Error::ContractViolation(ContractViolation::KindMismatch { .. }))
        ));
        assert!(bridge.release(forged).is_err());
        assert_eq!(bridge.len(&secret).unwrap(), P256_ECDH_SHARED_SECRET_SIZE);
    }

    #[test]
    fn stale_key_handle_is_a_violation() {
        let bridge = bridge();
        let key = bridge.generate_enclave_key().unwrap();
        let raw = key.object_handle();
        bridge.release(key).unwrap();

        let stale = PrivateKeyHandle::from_object_handle(raw);
        let peer = bridge.random_public_key();
        assert_eq!(
            bridge.compute_shared_secret(&stale, peer.as_ref()).err(),
            Some(Error::ContractViolation(ContractViolation::StaleHandle(raw.into_raw())))
        );
        assert_eq!(
            bridge.len(&stale).err(),
            Some(Error::ContractViolation(ContractViolation::StaleHandle(raw.into_raw())))
        );
    }

    #[test]
    fn key_uri_round_trip() {
        let bridge = bridge();
        let key = bridge.generate_enclave_key().unwrap();
        let uri = bridge.export_key_uri(&key).unwrap();
        assert!(uri.starts_with(Settings::KEY_URI_PREFIX));

        let imported = bridge.import_key_uri(&uri).unwrap();
        assert_eq!(bridge.public_key(&key).unwrap(), bridge.public_key(&imported).unwrap());
        assert_eq!(bridge.import_key_uri("enclave-p256://version/2/AAAA").err(), Some(Error::InvalidKeyEncoding));
    }

    #[test]
    fn fallback_platform_has_no_enclave() {
        let bridge = Bridge::<FallbackPlatform>::new(OsRng, UnavailableEnclave);
        assert_eq!(bridge.generate_enclave_key().err(), Some(Error::EnclaveUnavailable));
        assert_eq!(bridge.import_private_key(&[0u8; 65]).err(), Some(Error::EnclaveUnavailable));
        assert_eq!(bridge.random_public_key().as_bytes().len(), P256_PUBLIC_KEY_SIZE);
        assert_eq!(bridge.registry().live_count(), 0);
    }

    // Runs under every feature set: `fail-fast` only aborts on contract violations.
    #[test]
    fn crypto_failures_are_returned() {
        let bridge = bridge();
        let key = bridge.generate_enclave_key().unwrap();
        assert_eq!(bridge.compute_shared_secret(&key, &[4u8; 10]).err(), Some(Error::InvalidPeerKey));
        assert_eq!(bridge.import_private_key(&[1u8; 3]).err(), Some(Error::InvalidKeyEncoding));
        assert_eq!(bridge.import_key_uri("not a key uri").err(), Some(Error::InvalidKeyEncoding));
        let fallback = Bridge::<FallbackPlatform>::new(OsRng, UnavailableEnclave);
        assert_eq!(fallback.generate_enclave_key().err(), Some(Error::EnclaveUnavailable));
        bridge.release(key).unwrap();
    }

    /// An enclave whose keys have all been revoked: they still load, but agreement is refused.
    struct RevokedEnclave(SoftwareEnclave);

    impl EnclaveKeyAgreement for RevokedEnclave {
        type PublicKey = CrateP256PublicKey;
        type PrivateKey = SoftwarePrivateKey;

        fn generate(&self) -> Result<SoftwarePrivateKey, Error> {
            self.0.generate()
        }
        fn import(&self, representation: &[u8]) -> Result<SoftwarePrivateKey, Error> {
            self.0.import(representation)
        }
        fn representation(&self, key: &SoftwarePrivateKey) -> Zeroizing<Vec<u8>> {
            self.0.representation(key)
        }
        fn public_key(&self, key: &SoftwarePrivateKey) -> CrateP256PublicKey {
            self.0.public_key(key)
        }
        fn agree(&self, _: &SoftwarePrivateKey, _: &CrateP256PublicKey) -> Result<SharedSecret, Error> {
            Err(Error::AgreementFailed)
        }
    }

    struct RevokedPlatform;
    impl PlatformLayer for RevokedPlatform {
        type Rng = OsRng;
        type PublicKey = CrateP256PublicKey;
        type KeyPair = CrateP256KeyPair;
        type Enclave = RevokedEnclave;
    }

    #[test]
    fn refused_agreement_creates_no_handle() {
        let bridge = Bridge::<RevokedPlatform>::new(OsRng, RevokedEnclave(SoftwareEnclave::new()));
        let key = bridge.generate_enclave_key().unwrap();
        let peer = bridge.random_public_key();
        assert_eq!(bridge.registry().live_count(), 1);

        assert_eq!(bridge.compute_shared_secret(&key, peer.as_ref()).err(), Some(Error::AgreementFailed));
        assert_eq!(bridge.registry().live_count(), 1);
        assert_eq!(crate::ffi::status_code(&Error::AgreementFailed), crate::ffi::ENCLAVE_ECDH_AGREEMENT_FAILED);

        // The key itself is untouched by the refusal.
        assert_eq!(bridge.len(&key).unwrap(), SEALED_KEY_SIZE);
        bridge.release(key).unwrap();
        assert_eq!(bridge.registry().live_count(), 0);
    }

    #[test]
    fn registry_limit_comes_from_settings() {
        struct TinyPlatform;
        impl PlatformLayer for TinyPlatform {
            const SETTINGS: Settings = Settings { max_live_objects: 2, ..Settings::new() };
            type Rng = OsRng;
            type PublicKey = CrateP256PublicKey;
            type KeyPair = CrateP256KeyPair;
            type Enclave = SoftwareEnclave;
        }
        let bridge = Bridge::<TinyPlatform>::new(OsRng, SoftwareEnclave::new());
        let a = bridge.generate_enclave_key().unwrap();
        let _b = bridge.generate_enclave_key().unwrap();
        assert_eq!(bridge.generate_enclave_key().err(), Some(Error::RegistryFull(2)));
        bridge.release(a).unwrap();
        assert!(bridge.generate_enclave_key().is_ok());
    }
}
