/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 *
 * (c) ZeroTier, Inc.
 * https://www.zerotier.com/
 */
//! The C ABI.
//!
//! Handles cross the boundary as plain `u64` values; `0` is never a valid handle. Functions that
//! create an object write its handle through an out pointer and return a status code. Functions
//! that report a size return it directly, or a negative status code on failure.
//!
//! Every handle written to an out pointer must eventually be passed to
//! `enclave_ecdh_release_object` exactly once.
use std::slice;

use lazy_static::lazy_static;
use rand_core::OsRng;

use crate::application::DefaultPlatform;
use crate::bridge::{Bridge, Handle, PrivateKeyHandle};
use crate::crypto::P256_PUBLIC_KEY_SIZE;
use crate::crypto_impl::SoftwareEnclave;
use crate::handle_table::ObjectHandle;
use crate::registry::violation;
use crate::result::{ContractViolation, Error};

pub const ENCLAVE_ECDH_OK: i32 = 0;
pub const ENCLAVE_ECDH_ENCLAVE_UNAVAILABLE: i32 = -1;
pub const ENCLAVE_ECDH_INVALID_KEY_ENCODING: i32 = -2;
pub const ENCLAVE_ECDH_INVALID_PEER_KEY: i32 = -3;
pub const ENCLAVE_ECDH_AGREEMENT_FAILED: i32 = -4;
pub const ENCLAVE_ECDH_REGISTRY_FULL: i32 = -5;
pub const ENCLAVE_ECDH_UNKNOWN_HANDLE: i32 = -6;
pub const ENCLAVE_ECDH_STALE_HANDLE: i32 = -7;
pub const ENCLAVE_ECDH_KIND_MISMATCH: i32 = -8;
pub const ENCLAVE_ECDH_BUFFER_TOO_SMALL: i32 = -9;
pub const ENCLAVE_ECDH_NULL_POINTER: i32 = -10;

lazy_static! {
    static ref BRIDGE: Bridge<DefaultPlatform> = Bridge::new(OsRng, SoftwareEnclave::new());
}

/// The status code reported across the C ABI for an error.
pub fn status_code(e: &Error) -> i32 {
    match e {
        Error::EnclaveUnavailable => ENCLAVE_ECDH_ENCLAVE_UNAVAILABLE,
        Error::InvalidKeyEncoding => ENCLAVE_ECDH_INVALID_KEY_ENCODING,
        Error::InvalidPeerKey => ENCLAVE_ECDH_INVALID_PEER_KEY,
        Error::AgreementFailed => ENCLAVE_ECDH_AGREEMENT_FAILED,
        Error::RegistryFull(_) => ENCLAVE_ECDH_REGISTRY_FULL,
        Error::ContractViolation(v) => match v {
            ContractViolation::UnknownHandle(_) => ENCLAVE_ECDH_UNKNOWN_HANDLE,
            ContractViolation::StaleHandle(_) => ENCLAVE_ECDH_STALE_HANDLE,
            ContractViolation::KindMismatch { .. } => ENCLAVE_ECDH_KIND_MISMATCH,
            ContractViolation::BufferTooSmall { .. } => ENCLAVE_ECDH_BUFFER_TOO_SMALL,
            ContractViolation::NullPointer => ENCLAVE_ECDH_NULL_POINTER,
        },
    }
}

fn status(r: Result<(), Error>) -> i32 {
    match r {
        Ok(()) => ENCLAVE_ECDH_OK,
        Err(e) => status_code(&e),
    }
}

fn size(r: Result<usize, Error>) -> i64 {
    match r {
        Ok(n) => n as i64,
        Err(e) => status_code(&e) as i64,
    }
}

fn object_handle(raw: u64) -> Result<ObjectHandle, Error> {
    ObjectHandle::from_raw(raw).ok_or_else(|| violation(ContractViolation::UnknownHandle(raw)).into())
}

unsafe fn input<'a>(ptr: *const u8, len: usize) -> Result<&'a [u8], Error> {
    if ptr.is_null() {
        return Err(violation(ContractViolation::NullPointer).into());
    }
    Ok(slice::from_raw_parts(ptr, len))
}

unsafe fn output<'a>(ptr: *mut u8, len: usize) -> Result<&'a mut [u8], Error> {
    if ptr.is_null() {
        return Err(violation(ContractViolation::NullPointer).into());
    }
    Ok(slice::from_raw_parts_mut(ptr, len))
}

unsafe fn write_handle(out: *mut u64, create: impl FnOnce() -> Result<u64, Error>) -> i32 {
    if out.is_null() {
        return status_code(&violation(ContractViolation::NullPointer).into());
    }
    status(create().map(|raw| *out = raw))
}

unsafe fn write_public_key(
    dst: *mut u8,
    dst_len: usize,
    key: impl FnOnce() -> Result<[u8; P256_PUBLIC_KEY_SIZE], Error>,
) -> i32 {
    status(output(dst, dst_len).and_then(|dst| {
        if dst.len() < P256_PUBLIC_KEY_SIZE {
            let required = P256_PUBLIC_KEY_SIZE;
            return Err(violation(ContractViolation::BufferTooSmall { required, provided: dst.len() }).into());
        }
        dst[..P256_PUBLIC_KEY_SIZE].copy_from_slice(&key()?);
        Ok(())
    }))
}

/// Generate a new enclave-backed P-256 key and write its handle to `out_handle`.
///
/// # Safety
/// `out_handle` must be null or valid for a write of one `u64`.
#[no_mangle]
pub unsafe extern "C" fn enclave_ecdh_generate_key(out_handle: *mut u64) -> i32 {
    write_handle(out_handle, || BRIDGE.generate_enclave_key().map(|h| h.object_handle().into_raw()))
}

/// Import a private key from bytes previously copied out of a private key handle.
///
/// # Safety
/// `repr` must be null or valid for reads of `repr_len` bytes. `out_handle` must be null or valid
/// for a write of one `u64`.
#[no_mangle]
pub unsafe extern "C" fn enclave_ecdh_import_key(repr: *const u8, repr_len: usize, out_handle: *mut u64) -> i32 {
    write_handle(out_handle, || {
        let repr = input(repr, repr_len)?;
        BRIDGE.import_private_key(repr).map(|h| h.object_handle().into_raw())
    })
}

/// Write the 65 byte X9.63 public key of a private key handle to `dst`.
///
/// # Safety
/// `dst` must be null or valid for writes of `dst_len` bytes.
#[no_mangle]
pub unsafe extern "C" fn enclave_ecdh_public_key(key: u64, dst: *mut u8, dst_len: usize) -> i32 {
    write_public_key(dst, dst_len, || {
        let key = PrivateKeyHandle::from_object_handle(object_handle(key)?);
        BRIDGE.public_key(&key).map(|pk| *pk.as_bytes())
    })
}

/// Compute the ECDH shared secret between a private key handle and a 65 byte X9.63 peer public
/// key, and write the new shared secret handle to `out_handle`.
///
/// # Safety
/// `peer` must be null or valid for reads of `peer_len` bytes. `out_handle` must be null or valid
/// for a write of one `u64`.
#[no_mangle]
pub unsafe extern "C" fn enclave_ecdh_shared_secret(
    key: u64,
    peer: *const u8,
    peer_len: usize,
    out_handle: *mut u64,
) -> i32 {
    write_handle(out_handle, || {
        let peer = input(peer, peer_len)?;
        let key = PrivateKeyHandle::from_object_handle(object_handle(key)?);
        BRIDGE.compute_shared_secret(&key, peer).map(|h| h.object_handle().into_raw())
    })
}

/// The number of bytes `enclave_ecdh_object_copy` will write for this handle, or a negative
/// status code.
#[no_mangle]
pub extern "C" fn enclave_ecdh_object_len(handle: u64) -> i64 {
    size(object_handle(handle).and_then(|h| Ok(BRIDGE.registry().len(h)?)))
}

/// Copy the bytes behind a handle into `dst`. Returns the number of bytes written, or a negative
/// status code. `dst` is left untouched if `dst_len` is smaller than the object.
///
/// # Safety
/// `dst` must be null or valid for writes of `dst_len` bytes.
#[no_mangle]
pub unsafe extern "C" fn enclave_ecdh_object_copy(handle: u64, dst: *mut u8, dst_len: usize) -> i64 {
    size(object_handle(handle).and_then(|h| {
        let dst = output(dst, dst_len)?;
        Ok(BRIDGE.registry().copy(h, dst)?)
    }))
}

/// Release a handle of either kind. The handle must not be used again.
#[no_mangle]
pub extern "C" fn enclave_ecdh_release_object(handle: u64) -> i32 {
    status(object_handle(handle).and_then(|h| {
        BRIDGE.registry().release(h)?;
        Ok(())
    }))
}

/// Write the public half of a freshly generated software key pair to `dst`. The private half is
/// discarded. Works even when no enclave is available.
///
/// # Safety
/// `dst` must be null or valid for writes of `dst_len` bytes.
#[no_mangle]
pub unsafe extern "C" fn enclave_ecdh_random_public_key(dst: *mut u8, dst_len: usize) -> i32 {
    write_public_key(dst, dst_len, || Ok(*BRIDGE.random_public_key().as_bytes()))
}

/// The number of handles currently live. Useful in tests to look for leaks.
#[no_mangle]
pub extern "C" fn enclave_ecdh_live_objects() -> u64 {
    BRIDGE.registry().live_count() as u64
}
