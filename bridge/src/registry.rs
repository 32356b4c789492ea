/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 *
 * (c) ZeroTier, Inc.
 * https://www.zerotier.com/
 */
use std::sync::{Mutex, MutexGuard};

use zeroize::Zeroizing;

use crate::crypto::SharedSecret;
use crate::handle_table::{HandleState, HandleTable, ObjectHandle};
use crate::log_event::{log, LogEvent};
use crate::result::{ContractViolation, Error};

/// The kind of object a handle refers to.
/// Both kinds share one handle namespace, so every accessor can check it is looking at the kind
/// it expects.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum ObjectKind {
    /// The enclave's exportable representation of a private key.
    PrivateKey,
    /// The raw output of an ECDH key agreement.
    SharedSecret,
}

/// An object owned by the registry between its creation and its release.
pub(crate) enum Object {
    PrivateKey(Zeroizing<Vec<u8>>),
    SharedSecret(SharedSecret),
}

impl Object {
    fn kind(&self) -> ObjectKind {
        match self {
            Object::PrivateKey(_) => ObjectKind::PrivateKey,
            Object::SharedSecret(_) => ObjectKind::SharedSecret,
        }
    }
    pub(crate) fn bytes(&self) -> &[u8] {
        match self {
            Object::PrivateKey(repr) => repr.as_slice(),
            Object::SharedSecret(secret) => &secret[..],
        }
    }
}

/// Report a contract violation, aborting the process instead when built with `fail-fast`.
pub(crate) fn violation(v: ContractViolation) -> ContractViolation {
    log!(LogEvent::ContractViolation(&v));
    if cfg!(feature = "fail-fast") {
        std::process::abort();
    }
    v
}

/// The handle registry.
///
/// Owns every result object from the moment it is created until the caller releases its handle.
/// There is exactly one logical owner per handle, the caller; the registry never retains an object
/// twice and never hands out references into its storage. Bytes only leave through `copy` or
/// `take`, which write into caller memory.
///
/// All operations lock a single mutex, so a handle can never be looked up while another thread is
/// halfway through releasing it.
pub struct Registry {
    table: Mutex<HandleTable<Object>>,
    max_live_objects: usize,
}

impl Registry {
    /// Create an empty registry that will refuse to hold more than `max_live_objects` objects.
    pub fn new(max_live_objects: usize) -> Self {
        Self { table: Mutex::new(HandleTable::new()), max_live_objects }
    }

    fn lock(&self) -> MutexGuard<'_, HandleTable<Object>> {
        // Every mutation of the table completes before the guard is released, so a panic elsewhere
        // cannot leave it half updated.
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn violation_for(table: &HandleTable<Object>, handle: ObjectHandle) -> ContractViolation {
        violation(match table.state(handle) {
            HandleState::Released => ContractViolation::StaleHandle(handle.into_raw()),
            HandleState::Live | HandleState::Unknown => ContractViolation::UnknownHandle(handle.into_raw()),
        })
    }

    fn lookup<'a>(
        table: &'a HandleTable<Object>,
        handle: ObjectHandle,
        expected: Option<ObjectKind>,
    ) -> Result<&'a Object, ContractViolation> {
        let object = table.get(handle).ok_or_else(|| Self::violation_for(table, handle))?;
        match expected {
            Some(expected) if expected != object.kind() => Err(violation(ContractViolation::KindMismatch {
                handle: handle.into_raw(),
                expected,
                found: object.kind(),
            })),
            _ => Ok(object),
        }
    }

    /// Take ownership of a freshly created object and issue a new handle for it.
    /// The object is dropped, and its bytes zeroed, if the registry is full.
    pub(crate) fn retain(&self, object: Object) -> Result<ObjectHandle, Error> {
        let mut table = self.lock();
        if table.len() >= self.max_live_objects {
            return Err(Error::RegistryFull(table.len()));
        }
        Ok(table.insert(object))
    }

    /// Run `f` on a live object of the expected kind while holding the registry lock.
    pub(crate) fn with_object<R>(
        &self,
        handle: ObjectHandle,
        expected: ObjectKind,
        f: impl FnOnce(&Object) -> R,
    ) -> Result<R, ContractViolation> {
        let table = self.lock();
        Self::lookup(&table, handle, Some(expected)).map(f)
    }

    /// The kind of the live object behind `handle`.
    pub fn kind(&self, handle: ObjectHandle) -> Result<ObjectKind, ContractViolation> {
        let table = self.lock();
        Self::lookup(&table, handle, None).map(Object::kind)
    }

    /// The exact number of bytes `copy` will write for this handle.
    /// Stable for as long as the handle is live.
    pub fn len(&self, handle: ObjectHandle) -> Result<usize, ContractViolation> {
        let table = self.lock();
        Self::lookup(&table, handle, None).map(|o| o.bytes().len())
    }

    /// Like `len`, but also fails if the handle refers to an object of another kind.
    pub fn len_of(&self, handle: ObjectHandle, kind: ObjectKind) -> Result<usize, ContractViolation> {
        let table = self.lock();
        Self::lookup(&table, handle, Some(kind)).map(|o| o.bytes().len())
    }

    /// Copy the object's bytes into `dst`, returning the number of bytes written, which is always
    /// `len(handle)`.
    ///
    /// `dst` must be at least `len(handle)` bytes long. A shorter buffer is rejected and left
    /// untouched.
    pub fn copy(&self, handle: ObjectHandle, dst: &mut [u8]) -> Result<usize, ContractViolation> {
        self.copy_checked(handle, None, dst)
    }

    /// Like `copy`, but also fails if the handle refers to an object of another kind.
    pub fn copy_of(&self, handle: ObjectHandle, kind: ObjectKind, dst: &mut [u8]) -> Result<usize, ContractViolation> {
        self.copy_checked(handle, Some(kind), dst)
    }

    fn copy_checked(
        &self,
        handle: ObjectHandle,
        expected: Option<ObjectKind>,
        dst: &mut [u8],
    ) -> Result<usize, ContractViolation> {
        let table = self.lock();
        let bytes = Self::lookup(&table, handle, expected)?.bytes();
        if dst.len() < bytes.len() {
            return Err(violation(ContractViolation::BufferTooSmall { required: bytes.len(), provided: dst.len() }));
        }
        dst[..bytes.len()].copy_from_slice(bytes);
        log!(LogEvent::ObjectCopied(handle, bytes.len()));
        Ok(bytes.len())
    }

    /// Drop the registry's ownership of the object. The handle is invalid afterwards and any
    /// further use of it, including a second release, is a contract violation.
    pub fn release(&self, handle: ObjectHandle) -> Result<ObjectKind, ContractViolation> {
        self.release_checked(handle, None).map(|object| object.kind())
    }

    /// Copy the object's bytes out and release the handle in one step.
    /// There is no window in which the handle is valid but its bytes have already been read.
    pub fn take(&self, handle: ObjectHandle) -> Result<Zeroizing<Vec<u8>>, ContractViolation> {
        self.release_checked(handle, None).map(|object| Zeroizing::new(object.bytes().to_vec()))
    }

    pub(crate) fn release_checked(
        &self,
        handle: ObjectHandle,
        expected: Option<ObjectKind>,
    ) -> Result<Object, ContractViolation> {
        let mut table = self.lock();
        Self::lookup(&table, handle, expected)?;
        let object = table.remove(handle).ok_or_else(|| Self::violation_for(&table, handle))?;
        log!(LogEvent::ObjectReleased(handle, object.kind()));
        Ok(object)
    }

    /// Number of objects currently owned by the registry.
    /// Useful to check a caller for leaked handles.
    pub fn live_count(&self) -> usize {
        self.lock().len()
    }
}
