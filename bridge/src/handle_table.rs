/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 *
 * (c) ZeroTier, Inc.
 * https://www.zerotier.com/
 */
use std::num::NonZeroU64;

/// A generational index into a `HandleTable`, and the opaque handle given to callers.
///
/// The low 32 bits select a slot, the high 32 bits carry the generation the slot had when the
/// handle was issued. Generations are never zero, so a valid handle is never zero either and
/// `0` can be used as a null handle across the C ABI.
///
/// When the item is removed the handle becomes invalid forever. Functions which take one of these
/// as input will safely return `None` rather than touch whatever now occupies the slot.
#[derive(PartialEq, Eq, Hash, Clone, Copy)]
pub struct ObjectHandle(NonZeroU64);

impl ObjectHandle {
    fn new(slot: usize, generation: u32) -> Self {
        debug_assert!(generation != EMPTY_MARKER);
        Self(NonZeroU64::new(((generation as u64) << 32) | slot as u64).unwrap_or(NonZeroU64::MIN))
    }
    /// Reinterpret a raw value received from a caller as a handle.
    /// Returns `None` for `0`, which is never issued.
    pub fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }
    /// The raw value to hand to a caller.
    pub fn into_raw(self) -> u64 {
        self.0.get()
    }
    fn slot(self) -> usize {
        (self.0.get() & 0xffff_ffff) as usize
    }
    fn generation(self) -> u32 {
        (self.0.get() >> 32) as u32
    }
}

impl std::fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ObjectHandle({}@{})", self.slot(), self.generation())
    }
}

const EMPTY_MARKER: u32 = 0;
const RETIRED_GENERATION: u32 = u32::MAX;
const NO_FREE_SLOT: usize = usize::MAX;

/// What a handle refers to right now.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum HandleState {
    /// The handle refers to a live item.
    Live,
    /// The handle was issued by this table and its item has since been removed.
    Released,
    /// The handle could not have been issued by this table.
    Unknown,
}

enum Entry<T> {
    Occupied(T),
    Vacant { next_free: usize },
}

/// `generation` is that of the last handle issued for this slot. Each slot counts its own
/// generations, so every generation from 1 up to it was issued here exactly once.
struct Slot<T> {
    generation: u32,
    entry: Entry<T>,
}

/// A generational array with a free list.
///
/// Slots are reused after removal but every reuse bumps the slot's generation, so a handle to a
/// removed item can never alias the item that later takes its slot. A slot whose generation is
/// exhausted is retired rather than reused.
pub struct HandleTable<T> {
    free_list_head: usize,
    slots: Vec<Slot<T>>,
    len: usize,
}

impl<T> HandleTable<T> {
    /// Create a new, empty table.
    pub fn new() -> Self {
        Self { free_list_head: NO_FREE_SLOT, slots: Vec::new(), len: 0 }
    }
    /// Number of live items.
    pub fn len(&self) -> usize {
        self.len
    }
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
    /// Store an item and return the handle that now owns it.
    ///
    /// Amortized runtime: O(1).
    pub fn insert(&mut self, item: T) -> ObjectHandle {
        let slot_idx = if self.free_list_head != NO_FREE_SLOT {
            let slot_idx = self.free_list_head;
            let slot = &mut self.slots[slot_idx];
            if let Entry::Vacant { next_free } = slot.entry {
                self.free_list_head = next_free;
            }
            slot.generation += 1;
            slot.entry = Entry::Occupied(item);
            slot_idx
        } else {
            self.slots.push(Slot { generation: 1, entry: Entry::Occupied(item) });
            self.slots.len() - 1
        };
        self.len += 1;
        ObjectHandle::new(slot_idx, self.slots[slot_idx].generation)
    }
    /// If the handle maps to a live item, return a reference to it.
    ///
    /// Runtime: O(1).
    pub fn get(&self, handle: ObjectHandle) -> Option<&T> {
        match self.slots.get(handle.slot()) {
            Some(Slot { generation, entry: Entry::Occupied(item) }) if *generation == handle.generation() => {
                Some(item)
            }
            _ => None,
        }
    }
    /// Remove the item owned by this handle and return it.
    /// The handle, and every copy of it, is invalid afterwards.
    ///
    /// Runtime: O(1).
    pub fn remove(&mut self, handle: ObjectHandle) -> Option<T> {
        self.get(handle)?;
        let slot_idx = handle.slot();
        let slot = &mut self.slots[slot_idx];
        // A retired slot stays vacant and off the free list forever.
        let next_free = if slot.generation == RETIRED_GENERATION {
            NO_FREE_SLOT
        } else {
            let next_free = self.free_list_head;
            self.free_list_head = slot_idx;
            next_free
        };
        self.len -= 1;
        match std::mem::replace(&mut slot.entry, Entry::Vacant { next_free }) {
            Entry::Occupied(item) => Some(item),
            Entry::Vacant { .. } => None,
        }
    }
    /// Classify a handle. Used to report precisely how a caller misused a handle.
    pub fn state(&self, handle: ObjectHandle) -> HandleState {
        let generation = handle.generation();
        match self.slots.get(handle.slot()) {
            Some(slot) if generation != EMPTY_MARKER => match slot.entry {
                Entry::Occupied(_) if generation == slot.generation => HandleState::Live,
                Entry::Occupied(_) if generation < slot.generation => HandleState::Released,
                Entry::Vacant { .. } if generation <= slot.generation => HandleState::Released,
                _ => HandleState::Unknown,
            },
            _ => HandleState::Unknown,
        }
    }
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_remove() {
        let mut table = HandleTable::new();
        let a = table.insert("a");
        let b = table.insert("b");
        assert_ne!(a, b);
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(a), Some(&"a"));
        assert_eq!(table.remove(a), Some("a"));
        assert_eq!(table.remove(a), None);
        assert_eq!(table.get(a), None);
        assert_eq!(table.get(b), Some(&"b"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn reused_slot_does_not_alias_old_handle() {
        let mut table = HandleTable::new();
        let old = table.insert(1);
        table.remove(old);
        let new = table.insert(2);
        // Same slot, different generation.
        assert_eq!(old.slot(), new.slot());
        assert_ne!(old, new);
        assert_eq!(table.get(old), None);
        assert_eq!(table.get(new), Some(&2));
        assert_eq!(table.state(old), HandleState::Released);
        assert_eq!(table.state(new), HandleState::Live);
    }

    #[test]
    fn classify_handles() {
        let mut table = HandleTable::new();
        let live = table.insert(());
        let gone = table.insert(());
        table.remove(gone);
        assert_eq!(table.state(live), HandleState::Live);
        assert_eq!(table.state(gone), HandleState::Released);
        assert_eq!(table.state(ObjectHandle::new(57, 1)), HandleState::Unknown);
        assert_eq!(table.state(ObjectHandle::new(live.slot(), 1000)), HandleState::Unknown);
        assert_eq!(ObjectHandle::from_raw(gone.slot() as u64).map(|h| table.state(h)), Some(HandleState::Unknown));
    }

    #[test]
    fn generations_are_per_slot() {
        let mut table = HandleTable::new();
        let first = table.insert(0);
        table.remove(first);
        let reused = table.insert(1);
        let other = table.insert(2);
        assert_eq!(reused.slot(), first.slot());
        assert_eq!(reused.generation(), 2);
        assert_eq!(other.generation(), 1);
        // Generation 2 was only ever issued for the first slot.
        assert_eq!(table.state(ObjectHandle::new(other.slot(), 2)), HandleState::Unknown);
        assert_eq!(table.state(first), HandleState::Released);
        assert_eq!(table.state(other), HandleState::Live);
    }

    #[test]
    fn exhausted_slot_is_retired() {
        let mut table = HandleTable::new();
        let h = table.insert(0);
        table.slots[h.slot()].generation = RETIRED_GENERATION;
        let last = ObjectHandle::new(h.slot(), RETIRED_GENERATION);
        assert_eq!(table.remove(last), Some(0));
        assert!(table.is_empty());

        let next = table.insert(1);
        assert_ne!(next.slot(), last.slot());
        assert_eq!(table.get(last), None);
        assert_eq!(table.state(last), HandleState::Released);
        assert_eq!(table.state(h), HandleState::Released);
    }

    #[test]
    fn raw_round_trip() {
        let mut table = HandleTable::new();
        for i in 0..100 {
            let h = table.insert(i);
            assert_ne!(h.into_raw(), 0);
            assert_eq!(ObjectHandle::from_raw(h.into_raw()), Some(h));
        }
        assert_eq!(ObjectHandle::from_raw(0), None);
    }
}
