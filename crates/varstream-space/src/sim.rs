//! [`SimVariableSpace`] – in-process variable space for tests and demos.
//!
//! Every variable is backed by an owned Rust buffer ([`VarBuffer`]). The
//! space hands out descriptors pointing straight into those buffers, exactly
//! like a host pipeline hands out pointers into its own memory.
//!
//! # Buffer stability
//!
//! | Operation | Effect on the address seen by the bridge |
//! |---|---|
//! | [`SimVariableSpace::write`] without resizing | unchanged |
//! | [`SimVariableSpace::write`] that grows the vector | may change |
//! | [`SimVariableSpace::insert`] over an existing name | changes |
//! | [`SimVariableSpace::remove`] | name disappears |
//!
//! Buffers displaced by `insert` or `remove` are retired, not freed: they
//! stay alive until [`SimVariableSpace::collect_retired`] or until the space
//! is dropped, so a cycle still holding the old address reads valid memory.
//! In-place writes and collection touch memory a cycle may be reading and
//! are therefore `unsafe`.
//!
//! # Example
//!
//! ```rust
//! use varstream_space::{Catalogue, SimVariableSpace, VarBuffer};
//! use std::sync::Arc;
//!
//! let space = Arc::new(
//!     SimVariableSpace::new()
//!         .with("level", VarBuffer::Float32(vec![0.0; 4]))
//!         .with("frame", VarBuffer::Int32(vec![0])),
//! );
//! let catalogue = Catalogue::new(space.clone());
//!
//! assert_eq!(catalogue.resolve("level").unwrap().element_count(), 4);
//! assert_eq!(catalogue.enumerate_all().unwrap(), vec!["frame", "level"]);
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use varstream_types::{Complex32, TypeTag, VarAddress, VariableDescriptor};

use crate::space::{EntriesError, LookupError, VariableSpace};

/// Owned storage of one simulated variable.
#[derive(Debug, Clone, PartialEq)]
pub enum VarBuffer {
    Int32(Vec<i32>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    Real(Vec<f32>),
    Complex(Vec<Complex32>),
    Text(String),
}

impl VarBuffer {
    pub fn type_tag(&self) -> TypeTag {
        match self {
            VarBuffer::Int32(_) => TypeTag::Int32,
            VarBuffer::Float32(_) => TypeTag::Float32,
            VarBuffer::Float64(_) => TypeTag::Float64,
            VarBuffer::Real(_) => TypeTag::DomainReal,
            VarBuffer::Complex(_) => TypeTag::DomainComplex,
            VarBuffer::Text(_) => TypeTag::Text,
        }
    }

    /// Number of elements (bytes for text).
    pub fn len(&self) -> usize {
        match self {
            VarBuffer::Int32(v) => v.len(),
            VarBuffer::Float32(v) | VarBuffer::Real(v) => v.len(),
            VarBuffer::Float64(v) => v.len(),
            VarBuffer::Complex(v) => v.len(),
            VarBuffer::Text(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn address(&self) -> VarAddress {
        match self {
            VarBuffer::Int32(v) => VarAddress::from_ptr(v.as_ptr()),
            VarBuffer::Float32(v) | VarBuffer::Real(v) => VarAddress::from_ptr(v.as_ptr()),
            VarBuffer::Float64(v) => VarAddress::from_ptr(v.as_ptr()),
            VarBuffer::Complex(v) => VarAddress::from_ptr(v.as_ptr()),
            VarBuffer::Text(s) => VarAddress::from_ptr(s.as_ptr()),
        }
    }

    /// Reports a descriptor for this buffer. Only called by the owning space.
    fn descriptor(&self) -> VariableDescriptor {
        let count = u32::try_from(self.len()).unwrap_or(u32::MAX);
        // SAFETY: the address points at `len()` initialised elements of the
        // buffer's own element type (`Vec::as_ptr` is aligned and non-null
        // even when empty). Replaced and removed buffers are retired, so the
        // memory stays allocated until the space is dropped or an `unsafe`
        // collection frees it. Concurrent writes only happen through the
        // `unsafe` `write`, whose caller excludes running cycles.
        unsafe { VariableDescriptor::new(self.type_tag(), count, self.address()) }
    }
}

enum Entry {
    Owned(VarBuffer),
    /// A descriptor supplied verbatim, e.g. for types the bridge rejects.
    Foreign(VariableDescriptor),
}

impl Entry {
    fn descriptor(&self) -> VariableDescriptor {
        match self {
            Entry::Owned(buffer) => buffer.descriptor(),
            Entry::Foreign(desc) => *desc,
        }
    }
}

/// An in-process [`VariableSpace`] backed by owned buffers.
///
/// Names are listed in lexicographic order.
pub struct SimVariableSpace {
    entries: Mutex<BTreeMap<String, Entry>>,
    retired: Mutex<Vec<VarBuffer>>,
    valid: AtomicBool,
}

impl Default for SimVariableSpace {
    fn default() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            retired: Mutex::new(Vec::new()),
            valid: AtomicBool::new(true),
        }
    }
}

impl SimVariableSpace {
    /// Create an empty space.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`insert`][Self::insert].
    pub fn with(self, name: impl Into<String>, buffer: VarBuffer) -> Self {
        self.insert(name, buffer);
        self
    }

    /// Insert or replace `name`. Replacing always moves the variable to a
    /// new buffer; the old one is retired.
    pub fn insert(&self, name: impl Into<String>, buffer: VarBuffer) {
        let old = self.lock().insert(name.into(), Entry::Owned(buffer));
        self.retire(old);
    }

    /// Register a descriptor whose memory lives outside this space.
    pub fn insert_descriptor(&self, name: impl Into<String>, descriptor: VariableDescriptor) {
        let old = self.lock().insert(name.into(), Entry::Foreign(descriptor));
        self.retire(old);
    }

    /// Mutate the buffer of `name` in place.
    ///
    /// Returns `false` when `name` is absent or not backed by an owned
    /// buffer.
    ///
    /// # Safety
    ///
    /// No processing cycle may read from this space while `f` runs. If `f`
    /// reallocates the buffer (e.g. by growing a vector), the old address
    /// becomes dangling at once, so no bridge may use a descriptor obtained
    /// before the call without querying the space again.
    pub unsafe fn write<F>(&self, name: &str, f: F) -> bool
    where
        F: FnOnce(&mut VarBuffer),
    {
        match self.lock().get_mut(name) {
            Some(Entry::Owned(buffer)) => {
                f(buffer);
                true
            }
            _ => false,
        }
    }

    /// Remove `name`, retiring its buffer. Returns `true` if it existed.
    pub fn remove(&self, name: &str) -> bool {
        let old = self.lock().remove(name);
        let existed = old.is_some();
        self.retire(old);
        existed
    }

    /// Number of displaced buffers still kept alive.
    pub fn retired_len(&self) -> usize {
        self.retired
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Free the buffers displaced by [`insert`][Self::insert] and
    /// [`remove`][Self::remove]. Returns how many were freed.
    ///
    /// # Safety
    ///
    /// No processing cycle may be running against this space, and every
    /// bridge reading from it must query the space again before its next
    /// read (a reconciliation pass does).
    pub unsafe fn collect_retired(&self) -> usize {
        let mut retired = self.retired.lock().unwrap_or_else(PoisonError::into_inner);
        let freed = retired.len();
        retired.clear();
        freed
    }

    fn retire(&self, old: Option<Entry>) {
        if let Some(Entry::Owned(buffer)) = old {
            self.retired
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(buffer);
        }
    }

    /// Snapshot of the buffer behind `name`.
    pub fn get(&self, name: &str) -> Option<VarBuffer> {
        match self.lock().get(name) {
            Some(Entry::Owned(buffer)) => Some(buffer.clone()),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Make every further query fail with an invalid-handle error.
    pub fn invalidate(&self) {
        self.valid.store(false, Ordering::Release);
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }
}

impl VariableSpace for SimVariableSpace {
    fn get_var(&self, name: &str) -> Result<VariableDescriptor, LookupError> {
        if !self.is_valid() {
            return Err(LookupError::InvalidHandle);
        }
        self.lock()
            .get(name)
            .map(Entry::descriptor)
            .ok_or(LookupError::NotFound)
    }

    fn get_entries(&self, buf: &mut String, capacity: usize) -> Result<(), EntriesError> {
        if !self.is_valid() {
            return Err(EntriesError::InvalidHandle);
        }
        let entries = self.lock();
        let needed = entries.keys().map(|k| k.len() + 1).sum::<usize>().max(1);
        if needed > capacity {
            return Err(EntriesError::BufferTooSmall);
        }
        buf.clear();
        for (i, name) in entries.keys().enumerate() {
            if i > 0 {
                buf.push(' ');
            }
            buf.push_str(name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_follows_buffer() {
        let space = SimVariableSpace::new().with("spec", VarBuffer::Complex(vec![Complex32::default(); 3]));
        let desc = space.get_var("spec").unwrap();
        assert_eq!(desc.type_tag(), TypeTag::DomainComplex);
        assert_eq!(desc.element_count(), 3);
        assert_eq!(desc.expected_channel_count(), 6);
    }

    #[test]
    fn in_place_write_keeps_address() {
        let space = SimVariableSpace::new().with("level", VarBuffer::Float32(vec![0.0; 4]));
        let before = space.get_var("level").unwrap().address();
        // SAFETY: no bridge reads this space.
        let written = unsafe {
            space.write("level", |b| {
                if let VarBuffer::Float32(v) = b {
                    v[0] = 1.0;
                }
            })
        };
        assert!(written);
        assert_eq!(space.get_var("level").unwrap().address(), before);
        assert_eq!(space.get("level"), Some(VarBuffer::Float32(vec![1.0, 0.0, 0.0, 0.0])));
    }

    #[test]
    fn replacing_moves_to_new_buffer() {
        let space = SimVariableSpace::new().with("level", VarBuffer::Float32(vec![0.0; 4]));
        let before = space.get_var("level").unwrap();
        // The new vector is allocated while the old one is still alive.
        space.insert("level", VarBuffer::Float32(vec![0.0; 4]));
        let after = space.get_var("level").unwrap();
        assert_ne!(after.address(), before.address());
        assert_eq!(after.type_tag(), before.type_tag());
        assert_eq!(after.element_count(), before.element_count());
    }

    #[test]
    fn displaced_buffers_stay_readable_until_collected() {
        let space = SimVariableSpace::new().with("level", VarBuffer::Float32(vec![0.25; 4]));
        let stale = space.get_var("level").unwrap();

        space.insert("level", VarBuffer::Float32(vec![0.5; 4]));
        space.remove("level");
        assert_eq!(space.retired_len(), 2);

        // SAFETY: the first buffer is retired, not freed, and nothing writes
        // to it.
        let values = unsafe {
            std::slice::from_raw_parts(
                stale.address().as_ptr::<f32>(),
                stale.element_count() as usize,
            )
        };
        assert_eq!(values, &[0.25; 4]);

        // SAFETY: no bridge reads this space; `values` is not used again.
        assert_eq!(unsafe { space.collect_retired() }, 2);
        assert_eq!(space.retired_len(), 0);
    }

    #[test]
    fn missing_and_invalid_are_distinct() {
        let space = SimVariableSpace::new().with("a", VarBuffer::Int32(vec![1]));
        assert_eq!(space.get_var("b").unwrap_err(), LookupError::NotFound);
        assert!(space.remove("a"));
        assert_eq!(space.get_var("a").unwrap_err(), LookupError::NotFound);

        space.invalidate();
        assert_eq!(space.get_var("a").unwrap_err(), LookupError::InvalidHandle);
        let mut buf = String::new();
        assert_eq!(
            space.get_entries(&mut buf, 1024).unwrap_err(),
            EntriesError::InvalidHandle
        );
    }

    #[test]
    fn entries_respect_capacity() {
        let space = SimVariableSpace::new()
            .with("alpha", VarBuffer::Int32(vec![1]))
            .with("beta", VarBuffer::Float64(vec![1.0]));
        let mut buf = String::new();
        // "alpha beta" plus terminator needs 11 bytes.
        assert_eq!(
            space.get_entries(&mut buf, 10).unwrap_err(),
            EntriesError::BufferTooSmall
        );
        space.get_entries(&mut buf, 11).unwrap();
        assert_eq!(buf, "alpha beta");
    }

    #[test]
    fn foreign_descriptor_is_reported_verbatim() {
        // SAFETY: zero elements, nothing is ever read.
        let desc = unsafe { VariableDescriptor::new(TypeTag::Other(1000), 0, VarAddress::NULL) };
        let space = SimVariableSpace::new();
        space.insert_descriptor("user", desc);
        assert_eq!(space.get_var("user").unwrap(), desc);
        // SAFETY: no bridge reads this space.
        assert!(!unsafe { space.write("user", |_| {}) });
        assert_eq!(space.get("user"), None);
    }
}
