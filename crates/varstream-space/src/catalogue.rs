//! [`Catalogue`] – the bridge's handle on a [`VariableSpace`].
//!
//! The catalogue is passed explicitly into every registry rather than
//! looked up globally. It translates the space's low-level lookup and
//! listing contract into [`BridgeError`]s.
//!
//! # Discovery
//!
//! [`Catalogue::enumerate_all`] does not know the size of the listing in
//! advance. It starts from [`INITIAL_LISTING_BYTES`], doubles the buffer
//! before every attempt, and gives up with
//! [`BridgeError::DiscoveryOverflow`] once the buffer would grow beyond
//! [`MAX_LISTING_BYTES`].

use std::sync::Arc;

use tracing::debug;
use varstream_types::{BridgeError, Result, VariableDescriptor};

use crate::space::{EntriesError, LookupError, VariableSpace};

/// Seed size of the discovery buffer. Doubled before the first query.
pub const INITIAL_LISTING_BYTES: usize = 512;

/// Largest discovery buffer ever offered to the variable space (1 MiB).
pub const MAX_LISTING_BYTES: usize = 0x10_0000;

/// Cheaply clonable handle on a shared [`VariableSpace`].
#[derive(Clone)]
pub struct Catalogue {
    space: Arc<dyn VariableSpace>,
}

impl Catalogue {
    pub fn new(space: Arc<dyn VariableSpace>) -> Self {
        Self { space }
    }

    /// Resolve `name` to its current descriptor.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::NoSuchVariable`] – the name is absent.
    /// - [`BridgeError::InvalidHandle`] – the space itself is unusable.
    pub fn resolve(&self, name: &str) -> Result<VariableDescriptor> {
        self.space.get_var(name).map_err(|e| match e {
            LookupError::NotFound => BridgeError::NoSuchVariable(name.to_string()),
            LookupError::InvalidHandle => BridgeError::InvalidHandle,
        })
    }

    /// List every variable name currently in the space.
    ///
    /// Names are returned in the listing order of this call; the order is
    /// not meaningful across calls.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::DiscoveryOverflow`] – the listing needs more than
    ///   [`MAX_LISTING_BYTES`].
    /// - [`BridgeError::InvalidHandle`] – the space itself is unusable.
    pub fn enumerate_all(&self) -> Result<Vec<String>> {
        let mut capacity = INITIAL_LISTING_BYTES;
        let mut listing = String::new();
        loop {
            capacity <<= 1;
            if capacity > MAX_LISTING_BYTES {
                return Err(BridgeError::DiscoveryOverflow {
                    limit: MAX_LISTING_BYTES,
                });
            }
            listing.clear();
            listing.reserve(capacity);
            match self.space.get_entries(&mut listing, capacity) {
                Ok(()) => break,
                Err(EntriesError::BufferTooSmall) => {
                    debug!(capacity, "variable listing does not fit, growing buffer");
                }
                Err(EntriesError::InvalidHandle) => return Err(BridgeError::InvalidHandle),
            }
        }
        let names: Vec<String> = listing.split_whitespace().map(str::to_string).collect();
        debug!(count = names.len(), bytes = listing.len(), "enumerated variable space");
        Ok(names)
    }
}

impl std::fmt::Debug for Catalogue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalogue").finish_non_exhaustive()
    }
}
