//! The [`VariableSpace`] trait.
//!
//! Hosts implement this trait over whatever registry holds their runtime
//! variables. The bridge only ever talks to the trait through a
//! [`Catalogue`][crate::catalogue::Catalogue], so the space can be swapped
//! for [`SimVariableSpace`][crate::sim::SimVariableSpace] in tests.

use thiserror::Error;
use varstream_types::VariableDescriptor;

/// Why a single-variable lookup failed.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupError {
    #[error("no such variable")]
    NotFound,
    #[error("variable space handle is invalid")]
    InvalidHandle,
}

/// Why a listing query failed.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntriesError {
    /// The listing does not fit into the offered capacity. Retry larger.
    #[error("listing buffer too small")]
    BufferTooSmall,
    #[error("variable space handle is invalid")]
    InvalidHandle,
}

/// A registry of named, typed, address-backed variables.
///
/// Descriptors returned by [`get_var`][VariableSpace::get_var] carry the
/// validity contract of [`VariableDescriptor::new`]: the address stays
/// readable until the space reports a different descriptor for that name.
pub trait VariableSpace: Send + Sync {
    /// Look up the current descriptor of `name`.
    ///
    /// Called once per monitored variable on every processing cycle, so
    /// implementations should neither block nor allocate.
    fn get_var(&self, name: &str) -> Result<VariableDescriptor, LookupError>;

    /// Write the space-separated list of all variable names into `buf`.
    ///
    /// `capacity` is the number of bytes the caller is prepared to accept,
    /// including one byte of terminator. When the listing needs more,
    /// [`EntriesError::BufferTooSmall`] is returned and `buf` is left
    /// unspecified.
    fn get_entries(&self, buf: &mut String, capacity: usize) -> Result<(), EntriesError>;
}
