//! `varstream-space` – access to the variable space.
//!
//! The variable space is the host pipeline's registry of named, typed,
//! address-backed runtime variables. This crate never owns a real one; it
//! defines the contract the bridge consumes and ships an in-process
//! implementation for tests and the demo host.
//!
//! # Modules
//!
//! - [`space`] – the [`VariableSpace`] trait every variable space implements.
//! - [`catalogue`] – [`Catalogue`], the client the bridge uses to resolve
//!   names and enumerate the whole space.
//! - [`sim`] – [`SimVariableSpace`], an in-process space whose buffers are
//!   owned Rust vectors.

pub mod catalogue;
pub mod sim;
pub mod space;

pub use catalogue::{Catalogue, INITIAL_LISTING_BYTES, MAX_LISTING_BYTES};
pub use sim::{SimVariableSpace, VarBuffer};
pub use space::{EntriesError, LookupError, VariableSpace};
