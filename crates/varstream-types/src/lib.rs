//! `varstream-types` – shared vocabulary of the variable bridge.
//!
//! Every other crate in the workspace speaks in these types: the
//! [`VariableDescriptor`] read from the variable space, the [`TypeTag`]
//! dispatched on by the bridge factory, the [`StreamInfo`] handed to the
//! streaming layer, and the single [`BridgeError`] taxonomy.

use std::ffi::c_void;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Runtime type of a variable in the variable space.
///
/// Equality is nominal: two tags are the same type only when they are the
/// same variant, regardless of their in-memory representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeTag {
    /// 32-bit signed integer.
    Int32,
    /// 32-bit IEEE float.
    Float32,
    /// 64-bit IEEE float.
    Float64,
    /// The pipeline's native real sample type (32-bit float).
    DomainReal,
    /// The pipeline's native complex type: `(re, im)` pairs of 32-bit floats.
    DomainComplex,
    /// Character data. Known to the variable space but never streamed.
    Text,
    /// Any other numeric type code, e.g. user-defined structures.
    Other(u32),
}

impl TypeTag {
    /// Map a variable-space type code onto a tag.
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => TypeTag::Text,
            2 => TypeTag::Int32,
            3 => TypeTag::DomainReal,
            4 => TypeTag::Float32,
            5 => TypeTag::Float64,
            6 => TypeTag::DomainComplex,
            other => TypeTag::Other(other),
        }
    }

    /// The variable-space type code of this tag.
    pub fn code(self) -> u32 {
        match self {
            TypeTag::Text => 1,
            TypeTag::Int32 => 2,
            TypeTag::DomainReal => 3,
            TypeTag::Float32 => 4,
            TypeTag::Float64 => 5,
            TypeTag::DomainComplex => 6,
            TypeTag::Other(code) => code,
        }
    }

    /// Number of stream channels occupied by one element of this type.
    pub fn channels_per_element(self) -> u32 {
        match self {
            TypeTag::DomainComplex => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeTag::Int32 => write!(f, "int32"),
            TypeTag::Float32 => write!(f, "float32"),
            TypeTag::Float64 => write!(f, "float64"),
            TypeTag::DomainReal => write!(f, "real"),
            TypeTag::DomainComplex => write!(f, "complex"),
            TypeTag::Text => write!(f, "text"),
            TypeTag::Other(code) => write!(f, "type code {code}"),
        }
    }
}

/// One element of a [`TypeTag::DomainComplex`] variable.
///
/// `repr(C)` guarantees that a slice of `n` values has the same layout as a
/// slice of `2 * n` `f32` values ordered `re₀, im₀, re₁, im₁, …`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[repr(C)]
pub struct Complex32 {
    pub re: f32,
    pub im: f32,
}

impl Complex32 {
    pub const fn new(re: f32, im: f32) -> Self {
        Self { re, im }
    }
}

/// Address of a variable's first element in memory owned by the variable
/// space.
///
/// A `VarAddress` is only a value: copying, comparing and sending it across
/// threads is always fine. Reading through it is governed by the contract
/// of [`VariableDescriptor::new`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarAddress(*const c_void);

// SAFETY: the wrapper never dereferences the pointer; reads happen only
// through `VariableDescriptor`'s documented validity contract.
unsafe impl Send for VarAddress {}
// SAFETY: see above.
unsafe impl Sync for VarAddress {}

impl VarAddress {
    pub const NULL: VarAddress = VarAddress(std::ptr::null());

    pub fn from_ptr<T>(ptr: *const T) -> Self {
        VarAddress(ptr.cast())
    }

    pub fn as_ptr<T>(self) -> *const T {
        self.0.cast()
    }

    pub fn is_null(self) -> bool {
        self.0.is_null()
    }
}

impl Default for VarAddress {
    fn default() -> Self {
        VarAddress::NULL
    }
}

impl fmt::Debug for VarAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VarAddress({:p})", self.0)
    }
}

/// Current shape of a variable: `(type_tag, element_count, address)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariableDescriptor {
    type_tag: TypeTag,
    element_count: u32,
    address: VarAddress,
}

impl VariableDescriptor {
    /// Describe a variable living in foreign memory.
    ///
    /// # Safety
    ///
    /// For the exportable tags (everything except [`TypeTag::Text`] and
    /// [`TypeTag::Other`]) `address` must point to `element_count`
    /// initialised, properly aligned values of the tag's element type
    /// (`i32`, `f32`, `f64`, `f32`, [`Complex32`]). The memory must stay
    /// readable until the variable space reports a different descriptor for
    /// the same variable, and must not be written while a processing cycle
    /// reads it. A null `address` is only allowed with `element_count == 0`.
    pub const unsafe fn new(type_tag: TypeTag, element_count: u32, address: VarAddress) -> Self {
        Self {
            type_tag,
            element_count,
            address,
        }
    }

    pub fn type_tag(&self) -> TypeTag {
        self.type_tag
    }

    pub fn element_count(&self) -> u32 {
        self.element_count
    }

    pub fn address(&self) -> VarAddress {
        self.address
    }

    /// Channel count a stream for this variable must have: the element
    /// count, doubled for complex variables.
    pub fn expected_channel_count(&self) -> u32 {
        self.element_count
            .saturating_mul(self.type_tag.channels_per_element())
    }
}

/// Wire format of one channel value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelFormat {
    Int32,
    Float32,
    Double64,
}

/// Metadata of one outbound stream. Fixed for the lifetime of the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    /// Stream name; the variable name.
    pub name: String,
    /// Content type label, one per exported type.
    pub type_label: String,
    pub channel_count: u32,
    /// Nominal sampling rate in Hz.
    pub nominal_srate: f64,
    pub channel_format: ChannelFormat,
    /// Stable source identifier; empty when none was configured.
    pub source_id: String,
}

/// Every failure the bridge can report. None of them is retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BridgeError {
    /// A requested variable does not exist when the registry is built.
    #[error("No such variable: \"{0}\"")]
    NoSuchVariable(String),

    /// A variable's type cannot be streamed.
    #[error("Unknown data type for variable \"{name}\": {tag}")]
    UnknownType { name: String, tag: TypeTag },

    /// A monitored variable vanished from the variable space between cycles.
    #[error("Monitored variable disappeared: \"{0}\"")]
    MissingVariable(String),

    /// The name listing of the variable space outgrew the discovery buffer.
    #[error(
        "List of all variables is longer than {limit} bytes. Select a subset by setting \"vars\"."
    )]
    DiscoveryOverflow { limit: usize },

    /// The handle to the variable space is no longer valid.
    #[error("Variable space handle is invalid")]
    InvalidHandle,

    /// Emission attempted from a real-time scheduled thread in strict mode.
    #[error("Bridge used in real-time thread (policy {policy}) with rt_strict enabled")]
    RealTimeSafety { policy: String },

    /// The scheduling parameters of the calling thread could not be read.
    #[error("Could not retrieve thread scheduling parameters: {0}")]
    SchedulingQuery(String),

    /// The streaming layer refused to create an outlet.
    #[error("Stream outlet error: {0}")]
    Outlet(String),

    /// A configuration value is out of range or malformed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A parameter is locked while the bridge is prepared.
    #[error("Parameter \"{0}\" is locked while the bridge is prepared")]
    Locked(String),
}

impl BridgeError {
    /// `true` for errors caused by the configuration rather than by a change
    /// in the running system.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            BridgeError::NoSuchVariable(_)
                | BridgeError::UnknownType { .. }
                | BridgeError::InvalidConfig(_)
                | BridgeError::Locked(_)
        )
    }
}

/// Result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, BridgeError>;
