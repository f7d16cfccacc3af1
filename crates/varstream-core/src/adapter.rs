//! [`BridgeAdapter`] – one exported variable bound to its stream.
//!
//! The adapter caches the variable's address, element count and layout as
//! they were when the stream was opened. [`BridgeAdapter::send_frame`]
//! reads `channel_count` values straight from that address and pushes them
//! as one sample; nothing is copied or allocated by the adapter itself.
//!
//! | Layout | Element | Channels | Format | Label |
//! |---|---|---|---|---|
//! | `Int32` | `i32` | n | int32 | `VAR_INT` |
//! | `Float32` | `f32` | n | float32 | `VAR_FLOAT` |
//! | `Float64` | `f64` | n | double64 | `VAR_DOUBLE` |
//! | `DomainReal` | `f32` | n | float32 | `VAR_REAL` |
//! | `DomainComplex` | `Complex32` | 2n | float32 | `VAR_COMPLEX` |

use varstream_outlet::{SampleRef, StreamOutlet};
use varstream_types::{ChannelFormat, StreamInfo, TypeTag, VarAddress, VariableDescriptor};

/// The five memory layouts the bridge can export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleLayout {
    Int32,
    Float32,
    Float64,
    DomainReal,
    DomainComplex,
}

impl SampleLayout {
    /// Layout for `tag`, or `None` when the tag cannot be exported.
    pub fn for_tag(tag: TypeTag) -> Option<Self> {
        match tag {
            TypeTag::Int32 => Some(SampleLayout::Int32),
            TypeTag::Float32 => Some(SampleLayout::Float32),
            TypeTag::Float64 => Some(SampleLayout::Float64),
            TypeTag::DomainReal => Some(SampleLayout::DomainReal),
            TypeTag::DomainComplex => Some(SampleLayout::DomainComplex),
            TypeTag::Text | TypeTag::Other(_) => None,
        }
    }

    pub fn tag(self) -> TypeTag {
        match self {
            SampleLayout::Int32 => TypeTag::Int32,
            SampleLayout::Float32 => TypeTag::Float32,
            SampleLayout::Float64 => TypeTag::Float64,
            SampleLayout::DomainReal => TypeTag::DomainReal,
            SampleLayout::DomainComplex => TypeTag::DomainComplex,
        }
    }

    pub fn channel_format(self) -> ChannelFormat {
        match self {
            SampleLayout::Int32 => ChannelFormat::Int32,
            SampleLayout::Float64 => ChannelFormat::Double64,
            SampleLayout::Float32 | SampleLayout::DomainReal | SampleLayout::DomainComplex => {
                ChannelFormat::Float32
            }
        }
    }

    /// Content type label of the stream.
    pub fn type_label(self) -> &'static str {
        match self {
            SampleLayout::Int32 => "VAR_INT",
            SampleLayout::Float32 => "VAR_FLOAT",
            SampleLayout::Float64 => "VAR_DOUBLE",
            SampleLayout::DomainReal => "VAR_REAL",
            SampleLayout::DomainComplex => "VAR_COMPLEX",
        }
    }

    /// Stream channels needed for `element_count` elements.
    pub fn channels_for(self, element_count: u32) -> u32 {
        element_count.saturating_mul(self.tag().channels_per_element())
    }
}

/// View `len` values of `T` at `address`.
///
/// # Safety
///
/// `address` must satisfy the validity contract of
/// [`VariableDescriptor::new`] for `len` values of `T` for the whole of `'a`.
unsafe fn view<'a, T>(address: VarAddress, len: usize) -> &'a [T] {
    if len == 0 || address.is_null() {
        return &[];
    }
    // SAFETY: upheld by the caller.
    unsafe { std::slice::from_raw_parts(address.as_ptr::<T>(), len) }
}

/// One exported variable and its open stream.
pub struct BridgeAdapter {
    outlet: Box<dyn StreamOutlet>,
    address: VarAddress,
    element_count: u32,
    layout: SampleLayout,
}

impl BridgeAdapter {
    /// Bind `outlet` to the variable described by `descriptor`.
    ///
    /// The outlet's channel count must equal
    /// `layout.channels_for(descriptor.element_count())`; the factory is
    /// the only caller.
    pub(crate) fn new(
        outlet: Box<dyn StreamOutlet>,
        descriptor: &VariableDescriptor,
        layout: SampleLayout,
    ) -> Self {
        debug_assert_eq!(
            outlet.info().channel_count,
            layout.channels_for(descriptor.element_count())
        );
        Self {
            outlet,
            address: descriptor.address(),
            element_count: descriptor.element_count(),
            layout,
        }
    }

    /// Push one sample read from the current address.
    pub fn send_frame(&mut self) {
        let n = self.element_count as usize;
        let address = self.address;
        // SAFETY: `address` came either from the descriptor this adapter was
        // built from or from `set_address`; both carry the descriptor
        // validity contract for `element_count` elements of `layout`.
        // `Complex32` is `repr(C)` with two `f32` fields, so `n` complex
        // values are exactly `2n` interleaved floats.
        let sample = unsafe {
            match self.layout {
                SampleLayout::Int32 => SampleRef::Int32(view::<i32>(address, n)),
                SampleLayout::Float32 | SampleLayout::DomainReal => {
                    SampleRef::Float32(view::<f32>(address, n))
                }
                SampleLayout::Float64 => SampleRef::Float64(view::<f64>(address, n)),
                SampleLayout::DomainComplex => SampleRef::Float32(view::<f32>(address, 2 * n)),
            }
        };
        self.outlet.push_sample(sample);
    }

    pub fn address(&self) -> VarAddress {
        self.address
    }

    /// Rebind the adapter to a new address. The stream is untouched.
    ///
    /// # Safety
    ///
    /// `address` must satisfy the validity contract of
    /// [`VariableDescriptor::new`] for this adapter's element count and
    /// type, until the next `set_address` or until the adapter is dropped.
    pub unsafe fn set_address(&mut self, address: VarAddress) {
        self.address = address;
    }

    /// Channels per sample, fixed at construction.
    pub fn channel_count(&self) -> u32 {
        self.outlet.info().channel_count
    }

    pub fn element_count(&self) -> u32 {
        self.element_count
    }

    pub fn type_tag(&self) -> TypeTag {
        self.layout.tag()
    }

    pub fn layout(&self) -> SampleLayout {
        self.layout
    }

    pub fn stream_info(&self) -> &StreamInfo {
        self.outlet.info()
    }
}

impl std::fmt::Debug for BridgeAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeAdapter")
            .field("stream", &self.outlet.info().name)
            .field("layout", &self.layout)
            .field("element_count", &self.element_count)
            .field("address", &self.address)
            .finish()
    }
}
