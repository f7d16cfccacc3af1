//! The outlet contract.
//!
//! Any streaming library can back the bridge by implementing these two
//! traits: [`OutletProvider`] creates one stream per [`StreamInfo`],
//! [`StreamOutlet`] accepts samples for it.

use varstream_types::{ChannelFormat, Result, StreamInfo};

/// One sample, borrowed straight from the variable's memory.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleRef<'a> {
    Int32(&'a [i32]),
    Float32(&'a [f32]),
    Float64(&'a [f64]),
}

impl SampleRef<'_> {
    /// Number of channel values in the sample.
    pub fn len(&self) -> usize {
        match self {
            SampleRef::Int32(v) => v.len(),
            SampleRef::Float32(v) => v.len(),
            SampleRef::Float64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn channel_format(&self) -> ChannelFormat {
        match self {
            SampleRef::Int32(_) => ChannelFormat::Int32,
            SampleRef::Float32(_) => ChannelFormat::Float32,
            SampleRef::Float64(_) => ChannelFormat::Double64,
        }
    }
}

/// A single outbound stream.
///
/// Dropping the outlet closes the stream.
pub trait StreamOutlet: Send {
    /// Metadata the stream was created with. Never changes.
    fn info(&self) -> &StreamInfo;

    /// Push one sample.
    ///
    /// The sample length equals `info().channel_count` and its format equals
    /// `info().channel_format`; callers uphold this. Delivery is best
    /// effort: transport problems are the implementation's concern and are
    /// not reported back to the bridge.
    fn push_sample(&mut self, sample: SampleRef<'_>);
}

/// Factory for [`StreamOutlet`]s.
pub trait OutletProvider: Send + Sync {
    /// Open a new stream described by `info`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Outlet`][varstream_types::BridgeError::Outlet]
    /// when the stream cannot be created.
    fn create_outlet(&self, info: StreamInfo) -> Result<Box<dyn StreamOutlet>>;
}
