//! # Sample Codec
//!
//! Samples are kept unpacked while recording and folding. The 64-bit wire word
//! is produced only when a frame is dumped:
//!
//! ```text
//! bits  0..45  value (timestamp delta or counter magnitude)
//! bits 45..48  sample type
//! bits 48..64  id (PointId in raw streams, ExecId in tree-mapped streams)
//! ```

use bytemuck::{Pod, Zeroable};

/// The kind of event a sample records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SampleType {
    /// A scope was opened; value is the begin time.
    ScopeBegin = 0,
    /// A scope was closed; value is the end time.
    ScopeEnd = 1,
    /// GPU time attributed to the enclosing scope.
    GpuTime = 2,
    /// A counter value.
    Counter = 3,
}

impl SampleType {
    /// All sample types in encoding order.
    pub const ALL: [SampleType; 4] = [
        SampleType::ScopeBegin,
        SampleType::ScopeEnd,
        SampleType::GpuTime,
        SampleType::Counter,
    ];

    fn from_bits(bits: u64) -> Option<Self> {
        Self::ALL.get(bits as usize).copied()
    }

    /// Returns `true` for scope begin/end samples, which carry cpu timestamps.
    pub fn is_scope(self) -> bool {
        matches!(self, SampleType::ScopeBegin | SampleType::ScopeEnd)
    }
}

/// Id types that can address a sample.
pub trait SampleId: Copy + Eq + std::fmt::Debug + From<u16> + Into<u16> {}

impl<T> SampleId for T where T: Copy + Eq + std::fmt::Debug + From<u16> + Into<u16> {}

/// One recorded event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Sample<I> {
    /// Event kind.
    pub kind: SampleType,
    /// Point or exec node the event belongs to.
    pub id: I,
    /// Value, limited to [`Sample::VALUE_BITS`] bits.
    pub value: u64,
}

impl<I: SampleId> Sample<I> {
    /// Number of bits available for the value.
    pub const VALUE_BITS: u32 = 45;
    /// Mask selecting the value bits.
    pub const VALUE_MASK: u64 = (1u64 << Self::VALUE_BITS) - 1;

    /// Creates a sample, truncating `value` to the encodable range.
    #[inline]
    pub fn new(kind: SampleType, id: I, value: u64) -> Self {
        Self {
            kind,
            id,
            value: value & Self::VALUE_MASK,
        }
    }

    /// Replaces the value, truncating it to the encodable range.
    #[inline]
    pub fn set_value(&mut self, value: u64) {
        self.value = value & Self::VALUE_MASK;
    }

    /// Returns the same event addressed by a different id.
    #[inline]
    pub fn with_id<J: SampleId>(self, id: J) -> Sample<J> {
        Sample {
            kind: self.kind,
            id,
            value: self.value,
        }
    }

    /// Packs the sample into its wire word.
    #[inline]
    pub fn encode(self) -> PackedSample {
        PackedSample::encode(self.kind, self.id.into(), self.value)
    }

    /// Unpacks a wire word.
    #[inline]
    pub fn decode(packed: PackedSample) -> Option<Self> {
        let (kind, id, value) = packed.decode()?;
        Some(Self {
            kind,
            id: I::from(id),
            value,
        })
    }
}

/// A sample packed into a single 64-bit word.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Pod, Zeroable)]
#[repr(transparent)]
pub struct PackedSample(pub u64);

impl PackedSample {
    const TYPE_SHIFT: u32 = 45;
    const ID_SHIFT: u32 = 48;

    /// Packs `(kind, id, value)`; value bits above 45 are dropped.
    #[inline]
    pub fn encode(kind: SampleType, id: u16, value: u64) -> Self {
        let value = value & ((1u64 << Self::TYPE_SHIFT) - 1);
        let kind = (kind as u64) << Self::TYPE_SHIFT;
        let id = (id as u64) << Self::ID_SHIFT;
        PackedSample(value | kind | id)
    }

    /// Packs `(kind, id, value)`, returning `None` if either does not fit.
    pub fn checked_encode(kind: SampleType, id: u32, value: u64) -> Option<Self> {
        let id = u16::try_from(id).ok()?;
        if value >> Self::TYPE_SHIFT != 0 {
            return None;
        }
        Some(Self::encode(kind, id, value))
    }

    /// Unpacks into `(kind, id, value)`; `None` if the type bits are unused.
    #[inline]
    pub fn decode(self) -> Option<(SampleType, u16, u64)> {
        let kind = SampleType::from_bits((self.0 >> Self::TYPE_SHIFT) & 0x7)?;
        let id = (self.0 >> Self::ID_SHIFT) as u16;
        let value = self.0 & ((1u64 << Self::TYPE_SHIFT) - 1);
        Some((kind, id, value))
    }
}
