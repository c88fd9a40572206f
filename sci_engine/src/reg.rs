use std::fmt;

use serde::{Deserialize, Serialize};

/// Handle to a heap segment. The generation distinguishes successive
/// occupants of the same table slot, so a handle kept past `free` stops
/// resolving instead of aliasing whatever was allocated there next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct SegmentId {
    pub index: u16,
    pub generation: u16,
}

impl SegmentId {
    /// Slot 0 is never allocated; it holds plain numbers.
    pub const NULL: SegmentId = SegmentId {
        index: 0,
        generation: 0,
    };

    pub fn is_null(self) -> bool {
        self.index == 0
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}", self.index)
    }
}

/// A `(segment, offset)` value. Numbers live in the null segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Reg {
    pub segment: SegmentId,
    pub offset: u32,
}

impl Reg {
    pub const NULL: Reg = Reg {
        segment: SegmentId::NULL,
        offset: 0,
    };

    pub fn new(segment: SegmentId, offset: u32) -> Self {
        Reg { segment, offset }
    }

    pub fn number(value: u16) -> Self {
        Reg {
            segment: SegmentId::NULL,
            offset: u32::from(value),
        }
    }

    pub fn is_null(self) -> bool {
        self.segment.is_null() && self.offset == 0
    }

    pub fn is_number(self) -> bool {
        self.segment.is_null()
    }

    /// The low word of the offset, which is what script code sees.
    pub fn to_u16(self) -> u16 {
        self.offset as u16
    }

    pub fn set_segment(&mut self, segment: SegmentId) {
        self.segment = segment;
    }

    pub fn inc_offset(&mut self, delta: i64) {
        self.offset = (i64::from(self.offset) + delta) as u32;
    }

    pub fn with_offset_delta(mut self, delta: i64) -> Self {
        self.inc_offset(delta);
        self
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:04x}", self.segment, self.offset)
    }
}
