//! Materialized view of one index record.

use crate::index::{FrameKind, IndexRecord};
use crate::riff::FourCc;

/// Payload plus the metadata of the record it was resolved from. Borrowed
/// from the container buffer, so it cannot outlive a rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    pub payload: &'a [u8],
    record: IndexRecord,
}

impl<'a> Frame<'a> {
    pub(crate) fn new(payload: &'a [u8], record: IndexRecord) -> Self {
        Self { payload, record }
    }

    pub fn tag(&self) -> FourCc {
        self.record.tag()
    }

    pub fn flags(&self) -> u32 {
        self.record.flags()
    }

    pub fn offset(&self) -> u32 {
        self.record.offset()
    }

    pub fn kind(&self) -> FrameKind {
        self.record.kind()
    }

    pub fn is_video(&self) -> bool {
        self.record.is_video()
    }

    pub fn is_audio(&self) -> bool {
        self.record.is_audio()
    }

    pub fn is_keyframe(&self) -> bool {
        self.record.is_keyframe()
    }

    pub fn is_deltaframe(&self) -> bool {
        self.record.is_deltaframe()
    }

    /// The index record this frame was materialized from.
    pub fn as_record(&self) -> IndexRecord {
        self.record
    }
}
