//! idx1 index records and their classification.

use bytes::BufMut;
use serde::Serialize;
use tracing::warn;

use crate::error::AviError;
use crate::riff::{ChunkHeader, FieldReader, FourCc};

pub const AVIIF_LIST: u32 = 0x0000_0001;
pub const AVIIF_KEYFRAME: u32 = 0x0000_0010;
pub const AVIIF_NO_TIME: u32 = 0x0000_0100;

/// Stream class of a data chunk, taken from the last two characters of
/// its tag once at parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    /// `##dc`
    VideoCompressed,
    /// `##db`
    VideoUncompressed,
    /// `##wb`
    Audio,
    Other,
}

impl FrameKind {
    pub fn from_fourcc(tag: FourCc) -> Self {
        match &tag.suffix() {
            b"dc" => FrameKind::VideoCompressed,
            b"db" => FrameKind::VideoUncompressed,
            b"wb" => FrameKind::Audio,
            _ => FrameKind::Other,
        }
    }

    pub fn is_video(self) -> bool {
        matches!(self, FrameKind::VideoCompressed | FrameKind::VideoUncompressed)
    }

    pub fn is_audio(self) -> bool {
        self == FrameKind::Audio
    }
}

/// One 16-byte idx1 entry. `offset` is movi-relative once the owning
/// frame table has normalized it: `movi_position + offset` addresses the
/// chunk header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexRecord {
    tag: FourCc,
    kind: FrameKind,
    flags: u32,
    offset: u32,
    size: u32,
}

impl IndexRecord {
    pub const LEN: usize = 16;

    pub fn new(tag: FourCc, flags: u32, offset: u32, size: u32) -> Self {
        Self {
            tag,
            kind: FrameKind::from_fourcc(tag),
            flags,
            offset,
            size,
        }
    }

    pub fn tag(&self) -> FourCc {
        self.tag
    }

    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn with_flags(self, flags: u32) -> Self {
        Self { flags, ..self }
    }

    pub(crate) fn with_offset(self, offset: u32) -> Self {
        Self { offset, ..self }
    }

    pub fn is_video(&self) -> bool {
        self.kind.is_video()
    }

    pub fn is_audio(&self) -> bool {
        self.kind.is_audio()
    }

    pub fn is_keyframe(&self) -> bool {
        self.is_video() && self.flags & AVIIF_KEYFRAME != 0
    }

    pub fn is_deltaframe(&self) -> bool {
        self.is_video() && self.flags & AVIIF_KEYFRAME == 0
    }

    pub fn put<B: BufMut>(&self, buf: &mut B) {
        buf.put_slice(self.tag.as_bytes());
        buf.put_u32_le(self.flags);
        buf.put_u32_le(self.offset);
        buf.put_u32_le(self.size);
    }
}

/// Parse the records of an idx1 chunk, with offsets exactly as stored.
pub fn parse_idx1(data: &[u8], idx1: &ChunkHeader) -> Result<Vec<IndexRecord>, AviError> {
    if idx1.size as usize % IndexRecord::LEN != 0 {
        warn!(
            "idx1 size {} is not a multiple of {}; ignoring {} trailing bytes",
            idx1.size,
            IndexRecord::LEN,
            idx1.size as usize % IndexRecord::LEN
        );
    }

    let count = idx1.size as usize / IndexRecord::LEN;
    let mut reader = FieldReader::at(data, idx1.data_start(), "idx1 record");
    let mut records = Vec::with_capacity(count);
    for _ in 0..count {
        let tag = reader.fourcc()?;
        let flags = reader.u32()?;
        let offset = reader.u32()?;
        let size = reader.u32()?;
        records.push(IndexRecord::new(tag, flags, offset, size));
    }
    Ok(records)
}
