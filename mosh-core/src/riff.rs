// RIFF CHUNK WALKER
//
// Every chunk is a 4-byte tag and a little-endian u32 size, followed by
// `size` bytes of body and one pad byte when `size` is odd. LIST chunks
// open their body with a 4-byte list type and nest further chunks.
//
// RIFF 'AVI '
// ├── LIST 'hdrl'
// │   ├── avih (main header)
// │   └── LIST 'strl' (per stream)
// ├── LIST 'movi'
// │   ├── 00dc (video data)
// │   └── 01wb (audio data)
// └── idx1 (index)

use std::fmt;

use bytes::Buf;
use serde::{Serialize, Serializer};
use tracing::{debug, warn};

use crate::error::AviError;

// ============================================================================
// FourCC
// ============================================================================

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FourCc(pub [u8; 4]);

impl FourCc {
    pub const RIFF: FourCc = FourCc(*b"RIFF");
    pub const AVI: FourCc = FourCc(*b"AVI ");
    pub const LIST: FourCc = FourCc(*b"LIST");
    pub const JUNK: FourCc = FourCc(*b"JUNK");
    pub const HDRL: FourCc = FourCc(*b"hdrl");
    pub const AVIH: FourCc = FourCc(*b"avih");
    pub const STRL: FourCc = FourCc(*b"strl");
    pub const STRH: FourCc = FourCc(*b"strh");
    pub const STRF: FourCc = FourCc(*b"strf");
    pub const STRN: FourCc = FourCc(*b"strn");
    pub const VPRP: FourCc = FourCc(*b"vprp");
    pub const MOVI: FourCc = FourCc(*b"movi");
    pub const IDX1: FourCc = FourCc(*b"idx1");
    pub const INFO: FourCc = FourCc(*b"INFO");
    pub const VIDS: FourCc = FourCc(*b"vids");
    pub const AUDS: FourCc = FourCc(*b"auds");
    pub const TXTS: FourCc = FourCc(*b"txts");

    pub const fn new(bytes: [u8; 4]) -> Self {
        FourCc(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// Two-character type suffix of a stream chunk tag ("dc" in "00dc").
    pub fn suffix(&self) -> [u8; 2] {
        [self.0[2], self.0[3]]
    }

    /// Stream number encoded in the first two characters of a data chunk
    /// tag ("01" in "01wb").
    pub fn stream_number(&self) -> Option<u16> {
        let (hi, lo) = (self.0[0], self.0[1]);
        if hi.is_ascii_digit() && lo.is_ascii_digit() {
            Some(u16::from(hi - b'0') * 10 + u16::from(lo - b'0'))
        } else {
            None
        }
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            let c = if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' };
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

impl fmt::Debug for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCc(\"{}\")", self)
    }
}

impl Serialize for FourCc {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ============================================================================
// Bounds-checked field reads
// ============================================================================

/// Little-endian field reader over a byte slice. Every read checks the
/// remaining length first and reports a `Truncated` error instead of
/// panicking.
pub(crate) struct FieldReader<'a> {
    data: &'a [u8],
    pos: usize,
    what: &'static str,
}

impl<'a> FieldReader<'a> {
    pub(crate) fn new(data: &'a [u8], what: &'static str) -> Self {
        Self { data, pos: 0, what }
    }

    pub(crate) fn at(data: &'a [u8], pos: usize, what: &'static str) -> Self {
        Self { data, pos, what }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    fn need(&self, n: usize) -> Result<(), AviError> {
        let available = self.remaining();
        if available < n {
            return Err(AviError::Truncated {
                what: self.what,
                offset: self.pos,
                needed: n,
                available,
            });
        }
        Ok(())
    }

    pub(crate) fn u16(&mut self) -> Result<u16, AviError> {
        self.need(2)?;
        let mut cursor = &self.data[self.pos..];
        self.pos += 2;
        Ok(cursor.get_u16_le())
    }

    pub(crate) fn u32(&mut self) -> Result<u32, AviError> {
        self.need(4)?;
        let mut cursor = &self.data[self.pos..];
        self.pos += 4;
        Ok(cursor.get_u32_le())
    }

    pub(crate) fn i32(&mut self) -> Result<i32, AviError> {
        self.need(4)?;
        let mut cursor = &self.data[self.pos..];
        self.pos += 4;
        Ok(cursor.get_i32_le())
    }

    pub(crate) fn fourcc(&mut self) -> Result<FourCc, AviError> {
        self.need(4)?;
        let mut tag = [0u8; 4];
        tag.copy_from_slice(&self.data[self.pos..self.pos + 4]);
        self.pos += 4;
        Ok(FourCc(tag))
    }

    pub(crate) fn bytes(&mut self, n: usize) -> Result<&'a [u8], AviError> {
        self.need(n)?;
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }
}

// ============================================================================
// Chunks
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub fourcc: FourCc,
    /// Declared body size; excludes the header and the pad byte.
    pub size: u32,
    /// Absolute offset of the tag field.
    pub offset: usize,
}

impl ChunkHeader {
    pub const LEN: usize = 8;

    pub fn data_start(&self) -> usize {
        self.offset + Self::LEN
    }

    pub fn data_end(&self) -> usize {
        self.data_start() + self.size as usize
    }

    pub fn padded_end(&self) -> usize {
        self.data_end() + (self.size as usize & 1)
    }
}

pub fn read_chunk_header(data: &[u8], offset: usize) -> Result<ChunkHeader, AviError> {
    let mut reader = FieldReader::at(data, offset, "chunk header");
    let fourcc = reader.fourcc()?;
    let size = reader.u32()?;
    Ok(ChunkHeader { fourcc, size, offset })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry {
    Chunk(ChunkHeader),
    List { header: ChunkHeader, list_type: FourCc },
}

impl Entry {
    pub fn header(&self) -> &ChunkHeader {
        match self {
            Entry::Chunk(header) => header,
            Entry::List { header, .. } => header,
        }
    }
}

/// Iterates sibling chunks in `[pos, end)`, skipping each body (and its
/// pad byte). Lists are not entered automatically; use [`ChunkWalker::children`].
pub struct ChunkWalker<'a> {
    data: &'a [u8],
    pos: usize,
    end: usize,
}

impl<'a> ChunkWalker<'a> {
    pub fn new(data: &'a [u8], start: usize, end: usize) -> Self {
        Self {
            data,
            pos: start,
            end: end.min(data.len()),
        }
    }

    /// Walker over the chunks following the 12-byte RIFF/AVI header.
    pub fn top_level(data: &'a [u8]) -> Result<Self, AviError> {
        read_riff_header(data)?;
        Ok(Self::new(data, RiffHeader::LEN, data.len()))
    }

    /// Walker over the children of a LIST entry. Plain chunks have none.
    pub fn children(data: &'a [u8], entry: &Entry) -> Self {
        match entry {
            Entry::List { header, .. } => Self::new(data, header.data_start() + 4, header.data_end()),
            Entry::Chunk(header) => Self::new(data, header.data_end(), header.data_end()),
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn next_entry(&mut self) -> Result<Option<Entry>, AviError> {
        if self.pos + ChunkHeader::LEN > self.end {
            return Ok(None);
        }

        let header = read_chunk_header(self.data, self.pos)?;
        if header.data_end() > self.end {
            return Err(AviError::Truncated {
                what: "chunk body",
                offset: header.data_start(),
                needed: header.size as usize,
                available: self.end.saturating_sub(header.data_start()),
            });
        }

        let entry = if header.fourcc == FourCc::LIST {
            if header.size < 4 {
                return Err(AviError::format(format!(
                    "LIST at offset {} is too small to hold a list type ({} bytes)",
                    header.offset, header.size
                )));
            }
            let list_type = FieldReader::at(self.data, header.data_start(), "list type").fourcc()?;
            Entry::List { header, list_type }
        } else {
            Entry::Chunk(header)
        };

        self.pos = header.padded_end().min(self.end);
        Ok(Some(entry))
    }

    /// First direct child chunk with the given tag.
    pub fn find(mut self, fourcc: FourCc) -> Result<Option<ChunkHeader>, AviError> {
        while let Some(entry) = self.next_entry()? {
            if let Entry::Chunk(header) = entry {
                if header.fourcc == fourcc {
                    return Ok(Some(header));
                }
            }
        }
        Ok(None)
    }
}

// ============================================================================
// RIFF header and top-level layout
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RiffHeader {
    /// Declared size: file length minus 8.
    pub size: u32,
    pub form: FourCc,
}

impl RiffHeader {
    pub const LEN: usize = 12;
}

pub fn read_riff_header(data: &[u8]) -> Result<RiffHeader, AviError> {
    let mut reader = FieldReader::new(data, "RIFF header");
    if reader.fourcc()? != FourCc::RIFF {
        return Err(AviError::format("not a RIFF file"));
    }
    let size = reader.u32()?;
    let form = reader.fourcc()?;
    if form != FourCc::AVI {
        return Err(AviError::format(format!("not an AVI file (form type '{}')", form)));
    }
    Ok(RiffHeader { size, form })
}

/// Positions of the chunks the rebuild engine needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AviLayout {
    /// Absolute offset of the `movi` list-type tag; idx1 offsets are
    /// measured from here.
    pub movi_position: usize,
    pub movi: ChunkHeader,
    pub idx1: ChunkHeader,
    /// Absent when hdrl carries no main header; the index is still usable
    /// but the container cannot be rebuilt.
    pub avih: Option<ChunkHeader>,
}

impl AviLayout {
    /// Absolute offset of avih's total-frames field (48 in the usual layout).
    pub fn total_frames_position(&self) -> Option<usize> {
        self.avih.map(|avih| avih.data_start() + 16)
    }
}

/// Walk the top-level LIST/JUNK run to the index. The first chunk that is
/// neither LIST nor JUNK must be `idx1`.
pub fn locate(data: &[u8]) -> Result<AviLayout, AviError> {
    let mut walker = ChunkWalker::top_level(data)?;
    let mut movi = None;
    let mut avih = None;

    let idx1 = loop {
        let entry = walker
            .next_entry()?
            .ok_or_else(|| AviError::format("no idx1 chunk found"))?;

        match entry {
            Entry::List { header, list_type } => {
                debug!("LIST '{}' at {} ({} bytes)", list_type, header.offset, header.size);
                if list_type == FourCc::MOVI {
                    movi = Some(header);
                } else if list_type == FourCc::HDRL && avih.is_none() {
                    avih = ChunkWalker::children(data, &entry).find(FourCc::AVIH)?;
                }
            }
            Entry::Chunk(header) if header.fourcc == FourCc::JUNK => {
                debug!("JUNK at {} ({} bytes)", header.offset, header.size);
            }
            Entry::Chunk(header) if header.fourcc == FourCc::IDX1 => break header,
            Entry::Chunk(header) => {
                return Err(AviError::format(format!(
                    "expected idx1 after the LIST/JUNK run, found '{}' at offset {}",
                    header.fourcc, header.offset
                )));
            }
        }
    };

    let movi = movi.ok_or_else(|| AviError::format("no movi list found before idx1"))?;
    match avih {
        Some(header) if header.size < 20 => {
            return Err(AviError::format(format!("avih too small ({} bytes)", header.size)));
        }
        Some(_) => {}
        None => warn!("no avih main header found in hdrl"),
    }

    Ok(AviLayout {
        movi_position: movi.data_start(),
        movi,
        idx1,
        avih,
    })
}

/// Cheap structural check: RIFF/AVI header, LIST/JUNK run, idx1 in bounds.
pub fn is_formatted(data: &[u8]) -> bool {
    locate(data).is_ok()
}
