// FRAME TABLE
//
// The ordered idx1 records of one buffer generation, plus the movi
// position their offsets are measured from. Order is presentation order;
// duplicates and omissions are legal.

use tracing::{debug, info};

use crate::container::AviFile;
use crate::error::AviError;
use crate::frame::Frame;
use crate::index::{parse_idx1, IndexRecord};
use crate::riff::{self, read_chunk_header, AviLayout, FieldReader, FourCc};

#[derive(Debug, Clone)]
pub struct FrameTable {
    layout: AviLayout,
    records: Vec<IndexRecord>,
    generation: u64,
}

impl FrameTable {
    /// Locate movi/idx1 in the container's buffer, parse the index and
    /// normalize its offsets to movi-relative.
    pub fn parse(file: &AviFile) -> Result<Self, AviError> {
        Self::from_bytes(file.bytes(), file.generation())
    }

    pub(crate) fn from_bytes(data: &[u8], generation: u64) -> Result<Self, AviError> {
        let layout = riff::locate(data)?;
        let mut records = parse_idx1(data, &layout.idx1)?;
        normalize_offsets(data, layout.movi_position, &mut records)?;

        info!(
            "Frame table: {} records, movi at {}, generation {}",
            records.len(),
            layout.movi_position,
            generation
        );

        Ok(Self {
            layout,
            records,
            generation,
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[IndexRecord] {
        &self.records
    }

    /// Replace the whole record sequence. The new records must come from
    /// this table (or another table of the same generation); their
    /// offsets are resolved against the same movi position.
    pub fn set_records(&mut self, records: Vec<IndexRecord>) {
        self.records = records;
    }

    pub fn movi_position(&self) -> usize {
        self.layout.movi_position
    }

    pub fn layout(&self) -> &AviLayout {
        &self.layout
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn video_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_video()).count()
    }

    pub fn keyframe_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_keyframe()).count()
    }

    pub(crate) fn check_generation(&self, file: &AviFile) -> Result<(), AviError> {
        if self.generation != file.generation() {
            return Err(AviError::StaleReference {
                table: self.generation,
                buffer: file.generation(),
            });
        }
        Ok(())
    }

    /// Materialize the frame at `index`.
    pub fn at<'a>(&self, file: &'a AviFile, index: usize) -> Result<Frame<'a>, AviError> {
        self.check_generation(file)?;
        let record = *self.records.get(index).ok_or(AviError::OutOfRange {
            index,
            len: self.records.len(),
        })?;
        let payload = resolve(file.bytes(), self.layout.movi_position, &record, index)?;
        Ok(Frame::new(payload, record))
    }

    pub fn frames<'a>(
        &'a self,
        file: &'a AviFile,
    ) -> impl Iterator<Item = Result<Frame<'a>, AviError>> + 'a {
        (0..self.records.len()).map(move |i| self.at(file, i))
    }
}

/// Payload of `record`, after checking that the chunk header it points at
/// carries the same tag and size.
pub(crate) fn resolve<'a>(
    data: &'a [u8],
    movi_position: usize,
    record: &IndexRecord,
    index: usize,
) -> Result<&'a [u8], AviError> {
    let start = movi_position.saturating_add(record.offset() as usize);
    let header = read_chunk_header(data, start)?;
    if header.fourcc != record.tag() || header.size != record.size() {
        return Err(AviError::format(format!(
            "index record {} ('{}', {} bytes) does not match chunk '{}' ({} bytes) at offset {}",
            index,
            record.tag(),
            record.size(),
            header.fourcc,
            header.size,
            start
        )));
    }
    FieldReader::at(data, header.data_start(), "frame payload").bytes(record.size() as usize)
}

fn tag_at(data: &[u8], offset: usize) -> Option<FourCc> {
    FieldReader::at(data, offset, "chunk tag").fourcc().ok()
}

/// Encoders disagree on whether idx1 offsets are movi-relative or absolute.
/// Probe the first record; if it does not resolve relative to movi, rebase
/// every record by the movi position.
fn normalize_offsets(
    data: &[u8],
    movi_position: usize,
    records: &mut [IndexRecord],
) -> Result<(), AviError> {
    let Some(first) = records.first().copied() else {
        return Ok(());
    };

    if tag_at(data, movi_position.saturating_add(first.offset() as usize)) == Some(first.tag()) {
        debug!("idx1 offsets are movi-relative");
        return Ok(());
    }

    let base = u32::try_from(movi_position)
        .map_err(|_| AviError::format("movi list lies beyond the 32-bit offset range"))?;
    if first.offset() < base || tag_at(data, first.offset() as usize) != Some(first.tag()) {
        return Err(AviError::format(format!(
            "first idx1 record ('{}' at offset {}) resolves neither relative to movi nor absolute",
            first.tag(),
            first.offset()
        )));
    }

    debug!("idx1 offsets are absolute; rebasing by {}", base);
    for (i, record) in records.iter_mut().enumerate() {
        let offset = record.offset().checked_sub(base).ok_or_else(|| {
            AviError::format(format!(
                "idx1 record {} offset {} precedes movi at {}",
                i,
                record.offset(),
                base
            ))
        })?;
        *record = record.with_offset(offset);
    }
    Ok(())
}
