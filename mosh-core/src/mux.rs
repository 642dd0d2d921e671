// MUX / REBUILD ENGINE
//
// Serializes a (possibly transformed) frame table into a new buffer:
//
//   [original bytes up to the movi LIST size field]
//   LIST <4 + data length> 'movi'
//     <tag> <size> <payload> [pad]      per record, in table order
//   idx1 <16 * records>
//     <tag> <flags> <offset> <size>     offsets measured from 'movi'
//
// then patches the RIFF size and avih total-frames fields. The source
// buffer is only replaced once the new one is complete.

use bytes::{BufMut, BytesMut};
use serde::Serialize;
use tracing::info;

use crate::container::{self, AviFile};
use crate::error::AviError;
use crate::index::IndexRecord;
use crate::riff::{self, FourCc};
use crate::table::{resolve, FrameTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RebuildReport {
    pub records: usize,
    pub video_frames: u32,
    pub movi_bytes: usize,
    pub file_size: usize,
    pub generation: u64,
}

fn to_u32(value: usize, what: &str) -> Result<u32, AviError> {
    u32::try_from(value)
        .map_err(|_| AviError::format(format!("{} ({} bytes) exceeds the 32-bit RIFF limit", what, value)))
}

/// Build the new container bytes for `table` without touching `source`.
/// The table's layout must be the one `source` actually has.
pub(crate) fn mux(source: &[u8], table: &FrameTable) -> Result<(Vec<u8>, RebuildReport), AviError> {
    let layout = table.layout();
    if riff::locate(source)? != *layout {
        return Err(AviError::format(
            "frame table layout does not match the buffer being rebuilt",
        ));
    }
    let total_frames = layout
        .total_frames_position()
        .ok_or_else(|| AviError::format("cannot rebuild without an avih main header"))?;
    let movi = layout.movi_position;
    let size_field = movi - 4;

    let payload_bytes: usize = table.records().iter().map(|r| r.size() as usize + 9).sum();
    let mut out = BytesMut::with_capacity(
        size_field + payload_bytes + table.len() * IndexRecord::LEN + 16,
    );
    out.put_slice(&source[..size_field]);
    out.put_u32_le(0);
    out.put_slice(FourCc::MOVI.as_bytes());

    let mut entries = Vec::with_capacity(table.len());
    for (i, record) in table.records().iter().enumerate() {
        let payload = resolve(source, movi, record, i)?;
        let offset = to_u32(out.len() - movi, "movi list")?;

        out.put_slice(record.tag().as_bytes());
        out.put_u32_le(record.size());
        out.put_slice(payload);
        if payload.len() % 2 == 1 {
            out.put_u8(0);
        }

        entries.push(record.with_offset(offset));
    }

    let movi_bytes = out.len() - movi;
    let movi_size = to_u32(movi_bytes, "movi list")?;
    out[size_field..movi].copy_from_slice(&movi_size.to_le_bytes());

    let idx1_size = to_u32(entries.len() * IndexRecord::LEN, "idx1")?;
    out.put_slice(FourCc::IDX1.as_bytes());
    out.put_u32_le(idx1_size);
    for entry in &entries {
        entry.put(&mut out);
    }

    let riff_size = to_u32(out.len() - 8, "RIFF")?;
    out[4..8].copy_from_slice(&riff_size.to_le_bytes());

    let video_frames = to_u32(entries.iter().filter(|r| r.is_video()).count(), "video frame count")?;
    if total_frames + 4 > size_field {
        return Err(AviError::format("avih main header overlaps the movi list"));
    }
    out[total_frames..total_frames + 4].copy_from_slice(&video_frames.to_le_bytes());

    let report = RebuildReport {
        records: entries.len(),
        video_frames,
        movi_bytes: movi_bytes - 4,
        file_size: out.len(),
        generation: table.generation(),
    };
    Ok((out.to_vec(), report))
}

/// Rebuild `file` from `table`, swapping in the new buffer on success.
/// Returns the report and a frame table re-derived from the new buffer.
pub fn rebuild(file: &mut AviFile, table: &FrameTable) -> Result<(RebuildReport, FrameTable), AviError> {
    table.check_generation(file)?;

    let (data, mut report) = mux(file.bytes(), table)?;
    let generation = container::next_generation();
    let rebuilt = FrameTable::from_bytes(&data, generation)?;
    file.replace(data, generation);
    report.generation = generation;

    info!(
        "Rebuilt container: {} records ({} video), {} bytes, generation {}",
        report.records, report.video_frames, report.file_size, report.generation
    );
    Ok((report, rebuilt))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::AviBuilder;
    use crate::index::AVIIF_KEYFRAME;
    use crate::riff::read_chunk_header;
    use crate::transform::{Transform, TransformChain};

    fn u32_at(data: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]])
    }

    fn sample() -> AviFile {
        AviBuilder::new()
            .video_key(&[1; 10])
            .audio(&[2; 7])
            .video_delta(&[3; 5])
            .audio(&[4; 8])
            .video_key(&[5; 3])
            .absolute_offsets()
            .into_file()
    }

    fn assert_offsets_resolve(file: &AviFile, table: &FrameTable) {
        let data = file.bytes();
        for record in table.records() {
            let at = table.movi_position() + record.offset() as usize;
            assert_eq!(&data[at..at + 4], record.tag().as_bytes());
            assert_eq!(u32_at(data, at + 4), record.size());
        }
    }

    #[test]
    fn identity_round_trip_preserves_frames() {
        let mut file = sample();
        let before = file.frame_table().unwrap();
        let original: Vec<_> = before
            .frames(&file)
            .map(|f| f.map(|f| (f.tag(), f.flags(), f.payload.to_vec())))
            .collect::<Result<_, _>>()
            .unwrap();

        let (_, after) = rebuild(&mut file, &before).unwrap();
        let rebuilt: Vec<_> = after
            .frames(&file)
            .map(|f| f.map(|f| (f.tag(), f.flags(), f.payload.to_vec())))
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(original, rebuilt);
        assert_offsets_resolve(&file, &after);
    }

    #[test]
    fn header_fields_are_patched() {
        let mut file = sample();
        let mut table = file.frame_table().unwrap();
        let records = Transform::Lookahead { window: 2 }.apply(table.records()).unwrap();
        let videos = records.iter().filter(|r| r.is_video()).count() as u32;
        table.set_records(records);

        let (report, after) = rebuild(&mut file, &table).unwrap();
        let data = file.bytes();
        assert_eq!(u32_at(data, 4) as usize, data.len() - 8);
        assert_eq!(u32_at(data, 48), videos);
        assert_eq!(report.video_frames, videos);
        assert_eq!(report.file_size, data.len());

        // idx1 ends the file and the movi LIST size covers its data
        let idx1 = after.layout().idx1;
        assert_eq!(idx1.data_end(), data.len());
        assert_eq!(after.layout().movi.data_end(), idx1.offset);
    }

    #[test]
    fn odd_payload_is_padded() {
        let mut file = AviBuilder::new().video_key(&[9; 7]).video_delta(&[8; 2]).into_file();
        let table = file.frame_table().unwrap();
        let (_, after) = rebuild(&mut file, &table).unwrap();

        let first = after.records()[0];
        let second = after.records()[1];
        assert_eq!(second.offset() - first.offset(), 16);

        let at = after.movi_position() + first.offset() as usize;
        let header = read_chunk_header(file.bytes(), at).unwrap();
        assert_eq!(header.size, 7);
        assert_eq!(file.bytes()[header.data_end()], 0);
    }

    #[test]
    fn padding_gap_matches_parity() {
        let mut file = sample();
        let table = file.frame_table().unwrap();
        let (_, after) = rebuild(&mut file, &table).unwrap();

        for pair in after.records().windows(2) {
            let gap = pair[1].offset() - pair[0].offset() - 8 - pair[0].size();
            assert_eq!(gap, pair[0].size() % 2);
        }
    }

    #[test]
    fn first_record_lands_after_movi_tag() {
        let mut file = sample();
        let table = file.frame_table().unwrap();
        let (_, after) = rebuild(&mut file, &table).unwrap();
        assert_eq!(after.records()[0].offset(), 4);
    }

    #[test]
    fn duplicated_records_get_distinct_offsets() {
        let mut file = sample();
        let mut table = file.frame_table().unwrap();
        let first = table.records()[0];
        table.set_records(vec![first, first, first]);

        let (report, after) = rebuild(&mut file, &table).unwrap();
        assert_eq!(report.records, 3);
        let offsets: Vec<_> = after.records().iter().map(|r| r.offset()).collect();
        assert_eq!(offsets, vec![4, 22, 40]);
        assert_offsets_resolve(&file, &after);
    }

    #[test]
    fn resync_then_strip_rebuilds_consistently() {
        let mut file = sample();
        let mut table = file.frame_table().unwrap();
        let chain = TransformChain::new().then(Transform::Resync).then(Transform::StripKeyframes);
        table.set_records(chain.apply(table.records()).unwrap());

        let (_, after) = rebuild(&mut file, &table).unwrap();
        assert_eq!(after.keyframe_count(), 0);
        assert_eq!(after.video_count(), 3);
        // last keyframe now carries the delta payload
        assert_eq!(after.at(&file, 4).unwrap().payload, &[3; 5]);
        assert_offsets_resolve(&file, &after);
    }

    #[test]
    fn empty_table_rebuilds_to_empty_index() {
        let mut file = sample();
        let mut table = file.frame_table().unwrap();
        table.set_records(Vec::new());

        let (report, after) = rebuild(&mut file, &table).unwrap();
        assert_eq!(report.records, 0);
        assert!(after.is_empty());
        assert_eq!(u32_at(file.bytes(), 48), 0);
    }

    #[test]
    fn stale_table_is_rejected_and_buffer_untouched() {
        let mut file = sample();
        let stale = file.frame_table().unwrap();
        rebuild(&mut file, &stale).unwrap();

        let snapshot = file.bytes().to_vec();
        let err = rebuild(&mut file, &stale).unwrap_err();
        assert!(matches!(
            err,
            AviError::StaleReference { table, buffer } if table == stale.generation() && buffer == file.generation()
        ));
        assert!(matches!(stale.at(&file, 0), Err(AviError::StaleReference { .. })));
        assert_eq!(file.bytes(), snapshot.as_slice());
    }

    #[test]
    fn unreadable_record_fails_without_swapping() {
        let mut file = sample();
        let mut table = file.frame_table().unwrap();
        let bogus = IndexRecord::new(FourCc(*b"00dc"), AVIIF_KEYFRAME, 2, 10);
        table.set_records(vec![table.records()[0], bogus]);

        let snapshot = file.bytes().to_vec();
        let generation = file.generation();
        let err = rebuild(&mut file, &table).unwrap_err();
        assert!(matches!(err, AviError::Format(_)));
        assert_eq!(file.bytes(), snapshot.as_slice());
        assert_eq!(file.generation(), generation);
    }

    #[test]
    fn table_from_another_file_is_stale() {
        let mut small = AviBuilder::new().video_key(&[1; 2]).into_file();
        let big = AviBuilder::new().junk(4000).video_key(&[2; 64]).into_file();
        let foreign = big.frame_table().unwrap();

        let snapshot = small.bytes().to_vec();
        assert!(matches!(rebuild(&mut small, &foreign), Err(AviError::StaleReference { .. })));
        assert_eq!(small.bytes(), snapshot.as_slice());
    }

    #[test]
    fn foreign_layout_is_rejected_before_copying() {
        let small = AviBuilder::new().video_key(&[1; 2]).into_file();
        let big = AviBuilder::new().junk(4000).video_key(&[2; 64]).build();
        // same generation, layout taken from a much larger buffer
        let foreign = FrameTable::from_bytes(&big, small.generation()).unwrap();

        let err = mux(small.bytes(), &foreign).unwrap_err();
        assert!(matches!(err, AviError::Format(ref m) if m.contains("layout does not match")));
    }

    #[test]
    fn rebuild_requires_main_header() {
        let mut file = AviBuilder::new().video_key(&[1; 4]).without_main_header().into_file();
        let table = file.frame_table().unwrap();
        assert_eq!(table.len(), 1);

        let snapshot = file.bytes().to_vec();
        let err = rebuild(&mut file, &table).unwrap_err();
        assert!(matches!(err, AviError::Format(ref m) if m.contains("avih")));
        assert_eq!(file.bytes(), snapshot.as_slice());
    }
}
