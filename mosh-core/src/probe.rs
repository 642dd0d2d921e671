// AVI METADATA READER
//
// Read-only decode of the hdrl header list for display: main header,
// per-stream headers and formats, video properties, INFO tags, and a
// summary of the index. Nothing here feeds the rebuild engine.

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::AviError;
use crate::index::{parse_idx1, FrameKind};
use crate::riff::{ChunkHeader, ChunkWalker, Entry, FieldReader, FourCc};

pub const AVIF_HASINDEX: u32 = 0x0000_0010;
pub const AVIF_MUSTUSEINDEX: u32 = 0x0000_0020;
pub const AVIF_ISINTERLEAVED: u32 = 0x0000_0100;
pub const AVIF_TRUSTCKTYPE: u32 = 0x0000_0800;
pub const AVIF_WASCAPTUREFILE: u32 = 0x0001_0000;
pub const AVIF_COPYRIGHTED: u32 = 0x0002_0000;

const WAVE_FORMAT_PCM: u16 = 0x0001;
const WAVE_FORMAT_MPEGLAYER3: u16 = 0x0055;
const WAVE_FORMAT_AAC: u16 = 0x00FF;
const WAVE_FORMAT_AC3: u16 = 0x2000;

// ============================================================================
// Structures
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct AviInfo {
    pub duration_us: i64,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub total_frames: u32,
    pub main: MainHeader,
    pub streams: Vec<AviStream>,
    pub tags: Vec<InfoTag>,
    pub index: Option<IndexStats>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AviStream {
    pub index: u32,
    pub stream_type: StreamType,
    pub codec_fourcc: String,
    pub codec: CodecType,
    pub fps: Option<f64>,
    pub name: Option<String>,
    pub header: StreamHeader,
    pub format: Option<StreamFormat>,
    pub properties: Option<VideoProperties>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StreamType {
    Video,
    Audio,
    Subtitle,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CodecType {
    // Video
    H264,
    MPEG4, // DivX/Xvid
    MJPEG,
    RawYUV,
    Cinepak,
    Indeo,
    // Audio
    PCM,
    MP3,
    AC3,
    AAC,
    Unknown,
}

#[derive(Debug, Clone, Serialize)]
pub struct InfoTag {
    pub id: FourCc,
    pub value: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub records: usize,
    pub video_frames: usize,
    pub keyframes: usize,
    pub audio_frames: usize,
    pub other: usize,
}

// ============================================================================
// Main Header (avih)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HeaderFlags {
    pub has_index: bool,
    pub must_use_index: bool,
    pub is_interleaved: bool,
    pub trust_ck_type: bool,
    pub was_capture_file: bool,
    pub copyrighted: bool,
}

impl HeaderFlags {
    pub fn from_bits(bits: u32) -> Self {
        Self {
            has_index: bits & AVIF_HASINDEX != 0,
            must_use_index: bits & AVIF_MUSTUSEINDEX != 0,
            is_interleaved: bits & AVIF_ISINTERLEAVED != 0,
            trust_ck_type: bits & AVIF_TRUSTCKTYPE != 0,
            was_capture_file: bits & AVIF_WASCAPTUREFILE != 0,
            copyrighted: bits & AVIF_COPYRIGHTED != 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MainHeader {
    pub microsec_per_frame: u32,
    pub max_bytes_per_sec: u32,
    pub padding_granularity: u32,
    pub flags: HeaderFlags,
    pub total_frames: u32,
    pub initial_frames: u32,
    pub streams: u32,
    pub suggested_buffer_size: u32,
    pub width: u32,
    pub height: u32,
}

impl MainHeader {
    pub fn decode(body: &[u8]) -> Result<Self, AviError> {
        let mut r = FieldReader::new(body, "avih");
        // dwReserved[4] follows; nothing reads it
        Ok(Self {
            microsec_per_frame: r.u32()?,
            max_bytes_per_sec: r.u32()?,
            padding_granularity: r.u32()?,
            flags: HeaderFlags::from_bits(r.u32()?),
            total_frames: r.u32()?,
            initial_frames: r.u32()?,
            streams: r.u32()?,
            suggested_buffer_size: r.u32()?,
            width: r.u32()?,
            height: r.u32()?,
        })
    }
}

// ============================================================================
// Stream Header (strh)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rect {
    pub left: i16,
    pub top: i16,
    pub right: i16,
    pub bottom: i16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StreamHeader {
    pub fcc_type: FourCc,   // vids, auds, txts
    pub fcc_handler: FourCc, // codec FourCC
    pub flags: u32,
    pub priority: u16,
    pub language: u16,
    pub initial_frames: u32,
    pub scale: u32,
    pub rate: u32,
    pub start: u32,
    pub length: u32,
    pub suggested_buffer_size: u32,
    pub quality: i32,
    pub sample_size: u32,
    /// Older writers emit a 48-byte strh without the frame rectangle.
    pub frame: Option<Rect>,
}

impl StreamHeader {
    pub fn decode(body: &[u8]) -> Result<Self, AviError> {
        let mut r = FieldReader::new(body, "strh");
        let mut header = Self {
            fcc_type: r.fourcc()?,
            fcc_handler: r.fourcc()?,
            flags: r.u32()?,
            priority: r.u16()?,
            language: r.u16()?,
            initial_frames: r.u32()?,
            scale: r.u32()?,
            rate: r.u32()?,
            start: r.u32()?,
            length: r.u32()?,
            suggested_buffer_size: r.u32()?,
            quality: r.i32()?,
            sample_size: r.u32()?,
            frame: None,
        };
        if r.remaining() >= 8 {
            header.frame = Some(Rect {
                left: r.u16()? as i16,
                top: r.u16()? as i16,
                right: r.u16()? as i16,
                bottom: r.u16()? as i16,
            });
        }
        Ok(header)
    }

    pub fn stream_type(&self) -> StreamType {
        match self.fcc_type {
            FourCc::VIDS => StreamType::Video,
            FourCc::AUDS => StreamType::Audio,
            FourCc::TXTS => StreamType::Subtitle,
            _ => StreamType::Unknown,
        }
    }

    pub fn fps(&self) -> Option<f64> {
        (self.scale > 0 && self.rate > 0).then(|| self.rate as f64 / self.scale as f64)
    }
}

// ============================================================================
// Stream Formats (strf)
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum StreamFormat {
    Video(BitmapInfoHeader),
    Audio(WaveFormat),
    Raw { size: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BitmapInfoHeader {
    pub size: u32,
    pub width: i32,
    /// Negative for top-down bitmaps.
    pub height: i32,
    pub planes: u16,
    pub bit_count: u16,
    pub compression: FourCc,
    pub size_image: u32,
    pub x_pels_per_meter: i32,
    pub y_pels_per_meter: i32,
    pub clr_used: u32,
    pub clr_important: u32,
}

impl BitmapInfoHeader {
    pub fn decode(body: &[u8]) -> Result<Self, AviError> {
        let mut r = FieldReader::new(body, "BITMAPINFOHEADER");
        Ok(Self {
            size: r.u32()?,
            width: r.i32()?,
            height: r.i32()?,
            planes: r.u16()?,
            bit_count: r.u16()?,
            compression: r.fourcc()?,
            size_image: r.u32()?,
            x_pels_per_meter: r.i32()?,
            y_pels_per_meter: r.i32()?,
            clr_used: r.u32()?,
            clr_important: r.u32()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Mp3Padding {
    Iso,
    On,
    Off,
    Unknown(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Mp3Extension {
    pub id: u16,
    pub padding: Mp3Padding,
    pub block_size: u16,
    pub frames_per_block: u16,
    pub codec_delay: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WaveFormat {
    pub format_tag: u16,
    pub channels: u16,
    pub samples_per_sec: u32,
    pub avg_bytes_per_sec: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
    pub extra_size: u16,
    pub mp3: Option<Mp3Extension>,
}

impl WaveFormat {
    pub fn decode(body: &[u8]) -> Result<Self, AviError> {
        let mut r = FieldReader::new(body, "WAVEFORMATEX");
        let mut format = Self {
            format_tag: r.u16()?,
            channels: r.u16()?,
            samples_per_sec: r.u32()?,
            avg_bytes_per_sec: r.u32()?,
            block_align: r.u16()?,
            // PCMWAVEFORMAT ends here for some writers
            bits_per_sample: if r.remaining() >= 2 { r.u16()? } else { 0 },
            extra_size: if r.remaining() >= 2 { r.u16()? } else { 0 },
            mp3: None,
        };

        if format.format_tag == WAVE_FORMAT_MPEGLAYER3 && format.extra_size == 12 {
            format.mp3 = Some(Mp3Extension {
                id: r.u16()?,
                padding: match r.u32()? {
                    0 => Mp3Padding::Iso,
                    1 => Mp3Padding::On,
                    2 => Mp3Padding::Off,
                    other => Mp3Padding::Unknown(other),
                },
                block_size: r.u16()?,
                frames_per_block: r.u16()?,
                codec_delay: r.u16()?,
            });
        }
        Ok(format)
    }
}

// ============================================================================
// Video Properties (vprp)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VideoField {
    pub compressed_bitmap_height: u32,
    pub compressed_bitmap_width: u32,
    pub valid_bitmap_height: u32,
    pub valid_bitmap_width: u32,
    pub valid_bitmap_x_offset: u32,
    pub valid_bitmap_y_offset: u32,
    pub video_x_offset: u32,
    pub video_y_valid_start_line: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VideoProperties {
    pub video_format_token: u32,
    pub video_standard: u32,
    pub vertical_refresh_rate: u32,
    pub h_total: u32,
    pub v_total_lines: u32,
    pub aspect_x: u16,
    pub aspect_y: u16,
    pub frame_width: u32,
    pub frame_height: u32,
    pub fields: Vec<VideoField>,
}

impl VideoProperties {
    pub fn decode(body: &[u8]) -> Result<Self, AviError> {
        let mut r = FieldReader::new(body, "vprp");
        let video_format_token = r.u32()?;
        let video_standard = r.u32()?;
        let vertical_refresh_rate = r.u32()?;
        let h_total = r.u32()?;
        let v_total_lines = r.u32()?;
        // high word x, low word y
        let aspect = r.u32()?;
        let frame_width = r.u32()?;
        let frame_height = r.u32()?;
        let field_count = r.u32()?;

        let mut fields = Vec::new();
        for _ in 0..field_count.min(2) {
            fields.push(VideoField {
                compressed_bitmap_height: r.u32()?,
                compressed_bitmap_width: r.u32()?,
                valid_bitmap_height: r.u32()?,
                valid_bitmap_width: r.u32()?,
                valid_bitmap_x_offset: r.u32()?,
                valid_bitmap_y_offset: r.u32()?,
                video_x_offset: r.u32()?,
                video_y_valid_start_line: r.u32()?,
            });
        }

        Ok(Self {
            video_format_token,
            video_standard,
            vertical_refresh_rate,
            h_total,
            v_total_lines,
            aspect_x: (aspect >> 16) as u16,
            aspect_y: (aspect & 0xFFFF) as u16,
            frame_width,
            frame_height,
            fields,
        })
    }
}

// ============================================================================
// Probe
// ============================================================================

fn body<'a>(data: &'a [u8], header: &ChunkHeader) -> &'a [u8] {
    &data[header.data_start()..header.data_end()]
}

fn text(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Decode everything informational in an AVI buffer. Unlike the frame
/// table this does not require an idx1 chunk.
pub fn probe(data: &[u8]) -> Result<AviInfo, AviError> {
    let mut walker = ChunkWalker::top_level(data)?;
    let mut main = None;
    let mut streams = Vec::new();
    let mut tags = Vec::new();
    let mut index = None;

    while let Some(entry) = walker.next_entry()? {
        match entry {
            Entry::List { list_type, .. } if list_type == FourCc::HDRL => {
                let mut children = ChunkWalker::children(data, &entry);
                while let Some(child) = children.next_entry()? {
                    match child {
                        Entry::Chunk(header) if header.fourcc == FourCc::AVIH => {
                            main = Some(MainHeader::decode(body(data, &header))?);
                        }
                        Entry::List { list_type, .. } if list_type == FourCc::STRL => {
                            let number = streams.len() as u32;
                            streams.push(parse_strl(data, &child, number)?);
                        }
                        Entry::List { list_type, .. } if list_type == FourCc::INFO => {
                            tags.extend(parse_info(data, &child)?);
                        }
                        _ => {}
                    }
                }
            }
            Entry::List { list_type, .. } if list_type == FourCc::INFO => {
                tags.extend(parse_info(data, &entry)?);
            }
            Entry::Chunk(header) if header.fourcc == FourCc::IDX1 => {
                index = Some(index_stats(data, &header)?);
            }
            other => debug!("probe: skipping '{}'", other.header().fourcc),
        }
    }

    let main = main.ok_or_else(|| AviError::format("no avih main header found in hdrl"))?;
    if main.streams as usize != streams.len() {
        warn!("avih declares {} streams, found {}", main.streams, streams.len());
    }

    Ok(build_info(main, streams, tags, index))
}

fn parse_strl(data: &[u8], list: &Entry, index: u32) -> Result<AviStream, AviError> {
    let mut header = None;
    let mut format = None;
    let mut properties = None;
    let mut name = None;

    let mut children = ChunkWalker::children(data, list);
    while let Some(entry) = children.next_entry()? {
        let Entry::Chunk(chunk) = entry else { continue };
        match chunk.fourcc {
            FourCc::STRH => header = Some(StreamHeader::decode(body(data, &chunk))?),
            FourCc::STRF => {
                let bytes = body(data, &chunk);
                format = Some(match header.map(|h| h.stream_type()) {
                    Some(StreamType::Video) => StreamFormat::Video(BitmapInfoHeader::decode(bytes)?),
                    Some(StreamType::Audio) => StreamFormat::Audio(WaveFormat::decode(bytes)?),
                    _ => StreamFormat::Raw { size: chunk.size },
                });
            }
            FourCc::VPRP => properties = Some(VideoProperties::decode(body(data, &chunk))?),
            FourCc::STRN => name = Some(text(body(data, &chunk))),
            _ => {}
        }
    }

    let header = header.ok_or_else(|| AviError::format(format!("stream {} has no strh", index)))?;
    let stream_type = header.stream_type();
    let (codec_fourcc, codec) = match &format {
        Some(StreamFormat::Video(bih)) if bih.compression.0 != [0; 4] => {
            (bih.compression.to_string(), identify_video_codec(bih.compression))
        }
        Some(StreamFormat::Audio(wave)) => {
            (header.fcc_handler.to_string(), identify_audio_codec(wave.format_tag))
        }
        _ if stream_type == StreamType::Video => {
            (header.fcc_handler.to_string(), identify_video_codec(header.fcc_handler))
        }
        _ => (header.fcc_handler.to_string(), CodecType::Unknown),
    };

    Ok(AviStream {
        index,
        stream_type,
        codec_fourcc,
        codec,
        fps: header.fps(),
        name,
        header,
        format,
        properties,
    })
}

fn parse_info(data: &[u8], list: &Entry) -> Result<Vec<InfoTag>, AviError> {
    let mut tags = Vec::new();
    let mut children = ChunkWalker::children(data, list);
    while let Some(entry) = children.next_entry()? {
        if let Entry::Chunk(chunk) = entry {
            tags.push(InfoTag {
                id: chunk.fourcc,
                value: text(body(data, &chunk)),
            });
        }
    }
    Ok(tags)
}

fn index_stats(data: &[u8], idx1: &ChunkHeader) -> Result<IndexStats, AviError> {
    let mut stats = IndexStats::default();
    for record in parse_idx1(data, idx1)? {
        stats.records += 1;
        match record.kind() {
            FrameKind::VideoCompressed | FrameKind::VideoUncompressed => {
                stats.video_frames += 1;
                if record.is_keyframe() {
                    stats.keyframes += 1;
                }
            }
            FrameKind::Audio => stats.audio_frames += 1,
            FrameKind::Other => stats.other += 1,
        }
    }
    Ok(stats)
}

fn build_info(
    main: MainHeader,
    streams: Vec<AviStream>,
    tags: Vec<InfoTag>,
    index: Option<IndexStats>,
) -> AviInfo {
    let mut fps = 0.0;
    let mut duration_us = 0;
    if main.microsec_per_frame > 0 {
        fps = 1_000_000.0 / main.microsec_per_frame as f64;
        duration_us = main.total_frames as i64 * main.microsec_per_frame as i64;
    }

    // Fall back to the first video stream's rate and length
    if duration_us == 0 {
        if let Some(stream) = streams.iter().find(|s| s.stream_type == StreamType::Video) {
            if let Some(stream_fps) = stream.fps {
                let frames = if stream.header.length > 0 { stream.header.length } else { main.total_frames };
                duration_us = (frames as f64 / stream_fps * 1_000_000.0) as i64;
                fps = stream_fps;
            }
        }
    }

    AviInfo {
        duration_us,
        width: main.width,
        height: main.height,
        fps,
        total_frames: main.total_frames,
        main,
        streams,
        tags,
        index,
    }
}

fn identify_video_codec(fourcc: FourCc) -> CodecType {
    let upper = fourcc.0.map(|b| b.to_ascii_uppercase());
    match &upper {
        b"H264" | b"AVC1" | b"X264" => CodecType::H264,
        b"XVID" | b"DIVX" | b"DX50" | b"FMP4" | b"MP4V" => CodecType::MPEG4,
        b"MJPG" => CodecType::MJPEG,
        b"I420" | b"YV12" | b"YUY2" => CodecType::RawYUV,
        b"CVID" => CodecType::Cinepak,
        b"IV50" => CodecType::Indeo,
        _ => {
            let s = String::from_utf8_lossy(&upper);
            if s.contains("264") || s.contains("AVC") {
                CodecType::H264
            } else if s.contains("XVID") || s.contains("DIVX") || s.contains("MP4") {
                CodecType::MPEG4
            } else {
                CodecType::Unknown
            }
        }
    }
}

fn identify_audio_codec(format_tag: u16) -> CodecType {
    match format_tag {
        WAVE_FORMAT_PCM => CodecType::PCM,
        WAVE_FORMAT_MPEGLAYER3 => CodecType::MP3,
        WAVE_FORMAT_AC3 => CodecType::AC3,
        WAVE_FORMAT_AAC => CodecType::AAC,
        _ => CodecType::Unknown,
    }
}
