//! In-memory AVI files for tests.

use bytes::BufMut;

use crate::container::AviFile;
use crate::index::AVIIF_KEYFRAME;
use crate::riff::FourCc;

pub(crate) struct AviBuilder {
    frames: Vec<(FourCc, u32, Vec<u8>)>,
    junk: Option<usize>,
    absolute: bool,
    index: bool,
    extras: bool,
    main_header: bool,
    first_offset: Option<u32>,
}

fn chunk(out: &mut Vec<u8>, tag: &[u8; 4], body: &[u8]) {
    out.put_slice(tag);
    out.put_u32_le(body.len() as u32);
    out.put_slice(body);
    if body.len() % 2 == 1 {
        out.put_u8(0);
    }
}

fn list(out: &mut Vec<u8>, list_type: &[u8; 4], body: &[u8]) {
    out.put_slice(b"LIST");
    out.put_u32_le(body.len() as u32 + 4);
    out.put_slice(list_type);
    out.put_slice(body);
}

impl AviBuilder {
    pub(crate) fn new() -> Self {
        Self {
            frames: Vec::new(),
            junk: None,
            absolute: false,
            index: true,
            extras: false,
            main_header: true,
            first_offset: None,
        }
    }

    pub(crate) fn frame(mut self, tag: &[u8; 4], flags: u32, payload: &[u8]) -> Self {
        self.frames.push((FourCc(*tag), flags, payload.to_vec()));
        self
    }

    pub(crate) fn video_key(self, payload: &[u8]) -> Self {
        self.frame(b"00dc", AVIIF_KEYFRAME, payload)
    }

    pub(crate) fn video_delta(self, payload: &[u8]) -> Self {
        self.frame(b"00dc", 0, payload)
    }

    pub(crate) fn audio(self, payload: &[u8]) -> Self {
        self.frame(b"01wb", 0, payload)
    }

    /// JUNK chunk of `len` bytes between hdrl and movi.
    pub(crate) fn junk(mut self, len: usize) -> Self {
        self.junk = Some(len);
        self
    }

    /// Write idx1 offsets measured from the start of the file.
    pub(crate) fn absolute_offsets(mut self) -> Self {
        self.absolute = true;
        self
    }

    pub(crate) fn without_index(mut self) -> Self {
        self.index = false;
        self
    }

    /// Add vprp, strn and an INFO list.
    pub(crate) fn with_extras(mut self) -> Self {
        self.extras = true;
        self
    }

    /// Leave avih out of hdrl.
    pub(crate) fn without_main_header(mut self) -> Self {
        self.main_header = false;
        self
    }

    pub(crate) fn first_offset(mut self, offset: u32) -> Self {
        self.first_offset = Some(offset);
        self
    }

    fn video_frames(&self) -> u32 {
        self.frames.iter().filter(|(tag, _, _)| matches!(&tag.suffix(), b"dc" | b"db")).count() as u32
    }

    fn hdrl(&self) -> Vec<u8> {
        let mut avih = Vec::new();
        avih.put_u32_le(40_000); // 25 fps
        avih.put_u32_le(1_000_000);
        avih.put_u32_le(0);
        avih.put_u32_le(0x10 | 0x100); // HASINDEX | ISINTERLEAVED
        avih.put_u32_le(self.video_frames());
        avih.put_u32_le(0);
        avih.put_u32_le(2);
        avih.put_u32_le(65_536);
        avih.put_u32_le(320);
        avih.put_u32_le(240);
        avih.put_slice(&[0; 16]);

        let mut vids = Vec::new();
        let mut strh = Vec::new();
        strh.put_slice(b"vids");
        strh.put_slice(b"XVID");
        strh.put_u32_le(0);
        strh.put_u16_le(0);
        strh.put_u16_le(0);
        strh.put_u32_le(0);
        strh.put_u32_le(1);
        strh.put_u32_le(25);
        strh.put_u32_le(0);
        strh.put_u32_le(self.video_frames());
        strh.put_u32_le(65_536);
        strh.put_i32_le(-1);
        strh.put_u32_le(0);
        strh.put_i16_le(0);
        strh.put_i16_le(0);
        strh.put_i16_le(320);
        strh.put_i16_le(240);
        chunk(&mut vids, b"strh", &strh);

        let mut bih = Vec::new();
        bih.put_u32_le(40);
        bih.put_i32_le(320);
        bih.put_i32_le(-240);
        bih.put_u16_le(1);
        bih.put_u16_le(24);
        bih.put_slice(b"XVID");
        bih.put_u32_le(320 * 240 * 3);
        bih.put_i32_le(0);
        bih.put_i32_le(0);
        bih.put_u32_le(0);
        bih.put_u32_le(0);
        chunk(&mut vids, b"strf", &bih);

        if self.extras {
            chunk(&mut vids, b"JUNK", &[0; 6]);
            let mut vprp = Vec::new();
            vprp.put_u32_le(0); // format token
            vprp.put_u32_le(1); // PAL
            vprp.put_u32_le(25);
            vprp.put_u32_le(320);
            vprp.put_u32_le(240);
            vprp.put_u16_le(3);
            vprp.put_u16_le(4);
            vprp.put_u32_le(320);
            vprp.put_u32_le(240);
            vprp.put_u32_le(1);
            for value in [240u32, 320, 240, 320, 0, 0, 0, 0] {
                vprp.put_u32_le(value);
            }
            chunk(&mut vids, b"vprp", &vprp);
            chunk(&mut vids, b"strn", b"Video\0");
        }

        let mut auds = Vec::new();
        let mut strh = Vec::new();
        strh.put_slice(b"auds");
        strh.put_slice(&[0; 4]);
        strh.put_u32_le(0);
        strh.put_u16_le(0);
        strh.put_u16_le(0);
        strh.put_u32_le(0);
        strh.put_u32_le(1);
        strh.put_u32_le(44_100);
        strh.put_u32_le(0);
        strh.put_u32_le(0);
        strh.put_u32_le(4_096);
        strh.put_i32_le(-1);
        strh.put_u32_le(4);
        strh.put_slice(&[0; 8]);
        chunk(&mut auds, b"strh", &strh);

        let mut wave = Vec::new();
        if self.extras {
            // MPEG Layer-3 with its 12-byte extension
            wave.put_u16_le(0x0055);
            wave.put_u16_le(2);
            wave.put_u32_le(44_100);
            wave.put_u32_le(16_000);
            wave.put_u16_le(1);
            wave.put_u16_le(0);
            wave.put_u16_le(12);
            wave.put_u16_le(1);
            wave.put_u32_le(0x2);
            wave.put_u16_le(417);
            wave.put_u16_le(1);
            wave.put_u16_le(1393);
        } else {
            wave.put_u16_le(0x0001);
            wave.put_u16_le(2);
            wave.put_u32_le(44_100);
            wave.put_u32_le(176_400);
            wave.put_u16_le(4);
            wave.put_u16_le(16);
            wave.put_u16_le(0);
        }
        chunk(&mut auds, b"strf", &wave);

        let mut body = Vec::new();
        if self.main_header {
            chunk(&mut body, b"avih", &avih);
        }
        list(&mut body, b"strl", &vids);
        list(&mut body, b"strl", &auds);

        let mut hdrl = Vec::new();
        list(&mut hdrl, b"hdrl", &body);
        hdrl
    }

    pub(crate) fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.put_slice(b"RIFF");
        out.put_u32_le(0);
        out.put_slice(b"AVI ");
        out.put_slice(&self.hdrl());

        if self.extras {
            let mut info = Vec::new();
            chunk(&mut info, b"INAM", b"test clip\0");
            chunk(&mut info, b"ISFT", b"mosh\0");
            list(&mut out, b"INFO", &info);
        }
        if let Some(len) = self.junk {
            chunk(&mut out, b"JUNK", &vec![0; len]);
        }

        let movi_position = out.len() + 8;
        let mut movi = Vec::new();
        let mut entries = Vec::new();
        for (tag, flags, payload) in &self.frames {
            let chunk_position = movi_position + 4 + movi.len();
            let offset = if self.absolute { chunk_position } else { chunk_position - movi_position };
            entries.push((*tag, *flags, offset as u32, payload.len() as u32));
            chunk(&mut movi, &tag.0, payload);
        }
        list(&mut out, b"movi", &movi);

        if self.index {
            if let (Some(offset), Some(first)) = (self.first_offset, entries.first_mut()) {
                first.2 = offset;
            }
            let mut idx1 = Vec::new();
            for (tag, flags, offset, size) in &entries {
                idx1.put_slice(&tag.0);
                idx1.put_u32_le(*flags);
                idx1.put_u32_le(*offset);
                idx1.put_u32_le(*size);
            }
            chunk(&mut out, b"idx1", &idx1);
        }

        let riff_size = (out.len() - 8) as u32;
        out[4..8].copy_from_slice(&riff_size.to_le_bytes());
        out
    }

    pub(crate) fn into_file(self) -> AviFile {
        AviFile::from_bytes(self.build()).expect("fixture should be a valid AVI")
    }
}
