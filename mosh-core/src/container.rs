//! Container handle: owns the working buffer of one AVI file.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tempfile::NamedTempFile;
use tracing::info;

use crate::error::AviError;
use crate::mux::{self, RebuildReport};
use crate::probe::{self, AviInfo};
use crate::riff;
use crate::table::FrameTable;
use crate::transform::TransformChain;

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Fresh buffer identity, unique within the process.
pub(crate) fn next_generation() -> u64 {
    NEXT_GENERATION.fetch_add(1, Ordering::Relaxed)
}

/// Every buffer an `AviFile` holds (loaded, cloned or rebuilt) carries its
/// own generation; frame tables remember the generation they were parsed
/// from and are refused by any other buffer.
#[derive(Debug)]
pub struct AviFile {
    data: Vec<u8>,
    generation: u64,
    source: Option<PathBuf>,
}

impl AviFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AviError> {
        let path = path.as_ref();
        let data = fs::read(path)?;
        let mut file = Self::from_bytes(data)?;
        info!("Opened {} ({} bytes)", path.display(), file.data.len());
        file.source = Some(path.to_path_buf());
        Ok(file)
    }

    pub fn from_bytes(data: Vec<u8>) -> Result<Self, AviError> {
        riff::read_riff_header(&data)?;
        Ok(Self {
            data,
            generation: next_generation(),
            source: None,
        })
    }

    /// RIFF/AVI header, a LIST/JUNK run and an idx1 chunk that fits.
    pub fn is_formatted(data: &[u8]) -> bool {
        riff::is_formatted(data)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub(crate) fn replace(&mut self, data: Vec<u8>, generation: u64) {
        self.data = data;
        self.generation = generation;
    }

    pub fn frame_table(&self) -> Result<FrameTable, AviError> {
        FrameTable::parse(self)
    }

    pub fn info(&self) -> Result<AviInfo, AviError> {
        probe::probe(&self.data)
    }

    /// Rebuild from `table`; see [`mux::rebuild`].
    pub fn rebuild(&mut self, table: &FrameTable) -> Result<(RebuildReport, FrameTable), AviError> {
        mux::rebuild(self, table)
    }

    /// Parse the index, run `chain` over it and rebuild.
    pub fn mosh(&mut self, chain: &TransformChain) -> Result<RebuildReport, AviError> {
        let mut table = self.frame_table()?;
        let records = chain.apply(table.records())?;
        table.set_records(records);
        let (report, _) = mux::rebuild(self, &table)?;
        Ok(report)
    }

    /// Write the buffer next to `path` and rename it into place, so a
    /// failure never leaves a partial file at `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), AviError> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut temp = NamedTempFile::new_in(dir)?;
        temp.write_all(&self.data)?;
        temp.as_file().sync_all()?;
        temp.persist(path).map_err(|e| AviError::Io(e.error))?;

        info!("Saved {} ({} bytes)", path.display(), self.data.len());
        Ok(())
    }
}

impl Clone for AviFile {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            generation: next_generation(),
            source: self.source.clone(),
        }
    }
}
