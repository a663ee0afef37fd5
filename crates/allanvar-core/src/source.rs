//! Chunk sources: where the bit samples come from.
//!
//! A [`ChunkSource`] hands out fixed-length chunks of bits in stream order,
//! never overlapping. [`FileChunkSource`] reads them from a file, unpacking
//! each byte most-significant bit first.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::config::RunConfig;
use crate::error::{AllanError, Result};

/// One chunk of bit samples.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Zero-based position in arrival order.
    pub index: usize,
    /// Offset of the first bit in the stream.
    pub position_bits: u64,
    /// Samples, each 0 or 1.
    pub bits: Vec<u8>,
}

/// Anything that can supply chunks in order.
pub trait ChunkSource {
    /// Length in samples of every chunk this source yields.
    fn chunk_len(&self) -> usize;

    /// Next chunk, or `None` at end of stream.
    fn next_chunk(&mut self) -> Result<Option<Chunk>>;
}

/// Unpack bytes into bits, MSB first per byte.
pub fn unpack_bits(bytes: &[u8]) -> Vec<u8> {
    let mut bits = Vec::with_capacity(bytes.len() * 8);
    for &byte in bytes {
        for shift in (0..8).rev() {
            bits.push((byte >> shift) & 1);
        }
    }
    bits
}

// ---------------------------------------------------------------------------
// Chunk plan
// ---------------------------------------------------------------------------

/// Chunk layout of one file: chunk length and the byte offset of every chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkPlan {
    pub file_bytes: u64,
    pub chunk_bytes: u64,
    pub offsets: Vec<u64>,
}

impl ChunkPlan {
    /// Lay out chunks for a file of `file_bytes` bytes.
    ///
    /// A missing or oversized chunk length means one chunk spanning the whole
    /// file. Fails when not even one chunk fits after `offset_bytes`.
    pub fn new(
        path: &Path,
        file_bytes: u64,
        chunk_bytes: Option<u64>,
        offset_bytes: u64,
        count: usize,
    ) -> Result<Self> {
        let chunk_bytes = match chunk_bytes {
            Some(c) if c <= file_bytes => c,
            _ => file_bytes,
        };

        if chunk_bytes == 0 || offset_bytes.saturating_add(chunk_bytes) > file_bytes {
            return Err(AllanError::InsufficientData {
                path: path.to_path_buf(),
                needed_bits: offset_bytes
                    .saturating_add(chunk_bytes.max(1))
                    .saturating_mul(8),
                available_bits: file_bytes * 8,
            });
        }

        let available = ((file_bytes - offset_bytes) / chunk_bytes) as usize;
        let n = if count > 0 {
            count.min(available)
        } else {
            available
        };
        let offsets = (0..n as u64)
            .map(|i| offset_bytes + i * chunk_bytes)
            .collect();

        Ok(Self {
            file_bytes,
            chunk_bytes,
            offsets,
        })
    }

    pub fn file_bits(&self) -> u64 {
        self.file_bytes * 8
    }

    pub fn chunk_bits(&self) -> u64 {
        self.chunk_bytes * 8
    }
}

// ---------------------------------------------------------------------------
// File-backed source
// ---------------------------------------------------------------------------

/// Reads planned chunks from a file.
pub struct FileChunkSource {
    path: PathBuf,
    file: File,
    plan: ChunkPlan,
    next: usize,
    buf: Vec<u8>,
}

impl FileChunkSource {
    /// Open `path` and plan its chunks according to `config`.
    pub fn open(path: impl AsRef<Path>, config: &RunConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| AllanError::io(&path, e))?;
        let file_bytes = file
            .metadata()
            .map_err(|e| AllanError::io(&path, e))?
            .len();
        let plan = ChunkPlan::new(
            &path,
            file_bytes,
            config.chunk_bytes(),
            config.offset_bytes(),
            config.count,
        )?;
        log::debug!(
            "{}: {} chunk(s) of {} bytes",
            path.display(),
            plan.offsets.len(),
            plan.chunk_bytes
        );
        Ok(Self {
            buf: vec![0u8; plan.chunk_bytes as usize],
            path,
            file,
            plan,
            next: 0,
        })
    }

    pub fn plan(&self) -> &ChunkPlan {
        &self.plan
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ChunkSource for FileChunkSource {
    fn chunk_len(&self) -> usize {
        self.plan.chunk_bits() as usize
    }

    fn next_chunk(&mut self) -> Result<Option<Chunk>> {
        let Some(&offset) = self.plan.offsets.get(self.next) else {
            return Ok(None);
        };
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|e| AllanError::io(&self.path, e))?;
        self.file.read_exact(&mut self.buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                AllanError::InsufficientData {
                    path: self.path.clone(),
                    needed_bits: (offset + self.plan.chunk_bytes) * 8,
                    available_bits: self.plan.file_bits(),
                }
            } else {
                AllanError::io(&self.path, e)
            }
        })?;

        let chunk = Chunk {
            index: self.next,
            position_bits: offset * 8,
            bits: unpack_bits(&self.buf),
        };
        self.next += 1;
        Ok(Some(chunk))
    }
}

// ---------------------------------------------------------------------------
// In-memory source
// ---------------------------------------------------------------------------

/// Splits an in-memory bit sequence into whole chunks; a trailing partial
/// chunk is not yielded.
pub struct MemoryChunkSource {
    bits: Vec<u8>,
    chunk_len: usize,
    next: usize,
}

impl MemoryChunkSource {
    pub fn new(bits: Vec<u8>, chunk_len: usize) -> Self {
        Self {
            bits,
            chunk_len,
            next: 0,
        }
    }

    /// Source over the MSB-first bits of `bytes`.
    pub fn from_bytes(bytes: &[u8], chunk_bytes: usize) -> Self {
        Self::new(unpack_bits(bytes), chunk_bytes * 8)
    }
}

impl ChunkSource for MemoryChunkSource {
    fn chunk_len(&self) -> usize {
        self.chunk_len
    }

    fn next_chunk(&mut self) -> Result<Option<Chunk>> {
        if self.chunk_len == 0 {
            return Ok(None);
        }
        let start = self.next * self.chunk_len;
        let end = start + self.chunk_len;
        if end > self.bits.len() {
            return Ok(None);
        }
        let chunk = Chunk {
            index: self.next,
            position_bits: start as u64,
            bits: self.bits[start..end].to_vec(),
        };
        self.next += 1;
        Ok(Some(chunk))
    }
}
