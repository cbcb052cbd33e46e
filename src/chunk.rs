//! Content-addressed chunk identity and the two [`ChunkSink`] backings used
//! by [`crate::chunk_buffer`]: an in-memory sink for tests and a durable
//! sink that rides the existing `.6cy` block pipeline.

use std::collections::HashMap;
use std::io::{Read, Seek, Write};
use std::path::Path;

use thiserror::Error;

use crate::block::{decode_block, encode_block, BlockHeader, BlockType, FILE_ID_SHARED};
use crate::codec::{CodecError, CodecId};

/// Opaque content-derived chunk identity. Two chunks with identical bytes
/// always produce the same id — this is what makes deduplication free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkId([u8; 32]);

impl ChunkId {
    /// Derive the id of `bytes` directly, without storing anything.
    pub fn of(bytes: &[u8]) -> Self {
        Self(blake3::hash(bytes).into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Reconstruct a previously-derived id from its hex rendering, e.g. one
    /// persisted in a manifest sidecar file.
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let array: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(array))
    }
}

impl std::fmt::Display for ChunkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("chunk codec failure: {0}")]
    Codec(#[from] CodecError),
    #[error("chunk store I/O failure: {0}")]
    Io(#[from] std::io::Error),
}

/// Durable destination for finished chunks. Implementations must be
/// content-addressed: submitting the same bytes twice is a no-op that
/// still returns the same [`ChunkId`] (idempotent dedup), per the
/// chunk buffer's contract with its sink.
pub trait ChunkSink {
    /// Store `bytes` (if not already present) and return its identity
    /// along with the original and on-disk byte counts.
    fn add_chunk(&mut self, bytes: &[u8]) -> Result<(ChunkId, u64, u64), SinkError>;
}

/// In-process sink backed by a `HashMap`. Used by tests and by callers who
/// only need streaming/dedup semantics without persistence.
#[derive(Default)]
pub struct MemoryChunkSink {
    chunks: HashMap<ChunkId, Vec<u8>>,
    /// Order chunks were first seen in — useful for assembling a manifest
    /// without re-sorting by id.
    order: Vec<ChunkId>,
}

impl MemoryChunkSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &ChunkId) -> Option<&[u8]> {
        self.chunks.get(id).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Ids in first-seen order.
    pub fn ids(&self) -> &[ChunkId] {
        &self.order
    }
}

impl ChunkSink for MemoryChunkSink {
    fn add_chunk(&mut self, bytes: &[u8]) -> Result<(ChunkId, u64, u64), SinkError> {
        let id = ChunkId::of(bytes);
        let len = bytes.len() as u64;
        if !self.chunks.contains_key(&id) {
            self.chunks.insert(id, bytes.to_vec());
            self.order.push(id);
        }
        Ok((id, len, len))
    }
}

/// Durable sink that stores each chunk as a `BlockType::Data` block in a
/// single append-only `.6cy`-style file, reusing the same header/codec/
/// encryption pipeline the rest of the container format uses. Chunks carry
/// `file_id = FILE_ID_SHARED` since a chunk's owning file is recorded at a
/// higher layer (the manifest), not in the block itself.
pub struct ContainerChunkSink {
    file: std::fs::File,
    offset: u64,
    codec_id: CodecId,
    level: i32,
    encryption_key: Option<[u8; 32]>,
    seen: HashMap<ChunkId, (u64, u64)>,
}

impl ContainerChunkSink {
    pub fn create(
        path: impl AsRef<Path>,
        codec_id: CodecId,
        level: i32,
        encryption_key: Option<[u8; 32]>,
    ) -> Result<Self, SinkError> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        Ok(Self {
            file,
            offset: 0,
            codec_id,
            level,
            encryption_key,
            seen: HashMap::new(),
        })
    }

    /// Re-open a store previously written by [`Self::create`], replaying its
    /// block headers to rebuild the dedup index without decompressing any
    /// payload.
    pub fn reopen(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let mut file = std::fs::OpenOptions::new().read(true).write(true).open(path)?;
        let mut seen = HashMap::new();
        let mut offset = 0u64;
        loop {
            let header = match BlockHeader::read(&mut file) {
                Ok(h) => h,
                Err(_) => break,
            };
            let id = ChunkId(header.content_hash);
            seen.insert(id, (offset, header.orig_size as u64));
            let skip = header.comp_size as u64;
            let mut remaining = skip;
            let mut buf = [0u8; 4096];
            while remaining > 0 {
                let take = remaining.min(buf.len() as u64) as usize;
                file.read_exact(&mut buf[..take])?;
                remaining -= take as u64;
            }
            offset = file.stream_position()?;
        }
        let codec_id = CodecId::Zstd;
        Ok(Self {
            file,
            offset,
            codec_id,
            level: 0,
            encryption_key: None,
            seen,
        })
    }

    pub fn chunk_count(&self) -> usize {
        self.seen.len()
    }

    /// Byte offset of a previously stored chunk's block header, for
    /// callers (such as a manifest) that need to read it back later.
    pub fn offset_of(&self, id: &ChunkId) -> Option<u64> {
        self.seen.get(id).map(|(offset, _)| *offset)
    }
}

impl ChunkSink for ContainerChunkSink {
    fn add_chunk(&mut self, bytes: &[u8]) -> Result<(ChunkId, u64, u64), SinkError> {
        let id = ChunkId::of(bytes);
        if let Some((_, orig_len)) = self.seen.get(&id) {
            return Ok((id, *orig_len, *orig_len));
        }

        let (header, payload) = encode_block(
            BlockType::Data,
            FILE_ID_SHARED,
            0,
            bytes,
            self.codec_id,
            self.level,
            self.encryption_key.as_ref(),
        )?;

        self.file.seek_to_end()?;
        let start = self.offset;
        header.write(&mut self.file)?;
        self.file.write_all(&payload)?;
        self.offset = start + crate::block::BLOCK_HEADER_SIZE as u64 + payload.len() as u64;

        self.seen.insert(id, (start, bytes.len() as u64));
        Ok((id, bytes.len() as u64, payload.len() as u64))
    }
}

trait SeekToEnd {
    fn seek_to_end(&mut self) -> std::io::Result<u64>;
}

impl SeekToEnd for std::fs::File {
    fn seek_to_end(&mut self) -> std::io::Result<u64> {
        use std::io::{Seek, SeekFrom};
        self.seek(SeekFrom::End(0))
    }
}

/// Read back a chunk previously stored by [`ContainerChunkSink`], verifying
/// its BLAKE3 content hash against `id`.
pub fn read_chunk(
    path: impl AsRef<Path>,
    offset: u64,
    decryption_key: Option<&[u8; 32]>,
) -> Result<Vec<u8>, SinkError> {
    use std::io::{Seek, SeekFrom};
    let mut file = std::fs::File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    let header = BlockHeader::read(&mut file)?;
    let mut payload = vec![0u8; header.comp_size as usize];
    file.read_exact(&mut payload)?;
    decode_block(&header, &payload, decryption_key).map_err(SinkError::Codec)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trips_through_from_hex() {
        let id = ChunkId::of(b"round trip me");
        assert_eq!(ChunkId::from_hex(&id.to_hex()), Some(id));
    }

    #[test]
    fn from_hex_rejects_malformed_input() {
        assert_eq!(ChunkId::from_hex("not hex"), None);
        assert_eq!(ChunkId::from_hex("ab"), None);
    }

    #[test]
    fn memory_sink_deduplicates_identical_bytes() {
        let mut sink = MemoryChunkSink::new();
        let (id1, orig1, _) = sink.add_chunk(b"hello world").unwrap();
        let (id2, orig2, _) = sink.add_chunk(b"hello world").unwrap();
        assert_eq!(id1, id2);
        assert_eq!(orig1, orig2);
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn memory_sink_distinguishes_different_bytes() {
        let mut sink = MemoryChunkSink::new();
        let (id1, ..) = sink.add_chunk(b"alpha").unwrap();
        let (id2, ..) = sink.add_chunk(b"beta").unwrap();
        assert_ne!(id1, id2);
        assert_eq!(sink.len(), 2);
    }

    #[test]
    fn container_sink_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chunks.6cy");
        let mut sink = ContainerChunkSink::create(&path, CodecId::Zstd, 3, None).unwrap();
        let (id, orig_len, _) = sink.add_chunk(b"payload bytes for a chunk").unwrap();
        assert_eq!(orig_len, 25);

        let back = read_chunk(&path, 0, None).unwrap();
        assert_eq!(back, b"payload bytes for a chunk");
        assert_eq!(ChunkId::of(&back), id);
    }

    #[test]
    fn container_sink_deduplicates_across_calls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chunks.6cy");
        let mut sink = ContainerChunkSink::create(&path, CodecId::Zstd, 3, None).unwrap();
        let (id1, ..) = sink.add_chunk(b"repeat me").unwrap();
        let (id2, ..) = sink.add_chunk(b"repeat me").unwrap();
        assert_eq!(id1, id2);
        assert_eq!(sink.chunk_count(), 1);
    }
}
