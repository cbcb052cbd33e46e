//! Minimal chunk-list manifest — the outer-layer wiring the core's own
//! design notes describe but leave unimplemented (§6: "chunk lists produced
//! by CB are persisted in the manifest by an outer layer").
//!
//! Write path: caller → [`ManifestWriter::add_entry`] → [`record::encode`]
//! → [`ChunkBuffer`] → [`ContainerChunkSink`] → chunk id list.
//! Read path: chunk bytes → [`RobustUnpacker::feed`] → codec →
//! validator-gated emit → caller.
//!
//! This is intentionally thin: no repository locking, no key management
//! beyond the existing Argon2id/AES-GCM pipeline, no cache accounting.
//! Those stay out of scope for the same reason they're out of scope for
//! the core itself.

use std::path::{Path, PathBuf};

use crate::chunk::{ChunkId, ContainerChunkSink, SinkError};
use crate::chunk_buffer::{ChunkBuffer, ChunkBufferError};
use crate::codec::CodecId;
use crate::record::{self, Record};
use crate::unpacker::RobustUnpacker;

/// A single manifest entry: one file's name, size, and content hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub path: String,
    pub size: u64,
    pub content_hash: [u8; 32],
}

fn entry_to_record(e: &Entry) -> Record {
    record::map(vec![
        (b"path".to_vec(), record::text(e.path.clone())),
        (b"size".to_vec(), record::uint(e.size)),
        (b"hash".to_vec(), record::bytes(e.content_hash.to_vec())),
    ])
}

fn record_to_entry(value: &Record) -> Option<Entry> {
    let path = record::as_text(record::map_get(value, b"path")?)?.to_owned();
    let size = record::as_u64(record::map_get(value, b"size")?)?;
    let hash_bytes = record::as_bytes(record::map_get(value, b"hash")?)?;
    let content_hash: [u8; 32] = hash_bytes.try_into().ok()?;
    Some(Entry { path, size, content_hash })
}

/// Validator gate used on read: an entry record must carry all three
/// required fields in the shapes this manifest writes.
pub fn is_entry_record(value: &Record) -> bool {
    record_to_entry(value).is_some()
}

/// Streams [`Entry`] records through a [`ChunkBuffer`] backed by a
/// [`ContainerChunkSink`], flushing after every entry so the chunk store
/// never holds more than one unflushed record at a time.
pub struct ManifestWriter {
    path: PathBuf,
    cb: ChunkBuffer<ContainerChunkSink>,
}

impl ManifestWriter {
    pub fn create(
        path: impl AsRef<Path>,
        chunk_size_target: usize,
        codec_id: CodecId,
        level: i32,
        encryption_key: Option<[u8; 32]>,
    ) -> Result<Self, SinkError> {
        let path = path.as_ref().to_owned();
        let sink = ContainerChunkSink::create(&path, codec_id, level, encryption_key)?;
        Ok(Self { path, cb: ChunkBuffer::new(sink, chunk_size_target) })
    }

    pub fn add_entry(&mut self, entry: &Entry) -> Result<(), ChunkBufferError> {
        self.cb.add(&entry_to_record(entry));
        self.cb.flush(false)
    }

    /// Final flush, returning the chunk id list (in submission order) and
    /// the store path to hand to [`read_entries`].
    pub fn finish(mut self) -> Result<(PathBuf, Vec<ChunkId>), ChunkBufferError> {
        self.cb.flush(true)?;
        let ids = self.cb.chunk_ids().to_vec();
        Ok((self.path, ids))
    }
}

/// Replay a manifest's chunk list back into entries, resyncing past any
/// chunk whose bytes are missing or corrupt rather than failing outright.
pub fn read_entries(
    path: impl AsRef<Path>,
    chunk_ids: &[ChunkId],
    decryption_key: Option<&[u8; 32]>,
) -> Result<Vec<Entry>, SinkError> {
    let sink = ContainerChunkSink::reopen(&path)?;
    let mut ru = RobustUnpacker::new(is_entry_record);
    let mut entries = Vec::new();

    for id in chunk_ids {
        match sink.offset_of(id) {
            Some(offset) => {
                let bytes = crate::chunk::read_chunk(&path, offset, decryption_key)?;
                ru.feed(&bytes);
                entries.extend(ru.pull().iter().filter_map(record_to_entry));
            }
            None => {
                // Chunk is missing from the store; resync past the gap
                // instead of treating it as fatal.
                ru.resync();
            }
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_entries_through_the_chunk_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.6cy");

        let mut writer = ManifestWriter::create(&path, 1, CodecId::Zstd, 3, None).unwrap();
        let entries = vec![
            Entry { path: "a.txt".into(), size: 12, content_hash: [1u8; 32] },
            Entry { path: "b.txt".into(), size: 34, content_hash: [2u8; 32] },
        ];
        for e in &entries {
            writer.add_entry(e).unwrap();
        }
        let (path, ids) = writer.finish().unwrap();
        assert_eq!(ids.len(), 2);

        let replayed = read_entries(&path, &ids, None).unwrap();
        assert_eq!(replayed, entries);
    }
}
