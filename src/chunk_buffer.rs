//! Chunk Buffer (CB) — stages encoded records and hands off record-aligned
//! byte ranges to a [`ChunkSink`], producing an ordered chunk id list.
//!
//! # Flush policy
//!
//! Every record's end is a candidate boundary. `flush(final=false)` only
//! ever submits a **prefix that ends exactly on the current buffer's last
//! boundary** (equivalently: the whole buffer, since nothing is ever
//! appended except through complete `add` calls) and only once that prefix
//! has grown to at least `chunk_size_target` bytes; otherwise it leaves the
//! buffer untouched. `flush(final=true)` drains every remaining record,
//! submitting each as its own chunk rather than merging them — so a small
//! tail of leftover records stays individually addressable instead of
//! collapsing into one oversized final chunk.
//!
//! A chunk never straddles a record boundary in either mode: the whole
//! point of aligning cuts to completed `add` calls is that RU can resync
//! at chunk granularity (losing a whole chunk never corrupts a neighbor).

use thiserror::Error;

use crate::chunk::{ChunkId, ChunkSink, SinkError};
use crate::record::{self, Record};

#[derive(Error, Debug)]
pub enum ChunkBufferError {
    #[error("chunk sink failed: {0}")]
    SinkFailure(#[from] SinkError),
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

/// Accumulates serialized records and flushes record-aligned spans to a
/// [`ChunkSink`], per the policy documented on the module.
pub struct ChunkBuffer<S: ChunkSink> {
    sink: S,
    buffer: Vec<u8>,
    /// Ascending end-offsets of completed records within `buffer`.
    boundaries: Vec<usize>,
    chunk_size_target: usize,
    chunk_ids: Vec<ChunkId>,
}

impl<S: ChunkSink> ChunkBuffer<S> {
    pub fn new(sink: S, chunk_size_target: usize) -> Self {
        Self {
            sink,
            buffer: Vec::new(),
            boundaries: Vec::new(),
            chunk_size_target,
            chunk_ids: Vec::new(),
        }
    }

    /// Encode `record` and append it to the buffer. Never submits a chunk
    /// by itself — call `flush` to do that.
    pub fn add(&mut self, record: &Record) {
        let bytes = record::encode(record);
        self.buffer.extend_from_slice(&bytes);
        self.boundaries.push(self.buffer.len());
    }

    /// Chunk ids submitted so far, in submission order.
    pub fn chunk_ids(&self) -> &[ChunkId] {
        &self.chunk_ids
    }

    /// Bytes currently staged but not yet submitted to the sink.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_pending_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Unwrap the underlying sink, e.g. to look up where chunks ended up
    /// once the caller is done adding records.
    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Submit buffered bytes to the sink per the flush policy.
    ///
    /// `final = false`: submit the whole buffer as one chunk once its
    /// length reaches `chunk_size_target`; otherwise submit nothing.
    ///
    /// `final = true`: submit every remaining record individually; the
    /// buffer is always empty once this returns.
    pub fn flush(&mut self, final_flush: bool) -> Result<(), ChunkBufferError> {
        if final_flush {
            self.flush_final()
        } else {
            self.flush_partial()
        }
    }

    fn flush_partial(&mut self) -> Result<(), ChunkBufferError> {
        if self.buffer.is_empty() || self.buffer.len() < self.chunk_size_target {
            return Ok(());
        }
        self.submit_chunk(0, self.buffer.len())?;
        self.buffer.clear();
        self.boundaries.clear();
        Ok(())
    }

    fn flush_final(&mut self) -> Result<(), ChunkBufferError> {
        let mut start = 0;
        for &end in &std::mem::take(&mut self.boundaries) {
            self.submit_chunk(start, end)?;
            start = end;
        }
        self.buffer.clear();
        Ok(())
    }

    fn submit_chunk(&mut self, start: usize, end: usize) -> Result<(), ChunkBufferError> {
        if end <= start {
            return Err(ChunkBufferError::InvariantViolation(
                "attempted to submit an empty or inverted chunk span".into(),
            ));
        }
        let (id, _orig, _stored) = self.sink.add_chunk(&self.buffer[start..end])?;
        self.chunk_ids.push(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::MemoryChunkSink;
    use crate::record::{Decoded, Decoder};

    fn decode_all(blob: &[u8]) -> Vec<Record> {
        let mut dec = Decoder::new();
        dec.feed(blob);
        let mut out = Vec::new();
        loop {
            match dec.next() {
                Decoded::Value(v) => out.push(v),
                Decoded::NeedMore => break,
                Decoded::Malformed => panic!("unexpected malformed record in test fixture"),
            }
        }
        out
    }

    fn concatenated_chunks(sink: &MemoryChunkSink, ids: &[ChunkId]) -> Vec<u8> {
        let mut out = Vec::new();
        for id in ids {
            out.extend_from_slice(sink.get(id).expect("chunk present"));
        }
        out
    }

    #[test]
    fn small_records_round_trip_one_chunk_per_record() {
        let records = vec![
            record::map(vec![(b"foo".to_vec(), record::int(1))]),
            record::map(vec![(b"bar".to_vec(), record::int(2))]),
        ];
        let mut cb = ChunkBuffer::new(MemoryChunkSink::new(), 1);
        for r in &records {
            cb.add(r);
            cb.flush(false).unwrap();
        }
        cb.flush(true).unwrap();

        assert_eq!(cb.chunk_ids().len(), 2);
        assert!(cb.is_pending_empty());

        let blob = concatenated_chunks(cb_sink(&cb), cb.chunk_ids());
        assert_eq!(decode_all(&blob), records);
    }

    fn cb_sink<S: ChunkSink>(cb: &ChunkBuffer<S>) -> &S {
        &cb.sink
    }

    #[test]
    fn trailing_record_below_target_is_kept_until_final_flush() {
        let big_payload = vec![0u8; 100_000];
        let big_record = record::map(vec![
            (b"data".to_vec(), record::bytes(big_payload)),
        ]);
        let small_record = record::map(vec![(b"bar".to_vec(), record::int(2))]);

        let mut cb = ChunkBuffer::new(MemoryChunkSink::new(), 4096);
        cb.add(&big_record);
        cb.flush(false).unwrap();
        assert_eq!(cb.chunk_ids().len(), 1, "the big record alone already clears the target");
        assert!(cb.is_pending_empty());

        cb.add(&small_record);
        cb.flush(false).unwrap();
        assert_eq!(cb.chunk_ids().len(), 1, "the small record alone never reaches the target");
        assert!(!cb.is_pending_empty());

        cb.flush(true).unwrap();
        assert_eq!(cb.chunk_ids().len(), 2);
        assert!(cb.is_pending_empty());

        let blob = concatenated_chunks(cb_sink(&cb), cb.chunk_ids());
        assert_eq!(decode_all(&blob), vec![big_record, small_record]);
    }

    #[test]
    fn final_flush_on_empty_buffer_is_a_no_op() {
        let mut cb = ChunkBuffer::new(MemoryChunkSink::new(), 64);
        cb.flush(true).unwrap();
        assert!(cb.chunk_ids().is_empty());
    }
}
