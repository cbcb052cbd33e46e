//! Robust stream unpacker — resyncs on record boundaries under validator
//! guidance.
//!
//! # State machine
//!
//! | State | On pull, decode succeeds | On pull, decode malformed |
//! |---|---|---|
//! | Synced | emit unconditionally; cursor advances; stay Synced | enter Resyncing at cursor, no emit |
//! | Resyncing | validator accepts → emit, advance, → Synced. Rejects → advance cursor by **one byte**, retry | advance cursor by one byte, retry |
//!
//! `resync()` forces Resyncing regardless of current position. `NeedMore`
//! always stops the pull cleanly in either state, with nothing consumed.
//!
//! The validator is an anchor for reacquiring sync, not a universal filter:
//! once synced, every value the self-delimiting codec decodes is handed to
//! the caller unconditionally. This is required by this module's own test
//! suite (see `garbage_without_resync_surfaces_raw_integers` below, which
//! mirrors the upstream test this module is ported from): feeding "garbage"
//! bytes *without* calling `resync()` first must surface each byte as a
//! raw decoded integer, because the underlying codec happily decodes a
//! single `0x00..=0x7f` byte as a standalone positive fixint and nothing
//! in the Synced state consults the validator to suppress it. Only once
//! synchronization is lost (a genuinely malformed decode, or an explicit
//! `resync()`) does the validator start gating which candidate boundary is
//! accepted back into Synced.

use std::panic::{self, AssertUnwindSafe};

use crate::record::{Decoded, Decoder, Record};

/// Caller-supplied gate on which decoded records RU accepts as a valid
/// resync boundary. Must be total and side-effect-free; a panic is treated
/// as rejection.
pub type Validator = dyn Fn(&Record) -> bool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Synced,
    Resyncing,
}

/// Extracts records from a byte stream that may contain garbage prefixes,
/// garbage infixes, missing spans, or corrupt fragments, resynchronizing on
/// record boundaries under validator guidance.
pub struct RobustUnpacker {
    decoder: Decoder,
    state: State,
    validator: Box<Validator>,
}

impl RobustUnpacker {
    pub fn new<F>(validator: F) -> Self
    where
        F: Fn(&Record) -> bool + 'static,
    {
        Self {
            decoder: Decoder::new(),
            state: State::Synced,
            validator: Box::new(validator),
        }
    }

    /// Append bytes to the pending input. Never blocks, never fails.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.decoder.feed(bytes);
    }

    /// Force the unpacker to hunt for a new record boundary on the next
    /// pull, starting at the current cursor. Does not discard pending
    /// bytes — only changes state. Callers invoke this after detecting a
    /// gap (e.g. a missing chunk).
    pub fn resync(&mut self) {
        self.state = State::Resyncing;
        tracing::trace!(target: "sixcy::unpacker", "forced resync requested");
    }

    /// Pull every record obtainable from the currently buffered bytes.
    ///
    /// Stops (without error) as soon as more bytes are required. Call this
    /// after every `feed`; end-of-stream is the caller's own decision based
    /// on source exhaustion, not something this method can observe.
    pub fn pull(&mut self) -> Vec<Record> {
        self.drain().collect()
    }

    /// Iterator-style pull: yields records one at a time, stopping (without
    /// signalling end-of-stream) once more bytes are required.
    pub fn drain(&mut self) -> Drain<'_> {
        Drain { inner: self }
    }

    fn step(&mut self) -> Step {
        match self.state {
            State::Synced => match self.decoder.next() {
                Decoded::Value(value) => Step::Emitted(value),
                Decoded::NeedMore => Step::NeedMore,
                Decoded::Malformed => {
                    self.state = State::Resyncing;
                    tracing::trace!(
                        target: "sixcy::unpacker",
                        "malformed record while Synced, entering Resyncing"
                    );
                    Step::Progressed
                }
            },
            State::Resyncing => match self.decoder.next() {
                Decoded::Value(value) => {
                    if self.validate(&value) {
                        self.state = State::Synced;
                        tracing::trace!(target: "sixcy::unpacker", "resync boundary found, back to Synced");
                        Step::Emitted(value)
                    } else {
                        self.decoder.drop_front(1);
                        Step::Progressed
                    }
                }
                Decoded::NeedMore => Step::NeedMore,
                Decoded::Malformed => {
                    self.decoder.drop_front(1);
                    Step::Progressed
                }
            },
        }
    }

    /// Validator exceptions (panics) are treated as rejection.
    fn validate(&self, value: &Record) -> bool {
        let validator = &self.validator;
        panic::catch_unwind(AssertUnwindSafe(|| validator(value))).unwrap_or(false)
    }
}

enum Step {
    Emitted(Record),
    /// The cursor advanced (or state changed) but nothing was emitted yet.
    Progressed,
    NeedMore,
}

/// Iterator returned by [`RobustUnpacker::drain`].
pub struct Drain<'a> {
    inner: &'a mut RobustUnpacker,
}

impl<'a> Iterator for Drain<'a> {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        loop {
            match self.inner.step() {
                Step::Emitted(rec) => return Some(rec),
                Step::Progressed => continue,
                Step::NeedMore => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{self, as_bytes, map_get};

    fn make_chunks(paths: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        for p in paths {
            let rec = record::map(vec![(b"path".to_vec(), record::bytes(p.to_vec()))]);
            out.extend(record::encode(&rec));
        }
        out
    }

    fn path_validator(value: &Record) -> bool {
        match map_get(value, b"path") {
            Some(v) => matches!(as_bytes(v), Some(b"foo") | Some(b"bar") | Some(b"boo") | Some(b"baz")),
            None => false,
        }
    }

    fn path_of(rec: &Record) -> Vec<u8> {
        as_bytes(map_get(rec, b"path").unwrap()).unwrap().to_vec()
    }

    fn split(data: &[u8], len: usize) -> Vec<Vec<u8>> {
        data.chunks(len).map(|c| c.to_vec()).collect()
    }

    #[test]
    fn correct_stream_with_tiny_feeds() {
        let data = make_chunks(&[b"foo", b"bar", b"boo", b"baz"]);
        let mut ru = RobustUnpacker::new(path_validator);
        let mut results = Vec::new();
        for chunk in split(&data, 2) {
            ru.feed(&chunk);
            results.extend(ru.pull());
        }
        let paths: Vec<Vec<u8>> = results.iter().map(path_of).collect();
        assert_eq!(paths, vec![b"foo".to_vec(), b"bar".to_vec(), b"boo".to_vec(), b"baz".to_vec()]);
    }

    #[test]
    fn missing_chunk_is_skipped_via_resync() {
        let data = make_chunks(&[b"foo", b"bar", b"boo", b"baz"]);
        let chunks = split(&data, 4);
        let mut ru = RobustUnpacker::new(path_validator);
        let mut results = Vec::new();
        for c in &chunks[..3] {
            ru.feed(c);
            results.extend(ru.pull());
        }
        ru.resync();
        for c in &chunks[4..] {
            ru.feed(c);
            results.extend(ru.pull());
        }
        let paths: Vec<Vec<u8>> = results.iter().map(path_of).collect();
        assert_eq!(paths, vec![b"foo".to_vec(), b"boo".to_vec(), b"baz".to_vec()]);
    }

    #[test]
    fn corrupt_chunk_is_skipped_via_resync() {
        let data = make_chunks(&[b"foo", b"bar", b"boo", b"baz"]);
        let chunks = split(&data, 4);
        let mut ru = RobustUnpacker::new(path_validator);
        let mut results = Vec::new();
        for c in &chunks[..3] {
            ru.feed(c);
            results.extend(ru.pull());
        }
        ru.resync();
        ru.feed(b"gar");
        results.extend(ru.pull());
        ru.feed(b"bage");
        results.extend(ru.pull());
        for c in &chunks[3..] {
            ru.feed(c);
            results.extend(ru.pull());
        }
        let paths: Vec<Vec<u8>> = results.iter().map(path_of).collect();
        assert_eq!(paths, vec![b"foo".to_vec(), b"boo".to_vec(), b"baz".to_vec()]);
    }

    #[test]
    fn garbage_without_resync_surfaces_raw_integers() {
        let mut ru = RobustUnpacker::new(path_validator);
        ru.feed(&make_chunks(&[b"foo", b"bar"]));
        let mut results = ru.pull();
        ru.feed(b"garbage");
        results.extend(ru.pull());
        ru.feed(&make_chunks(&[b"boo", b"baz"]));
        results.extend(ru.pull());

        assert_eq!(path_of(&results[0]), b"foo".to_vec());
        assert_eq!(path_of(&results[1]), b"bar".to_vec());
        let garbage_ints: Vec<i64> = results[2..9].iter().map(|r| record::as_i64(r).unwrap()).collect();
        assert_eq!(garbage_ints, vec![103, 97, 114, 98, 97, 103, 101]);
        assert_eq!(path_of(&results[9]), b"boo".to_vec());
        assert_eq!(path_of(&results[10]), b"baz".to_vec());
        assert_eq!(results.len(), 11);
    }

    #[test]
    fn panicking_validator_is_treated_as_rejection_during_resync() {
        // 0xc1 is a MessagePack marker that is permanently reserved/never
        // used, guaranteeing a Malformed decode that forces Resyncing.
        let mut data = vec![0xc1u8];
        data.extend(make_chunks(&[b"foo"]));
        let mut ru = RobustUnpacker::new(|_: &Record| panic!("validator should never reach this"));
        ru.feed(&data);
        let results = ru.pull();
        assert!(results.is_empty());
    }
}
