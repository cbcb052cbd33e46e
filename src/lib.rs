//! # sixcy — content-addressed, deduplicating archive streaming core
//!
//! Three layers, bottom to top:
//!
//! - The `.6cy` **container format** (`block`, `codec`, `crypto`, `index`,
//!   `superblock`, `io_stream`, `recovery`, `archive`): a self-describing,
//!   frozen-UUID-codec, mandatory-checksum block store. Format guarantees:
//!   - All numeric fields are little-endian; never negotiated.
//!   - Every block is self-describing: magic, version, codec UUID, sizes, BLAKE3.
//!   - Every block header carries a mandatory CRC32; corrupt headers abort reads.
//!   - Codec identity is a frozen 16-byte UUID; short IDs are in-process only.
//!   - The container superblock declares all required codecs; decoders fail
//!     immediately if any UUID is unavailable — no partial decode, no fallback.
//!   - The INDEX block is at the end; the full block list is reconstructible by
//!     scanning forward from `SUPERBLOCK_SIZE` without the INDEX.
//! - The **streaming core** (`record`, `unpacker`, `chunk`, `chunk_buffer`):
//!   a self-delimiting record codec, a resync-on-corruption unpacker, and a
//!   chunk buffer that stages records into record-aligned, content-addressed
//!   chunks. These are storage-agnostic — `chunk::MemoryChunkSink` and
//!   `chunk::ContainerChunkSink` are two interchangeable backings.
//! - `manifest`: the minimal outer-layer wiring that persists a chunk buffer's
//!   chunk id list and replays it back through the unpacker.
//!
//! `time` provides the platform-safe timestamp clamping and formatting used
//! throughout archive metadata.

pub mod superblock;
pub mod codec;
pub mod crypto;
pub mod block;
pub mod index;
pub mod recovery;
pub mod io_stream;
pub mod archive;

pub mod record;
pub mod unpacker;
pub mod chunk;
pub mod chunk_buffer;
pub mod manifest;
pub mod time;

// Flat re-exports for the most common types.
pub use superblock::Superblock;
pub use codec::{CodecId, get_codec, get_codec_by_uuid, CodecError};
pub use block::{BlockHeader, BlockType, encode_block, decode_block,
                BLOCK_HEADER_SIZE, BLOCK_MAGIC};
pub use index::{FileIndex, FileIndexRecord, BlockRef};
pub use crypto::{derive_key, CryptoError};
pub use archive::{Archive, PackOptions, FileInfo};
pub use recovery::{RecoveryReport, RecoveryQuality, BlockHealth, scan_file};

pub use record::{Record, Decoder, Decoded};
pub use unpacker::{RobustUnpacker, Validator};
pub use chunk::{ChunkId, ChunkSink, MemoryChunkSink, ContainerChunkSink, SinkError};
pub use chunk_buffer::{ChunkBuffer, ChunkBufferError};
