//! # Calamus
//!
//! An embeddable event-indexing engine with immutable on-disk segments.
//!
//! ## Features
//!
//! - Pure Rust implementation
//! - Schema-driven event ingestion with five field types
//! - Burst trie term indexes for string fields
//! - Multi-level skip indexes for numeric and timestamp fields
//! - Roaring bitmap posting lists shared by all field indexes
//! - Atomically installed, memory-mapped segment directories

// Core modules
pub mod codec;
mod error;
pub mod event;
pub mod index;
pub mod postings;
pub mod schema;
pub mod segment;
pub mod tokenizer;

// Re-exports for the public API
pub use error::{CalamusError, Result};
pub use event::{Event, Value};
pub use index::btrie::BTrie;
pub use index::skiplist::SkipList;
pub use postings::{PostingId, PostingList, PostingStore};
pub use schema::{FieldInfo, FieldType, IndexInfo, IndexInfoBuilder};
pub use segment::Segment;
pub use segment::reader::SegmentReader;
pub use segment::writer::{SegmentWriter, SegmentWriterConfig};
pub use tokenizer::{LogTokenizer, Tokenizer};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
