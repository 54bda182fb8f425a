//! Backup archive format
//!
//! `codec` owns the zip container layout; `serializer` captures live
//! components into payloads that the codec places into the container.

pub mod codec;
pub mod serializer;

pub use codec::{
    assemble, build_nested, nested_entries, ArchiveContents, NestedEntry, DEFAULT_MAX_ENTRY_BYTES,
    METADATA_ENTRY,
};
pub use serializer::{serialize, SerializedComponent};
