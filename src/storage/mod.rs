//! Storage layer for the backup subsystem
//!
//! Provides atomic file writes and the JSON sidecar stores that hold backup
//! and restore records.

pub mod file_io;
pub mod sidecar;

pub use file_io::{
    read_json_required, remove_dir_if_exists, remove_file_if_exists, write_bytes_atomic,
    write_json_atomic,
};
pub use sidecar::{SidecarRecord, SidecarStore};
