//! Local file system scanning and content checksums.

pub mod checksum;
pub mod walker;
