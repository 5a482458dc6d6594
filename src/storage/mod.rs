//! Storage module - on-disk persistence and crash recovery

mod disk;

pub use disk::*;
