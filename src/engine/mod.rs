//! Core engine — the normalize → expand → settle pipeline.

pub mod normalizer;
pub mod expander;
pub mod settler;
pub mod sync;
