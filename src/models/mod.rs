//! Data models

pub mod record;
pub mod scoring;

pub use record::*;
pub use scoring::*;
