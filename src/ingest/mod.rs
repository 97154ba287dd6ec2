//! Frame sources.
//!
//! Sources produce `Frame`s and hand them to the admission controller. They
//! do not pace themselves and do not retain frames after handoff.

pub mod synthetic;

pub use synthetic::{SourceConfig, SourceStats, SyntheticSource};
