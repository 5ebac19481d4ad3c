//! Crate includes reusable utils for the vigilante services that handle common behavior.
//! Such as initializing the tracing framework, retrying fallible calls and collecting the errors
//! of a sweep.

pub mod errors;
pub mod logging;
pub mod retry;

// Re-export tracing crate for convenience.
pub use tracing;
