//! Overseer workspace root.
//!
//! Re-exports the [`overseer`] facade so the workspace-level integration
//! tests and benchmarks under `tests/` and `benches/` share one import path.

pub use overseer::*;
