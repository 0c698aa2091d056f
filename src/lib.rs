//! patchforge — patch-series management for a forked browser source tree.
//!
//! The engine captures working-tree changes as per-file patch artifacts,
//! replays ordered series of artifacts onto a clean checkout, and tracks
//! which fork feature each artifact belongs to. The `patchforge` binary
//! is thin wiring over these modules.

pub mod config;
pub mod extract;
pub mod feature;
pub mod git;
pub mod model;
pub mod series;
pub mod store;
pub mod telemetry;
