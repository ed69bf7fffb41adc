//! Internal utilities for the Simloop runtime.
//!
//! These utilities are intentionally minimal and dependency-free to
//! maintain determinism.

pub mod det_rng;
pub mod seq;

pub use det_rng::DetRng;
pub use seq::Seq;
