//! # Shared Types Crate
//!
//! Primitives shared across subsystems.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: hash, key and identity types are defined once
//!   and re-used by every subsystem crate.
//! - **Plain bytes**: all primitives are fixed-size byte arrays so they encode
//!   identically on every wire format.

pub mod entities;

pub use entities::*;
