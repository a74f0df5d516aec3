//! Common utilities for Matryoshka.
//!
//! This crate provides foundational types shared by the Matryoshka crates:
//!
//! - [`BinaryReader`] - Zero-copy binary reading from byte slices
//! - [`interrupt`] - The per-thread cooperative interruption flag

mod error;
mod reader;

pub mod interrupt;

pub use error::{Error, Result};
pub use reader::BinaryReader;

/// Re-export zerocopy traits for convenience
pub use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};
