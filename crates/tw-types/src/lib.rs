//! # tw-types
//!
//! Core types shared by the TurboWorks crates: search spaces, points,
//! persisted trials and the error taxonomy.

pub mod errors;
pub mod space;
pub mod trial;

pub use errors::*;
pub use space::*;
pub use trial::*;
