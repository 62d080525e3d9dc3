//! Shared model for the generation dispatcher.
//!
//! Holds configuration resolution, the normalized job record, the error
//! taxonomy, and the response-shape parsing used by both backend clients.
//! Nothing in this crate performs I/O.

pub mod config;
pub mod error;
pub mod job;
pub mod normalize;
