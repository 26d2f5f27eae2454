//! Audio search service.
//!
//! Clients open a session over HTTP, stream raw PCM into it and poll a
//! ranked list of best-matching tracks from a preloaded reference
//! corpus. The engine behind each session recomputes a robust spectral
//! fingerprint over the growing buffer, compares it against the corpus
//! peak index on a shared worker pool and publishes versioned results.

pub mod api;
pub mod config;
pub mod corpus;
pub mod error;
pub mod search;
pub mod session;
