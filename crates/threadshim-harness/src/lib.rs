//! Conformance harness for threadshim.
//!
//! This crate provides:
//! - A conformance runner that exercises the observable contract of every
//!   primitive (re-entrancy, non-blocking trylock, atomic uniqueness, rwlock
//!   exclusion, lock file exclusivity, TLS isolation, single destroy)
//! - Structured JSONL run logs and an artifact index with SHA-256 digests
//! - Machine-readable conformance reports

#![forbid(unsafe_code)]

pub mod conformance;
pub mod report;
pub mod structured_log;

pub use conformance::{ConformanceFailure, ConformanceRunner, Property, PropertyResult};
pub use report::ConformanceReport;
