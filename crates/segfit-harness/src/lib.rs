//! Trace-driven verification harness for the segfit allocator.
//!
//! Parses recorded allocate/resize/free request sequences
//! ([`trace`]) and replays them against a fresh heap while checking
//! alignment, sufficiency, payload integrity, and heap consistency
//! ([`replay`]). The harness drives only the public operations of
//! `segfit-core`; the engine has no knowledge of it.

#![forbid(unsafe_code)]

pub mod replay;
pub mod trace;

pub use replay::{ReplayError, ReplayReport, ReplaySettings, replay};
pub use trace::{TraceError, TraceOp, parse_file, parse_str};
