//! Allocation trace parsing.
//!
//! The trace grammar is one operation per line:
//!
//! ```text
//! a <id> <size>   allocate <size> bytes under <id>
//! r <id> <size>   resize the block under <id> to <size> bytes
//! f <id>          free the block under <id>
//! ```
//!
//! Blank lines and `#` comments are skipped. Classic malloclab trace
//! files open with bare integer header lines (suggested heap size, id
//! count, op count, weight); those are recognized and ignored so recorded
//! traces replay unmodified.

use std::path::Path;
use std::str::SplitWhitespace;

use thiserror::Error;

/// Trace reading or parsing failure.
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },
}

/// One replayable request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceOp {
    Alloc { id: usize, size: usize },
    Resize { id: usize, size: usize },
    Free { id: usize },
}

/// Parses a trace from a string.
pub fn parse_str(input: &str) -> Result<Vec<TraceOp>, TraceError> {
    let mut ops = Vec::new();
    for (number, raw) in input.lines().enumerate() {
        let line = number + 1;
        let text = raw.trim();
        if text.is_empty() || text.starts_with('#') {
            continue;
        }

        let mut fields = text.split_whitespace();
        let verb = fields.next().unwrap_or_default();
        if verb.parse::<u64>().is_ok() {
            // Header metadata line.
            continue;
        }

        let op = match verb {
            "a" => TraceOp::Alloc {
                id: numeric_field(&mut fields, line, "id")?,
                size: numeric_field(&mut fields, line, "size")?,
            },
            "r" => TraceOp::Resize {
                id: numeric_field(&mut fields, line, "id")?,
                size: numeric_field(&mut fields, line, "size")?,
            },
            "f" => TraceOp::Free {
                id: numeric_field(&mut fields, line, "id")?,
            },
            other => {
                return Err(TraceError::Parse {
                    line,
                    reason: format!("unknown op {other:?}"),
                });
            }
        };

        if fields.next().is_some() {
            return Err(TraceError::Parse {
                line,
                reason: "trailing fields".to_string(),
            });
        }
        ops.push(op);
    }
    Ok(ops)
}

/// Parses a trace file.
pub fn parse_file(path: &Path) -> Result<Vec<TraceOp>, TraceError> {
    parse_str(&std::fs::read_to_string(path)?)
}

fn numeric_field(
    fields: &mut SplitWhitespace<'_>,
    line: usize,
    what: &str,
) -> Result<usize, TraceError> {
    let raw = fields.next().ok_or_else(|| TraceError::Parse {
        line,
        reason: format!("missing {what}"),
    })?;
    raw.parse().map_err(|_| TraceError::Parse {
        line,
        reason: format!("bad {what} {raw:?}"),
    })
}
