use crate::timeline::{self, NormalizedLogEntry};
use anyhow::{Context, Result};
use log::debug;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use thiserror::Error;

/// Lines used for the report's initial log slice.
pub const INITIAL_RANGE: LogRange = LogRange { from: 1, to: 500 };

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RangeError {
    #[error("missing `{0}` parameter")]
    Missing(&'static str),

    #[error("`{name}` must be a line number, got {value:?}")]
    NotNumeric { name: &'static str, value: String },

    #[error("line numbers start at 1")]
    Zero,

    #[error("`from` ({from}) is greater than `to` ({to})")]
    Inverted { from: usize, to: usize },
}

/// Inclusive, 1-based line range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRange {
    from: usize,
    to: usize,
}

impl LogRange {
    pub fn new(from: usize, to: usize) -> Result<Self, RangeError> {
        if from == 0 || to == 0 {
            return Err(RangeError::Zero);
        }
        if from > to {
            return Err(RangeError::Inverted { from, to });
        }
        Ok(Self { from, to })
    }

    /// Build a range from raw query parameters.
    pub fn parse(from: Option<&str>, to: Option<&str>) -> Result<Self, RangeError> {
        let from = parse_line_number("from", from)?;
        let to = parse_line_number("to", to)?;
        Self::new(from, to)
    }

    pub fn first(&self) -> usize {
        self.from
    }

    pub fn last(&self) -> usize {
        self.to
    }
}

fn parse_line_number(name: &'static str, raw: Option<&str>) -> Result<usize, RangeError> {
    let raw = raw.ok_or(RangeError::Missing(name))?;
    raw.trim()
        .parse()
        .map_err(|_| RangeError::NotNumeric {
            name,
            value: raw.to_string(),
        })
}

/// A raw line and its 1-based position in the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub number: usize,
    pub text: String,
}

/// Read the lines of `range` from the file at `path`.
///
/// The file is scanned from the top since line offsets are unknown, and
/// reading stops once `range.to` has been read.
pub fn read_lines(path: &Path, range: LogRange) -> Result<Vec<LogLine>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open log file: {}", path.display()))?;
    let mut reader = BufReader::new(file);

    let mut lines = Vec::new();
    let mut buf = Vec::new();
    let mut number = 0;

    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .with_context(|| format!("Failed to read line {}", number + 1))?;
        if read == 0 {
            break;
        }
        number += 1;

        if number < range.from {
            continue;
        }

        while matches!(buf.last(), Some(b'\n' | b'\r')) {
            buf.pop();
        }
        lines.push(LogLine {
            number,
            text: String::from_utf8_lossy(&buf).into_owned(),
        });

        if number >= range.to {
            break;
        }
    }

    Ok(lines)
}

/// Read `range` and normalize it as one pass.
///
/// Offsets are relative to the first dated line inside the range, so a range
/// that does not start at line 1 may disagree with a full read.
pub fn query_logs(path: &Path, range: LogRange) -> Result<Vec<NormalizedLogEntry>> {
    let lines = read_lines(path, range)?;
    if let (Some(first), Some(last)) = (lines.first(), lines.last()) {
        debug!("Normalizing lines {}..={}", first.number, last.number);
    }

    let pass = timeline::normalize(lines.into_iter().map(|line| line.text));
    if let Some(anchor) = pass.anchor {
        debug!(
            "Anchored at {:02}:{:02}:{:02}",
            anchor.hours, anchor.minutes, anchor.seconds
        );
    }

    Ok(pass.entries)
}
