use crate::types::{MotionEvent, OrientationEvent};
use std::collections::VecDeque;
use thiserror::Error;

/// Tokens that mark an absent axis.
const ABSENT: [&str; 2] = ["-", "null"];

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("line {line}: unknown record type `{kind}`")]
    UnknownRecord { line: usize, kind: String },
    #[error("line {line}: missing field `{field}`")]
    MissingField { line: usize, field: &'static str },
    #[error("line {line}: `{value}` is not a number")]
    InvalidNumber { line: usize, value: String },
    #[error("line {line}: not valid UTF-8")]
    InvalidUtf8 { line: usize },
}

/// One line of a recorded session script.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplayRecord {
    Orientation(OrientationEvent),
    Motion(MotionEvent),
    Calibrate {
        timestamp_ms: f64,
    },
    /// Take a recording with the given tag (may be empty).
    Record {
        timestamp_ms: f64,
        tag: String,
    },
    Gps {
        timestamp_ms: f64,
        latitude: f64,
        longitude: f64,
        altitude_m: Option<f64>,
    },
}

impl ReplayRecord {
    pub fn timestamp_ms(&self) -> f64 {
        match self {
            ReplayRecord::Orientation(e) => e.timestamp_ms,
            ReplayRecord::Motion(e) => e.timestamp_ms,
            ReplayRecord::Calibrate { timestamp_ms }
            | ReplayRecord::Record { timestamp_ms, .. }
            | ReplayRecord::Gps { timestamp_ms, .. } => *timestamp_ms,
        }
    }
}

/// Streaming parser for line-oriented session scripts.
///
/// Feed raw bytes via `push_data`, then drain parsed records via
/// `next_record`. Blank lines and `#` comments are skipped.
pub struct ProtocolParser {
    buffer: VecDeque<u8>,
    line: usize,
}

impl ProtocolParser {
    pub fn new() -> Self {
        Self {
            buffer: VecDeque::with_capacity(4096),
            line: 0,
        }
    }

    /// Append received bytes to the internal buffer.
    pub fn push_data(&mut self, data: &[u8]) {
        self.buffer.extend(data);
    }

    /// Try to extract the next complete record from the buffer.
    /// Returns `None` if no complete line is available yet.
    pub fn next_record(&mut self) -> Option<Result<ReplayRecord, ProtocolError>> {
        loop {
            let newline = self.buffer.iter().position(|&b| b == b'\n')?;
            let bytes: Vec<u8> = self.buffer.drain(..=newline).collect();
            self.line += 1;

            let Ok(text) = std::str::from_utf8(&bytes) else {
                return Some(Err(ProtocolError::InvalidUtf8 { line: self.line }));
            };
            let text = text.trim();
            if text.is_empty() || text.starts_with('#') {
                continue;
            }
            return Some(parse_line(text, self.line));
        }
    }

    /// Treat any trailing bytes as a final line. Call once the input ends.
    pub fn finish(&mut self) -> Option<Result<ReplayRecord, ProtocolError>> {
        if !self.buffer.is_empty() && !self.buffer.contains(&b'\n') {
            self.buffer.push_back(b'\n');
        }
        self.next_record()
    }
}

impl Default for ProtocolParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a complete script held in memory.
pub fn parse_script(text: &str) -> Result<Vec<ReplayRecord>, ProtocolError> {
    let mut parser = ProtocolParser::new();
    parser.push_data(text.as_bytes());

    let mut records = Vec::new();
    while let Some(record) = parser.next_record() {
        records.push(record?);
    }
    if let Some(record) = parser.finish() {
        records.push(record?);
    }
    Ok(records)
}

struct Fields<'a> {
    tokens: std::str::SplitWhitespace<'a>,
    line: usize,
}

impl<'a> Fields<'a> {
    fn next_token(&mut self, field: &'static str) -> Result<&'a str, ProtocolError> {
        self.tokens.next().ok_or(ProtocolError::MissingField {
            line: self.line,
            field,
        })
    }

    fn number(&mut self, field: &'static str) -> Result<f64, ProtocolError> {
        let token = self.next_token(field)?;
        parse_number(token, self.line)
    }

    fn axis(&mut self, field: &'static str) -> Result<Option<f64>, ProtocolError> {
        let token = self.next_token(field)?;
        if ABSENT.contains(&token) {
            return Ok(None);
        }
        parse_number(token, self.line).map(Some)
    }

    fn rest(&mut self) -> String {
        self.tokens.by_ref().collect::<Vec<_>>().join(" ")
    }
}

fn parse_number(token: &str, line: usize) -> Result<f64, ProtocolError> {
    token.parse().map_err(|_| ProtocolError::InvalidNumber {
        line,
        value: token.to_string(),
    })
}

fn parse_line(text: &str, line: usize) -> Result<ReplayRecord, ProtocolError> {
    let mut fields = Fields {
        tokens: text.split_whitespace(),
        line,
    };
    let kind = fields.next_token("record type")?;
    let timestamp_ms = fields.number("timestamp")?;

    match kind {
        "orientation" => Ok(ReplayRecord::Orientation(OrientationEvent {
            alpha: fields.axis("alpha")?,
            beta: fields.axis("beta")?,
            gamma: fields.axis("gamma")?,
            timestamp_ms,
        })),
        "motion" => Ok(ReplayRecord::Motion(MotionEvent {
            x: fields.axis("x")?,
            y: fields.axis("y")?,
            z: fields.axis("z")?,
            timestamp_ms,
        })),
        "calibrate" => Ok(ReplayRecord::Calibrate { timestamp_ms }),
        "record" => Ok(ReplayRecord::Record {
            timestamp_ms,
            tag: fields.rest(),
        }),
        "gps" => {
            let latitude = fields.number("latitude")?;
            let longitude = fields.number("longitude")?;
            let altitude_m = match fields.tokens.next() {
                Some(token) => Some(parse_number(token, line)?),
                None => None,
            };
            Ok(ReplayRecord::Gps {
                timestamp_ms,
                latitude,
                longitude,
                altitude_m,
            })
        }
        other => Err(ProtocolError::UnknownRecord {
            line,
            kind: other.to_string(),
        }),
    }
}
