//! Pressure gauge line protocol.
//!
//! The gauge streams newline-terminated ASCII lines. Only lines containing the
//! sentinel token `ovalue` (any case) carry a reading; the value is the second
//! whitespace-separated token and may use either `.` or `,` as decimal separator:
//!
//! ```text
//! ovalue 7.2 kPa      -> 7.2
//! OVALUE 12,5         -> 12.5
//! ovalue              -> malformed (no value token)
//! status ok           -> not a reading
//! ```
//!
//! Everything here is pure: no I/O and no state.

use std::fmt;

/// Marker identifying a line that carries a reading.
pub const SENTINEL: &str = "ovalue";

/// A line accepted as a reading.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFrame {
    /// Normalized numeric value.
    pub value: f64,
    /// The decoded line the value was taken from.
    pub raw: String,
}

/// Classification of one decoded device line.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// Sentinel present and value token numeric.
    Reading(ParsedFrame),
    /// No sentinel token in the line (includes empty lines).
    NoSentinel,
    /// Sentinel present but no value token after it.
    Malformed,
    /// Sentinel present but the value token is not a finite number.
    InvalidNumber(String),
}

impl FrameOutcome {
    /// Short diagnostic label.
    pub fn kind(&self) -> &'static str {
        match self {
            FrameOutcome::Reading(_) => "reading",
            FrameOutcome::NoSentinel => "no-sentinel",
            FrameOutcome::Malformed => "malformed",
            FrameOutcome::InvalidNumber(_) => "invalid-number",
        }
    }

    /// Whether the outcome results in an appended row.
    pub fn is_reading(&self) -> bool {
        matches!(self, FrameOutcome::Reading(_))
    }
}

impl fmt::Display for FrameOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameOutcome::Reading(frame) => write!(f, "reading {}", frame.value),
            FrameOutcome::NoSentinel => write!(f, "no '{}' token", SENTINEL),
            FrameOutcome::Malformed => write!(f, "incomplete frame, waiting for next line"),
            FrameOutcome::InvalidNumber(token) => write!(f, "'{}' is not a number", token),
        }
    }
}

/// Decode raw bytes from the port into a trimmed line.
///
/// Invalid UTF-8 sequences are dropped rather than replaced, so a burst of line
/// noise in front of a frame does not corrupt the sentinel match.
pub fn decode_line(bytes: &[u8]) -> String {
    let mut decoded = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        decoded.push_str(chunk.valid());
    }
    decoded.trim().to_string()
}

/// Classify a decoded line.
pub fn parse(line: &str) -> FrameOutcome {
    if !line.to_lowercase().contains(SENTINEL) {
        return FrameOutcome::NoSentinel;
    }

    let token = match line.split_whitespace().nth(1) {
        Some(token) => token,
        None => return FrameOutcome::Malformed,
    };

    match parse_decimal(token) {
        Some(value) => FrameOutcome::Reading(ParsedFrame {
            value,
            raw: line.to_string(),
        }),
        None => FrameOutcome::InvalidNumber(token.to_string()),
    }
}

/// Parse a decimal number written with `.` or `,` as separator.
///
/// Non-finite results (`inf`, `NaN`) are rejected.
pub fn parse_decimal(token: &str) -> Option<f64> {
    let normalized = token.trim().replace(',', ".");
    normalized
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

/// Render a value for the log file, with a comma as decimal separator.
pub fn format_decimal_comma(value: f64) -> String {
    value.to_string().replace('.', ",")
}
