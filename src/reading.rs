//! Reading model shared by the ingestion loop and the append log.
use crate::frame::{format_decimal_comma, ParsedFrame};
use chrono::{DateTime, Local, NaiveDateTime, Timelike};
use std::fmt;

/// Timestamp layout used in the log file.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Note recorded for inline `m <value>` entries.
pub const QUICK_ENTRY_NOTE: &str = "Input cepat";

/// Where a reading came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Captured from the device line stream.
    Serial,
    /// Typed in by the operator.
    Manual,
}

impl Source {
    /// Tag written to the `Sumber` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Serial => "SERIAL",
            Source::Manual => "MANUAL",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An accepted reading waiting for its sequence number.
///
/// The append log assigns the number when the row is persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    /// Local time of acceptance, truncated to whole seconds.
    pub timestamp: NaiveDateTime,
    /// Device or operator.
    pub source: Source,
    /// Value in kN.
    pub value: f64,
    /// Raw device line or operator note; may be empty.
    pub raw_payload: String,
}

impl Reading {
    /// Build a reading stamped with an explicit time.
    pub fn at(
        timestamp: DateTime<Local>,
        source: Source,
        value: f64,
        raw_payload: impl Into<String>,
    ) -> Self {
        let naive = timestamp.naive_local();
        Self {
            timestamp: naive.with_nanosecond(0).unwrap_or(naive),
            source,
            value,
            raw_payload: raw_payload.into(),
        }
    }

    /// Reading captured from the device, stamped now.
    pub fn from_frame(frame: ParsedFrame) -> Self {
        Self::at(Local::now(), Source::Serial, frame.value, frame.raw)
    }

    /// Reading entered by the operator, stamped now.
    pub fn manual(value: f64, note: impl Into<String>) -> Self {
        Self::at(Local::now(), Source::Manual, value, note)
    }

    /// Timestamp as written to the log.
    pub fn timestamp_string(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }

    /// Value as written to the log (decimal comma).
    pub fn value_string(&self) -> String {
        format_decimal_comma(self.value)
    }

    /// Full log row for this reading under `sequence`.
    pub fn to_record(&self, sequence: u64) -> [String; 5] {
        [
            sequence.to_string(),
            self.timestamp_string(),
            self.value_string(),
            self.source.as_str().to_string(),
            self.raw_payload.clone(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_source_tags() {
        assert_eq!(Source::Serial.to_string(), "SERIAL");
        assert_eq!(Source::Manual.to_string(), "MANUAL");
    }

    #[test]
    fn test_record_layout() {
        let ts = Local
            .with_ymd_and_hms(2024, 3, 9, 14, 5, 7)
            .single()
            .unwrap();
        let reading = Reading::at(ts, Source::Serial, 7.2, "ovalue 7.2 kPa");

        assert_eq!(
            reading.to_record(1),
            [
                "1".to_string(),
                "2024-03-09 14:05:07".to_string(),
                "7,2".to_string(),
                "SERIAL".to_string(),
                "ovalue 7.2 kPa".to_string(),
            ]
        );
    }

    #[test]
    fn test_timestamp_has_second_precision() {
        let reading = Reading::manual(15.0, QUICK_ENTRY_NOTE);
        assert_eq!(reading.timestamp.nanosecond(), 0);
        assert_eq!(reading.value_string(), "15");
        assert_eq!(reading.source, Source::Manual);
    }
}
