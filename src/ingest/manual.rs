//! Keyboard commands accepted while a session runs.
//!
//! ```text
//! m 15       quick entry, appended with the note "Input cepat"
//! m 12,5     same, comma decimal
//! m          detailed entry: asks for the value, then for a note
//! exit|stop  end the session
//! ```
use crate::frame::parse_decimal;

/// One parsed keyboard line.
#[derive(Debug, Clone, PartialEq)]
pub enum ManualCommand {
    /// `m <value>` with a numeric value.
    Quick(f64),
    /// `m <value>` where the value is not a number.
    InvalidQuick(String),
    /// Bare `m`.
    Detail,
    /// `exit` or `stop`.
    Stop,
    /// Blank line.
    Empty,
    /// Anything else, trimmed.
    Unknown(String),
}

impl ManualCommand {
    /// Classify a keyboard line. Never fails.
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return ManualCommand::Empty;
        }

        let mut tokens = line.split_whitespace();
        let first = tokens.next().unwrap_or_default().to_lowercase();

        match first.as_str() {
            "m" => match tokens.next() {
                None => ManualCommand::Detail,
                Some(token) => match parse_decimal(token) {
                    Some(value) => ManualCommand::Quick(value),
                    None => ManualCommand::InvalidQuick(token.to_string()),
                },
            },
            "exit" | "stop" if tokens.next().is_none() => ManualCommand::Stop,
            _ => ManualCommand::Unknown(line.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quick_entry() {
        assert_eq!(ManualCommand::parse("m 15"), ManualCommand::Quick(15.0));
        assert_eq!(ManualCommand::parse("  M 12,5 "), ManualCommand::Quick(12.5));
        assert_eq!(ManualCommand::parse("m 3.25 kN"), ManualCommand::Quick(3.25));
    }

    #[test]
    fn test_quick_entry_with_bad_value() {
        assert_eq!(
            ManualCommand::parse("m abc"),
            ManualCommand::InvalidQuick("abc".to_string())
        );
    }

    #[test]
    fn test_detail_and_stop() {
        assert_eq!(ManualCommand::parse("m"), ManualCommand::Detail);
        assert_eq!(ManualCommand::parse("exit"), ManualCommand::Stop);
        assert_eq!(ManualCommand::parse("STOP"), ManualCommand::Stop);
    }

    #[test]
    fn test_blank_and_unknown() {
        assert_eq!(ManualCommand::parse("   "), ManualCommand::Empty);
        assert_eq!(
            ManualCommand::parse("hello"),
            ManualCommand::Unknown("hello".to_string())
        );
        assert_eq!(
            ManualCommand::parse("exit now"),
            ManualCommand::Unknown("exit now".to_string())
        );
        assert_eq!(
            ManualCommand::parse("m15"),
            ManualCommand::Unknown("m15".to_string())
        );
    }
}
