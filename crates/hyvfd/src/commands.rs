//! G-code command words understood by the drive.
//!
//! The text interface accepts the spindle subset of G-code: `M3`/`M4` to run,
//! `M5` and the program-end words to stop, `S<rpm>` to set the speed, and `?`
//! to request the output frequency. Words are case-insensitive and may be
//! separated by whitespace or simply run together (`M3S400`).

use std::str::FromStr;

use hyvfd_core::{Error, Result};

/// A command word parsed into one of the actions the drive supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Stop the spindle (`M5`, `M0`, `M1`, `M30`, `M60`, `end`, `stop`).
    Stop,
    /// Run forward (`M3`).
    RunForward,
    /// Run reverse (`M4`).
    RunBackward,
    /// Set the target speed (`S<rpm>`).
    SetSpeed {
        /// Requested spindle speed in RPM.
        rpm: u16,
    },
    /// Request the current output frequency (`?`).
    QueryFrequency,
}

impl FromStr for Command {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let word = normalize(s);
        match word.as_str() {
            "stop" | "end" | "m0" | "m1" | "m30" | "m60" | "m5" | "m05" => Ok(Command::Stop),
            "m3" | "m03" => Ok(Command::RunForward),
            "m4" | "m04" => Ok(Command::RunBackward),
            "?" => Ok(Command::QueryFrequency),
            _ => parse_speed(&word)
                .map(|rpm| Command::SetSpeed { rpm })
                .ok_or_else(|| Error::InvalidCommand(s.trim().to_string())),
        }
    }
}

/// `s` followed by decimal digits only, in u16 range.
fn parse_speed(word: &str) -> Option<u16> {
    let digits = word.strip_prefix('s')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Trim and lowercase a command word.
pub fn normalize(word: &str) -> String {
    word.trim().to_ascii_lowercase()
}

/// Split command text into normalized words.
///
/// Whitespace separates words, and a new word also starts wherever a letter
/// (or `?`) directly follows a number, so `N12S20 F200M3` yields
/// `["n12", "s20", "f200", "m3"]`.
pub fn split_words(text: &str) -> Vec<String> {
    let mut words = Vec::new();
    for token in text.split_whitespace() {
        let mut current = String::new();
        let mut prev: Option<char> = None;
        for c in token.chars() {
            let starts_word = (c.is_ascii_alphabetic() || c == '?')
                && prev.is_some_and(|p| p.is_ascii_digit() || p == '.');
            if starts_word && !current.is_empty() {
                words.push(normalize(&current));
                current.clear();
            }
            current.push(c);
            prev = Some(c);
        }
        if !current.is_empty() {
            words.push(normalize(&current));
        }
    }
    words
}

/// Convert a spindle speed to the drive's frequency units.
///
/// Saturates at `u16::MAX`; the drive's own limits apply beyond that.
pub fn rpm_to_frequency(rpm: u16, hertz_per_rpm: f64) -> u16 {
    (f64::from(rpm) * hertz_per_rpm).round() as u16
}

/// Convert a raw output frequency back to RPM.
pub fn frequency_to_rpm(frequency: u16, hertz_per_rpm: f64) -> u16 {
    (f64::from(frequency) / hertz_per_rpm).round() as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_stop_aliases() {
        for word in ["stop", "end", "m0", "m1", "m30", "m60", "m5", "m05", "M5", " M30 "] {
            assert_eq!(word.parse::<Command>().unwrap(), Command::Stop, "{word}");
        }
    }

    #[test]
    fn parse_run_directions() {
        assert_eq!("m3".parse::<Command>().unwrap(), Command::RunForward);
        assert_eq!("M03".parse::<Command>().unwrap(), Command::RunForward);
        assert_eq!("m4".parse::<Command>().unwrap(), Command::RunBackward);
        assert_eq!("M04".parse::<Command>().unwrap(), Command::RunBackward);
    }

    #[test]
    fn parse_speed_words() {
        assert_eq!(
            "S400".parse::<Command>().unwrap(),
            Command::SetSpeed { rpm: 400 }
        );
        assert_eq!(
            "s0".parse::<Command>().unwrap(),
            Command::SetSpeed { rpm: 0 }
        );
        assert_eq!(
            "s65535".parse::<Command>().unwrap(),
            Command::SetSpeed { rpm: 65535 }
        );
    }

    #[test]
    fn parse_query() {
        assert_eq!("?".parse::<Command>().unwrap(), Command::QueryFrequency);
    }

    #[test]
    fn parse_rejects_unknown_words() {
        for word in ["", "g28", "m2", "s", "s-5", "s+5", "s12.5", "s65536", "m3s400", "??"] {
            let result = word.parse::<Command>();
            assert!(
                matches!(result, Err(Error::InvalidCommand(_))),
                "{word:?} parsed as {result:?}"
            );
        }
    }

    #[test]
    fn split_on_whitespace() {
        assert_eq!(split_words("M3 S400"), vec!["m3", "s400"]);
        assert_eq!(split_words("  m5\t?\n"), vec!["m5", "?"]);
        assert!(split_words("   ").is_empty());
    }

    #[test]
    fn split_run_together_words() {
        assert_eq!(split_words("M3S400"), vec!["m3", "s400"]);
        assert_eq!(
            split_words("N12S20 F200M3 G28.3Z-100 Y-29.3"),
            vec!["n12", "s20", "f200", "m3", "g28.3", "z-100", "y-29.3"]
        );
        assert_eq!(split_words("s400?"), vec!["s400", "?"]);
    }

    #[test]
    fn split_keeps_plain_words_whole() {
        assert_eq!(split_words("stop END"), vec!["stop", "end"]);
    }

    #[test]
    fn speed_conversion() {
        assert_eq!(rpm_to_frequency(1000, 3.47222), 3472);
        assert_eq!(rpm_to_frequency(400, 3.47222), 1389);
        assert_eq!(frequency_to_rpm(3472, 3.47222), 1000);
        assert_eq!(frequency_to_rpm(0, 3.47222), 0);
    }

    #[test]
    fn speed_conversion_saturates() {
        assert_eq!(rpm_to_frequency(60000, 3.47222), u16::MAX);
    }
}
