//! Human-readable byte sizes for config values and format listings

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const UNITS: &[(&str, u64)] = &[
    ("TB", 1 << 40),
    ("GB", 1 << 30),
    ("MB", 1 << 20),
    ("KB", 1 << 10),
];

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid size format: {0}")]
    InvalidFormat(String),

    #[error("Invalid number: {0}")]
    InvalidNumber(String),

    #[error("Invalid unit: {0}")]
    InvalidUnit(String),
}

/// Byte count that parses from `"5MB"`, `"1.5GiB"` or a bare integer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ByteSize(pub u64);

impl ByteSize {
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn as_usize(&self) -> usize {
        usize::try_from(self.0).unwrap_or(usize::MAX)
    }

    /// Largest fitting binary unit, with one decimal when it is not whole
    /// (`1536` -> `1.5KB`, `5242880` -> `5MB`)
    pub fn to_human_readable(&self) -> String {
        for &(unit, divisor) in UNITS {
            if self.0 >= divisor {
                let whole = self.0 / divisor;
                let tenths = (self.0 % divisor) * 10 / divisor;
                return if tenths == 0 {
                    format!("{whole}{unit}")
                } else {
                    format!("{whole}.{tenths}{unit}")
                };
            }
        }
        format!("{}B", self.0)
    }
}

impl<'de> Deserialize<'de> for ByteSize {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct ByteSizeVisitor;

        impl serde::de::Visitor<'_> for ByteSizeVisitor {
            type Value = ByteSize;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a byte size as string (e.g., \"5MB\", \"1.5GB\") or integer")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(ByteSize(v))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                u64::try_from(v)
                    .map(ByteSize)
                    .map_err(|_| E::custom(format!("byte size cannot be negative: {v}")))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                v.parse::<ByteSize>().map_err(serde::de::Error::custom)
            }
        }

        deserializer.deserialize_any(ByteSizeVisitor)
    }
}

impl FromStr for ByteSize {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_uppercase();
        if let Ok(num) = s.parse::<u64>() {
            return Ok(ByteSize(num));
        }

        let split = s
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| ParseError::InvalidFormat(s.clone()))?;
        let (num_str, unit) = s.split_at(split);

        let num: f64 = num_str
            .parse()
            .map_err(|_| ParseError::InvalidNumber(num_str.to_string()))?;

        let multiplier: u64 = match unit.trim() {
            "B" => 1,
            "K" | "KB" | "KIB" => 1 << 10,
            "M" | "MB" | "MIB" => 1 << 20,
            "G" | "GB" | "GIB" => 1 << 30,
            "T" | "TB" | "TIB" => 1 << 40,
            _ => return Err(ParseError::InvalidUnit(unit.to_string())),
        };

        Ok(ByteSize((num * multiplier as f64).round() as u64))
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_human_readable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_whole_units() {
        assert_eq!("1024".parse::<ByteSize>().unwrap().as_u64(), 1024);
        assert_eq!("1K".parse::<ByteSize>().unwrap().as_u64(), 1024);
        assert_eq!("5MiB".parse::<ByteSize>().unwrap().as_u64(), 5 * 1024 * 1024);
        assert_eq!("1 GB".parse::<ByteSize>().unwrap().as_u64(), 1 << 30);
    }

    #[test]
    fn test_parse_fractional() {
        assert_eq!("1.5KB".parse::<ByteSize>().unwrap().as_u64(), 1536);
        assert_eq!("0.5M".parse::<ByteSize>().unwrap().as_u64(), 512 * 1024);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!("MB".parse::<ByteSize>(), Err(ParseError::InvalidNumber(_))));
        assert!(matches!("5XB".parse::<ByteSize>(), Err(ParseError::InvalidUnit(_))));
        assert!(matches!("1.2.3".parse::<ByteSize>(), Err(ParseError::InvalidFormat(_))));
    }

    #[test]
    fn test_to_human_readable() {
        assert_eq!(ByteSize(512).to_human_readable(), "512B");
        assert_eq!(ByteSize(1536).to_human_readable(), "1.5KB");
        assert_eq!(ByteSize(5 * 1024 * 1024).to_human_readable(), "5MB");
        assert_eq!(ByteSize(23_456_789).to_human_readable(), "22.3MB");
    }

    #[test]
    fn test_deserialize_string_and_number() {
        #[derive(Deserialize)]
        struct Limits {
            a: ByteSize,
            b: ByteSize,
        }
        let parsed: Limits = serde_json::from_str(r#"{"a": "10MB", "b": 1024}"#).unwrap();
        assert_eq!(parsed.a.as_u64(), 10 * 1024 * 1024);
        assert_eq!(parsed.b.as_u64(), 1024);
    }
}
