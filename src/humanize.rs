//! Human-readable byte sizes for upload limits

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const KIB: u64 = 1024;
const MIB: u64 = KIB * 1024;
const GIB: u64 = MIB * 1024;

#[derive(Debug, Error, PartialEq)]
pub enum ByteSizeError {
    #[error("Empty size value")]
    Empty,

    #[error("Invalid size number in '{0}'")]
    InvalidNumber(String),

    #[error("Unknown size unit '{0}'")]
    UnknownUnit(String),

    #[error("Size '{0}' does not fit in 64 bits")]
    Overflow(String),
}

/// Byte count accepted as `"100MB"`, `"5KiB"`, `"1.5GB"` or a plain integer.
/// Units are binary (1KB = 1024 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ByteSize(pub u64);

impl ByteSize {
    pub const fn mb(n: u64) -> Self {
        Self(n * MIB)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn as_usize(&self) -> usize {
        usize::try_from(self.0).unwrap_or(usize::MAX)
    }
}

fn unit_multiplier(unit: &str) -> Option<u64> {
    match unit {
        "" | "B" => Some(1),
        "K" | "KB" | "KIB" => Some(KIB),
        "M" | "MB" | "MIB" => Some(MIB),
        "G" | "GB" | "GIB" => Some(GIB),
        _ => None,
    }
}

impl FromStr for ByteSize {
    type Err = ByteSizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        if raw.is_empty() {
            return Err(ByteSizeError::Empty);
        }

        let split = raw
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(raw.len());
        let (number, unit) = raw.split_at(split);
        let unit = unit.trim().to_ascii_uppercase();

        let multiplier =
            unit_multiplier(&unit).ok_or_else(|| ByteSizeError::UnknownUnit(unit.clone()))?;

        if let Ok(whole) = number.parse::<u64>() {
            return whole
                .checked_mul(multiplier)
                .map(ByteSize)
                .ok_or_else(|| ByteSizeError::Overflow(raw.to_string()));
        }

        let fractional: f64 = number
            .parse()
            .map_err(|_| ByteSizeError::InvalidNumber(raw.to_string()))?;
        let bytes = fractional * multiplier as f64;
        if !bytes.is_finite() || bytes >= u64::MAX as f64 {
            return Err(ByteSizeError::Overflow(raw.to_string()));
        }
        Ok(ByteSize(bytes.round() as u64))
    }
}

/// Largest unit that divides the size exactly, so the output parses back
/// to the same value
impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.0;
        for (unit, size) in [("GB", GIB), ("MB", MIB), ("KB", KIB)] {
            if bytes >= size && bytes % size == 0 {
                return write!(f, "{}{}", bytes / size, unit);
            }
        }
        write!(f, "{}B", bytes)
    }
}

impl Serialize for ByteSize {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ByteSize {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct Visitor;

        impl serde::de::Visitor<'_> for Visitor {
            type Value = ByteSize;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a byte count or a size string such as \"100MB\"")
            }

            fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<ByteSize, E> {
                Ok(ByteSize(v))
            }

            fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<ByteSize, E> {
                u64::try_from(v)
                    .map(ByteSize)
                    .map_err(|_| E::custom("byte size cannot be negative"))
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<ByteSize, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(Visitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_units() {
        assert_eq!("2048".parse::<ByteSize>().unwrap(), ByteSize(2048));
        assert_eq!("512B".parse::<ByteSize>().unwrap(), ByteSize(512));
        assert_eq!("5KiB".parse::<ByteSize>().unwrap(), ByteSize(5 * 1024));
        assert_eq!("100MB".parse::<ByteSize>().unwrap(), ByteSize::mb(100));
        assert_eq!(" 2 gb ".parse::<ByteSize>().unwrap(), ByteSize(2 * GIB));
        assert_eq!("1.5MB".parse::<ByteSize>().unwrap(), ByteSize(MIB + MIB / 2));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!("".parse::<ByteSize>(), Err(ByteSizeError::Empty));
        assert!(matches!(
            "10PB".parse::<ByteSize>(),
            Err(ByteSizeError::UnknownUnit(_))
        ));
        assert!(matches!(
            "1.2.3MB".parse::<ByteSize>(),
            Err(ByteSizeError::InvalidNumber(_))
        ));
        assert!(matches!(
            "99999999999999GB".parse::<ByteSize>(),
            Err(ByteSizeError::Overflow(_))
        ));
    }

    #[test]
    fn test_display() {
        assert_eq!(ByteSize::mb(100).to_string(), "100MB");
        assert_eq!(ByteSize(3 * KIB).to_string(), "3KB");
        assert_eq!(ByteSize(MIB + MIB / 2).to_string(), "1536KB");
        assert_eq!(ByteSize(1000).to_string(), "1000B");
        assert_eq!(ByteSize(0).to_string(), "0B");
    }

    #[test]
    fn test_display_parses_back_unchanged() {
        for size in [0, 1, 1000, 3 * KIB, MIB + 1, MIB + MIB / 2, 5 * GIB, 1_000_001] {
            let shown = ByteSize(size).to_string();
            assert_eq!(shown.parse::<ByteSize>().unwrap(), ByteSize(size), "{shown}");
        }
    }

    #[test]
    fn test_deserialize_string_or_number() {
        #[derive(Deserialize)]
        struct Limits {
            a: ByteSize,
            b: ByteSize,
        }
        let parsed: Limits = serde_json::from_str(r#"{"a": "10MB", "b": 4096}"#).unwrap();
        assert_eq!(parsed.a, ByteSize::mb(10));
        assert_eq!(parsed.b, ByteSize(4096));
    }
}
