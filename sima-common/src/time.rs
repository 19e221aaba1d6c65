//! Fixed-precision annotation boundaries
//!
//! Boundaries are decimal seconds with three decimal places and at most six
//! digits (0.000 to 999.999). They are held as integer milliseconds so that
//! boundary equality, which drives cross-tier propagation, is exact.
//!
//! # Conversion Flow
//!
//! ```text
//! JSON request (number or string, seconds)
//!     ↓
//! Seconds::from_json() → i64 milliseconds (database columns start_ms/end_ms)
//!     ↓
//! Serialize → JSON number (seconds)
//! ```

use crate::{Error, Result};
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// Largest representable boundary in milliseconds (999.999 s)
pub const MAX_MILLIS: i64 = 999_999;

/// An annotation boundary in seconds, stored as whole milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Seconds(i64);

impl Seconds {
    pub const ZERO: Seconds = Seconds(0);

    /// Build from a millisecond count already validated by the database
    pub fn from_millis(millis: i64) -> Self {
        Seconds(millis)
    }

    /// Milliseconds as stored in the database
    pub fn millis(self) -> i64 {
        self.0
    }

    /// Round a floating point second value to the millisecond grid
    pub fn from_secs_f64(secs: f64) -> Result<Self> {
        if !secs.is_finite() {
            return Err(Error::Validation(format!("boundary is not a finite number: {}", secs)));
        }
        if secs < 0.0 {
            return Err(Error::Validation(format!("boundary is negative: {}", secs)));
        }
        let millis = (secs * 1000.0).round() as i64;
        if millis > MAX_MILLIS {
            return Err(Error::Validation(format!(
                "boundary {} exceeds maximum of 999.999 seconds",
                secs
            )));
        }
        Ok(Seconds(millis))
    }

    /// Parse a decimal string such as `"12.345"`
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        let secs: f64 = trimmed
            .parse()
            .map_err(|_| Error::Validation(format!("boundary is not numeric: {:?}", text)))?;
        Self::from_secs_f64(secs)
    }

    /// Accept the loosely typed boundaries sent by the annotation front-end
    pub fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::Number(n) => n
                .as_f64()
                .ok_or_else(|| Error::Validation(format!("boundary is not numeric: {}", n)))
                .and_then(Self::from_secs_f64),
            Value::String(s) => Self::parse(s),
            other => Err(Error::Validation(format!("boundary is not numeric: {}", other))),
        }
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1000.0
    }
}

impl fmt::Display for Seconds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:03}", self.0 / 1000, self.0 % 1000)
    }
}

impl Serialize for Seconds {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_secs_f64())
    }
}
