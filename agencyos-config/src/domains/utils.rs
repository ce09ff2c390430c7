//! Serde adapters shared by the config domains
//!
//! Durations are written as plain integers. Lockout, window and idle settings
//! use whole seconds; store deadlines use milliseconds.

use serde::{de, ser, Deserialize, Deserializer, Serializer};
use std::time::Duration;

fn write_units<S>(duration: &Duration, millis_per_unit: u64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let millis = u64::try_from(duration.as_millis())
        .map_err(|_| ser::Error::custom("duration does not fit in 64-bit milliseconds"))?;
    serializer.serialize_u64(millis / millis_per_unit)
}

fn read_units<'de, D>(deserializer: D, millis_per_unit: u64) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let units = u64::deserialize(deserializer)?;
    units
        .checked_mul(millis_per_unit)
        .map(Duration::from_millis)
        .ok_or_else(|| de::Error::custom(format!("duration of {} is too large", units)))
}

/// `Duration` as whole seconds
pub mod serde_duration {
    use super::*;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        write_units(duration, 1000, serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        read_units(deserializer, 1000)
    }
}

/// `Duration` as milliseconds
pub mod serde_duration_millis {
    use super::*;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        write_units(duration, 1, serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        read_units(deserializer, 1)
    }
}

pub fn default_true() -> bool {
    true
}
