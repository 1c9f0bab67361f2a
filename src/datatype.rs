// used for persistence
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

// used for timestamps in the database
use chrono::{DateTime, NaiveDateTime, Utc};

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

// used when parsing identifiers out of text
use std::str::FromStr;
// used to print out readable forms of an identifier
use std::fmt;

use crate::error::{LineageError, Result};

/// Opaque state payload.
pub type Payload = serde_json::Value;

/// Timestamp format used by submissions, e.g. `2019-11-05-14:03:27.123456`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H:%M:%S%.f";

/// Number of hex characters in a rendered content address.
pub const CONTENT_ID_LEN: usize = 32;

pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| LineageError::Validation(format!("bad timestamp '{text}': {e}")))
}

fn parse_content_id(text: &str, what: &str) -> Result<u128> {
    if text.len() != CONTENT_ID_LEN || !text.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(LineageError::Validation(format!(
            "{what} id must be {CONTENT_ID_LEN} hex characters, got '{text}'"
        )));
    }
    u128::from_str_radix(text, 16)
        .map_err(|e| LineageError::Validation(format!("{what} id '{text}': {e}")))
}

// Both kinds of content address share one representation: 128 bits, shown as
// 32 lowercase hex characters. The all-zero value is reserved as NULL.
macro_rules! content_id {
    ($(#[$meta:meta])* $name:ident, $what:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(u128);

        impl $name {
            pub const NULL: $name = $name(0);

            pub const fn from_u128(value: u128) -> Self {
                Self(value)
            }
            pub fn as_u128(&self) -> u128 {
                self.0
            }
            pub fn is_null(&self) -> bool {
                self.0 == 0
            }
            /// Content address of `bytes`: the leading 16 bytes of their BLAKE3 hash.
            pub fn digest(bytes: &[u8]) -> Self {
                let hash = blake3::hash(bytes);
                let mut head = [0u8; 16];
                head.copy_from_slice(&hash.as_bytes()[..16]);
                Self(u128::from_be_bytes(head))
            }
        }
        impl FromStr for $name {
            type Err = LineageError;
            fn from_str(s: &str) -> Result<Self> {
                parse_content_id(s, $what).map(Self)
            }
        }
        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "{:032x}", self.0)
            }
        }
        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "{}({:032x})", stringify!($name), self.0)
            }
        }
        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.to_string()))
            }
        }
        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let text = value.as_str()?;
                text.parse().map_err(|e: LineageError| FromSqlError::Other(Box::new(e)))
            }
        }
        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }
        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
                let text = String::deserialize(deserializer)?;
                text.parse().map_err(de::Error::custom)
            }
        }
    };
}

content_id!(
    /// Content address of a dataset.
    DatasetId,
    "dataset"
);
content_id!(
    /// Content address of a dataset state.
    StateId,
    "state"
);

/// Store-assigned identity of a state type.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct StateTypeId(pub i64);

impl fmt::Display for StateTypeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl ToSql for StateTypeId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0))
    }
}
impl FromSql for StateTypeId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value.as_i64().map(StateTypeId)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_ids_parse_and_render_as_hex() {
        let id: DatasetId = "000000000000000000000000000000FF".parse().unwrap();
        assert_eq!(id.as_u128(), 255);
        assert_eq!(id.to_string(), "000000000000000000000000000000ff");
    }

    #[test]
    fn malformed_ids_are_validation_errors() {
        for bad in ["", "1337", "zz000000000000000000000000000000", "0000000000000000000000000000000000"] {
            let err = bad.parse::<StateId>().unwrap_err();
            assert!(matches!(err, LineageError::Validation(_)), "{bad}");
        }
    }

    #[test]
    fn null_id_is_all_zeroes() {
        let id: DatasetId = "00000000000000000000000000000000".parse().unwrap();
        assert!(id.is_null());
        assert_eq!(id, DatasetId::NULL);
        assert!(!DatasetId::digest(b"root").is_null());
    }

    #[test]
    fn submission_timestamps_parse() {
        let t = parse_timestamp("2019-11-05-14:03:27.123456").unwrap();
        assert_eq!(t.to_rfc3339(), "2019-11-05T14:03:27.123456+00:00");
        assert!(parse_timestamp("2019-11-05T14:03:27").is_err());
    }
}
