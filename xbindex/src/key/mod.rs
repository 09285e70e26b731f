//! Key codec and comparator.
//!
//! A tag's key expression produces a [`Value`]; [`Key::from_value`] turns it
//! into the fixed-length bytes stored in the tree and [`compare`] orders two
//! stored keys. The comparator is direction agnostic; descending tags flip
//! the result at the call site.
//!
//! | Key type  | Code | Stored as                           |
//! |-----------|------|-------------------------------------|
//! | Char      | `C`  | bytes, space padded to key length   |
//! | Numeric   | `N`  | 12-byte packed decimal (multi-tag)  |
//! | Float     | `F`  | 8-byte double (single-tag numeric)  |
//! | Date      | `D`  | 8-byte double Julian day number     |

mod bcd;
mod date;

use std::cmp::Ordering;

pub use bcd::{BCD_LEN, Bcd};
pub use date::Date;

use crate::record::Value;
use crate::storage::endian;
use crate::IndexError;

/// Storage class of a tag's keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Char,
    Numeric,
    Float,
    Date,
}

impl KeyType {
    /// Type byte written into index headers.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Char => b'C',
            Self::Numeric => b'N',
            Self::Float => b'F',
            Self::Date => b'D',
        }
    }

    pub fn from_code(code: u8) -> Result<Self, IndexError> {
        match code {
            b'C' => Ok(Self::Char),
            b'N' => Ok(Self::Numeric),
            b'F' => Ok(Self::Float),
            b'D' => Ok(Self::Date),
            other => Err(IndexError::InvalidKeyType(char::from(other))),
        }
    }

    /// Fixed key length for the non-character types.
    #[must_use]
    pub const fn fixed_len(self) -> Option<usize> {
        match self {
            Self::Char => None,
            Self::Numeric => Some(BCD_LEN),
            Self::Float | Self::Date => Some(8),
        }
    }
}

/// A decoded key.
#[derive(Debug, Clone, PartialEq)]
pub enum Key {
    Char(Vec<u8>),
    Numeric(Bcd),
    Float(f64),
    Date(f64),
}

impl Key {
    /// Convert an evaluated key expression into a key of the tag's type.
    pub fn from_value(value: &Value, key_type: KeyType) -> Result<Self, IndexError> {
        match (key_type, value) {
            (KeyType::Char, Value::Char(bytes)) => Ok(Self::Char(bytes.clone())),
            (KeyType::Numeric, Value::Numeric(n)) => Ok(Self::Numeric(Bcd::from_f64(*n))),
            (KeyType::Float, Value::Numeric(n)) => Ok(Self::Float(*n)),
            #[allow(clippy::cast_precision_loss)]
            (KeyType::Date, Value::Date(d)) => Ok(Self::Date(d.julian() as f64)),
            (key_type, value) => Err(IndexError::InvalidTag(format!(
                "expression produced {} for a '{}' key",
                value.type_name(),
                char::from(key_type.code())
            ))),
        }
    }

    /// Interpret stored key bytes.
    #[must_use]
    pub fn decode(key_type: KeyType, bytes: &[u8]) -> Self {
        match key_type {
            KeyType::Char => Self::Char(bytes.to_vec()),
            KeyType::Numeric => Self::Numeric(Bcd::from_slice(bytes)),
            KeyType::Float => Self::Float(endian::get_f64(bytes, 0)),
            KeyType::Date => Self::Date(endian::get_f64(bytes, 0)),
        }
    }

    /// Stored form, exactly `key_len` bytes.
    #[must_use]
    pub fn encode(&self, key_len: usize) -> Vec<u8> {
        let mut out = match self {
            Self::Char(bytes) => {
                let mut out = vec![b' '; key_len];
                let n = bytes.len().min(key_len);
                out[..n].copy_from_slice(&bytes[..n]);
                return out;
            }
            Self::Numeric(bcd) => bcd.as_bytes().to_vec(),
            Self::Float(v) | Self::Date(v) => v.to_le_bytes().to_vec(),
        };
        out.resize(key_len, 0);
        out
    }

    /// Typed value of the key, as returned by `current_key_value`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Char(bytes) => Value::Char(bytes.clone()),
            Self::Numeric(bcd) => Value::Numeric(bcd.to_f64()),
            Self::Float(v) => Value::Numeric(*v),
            Self::Date(v) => Value::Date(Date::from_julian(*v as i64)),
        }
    }
}

/// Order two stored keys of the same tag.
#[must_use]
pub fn compare(key_type: KeyType, left: &[u8], right: &[u8]) -> Ordering {
    match key_type {
        KeyType::Char => left.cmp(right),
        KeyType::Numeric => Bcd::from_slice(left).cmp(&Bcd::from_slice(right)),
        KeyType::Float | KeyType::Date => endian::get_f64(left, 0)
            .partial_cmp(&endian::get_f64(right, 0))
            .unwrap_or(Ordering::Equal),
    }
}

/// [`compare`] adjusted for the tag's direction.
#[must_use]
pub fn compare_directed(
    key_type: KeyType,
    descending: bool,
    left: &[u8],
    right: &[u8],
) -> Ordering {
    let ord = compare(key_type, left, right);
    if descending { ord.reverse() } else { ord }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_char_keys_are_space_padded() {
        let key = Key::from_value(&Value::Char(b"AB".to_vec()), KeyType::Char).expect("key");
        assert_eq!(key.encode(5), b"AB   ");
        let key = Key::Char(b"ABCDEFG".to_vec());
        assert_eq!(key.encode(3), b"ABC");
    }

    #[test]
    fn test_char_compare_is_bytewise() {
        assert_eq!(compare(KeyType::Char, b"101", b"102"), Ordering::Less);
        assert_eq!(compare(KeyType::Char, b"b  ", b"a  "), Ordering::Greater);
        assert_eq!(compare(KeyType::Char, b"abc", b"abc"), Ordering::Equal);
        assert_eq!(
            compare_directed(KeyType::Char, true, b"101", b"102"),
            Ordering::Greater
        );
    }

    #[test]
    fn test_numeric_and_float_keys() {
        let a = Key::from_value(&Value::Numeric(-3.5), KeyType::Numeric).expect("key");
        let b = Key::from_value(&Value::Numeric(2.0), KeyType::Numeric).expect("key");
        assert_eq!(
            compare(KeyType::Numeric, &a.encode(12), &b.encode(12)),
            Ordering::Less
        );

        let a = Key::Float(10.0).encode(8);
        let b = Key::Float(9.5).encode(8);
        assert_eq!(compare(KeyType::Float, &a, &b), Ordering::Greater);
        assert_eq!(Key::decode(KeyType::Float, &a), Key::Float(10.0));
    }

    #[test]
    fn test_date_key_round_trip() {
        let date = Date::new(2024, 2, 29).expect("valid date");
        let key = Key::from_value(&Value::Date(date), KeyType::Date).expect("key");
        let bytes = key.encode(8);
        assert_eq!(Key::decode(KeyType::Date, &bytes).to_value(), Value::Date(date));
    }

    #[test]
    fn test_value_type_mismatch_is_rejected() {
        let err = Key::from_value(&Value::Logical(true), KeyType::Char).unwrap_err();
        assert!(matches!(err, IndexError::InvalidTag(_)));
    }

    #[test]
    fn test_key_type_codes() {
        for t in [KeyType::Char, KeyType::Numeric, KeyType::Float, KeyType::Date] {
            assert_eq!(KeyType::from_code(t.code()).expect("code"), t);
        }
        assert!(matches!(
            KeyType::from_code(b'L'),
            Err(IndexError::InvalidKeyType('L'))
        ));
    }
}
