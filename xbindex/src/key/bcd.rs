//! Packed decimal numeric keys.
//!
//! Multi-tag files store numeric keys in 12 bytes:
//!
//! | Byte | Content                                                   |
//! |------|-----------------------------------------------------------|
//! | 0    | digits before the decimal point + 52                      |
//! | 1    | `encoded digit count << 2 | 0x01`, `| 0x80` when negative |
//! | 2-11 | up to 20 decimal digits, two per byte, high nibble first  |
//!
//! Leading zeros of a pure fraction are not stored; they lower the
//! significant-digit count instead.

use std::cmp::Ordering;

pub const BCD_LEN: usize = 12;

const SIG_BIAS: i32 = 52;
const MAX_DIGITS: usize = 20;

/// A 12-byte packed decimal value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Bcd([u8; BCD_LEN]);

impl Bcd {
    /// Wrap raw key bytes. Short slices are zero padded.
    #[must_use]
    pub fn from_slice(bytes: &[u8]) -> Self {
        let mut raw = [0u8; BCD_LEN];
        let n = bytes.len().min(BCD_LEN);
        raw[..n].copy_from_slice(&bytes[..n]);
        Self(raw)
    }

    /// Encode a number the way dBASE does: format with six decimals, strip
    /// insignificant zeros, pack what is left.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_f64(value: f64) -> Self {
        let value = if value == 0.0 || !value.is_finite() { 0.0 } else { value };
        let text = format!("{value:.6}");
        let (negative, text) = text
            .strip_prefix('-')
            .map_or((false, text.as_str()), |rest| (true, rest));

        let mut digits = text.trim_start_matches('0');
        if digits.contains('.') {
            digits = digits.trim_end_matches('0');
        }
        let encoded = if digits.contains('.') {
            digits.len() - 1
        } else {
            digits.len()
        }
        .min(31);

        let mut sig: i32 = 0;
        let mut rest = digits;
        if let Some(fraction) = digits.strip_prefix('.') {
            let significant = fraction.trim_start_matches('0');
            sig -= (fraction.len() - significant.len()) as i32;
            rest = significant;
        }

        let mut raw = [0u8; BCD_LEN];
        let mut before_point = !digits.starts_with('.');
        let mut stored = 0usize;
        for c in rest.bytes() {
            if c == b'.' {
                before_point = false;
                continue;
            }
            if before_point {
                sig += 1;
            }
            if stored < MAX_DIGITS {
                let nibble = c - b'0';
                let byte = &mut raw[2 + stored / 2];
                if stored % 2 == 0 {
                    *byte = nibble << 4;
                } else {
                    *byte |= nibble;
                }
                stored += 1;
            }
        }

        raw[0] = (sig + SIG_BIAS) as u8;
        raw[1] = ((encoded as u8) << 2) | 0x01;
        if negative {
            raw[1] |= 0x80;
        }
        Self(raw)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; BCD_LEN] {
        &self.0
    }

    #[must_use]
    pub const fn is_negative(&self) -> bool {
        self.0[1] & 0x80 != 0
    }

    /// Number of encoded digits, sign bit excluded.
    #[must_use]
    pub const fn encoded_digits(&self) -> u8 {
        (self.0[1] << 1) >> 3
    }

    fn significant_digits(&self) -> i32 {
        i32::from(self.0[0]) - SIG_BIAS
    }

    fn is_zero(&self) -> bool {
        self.0[2..].iter().all(|b| *b == 0)
    }

    fn digit(&self, index: usize) -> u8 {
        let byte = self.0[2 + index / 2];
        if index % 2 == 0 { byte >> 4 } else { byte & 0x0F }
    }

    /// Decimal text of the value.
    #[must_use]
    pub fn to_decimal_string(&self) -> String {
        let mut out = String::new();
        if self.is_negative() {
            out.push('-');
        }
        let mut sig = self.significant_digits();
        let mut remaining = usize::from(self.encoded_digits()).min(MAX_DIGITS);
        let mut has_point = false;
        if sig <= 0 {
            if remaining > 0 {
                out.push_str("0.");
                has_point = true;
            }
            for _ in sig..0 {
                out.push('0');
            }
        }
        let mut index = 0;
        while remaining > 0 {
            if sig == 0 && !has_point {
                out.push('.');
                has_point = true;
            }
            out.push(char::from(b'0' + self.digit(index)));
            index += 1;
            sig -= 1;
            remaining -= 1;
        }
        while sig > 0 {
            out.push('0');
            sig -= 1;
        }
        if out.is_empty() || out == "-" {
            out = "0".to_string();
        }
        out
    }

    #[must_use]
    pub fn to_f64(&self) -> f64 {
        self.to_decimal_string().parse().unwrap_or_default()
    }
}

impl Ord for Bcd {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.is_zero(), other.is_zero()) {
            (true, true) => return Ordering::Equal,
            (true, false) => {
                return if other.is_negative() {
                    Ordering::Greater
                } else {
                    Ordering::Less
                };
            }
            (false, true) => {
                return if self.is_negative() {
                    Ordering::Less
                } else {
                    Ordering::Greater
                };
            }
            (false, false) => {}
        }

        let negative = self.is_negative();
        if negative != other.is_negative() {
            return if negative {
                Ordering::Less
            } else {
                Ordering::Greater
            };
        }

        let magnitude = self.0[0]
            .cmp(&other.0[0])
            .then_with(|| self.0[2..].cmp(&other.0[2..]));
        if negative {
            magnitude.reverse()
        } else {
            magnitude
        }
    }
}

impl PartialOrd for Bcd {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
