//! Single-tag file header (block 0).
//!
//! ```text
//! 0   root block        u32
//! 4   total blocks      u32
//! 9   key type          'C' | 'F' | 'D'
//! 11  0x1B
//! 12  key length        i16
//! 14  keys per block    i16
//! 16  numeric flag      i16   0 char, 1 numeric or date
//! 18  key item length   i16
//! 20  serial number     u8
//! 23  unique            u8
//! 24  key expression    NUL terminated
//! ```

#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]

use crate::IndexError;
use crate::key::KeyType;
use crate::storage::endian;

/// Size of every block, the header included.
pub const BLOCK_SIZE: usize = 512;
/// Longest key the format stores.
pub const MAX_KEY_LEN: usize = 100;
/// Longest key expression that fits behind the fixed header fields.
pub const MAX_EXPRESSION_LEN: usize = BLOCK_SIZE - 24 - 1;

/// Decoded header block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NdxHeader {
    pub root: u32,
    pub total_blocks: u32,
    pub key_type: KeyType,
    pub key_len: usize,
    pub keys_per_block: usize,
    pub item_len: usize,
    pub serial: u8,
    pub unique: bool,
    pub key_expression: String,
}

/// Entry length for a key length: child, record, key, 4-byte aligned.
#[must_use]
pub const fn item_len(key_len: usize) -> usize {
    (key_len + 8).div_ceil(4) * 4
}

impl NdxHeader {
    /// Header of a new, empty file.
    #[must_use]
    pub fn new(key_type: KeyType, key_len: usize, unique: bool, key_expression: &str) -> Self {
        let item_len = item_len(key_len);
        Self {
            root: 1,
            total_blocks: 2,
            key_type,
            key_len,
            keys_per_block: (BLOCK_SIZE - 8) / item_len,
            item_len,
            serial: 0,
            unique,
            key_expression: key_expression.to_string(),
        }
    }

    pub fn decode(buf: &[u8]) -> Result<Self, IndexError> {
        if buf.len() < BLOCK_SIZE {
            return Err(IndexError::InvalidIndex(
                "single-tag header is shorter than one block".to_string(),
            ));
        }
        let key_type = KeyType::from_code(buf[9])?;
        if key_type == KeyType::Numeric {
            return Err(IndexError::InvalidKeyType('N'));
        }
        let key_len = endian::get_i16(buf, 12).max(0) as usize;
        let keys_per_block = endian::get_i16(buf, 14).max(0) as usize;
        let item_len = endian::get_i16(buf, 18).max(0) as usize;

        if key_len == 0 || key_len > MAX_KEY_LEN {
            return Err(IndexError::InvalidIndex(format!("key length {key_len} out of range")));
        }
        if item_len < key_len + 8
            || keys_per_block == 0
            || 8 + keys_per_block * item_len > BLOCK_SIZE
        {
            return Err(IndexError::InvalidIndex(format!(
                "{keys_per_block} keys of {item_len} bytes do not fit a block"
            )));
        }

        let expr = &buf[24..BLOCK_SIZE];
        let end = expr.iter().position(|&b| b == 0).unwrap_or(expr.len());
        Ok(Self {
            root: endian::get_u32(buf, 0),
            total_blocks: endian::get_u32(buf, 4),
            key_type,
            key_len,
            keys_per_block,
            item_len,
            serial: buf[20],
            unique: buf[23] != 0,
            key_expression: String::from_utf8_lossy(&expr[..end]).trim().to_string(),
        })
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; BLOCK_SIZE];
        endian::put_u32(&mut buf, 0, self.root);
        endian::put_u32(&mut buf, 4, self.total_blocks);
        buf[9] = self.key_type.code();
        buf[11] = 0x1B;
        endian::put_i16(&mut buf, 12, self.key_len as i16);
        endian::put_i16(&mut buf, 14, self.keys_per_block as i16);
        endian::put_i16(&mut buf, 16, i16::from(self.key_type != KeyType::Char));
        endian::put_i16(&mut buf, 18, self.item_len as i16);
        buf[20] = self.serial;
        buf[23] = u8::from(self.unique);
        let expr = self.key_expression.as_bytes();
        let n = expr.len().min(MAX_EXPRESSION_LEN);
        buf[24..24 + n].copy_from_slice(&expr[..n]);
        buf
    }
}
