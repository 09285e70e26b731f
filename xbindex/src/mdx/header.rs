//! Multi-tag file header and per-tag header blocks.
//!
//! File header, first 2048 bytes:
//!
//! ```text
//! 0   version (2)            20  block factor   i16     32  page count       u32
//! 1   created YY MM DD       22  block size     i16     36  first free page  u32
//! 4   file name (16)         24  production     u8      40  blocks available u32
//!                            25  entry count    u8      44  updated YY MM DD
//!                            26  entry length   i16     529 0x01
//!                            28  tags in use    i16
//!                            30  next tag       u8
//!                            31  0x1B
//! ```
//!
//! Tag header, at the tag's header page:
//!
//! ```text
//! 0   root page   u32        18  item length   i16      246 has keys
//! 4   tag size    u32        20  serial        u8       248 left sibling  u32
//! 8   key format  u8         23  unique        u8       252 right sibling u32
//! 9   key type    u8         24  key expression         257 created YY MM DD
//! 11  0x1B                   245 has filter             480 single field flag
//! 12  key length  i16                                   762 filter expression
//! 14  keys/block  i16
//! 16  secondary key type i16
//! ```

#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]

use crate::IndexError;
use crate::key::{Date, KeyType};
use crate::storage::endian;

/// Unit of every page number stored in the file.
pub const PAGE_SIZE: usize = 512;
/// Bytes reserved for the file header and tag table.
pub const FILE_HEADER_LEN: usize = 2048;
/// Page count of a file without tags.
pub const FIRST_TAG_PAGE: u32 = (FILE_HEADER_LEN / PAGE_SIZE) as u32;
/// Bytes a tag header needs, filter expression included.
pub const TAG_HEADER_LEN: usize = 1024;
/// Longest key expression accepted on create.
pub const MAX_KEY_EXPRESSION_LEN: usize = 100;
/// Longest filter expression the tag header holds.
pub const MAX_FILTER_LEN: usize = 220;
/// Longest key the format stores.
pub const MAX_KEY_LEN: usize = 100;

const VERSION: u8 = 2;
const KEY_FORMAT: u8 = 0x10;
const KEY_FORMAT_DESCENDING: u8 = 0x08;
const KEY_FORMAT_UNIQUE: u8 = 0x40;
const FILTER_OFFSET: usize = 762;

/// Calendar bytes as headers store them: years since 1900, month, day.
#[must_use]
pub fn date_bytes(date: Date) -> [u8; 3] {
    [
        (date.year() - 1900).clamp(0, 255) as u8,
        date.month(),
        date.day(),
    ]
}

/// Entry length for a key length: pointer and key, 4-byte aligned.
#[must_use]
pub const fn item_len(key_len: usize) -> usize {
    (key_len + 4).div_ceil(4) * 4
}

/// Keys that fit in one node of `block_size` bytes.
#[must_use]
pub const fn keys_per_block(block_size: usize, item_len: usize) -> usize {
    (block_size - 12) / item_len
}

/// The file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MdxHeader {
    pub created: [u8; 3],
    pub file_name: String,
    pub block_factor: u16,
    pub tags_in_use: u16,
    pub next_tag: u8,
    pub page_count: u32,
    pub first_free: u32,
    pub blocks_available: u32,
    pub updated: [u8; 3],
}

impl MdxHeader {
    #[must_use]
    pub fn new(file_name: &str, block_size: usize, today: Date) -> Self {
        let mut name = file_name.to_ascii_uppercase();
        name.truncate(10);
        Self {
            created: date_bytes(today),
            file_name: name,
            block_factor: (block_size / PAGE_SIZE) as u16,
            tags_in_use: 0,
            next_tag: 1,
            page_count: FIRST_TAG_PAGE,
            first_free: 0,
            blocks_available: 0,
            updated: date_bytes(today),
        }
    }

    #[must_use]
    pub fn block_size(&self) -> usize {
        usize::from(self.block_factor) * PAGE_SIZE
    }

    pub fn decode(buf: &[u8]) -> Result<Self, IndexError> {
        if buf.len() < 48 {
            return Err(IndexError::InvalidIndex(
                "multi-tag header is too short".to_string(),
            ));
        }
        let block_factor = endian::get_i16(buf, 20).max(0) as u16;
        let block_size = endian::get_i16(buf, 22).max(0) as usize;
        if !(1..=32).contains(&block_factor) || block_size != usize::from(block_factor) * PAGE_SIZE
        {
            return Err(IndexError::InvalidIndex(format!(
                "block factor {block_factor} does not match block size {block_size}"
            )));
        }
        let tags_in_use = endian::get_i16(buf, 28).max(0) as u16;
        if usize::from(tags_in_use) > super::table::MAX_TAGS {
            return Err(IndexError::InvalidIndex(format!(
                "{tags_in_use} tags in use"
            )));
        }
        let name = &buf[4..20];
        let end = name.iter().position(|&b| b == 0).unwrap_or(name.len());
        Ok(Self {
            created: [buf[1], buf[2], buf[3]],
            file_name: String::from_utf8_lossy(&name[..end]).trim().to_string(),
            block_factor,
            tags_in_use,
            next_tag: buf[30],
            page_count: endian::get_u32(buf, 32),
            first_free: endian::get_u32(buf, 36),
            blocks_available: endian::get_u32(buf, 40),
            updated: [buf[44], buf[45], buf[46]],
        })
    }

    /// The full 2048-byte header with an empty tag table.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; FILE_HEADER_LEN];
        buf[0] = VERSION;
        buf[1..4].copy_from_slice(&self.created);
        let name = self.file_name.as_bytes();
        let n = name.len().min(10);
        buf[4..4 + n].copy_from_slice(&name[..n]);
        endian::put_i16(&mut buf, 20, self.block_factor as i16);
        endian::put_i16(&mut buf, 22, self.block_size() as i16);
        buf[24] = 1;
        buf[25] = 48;
        endian::put_i16(&mut buf, 26, 32);
        self.encode_counters(&mut buf);
        buf[529] = 0x01;
        buf
    }

    /// Bytes 28..47: tag counts, page counters and the update date.
    pub fn encode_counters(&self, buf: &mut [u8]) {
        endian::put_i16(buf, 28, self.tags_in_use as i16);
        buf[30] = self.next_tag;
        buf[31] = 0x1B;
        endian::put_u32(buf, 32, self.page_count);
        endian::put_u32(buf, 36, self.first_free);
        endian::put_u32(buf, 40, self.blocks_available);
        buf[44..47].copy_from_slice(&self.updated);
    }

    /// Reload the fields bytes 28..47 carry.
    pub fn decode_counters(&mut self, buf: &[u8]) {
        self.tags_in_use = endian::get_i16(buf, 28).max(0) as u16;
        self.next_tag = buf[30];
        self.page_count = endian::get_u32(buf, 32);
        self.first_free = endian::get_u32(buf, 36);
        self.blocks_available = endian::get_u32(buf, 40);
        self.updated = [buf[44], buf[45], buf[46]];
    }
}

/// A tag header block.
#[derive(Debug, Clone, PartialEq)]
pub struct TagHeader {
    pub root: u32,
    pub tag_size: u32,
    pub key_type: KeyType,
    pub key_len: usize,
    pub keys_per_block: usize,
    pub item_len: usize,
    pub serial: u8,
    pub unique: bool,
    pub descending: bool,
    pub key_expression: String,
    pub filter: Option<String>,
    pub has_keys: bool,
    pub left_sibling: u32,
    pub right_sibling: u32,
    pub created: [u8; 3],
    pub single_field: bool,
}

impl TagHeader {
    pub fn decode(buf: &[u8]) -> Result<Self, IndexError> {
        if buf.len() < TAG_HEADER_LEN {
            return Err(IndexError::InvalidIndex(
                "tag header is shorter than 1024 bytes".to_string(),
            ));
        }
        let key_type = KeyType::from_code(buf[9])?;
        if key_type == KeyType::Float {
            return Err(IndexError::InvalidKeyType('F'));
        }
        let key_len = endian::get_i16(buf, 12).max(0) as usize;
        let item_len = endian::get_i16(buf, 18).max(0) as usize;
        let keys_per_block = endian::get_i16(buf, 14).max(0) as usize;
        if key_len == 0 || key_len > MAX_KEY_LEN || item_len < key_len + 4 || keys_per_block == 0 {
            return Err(IndexError::InvalidIndex(format!(
                "tag geometry: key {key_len}, item {item_len}, {keys_per_block} per block"
            )));
        }
        let filter = (buf[245] != 0)
            .then(|| c_string(&buf[FILTER_OFFSET..FILTER_OFFSET + MAX_FILTER_LEN]))
            .filter(|f| !f.is_empty());
        Ok(Self {
            root: endian::get_u32(buf, 0),
            tag_size: endian::get_u32(buf, 4),
            key_type,
            key_len,
            keys_per_block,
            item_len,
            serial: buf[20],
            unique: buf[23] != 0 || buf[8] & KEY_FORMAT_UNIQUE != 0,
            descending: buf[8] & KEY_FORMAT_DESCENDING != 0,
            key_expression: c_string(&buf[24..245]),
            filter,
            has_keys: buf[246] != 0,
            left_sibling: endian::get_u32(buf, 248),
            right_sibling: endian::get_u32(buf, 252),
            created: [buf[257], buf[258], buf[259]],
            single_field: buf[480] == 0x01,
        })
    }

    /// Encode into a zeroed buffer of `len` bytes, at least one tag header.
    #[must_use]
    pub fn encode(&self, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len.max(TAG_HEADER_LEN)];
        endian::put_u32(&mut buf, 0, self.root);
        endian::put_u32(&mut buf, 4, self.tag_size);
        let mut format = KEY_FORMAT;
        if self.descending {
            format |= KEY_FORMAT_DESCENDING;
        }
        if self.unique {
            format |= KEY_FORMAT_UNIQUE;
        }
        buf[8] = format;
        buf[9] = self.key_type.code();
        buf[11] = 0x1B;
        endian::put_i16(&mut buf, 12, self.key_len as i16);
        endian::put_i16(&mut buf, 14, self.keys_per_block as i16);
        endian::put_i16(&mut buf, 16, i16::from(self.key_type == KeyType::Date));
        endian::put_i16(&mut buf, 18, self.item_len as i16);
        buf[20] = self.serial;
        buf[23] = u8::from(self.unique);
        put_c_string(&mut buf[24..245], &self.key_expression);
        if let Some(filter) = &self.filter {
            buf[245] = 1;
            put_c_string(&mut buf[FILTER_OFFSET..FILTER_OFFSET + MAX_FILTER_LEN], filter);
        }
        buf[246] = u8::from(self.has_keys);
        endian::put_u32(&mut buf, 248, self.left_sibling);
        endian::put_u32(&mut buf, 252, self.right_sibling);
        buf[257..260].copy_from_slice(&self.created);
        buf[480] = u8::from(self.single_field);
        buf
    }
}

fn c_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).trim().to_string()
}

/// Copy `text` in, leaving at least one trailing NUL.
fn put_c_string(field: &mut [u8], text: &str) {
    let bytes = text.as_bytes();
    let n = bytes.len().min(field.len() - 1);
    field[..n].copy_from_slice(&bytes[..n]);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> Date {
        Date::new(2024, 3, 9).expect("valid date")
    }

    #[test]
    fn test_new_file_header() {
        let header = MdxHeader::new("customers", 1024, today());
        let buf = header.encode();
        assert_eq!(buf.len(), FILE_HEADER_LEN);
        assert_eq!(buf[0], 2);
        assert_eq!(&buf[1..4], &[124, 3, 9]);
        assert_eq!(&buf[4..13], b"CUSTOMERS");
        assert_eq!(endian::get_i16(&buf, 20), 2);
        assert_eq!(endian::get_i16(&buf, 22), 1024);
        assert_eq!((buf[24], buf[25]), (1, 48));
        assert_eq!(endian::get_i16(&buf, 26), 32);
        assert_eq!(buf[30], 1);
        assert_eq!(buf[31], 0x1B);
        assert_eq!(endian::get_u32(&buf, 32), 4);
        assert_eq!(buf[529], 0x01);
        assert_eq!(MdxHeader::decode(&buf).expect("decode"), header);
    }

    #[test]
    fn test_decode_rejects_mismatched_block_size() {
        let mut buf = MdxHeader::new("X", 1024, today()).encode();
        endian::put_i16(&mut buf, 22, 1000);
        assert!(matches!(MdxHeader::decode(&buf), Err(IndexError::InvalidIndex(_))));
    }

    #[test]
    fn test_tag_header_layout() {
        let header = TagHeader {
            root: 8,
            tag_size: 2,
            key_type: KeyType::Numeric,
            key_len: 12,
            keys_per_block: keys_per_block(1024, item_len(12)),
            item_len: item_len(12),
            serial: 1,
            unique: true,
            descending: true,
            key_expression: "BALANCE".to_string(),
            filter: Some("ACTIVE".to_string()),
            has_keys: false,
            left_sibling: 8,
            right_sibling: 8,
            created: date_bytes(today()),
            single_field: true,
        };
        let buf = header.encode(1024);
        assert_eq!(buf[8], 0x10 | 0x08 | 0x40);
        assert_eq!(buf[9], b'N');
        assert_eq!(endian::get_i16(&buf, 18), 16);
        assert_eq!(endian::get_i16(&buf, 14), 63);
        assert_eq!(&buf[24..31], b"BALANCE");
        assert_eq!(buf[245], 1);
        assert_eq!(&buf[762..768], b"ACTIVE");
        assert_eq!(buf[480], 1);
        assert_eq!(TagHeader::decode(&buf).expect("decode"), header);
    }

    #[test]
    fn test_date_key_sets_secondary_type() {
        let header = TagHeader {
            root: 6,
            tag_size: 2,
            key_type: KeyType::Date,
            key_len: 8,
            keys_per_block: keys_per_block(512, item_len(8)),
            item_len: item_len(8),
            serial: 1,
            unique: false,
            descending: false,
            key_expression: "HIRED".to_string(),
            filter: None,
            has_keys: true,
            left_sibling: 6,
            right_sibling: 6,
            created: [0; 3],
            single_field: false,
        };
        let buf = header.encode(512);
        assert_eq!(buf.len(), TAG_HEADER_LEN);
        assert_eq!(endian::get_i16(&buf, 16), 1);
        assert_eq!(buf[245], 0);
        assert_eq!(header.keys_per_block, 41);
    }
}
