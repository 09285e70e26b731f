//! The tag table: 32-byte directory entries following the file header,
//! linked into an unbalanced binary search tree by tag name.

use std::cmp::Ordering;

use crate::key::KeyType;
use crate::storage::endian;

/// Offset of the first tag table entry.
pub const TAG_TABLE_OFFSET: usize = 544;
/// Length of one tag table entry.
pub const TAG_ENTRY_LEN: usize = 32;
/// Tags one file can hold.
pub const MAX_TAGS: usize = 47;
/// Bytes of the table rewritten when a tag is removed.
pub const TAG_TABLE_LEN: usize = MAX_TAGS * TAG_ENTRY_LEN;

/// One tag table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagEntry {
    pub header_page: u32,
    pub name: String,
    pub key_type: KeyType,
    /// 1-based entry numbers, zero for none.
    pub left: u8,
    pub right: u8,
    pub parent: u8,
}

impl TagEntry {
    #[must_use]
    pub fn new(header_page: u32, name: &str, key_type: KeyType) -> Self {
        Self {
            header_page,
            name: name.to_string(),
            key_type,
            left: 0,
            right: 0,
            parent: 0,
        }
    }

    #[must_use]
    pub fn encode(&self) -> [u8; TAG_ENTRY_LEN] {
        let mut buf = [0u8; TAG_ENTRY_LEN];
        endian::put_u32(&mut buf, 0, self.header_page);
        let name = self.name.as_bytes();
        let n = name.len().min(10);
        buf[4..4 + n].copy_from_slice(&name[..n]);
        buf[15] = 0x10;
        buf[16] = self.left;
        buf[17] = self.right;
        buf[18] = self.parent;
        buf[19] = 0x02;
        buf[20] = self.key_type.code();
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, crate::IndexError> {
        let name = &buf[4..15];
        let end = name.iter().position(|&b| b == 0).unwrap_or(name.len());
        Ok(Self {
            header_page: endian::get_u32(buf, 0),
            name: String::from_utf8_lossy(&name[..end]).trim().to_string(),
            key_type: KeyType::from_code(buf[20])?,
            left: buf[16],
            right: buf[17],
            parent: buf[18],
        })
    }
}

/// Rebuild the name tree: every entry after the first is inserted in
/// table order below the first, smaller names to the left.
#[allow(clippy::cast_possible_truncation)]
pub fn link_names(entries: &mut [TagEntry]) {
    for entry in entries.iter_mut() {
        entry.left = 0;
        entry.right = 0;
        entry.parent = 0;
    }
    for i in 1..entries.len() {
        let mut at = 0;
        loop {
            let goes_left = entries[i].name.as_bytes() < entries[at].name.as_bytes();
            let link = if goes_left {
                entries[at].left
            } else {
                entries[at].right
            };
            if link == 0 {
                if goes_left {
                    entries[at].left = (i + 1) as u8;
                } else {
                    entries[at].right = (i + 1) as u8;
                }
                entries[i].parent = (at + 1) as u8;
                break;
            }
            at = usize::from(link) - 1;
        }
    }
}

/// Find a tag by walking the name tree from the first entry.
#[must_use]
pub fn search_names(entries: &[TagEntry], name: &str) -> Option<usize> {
    let name = name.trim().to_ascii_uppercase();
    let mut at = 0;
    let mut steps = 0;
    while at < entries.len() && steps <= entries.len() {
        let here = entries[at].name.to_ascii_uppercase();
        let link = match name.as_bytes().cmp(here.as_bytes()) {
            Ordering::Equal => return Some(at),
            Ordering::Less => entries[at].left,
            Ordering::Greater => entries[at].right,
        };
        if link == 0 {
            return None;
        }
        at = usize::from(link) - 1;
        steps += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(names: &[&str]) -> Vec<TagEntry> {
        names
            .iter()
            .enumerate()
            .map(|(i, n)| TagEntry::new(4 + 4 * i as u32, n, KeyType::Char))
            .collect()
    }

    #[test]
    fn test_entry_layout() {
        let mut entry = TagEntry::new(4, "LASTNAME", KeyType::Char);
        entry.right = 2;
        let buf = entry.encode();
        assert_eq!(endian::get_u32(&buf, 0), 4);
        assert_eq!(&buf[4..12], b"LASTNAME");
        assert_eq!(buf[12], 0);
        assert_eq!((buf[15], buf[17], buf[19], buf[20]), (0x10, 2, 0x02, b'C'));
        assert_eq!(TagEntry::decode(&buf).expect("decode"), entry);
    }

    #[test]
    fn test_link_names_builds_unbalanced_tree() {
        let mut table = entries(&["M", "C", "X", "A", "E", "M"]);
        link_names(&mut table);
        let links: Vec<_> = table.iter().map(|e| (e.left, e.right, e.parent)).collect();
        assert_eq!(
            links,
            vec![(2, 3, 0), (4, 5, 1), (6, 0, 1), (0, 0, 2), (0, 0, 2), (0, 0, 3)]
        );
    }

    #[test]
    fn test_search_names_follows_links() {
        let mut table = entries(&["NAME", "CITY", "ZIP", "BALANCE", "DATE"]);
        link_names(&mut table);
        assert_eq!(search_names(&table, "date"), Some(4));
        assert_eq!(search_names(&table, "ZIP"), Some(2));
        assert_eq!(search_names(&table, " NAME "), Some(0));
        assert_eq!(search_names(&table, "STATE"), None);
        assert_eq!(search_names(&[], "NAME"), None);
    }
}
