//! Tag definitions and per-tag runtime state.
//!
//! A tag is one ordered key set: a key expression, an optional filter,
//! a direction, a uniqueness flag and the B-tree that stores the keys.
//! Single-tag files hold exactly one; multi-tag files up to 47.

use crate::IndexError;
use crate::config::DuplicateKeyMode;
use crate::key::{Key, KeyType};
use crate::record::Value;
use crate::tree::Chain;
use crate::tree::node::{Format, Layout};

/// Longest tag name either format stores.
pub const MAX_TAG_NAME_LEN: usize = 10;

/// What the caller asks for when creating a tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagDefinition {
    pub name: String,
    pub key_expression: String,
    pub filter: Option<String>,
    pub unique: bool,
    pub descending: bool,
}

impl TagDefinition {
    #[must_use]
    pub fn new(name: &str, key_expression: &str) -> Self {
        Self {
            name: name.trim().to_string(),
            key_expression: key_expression.trim().to_string(),
            filter: None,
            unique: false,
            descending: false,
        }
    }

    #[must_use]
    pub fn with_filter(mut self, filter: &str) -> Self {
        let filter = filter.trim();
        self.filter = (!filter.is_empty()).then(|| filter.to_string());
        self
    }

    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    #[must_use]
    pub const fn descending(mut self) -> Self {
        self.descending = true;
        self
    }

    /// Reject names the on-disk tag tables cannot hold.
    pub fn validate_name(&self) -> Result<(), IndexError> {
        if self.name.is_empty() || self.name.len() > MAX_TAG_NAME_LEN {
            return Err(IndexError::InvalidTag(format!(
                "tag name '{}' must be 1 to {MAX_TAG_NAME_LEN} bytes",
                self.name
            )));
        }
        if !self
            .name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_')
        {
            return Err(IndexError::InvalidTag(format!(
                "tag name '{}' may only hold letters, digits and '_'",
                self.name
            )));
        }
        Ok(())
    }
}

/// Pending key work for one tag, computed from the current record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyStatus {
    /// Nothing to do.
    #[default]
    None,
    /// Add the new key.
    Add,
    /// Replace the original key with the new one.
    Update,
    /// Remove the original key.
    Delete,
}

/// Which record operation key creation prepares for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyMode {
    /// Build the current key only, for lookups.
    Find,
    /// A new record is being appended.
    Append,
    /// An existing record is being rewritten.
    Update,
}

/// A tag of an open index.
#[derive(Debug)]
pub struct Tag {
    pub(crate) name: String,
    pub(crate) key_expression: String,
    pub(crate) filter: Option<String>,
    pub(crate) unique: bool,
    pub(crate) layout: Layout,
    pub(crate) root: u32,

    // Multi-tag header fields.
    pub(crate) header_page: u32,
    pub(crate) tag_size: u32,
    pub(crate) has_keys: bool,
    pub(crate) left_sibling: u32,
    pub(crate) right_sibling: u32,
    pub(crate) serial: u8,

    pub(crate) chain: Chain,
    pub(crate) duplicate_mode: DuplicateKeyMode,
    pub(crate) key: Vec<u8>,
    pub(crate) original_key: Vec<u8>,
    pub(crate) key_status: KeyStatus,
    pub(crate) found_duplicate: bool,
}

impl Tag {
    pub(crate) fn new(
        name: &str,
        key_expression: &str,
        filter: Option<String>,
        unique: bool,
        layout: Layout,
        duplicate_mode: DuplicateKeyMode,
    ) -> Self {
        Self {
            name: name.to_string(),
            key_expression: key_expression.to_string(),
            filter,
            unique,
            layout,
            root: 0,
            header_page: 0,
            tag_size: 0,
            has_keys: false,
            left_sibling: 0,
            right_sibling: 0,
            serial: 0,
            chain: Chain::default(),
            duplicate_mode,
            key: vec![0; layout.key_len],
            original_key: vec![0; layout.key_len],
            key_status: KeyStatus::None,
            found_duplicate: false,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn key_expression(&self) -> &str {
        &self.key_expression
    }

    #[must_use]
    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    #[must_use]
    pub const fn unique(&self) -> bool {
        self.unique
    }

    #[must_use]
    pub const fn descending(&self) -> bool {
        self.layout.descending
    }

    #[must_use]
    pub const fn key_type(&self) -> KeyType {
        self.layout.key_type
    }

    #[must_use]
    pub const fn key_len(&self) -> usize {
        self.layout.key_len
    }

    #[must_use]
    pub const fn keys_per_block(&self) -> usize {
        self.layout.keys_per_block
    }

    #[must_use]
    pub const fn format(&self) -> Format {
        self.layout.format
    }

    #[must_use]
    pub const fn root_page(&self) -> u32 {
        self.root
    }

    /// Blocks owned by the tag, multi-tag files only.
    #[must_use]
    pub const fn tag_size(&self) -> u32 {
        self.tag_size
    }

    #[must_use]
    pub const fn has_keys(&self) -> bool {
        self.has_keys
    }

    #[must_use]
    pub const fn serial(&self) -> u8 {
        self.serial
    }

    #[must_use]
    pub const fn key_status(&self) -> KeyStatus {
        self.key_status
    }

    #[must_use]
    pub const fn found_duplicate(&self) -> bool {
        self.found_duplicate
    }

    /// Key built for the current record by the last key creation.
    #[must_use]
    pub fn current_record_key(&self) -> &[u8] {
        &self.key
    }

    /// Stored bytes for `value`, as the tree compares them.
    pub fn encode_value(&self, value: &Value) -> Result<Vec<u8>, IndexError> {
        Ok(Key::from_value(value, self.key_type())?.encode(self.key_len()))
    }

    /// Bytes to search for. Character searches match on the given prefix.
    pub(crate) fn search_bytes(&self, key: &Key) -> Vec<u8> {
        match key {
            Key::Char(bytes) => bytes[..bytes.len().min(self.key_len())].to_vec(),
            other => other.encode(self.key_len()),
        }
    }
}

/// Serial numbers of single-tag files wrap back to zero after 127.
#[must_use]
pub const fn next_ndx_serial(serial: u8) -> u8 {
    if serial >= 127 { 0 } else { serial + 1 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_name_validation() {
        assert!(TagDefinition::new("CUSTNO", "CUSTNO").validate_name().is_ok());
        assert!(TagDefinition::new("  last_nm ", "X").validate_name().is_ok());
        assert!(matches!(
            TagDefinition::new("ABCDEFGHIJK", "X").validate_name(),
            Err(IndexError::InvalidTag(_))
        ));
        assert!(TagDefinition::new("", "X").validate_name().is_err());
        assert!(TagDefinition::new("A-B", "X").validate_name().is_err());
    }

    #[test]
    fn test_definition_builder() {
        let def = TagDefinition::new("T", "NAME")
            .with_filter("  ")
            .unique()
            .descending();
        assert!(def.unique);
        assert!(def.descending);
        assert_eq!(def.filter, None);
        assert_eq!(
            TagDefinition::new("T", "NAME").with_filter(" ACTIVE ").filter,
            Some("ACTIVE".to_string())
        );
    }

    #[test]
    fn test_ndx_serial_wraps() {
        assert_eq!(next_ndx_serial(0), 1);
        assert_eq!(next_ndx_serial(126), 127);
        assert_eq!(next_ndx_serial(127), 0);
    }
}
