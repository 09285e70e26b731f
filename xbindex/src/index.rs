//! The operations every open index offers, whatever its file format.
//!
//! Implementors supply tag access and the tree primitives; key building,
//! the duplicate-key policy, record-level maintenance, reindexing and the
//! integrity check are provided on top of them.

use tracing::{debug, info, warn};

use crate::IndexError;
use crate::config::DuplicateKeyMode;
use crate::key::{Key, compare_directed};
use crate::record::{Evaluator, RecordBuffer, RecordSource, Value};
use crate::tag::{KeyMode, KeyStatus, Tag};
use crate::tree::{FindOutcome, Position};

/// Outcome of [`Index::check_integrity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityReport {
    /// Keys are ordered and every eligible record is represented.
    Ok { keys: u32 },
    /// A unique tag in compatibility mode indexes fewer keys than records
    /// pass its filter, because later duplicates were left out.
    OutOfSync { keys: u32, records: u32 },
}

/// An open index file.
pub trait Index {
    /// Tags in table order.
    fn tags(&self) -> &[Tag];

    fn tag_mut(&mut self, tag: usize) -> Result<&mut Tag, IndexError>;

    /// Look up stored key bytes; shorter character keys match on prefix.
    fn find_key_bytes(&mut self, tag: usize, search: &[u8]) -> Result<FindOutcome, IndexError>;

    fn first_key(&mut self, tag: usize) -> Result<Position, IndexError>;

    fn last_key(&mut self, tag: usize) -> Result<Position, IndexError>;

    fn next_key(&mut self, tag: usize) -> Result<Position, IndexError>;

    fn prev_key(&mut self, tag: usize) -> Result<Position, IndexError>;

    /// Insert stored key bytes for `record`. No duplicate check.
    fn add_key(&mut self, tag: usize, key: &[u8], record: u32) -> Result<(), IndexError>;

    /// Remove the entry for `key` and `record`; `false` when absent.
    fn delete_key(&mut self, tag: usize, key: &[u8], record: u32) -> Result<bool, IndexError>;

    /// Position on the entry for `key` and `record`.
    fn locate(&mut self, tag: usize, key: &[u8], record: u32) -> Result<bool, IndexError>;

    /// Drop every key, leaving an empty root.
    fn clear_tag(&mut self, tag: usize) -> Result<(), IndexError>;

    /// Make all writes durable.
    fn flush(&mut self) -> Result<(), IndexError>;

    fn tag_count(&self) -> usize {
        self.tags().len()
    }

    fn tag(&self, tag: usize) -> Result<&Tag, IndexError> {
        self.tags()
            .get(tag)
            .ok_or_else(|| IndexError::TagNotFound(format!("#{tag}")))
    }

    /// Position of the tag called `name`.
    fn tag_id(&self, name: &str) -> Result<usize, IndexError> {
        self.tags()
            .iter()
            .position(|t| t.name().eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| IndexError::TagNotFound(name.to_string()))
    }

    /// Look up a decoded key.
    fn find_key(&mut self, tag: usize, key: &Key) -> Result<FindOutcome, IndexError> {
        let search = self.tag(tag)?.search_bytes(key);
        self.find_key_bytes(tag, &search)
    }

    /// Look up the key an expression value produces.
    fn find_value(&mut self, tag: usize, value: &Value) -> Result<FindOutcome, IndexError> {
        let key = Key::from_value(value, self.tag(tag)?.key_type())?;
        self.find_key(tag, &key)
    }

    /// Typed value of the key the tag is positioned on.
    fn current_key_value(&self, tag: usize) -> Result<Option<Value>, IndexError> {
        let tag = self.tag(tag)?;
        Ok(crate::tree::current_key(tag).map(|bytes| Key::decode(tag.key_type(), bytes).to_value()))
    }

    /// Record number of the key the tag is positioned on.
    fn current_record(&self, tag: usize) -> Result<Option<u32>, IndexError> {
        Ok(crate::tree::current_record(self.tag(tag)?))
    }

    /// Whether the exact stored key exists.
    fn key_exists(&mut self, tag: usize, key: &[u8]) -> Result<bool, IndexError> {
        Ok(self.find_key_bytes(tag, key)?.found().is_some())
    }

    /// Look up the key the current record produces, filter or not.
    fn find_record_key(
        &mut self,
        tag: usize,
        records: &dyn RecordSource,
        evaluator: &dyn Evaluator,
    ) -> Result<FindOutcome, IndexError> {
        build_key(self.tag_mut(tag)?, KeyMode::Find, records, evaluator)?;
        let key = self.tag(tag)?.key.clone();
        self.find_key_bytes(tag, &key)
    }

    /// Build the key (and for updates the original key) of the current
    /// record for every tag, and decide what each tag must do.
    fn create_keys(
        &mut self,
        mode: KeyMode,
        records: &dyn RecordSource,
        evaluator: &dyn Evaluator,
    ) -> Result<(), IndexError> {
        for id in 0..self.tag_count() {
            build_key(self.tag_mut(id)?, mode, records, evaluator)?;
        }
        Ok(())
    }

    /// Apply the duplicate-key policy to one tag's pending key.
    fn check_for_dup_key(&mut self, tag: usize) -> Result<(), IndexError> {
        let t = self.tag_mut(tag)?;
        t.found_duplicate = false;
        if !t.unique || !matches!(t.key_status, KeyStatus::Add | KeyStatus::Update) {
            return Ok(());
        }
        let key = t.key.clone();
        let mode = t.duplicate_mode;
        if !self.key_exists(tag, &key)? {
            return Ok(());
        }
        match mode {
            DuplicateKeyMode::Compat => {
                let t = self.tag_mut(tag)?;
                debug!(tag = %t.name, "duplicate key left out of unique tag");
                t.found_duplicate = true;
                Ok(())
            }
            DuplicateKeyMode::Strict => Err(IndexError::DuplicateKey),
        }
    }

    /// Duplicate check for every tag.
    fn check_for_dup_keys(&mut self) -> Result<(), IndexError> {
        for id in 0..self.tag_count() {
            self.check_for_dup_key(id)?;
        }
        Ok(())
    }

    /// Insert the pending new keys of every tag.
    fn add_keys(&mut self, record: u32) -> Result<(), IndexError> {
        for id in 0..self.tag_count() {
            let t = self.tag_mut(id)?;
            if !matches!(t.key_status, KeyStatus::Add | KeyStatus::Update) || t.found_duplicate {
                continue;
            }
            let key = t.key.clone();
            self.add_key(id, &key, record)?;
        }
        Ok(())
    }

    /// Remove the pending original keys of every tag.
    fn delete_keys(&mut self, record: u32) -> Result<(), IndexError> {
        for id in 0..self.tag_count() {
            let t = self.tag_mut(id)?;
            if !matches!(t.key_status, KeyStatus::Update | KeyStatus::Delete) {
                continue;
            }
            let key = t.original_key.clone();
            if !self.delete_key(id, &key, record)? {
                debug!(tag = %self.tag(id)?.name, record, "original key was not indexed");
            }
        }
        Ok(())
    }

    /// Index a newly appended record in every tag.
    ///
    /// Duplicates are checked for every tag before any tag changes.
    fn append_record(
        &mut self,
        records: &dyn RecordSource,
        evaluator: &dyn Evaluator,
    ) -> Result<(), IndexError> {
        let record = records.current_record_number();
        self.create_keys(KeyMode::Append, records, evaluator)?;
        self.check_for_dup_keys()?;
        self.add_keys(record)
    }

    /// Bring every tag in line with an edited record.
    fn update_record(
        &mut self,
        records: &dyn RecordSource,
        evaluator: &dyn Evaluator,
    ) -> Result<(), IndexError> {
        let record = records.current_record_number();
        self.create_keys(KeyMode::Update, records, evaluator)?;
        self.check_for_dup_keys()?;
        self.delete_keys(record)?;
        self.add_keys(record)
    }

    /// Add the current record's key to one tag.
    fn add_key_for_record(
        &mut self,
        tag: usize,
        records: &dyn RecordSource,
        evaluator: &dyn Evaluator,
    ) -> Result<(), IndexError> {
        build_key(self.tag_mut(tag)?, KeyMode::Append, records, evaluator)?;
        if self.tag(tag)?.key_status != KeyStatus::Add {
            return Ok(());
        }
        self.check_for_dup_key(tag)?;
        if self.tag(tag)?.found_duplicate {
            return Ok(());
        }
        let key = self.tag(tag)?.key.clone();
        self.add_key(tag, &key, records.current_record_number())
    }

    /// Remove the current record's original key from one tag.
    fn delete_key_for_record(
        &mut self,
        tag: usize,
        records: &dyn RecordSource,
        evaluator: &dyn Evaluator,
    ) -> Result<bool, IndexError> {
        let t = self.tag_mut(tag)?;
        let value = evaluator.evaluate(&t.key_expression, records, RecordBuffer::Original)?;
        let key = t.encode_value(&value)?;
        t.original_key.clone_from(&key);
        self.delete_key(tag, &key, records.current_record_number())
    }

    /// Rebuild a tag from every record of the table, in record order.
    fn reindex_tag(
        &mut self,
        tag: usize,
        records: &mut dyn RecordSource,
        evaluator: &dyn Evaluator,
    ) -> Result<u32, IndexError> {
        self.clear_tag(tag)?;
        let count = records.record_count()?;
        let mut keys = 0u32;
        for record in 1..=count {
            records.get_record(record)?;
            build_key(self.tag_mut(tag)?, KeyMode::Append, &*records, evaluator)?;
            if self.tag(tag)?.key_status != KeyStatus::Add {
                continue;
            }
            self.check_for_dup_key(tag)?;
            if self.tag(tag)?.found_duplicate {
                continue;
            }
            let key = self.tag(tag)?.key.clone();
            self.add_key(tag, &key, record)?;
            keys += 1;
        }
        self.flush()?;
        info!(tag = %self.tag(tag)?.name, records = count, keys, "reindexed tag");
        Ok(keys)
    }

    /// Walk a tag from first to last key, failing on a key or record out
    /// of sequence. Returns the number of keys.
    fn verify_order(&mut self, tag: usize) -> Result<u32, IndexError> {
        check_key_order(self, tag)
    }

    /// Verify key order, then that every eligible record is represented.
    ///
    /// Structural problems are returned as [`IndexError::InvalidIndex`];
    /// the index is never repaired.
    fn check_integrity(
        &mut self,
        tag: usize,
        records: &mut dyn RecordSource,
        evaluator: &dyn Evaluator,
    ) -> Result<IntegrityReport, IndexError> {
        let keys = self.verify_order(tag)?;

        let count = records.record_count()?;
        let mut eligible = 0u32;
        for record in 1..=count {
            records.get_record(record)?;
            build_key(self.tag_mut(tag)?, KeyMode::Append, &*records, evaluator)?;
            let t = self.tag(tag)?;
            if t.key_status != KeyStatus::Add {
                continue;
            }
            eligible += 1;
            let key = t.key.clone();
            let compat_unique = t.unique && t.duplicate_mode == DuplicateKeyMode::Compat;
            let present = if compat_unique {
                self.key_exists(tag, &key)?
            } else {
                self.locate(tag, &key, record)?
            };
            if !present {
                return Err(IndexError::InvalidIndex(format!(
                    "missing index entry for record {record} in tag {}",
                    self.tag(tag)?.name
                )));
            }
        }

        let t = self.tag(tag)?;
        if keys > eligible {
            return Err(IndexError::InvalidIndex(format!(
                "tag {} holds {keys} keys for {eligible} records",
                t.name
            )));
        }
        if keys < eligible {
            if t.unique && t.duplicate_mode == DuplicateKeyMode::Compat {
                warn!(
                    tag = %t.name,
                    keys,
                    records = eligible,
                    "unique tag holds one key per value, records share keys"
                );
                return Ok(IntegrityReport::OutOfSync {
                    keys,
                    records: eligible,
                });
            }
            return Err(IndexError::InvalidIndex(format!(
                "tag {} holds {keys} keys for {eligible} records",
                t.name
            )));
        }
        debug!(tag = %t.name, keys, "tag integrity verified");
        Ok(IntegrityReport::Ok { keys })
    }
}

/// Walk every key of a tag, failing on a key or record out of order.
fn check_key_order<X: Index + ?Sized>(index: &mut X, tag: usize) -> Result<u32, IndexError> {
    let mut keys = 0u32;
    let mut previous: Option<(Vec<u8>, u32)> = None;
    let mut position = index.first_key(tag)?;
    while let Position::At(record) = position {
        keys += 1;
        let t = index.tag(tag)?;
        let key = crate::tree::current_key(t)
            .ok_or_else(|| IndexError::InvalidIndex("positioned without a key".to_string()))?
            .to_vec();
        if let Some((prev_key, prev_record)) = &previous {
            let order = compare_directed(t.key_type(), t.descending(), prev_key, &key);
            if order.is_gt() {
                return Err(IndexError::InvalidIndex(format!(
                    "key sequence error at key {keys} of tag {}",
                    t.name
                )));
            }
            if order.is_eq() && record <= *prev_record {
                return Err(IndexError::InvalidIndex(format!(
                    "record sequence error at key {keys} of tag {}",
                    t.name
                )));
            }
        }
        previous = Some((key, record));
        position = index.next_key(tag)?;
    }
    Ok(keys)
}

/// Compute a tag's pending key work for the current record.
fn build_key(
    tag: &mut Tag,
    mode: KeyMode,
    records: &dyn RecordSource,
    evaluator: &dyn Evaluator,
) -> Result<(), IndexError> {
    tag.key_status = KeyStatus::None;
    let include_new = included(tag, records, evaluator, RecordBuffer::Current)?;
    if mode == KeyMode::Append && !include_new {
        return Ok(());
    }

    let value = evaluator.evaluate(&tag.key_expression, records, RecordBuffer::Current)?;
    tag.key = tag.encode_value(&value)?;

    match mode {
        KeyMode::Find => {}
        KeyMode::Append => tag.key_status = KeyStatus::Add,
        KeyMode::Update => {
            let include_old = included(tag, records, evaluator, RecordBuffer::Original)?;
            let value = evaluator.evaluate(&tag.key_expression, records, RecordBuffer::Original)?;
            tag.original_key = tag.encode_value(&value)?;
            tag.key_status = match (include_old, include_new) {
                (true, true) if tag.key != tag.original_key => KeyStatus::Update,
                (true, false) => KeyStatus::Delete,
                (false, true) => KeyStatus::Add,
                _ => KeyStatus::None,
            };
        }
    }
    Ok(())
}

/// Whether a record buffer belongs in the tag: its filter passes and, in
/// strict mode, it is not deleted.
fn included(
    tag: &Tag,
    records: &dyn RecordSource,
    evaluator: &dyn Evaluator,
    buffer: RecordBuffer,
) -> Result<bool, IndexError> {
    if tag.duplicate_mode == DuplicateKeyMode::Strict && records.is_deleted(buffer) {
        return Ok(false);
    }
    let Some(filter) = &tag.filter else {
        return Ok(true);
    };
    match evaluator.evaluate(filter, records, buffer)? {
        Value::Logical(passes) => Ok(passes),
        other => Err(IndexError::InvalidTag(format!(
            "filter of tag {} produced {}",
            tag.name,
            other.type_name()
        ))),
    }
}
