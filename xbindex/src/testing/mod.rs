//! In-memory collaborators for tests and the inspector.
//!
//! [`MemoryTable`] stands in for a table file: numbered rows of named
//! field values with deleted flags and an edit buffer. [`FieldEvaluator`]
//! understands field names and `+` concatenation of character fields,
//! which is all the key and filter expressions the tests need.

use std::collections::BTreeMap;

use crate::IndexError;
use crate::record::{Evaluator, ExprType, RecordBuffer, RecordSource, Value};

#[derive(Debug, Clone, Default)]
struct Row {
    values: BTreeMap<String, Value>,
    deleted: bool,
}

/// Rows addressed by 1-based record number.
///
/// The original buffer is always the stored row. The current buffer is
/// the stored row too, unless an edit is open, in which case it holds the
/// edited copy until [`MemoryTable::commit`].
#[derive(Debug, Default)]
pub struct MemoryTable {
    rows: Vec<Row>,
    current: u32,
    edit: Option<Row>,
}

impl MemoryTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a row and position on it. Returns its record number.
    #[allow(clippy::cast_possible_truncation)]
    pub fn append(&mut self, fields: &[(&str, Value)]) -> u32 {
        let row = Row {
            values: fields
                .iter()
                .map(|(name, value)| (name.to_ascii_uppercase(), value.clone()))
                .collect(),
            deleted: false,
        };
        self.rows.push(row);
        self.current = self.rows.len() as u32;
        self.edit = None;
        self.current
    }

    /// Position on `record` and open an edit of it.
    pub fn begin_edit(&mut self, record: u32) -> Result<(), IndexError> {
        self.get_record(record)?;
        self.edit = Some(self.row(record)?.clone());
        Ok(())
    }

    /// Change a field in the open edit.
    pub fn set(&mut self, name: &str, value: Value) -> Result<(), IndexError> {
        let edit = self.open_edit()?;
        edit.values.insert(name.to_ascii_uppercase(), value);
        Ok(())
    }

    /// Flag the edited record deleted or recalled.
    pub fn set_deleted(&mut self, deleted: bool) -> Result<(), IndexError> {
        self.open_edit()?.deleted = deleted;
        Ok(())
    }

    /// Store the open edit over the positioned row.
    pub fn commit(&mut self) -> Result<(), IndexError> {
        let edit = self
            .edit
            .take()
            .ok_or_else(|| IndexError::Record("no edit in progress".to_string()))?;
        let index = self.current as usize - 1;
        self.rows[index] = edit;
        Ok(())
    }

    fn open_edit(&mut self) -> Result<&mut Row, IndexError> {
        self.edit
            .as_mut()
            .ok_or_else(|| IndexError::Record("no edit in progress".to_string()))
    }

    fn row(&self, record: u32) -> Result<&Row, IndexError> {
        record
            .checked_sub(1)
            .and_then(|i| self.rows.get(i as usize))
            .ok_or_else(|| IndexError::Record(format!("record {record} does not exist")))
    }

    fn buffer(&self, buffer: RecordBuffer) -> Option<&Row> {
        match (buffer, &self.edit) {
            (RecordBuffer::Current, Some(edit)) => Some(edit),
            _ => self.row(self.current).ok(),
        }
    }
}

impl RecordSource for MemoryTable {
    fn get_record(&mut self, record: u32) -> Result<(), IndexError> {
        self.row(record)?;
        self.current = record;
        self.edit = None;
        Ok(())
    }

    fn current_record_number(&self) -> u32 {
        self.current
    }

    #[allow(clippy::cast_possible_truncation)]
    fn record_count(&self) -> Result<u32, IndexError> {
        Ok(self.rows.len() as u32)
    }

    fn is_deleted(&self, buffer: RecordBuffer) -> bool {
        self.buffer(buffer).is_some_and(|row| row.deleted)
    }

    fn field(&self, name: &str, buffer: RecordBuffer) -> Option<Value> {
        self.buffer(buffer)?
            .values
            .get(&name.to_ascii_uppercase())
            .cloned()
    }
}

/// Evaluates field names and concatenations of character fields.
#[derive(Debug, Clone, Default)]
pub struct FieldEvaluator {
    schema: BTreeMap<String, ExprType>,
}

impl FieldEvaluator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn char_field(self, name: &str, width: usize) -> Self {
        self.field(name, ExprType::Char(width))
    }

    #[must_use]
    pub fn numeric_field(self, name: &str) -> Self {
        self.field(name, ExprType::Numeric)
    }

    #[must_use]
    pub fn date_field(self, name: &str) -> Self {
        self.field(name, ExprType::Date)
    }

    #[must_use]
    pub fn logical_field(self, name: &str) -> Self {
        self.field(name, ExprType::Logical)
    }

    fn field(mut self, name: &str, kind: ExprType) -> Self {
        self.schema.insert(name.to_ascii_uppercase(), kind);
        self
    }

    fn lookup(&self, name: &str) -> Result<ExprType, IndexError> {
        self.schema
            .get(&name.trim().to_ascii_uppercase())
            .copied()
            .ok_or_else(|| IndexError::Record(format!("unknown field '{}'", name.trim())))
    }

    /// Pad or cut a character value to its declared width.
    fn fit(bytes: &[u8], width: usize) -> Vec<u8> {
        let mut out = bytes[..bytes.len().min(width)].to_vec();
        out.resize(width, b' ');
        out
    }
}

impl Evaluator for FieldEvaluator {
    fn describe(&self, expression: &str) -> Result<ExprType, IndexError> {
        let parts: Vec<&str> = expression.split('+').collect();
        if parts.len() == 1 {
            return self.lookup(parts[0]);
        }
        let mut width = 0;
        for part in parts {
            match self.lookup(part)? {
                ExprType::Char(w) => width += w,
                other => {
                    return Err(IndexError::Record(format!(
                        "cannot concatenate {other:?} field '{}'",
                        part.trim()
                    )));
                }
            }
        }
        Ok(ExprType::Char(width))
    }

    fn evaluate(
        &self,
        expression: &str,
        records: &dyn RecordSource,
        buffer: RecordBuffer,
    ) -> Result<Value, IndexError> {
        let mut text = Vec::new();
        let mut single = None;
        for part in expression.split('+') {
            let name = part.trim();
            let kind = self.lookup(name)?;
            let value = records
                .field(name, buffer)
                .ok_or_else(|| IndexError::Record(format!("field '{name}' has no value")))?;
            match (kind, value) {
                (ExprType::Char(width), Value::Char(bytes)) => {
                    text.extend_from_slice(&Self::fit(&bytes, width));
                }
                (_, value) => single = Some(value),
            }
        }
        Ok(single.unwrap_or(Value::Char(text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evaluator() -> FieldEvaluator {
        FieldEvaluator::new()
            .char_field("LAST", 6)
            .char_field("FIRST", 4)
            .numeric_field("AGE")
            .logical_field("ACTIVE")
    }

    fn chars(s: &str) -> Value {
        Value::Char(s.as_bytes().to_vec())
    }

    #[test]
    fn test_describe_concatenation() {
        let eval = evaluator();
        assert_eq!(eval.describe("LAST+FIRST").expect("describe"), ExprType::Char(10));
        assert_eq!(eval.describe(" age ").expect("describe"), ExprType::Numeric);
        assert!(matches!(eval.describe("LAST+AGE"), Err(IndexError::Record(_))));
        assert!(matches!(eval.describe("ZIP"), Err(IndexError::Record(_))));
    }

    #[test]
    fn test_evaluate_reads_both_buffers() {
        let eval = evaluator();
        let mut table = MemoryTable::new();
        let record = table.append(&[
            ("LAST", chars("SMITH")),
            ("FIRST", chars("ANN")),
            ("AGE", Value::Numeric(40.0)),
        ]);
        assert_eq!(record, 1);

        table.begin_edit(1).expect("edit");
        table.set("last", chars("JONES")).expect("set");
        table.set_deleted(true).expect("delete");

        let current = eval
            .evaluate("LAST+FIRST", &table, RecordBuffer::Current)
            .expect("current");
        let original = eval
            .evaluate("LAST+FIRST", &table, RecordBuffer::Original)
            .expect("original");
        assert_eq!(current, chars("JONES ANN "));
        assert_eq!(original, chars("SMITH ANN "));
        assert!(table.is_deleted(RecordBuffer::Current));
        assert!(!table.is_deleted(RecordBuffer::Original));

        table.commit().expect("commit");
        assert!(table.is_deleted(RecordBuffer::Original));
        assert_eq!(
            eval.evaluate("AGE", &table, RecordBuffer::Current).expect("age"),
            Value::Numeric(40.0)
        );
    }

    #[test]
    fn test_missing_record_is_an_error() {
        let mut table = MemoryTable::new();
        assert!(matches!(table.get_record(1), Err(IndexError::Record(_))));
        assert!(matches!(table.commit(), Err(IndexError::Record(_))));
    }
}
