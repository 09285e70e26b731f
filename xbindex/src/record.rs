//! Collaborator interfaces: the record store and the expression evaluator.
//!
//! The index engine never reads table files or parses expressions itself.
//! It asks a [`RecordSource`] to position on records and an [`Evaluator`]
//! to compute key and filter values from the positioned record.

use crate::key::Date;
use crate::IndexError;

/// Which copy of the current record an expression is evaluated against.
///
/// During an update the record store holds both the record as last read
/// (`Original`) and the edited version (`Current`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordBuffer {
    Current,
    Original,
}

/// A typed expression result.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Char(Vec<u8>),
    Numeric(f64),
    Date(Date),
    Logical(bool),
}

impl Value {
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Char(_) => "character",
            Self::Numeric(_) => "numeric",
            Self::Date(_) => "date",
            Self::Logical(_) => "logical",
        }
    }
}

/// Declared result type of an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprType {
    /// Character result of the given width.
    Char(usize),
    Numeric,
    Date,
    Logical,
}

/// Record-number addressed table access.
pub trait RecordSource {
    /// Load record `record` into the current buffer.
    fn get_record(&mut self, record: u32) -> Result<(), IndexError>;

    /// Record number the current buffer holds, zero when unpositioned.
    fn current_record_number(&self) -> u32;

    /// Number of records in the table.
    fn record_count(&self) -> Result<u32, IndexError>;

    /// Deleted flag of the current or original buffer.
    fn is_deleted(&self, buffer: RecordBuffer) -> bool;

    /// Value of a named field in one of the buffers, `None` for an unknown
    /// field.
    fn field(&self, name: &str, buffer: RecordBuffer) -> Option<Value>;
}

/// Evaluates key and filter expressions.
pub trait Evaluator {
    /// Result type of `expression`, validated without a record.
    fn describe(&self, expression: &str) -> Result<ExprType, IndexError>;

    /// Evaluate `expression` against one of the record buffers.
    fn evaluate(
        &self,
        expression: &str,
        records: &dyn RecordSource,
        buffer: RecordBuffer,
    ) -> Result<Value, IndexError>;
}
