//! Scenario tests that drive whole index files through the public
//! operations, in memory and on disk.

mod navigation;

use crate::key::Date;
use crate::record::Value;
use crate::simulation::{FixedTimeSource, MemoryStore};
use crate::testing::{FieldEvaluator, MemoryTable};
use crate::tree::Position;
use crate::{EngineConfig, Index, MdxIndex, NdxIndex, TagDefinition};

/// Fields every scenario draws from.
pub fn evaluator() -> FieldEvaluator {
    FieldEvaluator::new()
        .char_field("CODE", 3)
        .char_field("NAME", 10)
        .char_field("CITY", 8)
        .numeric_field("BALANCE")
        .date_field("HIRED")
        .logical_field("ACTIVE")
}

pub fn chars(s: &str) -> Value {
    Value::Char(s.as_bytes().to_vec())
}

pub fn date(y: i32, m: u8, d: u8) -> Date {
    Date::new(y, m, d).expect("valid date")
}

/// A table with one `CODE` column.
pub fn code_table(codes: &[&str]) -> MemoryTable {
    let mut table = MemoryTable::new();
    for code in codes {
        table.append(&[("CODE", chars(code))]);
    }
    table
}

pub fn ndx(definition: &TagDefinition, config: &EngineConfig) -> NdxIndex<MemoryStore> {
    NdxIndex::create_in(MemoryStore::new(7), "CODE", definition, &evaluator(), config)
        .expect("create single-tag index")
}

pub fn mdx(config: &EngineConfig) -> MdxIndex<MemoryStore> {
    MdxIndex::create_in(
        MemoryStore::new(11),
        "TEST",
        config,
        Box::new(FixedTimeSource::new(date(2024, 6, 1))),
    )
    .expect("create multi-tag index")
}

/// Every (key, record) of a tag, first to last.
pub fn walk<X: Index + ?Sized>(index: &mut X, tag: usize) -> Vec<(Vec<u8>, u32)> {
    let mut out = Vec::new();
    let mut position = index.first_key(tag).expect("first key");
    while let Position::At(record) = position {
        let key = crate::tree::current_key(index.tag(tag).expect("tag"))
            .expect("positioned on a key")
            .to_vec();
        out.push((key, record));
        position = index.next_key(tag).expect("next key");
    }
    out
}

/// Records of a tag, first to last.
pub fn records<X: Index + ?Sized>(index: &mut X, tag: usize) -> Vec<u32> {
    walk(index, tag).into_iter().map(|(_, r)| r).collect()
}

/// Index every row of `table` through record-level maintenance.
pub fn append_all<X: Index + ?Sized>(index: &mut X, table: &mut MemoryTable) {
    use crate::record::RecordSource;

    let eval = evaluator();
    let count = table.record_count().expect("count");
    for record in 1..=count {
        table.get_record(record).expect("record");
        index.append_record(&*table, &eval).expect("append record");
    }
}
