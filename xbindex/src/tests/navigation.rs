use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{append_all, code_table, evaluator, mdx, ndx, records, walk};
use crate::record::RecordSource;
use crate::simulation::FaultConfig;
use crate::{EngineConfig, FindOutcome, Index, Position, TagDefinition};

fn code(n: u32) -> String {
    format!("{n:03}")
}

/// Walk a tag from last to first.
fn walk_back<X: Index + ?Sized>(index: &mut X, tag: usize) -> Vec<(Vec<u8>, u32)> {
    let mut out = Vec::new();
    let mut position = index.last_key(tag).expect("last key");
    while let Position::At(record) = position {
        let key = crate::tree::current_key(index.tag(tag).expect("tag"))
            .expect("positioned on a key")
            .to_vec();
        out.push((key, record));
        position = index.prev_key(tag).expect("prev key");
    }
    out
}

#[test]
fn test_duplicates_walk_in_record_order() {
    let mut rng = StdRng::seed_from_u64(21);
    let codes: Vec<String> = (0..600).map(|_| code(rng.random_range(0..25))).collect();
    let refs: Vec<&str> = codes.iter().map(String::as_str).collect();

    let mut index = ndx(&TagDefinition::new("CODE", "CODE"), &EngineConfig::default());
    let mut table = code_table(&refs);
    append_all(&mut index, &mut table);

    let mut expected: Vec<(Vec<u8>, u32)> = (1..)
        .zip(&codes)
        .map(|(record, code)| (code.as_bytes().to_vec(), record))
        .collect();
    expected.sort();
    assert_eq!(walk(&mut index, 0), expected);

    expected.reverse();
    assert_eq!(walk_back(&mut index, 0), expected);
    assert_eq!(index.verify_order(0).expect("order"), 600);
}

#[test]
fn test_find_lands_on_first_duplicate() {
    let mut index = ndx(&TagDefinition::new("CODE", "CODE"), &EngineConfig::default());
    let mut table = code_table(&["200", "100", "200", "300", "200"]);
    append_all(&mut index, &mut table);

    assert_eq!(index.find_key_bytes(0, b"200").expect("find"), FindOutcome::Found(1));
    assert_eq!(index.next_key(0).expect("next"), Position::At(3));
    assert_eq!(index.next_key(0).expect("next"), Position::At(5));
    assert_eq!(index.next_key(0).expect("next"), Position::At(4));
    assert!(index.locate(0, b"200", 5).expect("locate"));
    assert_eq!(index.prev_key(0).expect("prev"), Position::At(3));
    assert!(!index.locate(0, b"200", 4).expect("locate missing"));
}

#[test]
fn test_moves_past_either_end_keep_position() {
    let mut index = ndx(&TagDefinition::new("CODE", "CODE"), &EngineConfig::default());
    assert_eq!(index.next_key(0).expect("next"), Position::Empty);
    assert_eq!(index.prev_key(0).expect("prev"), Position::Empty);
    assert_eq!(index.find_key_bytes(0, b"100").expect("find"), FindOutcome::Empty);

    let mut table = code_table(&["100", "200"]);
    append_all(&mut index, &mut table);

    assert_eq!(index.first_key(0).expect("first"), Position::At(1));
    assert_eq!(index.prev_key(0).expect("prev"), Position::Bof);
    assert_eq!(index.current_record(0).expect("record"), Some(1));
    assert_eq!(index.next_key(0).expect("next"), Position::At(2));
    assert_eq!(index.next_key(0).expect("next"), Position::Eof);
    assert_eq!(index.current_record(0).expect("record"), Some(2));
    assert_eq!(index.prev_key(0).expect("prev"), Position::At(1));
}

#[test]
fn test_next_without_position_starts_at_first_key() {
    let mut index = ndx(&TagDefinition::new("CODE", "CODE"), &EngineConfig::default());
    let mut table = code_table(&["300", "100", "200"]);
    append_all(&mut index, &mut table);

    assert_eq!(index.next_key(0).expect("next"), Position::At(2));
    index.add_key(0, b"050", 4).expect("add");
    assert_eq!(index.prev_key(0).expect("prev"), Position::At(1));
}

#[test]
fn test_outside_change_repositions_walk() {
    let mut index = mdx(&EngineConfig::default().with_mdx_block_size(512));
    index
        .create_tag(&TagDefinition::new("CODE", "CODE"), &evaluator())
        .expect("create tag");
    let codes: Vec<String> = (1..=200).map(code).collect();
    let refs: Vec<&str> = codes.iter().map(String::as_str).collect();
    let mut table = code_table(&refs);
    append_all(&mut index, &mut table);

    assert_eq!(index.find_key_bytes(0, b"057").expect("find"), FindOutcome::Found(57));
    index.store_mut().touch();
    assert_eq!(index.next_key(0).expect("next"), Position::At(58));
    index.store_mut().touch();
    assert_eq!(index.prev_key(0).expect("prev"), Position::At(57));
    assert_eq!(index.prev_key(0).expect("prev"), Position::At(56));
}

#[test]
fn test_walk_survives_writes_to_another_tag() {
    let mut index = mdx(&EngineConfig::default().with_mdx_block_size(512));
    let eval = evaluator();
    index
        .create_tag(&TagDefinition::new("CODE", "CODE"), &eval)
        .expect("create tag");
    index
        .create_tag(&TagDefinition::new("OTHER", "CODE"), &eval)
        .expect("create tag");
    let codes: Vec<String> = (1..=120).map(|n| code(n * 2)).collect();
    let refs: Vec<&str> = codes.iter().map(String::as_str).collect();
    let mut table = code_table(&refs);
    append_all(&mut index, &mut table);

    let mut seen = Vec::new();
    let mut position = index.first_key(0).expect("first");
    let mut extra = 1000;
    while let Position::At(record) = position {
        seen.push(record);
        index.add_key(1, b"001", extra).expect("add to other tag");
        extra += 1;
        position = index.next_key(0).expect("next");
    }
    assert_eq!(seen, (1..=120).collect::<Vec<_>>());
    assert_eq!(records(&mut index, 1).len(), 240);
}

#[test]
fn test_deleting_current_entry_moves_to_neighbours() {
    let mut index = ndx(&TagDefinition::new("CODE", "CODE"), &EngineConfig::default());
    let codes: Vec<String> = (1..=100).map(code).collect();
    let refs: Vec<&str> = codes.iter().map(String::as_str).collect();
    let mut table = code_table(&refs);
    append_all(&mut index, &mut table);

    assert_eq!(index.find_key_bytes(0, b"050").expect("find"), FindOutcome::Found(50));
    assert!(index.delete_key(0, b"050", 50).expect("delete"));
    assert_eq!(index.next_key(0).expect("next"), Position::At(51));

    assert_eq!(index.find_key_bytes(0, b"060").expect("find"), FindOutcome::Found(60));
    assert!(index.delete_key(0, b"060", 60).expect("delete"));
    assert_eq!(index.prev_key(0).expect("prev"), Position::At(59));

    assert_eq!(index.find_key_bytes(0, b"070").expect("find"), FindOutcome::Found(70));
    assert!(index.delete_key(0, b"020", 20).expect("delete elsewhere"));
    assert_eq!(index.next_key(0).expect("next"), Position::At(71));
    assert_eq!(index.verify_order(0).expect("order"), 97);
}

#[test]
fn test_position_past_end_survives_a_delete() {
    let mut index = ndx(&TagDefinition::new("CODE", "CODE"), &EngineConfig::default());
    let codes: Vec<String> = (1..=100).map(code).collect();
    let refs: Vec<&str> = codes.iter().map(String::as_str).collect();
    let mut table = code_table(&refs);
    append_all(&mut index, &mut table);

    assert_eq!(index.find_key_bytes(0, b"999").expect("find"), FindOutcome::Eof);
    assert_eq!(index.next_key(0).expect("next"), Position::Eof);
    assert!(index.delete_key(0, b"003", 3).expect("delete"));
    assert_eq!(index.next_key(0).expect("next"), Position::Eof);
    assert_eq!(index.prev_key(0).expect("prev"), Position::At(100));
    assert_eq!(index.prev_key(0).expect("prev"), Position::At(99));
}

#[test]
fn test_retrieve_loads_the_record_under_the_cursor() {
    let mut index = ndx(&TagDefinition::new("CODE", "CODE"), &EngineConfig::default());
    let mut table = code_table(&["300", "100", "200"]);
    append_all(&mut index, &mut table);

    let found = index.find_key_bytes(0, b"200").expect("find");
    assert_eq!(found.retrieve(&mut table).expect("retrieve"), FindOutcome::Found(3));
    assert_eq!(table.current_record_number(), 3);

    let moved = index.next_key(0).expect("next");
    assert_eq!(moved.retrieve(&mut table).expect("retrieve"), Position::At(1));
    assert_eq!(table.current_record_number(), 1);

    let missing = index.find_key_bytes(0, b"150").expect("find");
    assert_eq!(missing.retrieve(&mut table).expect("retrieve"), FindOutcome::NotFound(3));
    assert_eq!(table.current_record_number(), 3);

    // Moves that land on no key leave the record alone.
    assert_eq!(index.last_key(0).expect("last"), Position::At(1));
    table.get_record(2).expect("record");
    let past = index.next_key(0).expect("next");
    assert_eq!(past.retrieve(&mut table).expect("retrieve"), Position::Eof);
    assert_eq!(table.current_record_number(), 2);
}

#[test]
fn test_deleting_leaf_maximum_keeps_lookups_right() {
    let mut index = ndx(&TagDefinition::new("CODE", "CODE"), &EngineConfig::default());
    let codes: Vec<String> = (1..=43).map(|n| code(n * 2)).collect();
    let refs: Vec<&str> = codes.iter().map(String::as_str).collect();
    let mut table = code_table(&refs);
    append_all(&mut index, &mut table);

    // "044" is the separator describing the left leaf.
    assert!(index.delete_key(0, b"044", 22).expect("delete"));
    assert_eq!(index.find_key_bytes(0, b"043").expect("find"), FindOutcome::NotFound(23));
    assert_eq!(index.find_key_bytes(0, b"042").expect("find"), FindOutcome::Found(21));
    assert_eq!(index.find_key_bytes(0, b"046").expect("find"), FindOutcome::Found(23));
    index.add_key(0, b"044", 22).expect("add back");
    assert_eq!(index.find_key_bytes(0, b"044").expect("find"), FindOutcome::Found(22));
    assert_eq!(index.verify_order(0).expect("order"), 43);
}

#[test]
fn test_failed_writes_surface_as_storage_errors() {
    let mut index = mdx(&EngineConfig::default());
    index
        .create_tag(&TagDefinition::new("CODE", "CODE"), &evaluator())
        .expect("create tag");
    let codes: Vec<String> = (1..=50).map(|n| code(n * 2)).collect();
    let refs: Vec<&str> = codes.iter().map(String::as_str).collect();
    let mut table = code_table(&refs);
    append_all(&mut index, &mut table);

    index.store_mut().set_fault_config(FaultConfig {
        write_error_rate: 1.0,
        ..FaultConfig::default()
    });
    let err = index.add_key(0, b"051", 51).expect_err("write fails");
    assert!(err.is_storage(), "{err}");
    assert!(index.tag(0).expect("tag").chain.is_empty());

    index.store_mut().set_fault_config(FaultConfig {
        read_error_rate: 1.0,
        ..FaultConfig::default()
    });
    let err = index.first_key(0).expect_err("read fails");
    assert!(err.is_storage(), "{err}");

    index.store_mut().set_fault_config(FaultConfig::no_faults());
    assert_eq!(index.verify_order(0).expect("order"), 50);
    assert_eq!(index.find_key_bytes(0, b"051").expect("find"), FindOutcome::NotFound(26));
}
