// tests/records.rs

use iterdag::errors::IterdagError;
use iterdag::record;
use iterdag::record::format::{format_record, parse_line, parse_records};
use iterdag::record::{Field, Key, Record};

#[test]
fn fields_are_typed_when_parsed() {
    let record = parse_line("7 0.25 node null 1e-3", 1).unwrap().unwrap();
    assert_eq!(
        record.fields(),
        &[
            Field::Long(7),
            Field::Double(0.25),
            Field::Text("node".to_string()),
            Field::Null,
            Field::Double(1e-3),
        ]
    );
}

#[test]
fn blank_and_comment_lines_are_skipped() {
    let records = parse_records("# vertex rank\n1 0.5\n\n   \n2 0.5\n").unwrap();
    assert_eq!(records, vec![record!(1i64, 0.5f64), record!(2i64, 0.5f64)]);
}

#[test]
fn formatted_records_parse_back() {
    let record = record!(3i64, 1.0f64, "x");
    let line = format_record(&record);
    assert_eq!(line, "3 1.0 x");
    assert_eq!(parse_line(&line, 1).unwrap(), Some(record));
}

#[test]
fn key_extraction_rejects_non_keys() {
    let record = Record::new(vec![Field::Long(1), Field::Double(0.5), Field::Null]);
    assert_eq!(record.key(0).unwrap(), Key::Long(1));
    for index in [1, 2, 3] {
        assert!(matches!(
            record.key(index),
            Err(IterdagError::MalformedRecord(_))
        ));
    }
    assert!(matches!(
        record!("a").double(0),
        Err(IterdagError::MalformedRecord(_))
    ));
    assert_eq!(record!(2i64).double(0).unwrap(), 2.0);
}
