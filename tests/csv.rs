use std::env;
use std::fs;
use std::process;
use std::thread;

use chrono::{TimeZone, Utc};

use csvstream::{
    Reader, ReaderBuilder, Record, SharedReader, SharedWriter, Writer,
    WriterBuilder,
};

fn round_trip(fields: &[Option<&str>]) -> Vec<Option<String>> {
    let mut wtr = Writer::from_memory();
    wtr.write_record(fields.iter().cloned()).unwrap();
    let csv = wtr.into_string();

    let mut rdr = Reader::from_string(csv);
    let mut rec = Record::new();
    assert!(rdr.read_record(&mut rec).unwrap());
    let got: Vec<Option<String>> =
        rec.iter().map(|f| f.map(str::to_string)).collect();
    assert!(!rdr.read_record(&mut rec).unwrap());
    got
}

fn assert_round_trips(fields: &[Option<&str>]) {
    let expected: Vec<Option<String>> =
        fields.iter().map(|f| f.map(str::to_string)).collect();
    assert_eq!(round_trip(fields), expected, "fields: {:?}", fields);
}

#[test]
fn string_round_trips() {
    assert_round_trips(&[Some("a"), Some("b"), Some("c")]);
    assert_round_trips(&[Some("a,b"), Some("c")]);
    assert_round_trips(&[Some("say \"hi\""), Some("ok")]);
    assert_round_trips(&[Some("line\nbreak"), Some("ok")]);
    assert_round_trips(&[Some("\"\"\"")]);
    assert_round_trips(&[Some(",,,")]);
    assert_round_trips(&[Some("héllo, wörld"), Some("日本語")]);
}

#[test]
fn null_and_empty_round_trip() {
    assert_round_trips(&[Some("a"), None, Some("c")]);
    assert_round_trips(&[None, None]);
    assert_round_trips(&[Some(""), None]);
    assert_round_trips(&[Some("a"), Some(""), None, Some("")]);
}

#[test]
fn typed_round_trip() {
    let when = Utc.timestamp_millis_opt(1_500_000_000_123).unwrap();
    let blob = b"\x00\x01\x02binary\xff".to_vec();

    let mut wtr = Writer::from_memory();
    wtr.begin_record();
    wtr.write_field("tom").unwrap();
    wtr.write_field(42i32).unwrap();
    wtr.write_field(9_000_000_000i64).unwrap();
    wtr.write_field(1.25f64).unwrap();
    wtr.write_field(true).unwrap();
    wtr.write_field('x').unwrap();
    wtr.write_field(when).unwrap();
    wtr.write_field(&blob).unwrap();
    wtr.end_record().unwrap();

    let mut rdr = Reader::from_string(wtr.into_string());
    let mut rec = Record::new();
    assert!(rdr.read_record(&mut rec).unwrap());
    assert_eq!(rec.read_str(0).unwrap(), "tom");
    assert_eq!(rec.read_i32(1).unwrap(), 42);
    assert_eq!(rec.read_i64(2).unwrap(), 9_000_000_000);
    assert_eq!(rec.read_f64(3).unwrap(), 1.25);
    assert_eq!(rec.read_bool(4).unwrap(), true);
    assert_eq!(rec.read_char(5).unwrap(), 'x');
    assert_eq!(rec.read_timestamp(6).unwrap(), when);
    assert_eq!(rec.read_bytes(7).unwrap(), blob);
}

#[test]
fn null_typed_fields_use_defaults() {
    let mut wtr = Writer::from_memory();
    wtr.write_record(vec![None::<i64>, None]).unwrap();

    let mut rdr = Reader::from_string(wtr.into_string());
    let mut rec = Record::new();
    assert!(rdr.read_record(&mut rec).unwrap());
    assert_eq!(rec.read_i64_or(0, -1).unwrap(), -1);
    assert_eq!(rec.read_bool_or(1, true).unwrap(), true);
    assert_eq!(rec.read_i64_opt(0).unwrap(), None);
    assert!(rec.read_i64(0).is_err());
}

#[test]
fn comments_written_are_skipped_on_read() {
    let mut wtr = Writer::from_memory();
    wtr.write_comment("generated by a test\nsecond line").unwrap();
    wtr.write_record(vec!["a", "b"]).unwrap();
    wtr.write_comment("between records").unwrap();
    wtr.write_record(vec!["c"]).unwrap();
    let csv = wtr.into_string();
    assert!(csv.starts_with("#generated by a test\n#second line\n"));

    let got: Vec<Vec<Option<String>>> = Reader::from_string(csv)
        .records()
        .map(|r| {
            let rec = r.unwrap();
            rec.iter().map(|f| f.map(str::to_string)).collect()
        })
        .collect();
    assert_eq!(
        got,
        vec![
            vec![Some("a".to_string()), Some("b".to_string())],
            vec![Some("c".to_string())],
        ]
    );
}

#[test]
fn many_records_round_trip() {
    let mut wtr = Writer::from_memory();
    for i in 0..200i64 {
        wtr.write_record(vec![
            csvstream::Field::Int(i),
            csvstream::Field::Str("payload,with\nnasties\""),
        ])
        .unwrap();
    }

    let mut rdr = Reader::from_string(wtr.into_string());
    let mut rec = Record::new();
    let mut n = 0i64;
    while rdr.read_record(&mut rec).unwrap() {
        assert_eq!(rec.number(), n as u64);
        assert_eq!(rec.read_i64(0).unwrap(), n);
        assert_eq!(rec.read_str(1).unwrap(), "payload,with\nnasties\"");
        n += 1;
    }
    assert_eq!(n, 200);
}

#[test]
fn custom_characters_round_trip() {
    let mut builder = WriterBuilder::new();
    builder.delimiter(b'|').quote(b'\'').comment(b';');
    let mut wtr = builder.from_writer(Vec::new()).unwrap();
    wtr.write_comment("note").unwrap();
    wtr.write_record(vec![Some("a|b"), Some("c'd"), None]).unwrap();
    let csv = wtr.into_string();

    let mut builder = ReaderBuilder::new();
    builder.delimiter(b'|').quote(b'\'').comment(b';');
    let mut rdr =
        builder.from_reader(std::io::Cursor::new(csv.into_bytes())).unwrap();
    let mut rec = Record::new();
    assert!(rdr.read_record(&mut rec).unwrap());
    assert_eq!(rec.get(0), Some("a|b"));
    assert_eq!(rec.get(1), Some("c'd"));
    assert_eq!(rec.get(2), None);
}

#[test]
fn file_round_trip() {
    let path = env::temp_dir()
        .join(format!("csvstream-file-round-trip-{}.csv", process::id()));

    let mut wtr = WriterBuilder::new().from_path(&path).unwrap();
    wtr.write_record(vec![Some("a"), None, Some("b,c")]).unwrap();
    wtr.write_record(vec![Some("d")]).unwrap();
    wtr.flush().unwrap();
    drop(wtr);

    let mut rdr = ReaderBuilder::new().from_path(&path).unwrap();
    let mut rec = Record::new();
    assert!(rdr.read_record(&mut rec).unwrap());
    assert_eq!(rec.get(0), Some("a"));
    assert_eq!(rec.get(1), None);
    assert_eq!(rec.get(2), Some("b,c"));
    assert!(rdr.read_record(&mut rec).unwrap());
    assert_eq!(rec.get(0), Some("d"));
    assert!(!rdr.read_record(&mut rec).unwrap());

    let _ = fs::remove_file(&path);
}

#[test]
fn shared_writer_then_shared_reader() {
    let wtr = SharedWriter::new(Writer::from_writer(Vec::new()));
    let mut handles = Vec::new();
    for t in 0..4i64 {
        let wtr = wtr.clone();
        handles.push(thread::spawn(move || {
            for i in 0..25i64 {
                wtr.write_record(vec![t, i]).unwrap();
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(wtr.record_number(), 100);
}

#[test]
fn shared_reader_across_threads() {
    let mut csv = String::new();
    for i in 0..100 {
        csv.push_str(&format!("{},x\n", i));
    }
    let rdr = SharedReader::new(Reader::from_string(csv));

    let mut handles = Vec::new();
    for _ in 0..4 {
        let rdr = rdr.clone();
        handles.push(thread::spawn(move || {
            let mut seen = Vec::new();
            while let Some(rec) = rdr.read_next().unwrap() {
                seen.push(rec.read_i64(0).unwrap());
            }
            seen
        }));
    }
    let mut all: Vec<i64> = Vec::new();
    for h in handles {
        all.extend(h.join().unwrap());
    }
    all.sort();
    let expected: Vec<i64> = (0..100).collect();
    assert_eq!(all, expected);
}

#[test]
fn record_offset_views_compose_with_reading() {
    let mut wtr = Writer::from_memory();
    wtr.write_record(vec![Some("header"), Some("1"), Some("2")]).unwrap();
    let mut rdr = Reader::from_string(wtr.into_string());

    let rec = rdr.records().next().unwrap().unwrap();
    assert_eq!(rec.read_str(0).unwrap(), "header");
    let rest = rec.with_offset(1);
    assert_eq!(rest.len(), 2);
    assert_eq!(rest.read_i64(0).unwrap(), 1);
    assert_eq!(rest.read_i64(1).unwrap(), 2);
}
