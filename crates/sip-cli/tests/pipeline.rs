//! Integration tests for the pipeline stages behind `sip map` and `sip stats`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::anyhow;
use sip_cli::pipeline::{
    DocumentWriter, MapOutcome, compile_runner, gather_stats, load_rec_def_tree, load_rec_mapping,
    map_dump, open_dump, write_stats_to,
};
use sip_map::{MappingError, MappingResult, ParallelOptions};
use sip_model::{ParseError, ParseOptions, Path};
use sip_stats::{Stats, StatsOptions};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn path(text: &str) -> Path {
    Path::parse(text).unwrap()
}

fn harvest_options() -> ParseOptions {
    ParseOptions::default()
        .with_record_root(path("/harvest/record"))
        .with_unique_element(Some(path("/harvest/record/@id")))
}

fn map_harvest(workers: usize) -> (MapOutcome, Vec<MappingResult>) {
    let tree = load_rec_def_tree(&fixture("lido-record-definition.xml")).unwrap();
    let rec_mapping = load_rec_mapping(&fixture("lido-mapping.xml"), tree).unwrap();
    let runner = compile_runner(rec_mapping).unwrap();
    let input = open_dump(&fixture("harvest.xml")).unwrap();
    let parallel = ParallelOptions::default()
        .with_workers(workers)
        .with_input_capacity(2)
        .with_output_capacity(2);
    let mut documents = Vec::new();
    let outcome = map_dump(&runner, input, &harvest_options(), &parallel, |document| {
        documents.push(document.clone());
        Ok(())
    })
    .unwrap();
    (outcome, documents)
}

#[test]
fn map_collects_documents_failures_and_skips() {
    let (outcome, documents) = map_harvest(3);
    assert_eq!(outcome.records(), 5);
    assert_eq!(outcome.mapped, 3);
    assert!(outcome.has_failures());
    assert!(outcome.warnings.is_empty());

    let ids: Vec<&str> = documents
        .iter()
        .map(|document| document.record_id())
        .collect();
    assert_eq!(ids, vec!["r1", "r4", "r5"]);

    assert_eq!(outcome.failures.len(), 1);
    assert!(matches!(
        &outcome.failures[0],
        MappingError::InvalidNumber { record_id, value, .. } if record_id == "r2" && value == "large"
    ));

    assert_eq!(outcome.skipped.len(), 1);
    assert!(matches!(
        outcome.skipped[0],
        ParseError::MissingIdentifier { record_number: 3, .. }
    ));

    assert_eq!(outcome.missing_fields.len(), 1);
    assert_eq!(outcome.missing_fields[0].record_id, "r4");
    assert_eq!(
        outcome.missing_fields[0].missing,
        vec![path("/lido:lido/lido:title")]
    );
}

#[test]
fn documents_keep_input_order_whatever_the_worker_count() {
    for workers in [1, 4] {
        let (_, documents) = map_harvest(workers);
        let ids: Vec<&str> = documents
            .iter()
            .map(|document| document.record_id())
            .collect();
        assert_eq!(ids, vec!["r1", "r4", "r5"], "workers = {workers}");
    }
}

#[test]
fn written_documents_share_one_namespace_declaration() {
    let (_, documents) = map_harvest(2);
    let tree = load_rec_def_tree(&fixture("lido-record-definition.xml")).unwrap();
    let mut writer = DocumentWriter::new(Vec::new(), tree.namespaces()).unwrap();
    for document in &documents {
        writer.write(document).unwrap();
    }
    assert_eq!(writer.written(), 3);
    let text = String::from_utf8(writer.finish().unwrap()).unwrap();

    assert!(text.starts_with("<?xml"));
    assert!(text.contains(r#"<records xmlns:lido="http://www.lido-schema.org">"#));
    assert_eq!(text.matches("xmlns:lido").count(), 1);
    assert_eq!(text.matches("<lido:lido>").count(), 3);
    assert!(text.contains("<lido:measurement>12.5</lido:measurement>"));
    assert!(text.contains("<lido:name>Jan Steen</lido:name>"));
    let first = text.find("<lido:recID>r1</lido:recID>").unwrap();
    let last = text.find("<lido:recID>r5</lido:recID>").unwrap();
    assert!(first < last);
    assert!(text.trim_end().ends_with("</records>"));
}

#[test]
fn empty_output_is_a_single_empty_element() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("out.xml");
    DocumentWriter::create(&target, &[]).unwrap().finish().unwrap();
    let text = std::fs::read_to_string(&target).unwrap();
    insta::assert_snapshot!(text.trim_end(), @r#"
    <?xml version="1.0" encoding="UTF-8"?>
    <records/>
    "#);
}

#[test]
fn malformed_dump_aborts_the_run() {
    let tree = load_rec_def_tree(&fixture("lido-record-definition.xml")).unwrap();
    let rec_mapping = load_rec_mapping(&fixture("lido-mapping.xml"), Arc::clone(&tree)).unwrap();
    let runner = compile_runner(rec_mapping).unwrap();
    let dump = "<harvest><record id=\"r1\"><title>ok</title></record><record id=\"r2\"><title>";
    let result = map_dump(
        &runner,
        dump.as_bytes(),
        &harvest_options(),
        &ParallelOptions::default().with_workers(2),
        |_| Ok(()),
    );
    let err = result.unwrap_err();
    assert!(format!("{err:#}").contains("read metadata dump"));
}

#[test]
fn sink_error_stops_the_run() {
    let tree = load_rec_def_tree(&fixture("lido-record-definition.xml")).unwrap();
    let rec_mapping = load_rec_mapping(&fixture("lido-mapping.xml"), tree).unwrap();
    let runner = compile_runner(rec_mapping).unwrap();
    let dump: String = (0..200)
        .map(|n| format!("<record id=\"x{n}\"><title>T{n}</title></record>"))
        .collect();
    let dump = format!("<harvest>{dump}</harvest>");
    let parallel = ParallelOptions::default()
        .with_workers(2)
        .with_input_capacity(1)
        .with_output_capacity(1);
    let mut seen = 0;
    let result = map_dump(&runner, dump.as_bytes(), &harvest_options(), &parallel, |_| {
        seen += 1;
        Err(anyhow!("disk full"))
    });
    assert_eq!(seen, 1);
    assert!(result.unwrap_err().to_string().contains("disk full"));
}

#[test]
fn missing_files_name_the_path() {
    let err = load_rec_def_tree(&fixture("absent.xml")).unwrap_err();
    assert!(err.to_string().contains("absent.xml"));
}

#[test]
fn stats_profile_every_record_and_round_trip() {
    let options = ParseOptions::default().with_record_root(path("/harvest/record"));
    let input = open_dump(&fixture("harvest.xml")).unwrap();
    let outcome = gather_stats(input, &options, StatsOptions::default().with_sample_seed(Some(3)))
        .unwrap();
    assert!(outcome.unidentified.is_empty());

    let stats = &outcome.stats;
    assert_eq!(stats.records(), 5);
    let titles = stats.field(&path("/record/title")).unwrap();
    assert_eq!(titles.total(), 4);
    assert!(!titles.is_unique());
    assert_eq!(titles.values().count("De Nachtwacht"), 2);
    assert!(stats.field(&path("/record/@id")).unwrap().is_unique());

    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("stats.xml");
    write_stats_to(stats, &target).unwrap();
    let read = Stats::read(&std::fs::read_to_string(&target).unwrap()).unwrap();
    assert_eq!(&read, stats);
}

#[test]
fn stats_include_records_without_identifier() {
    let input = open_dump(&fixture("harvest.xml")).unwrap();
    let outcome = gather_stats(input, &harvest_options(), StatsOptions::default()).unwrap();
    assert_eq!(outcome.stats.records(), 5);
    assert!(matches!(
        outcome.unidentified.as_slice(),
        [ParseError::MissingIdentifier {
            record_number: 3,
            ..
        }]
    ));
    assert_eq!(outcome.stats.field(&path("/record/title")).unwrap().total(), 4);
}
