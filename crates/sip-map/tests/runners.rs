use std::collections::BTreeSet;
use std::sync::Arc;

use sip_map::{
    BulkMappingRunner, CompileOptions, MappingRunner, ParallelError, ParallelMappingRunner,
    ParallelOptions, SingleJobResult,
};
use sip_model::{MetadataRecord, Node, NodeMapping, Path, RecDefTree, RecMapping};

const DEFINITION: &str = include_str!("fixtures/lido-record-definition.xml");

fn path(text: &str) -> Path {
    Path::parse(text).unwrap()
}

fn measurement_runner() -> MappingRunner {
    let tree = Arc::new(RecDefTree::read(DEFINITION.as_bytes()).unwrap());
    let mut mapping = RecMapping::create(tree);
    mapping
        .add_node_mapping(
            &path("/lido:lido/lido:recID"),
            NodeMapping::new(path("/record/@id")),
        )
        .unwrap();
    mapping
        .add_node_mapping(
            &path("/lido:lido/lido:measurement"),
            NodeMapping::new(path("/record/size")),
        )
        .unwrap();
    MappingRunner::new(Arc::new(mapping), &CompileOptions::default()).unwrap()
}

/// Every seventh record carries a size that is not a number.
fn records(count: usize) -> Vec<MetadataRecord> {
    (1..=count)
        .map(|number| {
            let size = if number % 7 == 0 {
                "unknown".to_string()
            } else {
                number.to_string()
            };
            let xml = format!(r#"<record id="r{number}"><size>{size}</size></record>"#);
            MetadataRecord::new(format!("r{number}"), number, Node::parse(&xml).unwrap())
        })
        .collect()
}

#[test]
fn bulk_run_collects_failures_and_continues() {
    let outcome = BulkMappingRunner::new(measurement_runner()).run(records(20));
    assert_eq!(outcome.total(), 20);
    assert_eq!(outcome.successes.len(), 18);
    let failed: Vec<&str> = outcome.failures.iter().map(|err| err.record_id()).collect();
    assert_eq!(failed, vec!["r7", "r14"]);
}

#[test]
fn parallel_run_maps_every_record_exactly_once() {
    for count in [0, 1, 100] {
        let options = ParallelOptions::default()
            .with_workers(4)
            .with_input_capacity(8)
            .with_output_capacity(8);
        let results = ParallelMappingRunner::run_all(&measurement_runner(), records(count), &options);
        assert_eq!(results.len(), count, "result count for {count} records");

        let ids: BTreeSet<String> = results
            .iter()
            .map(|result| result.record_id().to_string())
            .collect();
        assert_eq!(ids.len(), count);

        let failures = results.iter().filter(|result| !result.is_success()).count();
        assert_eq!(failures, count / 7);
    }
}

#[test]
fn parallel_results_match_sequential_ones() {
    let runner = measurement_runner();
    let options = ParallelOptions::default().with_workers(3);
    let parallel = ParallelMappingRunner::run_all(&runner, records(30), &options);
    for result in parallel {
        let SingleJobResult::Success(result) = result else {
            continue;
        };
        let number: usize = result.record_id()[1..].parse().unwrap();
        let expected = runner
            .run(&records(number).pop().unwrap())
            .unwrap()
            .to_xml_string()
            .unwrap();
        assert_eq!(result.to_xml_string().unwrap(), expected);
    }
}

#[test]
fn manual_submission_ends_after_every_pill() {
    let mut run = ParallelMappingRunner::start(
        &measurement_runner(),
        &ParallelOptions::default().with_workers(2),
    );
    assert_eq!(run.workers(), 2);
    for record in records(5) {
        run.submit(record).unwrap();
    }
    run.finish();
    assert_eq!(
        run.submit(records(1).remove(0)).unwrap_err(),
        ParallelError::Closed
    );

    let mut seen = 0;
    while let Some(result) = run.next_result() {
        assert!(result.is_success());
        seen += 1;
    }
    assert_eq!(seen, 5);
    assert!(run.next_result().is_none());
}

#[test]
fn zero_workers_still_starts_one() {
    let results = ParallelMappingRunner::run_all(
        &measurement_runner(),
        records(3),
        &ParallelOptions::default().with_workers(0),
    );
    assert_eq!(results.len(), 3);
}
