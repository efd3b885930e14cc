use std::sync::Arc;

use sip_map::{CompileError, CompileOptions, CompileWarning, MappingError, MappingRunner};
use sip_model::{
    Dictionary, MetadataRecord, Node, NodeMapping, Operator, Path, RecDefTree, RecMapping,
    SourceInput, Unmatched,
};

const DEFINITION: &str = include_str!("fixtures/lido-record-definition.xml");

fn tree() -> Arc<RecDefTree> {
    Arc::new(RecDefTree::read(DEFINITION.as_bytes()).unwrap())
}

fn path(text: &str) -> Path {
    Path::parse(text).unwrap()
}

fn record(id: &str, xml: &str) -> MetadataRecord {
    MetadataRecord::new(id, 1, Node::parse(xml).unwrap())
}

fn runner(mapping: RecMapping) -> MappingRunner {
    MappingRunner::new(Arc::new(mapping), &CompileOptions::default()).unwrap()
}

fn museum_mapping() -> RecMapping {
    let mut mapping = RecMapping::create(tree());
    mapping
        .add_node_mapping(
            &path("/lido:lido/lido:recID"),
            NodeMapping::new(path("/record/@id")),
        )
        .unwrap();
    mapping
        .add_node_mapping(
            &path("/lido:lido/lido:title"),
            NodeMapping::new(path("/record/title")).with_operator(Operator::First),
        )
        .unwrap();
    mapping
        .add_node_mapping(
            &path("/lido:lido/lido:title/@xml:lang"),
            NodeMapping::new(path("/record/title/@lang")).with_dictionary(
                Dictionary::new()
                    .with_entry("nl", "nld")
                    .with_entry("en", "eng")
                    .with_unmatched(Unmatched::Default("und".to_string())),
            ),
        )
        .unwrap();
    mapping
        .add_node_mapping(
            &path("/lido:lido/lido:actor/lido:name"),
            NodeMapping::new(path("/record/creator")).with_expression("${creator|trim}"),
        )
        .unwrap();
    mapping
        .add_node_mapping(
            &path("/lido:lido/lido:subject"),
            NodeMapping::new(path("/record/subject")).with_dictionary(
                Dictionary::new()
                    .with_entry("painting", "Painting")
                    .with_unmatched(Unmatched::Drop),
            ),
        )
        .unwrap();
    mapping
}

const MUSEUM_RECORD: &str = r#"<record id="r1">
  <title lang="nl">De Nachtwacht</title>
  <title lang="en">The Night Watch</title>
  <subject>painting</subject>
  <subject>sculpture</subject>
  <creator>Rembrandt</creator>
</record>"#;

#[test]
fn produces_direct_dictionary_and_first_mappings() {
    let result = runner(museum_mapping())
        .run(&record("r1", MUSEUM_RECORD))
        .unwrap();
    let xml = result.to_xml_string().unwrap();
    insta::assert_snapshot!(xml.trim_end(), @r#"
    <lido:lido xmlns:lido="http://www.lido-schema.org">
      <lido:recID>r1</lido:recID>
      <lido:title xml:lang="nld">De Nachtwacht</lido:title>
      <lido:actor>
        <lido:name>Rembrandt</lido:name>
      </lido:actor>
      <lido:subject>Painting</lido:subject>
    </lido:lido>
    "#);
    assert!(result.check_missing_fields().is_ok());
}

#[test]
fn field_views_follow_the_schema_flags() {
    let result = runner(museum_mapping())
        .run(&record("r1", MUSEUM_RECORD))
        .unwrap();

    let system = result.system_fields();
    assert_eq!(system["ID"], vec!["r1".to_string()]);
    assert_eq!(system["TITLE"], vec!["De Nachtwacht".to_string()]);

    let search = result.search_fields();
    assert_eq!(search["creator"], vec!["Rembrandt".to_string()]);
    assert_eq!(search.len(), 2);

    let fields = result.fields();
    assert_eq!(fields["lido_subject"], vec!["Painting".to_string()]);
    assert_eq!(fields["lido_name"], vec!["Rembrandt".to_string()]);
}

#[test]
fn sibling_targets_from_one_group_are_zipped() {
    let mut mapping = RecMapping::create(tree());
    mapping
        .add_node_mapping(
            &path("/lido:lido/lido:actor/lido:name"),
            NodeMapping::new(path("/record/creator/name")),
        )
        .unwrap();
    mapping
        .add_node_mapping(
            &path("/lido:lido/lido:actor/lido:role"),
            NodeMapping::new(path("/record/creator/role")),
        )
        .unwrap();
    let xml = r"<record>
  <creator><name>Rembrandt</name><role>painter</role></creator>
  <creator><name>Hals</name><role>etcher</role></creator>
  <creator><name>Vermeer</name></creator>
</record>";
    let result = runner(mapping).run(&record("z1", xml)).unwrap();

    let actors: Vec<(Option<&str>, Option<&str>)> = result
        .root()
        .children
        .iter()
        .map(|actor| {
            let text = |local: &str| {
                actor
                    .children
                    .iter()
                    .find(|child| child.tag.local_name() == local)
                    .and_then(Node::text)
            };
            (text("name"), text("role"))
        })
        .collect();
    assert_eq!(
        actors,
        vec![
            (Some("Rembrandt"), Some("painter")),
            (Some("Hals"), Some("etcher")),
            (Some("Vermeer"), None),
        ]
    );
}

#[test]
fn sibling_read_outside_the_group_does_not_collapse_the_loop() {
    let mut mapping = RecMapping::create(tree());
    mapping
        .add_node_mapping(
            &path("/lido:lido/lido:actor/lido:name"),
            NodeMapping::new(path("/record/creator/name")),
        )
        .unwrap();
    mapping
        .add_node_mapping(
            &path("/lido:lido/lido:actor/lido:role"),
            NodeMapping::new(path("/record/role")),
        )
        .unwrap();
    let xml = r"<record>
  <role>painter</role>
  <creator><name>Avercamp</name></creator>
  <creator><name>Bol</name></creator>
  <creator><name>Cuyp</name></creator>
</record>";
    let result = runner(mapping).run(&record("o1", xml)).unwrap();

    let actors: Vec<(Option<&str>, Option<&str>)> = result
        .root()
        .children
        .iter()
        .filter(|child| child.tag.local_name() == "actor")
        .map(|actor| {
            let text = |local: &str| {
                actor
                    .children
                    .iter()
                    .find(|child| child.tag.local_name() == local)
                    .and_then(Node::text)
            };
            (text("name"), text("role"))
        })
        .collect();
    assert_eq!(
        actors,
        vec![
            (Some("Avercamp"), Some("painter")),
            (Some("Bol"), Some("painter")),
            (Some("Cuyp"), Some("painter")),
        ]
    );
}

#[test]
fn missing_required_fields_are_listed_but_output_is_kept() {
    let mut mapping = RecMapping::create(tree());
    mapping
        .add_node_mapping(
            &path("/lido:lido/lido:title"),
            NodeMapping::new(path("/record/title")),
        )
        .unwrap();
    mapping
        .add_node_mapping(
            &path("/lido:lido/lido:actor/lido:role"),
            NodeMapping::new(path("/record/creator/role")),
        )
        .unwrap();
    let runner = runner(mapping);
    assert_eq!(
        runner.program().warnings(),
        &[
            CompileWarning::RequiredUnmapped {
                output: path("/lido:lido/lido:actor/lido:name"),
            },
            CompileWarning::RequiredUnmapped {
                output: path("/lido:lido/lido:recID"),
            },
        ]
    );

    let result = runner
        .run(&record(
            "m1",
            "<record><title>Untitled</title><creator><role>printer</role></creator></record>",
        ))
        .unwrap();
    assert!(result.to_xml_string().unwrap().contains("Untitled"));
    let err = result.check_missing_fields().unwrap_err();
    assert_eq!(err.record_id, "m1");
    assert_eq!(
        err.missing,
        vec![
            path("/lido:lido/lido:actor/lido:name"),
            path("/lido:lido/lido:recID"),
        ]
    );
}

#[test]
fn expressions_combine_inputs_facts_and_record_id() {
    let mut mapping = RecMapping::create(tree());
    mapping.set_fact("baseUrl", "http://example.org/object");
    mapping
        .add_node_mapping(
            &path("/lido:lido/lido:rights"),
            NodeMapping::new(path("/record/title"))
                .with_expression("${baseUrl}/${_id}?t=${title|lowercase}"),
        )
        .unwrap();
    mapping
        .add_node_mapping(
            &path("/lido:lido/lido:title"),
            NodeMapping::from_inputs(vec![
                SourceInput::new(path("/record/title")),
                SourceInput::new(path("/record/date")),
            ])
            .with_expression("${title} (${date|default(undated)})"),
        )
        .unwrap();
    let result = runner(mapping)
        .run(&record("obj 7", "<record><title>Night Watch</title></record>"))
        .unwrap();
    let fields = result.fields();
    assert_eq!(
        fields["lido_rights"],
        vec!["http://example.org/object/obj%207?t=night%20watch".to_string()]
    );
    assert_eq!(fields["lido_title"], vec!["Night Watch (undated)".to_string()]);
}

#[test]
fn multiple_inputs_without_expression_are_joined() {
    let mut mapping = RecMapping::create(tree());
    mapping
        .add_node_mapping(
            &path("/lido:lido/lido:title"),
            NodeMapping::from_inputs(vec![
                SourceInput::new(path("/record/first")),
                SourceInput::new(path("/record/last")),
            ]),
        )
        .unwrap();
    let result = runner(mapping)
        .run(&record(
            "j1",
            "<record><first>Jan</first><last>Steen</last></record>",
        ))
        .unwrap();
    assert_eq!(result.fields()["lido_title"], vec!["Jan Steen".to_string()]);
}

#[test]
fn record_failures_name_the_record() {
    let mut mapping = RecMapping::create(tree());
    mapping
        .add_node_mapping(
            &path("/lido:lido/lido:measurement"),
            NodeMapping::new(path("/record/size")),
        )
        .unwrap();
    mapping
        .add_node_mapping(
            &path("/lido:lido/lido:title"),
            NodeMapping::from_inputs(vec![
                SourceInput::new(path("/record/title")),
                SourceInput::new(path("/record/date")),
            ])
            .with_expression("${title}, ${date}"),
        )
        .unwrap();
    let runner = runner(mapping);

    let err = runner
        .run(&record("n1", "<record><size>large</size></record>"))
        .unwrap_err();
    assert!(matches!(err, MappingError::InvalidNumber { ref value, .. } if value == "large"));
    assert_eq!(err.record_id(), "n1");

    let err = runner
        .run(&record("d1", "<record><title>Sketch</title></record>"))
        .unwrap_err();
    assert!(matches!(err, MappingError::MissingValue { ref name, .. } if name == "date"));

    let err = runner
        .run(&record("x1", "<object><title>Sketch</title></object>"))
        .unwrap_err();
    assert!(matches!(err, MappingError::UnexpectedRoot { .. }));

    let ok = runner
        .run(&record("ok", "<record><size> 12.5 </size></record>"))
        .unwrap();
    assert_eq!(ok.fields()["lido_measurement"], vec!["12.5".to_string()]);
}

#[test]
fn unmapped_definition_still_yields_the_root() {
    let result = runner(RecMapping::create(tree()))
        .run(&record("e1", "<record/>"))
        .unwrap();
    assert!(result.root().is_empty());
    assert_eq!(result.root().tag.qualified_name(), "lido:lido");
}

fn compile_error(mapping: RecMapping, options: &CompileOptions) -> CompileError {
    MappingRunner::new(Arc::new(mapping), options).unwrap_err()
}

#[test]
fn structural_problems_fail_compilation() {
    let title = path("/lido:lido/lido:title");

    let mut mapping = RecMapping::create(tree());
    mapping
        .add_node_mapping(
            &title,
            NodeMapping::new(path("/record/title")).with_expression("${nope}"),
        )
        .unwrap();
    assert_eq!(
        compile_error(mapping, &CompileOptions::default()),
        CompileError::UnknownVariable {
            output: title.clone(),
            name: "nope".to_string(),
        }
    );

    let mut mapping = RecMapping::create(tree());
    mapping
        .add_node_mapping(&title, NodeMapping::from_inputs(Vec::new()))
        .unwrap();
    assert_eq!(
        compile_error(mapping, &CompileOptions::default()),
        CompileError::NoInputs {
            output: title.clone(),
        }
    );

    let mut mapping = RecMapping::create(tree());
    mapping
        .add_node_mapping(
            &title,
            NodeMapping::new(path("/record/title"))
                .with_dictionary(Dictionary::new().with_entry("a", "x").with_entry("a", "y")),
        )
        .unwrap();
    assert!(matches!(
        compile_error(mapping, &CompileOptions::default()),
        CompileError::DuplicateDictionaryKey { ref key, .. } if key == "a"
    ));

    let mut mapping = RecMapping::create(tree());
    mapping
        .add_node_mapping(&title, NodeMapping::new(path("/record/title")))
        .unwrap();
    mapping
        .add_node_mapping(
            &path("/lido:lido/lido:recID"),
            NodeMapping::new(path("/other/@id")),
        )
        .unwrap();
    assert!(matches!(
        compile_error(mapping, &CompileOptions::default()),
        CompileError::InconsistentSourceRoot { .. }
    ));
}

#[test]
fn known_source_paths_restrict_inputs() {
    let known = [path("/record/title"), path("/record/creator/name")]
        .into_iter()
        .collect();
    let options = CompileOptions::default().with_source_paths(Some(known));

    let mut mapping = RecMapping::create(tree());
    mapping
        .add_node_mapping(
            &path("/lido:lido/lido:actor"),
            NodeMapping::new(path("/record/creator")),
        )
        .unwrap();
    assert!(MappingRunner::new(Arc::new(mapping.clone()), &options).is_ok());

    mapping
        .add_node_mapping(
            &path("/lido:lido/lido:subject"),
            NodeMapping::new(path("/record/keyword")),
        )
        .unwrap();
    assert_eq!(
        compile_error(mapping, &options),
        CompileError::UnresolvedSource {
            output: path("/lido:lido/lido:subject"),
            path: path("/record/keyword"),
        }
    );
}

#[test]
fn unknown_field_types_fail_compilation() {
    let definition = r#"<record-definition prefix="ex" version="1">
  <root tag="ex:root">
    <elem tag="ex:when" field-type="date"/>
  </root>
</record-definition>"#;
    let tree = Arc::new(RecDefTree::read(definition.as_bytes()).unwrap());
    let mut mapping = RecMapping::create(tree);
    mapping
        .add_node_mapping(&path("/ex:root/ex:when"), NodeMapping::new(path("/r/when")))
        .unwrap();
    assert_eq!(
        compile_error(mapping, &CompileOptions::default()),
        CompileError::UnknownFieldType {
            output: path("/ex:root/ex:when"),
            field_type: "date".to_string(),
        }
    );
}
