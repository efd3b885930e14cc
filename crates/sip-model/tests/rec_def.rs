use sip_model::{Path, RecDef, RecDefTree};

const DEFINITION: &str = include_str!("fixtures/lido-record-definition.xml");

#[test]
fn fixture_definition_indexes_every_node() {
    let tree = RecDefTree::read(DEFINITION.as_bytes()).unwrap();
    assert_eq!(tree.len(), 11);
    assert_eq!(tree.prefix(), "lido");
    assert_eq!(tree.namespaces()[0].uri, "http://www.lido-schema.org");

    let lang = tree
        .get_rec_def_node(&Path::parse("/lido:lido/lido:title/@xml:lang").unwrap())
        .unwrap();
    assert!(lang.is_attribute());
    assert_eq!(lang.field_name, "xml_lang");

    let rights = tree
        .get_rec_def_node(&Path::parse("/lido:lido/lido:rights").unwrap())
        .unwrap();
    let field_type = rights.field_type.as_deref().unwrap();
    assert_eq!(tree.resolve_field_type(field_type), Some("link"));
}

#[test]
fn required_nodes_are_listed_in_path_order() {
    let tree = RecDefTree::read(DEFINITION.as_bytes()).unwrap();
    let required: Vec<String> = tree
        .required_nodes()
        .iter()
        .map(|node| node.path().to_string())
        .collect();
    assert_eq!(
        required,
        vec![
            "/lido:lido/lido:actor/lido:name",
            "/lido:lido/lido:recID",
            "/lido:lido/lido:title",
        ]
    );
}

#[test]
fn definition_survives_a_write_and_read() {
    let def = RecDef::read(DEFINITION.as_bytes()).unwrap();
    let written = def.to_xml_string().unwrap();
    assert_eq!(RecDef::read(written.as_bytes()).unwrap(), def);
}
