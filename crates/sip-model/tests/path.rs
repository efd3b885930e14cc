use proptest::prelude::*;
use sip_model::{Path, Tag};

fn tag_strategy() -> impl Strategy<Value = Tag> {
    (proptest::option::of("[a-z]{1,3}"), "[a-zA-Z][a-zA-Z0-9_.-]{0,6}")
        .prop_map(|(prefix, local)| Tag::element(prefix.as_deref(), &local).unwrap())
}

fn path_strategy() -> impl Strategy<Value = Path> {
    (
        proptest::collection::vec(tag_strategy(), 0..6),
        proptest::option::of("[a-z]{1,6}"),
    )
        .prop_map(|(mut tags, attribute)| {
            if let Some(name) = attribute {
                tags.push(Tag::attribute(None, &name).unwrap());
            }
            Path::from_tags(tags).unwrap()
        })
}

proptest! {
    #[test]
    fn text_form_parses_back(path in path_strategy()) {
        let text = path.to_string();
        prop_assert_eq!(Path::parse(&text).unwrap(), path);
    }

    #[test]
    fn prefix_and_suffix_rebuild_the_path(path in path_strategy(), cut in 0usize..8) {
        let count = cut.min(path.size());
        let prefix = path.take_first(count).unwrap();
        prop_assert!(prefix.is_ancestor_or_self_of(&path));
        let suffix = path.extend_ancestor(&prefix).unwrap();
        prop_assert_eq!(suffix.size(), path.size() - count);
        prop_assert_eq!(prefix.concat(&suffix).unwrap(), path);
    }

    #[test]
    fn common_prefix_is_shared_ancestor(a in path_strategy(), b in path_strategy()) {
        let shared = a.common_prefix(&b);
        prop_assert!(shared.is_ancestor_or_self_of(&a));
        prop_assert!(shared.is_ancestor_or_self_of(&b));
        prop_assert_eq!(shared.clone(), b.common_prefix(&a));
    }

    #[test]
    fn ordering_puts_ancestors_first(path in path_strategy()) {
        if let Some(parent) = path.parent() {
            prop_assert!(parent < path);
            prop_assert!(parent.is_ancestor_of(&path));
        }
    }
}

#[test]
fn take_first_beyond_size_fails() {
    let path = Path::parse("/a/b").unwrap();
    assert!(path.take_first(3).is_err());
    assert_eq!(path.take_first(0).unwrap(), Path::empty());
}

#[test]
fn serde_uses_text_form() {
    let path = Path::parse("/lido:lido/lido:title/@xml:lang").unwrap();
    let json = serde_json::to_string(&path).unwrap();
    assert_eq!(json, "\"/lido:lido/lido:title/@xml:lang\"");
    let back: Path = serde_json::from_str(&json).unwrap();
    assert_eq!(back, path);
}
