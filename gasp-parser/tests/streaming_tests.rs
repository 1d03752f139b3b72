//! End-to-end scenarios for the streaming parser.

use gasp_parser::{DescriptorRegistry, Parser, ParserConfig, TypeDescriptor, Value};

fn person_descriptor() -> TypeDescriptor {
    TypeDescriptor::class(
        "Person",
        vec![
            ("name", TypeDescriptor::string()),
            ("age", TypeDescriptor::int()),
            ("hobbies", TypeDescriptor::list(TypeDescriptor::string())),
        ],
    )
    .expect("person descriptor")
}

#[test]
fn person_record_with_list_field() {
    let mut parser = Parser::new(person_descriptor()).expect("parser");
    let partial = parser
        .feed(
            "<Person><name>Alice</name><age>30</age>\
             <hobbies><item>coding</item><item>hiking</item></hobbies></Person>",
        )
        .expect("feed");

    assert!(parser.is_complete());
    let value = parser.validate().expect("complete person");
    assert_eq!(partial, Some(value.clone()));

    let person = value.as_object().expect("object");
    assert_eq!(person.class_name, "Person");
    assert_eq!(person.fields.get("name"), Some(&Value::Str("Alice".into())));
    assert_eq!(person.fields.get("age"), Some(&Value::Int(30)));
    assert_eq!(
        person.fields.get("hobbies"),
        Some(&Value::List(vec![
            Value::Str("coding".into()),
            Value::Str("hiking".into()),
        ]))
    );
}

#[test]
fn union_alias_dispatches_by_alternative_tag() {
    let response_type = || {
        TypeDescriptor::union_alias(
            "ResponseType",
            vec![
                TypeDescriptor::class("Success", vec![("data", TypeDescriptor::string())])
                    .expect("success"),
                TypeDescriptor::class("Error", vec![("message", TypeDescriptor::string())])
                    .expect("error"),
            ],
        )
        .expect("response type")
    };

    let mut parser = Parser::new(response_type()).expect("parser");
    parser
        .feed("<Success><data>ok</data></Success>")
        .expect("feed");
    let value = parser.validate().expect("success variant");
    let obj = value.as_object().expect("object");
    assert_eq!(obj.class_name, "Success");
    assert_eq!(obj.fields.get("data"), Some(&Value::Str("ok".into())));

    let mut parser = Parser::new(response_type()).expect("parser");
    parser
        .feed("<Error><message>nope</message></Error>")
        .expect("feed");
    let value = parser.validate().expect("error variant");
    let obj = value.as_object().expect("object");
    assert_eq!(obj.class_name, "Error");
    assert_eq!(obj.fields.get("message"), Some(&Value::Str("nope".into())));
}

#[test]
fn dict_entries_capture_keys() {
    let config = TypeDescriptor::class(
        "Config",
        vec![(
            "settings",
            TypeDescriptor::dict(TypeDescriptor::string(), TypeDescriptor::string()),
        )],
    )
    .expect("config descriptor");

    let mut parser = Parser::new(config).expect("parser");
    parser
        .feed(
            "<Config><settings>\
             <item key=\"theme\">dark</item><item key=\"font\">14</item>\
             </settings></Config>",
        )
        .expect("feed");

    let value = parser.validate().expect("config");
    let settings = value
        .as_object()
        .and_then(|o| o.fields.get("settings"))
        .and_then(Value::as_dict)
        .expect("settings dict");
    assert_eq!(
        settings,
        &[
            ("theme".to_string(), Value::Str("dark".into())),
            ("font".to_string(), Value::Str("14".into())),
        ]
    );
}

#[test]
fn streaming_chunks_refine_the_partial() {
    let mut parser = Parser::new(person_descriptor()).expect("parser");

    let partial = parser.feed("<Person><name>Ali").expect("chunk 1");
    let person = partial.expect("root opened");
    let person = person.as_object().expect("object");
    assert_eq!(person.fields.get("name"), Some(&Value::Str("Ali".into())));
    assert!(person.fields.get("age").is_none());
    assert!(!parser.is_complete());

    let partial = parser.feed("ce</name><age>3").expect("chunk 2");
    let person = partial.expect("partial");
    let person = person.as_object().expect("object");
    assert_eq!(person.fields.get("name"), Some(&Value::Str("Alice".into())));
    assert_eq!(person.fields.get("age"), Some(&Value::Int(3)));

    parser.feed("0</age></Person>").expect("chunk 3");
    assert!(parser.is_complete());
    let value = parser.get_partial().expect("final");
    let person = value.as_object().expect("object");
    assert_eq!(person.fields.get("name"), Some(&Value::Str("Alice".into())));
    assert_eq!(person.fields.get("age"), Some(&Value::Int(30)));
}

#[test]
fn ignored_regions_produce_no_events() {
    let mut parser = Parser::new(person_descriptor()).expect("parser");
    parser
        .feed("<think>planning the answer…</think><Person><name>Bob</name></Person>")
        .expect("feed");
    assert!(parser.is_complete());
    let person = parser.get_partial().expect("person");
    let person = person.as_object().expect("object");
    assert_eq!(person.fields.get("name"), Some(&Value::Str("Bob".into())));
}

#[test]
fn homogeneous_tuple_root() {
    let mut parser =
        Parser::new(TypeDescriptor::variadic_tuple(TypeDescriptor::int())).expect("parser");
    parser
        .feed("<t><item>1</item><item>2</item><item>3</item></t>")
        .expect("feed");
    assert!(parser.is_complete());
    assert_eq!(
        parser.get_partial(),
        Some(Value::Tuple(vec![
            Value::Int(1),
            Value::Int(2),
            Value::Int(3)
        ]))
    );
}

#[test]
fn fixed_tuple_types_items_positionally() {
    let desc = TypeDescriptor::tuple(vec![
        TypeDescriptor::int(),
        TypeDescriptor::string(),
        TypeDescriptor::bool(),
    ])
    .expect("tuple descriptor");
    let mut parser = Parser::new(desc).expect("parser");
    parser
        .feed("<t><item>7</item><item>seven</item><item>yes</item></t>")
        .expect("feed");
    assert_eq!(
        parser.get_partial(),
        Some(Value::Tuple(vec![
            Value::Int(7),
            Value::Str("seven".into()),
            Value::Bool(true)
        ]))
    );
}

#[test]
fn empty_record_forms_are_equivalent() {
    let desc = || TypeDescriptor::class("R", vec![]).expect("empty class");

    let mut parser = Parser::new(desc()).expect("parser");
    parser.feed("<R/>").expect("feed");
    assert!(parser.is_complete());
    let self_closing = parser.validate().expect("empty record");

    let mut parser = Parser::new(desc()).expect("parser");
    parser.feed("<R></R>").expect("feed");
    assert!(parser.is_complete());
    let paired = parser.validate().expect("empty record");

    assert_eq!(self_closing, paired);
    assert_eq!(self_closing.as_object().expect("object").fields.len(), 0);
}

#[test]
fn set_deduplicates_by_structural_equality() {
    let desc = TypeDescriptor::class(
        "Tags",
        vec![("tags", TypeDescriptor::set(TypeDescriptor::string()))],
    )
    .expect("tags descriptor");
    let mut parser = Parser::new(desc).expect("parser");
    parser
        .feed("<Tags><tags><item>a</item><item>b</item><item>a</item></tags></Tags>")
        .expect("feed");
    let value = parser.validate().expect("tags");
    assert_eq!(
        value.as_object().and_then(|o| o.fields.get("tags")),
        Some(&Value::Set(vec![
            Value::Str("a".into()),
            Value::Str("b".into())
        ]))
    );
}

#[test]
fn optional_field_resolves_to_null_when_absent() {
    let desc = TypeDescriptor::class(
        "Profile",
        vec![
            ("name", TypeDescriptor::string()),
            ("nickname", TypeDescriptor::optional(TypeDescriptor::string())),
        ],
    )
    .expect("profile descriptor");
    let mut parser = Parser::new(desc).expect("parser");
    parser
        .feed("<Profile><name>Ada</name></Profile>")
        .expect("feed");
    let value = parser.validate().expect("profile");
    let profile = value.as_object().expect("object");
    assert_eq!(profile.fields.get("nickname"), Some(&Value::Null));
}

#[test]
fn entities_decode_in_strings_and_attributes() {
    let desc = TypeDescriptor::class(
        "Note",
        vec![
            ("body", TypeDescriptor::string()),
            (
                "meta",
                TypeDescriptor::dict(TypeDescriptor::string(), TypeDescriptor::string()),
            ),
        ],
    )
    .expect("note descriptor");
    let mut parser = Parser::new(desc).expect("parser");
    parser
        .feed(
            "<Note><body>a &lt;b&gt; &amp; c</body>\
             <meta><item key=\"q&quot;uote\">v</item></meta></Note>",
        )
        .expect("feed");
    let value = parser.validate().expect("note");
    let note = value.as_object().expect("object");
    assert_eq!(note.fields.get("body"), Some(&Value::Str("a <b> & c".into())));
    assert_eq!(
        note.fields.get("meta").and_then(Value::as_dict),
        Some(&[("q\"uote".to_string(), Value::Str("v".into()))][..])
    );
}

#[test]
fn recursive_types_resolve_through_the_registry() {
    let mut registry = DescriptorRegistry::new();
    registry
        .register(
            TypeDescriptor::class(
                "Node",
                vec![
                    ("label", TypeDescriptor::string()),
                    (
                        "children",
                        TypeDescriptor::list(TypeDescriptor::reference("Node").expect("ref")),
                    ),
                ],
            )
            .expect("node descriptor"),
        )
        .expect("register");

    let root = TypeDescriptor::reference("Node").expect("root ref");
    let mut parser =
        Parser::with_registry(root, ParserConfig::default(), registry).expect("parser");
    parser
        .feed(
            "<Node><label>root</label><children>\
             <item><label>left</label><children></children></item>\
             <Node><label>right</label><children></children></Node>\
             </children></Node>",
        )
        .expect("feed");

    let value = parser.validate().expect("tree");
    let node = value.as_object().expect("object");
    assert_eq!(node.fields.get("label"), Some(&Value::Str("root".into())));
    let children = node
        .fields
        .get("children")
        .and_then(Value::as_items)
        .expect("children");
    assert_eq!(children.len(), 2);
    assert_eq!(
        children[0].as_object().and_then(|o| o.fields.get("label")),
        Some(&Value::Str("left".into()))
    );
    assert_eq!(
        children[1].as_object().and_then(|o| o.fields.get("label")),
        Some(&Value::Str("right".into()))
    );
}

#[test]
fn materialization_hook_replaces_object_map() {
    use std::sync::Arc;

    let mut parser = Parser::new(person_descriptor())
        .expect("parser")
        .with_materializer(Arc::new(|class_name, fields| {
            if class_name == "Person" {
                fields
                    .get("name")
                    .cloned()
                    .map(|name| Value::Tuple(vec![Value::Str("person".into()), name]))
            } else {
                None
            }
        }));
    parser
        .feed("<Person><name>Zoe</name><age>1</age><hobbies></hobbies></Person>")
        .expect("feed");
    assert_eq!(
        parser.get_partial(),
        Some(Value::Tuple(vec![
            Value::Str("person".into()),
            Value::Str("Zoe".into())
        ]))
    );
}
