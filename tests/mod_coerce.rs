use bson::{Bson, doc, oid::ObjectId};
use docflow::{DataRow, DocumentRole, DynamicValue, KeyShape, OpError, coerce};

fn query(v: DynamicValue) -> Result<docflow::CanonicalDocument, OpError> {
    coerce(v, DocumentRole::Query)
}

#[test]
fn text_in_every_notation_round_trips() {
    let strict = query(DynamicValue::from(r#"{"name":"Ada","age":37}"#)).unwrap();
    let relaxed = query(DynamicValue::from("{ name: 'Ada', age: 37 }")).unwrap();
    assert_eq!(strict.as_bson(), &doc! {"name": "Ada", "age": 37});
    assert_eq!(strict, relaxed);

    let oid = ObjectId::new();
    let ext = format!(r#"{{"_id": {{"$oid": "{}"}}, "n": {{"$numberLong": "5"}}}}"#, oid.to_hex());
    let doc = query(DynamicValue::Text(ext)).unwrap();
    assert_eq!(doc.get("_id"), Some(&Bson::ObjectId(oid)));
    assert_eq!(doc.get("n"), Some(&Bson::Int64(5)));
}

#[test]
fn nested_text_keeps_structure() {
    let doc = query(DynamicValue::from("{ a: { b: [1, 'two', null] } }")).unwrap();
    assert_eq!(doc.as_bson(), &doc! {"a": {"b": [1, "two", Bson::Null]}});
}

#[test]
fn text_that_is_not_an_object_is_a_parse_error() {
    for bad in ["[1, 2]", "42", "{ a: ", "'unterminated"] {
        assert!(matches!(query(DynamicValue::from(bad)), Err(OpError::Parse(_))), "{bad}");
    }
}

#[test]
fn mapping_entries_are_kept_in_order() {
    let doc = query(DynamicValue::mapping([("z", Bson::Int32(1)), ("a", Bson::Boolean(true))])).unwrap();
    let keys: Vec<_> = doc.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(keys, ["z", "a"]);
}

#[test]
fn mapping_with_any_non_text_key_is_rejected() {
    let v = DynamicValue::Mapping(vec![
        (Bson::String("ok".into()), Bson::Int32(1)),
        (Bson::Int64(7), Bson::Int32(2)),
    ]);
    let err = query(v).unwrap_err();
    assert!(matches!(
        &err,
        OpError::NonStringKey { key_type, shape: KeyShape::Mapping } if key_type == "Int64"
    ));
    assert_eq!(err.to_string(), "map key must be a string, found: Int64");
}

#[test]
fn pair_succeeds_only_with_text_left() {
    let doc = query(DynamicValue::pair("status", "active")).unwrap();
    assert_eq!(doc.as_bson(), &doc! {"status": "active"});

    let err = query(DynamicValue::pair(1.5, "x")).unwrap_err();
    assert!(matches!(err, OpError::NonStringKey { shape: KeyShape::Pair, .. }));
}

#[test]
fn row_becomes_one_field_per_column() {
    let row = DataRow::new(
        vec!["id".into(), "name".into()],
        vec![Bson::Int64(1), Bson::String("Ada".into())],
    )
    .unwrap();
    let doc = coerce(DynamicValue::Row(row), DocumentRole::Update).unwrap();
    assert_eq!(doc.into_inner(), doc! {"id": 1_i64, "name": "Ada"});
}

#[test]
fn unsupported_shapes_name_their_role() {
    let err = coerce(DynamicValue::Scalar(Bson::Int32(3)), DocumentRole::Update).unwrap_err();
    assert_eq!(err.to_string(), "update document type not supported: Int32");
    let err = coerce(DynamicValue::None, DocumentRole::Query).unwrap_err();
    assert_eq!(err.to_string(), "query filter type not supported: none");
    assert!(matches!(query(DynamicValue::List(vec![])), Err(OpError::UnsupportedType { .. })));
}

#[test]
fn byte_payloads_are_read_as_utf8_text() {
    let doc = coerce(DynamicValue::from(b"{ name: 'Andy' }".to_vec()), DocumentRole::Update).unwrap();
    assert_eq!(doc.into_inner(), doc! {"name": "Andy"});
    assert!(matches!(query(DynamicValue::Bytes(vec![0xff, 0xfe])), Err(OpError::Parse(_))));
}

#[test]
fn shell_filters_parse_with_their_helpers() {
    let oid = ObjectId::parse_str("507c35dd8fada716c89d0013").unwrap();
    let cases = [
        ("{ _id: 5 }", doc! {"_id": 5}),
        (r#"{ "name.last": "Hopper" }"#, doc! {"name.last": "Hopper"}),
        (
            r#"{ _id: { $in: [ 5, ObjectId("507c35dd8fada716c89d0013") ] } }"#,
            doc! {"_id": {"$in": [5, oid]}},
        ),
        (
            "{ birth: { $gt: new Date('1950-01-01') } }",
            doc! {"birth": {"$gt": bson::DateTime::from_millis(-631_152_000_000)}},
        ),
        (
            "{\n birth: { $gt: new Date('1920-01-01') },\n death: { $exists: false }\n}",
            doc! {
                "birth": {"$gt": bson::DateTime::from_millis(-1_577_923_200_000)},
                "death": {"$exists": false},
            },
        ),
        ("{ name: \"Andy\" }", doc! {"name": "Andy"}),
    ];
    for (text, expected) in cases {
        assert_eq!(query(DynamicValue::from(text)).unwrap().into_inner(), expected, "{text}");
    }

    let regex = query(DynamicValue::from(r#"{ "name.last": { $regex: /^N/ } }"#)).unwrap();
    let operand = regex.as_bson().get_document("name.last").unwrap().get("$regex");
    match operand {
        Some(Bson::RegularExpression(re)) => {
            assert_eq!((re.pattern.as_str(), re.options.as_str()), ("^N", ""));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn malformed_shell_helpers_are_parse_errors() {
    for text in ["{ _id: ObjectId('xyz') }", "{ d: new Date('not a date') }", "{ p: /open }"] {
        assert!(matches!(query(DynamicValue::from(text)), Err(OpError::Parse(_))), "{text}");
    }
}
