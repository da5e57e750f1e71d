use bson::{Bson, Document as BsonDocument};
use docflow::{DocumentRole, DynamicValue, KeyShape, OpError, coerce};
use proptest::prelude::*;

fn key() -> impl Strategy<Value = String> {
    "[a-z_][a-z0-9_]{0,8}"
}

fn scalar() -> impl Strategy<Value = Bson> {
    prop_oneof![
        any::<i32>().prop_map(Bson::Int32),
        any::<bool>().prop_map(Bson::Boolean),
        "[a-zA-Z0-9 ]{0,12}".prop_map(Bson::String),
        Just(Bson::Null),
    ]
}

fn non_text_key() -> impl Strategy<Value = Bson> {
    prop_oneof![
        any::<i64>().prop_map(Bson::Int64),
        any::<bool>().prop_map(Bson::Boolean),
        Just(Bson::Null),
        (-1.0e6..1.0e6f64).prop_map(Bson::Double),
    ]
}

fn entries() -> impl Strategy<Value = Vec<(String, Bson)>> {
    proptest::collection::btree_map(key(), scalar(), 0..8).prop_map(|m| m.into_iter().collect())
}

proptest! {
    #![proptest_config(proptest::test_runner::Config {
        failure_persistence: Some(Box::new(proptest::test_runner::FileFailurePersistence::WithSource("proptest-regressions"))),
        cases: 64,
        .. proptest::test_runner::Config::default()
    })]

    #[test]
    fn prop_text_round_trips_to_parsed_structure(fields in entries()) {
        let expected: BsonDocument = fields.into_iter().collect();
        let text = Bson::Document(expected.clone()).into_relaxed_extjson().to_string();
        let doc = coerce(DynamicValue::Text(text), DocumentRole::Query).unwrap();
        prop_assert_eq!(doc.into_inner(), expected);
    }

    #[test]
    fn prop_text_keyed_mapping_is_kept_verbatim(fields in entries()) {
        let value = DynamicValue::Mapping(
            fields.iter().map(|(k, v)| (Bson::String(k.clone()), v.clone())).collect(),
        );
        let doc = coerce(value, DocumentRole::Update).unwrap();
        let got: Vec<(String, Bson)> = doc.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        prop_assert_eq!(got, fields);
    }

    #[test]
    fn prop_one_non_text_key_rejects_the_mapping(
        fields in entries(),
        bad in non_text_key(),
        at in 0usize..8,
    ) {
        let mut items: Vec<(Bson, Bson)> =
            fields.into_iter().map(|(k, v)| (Bson::String(k), v)).collect();
        let at = at.min(items.len());
        items.insert(at, (bad, Bson::Int32(0)));
        let err = coerce(DynamicValue::Mapping(items), DocumentRole::Query).unwrap_err();
        prop_assert!(matches!(err, OpError::NonStringKey { shape: KeyShape::Mapping, .. }), "{err}");
    }

    #[test]
    fn prop_pair_succeeds_iff_left_is_text(
        left in prop_oneof![key().prop_map(Bson::String), non_text_key()],
        right in scalar(),
    ) {
        let textual = matches!(left, Bson::String(_));
        let result = coerce(DynamicValue::Pair { left: left.clone(), right: right.clone() }, DocumentRole::Query);
        match result {
            Ok(doc) => {
                prop_assert!(textual);
                prop_assert_eq!(doc.len(), 1);
                let (k, v) = doc.iter().next().unwrap();
                prop_assert_eq!(&Bson::String(k.clone()), &left);
                prop_assert_eq!(v, &right);
            }
            Err(e) => {
                prop_assert!(!textual);
                prop_assert!(matches!(e, OpError::NonStringKey { shape: KeyShape::Pair, .. }), "{e:?}");
            }
        }
    }
}
