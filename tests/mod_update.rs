use bson::{Bson, doc};
use docflow::config::{ConnectionConfig, UpdateConfig};
use docflow::memory::MemoryServer;
use docflow::{Docflow, DynamicValue, FlowContext, Message, OpError, Processor};
use std::sync::Arc;

fn update_config(query: &str, document: Option<&str>, many: bool) -> UpdateConfig {
    UpdateConfig {
        connection: ConnectionConfig::new("main", "shop"),
        collection: "accounts".into(),
        query: Some(query.into()),
        document: document.map(Into::into),
        many,
        upsert: false,
    }
}

fn server_with(docs: Vec<bson::Document>) -> Arc<MemoryServer> {
    let server = Arc::new(MemoryServer::new());
    server.collection("shop", "accounts").insert_many(docs);
    server
}

fn stored(server: &MemoryServer) -> Vec<bson::Document> {
    server.collection("shop", "accounts").get_all_documents()
}

#[test]
fn update_one_by_id_modifies_exactly_that_document() {
    let server = server_with(vec![
        doc! {"_id": 1, "status": "pending"},
        doc! {"_id": 2, "status": "pending"},
    ]);
    let update = Docflow::in_memory(server.clone())
        .update(update_config("{_id:1}", Some(r#"{status:"active"}"#), false))
        .unwrap();
    let out = update.apply(&FlowContext::new(), &Message::default()).unwrap();
    assert_eq!(out.count(), Some(1));
    assert_eq!(out.attributes.get("modifiedCount"), Some(&Bson::Int64(1)));
    assert_eq!(
        stored(&server),
        vec![doc! {"_id": 1, "status": "active"}, doc! {"_id": 2, "status": "pending"}]
    );
}

#[test]
fn update_many_touches_all_five_matches_update_one_at_most_one() {
    let docs: Vec<_> = (0..5).map(|i| doc! {"_id": i, "group": "a", "flag": false}).collect();

    let server = server_with(docs.clone());
    let many = Docflow::in_memory(server.clone())
        .update(update_config("{ group: 'a' }", Some("{ $set: { flag: true } }"), true))
        .unwrap();
    let out = many.apply(&FlowContext::new(), &Message::default()).unwrap();
    assert_eq!(out.count(), Some(5));
    assert!(stored(&server).iter().all(|d| d.get_bool("flag").unwrap()));

    let server = server_with(docs);
    let one = Docflow::in_memory(server.clone())
        .update(update_config("{ group: 'a' }", Some("{ $set: { flag: true } }"), false))
        .unwrap();
    let out = one.apply(&FlowContext::new(), &Message::default()).unwrap();
    assert!(out.count().unwrap() <= 1);
    let flagged = stored(&server).iter().filter(|d| d.get_bool("flag").unwrap()).count();
    assert_eq!(flagged as u64, out.count().unwrap());
    // The memory store picks the first match in insertion order.
    assert!(stored(&server)[0].get_bool("flag").unwrap());
}

#[test]
fn payload_is_the_update_body_when_no_expression_is_set() {
    let server = server_with(vec![doc! {"_id": 1, "status": "active"}]);
    let update =
        Docflow::in_memory(server.clone()).update(update_config("{ _id: 1 }", None, false)).unwrap();
    let out = update
        .apply(&FlowContext::new(), &Message::with_value(r#"{status:"inactive"}"#))
        .unwrap();
    assert_eq!(out.count(), Some(1));
    assert_eq!(stored(&server), vec![doc! {"_id": 1, "status": "inactive"}]);
}

#[test]
fn empty_mapping_and_empty_payload_is_an_empty_document_error() {
    let server = server_with(vec![doc! {"_id": 1}]);
    let update = Docflow::in_memory(server.clone())
        .update(update_config("{ _id: 1 }", Some("#[context.changes]"), false))
        .unwrap();
    let mut ctx = FlowContext::new();
    ctx.set("changes", DynamicValue::Mapping(vec![]));
    let err = update.apply(&ctx, &Message::default()).unwrap_err();
    assert!(matches!(err, OpError::EmptyDocument { expression } if expression == "#[context.changes]"));
    assert_eq!(stored(&server), vec![doc! {"_id": 1}]);
}

#[test]
fn null_query_is_reported() {
    let server = server_with(vec![]);
    let update = Docflow::in_memory(server)
        .update(update_config("#[context.missing]", Some("{ a: 1 }"), false))
        .unwrap();
    let err = update.apply(&FlowContext::new(), &Message::default()).unwrap_err();
    assert!(matches!(err, OpError::NullFilter { .. }));
}

#[test]
fn missing_query_is_a_configuration_error() {
    let mut cfg = update_config("", Some("{ a: 1 }"), false);
    assert!(matches!(Docflow::in_memory(server_with(vec![])).update(cfg.clone()), Err(OpError::Config(_))));
    cfg.query = None;
    assert!(matches!(Docflow::in_memory(server_with(vec![])).update(cfg), Err(OpError::Config(_))));
}

#[test]
fn unsupported_update_shape_is_reported_with_its_role() {
    let server = server_with(vec![doc! {"_id": 1}]);
    let update = Docflow::in_memory(server)
        .update(update_config("{ _id: 1 }", None, false))
        .unwrap();
    let msg = Message::with_value(DynamicValue::Scalar(Bson::Int32(5)));
    let err = update.apply(&FlowContext::new(), &msg).unwrap_err();
    assert_eq!(err.to_string(), "update document type not supported: Int32");
}

#[test]
fn store_rejection_is_propagated() {
    let server = server_with(vec![doc! {"_id": 1, "name": "x"}]);
    let update = Docflow::in_memory(server)
        .update(update_config("{ _id: 1 }", Some("{ $inc: { name: 1 } }"), false))
        .unwrap();
    let err = update.apply(&FlowContext::new(), &Message::default()).unwrap_err();
    assert!(matches!(err, OpError::Store(_)));
}

#[test]
fn upsert_reports_the_new_id() {
    let server = server_with(vec![]);
    let mut cfg = update_config("{ _id: 42 }", Some("{ $set: { seen: true } }"), false);
    cfg.upsert = true;
    let update = Docflow::in_memory(server.clone()).update(cfg).unwrap();
    let out = update.apply(&FlowContext::new(), &Message::default()).unwrap();
    assert_eq!(out.count(), Some(0));
    assert_eq!(out.attributes.get("upsertedId"), Some(&Bson::Int32(42)));
    assert_eq!(out.attributes.update().unwrap().matched_count, 0);
    assert_eq!(stored(&server), vec![doc! {"_id": 42, "seen": true}]);
}

#[test]
fn concurrent_applies_are_independent() {
    let docs: Vec<_> = (0..8).map(|i| doc! {"_id": i, "hits": 0}).collect();
    let server = server_with(docs);
    let update = Arc::new(
        Docflow::in_memory(server.clone())
            .update(update_config("#[context.q]", Some("{ $inc: { hits: 1 } }"), false))
            .unwrap(),
    );
    std::thread::scope(|s| {
        for i in 0..8 {
            let update = update.clone();
            s.spawn(move || {
                let mut ctx = FlowContext::new();
                ctx.set("q", DynamicValue::pair("_id", i));
                assert_eq!(update.apply(&ctx, &Message::default()).unwrap().count(), Some(1));
            });
        }
    });
    assert!(stored(&server).iter().all(|d| d.get_i32("hits").unwrap() == 1));
}
