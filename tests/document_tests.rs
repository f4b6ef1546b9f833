//! Integration tests for documents built, queried and persisted end to end
//!
//! These tests cover:
//! - Incremental building with merge and append
//! - Path queries, direct access and slices
//! - Transactions and persistence through the file store

use jsondb::{
    DataType, Document, DocumentConfig, Error, JsonPath, NodeKind, PathParser, Result, StandardParser,
};
use serde_json::{json, Value};
use std::cell::Cell;
use std::rc::Rc;
use tempfile::TempDir;

fn memory(value: Value) -> Document {
    Document::create(&value, "memory://", true, None).expect("Failed to create document")
}

#[test]
fn test_list_append_and_negative_index() {
    let doc = memory(json!({"x": [1, 2, 3]}));

    let last = doc.query("$.x[-1]").unwrap().one().unwrap().unwrap();
    assert_eq!(last.value().unwrap(), json!(3));

    let x = doc.get("x").unwrap().unwrap();
    assert_eq!(x.kind(), NodeKind::Array);
    x.append(&json!(4)).unwrap();
    doc.commit().unwrap();

    assert_eq!(x.len().unwrap(), 4);
    assert_eq!(doc.query("$.x[-1]").unwrap().values().unwrap(), vec![json!(4)]);
    assert_eq!(doc.value().unwrap(), json!({"x": [1, 2, 3, 4]}));
}

#[test]
fn test_feeding_an_array_over_an_existing_key_replaces_it() {
    let doc = memory(json!({}));

    doc.feed(&json!({"x": [1, 2, 3]})).unwrap();
    assert_eq!(doc.query("$.x[1]").unwrap().values().unwrap(), vec![json!(2)]);

    doc.feed(&json!({"x": [9]})).unwrap();
    assert_eq!(doc.query("$.x").unwrap().values().unwrap(), vec![json!([9])]);
    assert_eq!(doc.len().unwrap(), 1);
    assert_eq!(doc.get("x").unwrap().unwrap().len().unwrap(), 1);
    assert!(doc.check_counts().unwrap().is_empty());

    doc.commit().unwrap();
    assert_eq!(doc.value().unwrap(), json!({"x": [9]}));
}

#[test]
fn test_direct_access_across_container_kinds() {
    let list = memory(json!([1]));
    assert!(list.get("a").unwrap().is_none());

    let object = memory(json!({"a": 1}));
    assert!(object.get(0).unwrap().is_none());
    assert!(object.get("missing").unwrap().is_none());

    let leaf = object.get("a").unwrap().unwrap();
    assert!(matches!(leaf.get("a"), Err(Error::UnsupportedOperation(_))));
}

#[test]
fn test_merge_replaces_and_array_feed_appends() {
    let doc = memory(json!({"a": {"b": 1, "c": 2}, "list": [1]}));

    doc.feed(&json!({"a": {"z": 0}})).unwrap();
    assert_eq!(doc.get("a").unwrap().unwrap().value().unwrap(), json!({"z": 0}));
    assert_eq!(doc.len().unwrap(), 2);

    let a = doc.get("a").unwrap().unwrap();
    a.merge(&json!({"y": [true]})).unwrap();
    assert_eq!(a.value().unwrap(), json!({"z": 0, "y": [true]}));

    let list = doc.get("list").unwrap().unwrap();
    list.feed(&json!([2, 3])).unwrap();
    assert_eq!(list.value().unwrap(), json!([1, [2, 3]]));
    assert_eq!(list.len().unwrap(), 2);

    assert!(doc.check_counts().unwrap().is_empty());
}

#[test]
fn test_link_values_are_not_children() {
    let doc = memory(json!({"item": {}}));
    let item = doc.get("item").unwrap().unwrap();
    item.feed(&json!({"@__link__": {"table": "users", "id": 9}, "name": "x"}))
        .unwrap();

    assert_eq!(item.len().unwrap(), 1);
    assert_eq!(item.value().unwrap(), json!({"name": "x"}));
    assert_eq!(item.link().unwrap(), Some(json!({"table": "users", "id": 9})));
    assert!(doc.query("$..@__link__").unwrap().values().unwrap().is_empty());
}

#[test]
fn test_list_bounds() {
    let doc = memory(json!([1, 2, 3]));
    assert_eq!(doc.get(-1).unwrap().unwrap().value().unwrap(), json!(3));
    assert_eq!(doc.get(0).unwrap().unwrap().value().unwrap(), json!(1));
    assert!(matches!(doc.get(3), Err(Error::IndexOutOfRange { .. })));
    assert!(matches!(doc.get(-4), Err(Error::IndexOutOfRange { .. })));
}

#[test]
fn test_queries() {
    let doc = memory(json!({
        "store": {
            "book": [
                {"title": "A", "price": 8},
                {"title": "B", "price": 12},
                {"title": "C", "price": 9, "tags": ["x", "y"]}
            ],
            "bicycle": {"price": 20}
        }
    }));

    assert_eq!(
        doc.query("$.store.book[*].title").unwrap().values().unwrap(),
        vec![json!("A"), json!("B"), json!("C")]
    );
    assert_eq!(
        doc.query("$.store.book[::-2].title").unwrap().values().unwrap(),
        vec![json!("C"), json!("A")]
    );
    assert_eq!(
        doc.query("$.store.book[0,2]['title']").unwrap().values().unwrap(),
        vec![json!("A"), json!("C")]
    );
    assert_eq!(
        doc.query("$..tags[1]").unwrap().values().unwrap(),
        vec![json!("y")]
    );

    let mut prices: Vec<i64> = doc
        .query("$..price")
        .unwrap()
        .values()
        .unwrap()
        .into_iter()
        .filter_map(|v| v.as_i64())
        .collect();
    prices.sort();
    assert_eq!(prices, vec![8, 9, 12, 20]);

    assert!(doc.query("$.missing.deeper").unwrap().one().unwrap().is_none());
    assert!(matches!(doc.query("$.store["), Err(Error::PathSyntax { .. })));
}

#[test]
fn test_query_first_stops_early() {
    let doc = memory(json!({"a": [{"id": 1}, {"id": 2}]}));
    let first = doc.query_first("$..id").unwrap().unwrap();
    assert_eq!(first.data_type(), DataType::Int);
    assert_eq!(first.value().unwrap(), json!(1));
}

#[test]
fn test_slices_are_lazy_results() {
    let doc = memory(json!({"n": [0, 1, 2, 3, 4, 5]}));
    let n = doc.get("n").unwrap().unwrap();
    assert_eq!(
        n.slice(Some(1), Some(5), Some(2)).unwrap().values().unwrap(),
        vec![json!(1), json!(3)]
    );
    assert_eq!(
        n.slice(Some(-2), None, None).unwrap().values().unwrap(),
        vec![json!(4), json!(5)]
    );

    let mut partial = n.slice(None, None, None).unwrap();
    assert_eq!(partial.next().unwrap().unwrap().value().unwrap(), json!(0));
    drop(partial);
    assert!(matches!(n.slice(None, None, Some(0)), Err(Error::UnsupportedOperation(_))));
}

struct CountingParser {
    calls: Rc<Cell<usize>>,
}

impl PathParser for CountingParser {
    fn parse(&self, text: &str) -> Result<JsonPath> {
        self.calls.set(self.calls.get() + 1);
        StandardParser.parse(text)
    }
}

#[test]
fn test_each_expression_is_parsed_once() {
    let calls = Rc::new(Cell::new(0));
    let doc = memory(json!({"a": [1, 2]})).with_parser(Box::new(CountingParser {
        calls: Rc::clone(&calls),
    }));

    for _ in 0..3 {
        assert_eq!(doc.query("$.a[*]").unwrap().values().unwrap().len(), 2);
    }
    assert_eq!(calls.get(), 1);

    doc.query("$.a").unwrap();
    assert_eq!(calls.get(), 2);

    // direct access never reaches the parser
    doc.get("a").unwrap();
    assert_eq!(calls.get(), 2);
}

#[test]
fn test_rollback_discards_uncommitted_feed() {
    let doc = memory(json!({"kept": 1}));
    doc.feed(&json!({"dropped": [1, 2, {"deep": true}]})).unwrap();
    assert_eq!(doc.len().unwrap(), 2);

    doc.rollback().unwrap();
    assert_eq!(doc.value().unwrap(), json!({"kept": 1}));
    assert_eq!(doc.len().unwrap(), 1);
}

#[test]
fn test_file_store_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("doc.jsonl");
    let address = format!("file://{}", path.display());

    // Phase 1: create and extend
    {
        let doc = Document::create(&json!({"users": [{"name": "ann"}]}), &address, true, Some("$ref"))
            .expect("Failed to create document");
        doc.get("users")
            .unwrap()
            .unwrap()
            .append(&json!({"name": "bob", "$ref": "u2"}))
            .unwrap();
        doc.commit().unwrap();

        // uncommitted work is lost on close
        doc.feed(&json!({"draft": true})).unwrap();
        doc.close().unwrap();
    }

    // Phase 2: reopen
    {
        let doc = Document::load(&address).expect("Failed to load document");
        assert_eq!(doc.link_key().unwrap(), "$ref");
        assert_eq!(
            doc.value().unwrap(),
            json!({"users": [{"name": "ann"}, {"name": "bob"}]})
        );
        let bob = doc.query_first("$.users[1]").unwrap().unwrap();
        assert_eq!(bob.link().unwrap(), Some(json!("u2")));

        doc.feed(&json!({"count": 2})).unwrap();
        doc.commit().unwrap();
    }

    // Phase 3: refusing to clobber without overwrite
    assert!(matches!(
        Document::create(&json!({}), &address, false, None),
        Err(Error::Storage(_))
    ));
    let doc = Document::load(&address).unwrap();
    assert_eq!(doc.get("count").unwrap().unwrap().value().unwrap(), json!(2));
}

#[test]
fn test_import_and_dump() {
    let temp_dir = TempDir::new().unwrap();
    let input = r#"{"a": [1, 2.5, "ü"], "b": null}"#.as_bytes();

    let doc = Document::import("memory://", &input[..], DocumentConfig::default()).unwrap();
    assert_eq!(doc.value().unwrap(), json!({"a": [1, 2.5, "ü"], "b": null}));

    let out = temp_dir.path().join("out.json");
    doc.dump(&out).unwrap();
    let reloaded = Document::from_file("memory://", &out).unwrap();
    assert_eq!(reloaded.value().unwrap(), doc.value().unwrap());

    let umlaut = reloaded.query_first("$.a[2]").unwrap().unwrap();
    assert_eq!(umlaut.data_type(), DataType::UnicodeStr);
}

#[test]
fn test_import_failure_leaves_nothing_behind() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("doc.jsonl");
    let address = format!("file://{}", path.display());

    let config = DocumentConfig::default().max_depth(2);
    let result = Document::import(&address, &br#"{"a": {"b": {"c": {"d": 1}}}}"#[..], config);
    assert!(matches!(result, Err(Error::NestingTooDeep(2))));
    assert!(Document::load(&address).is_err());
}

#[test]
fn test_handles_outliving_document() {
    let doc = memory(json!({"a": [1]}));
    let a = doc.get("a").unwrap().unwrap();
    let pending = doc.query("$.a[*]").unwrap();
    drop(doc);

    assert!(matches!(a.len(), Err(Error::DocumentClosed)));
    assert!(matches!(pending.values(), Err(Error::DocumentClosed)));
}
