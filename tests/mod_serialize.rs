use chrono::TimeZone;
use chrono::Utc;
use cloudquery::query::serialize::{copy_via_tree, from_tree, to_tree};
use cloudquery::{Constraint, ConstraintValue, Distance, GeoPoint, Pointer, Query};
use serde_json::json;

#[test]
fn canonical_tree_covers_all_parts() {
    let mut q = Query::new("TestObject");
    q.where_key("numberField", Constraint::EqualTo(42.into())).unwrap();
    q.where_key("stringField", Constraint::NotEqualTo("foo".into())).unwrap();
    q.where_key("arrayField", Constraint::ContainedIn(vec![42.into(), "bar".into()])).unwrap();
    q.where_key("objectField", Constraint::Included).unwrap();
    q.where_key("stringField", Constraint::Selected).unwrap();
    q.where_key("name", Constraint::Ascending).unwrap();
    q.where_key("age", Constraint::Descending).unwrap();
    q.set_limit(10);
    q.set_skip(5);

    assert_eq!(
        to_tree(&q),
        json!({
            "className": "TestObject",
            "where": {
                "numberField": 42.0,
                "stringField": {"$ne": "foo"},
                "arrayField": {"$in": [42.0, "bar"]},
            },
            "include": "objectField",
            "keys": "stringField",
            "order": "name,-age",
            "limit": 10,
            "skip": 5,
        })
    );
}

#[test]
fn equality_is_bare_unless_other_operators_coexist() {
    let mut q = Query::new("TestObject");
    q.where_key("stringField", Constraint::EqualTo("foo".into())).unwrap();
    assert_eq!(to_tree(&q)["where"]["stringField"], json!("foo"));

    q.where_key("stringField", Constraint::Existed).unwrap();
    assert_eq!(
        to_tree(&q)["where"]["stringField"],
        json!({"$eq": "foo", "$exists": true})
    );
}

#[test]
fn typed_leaves_serialize_canonically() {
    let mut q = Query::new("TestObject");
    q.where_key(
        "dateField",
        Constraint::EqualTo(ConstraintValue::DateTime(Utc.timestamp_opt(1024, 0).unwrap())),
    )
    .unwrap();
    q.where_key(
        "geoPointField",
        Constraint::LocatedNear {
            point: GeoPoint::new(45.0, -45.0).unwrap(),
            minimal: None,
            maximal: Some(Distance::from_kilometers(150.0).unwrap()),
        },
    )
    .unwrap();
    q.where_key(
        "objectField",
        Constraint::EqualTo(Pointer::new("TestObject", "c000").into()),
    )
    .unwrap();

    let where_v = &to_tree(&q)["where"];
    assert_eq!(
        where_v["dateField"],
        json!({"__type": "Date", "iso": "1970-01-01T00:17:04.000Z"})
    );
    assert_eq!(
        where_v["geoPointField"],
        json!({
            "$nearSphere": {"__type": "GeoPoint", "latitude": 45.0, "longitude": -45.0},
            "$maxDistanceInKilometers": 150.0,
        })
    );
    assert_eq!(
        where_v["objectField"],
        json!({"__type": "Pointer", "className": "TestObject", "objectId": "c000"})
    );
}

#[test]
fn sub_query_operands_embed_the_full_tree() {
    let mut sub = Query::new("TestObject");
    sub.where_key("stringField", Constraint::EqualTo("child".into())).unwrap();

    let mut q = Query::new("TestObject");
    q.where_key("objectField", Constraint::MatchedQuery(sub.clone())).unwrap();
    q.where_key(
        "objectId",
        Constraint::MatchedQueryAndKey { query: sub, key: "objectId".into() },
    )
    .unwrap();

    let where_v = &to_tree(&q)["where"];
    assert_eq!(
        where_v["objectField"]["$inQuery"],
        json!({"className": "TestObject", "where": {"stringField": "child"}})
    );
    assert_eq!(where_v["objectId"]["$select"]["key"], json!("objectId"));
    assert_eq!(
        where_v["objectId"]["$select"]["query"]["className"],
        json!("TestObject")
    );
}

#[test]
fn regex_constraints_build_escaped_patterns() {
    let mut q = Query::new("TestObject");
    q.where_key("a", Constraint::MatchedSubstring("f.o".into())).unwrap();
    q.where_key("b", Constraint::PrefixedBy("f".into())).unwrap();
    q.where_key("c", Constraint::SuffixedBy("o".into())).unwrap();
    q.where_key(
        "d",
        Constraint::MatchedRegularExpression { pattern: "^foo$".into(), option: Some("i".into()) },
    )
    .unwrap();

    let where_v = &to_tree(&q)["where"];
    assert_eq!(where_v["a"], json!({"$regex": r".*f\.o.*"}));
    assert_eq!(where_v["b"], json!({"$regex": "^f"}));
    assert_eq!(where_v["c"], json!({"$regex": "o$"}));
    assert_eq!(where_v["d"], json!({"$regex": "^foo$", "$options": "i"}));
}

#[test]
fn round_trip_reproduces_the_tree() {
    let mut sub = Query::new("TestObject");
    sub.where_key("stringField", Constraint::EqualTo("child".into())).unwrap();

    let mut q = Query::new("TestObject");
    q.where_key("numberField", Constraint::GreaterThanOrEqualTo(41.9.into())).unwrap();
    q.where_key("arrayField", Constraint::ContainedAllIn(vec![42.into(), "bar".into()])).unwrap();
    q.where_key("arrayField", Constraint::EqualToSize(3)).unwrap();
    q.where_key("nullField", Constraint::EqualTo(ConstraintValue::Null)).unwrap();
    q.where_key("objectField", Constraint::NotMatchedQuery(sub)).unwrap();
    q.where_key("objectId", Constraint::NotExisted).unwrap();
    q.where_key("stringField", Constraint::Selected).unwrap();
    q.where_key("name", Constraint::Descending).unwrap();
    q.set_limit(100);

    let tree = to_tree(&q);
    let rebuilt = from_tree(&tree).unwrap();
    assert_eq!(to_tree(&rebuilt), tree);
    assert!(rebuilt.content_equals(&q));
}

#[test]
fn compound_queries_round_trip() {
    let mut a = Query::new("TestObject");
    a.where_key("objectId", Constraint::EqualTo("o000".into())).unwrap();
    let mut b = Query::new("TestObject");
    b.where_key("objectId", Constraint::EqualTo("c000".into())).unwrap();

    let either = a.or(&b).unwrap();
    let tree = to_tree(&either);
    assert_eq!(
        tree["where"],
        json!({"$or": [{"objectId": "o000"}, {"objectId": "c000"}]})
    );

    let rebuilt = from_tree(&tree).unwrap();
    assert!(rebuilt.is_compound());
    assert_eq!(to_tree(&rebuilt), tree);
}

#[test]
fn archival_copy_shares_nothing_with_the_original() {
    let mut q = Query::new("TestObject");
    q.where_key("stringField", Constraint::EqualTo("foo".into())).unwrap();
    q.set_limit(42);

    let mut copy = copy_via_tree(&q).unwrap();
    assert!(copy.content_equals(&q));

    copy.set_limit(43);
    copy.where_key("stringField", Constraint::EqualTo("bar".into())).unwrap();
    assert_eq!(q.limit(), Some(42));
    assert_eq!(to_tree(&q)["where"]["stringField"], json!("foo"));
}

#[test]
fn malformed_trees_are_rejected() {
    assert!(from_tree(&json!({"where": {}})).is_err());
    assert!(from_tree(&json!({"className": "T", "limit": -1})).is_err());
    assert!(from_tree(&json!({"className": "T", "skip": 1.5})).is_err());
    assert!(from_tree(&json!({"className": "T", "where": []})).is_err());
}
