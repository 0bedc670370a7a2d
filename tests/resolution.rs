use std::collections::BTreeMap;

use templatelite::{compile, render, Context, Error, Object, Value};

fn run(source: &str, context: &Context) -> String {
    let template = compile(source).unwrap();
    render(&template, context).unwrap()
}

/// A host object exposing `city` as a mapping key.
struct KeyedAddress;

impl Object for KeyedAddress {
    fn key(&self, name: &str) -> Option<Value> {
        (name == "city").then(|| Value::from("Oslo"))
    }
}

/// A host object exposing `city` as a zero-argument accessor method.
struct MethodAddress;

impl Object for MethodAddress {
    fn invoke(&self, name: &str) -> Option<Value> {
        (name == "city").then(|| Value::from("Oslo"))
    }
}

/// A host object exposing `city` as a plain attribute.
struct FieldAddress;

impl Object for FieldAddress {
    fn attr(&self, name: &str) -> Option<Value> {
        (name == "city").then(|| Value::from("Oslo"))
    }
}

#[test]
fn the_same_template_reads_all_three_shapes() {
    let source = "{{ address.city }}";
    let mut map = BTreeMap::new();
    map.insert("city".to_string(), Value::from("Oslo"));

    let shapes: Vec<Value> = vec![
        Value::Map(map),
        Value::object(KeyedAddress),
        Value::object(MethodAddress),
        Value::object(FieldAddress),
    ];
    for shape in shapes {
        let context = Context::new().with("address", shape);
        assert_eq!(run(source, &context), "Oslo");
    }
}

/// Exposes `name` every way at once; key lookup must win.
struct Ambiguous;

impl Object for Ambiguous {
    fn key(&self, name: &str) -> Option<Value> {
        (name == "name").then(|| Value::from("key"))
    }

    fn invoke(&self, name: &str) -> Option<Value> {
        (name == "name").then(|| Value::from("method"))
    }

    fn attr(&self, name: &str) -> Option<Value> {
        (name == "name").then(|| Value::from("attr"))
    }
}

/// Declines key lookup, answers as a method and an attribute; the method
/// must win.
struct MethodOverAttr;

impl Object for MethodOverAttr {
    fn invoke(&self, name: &str) -> Option<Value> {
        (name == "name").then(|| Value::from("method"))
    }

    fn attr(&self, name: &str) -> Option<Value> {
        (name == "name").then(|| Value::from("attr"))
    }
}

#[test]
fn resolution_order_is_key_then_method_then_attribute() {
    let context = Context::new().with("o", Value::object(Ambiguous));
    assert_eq!(run("{{ o.name }}", &context), "key");

    let context = Context::new().with("o", Value::object(MethodOverAttr));
    assert_eq!(run("{{ o.name }}", &context), "method");
}

#[test]
fn resolution_is_independent_per_segment() {
    // A map containing an object containing a map.
    struct Middle;
    impl Object for Middle {
        fn attr(&self, name: &str) -> Option<Value> {
            if name != "inner" {
                return None;
            }
            let mut inner = BTreeMap::new();
            inner.insert("leaf".to_string(), Value::Int(42));
            Some(Value::Map(inner))
        }
    }

    let mut outer = BTreeMap::new();
    outer.insert("middle".to_string(), Value::object(Middle));
    let context = Context::new().with("outer", outer);
    assert_eq!(run("{{ outer.middle.inner.leaf }}", &context), "42");
}

#[test]
fn failed_resolution_reports_the_failing_segment() {
    let context = Context::new().with("o", Value::object(KeyedAddress));
    let template = compile("{{ o.country }}").unwrap();
    match render(&template, &context).unwrap_err() {
        Error::UnknownContextValue { name, segment } => {
            assert_eq!(name, "o.country");
            assert_eq!(segment, "country");
        }
        other => panic!("expected UnknownContextValue, got {:?}", other),
    }
}

#[test]
fn dotted_access_through_a_scalar_fails() {
    let context = Context::new().with("n", 5i64);
    let template = compile("{{ n.anything }}").unwrap();
    assert!(matches!(
        render(&template, &context).unwrap_err(),
        Error::UnknownContextValue { .. }
    ));
}

#[test]
fn failed_attribute_on_an_indexed_value_names_the_access_path() {
    let mut person = BTreeMap::new();
    person.insert("name".to_string(), Value::from("ada"));
    let context = Context::new().with("people", Value::List(vec![Value::Map(person)]));
    let template = compile("{{ people[0].age }}").unwrap();
    match render(&template, &context).unwrap_err() {
        Error::UnknownContextValue { name, segment } => {
            assert_eq!(name, "people[0].age");
            assert_eq!(segment, "age");
        }
        other => panic!("expected UnknownContextValue, got {:?}", other),
    }
}

#[test]
fn attribute_access_on_an_indexed_value() {
    let mut person = BTreeMap::new();
    person.insert("name".to_string(), Value::from("ada"));
    let context = Context::new().with("people", Value::List(vec![Value::Map(person)]));
    assert_eq!(run("{{ people[0].name }}", &context), "ada");
}

#[test]
fn context_from_json_builds_nested_values() {
    let context = Context::from_json(
        r#"{"user": {"name": "grace", "tags": ["a", "b"]}, "count": 2}"#,
    )
    .unwrap();
    assert_eq!(run("{{ user.name }}", &context), "grace");
    assert_eq!(run("{{ user.tags[1] }}", &context), "b");
    assert_eq!(run("{{ count + 1 }}", &context), "3");
}

#[test]
fn context_from_json_rejects_non_object_payloads() {
    let err = Context::from_json("[1, 2, 3]").unwrap_err();
    assert!(matches!(err, Error::InvalidContext { .. }), "{:?}", err);

    let err = Context::from_json("not json at all").unwrap_err();
    assert!(matches!(err, Error::Json(_)), "{:?}", err);
}

#[test]
fn object_indexing_uses_key_lookup() {
    let context = Context::new().with("address", Value::object(KeyedAddress));
    assert_eq!(run("{{ address['city'] }}", &context), "Oslo");
}
