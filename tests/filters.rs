use std::collections::BTreeMap;

use templatelite::{compile, render, Arity, Context, Engine, Error, Value};

fn run(source: &str, context: &Context) -> String {
    let template = compile(source).unwrap();
    render(&template, context).unwrap()
}

fn run_err(source: &str, context: &Context) -> Error {
    let template = compile(source).unwrap();
    render(&template, context).unwrap_err()
}

#[test]
fn center_pads_with_the_given_fill_character() {
    let context = Context::new().with("name", "hi");
    assert_eq!(run("{{ name|center 9 '*' }}", &context), "***hi****");
}

#[test]
fn center_accepts_fillchar_as_a_keyword() {
    let context = Context::new().with("name", "hi");
    assert_eq!(run("{{ name|center 9 fillchar='*' }}", &context), "***hi****");
}

#[test]
fn center_is_a_no_op_when_already_wide_enough() {
    let context = Context::new().with("name", "widest");
    assert_eq!(run("{{ name|center 3 }}", &context), "widest");
}

#[test]
fn cut_removes_the_given_text() {
    let context = Context::new().with("s", "a-b-c");
    assert_eq!(run("{{ s|cut '-' }}", &context), "abc");
}

#[test]
fn len_measures_strings_and_lists() {
    let context = Context::new()
        .with("s", "hello")
        .with("xs", vec![1i64, 2]);
    assert_eq!(run("{{ s|len }}", &context), "5");
    assert_eq!(run("{{ xs|len }}", &context), "2");
}

#[test]
fn split_produces_a_list() {
    let context = Context::new().with("s", "a b  c");
    assert_eq!(run("{{ s|split }}", &context), "['a', 'b', 'c']");
    assert_eq!(run("{{ s|split ' ' }}", &context), "['a', 'b', '', 'c']");
}

#[test]
fn filters_chain_left_to_right() {
    // a|f x|g y behaves as g(f(a, x), y)
    let context = Context::new().with("s", "a-b");
    assert_eq!(run("{{ s|cut '-'|center 4 '.' }}", &context), ".ab.");
}

#[test]
fn filter_arguments_can_be_names_and_parenthesized_expressions() {
    let context = Context::new().with("name", "hi").with("w", 4i64);
    assert_eq!(run("{{ name|center (w + 5) '*' }}", &context), "***hi****");
}

#[test]
fn unknown_filter_fails_at_render_time() {
    // Compilation accepts any filter name; lookup happens per render.
    let template = compile("{{ s|frobnicate }}").unwrap();
    let context = Context::new().with("s", "x");
    match render(&template, &context).unwrap_err() {
        Error::UnrecognisedFilter { name } => assert_eq!(name, "frobnicate"),
        other => panic!("expected UnrecognisedFilter, got {:?}", other),
    }
}

#[test]
fn too_many_arguments_are_rejected() {
    let context = Context::new().with("s", "x");
    let err = run_err("{{ s|len 3 }}", &context);
    assert!(matches!(err, Error::UnexpectedFilterArguments { .. }), "{:?}", err);
}

#[test]
fn missing_required_argument_is_rejected() {
    let context = Context::new().with("s", "x");
    let err = run_err("{{ s|cut }}", &context);
    assert!(matches!(err, Error::UnexpectedFilterArguments { .. }), "{:?}", err);
}

#[test]
fn unknown_keyword_argument_is_rejected() {
    let context = Context::new().with("s", "x");
    let err = run_err("{{ s|center 5 pad='*' }}", &context);
    assert!(matches!(err, Error::UnexpectedFilterArguments { .. }), "{:?}", err);
}

#[test]
fn custom_filters_can_be_registered() {
    let mut engine = Engine::new();
    engine.register_filter(
        "shout",
        Arity::exact(0),
        |value: &Value, _args: &[Value], _kwargs: &BTreeMap<String, Value>| {
            Ok(Value::Str(value.to_string().to_uppercase()))
        },
    );
    let template = engine.compile("{{ word|shout }}!").unwrap();
    let context = Context::new().with("word", "hey");
    assert_eq!(engine.render(&template, &context).unwrap(), "HEY!");
}

#[test]
fn custom_filters_can_take_keyword_arguments() {
    let mut engine = Engine::new();
    engine.register_filter(
        "wrap",
        Arity::with_keywords(0, 0, &["with"]),
        |value: &Value, _args: &[Value], kwargs: &BTreeMap<String, Value>| {
            let edge = match kwargs.get("with") {
                Some(Value::Str(s)) => s.clone(),
                _ => "\"".to_string(),
            };
            Ok(Value::Str(format!("{}{}{}", edge, value, edge)))
        },
    );
    let template = engine.compile("{{ s|wrap with='~' }}").unwrap();
    let context = Context::new().with("s", "mid");
    assert_eq!(engine.render(&template, &context).unwrap(), "~mid~");
}

#[test]
fn custom_filters_can_take_optional_positional_arguments() {
    let mut engine = Engine::new();
    engine.register_filter(
        "first",
        Arity::range(0, 1),
        |value: &Value, args: &[Value], _kwargs: &BTreeMap<String, Value>| {
            let count = match args.first() {
                None => 1,
                Some(Value::Int(n)) if *n >= 0 => *n as usize,
                Some(other) => {
                    return Err(Error::eval(format!(
                        "count must be a non-negative integer, got {}",
                        other
                    )))
                }
            };
            Ok(Value::Str(value.to_string().chars().take(count).collect()))
        },
    );
    let context = Context::new().with("s", "hello");
    let template = engine.compile("{{ s|first }}").unwrap();
    assert_eq!(engine.render(&template, &context).unwrap(), "h");
    let template = engine.compile("{{ s|first 3 }}").unwrap();
    assert_eq!(engine.render(&template, &context).unwrap(), "hel");

    // The upper bound still applies.
    let template = engine.compile("{{ s|first 1 2 }}").unwrap();
    let err = engine.render(&template, &context).unwrap_err();
    assert!(matches!(err, Error::UnexpectedFilterArguments { .. }), "{:?}", err);
}

#[test]
fn registering_overrides_a_builtin() {
    let mut engine = Engine::new();
    engine.register_filter(
        "len",
        Arity::exact(0),
        |_value: &Value, _args: &[Value], _kwargs: &BTreeMap<String, Value>| Ok(Value::Int(0)),
    );
    let template = engine.compile("{{ s|len }}").unwrap();
    let context = Context::new().with("s", "hello");
    assert_eq!(engine.render(&template, &context).unwrap(), "0");
}

#[test]
fn filters_apply_to_the_whole_display_expression() {
    let context = Context::new().with("a", "ab").with("b", "cde");
    assert_eq!(run("{{ a + b|len }}", &context), "5");
}

#[test]
fn default_registry_renders_without_an_engine() {
    let template = compile("{{ s|len }}").unwrap();
    let context = Context::new().with("s", "four");
    assert_eq!(render(&template, &context).unwrap(), "4");
}
