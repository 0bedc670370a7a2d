use templatelite::{compile, render, Context, Error, Value};

fn run(source: &str, context: &Context) -> String {
    let template = compile(source).unwrap();
    render(&template, context).unwrap()
}

#[test]
fn if_elif_else_picks_the_first_truthy_branch() {
    let source = "{% if x == 1 %}one{% elif x == 2 %}two{% else %}many{% endif %}";
    assert_eq!(run(source, &Context::new().with("x", 1i64)), "one");
    assert_eq!(run(source, &Context::new().with("x", 2i64)), "two");
    assert_eq!(run(source, &Context::new().with("x", 9i64)), "many");
}

#[test]
fn falsy_values_skip_the_if_body() {
    let source = "{% if x %}Y{% else %}N{% endif %}";
    for falsy in [
        Value::Int(0),
        Value::Float(0.0),
        Value::Str(String::new()),
        Value::List(Vec::new()),
        Value::None,
        Value::Bool(false),
    ] {
        let context = Context::new().with("x", falsy.clone());
        assert_eq!(run(source, &context), "N", "{:?}", falsy);
    }
}

#[test]
fn if_without_else_renders_nothing_when_false() {
    let source = "a{% if flag %}X{% endif %}b";
    assert_eq!(run(source, &Context::new().with("flag", false)), "ab");
}

#[test]
fn for_loop_visits_items_in_order() {
    let context = Context::new().with("items", vec![1i64, 2, 3]);
    assert_eq!(run("{% for n in items %}{{ n }},{% endfor %}", &context), "1,2,3,");
}

#[test]
fn for_over_string_iterates_characters() {
    let context = Context::new().with("word", "abc");
    assert_eq!(run("{% for c in word %}[{{ c }}]{% endfor %}", &context), "[a][b][c]");
}

#[test]
fn for_over_map_iterates_keys() {
    let mut map = std::collections::BTreeMap::new();
    map.insert("a".to_string(), Value::Int(1));
    map.insert("b".to_string(), Value::Int(2));
    let context = Context::new().with("m", map);
    assert_eq!(run("{% for k in m %}{{ k }} {% endfor %}", &context), "a b ");
}

#[test]
fn break_stops_before_the_current_item_renders() {
    let source = "{% for x in a %}{% if x == 2 %}{% break %}{% endif %}{{ x }}{% endfor %}";
    let context = Context::new().with("a", vec![1i64, 2, 3]);
    assert_eq!(run(source, &context), "1");
}

#[test]
fn continue_skips_to_the_next_item() {
    let source = "{% for x in a %}{% if x == 2 %}{% continue %}{% endif %}{{ x }}{% endfor %}";
    let context = Context::new().with("a", vec![1i64, 2, 3]);
    assert_eq!(run(source, &context), "13");
}

#[test]
fn for_else_runs_when_the_loop_completes() {
    let source = "{% for x in a %}{{ x }}{% else %}done{% endfor %}";
    let context = Context::new().with("a", vec![1i64, 2]);
    assert_eq!(run(source, &context), "12done");
}

#[test]
fn for_else_runs_on_an_empty_iterable() {
    let source = "{% for x in a %}{{ x }}{% else %}empty{% endfor %}";
    let context = Context::new().with("a", Vec::<i64>::new());
    assert_eq!(run(source, &context), "empty");
}

#[test]
fn break_suppresses_for_else() {
    let source = "{% for x in a %}{% break %}{% else %}done{% endfor %}end";
    let context = Context::new().with("a", vec![1i64]);
    assert_eq!(run(source, &context), "end");
}

#[test]
fn break_only_exits_the_innermost_loop() {
    let source = "{% for i in a %}{% for j in a %}\
                  {% if j == 2 %}{% break %}{% endif %}{{ i }}{{ j }} {% endfor %}{% endfor %}";
    let context = Context::new().with("a", vec![1i64, 2, 3]);
    assert_eq!(run(source, &context), "11 21 31 ");
}

#[test]
fn loop_target_shadows_and_restores_context_names() {
    let source = "{{ x }}|{% for x in a %}{{ x }}{% endfor %}|{{ x }}";
    let context = Context::new().with("x", "outer").with("a", vec![1i64, 2]);
    assert_eq!(run(source, &context), "outer|12|outer");
}

#[test]
fn multi_target_unpacks_pairs() {
    let pairs = Value::List(vec![
        Value::List(vec![Value::from("a"), Value::Int(1)]),
        Value::List(vec![Value::from("b"), Value::Int(2)]),
    ]);
    let context = Context::new().with("pairs", pairs);
    let source = "{% for k, v in pairs %}{{ k }}={{ v }};{% endfor %}";
    assert_eq!(run(source, &context), "a=1;b=2;");
}

#[test]
fn unpack_length_mismatch_is_an_error() {
    let rows = Value::List(vec![Value::List(vec![Value::Int(1)])]);
    let context = Context::new().with("rows", rows);
    let template = compile("{% for a, b in rows %}x{% endfor %}").unwrap();
    let err = render(&template, &context).unwrap_err();
    match err {
        Error::UnpackMismatch { expected, got } => {
            assert_eq!(expected, 2);
            assert_eq!(got, 1);
        }
        other => panic!("expected UnpackMismatch, got {:?}", other),
    }
}

#[test]
fn loop_variable_exposes_position() {
    let source = "{% for n in a %}{% if loop.first %}<{% endif %}\
                  {{ loop.index0 }}:{{ n }}{% if loop.last %}>{% endif %} {% endfor %}";
    let context = Context::new().with("a", vec![10i64, 20, 30]);
    assert_eq!(run(source, &context), "<0:10 1:20 2:30> ");
}

#[test]
fn iterating_a_non_iterable_is_an_error() {
    let template = compile("{% for x in n %}{{ x }}{% endfor %}").unwrap();
    let context = Context::new().with("n", 42i64);
    let err = render(&template, &context).unwrap_err();
    assert!(matches!(err, Error::NotIterable { .. }), "{:?}", err);
}

#[test]
fn break_outside_a_loop_is_a_compile_error() {
    let err = compile("{% break %}").unwrap_err();
    assert!(
        err.to_string().contains("'{% break %}' directive found outside loop"),
        "{}",
        err
    );
}

#[test]
fn continue_outside_a_loop_is_a_compile_error() {
    let err = compile("{% if x %}{% continue %}{% endif %}").unwrap_err();
    assert!(
        err.to_string().contains("'{% continue %}' directive found outside loop"),
        "{}",
        err
    );
}

#[test]
fn unclosed_for_reports_the_missing_directive() {
    let err = compile("{% for x in a %}{{ x }}").unwrap_err();
    assert!(
        err.to_string().contains("missing directive '{% endfor %}'"),
        "{}",
        err
    );
}

#[test]
fn unclosed_if_reports_the_missing_directive() {
    let err = compile("{% if x %}{{ x }}").unwrap_err();
    assert!(
        err.to_string().contains("missing directive '{% endif %}'"),
        "{}",
        err
    );
}

#[test]
fn mismatched_terminators_are_rejected() {
    assert!(compile("{% for x in a %}{% endif %}").is_err());
    assert!(compile("{% if x %}{% endfor %}").is_err());
    assert!(compile("{% endfor %}").is_err());
    assert!(compile("{% else %}").is_err());
}
