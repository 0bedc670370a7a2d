use std::collections::{BTreeMap, HashMap};

use crate::error::{Error, Result};
use crate::value::{value_len, Value};

/// How many arguments a filter accepts: positional bounds plus the keyword
/// names it recognizes. Checked by the registry before the filter runs.
#[derive(Clone, Copy, Debug)]
pub struct Arity {
    pub min: usize,
    pub max: Option<usize>,
    pub keywords: &'static [&'static str],
}

impl Arity {
    pub const fn exact(n: usize) -> Arity {
        Arity {
            min: n,
            max: Some(n),
            keywords: &[],
        }
    }

    pub const fn range(min: usize, max: usize) -> Arity {
        Arity {
            min,
            max: Some(max),
            keywords: &[],
        }
    }

    pub const fn with_keywords(min: usize, max: usize, keywords: &'static [&'static str]) -> Arity {
        Arity {
            min,
            max: Some(max),
            keywords,
        }
    }
}

pub type FilterFn =
    dyn Fn(&Value, &[Value], &BTreeMap<String, Value>) -> Result<Value> + Send + Sync;

struct FilterEntry {
    arity: Arity,
    func: Box<FilterFn>,
}

/// Named filters available to display expressions. Built once per engine and
/// read-only at render time; every render call borrows it.
pub struct FilterRegistry {
    entries: HashMap<String, FilterEntry>,
}

impl FilterRegistry {
    /// An empty registry with no filters at all.
    pub fn empty() -> FilterRegistry {
        FilterRegistry {
            entries: HashMap::new(),
        }
    }

    /// A registry holding the built-in filters (`center`, `cut`, `len`,
    /// `split`).
    pub fn with_builtins() -> FilterRegistry {
        let mut registry = FilterRegistry::empty();
        registry.register(
            "center",
            Arity::with_keywords(1, 2, &["fillchar"]),
            filter_center,
        );
        registry.register("cut", Arity::exact(1), filter_cut);
        registry.register("len", Arity::exact(0), filter_len);
        registry.register(
            "split",
            Arity::with_keywords(0, 2, &["sep", "maxsplit"]),
            filter_split,
        );
        registry
    }

    pub fn register<F>(&mut self, name: impl Into<String>, arity: Arity, func: F)
    where
        F: Fn(&Value, &[Value], &BTreeMap<String, Value>) -> Result<Value>
            + Send
            + Sync
            + 'static,
    {
        self.entries.insert(
            name.into(),
            FilterEntry {
                arity,
                func: Box::new(func),
            },
        );
    }

    /// Apply one named filter to `value`.
    pub fn apply(
        &self,
        name: &str,
        value: &Value,
        args: &[Value],
        kwargs: &BTreeMap<String, Value>,
    ) -> Result<Value> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| Error::UnrecognisedFilter {
                name: name.to_string(),
            })?;

        if args.len() < entry.arity.min
            || entry.arity.max.is_some_and(|max| args.len() > max)
        {
            return Err(unexpected(
                name,
                format!(
                    "takes {} positional argument(s), got {}",
                    describe_bounds(&entry.arity),
                    args.len()
                ),
            ));
        }
        for key in kwargs.keys() {
            if !entry.arity.keywords.contains(&key.as_str()) {
                return Err(unexpected(
                    name,
                    format!("unknown keyword argument '{}'", key),
                ));
            }
        }

        (entry.func)(value, args, kwargs)
    }
}

impl Default for FilterRegistry {
    fn default() -> FilterRegistry {
        FilterRegistry::with_builtins()
    }
}

fn describe_bounds(arity: &Arity) -> String {
    match arity.max {
        Some(max) if max == arity.min => format!("{}", arity.min),
        Some(max) => format!("{} to {}", arity.min, max),
        None => format!("at least {}", arity.min),
    }
}

fn unexpected(filter: &str, detail: String) -> Error {
    Error::UnexpectedFilterArguments {
        filter: filter.to_string(),
        detail,
    }
}

/// `center(width, fillchar=' ')`: pad the text form of the value to `width`,
/// extra fill going to the right.
fn filter_center(value: &Value, args: &[Value], kwargs: &BTreeMap<String, Value>) -> Result<Value> {
    let width = match &args[0] {
        Value::Int(n) if *n >= 0 => *n as usize,
        other => {
            return Err(unexpected(
                "center",
                format!("width must be a non-negative integer, got {}", other.repr()),
            ))
        }
    };

    if args.len() > 1 && kwargs.contains_key("fillchar") {
        return Err(unexpected("center", "fillchar given twice".to_string()));
    }
    let fill = match args.get(1).or_else(|| kwargs.get("fillchar")) {
        None => ' ',
        Some(Value::Str(s)) if s.chars().count() == 1 => s.chars().next().unwrap_or(' '),
        Some(other) => {
            return Err(unexpected(
                "center",
                format!("fillchar must be a single character, got {}", other.repr()),
            ))
        }
    };

    let text = value.to_string();
    let len = text.chars().count();
    if width <= len {
        return Ok(Value::Str(text));
    }
    let pad = width - len;
    let left = pad / 2;
    let mut out = String::with_capacity(width);
    for _ in 0..left {
        out.push(fill);
    }
    out.push_str(&text);
    for _ in 0..(pad - left) {
        out.push(fill);
    }
    Ok(Value::Str(out))
}

/// `cut(text)`: remove every occurrence of `text`.
fn filter_cut(value: &Value, args: &[Value], _kwargs: &BTreeMap<String, Value>) -> Result<Value> {
    let needle = match &args[0] {
        Value::Str(s) if !s.is_empty() => s,
        other => {
            return Err(unexpected(
                "cut",
                format!("expected a non-empty string to remove, got {}", other.repr()),
            ))
        }
    };
    Ok(Value::Str(value.to_string().replace(needle.as_str(), "")))
}

/// `len()`: size of a string, list, or map.
fn filter_len(value: &Value, _args: &[Value], _kwargs: &BTreeMap<String, Value>) -> Result<Value> {
    match value_len(value) {
        Some(len) => Ok(Value::Int(len as i64)),
        None => Err(Error::eval(format!(
            "cannot take the length of a '{}' value",
            value.type_name()
        ))),
    }
}

/// `split(sep=' ', maxsplit=-1)`: split the text form into a list of
/// substrings. With no separator, runs of whitespace delimit fields.
fn filter_split(value: &Value, args: &[Value], kwargs: &BTreeMap<String, Value>) -> Result<Value> {
    let sep = match args.first().or_else(|| kwargs.get("sep")) {
        None => None,
        Some(Value::Str(s)) if !s.is_empty() => Some(s.clone()),
        Some(other) => {
            return Err(unexpected(
                "split",
                format!("separator must be a non-empty string, got {}", other.repr()),
            ))
        }
    };
    let maxsplit = match args.get(1).or_else(|| kwargs.get("maxsplit")) {
        None => -1,
        Some(Value::Int(n)) => *n,
        Some(other) => {
            return Err(unexpected(
                "split",
                format!("maxsplit must be an integer, got {}", other.repr()),
            ))
        }
    };

    let text = value.to_string();
    let parts: Vec<String> = match sep {
        Some(sep) => {
            if maxsplit < 0 {
                text.split(sep.as_str()).map(str::to_string).collect()
            } else {
                text.splitn(maxsplit as usize + 1, sep.as_str())
                    .map(str::to_string)
                    .collect()
            }
        }
        None => whitespace_split(&text, maxsplit),
    };

    Ok(Value::List(parts.into_iter().map(Value::Str).collect()))
}

/// Whitespace splitting with Python `str.split(None, maxsplit)` semantics:
/// leading/trailing whitespace dropped, runs collapsed, the remainder kept
/// verbatim once the split budget is spent.
fn whitespace_split(text: &str, maxsplit: i64) -> Vec<String> {
    let mut parts = Vec::new();
    let mut rest = text.trim_start();
    let mut splits = 0i64;
    while !rest.is_empty() {
        if maxsplit >= 0 && splits == maxsplit {
            parts.push(rest.to_string());
            return parts;
        }
        match rest.find(char::is_whitespace) {
            Some(i) => {
                parts.push(rest[..i].to_string());
                rest = rest[i..].trim_start();
                splits += 1;
            }
            None => {
                parts.push(rest.to_string());
                break;
            }
        }
    }
    parts
}
