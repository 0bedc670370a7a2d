//! templatelite: a lightweight text-templating engine.
//!
//! Templates are plain text interleaved with directives. A template is
//! compiled once into an immutable node tree, then rendered any number of
//! times (concurrently, if desired) against caller-supplied context data.
//!
//! Supported syntax:
//! - Display expressions: `{{ user.name }}`, `{{ total + 1 }}`,
//!   `{{ name|center 9 '*' }}` (filters chain left to right).
//! - Conditionals: `{% if %}` / `{% elif %}` / `{% else %}` / `{% endif %}`.
//! - Loops: `{% for item in items %}` ... `{% endfor %}`, with optional
//!   multi-target unpacking (`{% for k, v in pairs %}`), `{% break %}`,
//!   `{% continue %}`, and a `{% else %}` body that runs only when the loop
//!   finishes without breaking.
//! - Comments: `{# ... #}`, discarded at compile time.
//!
//! Dotted names resolve polymorphically at every segment: mapping key first,
//! then a zero-argument accessor method, then a plain attribute (see
//! [`Object`]). Loop targets shadow context names for the duration of the
//! loop body.
//!
//! Errors are all-or-nothing: compilation fails on the first syntax error
//! with a line/column position, and rendering fails on the first evaluation
//! error with no partial output.
//!
//! ```
//! use templatelite::{Context, Engine};
//!
//! let engine = Engine::new();
//! let template = engine.compile("Hello {{ name }}!").unwrap();
//! let context = Context::new().with("name", "World");
//! assert_eq!(engine.render(&template, &context).unwrap(), "Hello World!");
//! ```

mod ast;
mod context;
mod error;
mod eval;
mod filters;
mod lexer;
mod parser;
mod value;

use std::path::Path;

pub use context::Context;
pub use error::{Error, Result};
pub use filters::{Arity, FilterRegistry};
pub use value::{NativeFn, Object, Value};

use ast::Node;
use eval::Evaluator;
use parser::Parser;

/// A compiled template: the immutable node tree plus the source text it was
/// compiled from (kept for diagnostics). Safe to share across threads and
/// render calls.
#[derive(Debug, Clone)]
pub struct Template {
    nodes: Vec<Node>,
    source: String,
}

impl Template {
    /// Compile template source into a reusable template. All-or-nothing:
    /// any syntax error aborts compilation.
    pub fn compile(source: &str) -> Result<Template> {
        let nodes = Parser::new(source).parse_template()?;
        Ok(Template {
            nodes,
            source: source.to_string(),
        })
    }

    /// Read a template from a file and compile it.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Template> {
        let source = std::fs::read_to_string(path)?;
        Template::compile(&source)
    }

    /// The source text this template was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub(crate) fn nodes(&self) -> &[Node] {
        &self.nodes
    }
}

/// Bundles the filter registry with the render entry point. One engine can
/// render any number of templates; registering a filter only affects
/// subsequent render calls on this engine.
pub struct Engine {
    filters: FilterRegistry,
}

impl Engine {
    /// An engine with the built-in filters registered.
    pub fn new() -> Engine {
        Engine {
            filters: FilterRegistry::with_builtins(),
        }
    }

    /// An engine with a caller-assembled filter registry.
    pub fn with_filters(filters: FilterRegistry) -> Engine {
        Engine { filters }
    }

    /// Register an additional named filter.
    pub fn register_filter<F>(&mut self, name: impl Into<String>, arity: Arity, func: F)
    where
        F: Fn(&Value, &[Value], &std::collections::BTreeMap<String, Value>) -> Result<Value>
            + Send
            + Sync
            + 'static,
    {
        self.filters.register(name, arity, func);
    }

    /// Compile template source. Equivalent to [`Template::compile`]; present
    /// so callers holding an engine need only one handle.
    pub fn compile(&self, source: &str) -> Result<Template> {
        Template::compile(source)
    }

    /// Render a compiled template against a context. Fails on the first
    /// resolution, evaluation, or filter error; no partial output is
    /// returned.
    pub fn render(&self, template: &Template, context: &Context) -> Result<String> {
        Evaluator::new(context, &self.filters).render(template.nodes())
    }
}

impl Default for Engine {
    fn default() -> Engine {
        Engine::new()
    }
}

/// Compile template source with the default configuration.
pub fn compile(source: &str) -> Result<Template> {
    Template::compile(source)
}

/// Render a compiled template with the built-in filters only.
pub fn render(template: &Template, context: &Context) -> Result<String> {
    Engine::new().render(template, context)
}
