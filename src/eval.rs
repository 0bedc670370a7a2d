use std::collections::{BTreeMap, HashMap};

use crate::ast::{BinOp, Expr, KwArg, Node, UnaryOp};
use crate::context::{resolve_segment, Context};
use crate::error::{Error, Result};
use crate::filters::FilterRegistry;
use crate::value::Value;

/// Control signal bubbled out of body execution. A `for` node consumes
/// `Break`/`Continue`; `if` nodes pass them through untouched.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum Flow {
    Normal,
    Break,
    Continue,
}

/// Per-render state: a stack of loop-local scopes layered over the root
/// context. Created fresh for every render call and discarded afterwards,
/// which is what makes concurrent renders of one template independent.
pub(crate) struct Evaluator<'a> {
    context: &'a Context,
    filters: &'a FilterRegistry,
    scopes: Vec<HashMap<String, Value>>,
}

impl<'a> Evaluator<'a> {
    pub fn new(context: &'a Context, filters: &'a FilterRegistry) -> Self {
        Self {
            context,
            filters,
            scopes: Vec::new(),
        }
    }

    pub fn render(&mut self, nodes: &[Node]) -> Result<String> {
        let mut output = String::new();
        self.render_into(nodes, &mut output)?;
        Ok(output)
    }

    fn render_into(&mut self, nodes: &[Node], output: &mut String) -> Result<Flow> {
        for node in nodes {
            match node {
                Node::Text(s) => output.push_str(s),
                Node::Output { expr, filters } => {
                    let mut value = self.eval_expr(expr)?;
                    for filter in filters {
                        let mut args = Vec::with_capacity(filter.args.len());
                        for arg in &filter.args {
                            args.push(self.eval_expr(arg)?);
                        }
                        let mut kwargs = BTreeMap::new();
                        for (key, arg) in &filter.kwargs {
                            kwargs.insert(key.clone(), self.eval_expr(arg)?);
                        }
                        value = self.filters.apply(&filter.name, &value, &args, &kwargs)?;
                    }
                    output.push_str(&value.to_string());
                }
                Node::If { cases, else_body } => {
                    let mut matched = false;
                    for (condition, body) in cases {
                        if self.eval_expr(condition)?.is_truthy() {
                            let flow = self.render_into(body, output)?;
                            if flow != Flow::Normal {
                                return Ok(flow);
                            }
                            matched = true;
                            break;
                        }
                    }
                    if !matched {
                        if let Some(body) = else_body {
                            let flow = self.render_into(body, output)?;
                            if flow != Flow::Normal {
                                return Ok(flow);
                            }
                        }
                    }
                }
                Node::For {
                    targets,
                    iterable,
                    body,
                    else_body,
                } => {
                    let items = self.iterate(iterable)?;
                    let length = items.len();
                    let mut broke = false;

                    for (index, item) in items.into_iter().enumerate() {
                        self.scopes.push(HashMap::new());
                        let flow = self
                            .bind_targets(targets, item)
                            .and_then(|()| {
                                self.bind_loop_variable(index, length);
                                self.render_into(body, output)
                            });
                        self.scopes.pop();

                        match flow? {
                            Flow::Break => {
                                broke = true;
                                break;
                            }
                            Flow::Continue | Flow::Normal => {}
                        }
                    }

                    // Loop exhaustion (not break) triggers the else body.
                    if !broke {
                        if let Some(body) = else_body {
                            let flow = self.render_into(body, output)?;
                            if flow != Flow::Normal {
                                return Ok(flow);
                            }
                        }
                    }
                }
                Node::Break => return Ok(Flow::Break),
                Node::Continue => return Ok(Flow::Continue),
            }
        }
        Ok(Flow::Normal)
    }

    fn iterate(&mut self, iterable: &Expr) -> Result<Vec<Value>> {
        let value = self.eval_expr(iterable)?;
        match value {
            Value::List(items) => Ok(items),
            Value::Str(s) => Ok(s.chars().map(|c| Value::Str(c.to_string())).collect()),
            // Maps iterate over their keys, in order.
            Value::Map(entries) => Ok(entries.keys().cloned().map(Value::Str).collect()),
            other => Err(Error::NotIterable {
                type_name: other.type_name(),
            }),
        }
    }

    fn bind_targets(&mut self, targets: &[String], item: Value) -> Result<()> {
        if targets.len() == 1 {
            self.set_local(targets[0].clone(), item);
            return Ok(());
        }
        let parts = match item {
            Value::List(parts) => parts,
            Value::Str(s) => s.chars().map(|c| Value::Str(c.to_string())).collect(),
            other => {
                return Err(Error::eval(format!(
                    "cannot unpack '{}' value into {} loop targets",
                    other.type_name(),
                    targets.len()
                )))
            }
        };
        if parts.len() != targets.len() {
            return Err(Error::UnpackMismatch {
                expected: targets.len(),
                got: parts.len(),
            });
        }
        for (target, part) in targets.iter().zip(parts) {
            self.set_local(target.clone(), part);
        }
        Ok(())
    }

    fn bind_loop_variable(&mut self, index: usize, length: usize) {
        let mut entries = BTreeMap::new();
        entries.insert("index0".to_string(), Value::Int(index as i64));
        entries.insert("index".to_string(), Value::Int(index as i64 + 1));
        entries.insert("first".to_string(), Value::Bool(index == 0));
        entries.insert("last".to_string(), Value::Bool(index + 1 == length));
        entries.insert("length".to_string(), Value::Int(length as i64));
        self.set_local("loop".to_string(), Value::Map(entries));
    }

    fn set_local(&mut self, name: String, value: Value) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name, value);
        }
    }

    /// Root name lookup: loop scopes innermost-first, then the context.
    fn lookup_name(&self, name: &str) -> Option<Value> {
        for scope in self.scopes.iter().rev() {
            if let Some(value) = scope.get(name) {
                return Some(value.clone());
            }
        }
        self.context.get(name).cloned()
    }

    fn eval_expr(&mut self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Name(segments) => {
                let dotted = segments.join(".");
                let mut current = self.lookup_name(&segments[0]).ok_or_else(|| {
                    Error::UnknownContextValue {
                        name: dotted.clone(),
                        segment: segments[0].clone(),
                    }
                })?;
                for segment in &segments[1..] {
                    current = resolve_segment(&current, segment).ok_or_else(|| {
                        Error::UnknownContextValue {
                            name: dotted.clone(),
                            segment: segment.clone(),
                        }
                    })?;
                }
                Ok(current)
            }
            Expr::Attribute(base, segment) => {
                let value = self.eval_expr(base)?;
                resolve_segment(&value, segment).ok_or_else(|| Error::UnknownContextValue {
                    name: format!("{}.{}", describe_target(base), segment),
                    segment: segment.clone(),
                })
            }
            Expr::Index(target, index) => {
                let target = self.eval_expr(target)?;
                let index = self.eval_expr(index)?;
                index_value(&target, &index)
            }
            Expr::Slice {
                target,
                start,
                stop,
                step,
            } => {
                let target = self.eval_expr(target)?;
                let start = self.eval_slice_bound(start)?;
                let stop = self.eval_slice_bound(stop)?;
                let step = self.eval_slice_bound(step)?;
                slice_value(&target, start, stop, step)
            }
            Expr::Call {
                target,
                args,
                kwargs,
            } => {
                let callee = self.eval_expr(target)?;
                let func = match callee {
                    Value::Function(func) => func,
                    other => {
                        return Err(Error::NotCallable {
                            type_name: other.type_name(),
                        })
                    }
                };

                let mut positional = Vec::with_capacity(args.len());
                for arg in args {
                    positional.push(self.eval_expr(arg)?);
                }
                let mut keyword = BTreeMap::new();
                for kwarg in kwargs {
                    match kwarg {
                        KwArg::Named(name, arg) => {
                            keyword.insert(name.clone(), self.eval_expr(arg)?);
                        }
                        KwArg::Splat(arg) => match self.eval_expr(arg)? {
                            // Last write wins on key collisions.
                            Value::Map(entries) => keyword.extend(entries),
                            other => {
                                return Err(Error::eval(format!(
                                    "'**' argument must be a map, got '{}'",
                                    other.type_name()
                                )))
                            }
                        },
                    }
                }
                func(&positional, &keyword)
            }
            Expr::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval_expr(item)?);
                }
                Ok(Value::List(values))
            }
            Expr::Map(entries) => {
                let mut map = BTreeMap::new();
                for (key, value) in entries {
                    let key = match self.eval_expr(key)? {
                        Value::Str(s) => s,
                        other => {
                            return Err(Error::eval(format!(
                                "map keys must be strings, got '{}'",
                                other.type_name()
                            )))
                        }
                    };
                    map.insert(key, self.eval_expr(value)?);
                }
                Ok(Value::Map(map))
            }
            Expr::Unary(UnaryOp::Not, operand) => {
                Ok(Value::Bool(!self.eval_expr(operand)?.is_truthy()))
            }
            Expr::Unary(UnaryOp::Neg, operand) => match self.eval_expr(operand)? {
                Value::Int(n) => Ok(Value::Int(-n)),
                Value::Float(x) => Ok(Value::Float(-x)),
                other => Err(Error::eval(format!(
                    "cannot negate a '{}' value",
                    other.type_name()
                ))),
            },
            Expr::BinOp(left, BinOp::And, right) => {
                if !self.eval_expr(left)?.is_truthy() {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(self.eval_expr(right)?.is_truthy()))
            }
            Expr::BinOp(left, BinOp::Or, right) => {
                if self.eval_expr(left)?.is_truthy() {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(self.eval_expr(right)?.is_truthy()))
            }
            Expr::BinOp(left, op, right) => {
                let left = self.eval_expr(left)?;
                let right = self.eval_expr(right)?;
                binary_op(*op, left, right)
            }
        }
    }

    fn eval_slice_bound(&mut self, bound: &Option<Box<Expr>>) -> Result<Option<i64>> {
        match bound {
            None => Ok(None),
            Some(expr) => match self.eval_expr(expr)? {
                Value::Int(n) => Ok(Some(n)),
                other => Err(Error::eval(format!(
                    "slice bounds must be integers, got '{}'",
                    other.type_name()
                ))),
            },
        }
    }
}

/// Approximate source form of an access path, for resolution diagnostics.
fn describe_target(expr: &Expr) -> String {
    match expr {
        Expr::Name(segments) => segments.join("."),
        Expr::Attribute(base, segment) => format!("{}.{}", describe_target(base), segment),
        Expr::Index(target, index) => match index.as_ref() {
            Expr::Literal(value) => format!("{}[{}]", describe_target(target), value.repr()),
            _ => format!("{}[..]", describe_target(target)),
        },
        Expr::Call { target, .. } => format!("{}(..)", describe_target(target)),
        _ => "expression".to_string(),
    }
}

fn operand_error(op: BinOp, left: &Value, right: &Value) -> Error {
    Error::UnsupportedOperand {
        op: op.symbol(),
        left: left.type_name(),
        right: right.type_name(),
    }
}

fn binary_op(op: BinOp, left: Value, right: Value) -> Result<Value> {
    match op {
        BinOp::Eq => Ok(Value::Bool(left.value_eq(&right))),
        BinOp::NotEq => Ok(Value::Bool(!left.value_eq(&right))),
        BinOp::Lt | BinOp::LtEq | BinOp::Gt | BinOp::GtEq => order(op, &left, &right),
        BinOp::In => Ok(Value::Bool(contains(&right, &left)?)),
        BinOp::NotIn => Ok(Value::Bool(!contains(&right, &left)?)),
        BinOp::Add => match (left, right) {
            (Value::Int(a), Value::Int(b)) => a
                .checked_add(b)
                .map(Value::Int)
                .ok_or_else(|| Error::eval("integer overflow in '+'")),
            (a, b) => match float_pair(&a, &b) {
                Some((x, y)) => Ok(Value::Float(x + y)),
                None => match (a, b) {
                    (Value::Str(a), Value::Str(b)) => Ok(Value::Str(a + &b)),
                    (Value::List(mut a), Value::List(b)) => {
                        a.extend(b);
                        Ok(Value::List(a))
                    }
                    (a, b) => Err(operand_error(op, &a, &b)),
                },
            },
        },
        BinOp::Sub => match (left, right) {
            (Value::Int(a), Value::Int(b)) => a
                .checked_sub(b)
                .map(Value::Int)
                .ok_or_else(|| Error::eval("integer overflow in '-'")),
            (a, b) => match float_pair(&a, &b) {
                Some((x, y)) => Ok(Value::Float(x - y)),
                None => Err(operand_error(op, &a, &b)),
            },
        },
        BinOp::Mul => match (left, right) {
            (Value::Int(a), Value::Int(b)) => a
                .checked_mul(b)
                .map(Value::Int)
                .ok_or_else(|| Error::eval("integer overflow in '*'")),
            (Value::Str(s), Value::Int(n)) | (Value::Int(n), Value::Str(s)) => {
                Ok(Value::Str(s.repeat(n.max(0) as usize)))
            }
            (Value::List(items), Value::Int(n)) | (Value::Int(n), Value::List(items)) => {
                let mut out = Vec::new();
                for _ in 0..n.max(0) {
                    out.extend(items.iter().cloned());
                }
                Ok(Value::List(out))
            }
            (a, b) => match float_pair(&a, &b) {
                Some((x, y)) => Ok(Value::Float(x * y)),
                None => Err(operand_error(op, &a, &b)),
            },
        },
        // True division always yields a float.
        BinOp::Div => match float_pair(&left, &right) {
            Some((_, y)) if y == 0.0 => Err(Error::eval("division by zero")),
            Some((x, y)) => Ok(Value::Float(x / y)),
            None => Err(operand_error(op, &left, &right)),
        },
        BinOp::FloorDiv => match (&left, &right) {
            (Value::Int(_), Value::Int(0)) => Err(Error::eval("division by zero")),
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(floor_div(*a, *b))),
            _ => match float_pair(&left, &right) {
                Some((_, y)) if y == 0.0 => Err(Error::eval("division by zero")),
                Some((x, y)) => Ok(Value::Float((x / y).floor())),
                None => Err(operand_error(op, &left, &right)),
            },
        },
        BinOp::Mod => match (&left, &right) {
            (Value::Int(_), Value::Int(0)) => Err(Error::eval("modulo by zero")),
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(floor_mod(*a, *b))),
            _ => match float_pair(&left, &right) {
                Some((_, y)) if y == 0.0 => Err(Error::eval("modulo by zero")),
                Some((x, y)) => {
                    let mut r = x % y;
                    if r != 0.0 && (r < 0.0) != (y < 0.0) {
                        r += y;
                    }
                    Ok(Value::Float(r))
                }
                None => Err(operand_error(op, &left, &right)),
            },
        },
        BinOp::Pow => match (&left, &right) {
            (Value::Int(a), Value::Int(b)) if *b >= 0 => {
                let exp = u32::try_from(*b)
                    .map_err(|_| Error::eval("exponent too large in '**'"))?;
                a.checked_pow(exp)
                    .map(Value::Int)
                    .ok_or_else(|| Error::eval("integer overflow in '**'"))
            }
            _ => match float_pair(&left, &right) {
                Some((x, y)) => Ok(Value::Float(x.powf(y))),
                None => Err(operand_error(op, &left, &right)),
            },
        },
        // Short-circuit forms are handled in eval_expr.
        BinOp::And | BinOp::Or => unreachable!("logical operators are short-circuited"),
    }
}

/// Both operands as floats, if both are numeric.
fn float_pair(left: &Value, right: &Value) -> Option<(f64, f64)> {
    let as_float = |v: &Value| match v {
        Value::Int(n) => Some(*n as f64),
        Value::Float(x) => Some(*x),
        _ => None,
    };
    Some((as_float(left)?, as_float(right)?))
}

/// Floor division, rounding toward negative infinity as scripting languages
/// do (`-7 // 2 == -4`).
fn floor_div(a: i64, b: i64) -> i64 {
    let q = a / b;
    let r = a % b;
    if r != 0 && (r < 0) != (b < 0) {
        q - 1
    } else {
        q
    }
}

/// Floored modulo; the result takes the sign of the divisor.
fn floor_mod(a: i64, b: i64) -> i64 {
    let r = a % b;
    if r != 0 && (r < 0) != (b < 0) {
        r + b
    } else {
        r
    }
}

fn order(op: BinOp, left: &Value, right: &Value) -> Result<Value> {
    use std::cmp::Ordering;

    let ordering = match (left, right) {
        (Value::Str(a), Value::Str(b)) => a.cmp(b),
        _ => match float_pair(left, right) {
            Some((x, y)) => x
                .partial_cmp(&y)
                .ok_or_else(|| Error::eval("cannot order NaN values"))?,
            None => return Err(operand_error(op, left, right)),
        },
    };

    let result = match op {
        BinOp::Lt => ordering == Ordering::Less,
        BinOp::LtEq => ordering != Ordering::Greater,
        BinOp::Gt => ordering == Ordering::Greater,
        BinOp::GtEq => ordering != Ordering::Less,
        _ => unreachable!("order called with non-ordering operator"),
    };
    Ok(Value::Bool(result))
}

/// Membership: substring for strings, element equality for lists, key
/// presence for maps.
fn contains(container: &Value, needle: &Value) -> Result<bool> {
    match container {
        Value::Str(haystack) => match needle {
            Value::Str(s) => Ok(haystack.contains(s.as_str())),
            other => Err(Error::UnsupportedOperand {
                op: "in",
                left: other.type_name(),
                right: "string",
            }),
        },
        Value::List(items) => Ok(items.iter().any(|item| item.value_eq(needle))),
        Value::Map(entries) => match needle {
            Value::Str(key) => Ok(entries.contains_key(key)),
            other => Err(Error::UnsupportedOperand {
                op: "in",
                left: other.type_name(),
                right: "map",
            }),
        },
        other => Err(Error::UnsupportedOperand {
            op: "in",
            left: needle.type_name(),
            right: other.type_name(),
        }),
    }
}

fn index_value(target: &Value, index: &Value) -> Result<Value> {
    match (target, index) {
        (Value::List(items), Value::Int(i)) => {
            let idx = normalize_index(*i, items.len())
                .ok_or_else(|| Error::eval(format!("list index {} out of range", i)))?;
            Ok(items[idx].clone())
        }
        (Value::Str(s), Value::Int(i)) => {
            let chars: Vec<char> = s.chars().collect();
            let idx = normalize_index(*i, chars.len())
                .ok_or_else(|| Error::eval(format!("string index {} out of range", i)))?;
            Ok(Value::Str(chars[idx].to_string()))
        }
        (Value::Map(entries), Value::Str(key)) => entries
            .get(key)
            .cloned()
            .ok_or_else(|| Error::eval(format!("key '{}' not found", key))),
        (Value::Object(object), Value::Str(key)) => object
            .key(key)
            .ok_or_else(|| Error::eval(format!("key '{}' not found", key))),
        (Value::List(_) | Value::Str(_), other) => Err(Error::eval(format!(
            "sequence indices must be integers, got '{}'",
            other.type_name()
        ))),
        (Value::Map(_) | Value::Object(_), other) => Err(Error::eval(format!(
            "map keys must be strings, got '{}'",
            other.type_name()
        ))),
        (other, _) => Err(Error::NotIndexable {
            type_name: other.type_name(),
        }),
    }
}

/// Negative indices count from the end.
fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let idx = if index < 0 { index + len } else { index };
    if (0..len).contains(&idx) {
        Some(idx as usize)
    } else {
        None
    }
}

fn slice_value(
    target: &Value,
    start: Option<i64>,
    stop: Option<i64>,
    step: Option<i64>,
) -> Result<Value> {
    match target {
        Value::List(items) => {
            let indices = slice_indices(items.len(), start, stop, step)?;
            Ok(Value::List(indices.into_iter().map(|i| items[i].clone()).collect()))
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let indices = slice_indices(chars.len(), start, stop, step)?;
            Ok(Value::Str(indices.into_iter().map(|i| chars[i]).collect()))
        }
        other => Err(Error::NotIndexable {
            type_name: other.type_name(),
        }),
    }
}

/// Indices selected by a `[start:stop:step]` slice over a sequence of
/// `len` items, with conventional clamping for out-of-range bounds.
fn slice_indices(
    len: usize,
    start: Option<i64>,
    stop: Option<i64>,
    step: Option<i64>,
) -> Result<Vec<usize>> {
    let step = step.unwrap_or(1);
    if step == 0 {
        return Err(Error::eval("slice step cannot be zero"));
    }
    let len = len as i64;

    let (mut i, stop) = if step > 0 {
        let mut s = start.unwrap_or(0);
        if s < 0 {
            s += len;
        }
        let mut e = stop.unwrap_or(len);
        if e < 0 {
            e += len;
        }
        (s.clamp(0, len), e.clamp(0, len))
    } else {
        let mut s = start.unwrap_or(len - 1);
        if s < 0 {
            s += len;
        }
        let mut e = stop.map(|e| if e < 0 { e + len } else { e }).unwrap_or(-1);
        if stop.is_some() {
            e = e.clamp(-1, len - 1);
        }
        (s.clamp(-1, len - 1), e)
    };

    let mut indices = Vec::new();
    while (step > 0 && i < stop) || (step < 0 && i > stop) {
        indices.push(i as usize);
        i += step;
    }
    Ok(indices)
}
