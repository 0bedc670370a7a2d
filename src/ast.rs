use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinOp {
    Or,
    And,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    In,
    NotIn,
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Or => "or",
            BinOp::And => "and",
            BinOp::Eq => "==",
            BinOp::NotEq => "!=",
            BinOp::Lt => "<",
            BinOp::LtEq => "<=",
            BinOp::Gt => ">",
            BinOp::GtEq => ">=",
            BinOp::In => "in",
            BinOp::NotIn => "not in",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::FloorDiv => "//",
            BinOp::Mod => "%",
            BinOp::Pow => "**",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOp {
    Not,
    Neg,
}

/// A keyword argument in a call expression: either an explicit `name=expr`
/// pair or a `**expr` mapping splat contributing its entries.
#[derive(Debug, Clone, PartialEq)]
pub enum KwArg {
    Named(String, Expr),
    Splat(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    /// A dotted name such as `user.address.city`, resolved per segment
    /// against the context.
    Name(Vec<String>),
    /// Attribute access on a non-name base, e.g. `items[0].label`. Uses the
    /// same per-segment resolution as `Name`.
    Attribute(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Slice {
        target: Box<Expr>,
        start: Option<Box<Expr>>,
        stop: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
    },
    Call {
        target: Box<Expr>,
        args: Vec<Expr>,
        kwargs: Vec<KwArg>,
    },
    List(Vec<Expr>),
    Map(Vec<(Expr, Expr)>),
    Unary(UnaryOp, Box<Expr>),
    BinOp(Box<Expr>, BinOp, Box<Expr>),
}

/// One filter application in a display expression's chain.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCall {
    pub name: String,
    pub args: Vec<Expr>,
    pub kwargs: Vec<(String, Expr)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    /// A `{{ ... }}` display expression with its trailing filter chain.
    /// Filters live here, not in `Expr`: a chain is only legal as the
    /// outermost wrapper of a display expression.
    Output {
        expr: Expr,
        filters: Vec<FilterCall>,
    },
    If {
        cases: Vec<(Expr, Vec<Node>)>, // (condition, body). Includes if and elifs.
        else_body: Option<Vec<Node>>,
    },
    For {
        targets: Vec<String>,
        iterable: Expr,
        body: Vec<Node>,
        else_body: Option<Vec<Node>>,
    },
    Break,
    Continue,
}
