use crate::ast::*;
use crate::error::{Error, Result};
use crate::lexer::{syntax_error, Token, Tokenizer};
use crate::value::Value;
use std::collections::VecDeque;

/// Recursive-descent parser over the token stream. Block nesting is enforced
/// through the call stack: body parsing stops at block terminators
/// (`elif`/`else`/`endif`/`endfor`) and the enclosing construct consumes
/// them, so a mismatched or missing closer surfaces exactly where it is
/// detected, with its source position.
pub struct Parser<'a> {
    input: &'a str,
    lexer: Tokenizer<'a>,
    buffer: VecDeque<(Token, usize)>,
    loop_depth: usize,
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            lexer: Tokenizer::new(input),
            buffer: VecDeque::new(),
            loop_depth: 0,
        }
    }

    fn fill(&mut self, n: usize) -> Result<()> {
        while self.buffer.len() <= n {
            match self.lexer.next_token()? {
                Some(spanned) => self.buffer.push_back(spanned),
                None => break,
            }
        }
        Ok(())
    }

    fn peek(&mut self, n: usize) -> Result<Option<&Token>> {
        self.fill(n)?;
        Ok(self.buffer.get(n).map(|(token, _)| token))
    }

    fn peeked(&mut self, n: usize) -> Result<Option<Token>> {
        self.fill(n)?;
        Ok(self.buffer.get(n).map(|(token, _)| token.clone()))
    }

    fn consume(&mut self) -> Result<Option<(Token, usize)>> {
        self.fill(0)?;
        Ok(self.buffer.pop_front())
    }

    /// Byte offset of the next token, or end of input.
    fn offset(&mut self) -> usize {
        let _ = self.fill(0);
        self.buffer
            .front()
            .map(|(_, offset)| *offset)
            .unwrap_or(self.input.len())
    }

    fn error_here(&mut self, message: impl Into<String>) -> Error {
        let offset = self.offset();
        syntax_error(self.input, offset, message)
    }

    fn error_at_end(&self, message: impl Into<String>) -> Error {
        syntax_error(self.input, self.input.len(), message)
    }

    fn expect(&mut self, token: Token) -> Result<()> {
        match self.consume()? {
            Some((t, _)) if t == token => Ok(()),
            Some((t, offset)) => Err(syntax_error(
                self.input,
                offset,
                format!("expected {}, got {}", token.describe(), t.describe()),
            )),
            None => Err(self.error_at_end(format!(
                "expected {}, got end of template",
                token.describe()
            ))),
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<String> {
        match self.consume()? {
            Some((Token::Ident(name), _)) => Ok(name),
            Some((t, offset)) => Err(syntax_error(
                self.input,
                offset,
                format!("expected identifier {}, got {}", what, t.describe()),
            )),
            None => Err(self.error_at_end(format!(
                "expected identifier {}, got end of template",
                what
            ))),
        }
    }

    /// `{%` ahead of a block closer; anything else means the closer is
    /// missing entirely.
    fn expect_block_start(&mut self, closer: &str) -> Result<()> {
        match self.consume()? {
            Some((Token::BlockStart, _)) => Ok(()),
            Some((t, offset)) => Err(syntax_error(
                self.input,
                offset,
                format!("missing directive '{{% {} %}}', got {}", closer, t.describe()),
            )),
            None => Err(self.error_at_end(format!("missing directive '{{% {} %}}'", closer))),
        }
    }

    /// Parse a complete template. Any input left over after the root body is
    /// a stray block terminator.
    pub fn parse_template(&mut self) -> Result<Vec<Node>> {
        let nodes = self.parse_body()?;
        if self.peek(0)?.is_some() {
            let offset = self.offset();
            let message = match self.peeked(1)? {
                Some(Token::Else) => {
                    "unexpected directive - found '{% else %}' without an open 'if' or 'for' block"
                        .to_string()
                }
                Some(Token::Elif) => {
                    "unexpected directive - found '{% elif %}' without an open 'if' block"
                        .to_string()
                }
                Some(Token::EndIf) => {
                    "unexpected directive - found '{% endif %}' without matching '{% if %}'"
                        .to_string()
                }
                Some(Token::EndFor) => {
                    "unexpected directive - found '{% endfor %}' without matching '{% for %}'"
                        .to_string()
                }
                other => format!(
                    "unexpected {}",
                    other.map_or("end of template".to_string(), |t| t.describe())
                ),
            };
            return Err(syntax_error(self.input, offset, message));
        }
        Ok(nodes)
    }

    /// Parse a sequence of nodes up to (not including) a block terminator or
    /// end of input.
    fn parse_body(&mut self) -> Result<Vec<Node>> {
        let mut nodes = Vec::new();
        loop {
            // Lookahead for termination conditions.
            if let Some(Token::BlockStart) = self.peek(0)? {
                if let Some(Token::EndFor | Token::EndIf | Token::Else | Token::Elif) =
                    self.peek(1)?
                {
                    break;
                }
            }
            if self.peek(0)?.is_none() {
                break;
            }

            match self.peeked(0)? {
                Some(Token::Text(s)) => {
                    self.consume()?;
                    nodes.push(Node::Text(s));
                }
                Some(Token::VarStart) => {
                    self.consume()?;
                    nodes.push(self.parse_output()?);
                }
                Some(Token::BlockStart) => {
                    self.consume()?;
                    match self.peeked(0)? {
                        Some(Token::For) => nodes.push(self.parse_for()?),
                        Some(Token::If) => nodes.push(self.parse_if()?),
                        Some(keyword @ (Token::Break | Token::Continue)) => {
                            let offset = self.offset();
                            self.consume()?;
                            let name = if keyword == Token::Break { "break" } else { "continue" };
                            if self.loop_depth == 0 {
                                return Err(syntax_error(
                                    self.input,
                                    offset,
                                    format!("'{{% {} %}}' directive found outside loop", name),
                                ));
                            }
                            self.expect(Token::BlockEnd)?;
                            nodes.push(if name == "break" { Node::Break } else { Node::Continue });
                        }
                        Some(t) => {
                            return Err(self.error_here(format!(
                                "unexpected directive {}",
                                t.describe()
                            )))
                        }
                        None => {
                            return Err(self.error_at_end("unexpected end of template inside directive"))
                        }
                    }
                }
                _ => break,
            }
        }
        Ok(nodes)
    }

    /// `{{` has been consumed; parse the display expression with its
    /// optional filter chain through the closing `}}`.
    fn parse_output(&mut self) -> Result<Node> {
        let expr = self.parse_expr()?;
        let mut filters = Vec::new();

        while let Some(Token::Pipe) = self.peek(0)? {
            self.consume()?;
            let name = match self.consume()? {
                Some((Token::Ident(name), _)) => name,
                Some((t, offset)) => {
                    return Err(syntax_error(
                        self.input,
                        offset,
                        format!("expected filter name after '|', got {}", t.describe()),
                    ))
                }
                None => return Err(self.error_at_end("expected filter name after '|'")),
            };

            let mut args = Vec::new();
            let mut kwargs = Vec::new();
            loop {
                let next = self.peeked(0)?;
                match next {
                    None | Some(Token::Pipe) | Some(Token::VarEnd) => break,
                    Some(Token::Ident(key))
                        if matches!(self.peek(1)?, Some(Token::Assign)) =>
                    {
                        self.consume()?;
                        self.consume()?;
                        kwargs.push((key, self.parse_unary()?));
                    }
                    Some(_) => {
                        if !kwargs.is_empty() {
                            return Err(self.error_here(
                                "positional filter argument after keyword argument",
                            ));
                        }
                        args.push(self.parse_unary()?);
                    }
                }
            }
            filters.push(FilterCall { name, args, kwargs });
        }

        match self.consume()? {
            Some((Token::VarEnd, _)) => Ok(Node::Output { expr, filters }),
            Some((t, offset)) => Err(syntax_error(
                self.input,
                offset,
                format!("expected '|' or '}}}}' in output expression, got {}", t.describe()),
            )),
            None => Err(self.error_at_end("unterminated output expression, expected '}}'")),
        }
    }

    fn parse_for(&mut self) -> Result<Node> {
        self.expect(Token::For)?;

        let mut targets = vec![self.parse_for_target()?];
        while let Some(Token::Comma) = self.peek(0)? {
            self.consume()?;
            targets.push(self.parse_for_target()?);
        }

        self.expect(Token::In)?;
        let iterable = self.parse_expr()?;
        self.expect(Token::BlockEnd)?;

        self.loop_depth += 1;
        let body = self.parse_body()?;
        self.loop_depth -= 1;

        let mut else_body = None;
        self.expect_block_start("endfor")?;
        match self.consume()? {
            Some((Token::EndFor, _)) => self.expect(Token::BlockEnd)?,
            Some((Token::Else, _)) => {
                self.expect(Token::BlockEnd)?;
                else_body = Some(self.parse_body()?);
                self.expect_block_start("endfor")?;
                match self.consume()? {
                    Some((Token::EndFor, _)) => self.expect(Token::BlockEnd)?,
                    Some((t, offset)) => {
                        return Err(syntax_error(
                            self.input,
                            offset,
                            format!(
                                "unexpected directive - found {} expected '{{% endfor %}}'",
                                t.describe()
                            ),
                        ))
                    }
                    None => return Err(self.error_at_end("missing directive '{% endfor %}'")),
                }
            }
            Some((t, offset)) => {
                return Err(syntax_error(
                    self.input,
                    offset,
                    format!(
                        "unexpected directive - found {} expected '{{% endfor %}}'",
                        t.describe()
                    ),
                ))
            }
            None => return Err(self.error_at_end("missing directive '{% endfor %}'")),
        }

        Ok(Node::For {
            targets,
            iterable,
            body,
            else_body,
        })
    }

    /// Loop targets are bare identifiers; dotted or filtered names are
    /// rejected here rather than at render time.
    fn parse_for_target(&mut self) -> Result<String> {
        let name = self.expect_ident("for loop target")?;
        if let Some(Token::Dot | Token::Pipe) = self.peek(0)? {
            return Err(self.error_here(format!("invalid target in for loop '{}'", name)));
        }
        Ok(name)
    }

    fn parse_if(&mut self) -> Result<Node> {
        self.expect(Token::If)?;
        let condition = self.parse_expr()?;
        self.expect(Token::BlockEnd)?;

        let body = self.parse_body()?;
        let mut cases = vec![(condition, body)];
        let mut else_body = None;

        loop {
            // What comes next: {% elif ... %}, {% else %}, or {% endif %}.
            self.expect_block_start("endif")?;
            match self.consume()? {
                Some((Token::Elif, _)) => {
                    let cond = self.parse_expr()?;
                    self.expect(Token::BlockEnd)?;
                    let block = self.parse_body()?;
                    cases.push((cond, block));
                }
                Some((Token::Else, _)) => {
                    self.expect(Token::BlockEnd)?;
                    else_body = Some(self.parse_body()?);
                    // After else, we must see endif.
                    self.expect_block_start("endif")?;
                    match self.consume()? {
                        Some((Token::EndIf, _)) => {
                            self.expect(Token::BlockEnd)?;
                            break;
                        }
                        Some((Token::Else, offset)) => {
                            return Err(syntax_error(
                                self.input,
                                offset,
                                "unexpected directive - found '{% else %}' expected '{% endif %}'",
                            ))
                        }
                        Some((t, offset)) => {
                            return Err(syntax_error(
                                self.input,
                                offset,
                                format!(
                                    "unexpected directive - found {} expected '{{% endif %}}'",
                                    t.describe()
                                ),
                            ))
                        }
                        None => return Err(self.error_at_end("missing directive '{% endif %}'")),
                    }
                }
                Some((Token::EndIf, _)) => {
                    self.expect(Token::BlockEnd)?;
                    break;
                }
                Some((Token::EndFor, offset)) => {
                    return Err(syntax_error(
                        self.input,
                        offset,
                        "unexpected directive - found '{% endfor %}' expected '{% endif %}'",
                    ))
                }
                Some((t, offset)) => {
                    return Err(syntax_error(
                        self.input,
                        offset,
                        format!("expected 'elif', 'else', or 'endif', got {}", t.describe()),
                    ))
                }
                None => return Err(self.error_at_end("missing directive '{% endif %}'")),
            }
        }

        Ok(Node::If { cases, else_body })
    }

    // ── Expression grammar, loosest binding first ──

    fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_and()?;
        while let Some(Token::Or) = self.peek(0)? {
            self.consume()?;
            let rhs = self.parse_and()?;
            lhs = Expr::BinOp(Box::new(lhs), BinOp::Or, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_not()?;
        while let Some(Token::And) = self.peek(0)? {
            self.consume()?;
            let rhs = self.parse_not()?;
            lhs = Expr::BinOp(Box::new(lhs), BinOp::And, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr> {
        if let Some(Token::Not) = self.peek(0)? {
            self.consume()?;
            let operand = self.parse_not()?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(operand)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peeked(0)? {
                Some(Token::EqEq) => BinOp::Eq,
                Some(Token::NotEq) => BinOp::NotEq,
                Some(Token::Lt) => BinOp::Lt,
                Some(Token::LtEq) => BinOp::LtEq,
                Some(Token::Gt) => BinOp::Gt,
                Some(Token::GtEq) => BinOp::GtEq,
                Some(Token::In) => BinOp::In,
                Some(Token::Not) if matches!(self.peek(1)?, Some(Token::In)) => {
                    self.consume()?; // extra token of the two-word operator
                    BinOp::NotIn
                }
                _ => break,
            };
            self.consume()?;
            let rhs = self.parse_additive()?;
            lhs = Expr::BinOp(Box::new(lhs), op, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek(0)? {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            self.consume()?;
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::BinOp(Box::new(lhs), op, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek(0)? {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                Some(Token::SlashSlash) => BinOp::FloorDiv,
                Some(Token::Percent) => BinOp::Mod,
                _ => break,
            };
            self.consume()?;
            let rhs = self.parse_unary()?;
            lhs = Expr::BinOp(Box::new(lhs), op, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if let Some(Token::Minus) = self.peek(0)? {
            self.consume()?;
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(operand)));
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> Result<Expr> {
        let base = self.parse_postfix()?;
        if let Some(Token::StarStar) = self.peek(0)? {
            self.consume()?;
            // Right-associative; the exponent may carry its own unary minus.
            let exponent = self.parse_unary()?;
            return Ok(Expr::BinOp(Box::new(base), BinOp::Pow, Box::new(exponent)));
        }
        Ok(base)
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut expr = self.parse_atom()?;
        loop {
            match self.peek(0)? {
                Some(Token::Dot) => {
                    self.consume()?;
                    let segment = self.expect_ident("after '.'")?;
                    // Dotted chains on bare names stay a single dotted name,
                    // so resolution failures can report the full path.
                    if let Expr::Name(segments) = &mut expr {
                        segments.push(segment);
                    } else {
                        expr = Expr::Attribute(Box::new(expr), segment);
                    }
                }
                Some(Token::LBracket) => {
                    self.consume()?;
                    expr = self.parse_subscript(expr)?;
                }
                Some(Token::LParen) => {
                    self.consume()?;
                    expr = self.parse_call(expr)?;
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    /// `[` has been consumed; parse an index or slice through `]`.
    fn parse_subscript(&mut self, target: Expr) -> Result<Expr> {
        if let Some(Token::Colon) = self.peek(0)? {
            self.consume()?;
            return self.parse_slice_rest(target, None);
        }
        let first = self.parse_expr()?;
        if let Some(Token::Colon) = self.peek(0)? {
            self.consume()?;
            return self.parse_slice_rest(target, Some(first));
        }
        self.expect(Token::RBracket)?;
        Ok(Expr::Index(Box::new(target), Box::new(first)))
    }

    /// The first `:` of a slice has been consumed.
    fn parse_slice_rest(&mut self, target: Expr, start: Option<Expr>) -> Result<Expr> {
        let stop = match self.peek(0)? {
            Some(Token::Colon) | Some(Token::RBracket) => None,
            _ => Some(self.parse_expr()?),
        };
        let step = if let Some(Token::Colon) = self.peek(0)? {
            self.consume()?;
            match self.peek(0)? {
                Some(Token::RBracket) => None,
                _ => Some(self.parse_expr()?),
            }
        } else {
            None
        };
        self.expect(Token::RBracket)?;
        Ok(Expr::Slice {
            target: Box::new(target),
            start: start.map(Box::new),
            stop: stop.map(Box::new),
            step: step.map(Box::new),
        })
    }

    /// `(` has been consumed; parse call arguments through `)`.
    fn parse_call(&mut self, target: Expr) -> Result<Expr> {
        let mut args = Vec::new();
        let mut kwargs = Vec::new();

        if let Some(Token::RParen) = self.peek(0)? {
            self.consume()?;
            return Ok(Expr::Call {
                target: Box::new(target),
                args,
                kwargs,
            });
        }

        loop {
            match self.peeked(0)? {
                Some(Token::StarStar) => {
                    self.consume()?;
                    kwargs.push(KwArg::Splat(self.parse_expr()?));
                }
                Some(Token::Ident(name)) if matches!(self.peek(1)?, Some(Token::Assign)) => {
                    self.consume()?;
                    self.consume()?;
                    kwargs.push(KwArg::Named(name, self.parse_expr()?));
                }
                _ => {
                    if !kwargs.is_empty() {
                        return Err(
                            self.error_here("positional argument follows keyword argument")
                        );
                    }
                    args.push(self.parse_expr()?);
                }
            }

            match self.consume()? {
                Some((Token::Comma, _)) => continue,
                Some((Token::RParen, _)) => break,
                Some((t, offset)) => {
                    return Err(syntax_error(
                        self.input,
                        offset,
                        format!("expected ',' or ')' in call arguments, got {}", t.describe()),
                    ))
                }
                None => return Err(self.error_at_end("unterminated call, expected ')'")),
            }
        }

        Ok(Expr::Call {
            target: Box::new(target),
            args,
            kwargs,
        })
    }

    fn parse_atom(&mut self) -> Result<Expr> {
        match self.consume()? {
            Some((Token::StringLit(s), _)) => Ok(Expr::Literal(Value::Str(s))),
            Some((Token::IntLit(n), _)) => Ok(Expr::Literal(Value::Int(n))),
            Some((Token::FloatLit(x), _)) => Ok(Expr::Literal(Value::Float(x))),
            Some((Token::True, _)) => Ok(Expr::Literal(Value::Bool(true))),
            Some((Token::False, _)) => Ok(Expr::Literal(Value::Bool(false))),
            Some((Token::NoneLit, _)) => Ok(Expr::Literal(Value::None)),
            Some((Token::Ident(name), _)) => Ok(Expr::Name(vec![name])),
            Some((Token::LParen, _)) => {
                let e = self.parse_expr()?;
                self.expect(Token::RParen)?;
                Ok(e)
            }
            Some((Token::LBracket, _)) => self.parse_list_literal(),
            Some((Token::LBrace, _)) => self.parse_map_literal(),
            Some((t, offset)) => Err(syntax_error(
                self.input,
                offset,
                format!("expected expression, got {}", t.describe()),
            )),
            None => Err(self.error_at_end("expected expression, got end of template")),
        }
    }

    fn parse_list_literal(&mut self) -> Result<Expr> {
        let mut items = Vec::new();
        if let Some(Token::RBracket) = self.peek(0)? {
            self.consume()?;
            return Ok(Expr::List(items));
        }
        loop {
            items.push(self.parse_expr()?);
            match self.consume()? {
                Some((Token::Comma, _)) => continue,
                Some((Token::RBracket, _)) => break,
                Some((t, offset)) => {
                    return Err(syntax_error(
                        self.input,
                        offset,
                        format!("expected ',' or ']' in list literal, got {}", t.describe()),
                    ))
                }
                None => return Err(self.error_at_end("unterminated list literal, expected ']'")),
            }
        }
        Ok(Expr::List(items))
    }

    fn parse_map_literal(&mut self) -> Result<Expr> {
        let mut entries = Vec::new();
        if let Some(Token::RBrace) = self.peek(0)? {
            self.consume()?;
            return Ok(Expr::Map(entries));
        }
        loop {
            let key = self.parse_expr()?;
            self.expect(Token::Colon)?;
            let value = self.parse_expr()?;
            entries.push((key, value));
            match self.consume()? {
                Some((Token::Comma, _)) => continue,
                Some((Token::RBrace, _)) => break,
                Some((t, offset)) => {
                    return Err(syntax_error(
                        self.input,
                        offset,
                        format!("expected ',' or '}}' in map literal, got {}", t.describe()),
                    ))
                }
                None => return Err(self.error_at_end("unterminated map literal, expected '}'")),
            }
        }
        Ok(Expr::Map(entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> Result<Vec<Node>> {
        Parser::new(input).parse_template()
    }

    fn parse_err(input: &str) -> String {
        parse(input).unwrap_err().to_string()
    }

    #[test]
    fn literal_text_only() {
        let nodes = parse("just text").unwrap();
        assert_eq!(nodes, vec![Node::Text("just text".to_string())]);
    }

    #[test]
    fn output_with_dotted_name() {
        let nodes = parse("{{ user.name }}").unwrap();
        assert_eq!(
            nodes,
            vec![Node::Output {
                expr: Expr::Name(vec!["user".to_string(), "name".to_string()]),
                filters: vec![],
            }]
        );
    }

    #[test]
    fn filter_chain_with_arguments() {
        let nodes = parse("{{ name|center 9 '*'|cut '-' }}").unwrap();
        match &nodes[0] {
            Node::Output { filters, .. } => {
                assert_eq!(filters.len(), 2);
                assert_eq!(filters[0].name, "center");
                assert_eq!(
                    filters[0].args,
                    vec![
                        Expr::Literal(Value::Int(9)),
                        Expr::Literal(Value::Str("*".to_string())),
                    ]
                );
                assert_eq!(filters[1].name, "cut");
            }
            other => panic!("expected output node, got {:?}", other),
        }
    }

    #[test]
    fn precedence_or_binds_loosest() {
        let nodes = parse("{{ a or b and c }}").unwrap();
        match &nodes[0] {
            Node::Output { expr, .. } => match expr {
                Expr::BinOp(_, BinOp::Or, rhs) => {
                    assert!(matches!(**rhs, Expr::BinOp(_, BinOp::And, _)));
                }
                other => panic!("expected or at the root, got {:?}", other),
            },
            other => panic!("expected output node, got {:?}", other),
        }
    }

    #[test]
    fn power_binds_tighter_than_unary_minus() {
        let nodes = parse("{{ -2 ** 2 }}").unwrap();
        match &nodes[0] {
            Node::Output { expr, .. } => {
                assert!(matches!(expr, Expr::Unary(UnaryOp::Neg, _)));
            }
            other => panic!("expected output node, got {:?}", other),
        }
    }

    #[test]
    fn multi_target_for_loop() {
        let nodes = parse("{% for k, v in pairs %}x{% endfor %}").unwrap();
        match &nodes[0] {
            Node::For { targets, .. } => {
                assert_eq!(targets, &["k".to_string(), "v".to_string()]);
            }
            other => panic!("expected for node, got {:?}", other),
        }
    }

    #[test]
    fn for_loop_with_else_body() {
        let nodes = parse("{% for n in xs %}a{% else %}b{% endfor %}").unwrap();
        match &nodes[0] {
            Node::For { else_body, .. } => assert!(else_body.is_some()),
            other => panic!("expected for node, got {:?}", other),
        }
    }

    #[test]
    fn dotted_for_target_is_rejected() {
        let err = parse_err("{% for plip.x in dummy %}{% endfor %}");
        assert!(err.contains("invalid target in for loop"), "{}", err);
    }

    #[test]
    fn break_outside_loop_is_a_compile_error() {
        let err = parse_err("{% break %}");
        assert!(err.contains("'{% break %}' directive found outside loop"), "{}", err);
    }

    #[test]
    fn continue_outside_loop_is_a_compile_error() {
        let err = parse_err("{% continue %}");
        assert!(
            err.contains("'{% continue %}' directive found outside loop"),
            "{}",
            err
        );
    }

    #[test]
    fn break_inside_if_inside_for_is_accepted() {
        assert!(parse("{% for n in xs %}{% if n %}{% break %}{% endif %}{% endfor %}").is_ok());
    }

    #[test]
    fn missing_endif_is_reported() {
        let err = parse_err("{% if x %}body");
        assert!(err.contains("missing directive '{% endif %}'"), "{}", err);
    }

    #[test]
    fn missing_endfor_is_reported() {
        let err = parse_err("{% for n in xs %}body");
        assert!(err.contains("missing directive '{% endfor %}'"), "{}", err);
    }

    #[test]
    fn endfor_closing_an_if_is_a_mismatch() {
        let err = parse_err("{% if x %}body{% endfor %}");
        assert!(
            err.contains("found '{% endfor %}' expected '{% endif %}'"),
            "{}",
            err
        );
    }

    #[test]
    fn stray_else_is_reported() {
        let err = parse_err("{% else %}");
        assert!(
            err.contains("found '{% else %}' without an open 'if' or 'for' block"),
            "{}",
            err
        );
    }

    #[test]
    fn double_else_is_reported() {
        let err = parse_err("{% if x %}a{% else %}b{% else %}c{% endif %}");
        assert!(
            err.contains("found '{% else %}' expected '{% endif %}'"),
            "{}",
            err
        );
    }

    #[test]
    fn filter_name_must_be_identifier() {
        let err = parse_err("{{ name|'nope' }}");
        assert!(err.contains("expected filter name"), "{}", err);
    }

    #[test]
    fn filters_cannot_feed_back_into_expressions() {
        // The chain must run to `}}`; an operator after a filter is an error.
        let err = parse_err("{{ a|len + 1 }}");
        assert!(err.contains("expected expression"), "{}", err);
    }

    #[test]
    fn syntax_errors_carry_positions() {
        let err = parse("line one\n{{ }}").unwrap_err();
        match err {
            Error::Syntax { line, .. } => assert_eq!(line, 2),
            other => panic!("expected syntax error, got {:?}", other),
        }
    }
}
