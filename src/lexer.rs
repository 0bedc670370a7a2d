use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Text(String),
    BlockStart, // {%
    BlockEnd,   // %}
    VarStart,   // {{
    VarEnd,     // }}

    // Keywords
    If,
    Elif,
    Else,
    EndIf,
    For,
    In,
    EndFor,
    Break,
    Continue,
    And,
    Or,
    Not,
    True,
    False,
    NoneLit,

    // Symbols
    EqEq,       // ==
    NotEq,      // !=
    Lt,         // <
    LtEq,       // <=
    Gt,         // >
    GtEq,       // >=
    Plus,       // +
    Minus,      // -
    Star,       // *
    StarStar,   // **
    Slash,      // /
    SlashSlash, // //
    Percent,    // %
    Pipe,       // |
    Dot,        // .
    Comma,      // ,
    Colon,      // :
    Assign,     // =
    LBracket,   // [
    RBracket,   // ]
    LParen,     // (
    RParen,     // )
    LBrace,     // {
    RBrace,     // }

    // Data
    Ident(String),
    StringLit(String),
    IntLit(i64),
    FloatLit(f64),
}

impl Token {
    /// Short human-readable form for diagnostics.
    pub fn describe(&self) -> String {
        match self {
            Token::Text(_) => "text".to_string(),
            Token::BlockStart => "'{%'".to_string(),
            Token::BlockEnd => "'%}'".to_string(),
            Token::VarStart => "'{{'".to_string(),
            Token::VarEnd => "'}}'".to_string(),
            Token::Ident(name) => format!("'{}'", name),
            Token::StringLit(_) => "string literal".to_string(),
            Token::IntLit(n) => format!("'{}'", n),
            Token::FloatLit(x) => format!("'{}'", x),
            Token::If => "'if'".to_string(),
            Token::Elif => "'elif'".to_string(),
            Token::Else => "'else'".to_string(),
            Token::EndIf => "'endif'".to_string(),
            Token::For => "'for'".to_string(),
            Token::In => "'in'".to_string(),
            Token::EndFor => "'endfor'".to_string(),
            Token::Break => "'break'".to_string(),
            Token::Continue => "'continue'".to_string(),
            Token::And => "'and'".to_string(),
            Token::Or => "'or'".to_string(),
            Token::Not => "'not'".to_string(),
            Token::True => "'true'".to_string(),
            Token::False => "'false'".to_string(),
            Token::NoneLit => "'none'".to_string(),
            Token::EqEq => "'=='".to_string(),
            Token::NotEq => "'!='".to_string(),
            Token::Lt => "'<'".to_string(),
            Token::LtEq => "'<='".to_string(),
            Token::Gt => "'>'".to_string(),
            Token::GtEq => "'>='".to_string(),
            Token::Plus => "'+'".to_string(),
            Token::Minus => "'-'".to_string(),
            Token::Star => "'*'".to_string(),
            Token::StarStar => "'**'".to_string(),
            Token::Slash => "'/'".to_string(),
            Token::SlashSlash => "'//'".to_string(),
            Token::Percent => "'%'".to_string(),
            Token::Pipe => "'|'".to_string(),
            Token::Dot => "'.'".to_string(),
            Token::Comma => "','".to_string(),
            Token::Colon => "':'".to_string(),
            Token::Assign => "'='".to_string(),
            Token::LBracket => "'['".to_string(),
            Token::RBracket => "']'".to_string(),
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
            Token::LBrace => "'{'".to_string(),
            Token::RBrace => "'}'".to_string(),
        }
    }
}

/// 1-based (line, column) of a byte offset within `input`.
pub(crate) fn position(input: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(input.len());
    let before = &input[..offset];
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
    let column = before[line_start..].chars().count() + 1;
    (line, column)
}

pub(crate) fn syntax_error(input: &str, offset: usize, message: impl Into<String>) -> Error {
    let (line, column) = position(input, offset);
    Error::Syntax {
        message: message.into(),
        line,
        column,
    }
}

/// Two-mode tokenizer: text mode outside directives, expression mode inside
/// `{{ }}` / `{% %}`. Comments (`{# #}`) are consumed whole in text mode and
/// never surface as tokens.
#[derive(Clone)]
pub struct Tokenizer<'a> {
    input: &'a str,
    cursor: usize,
    in_tag: bool,
    tag_open: usize,
    trim_blocks: bool,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            cursor: 0,
            in_tag: false,
            tag_open: 0,
            trim_blocks: true,
        }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.cursor..]
    }

    fn advance(&mut self, n: usize) {
        self.cursor += n;
    }

    fn error(&self, offset: usize, message: impl Into<String>) -> Error {
        syntax_error(self.input, offset, message)
    }

    /// The next token and the byte offset where it starts, or `None` at end
    /// of input.
    pub fn next_token(&mut self) -> Result<Option<(Token, usize)>> {
        loop {
            if !self.in_tag {
                match self.next_in_text()? {
                    Some(spanned) => return Ok(Some(spanned)),
                    // A comment was skipped; go round again.
                    None if self.cursor < self.input.len() => continue,
                    None => return Ok(None),
                }
            }
            return self.next_in_tag().map(Some);
        }
    }

    fn next_in_text(&mut self) -> Result<Option<(Token, usize)>> {
        let rest = self.remaining();
        if rest.is_empty() {
            return Ok(None);
        }

        // Find next `{{`, `{%`, or `{#`.
        let next_tag = ["{%", "{{", "{#"]
            .iter()
            .filter_map(|marker| rest.find(marker))
            .min();

        match next_tag {
            Some(0) => {
                let start = self.cursor;
                if rest.starts_with("{#") {
                    // Comments are discarded wholesale; the interior is
                    // never tokenized.
                    match rest.find("#}") {
                        Some(end) => {
                            self.advance(end + 2);
                            Ok(None)
                        }
                        None => Err(self.error(start, "unterminated comment, expected '#}'")),
                    }
                } else if rest.starts_with("{%") {
                    self.advance(2);
                    self.in_tag = true;
                    self.tag_open = start;
                    Ok(Some((Token::BlockStart, start)))
                } else {
                    self.advance(2);
                    self.in_tag = true;
                    self.tag_open = start;
                    Ok(Some((Token::VarStart, start)))
                }
            }
            Some(idx) => {
                let start = self.cursor;
                let text = rest[..idx].to_string();
                self.advance(idx);
                Ok(Some((Token::Text(text), start)))
            }
            None => {
                let start = self.cursor;
                let text = rest.to_string();
                self.advance(rest.len());
                Ok(Some((Token::Text(text), start)))
            }
        }
    }

    fn next_in_tag(&mut self) -> Result<(Token, usize)> {
        // In tag: skip whitespace.
        let rest = self.remaining();
        let rest_trimmed = rest.trim_start();
        self.advance(rest.len() - rest_trimmed.len());

        let rest = self.remaining();
        let start = self.cursor;
        if rest.is_empty() {
            return Err(self.error(
                self.tag_open,
                "unterminated directive, expected closing marker before end of input",
            ));
        }

        // Tag ends.
        if rest.starts_with("%}") {
            self.advance(2);
            self.in_tag = false;

            if self.trim_blocks {
                let after = self.remaining();
                if after.starts_with('\n') {
                    self.advance(1);
                } else if after.starts_with("\r\n") {
                    self.advance(2);
                }
            }

            return Ok((Token::BlockEnd, start));
        }
        if rest.starts_with("}}") {
            self.advance(2);
            self.in_tag = false;
            return Ok((Token::VarEnd, start));
        }

        // Multi-character symbols before their prefixes.
        let two_char = [
            ("==", Token::EqEq),
            ("!=", Token::NotEq),
            ("<=", Token::LtEq),
            (">=", Token::GtEq),
            ("**", Token::StarStar),
            ("//", Token::SlashSlash),
        ];
        for (symbol, token) in two_char {
            if rest.starts_with(symbol) {
                self.advance(2);
                return Ok((token, start));
            }
        }

        let one_char = [
            ('<', Token::Lt),
            ('>', Token::Gt),
            ('=', Token::Assign),
            ('+', Token::Plus),
            ('-', Token::Minus),
            ('*', Token::Star),
            ('/', Token::Slash),
            ('%', Token::Percent),
            ('|', Token::Pipe),
            ('.', Token::Dot),
            (',', Token::Comma),
            (':', Token::Colon),
            ('[', Token::LBracket),
            (']', Token::RBracket),
            ('(', Token::LParen),
            (')', Token::RParen),
            ('{', Token::LBrace),
            ('}', Token::RBrace),
        ];
        let first = rest.chars().next().unwrap();
        for (symbol, token) in one_char {
            if first == symbol {
                self.advance(1);
                return Ok((token, start));
            }
        }

        // Strings. A quoted literal is consumed as a unit, so marker-like
        // text inside it is never treated as a closing marker.
        if first == '\'' || first == '"' {
            let quote = first;
            let mut end_idx = 1;
            let mut s = String::new();
            let mut chars = rest[1..].chars();
            while let Some(c) = chars.next() {
                if c == quote {
                    self.advance(end_idx + 1);
                    return Ok((Token::StringLit(s), start));
                }
                if c == '\\' {
                    end_idx += 1;
                    if let Some(esc) = chars.next() {
                        end_idx += esc.len_utf8();
                        match esc {
                            'n' => s.push('\n'),
                            't' => s.push('\t'),
                            _ => s.push(esc),
                        }
                    }
                } else {
                    end_idx += c.len_utf8();
                    s.push(c);
                }
            }
            return Err(self.error(start, "unterminated string literal"));
        }

        // Numbers.
        if first.is_ascii_digit() {
            let digits: usize = rest.chars().take_while(|c| c.is_ascii_digit()).count();
            let after_int = &rest[digits..];
            let is_float = after_int.starts_with('.')
                && after_int[1..].chars().next().is_some_and(|c| c.is_ascii_digit());
            if is_float {
                let frac: usize = after_int[1..]
                    .chars()
                    .take_while(|c| c.is_ascii_digit())
                    .count();
                let lexeme = &rest[..digits + 1 + frac];
                let value: f64 = lexeme
                    .parse()
                    .map_err(|_| self.error(start, format!("invalid number literal '{}'", lexeme)))?;
                self.advance(lexeme.len());
                return Ok((Token::FloatLit(value), start));
            }
            let lexeme = &rest[..digits];
            let value: i64 = lexeme
                .parse()
                .map_err(|_| self.error(start, format!("integer literal '{}' out of range", lexeme)))?;
            self.advance(lexeme.len());
            return Ok((Token::IntLit(value), start));
        }

        // Identifiers / keywords.
        if first.is_alphabetic() || first == '_' {
            let ident_str: String = rest
                .chars()
                .take_while(|c| c.is_alphanumeric() || *c == '_')
                .collect();
            self.advance(ident_str.len());

            let token = match ident_str.as_str() {
                "if" => Token::If,
                "elif" => Token::Elif,
                "else" => Token::Else,
                "endif" => Token::EndIf,
                "for" => Token::For,
                "in" => Token::In,
                "endfor" => Token::EndFor,
                "break" => Token::Break,
                "continue" => Token::Continue,
                "and" => Token::And,
                "or" => Token::Or,
                "not" => Token::Not,
                "true" => Token::True,
                "false" => Token::False,
                "none" => Token::NoneLit,
                _ => Token::Ident(ident_str),
            };
            return Ok((token, start));
        }

        Err(self.error(start, format!("unexpected character '{}' in directive", first)))
    }
}
