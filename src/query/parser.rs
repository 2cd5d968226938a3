//! Recursive-descent parser for the render-target expression language.
//!
//! One pass, no semantic checks. Identifiers are deliberately permissive:
//! they cover full metric paths including globs (`a.*.b`, `a.{b,c}`,
//! `a.b[0-9]`). Braces nest, and commas inside braces belong to the
//! identifier, not the argument list.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};

/// One node of a parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A numeric literal argument.
    Const(f64),
    /// A quoted string argument (no escapes).
    Str(String),
    /// A metric pattern, or a bare identifier such as `true`/`false`.
    Name(String),
    /// A function call.
    Func(FuncExpr),
}

/// A function call with its positional and named arguments.
///
/// `arg_string` is the literal source between the call's parentheses,
/// whitespace preserved. Output series names are built from it, so it is
/// carried through evaluation rather than re-serialized.
#[derive(Debug, Clone, PartialEq)]
pub struct FuncExpr {
    pub name: String,
    pub args: Vec<Expr>,
    pub named_args: HashMap<String, Expr>,
    pub arg_string: String,
}

impl Expr {
    /// The display name of this node: the pattern for names, the literal
    /// rendering for constants and strings, `name(arg_string)` for calls.
    pub fn display_name(&self) -> String {
        match self {
            Expr::Const(v) => format!("{}", v),
            Expr::Str(s) => s.clone(),
            Expr::Name(n) => n.clone(),
            Expr::Func(f) => format!("{}({})", f.name, f.arg_string),
        }
    }
}

/// What went wrong while parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// The input (or an argument position) was empty.
    Empty,
    /// A quoted string never saw its closing quote.
    UnterminatedString,
    /// A numeric literal failed to parse.
    BadNumber,
    /// An argument list was not closed, or a stray delimiter appeared.
    UnmatchedParen,
    /// A named argument's value was not a constant, string, or identifier.
    BadNamedArgument,
    /// The top-level expression was followed by unconsumed input.
    TrailingInput,
}

/// A syntax error with a byte-position cursor into the query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub pos: usize,
    pub kind: ParseErrorKind,
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let what = match self.kind {
            ParseErrorKind::Empty => "empty expression",
            ParseErrorKind::UnterminatedString => "unterminated string",
            ParseErrorKind::BadNumber => "bad number",
            ParseErrorKind::UnmatchedParen => "unmatched parenthesis",
            ParseErrorKind::BadNamedArgument => "bad named argument",
            ParseErrorKind::TrailingInput => "trailing input",
        };
        write!(f, "parse error at position {}: {}", self.pos, what)
    }
}

impl std::error::Error for ParseError {}

/// Parses one complete expression. Trailing input is an error.
pub fn parse(query: &str) -> Result<Expr, ParseError> {
    let mut p = Parser::new(query);
    let e = p.parse_expr()?;
    if !p.at_eof() {
        return Err(p.error(ParseErrorKind::TrailingInput));
    }
    Ok(e)
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        let Some(c) = self.peek() else {
            return Err(self.error(ParseErrorKind::Empty));
        };

        if c.is_ascii_digit() || (matches!(c, '+' | '-') && self.next_starts_number()) {
            return self.parse_const();
        }
        if c == '\'' || c == '"' {
            return self.parse_string(c);
        }

        let name = self.parse_name();
        if name.is_empty() {
            return Err(self.error(ParseErrorKind::Empty));
        }
        if self.peek() == Some('(') {
            let (args, named_args, arg_string) = self.parse_arg_list()?;
            return Ok(Expr::Func(FuncExpr {
                name,
                args,
                named_args,
                arg_string,
            }));
        }
        Ok(Expr::Name(name))
    }

    /// Numeric literals slurp every character that could belong to a float
    /// and let the float parser sort them out.
    fn parse_const(&mut self) -> Result<Expr, ParseError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || matches!(c, '.' | '+' | '-' | 'e' | 'E') {
                self.bump();
            } else {
                break;
            }
        }
        let text = &self.input[start..self.pos];
        text.parse::<f64>().map(Expr::Const).map_err(|_| ParseError {
            pos: start,
            kind: ParseErrorKind::BadNumber,
        })
    }

    fn parse_string(&mut self, quote: char) -> Result<Expr, ParseError> {
        let open = self.pos;
        self.bump();
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == quote {
                let s = self.input[start..self.pos].to_string();
                self.bump();
                return Ok(Expr::Str(s));
            }
            self.bump();
        }
        Err(ParseError {
            pos: open,
            kind: ParseErrorKind::UnterminatedString,
        })
    }

    /// Identifiers run until a delimiter. Braces nest and protect commas:
    /// `foo.{bar,baz}.qux` is one name.
    fn parse_name(&mut self) -> String {
        let start = self.pos;
        let mut braces = 0usize;
        while let Some(c) = self.peek() {
            match c {
                '{' => braces += 1,
                '}' => {
                    if braces == 0 {
                        break;
                    }
                    braces -= 1;
                }
                ',' => {
                    if braces == 0 {
                        break;
                    }
                }
                '(' | ')' | '=' | '\'' | '"' => break,
                c if c.is_whitespace() => break,
                _ => {}
            }
            self.bump();
        }
        self.input[start..self.pos].to_string()
    }

    #[allow(clippy::type_complexity)]
    fn parse_arg_list(
        &mut self,
    ) -> Result<(Vec<Expr>, HashMap<String, Expr>, String), ParseError> {
        let open = self.pos;
        self.bump(); // consume '('
        let args_start = self.pos;

        let mut args = Vec::new();
        let mut named_args = HashMap::new();

        loop {
            let arg = self.parse_expr()?;

            // An identifier directly followed by `=` is a named argument.
            if let (Expr::Name(key), Some('=')) = (&arg, self.peek()) {
                let key = key.clone();
                self.bump();
                let value_pos = self.pos;
                let value = self.parse_expr()?;
                if !matches!(value, Expr::Const(_) | Expr::Str(_) | Expr::Name(_)) {
                    return Err(ParseError {
                        pos: value_pos,
                        kind: ParseErrorKind::BadNamedArgument,
                    });
                }
                named_args.insert(key, value);
            } else {
                args.push(arg);
            }

            match self.peek() {
                Some(')') => {
                    let arg_string = self.input[args_start..self.pos].to_string();
                    self.bump();
                    return Ok((args, named_args, arg_string));
                }
                Some(',') => {
                    self.bump();
                    while self.peek().is_some_and(|c| c == ' ') {
                        self.bump();
                    }
                }
                _ => {
                    return Err(ParseError {
                        pos: open,
                        kind: ParseErrorKind::UnmatchedParen,
                    })
                }
            }
        }
    }

    fn next_starts_number(&self) -> bool {
        let mut it = self.input[self.pos..].chars();
        it.next();
        matches!(it.next(), Some(c) if c.is_ascii_digit() || c == '.')
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn bump(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }

    fn at_eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn error(&self, kind: ParseErrorKind) -> ParseError {
        ParseError {
            pos: self.pos,
            kind,
        }
    }
}
