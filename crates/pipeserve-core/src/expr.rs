//! Evaluator for pipeline construction expressions.
//!
//! Catalog entries describe a pipeline with a small assignment language:
//!
//! ```text
//! retriever = remote(url = "http://bm25:8000", inputs = ["qid", "query"])
//! pipeline = retriever >> rename(from = "text", to = "body")
//! ```
//!
//! The grammar is:
//!
//! ```text
//! program   := statement ((NEWLINE | ';') statement)*
//! statement := IDENT '=' expr
//! expr      := term ('>>' term)*
//! term      := name '(' args? ')' | name | '(' expr ')'
//! name      := IDENT ('.' IDENT)*
//! args      := arg (',' arg)* ','?
//! arg       := IDENT '=' literal | literal
//! literal   := STRING | NUMBER | True | False | None | '[' literal,* ']'
//! ```
//!
//! Names resolve to earlier bindings first, then to constructors in the
//! [`BuilderTable`]. Nothing else is reachable. Newlines inside brackets are
//! ignored and `#` starts a comment.

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::{Number, Value as JsonValue};

use crate::{
    builders::{BuildError, BuilderArgs, BuilderTable},
    pipeline::{Compose, Pipeline},
};

/// Errors raised while parsing or evaluating an expression.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExprError {
    #[error("syntax error at line {line}, column {column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("name '{0}' is not defined")]
    UnknownName(String),

    #[error("no pipeline builder named '{0}'")]
    UnknownBuilder(String),

    #[error("{builder}: {source}")]
    Build {
        builder: String,
        #[source]
        source: BuildError,
    },
}

/// Bindings produced by evaluating a program, in assignment order.
#[derive(Debug, Default, Clone)]
pub struct Bindings {
    values: IndexMap<String, Arc<dyn Pipeline>>,
}

impl Bindings {
    /// Names that designate the resulting pipeline, in priority order.
    pub const RESULT_NAMES: [&'static str; 2] = ["pipeline", "p"];

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Pipeline>> {
        self.values.get(name)
    }

    /// The resulting pipeline: the `pipeline` binding, else `p`.
    #[must_use]
    pub fn pipeline(&self) -> Option<Arc<dyn Pipeline>> {
        Self::RESULT_NAMES
            .iter()
            .find_map(|name| self.values.get(*name))
            .cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

/// Parses and evaluates `source` against `builders`.
///
/// # Errors
///
/// Returns [`ExprError`] on a syntax error, an unresolvable name, or a
/// failing constructor.
pub fn evaluate(source: &str, builders: &BuilderTable) -> Result<Bindings, ExprError> {
    let program = parse(source)?;
    let mut bindings = Bindings::default();
    for Statement { target, value } in program.statements {
        let pipeline = eval_expr(&value, builders, &bindings)?;
        bindings.values.insert(target, pipeline);
    }
    Ok(bindings)
}

/// Parsed program.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub target: String,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Constructor call.
    Call { name: String, args: BuilderArgs },
    /// Bare name.
    Name(String),
    /// `a >> b >> ...`
    Compose(Vec<Expr>),
}

/// Parses `source` without evaluating it.
///
/// # Errors
///
/// Returns [`ExprError::Syntax`] with the position of the offending token.
pub fn parse(source: &str) -> Result<Program, ExprError> {
    let tokens = Lexer::new(source).tokenize()?;
    Parser {
        tokens,
        pos: 0,
        depth: 0,
    }
    .program()
}

fn eval_expr(
    expr: &Expr,
    builders: &BuilderTable,
    bindings: &Bindings,
) -> Result<Arc<dyn Pipeline>, ExprError> {
    match expr {
        Expr::Name(name) => {
            if let Some(bound) = bindings.get(name) {
                return Ok(Arc::clone(bound));
            }
            if builders.contains(name) {
                return call(name, &BuilderArgs::default(), builders);
            }
            Err(ExprError::UnknownName(name.clone()))
        }
        Expr::Call { name, args } => call(name, args, builders),
        Expr::Compose(stages) => {
            let stages = stages
                .iter()
                .map(|stage| eval_expr(stage, builders, bindings))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Compose::chain(stages))
        }
    }
}

fn call(
    name: &str,
    args: &BuilderArgs,
    builders: &BuilderTable,
) -> Result<Arc<dyn Pipeline>, ExprError> {
    let builder = builders
        .get(name)
        .ok_or_else(|| ExprError::UnknownBuilder(name.to_string()))?;
    builder(args).map_err(|source| ExprError::Build {
        builder: name.to_string(),
        source,
    })
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Str(String),
    Num(Number),
    True,
    False,
    None,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Assign,
    Shift,
    Sep,
    Eof,
}

impl Tok {
    fn describe(&self) -> String {
        match self {
            Self::Ident(name) => format!("name '{name}'"),
            Self::Str(_) => "string".to_string(),
            Self::Num(_) => "number".to_string(),
            Self::True | Self::False => "boolean".to_string(),
            Self::None => "None".to_string(),
            Self::LParen => "'('".to_string(),
            Self::RParen => "')'".to_string(),
            Self::LBracket => "'['".to_string(),
            Self::RBracket => "']'".to_string(),
            Self::Comma => "','".to_string(),
            Self::Dot => "'.'".to_string(),
            Self::Assign => "'='".to_string(),
            Self::Shift => "'>>'".to_string(),
            Self::Sep => "end of statement".to_string(),
            Self::Eof => "end of input".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    line: usize,
    column: usize,
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    depth: usize,
}

impl Lexer {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            depth: 0,
        }
    }

    fn error(&self, message: impl Into<String>) -> ExprError {
        ExprError::Syntax {
            line: self.line,
            column: self.column,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_next(&self) -> Option<char> {
        self.chars.get(self.pos + 1).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn tokenize(mut self) -> Result<Vec<Token>, ExprError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_blank();
            let (line, column) = (self.line, self.column);
            let Some(c) = self.peek() else {
                tokens.push(Token {
                    tok: Tok::Eof,
                    line,
                    column,
                });
                return Ok(tokens);
            };

            let tok = match c {
                '\n' | ';' => {
                    self.bump();
                    if self.depth > 0 {
                        if c == ';' {
                            return Err(self.error("';' inside brackets"));
                        }
                        continue;
                    }
                    Tok::Sep
                }
                '(' | '[' => {
                    self.bump();
                    self.depth += 1;
                    if c == '(' { Tok::LParen } else { Tok::LBracket }
                }
                ')' | ']' => {
                    self.bump();
                    self.depth = self.depth.saturating_sub(1);
                    if c == ')' { Tok::RParen } else { Tok::RBracket }
                }
                ',' => {
                    self.bump();
                    Tok::Comma
                }
                '.' => {
                    self.bump();
                    Tok::Dot
                }
                '=' => {
                    self.bump();
                    Tok::Assign
                }
                '>' if self.peek_next() == Some('>') => {
                    self.bump();
                    self.bump();
                    Tok::Shift
                }
                '"' | '\'' => self.string(c)?,
                '-' | '0'..='9' => self.number()?,
                c if c.is_alphabetic() || c == '_' => self.word(),
                other => return Err(self.error(format!("unexpected character '{other}'"))),
            };
            tokens.push(Token { tok, line, column });
        }
    }

    fn skip_blank(&mut self) {
        while let Some(c) = self.peek() {
            match c {
                '#' => {
                    while self.peek().is_some_and(|c| c != '\n') {
                        self.bump();
                    }
                }
                '\\' if self.peek_next() == Some('\n') => {
                    self.bump();
                    self.bump();
                }
                c if c.is_whitespace() && c != '\n' => {
                    self.bump();
                }
                _ => return,
            }
        }
    }

    fn string(&mut self, quote: char) -> Result<Tok, ExprError> {
        self.bump();
        let mut value = String::new();
        loop {
            match self.bump() {
                None | Some('\n') => return Err(self.error("unterminated string")),
                Some(c) if c == quote => return Ok(Tok::Str(value)),
                Some('\\') => match self.bump() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some(c @ ('\\' | '\'' | '"')) => value.push(c),
                    Some(other) => {
                        value.push('\\');
                        value.push(other);
                    }
                    None => return Err(self.error("unterminated string")),
                },
                Some(c) => value.push(c),
            }
        }
    }

    fn number(&mut self) -> Result<Tok, ExprError> {
        let mut text = String::new();
        if self.peek() == Some('-') {
            text.push('-');
            self.bump();
        }
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '_') {
                if c != '_' {
                    text.push(c);
                }
                self.bump();
            } else if matches!(c, '+' | '-') && text.ends_with(['e', 'E']) {
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }

        if let Ok(int) = text.parse::<i64>() {
            return Ok(Tok::Num(Number::from(int)));
        }
        text.parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Tok::Num)
            .ok_or_else(|| self.error(format!("invalid number '{text}'")))
    }

    fn word(&mut self) -> Tok {
        let mut word = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                word.push(c);
                self.bump();
            } else {
                break;
            }
        }
        match word.as_str() {
            "True" | "true" => Tok::True,
            "False" | "false" => Tok::False,
            "None" | "null" => Tok::None,
            _ => Tok::Ident(word),
        }
    }
}

/// Deepest nesting of parentheses and list brackets the parser accepts.
const MAX_NESTING: usize = 64;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    /// Consumes an opening delimiter, failing past [`MAX_NESTING`].
    fn open(&mut self) -> Result<(), ExprError> {
        if self.depth >= MAX_NESTING {
            return Err(self.error_here(format!("nesting deeper than {MAX_NESTING} levels")));
        }
        self.depth += 1;
        self.advance();
        Ok(())
    }

    fn peek(&self) -> &Token {
        // The lexer always terminates the stream with Eof.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, offset: usize) -> &Tok {
        let index = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[index].tok
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn error_here(&self, message: impl Into<String>) -> ExprError {
        let token = self.peek();
        ExprError::Syntax {
            line: token.line,
            column: token.column,
            message: message.into(),
        }
    }

    fn expect(&mut self, expected: &Tok) -> Result<(), ExprError> {
        if &self.peek().tok == expected {
            self.advance();
            Ok(())
        } else {
            Err(self.error_here(format!(
                "expected {}, found {}",
                expected.describe(),
                self.peek().tok.describe()
            )))
        }
    }

    fn program(mut self) -> Result<Program, ExprError> {
        let mut statements = Vec::new();
        loop {
            while self.peek().tok == Tok::Sep {
                self.advance();
            }
            if self.peek().tok == Tok::Eof {
                return Ok(Program { statements });
            }
            statements.push(self.statement()?);
            match self.peek().tok {
                Tok::Sep | Tok::Eof => {}
                ref other => {
                    return Err(self.error_here(format!(
                        "expected end of statement, found {}",
                        other.describe()
                    )));
                }
            }
        }
    }

    fn statement(&mut self) -> Result<Statement, ExprError> {
        let target = match (&self.peek().tok, self.peek_at(1)) {
            (Tok::Ident(name), Tok::Assign) => name.clone(),
            _ => {
                return Err(self.error_here("expected an assignment such as `pipeline = ...`"));
            }
        };
        self.advance();
        self.advance();
        let value = self.expr()?;
        Ok(Statement { target, value })
    }

    fn expr(&mut self) -> Result<Expr, ExprError> {
        let mut terms = vec![self.term()?];
        while self.peek().tok == Tok::Shift {
            self.advance();
            match self.term()? {
                Expr::Compose(inner) => terms.extend(inner),
                term => terms.push(term),
            }
        }
        if terms.len() == 1 {
            Ok(terms.remove(0))
        } else {
            Ok(Expr::Compose(terms))
        }
    }

    fn term(&mut self) -> Result<Expr, ExprError> {
        match self.peek().tok.clone() {
            Tok::LParen => {
                self.open()?;
                let inner = self.expr()?;
                self.expect(&Tok::RParen)?;
                self.depth -= 1;
                Ok(inner)
            }
            Tok::Ident(first) => {
                self.advance();
                let mut name = first;
                while self.peek().tok == Tok::Dot {
                    self.advance();
                    match self.advance().tok {
                        Tok::Ident(part) => {
                            name.push('.');
                            name.push_str(&part);
                        }
                        _ => return Err(self.error_here("expected a name after '.'")),
                    }
                }
                if self.peek().tok == Tok::LParen {
                    self.advance();
                    let args = self.args()?;
                    Ok(Expr::Call { name, args })
                } else {
                    Ok(Expr::Name(name))
                }
            }
            other => Err(self.error_here(format!(
                "expected a pipeline, found {}",
                other.describe()
            ))),
        }
    }

    fn args(&mut self) -> Result<BuilderArgs, ExprError> {
        let mut args = BuilderArgs::default();
        loop {
            if self.peek().tok == Tok::RParen {
                self.advance();
                return Ok(args);
            }

            if let (Tok::Ident(key), Tok::Assign) = (&self.peek().tok, self.peek_at(1)) {
                let key = key.clone();
                self.advance();
                self.advance();
                let value = self.literal()?;
                if args.named.insert(key.clone(), value).is_some() {
                    return Err(self.error_here(format!("argument '{key}' given twice")));
                }
            } else {
                if !args.named.is_empty() {
                    return Err(self.error_here("positional argument follows keyword argument"));
                }
                let value = self.literal()?;
                args.positional.push(value);
            }

            match self.peek().tok {
                Tok::Comma => {
                    self.advance();
                }
                Tok::RParen => {}
                ref other => {
                    return Err(self.error_here(format!(
                        "expected ',' or ')', found {}",
                        other.describe()
                    )));
                }
            }
        }
    }

    fn literal(&mut self) -> Result<JsonValue, ExprError> {
        match self.peek().tok.clone() {
            Tok::Str(value) => {
                self.advance();
                Ok(JsonValue::String(value))
            }
            Tok::Num(value) => {
                self.advance();
                Ok(JsonValue::Number(value))
            }
            Tok::True => {
                self.advance();
                Ok(JsonValue::Bool(true))
            }
            Tok::False => {
                self.advance();
                Ok(JsonValue::Bool(false))
            }
            Tok::None => {
                self.advance();
                Ok(JsonValue::Null)
            }
            Tok::LBracket => {
                self.open()?;
                let mut items = Vec::new();
                loop {
                    if self.peek().tok == Tok::RBracket {
                        self.advance();
                        self.depth -= 1;
                        return Ok(JsonValue::Array(items));
                    }
                    items.push(self.literal()?);
                    match self.peek().tok {
                        Tok::Comma => {
                            self.advance();
                        }
                        Tok::RBracket => {}
                        ref other => {
                            return Err(self.error_here(format!(
                                "expected ',' or ']', found {}",
                                other.describe()
                            )));
                        }
                    }
                }
            }
            other => Err(self.error_here(format!(
                "expected a literal value, found {}",
                other.describe()
            ))),
        }
    }
}
