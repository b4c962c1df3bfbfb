//! SQL-like row filters: tokenizing, parsing, binding to a schema and
//! evaluating against a table version.

use std::cmp::Ordering;
use std::mem::discriminant;
use std::ops::Bound;

use rayon::prelude::*;

use crate::batch::{DataType, Schema};
use crate::error::{Error, Result};
use crate::index::btree::BTreeIndex;
use crate::table::{ColumnStore, TableState};
use crate::value::ScalarValue;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    QuotedIdent(String),
    Str(String),
    Number(String),
    LParen,
    RParen,
    Comma,
    Op(CompareOp),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CompareOp {
    fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::NotEq => ordering != Ordering::Equal,
            Self::Lt => ordering == Ordering::Less,
            Self::LtEq => ordering != Ordering::Greater,
            Self::Gt => ordering == Ordering::Greater,
            Self::GtEq => ordering != Ordering::Less,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Boolean(bool),
    Integer(i128),
    Float(f64),
    Str(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Constant(bool),
    Column(String),
    Compare {
        column: String,
        op: CompareOp,
        value: Literal,
    },
    InList {
        column: String,
        values: Vec<Literal>,
        negated: bool,
    },
    Like {
        column: String,
        pattern: String,
        negated: bool,
    },
    Between {
        column: String,
        low: Literal,
        high: Literal,
        negated: bool,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
}

/// A filter bound to column positions with literals coerced to column types.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Predicate {
    Constant(bool),
    Compare {
        column: usize,
        op: CompareOp,
        value: ScalarValue,
    },
    InList {
        column: usize,
        values: Vec<ScalarValue>,
        negated: bool,
    },
    Like {
        column: usize,
        pattern: Vec<char>,
        negated: bool,
    },
    Between {
        column: usize,
        low: ScalarValue,
        high: ScalarValue,
        negated: bool,
    },
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
}

/// Parses `source` and binds it against `schema`.
pub(crate) fn compile(source: &str, schema: &Schema) -> Result<Predicate> {
    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Err(Error::invalid_argument("filter expression is empty"));
    }
    let mut parser = Parser { tokens, position: 0 };
    let expr = parser.parse_or()?;
    if let Some(token) = parser.peek() {
        return Err(syntax_error(format!("unexpected trailing token {token:?}")));
    }
    bind(expr, schema)
}

/// Rows of `state` accepted by `predicate`, in ascending row order.
pub(crate) fn matching_rows(
    predicate: &Predicate,
    state: &TableState,
    parallel_min_rows: usize,
) -> Vec<usize> {
    let data: &ColumnStore = &state.data;
    if let Some(candidates) = predicate.index_candidates(state) {
        return candidates
            .into_iter()
            .map(|row| row as usize)
            .filter(|row| predicate.matches(data, *row))
            .collect();
    }

    let rows = data.num_rows();
    if rows >= parallel_min_rows {
        (0..rows)
            .into_par_iter()
            .filter(|row| predicate.matches(data, *row))
            .collect()
    } else {
        (0..rows).filter(|row| predicate.matches(data, *row)).collect()
    }
}

impl Predicate {
    pub(crate) fn matches(&self, data: &ColumnStore, row: usize) -> bool {
        match self {
            Self::Constant(value) => *value,
            Self::Compare { column, op, value } => data
                .column(*column)
                .scalar_at(row)
                .and_then(|actual| compare(&actual, value))
                .is_some_and(|ordering| op.accepts(ordering)),
            Self::InList {
                column,
                values,
                negated,
            } => {
                let Some(actual) = data.column(*column).scalar_at(row) else {
                    return false;
                };
                let found = values
                    .iter()
                    .any(|value| compare(&actual, value) == Some(Ordering::Equal));
                found != *negated
            }
            Self::Like {
                column,
                pattern,
                negated,
            } => {
                let Some(ScalarValue::Utf8(actual)) = data.column(*column).scalar_at(row) else {
                    return false;
                };
                let text: Vec<char> = actual.chars().collect();
                like_matches(pattern, &text) != *negated
            }
            Self::Between {
                column,
                low,
                high,
                negated,
            } => {
                let Some(actual) = data.column(*column).scalar_at(row) else {
                    return false;
                };
                let inside = compare(&actual, low).is_some_and(|o| o != Ordering::Less)
                    && compare(&actual, high).is_some_and(|o| o != Ordering::Greater);
                inside != *negated
            }
            Self::And(left, right) => left.matches(data, row) && right.matches(data, row),
            Self::Or(left, right) => left.matches(data, row) || right.matches(data, row),
            Self::Not(inner) => !inner.matches(data, row),
        }
    }

    /// A sorted superset of matching rows taken from BTREE indices, or
    /// `None` when some branch needs a full scan.
    fn index_candidates(&self, state: &TableState) -> Option<Vec<u64>> {
        match self {
            Self::Constant(false) => Some(Vec::new()),
            Self::Compare { column, op, value } => {
                let index = indexable(state, *column, value)?;
                let mut rows = match op {
                    CompareOp::Eq => index.equal(value).to_vec(),
                    CompareOp::Lt => index.range(Bound::Unbounded, Bound::Excluded(value)),
                    CompareOp::LtEq => index.range(Bound::Unbounded, Bound::Included(value)),
                    CompareOp::Gt => index.range(Bound::Excluded(value), Bound::Unbounded),
                    CompareOp::GtEq => index.range(Bound::Included(value), Bound::Unbounded),
                    CompareOp::NotEq => return None,
                };
                rows.sort_unstable();
                Some(rows)
            }
            Self::InList {
                column,
                values,
                negated: false,
            } => {
                let mut rows = Vec::new();
                for value in values {
                    rows.extend_from_slice(indexable(state, *column, value)?.equal(value));
                }
                rows.sort_unstable();
                rows.dedup();
                Some(rows)
            }
            Self::Between {
                column,
                low,
                high,
                negated: false,
            } => {
                let index = indexable(state, *column, low)?;
                indexable(state, *column, high)?;
                let mut rows = index.range(Bound::Included(low), Bound::Included(high));
                rows.sort_unstable();
                Some(rows)
            }
            Self::And(left, right) => match (left.index_candidates(state), right.index_candidates(state)) {
                (Some(left), Some(right)) => Some(intersect(&left, &right)),
                (Some(rows), None) | (None, Some(rows)) => Some(rows),
                (None, None) => None,
            },
            Self::Or(left, right) => {
                let mut rows = left.index_candidates(state)?;
                rows.extend(right.index_candidates(state)?);
                rows.sort_unstable();
                rows.dedup();
                Some(rows)
            }
            _ => None,
        }
    }
}

/// The BTREE on `column`, provided `value` has the same scalar kind as
/// the indexed cells.
fn indexable<'a>(state: &'a TableState, column: usize, value: &ScalarValue) -> Option<&'a BTreeIndex> {
    let natural = natural_kind(state.data.column(column).data_type())?;
    if discriminant(&natural) != discriminant(value) {
        return None;
    }
    state
        .indices
        .values()
        .filter(|entry| entry.column_index == column)
        .find_map(|entry| entry.btree())
}

fn intersect(left: &[u64], right: &[u64]) -> Vec<u64> {
    let mut rows = Vec::with_capacity(left.len().min(right.len()));
    let (mut l, mut r) = (0, 0);
    while l < left.len() && r < right.len() {
        match left[l].cmp(&right[r]) {
            Ordering::Less => l += 1,
            Ordering::Greater => r += 1,
            Ordering::Equal => {
                rows.push(left[l]);
                l += 1;
                r += 1;
            }
        }
    }
    rows
}

/// Orders two cells. Integer and float kinds compare numerically, so NaN
/// matches nothing and `-0.0` equals `0.0`; other mixed kinds are
/// incomparable.
fn compare(left: &ScalarValue, right: &ScalarValue) -> Option<Ordering> {
    use ScalarValue::{Float, Int, UInt};
    match (left, right) {
        (Int(l), UInt(r)) => Some(i128::from(*l).cmp(&i128::from(*r))),
        (UInt(l), Int(r)) => Some(i128::from(*l).cmp(&i128::from(*r))),
        (Int(l), Float(r)) => (*l as f64).partial_cmp(r),
        (Float(l), Int(r)) => l.partial_cmp(&(*r as f64)),
        (UInt(l), Float(r)) => (*l as f64).partial_cmp(r),
        (Float(l), UInt(r)) => l.partial_cmp(&(*r as f64)),
        (Float(l), Float(r)) => l.partial_cmp(r),
        _ if discriminant(left) == discriminant(right) => Some(left.cmp(right)),
        _ => None,
    }
}

/// `%` matches any run of characters, `_` exactly one.
fn like_matches(pattern: &[char], text: &[char]) -> bool {
    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;
    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '_' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '%' {
            backtrack = Some((p, t));
            p += 1;
        } else if let Some((star, matched)) = backtrack {
            p = star + 1;
            t = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|ch| *ch == '%')
}

fn natural_kind(data_type: DataType) -> Option<ScalarValue> {
    match data_type {
        DataType::Boolean => Some(ScalarValue::Boolean(false)),
        DataType::Int32 | DataType::Int64 => Some(ScalarValue::Int(0)),
        DataType::UInt64 => Some(ScalarValue::UInt(0)),
        DataType::Float32 | DataType::Float64 => Some(ScalarValue::Float(0.0)),
        DataType::Utf8 => Some(ScalarValue::Utf8(String::new())),
        DataType::Vector { .. } => None,
    }
}

fn bind(expr: Expr, schema: &Schema) -> Result<Predicate> {
    Ok(match expr {
        Expr::Constant(value) => Predicate::Constant(value),
        Expr::Column(name) => {
            let (column, data_type) = resolve_column(schema, &name)?;
            if data_type != DataType::Boolean {
                return Err(Error::invalid_argument(format!(
                    "column '{name}' of type {data_type} cannot be used as a condition"
                )));
            }
            Predicate::Compare {
                column,
                op: CompareOp::Eq,
                value: ScalarValue::Boolean(true),
            }
        }
        Expr::Compare { column, op, value } => {
            let (index, data_type) = resolve_column(schema, &column)?;
            Predicate::Compare {
                column: index,
                op,
                value: coerce(&value, data_type, &column)?,
            }
        }
        Expr::InList {
            column,
            values,
            negated,
        } => {
            let (index, data_type) = resolve_column(schema, &column)?;
            let values = values
                .iter()
                .map(|value| coerce(value, data_type, &column))
                .collect::<Result<Vec<_>>>()?;
            Predicate::InList {
                column: index,
                values,
                negated,
            }
        }
        Expr::Like {
            column,
            pattern,
            negated,
        } => {
            let (index, data_type) = resolve_column(schema, &column)?;
            if data_type != DataType::Utf8 {
                return Err(Error::invalid_argument(format!(
                    "LIKE requires a utf8 column, '{column}' is {data_type}"
                )));
            }
            Predicate::Like {
                column: index,
                pattern: pattern.chars().collect(),
                negated,
            }
        }
        Expr::Between {
            column,
            low,
            high,
            negated,
        } => {
            let (index, data_type) = resolve_column(schema, &column)?;
            Predicate::Between {
                column: index,
                low: coerce(&low, data_type, &column)?,
                high: coerce(&high, data_type, &column)?,
                negated,
            }
        }
        Expr::And(left, right) => {
            Predicate::And(Box::new(bind(*left, schema)?), Box::new(bind(*right, schema)?))
        }
        Expr::Or(left, right) => {
            Predicate::Or(Box::new(bind(*left, schema)?), Box::new(bind(*right, schema)?))
        }
        Expr::Not(inner) => Predicate::Not(Box::new(bind(*inner, schema)?)),
    })
}

fn resolve_column(schema: &Schema, name: &str) -> Result<(usize, DataType)> {
    let index = schema.index_of(name).ok_or_else(|| {
        Error::invalid_argument(format!("filter references unknown column '{name}'"))
    })?;
    let data_type = schema.fields()[index].data_type();
    if data_type.is_vector() {
        return Err(Error::invalid_argument(format!(
            "vector column '{name}' cannot be filtered"
        )));
    }
    Ok((index, data_type))
}

/// Converts a literal to the cell kind of `data_type`. Numeric literals
/// that do not fit the column's kind exactly stay numeric and compare by
/// value.
fn coerce(literal: &Literal, data_type: DataType, column: &str) -> Result<ScalarValue> {
    let mismatch = || {
        Error::invalid_argument(format!(
            "literal {} does not match column '{column}' of type {data_type}",
            render_literal(literal)
        ))
    };
    match (data_type, literal) {
        (DataType::Boolean, Literal::Boolean(value)) => Ok(ScalarValue::Boolean(*value)),
        (DataType::Utf8, Literal::Str(value)) => Ok(ScalarValue::Utf8(value.clone())),
        (DataType::Int32 | DataType::Int64, Literal::Integer(value)) => Ok(i64::try_from(*value)
            .map(ScalarValue::Int)
            .unwrap_or(ScalarValue::Float(*value as f64))),
        (DataType::UInt64, Literal::Integer(value)) => Ok(match u64::try_from(*value) {
            Ok(unsigned) => ScalarValue::UInt(unsigned),
            Err(_) => i64::try_from(*value)
                .map(ScalarValue::Int)
                .unwrap_or(ScalarValue::Float(*value as f64)),
        }),
        (DataType::Int32 | DataType::Int64 | DataType::UInt64, Literal::Float(value)) => {
            Ok(ScalarValue::Float(*value))
        }
        (DataType::Float32, Literal::Integer(value)) => {
            Ok(ScalarValue::Float(f64::from(*value as f32)))
        }
        (DataType::Float32, Literal::Float(value)) => {
            Ok(ScalarValue::Float(f64::from(*value as f32)))
        }
        (DataType::Float64, Literal::Integer(value)) => Ok(ScalarValue::Float(*value as f64)),
        (DataType::Float64, Literal::Float(value)) => Ok(ScalarValue::Float(*value)),
        _ => Err(mismatch()),
    }
}

fn render_literal(literal: &Literal) -> String {
    match literal {
        Literal::Boolean(value) => value.to_string(),
        Literal::Integer(value) => value.to_string(),
        Literal::Float(value) => value.to_string(),
        Literal::Str(value) => format!("'{value}'"),
    }
}

fn syntax_error(message: impl Into<String>) -> Error {
    Error::invalid_argument(format!("invalid filter: {}", message.into()))
}

fn tokenize(source: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let ch = chars[i];
        match ch {
            _ if ch.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '=' => {
                i += if chars.get(i + 1) == Some(&'=') { 2 } else { 1 };
                tokens.push(Token::Op(CompareOp::Eq));
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Op(CompareOp::NotEq));
                i += 2;
            }
            '<' => match chars.get(i + 1) {
                Some('=') => {
                    tokens.push(Token::Op(CompareOp::LtEq));
                    i += 2;
                }
                Some('>') => {
                    tokens.push(Token::Op(CompareOp::NotEq));
                    i += 2;
                }
                _ => {
                    tokens.push(Token::Op(CompareOp::Lt));
                    i += 1;
                }
            },
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Op(CompareOp::GtEq));
                    i += 2;
                } else {
                    tokens.push(Token::Op(CompareOp::Gt));
                    i += 1;
                }
            }
            '\'' | '"' => {
                let (value, next) = read_quoted(&chars, i, ch)?;
                tokens.push(Token::Str(value));
                i = next;
            }
            '`' => {
                let (value, next) = read_quoted(&chars, i, '`')?;
                tokens.push(Token::QuotedIdent(value));
                i = next;
            }
            _ if ch.is_ascii_digit()
                || ((ch == '-' || ch == '.')
                    && chars.get(i + 1).is_some_and(|next| next.is_ascii_digit())) =>
            {
                let start = i;
                i += 1;
                while i < chars.len() {
                    let current = chars[i];
                    let exponent_sign =
                        (current == '-' || current == '+') && matches!(chars[i - 1], 'e' | 'E');
                    if current.is_ascii_digit()
                        || current == '.'
                        || matches!(current, 'e' | 'E')
                        || exponent_sign
                    {
                        i += 1;
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Number(chars[start..i].iter().collect()));
            }
            _ if ch.is_alphabetic() || ch == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            _ => return Err(syntax_error(format!("unexpected character '{ch}' at {i}"))),
        }
    }
    Ok(tokens)
}

/// Reads a literal opened by `quote` at `start`; a doubled quote escapes it.
fn read_quoted(chars: &[char], start: usize, quote: char) -> Result<(String, usize)> {
    let mut value = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        if chars[i] == quote {
            if chars.get(i + 1) == Some(&quote) {
                value.push(quote);
                i += 2;
                continue;
            }
            return Ok((value, i + 1));
        }
        value.push(chars[i]);
        i += 1;
    }
    Err(syntax_error(format!("unterminated {quote} literal at {start}")))
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(word)) if word.eq_ignore_ascii_case(keyword))
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek_keyword(keyword) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<()> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(syntax_error(format!(
                "expected {keyword}, found {:?}",
                self.peek()
            )))
        }
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            other => Err(syntax_error(format!("expected {expected:?}, found {other:?}"))),
        }
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.eat_keyword("OR") {
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_not()?;
        while self.eat_keyword("AND") {
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr> {
        if self.eat_keyword("NOT") {
            return Ok(Expr::Not(Box::new(self.parse_not()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.next() {
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(word)) if word.eq_ignore_ascii_case("TRUE") => {
                Ok(Expr::Constant(true))
            }
            Some(Token::Ident(word)) if word.eq_ignore_ascii_case("FALSE") => {
                Ok(Expr::Constant(false))
            }
            Some(Token::Ident(word)) if is_reserved(&word) => {
                Err(syntax_error(format!("unexpected keyword {word}")))
            }
            Some(Token::Ident(column)) | Some(Token::QuotedIdent(column)) => {
                self.parse_predicate(column)
            }
            other => Err(syntax_error(format!("expected a condition, found {other:?}"))),
        }
    }

    fn parse_predicate(&mut self, column: String) -> Result<Expr> {
        if let Some(Token::Op(op)) = self.peek() {
            let op = *op;
            self.position += 1;
            let value = self.parse_literal()?;
            return Ok(Expr::Compare { column, op, value });
        }

        let negated = self.eat_keyword("NOT");
        if self.eat_keyword("IN") {
            self.expect(Token::LParen)?;
            let mut values = vec![self.parse_literal()?];
            while self.peek() == Some(&Token::Comma) {
                self.position += 1;
                values.push(self.parse_literal()?);
            }
            self.expect(Token::RParen)?;
            return Ok(Expr::InList {
                column,
                values,
                negated,
            });
        }
        if self.eat_keyword("LIKE") {
            return match self.next() {
                Some(Token::Str(pattern)) => Ok(Expr::Like {
                    column,
                    pattern,
                    negated,
                }),
                other => Err(syntax_error(format!(
                    "LIKE expects a string pattern, found {other:?}"
                ))),
            };
        }
        if self.eat_keyword("BETWEEN") {
            let low = self.parse_literal()?;
            self.expect_keyword("AND")?;
            let high = self.parse_literal()?;
            return Ok(Expr::Between {
                column,
                low,
                high,
                negated,
            });
        }
        if negated {
            return Err(syntax_error(format!(
                "expected IN, LIKE or BETWEEN after NOT, found {:?}",
                self.peek()
            )));
        }
        Ok(Expr::Column(column))
    }

    fn parse_literal(&mut self) -> Result<Literal> {
        match self.next() {
            Some(Token::Str(value)) => Ok(Literal::Str(value)),
            Some(Token::Number(raw)) => parse_number(&raw),
            Some(Token::Ident(word)) if word.eq_ignore_ascii_case("TRUE") => {
                Ok(Literal::Boolean(true))
            }
            Some(Token::Ident(word)) if word.eq_ignore_ascii_case("FALSE") => {
                Ok(Literal::Boolean(false))
            }
            other => Err(syntax_error(format!("expected a literal, found {other:?}"))),
        }
    }
}

fn is_reserved(word: &str) -> bool {
    ["AND", "OR", "NOT", "IN", "LIKE", "BETWEEN"]
        .iter()
        .any(|keyword| word.eq_ignore_ascii_case(keyword))
}

fn parse_number(raw: &str) -> Result<Literal> {
    if let Ok(value) = raw.parse::<i128>() {
        return Ok(Literal::Integer(value));
    }
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(Literal::Float(value)),
        _ => Err(syntax_error(format!("invalid number '{raw}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{Column, Field, RecordBatch};

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("id", DataType::Int64),
            Field::new("key", DataType::Utf8),
            Field::new("score", DataType::Float32),
            Field::new("active", DataType::Boolean),
            Field::new("item", DataType::Vector { dimension: 2 }),
        ])
        .expect("schema must be valid")
    }

    fn state() -> TableState {
        let batch = RecordBatch::try_new(
            schema(),
            vec![
                Column::Int64(vec![0, 1, 2, 3]),
                Column::Utf8(vec![
                    "apple".to_string(),
                    "banana".to_string(),
                    "it's".to_string(),
                    "apricot".to_string(),
                ]),
                Column::Float32(vec![0.5, 1.5, 2.5, 3.5]),
                Column::Boolean(vec![true, false, true, false]),
                Column::Vector {
                    dimension: 2,
                    values: vec![0.0; 8],
                },
            ],
        )
        .expect("batch must be valid");
        let data = ColumnStore::from_batches(&schema(), &[batch]).expect("store must build");
        TableState::new(1, data)
    }

    fn rows(filter: &str) -> Vec<usize> {
        let predicate = compile(filter, &schema()).expect("filter must compile");
        matching_rows(&predicate, &state(), usize::MAX)
    }

    #[test]
    fn evaluates_comparisons_and_sets() {
        assert_eq!(rows("id = 2"), vec![2]);
        assert_eq!(rows("id == 2"), vec![2]);
        assert_eq!(rows("id <> 2"), vec![0, 1, 3]);
        assert_eq!(rows("id >= 1 AND id < 3"), vec![1, 2]);
        assert_eq!(rows("key IN ('apple', \"apricot\")"), vec![0, 3]);
        assert_eq!(rows("key NOT IN ('apple')"), vec![1, 2, 3]);
        assert_eq!(rows("id BETWEEN 1 AND 2"), vec![1, 2]);
        assert_eq!(rows("NOT (id = 0 OR id = 3)"), vec![1, 2]);
    }

    #[test]
    fn evaluates_like_booleans_and_floats() {
        assert_eq!(rows("key LIKE 'ap%'"), vec![0, 3]);
        assert_eq!(rows("key LIKE '_anana'"), vec![1]);
        assert_eq!(rows("key NOT LIKE '%a%'"), vec![2]);
        assert_eq!(rows("active"), vec![0, 2]);
        assert_eq!(rows("active = false"), vec![1, 3]);
        assert_eq!(rows("score > 1.5"), vec![2, 3]);
        assert_eq!(rows("score = 2.5"), vec![2]);
        assert_eq!(rows("id > 1.5"), vec![2, 3]);
        assert_eq!(rows("key = 'it''s'"), vec![2]);
        assert_eq!(rows("`id` = 1 and TRUE"), vec![1]);
        assert!(rows("FALSE").is_empty());
    }

    #[test]
    fn rejects_malformed_filters() {
        for filter in [
            "",
            "id =",
            "id = 1 AND",
            "(id = 1",
            "id = 'one'",
            "key = 1",
            "missing = 1",
            "item = 1",
            "id LIKE 'a%'",
            "id NOT = 1",
            "id = 1 2",
            "key = 'open",
            "score @ 2",
        ] {
            let error = compile(filter, &schema()).expect_err("must fail");
            assert_eq!(
                error.kind(),
                crate::ErrorKind::InvalidArgument,
                "filter {filter:?}"
            );
        }
    }

    #[test]
    fn like_handles_backtracking() {
        let matches = |pattern: &str, text: &str| {
            let pattern: Vec<char> = pattern.chars().collect();
            let text: Vec<char> = text.chars().collect();
            like_matches(&pattern, &text)
        };
        assert!(matches("%b%c", "abxbc"));
        assert!(matches("a%", "a"));
        assert!(matches("%", ""));
        assert!(!matches("a_c", "ac"));
        assert!(!matches("%x", "abc"));
    }

    #[test]
    fn mixed_numeric_kinds_compare_by_value() {
        assert_eq!(
            compare(&ScalarValue::Int(-1), &ScalarValue::UInt(0)),
            Some(Ordering::Less)
        );
        assert_eq!(
            compare(&ScalarValue::Float(2.0), &ScalarValue::Int(2)),
            Some(Ordering::Equal)
        );
        assert_eq!(compare(&ScalarValue::from("a"), &ScalarValue::Int(1)), None);
    }
}
