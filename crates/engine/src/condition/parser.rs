//! Lexer, recursive-descent parser, and evaluator for the condition grammar.
//!
//! ```text
//! expr       := or
//! or         := and ( "||" and )*
//! and        := unary ( "&&" unary )*
//! unary      := "!" unary | comparison
//! comparison := primary ( compare_op primary )?
//! primary    := number | string | "true" | "false" | "null" | variable | "(" expr ")"
//! ```
//!
//! Variables are only the names bound by reference substitution; any other identifier
//! is a parse error.

use std::{cmp::Ordering, collections::HashMap, fmt};

use serde_json::Value;

/// Maximum nesting of parentheses, negations and chained `&&`/`||` operands.
///
/// Chains build left-nested trees, so each connective counts as one level.
const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Text(String),
    Ident(String),
    Compare(CompareOp),
    And,
    Or,
    Not,
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(number) => write!(f, "number {number}"),
            Token::Text(_) => f.write_str("string literal"),
            Token::Ident(name) => write!(f, "identifier '{name}'"),
            Token::Compare(op) => write!(f, "'{op}'"),
            Token::And => f.write_str("'&&'"),
            Token::Or => f.write_str("'||'"),
            Token::Not => f.write_str("'!'"),
            Token::LParen => f.write_str("'('"),
            Token::RParen => f.write_str("')'"),
        }
    }
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    LooseEq,
    LooseNe,
    StrictEq,
    StrictNe,
    Lt,
    Le,
    Gt,
    Ge,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            CompareOp::LooseEq => "==",
            CompareOp::LooseNe => "!=",
            CompareOp::StrictEq => "===",
            CompareOp::StrictNe => "!==",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        };
        f.write_str(symbol)
    }
}

/// Parsed condition expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Variable(String),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(Box<Expr>, CompareOp, Box<Expr>),
}

fn tokenize(source: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut index = 0;

    while index < chars.len() {
        let current = chars[index];
        let next = chars.get(index + 1).copied();
        match current {
            c if c.is_whitespace() => index += 1,
            '(' => {
                tokens.push(Token::LParen);
                index += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                index += 1;
            }
            '&' if next == Some('&') => {
                tokens.push(Token::And);
                index += 2;
            }
            '|' if next == Some('|') => {
                tokens.push(Token::Or);
                index += 2;
            }
            '=' | '!' | '<' | '>' => {
                let (token, width) = lex_operator(&chars[index..])?;
                tokens.push(token);
                index += width;
            }
            '\'' | '"' => {
                let close = chars[index + 1..]
                    .iter()
                    .position(|&c| c == current)
                    .ok_or_else(|| "unterminated string literal".to_string())?;
                tokens.push(Token::Text(chars[index + 1..index + 1 + close].iter().collect()));
                index += close + 2;
            }
            c if c.is_ascii_digit() || (c == '-' && next.is_some_and(|n| n.is_ascii_digit()) && starts_operand(&tokens)) => {
                let start = index;
                index += 1;
                while index < chars.len() && (chars[index].is_ascii_digit() || chars[index] == '.') {
                    index += 1;
                }
                let literal: String = chars[start..index].iter().collect();
                let number = literal.parse::<f64>().map_err(|_| format!("invalid number '{literal}'"))?;
                tokens.push(Token::Number(number));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = index;
                while index < chars.len() && (chars[index].is_ascii_alphanumeric() || chars[index] == '_') {
                    index += 1;
                }
                tokens.push(Token::Ident(chars[start..index].iter().collect()));
            }
            other => return Err(format!("unexpected character '{other}'")),
        }
    }

    Ok(tokens)
}

fn lex_operator(chars: &[char]) -> Result<(Token, usize), String> {
    let at = |offset: usize| chars.get(offset).copied();
    let token = match (at(0), at(1), at(2)) {
        (Some('='), Some('='), Some('=')) => (Token::Compare(CompareOp::StrictEq), 3),
        (Some('!'), Some('='), Some('=')) => (Token::Compare(CompareOp::StrictNe), 3),
        (Some('='), Some('='), _) => (Token::Compare(CompareOp::LooseEq), 2),
        (Some('!'), Some('='), _) => (Token::Compare(CompareOp::LooseNe), 2),
        (Some('<'), Some('='), _) => (Token::Compare(CompareOp::Le), 2),
        (Some('>'), Some('='), _) => (Token::Compare(CompareOp::Ge), 2),
        (Some('<'), _, _) => (Token::Compare(CompareOp::Lt), 1),
        (Some('>'), _, _) => (Token::Compare(CompareOp::Gt), 1),
        (Some('!'), _, _) => (Token::Not, 1),
        _ => return Err("unexpected '='".to_string()),
    };
    Ok(token)
}

/// A `-` starts a negative number only where an operand is expected.
fn starts_operand(tokens: &[Token]) -> bool {
    matches!(
        tokens.last(),
        None | Some(Token::Compare(_) | Token::And | Token::Or | Token::Not | Token::LParen)
    )
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    variables: &'a HashMap<String, Value>,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn descend(&mut self) -> Result<(), String> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err("expression nested too deeply".to_string());
        }
        Ok(())
    }

    fn parse_or(&mut self) -> Result<Expr, String> {
        let depth = self.depth;
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.advance();
            self.descend()?;
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        self.depth = depth;
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, String> {
        let depth = self.depth;
        let mut left = self.parse_unary()?;
        while self.peek() == Some(&Token::And) {
            self.advance();
            self.descend()?;
            let right = self.parse_unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        self.depth = depth;
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        if self.peek() == Some(&Token::Not) {
            self.advance();
            self.descend()?;
            let inner = self.parse_unary()?;
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, String> {
        let left = self.parse_primary()?;
        if let Some(Token::Compare(op)) = self.peek().cloned() {
            self.advance();
            let right = self.parse_primary()?;
            return Ok(Expr::Compare(Box::new(left), op, Box::new(right)));
        }
        Ok(left)
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        match self.advance() {
            Some(Token::Number(number)) => Ok(Expr::Literal(number_value(number))),
            Some(Token::Text(text)) => Ok(Expr::Literal(Value::String(text))),
            Some(Token::Ident(name)) => match name.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" => Ok(Expr::Literal(Value::Null)),
                _ if self.variables.contains_key(&name) => Ok(Expr::Variable(name)),
                _ => Err(format!("unknown identifier '{name}'")),
            },
            Some(Token::LParen) => {
                self.descend()?;
                let inner = self.parse_or()?;
                self.depth -= 1;
                match self.advance() {
                    Some(Token::RParen) => Ok(inner),
                    Some(other) => Err(format!("expected ')', found {other}")),
                    None => Err("expected ')', found end of expression".to_string()),
                }
            }
            Some(other) => Err(format!("expected a value, found {other}")),
            None => Err("unexpected end of expression".to_string()),
        }
    }
}

fn number_value(number: f64) -> Value {
    serde_json::Number::from_f64(number).map(Value::Number).unwrap_or(Value::Null)
}

/// Parses `source`, accepting only the identifiers bound in `variables`.
pub fn parse(source: &str, variables: &HashMap<String, Value>) -> Result<Expr, String> {
    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Err("expression is empty".to_string());
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        variables,
    };
    let expr = parser.parse_or()?;
    match parser.peek() {
        None => Ok(expr),
        Some(token) => Err(format!("unexpected {token} after expression")),
    }
}

/// Evaluates a parsed expression against its variable bindings.
pub fn evaluate(expr: &Expr, variables: &HashMap<String, Value>) -> Value {
    match expr {
        Expr::Literal(value) => value.clone(),
        Expr::Variable(name) => variables.get(name).cloned().unwrap_or(Value::Null),
        Expr::Not(inner) => Value::Bool(!is_truthy(&evaluate(inner, variables))),
        Expr::And(left, right) => Value::Bool(is_truthy(&evaluate(left, variables)) && is_truthy(&evaluate(right, variables))),
        Expr::Or(left, right) => Value::Bool(is_truthy(&evaluate(left, variables)) || is_truthy(&evaluate(right, variables))),
        Expr::Compare(left, op, right) => {
            let left = evaluate(left, variables);
            let right = evaluate(right, variables);
            Value::Bool(compare(&left, *op, &right))
        }
    }
}

/// `null`, `false`, `0`, `NaN` and `""` are falsy; everything else is truthy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn compare(left: &Value, op: CompareOp, right: &Value) -> bool {
    match op {
        CompareOp::LooseEq => loose_eq(left, right),
        CompareOp::LooseNe => !loose_eq(left, right),
        CompareOp::StrictEq => strict_eq(left, right),
        CompareOp::StrictNe => !strict_eq(left, right),
        CompareOp::Lt => ordering(left, right).is_some_and(Ordering::is_lt),
        CompareOp::Le => ordering(left, right).is_some_and(Ordering::is_le),
        CompareOp::Gt => ordering(left, right).is_some_and(Ordering::is_gt),
        CompareOp::Ge => ordering(left, right).is_some_and(Ordering::is_ge),
    }
}

fn strict_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => left == right,
        _ => match (to_number(left), to_number(right)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
    }
}

fn ordering(left: &Value, right: &Value) -> Option<Ordering> {
    if let (Some(a), Some(b)) = (to_number(left), to_number(right)) {
        return a.partial_cmp(&b);
    }
    match (left, right) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::Bool(flag) => Some(if *flag { 1.0 } else { 0.0 }),
        Value::String(text) if !text.trim().is_empty() => text.trim().parse::<f64>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn eval(source: &str, variables: &HashMap<String, Value>) -> Result<bool, String> {
        let expr = parse(source, variables)?;
        Ok(is_truthy(&evaluate(&expr, variables)))
    }

    #[test]
    fn arithmetic_comparisons_and_connectives() {
        let empty = HashMap::new();
        assert_eq!(eval("5 > 3", &empty), Ok(true));
        assert_eq!(eval("5 <= 3 || 2 >= 2", &empty), Ok(true));
        assert_eq!(eval("!(1 == 1) && true", &empty), Ok(false));
        assert_eq!(eval("-2 < -1", &empty), Ok(true));
        assert_eq!(eval("'abc' < 'abd'", &empty), Ok(true));
        assert_eq!(eval("null", &empty), Ok(false));
    }

    #[test]
    fn loose_and_strict_equality_differ() {
        let variables = HashMap::from([("__ref_0".to_string(), json!("10"))]);
        assert_eq!(eval("__ref_0 == 10", &variables), Ok(true));
        assert_eq!(eval("__ref_0 === 10", &variables), Ok(false));
        assert_eq!(eval("__ref_0 !== '10'", &variables), Ok(false));
        assert_eq!(eval("null == 0", &variables), Ok(false));
        assert_eq!(eval("__ref_0 > 9", &variables), Ok(true));
    }

    #[test]
    fn unbound_identifiers_and_garbage_are_rejected() {
        let empty = HashMap::new();
        assert!(eval("status == 'ok'", &empty).is_err());
        assert!(eval("1 ==", &empty).is_err());
        assert!(eval("(1 == 1", &empty).is_err());
        assert!(eval("1 = 1", &empty).is_err());
        assert!(eval("1 2", &empty).is_err());
        assert!(eval("", &empty).is_err());
        assert!(eval(&"(".repeat(MAX_DEPTH + 1), &empty).is_err());
    }

    #[test]
    fn long_connective_chains_are_bounded() {
        let empty = HashMap::new();
        let short = vec!["1 == 1"; 20].join(" && ");
        assert_eq!(eval(&short, &empty), Ok(true));

        let long_and = vec!["true"; 10_000].join(" && ");
        assert_eq!(eval(&long_and, &empty), Err("expression nested too deeply".to_string()));
        let long_or = vec!["false"; 10_000].join(" || ");
        assert!(eval(&long_or, &empty).is_err());
    }

    #[test]
    fn null_bindings_compare_false() {
        let variables = HashMap::from([("__ref_0".to_string(), Value::Null)]);
        assert_eq!(eval("__ref_0 > 10", &variables), Ok(false));
        assert_eq!(eval("__ref_0 < 10", &variables), Ok(false));
        assert_eq!(eval("__ref_0 == null", &variables), Ok(true));
    }
}
