// SPDX-License-Identifier: MIT

//! Condition expression parser
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! or      := and ("or" and)*
//! and     := unary ("and" unary)*
//! unary   := "not" unary | primary
//! primary := "(" or ")" | "true" | "false" | path [op literal]
//! ```

use super::ast::{CompareOp, Expression, Literal};
use thiserror::Error;

/// Errors raised while parsing a condition
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConditionError {
    #[error("empty condition")]
    Empty,
    #[error("unexpected character '{0}' at position {1}")]
    UnexpectedChar(char, usize),
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("invalid number '{0}'")]
    InvalidNumber(String),
    #[error("unexpected token {0}")]
    UnexpectedToken(String),
    #[error("unexpected end of condition")]
    UnexpectedEnd,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(f64),
    Op(CompareOp),
    And,
    Or,
    Not,
    True,
    False,
    Null,
    LParen,
    RParen,
}

/// Parse a condition expression string into an AST
pub fn parse(input: &str) -> Result<Expression, ConditionError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(ConditionError::Empty);
    }

    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_or()?;
    match parser.tokens.get(parser.pos) {
        None => Ok(expr),
        Some(trailing) => Err(ConditionError::UnexpectedToken(format!("{:?}", trailing))),
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, ConditionError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '\'' | '"' => {
                let quote = c;
                let start = i + 1;
                let end = chars[start..]
                    .iter()
                    .position(|&ch| ch == quote)
                    .map(|offset| start + offset)
                    .ok_or(ConditionError::UnterminatedString)?;
                tokens.push(Token::Str(chars[start..end].iter().collect()));
                i = end + 1;
            }
            '=' | '!' | '<' | '>' => {
                let next = chars.get(i + 1).copied();
                let (op, width) = match (c, next) {
                    ('=', Some('=')) => (CompareOp::Eq, 2),
                    ('!', Some('=')) => (CompareOp::NotEq, 2),
                    ('>', Some('=')) => (CompareOp::Gte, 2),
                    ('<', Some('=')) => (CompareOp::Lte, 2),
                    ('>', _) => (CompareOp::Gt, 1),
                    ('<', _) => (CompareOp::Lt, 1),
                    _ => return Err(ConditionError::UnexpectedChar(c, i)),
                };
                tokens.push(Token::Op(op));
                i += width;
            }
            c if c.is_ascii_digit() || (c == '-' && next_is_digit(&chars, i)) => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| ConditionError::InvalidNumber(text.clone()))?;
                tokens.push(Token::Num(value));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.')
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    "contains" => Token::Op(CompareOp::Contains),
                    _ => Token::Ident(word),
                });
            }
            other => return Err(ConditionError::UnexpectedChar(other, i)),
        }
    }

    Ok(tokens)
}

fn next_is_digit(chars: &[char], i: usize) -> bool {
    chars.get(i + 1).is_some_and(|c| c.is_ascii_digit())
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn parse_or(&mut self) -> Result<Expression, ConditionError> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.advance();
            let right = self.parse_and()?;
            left = Expression::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expression, ConditionError> {
        let mut left = self.parse_unary()?;
        while self.peek() == Some(&Token::And) {
            self.advance();
            let right = self.parse_unary()?;
            left = Expression::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expression, ConditionError> {
        if self.peek() == Some(&Token::Not) {
            self.advance();
            let inner = self.parse_unary()?;
            return Ok(Expression::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expression, ConditionError> {
        match self.advance().ok_or(ConditionError::UnexpectedEnd)? {
            Token::LParen => {
                let inner = self.parse_or()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(inner),
                    Some(other) => Err(ConditionError::UnexpectedToken(format!("{:?}", other))),
                    None => Err(ConditionError::UnexpectedEnd),
                }
            }
            Token::True => Ok(Expression::Const(true)),
            Token::False => Ok(Expression::Const(false)),
            Token::Ident(path) => match self.peek() {
                Some(Token::Op(op)) => {
                    let op = *op;
                    self.advance();
                    let value = self.parse_literal()?;
                    Ok(Expression::Compare { path, op, value })
                }
                _ => Ok(Expression::Truthy(path)),
            },
            other => Err(ConditionError::UnexpectedToken(format!("{:?}", other))),
        }
    }

    fn parse_literal(&mut self) -> Result<Literal, ConditionError> {
        match self.advance().ok_or(ConditionError::UnexpectedEnd)? {
            Token::Str(s) => Ok(Literal::String(s)),
            Token::Num(n) => Ok(Literal::Number(n)),
            Token::True => Ok(Literal::Boolean(true)),
            Token::False => Ok(Literal::Boolean(false)),
            Token::Null => Ok(Literal::Null),
            other => Err(ConditionError::UnexpectedToken(format!("{:?}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compare(path: &str, op: CompareOp, value: Literal) -> Expression {
        Expression::Compare {
            path: path.to_string(),
            op,
            value,
        }
    }

    #[test]
    fn test_parse_string_comparison() {
        let expr = parse("policy_decision == 'retry'").unwrap();
        assert_eq!(
            expr,
            compare(
                "policy_decision",
                CompareOp::Eq,
                Literal::String("retry".to_string())
            )
        );
    }

    #[test]
    fn test_parse_double_quoted_string() {
        let expr = parse(r#"status != "done""#).unwrap();
        assert_eq!(
            expr,
            compare("status", CompareOp::NotEq, Literal::String("done".to_string()))
        );
    }

    #[test]
    fn test_parse_numbers() {
        assert_eq!(
            parse("retry_count >= 3").unwrap(),
            compare("retry_count", CompareOp::Gte, Literal::Number(3.0))
        );
        assert_eq!(
            parse("delta < -0.5").unwrap(),
            compare("delta", CompareOp::Lt, Literal::Number(-0.5))
        );
    }

    #[test]
    fn test_parse_literals() {
        assert_eq!(parse("true").unwrap(), Expression::Const(true));
        assert_eq!(parse("  false ").unwrap(), Expression::Const(false));
        assert_eq!(
            parse("human_approval == null").unwrap(),
            compare("human_approval", CompareOp::Eq, Literal::Null)
        );
    }

    #[test]
    fn test_parse_bare_path_is_truthy() {
        assert_eq!(
            parse("validation_report.passed").unwrap(),
            Expression::Truthy("validation_report.passed".to_string())
        );
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let expr = parse("a == 1 or b == 2 and c == 3").unwrap();
        match expr {
            Expression::Or(left, right) => {
                assert_eq!(*left, compare("a", CompareOp::Eq, Literal::Number(1.0)));
                assert!(matches!(*right, Expression::And(_, _)));
            }
            other => panic!("Expected Or, got {:?}", other),
        }
    }

    #[test]
    fn test_parentheses_override_precedence() {
        let expr = parse("(a == 1 or b == 2) and not c").unwrap();
        match expr {
            Expression::And(left, right) => {
                assert!(matches!(*left, Expression::Or(_, _)));
                assert_eq!(
                    *right,
                    Expression::Not(Box::new(Expression::Truthy("c".to_string())))
                );
            }
            other => panic!("Expected And, got {:?}", other),
        }
    }

    #[test]
    fn test_contains_operator() {
        assert_eq!(
            parse("tags contains 'bug'").unwrap(),
            compare("tags", CompareOp::Contains, Literal::String("bug".to_string()))
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse("   "), Err(ConditionError::Empty));
        assert_eq!(parse("a == 'open"), Err(ConditionError::UnterminatedString));
        assert_eq!(parse("a =="), Err(ConditionError::UnexpectedEnd));
        assert!(matches!(
            parse("a = 1"),
            Err(ConditionError::UnexpectedChar('=', 2))
        ));
        assert!(matches!(
            parse("(a == 1"),
            Err(ConditionError::UnexpectedEnd)
        ));
        assert!(matches!(
            parse("a == 1 b"),
            Err(ConditionError::UnexpectedToken(_))
        ));
        assert!(matches!(
            parse("a == b"),
            Err(ConditionError::UnexpectedToken(_))
        ));
    }
}
