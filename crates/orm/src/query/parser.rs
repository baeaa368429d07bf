//! OSQL parser for the SELECT subset the active-record layer runs.
//!
//! ```text
//! SELECT [*] FROM <Class> [WHERE <cond>] [ORDER BY <field> [ASC|DESC], ...]
//!        [SKIP <n>] [LIMIT <n>]
//! ```
//!
//! Record ids (`#12:0`), record attributes (`@rid`) and `SKIP` are OrientDB
//! forms, so the lexer is specific to this dialect.

use serde_json::{Number, Value};

use super::types::{Condition, Operand, OrderDirection, Param, QueryOperator, SelectQuery};
use crate::error::QueryError;
use crate::identity::RecordId;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Number(String),
    Rid(RecordId),
    Positional,
    Named(String),
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    LParen,
    RParen,
    Comma,
    Star,
    Minus,
    Eof,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Ident(s) => format!("'{}'", s),
            Token::Str(s) => format!("string '{}'", s),
            Token::Number(n) => format!("number {}", n),
            Token::Rid(rid) => format!("record id {}", rid),
            Token::Positional => "'?'".to_string(),
            Token::Named(name) => format!("':{}'", name),
            Token::Eq => "'='".to_string(),
            Token::NotEq => "'!='".to_string(),
            Token::Lt => "'<'".to_string(),
            Token::LtEq => "'<='".to_string(),
            Token::Gt => "'>'".to_string(),
            Token::GtEq => "'>='".to_string(),
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
            Token::Comma => "','".to_string(),
            Token::Star => "'*'".to_string(),
            Token::Minus => "'-'".to_string(),
            Token::Eof => "end of query".to_string(),
        }
    }
}

fn is_ident_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_' || ch == '@'
}

fn is_ident_part(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_' || ch == '.'
}

fn tokenize(input: &str) -> Result<Vec<Token>, QueryError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        match ch {
            c if c.is_whitespace() => i += 1,
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
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '?' => {
                tokens.push(Token::Positional);
                i += 1;
            }
            '=' => {
                tokens.push(Token::Eq);
                i += if chars.get(i + 1) == Some(&'=') { 2 } else { 1 };
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::NotEq);
                i += 2;
            }
            '<' => match chars.get(i + 1) {
                Some('=') => {
                    tokens.push(Token::LtEq);
                    i += 2;
                }
                Some('>') => {
                    tokens.push(Token::NotEq);
                    i += 2;
                }
                _ => {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            },
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::GtEq);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            ':' if chars.get(i + 1).copied().is_some_and(is_ident_start) => {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && (chars[end].is_ascii_alphanumeric() || chars[end] == '_') {
                    end += 1;
                }
                tokens.push(Token::Named(chars[start..end].iter().collect()));
                i = end;
            }
            '#' => {
                let start = i;
                let mut end = i + 1;
                while end < chars.len()
                    && (chars[end].is_ascii_digit() || chars[end] == ':' || chars[end] == '-')
                {
                    end += 1;
                }
                let text: String = chars[start..end].iter().collect();
                let rid = text
                    .parse::<RecordId>()
                    .map_err(|_| QueryError::UnexpectedCharacter { ch: '#', offset: start })?;
                tokens.push(Token::Rid(rid));
                i = end;
            }
            '\'' | '"' => {
                let quote = ch;
                let start = i;
                let mut value = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(QueryError::UnterminatedString { offset: start }),
                        Some('\\') => {
                            if let Some(next) = chars.get(i + 1) {
                                value.push(*next);
                                i += 2;
                            } else {
                                return Err(QueryError::UnterminatedString { offset: start });
                            }
                        }
                        Some(c) if *c == quote => {
                            i += 1;
                            break;
                        }
                        Some(c) => {
                            value.push(*c);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(value));
            }
            '`' => {
                let start = i;
                let end = chars[i + 1..]
                    .iter()
                    .position(|c| *c == '`')
                    .map(|p| i + 1 + p)
                    .ok_or(QueryError::UnterminatedString { offset: start })?;
                tokens.push(Token::Ident(chars[i + 1..end].iter().collect()));
                i = end + 1;
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                if i + 1 < chars.len() && chars[i] == '.' && chars[i + 1].is_ascii_digit() {
                    i += 1;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                tokens.push(Token::Number(chars[start..i].iter().collect()));
            }
            c if is_ident_start(c) => {
                let start = i;
                i += 1;
                while i < chars.len() && is_ident_part(chars[i]) {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => {
                return Err(QueryError::UnexpectedCharacter { ch: other, offset: i });
            }
        }
    }

    tokens.push(Token::Eof);
    Ok(tokens)
}

/// Parse an OSQL SELECT statement
pub fn parse(input: &str) -> Result<SelectQuery, QueryError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        positional: 0,
    };
    parser.select()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    positional: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Token::Ident(word) if word.eq_ignore_ascii_case(keyword))
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), QueryError> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.unexpected(keyword))
        }
    }

    fn expect(&mut self, token: Token) -> Result<(), QueryError> {
        if *self.peek() == token {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.unexpected(&token.describe()))
        }
    }

    fn unexpected(&self, expected: &str) -> QueryError {
        QueryError::UnexpectedToken {
            expected: expected.to_string(),
            found: self.peek().describe(),
        }
    }

    fn select(&mut self) -> Result<SelectQuery, QueryError> {
        if !self.eat_keyword("SELECT") {
            return match self.peek() {
                Token::Ident(word) => Err(QueryError::Unsupported(word.to_uppercase())),
                _ => Err(self.unexpected("SELECT")),
            };
        }

        if *self.peek() == Token::Star {
            self.pos += 1;
        }
        if !self.peek_keyword("FROM") {
            return Err(QueryError::Unsupported(
                "projections; only SELECT [*] FROM <class> is supported".to_string(),
            ));
        }
        self.pos += 1;

        let class_name = match self.advance() {
            Token::Ident(name) => name,
            other => {
                return Err(QueryError::UnexpectedToken {
                    expected: "class name".to_string(),
                    found: other.describe(),
                })
            }
        };
        let mut query = SelectQuery::from_class(class_name);

        if self.eat_keyword("WHERE") {
            query.condition = Some(self.or_condition()?);
        }

        if self.eat_keyword("ORDER") {
            self.expect_keyword("BY")?;
            loop {
                let field = match self.advance() {
                    Token::Ident(field) => field,
                    other => {
                        return Err(QueryError::UnexpectedToken {
                            expected: "field name".to_string(),
                            found: other.describe(),
                        })
                    }
                };
                let direction = if self.eat_keyword("DESC") {
                    OrderDirection::Desc
                } else {
                    self.eat_keyword("ASC");
                    OrderDirection::Asc
                };
                query.order_by.push((field, direction));
                if *self.peek() != Token::Comma {
                    break;
                }
                self.pos += 1;
            }
        }

        // SKIP and LIMIT are accepted in either order, each at most once
        for _ in 0..2 {
            if query.skip.is_none() && (self.eat_keyword("SKIP") || self.eat_keyword("OFFSET")) {
                query.skip = Some(self.operand()?);
            } else if query.limit.is_none() && self.eat_keyword("LIMIT") {
                query.limit = Some(self.operand()?);
            }
        }

        match self.peek() {
            Token::Eof => Ok(query),
            _ => Err(self.unexpected("end of query")),
        }
    }

    fn or_condition(&mut self) -> Result<Condition, QueryError> {
        let mut left = self.and_condition()?;
        while self.eat_keyword("OR") {
            let right = self.and_condition()?;
            left = left.or(right);
        }
        Ok(left)
    }

    fn and_condition(&mut self) -> Result<Condition, QueryError> {
        let mut left = self.not_condition()?;
        while self.eat_keyword("AND") {
            let right = self.not_condition()?;
            left = left.and(right);
        }
        Ok(left)
    }

    fn not_condition(&mut self) -> Result<Condition, QueryError> {
        if self.eat_keyword("NOT") {
            return Ok(self.not_condition()?.negate());
        }
        if *self.peek() == Token::LParen {
            self.pos += 1;
            let inner = self.or_condition()?;
            self.expect(Token::RParen)?;
            return Ok(inner);
        }
        self.predicate()
    }

    fn predicate(&mut self) -> Result<Condition, QueryError> {
        let left = self.operand()?;

        if self.eat_keyword("IS") {
            let negated = self.eat_keyword("NOT");
            self.expect_keyword("NULL")?;
            return Ok(Condition::Null { operand: left, negated });
        }

        let negated = self.eat_keyword("NOT");

        if self.eat_keyword("LIKE") {
            let right = self.operand()?;
            let operator = if negated { QueryOperator::NotLike } else { QueryOperator::Like };
            return Ok(Condition::Compare { left, operator, right });
        }

        if self.eat_keyword("IN") {
            let list = if *self.peek() == Token::LParen {
                self.pos += 1;
                let mut list = vec![self.operand()?];
                while *self.peek() == Token::Comma {
                    self.pos += 1;
                    list.push(self.operand()?);
                }
                self.expect(Token::RParen)?;
                list
            } else {
                vec![self.operand()?]
            };
            return Ok(Condition::In { operand: left, list, negated });
        }

        if self.eat_keyword("BETWEEN") {
            let low = self.operand()?;
            self.expect_keyword("AND")?;
            let high = self.operand()?;
            let between = Condition::Between { operand: left, low, high };
            return Ok(if negated { between.negate() } else { between });
        }

        if negated {
            return Err(self.unexpected("LIKE, IN or BETWEEN after NOT"));
        }

        let operator = match self.peek() {
            Token::Eq => QueryOperator::Equal,
            Token::NotEq => QueryOperator::NotEqual,
            Token::Lt => QueryOperator::LessThan,
            Token::LtEq => QueryOperator::LessThanOrEqual,
            Token::Gt => QueryOperator::GreaterThan,
            Token::GtEq => QueryOperator::GreaterThanOrEqual,
            _ => return Err(self.unexpected("comparison operator")),
        };
        self.pos += 1;
        let right = self.operand()?;
        Ok(Condition::Compare { left, operator, right })
    }

    fn operand(&mut self) -> Result<Operand, QueryError> {
        match self.advance() {
            Token::Str(s) => Ok(Operand::Literal(Value::String(s))),
            Token::Number(n) => Ok(Operand::Literal(number_value(&n, false)?)),
            Token::Minus => match self.advance() {
                Token::Number(n) => Ok(Operand::Literal(number_value(&n, true)?)),
                other => Err(QueryError::UnexpectedToken {
                    expected: "number after '-'".to_string(),
                    found: other.describe(),
                }),
            },
            Token::Rid(rid) => Ok(Operand::Literal(Value::String(rid.to_string()))),
            Token::Positional => {
                let index = self.positional;
                self.positional += 1;
                Ok(Operand::Param(Param::Positional(index)))
            }
            Token::Named(name) => Ok(Operand::Param(Param::Named(name))),
            Token::Ident(word) => {
                if word.eq_ignore_ascii_case("NULL") {
                    Ok(Operand::Literal(Value::Null))
                } else if word.eq_ignore_ascii_case("TRUE") {
                    Ok(Operand::Literal(Value::Bool(true)))
                } else if word.eq_ignore_ascii_case("FALSE") {
                    Ok(Operand::Literal(Value::Bool(false)))
                } else {
                    Ok(Operand::Field(word))
                }
            }
            other => Err(QueryError::UnexpectedToken {
                expected: "value or field".to_string(),
                found: other.describe(),
            }),
        }
    }
}

fn number_value(text: &str, negative: bool) -> Result<Value, QueryError> {
    let invalid = || QueryError::InvalidClauseValue {
        clause: "number",
        value: text.to_string(),
    };

    if text.contains('.') {
        let mut value: f64 = text.parse().map_err(|_| invalid())?;
        if negative {
            value = -value;
        }
        Number::from_f64(value).map(Value::Number).ok_or_else(invalid)
    } else {
        let mut value: i64 = text.parse().map_err(|_| invalid())?;
        if negative {
            value = -value;
        }
        Ok(Value::from(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_minimal_select() {
        let query = parse("select from Person").unwrap();
        assert_eq!(query, SelectQuery::from_class("Person"));

        let query = parse("SELECT * FROM Person").unwrap();
        assert_eq!(query.class_name, "Person");
    }

    #[test]
    fn test_where_with_precedence() {
        let query = parse("SELECT FROM Person WHERE a = 1 OR b = 2 AND NOT c = 3").unwrap();
        assert_eq!(
            query.condition.unwrap().to_string(),
            "(a = 1 OR (b = 2 AND NOT (c = 3)))"
        );

        let query = parse("SELECT FROM Person WHERE (a = 1 OR b = 2) AND c = 3").unwrap();
        assert_eq!(
            query.condition.unwrap().to_string(),
            "((a = 1 OR b = 2) AND c = 3)"
        );
    }

    #[test]
    fn test_predicates() {
        let query = parse(
            "SELECT FROM Person WHERE name LIKE 'A%' AND email IS NOT NULL \
             AND age BETWEEN 18 AND 65 AND city NOT IN ('Rome', 'Paris') AND score >= -1.5",
        )
        .unwrap();
        assert_eq!(
            query.condition.unwrap().to_string(),
            "((((name LIKE 'A%' AND email IS NOT NULL) AND age BETWEEN 18 AND 65) \
             AND city NOT IN ('Rome', 'Paris')) AND score >= -1.5)"
        );
    }

    #[test]
    fn test_parameters_numbered_in_order() {
        let query = parse("SELECT FROM Person WHERE a = ? AND b = :name AND c <> ? LIMIT ?").unwrap();
        let Some(Condition::And(left, right)) = query.condition else {
            panic!("expected AND");
        };
        assert_eq!(
            *right,
            Condition::Compare {
                left: Operand::field("c"),
                operator: QueryOperator::NotEqual,
                right: Operand::Param(Param::Positional(1)),
            }
        );
        assert!(left.to_string().contains(":name"));
        assert_eq!(query.limit, Some(Operand::Param(Param::Positional(2))));
    }

    #[test]
    fn test_record_attributes_and_ids() {
        let query = parse("SELECT FROM Person WHERE @rid = #9:0 OR @class = \"Person\"").unwrap();
        assert_eq!(
            query.condition.unwrap(),
            Condition::Compare {
                left: Operand::field("@rid"),
                operator: QueryOperator::Equal,
                right: Operand::literal("#9:0"),
            }
            .or(Condition::Compare {
                left: Operand::field("@class"),
                operator: QueryOperator::Equal,
                right: Operand::literal("Person"),
            })
        );
    }

    #[test]
    fn test_order_skip_limit() {
        let query =
            parse("SELECT FROM Person ORDER BY lastName DESC, firstName SKIP 20 LIMIT 10").unwrap();
        assert_eq!(
            query.order_by,
            vec![
                ("lastName".to_string(), OrderDirection::Desc),
                ("firstName".to_string(), OrderDirection::Asc),
            ]
        );
        assert_eq!(query.skip, Some(Operand::literal(20)));
        assert_eq!(query.limit, Some(Operand::literal(10)));

        let query = parse("SELECT FROM Person LIMIT 5 SKIP 1").unwrap();
        assert_eq!(query.skip, Some(Operand::literal(1)));
        assert_eq!(query.limit, Some(Operand::literal(5)));
    }

    #[test]
    fn test_string_escapes_and_paths() {
        let query = parse(r"SELECT FROM Person WHERE address.city = 'O\'Hare'").unwrap();
        assert_eq!(
            query.condition.unwrap(),
            Condition::compare("address.city", QueryOperator::Equal, json!("O'Hare"))
        );
    }

    #[test]
    fn test_errors() {
        assert_eq!(
            parse("DELETE FROM Person").unwrap_err(),
            QueryError::Unsupported("DELETE".to_string())
        );
        assert!(matches!(
            parse("SELECT name FROM Person"),
            Err(QueryError::Unsupported(_))
        ));
        assert!(matches!(
            parse("SELECT FROM Person WHERE name = 'open"),
            Err(QueryError::UnterminatedString { .. })
        ));
        assert!(matches!(
            parse("SELECT FROM Person WHERE name ~ 1"),
            Err(QueryError::UnexpectedCharacter { ch: '~', .. })
        ));
        assert!(matches!(
            parse("SELECT FROM Person WHERE name"),
            Err(QueryError::UnexpectedToken { .. })
        ));
        assert!(matches!(
            parse("SELECT FROM Person LIMIT 1 LIMIT 2"),
            Err(QueryError::UnexpectedToken { .. })
        ));
    }
}
