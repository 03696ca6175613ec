//! Tokenizer and recursive-descent parser for filter expressions.
//!
//! Grammar:
//! ```text
//! expr     := and ("or" and)*
//! and      := unary ("and" unary)*
//! unary    := "not" unary | primary
//! primary  := "(" expr ")" | match
//! match    := value ["not"] "in" selector
//!           | selector ("==" | "!=") value
//!           | selector ["not"] "contains" value
//!           | selector "is" ["not"] "empty"
//! ```
//!
//! `and`/`or` chains are built flat, and `(`/`not` nesting is capped at
//! [`MAX_NESTING`], so the tree stays shallow however long the input is.

use concord_common::ConcordError;

/// Parsed predicate tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    Match(MatchExpr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOp {
    Equal,
    NotEqual,
    /// `value in selector` and `selector contains value`
    In,
    NotIn,
    IsEmpty,
    IsNotEmpty,
}

/// A leaf comparison against one selector
#[derive(Debug, Clone, PartialEq)]
pub struct MatchExpr {
    pub selector: Vec<String>,
    pub op: MatchOp,
    /// Absent for the emptiness checks
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    /// Bare word: selector path, keyword or unquoted value
    Word(String),
    /// Quoted string literal
    Quoted(String),
    Eq,
    NotEq,
    LParen,
    RParen,
}

#[derive(Debug, Clone)]
struct Spanned {
    token: Token,
    pos: usize,
}

/// Deepest allowed nesting of parentheses and `not`
pub const MAX_NESTING: usize = 64;

const KEYWORDS: &[&str] = &["and", "or", "not", "in", "contains", "is", "empty"];

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | ':' | '+' | '@')
}

fn compile_error(reason: impl Into<String>, position: usize) -> ConcordError {
    ConcordError::FilterCompile {
        reason: reason.into(),
        position,
    }
}

fn tokenize(input: &str) -> Result<Vec<Spanned>, ConcordError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(pos, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Spanned { token: Token::LParen, pos });
            }
            ')' => {
                chars.next();
                tokens.push(Spanned { token: Token::RParen, pos });
            }
            '=' | '!' => {
                chars.next();
                match chars.next() {
                    Some((_, '=')) => {
                        let token = if c == '=' { Token::Eq } else { Token::NotEq };
                        tokens.push(Spanned { token, pos });
                    }
                    _ => return Err(compile_error(format!("expected '=' after '{c}'"), pos)),
                }
            }
            '"' => {
                chars.next();
                let mut text = String::new();
                let mut closed = false;
                while let Some((_, c)) = chars.next() {
                    match c {
                        '"' => {
                            closed = true;
                            break;
                        }
                        '\\' => match chars.next() {
                            Some((_, 'n')) => text.push('\n'),
                            Some((_, 't')) => text.push('\t'),
                            Some((_, escaped)) => text.push(escaped),
                            None => break,
                        },
                        _ => text.push(c),
                    }
                }
                if !closed {
                    return Err(compile_error("unterminated string literal", pos));
                }
                tokens.push(Spanned { token: Token::Quoted(text), pos });
            }
            '`' => {
                chars.next();
                let mut text = String::new();
                let mut closed = false;
                for (_, c) in chars.by_ref() {
                    if c == '`' {
                        closed = true;
                        break;
                    }
                    text.push(c);
                }
                if !closed {
                    return Err(compile_error("unterminated raw string literal", pos));
                }
                tokens.push(Spanned { token: Token::Quoted(text), pos });
            }
            c if is_word_char(c) => {
                let mut word = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if !is_word_char(c) {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                tokens.push(Spanned { token: Token::Word(word), pos });
            }
            other => return Err(compile_error(format!("unexpected character '{other}'"), pos)),
        }
    }

    Ok(tokens)
}

/// Parse filter text into a predicate tree. Blank input yields `None`.
pub fn parse(input: &str) -> Result<Option<Expr>, ConcordError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Ok(None);
    }

    let mut parser = Parser {
        tokens,
        cursor: 0,
        end: input.len(),
        depth: 0,
    };
    let expr = parser.parse_or()?;

    if let Some(extra) = parser.peek() {
        return Err(compile_error("unexpected trailing input", extra.pos));
    }
    Ok(Some(expr))
}

struct Parser {
    tokens: Vec<Spanned>,
    cursor: usize,
    end: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Spanned> {
        self.tokens.get(self.cursor)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.cursor + offset).map(|s| &s.token)
    }

    fn position(&self) -> usize {
        self.peek().map_or(self.end, |s| s.pos)
    }

    fn next(&mut self) -> Option<Spanned> {
        let token = self.tokens.get(self.cursor).cloned();
        if token.is_some() {
            self.cursor += 1;
        }
        token
    }

    fn at_keyword(&self, offset: usize, keyword: &str) -> bool {
        matches!(self.peek_at(offset), Some(Token::Word(w)) if w == keyword)
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.at_keyword(0, keyword) {
            self.cursor += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), ConcordError> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(compile_error(format!("expected '{keyword}'"), self.position()))
        }
    }

    /// Step one nesting level deeper, failing past [`MAX_NESTING`]
    fn descend(&mut self, pos: usize) -> Result<(), ConcordError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(compile_error("expression nested too deeply", pos));
        }
        Ok(())
    }

    fn parse_or(&mut self) -> Result<Expr, ConcordError> {
        let first = self.parse_and()?;
        if !self.at_keyword(0, "or") {
            return Ok(first);
        }

        let mut terms = vec![first];
        while self.eat_keyword("or") {
            terms.push(self.parse_and()?);
        }
        Ok(Expr::Or(terms))
    }

    fn parse_and(&mut self) -> Result<Expr, ConcordError> {
        let first = self.parse_unary()?;
        if !self.at_keyword(0, "and") {
            return Ok(first);
        }

        let mut terms = vec![first];
        while self.eat_keyword("and") {
            terms.push(self.parse_unary()?);
        }
        Ok(Expr::And(terms))
    }

    fn parse_unary(&mut self) -> Result<Expr, ConcordError> {
        if self.at_keyword(0, "not") {
            let pos = self.position();
            self.cursor += 1;
            self.descend(pos)?;
            let inner = self.parse_unary()?;
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ConcordError> {
        if matches!(self.peek_at(0), Some(Token::LParen)) {
            let pos = self.position();
            self.cursor += 1;
            self.descend(pos)?;
            let inner = self.parse_or()?;
            self.depth -= 1;
            return match self.next() {
                Some(Spanned { token: Token::RParen, .. }) => Ok(inner),
                Some(other) => Err(compile_error("expected ')'", other.pos)),
                None => Err(compile_error("unclosed '('", self.end)),
            };
        }
        self.parse_match()
    }

    fn parse_match(&mut self) -> Result<Expr, ConcordError> {
        // `value in selector` is recognised by looking past the first operand
        let value_first = self.at_keyword(1, "in") || (self.at_keyword(1, "not") && self.at_keyword(2, "in"));

        if value_first {
            let value = self.parse_value()?;
            let op = if self.eat_keyword("not") { MatchOp::NotIn } else { MatchOp::In };
            self.expect_keyword("in")?;
            let selector = self.parse_selector()?;
            return Ok(Expr::Match(MatchExpr { selector, op, value: Some(value) }));
        }

        let selector = self.parse_selector()?;
        let pos = self.position();
        let op = match self.next().map(|s| s.token) {
            Some(Token::Eq) => MatchOp::Equal,
            Some(Token::NotEq) => MatchOp::NotEqual,
            Some(Token::Word(w)) if w == "contains" => MatchOp::In,
            Some(Token::Word(w)) if w == "not" => {
                self.expect_keyword("contains")?;
                MatchOp::NotIn
            }
            Some(Token::Word(w)) if w == "is" => {
                let negated = self.eat_keyword("not");
                self.expect_keyword("empty")?;
                let op = if negated { MatchOp::IsNotEmpty } else { MatchOp::IsEmpty };
                return Ok(Expr::Match(MatchExpr { selector, op, value: None }));
            }
            Some(_) => return Err(compile_error("expected a match operator", pos)),
            None => return Err(compile_error("expected a match operator", self.end)),
        };

        let value = self.parse_value()?;
        Ok(Expr::Match(MatchExpr { selector, op, value: Some(value) }))
    }

    fn parse_selector(&mut self) -> Result<Vec<String>, ConcordError> {
        let pos = self.position();
        match self.next().map(|s| s.token) {
            Some(Token::Word(word)) if !KEYWORDS.contains(&word.as_str()) => {
                let segments: Vec<String> = word.split('.').map(str::to_string).collect();
                if segments.iter().any(String::is_empty) {
                    return Err(compile_error(format!("invalid selector '{word}'"), pos));
                }
                Ok(segments)
            }
            Some(_) => Err(compile_error("expected a selector", pos)),
            None => Err(compile_error("expected a selector", self.end)),
        }
    }

    fn parse_value(&mut self) -> Result<String, ConcordError> {
        let pos = self.position();
        match self.next().map(|s| s.token) {
            Some(Token::Quoted(text)) => Ok(text),
            Some(Token::Word(word)) if !KEYWORDS.contains(&word.as_str()) => Ok(word),
            Some(_) => Err(compile_error("expected a value", pos)),
            None => Err(compile_error("expected a value", self.end)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(selector: &str, op: MatchOp, value: Option<&str>) -> Expr {
        Expr::Match(MatchExpr {
            selector: selector.split('.').map(str::to_string).collect(),
            op,
            value: value.map(str::to_string),
        })
    }

    #[test]
    fn test_parse_value_in_selector() {
        let expr = parse("master in Services.Tags").unwrap().unwrap();
        assert_eq!(expr, leaf("Services.Tags", MatchOp::In, Some("master")));

        let expr = parse("\"v 2\" not in Service.Tags").unwrap().unwrap();
        assert_eq!(expr, leaf("Service.Tags", MatchOp::NotIn, Some("v 2")));
    }

    #[test]
    fn test_parse_precedence() {
        // and binds tighter than or
        let expr = parse("A == 1 or B == 2 and C == 3").unwrap().unwrap();
        let Expr::Or(terms) = expr else {
            panic!("expected or at the root");
        };
        assert_eq!(terms.len(), 2);
        assert_eq!(terms[0], leaf("A", MatchOp::Equal, Some("1")));
        assert!(matches!(&terms[1], Expr::And(inner) if inner.len() == 2));

        let expr = parse("not (A == 1 or B != 2)").unwrap().unwrap();
        assert!(matches!(expr, Expr::Not(_)));
    }

    #[test]
    fn test_parse_emptiness_and_contains() {
        let expr = parse("Service.Tags is not empty").unwrap().unwrap();
        assert_eq!(expr, leaf("Service.Tags", MatchOp::IsNotEmpty, None));

        let expr = parse("Service.Tags not contains `raw value`").unwrap().unwrap();
        assert_eq!(expr, leaf("Service.Tags", MatchOp::NotIn, Some("raw value")));
    }

    #[test]
    fn test_blank_input() {
        assert!(parse("").unwrap().is_none());
        assert!(parse("   \t").unwrap().is_none());
    }

    #[test]
    fn test_compile_errors_carry_position() {
        let err = parse("Node.Node == ").unwrap_err();
        assert_eq!(
            err,
            ConcordError::FilterCompile {
                reason: "expected a value".to_string(),
                position: 13,
            }
        );

        let err = parse("Node.Node = foo").unwrap_err();
        assert!(matches!(err, ConcordError::FilterCompile { position: 10, .. }));

        let err = parse("(Node.Node == foo").unwrap_err();
        assert!(matches!(err, ConcordError::FilterCompile { position: 17, .. }));

        assert!(parse("Node..Node == foo").is_err());
        assert!(parse("Node.Node == foo bar").is_err());
        assert!(parse("\"unterminated").is_err());
        assert!(parse("and == foo").is_err());
    }

    #[test]
    fn test_chains_are_flat() {
        let expr = parse("A == 1 and B == 2 and C == 3").unwrap().unwrap();
        assert!(matches!(expr, Expr::And(terms) if terms.len() == 3));

        let text = vec!["Node == a"; 5000].join(" or ");
        let Some(Expr::Or(terms)) = parse(&text).unwrap() else {
            panic!("expected a flat or");
        };
        assert_eq!(terms.len(), 5000);
    }

    #[test]
    fn test_nesting_limit() {
        let nested = |depth: usize| format!("{}Node == a{}", "(".repeat(depth), ")".repeat(depth));

        assert!(parse(&nested(MAX_NESTING)).is_ok());

        // The first parenthesis past the limit is reported
        for depth in [MAX_NESTING + 1, 700, 50_000] {
            let err = parse(&nested(depth)).unwrap_err();
            assert_eq!(
                err,
                ConcordError::FilterCompile {
                    reason: "expression nested too deeply".to_string(),
                    position: MAX_NESTING,
                }
            );
        }

        let negations = format!("{}Node == a", "not ".repeat(10_000));
        let err = parse(&negations).unwrap_err();
        assert!(matches!(err, ConcordError::FilterCompile { position, .. } if position == MAX_NESTING * 4));

        // Nesting depth is tracked per branch, not summed across siblings
        let siblings = vec![nested(MAX_NESTING); 10].join(" and ");
        assert!(parse(&siblings).is_ok());
    }
}
