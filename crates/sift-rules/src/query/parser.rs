//! Recursive-descent parser
//!
//! ```text
//! or      := and ( OR and )*
//! and     := not ( [AND] not )*
//! not     := NOT not | primary
//! primary := '(' or ')' | PHRASE | WORD
//! ```

use super::ast::Expr;
use super::lexer::{Token, TokenKind};
use super::SyntaxError;
use sift_core::normalize_text;

pub(crate) struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    /// `tokens` must end with an `Eof` token
    pub(crate) fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            position: 0,
        }
    }

    pub(crate) fn parse(mut self) -> Result<Expr, SyntaxError> {
        if self.peek().kind == TokenKind::Eof {
            return Err(SyntaxError::new("search query cannot be empty", Some(0)));
        }
        let expr = self.parse_or()?;
        if self.peek().kind != TokenKind::Eof {
            return Err(self.unexpected());
        }
        Ok(expr)
    }

    fn peek(&self) -> &Token {
        // Eof is never consumed, so the position stays in bounds
        &self.tokens[self.position.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.position += 1;
        }
        token
    }

    fn unexpected(&self) -> SyntaxError {
        let token = self.peek();
        if token.kind == TokenKind::Eof {
            SyntaxError::new("unexpected end of query", Some(token.index))
        } else {
            SyntaxError::new(
                format!("unexpected token '{}' at index {}", token.value, token.index),
                Some(token.index),
            )
        }
    }

    fn parse_or(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_and()?;
        while self.peek().kind == TokenKind::Or {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::or(left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_not()?;
        loop {
            match self.peek().kind {
                TokenKind::And => {
                    self.advance();
                }
                // Adjacent terms imply AND
                TokenKind::Word | TokenKind::Phrase | TokenKind::LParen | TokenKind::Not => {}
                _ => break,
            }
            let right = self.parse_not()?;
            left = Expr::and(left, right);
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, SyntaxError> {
        if self.peek().kind == TokenKind::Not {
            self.advance();
            return Ok(Expr::not(self.parse_not()?));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, SyntaxError> {
        match self.peek().kind {
            TokenKind::LParen => {
                let open = self.advance();
                if self.peek().kind == TokenKind::RParen {
                    return Err(SyntaxError::new(
                        format!("empty group at index {}", open.index),
                        Some(open.index),
                    ));
                }
                let expr = self.parse_or()?;
                if self.peek().kind != TokenKind::RParen {
                    let token = self.peek();
                    return Err(SyntaxError::new(
                        format!("expected ')' at index {} to close group opened at index {}", token.index, open.index),
                        Some(token.index),
                    ));
                }
                self.advance();
                Ok(expr)
            }
            TokenKind::Phrase => {
                let token = self.advance();
                let phrase = normalize_text(&token.value);
                if phrase.is_empty() {
                    return Err(SyntaxError::new(
                        format!("quoted phrase at index {} cannot be empty", token.index),
                        Some(token.index),
                    ));
                }
                Ok(Expr::Phrase(phrase))
            }
            TokenKind::Word => {
                let token = self.advance();
                parse_word(&token)
            }
            _ => Err(self.unexpected()),
        }
    }
}

/// Classify a bare token as word, prefix, or fuzzy term
fn parse_word(token: &Token) -> Result<Expr, SyntaxError> {
    let raw = token.value.trim();
    let invalid = |reason: &str| {
        SyntaxError::new(
            format!("{} (token '{}' at index {})", reason, token.value, token.index),
            Some(token.index),
        )
    };

    if raw.is_empty() {
        return Err(invalid("empty token"));
    }

    if raw.contains('*') {
        let prefix = match raw.strip_suffix('*') {
            Some(prefix) if !prefix.contains('*') => prefix,
            _ => return Err(invalid("only a single trailing wildcard is supported")),
        };
        if prefix.contains('~') {
            return Err(invalid("wildcard and fuzzy cannot be combined"));
        }
        let prefix = normalize_text(prefix);
        if prefix.is_empty() {
            return Err(invalid("wildcard needs a prefix"));
        }
        return Ok(Expr::Prefix(prefix));
    }

    if let Some((value, distance)) = raw.rsplit_once('~') {
        if value.is_empty() || value.contains('~') {
            return Err(invalid("invalid fuzzy term"));
        }
        let distance = match distance {
            "1" => 1,
            "2" => 2,
            _ => return Err(invalid("fuzzy distance must be 1 or 2")),
        };
        let value = normalize_text(value);
        if value.is_empty() {
            return Err(invalid("invalid fuzzy term"));
        }
        return Ok(Expr::Fuzzy { value, distance });
    }

    let word = normalize_text(raw);
    if word.is_empty() {
        return Err(invalid("invalid token"));
    }
    Ok(Expr::Word(word))
}

#[cfg(test)]
mod tests {
    use crate::query::{parse_query, Expr};

    fn word(value: &str) -> Expr {
        Expr::Word(value.to_string())
    }

    fn parse(input: &str) -> Expr {
        parse_query(input).unwrap().expression().clone()
    }

    #[test]
    fn test_precedence() {
        // NOT > AND > OR
        assert_eq!(
            parse("a OR b AND NOT c"),
            Expr::or(word("a"), Expr::and(word("b"), Expr::not(word("c"))))
        );
    }

    #[test]
    fn test_implicit_and() {
        assert_eq!(parse("alpha beta"), Expr::and(word("alpha"), word("beta")));
        assert_eq!(
            parse("alpha NOT beta"),
            Expr::and(word("alpha"), Expr::not(word("beta")))
        );
    }

    #[test]
    fn test_grouping_and_term_kinds() {
        assert_eq!(
            parse("(Microsoft OR \"Google   Cloud\") threat* ransom~2"),
            Expr::and(
                Expr::and(
                    Expr::or(word("microsoft"), Expr::Phrase("google cloud".to_string())),
                    Expr::Prefix("threat".to_string())
                ),
                Expr::Fuzzy {
                    value: "ransom".to_string(),
                    distance: 2
                }
            )
        );
    }

    #[test]
    fn test_display_round_trips() {
        let expr = parse("(microsoft OR \"google cloud\") AND NOT sports");
        let rendered = expr.to_string();
        assert_eq!(rendered, "((microsoft OR \"google cloud\") AND NOT sports)");
        assert_eq!(parse(&rendered), expr);
    }

    #[test]
    fn test_rejected_inputs() {
        for input in [
            "\"unterminated",
            "th*eat",
            "*threat",
            "threat**",
            "*",
            "risk~3",
            "risk~0",
            "foo~",
            "~1",
            "a~1~2",
            "threat*~1",
            "()",
            "(alpha",
            "alpha)",
            "\"\"",
            "",
            "   ",
            "alpha AND",
            "OR alpha",
            "NOT",
        ] {
            assert!(parse_query(input).is_err(), "expected syntax error for {:?}", input);
        }
    }

    #[test]
    fn test_error_index_points_at_token() {
        let err = parse_query("alpha risk~3").unwrap_err();
        assert_eq!(err.index, Some(6));
        assert!(err.message.contains("risk~3"));

        let err = parse_query("(alpha beta").unwrap_err();
        assert_eq!(err.index, Some(11));
    }
}
