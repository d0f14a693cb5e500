//! Query tokenizer

use super::SyntaxError;
use sift_core::normalize_text;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TokenKind {
    Word,
    Phrase,
    LParen,
    RParen,
    And,
    Or,
    Not,
    Eof,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub value: String,
    /// Character offset in the query
    pub index: usize,
}

impl Token {
    fn new(kind: TokenKind, value: impl Into<String>, index: usize) -> Self {
        Self {
            kind,
            value: value.into(),
            index,
        }
    }
}

pub(crate) fn tokenize(input: &str) -> Result<Vec<Token>, SyntaxError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        if ch.is_whitespace() {
            i += 1;
            continue;
        }

        match ch {
            '(' => {
                tokens.push(Token::new(TokenKind::LParen, "(", i));
                i += 1;
            }
            ')' => {
                tokens.push(Token::new(TokenKind::RParen, ")", i));
                i += 1;
            }
            '"' => {
                let open = i;
                i += 1;
                while i < chars.len() && chars[i] != '"' {
                    i += 1;
                }
                if i >= chars.len() {
                    return Err(SyntaxError::new("unterminated quoted phrase", Some(open)));
                }
                let phrase: String = chars[open + 1..i].iter().collect();
                tokens.push(Token::new(TokenKind::Phrase, phrase, open));
                i += 1;
            }
            _ => {
                let start = i;
                while i < chars.len()
                    && !chars[i].is_whitespace()
                    && !matches!(chars[i], '(' | ')' | '"')
                {
                    i += 1;
                }
                let raw: String = chars[start..i].iter().collect();
                let kind = match normalize_text(&raw).as_str() {
                    "and" => TokenKind::And,
                    "or" => TokenKind::Or,
                    "not" => TokenKind::Not,
                    _ => TokenKind::Word,
                };
                tokens.push(Token::new(kind, raw, start));
            }
        }
    }

    tokens.push(Token::new(TokenKind::Eof, "", chars.len()));
    Ok(tokens)
}
