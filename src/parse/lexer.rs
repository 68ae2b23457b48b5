//! Tokens of a call's argument list

use crate::error::ParseError;
use logos::Logos;
use std::ops::Range;

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n\f]+")]
pub enum Token {
    // ==================== Literals ====================
    #[regex(r#""([^"\\]|\\.)*""#)]
    Str,
    #[regex(r"'([^'\\]|\\.)*'")]
    Char,
    #[regex(r"0[xX][0-9a-fA-F]+[uUlL]*")]
    Hex,
    #[regex(r"[0-9]+[uUlL]*")]
    Int,
    #[regex(r"[0-9]+\.[0-9]*([eE][+-]?[0-9]+)?[fF]?")]
    #[regex(r"\.[0-9]+([eE][+-]?[0-9]+)?[fF]?")]
    #[regex(r"[0-9]+[eE][+-]?[0-9]+[fF]?")]
    Float,
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Ident,

    // ==================== Delimiters ====================
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(",")]
    Comma,
    #[token(";")]
    Semi,

    // ==================== Operators ====================
    #[token("&")]
    Amp,
    #[token("*")]
    Star,
    #[token("-")]
    Minus,
    /// Arithmetic, comparison, member access...: lexed so the parser can
    /// report them, never part of a supported argument
    #[regex(r"[+/%<>=!|^~?:.]+|&&|->|\+\+|--")]
    Operator,
}

impl Token {
    /// Delimiter character for bracket tokens
    pub fn delimiter(self) -> Option<char> {
        match self {
            Token::LParen => Some('('),
            Token::RParen => Some(')'),
            Token::LBracket => Some('['),
            Token::RBracket => Some(']'),
            Token::LBrace => Some('{'),
            Token::RBrace => Some('}'),
            _ => None,
        }
    }

    pub fn is_number(self) -> bool {
        matches!(self, Token::Int | Token::Hex | Token::Float)
    }

    pub fn is_literal(self) -> bool {
        matches!(self, Token::Str | Token::Char) || self.is_number()
    }
}

/// Token with its byte range and source text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spanned<'a> {
    pub token: Token,
    pub span: Range<usize>,
    pub text: &'a str,
}

/// Tokenize `source`, failing on the first byte no token matches
pub fn tokenize(source: &str) -> Result<Vec<Spanned<'_>>, ParseError> {
    let mut tokens = Vec::new();
    let mut lexer = Token::lexer(source);
    while let Some(result) = lexer.next() {
        let span = lexer.span();
        match result {
            Ok(token) => tokens.push(Spanned {
                token,
                text: &source[span.clone()],
                span,
            }),
            Err(()) => return Err(lex_error(source, span.start)),
        }
    }
    Ok(tokens)
}

fn lex_error(source: &str, offset: usize) -> ParseError {
    match source[offset..].chars().next() {
        Some('"') => ParseError::UnterminatedString { offset },
        Some('\'') => ParseError::UnterminatedChar { offset },
        _ => ParseError::UnrecognizedInput { offset },
    }
}
