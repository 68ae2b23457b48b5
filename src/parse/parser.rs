//! Recursive descent over argument tokens
//!
//! Grammar of one argument:
//!
//! ```text
//! unary   := '&' unary | '*' unary | '-' number | cast | postfix
//! cast    := '(' Ident+ '*'* ')' unary
//! postfix := primary ('[' unary ']')*
//! primary := literal | Ident | '(' unary ')'
//! ```
//!
//! Nested calls, arithmetic and brace initializers are rejected with
//! [`ParseError::UnsupportedExpression`].

use super::lexer::{tokenize, Spanned, Token};
use crate::ctype::CType;
use crate::error::ParseError;
use crate::model::{Argument, Statement};

type ParseResult<T> = Result<T, ParseError>;

const KEYWORDS: &[&str] = &[
    "if", "else", "switch", "while", "for", "do", "return", "sizeof", "case",
];

/// Parse the text between a call's parentheses into its arguments
pub fn parse_arguments(text: &str) -> ParseResult<Vec<Argument>> {
    let tokens = tokenize(text)?;
    check_balance(&tokens)?;

    if tokens.is_empty() {
        return Ok(Vec::new());
    }
    if tokens.len() == 1 && tokens[0].token == Token::Ident && tokens[0].text == "void" {
        return Ok(Vec::new());
    }

    let mut args = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, tok) in tokens.iter().enumerate() {
        match tok.token {
            Token::LParen | Token::LBracket | Token::LBrace => depth += 1,
            Token::RParen | Token::RBracket | Token::RBrace => depth = depth.saturating_sub(1),
            Token::Comma if depth == 0 => {
                args.push(parse_segment(text, &tokens[start..i], tok.span.start)?);
                start = i + 1;
            }
            _ => {}
        }
    }
    args.push(parse_segment(text, &tokens[start..], text.len())?);
    Ok(args)
}

/// Parse one `name(args);` line
pub fn parse_statement(line: &str) -> ParseResult<Statement> {
    let not_a_call = || ParseError::NotACall {
        line: line.trim().to_string(),
    };

    let trimmed = line.trim_end();
    let trimmed = trimmed.strip_suffix(';').unwrap_or(trimmed).trim_end();
    let open = trimmed.find('(').ok_or_else(not_a_call)?;
    if !trimmed.ends_with(')') {
        return Err(not_a_call());
    }

    let name = trimmed[..open].trim();
    if !is_identifier(name) || KEYWORDS.contains(&name) {
        return Err(not_a_call());
    }

    let args_start = open + 1;
    let args_end = trimmed.len() - 1;
    let args = parse_arguments(&trimmed[args_start..args_end]).map_err(|e| e.shifted(args_start))?;
    Ok(Statement::new(name, args))
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Tokens that continue an expression outside the argument model
fn starts_unsupported(token: Token) -> bool {
    matches!(
        token,
        Token::Operator | Token::Minus | Token::Star | Token::Amp | Token::LParen | Token::LBrace
    )
}

fn is_type_name(word: &str) -> bool {
    matches!(
        word,
        "int" | "unsigned" | "signed" | "char" | "short" | "long" | "float" | "double"
    ) || word.starts_with("GL")
}

/// Every closing delimiter matches the innermost open one
fn check_balance(tokens: &[Spanned<'_>]) -> ParseResult<()> {
    let mut stack: Vec<(char, usize)> = Vec::new();
    for tok in tokens {
        let Some(delim) = tok.token.delimiter() else {
            continue;
        };
        match delim {
            '(' | '[' | '{' => stack.push((delim, tok.span.start)),
            close => {
                let expected = match close {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                match stack.pop() {
                    Some((open, _)) if open == expected => {}
                    _ => {
                        return Err(ParseError::UnexpectedDelimiter {
                            found: close,
                            offset: tok.span.start,
                        })
                    }
                }
            }
        }
    }
    match stack.pop() {
        Some((open, offset)) => Err(ParseError::UnbalancedDelimiter { open, offset }),
        None => Ok(()),
    }
}

fn parse_segment(source: &str, tokens: &[Spanned<'_>], end: usize) -> ParseResult<Argument> {
    let Some(first) = tokens.first() else {
        return Err(ParseError::EmptyArgument { offset: end });
    };
    let seg_start = first.span.start;
    let seg_end = tokens.last().map_or(end, |t| t.span.end);

    let mut parser = ArgParser {
        tokens,
        pos: 0,
        text: source[seg_start..seg_end].trim(),
        seg_start,
    };
    let arg = parser.unary()?;
    match parser.peek() {
        None => Ok(arg),
        Some(tok) if starts_unsupported(tok.token) => Err(parser.unsupported()),
        Some(tok) => Err(ParseError::UnexpectedToken {
            found: tok.text.to_string(),
            offset: tok.span.start,
        }),
    }
}

struct ArgParser<'t, 'a> {
    tokens: &'t [Spanned<'a>],
    pos: usize,
    /// Text of the whole argument, for error reporting
    text: &'t str,
    seg_start: usize,
}

impl<'t, 'a> ArgParser<'t, 'a> {
    fn peek(&self) -> Option<&'t Spanned<'a>> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, ahead: usize) -> Option<&'t Spanned<'a>> {
        self.tokens.get(self.pos + ahead)
    }

    fn bump(&mut self) -> Option<&'t Spanned<'a>> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn unsupported(&self) -> ParseError {
        ParseError::UnsupportedExpression {
            text: self.text.to_string(),
            offset: self.seg_start,
        }
    }

    fn end_offset(&self) -> usize {
        self.tokens.last().map_or(self.seg_start, |t| t.span.end)
    }

    fn expect(&mut self, token: Token) -> ParseResult<()> {
        match self.bump() {
            Some(tok) if tok.token == token => Ok(()),
            Some(tok) if starts_unsupported(tok.token) => Err(self.unsupported()),
            Some(tok) => Err(ParseError::UnexpectedToken {
                found: tok.text.to_string(),
                offset: tok.span.start,
            }),
            None => Err(ParseError::EmptyArgument {
                offset: self.end_offset(),
            }),
        }
    }

    fn unary(&mut self) -> ParseResult<Argument> {
        let Some(tok) = self.peek() else {
            return Err(ParseError::EmptyArgument {
                offset: self.end_offset(),
            });
        };
        match tok.token {
            Token::Amp => {
                self.bump();
                Ok(Argument::address_of(self.unary()?))
            }
            Token::Star => {
                self.bump();
                Ok(Argument::deref(self.unary()?))
            }
            Token::Minus => {
                self.bump();
                match self.bump() {
                    Some(num) if num.token.is_number() => {
                        Ok(Argument::literal(format!("-{}", num.text)))
                    }
                    _ => Err(self.unsupported()),
                }
            }
            Token::LParen => {
                if let Some(ty) = self.cast_type() {
                    Ok(Argument::cast(ty, self.unary()?))
                } else {
                    self.postfix()
                }
            }
            _ => self.postfix(),
        }
    }

    /// Consume `( type )` when it is followed by an operand
    fn cast_type(&mut self) -> Option<CType> {
        let mut ahead = 1;
        let mut words = Vec::new();
        while let Some(tok) = self.peek_at(ahead) {
            if tok.token != Token::Ident {
                break;
            }
            words.push(tok.text);
            ahead += 1;
        }
        if words.is_empty() {
            return None;
        }
        let mut pointers = 0u8;
        while self.peek_at(ahead).map(|t| t.token) == Some(Token::Star) {
            pointers = pointers.saturating_add(1);
            ahead += 1;
        }
        if self.peek_at(ahead).map(|t| t.token) != Some(Token::RParen) {
            return None;
        }
        let operand = self.peek_at(ahead + 1)?;
        let starts_operand = operand.token.is_literal()
            || matches!(
                operand.token,
                Token::Ident | Token::LParen | Token::Amp | Token::Star | Token::Minus
            );
        // `(x)` alone is a parenthesized variable, `(x) y` a cast
        let ambiguous = words.len() == 1
            && pointers == 0
            && operand.token == Token::Minus
            && !is_type_name(words[0]);
        if !starts_operand || ambiguous {
            return None;
        }
        self.pos += ahead + 1;
        Some(CType::new(words.join(" "), pointers))
    }

    fn postfix(&mut self) -> ParseResult<Argument> {
        let mut arg = self.primary()?;
        while self.peek().map(|t| t.token) == Some(Token::LBracket) {
            self.bump();
            let index = self.unary()?;
            self.expect(Token::RBracket)?;
            arg = Argument::index(arg, index);
        }
        Ok(arg)
    }

    fn primary(&mut self) -> ParseResult<Argument> {
        let Some(tok) = self.bump() else {
            return Err(ParseError::EmptyArgument {
                offset: self.end_offset(),
            });
        };
        match tok.token {
            Token::Str | Token::Char | Token::Int | Token::Hex | Token::Float => {
                Ok(Argument::literal(tok.text))
            }
            Token::Ident => {
                if self.peek().map(|t| t.token) == Some(Token::LParen) {
                    // nested call
                    return Err(self.unsupported());
                }
                Ok(Argument::from_identifier(tok.text))
            }
            Token::LParen => {
                let inner = self.unary()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::LBrace | Token::Operator | Token::Minus | Token::Amp | Token::Star => {
                Err(self.unsupported())
            }
            Token::RParen
            | Token::RBracket
            | Token::RBrace
            | Token::LBracket
            | Token::Comma
            | Token::Semi => Err(ParseError::UnexpectedToken {
                found: tok.text.to_string(),
                offset: tok.span.start,
            }),
        }
    }
}
