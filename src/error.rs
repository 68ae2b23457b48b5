//! Error types for the deinliner
//!
//! Two layers:
//! - [`ParseError`]: an argument list or statement line could not be read.
//!   Fatal for the occurrence that contains it.
//! - [`DeinlineError`]: a group cannot be factored without risking wrong
//!   code (aliasing the analysis cannot prove, or argument types with no
//!   common castable type). Fatal for that group only.

use crate::analysis::Slot;
use crate::ctype::CType;
use crate::grouper::GroupId;
use crate::model::InsertionPoint;
use thiserror::Error;

/// Malformed argument list or statement line
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("unterminated string literal starting at offset {offset}")]
    UnterminatedString { offset: usize },

    #[error("unterminated character literal starting at offset {offset}")]
    UnterminatedChar { offset: usize },

    #[error("unbalanced '{open}' opened at offset {offset}")]
    UnbalancedDelimiter { open: char, offset: usize },

    #[error("unexpected '{found}' at offset {offset}")]
    UnexpectedDelimiter { found: char, offset: usize },

    #[error("unexpected token '{found}' at offset {offset}")]
    UnexpectedToken { found: String, offset: usize },

    #[error("empty argument at offset {offset}")]
    EmptyArgument { offset: usize },

    /// Arithmetic, nested calls, brace initializers...: anything outside the
    /// closed argument model
    #[error("unsupported expression '{text}' at offset {offset}")]
    UnsupportedExpression { text: String, offset: usize },

    #[error("not a call statement: {line}")]
    NotACall { line: String },

    #[error("unrecognized input at offset {offset}")]
    UnrecognizedInput { offset: usize },
}

impl ParseError {
    /// Byte offset of the error, when it has one
    pub fn offset(&self) -> Option<usize> {
        match self {
            ParseError::UnterminatedString { offset }
            | ParseError::UnterminatedChar { offset }
            | ParseError::UnbalancedDelimiter { offset, .. }
            | ParseError::UnexpectedDelimiter { offset, .. }
            | ParseError::UnexpectedToken { offset, .. }
            | ParseError::EmptyArgument { offset }
            | ParseError::UnsupportedExpression { offset, .. }
            | ParseError::UnrecognizedInput { offset } => Some(*offset),
            ParseError::NotACall { .. } => None,
        }
    }

    /// Rebase the offset onto an enclosing text that starts `by` bytes earlier
    pub(crate) fn shifted(self, by: usize) -> Self {
        match self {
            ParseError::UnterminatedString { offset } => ParseError::UnterminatedString {
                offset: offset + by,
            },
            ParseError::UnterminatedChar { offset } => ParseError::UnterminatedChar {
                offset: offset + by,
            },
            ParseError::UnbalancedDelimiter { open, offset } => ParseError::UnbalancedDelimiter {
                open,
                offset: offset + by,
            },
            ParseError::UnexpectedDelimiter { found, offset } => {
                ParseError::UnexpectedDelimiter {
                    found,
                    offset: offset + by,
                }
            }
            ParseError::UnexpectedToken { found, offset } => ParseError::UnexpectedToken {
                found,
                offset: offset + by,
            },
            ParseError::EmptyArgument { offset } => ParseError::EmptyArgument {
                offset: offset + by,
            },
            ParseError::UnsupportedExpression { text, offset } => {
                ParseError::UnsupportedExpression {
                    text,
                    offset: offset + by,
                }
            }
            ParseError::UnrecognizedInput { offset } => ParseError::UnrecognizedInput {
                offset: offset + by,
            },
            other @ ParseError::NotACall { .. } => other,
        }
    }
}

/// Errors raised while factoring occurrences into functions
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeinlineError {
    #[error("failed to parse occurrence {point}: {source}")]
    Parse {
        point: InsertionPoint,
        #[source]
        source: ParseError,
    },

    /// Mixed aliased/non-aliased access to the same storage role, or two
    /// irreconcilable access patterns for the same slot
    #[error(
        "{group}: unsupported aliasing between producer {producer} and consumer {consumer} ({reason}) in occurrences [{}]",
        display_points(.occurrences)
    )]
    UnsupportedAliasing {
        group: GroupId,
        producer: Slot,
        consumer: Slot,
        occurrences: Vec<InsertionPoint>,
        reason: String,
    },

    #[error(
        "{group}: no common type for parameter at {parameter} across [{}] (saw {})",
        display_points(.occurrences),
        display_types(.types)
    )]
    TypeWideningConflict {
        group: GroupId,
        parameter: Slot,
        types: Vec<CType>,
        occurrences: Vec<InsertionPoint>,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl DeinlineError {
    /// Group the error belongs to, if it is group-scoped
    pub fn group(&self) -> Option<GroupId> {
        match self {
            DeinlineError::UnsupportedAliasing { group, .. }
            | DeinlineError::TypeWideningConflict { group, .. } => Some(*group),
            DeinlineError::Parse { .. } | DeinlineError::Config(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, DeinlineError>;

fn display_points(points: &[InsertionPoint]) -> String {
    points
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn display_types(types: &[CType]) -> String {
    types
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
