//! Argument tokenizer and statement parser
//!
//! Splits a call's argument list at top-level commas only: commas and
//! braces inside parentheses, brackets or quoted literals never split.
//!
//! # Example
//! ```
//! use deinliner::parse::parse_arguments;
//!
//! let args = parse_arguments(r#"mgr, "a, b, c, d {", &p"#).unwrap();
//! assert_eq!(args.len(), 3);
//! assert_eq!(args[1].to_string(), r#""a, b, c, d {""#);
//! ```

mod lexer;
mod parser;

pub use lexer::{tokenize, Spanned, Token};
pub use parser::{parse_arguments, parse_statement};
