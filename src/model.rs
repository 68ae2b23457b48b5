//! Statement model for captured call sequences
//!
//! A captured frame is a flat list of API calls whose arguments are
//! literals, variables, or small pointer expressions over them. Every
//! argument is parsed into a closed [`Argument`] tree so that equivalence
//! and alias analysis can use exhaustive matches instead of string tricks.
//!
//! Identifiers follow the trace naming convention: `global_*`, `param_*` and
//! `local_*` prefixes give the [`Scope`]; everything else is treated as a
//! local of the enclosing frame.

use crate::ctype::CType;
use crate::error::{DeinlineError, Result};
use crate::parse;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Storage scope of an identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Scope {
    Local,
    Param,
    Global,
}

impl Scope {
    /// Infer the scope from the trace naming convention
    pub fn of(name: &str) -> Self {
        if name.starts_with("global_") {
            Scope::Global
        } else if name.starts_with("param_") {
            Scope::Param
        } else {
            Scope::Local
        }
    }

    /// Locals and params live in the frame of the occurrence and always
    /// need to be passed in
    pub fn is_frame(self) -> bool {
        matches!(self, Scope::Local | Scope::Param)
    }
}

/// Lexical class of a literal argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LiteralKind {
    Integer,
    Hex,
    Float,
    Str,
    Char,
    /// ALL-CAPS identifier such as `GL_TEXTURE_2D` or `EXIT_SUCCESS`
    Enum,
    /// `NULL`
    Null,
}

impl LiteralKind {
    /// C type of a literal of this kind with the given spelling
    pub fn c_type(self, text: &str) -> CType {
        match self {
            LiteralKind::Integer => CType::scalar("int"),
            LiteralKind::Hex => CType::scalar("unsigned int"),
            LiteralKind::Float => CType::scalar("float"),
            LiteralKind::Str => CType::new("const char", 1),
            LiteralKind::Char => CType::scalar("char"),
            LiteralKind::Enum => {
                if text.starts_with("GL_") || text.starts_with("EGL_") {
                    CType::scalar("GLenum")
                } else {
                    CType::scalar("int")
                }
            }
            LiteralKind::Null => CType::new("void", 1),
        }
    }
}

/// One argument of a call, as a small expression tree
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Argument {
    Literal { text: String, kind: LiteralKind },
    Variable { name: String, scope: Scope },
    Deref(Box<Argument>),
    AddressOf(Box<Argument>),
    Index {
        base: Box<Argument>,
        index: Box<Argument>,
    },
    Cast { ty: CType, inner: Box<Argument> },
}

impl Argument {
    /// Literal whose kind is inferred from its spelling
    pub fn literal(text: impl Into<String>) -> Self {
        let text = text.into();
        let kind = classify_literal(&text);
        Argument::Literal { text, kind }
    }

    /// Variable whose scope is inferred from its name
    pub fn variable(name: impl Into<String>) -> Self {
        let name = name.into();
        let scope = Scope::of(&name);
        Argument::Variable { name, scope }
    }

    /// Identifier token: `NULL` and ALL-CAPS names are constants, anything
    /// else is a variable
    pub fn from_identifier(name: &str) -> Self {
        if name == "NULL" {
            Argument::Literal {
                text: name.to_string(),
                kind: LiteralKind::Null,
            }
        } else if is_enum_name(name) {
            Argument::Literal {
                text: name.to_string(),
                kind: LiteralKind::Enum,
            }
        } else {
            Argument::variable(name)
        }
    }

    pub fn address_of(inner: Argument) -> Self {
        Argument::AddressOf(Box::new(inner))
    }

    pub fn deref(inner: Argument) -> Self {
        Argument::Deref(Box::new(inner))
    }

    pub fn index(base: Argument, index: Argument) -> Self {
        Argument::Index {
            base: Box::new(base),
            index: Box::new(index),
        }
    }

    pub fn cast(ty: CType, inner: Argument) -> Self {
        Argument::Cast {
            ty,
            inner: Box::new(inner),
        }
    }

    /// `NULL`, `0`, `0x0`, `0u`...
    pub fn is_null_constant(&self) -> bool {
        match self {
            Argument::Literal {
                kind: LiteralKind::Null,
                ..
            } => true,
            Argument::Literal {
                text,
                kind: LiteralKind::Integer | LiteralKind::Hex,
            } => {
                let digits = text
                    .trim_start_matches("0x")
                    .trim_start_matches("0X")
                    .trim_end_matches(['u', 'U', 'l', 'L']);
                !digits.is_empty() && digits.chars().all(|c| c == '0')
            }
            _ => false,
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Argument::Literal { .. })
    }

    /// True if any variable in the tree lives in the occurrence's frame
    pub fn references_frame_variable(&self) -> bool {
        match self {
            Argument::Literal { .. } => false,
            Argument::Variable { scope, .. } => scope.is_frame(),
            Argument::Deref(inner) | Argument::AddressOf(inner) | Argument::Cast { inner, .. } => {
                inner.references_frame_variable()
            }
            Argument::Index { base, index } => {
                base.references_frame_variable() || index.references_frame_variable()
            }
        }
    }

    /// Variable whose storage this argument reads
    ///
    /// `&v` has no root: it produces a pointer to `v` rather than reading it.
    /// Indices are not followed, only the base of an index expression.
    pub fn root_variable(&self) -> Option<&str> {
        match self {
            Argument::Literal { .. } => None,
            Argument::Variable { name, .. } => Some(name.as_str()),
            Argument::Deref(inner) | Argument::Cast { inner, .. } => inner.root_variable(),
            Argument::Index { base, .. } => base.root_variable(),
            Argument::AddressOf(inner) => match inner.as_ref() {
                Argument::Variable { .. } => None,
                other => other.root_variable(),
            },
        }
    }

    /// Name of `v` for an argument of the form `&v`
    pub fn address_of_variable(&self) -> Option<(&str, Scope)> {
        match self {
            Argument::AddressOf(inner) => match inner.as_ref() {
                Argument::Variable { name, scope } => Some((name.as_str(), *scope)),
                _ => None,
            },
            _ => None,
        }
    }

    /// True if the path from this argument to its root goes through a
    /// dereference or an index
    pub fn reads_through_root(&self) -> bool {
        match self {
            Argument::Literal { .. } | Argument::Variable { .. } => false,
            Argument::Deref(inner) => inner.root_variable().is_some(),
            Argument::Index { base, .. } => base.root_variable().is_some(),
            Argument::Cast { inner, .. } | Argument::AddressOf(inner) => inner.reads_through_root(),
        }
    }

    /// Replace the root variable `root` with `replacement`
    ///
    /// Only the root position is rewritten; indices keep their variables.
    pub fn substitute(&self, root: &str, replacement: &Argument) -> Argument {
        match self {
            Argument::Variable { name, .. } if name == root => replacement.clone(),
            Argument::Literal { .. } | Argument::Variable { .. } => self.clone(),
            Argument::Deref(inner) => Argument::deref(inner.substitute(root, replacement)),
            Argument::AddressOf(inner) => Argument::address_of(inner.substitute(root, replacement)),
            Argument::Cast { ty, inner } => Argument::cast(ty.clone(), inner.substitute(root, replacement)),
            Argument::Index { base, index } => Argument::Index {
                base: Box::new(base.substitute(root, replacement)),
                index: index.clone(),
            },
        }
    }

    /// `*&x` is `x`, anything else gets a dereference
    pub fn deref_simplified(self) -> Argument {
        match self {
            Argument::AddressOf(inner) => *inner,
            other => Argument::deref(other),
        }
    }

    /// Strip an outer cast
    pub fn uncast(&self) -> &Argument {
        match self {
            Argument::Cast { inner, .. } => inner.uncast(),
            other => other,
        }
    }

    fn needs_parens_as_postfix_base(&self) -> bool {
        matches!(
            self,
            Argument::Deref(_) | Argument::AddressOf(_) | Argument::Cast { .. }
        )
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Argument::Literal { text, .. } => write!(f, "{text}"),
            Argument::Variable { name, .. } => write!(f, "{name}"),
            Argument::Deref(inner) => write!(f, "*{inner}"),
            Argument::AddressOf(inner) => write!(f, "&{inner}"),
            Argument::Index { base, index } => {
                if base.needs_parens_as_postfix_base() {
                    write!(f, "({base})[{index}]")
                } else {
                    write!(f, "{base}[{index}]")
                }
            }
            Argument::Cast { ty, inner } => write!(f, "({ty}) {inner}"),
        }
    }
}

fn is_enum_name(name: &str) -> bool {
    name.chars().any(|c| c.is_ascii_uppercase())
        && name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

fn classify_literal(text: &str) -> LiteralKind {
    if text.starts_with('"') {
        LiteralKind::Str
    } else if text.starts_with('\'') {
        LiteralKind::Char
    } else if text == "NULL" {
        LiteralKind::Null
    } else if text.starts_with("GL_") || text.starts_with("EGL_") || is_enum_name(text) {
        LiteralKind::Enum
    } else {
        let unsigned = text.trim_start_matches('-');
        if unsigned.starts_with("0x") || unsigned.starts_with("0X") {
            LiteralKind::Hex
        } else if unsigned
            .trim_end_matches(['u', 'U', 'l', 'L'])
            .chars()
            .all(|c| c.is_ascii_digit())
            && !unsigned.is_empty()
        {
            LiteralKind::Integer
        } else {
            LiteralKind::Float
        }
    }
}

/// One flat call statement
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Statement {
    pub name: String,
    pub args: Vec<Argument>,
}

impl Statement {
    pub fn new(name: impl Into<String>, args: Vec<Argument>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// Parse a single `name(args);` line
    pub fn parse(line: &str) -> std::result::Result<Self, crate::error::ParseError> {
        parse::parse_statement(line)
    }

    pub fn arity(&self) -> usize {
        self.args.len()
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{arg}")?;
        }
        write!(f, ");")
    }
}

/// Opaque token naming where an occurrence lives in the source program
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InsertionPoint(pub String);

impl InsertionPoint {
    pub fn new(point: impl Into<String>) -> Self {
        Self(point.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for InsertionPoint {
    fn from(point: &str) -> Self {
        Self(point.to_string())
    }
}

impl From<String> for InsertionPoint {
    fn from(point: String) -> Self {
        Self(point)
    }
}

impl fmt::Display for InsertionPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Declared C types of identifiers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SymbolTable(BTreeMap<String, CType>);

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, name: impl Into<String>, ty: CType) {
        self.0.insert(name.into(), ty);
    }

    pub fn with(mut self, name: impl Into<String>, ty: CType) -> Self {
        self.declare(name, ty);
        self
    }

    pub fn get(&self, name: &str) -> Option<&CType> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, CType)> for SymbolTable {
    fn from_iter<I: IntoIterator<Item = (String, CType)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// One inlined block of statements at a given insertion point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    pub point: InsertionPoint,
    pub statements: Vec<Statement>,

    /// Variables the surrounding program reads after the block
    #[serde(default)]
    pub live_out: BTreeSet<String>,

    #[serde(default)]
    pub declarations: SymbolTable,
}

impl Occurrence {
    pub fn new(point: impl Into<InsertionPoint>, statements: Vec<Statement>) -> Self {
        Self {
            point: point.into(),
            statements,
            live_out: BTreeSet::new(),
            declarations: SymbolTable::new(),
        }
    }

    /// Parse a block of statement lines; the first failing line fails the
    /// whole occurrence
    pub fn parse<S: AsRef<str>>(point: impl Into<InsertionPoint>, lines: &[S]) -> Result<Self> {
        let point = point.into();
        let mut statements = Vec::with_capacity(lines.len());
        for line in lines {
            let line = line.as_ref();
            if line.trim().is_empty() {
                continue;
            }
            match parse::parse_statement(line) {
                Ok(statement) => statements.push(statement),
                Err(source) => return Err(DeinlineError::Parse { point, source }),
            }
        }
        Ok(Self::new(point, statements))
    }

    pub fn with_live_out<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.live_out.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_declarations(mut self, declarations: SymbolTable) -> Self {
        self.declarations = declarations;
        self
    }

    pub fn is_live_out(&self, name: &str) -> bool {
        self.live_out.contains(name)
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}
