//! C types as seen by the deinliner
//!
//! Trace output carries no declarations for most identifiers, so types are
//! recovered from three places: literal syntax, the trace naming convention
//! (`local_GLubyte_ptr_0` is a `GLubyte*`), and callee prototypes. The same
//! convention is used to name synthesized formal parameters, which keeps the
//! output readable by a second deinlining pass.
//!
//! # Widening
//!
//! A formal parameter receives one actual per occurrence. Its declared type
//! is the widening of all actual types:
//!
//! ```text
//! int          + unsigned int   -> unsigned int   (numeric rank)
//! int          + GLubyte*       -> GLubyte*       (GL buffer offsets)
//! char*        + const char*    -> const char*
//! int*         + float*         -> const void*
//! float        + GLubyte*       -> conflict
//! ```

use crate::config::Prototypes;
use crate::model::{Argument, SymbolTable};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A C type: base name with qualifiers, plus pointer indirection depth
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CType {
    /// Space separated qualifiers and type name, e.g. `const unsigned int`
    pub base: String,

    /// Number of `*` after the base
    pub pointers: u8,
}

impl CType {
    pub fn new(base: impl Into<String>, pointers: u8) -> Self {
        Self {
            base: base.into(),
            pointers,
        }
    }

    /// Non-pointer type
    pub fn scalar(base: impl Into<String>) -> Self {
        Self::new(base, 0)
    }

    /// Parse a type spelled in C, e.g. `const GLvoid *` or `unsigned int`
    pub fn parse(text: &str) -> Option<Self> {
        let mut pointers = 0u8;
        let mut base = text.trim();
        while let Some(rest) = base.strip_suffix('*') {
            pointers = pointers.saturating_add(1);
            base = rest.trim_end();
        }
        let words: Vec<&str> = base.split_whitespace().collect();
        if words.is_empty()
            || !words
                .iter()
                .all(|w| w.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
        {
            return None;
        }
        Some(Self::new(words.join(" "), pointers))
    }

    /// Decode a type from a trace-mangled identifier
    ///
    /// Mangled names look like `[global|local|param]_<type words>_<index>`
    /// where `ptr` words are pointer levels, e.g. `global_const_char_ptr_3`.
    pub fn from_mangled(name: &str) -> Option<Self> {
        let mut parts = name.split('_');
        match parts.next() {
            Some("global") | Some("local") | Some("param") => {}
            _ => return None,
        }
        let mut words: Vec<&str> = parts.collect();
        // The trailing index is dropped unless the name ends in a pointer level
        match words.last() {
            Some(&"ptr") => {}
            Some(_) => {
                words.pop();
            }
            None => return None,
        }

        let mut base = Vec::new();
        let mut pointers = 0u8;
        for word in words {
            if word == "ptr" {
                pointers = pointers.saturating_add(1);
            } else if word.is_empty() || word.chars().all(|c| c.is_ascii_digit()) {
                continue;
            } else if pointers > 0 {
                // `int_ptr_const` style names are not part of the convention
                return None;
            } else {
                base.push(word);
            }
        }
        if base.is_empty() {
            return None;
        }
        Some(Self::new(base.join(" "), pointers))
    }

    /// Identifier-safe spelling, the inverse of [`CType::from_mangled`]
    pub fn mangled(&self) -> String {
        let mut out = self.base.replace(' ', "_");
        for _ in 0..self.pointers {
            out.push_str("_ptr");
        }
        out
    }

    pub fn is_pointer(&self) -> bool {
        self.pointers > 0
    }

    pub fn pointer_to(&self) -> Self {
        Self::new(self.base.clone(), self.pointers.saturating_add(1))
    }

    pub fn pointee(&self) -> Option<Self> {
        if self.pointers == 0 {
            None
        } else {
            Some(Self::new(self.base.clone(), self.pointers - 1))
        }
    }

    fn is_const(&self) -> bool {
        self.base.split(' ').any(|w| w == "const")
    }

    fn unqualified(&self) -> Self {
        let base: Vec<&str> = self
            .base
            .split(' ')
            .filter(|w| *w != "const" && *w != "volatile")
            .collect();
        Self::new(base.join(" "), self.pointers)
    }

    /// Rank used for numeric widening, `None` for non-numeric types
    fn numeric_rank(&self) -> Option<u8> {
        if self.is_pointer() {
            return None;
        }
        let rank = match self.unqualified().base.as_str() {
            "char" | "signed char" | "unsigned char" | "GLboolean" | "GLbyte" | "GLubyte" => 1,
            "short" | "unsigned short" | "GLshort" | "GLushort" => 2,
            "int" | "signed int" | "GLint" | "GLsizei" => 3,
            "unsigned int" | "unsigned" | "GLuint" | "GLbitfield" => 4,
            "GLenum" => 5,
            "long" | "GLintptr" | "GLsizeiptr" => 6,
            "unsigned long" => 7,
            "float" | "GLfloat" | "GLclampf" => 8,
            "double" => 9,
            _ => return None,
        };
        Some(rank)
    }

    pub fn is_integer(&self) -> bool {
        matches!(self.numeric_rank(), Some(rank) if rank < 8)
    }
}

impl fmt::Display for CType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base)?;
        for _ in 0..self.pointers {
            write!(f, "*")?;
        }
        Ok(())
    }
}

/// Smallest type both `a` and `b` can be cast to without a diagnostic,
/// `None` when there is none
pub fn widen(a: &CType, b: &CType) -> Option<CType> {
    if a == b {
        return Some(a.clone());
    }

    if let (Some(rank_a), Some(rank_b)) = (a.numeric_rank(), b.numeric_rank()) {
        return Some(match rank_a.cmp(&rank_b) {
            std::cmp::Ordering::Greater => a.clone(),
            std::cmp::Ordering::Less => b.clone(),
            // Same rank, different spelling: pick deterministically
            std::cmp::Ordering::Equal => a.clone().min(b.clone()),
        });
    }

    match (a.is_pointer(), b.is_pointer()) {
        (true, true) => {
            if a.pointers != b.pointers {
                return None;
            }
            if a.unqualified() == b.unqualified() {
                return Some(if a.is_const() { a.clone() } else { b.clone() });
            }
            if a.pointers == 1 {
                return Some(CType::new("const void", 1));
            }
            None
        }
        (true, false) if b.is_integer() => Some(a.clone()),
        (false, true) if a.is_integer() => Some(b.clone()),
        _ => None,
    }
}

/// Resolves the natural type of an argument expression
///
/// Lookup order for identifiers: the symbol tables (innermost first), the
/// mangled name, then the type the callee expects at that position.
#[derive(Debug, Clone)]
pub struct TypeResolver<'a> {
    scopes: Vec<&'a SymbolTable>,
    prototypes: &'a Prototypes,
}

impl<'a> TypeResolver<'a> {
    pub fn new(prototypes: &'a Prototypes) -> Self {
        Self {
            scopes: Vec::new(),
            prototypes,
        }
    }

    /// Add a symbol table searched after the ones already present
    pub fn with_scope(mut self, scope: &'a SymbolTable) -> Self {
        self.scopes.push(scope);
        self
    }

    /// Type of `arg` passed as argument `position` of `callee`
    pub fn argument_type(&self, arg: &Argument, callee: &str, position: usize) -> Option<CType> {
        let expected = self.prototypes.formal(callee, position);
        self.type_of(arg, expected)
    }

    /// Type of `arg`, using `expected` for identifiers nothing else describes
    pub fn type_of(&self, arg: &Argument, expected: Option<&CType>) -> Option<CType> {
        match arg {
            Argument::Literal { text, kind } => Some(kind.c_type(text)),
            Argument::Variable { name, .. } => self
                .lookup(name)
                .or_else(|| CType::from_mangled(name))
                .or_else(|| expected.cloned()),
            Argument::AddressOf(inner) => {
                let expected = expected.and_then(CType::pointee);
                self.type_of(inner, expected.as_ref())
                    .map(|ty| ty.pointer_to())
            }
            Argument::Deref(inner) | Argument::Index { base: inner, .. } => {
                let expected = expected.map(CType::pointer_to);
                self.type_of(inner, expected.as_ref())
                    .and_then(|ty| ty.pointee())
            }
            Argument::Cast { ty, .. } => Some(ty.clone()),
        }
    }

    fn lookup(&self, name: &str) -> Option<CType> {
        self.scopes
            .iter()
            .find_map(|scope| scope.get(name))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pointer_types() {
        assert_eq!(
            CType::parse("const GLvoid *"),
            Some(CType::new("const GLvoid", 1))
        );
        assert_eq!(CType::parse("AAsset**"), Some(CType::new("AAsset", 2)));
        assert_eq!(
            CType::parse("  unsigned   int "),
            Some(CType::scalar("unsigned int"))
        );
        assert_eq!(CType::parse("*"), None);
        assert_eq!(CType::parse("int (*)(void)"), None);
    }

    #[test]
    fn test_from_mangled_name() {
        assert_eq!(
            CType::from_mangled("local_GLubyte_ptr_0"),
            Some(CType::new("GLubyte", 1))
        );
        assert_eq!(
            CType::from_mangled("global_const_unsigned_int_ptr_I"),
            Some(CType::new("const unsigned int", 1))
        );
        assert_eq!(
            CType::from_mangled("param_AAssetManager_ptr_0"),
            Some(CType::new("AAssetManager", 1))
        );
        assert_eq!(CType::from_mangled("param_int_0"), Some(CType::scalar("int")));
        assert_eq!(
            CType::from_mangled("param_int_0_ptr"),
            Some(CType::new("int", 1))
        );
        assert_eq!(CType::from_mangled("param_float2"), None);
        assert_eq!(CType::from_mangled("mgr"), None);
    }

    #[test]
    fn test_mangled_round_trip() {
        let ty = CType::new("const char", 2);
        assert_eq!(ty.mangled(), "const_char_ptr_ptr");
        let name = format!("param_{}_4", ty.mangled());
        assert_eq!(CType::from_mangled(&name), Some(ty));
    }

    #[test]
    fn test_display() {
        assert_eq!(CType::new("GLubyte", 1).to_string(), "GLubyte*");
        assert_eq!(CType::scalar("GLenum").to_string(), "GLenum");
    }

    #[test]
    fn test_widen_numeric() {
        let int = CType::scalar("int");
        let uint = CType::scalar("unsigned int");
        let float = CType::scalar("float");
        assert_eq!(widen(&int, &uint), Some(uint.clone()));
        assert_eq!(widen(&uint, &float), Some(float));
        assert_eq!(widen(&int, &int), Some(int));
    }

    #[test]
    fn test_widen_integer_to_pointer() {
        let ptr = CType::new("GLubyte", 1);
        assert_eq!(widen(&CType::scalar("int"), &ptr), Some(ptr.clone()));
        assert_eq!(widen(&ptr, &CType::scalar("unsigned int")), Some(ptr));
    }

    #[test]
    fn test_widen_pointers() {
        let a = CType::new("char", 1);
        let b = CType::new("const char", 1);
        assert_eq!(widen(&a, &b), Some(b.clone()));
        assert_eq!(
            widen(&CType::new("int", 1), &CType::new("float", 1)),
            Some(CType::new("const void", 1))
        );
        assert_eq!(widen(&CType::new("int", 2), &CType::new("float", 2)), None);
        assert_eq!(widen(&CType::new("int", 1), &CType::new("int", 2)), None);
    }

    #[test]
    fn test_widen_conflict() {
        assert_eq!(
            widen(&CType::scalar("float"), &CType::new("GLubyte", 1)),
            None
        );
        assert_eq!(
            widen(&CType::scalar("AAsset"), &CType::scalar("int")),
            None
        );
    }

    #[test]
    fn test_resolver_lookup_order() {
        let prototypes = Prototypes::default();
        let mut symbols = SymbolTable::new();
        symbols.declare("p", CType::new("AAsset", 1));
        let resolver = TypeResolver::new(&prototypes).with_scope(&symbols);

        let p = Argument::variable("p");
        assert_eq!(resolver.type_of(&p, None), Some(CType::new("AAsset", 1)));
        assert_eq!(
            resolver.type_of(&Argument::address_of(p.clone()), None),
            Some(CType::new("AAsset", 2))
        );
        assert_eq!(
            resolver.type_of(&Argument::index(p, Argument::literal("1")), None),
            Some(CType::scalar("AAsset"))
        );

        let mangled = Argument::variable("local_GLubyte_ptr_0");
        assert_eq!(
            resolver.type_of(&mangled, None),
            Some(CType::new("GLubyte", 1))
        );
        assert_eq!(resolver.type_of(&Argument::variable("mgr"), None), None);
    }

    #[test]
    fn test_resolver_uses_prototype() {
        let prototypes = Prototypes::from_config(
            &[(
                "openAsset".to_string(),
                vec!["AAssetManager*".to_string(), "const char*".to_string(), "AAsset**".to_string()],
            )]
            .into_iter()
            .collect(),
        )
        .unwrap();
        let resolver = TypeResolver::new(&prototypes);
        assert_eq!(
            resolver.argument_type(&Argument::variable("mgr"), "openAsset", 0),
            Some(CType::new("AAssetManager", 1))
        );
        assert_eq!(
            resolver.argument_type(
                &Argument::address_of(Argument::variable("p")),
                "openAsset",
                2
            ),
            Some(CType::new("AAsset", 2))
        );
    }
}
