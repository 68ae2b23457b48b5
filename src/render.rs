//! C text rendering
//!
//! ```text
//! void subframe0(GLubyte* param_GLubyte_ptr_0)
//! {
//!     a(param_GLubyte_ptr_0);
//! }
//! ```

use crate::deinliner::Deinlined;
use crate::synth::{CallSite, Replacement, SynthesizedFunction};
use std::fmt::{self, Write as _};

const INDENT: &str = "    ";

impl SynthesizedFunction {
    /// `void name(T a, U b)`, or `void name(void)` without parameters
    pub fn prototype(&self) -> String {
        let params = if self.params.is_empty() {
            "void".to_string()
        } else {
            self.params
                .iter()
                .map(|p| p.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        format!("void {}({})", self.name, params)
    }

    /// Full definition with four-space indented body
    pub fn to_c(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.prototype());
        out.push_str("\n{\n");
        for local in &self.locals {
            let _ = writeln!(out, "{INDENT}{local};");
        }
        for statement in &self.body {
            let _ = writeln!(out, "{INDENT}{statement}");
        }
        out.push_str("}\n");
        out
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.replacement {
            Replacement::Call(statement) => write!(f, "{statement}"),
            Replacement::Inline(statements) => {
                for (i, statement) in statements.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{statement}")?;
                }
                Ok(())
            }
        }
    }
}

impl Deinlined {
    /// Prototypes of all helpers and functions, then their definitions
    pub fn to_c(&self) -> String {
        let mut out = String::new();
        let all = || self.helpers.iter().chain(self.functions.iter());
        for function in all() {
            let _ = writeln!(out, "{};", function.prototype());
        }
        for function in all() {
            out.push('\n');
            out.push_str(&function.to_c());
        }
        out
    }
}
