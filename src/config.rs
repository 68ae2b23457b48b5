//! Deinliner configuration
//!
//! Plain serde struct with a `Default` that matches GL captures, loadable
//! from TOML:
//!
//! ```toml
//! function_prefix = "subframe"
//! min_occurrences = 2
//! parallel = true
//! fallback_type = "void*"
//!
//! [prototypes]
//! openAsset = ["AAssetManager*", "const char*", "AAsset**"]
//!
//! [[fusions]]
//! producer = "openAsset"
//! consumer = "getAssetBuffer"
//! ```

use crate::ctype::CType;
use crate::error::{DeinlineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Replace a producer call immediately followed by a consumer call with a
/// single helper call, when the storage between them can stay internal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FusionRule {
    pub producer: String,
    pub consumer: String,

    /// Helper name, `<producer>And<Consumer>` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub helper: Option<String>,
}

impl FusionRule {
    pub fn new(producer: impl Into<String>, consumer: impl Into<String>) -> Self {
        Self {
            producer: producer.into(),
            consumer: consumer.into(),
            helper: None,
        }
    }

    pub fn with_helper(mut self, helper: impl Into<String>) -> Self {
        self.helper = Some(helper.into());
        self
    }

    pub fn helper_name(&self) -> String {
        if let Some(helper) = &self.helper {
            return helper.clone();
        }
        let mut consumer = self.consumer.chars();
        let capitalized: String = match consumer.next() {
            Some(first) => first.to_ascii_uppercase().to_string() + consumer.as_str(),
            None => String::new(),
        };
        format!("{}And{}", self.producer, capitalized)
    }

    pub fn matches(&self, producer: &str, consumer: &str) -> bool {
        self.producer == producer && self.consumer == consumer
    }
}

/// Deinliner settings
///
/// # Example
/// ```
/// use deinliner::DeinlineConfig;
///
/// let config = DeinlineConfig::default();
/// assert_eq!(config.function_prefix, "subframe");
/// assert_eq!(config.min_occurrences, 1);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeinlineConfig {
    /// Synthesized functions are named `<prefix><group id>`
    pub function_prefix: String,

    /// Groups with fewer occurrences are left inline
    pub min_occurrences: usize,

    /// Process groups on the rayon thread pool
    pub parallel: bool,

    /// Declared type of a parameter none of whose actuals has a known type
    pub fallback_type: String,

    /// Callee name to formal parameter C types
    ///
    /// Used for casts at call boundaries where the callee takes integers or
    /// pointers indistinctly (buffer offsets in `glDrawElements`...).
    pub prototypes: BTreeMap<String, Vec<String>>,

    pub fusions: Vec<FusionRule>,
}

impl Default for DeinlineConfig {
    fn default() -> Self {
        Self {
            function_prefix: "subframe".to_string(),
            min_occurrences: 1,
            parallel: true,
            fallback_type: "void*".to_string(),
            prototypes: default_prototypes(),
            fusions: Vec::new(),
        }
    }
}

fn default_prototypes() -> BTreeMap<String, Vec<String>> {
    let table: [(&str, &[&str]); 4] = [
        (
            "glDrawElements",
            &["GLenum", "GLsizei", "GLenum", "const GLvoid*"],
        ),
        (
            "glVertexAttribPointer",
            &["GLuint", "GLint", "GLenum", "GLboolean", "GLsizei", "const GLvoid*"],
        ),
        (
            "glTexImage2D",
            &[
                "GLenum", "GLint", "GLint", "GLsizei", "GLsizei", "GLint", "GLenum", "GLenum",
                "const GLvoid*",
            ],
        ),
        (
            "glDiscardFramebufferEXT",
            &["GLenum", "GLsizei", "const GLenum*"],
        ),
    ];
    table
        .iter()
        .map(|(name, formals)| {
            (
                name.to_string(),
                formals.iter().map(|f| f.to_string()).collect(),
            )
        })
        .collect()
}

impl DeinlineConfig {
    /// Load from TOML; missing keys take their defaults
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| DeinlineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| DeinlineError::Config(e.to_string()))
    }

    pub fn with_function_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.function_prefix = prefix.into();
        self
    }

    pub fn with_min_occurrences(mut self, min: usize) -> Self {
        self.min_occurrences = min;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_prototype<I, S>(mut self, callee: impl Into<String>, formals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prototypes
            .insert(callee.into(), formals.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_fusion(mut self, rule: FusionRule) -> Self {
        self.fusions.push(rule);
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !is_identifier(&self.function_prefix) {
            return Err(DeinlineError::Config(format!(
                "function_prefix must be a C identifier, got {:?}",
                self.function_prefix
            )));
        }
        if self.min_occurrences == 0 {
            return Err(DeinlineError::Config(
                "min_occurrences must be >= 1".to_string(),
            ));
        }
        self.fallback()?;
        Prototypes::from_config(&self.prototypes)?;
        for rule in &self.fusions {
            if rule.producer.is_empty() || rule.consumer.is_empty() {
                return Err(DeinlineError::Config(format!(
                    "fusion rule needs both producer and consumer, got {rule:?}"
                )));
            }
            if !is_identifier(&rule.helper_name()) {
                return Err(DeinlineError::Config(format!(
                    "fusion helper name must be a C identifier, got {:?}",
                    rule.helper_name()
                )));
            }
        }
        Ok(())
    }

    /// Parsed `fallback_type`
    pub fn fallback(&self) -> Result<CType> {
        CType::parse(&self.fallback_type).ok_or_else(|| {
            DeinlineError::Config(format!(
                "fallback_type is not a C type: {:?}",
                self.fallback_type
            ))
        })
    }
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Parsed callee prototype table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Prototypes {
    formals: BTreeMap<String, Vec<CType>>,
}

impl Prototypes {
    pub fn from_config(table: &BTreeMap<String, Vec<String>>) -> Result<Self> {
        let mut formals = BTreeMap::new();
        for (callee, types) in table {
            let parsed = types
                .iter()
                .map(|t| {
                    CType::parse(t).ok_or_else(|| {
                        DeinlineError::Config(format!(
                            "prototype for {callee}: {t:?} is not a C type"
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            formals.insert(callee.clone(), parsed);
        }
        Ok(Self { formals })
    }

    /// Formal type of parameter `position` of `callee`, if known
    pub fn formal(&self, callee: &str, position: usize) -> Option<&CType> {
        self.formals.get(callee).and_then(|f| f.get(position))
    }

    pub fn contains(&self, callee: &str) -> bool {
        self.formals.contains_key(callee)
    }
}
