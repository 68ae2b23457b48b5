//! Deinliner - factors repeated inlined call sequences into shared functions
//!
//! This library takes many structurally identical blocks of flat API-call
//! statements (one per captured frame) and replaces each group of isomorphic
//! blocks with a single synthesized procedure plus one call per block,
//! preserving call order and the aliasing between calls inside a block.
//!
//! # Example
//! ```
//! use deinliner::{DeinlineConfig, Deinliner, Occurrence};
//!
//! let occurrences = vec![
//!     Occurrence::parse("frame0", &["glBindTexture(GL_TEXTURE_2D, 3);", "glDrawArrays(4, 0, 6);"]).unwrap(),
//!     Occurrence::parse("frame1", &["glBindTexture(GL_TEXTURE_2D, 7);", "glDrawArrays(4, 0, 6);"]).unwrap(),
//! ];
//! let out = Deinliner::new(DeinlineConfig::default())
//!     .unwrap()
//!     .run(&occurrences)
//!     .unwrap();
//! assert_eq!(out.functions.len(), 1);
//! assert_eq!(out.call_sites[1].to_string(), "subframe0(7);");
//! ```

pub mod analysis;
pub mod coalesce;
pub mod config;
pub mod ctype;
pub mod deinliner;
pub mod error;
pub mod grouper;
pub mod model;
pub mod parse;
pub mod render;
pub mod synth;

pub use config::{DeinlineConfig, FusionRule, Prototypes};
pub use ctype::CType;
pub use deinliner::{DeinlineReport, Deinlined, Deinliner};
pub use error::{DeinlineError, ParseError, Result};
pub use grouper::GroupId;
pub use model::{Argument, InsertionPoint, Occurrence, Statement, SymbolTable};
pub use synth::{CallSite, Formal, Replacement, SynthesizedFunction};
