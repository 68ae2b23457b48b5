// Integration test utilities
//
// Shared occurrence builders and tracing setup for the deinliner tests

#![allow(dead_code)]

use deinliner::{DeinlineConfig, Deinlined, Deinliner, Occurrence};
use tracing_subscriber::EnvFilter;

/// Install a test-captured subscriber once; `RUST_LOG=deinliner=debug` shows stage logs
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()))
        .with_test_writer()
        .try_init();
}

/// Parse a block of statement lines, panicking on malformed fixtures
pub fn occurrence(point: &str, lines: &[&str]) -> Occurrence {
    Occurrence::parse(point, lines)
        .unwrap_or_else(|e| panic!("fixture {point} does not parse: {e}"))
}

/// Run with the default configuration in strict mode
pub fn deinline(occurrences: &[Occurrence]) -> Deinlined {
    deinline_with(DeinlineConfig::default(), occurrences)
}

pub fn deinline_with(config: DeinlineConfig, occurrences: &[Occurrence]) -> Deinlined {
    init_tracing();
    Deinliner::new(config)
        .expect("valid config")
        .run(occurrences)
        .unwrap_or_else(|e| panic!("deinlining failed: {e}"))
}

/// Rendered body statements of the only synthesized function
pub fn body_lines(out: &Deinlined) -> Vec<String> {
    assert_eq!(out.functions.len(), 1, "expected a single function");
    out.functions[0].body.iter().map(|s| s.to_string()).collect()
}

/// Rendered replacement of every call site, in input order
pub fn call_lines(out: &Deinlined) -> Vec<String> {
    out.call_sites.iter().map(|s| s.to_string()).collect()
}
