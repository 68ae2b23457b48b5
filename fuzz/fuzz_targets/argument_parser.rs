#![no_main]

use deinliner::parse::{parse_arguments, parse_statement};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Any input either parses or yields a ParseError, never a panic
        if let Ok(args) = parse_arguments(input) {
            // Rendered arguments parse back to the same trees
            let rendered: Vec<String> = args.iter().map(|a| a.to_string()).collect();
            if let Ok(again) = parse_arguments(&rendered.join(", ")) {
                assert_eq!(again, args);
            }
        }
        let _ = parse_statement(input);
    }
});
