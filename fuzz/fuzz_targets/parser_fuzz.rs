//! Parser fuzz target: feed arbitrary text to the declaration parser and schema builder.
//! Neither may panic; both return Ok or a typed error.
//! Build with: cargo fuzz run parser_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    let s = match std::str::from_utf8(data) {
        Ok(x) => x,
        Err(_) => return,
    };
    if let Ok(unit) = s7db::parse(s) {
        let _ = s7db::build_schema_with(&unit, &s7db::LayoutOptions::tia_defaults());
    }
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run parser_fuzz");
}
