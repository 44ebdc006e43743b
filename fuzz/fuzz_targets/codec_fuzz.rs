//! Codec fuzz target: decode every leaf of a fixed schema from arbitrary bytes,
//! then write the decoded values back. Short or corrupt images must yield errors, not panics.
//! Build with: cargo fuzz run codec_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
const SOURCE: &str = r#"
TYPE "Item"
VERSION : 0.1
   STRUCT
      on : Bool;
      v : Int;
      tag : String[6];
   END_STRUCT;
END_TYPE

DATA_BLOCK "F"
VERSION : 0.1
   STRUCT
      items : Array[0..2] of "Item";
      c : Char;
      code : FString[4];
      r : Real;
      d : LReal;
   END_STRUCT;
BEGIN
END_DATA_BLOCK
"#;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    let schema = match s7db::load_schema(SOURCE) {
        Ok(s) => s,
        Err(_) => return,
    };
    let mut out = data.to_vec();
    for el in schema.leaves() {
        if let Ok(v) = s7db::decode(data, el) {
            let _ = s7db::encode(&mut out, el, &v);
        }
    }
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run codec_fuzz");
}
