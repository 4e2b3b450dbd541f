use std::fs;
use std::process;

use phrasal_core::settings::{default_toml, parse_settings_toml};

macro_rules! die {
    ($result:expr, $($arg:tt)*) => {
        $result.unwrap_or_else(|e| {
            eprintln!($($arg)*, e);
            process::exit(1);
        })
    };
}

pub fn settings_export() {
    print!("{}", default_toml());
}

pub fn settings_validate(file: &str) {
    let content = die!(fs::read_to_string(file), "Error reading {file}: {}");
    let s = die!(parse_settings_toml(&content), "Error: {}");
    println!(
        "OK: search.algorithm={:?}, search.beam_size={}, search.distortion_limit={}, nbest.size={}, runtime.threads={}",
        s.search.algorithm,
        s.search.beam_size,
        s.search.distortion_limit,
        s.nbest.size,
        s.runtime.threads
    );
}
