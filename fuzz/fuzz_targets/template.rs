#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() > 64 * 1024 {
        return;
    }
    let src = String::from_utf8_lossy(data);
    let Ok(tokens) = strut_template::lex(&src) else {
        return;
    };
    let _ = strut_template::parse_tokens(&tokens);
});
