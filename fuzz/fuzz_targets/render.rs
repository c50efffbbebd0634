#![no_main]

use libfuzzer_sys::fuzz_target;
use serde_json::json;
use strut_template::{BindingsContext, Template};

fuzz_target!(|data: &[u8]| {
    // Rendering is kept conservative: small inputs, a fixed bindings context,
    // and eval errors discarded. The property under test is no panic, no hang.
    if data.len() > 16 * 1024 {
        return;
    }
    let src = String::from_utf8_lossy(data);
    let Ok(template) = Template::parse(&src) else {
        return;
    };
    let bindings = BindingsContext::new()
        .with_variable("cpu", json!({"usage": 42.0, "cores": [1, 2, 3, 4]}))
        .with_variable("items", json!(["a", "b", "c"]))
        .with_variable("flag", json!(true))
        .with_substitution("slot", "center");
    let _ = template.render(&bindings);
});
