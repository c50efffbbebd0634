use serde::Serialize;
use serde_json::json;
use strut_template::{render_error, BindingsContext, Template, TemplateCache, TemplateError};

/// Shaped like the host's CPU provider output, which arrives as serialized
/// JSON on every refresh tick.
#[derive(Serialize)]
struct CpuOutput {
    usage: f64,
    frequency: f64,
    logical_core_count: u32,
}

#[derive(Serialize)]
struct BatteryOutput {
    charge_percent: f64,
    is_charging: bool,
    time_till_empty: Option<f64>,
}

fn render_text(template: &str, bindings: &BindingsContext) -> String {
    Template::parse(template)
        .expect("parse")
        .render(bindings)
        .expect("render")
        .text()
}

#[test]
fn renders_serialized_provider_structs() {
    let bindings = BindingsContext::new()
        .with_serialized(
            "cpu",
            &CpuOutput {
                usage: 37.2,
                frequency: 4200.0,
                logical_core_count: 16,
            },
        )
        .expect("serialize")
        .with_serialized(
            "battery",
            &BatteryOutput {
                charge_percent: 88.0,
                is_charging: false,
                time_till_empty: Some(312.0),
            },
        )
        .expect("serialize");

    assert_eq!(
        render_text("cpu {{ cpu.usage }}% of {{ cpu.logical_core_count }} cores", &bindings),
        "cpu 37.2% of 16 cores"
    );
    assert_eq!(
        render_text(
            "@if (battery.is_charging) {charging} @else {{{ battery.charge_percent }}%}",
            &bindings
        ),
        "88%"
    );
}

#[test]
fn weather_style_switch_over_provider_status() {
    let template = "@switch (weather.status) \
{ @case ('clear_day') {☀️} @case ('cloudy_day') {⛅} @default {{{ weather.status }}} }";
    let at = |status: &str| {
        render_text(
            template,
            &BindingsContext::new()
                .with_variable("weather", json!({"status": status, "celsius_temp": 21.0})),
        )
    };
    assert_eq!(at("clear_day"), "☀️");
    assert_eq!(at("cloudy_day"), "⛅");
    assert_eq!(at("light_rain_day"), "light_rain_day");
}

#[test]
fn loops_over_window_manager_workspaces() {
    let bindings = BindingsContext::new().with_variable(
        "workspaces",
        json!([
            {"name": "1", "focused": true},
            {"name": "2", "focused": false},
            {"name": "web", "focused": false},
        ]),
    );
    let template =
        "@for (ws of workspaces) {@if (ws.focused) {[{{ ws.name }}]} @else {{{ ws.name }}} }";
    assert_eq!(render_text(template, &bindings), "[1] 2 web ");
}

#[test]
fn rebuilding_bindings_rerenders_without_reparsing() {
    let mut cache = TemplateCache::new();
    let template = cache.get_or_parse("{{ cpu.usage }}%").expect("parse");

    let tick = |usage: f64| {
        BindingsContext::new().with_variable("cpu", json!({ "usage": usage }))
    };
    assert_eq!(template.render(&tick(10.0)).expect("render").text(), "10%");
    assert_eq!(template.render(&tick(93.5)).expect("render").text(), "93.5%");

    let again = cache.get_or_parse("{{ cpu.usage }}%").expect("parse");
    assert!(
        std::sync::Arc::ptr_eq(&template, &again),
        "the cache must hand back the same parsed tree"
    );
}

#[test]
fn provider_errors_render_as_one_line_diagnostics() {
    let src = "top\n{{ cpu.usage";
    let err = Template::parse(src).expect_err("must fail");
    assert_eq!(render_error(src, &err), "error template:2:1 Missing closing }}");

    let src = "{{ cpu.usage }}";
    let template = Template::parse(src).expect("parse");
    let err = template
        .render(&BindingsContext::new())
        .expect_err("unknown identifier");
    let rendered = render_error(src, &err);
    assert_eq!(
        rendered,
        "error in expression `cpu.usage`: Unknown identifier `cpu`"
    );
    assert!(matches!(err, TemplateError::Eval(_)));
}

#[test]
fn missing_optional_provider_field_renders_empty() {
    let bindings = BindingsContext::new()
        .with_serialized(
            "battery",
            &BatteryOutput {
                charge_percent: 40.0,
                is_charging: true,
                time_till_empty: None,
            },
        )
        .expect("serialize");
    assert_eq!(render_text("{{ battery.time_till_empty }}", &bindings), "");
}
