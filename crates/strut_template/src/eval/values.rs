use std::borrow::Cow;
use std::collections::BTreeMap;

/// Delimiters for opaque-placeholder markers in phase-one render output.
/// Private-use characters never appear in data-sourced text (sanitized on the
/// way out), so a variable value cannot forge a marker.
pub(crate) const MARKER_OPEN: char = '\u{e000}';
pub(crate) const MARKER_CLOSE: char = '\u{e001}';

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<Value>),
    Record(BTreeMap<String, Value>),
    /// A binding that must pass through evaluation unresolved. Stringifies to
    /// a delimited marker that the second render pass splices back into a
    /// live reference.
    Opaque(String),
}

impl Value {
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(flag) => Value::Bool(*flag),
            serde_json::Value::Number(number) => Value::Number(number.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(text) => Value::Text(text.clone()),
            serde_json::Value::Array(items) => {
                Value::List(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(fields) => Value::Record(
                fields
                    .iter()
                    .map(|(key, value)| (key.clone(), Value::from_json(value)))
                    .collect(),
            ),
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(flag) => *flag,
            Value::Number(number) => *number != 0.0,
            Value::Text(text) => !text.is_empty(),
            Value::List(_) | Value::Record(_) | Value::Opaque(_) => true,
        }
    }

    /// Strict equality: values of different types are unequal, never an
    /// error. NaN compares unequal to itself.
    pub fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.strict_eq(y))
            }
            (Value::Record(a), Value::Record(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b)
                        .all(|((ka, va), (kb, vb))| ka == kb && va.strict_eq(vb))
            }
            (Value::Opaque(a), Value::Opaque(b)) => a == b,
            _ => false,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Text(_) => "string",
            Value::List(_) => "list",
            Value::Record(_) => "record",
            Value::Opaque(_) => "opaque reference",
        }
    }

    /// The textual form used when splicing a value into markup. Lists and
    /// records print as compact JSON; null prints as nothing.
    pub fn display_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(flag) => flag.to_string(),
            Value::Number(number) => format_number(*number),
            Value::Text(text) => sanitize_text(text).into_owned(),
            Value::List(_) | Value::Record(_) => {
                serde_json::to_string(&self.to_json()).unwrap_or_default()
            }
            Value::Opaque(name) => format!("{MARKER_OPEN}{name}{MARKER_CLOSE}"),
        }
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(flag) => serde_json::Value::Bool(*flag),
            Value::Number(number) => serde_json::Number::from_f64(*number)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(text) => serde_json::Value::String(sanitize_text(text).into_owned()),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Record(fields) => serde_json::Value::Object(
                fields
                    .iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect(),
            ),
            Value::Opaque(name) => {
                serde_json::Value::String(format!("{MARKER_OPEN}{name}{MARKER_CLOSE}"))
            }
        }
    }
}

/// Integral numbers print without a fraction so `{{ cpu.cores }}` reads `8`,
/// not `8.0`.
pub(crate) fn format_number(number: f64) -> String {
    if number.is_finite() && number.fract() == 0.0 && number.abs() < 9.0e15 {
        format!("{}", number as i64)
    } else {
        number.to_string()
    }
}

/// Drops marker delimiter characters from data-sourced text so values cannot
/// collide with opaque-placeholder markers.
pub(crate) fn sanitize_text(text: &str) -> Cow<'_, str> {
    if text.contains([MARKER_OPEN, MARKER_CLOSE]) {
        Cow::Owned(
            text.chars()
                .filter(|ch| *ch != MARKER_OPEN && *ch != MARKER_CLOSE)
                .collect(),
        )
    } else {
        Cow::Borrowed(text)
    }
}
