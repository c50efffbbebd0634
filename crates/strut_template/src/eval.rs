mod parser;
mod values;

pub use values::Value;
pub(crate) use values::{sanitize_text, MARKER_CLOSE, MARKER_OPEN};

use std::collections::HashMap;

use self::parser::{BinaryOp, Expr, UnaryOp};
use crate::bindings::BindingsContext;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} in `{expression}`")]
pub struct EvalError {
    pub message: String,
    pub expression: String,
}

/// Variable scope for one render pass: loop-local layers over the caller's
/// bindings. Lookup order is innermost locals first, then opaque
/// placeholders, variables, and string substitutions.
pub(crate) struct Scope<'a> {
    bindings: &'a BindingsContext,
    locals: Vec<HashMap<String, Value>>,
}

impl<'a> Scope<'a> {
    pub(crate) fn new(bindings: &'a BindingsContext) -> Self {
        Self {
            bindings,
            locals: Vec::new(),
        }
    }

    pub(crate) fn push_loop_layer(&mut self, name: &str, element: Value, index: usize) {
        let mut layer = HashMap::new();
        layer.insert(name.to_string(), element);
        layer.insert("$index".to_string(), Value::Number(index as f64));
        self.locals.push(layer);
    }

    pub(crate) fn pop_layer(&mut self) {
        self.locals.pop();
    }

    fn resolve(&self, name: &str) -> Option<Value> {
        for layer in self.locals.iter().rev() {
            if let Some(value) = layer.get(name) {
                return Some(value.clone());
            }
        }
        if self.bindings.opaque(name).is_some() {
            // Never evaluated: the name passes through as a marker and is
            // spliced back to the live reference after rendering.
            return Some(Value::Opaque(name.to_string()));
        }
        if let Some(json) = self.bindings.variable(name) {
            return Some(Value::from_json(json));
        }
        self.bindings
            .substitution(name)
            .map(|text| Value::Text(text.to_string()))
    }
}

/// Evaluates one expression against a bindings context.
pub fn evaluate_expression(text: &str, bindings: &BindingsContext) -> Result<Value, EvalError> {
    let scope = Scope::new(bindings);
    evaluate_in_scope(text, &scope)
}

pub(crate) fn evaluate_in_scope(text: &str, scope: &Scope) -> Result<Value, EvalError> {
    let expr = parser::parse_expression(text).map_err(|message| EvalError {
        message,
        expression: text.to_string(),
    })?;
    eval_expr(&expr, scope).map_err(|message| EvalError {
        message,
        expression: text.to_string(),
    })
}

/// Splits a `@for` header into its loop variable and evaluates the iterable.
pub(crate) fn evaluate_loop(text: &str, scope: &Scope) -> Result<(String, Value), EvalError> {
    let (name, iterable) = parser::parse_loop_header(text).map_err(|message| EvalError {
        message,
        expression: text.to_string(),
    })?;
    let value = eval_expr(&iterable, scope).map_err(|message| EvalError {
        message,
        expression: text.to_string(),
    })?;
    Ok((name, value))
}

fn eval_expr(expr: &Expr, scope: &Scope) -> Result<Value, String> {
    match expr {
        Expr::Null => Ok(Value::Null),
        Expr::Bool(flag) => Ok(Value::Bool(*flag)),
        Expr::Number(number) => Ok(Value::Number(*number)),
        Expr::Str(text) => Ok(Value::Text(text.clone())),
        Expr::Array(items) => {
            let values = items
                .iter()
                .map(|item| eval_expr(item, scope))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::List(values))
        }
        Expr::Ident(name) => scope
            .resolve(name)
            .ok_or_else(|| format!("Unknown identifier `{name}`")),
        Expr::Member(base, field) => {
            let value = eval_expr(base, scope)?;
            match value {
                Value::Record(fields) => Ok(fields.get(field).cloned().unwrap_or(Value::Null)),
                other => Err(format!(
                    "Cannot access `{field}` on a {}",
                    other.type_name()
                )),
            }
        }
        Expr::Index(base, key) => {
            let value = eval_expr(base, scope)?;
            let key = eval_expr(key, scope)?;
            match (value, key) {
                (Value::List(items), Value::Number(position)) => {
                    if position.fract() != 0.0 || position < 0.0 {
                        return Ok(Value::Null);
                    }
                    Ok(items.get(position as usize).cloned().unwrap_or(Value::Null))
                }
                (Value::Record(fields), Value::Text(name)) => {
                    Ok(fields.get(&name).cloned().unwrap_or(Value::Null))
                }
                (value, key) => Err(format!(
                    "Cannot index a {} with a {}",
                    value.type_name(),
                    key.type_name()
                )),
            }
        }
        Expr::Unary(op, operand) => {
            let value = eval_expr(operand, scope)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
                UnaryOp::Negate => match value {
                    Value::Number(number) => Ok(Value::Number(-number)),
                    other => Err(format!("Cannot negate a {}", other.type_name())),
                },
            }
        }
        Expr::Binary(lhs, op, rhs) => eval_binary(lhs, *op, rhs, scope),
        Expr::Ternary(condition, when_true, when_false) => {
            if eval_expr(condition, scope)?.is_truthy() {
                eval_expr(when_true, scope)
            } else {
                eval_expr(when_false, scope)
            }
        }
        Expr::Call(_, _) => {
            Err("Function calls are not supported in template expressions".to_string())
        }
        Expr::Arrow => {
            Err("Arrow functions are not supported in template expressions".to_string())
        }
    }
}

fn eval_binary(lhs: &Expr, op: BinaryOp, rhs: &Expr, scope: &Scope) -> Result<Value, String> {
    // `&&` and `||` short-circuit and yield the deciding operand, so
    // `battery.label || 'n/a'` works as a fallback.
    match op {
        BinaryOp::Or => {
            let left = eval_expr(lhs, scope)?;
            return if left.is_truthy() {
                Ok(left)
            } else {
                eval_expr(rhs, scope)
            };
        }
        BinaryOp::And => {
            let left = eval_expr(lhs, scope)?;
            return if left.is_truthy() {
                eval_expr(rhs, scope)
            } else {
                Ok(left)
            };
        }
        _ => {}
    }

    let left = eval_expr(lhs, scope)?;
    let right = eval_expr(rhs, scope)?;
    match op {
        BinaryOp::Eq => Ok(Value::Bool(left.strict_eq(&right))),
        BinaryOp::Ne => Ok(Value::Bool(!left.strict_eq(&right))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            compare(&left, &right, op)
        }
        BinaryOp::Add => match (&left, &right) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
            _ if matches!(&left, Value::Text(_) | Value::Opaque(_))
                || matches!(&right, Value::Text(_) | Value::Opaque(_)) =>
            {
                Ok(Value::Text(format!(
                    "{}{}",
                    left.display_string(),
                    right.display_string()
                )))
            }
            _ => Err(format!(
                "Cannot add a {} and a {}",
                left.type_name(),
                right.type_name()
            )),
        },
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            match (&left, &right) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Number(match op {
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div => a / b,
                    _ => a % b,
                })),
                _ => Err(format!(
                    "Arithmetic needs two numbers, got a {} and a {}",
                    left.type_name(),
                    right.type_name()
                )),
            }
        }
        BinaryOp::Or | BinaryOp::And => unreachable!("handled above"),
    }
}

fn compare(left: &Value, right: &Value, op: BinaryOp) -> Result<Value, String> {
    let ordering = match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
        (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
        _ => {
            return Err(format!(
                "Cannot compare a {} with a {}",
                left.type_name(),
                right.type_name()
            ));
        }
    };
    let Some(ordering) = ordering else {
        // NaN comparisons are false, matching strict equality's treatment.
        return Ok(Value::Bool(false));
    };
    Ok(Value::Bool(match op {
        BinaryOp::Lt => ordering.is_lt(),
        BinaryOp::Le => ordering.is_le(),
        BinaryOp::Gt => ordering.is_gt(),
        _ => ordering.is_ge(),
    }))
}
