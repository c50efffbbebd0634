use std::fmt;
use std::sync::Arc;

use crate::bindings::{BindingsContext, OpaqueRef};
use crate::eval::{self, sanitize_text, Scope, Value, MARKER_CLOSE, MARKER_OPEN};
use crate::template::{Body, TemplateNode};
use crate::TemplateError;

/// One piece of render output. Most content is plain markup text; an opaque
/// binding comes back as a reference segment holding the exact `Arc` the
/// caller registered.
#[derive(Clone)]
pub enum Segment {
    Text(String),
    Reference { name: String, value: OpaqueRef },
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Segment::Reference { name, .. } => {
                f.debug_struct("Reference").field("name", name).finish()
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Rendered {
    segments: Vec<Segment>,
}

impl Rendered {
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn into_segments(self) -> Vec<Segment> {
        self.segments
    }

    /// Text-only projection; reference segments print in their documented
    /// `{{ name }}` marker form.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Reference { name, .. } => {
                    out.push_str("{{ ");
                    out.push_str(name);
                    out.push_str(" }}");
                }
            }
        }
        out
    }
}

impl fmt::Display for Rendered {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}

/// Renders a parsed node tree against a bindings context. Phase one walks the
/// tree depth-first into a single markup string (opaque bindings as delimited
/// markers); phase two splits that string into typed segments, splicing the
/// live references back in.
pub fn render(nodes: &Body, bindings: &BindingsContext) -> Result<Rendered, TemplateError> {
    let mut output = String::new();
    let mut scope = Scope::new(bindings);
    render_body(nodes, &mut scope, &mut output)?;
    Ok(resolve_markers(&output, bindings))
}

fn render_body(nodes: &Body, scope: &mut Scope, out: &mut String) -> Result<(), TemplateError> {
    for node in nodes {
        match node {
            TemplateNode::Text(content) => out.push_str(&sanitize_text(content)),
            TemplateNode::Interpolation { expression } => {
                let value = eval::evaluate_in_scope(expression, scope)?;
                out.push_str(&value.display_string());
            }
            TemplateNode::Conditional {
                branches,
                else_body,
            } => {
                let mut taken = false;
                for branch in branches {
                    if eval::evaluate_in_scope(&branch.expression, scope)?.is_truthy() {
                        render_body(&branch.body, scope, out)?;
                        taken = true;
                        break;
                    }
                }
                if !taken {
                    if let Some(body) = else_body {
                        render_body(body, scope, out)?;
                    }
                }
            }
            TemplateNode::Loop { expression, body } => {
                let (name, iterable) = eval::evaluate_loop(expression, scope)?;
                let items = match iterable {
                    Value::List(items) => items,
                    other => {
                        return Err(eval::EvalError {
                            message: format!("@for expects a list, got a {}", other.type_name()),
                            expression: expression.clone(),
                        }
                        .into());
                    }
                };
                for (index, item) in items.into_iter().enumerate() {
                    scope.push_loop_layer(&name, item, index);
                    let rendered = render_body(body, scope, out);
                    scope.pop_layer();
                    rendered?;
                }
            }
            TemplateNode::Switch {
                expression,
                cases,
                default_body,
            } => {
                let subject = eval::evaluate_in_scope(expression, scope)?;
                let mut matched = false;
                for case in cases {
                    let candidate = eval::evaluate_in_scope(&case.expression, scope)?;
                    if subject.strict_eq(&candidate) {
                        render_body(&case.body, scope, out)?;
                        matched = true;
                        break;
                    }
                }
                if !matched {
                    if let Some(body) = default_body {
                        render_body(body, scope, out)?;
                    }
                }
            }
        }
    }
    Ok(())
}

fn resolve_markers(output: &str, bindings: &BindingsContext) -> Rendered {
    let mut segments = Vec::new();
    let mut rest = output;
    while let Some(open_at) = rest.find(MARKER_OPEN) {
        let before = &rest[..open_at];
        if !before.is_empty() {
            segments.push(Segment::Text(before.to_string()));
        }
        let after_open = &rest[open_at + MARKER_OPEN.len_utf8()..];
        let Some(close_at) = after_open.find(MARKER_CLOSE) else {
            // Data text is sanitized, so a dangling delimiter cannot occur;
            // drop it rather than leak the private-use character.
            segments.push(Segment::Text(after_open.to_string()));
            rest = "";
            break;
        };
        let name = &after_open[..close_at];
        match bindings.opaque(name) {
            Some(reference) => segments.push(Segment::Reference {
                name: name.to_string(),
                value: Arc::clone(reference),
            }),
            // Markers are only minted for registered names within the same
            // render call; fall back to the visible marker form.
            None => segments.push(Segment::Text(format!("{{{{ {name} }}}}"))),
        }
        rest = &after_open[close_at + MARKER_CLOSE.len_utf8()..];
    }
    if !rest.is_empty() {
        segments.push(Segment::Text(rest.to_string()));
    }
    Rendered { segments }
}
