/// An ordered sequence of template nodes, rendered in document order.
pub type Body = Vec<TemplateNode>;

#[derive(Debug, Clone, PartialEq)]
pub enum TemplateNode {
    Text(String),
    Interpolation {
        expression: String,
    },
    /// `branches[0]` is the `@if`, later entries are `@else if` in source
    /// order; `else_body` is the `@else` block when present.
    Conditional {
        branches: Vec<ConditionalBranch>,
        else_body: Option<Body>,
    },
    Loop {
        expression: String,
        body: Body,
    },
    Switch {
        expression: String,
        cases: Vec<SwitchCase>,
        default_body: Option<Body>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalBranch {
    pub expression: String,
    pub body: Body,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    pub expression: String,
    pub body: Body,
}
