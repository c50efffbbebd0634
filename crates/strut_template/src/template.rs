mod ast;
mod parser;
#[cfg(test)]
mod tests;

pub use ast::{Body, ConditionalBranch, SwitchCase, TemplateNode};
pub use parser::{parse_tokens, ParseError};

use crate::bindings::BindingsContext;
use crate::render::Rendered;
use crate::TemplateError;

/// A parsed template: the immutable node tree plus the source it was built
/// from. Parsing is the expensive step; callers hold on to the value and
/// re-render as bindings change.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    source: String,
    nodes: Body,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let tokens = crate::lexer::lex(source)?;
        let nodes = parse_tokens(&tokens)?;
        Ok(Self {
            source: source.to_string(),
            nodes,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn nodes(&self) -> &Body {
        &self.nodes
    }

    pub fn render(&self, bindings: &BindingsContext) -> Result<Rendered, TemplateError> {
        crate::render::render(&self.nodes, bindings)
    }
}
