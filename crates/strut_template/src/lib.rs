mod bindings;
mod cache;
mod diagnostics;
mod eval;
mod lexer;
mod render;
mod scanner;
mod template;
mod trace;

pub use bindings::{BindingsContext, OpaqueRef};
pub use cache::TemplateCache;
pub use diagnostics::{offset_to_position, render_error, token_span, Position, Span};
pub use eval::{evaluate_expression, EvalError, Value};
pub use lexer::{lex, lex_with_trace, LexError, Token, TokenKind};
pub use render::{render, Rendered, Segment};
pub use scanner::Scanner;
pub use template::{
    parse_tokens, Body, ConditionalBranch, ParseError, SwitchCase, Template, TemplateNode,
};
pub use trace::LexTrace;

#[derive(Debug, Clone)]
pub enum TemplateError {
    Lex(LexError),
    Parse(ParseError),
    Eval(EvalError),
}

impl std::fmt::Display for TemplateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TemplateError::Lex(err) => write!(f, "lex error: {err}"),
            TemplateError::Parse(err) => write!(f, "parse error: {err}"),
            TemplateError::Eval(err) => write!(f, "eval error: {err}"),
        }
    }
}

impl std::error::Error for TemplateError {}

impl From<LexError> for TemplateError {
    fn from(err: LexError) -> Self {
        Self::Lex(err)
    }
}

impl From<ParseError> for TemplateError {
    fn from(err: ParseError) -> Self {
        Self::Parse(err)
    }
}

impl From<EvalError> for TemplateError {
    fn from(err: EvalError) -> Self {
        Self::Eval(err)
    }
}
