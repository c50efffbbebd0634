use super::ast::{Body, TemplateNode};
use super::parser::parse_tokens;
use crate::lexer::{lex, Token, TokenKind};

fn parse(src: &str) -> Body {
    let tokens = lex(src).expect("lex");
    parse_tokens(&tokens).expect("parse")
}

fn parse_err(src: &str) -> super::parser::ParseError {
    let tokens = lex(src).expect("lex");
    parse_tokens(&tokens).expect_err("must fail")
}

#[test]
fn parses_plain_text_into_a_single_node() {
    let nodes = parse("battery low");
    assert_eq!(nodes, vec![TemplateNode::Text("battery low".to_string())]);
}

#[test]
fn parses_interpolation_node() {
    let nodes = parse("cpu: {{ cpu.usage }}%");
    assert_eq!(
        nodes,
        vec![
            TemplateNode::Text("cpu: ".to_string()),
            TemplateNode::Interpolation {
                expression: "cpu.usage".to_string(),
            },
            TemplateNode::Text("%".to_string()),
        ]
    );
}

#[test]
fn if_else_builds_one_conditional_with_else_body() {
    let nodes = parse("@if (a) {x} @else {y}");
    assert_eq!(nodes.len(), 1, "chain must collapse into one node");
    let TemplateNode::Conditional {
        branches,
        else_body,
    } = &nodes[0]
    else {
        panic!("expected conditional, got {:?}", nodes[0]);
    };
    assert_eq!(branches.len(), 1);
    assert_eq!(branches[0].expression, "a");
    assert_eq!(branches[0].body, vec![TemplateNode::Text("x".to_string())]);
    assert_eq!(
        else_body.as_deref(),
        Some(&[TemplateNode::Text("y".to_string())][..])
    );
}

#[test]
fn removing_the_else_block_leaves_branches_untouched() {
    let with_else = parse("@if (a) {x} @else {y}");
    let without_else = parse("@if (a) {x}");
    let (
        TemplateNode::Conditional {
            branches: with_branches,
            ..
        },
        TemplateNode::Conditional {
            branches: without_branches,
            else_body,
        },
    ) = (&with_else[0], &without_else[0])
    else {
        panic!("expected conditionals");
    };
    assert_eq!(with_branches, without_branches);
    assert_eq!(*else_body, None);
}

#[test]
fn else_if_branches_stay_in_source_order() {
    let nodes = parse("@if (a) {1} @else if (b) {2} @else if (c) {3} @else {4}");
    let TemplateNode::Conditional { branches, else_body } = &nodes[0] else {
        panic!("expected conditional");
    };
    let expressions: Vec<&str> = branches
        .iter()
        .map(|branch| branch.expression.as_str())
        .collect();
    assert_eq!(expressions, vec!["a", "b", "c"]);
    assert!(else_body.is_some());
}

#[test]
fn whitespace_between_chained_branches_is_dropped() {
    let nodes = parse("@if (a) {x}   @else {y}");
    assert_eq!(nodes.len(), 1, "glue whitespace must not become a node");
}

#[test]
fn whitespace_after_an_unchained_conditional_is_kept() {
    let nodes = parse("@if (a) {x}  tail");
    assert_eq!(nodes.len(), 2);
    assert_eq!(nodes[1], TemplateNode::Text("  tail".to_string()));
}

#[test]
fn parses_loop_node() {
    let nodes = parse("@for (item of items) {{{ item }}}");
    let TemplateNode::Loop { expression, body } = &nodes[0] else {
        panic!("expected loop, got {:?}", nodes[0]);
    };
    assert_eq!(expression, "item of items");
    assert_eq!(
        body,
        &vec![TemplateNode::Interpolation {
            expression: "item".to_string(),
        }]
    );
}

#[test]
fn parses_switch_with_cases_and_default() {
    let nodes = parse("@switch (x) { @case (1) {a} @case (2) {b} @default {c} }");
    let TemplateNode::Switch {
        expression,
        cases,
        default_body,
    } = &nodes[0]
    else {
        panic!("expected switch, got {:?}", nodes[0]);
    };
    assert_eq!(expression, "x");
    let case_expressions: Vec<&str> = cases
        .iter()
        .map(|case| case.expression.as_str())
        .collect();
    assert_eq!(case_expressions, vec!["1", "2"]);
    assert_eq!(
        default_body.as_deref(),
        Some(&[TemplateNode::Text("c".to_string())][..])
    );
}

#[test]
fn parses_nested_statements() {
    let nodes = parse("@if (a) { @for (x of xs) { {{ x }} } }");
    let TemplateNode::Conditional { branches, .. } = &nodes[0] else {
        panic!("expected conditional");
    };
    let inner = &branches[0].body;
    assert!(
        inner
            .iter()
            .any(|node| matches!(node, TemplateNode::Loop { .. })),
        "loop must nest inside the branch body: {inner:?}"
    );
}

#[test]
fn missing_condition_is_a_parse_error() {
    let err = parse_err("@if () {x}");
    assert_eq!(err.message, "@if is missing its condition");
}

#[test]
fn empty_interpolation_is_a_parse_error() {
    let err = parse_err("{{ }}");
    assert_eq!(err.message, "Interpolation is missing its expression");
    assert_eq!(err.token_index, 0);
}

#[test]
fn else_without_if_is_a_parse_error() {
    let err = parse_err("@else {x}");
    assert_eq!(err.message, "@else without a matching @if");
}

#[test]
fn end_of_input_inside_open_block_is_a_parse_error() {
    let err = parse_err("@if (a) {never closed");
    assert_eq!(err.message, "Unexpected end of template inside statement");
    assert_eq!(err.token_index, 0, "error points at the opening statement");
}

#[test]
fn text_between_switch_cases_is_a_parse_error() {
    let err = parse_err("@switch (x) { stray @case (1) {a} }");
    assert_eq!(err.message, "Text is not allowed between @switch cases");
}

#[test]
fn case_outside_switch_is_a_parse_error() {
    let err = parse_err("@case (1) {a}");
    assert_eq!(err.message, "@case outside of @switch");
}

#[test]
fn unmatched_close_block_token_is_a_parse_error() {
    // A bare `}` never survives the lexer, so feed the parser a
    // hand-constructed stream the way a host embedding the stages might.
    let tokens = vec![Token {
        kind: TokenKind::CloseStatementBlock,
        start: 0,
        end: 1,
        substring: "}".to_string(),
    }];
    let err = parse_tokens(&tokens).expect_err("must fail");
    assert_eq!(err.message, "Unmatched closing block");
}
