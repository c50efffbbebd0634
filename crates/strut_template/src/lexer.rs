use regex::Regex;

use crate::scanner::Scanner;
use crate::trace::{LexTrace, NoopTrace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Text,
    IfStatement,
    ElseIfStatement,
    ElseStatement,
    ForStatement,
    SwitchStatement,
    SwitchCaseStatement,
    SwitchDefaultStatement,
    OpenStatementBlock,
    CloseStatementBlock,
    OpenInterpolation,
    CloseInterpolation,
    Expression,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset of the first source character covered by this token.
    pub start: usize,
    /// Byte offset one past the last source character covered by this token.
    pub end: usize,
    /// For `Expression` tokens this is the accumulated expression text with
    /// edge whitespace dropped; for every other kind it is the exact source
    /// slice `start..end`. Never empty.
    pub substring: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} at offset {position}")]
pub struct LexError {
    pub message: String,
    pub position: usize,
    /// Open lexer states at the point of failure, bottom of the stack first.
    pub stack: Vec<&'static str>,
}

#[derive(Debug)]
enum LexerState {
    Default,
    InStatementArgs {
        statement_start: usize,
        skipped_stray_paren: bool,
    },
    InStatementBlock,
    InInterpolation {
        open: usize,
    },
    InExpression(ExpressionState),
}

#[derive(Debug)]
struct ExpressionState {
    close: CloseDelimiter,
    /// Offset of the `(` or `{{` that introduced this expression; anchors
    /// unterminated-input errors.
    opened_at: usize,
    ignore_symbol: Option<char>,
    partial: String,
    partial_start: Option<usize>,
    partial_end: usize,
    paren_depth: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseDelimiter {
    /// Statement arguments close on the `)` matching the opening paren.
    StatementArgs,
    /// Interpolations close on `}}`, which is left for the enclosing state
    /// to consume and tokenize.
    Interpolation,
}

impl ExpressionState {
    fn new(close: CloseDelimiter, opened_at: usize) -> Self {
        Self {
            close,
            opened_at,
            ignore_symbol: None,
            partial: String::new(),
            partial_start: None,
            partial_end: opened_at,
            paren_depth: 0,
        }
    }

    fn append(&mut self, text: &str, span: (usize, usize)) {
        if self.partial_start.is_none() {
            self.partial_start = Some(span.0);
        }
        self.partial.push_str(text);
        self.partial_end = span.1;
    }
}

fn state_name(state: &LexerState) -> &'static str {
    match state {
        LexerState::Default => "Default",
        LexerState::InStatementArgs { .. } => "InStatementArgs",
        LexerState::InStatementBlock => "InStatementBlock",
        LexerState::InInterpolation { .. } => "InInterpolation",
        LexerState::InExpression(_) => "InExpression",
    }
}

struct Patterns {
    statements: Vec<(Regex, TokenKind)>,
    open_interpolation: Regex,
    close_interpolation: Regex,
    text_delimiter: Regex,
    whitespace: Regex,
    open_paren: Regex,
    close_paren: Regex,
    open_brace: Regex,
    close_brace: Regex,
    args_chunk: Regex,
    interpolation_chunk: Regex,
    quote: Regex,
    string_single: Regex,
    string_double: Regex,
    string_backtick: Regex,
    rest: Regex,
}

impl Patterns {
    fn new() -> Self {
        Self {
            // Tried in order; `@else if` must win over `@else`.
            statements: vec![
                (pattern(r"@if"), TokenKind::IfStatement),
                (pattern(r"@else\s+if"), TokenKind::ElseIfStatement),
                (pattern(r"@else"), TokenKind::ElseStatement),
                (pattern(r"@for"), TokenKind::ForStatement),
                (pattern(r"@switch"), TokenKind::SwitchStatement),
                (pattern(r"@case"), TokenKind::SwitchCaseStatement),
                (pattern(r"@default"), TokenKind::SwitchDefaultStatement),
            ],
            open_interpolation: pattern(r"\{\{"),
            close_interpolation: pattern(r"\}\}"),
            text_delimiter: pattern(r"\{\{|@|\}"),
            whitespace: pattern(r"\s+"),
            open_paren: pattern(r"\("),
            close_paren: pattern(r"\)"),
            open_brace: pattern(r"\{"),
            close_brace: pattern(r"\}"),
            args_chunk: pattern(r"[^'\x22`()]+"),
            interpolation_chunk: pattern(r"[^'\x22`()}]+"),
            quote: pattern(r"['\x22`]"),
            string_single: pattern(r"[^']*'"),
            string_double: pattern(r#"[^"]*""#),
            string_backtick: pattern(r"[^`]*`"),
            rest: pattern(r"(?s).+"),
        }
    }

    fn string_for(&self, symbol: char) -> &Regex {
        match symbol {
            '\'' => &self.string_single,
            '`' => &self.string_backtick,
            _ => &self.string_double,
        }
    }
}

fn pattern(source: &str) -> Regex {
    Regex::new(source).expect("static lexer pattern")
}

enum StateChange {
    Stay,
    Push(LexerState),
    Pop,
    PopPush(LexerState),
}

type StepResult = Result<StateChange, (String, usize)>;

pub fn lex(template: &str) -> Result<Vec<Token>, LexError> {
    lex_with_trace(template, &NoopTrace)
}

pub fn lex_with_trace(template: &str, trace: &dyn LexTrace) -> Result<Vec<Token>, LexError> {
    let patterns = Patterns::new();
    let mut scanner = Scanner::new(template);
    let mut stack: Vec<LexerState> = vec![LexerState::Default];
    let mut tokens: Vec<Token> = Vec::new();

    while !scanner.is_empty() {
        let Some(state) = stack.last_mut() else {
            break;
        };
        let step = match state {
            LexerState::Default => step_content(&mut scanner, &patterns, &mut tokens, trace, false),
            LexerState::InStatementBlock => {
                step_content(&mut scanner, &patterns, &mut tokens, trace, true)
            }
            LexerState::InStatementArgs {
                statement_start: _,
                skipped_stray_paren,
            } => step_statement_args(&mut scanner, &patterns, &mut tokens, trace, skipped_stray_paren),
            LexerState::InInterpolation { open } => {
                step_interpolation(&mut scanner, &patterns, &mut tokens, trace, *open)
            }
            LexerState::InExpression(expression) => {
                step_expression(&mut scanner, &patterns, &mut tokens, trace, expression)
            }
        };
        match step {
            Ok(change) => apply(&mut stack, change, trace),
            Err((message, position)) => return Err(lex_error(message, position, &stack)),
        }
    }

    // The input ran out; anything still open besides a statement block is a
    // lexer-level unterminated construct. An open statement block is left for
    // the parser, which reports end-of-input against the offending token.
    match stack.last() {
        Some(LexerState::InExpression(expression)) => {
            let message = match expression.close {
                CloseDelimiter::Interpolation => "Missing closing }}",
                CloseDelimiter::StatementArgs => "Missing close symbol",
            };
            Err(lex_error(message.to_string(), expression.opened_at, &stack))
        }
        Some(LexerState::InInterpolation { open }) => {
            Err(lex_error("Missing closing }}".to_string(), *open, &stack))
        }
        Some(LexerState::InStatementArgs {
            statement_start, ..
        }) => Err(lex_error(
            "Missing closing {".to_string(),
            *statement_start,
            &stack,
        )),
        _ => Ok(tokens),
    }
}

fn lex_error(message: String, position: usize, stack: &[LexerState]) -> LexError {
    LexError {
        message,
        position,
        stack: stack.iter().map(state_name).collect(),
    }
}

fn apply(stack: &mut Vec<LexerState>, change: StateChange, trace: &dyn LexTrace) {
    match change {
        StateChange::Stay => {}
        StateChange::Push(state) => {
            let name = state_name(&state);
            stack.push(state);
            trace.on_push(name, stack.len());
        }
        StateChange::Pop => {
            if let Some(popped) = stack.pop() {
                trace.on_pop(state_name(&popped), stack.len());
            }
        }
        StateChange::PopPush(state) => {
            if let Some(popped) = stack.pop() {
                trace.on_pop(state_name(&popped), stack.len());
            }
            let name = state_name(&state);
            stack.push(state);
            trace.on_push(name, stack.len());
        }
    }
}

fn emit(tokens: &mut Vec<Token>, trace: &dyn LexTrace, kind: TokenKind, scanner: &Scanner) {
    if let Some((start, end)) = scanner.latest_span() {
        let token = Token {
            kind,
            start,
            end,
            substring: scanner.latest().unwrap_or_default().to_string(),
        };
        trace.on_token(&token);
        tokens.push(token);
    }
}

/// `Default` and `InStatementBlock` share the same content grammar; the only
/// difference is that a statement block also recognizes its closing `}`.
fn step_content(
    scanner: &mut Scanner,
    patterns: &Patterns,
    tokens: &mut Vec<Token>,
    trace: &dyn LexTrace,
    in_block: bool,
) -> StepResult {
    if in_block && scanner.scan(&patterns.close_brace) {
        emit(tokens, trace, TokenKind::CloseStatementBlock, scanner);
        return Ok(StateChange::Pop);
    }
    // Keyword patterns are only worth trying at an `@`; a failed unanchored
    // scan would otherwise walk the rest of the input.
    if scanner.rest().starts_with('@') {
        for (statement, kind) in &patterns.statements {
            if scanner.scan(statement) {
                emit(tokens, trace, *kind, scanner);
                let statement_start = scanner.latest_span().map(|(start, _)| start).unwrap_or(0);
                return Ok(StateChange::Push(LexerState::InStatementArgs {
                    statement_start,
                    skipped_stray_paren: false,
                }));
            }
        }
    }
    if scanner.rest().starts_with("{{") && scanner.scan(&patterns.open_interpolation) {
        emit(tokens, trace, TokenKind::OpenInterpolation, scanner);
        let open = scanner.latest_span().map(|(start, _)| start).unwrap_or(0);
        return Ok(StateChange::Push(LexerState::InInterpolation { open }));
    }
    if scanner.scan_until(&patterns.text_delimiter) {
        emit(tokens, trace, TokenKind::Text, scanner);
        return Ok(StateChange::Stay);
    }
    Err(("No valid tokens found".to_string(), scanner.cursor()))
}

fn step_statement_args(
    scanner: &mut Scanner,
    patterns: &Patterns,
    tokens: &mut Vec<Token>,
    trace: &dyn LexTrace,
    skipped_stray_paren: &mut bool,
) -> StepResult {
    if scanner.scan(&patterns.whitespace) {
        return Ok(StateChange::Stay);
    }
    if !*skipped_stray_paren && scanner.scan(&patterns.close_paren) {
        *skipped_stray_paren = true;
        return Ok(StateChange::Stay);
    }
    if scanner.scan(&patterns.open_paren) {
        let opened_at = scanner.latest_span().map(|(start, _)| start).unwrap_or(0);
        return Ok(StateChange::Push(LexerState::InExpression(
            ExpressionState::new(CloseDelimiter::StatementArgs, opened_at),
        )));
    }
    if scanner.scan(&patterns.open_brace) {
        emit(tokens, trace, TokenKind::OpenStatementBlock, scanner);
        return Ok(StateChange::PopPush(LexerState::InStatementBlock));
    }
    Err(("Missing closing {".to_string(), scanner.cursor()))
}

fn step_interpolation(
    scanner: &mut Scanner,
    patterns: &Patterns,
    tokens: &mut Vec<Token>,
    trace: &dyn LexTrace,
    open: usize,
) -> StepResult {
    if scanner.scan(&patterns.whitespace) {
        return Ok(StateChange::Stay);
    }
    if scanner.scan(&patterns.close_interpolation) {
        emit(tokens, trace, TokenKind::CloseInterpolation, scanner);
        return Ok(StateChange::Pop);
    }
    Ok(StateChange::Push(LexerState::InExpression(
        ExpressionState::new(CloseDelimiter::Interpolation, open),
    )))
}

fn step_expression(
    scanner: &mut Scanner,
    patterns: &Patterns,
    tokens: &mut Vec<Token>,
    trace: &dyn LexTrace,
    expression: &mut ExpressionState,
) -> StepResult {
    // Inside a string literal the close delimiter is never recognized, even
    // if it textually matches; everything through the matching quote is
    // expression text, whitespace included.
    if let Some(symbol) = expression.ignore_symbol {
        if scanner.scan(patterns.string_for(symbol)) {
            let (text, span) = latest(scanner);
            expression.append(text, span);
            expression.ignore_symbol = None;
        } else if scanner.scan(&patterns.rest) {
            // No matching quote before end of input; the end-of-input check
            // reports the unterminated expression.
            let (text, span) = latest(scanner);
            expression.append(text, span);
        }
        return Ok(StateChange::Stay);
    }

    match expression.close {
        CloseDelimiter::StatementArgs if expression.paren_depth == 0 => {
            if scanner.scan(&patterns.close_paren) {
                return Ok(finalize_expression(expression, tokens, trace));
            }
        }
        CloseDelimiter::Interpolation => {
            if scanner.check(&patterns.close_interpolation) {
                return Ok(finalize_expression(expression, tokens, trace));
            }
        }
        _ => {}
    }

    // Leading whitespace is dropped; interior whitespace is kept (trailing
    // whitespace is trimmed when the token is finalized).
    if expression.partial.is_empty() && scanner.scan(&patterns.whitespace) {
        return Ok(StateChange::Stay);
    }

    let chunk = match expression.close {
        CloseDelimiter::StatementArgs => &patterns.args_chunk,
        CloseDelimiter::Interpolation => &patterns.interpolation_chunk,
    };
    if scanner.scan(chunk) {
        let (text, span) = latest(scanner);
        expression.append(text, span);
        return Ok(StateChange::Stay);
    }

    if scanner.scan(&patterns.quote) {
        let (text, span) = latest(scanner);
        let symbol = text.chars().next().unwrap_or('"');
        expression.append(text, span);
        expression.ignore_symbol = Some(symbol);
        return Ok(StateChange::Stay);
    }
    if scanner.scan(&patterns.open_paren) {
        let (text, span) = latest(scanner);
        expression.append(text, span);
        expression.paren_depth += 1;
        return Ok(StateChange::Stay);
    }
    if scanner.scan(&patterns.close_paren) {
        // Reached only while paren_depth > 0 for statement args; inside an
        // interpolation a spent paren is plain expression text.
        let (text, span) = latest(scanner);
        expression.append(text, span);
        expression.paren_depth = expression.paren_depth.saturating_sub(1);
        return Ok(StateChange::Stay);
    }
    if expression.close == CloseDelimiter::Interpolation && scanner.scan(&patterns.close_brace) {
        // A lone `}` that is not part of `}}`.
        let (text, span) = latest(scanner);
        expression.append(text, span);
        return Ok(StateChange::Stay);
    }

    Err(("Missing close symbol".to_string(), scanner.cursor()))
}

fn latest<'a>(scanner: &Scanner<'a>) -> (&'a str, (usize, usize)) {
    let span = scanner.latest_span().unwrap_or((0, 0));
    (scanner.latest().unwrap_or_default(), span)
}

fn finalize_expression(
    expression: &mut ExpressionState,
    tokens: &mut Vec<Token>,
    trace: &dyn LexTrace,
) -> StateChange {
    let substring = expression.partial.trim_end();
    if !substring.is_empty() {
        let trimmed_bytes = expression.partial.len() - substring.len();
        let token = Token {
            kind: TokenKind::Expression,
            start: expression.partial_start.unwrap_or(expression.opened_at),
            end: expression.partial_end - trimmed_bytes,
            substring: substring.to_string(),
        };
        trace.on_token(&token);
        tokens.push(token);
    }
    // An all-whitespace expression emits nothing; the parser reports the
    // missing expression against the statement that needed it.
    StateChange::Pop
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn kinds(tokens: &[Token]) -> Vec<TokenKind> {
        tokens.iter().map(|token| token.kind).collect()
    }

    #[test]
    fn lex_plain_text_is_a_single_token() {
        let tokens = lex("CPU usage is high").expect("lex");
        assert_eq!(kinds(&tokens), vec![TokenKind::Text]);
        assert_eq!(tokens[0].substring, "CPU usage is high");
        assert_eq!((tokens[0].start, tokens[0].end), (0, 17));
    }

    #[test]
    fn lex_interpolation_produces_open_expression_close() {
        let tokens = lex("{{ cpu.usage }}").expect("lex");
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::OpenInterpolation,
                TokenKind::Expression,
                TokenKind::CloseInterpolation,
            ]
        );
        assert_eq!(tokens[1].substring, "cpu.usage");
        assert_eq!((tokens[1].start, tokens[1].end), (3, 12));
    }

    #[test]
    fn lex_if_else_chain_token_sequence() {
        let tokens = lex("@if (a) {x} @else if (b) {y} @else {z}").expect("lex");
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::IfStatement,
                TokenKind::Expression,
                TokenKind::OpenStatementBlock,
                TokenKind::Text,
                TokenKind::CloseStatementBlock,
                TokenKind::Text,
                TokenKind::ElseIfStatement,
                TokenKind::Expression,
                TokenKind::OpenStatementBlock,
                TokenKind::Text,
                TokenKind::CloseStatementBlock,
                TokenKind::Text,
                TokenKind::ElseStatement,
                TokenKind::OpenStatementBlock,
                TokenKind::Text,
                TokenKind::CloseStatementBlock,
            ]
        );
        assert_eq!(tokens[6].substring, "@else if");
    }

    #[test]
    fn lex_nested_statement_blocks() {
        let tokens = lex("@if (a) { @for (x of xs) { {{ x }} } }").expect("lex");
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::IfStatement,
                TokenKind::Expression,
                TokenKind::OpenStatementBlock,
                TokenKind::Text,
                TokenKind::ForStatement,
                TokenKind::Expression,
                TokenKind::OpenStatementBlock,
                TokenKind::Text,
                TokenKind::OpenInterpolation,
                TokenKind::Expression,
                TokenKind::CloseInterpolation,
                TokenKind::Text,
                TokenKind::CloseStatementBlock,
                TokenKind::Text,
                TokenKind::CloseStatementBlock,
            ]
        );
    }

    #[test]
    fn lex_loop_header_keeps_interior_whitespace() {
        let tokens = lex("@for (item of [1,2,3]) {}").expect("lex");
        assert_eq!(tokens[1].kind, TokenKind::Expression);
        assert_eq!(tokens[1].substring, "item of [1,2,3]");
    }

    #[test]
    fn lex_nested_parens_keep_the_full_expression() {
        let tokens = lex("@if (items.contains(x)) {y}").expect("lex");
        assert_eq!(tokens[1].substring, "items.contains(x)");
    }

    #[test]
    fn lex_quote_inside_string_does_not_close_expression() {
        let tokens = lex(r#"{{ items.find(x => x.name === "it's here") }}"#).expect("lex");
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::OpenInterpolation,
                TokenKind::Expression,
                TokenKind::CloseInterpolation,
            ]
        );
        assert_eq!(
            tokens[1].substring,
            r#"items.find(x => x.name === "it's here")"#
        );
    }

    #[test]
    fn lex_close_braces_inside_string_do_not_close_interpolation() {
        let tokens = lex(r#"{{ sep === "}}" }}"#).expect("lex");
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[1].substring, r#"sep === "}}""#);
    }

    #[test]
    fn lex_unterminated_interpolation_reports_open_position() {
        let err = lex("before {{ incomplete").expect_err("must fail");
        assert_eq!(err.message, "Missing closing }}");
        assert_eq!(err.position, 7);
        assert_eq!(
            err.stack,
            vec!["Default", "InInterpolation", "InExpression"]
        );
    }

    #[test]
    fn lex_statement_without_block_reports_missing_brace() {
        let err = lex("@if (a) no block").expect_err("must fail");
        assert_eq!(err.message, "Missing closing {");
    }

    #[test]
    fn lex_stray_at_sign_fails_instead_of_degrading_to_text() {
        let err = lex("mail me @home").expect_err("must fail");
        assert_eq!(err.message, "No valid tokens found");
        assert_eq!(err.position, 8);
    }

    #[test]
    fn lex_bare_close_brace_at_top_level_fails() {
        let err = lex("oops }").expect_err("must fail");
        assert_eq!(err.message, "No valid tokens found");
        assert_eq!(err.position, 5);
    }

    #[test]
    fn lex_empty_statement_args_emit_no_expression_token() {
        let tokens = lex("@if () {x}").expect("lex");
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::IfStatement,
                TokenKind::OpenStatementBlock,
                TokenKind::Text,
                TokenKind::CloseStatementBlock,
            ]
        );
    }

    #[test]
    fn lex_text_tokens_are_verbatim_source_slices_with_monotonic_offsets() {
        let src = "a { b @if (x) {inner} tail {{ v }} end";
        let tokens = lex(src).expect("lex");
        let mut last_start = 0;
        for token in &tokens {
            assert!(token.start >= last_start, "offsets must not go backwards");
            assert!(!token.substring.is_empty(), "tokens are never empty");
            if token.kind != TokenKind::Expression {
                assert_eq!(token.substring, &src[token.start..token.end]);
            }
            last_start = token.start;
        }
    }

    #[test]
    fn lex_trace_sees_state_transitions() {
        #[derive(Default)]
        struct Recorder {
            events: RefCell<Vec<String>>,
        }
        impl LexTrace for Recorder {
            fn on_push(&self, state: &'static str, depth: usize) {
                self.events.borrow_mut().push(format!("push {state} {depth}"));
            }
            fn on_pop(&self, state: &'static str, depth: usize) {
                self.events.borrow_mut().push(format!("pop {state} {depth}"));
            }
        }

        let recorder = Recorder::default();
        lex_with_trace("{{ a }}", &recorder).expect("lex");
        let events = recorder.events.borrow();
        assert_eq!(
            *events,
            vec![
                "push InInterpolation 2",
                "push InExpression 3",
                "pop InExpression 2",
                "pop InInterpolation 1",
            ]
        );
    }
}
