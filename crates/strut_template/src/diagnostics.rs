use serde::Serialize;

use crate::TemplateError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

/// Maps a byte offset into a 1-based line/column position. Offsets past the
/// end of the source resolve to the position just after the final character.
pub fn offset_to_position(source: &str, offset: usize) -> Position {
    let mut line = 1usize;
    let mut column = 1usize;
    for (index, ch) in source.char_indices() {
        if index >= offset {
            break;
        }
        if ch == '\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }
    Position { line, column }
}

/// Resolves a token's byte range into line/column positions against the
/// template it was lexed from.
pub fn token_span(source: &str, token: &crate::lexer::Token) -> Span {
    Span {
        start: offset_to_position(source, token.start),
        end: offset_to_position(source, token.end),
    }
}

/// Formats an engine error as the single line the host surfaces to the user.
/// Lex and parse errors resolve to a line/column against the template source;
/// eval errors point at the offending expression text instead.
pub fn render_error(source: &str, error: &TemplateError) -> String {
    match error {
        TemplateError::Lex(err) => {
            let pos = offset_to_position(source, err.position);
            format!("error template:{}:{} {}", pos.line, pos.column, err.message)
        }
        TemplateError::Parse(err) => {
            // Token indexes only mean something against the token stream, so
            // re-lex here; the error path is never hot.
            let offset = crate::lexer::lex(source)
                .ok()
                .and_then(|tokens| tokens.get(err.token_index).map(|token| token.start));
            match offset {
                Some(offset) => {
                    let pos = offset_to_position(source, offset);
                    format!("error template:{}:{} {}", pos.line, pos.column, err.message)
                }
                None => format!("error template {}", err.message),
            }
        }
        TemplateError::Eval(err) => {
            format!("error in expression `{}`: {}", err.expression, err.message)
        }
    }
}
