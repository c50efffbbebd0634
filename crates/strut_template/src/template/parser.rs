use super::ast::{Body, ConditionalBranch, SwitchCase, TemplateNode};
use crate::lexer::{Token, TokenKind};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} at token {token_index}")]
pub struct ParseError {
    pub message: String,
    pub token_index: usize,
}

fn parse_error(message: impl Into<String>, token_index: usize) -> ParseError {
    ParseError {
        message: message.into(),
        token_index,
    }
}

#[derive(Debug)]
enum OpenConstruct {
    Conditional {
        open_token: usize,
        branches: Vec<ConditionalBranch>,
        else_body: Option<Body>,
        stage: ConditionalStage,
    },
    Loop {
        open_token: usize,
        expression: Option<String>,
        stage: HeaderStage,
    },
    Switch {
        open_token: usize,
        expression: Option<String>,
        cases: Vec<SwitchCase>,
        default_body: Option<Body>,
        stage: SwitchStage,
    },
}

impl OpenConstruct {
    fn open_token(&self) -> usize {
        match self {
            OpenConstruct::Conditional { open_token, .. }
            | OpenConstruct::Loop { open_token, .. }
            | OpenConstruct::Switch { open_token, .. } => *open_token,
        }
    }
}

#[derive(Debug)]
enum HeaderStage {
    NeedExpression,
    NeedOpenBrace,
    InBody,
}

#[derive(Debug)]
enum ConditionalStage {
    /// After `@if` or `@else if`, waiting for the branch expression.
    NeedExpression,
    /// Expression (or `@else`) seen, waiting for `{`.
    NeedOpenBrace {
        expression: Option<String>,
        is_else: bool,
    },
    /// Branch body is on the body stack.
    InBody {
        expression: Option<String>,
        is_else: bool,
    },
    /// A branch just closed; the chain stays open for `@else if` / `@else`
    /// until some other token arrives.
    AfterBranch {
        pending_text: Option<String>,
    },
}

#[derive(Debug)]
enum SwitchStage {
    NeedExpression,
    NeedOpenBrace,
    /// Inside the switch's own `{ … }`, between case blocks.
    InCases,
    CaseNeedExpression,
    CaseNeedOpenBrace {
        expression: Option<String>,
        is_default: bool,
    },
    CaseInBody {
        expression: Option<String>,
        is_default: bool,
    },
}

/// What a handled token asks the main loop to do once all borrows are back.
enum Outcome {
    Continue,
    SealConditional,
    SealSwitch,
    SealLoop(TemplateNode),
    /// Re-dispatch the current token after sealing the open conditional.
    SealConditionalAndRetry,
}

/// Builds the node tree from a lexed token sequence. Walks the tokens
/// linearly with an explicit stack of open control constructs, so nesting
/// depth is bounded by memory rather than the call stack. Fails fast on the
/// first grammar violation.
pub fn parse_tokens(tokens: &[Token]) -> Result<Body, ParseError> {
    let mut bodies: Vec<Body> = vec![Vec::new()];
    let mut open: Vec<OpenConstruct> = Vec::new();
    let mut index = 0usize;

    while index < tokens.len() {
        let token = &tokens[index];

        let outcome = if in_chain_decision(&open) {
            chain_decision(&mut open, token)
        } else if in_switch_cases(&open) {
            switch_cases_step(&mut open, token, index)?
        } else {
            dispatch(&mut open, &mut bodies, tokens, &mut index, token)?
        };

        match outcome {
            Outcome::Continue => index += 1,
            Outcome::SealConditional => {
                seal_conditional(&mut open, &mut bodies);
                index += 1;
            }
            Outcome::SealSwitch => {
                seal_switch(&mut open, &mut bodies);
                index += 1;
            }
            Outcome::SealLoop(node) => {
                open.pop();
                push_node(&mut bodies, node);
                index += 1;
            }
            Outcome::SealConditionalAndRetry => {
                seal_conditional(&mut open, &mut bodies);
            }
        }
    }

    // A conditional chain may legitimately end at end of input.
    if in_chain_decision(&open) {
        seal_conditional(&mut open, &mut bodies);
    }

    if let Some(construct) = open.last() {
        return Err(parse_error(
            "Unexpected end of template inside statement",
            construct.open_token(),
        ));
    }

    Ok(bodies.pop().unwrap_or_default())
}

fn in_chain_decision(open: &[OpenConstruct]) -> bool {
    matches!(
        open.last(),
        Some(OpenConstruct::Conditional {
            stage: ConditionalStage::AfterBranch { .. },
            ..
        })
    )
}

fn in_switch_cases(open: &[OpenConstruct]) -> bool {
    matches!(
        open.last(),
        Some(OpenConstruct::Switch {
            stage: SwitchStage::InCases,
            ..
        })
    )
}

/// A conditional whose branch just closed decides here whether the chain
/// continues. Whitespace between `}` and `@else` is layout glue: dropped when
/// the chain continues, emitted as text when it ends.
fn chain_decision(open: &mut [OpenConstruct], token: &Token) -> Outcome {
    let Some(OpenConstruct::Conditional { stage, .. }) = open.last_mut() else {
        return Outcome::SealConditionalAndRetry;
    };
    match token.kind {
        TokenKind::Text if is_whitespace(&token.substring) => {
            if let ConditionalStage::AfterBranch { pending_text } = stage {
                match pending_text {
                    Some(text) => text.push_str(&token.substring),
                    None => *pending_text = Some(token.substring.clone()),
                }
            }
            Outcome::Continue
        }
        TokenKind::ElseIfStatement => {
            *stage = ConditionalStage::NeedExpression;
            Outcome::Continue
        }
        TokenKind::ElseStatement => {
            *stage = ConditionalStage::NeedOpenBrace {
                expression: None,
                is_else: true,
            };
            Outcome::Continue
        }
        _ => Outcome::SealConditionalAndRetry,
    }
}

/// Between the cases of a switch only `@case`, `@default`, layout whitespace,
/// and the closing `}` are meaningful.
fn switch_cases_step(
    open: &mut [OpenConstruct],
    token: &Token,
    index: usize,
) -> Result<Outcome, ParseError> {
    let Some(OpenConstruct::Switch {
        default_body,
        stage,
        ..
    }) = open.last_mut()
    else {
        return Err(parse_error("Expected an open @switch", index));
    };
    match token.kind {
        TokenKind::Text if is_whitespace(&token.substring) => Ok(Outcome::Continue),
        TokenKind::Text => Err(parse_error(
            "Text is not allowed between @switch cases",
            index,
        )),
        TokenKind::SwitchCaseStatement => {
            if default_body.is_some() {
                return Err(parse_error("@case after @default", index));
            }
            *stage = SwitchStage::CaseNeedExpression;
            Ok(Outcome::Continue)
        }
        TokenKind::SwitchDefaultStatement => {
            if default_body.is_some() {
                return Err(parse_error("Duplicate @default", index));
            }
            *stage = SwitchStage::CaseNeedOpenBrace {
                expression: None,
                is_default: true,
            };
            Ok(Outcome::Continue)
        }
        TokenKind::CloseStatementBlock => Ok(Outcome::SealSwitch),
        _ => Err(parse_error(
            "Expected @case, @default, or } inside @switch",
            index,
        )),
    }
}

fn dispatch(
    open: &mut Vec<OpenConstruct>,
    bodies: &mut Vec<Body>,
    tokens: &[Token],
    index: &mut usize,
    token: &Token,
) -> Result<Outcome, ParseError> {
    match token.kind {
        TokenKind::Text => {
            push_node(bodies, TemplateNode::Text(token.substring.clone()));
            Ok(Outcome::Continue)
        }
        TokenKind::OpenInterpolation => {
            let expression = match tokens.get(*index + 1) {
                Some(next) if next.kind == TokenKind::Expression => next.substring.clone(),
                Some(next) if next.kind == TokenKind::CloseInterpolation => {
                    return Err(parse_error(
                        "Interpolation is missing its expression",
                        *index,
                    ));
                }
                _ => return Err(parse_error("Unterminated interpolation", *index)),
            };
            match tokens.get(*index + 2) {
                Some(next) if next.kind == TokenKind::CloseInterpolation => {}
                _ => return Err(parse_error("Unterminated interpolation", *index)),
            }
            push_node(bodies, TemplateNode::Interpolation { expression });
            *index += 2;
            Ok(Outcome::Continue)
        }
        TokenKind::IfStatement => {
            open.push(OpenConstruct::Conditional {
                open_token: *index,
                branches: Vec::new(),
                else_body: None,
                stage: ConditionalStage::NeedExpression,
            });
            Ok(Outcome::Continue)
        }
        TokenKind::ElseIfStatement | TokenKind::ElseStatement => {
            Err(parse_error("@else without a matching @if", *index))
        }
        TokenKind::ForStatement => {
            open.push(OpenConstruct::Loop {
                open_token: *index,
                expression: None,
                stage: HeaderStage::NeedExpression,
            });
            Ok(Outcome::Continue)
        }
        TokenKind::SwitchStatement => {
            open.push(OpenConstruct::Switch {
                open_token: *index,
                expression: None,
                cases: Vec::new(),
                default_body: None,
                stage: SwitchStage::NeedExpression,
            });
            Ok(Outcome::Continue)
        }
        TokenKind::SwitchCaseStatement => Err(parse_error("@case outside of @switch", *index)),
        TokenKind::SwitchDefaultStatement => {
            Err(parse_error("@default outside of @switch", *index))
        }
        TokenKind::Expression => accept_expression(open, token, *index),
        TokenKind::OpenStatementBlock => accept_open_brace(open, bodies, *index),
        TokenKind::CloseStatementBlock => accept_close_brace(open, bodies, *index),
        TokenKind::CloseInterpolation => Err(parse_error("Unexpected }}", *index)),
    }
}

fn is_whitespace(text: &str) -> bool {
    text.chars().all(char::is_whitespace)
}

fn push_node(bodies: &mut [Body], node: TemplateNode) {
    if let Some(body) = bodies.last_mut() {
        body.push(node);
    }
}

fn accept_expression(
    open: &mut [OpenConstruct],
    token: &Token,
    index: usize,
) -> Result<Outcome, ParseError> {
    match open.last_mut() {
        Some(OpenConstruct::Conditional { stage, .. }) => match stage {
            ConditionalStage::NeedExpression => {
                *stage = ConditionalStage::NeedOpenBrace {
                    expression: Some(token.substring.clone()),
                    is_else: false,
                };
                Ok(Outcome::Continue)
            }
            ConditionalStage::NeedOpenBrace { is_else: true, .. } => {
                Err(parse_error("@else takes no expression", index))
            }
            _ => Err(parse_error("Unexpected expression", index)),
        },
        Some(OpenConstruct::Loop {
            expression, stage, ..
        }) => match stage {
            HeaderStage::NeedExpression => {
                *expression = Some(token.substring.clone());
                *stage = HeaderStage::NeedOpenBrace;
                Ok(Outcome::Continue)
            }
            _ => Err(parse_error("Unexpected expression", index)),
        },
        Some(OpenConstruct::Switch {
            expression, stage, ..
        }) => match stage {
            SwitchStage::NeedExpression => {
                *expression = Some(token.substring.clone());
                *stage = SwitchStage::NeedOpenBrace;
                Ok(Outcome::Continue)
            }
            SwitchStage::CaseNeedExpression => {
                *stage = SwitchStage::CaseNeedOpenBrace {
                    expression: Some(token.substring.clone()),
                    is_default: false,
                };
                Ok(Outcome::Continue)
            }
            _ => Err(parse_error("Unexpected expression", index)),
        },
        None => Err(parse_error("Unexpected expression", index)),
    }
}

fn accept_open_brace(
    open: &mut [OpenConstruct],
    bodies: &mut Vec<Body>,
    index: usize,
) -> Result<Outcome, ParseError> {
    match open.last_mut() {
        Some(OpenConstruct::Conditional { stage, .. }) => match stage {
            ConditionalStage::NeedOpenBrace { expression, is_else } => {
                *stage = ConditionalStage::InBody {
                    expression: expression.take(),
                    is_else: *is_else,
                };
                bodies.push(Vec::new());
                Ok(Outcome::Continue)
            }
            ConditionalStage::NeedExpression => {
                Err(parse_error("@if is missing its condition", index))
            }
            _ => Err(parse_error("Unexpected {", index)),
        },
        Some(OpenConstruct::Loop { stage, .. }) => match stage {
            HeaderStage::NeedOpenBrace => {
                *stage = HeaderStage::InBody;
                bodies.push(Vec::new());
                Ok(Outcome::Continue)
            }
            HeaderStage::NeedExpression => {
                Err(parse_error("@for is missing its loop expression", index))
            }
            _ => Err(parse_error("Unexpected {", index)),
        },
        Some(OpenConstruct::Switch { stage, .. }) => match stage {
            SwitchStage::NeedOpenBrace => {
                *stage = SwitchStage::InCases;
                Ok(Outcome::Continue)
            }
            SwitchStage::CaseNeedOpenBrace {
                expression,
                is_default,
            } => {
                *stage = SwitchStage::CaseInBody {
                    expression: expression.take(),
                    is_default: *is_default,
                };
                bodies.push(Vec::new());
                Ok(Outcome::Continue)
            }
            SwitchStage::NeedExpression => {
                Err(parse_error("@switch is missing its expression", index))
            }
            SwitchStage::CaseNeedExpression => {
                Err(parse_error("@case is missing its expression", index))
            }
            _ => Err(parse_error("Unexpected {", index)),
        },
        None => Err(parse_error("Unexpected {", index)),
    }
}

fn accept_close_brace(
    open: &mut [OpenConstruct],
    bodies: &mut Vec<Body>,
    index: usize,
) -> Result<Outcome, ParseError> {
    match open.last_mut() {
        Some(OpenConstruct::Conditional {
            branches,
            else_body,
            stage,
            ..
        }) => match stage {
            ConditionalStage::InBody { expression, is_else } => {
                let body = bodies.pop().unwrap_or_default();
                if *is_else {
                    *else_body = Some(body);
                    Ok(Outcome::SealConditional)
                } else {
                    branches.push(ConditionalBranch {
                        expression: expression.take().unwrap_or_default(),
                        body,
                    });
                    *stage = ConditionalStage::AfterBranch { pending_text: None };
                    Ok(Outcome::Continue)
                }
            }
            _ => Err(parse_error("Unexpected }", index)),
        },
        Some(OpenConstruct::Loop {
            expression, stage, ..
        }) => match stage {
            HeaderStage::InBody => {
                let body = bodies.pop().unwrap_or_default();
                Ok(Outcome::SealLoop(TemplateNode::Loop {
                    expression: expression.take().unwrap_or_default(),
                    body,
                }))
            }
            _ => Err(parse_error("Unexpected }", index)),
        },
        Some(OpenConstruct::Switch {
            cases,
            default_body,
            stage,
            ..
        }) => match stage {
            SwitchStage::CaseInBody {
                expression,
                is_default,
            } => {
                let body = bodies.pop().unwrap_or_default();
                if *is_default {
                    *default_body = Some(body);
                } else {
                    cases.push(SwitchCase {
                        expression: expression.take().unwrap_or_default(),
                        body,
                    });
                }
                *stage = SwitchStage::InCases;
                Ok(Outcome::Continue)
            }
            // The switch's own `}` is handled by the between-cases step.
            _ => Err(parse_error("Unexpected }", index)),
        },
        None => Err(parse_error("Unmatched closing block", index)),
    }
}

/// Appends the finished conditional (plus any trailing layout whitespace that
/// turned out not to precede an `@else`) to the enclosing body.
fn seal_conditional(open: &mut Vec<OpenConstruct>, bodies: &mut Vec<Body>) {
    if !matches!(open.last(), Some(OpenConstruct::Conditional { .. })) {
        return;
    }
    if let Some(OpenConstruct::Conditional {
        branches,
        else_body,
        stage,
        ..
    }) = open.pop()
    {
        let pending = match stage {
            ConditionalStage::AfterBranch { pending_text } => pending_text,
            _ => None,
        };
        push_node(
            bodies,
            TemplateNode::Conditional {
                branches,
                else_body,
            },
        );
        if let Some(text) = pending {
            push_node(bodies, TemplateNode::Text(text));
        }
    }
}

fn seal_switch(open: &mut Vec<OpenConstruct>, bodies: &mut Vec<Body>) {
    if !matches!(open.last(), Some(OpenConstruct::Switch { .. })) {
        return;
    }
    if let Some(OpenConstruct::Switch {
        expression,
        cases,
        default_body,
        ..
    }) = open.pop()
    {
        push_node(
            bodies,
            TemplateNode::Switch {
                expression: expression.unwrap_or_default(),
                cases,
                default_body,
            },
        );
    }
}
