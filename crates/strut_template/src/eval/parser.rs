/// Recursive-descent parser for the expression subset that drives statement
/// predicates, loop iterables, and interpolations. Call and arrow syntax
/// parse (so quoted strings inside them lex correctly at the template level)
/// but evaluating them is an error.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    Array(Vec<Expr>),
    Ident(String),
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(Box<Expr>, BinaryOp, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    Call(Box<Expr>, Vec<Expr>),
    Arrow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Not,
    Negate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, PartialEq)]
enum ExprToken {
    Ident(String),
    Number(f64),
    Str(String),
    Symbol(&'static str),
}

const SYMBOLS_3: [&str; 2] = ["===", "!=="];
const SYMBOLS_2: [&str; 7] = ["||", "&&", "==", "!=", "<=", ">=", "=>"];
const SYMBOLS_1: [&str; 16] = [
    "<", ">", "+", "-", "*", "/", "%", "!", "?", ":", ".", ",", "(", ")", "[", "]",
];

/// Parser recursion is bounded so a hostile expression cannot blow the call
/// stack.
const MAX_DEPTH: usize = 200;

pub(crate) fn parse_expression(text: &str) -> Result<Expr, String> {
    let tokens = tokenize(text)?;
    let mut parser = ExprParser { tokens, pos: 0 };
    let expr = parser.parse_expr(0)?;
    if parser.pos < parser.tokens.len() {
        return Err("Unexpected trailing input in expression".to_string());
    }
    Ok(expr)
}

/// Splits a `@for` header of the form `name of <expr>` into the loop
/// variable and the iterable expression.
pub(crate) fn parse_loop_header(text: &str) -> Result<(String, Expr), String> {
    let tokens = tokenize(text)?;
    let mut parser = ExprParser { tokens, pos: 0 };
    let Some(ExprToken::Ident(name)) = parser.peek().cloned() else {
        return Err("Expected `item of <expression>` in @for".to_string());
    };
    parser.pos += 1;
    if !matches!(parser.peek(), Some(ExprToken::Ident(word)) if word == "of") {
        return Err("Expected `of` after the loop variable in @for".to_string());
    }
    parser.pos += 1;
    let iterable = parser.parse_expr(0)?;
    if parser.pos < parser.tokens.len() {
        return Err("Unexpected trailing input in @for".to_string());
    }
    Ok((name, iterable))
}

fn tokenize(text: &str) -> Result<Vec<ExprToken>, String> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut index = 0usize;

    while index < chars.len() {
        let ch = chars[index];

        if ch.is_whitespace() {
            index += 1;
            continue;
        }

        if is_ident_start(ch) {
            let start = index;
            index += 1;
            while index < chars.len() && is_ident_continue(chars[index]) {
                index += 1;
            }
            let word: String = chars[start..index].iter().collect();
            tokens.push(ExprToken::Ident(word));
            continue;
        }

        if ch.is_ascii_digit() {
            let start = index;
            index += 1;
            while index < chars.len() && chars[index].is_ascii_digit() {
                index += 1;
            }
            if index + 1 < chars.len() && chars[index] == '.' && chars[index + 1].is_ascii_digit() {
                index += 1;
                while index < chars.len() && chars[index].is_ascii_digit() {
                    index += 1;
                }
            }
            let literal: String = chars[start..index].iter().collect();
            let number = literal
                .parse::<f64>()
                .map_err(|_| format!("Invalid number literal `{literal}`"))?;
            tokens.push(ExprToken::Number(number));
            continue;
        }

        if ch == '\'' || ch == '"' || ch == '`' {
            let quote = ch;
            index += 1;
            let mut literal = String::new();
            let mut closed = false;
            while index < chars.len() {
                let current = chars[index];
                if current == quote {
                    index += 1;
                    closed = true;
                    break;
                }
                if current == '\\' && index + 1 < chars.len() {
                    literal.push(decode_escape(chars[index + 1]));
                    index += 2;
                    continue;
                }
                literal.push(current);
                index += 1;
            }
            if !closed {
                return Err("Unterminated string literal in expression".to_string());
            }
            tokens.push(ExprToken::Str(literal));
            continue;
        }

        if let Some(symbol) = match_symbol(&chars, index) {
            tokens.push(ExprToken::Symbol(symbol));
            index += symbol.len();
            continue;
        }

        return Err(format!("Unexpected character `{ch}` in expression"));
    }

    Ok(tokens)
}

fn is_ident_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_' || ch == '$'
}

fn is_ident_continue(ch: char) -> bool {
    is_ident_start(ch) || ch.is_ascii_digit()
}

fn decode_escape(ch: char) -> char {
    match ch {
        'n' => '\n',
        'r' => '\r',
        't' => '\t',
        _ => ch,
    }
}

fn match_symbol(chars: &[char], index: usize) -> Option<&'static str> {
    for symbol in SYMBOLS_3 {
        if matches_at(chars, index, symbol) {
            return Some(symbol);
        }
    }
    for symbol in SYMBOLS_2 {
        if matches_at(chars, index, symbol) {
            return Some(symbol);
        }
    }
    for symbol in SYMBOLS_1 {
        if matches_at(chars, index, symbol) {
            return Some(symbol);
        }
    }
    None
}

fn matches_at(chars: &[char], index: usize, symbol: &str) -> bool {
    symbol
        .chars()
        .enumerate()
        .all(|(offset, expected)| chars.get(index + offset) == Some(&expected))
}

struct ExprParser {
    tokens: Vec<ExprToken>,
    pos: usize,
}

impl ExprParser {
    fn peek(&self) -> Option<&ExprToken> {
        self.tokens.get(self.pos)
    }

    fn eat_symbol(&mut self, symbol: &str) -> bool {
        if matches!(self.peek(), Some(ExprToken::Symbol(found)) if *found == symbol) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_symbol(&mut self, symbol: &str) -> Result<(), String> {
        if self.eat_symbol(symbol) {
            Ok(())
        } else {
            Err(format!("Expected `{symbol}` in expression"))
        }
    }

    fn parse_expr(&mut self, depth: usize) -> Result<Expr, String> {
        if depth > MAX_DEPTH {
            return Err("Expression is nested too deeply".to_string());
        }
        let condition = self.parse_or(depth + 1)?;
        if self.eat_symbol("?") {
            let when_true = self.parse_expr(depth + 1)?;
            self.expect_symbol(":")?;
            let when_false = self.parse_expr(depth + 1)?;
            return Ok(Expr::Ternary(
                Box::new(condition),
                Box::new(when_true),
                Box::new(when_false),
            ));
        }
        Ok(condition)
    }

    fn parse_or(&mut self, depth: usize) -> Result<Expr, String> {
        let mut lhs = self.parse_and(depth)?;
        while self.eat_symbol("||") {
            let rhs = self.parse_and(depth)?;
            lhs = Expr::Binary(Box::new(lhs), BinaryOp::Or, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self, depth: usize) -> Result<Expr, String> {
        let mut lhs = self.parse_equality(depth)?;
        while self.eat_symbol("&&") {
            let rhs = self.parse_equality(depth)?;
            lhs = Expr::Binary(Box::new(lhs), BinaryOp::And, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self, depth: usize) -> Result<Expr, String> {
        let mut lhs = self.parse_relational(depth)?;
        loop {
            let op = if self.eat_symbol("==") || self.eat_symbol("===") {
                BinaryOp::Eq
            } else if self.eat_symbol("!=") || self.eat_symbol("!==") {
                BinaryOp::Ne
            } else {
                break;
            };
            let rhs = self.parse_relational(depth)?;
            lhs = Expr::Binary(Box::new(lhs), op, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_relational(&mut self, depth: usize) -> Result<Expr, String> {
        let mut lhs = self.parse_additive(depth)?;
        loop {
            let op = if self.eat_symbol("<=") {
                BinaryOp::Le
            } else if self.eat_symbol(">=") {
                BinaryOp::Ge
            } else if self.eat_symbol("<") {
                BinaryOp::Lt
            } else if self.eat_symbol(">") {
                BinaryOp::Gt
            } else {
                break;
            };
            let rhs = self.parse_additive(depth)?;
            lhs = Expr::Binary(Box::new(lhs), op, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self, depth: usize) -> Result<Expr, String> {
        let mut lhs = self.parse_multiplicative(depth)?;
        loop {
            let op = if self.eat_symbol("+") {
                BinaryOp::Add
            } else if self.eat_symbol("-") {
                BinaryOp::Sub
            } else {
                break;
            };
            let rhs = self.parse_multiplicative(depth)?;
            lhs = Expr::Binary(Box::new(lhs), op, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self, depth: usize) -> Result<Expr, String> {
        let mut lhs = self.parse_unary(depth)?;
        loop {
            let op = if self.eat_symbol("*") {
                BinaryOp::Mul
            } else if self.eat_symbol("/") {
                BinaryOp::Div
            } else if self.eat_symbol("%") {
                BinaryOp::Mod
            } else {
                break;
            };
            let rhs = self.parse_unary(depth)?;
            lhs = Expr::Binary(Box::new(lhs), op, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self, depth: usize) -> Result<Expr, String> {
        if depth > MAX_DEPTH {
            return Err("Expression is nested too deeply".to_string());
        }
        if self.eat_symbol("!") {
            let operand = self.parse_unary(depth + 1)?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(operand)));
        }
        if self.eat_symbol("-") {
            let operand = self.parse_unary(depth + 1)?;
            return Ok(Expr::Unary(UnaryOp::Negate, Box::new(operand)));
        }
        self.parse_postfix(depth)
    }

    fn parse_postfix(&mut self, depth: usize) -> Result<Expr, String> {
        let mut expr = self.parse_primary(depth)?;
        loop {
            if self.eat_symbol(".") {
                let Some(ExprToken::Ident(field)) = self.peek().cloned() else {
                    return Err("Expected a field name after `.`".to_string());
                };
                self.pos += 1;
                expr = Expr::Member(Box::new(expr), field);
            } else if self.eat_symbol("[") {
                let key = self.parse_expr(depth + 1)?;
                self.expect_symbol("]")?;
                expr = Expr::Index(Box::new(expr), Box::new(key));
            } else if self.eat_symbol("(") {
                let mut args = Vec::new();
                if !self.eat_symbol(")") {
                    loop {
                        args.push(self.parse_expr(depth + 1)?);
                        if self.eat_symbol(",") {
                            continue;
                        }
                        self.expect_symbol(")")?;
                        break;
                    }
                }
                expr = Expr::Call(Box::new(expr), args);
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self, depth: usize) -> Result<Expr, String> {
        if depth > MAX_DEPTH {
            return Err("Expression is nested too deeply".to_string());
        }
        match self.peek().cloned() {
            Some(ExprToken::Number(number)) => {
                self.pos += 1;
                Ok(Expr::Number(number))
            }
            Some(ExprToken::Str(literal)) => {
                self.pos += 1;
                Ok(Expr::Str(literal))
            }
            Some(ExprToken::Ident(word)) => {
                self.pos += 1;
                match word.as_str() {
                    "true" => Ok(Expr::Bool(true)),
                    "false" => Ok(Expr::Bool(false)),
                    "null" => Ok(Expr::Null),
                    _ => {
                        // `x => body` is accepted syntactically so statement
                        // arguments like `items.find(x => …)` parse; the
                        // evaluator rejects it.
                        if self.eat_symbol("=>") {
                            self.parse_expr(depth + 1)?;
                            return Ok(Expr::Arrow);
                        }
                        Ok(Expr::Ident(word))
                    }
                }
            }
            Some(ExprToken::Symbol("[")) => {
                self.pos += 1;
                let mut items = Vec::new();
                if !self.eat_symbol("]") {
                    loop {
                        items.push(self.parse_expr(depth + 1)?);
                        if self.eat_symbol(",") {
                            continue;
                        }
                        self.expect_symbol("]")?;
                        break;
                    }
                }
                Ok(Expr::Array(items))
            }
            Some(ExprToken::Symbol("(")) => {
                self.pos += 1;
                let inner = self.parse_expr(depth + 1)?;
                self.expect_symbol(")")?;
                Ok(inner)
            }
            Some(ExprToken::Symbol(symbol)) => {
                Err(format!("Unexpected `{symbol}` in expression"))
            }
            None => Err("Empty expression".to_string()),
        }
    }
}
