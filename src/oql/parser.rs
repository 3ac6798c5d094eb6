//! Recursive-descent parser for the expression language used in selections,
//! predicates and scripts.

use std::rc::Rc;

use super::ast::{BinaryOp, Expr, FunctionDef, Stmt, UnaryOp};
use super::lexer::{tokenize, Token};
use super::value::{EvalError, EvalResult};

pub(crate) fn parse_expression(source: &str) -> EvalResult<Expr> {
    let mut parser = Parser::new(source)?;
    let expr = parser.expression()?;
    parser.expect_eof()?;
    Ok(expr)
}

pub(crate) fn parse_script(source: &str) -> EvalResult<Vec<Stmt>> {
    let mut parser = Parser::new(source)?;
    let mut statements = vec![];
    while parser.peek() != &Token::Eof {
        statements.push(parser.statement()?);
    }
    Ok(statements)
}

/// Deepest nesting of parentheses, literals, unary operators and blocks.
const MAX_NESTING: usize = 100;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn new(source: &str) -> EvalResult<Parser> {
        Ok(Parser {
            tokens: tokenize(source)?,
            pos: 0,
            depth: 0,
        })
    }

    fn nested<T>(&mut self, parse: impl FnOnce(&mut Parser) -> EvalResult<T>) -> EvalResult<T> {
        if self.depth >= MAX_NESTING {
            return Err(EvalError::new("expression nested too deeply"));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    /// Accounts for one more level of a left-deep operator chain. The caller
    /// gives the levels back once the chain ends.
    fn deepen(&mut self, chain: &mut usize) -> EvalResult<()> {
        if self.depth >= MAX_NESTING {
            return Err(EvalError::new("expression nested too deeply"));
        }
        self.depth += 1;
        *chain += 1;
        Ok(())
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, ahead: usize) -> &Token {
        &self.tokens[(self.pos + ahead).min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn is_punct(&self, punct: &str) -> bool {
        matches!(self.peek(), Token::Punct(p) if *p == punct)
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Token::Ident(name) if name == keyword)
    }

    fn eat_punct(&mut self, punct: &str) -> bool {
        if self.is_punct(punct) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, punct: &str) -> EvalResult<()> {
        if self.eat_punct(punct) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{}'", punct)))
        }
    }

    fn expect_ident(&mut self) -> EvalResult<String> {
        match self.advance() {
            Token::Ident(name) => Ok(name),
            other => Err(EvalError::new(format!(
                "expected identifier, found {}",
                describe(&other)
            ))),
        }
    }

    fn expect_eof(&mut self) -> EvalResult<()> {
        if self.peek() == &Token::Eof {
            Ok(())
        } else {
            Err(self.unexpected("end of expression"))
        }
    }

    fn unexpected(&self, expected: &str) -> EvalError {
        EvalError::new(format!("expected {}, found {}", expected, describe(self.peek())))
    }

    fn statement(&mut self) -> EvalResult<Stmt> {
        self.nested(Parser::statement_inner)
    }

    fn statement_inner(&mut self) -> EvalResult<Stmt> {
        if self.eat_punct(";") {
            return Ok(Stmt::Empty);
        }
        if self.is_punct("{") {
            self.advance();
            return Ok(Stmt::Block(self.block_rest()?));
        }
        if self.is_keyword("var") {
            self.advance();
            let mut declarations = vec![];
            loop {
                let name = self.expect_ident()?;
                let init = if self.eat_punct("=") {
                    Some(self.assignment()?)
                } else {
                    None
                };
                declarations.push((name, init));
                if !self.eat_punct(",") {
                    break;
                }
            }
            self.eat_punct(";");
            return Ok(Stmt::Var(declarations));
        }
        if self.is_keyword("return") {
            self.advance();
            let value = if self.is_punct(";") || self.is_punct("}") || self.peek() == &Token::Eof {
                None
            } else {
                Some(self.expression()?)
            };
            self.eat_punct(";");
            return Ok(Stmt::Return(value));
        }
        if self.is_keyword("if") {
            self.advance();
            self.expect_punct("(")?;
            let condition = self.expression()?;
            self.expect_punct(")")?;
            let then = Box::new(self.statement()?);
            let otherwise = if self.is_keyword("else") {
                self.advance();
                Some(Box::new(self.statement()?))
            } else {
                None
            };
            return Ok(Stmt::If(condition, then, otherwise));
        }
        if self.is_keyword("function") && matches!(self.peek_at(1), Token::Ident(_)) {
            self.advance();
            let def = self.function_rest()?;
            return Ok(Stmt::Function(def));
        }
        let expr = self.expression()?;
        self.eat_punct(";");
        Ok(Stmt::Expr(expr))
    }

    /// Statements up to and including the closing brace.
    fn block_rest(&mut self) -> EvalResult<Vec<Stmt>> {
        let mut statements = vec![];
        while !self.eat_punct("}") {
            if self.peek() == &Token::Eof {
                return Err(self.unexpected("'}'"));
            }
            statements.push(self.statement()?);
        }
        Ok(statements)
    }

    /// Everything after the `function` keyword.
    fn function_rest(&mut self) -> EvalResult<Rc<FunctionDef>> {
        let name = match self.peek() {
            Token::Ident(_) => Some(self.expect_ident()?),
            _ => None,
        };
        self.expect_punct("(")?;
        let mut params = vec![];
        if !self.eat_punct(")") {
            loop {
                params.push(self.expect_ident()?);
                if self.eat_punct(")") {
                    break;
                }
                self.expect_punct(",")?;
            }
        }
        self.expect_punct("{")?;
        let body = self.block_rest()?;
        Ok(Rc::new(FunctionDef { name, params, body }))
    }

    fn expression(&mut self) -> EvalResult<Expr> {
        self.assignment()
    }

    fn assignment(&mut self) -> EvalResult<Expr> {
        let target = self.conditional()?;
        if self.is_punct("=") {
            self.advance();
            let Expr::Ident(name) = target else {
                return Err(EvalError::new("invalid assignment target"));
            };
            let value = self.assignment()?;
            return Ok(Expr::Assign(name, Box::new(value)));
        }
        Ok(target)
    }

    fn conditional(&mut self) -> EvalResult<Expr> {
        let condition = self.or()?;
        if self.eat_punct("?") {
            let then = self.assignment()?;
            self.expect_punct(":")?;
            let otherwise = self.assignment()?;
            return Ok(Expr::Conditional(
                Box::new(condition),
                Box::new(then),
                Box::new(otherwise),
            ));
        }
        Ok(condition)
    }

    fn or(&mut self) -> EvalResult<Expr> {
        let mut lhs = self.and()?;
        let mut chain = 0;
        while self.eat_punct("||") {
            self.deepen(&mut chain)?;
            let rhs = self.and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        self.depth -= chain;
        Ok(lhs)
    }

    fn and(&mut self) -> EvalResult<Expr> {
        let mut lhs = self.binary(0)?;
        let mut chain = 0;
        while self.eat_punct("&&") {
            self.deepen(&mut chain)?;
            let rhs = self.binary(0)?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        self.depth -= chain;
        Ok(lhs)
    }

    /// Left-associative binary operators, loosest level first.
    fn binary(&mut self, level: usize) -> EvalResult<Expr> {
        const LEVELS: &[&[&str]] = &[
            &["==", "!=", "===", "!=="],
            &["<", "<=", ">", ">="],
            &["+", "-"],
            &["*", "/", "%"],
        ];
        if level == LEVELS.len() {
            return self.unary();
        }
        let mut lhs = self.binary(level + 1)?;
        let mut chain = 0;
        loop {
            let op = match self.peek() {
                Token::Punct(p) if LEVELS[level].contains(p) => BinaryOp::from_punct(p),
                _ => None,
            };
            let Some(op) = op else {
                self.depth -= chain;
                return Ok(lhs);
            };
            self.advance();
            self.deepen(&mut chain)?;
            let rhs = self.binary(level + 1)?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn unary(&mut self) -> EvalResult<Expr> {
        self.nested(Parser::unary_inner)
    }

    fn unary_inner(&mut self) -> EvalResult<Expr> {
        let op = match self.peek() {
            Token::Punct("!") => Some(UnaryOp::Not),
            Token::Punct("-") => Some(UnaryOp::Neg),
            Token::Punct("+") => Some(UnaryOp::Plus),
            Token::Ident(name) if name == "typeof" => Some(UnaryOp::TypeOf),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.unary()?;
            return Ok(Expr::Unary(op, Box::new(operand)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> EvalResult<Expr> {
        let mut expr = self.primary()?;
        let mut chain = 0;
        loop {
            if matches!(self.peek(), Token::Punct("." | "[" | "(")) {
                self.deepen(&mut chain)?;
            }
            if self.eat_punct(".") {
                let name = self.expect_ident()?;
                expr = Expr::Member(Box::new(expr), name);
            } else if self.eat_punct("[") {
                let index = self.expression()?;
                self.expect_punct("]")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else if self.eat_punct("(") {
                let args = self.list(")")?;
                expr = Expr::Call(Box::new(expr), args);
            } else {
                self.depth -= chain;
                return Ok(expr);
            }
        }
    }

    /// Comma separated expressions up to and including `close`.
    fn list(&mut self, close: &str) -> EvalResult<Vec<Expr>> {
        let mut items = vec![];
        while !self.eat_punct(close) {
            items.push(self.assignment()?);
            if !self.is_punct(close) {
                self.expect_punct(",")?;
            }
        }
        Ok(items)
    }

    fn primary(&mut self) -> EvalResult<Expr> {
        match self.advance() {
            Token::Number(n) => Ok(Expr::Number(n)),
            Token::Str(s) => Ok(Expr::Str(s.into())),
            Token::Punct("(") => {
                let expr = self.expression()?;
                self.expect_punct(")")?;
                Ok(expr)
            }
            Token::Punct("[") => Ok(Expr::Array(self.list("]")?)),
            Token::Punct("{") => {
                let mut entries = vec![];
                while !self.eat_punct("}") {
                    let key: Rc<str> = match self.advance() {
                        Token::Ident(name) => name.into(),
                        Token::Str(s) => s.into(),
                        Token::Number(n) => super::value::format_number(n).into(),
                        other => {
                            return Err(EvalError::new(format!(
                                "expected property name, found {}",
                                describe(&other)
                            )))
                        }
                    };
                    self.expect_punct(":")?;
                    entries.push((key, self.assignment()?));
                    if !self.is_punct("}") {
                        self.expect_punct(",")?;
                    }
                }
                Ok(Expr::Object(entries))
            }
            Token::Ident(name) => Ok(match name.as_str() {
                "true" => Expr::Bool(true),
                "false" => Expr::Bool(false),
                "null" => Expr::Null,
                "undefined" => Expr::Undefined,
                "function" => Expr::Function(self.function_rest()?),
                _ => Expr::Ident(name),
            }),
            other => Err(EvalError::new(format!(
                "unexpected {}",
                describe(&other)
            ))),
        }
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Number(n) => format!("number {}", n),
        Token::Str(s) => format!("string '{}'", s),
        Token::Ident(name) => format!("'{}'", name),
        Token::Punct(p) => format!("'{}'", p),
        Token::Eof => "end of input".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence() {
        let expr = parse_expression("1 + 2 * 3 == 7 && !false").unwrap();
        let Expr::And(lhs, rhs) = expr else {
            panic!("expected &&");
        };
        assert!(matches!(*rhs, Expr::Unary(UnaryOp::Not, _)));
        let Expr::Binary(BinaryOp::Eq, sum, _) = *lhs else {
            panic!("expected ==");
        };
        let Expr::Binary(BinaryOp::Add, _, product) = *sum else {
            panic!("expected +");
        };
        assert!(matches!(*product, Expr::Binary(BinaryOp::Mul, _, _)));
    }

    #[test]
    fn test_postfix_chain() {
        let expr = parse_expression("heap.findClass('x').fields[0].name").unwrap();
        let Expr::Member(inner, name) = expr else {
            panic!("expected member access");
        };
        assert_eq!(name, "name");
        assert!(matches!(*inner, Expr::Index(_, _)));
    }

    #[test]
    fn test_literals_and_functions() {
        let expr = parse_expression("{ a: [1, 2,], 'b': function (x, y) { return x + y; } }").unwrap();
        let Expr::Object(entries) = expr else {
            panic!("expected object literal");
        };
        assert_eq!(&*entries[0].0, "a");
        assert!(matches!(&entries[0].1, Expr::Array(items) if items.len() == 2));
        let Expr::Function(def) = &entries[1].1 else {
            panic!("expected function");
        };
        assert_eq!(def.params, vec!["x", "y"]);
        assert_eq!(def.body.len(), 1);
    }

    #[test]
    fn test_script_statements() {
        let script = parse_script(
            "var a = 1, b; function f(x) { if (x) { return 1; } else return 2 } f(a)",
        )
        .unwrap();
        assert_eq!(script.len(), 3);
        assert!(matches!(&script[0], Stmt::Var(decls) if decls.len() == 2));
        assert!(matches!(&script[1], Stmt::Function(def) if def.name.as_deref() == Some("f")));
        assert!(matches!(&script[2], Stmt::Expr(Expr::Call(_, _))));
    }

    #[test]
    fn test_syntax_errors() {
        assert!(parse_expression("1 +").is_err());
        assert!(parse_expression("a b").is_err());
        assert!(parse_expression("(1").is_err());
        assert!(parse_expression("1 = 2").is_err());
        assert!(parse_script("if (x { }").is_err());
    }

    #[test]
    fn test_nesting_limit() {
        let deep = format!("{}1{}", "(".repeat(100_000), ")".repeat(100_000));
        let error = parse_expression(&deep).unwrap_err();
        assert_eq!(error.0, "expression nested too deeply");
        assert!(parse_expression(&format!("{}x", "-".repeat(100_000))).is_err());
        assert!(parse_script(&"{".repeat(100_000)).is_err());
        assert!(parse_expression(&format!("1{}", " + 1".repeat(100_000))).is_err());
        assert!(parse_expression(&format!("x{}", ".y".repeat(100_000))).is_err());
        let shallow = format!("{}1{}", "(".repeat(20), ")".repeat(20));
        assert!(matches!(parse_expression(&shallow).unwrap(), Expr::Number(n) if n == 1.0));
    }
}
