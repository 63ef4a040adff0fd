//! Recursive-descent parser for display expressions.
//!
//! Precedence, loosest first: `x if c else y`, `or`, `and`, `not`, `==`/`!=`, `+`.
//! Names and functions are resolved here so a typo fails when settings are
//! applied, not on every render.

use super::context::Name;
use super::lexer::{tokenize, FStringPart, Token, TokenKind};
use super::value::Value;
use crate::error::RenderError;

/// Helper functions available to expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    RoundTd,
    FmtTd,
    PosAvail,
    PredictedPos,
    Str,
    Upper,
    Lower,
    Join,
    Default,
    Len,
}

impl Function {
    pub fn resolve(ident: &str) -> Option<Self> {
        let function = match ident {
            "roundtd" => Function::RoundTd,
            "fmttd" => Function::FmtTd,
            "posavail" => Function::PosAvail,
            "predictedpos" => Function::PredictedPos,
            "str" => Function::Str,
            "upper" => Function::Upper,
            "lower" => Function::Lower,
            "join" => Function::Join,
            "default" => Function::Default,
            "len" => Function::Len,
            _ => return None,
        };
        Some(function)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Function::RoundTd => "roundtd",
            Function::FmtTd => "fmttd",
            Function::PosAvail => "posavail",
            Function::PredictedPos => "predictedpos",
            Function::Str => "str",
            Function::Upper => "upper",
            Function::Lower => "lower",
            Function::Join => "join",
            Function::Default => "default",
            Function::Len => "len",
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            Function::PosAvail | Function::PredictedPos => 0,
            Function::Join | Function::Default => 2,
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Text(String),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Name(Name),
    FString(Vec<Segment>),
    Call(Function, Vec<Expr>),
    Add(Box<Expr>, Box<Expr>),
    Compare {
        negated: bool,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Conditional {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
}

const KEYWORDS: &[&str] = &["if", "else", "and", "or", "not"];

/// Deepest syntax tree accepted. Evaluation recurses along the tree.
pub const MAX_DEPTH: usize = 100;

/// Parse a whole expression.
pub fn parse(source: &str) -> Result<Expr, RenderError> {
    parse_at(source, 0, 0)
}

fn parse_at(source: &str, base: usize, depth: usize) -> Result<Expr, RenderError> {
    let tokens = tokenize(source, base)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth,
    };
    let expr = parser.expr()?;
    match &parser.peek().kind {
        TokenKind::End => Ok(expr),
        _ => Err(parser.unexpected()),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Tree depth at the current position.
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        // The token list always ends with `End`, and `advance` never moves past it.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::End {
            self.pos += 1;
        }
        token
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Ident(name) if name == keyword)
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        let found = self.at_keyword(keyword);
        if found {
            self.pos += 1;
        }
        found
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<(), RenderError> {
        if self.peek().kind == kind {
            self.advance();
            Ok(())
        } else {
            Err(RenderError::Syntax {
                offset: self.peek().offset,
                message: format!("expected {what}"),
            })
        }
    }

    fn unexpected(&self) -> RenderError {
        let token = self.peek();
        let message = match &token.kind {
            TokenKind::End => "unexpected end of expression".to_string(),
            TokenKind::Ident(name) => format!("unexpected `{name}`"),
            other => format!("unexpected token {other:?}"),
        };
        RenderError::Syntax {
            offset: token.offset,
            message,
        }
    }

    fn descend(&mut self) -> Result<(), RenderError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(RenderError::Syntax {
                offset: self.peek().offset,
                message: "expression nested too deeply".into(),
            });
        }
        Ok(())
    }

    fn expr(&mut self) -> Result<Expr, RenderError> {
        self.descend()?;
        let expr = self.conditional();
        self.depth -= 1;
        expr
    }

    fn conditional(&mut self) -> Result<Expr, RenderError> {
        let then = self.or()?;
        if !self.eat_keyword("if") {
            return Ok(then);
        }
        let condition = self.or()?;
        if !self.eat_keyword("else") {
            return Err(RenderError::Syntax {
                offset: self.peek().offset,
                message: "expected `else`".into(),
            });
        }
        let otherwise = self.expr()?;
        Ok(Expr::Conditional {
            condition: Box::new(condition),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn or(&mut self) -> Result<Expr, RenderError> {
        let depth = self.depth;
        let mut lhs = self.and()?;
        while self.eat_keyword("or") {
            self.descend()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(self.and()?));
        }
        self.depth = depth;
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr, RenderError> {
        let depth = self.depth;
        let mut lhs = self.not()?;
        while self.eat_keyword("and") {
            self.descend()?;
            lhs = Expr::And(Box::new(lhs), Box::new(self.not()?));
        }
        self.depth = depth;
        Ok(lhs)
    }

    fn not(&mut self) -> Result<Expr, RenderError> {
        if self.eat_keyword("not") {
            self.descend()?;
            let inner = self.not()?;
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, RenderError> {
        let lhs = self.sum()?;
        let negated = match self.peek().kind {
            TokenKind::EqEq => false,
            TokenKind::NotEq => true,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.sum()?;
        Ok(Expr::Compare {
            negated,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    fn sum(&mut self) -> Result<Expr, RenderError> {
        let depth = self.depth;
        let mut lhs = self.primary()?;
        while self.peek().kind == TokenKind::Plus {
            self.advance();
            self.descend()?;
            lhs = Expr::Add(Box::new(lhs), Box::new(self.primary()?));
        }
        self.depth = depth;
        Ok(lhs)
    }

    fn primary(&mut self) -> Result<Expr, RenderError> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Str(text) => {
                self.advance();
                Ok(Expr::Literal(Value::Str(text)))
            }
            TokenKind::Int(n) => {
                self.advance();
                Ok(Expr::Literal(Value::Int(n)))
            }
            TokenKind::Float(x) => {
                self.advance();
                Ok(Expr::Literal(Value::Float(x)))
            }
            TokenKind::FString(parts) => {
                self.advance();
                let segments = parts
                    .into_iter()
                    .map(|part| match part {
                        FStringPart::Text(text) => Ok(Segment::Text(text)),
                        FStringPart::Code { source, offset } => {
                            parse_at(&source, offset, self.depth + 1).map(Segment::Expr)
                        }
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Expr::FString(segments))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.expr()?;
                self.expect(TokenKind::RParen, "`)`")?;
                Ok(inner)
            }
            TokenKind::Ident(name) => {
                if KEYWORDS.contains(&name.as_str()) {
                    return Err(self.unexpected());
                }
                self.advance();
                if self.peek().kind == TokenKind::LParen {
                    return self.call(&name);
                }
                let literal = match name.as_str() {
                    "true" | "True" => Some(Value::Bool(true)),
                    "false" | "False" => Some(Value::Bool(false)),
                    "none" | "None" => Some(Value::None),
                    _ => None,
                };
                if let Some(value) = literal {
                    return Ok(Expr::Literal(value));
                }
                Name::resolve(&name)
                    .map(Expr::Name)
                    .ok_or(RenderError::UnknownName(name))
            }
            _ => Err(self.unexpected()),
        }
    }

    fn call(&mut self, name: &str) -> Result<Expr, RenderError> {
        let function =
            Function::resolve(name).ok_or_else(|| RenderError::UnknownFunction(name.to_string()))?;
        self.expect(TokenKind::LParen, "`(`")?;

        let mut args = Vec::new();
        if self.peek().kind != TokenKind::RParen {
            loop {
                args.push(self.expr()?);
                if self.peek().kind != TokenKind::Comma {
                    break;
                }
                self.advance();
            }
        }
        self.expect(TokenKind::RParen, "`)` or `,`")?;

        if args.len() != function.arity() {
            return Err(RenderError::Arity {
                function: function.name(),
                expected: function.arity(),
                found: args.len(),
            });
        }
        Ok(Expr::Call(function, args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(n: Name) -> Box<Expr> {
        Box::new(Expr::Name(n))
    }

    #[test]
    fn test_conditional_binds_loosest() {
        let expr = parse("'x' + artist if data else 'y'").unwrap();
        let Expr::Conditional { condition, then, .. } = expr else {
            panic!("expected conditional");
        };
        assert_eq!(*condition, Expr::Name(Name::Data));
        assert!(matches!(*then, Expr::Add(..)));
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let expr = parse("data or artist and title").unwrap();
        assert_eq!(
            expr,
            Expr::Or(
                name(Name::Data),
                Box::new(Expr::And(name(Name::Artist), name(Name::Title)))
            )
        );
    }

    #[test]
    fn test_not_and_comparison() {
        let expr = parse("not playback_status == 'Playing'").unwrap();
        assert_eq!(
            expr,
            Expr::Not(Box::new(Expr::Compare {
                negated: false,
                lhs: name(Name::PlaybackStatus),
                rhs: Box::new(Expr::Literal(Value::Str("Playing".into()))),
            }))
        );
    }

    #[test]
    fn test_literals() {
        assert_eq!(parse("True").unwrap(), Expr::Literal(Value::Bool(true)));
        assert_eq!(parse("none").unwrap(), Expr::Literal(Value::None));
        assert_eq!(parse("(2)").unwrap(), Expr::Literal(Value::Int(2)));
    }

    #[test]
    fn test_fstring_fields_are_parsed() {
        let expr = parse("f'{artist} - {upper(title)}'").unwrap();
        assert_eq!(
            expr,
            Expr::FString(vec![
                Segment::Expr(Expr::Name(Name::Artist)),
                Segment::Text(" - ".into()),
                Segment::Expr(Expr::Call(Function::Upper, vec![Expr::Name(Name::Title)])),
            ])
        );
    }

    #[test]
    fn test_default_script_expression_parses() {
        let source = r#"'NO MEDIA' if not data else f'{artist} - {title} ' + ('\n' + fmttd(roundtd(predictedpos())) + '/' + fmttd(roundtd(end_time)) if posavail() else '')"#;
        assert!(parse(source).is_ok());
    }

    #[test]
    fn test_unknown_names_rejected() {
        assert_eq!(
            parse("__import__('os')"),
            Err(RenderError::UnknownFunction("__import__".into()))
        );
        assert_eq!(parse("artst"), Err(RenderError::UnknownName("artst".into())));
        assert_eq!(
            parse("f'{sys}'"),
            Err(RenderError::UnknownName("sys".into()))
        );
    }

    #[test]
    fn test_arity_checked() {
        assert_eq!(
            parse("upper(artist, title)"),
            Err(RenderError::Arity {
                function: "upper",
                expected: 1,
                found: 2,
            })
        );
        assert!(parse("posavail()").is_ok());
    }

    #[test]
    fn test_syntax_errors() {
        assert!(matches!(
            parse("artist if data"),
            Err(RenderError::Syntax { .. })
        ));
        assert!(matches!(
            parse("artist title"),
            Err(RenderError::Syntax { offset: 7, .. })
        ));
        assert!(matches!(parse("(artist"), Err(RenderError::Syntax { .. })));
        assert!(matches!(parse(""), Err(RenderError::Syntax { .. })));
        assert!(matches!(parse("artist +"), Err(RenderError::Syntax { .. })));
    }

    #[test]
    fn test_deep_nesting_rejected() {
        let nested = format!("{}artist{}", "(".repeat(1000), ")".repeat(1000));
        assert_eq!(
            parse(&nested),
            Err(RenderError::Syntax {
                offset: MAX_DEPTH,
                message: "expression nested too deeply".into(),
            })
        );
        let nots = format!("{}data", "not ".repeat(5000));
        assert!(matches!(parse(&nots), Err(RenderError::Syntax { .. })));
        let sum = vec!["artist"; 5000].join(" + ");
        assert!(matches!(parse(&sum), Err(RenderError::Syntax { .. })));
        let fields = format!("f'{{{}artist{}}}'", "(".repeat(500), ")".repeat(500));
        assert!(matches!(parse(&fields), Err(RenderError::Syntax { .. })));
    }

    #[test]
    fn test_moderate_nesting_accepted() {
        let nested = format!("{}artist{}", "(".repeat(30), ")".repeat(30));
        assert_eq!(parse(&nested).unwrap(), Expr::Name(Name::Artist));
        let sum = vec!["artist"; 40].join(" + ");
        assert!(parse(&sum).is_ok());
    }

    #[test]
    fn test_fstring_error_offset_is_absolute() {
        assert!(matches!(
            parse("'a' + f'{artist +}'"),
            Err(RenderError::Syntax { offset: 17, .. })
        ));
    }
}
