use std::rc::Rc;

use crate::{
    ast::{
        ArrayElement, AssignOp, BinaryOp, BindingElement, BindingTarget, ClassDecl, ClassMember,
        Expr, ExprKind, FunctionBody, FunctionDecl, ImportClause, Literal, LogicalOp, MatchArm,
        ObjectEntry, Param, ParamKind, Pattern, Program, PropertyKey, Stmt, StmtKind, SwitchCase,
        TemplatePart, UnaryOp, UpdateOp,
    },
    diagnostics::{Diagnostic, DiagnosticKind, SourceSpan},
    lexer::{self, Keyword, Token, TokenKind},
};

/// Nested input descends one frame per level; grow the stack instead of
/// overflowing it.
const STACK_RED_ZONE: usize = 64 * 1024;
const STACK_GROW_SIZE: usize = 2 * 1024 * 1024;

/// Parse a token stream into a program. Newline tokens are dropped first.
pub fn parse(tokens: Vec<Token>) -> Result<Program, Diagnostic> {
    Parser::new(tokens).parse_program()
}

pub fn parse_source(source: &str) -> Result<Program, Diagnostic> {
    parse(lexer::tokenize(source)?)
}

struct Parser {
    tokens: Vec<Token>,
    current: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        let mut tokens: Vec<Token> = tokens
            .into_iter()
            .filter(|token| token.kind != TokenKind::Newline)
            .collect();
        if tokens.last().map(|token| token.kind) != Some(TokenKind::Eof) {
            let span = tokens.last().map(|token| token.span).unwrap_or_default();
            tokens.push(Token {
                kind: TokenKind::Eof,
                lexeme: String::new(),
                span,
            });
        }
        Self { tokens, current: 0 }
    }

    fn parse_program(&mut self) -> Result<Program, Diagnostic> {
        let mut items = Vec::new();
        loop {
            self.skip_semicolons();
            if self.is_at_end() {
                break;
            }
            items.push(self.parse_declaration()?);
        }
        Ok(Program { items })
    }

    fn parse_block_items(&mut self) -> Result<Vec<Stmt>, Diagnostic> {
        let mut items = Vec::new();
        loop {
            self.skip_semicolons();
            if self.check(TokenKind::RBrace) || self.is_at_end() {
                break;
            }
            items.push(self.parse_declaration()?);
        }
        self.consume(TokenKind::RBrace, "expected `}` to close block")?;
        Ok(items)
    }

    fn parse_block(&mut self) -> Result<(Vec<Stmt>, SourceSpan), Diagnostic> {
        let lbrace = self.consume(TokenKind::LBrace, "expected `{` to start block")?;
        let items = self.parse_block_items()?;
        Ok((items, self.span_from(lbrace.span)))
    }

    fn parse_declaration(&mut self) -> Result<Stmt, Diagnostic> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || self.parse_declaration_inner())
    }

    fn parse_declaration_inner(&mut self) -> Result<Stmt, Diagnostic> {
        match self.peek_kind() {
            TokenKind::Keyword(Keyword::Let) => self.parse_let(false),
            TokenKind::Keyword(Keyword::Const) => self.parse_let(true),
            TokenKind::Keyword(Keyword::Fn) if self.peek_kind_at(1) == TokenKind::Identifier => {
                self.parse_function_declaration()
            }
            TokenKind::Keyword(Keyword::Async)
                if self.peek_kind_at(1) == TokenKind::Keyword(Keyword::Fn)
                    && self.peek_kind_at(2) == TokenKind::Identifier =>
            {
                self.parse_function_declaration()
            }
            TokenKind::Keyword(Keyword::Class) => self.parse_class(),
            TokenKind::Keyword(Keyword::Import) => self.parse_import(),
            TokenKind::Keyword(Keyword::Export) => self.parse_export(),
            _ => self.parse_statement(),
        }
    }

    fn parse_statement(&mut self) -> Result<Stmt, Diagnostic> {
        match self.peek_kind() {
            TokenKind::Keyword(Keyword::If) => self.parse_if(),
            TokenKind::Keyword(Keyword::While) => self.parse_while(),
            TokenKind::Keyword(Keyword::Do) => self.parse_do_while(),
            TokenKind::Keyword(Keyword::For) => self.parse_for(),
            TokenKind::Keyword(Keyword::Loop) => self.parse_loop(),
            TokenKind::Keyword(Keyword::Switch) => self.parse_switch(),
            TokenKind::Keyword(Keyword::Try) => self.parse_try(),
            TokenKind::Keyword(Keyword::Throw) => {
                let start = self.advance().span;
                let value = self.parse_expression()?;
                Ok(Stmt {
                    kind: StmtKind::Throw(value),
                    span: self.span_from(start),
                })
            }
            TokenKind::Keyword(Keyword::Return) => self.parse_return(),
            TokenKind::Keyword(Keyword::Break) => {
                let span = self.advance().span;
                Ok(Stmt {
                    kind: StmtKind::Break,
                    span,
                })
            }
            TokenKind::Keyword(Keyword::Continue) => {
                let span = self.advance().span;
                Ok(Stmt {
                    kind: StmtKind::Continue,
                    span,
                })
            }
            TokenKind::Keyword(Keyword::Print) => self.parse_print(),
            TokenKind::LBrace => {
                let (items, span) = self.parse_block()?;
                Ok(Stmt {
                    kind: StmtKind::Block(items),
                    span,
                })
            }
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_let(&mut self, constant: bool) -> Result<Stmt, Diagnostic> {
        let start = self.advance().span;
        let target = self.parse_binding_target()?;
        let value = if self.matches(TokenKind::Assign) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        if value.is_none() {
            if constant {
                return Err(self.error_here("missing initializer in `const` declaration"));
            }
            if !matches!(target, BindingTarget::Name(_)) {
                return Err(self.error_here("destructuring declaration requires an initializer"));
            }
        }
        Ok(Stmt {
            kind: StmtKind::Let {
                target,
                value,
                constant,
            },
            span: self.span_from(start),
        })
    }

    fn parse_binding_target(&mut self) -> Result<BindingTarget, Diagnostic> {
        match self.peek_kind() {
            TokenKind::LBracket => {
                self.advance();
                let mut elements = Vec::new();
                let mut rest = None;
                while !self.check(TokenKind::RBracket) {
                    if self.matches(TokenKind::Ellipsis) {
                        rest = Some(self.consume_identifier("expected name after `...`")?.lexeme);
                        break;
                    }
                    elements.push(self.parse_binding_element()?);
                    if !self.matches(TokenKind::Comma) {
                        break;
                    }
                }
                self.consume(TokenKind::RBracket, "expected `]` to close array pattern")?;
                Ok(BindingTarget::Array { elements, rest })
            }
            TokenKind::LBrace => {
                self.advance();
                let mut fields = Vec::new();
                let mut rest = None;
                while !self.check(TokenKind::RBrace) {
                    if self.matches(TokenKind::Ellipsis) {
                        rest = Some(self.consume_identifier("expected name after `...`")?.lexeme);
                        break;
                    }
                    let key = self.consume_property_name("expected property name in pattern")?;
                    let target = if self.matches(TokenKind::Colon) {
                        self.parse_binding_target()?
                    } else {
                        BindingTarget::Name(key.clone())
                    };
                    let default = if self.matches(TokenKind::Assign) {
                        Some(self.parse_expression()?)
                    } else {
                        None
                    };
                    fields.push((key, BindingElement { target, default }));
                    if !self.matches(TokenKind::Comma) {
                        break;
                    }
                }
                self.consume(TokenKind::RBrace, "expected `}` to close object pattern")?;
                Ok(BindingTarget::Object { fields, rest })
            }
            _ => {
                let name = self.consume_identifier("expected variable name")?;
                Ok(BindingTarget::Name(name.lexeme))
            }
        }
    }

    fn parse_binding_element(&mut self) -> Result<BindingElement, Diagnostic> {
        let target = self.parse_binding_target()?;
        let default = if self.matches(TokenKind::Assign) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        Ok(BindingElement { target, default })
    }

    fn parse_function_declaration(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.peek_span();
        let is_async = self.matches_keyword(Keyword::Async);
        self.consume_keyword(Keyword::Fn)?;
        let name = self.consume_identifier("expected function name")?;
        let params = self.parse_params()?;
        let (body, _) = self.parse_block()?;
        Ok(Stmt {
            kind: StmtKind::Function(Rc::new(FunctionDecl {
                name: Some(name.lexeme),
                params,
                body: FunctionBody::Block(body),
                is_async,
                is_arrow: false,
            })),
            span: self.span_from(start),
        })
    }

    fn parse_params(&mut self) -> Result<Vec<Param>, Diagnostic> {
        self.consume(TokenKind::LParen, "expected `(` before parameters")?;
        let mut params = Vec::new();
        while !self.check(TokenKind::RParen) {
            let is_rest = self.matches(TokenKind::Ellipsis);
            let name = self.consume_identifier("expected parameter name")?;
            let kind = if is_rest {
                ParamKind::Rest
            } else if self.matches(TokenKind::Assign) {
                ParamKind::Default(self.parse_expression()?)
            } else {
                ParamKind::Plain
            };
            params.push(Param {
                name: name.lexeme,
                kind,
                span: name.span,
            });
            if is_rest {
                if !self.check(TokenKind::RParen) {
                    return Err(self.error_here("rest parameter must be last"));
                }
                break;
            }
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        self.consume(TokenKind::RParen, "expected `)` after parameters")?;
        Ok(params)
    }

    fn parse_class(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.advance().span;
        let name = self.consume_identifier("expected class name")?.lexeme;
        let parent = if self.matches_keyword(Keyword::Extends) {
            Some(self.consume_identifier("expected parent class name")?.lexeme)
        } else {
            None
        };
        self.consume(TokenKind::LBrace, "expected `{` to start class body")?;
        let mut members = Vec::new();
        loop {
            while self.matches(TokenKind::Semicolon) || self.matches(TokenKind::Comma) {}
            if self.check(TokenKind::RBrace) || self.is_at_end() {
                break;
            }
            members.push(self.parse_class_member()?);
        }
        self.consume(TokenKind::RBrace, "expected `}` to close class body")?;
        Ok(Stmt {
            kind: StmtKind::Class(ClassDecl {
                name,
                parent,
                members,
            }),
            span: self.span_from(start),
        })
    }

    fn parse_class_member(&mut self) -> Result<ClassMember, Diagnostic> {
        let is_static = self.check(TokenKind::Keyword(Keyword::Static))
            && self.peek_kind_at(1) != TokenKind::LParen
            && self.matches_keyword(Keyword::Static);
        let is_async = self.check(TokenKind::Keyword(Keyword::Async))
            && self.peek_kind_at(1) != TokenKind::LParen
            && self.matches_keyword(Keyword::Async);
        let name = self.consume_property_name("expected class member name")?;
        if self.check(TokenKind::LParen) {
            let params = self.parse_params()?;
            let (body, _) = self.parse_block()?;
            return Ok(ClassMember::Method {
                function: Rc::new(FunctionDecl {
                    name: Some(name.clone()),
                    params,
                    body: FunctionBody::Block(body),
                    is_async,
                    is_arrow: false,
                }),
                name,
                is_static,
            });
        }
        if is_async {
            return Err(self.error_here("expected `(` after async method name"));
        }
        let value = if self.matches(TokenKind::Assign) {
            Some(Rc::new(self.parse_expression()?))
        } else {
            None
        };
        Ok(ClassMember::Property {
            name,
            value,
            is_static,
        })
    }

    fn parse_import(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.advance().span;
        let clause = match self.peek_kind() {
            TokenKind::String => ImportClause::SideEffect,
            TokenKind::Star => {
                self.advance();
                self.consume_keyword(Keyword::As)?;
                let alias = self.consume_identifier("expected namespace name after `as`")?;
                ImportClause::Namespace(alias.lexeme)
            }
            TokenKind::LBrace => ImportClause::Named(self.parse_name_list()?),
            _ => return Err(self.error_here("expected `{`, `*` or a module path after `import`")),
        };
        if !matches!(clause, ImportClause::SideEffect) {
            self.consume_keyword(Keyword::From)?;
        }
        let source = self.consume(TokenKind::String, "expected module path string")?;
        Ok(Stmt {
            kind: StmtKind::Import {
                clause,
                source: source.lexeme,
            },
            span: self.span_from(start),
        })
    }

    /// `{ a, b as c }` as `(original, local)` pairs.
    fn parse_name_list(&mut self) -> Result<Vec<(String, String)>, Diagnostic> {
        self.consume(TokenKind::LBrace, "expected `{`")?;
        let mut names = Vec::new();
        while !self.check(TokenKind::RBrace) {
            let name = self.consume_identifier("expected name")?.lexeme;
            let alias = if self.matches_keyword(Keyword::As) {
                self.consume_identifier("expected alias after `as`")?.lexeme
            } else {
                name.clone()
            };
            names.push((name, alias));
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        self.consume(TokenKind::RBrace, "expected `}` after names")?;
        Ok(names)
    }

    fn parse_export(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.advance().span;
        if self.check(TokenKind::LBrace) {
            let names = self.parse_name_list()?;
            return Ok(Stmt {
                kind: StmtKind::ExportNames(names),
                span: self.span_from(start),
            });
        }
        let declaration = match self.peek_kind() {
            TokenKind::Keyword(Keyword::Let) => self.parse_let(false)?,
            TokenKind::Keyword(Keyword::Const) => self.parse_let(true)?,
            TokenKind::Keyword(Keyword::Fn | Keyword::Async) => self.parse_function_declaration()?,
            TokenKind::Keyword(Keyword::Class) => self.parse_class()?,
            _ => return Err(self.error_here("expected declaration after `export`")),
        };
        Ok(Stmt {
            kind: StmtKind::Export(Box::new(declaration)),
            span: self.span_from(start),
        })
    }

    fn parse_if(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.advance().span;
        let condition = self.parse_expression()?;
        let (then_branch, _) = self.parse_block()?;
        let else_branch = if self.check(TokenKind::Keyword(Keyword::Elif)) {
            Some(vec![self.parse_if()?])
        } else if self.matches_keyword(Keyword::Else) {
            if self.check(TokenKind::Keyword(Keyword::If)) {
                Some(vec![self.parse_if()?])
            } else {
                Some(self.parse_block()?.0)
            }
        } else {
            None
        };
        Ok(Stmt {
            kind: StmtKind::If {
                condition,
                then_branch,
                else_branch,
            },
            span: self.span_from(start),
        })
    }

    fn parse_while(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.advance().span;
        let condition = self.parse_expression()?;
        let (body, _) = self.parse_block()?;
        Ok(Stmt {
            kind: StmtKind::While { condition, body },
            span: self.span_from(start),
        })
    }

    fn parse_do_while(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.advance().span;
        let (body, _) = self.parse_block()?;
        self.consume_keyword(Keyword::While)?;
        let condition = self.parse_expression()?;
        Ok(Stmt {
            kind: StmtKind::DoWhile { body, condition },
            span: self.span_from(start),
        })
    }

    fn parse_for(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.advance().span;
        let parenthesized = self.check(TokenKind::LParen)
            && self.peek_kind_at(1) == TokenKind::Identifier
            && matches!(
                self.peek_kind_at(2),
                TokenKind::Keyword(Keyword::In | Keyword::Of)
            );
        if parenthesized {
            self.advance();
        }
        let binding = self.consume_identifier("expected loop binding")?.lexeme;
        let of = if self.matches_keyword(Keyword::Of) {
            true
        } else {
            self.consume_keyword(Keyword::In)?;
            false
        };
        let iterable = self.parse_expression()?;
        if parenthesized {
            self.consume(TokenKind::RParen, "expected `)` after loop header")?;
        }
        let (body, _) = self.parse_block()?;
        let kind = if of {
            StmtKind::ForOf {
                binding,
                iterable,
                body,
            }
        } else {
            StmtKind::ForIn {
                binding,
                iterable,
                body,
            }
        };
        Ok(Stmt {
            kind,
            span: self.span_from(start),
        })
    }

    fn parse_loop(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.advance().span;
        if self.check(TokenKind::LBrace) {
            let (body, _) = self.parse_block()?;
            return Ok(Stmt {
                kind: StmtKind::Loop { body },
                span: self.span_from(start),
            });
        }
        let binding = self
            .consume_identifier("expected loop binding or `{` after `loop`")?
            .lexeme;
        let kind = match self.peek_kind() {
            TokenKind::Keyword(Keyword::From) => {
                self.advance();
                let from = self.parse_expression()?;
                self.consume_keyword(Keyword::To)?;
                let to = self.parse_expression()?;
                let step = if self.matches_keyword(Keyword::Step) {
                    Some(self.parse_expression()?)
                } else {
                    None
                };
                let (body, _) = self.parse_block()?;
                StmtKind::LoopRange {
                    binding,
                    from,
                    to,
                    step,
                    body,
                }
            }
            TokenKind::Keyword(Keyword::In) => {
                self.advance();
                let iterable = self.parse_expression()?;
                let (body, _) = self.parse_block()?;
                StmtKind::ForIn {
                    binding,
                    iterable,
                    body,
                }
            }
            TokenKind::Keyword(Keyword::Of) => {
                self.advance();
                let iterable = self.parse_expression()?;
                let (body, _) = self.parse_block()?;
                StmtKind::ForOf {
                    binding,
                    iterable,
                    body,
                }
            }
            _ => return Err(self.error_here("expected `from`, `in` or `of` in loop header")),
        };
        Ok(Stmt {
            kind,
            span: self.span_from(start),
        })
    }

    fn parse_switch(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.advance().span;
        let subject = self.parse_expression()?;
        self.consume(TokenKind::LBrace, "expected `{` after switch subject")?;
        let mut cases = Vec::new();
        loop {
            self.skip_semicolons();
            let tests = if self.matches_keyword(Keyword::Case) {
                let mut tests = vec![self.parse_expression()?];
                while self.matches(TokenKind::Comma) {
                    tests.push(self.parse_expression()?);
                }
                Some(tests)
            } else if self.matches_keyword(Keyword::Default) {
                None
            } else {
                break;
            };
            self.consume(TokenKind::Colon, "expected `:` after case")?;
            let mut body = Vec::new();
            loop {
                self.skip_semicolons();
                if matches!(
                    self.peek_kind(),
                    TokenKind::Keyword(Keyword::Case | Keyword::Default)
                        | TokenKind::RBrace
                        | TokenKind::Eof
                ) {
                    break;
                }
                body.push(self.parse_declaration()?);
            }
            cases.push(SwitchCase { tests, body });
        }
        self.consume(TokenKind::RBrace, "expected `}` to close switch")?;
        Ok(Stmt {
            kind: StmtKind::Switch { subject, cases },
            span: self.span_from(start),
        })
    }

    fn parse_try(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.advance().span;
        let (body, _) = self.parse_block()?;
        let mut catch_binding = None;
        let mut catch_body = None;
        if self.matches_keyword(Keyword::Catch) {
            if self.matches(TokenKind::LParen) {
                catch_binding = Some(self.consume_identifier("expected catch binding")?.lexeme);
                self.consume(TokenKind::RParen, "expected `)` after catch binding")?;
            } else if self.check(TokenKind::Identifier) {
                catch_binding = Some(self.advance().lexeme);
            }
            catch_body = Some(self.parse_block()?.0);
        }
        let finally_body = if self.matches_keyword(Keyword::Finally) {
            Some(self.parse_block()?.0)
        } else {
            None
        };
        if catch_body.is_none() && finally_body.is_none() {
            return Err(self.error_here("expected `catch` or `finally` after try block"));
        }
        Ok(Stmt {
            kind: StmtKind::Try {
                body,
                catch_binding,
                catch_body,
                finally_body,
            },
            span: self.span_from(start),
        })
    }

    fn parse_return(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.advance().span;
        let value = if matches!(
            self.peek_kind(),
            TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof
        ) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        Ok(Stmt {
            kind: StmtKind::Return(value),
            span: self.span_from(start),
        })
    }

    fn parse_print(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.advance().span;
        let mut values = vec![self.parse_expression()?];
        while self.matches(TokenKind::Comma) {
            values.push(self.parse_expression()?);
        }
        Ok(Stmt {
            kind: StmtKind::Print(values),
            span: self.span_from(start),
        })
    }

    /// An expression, or an assignment when an assignment operator follows it.
    fn parse_expression_statement(&mut self) -> Result<Stmt, Diagnostic> {
        let expr = self.parse_expression()?;
        let op = match self.peek_kind() {
            TokenKind::Assign => Some(AssignOp::Assign),
            TokenKind::PlusAssign => Some(AssignOp::Compound(BinaryOp::Add)),
            TokenKind::MinusAssign => Some(AssignOp::Compound(BinaryOp::Sub)),
            TokenKind::StarAssign => Some(AssignOp::Compound(BinaryOp::Mul)),
            TokenKind::SlashAssign => Some(AssignOp::Compound(BinaryOp::Div)),
            TokenKind::PercentAssign => Some(AssignOp::Compound(BinaryOp::Mod)),
            TokenKind::StarStarAssign => Some(AssignOp::Compound(BinaryOp::Pow)),
            TokenKind::AmpersandAssign => Some(AssignOp::Compound(BinaryOp::BitAnd)),
            TokenKind::PipeAssign => Some(AssignOp::Compound(BinaryOp::BitOr)),
            TokenKind::CaretAssign => Some(AssignOp::Compound(BinaryOp::BitXor)),
            TokenKind::ShiftLeftAssign => Some(AssignOp::Compound(BinaryOp::ShiftLeft)),
            TokenKind::ShiftRightAssign => Some(AssignOp::Compound(BinaryOp::ShiftRight)),
            TokenKind::DoubleQuestionAssign => Some(AssignOp::Nullish),
            _ => None,
        };
        let Some(op) = op else {
            return Ok(Stmt {
                span: expr.span,
                kind: StmtKind::Expr(expr),
            });
        };
        let operator = self.advance();
        if !is_assignable(&expr) {
            return Err(self.error(&operator, "invalid assignment target"));
        }
        let value = self.parse_expression()?;
        Ok(Stmt {
            span: expr.span.to(value.span),
            kind: StmtKind::Assign {
                target: expr,
                op,
                value,
            },
        })
    }

    fn parse_expression(&mut self) -> Result<Expr, Diagnostic> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || self.parse_ternary())
    }

    fn parse_ternary(&mut self) -> Result<Expr, Diagnostic> {
        let condition = self.parse_nullish()?;
        if !self.matches(TokenKind::Question) {
            return Ok(condition);
        }
        let then_expr = self.parse_expression()?;
        self.consume(TokenKind::Colon, "expected `:` in conditional expression")?;
        let else_expr = self.parse_expression()?;
        Ok(Expr {
            span: condition.span.to(else_expr.span),
            kind: ExprKind::Ternary {
                condition: Box::new(condition),
                then_expr: Box::new(then_expr),
                else_expr: Box::new(else_expr),
            },
        })
    }

    fn parse_nullish(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_pipe()?;
        while self.matches(TokenKind::DoubleQuestion) {
            let right = self.parse_pipe()?;
            expr = logical(LogicalOp::Nullish, expr, right);
        }
        Ok(expr)
    }

    fn parse_pipe(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_or()?;
        while self.matches(TokenKind::PipeGreater) {
            let function = self.parse_or()?;
            expr = Expr {
                span: expr.span.to(function.span),
                kind: ExprKind::Pipe {
                    value: Box::new(expr),
                    function: Box::new(function),
                },
            };
        }
        Ok(expr)
    }

    fn parse_or(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_and()?;
        while self.matches(TokenKind::DoublePipe) {
            let right = self.parse_and()?;
            expr = logical(LogicalOp::Or, expr, right);
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_bit_or()?;
        while self.matches(TokenKind::DoubleAmpersand) {
            let right = self.parse_bit_or()?;
            expr = logical(LogicalOp::And, expr, right);
        }
        Ok(expr)
    }

    fn parse_bit_or(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_bit_xor()?;
        while self.matches(TokenKind::Pipe) {
            let right = self.parse_bit_xor()?;
            expr = binary(BinaryOp::BitOr, expr, right);
        }
        Ok(expr)
    }

    fn parse_bit_xor(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_bit_and()?;
        while self.matches(TokenKind::Caret) {
            let right = self.parse_bit_and()?;
            expr = binary(BinaryOp::BitXor, expr, right);
        }
        Ok(expr)
    }

    fn parse_bit_and(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_equality()?;
        while self.matches(TokenKind::Ampersand) {
            let right = self.parse_equality()?;
            expr = binary(BinaryOp::BitAnd, expr, right);
        }
        Ok(expr)
    }

    fn parse_equality(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_comparison()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::EqualEqual | TokenKind::EqualEqualEqual => BinaryOp::Equal,
                TokenKind::BangEqual | TokenKind::BangEqualEqual => BinaryOp::NotEqual,
                _ => break,
            };
            self.advance();
            let right = self.parse_comparison()?;
            expr = binary(op, expr, right);
        }
        Ok(expr)
    }

    fn parse_comparison(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_shift()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Less => BinaryOp::Less,
                TokenKind::LessEqual => BinaryOp::LessEqual,
                TokenKind::Greater => BinaryOp::Greater,
                TokenKind::GreaterEqual => BinaryOp::GreaterEqual,
                TokenKind::Keyword(Keyword::Instanceof) => BinaryOp::InstanceOf,
                TokenKind::Keyword(Keyword::Is) => {
                    self.advance();
                    let type_name = self.consume_type_name()?;
                    expr = Expr {
                        span: self.span_from(expr.span),
                        kind: ExprKind::TypeCheck {
                            expr: Box::new(expr),
                            type_name: type_name.lexeme,
                        },
                    };
                    continue;
                }
                _ => break,
            };
            self.advance();
            let right = self.parse_shift()?;
            expr = binary(op, expr, right);
        }
        Ok(expr)
    }

    fn parse_shift(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_range()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::ShiftLeft => BinaryOp::ShiftLeft,
                TokenKind::ShiftRight => BinaryOp::ShiftRight,
                _ => break,
            };
            self.advance();
            let right = self.parse_range()?;
            expr = binary(op, expr, right);
        }
        Ok(expr)
    }

    fn parse_range(&mut self) -> Result<Expr, Diagnostic> {
        let start = self.parse_additive()?;
        let inclusive = match self.peek_kind() {
            TokenKind::DotDot => false,
            TokenKind::DotDotEqual => true,
            _ => return Ok(start),
        };
        self.advance();
        let end = self.parse_additive()?;
        Ok(Expr {
            span: start.span.to(end.span),
            kind: ExprKind::Range {
                start: Box::new(start),
                end: Box::new(end),
                inclusive,
            },
        })
    }

    fn parse_additive(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_multiplicative()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            expr = binary(op, expr, right);
        }
        Ok(expr)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_power()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_power()?;
            expr = binary(op, expr, right);
        }
        Ok(expr)
    }

    fn parse_power(&mut self) -> Result<Expr, Diagnostic> {
        let base = self.parse_unary()?;
        if self.matches(TokenKind::StarStar) {
            let exponent = self.parse_power()?;
            return Ok(binary(BinaryOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn parse_unary(&mut self) -> Result<Expr, Diagnostic> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || self.parse_unary_inner())
    }

    fn parse_unary_inner(&mut self) -> Result<Expr, Diagnostic> {
        let op = match self.peek_kind() {
            TokenKind::Bang => UnaryOp::Not,
            TokenKind::Minus => UnaryOp::Negate,
            TokenKind::Plus => UnaryOp::Plus,
            TokenKind::Tilde => UnaryOp::BitNot,
            TokenKind::Keyword(Keyword::Typeof) => UnaryOp::TypeOf,
            TokenKind::Keyword(Keyword::Await) => {
                let start = self.advance().span;
                let expr = self.parse_unary()?;
                return Ok(Expr {
                    span: start.to(expr.span),
                    kind: ExprKind::Await(Box::new(expr)),
                });
            }
            TokenKind::PlusPlus | TokenKind::MinusMinus => {
                let operator = self.advance();
                let target = self.parse_unary()?;
                if !is_assignable(&target) {
                    return Err(self.error(&operator, "invalid increment/decrement target"));
                }
                return Ok(Expr {
                    span: operator.span.to(target.span),
                    kind: ExprKind::Update {
                        op: update_op(operator.kind),
                        prefix: true,
                        target: Box::new(target),
                    },
                });
            }
            _ => return self.parse_postfix(),
        };
        let start = self.advance().span;
        let expr = self.parse_unary()?;
        Ok(Expr {
            span: start.to(expr.span),
            kind: ExprKind::Unary {
                op,
                expr: Box::new(expr),
            },
        })
    }

    fn parse_postfix(&mut self) -> Result<Expr, Diagnostic> {
        let expr = self.parse_call()?;
        if matches!(self.peek_kind(), TokenKind::PlusPlus | TokenKind::MinusMinus) {
            let operator = self.advance();
            if !is_assignable(&expr) {
                return Err(self.error(&operator, "invalid increment/decrement target"));
            }
            return Ok(Expr {
                span: expr.span.to(operator.span),
                kind: ExprKind::Update {
                    op: update_op(operator.kind),
                    prefix: false,
                    target: Box::new(expr),
                },
            });
        }
        Ok(expr)
    }

    fn parse_call(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek_kind() {
                TokenKind::LParen => {
                    let args = self.parse_arguments()?;
                    expr = Expr {
                        span: self.span_from(expr.span),
                        kind: ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                            optional: false,
                        },
                    };
                }
                TokenKind::Dot => {
                    self.advance();
                    let name = self.consume_property_name("expected property name after `.`")?;
                    expr = Expr {
                        span: self.span_from(expr.span),
                        kind: ExprKind::Member {
                            target: Box::new(expr),
                            name,
                            optional: false,
                        },
                    };
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_expression()?;
                    self.consume(TokenKind::RBracket, "expected `]` after index")?;
                    expr = Expr {
                        span: self.span_from(expr.span),
                        kind: ExprKind::Index {
                            target: Box::new(expr),
                            index: Box::new(index),
                            optional: false,
                        },
                    };
                }
                TokenKind::QuestionDot => {
                    self.advance();
                    let kind = match self.peek_kind() {
                        TokenKind::LParen => ExprKind::Call {
                            args: self.parse_arguments()?,
                            callee: Box::new(expr),
                            optional: true,
                        },
                        TokenKind::LBracket => {
                            self.advance();
                            let index = self.parse_expression()?;
                            self.consume(TokenKind::RBracket, "expected `]` after index")?;
                            ExprKind::Index {
                                target: Box::new(expr),
                                index: Box::new(index),
                                optional: true,
                            }
                        }
                        _ => ExprKind::Member {
                            name: self.consume_property_name("expected property name after `?.`")?,
                            target: Box::new(expr),
                            optional: true,
                        },
                    };
                    let start = match &kind {
                        ExprKind::Call { callee, .. } => callee.span,
                        ExprKind::Index { target, .. } | ExprKind::Member { target, .. } => {
                            target.span
                        }
                        _ => self.previous().span,
                    };
                    expr = Expr {
                        span: self.span_from(start),
                        kind,
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_arguments(&mut self) -> Result<Vec<ArrayElement>, Diagnostic> {
        self.consume(TokenKind::LParen, "expected `(` before arguments")?;
        let mut args = Vec::new();
        while !self.check(TokenKind::RParen) {
            args.push(self.parse_element()?);
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        self.consume(TokenKind::RParen, "expected `)` after arguments")?;
        Ok(args)
    }

    fn parse_element(&mut self) -> Result<ArrayElement, Diagnostic> {
        if self.matches(TokenKind::Ellipsis) {
            Ok(ArrayElement::Spread(self.parse_expression()?))
        } else {
            Ok(ArrayElement::Item(self.parse_expression()?))
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, Diagnostic> {
        let token = self.peek().clone();
        let literal = |kind| Expr {
            kind: ExprKind::Literal(kind),
            span: token.span,
        };
        match token.kind {
            TokenKind::Number => {
                self.advance();
                let value = lexer::parse_number(&token.lexeme)
                    .ok_or_else(|| self.error(&token, "invalid number literal"))?;
                Ok(literal(Literal::Number(value)))
            }
            TokenKind::String => {
                self.advance();
                Ok(literal(Literal::String(token.lexeme.clone())))
            }
            TokenKind::Template => {
                self.advance();
                let parts = parse_template(&token)?;
                Ok(Expr {
                    kind: ExprKind::Template(parts),
                    span: token.span,
                })
            }
            TokenKind::Keyword(Keyword::True) => {
                self.advance();
                Ok(literal(Literal::Bool(true)))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.advance();
                Ok(literal(Literal::Bool(false)))
            }
            TokenKind::Keyword(Keyword::Null) => {
                self.advance();
                Ok(literal(Literal::Null))
            }
            TokenKind::Keyword(Keyword::Undefined) => {
                self.advance();
                Ok(literal(Literal::Undefined))
            }
            TokenKind::Keyword(Keyword::This) => {
                self.advance();
                Ok(Expr {
                    kind: ExprKind::This,
                    span: token.span,
                })
            }
            TokenKind::Keyword(Keyword::Super) => self.parse_super(),
            TokenKind::Identifier => {
                if self.peek_kind_at(1) == TokenKind::FatArrow {
                    return self.parse_single_param_arrow(false);
                }
                self.advance();
                Ok(Expr {
                    kind: ExprKind::Variable(token.lexeme.clone()),
                    span: token.span,
                })
            }
            TokenKind::LParen => {
                if self.arrow_ahead() {
                    return self.parse_arrow(false);
                }
                self.advance();
                let inner = self.parse_expression()?;
                self.consume(TokenKind::RParen, "expected `)` after expression")?;
                Ok(inner)
            }
            TokenKind::LBracket => {
                self.advance();
                let mut elements = Vec::new();
                while !self.check(TokenKind::RBracket) {
                    elements.push(self.parse_element()?);
                    if !self.matches(TokenKind::Comma) {
                        break;
                    }
                }
                self.consume(TokenKind::RBracket, "expected `]` after array literal")?;
                Ok(Expr {
                    kind: ExprKind::Array(elements),
                    span: self.span_from(token.span),
                })
            }
            TokenKind::LBrace => self.parse_object(),
            TokenKind::Keyword(Keyword::Fn) => self.parse_function_expression(false),
            TokenKind::Keyword(Keyword::Async) => self.parse_async_expression(),
            TokenKind::Keyword(Keyword::New) => self.parse_new(),
            TokenKind::Keyword(Keyword::Match) => self.parse_match(),
            TokenKind::Keyword(Keyword::Input) => {
                self.advance();
                let mut prompt = None;
                if self.matches(TokenKind::LParen) {
                    if !self.check(TokenKind::RParen) {
                        prompt = Some(Box::new(self.parse_expression()?));
                    }
                    self.consume(TokenKind::RParen, "expected `)` after input prompt")?;
                }
                Ok(Expr {
                    kind: ExprKind::Input(prompt),
                    span: self.span_from(token.span),
                })
            }
            TokenKind::Keyword(keyword) if keyword.is_contextual() => {
                self.advance();
                Ok(Expr {
                    kind: ExprKind::Variable(token.lexeme.clone()),
                    span: token.span,
                })
            }
            TokenKind::Eof => Err(self.error(&token, "unexpected end of input")),
            _ => Err(self.error(&token, "unexpected token in expression")),
        }
    }

    fn parse_super(&mut self) -> Result<Expr, Diagnostic> {
        let start = self.advance().span;
        if self.check(TokenKind::LParen) {
            let args = self.parse_arguments()?;
            return Ok(Expr {
                kind: ExprKind::SuperCall(args),
                span: self.span_from(start),
            });
        }
        self.consume(TokenKind::Dot, "expected `(` or `.` after `super`")?;
        let name = self.consume_property_name("expected method name after `super.`")?;
        Ok(Expr {
            kind: ExprKind::SuperMember(name),
            span: self.span_from(start),
        })
    }

    fn parse_object(&mut self) -> Result<Expr, Diagnostic> {
        let start = self.advance().span;
        let mut entries = Vec::new();
        while !self.check(TokenKind::RBrace) {
            if self.matches(TokenKind::Ellipsis) {
                entries.push(ObjectEntry::Spread(self.parse_expression()?));
            } else if self.matches(TokenKind::LBracket) {
                let key = self.parse_expression()?;
                self.consume(TokenKind::RBracket, "expected `]` after computed key")?;
                self.consume(TokenKind::Colon, "expected `:` after computed key")?;
                entries.push(ObjectEntry::Property {
                    key: PropertyKey::Computed(key),
                    value: self.parse_expression()?,
                });
            } else {
                let key_token = self.peek().clone();
                let key = match key_token.kind {
                    TokenKind::String => {
                        self.advance();
                        key_token.lexeme.clone()
                    }
                    TokenKind::Number => {
                        self.advance();
                        let value = lexer::parse_number(&key_token.lexeme)
                            .ok_or_else(|| self.error(&key_token, "invalid number literal"))?;
                        crate::value::format_number(value)
                    }
                    _ => self.consume_property_name("expected property name")?,
                };
                let value = if self.matches(TokenKind::Colon) {
                    self.parse_expression()?
                } else if self.check(TokenKind::LParen) {
                    let params = self.parse_params()?;
                    let (body, _) = self.parse_block()?;
                    Expr {
                        span: self.span_from(key_token.span),
                        kind: ExprKind::Function(Rc::new(FunctionDecl {
                            name: Some(key.clone()),
                            params,
                            body: FunctionBody::Block(body),
                            is_async: false,
                            is_arrow: false,
                        })),
                    }
                } else if key_token.kind == TokenKind::Identifier {
                    Expr {
                        kind: ExprKind::Variable(key.clone()),
                        span: key_token.span,
                    }
                } else {
                    return Err(self.error_here("expected `:` after property name"));
                };
                entries.push(ObjectEntry::Property {
                    key: PropertyKey::Named(key),
                    value,
                });
            }
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        self.consume(TokenKind::RBrace, "expected `}` after object literal")?;
        Ok(Expr {
            kind: ExprKind::Object(entries),
            span: self.span_from(start),
        })
    }

    fn parse_function_expression(&mut self, is_async: bool) -> Result<Expr, Diagnostic> {
        let start = self.consume_keyword(Keyword::Fn)?.span;
        let name = if self.check(TokenKind::Identifier) {
            Some(self.advance().lexeme)
        } else {
            None
        };
        let params = self.parse_params()?;
        let (body, _) = self.parse_block()?;
        Ok(Expr {
            kind: ExprKind::Function(Rc::new(FunctionDecl {
                name,
                params,
                body: FunctionBody::Block(body),
                is_async,
                is_arrow: false,
            })),
            span: self.span_from(start),
        })
    }

    fn parse_async_expression(&mut self) -> Result<Expr, Diagnostic> {
        let start = self.advance().span;
        let mut expr = match self.peek_kind() {
            TokenKind::Keyword(Keyword::Fn) => self.parse_function_expression(true)?,
            TokenKind::Identifier if self.peek_kind_at(1) == TokenKind::FatArrow => {
                self.parse_single_param_arrow(true)?
            }
            TokenKind::LParen if self.arrow_ahead() => self.parse_arrow(true)?,
            _ => return Err(self.error_here("expected function or arrow after `async`")),
        };
        expr.span = start.to(expr.span);
        Ok(expr)
    }

    /// Decide whether the `(` under the cursor opens an arrow parameter list.
    ///
    /// The scan only moves the cursor and always restores it, so a `false`
    /// answer leaves the parser exactly where it was.
    fn arrow_ahead(&mut self) -> bool {
        let checkpoint = self.checkpoint();
        let verdict = self.scan_arrow_params();
        self.restore(checkpoint);
        verdict
    }

    fn scan_arrow_params(&mut self) -> bool {
        let mut depth = 0usize;
        let mut in_default = false;
        loop {
            let kind = self.advance().kind;
            match kind {
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => {
                    if depth == 1 && !in_default {
                        return false;
                    }
                    depth += 1;
                }
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return kind == TokenKind::RParen && self.check(TokenKind::FatArrow);
                    }
                }
                TokenKind::Eof => return false,
                _ if depth > 1 || in_default => {
                    if depth == 1 && kind == TokenKind::Comma {
                        in_default = false;
                    }
                }
                TokenKind::Identifier | TokenKind::Comma | TokenKind::Ellipsis => {}
                TokenKind::Assign => in_default = true,
                _ => return false,
            }
        }
    }

    fn parse_single_param_arrow(&mut self, is_async: bool) -> Result<Expr, Diagnostic> {
        let param = self.consume_identifier("expected parameter name")?;
        self.consume(TokenKind::FatArrow, "expected `=>`")?;
        let body = self.parse_arrow_body()?;
        Ok(Expr {
            span: self.span_from(param.span),
            kind: ExprKind::Function(Rc::new(FunctionDecl {
                name: None,
                params: vec![Param {
                    name: param.lexeme,
                    kind: ParamKind::Plain,
                    span: param.span,
                }],
                body,
                is_async,
                is_arrow: true,
            })),
        })
    }

    fn parse_arrow(&mut self, is_async: bool) -> Result<Expr, Diagnostic> {
        let start = self.peek_span();
        let params = self.parse_params()?;
        self.consume(TokenKind::FatArrow, "expected `=>` after arrow parameters")?;
        let body = self.parse_arrow_body()?;
        Ok(Expr {
            span: self.span_from(start),
            kind: ExprKind::Function(Rc::new(FunctionDecl {
                name: None,
                params,
                body,
                is_async,
                is_arrow: true,
            })),
        })
    }

    fn parse_arrow_body(&mut self) -> Result<FunctionBody, Diagnostic> {
        if self.check(TokenKind::LBrace) {
            Ok(FunctionBody::Block(self.parse_block()?.0))
        } else {
            Ok(FunctionBody::Expr(Box::new(self.parse_expression()?)))
        }
    }

    fn parse_new(&mut self) -> Result<Expr, Diagnostic> {
        let start = self.advance().span;
        let name = self.consume_identifier("expected class name after `new`")?;
        let mut class = Expr {
            kind: ExprKind::Variable(name.lexeme),
            span: name.span,
        };
        while self.matches(TokenKind::Dot) {
            let member = self.consume_property_name("expected property name after `.`")?;
            class = Expr {
                span: self.span_from(class.span),
                kind: ExprKind::Member {
                    target: Box::new(class),
                    name: member,
                    optional: false,
                },
            };
        }
        let args = if self.check(TokenKind::LParen) {
            self.parse_arguments()?
        } else {
            Vec::new()
        };
        Ok(Expr {
            kind: ExprKind::New {
                class: Box::new(class),
                args,
            },
            span: self.span_from(start),
        })
    }

    fn parse_match(&mut self) -> Result<Expr, Diagnostic> {
        let start = self.advance().span;
        let subject = self.parse_expression()?;
        self.consume(TokenKind::LBrace, "expected `{` after match subject")?;
        let mut arms = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.is_at_end() {
            let arm_start = self.peek_span();
            let pattern = self.parse_pattern()?;
            let guard = if self.matches_keyword(Keyword::If) {
                Some(self.parse_expression()?)
            } else {
                None
            };
            self.consume(TokenKind::FatArrow, "expected `=>` after match pattern")?;
            let body = if self.check(TokenKind::LBrace) {
                FunctionBody::Block(self.parse_block()?.0)
            } else {
                FunctionBody::Expr(Box::new(self.parse_expression()?))
            };
            arms.push(MatchArm {
                pattern,
                guard,
                body,
                span: self.span_from(arm_start),
            });
            while self.matches(TokenKind::Comma) || self.matches(TokenKind::Semicolon) {}
        }
        self.consume(TokenKind::RBrace, "expected `}` after match arms")?;
        Ok(Expr {
            kind: ExprKind::Match {
                subject: Box::new(subject),
                arms,
            },
            span: self.span_from(start),
        })
    }

    /// Patterns are a separate grammar; `|` here means alternation.
    fn parse_pattern(&mut self) -> Result<Pattern, Diagnostic> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || self.parse_pattern_inner())
    }

    fn parse_pattern_inner(&mut self) -> Result<Pattern, Diagnostic> {
        let first = self.parse_pattern_primary()?;
        if !self.check(TokenKind::Pipe) {
            return Ok(first);
        }
        let mut alternatives = vec![first];
        while self.matches(TokenKind::Pipe) {
            alternatives.push(self.parse_pattern_primary()?);
        }
        Ok(Pattern::Or(alternatives))
    }

    fn parse_pattern_primary(&mut self) -> Result<Pattern, Diagnostic> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Identifier => {
                self.advance();
                if token.lexeme == "_" {
                    Ok(Pattern::Wildcard)
                } else {
                    Ok(Pattern::Binding(token.lexeme))
                }
            }
            TokenKind::Keyword(Keyword::Is) => {
                self.advance();
                let type_name = self.consume_type_name()?;
                Ok(Pattern::Type(type_name.lexeme))
            }
            TokenKind::LBracket => {
                self.advance();
                let mut elements = Vec::new();
                let mut rest = None;
                while !self.check(TokenKind::RBracket) {
                    if self.matches(TokenKind::Ellipsis) {
                        rest = Some(self.consume_identifier("expected name after `...`")?.lexeme);
                        break;
                    }
                    elements.push(self.parse_pattern()?);
                    if !self.matches(TokenKind::Comma) {
                        break;
                    }
                }
                self.consume(TokenKind::RBracket, "expected `]` to close array pattern")?;
                Ok(Pattern::Array { elements, rest })
            }
            TokenKind::LBrace => {
                self.advance();
                let mut fields = Vec::new();
                let mut rest = None;
                while !self.check(TokenKind::RBrace) {
                    if self.matches(TokenKind::Ellipsis) {
                        rest = Some(self.consume_identifier("expected name after `...`")?.lexeme);
                        break;
                    }
                    let key = self.consume_property_name("expected field name in pattern")?;
                    let pattern = if self.matches(TokenKind::Colon) {
                        self.parse_pattern()?
                    } else {
                        Pattern::Binding(key.clone())
                    };
                    fields.push((key, pattern));
                    if !self.matches(TokenKind::Comma) {
                        break;
                    }
                }
                self.consume(TokenKind::RBrace, "expected `}` to close object pattern")?;
                Ok(Pattern::Object { fields, rest })
            }
            _ => {
                let start = self.parse_pattern_literal()?;
                let inclusive = match self.peek_kind() {
                    TokenKind::DotDot => false,
                    TokenKind::DotDotEqual => true,
                    _ => return Ok(Pattern::Literal(start)),
                };
                self.advance();
                let end = self.parse_pattern_literal()?;
                Ok(Pattern::Range {
                    start,
                    end,
                    inclusive,
                })
            }
        }
    }

    fn parse_pattern_literal(&mut self) -> Result<Literal, Diagnostic> {
        let negative = self.matches(TokenKind::Minus);
        let token = self.advance();
        let literal = match token.kind {
            TokenKind::Number => {
                let value = lexer::parse_number(&token.lexeme)
                    .ok_or_else(|| self.error(&token, "invalid number literal"))?;
                Literal::Number(if negative { -value } else { value })
            }
            _ if negative => return Err(self.error(&token, "expected number after `-` in pattern")),
            TokenKind::String => Literal::String(token.lexeme),
            TokenKind::Keyword(Keyword::True) => Literal::Bool(true),
            TokenKind::Keyword(Keyword::False) => Literal::Bool(false),
            TokenKind::Keyword(Keyword::Null) => Literal::Null,
            TokenKind::Keyword(Keyword::Undefined) => Literal::Undefined,
            _ => return Err(self.error(&token, "unexpected token in pattern")),
        };
        Ok(literal)
    }

    fn skip_semicolons(&mut self) {
        while self.matches(TokenKind::Semicolon) {}
    }

    fn checkpoint(&self) -> usize {
        self.current
    }

    fn restore(&mut self, checkpoint: usize) {
        self.current = checkpoint;
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn matches_keyword(&mut self, keyword: Keyword) -> bool {
        self.matches(TokenKind::Keyword(keyword))
    }

    fn consume(&mut self, kind: TokenKind, message: &str) -> Result<Token, Diagnostic> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error_here(message))
        }
    }

    fn consume_keyword(&mut self, keyword: Keyword) -> Result<Token, Diagnostic> {
        self.consume(
            TokenKind::Keyword(keyword),
            &format!("expected keyword `{}`", keyword.as_str()),
        )
    }

    fn consume_identifier(&mut self, message: &str) -> Result<Token, Diagnostic> {
        match self.peek_kind() {
            TokenKind::Identifier => Ok(self.advance()),
            TokenKind::Keyword(keyword) if keyword.is_contextual() => Ok(self.advance()),
            _ => Err(self.error_here(message)),
        }
    }

    /// Property names accept any keyword, e.g. `obj.default` or `{ from: 1 }`.
    fn consume_property_name(&mut self, message: &str) -> Result<String, Diagnostic> {
        match self.peek_kind() {
            TokenKind::Identifier | TokenKind::Keyword(_) => Ok(self.advance().lexeme),
            _ => Err(self.error_here(message)),
        }
    }

    fn consume_type_name(&mut self) -> Result<Token, Diagnostic> {
        match self.peek_kind() {
            TokenKind::Identifier
            | TokenKind::Keyword(Keyword::Null | Keyword::Undefined | Keyword::Fn) => {
                Ok(self.advance())
            }
            _ => Err(self.error_here("expected type name after `is`")),
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if !self.is_at_end() {
            self.current += 1;
        }
        token
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current.saturating_sub(1)]
    }

    fn peek(&self) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[self.current.min(last)]
    }

    fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    fn peek_kind_at(&self, offset: usize) -> TokenKind {
        self.tokens
            .get(self.current + offset)
            .map(|token| token.kind)
            .unwrap_or(TokenKind::Eof)
    }

    fn peek_span(&self) -> SourceSpan {
        self.peek().span
    }

    /// Span from `start` through the most recently consumed token.
    fn span_from(&self, start: SourceSpan) -> SourceSpan {
        start.to(self.previous().span)
    }

    fn is_at_end(&self) -> bool {
        self.peek_kind() == TokenKind::Eof
    }

    fn error(&self, token: &Token, message: &str) -> Diagnostic {
        Diagnostic::new(DiagnosticKind::Parser, message)
            .with_span(token.span)
            .with_note(format!("found {}", describe(token)))
    }

    fn error_here(&self, message: &str) -> Diagnostic {
        self.error(self.peek(), message)
    }
}

fn describe(token: &Token) -> String {
    match token.kind {
        TokenKind::Eof => "end of input".to_string(),
        TokenKind::Identifier => format!("identifier `{}`", token.lexeme),
        TokenKind::Keyword(keyword) => format!("keyword `{}`", keyword.as_str()),
        TokenKind::String => "string literal".to_string(),
        TokenKind::Template => "template literal".to_string(),
        kind => format!("{kind:?} `{}`", token.lexeme),
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr {
        span: left.span.to(right.span),
        kind: ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
    }
}

fn logical(op: LogicalOp, left: Expr, right: Expr) -> Expr {
    Expr {
        span: left.span.to(right.span),
        kind: ExprKind::Logical {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
    }
}

fn update_op(kind: TokenKind) -> UpdateOp {
    if kind == TokenKind::PlusPlus {
        UpdateOp::Increment
    } else {
        UpdateOp::Decrement
    }
}

fn is_assignable(expr: &Expr) -> bool {
    matches!(
        expr.kind,
        ExprKind::Variable(_)
            | ExprKind::Member {
                optional: false,
                ..
            }
            | ExprKind::Index {
                optional: false,
                ..
            }
    )
}

/// Split a template body into text and `${...}` segments, parsing each
/// segment with a fresh lexer and parser.
fn parse_template(token: &Token) -> Result<Vec<TemplatePart>, Diagnostic> {
    let raw = token.lexeme.as_str();
    let mut parts = Vec::new();
    let mut text_start = 0;
    let mut chars = raw.char_indices().peekable();
    while let Some((idx, ch)) = chars.next() {
        match ch {
            '\\' => {
                chars.next();
            }
            '$' if matches!(chars.peek(), Some((_, '{'))) => {
                chars.next();
                if idx > text_start {
                    let text = lexer::unescape_template(&raw[text_start..idx])
                        .map_err(|diag| relocate(diag, token))?;
                    parts.push(TemplatePart::Text(text));
                }
                let expr_start = idx + 2;
                let mut depth = 1usize;
                let mut expr_end = raw.len();
                let mut quote: Option<char> = None;
                while let Some((pos, inner)) = chars.next() {
                    match (quote, inner) {
                        (Some(_), '\\') => {
                            chars.next();
                        }
                        (Some(q), c) if c == q => quote = None,
                        (Some(_), _) => {}
                        (None, '"' | '\'') => quote = Some(inner),
                        (None, '{') => depth += 1,
                        (None, '}') => {
                            depth -= 1;
                            if depth == 0 {
                                expr_end = pos;
                                break;
                            }
                        }
                        _ => {}
                    }
                }
                let source = &raw[expr_start..expr_end];
                parts.push(TemplatePart::Expr(parse_embedded(source, token)?));
                text_start = expr_end + 1;
            }
            _ => {}
        }
    }
    if text_start < raw.len() {
        let text =
            lexer::unescape_template(&raw[text_start..]).map_err(|diag| relocate(diag, token))?;
        parts.push(TemplatePart::Text(text));
    }
    Ok(parts)
}

fn parse_embedded(source: &str, token: &Token) -> Result<Expr, Diagnostic> {
    let tokens = lexer::tokenize(source).map_err(|diag| relocate(diag, token))?;
    let mut parser = Parser::new(tokens);
    if parser.is_at_end() {
        return Err(Diagnostic::new(DiagnosticKind::Parser, "empty template interpolation")
            .with_span(token.span));
    }
    let expr = parser
        .parse_expression()
        .map_err(|diag| relocate(diag, token))?;
    if !parser.is_at_end() {
        return Err(relocate(
            parser.error_here("unexpected token in template interpolation"),
            token,
        ));
    }
    Ok(expr)
}

/// Re-anchor a diagnostic from an interpolation onto the template token.
fn relocate(diag: Diagnostic, token: &Token) -> Diagnostic {
    diag.with_span(token.span)
        .with_note("inside template literal interpolation")
}
