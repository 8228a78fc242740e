use std::{
    cell::RefCell,
    fs, mem,
    path::{Path, PathBuf},
    rc::Rc,
};

use indexmap::IndexMap;
use log::{debug, trace};

use crate::{
    ast::{
        ArrayElement, AssignOp, BindingTarget, ClassDecl, ClassMember, Expr, ExprKind,
        FunctionBody, FunctionDecl, ImportClause, Literal, LogicalOp, MatchArm, ObjectEntry,
        ParamKind, Pattern, Program, PropertyKey, Stmt, StmtKind, SwitchCase, TemplatePart,
        UpdateOp,
    },
    diagnostics::{Diagnostic, DiagnosticKind, LumenError, Result, SourceSpan},
    environment::{Environment, EnvironmentRef},
    host::{Host, StdHost},
    operators, parser,
    stdlib::{self, BuiltinRegistry},
    value::{
        format_number, ClassValue, InstanceValue, PendingState, PropertyDefault, UserFunction,
        Value, ValueKind,
    },
};

pub const DEFAULT_MAX_CALL_DEPTH: usize = 512;

/// Longest array a range expression may materialize, and the furthest an
/// index write may grow an array past its end.
const MAX_RANGE_LEN: f64 = 10_000_000.0;

/// Remaining stack below which evaluation moves onto a fresh segment.
const STACK_RED_ZONE: usize = 128 * 1024;
const STACK_GROW_SIZE: usize = 4 * 1024 * 1024;

/// Settings for one interpreter instance.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Directory that relative `import` paths resolve against.
    pub base_dir: PathBuf,
    pub max_call_depth: usize,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

impl ExecutionContext {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }
}

/// Outcome of executing a statement.
#[derive(Debug, Clone)]
pub enum Completion {
    Normal(Value),
    Return(Value),
    Break,
    Continue,
    Thrown { value: Value, span: SourceSpan },
}

/// A resolved assignment target; sub-expressions are evaluated once.
enum Place {
    Variable(String),
    Member(Value, String),
    Index(Value, Value),
}

pub struct Interpreter {
    builtins: EnvironmentRef,
    globals: EnvironmentRef,
    env: EnvironmentRef,
    context: ExecutionContext,
    host: Box<dyn Host>,
    depth: usize,
    modules: IndexMap<PathBuf, Value>,
    loading: Vec<PathBuf>,
    /// `(local, exported)` names collected while a module body runs.
    exports: Option<Vec<(String, String)>>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        let builtins = Environment::new();
        stdlib::registry().install(&builtins);
        let globals = Environment::with_parent(Rc::clone(&builtins));
        debug!("interpreter created with default builtins");
        Self {
            builtins,
            env: Rc::clone(&globals),
            globals,
            context: ExecutionContext::default(),
            host: Box::new(StdHost),
            depth: 0,
            modules: IndexMap::new(),
            loading: Vec::new(),
            exports: None,
        }
    }

    /// Replace the builtin table. Globals defined so far are discarded.
    pub fn with_builtins(mut self, registry: BuiltinRegistry) -> Self {
        let builtins = Environment::new();
        registry.install(&builtins);
        debug!("installing {} builtins", registry.len());
        self.globals = Environment::with_parent(Rc::clone(&builtins));
        self.env = Rc::clone(&self.globals);
        self.builtins = builtins;
        self
    }

    pub fn with_context(mut self, context: ExecutionContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_host(mut self, host: impl Host + 'static) -> Self {
        self.host = Box::new(host);
        self
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    pub fn define_global(&mut self, name: impl Into<String>, value: Value) {
        self.globals.borrow_mut().define(name, value, false);
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        Environment::lookup(&self.globals, name)
    }

    pub fn eval_source(&mut self, source: &str) -> Result<Value> {
        let program = parser::parse_source(source)?;
        self.run(&program)
    }

    /// Execute top-level statements in order and return the last value.
    pub fn run(&mut self, program: &Program) -> Result<Value> {
        let mut last_value = Value::undefined();
        for stmt in &program.items {
            match self.execute(stmt)? {
                Completion::Normal(value) => last_value = value,
                Completion::Return(value) => return Ok(value),
                Completion::Break => return Err(control_flow_error("break", stmt.span)),
                Completion::Continue => return Err(control_flow_error("continue", stmt.span)),
                Completion::Thrown { value, span } => {
                    debug!("uncaught throw at line {}: {value}", span.line);
                    return Err(LumenError::Thrown {
                        value,
                        span: Some(span),
                    });
                }
            }
        }
        Ok(last_value)
    }

    fn execute(&mut self, stmt: &Stmt) -> Result<Completion> {
        let outcome = stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || {
            self.execute_statement(stmt)
        });
        match outcome {
            Err(LumenError::Thrown { value, span }) => Ok(Completion::Thrown {
                value,
                span: span.unwrap_or(stmt.span),
            }),
            other => other,
        }
    }

    fn execute_statement(&mut self, stmt: &Stmt) -> Result<Completion> {
        match &stmt.kind {
            StmtKind::Let {
                target,
                value,
                constant,
            } => {
                let value = match value {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::undefined(),
                };
                self.bind_target(target, value, !constant, stmt.span)?;
                Ok(Completion::Normal(Value::undefined()))
            }
            StmtKind::Assign { target, op, value } => {
                let assigned = self.assign(target, *op, value)?;
                Ok(Completion::Normal(assigned))
            }
            StmtKind::Function(decl) => {
                let function = self.closure(decl);
                let name = decl.name.clone().unwrap_or_default();
                self.env.borrow_mut().define(name, function, false);
                Ok(Completion::Normal(Value::undefined()))
            }
            StmtKind::Class(decl) => {
                self.declare_class(decl, stmt.span)?;
                Ok(Completion::Normal(Value::undefined()))
            }
            StmtKind::Expr(expr) => Ok(Completion::Normal(self.evaluate(expr)?)),
            StmtKind::Print(values) => {
                let mut pieces = Vec::with_capacity(values.len());
                for expr in values {
                    pieces.push(self.evaluate(expr)?.to_string());
                }
                self.host.print(&pieces.join(" "))?;
                Ok(Completion::Normal(Value::undefined()))
            }
            StmtKind::Block(items) => self.execute_block(items),
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(condition)?.is_truthy() {
                    self.execute_block(then_branch)
                } else if let Some(branch) = else_branch {
                    self.execute_block(branch)
                } else {
                    Ok(Completion::Normal(Value::undefined()))
                }
            }
            StmtKind::Switch { subject, cases } => self.execute_switch(subject, cases),
            StmtKind::Loop { body } => {
                loop {
                    if let Some(exit) = loop_exit(self.execute_block(body)?) {
                        return Ok(exit);
                    }
                }
            }
            StmtKind::LoopRange {
                binding,
                from,
                to,
                step,
                body,
            } => self.execute_loop_range(binding, from, to, step.as_ref(), body),
            StmtKind::ForIn {
                binding,
                iterable,
                body,
            } => self.execute_for(binding, iterable, body, false),
            StmtKind::ForOf {
                binding,
                iterable,
                body,
            } => self.execute_for(binding, iterable, body, true),
            StmtKind::While { condition, body } => {
                while self.evaluate(condition)?.is_truthy() {
                    if let Some(exit) = loop_exit(self.execute_block(body)?) {
                        return Ok(exit);
                    }
                }
                Ok(Completion::Normal(Value::undefined()))
            }
            StmtKind::DoWhile { body, condition } => {
                loop {
                    if let Some(exit) = loop_exit(self.execute_block(body)?) {
                        return Ok(exit);
                    }
                    if !self.evaluate(condition)?.is_truthy() {
                        break;
                    }
                }
                Ok(Completion::Normal(Value::undefined()))
            }
            StmtKind::Try {
                body,
                catch_binding,
                catch_body,
                finally_body,
            } => self.execute_try(
                body,
                catch_binding.as_deref(),
                catch_body.as_deref(),
                finally_body.as_deref(),
            ),
            StmtKind::Throw(expr) => Ok(Completion::Thrown {
                value: self.evaluate(expr)?,
                span: stmt.span,
            }),
            StmtKind::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::null(),
                };
                Ok(Completion::Return(value))
            }
            StmtKind::Break => Ok(Completion::Break),
            StmtKind::Continue => Ok(Completion::Continue),
            StmtKind::Import { clause, source } => {
                self.import(clause, source, stmt.span)?;
                Ok(Completion::Normal(Value::undefined()))
            }
            StmtKind::Export(declaration) => {
                let completion = self.execute_statement(declaration)?;
                if let Some(exports) = self.exports.as_mut() {
                    exports.extend(
                        declaration
                            .declared_names()
                            .into_iter()
                            .map(|name| (name.clone(), name)),
                    );
                }
                Ok(completion)
            }
            StmtKind::ExportNames(names) => {
                for (local, _) in names {
                    Environment::get(&self.env, local, stmt.span)?;
                }
                if let Some(exports) = self.exports.as_mut() {
                    exports.extend(names.iter().cloned());
                }
                Ok(Completion::Normal(Value::undefined()))
            }
        }
    }

    fn execute_block(&mut self, items: &[Stmt]) -> Result<Completion> {
        let scope = Environment::with_parent(Rc::clone(&self.env));
        self.execute_in(scope, items)
    }

    /// Run `items` with `env` as the current scope, restoring the previous
    /// scope on every exit path.
    fn execute_in(&mut self, env: EnvironmentRef, items: &[Stmt]) -> Result<Completion> {
        let previous = mem::replace(&mut self.env, env);
        let result = self.execute_items(items);
        self.env = previous;
        result
    }

    fn execute_items(&mut self, items: &[Stmt]) -> Result<Completion> {
        let mut last_value = Value::undefined();
        for stmt in items {
            match self.execute(stmt)? {
                Completion::Normal(value) => last_value = value,
                other => return Ok(other),
            }
        }
        Ok(Completion::Normal(last_value))
    }

    fn execute_switch(&mut self, subject: &Expr, cases: &[SwitchCase]) -> Result<Completion> {
        let value = self.evaluate(subject)?;
        let mut start = None;
        'cases: for (idx, case) in cases.iter().enumerate() {
            let Some(tests) = &case.tests else {
                continue;
            };
            for test in tests {
                if self.evaluate(test)?.strict_equals(&value) {
                    start = Some(idx);
                    break 'cases;
                }
            }
        }
        let start = start.or_else(|| cases.iter().position(|case| case.tests.is_none()));
        let Some(start) = start else {
            return Ok(Completion::Normal(Value::undefined()));
        };
        let scope = Environment::with_parent(Rc::clone(&self.env));
        let previous = mem::replace(&mut self.env, scope);
        let mut outcome = Ok(Completion::Normal(Value::undefined()));
        for case in &cases[start..] {
            match self.execute_items(&case.body) {
                Ok(Completion::Normal(_)) => {}
                Ok(Completion::Break) => break,
                other => {
                    outcome = other;
                    break;
                }
            }
        }
        self.env = previous;
        outcome
    }

    fn execute_loop_range(
        &mut self,
        binding: &str,
        from: &Expr,
        to: &Expr,
        step: Option<&Expr>,
        body: &[Stmt],
    ) -> Result<Completion> {
        let start = self.evaluate(from)?.expect_number("loop `from`", from.span)?;
        let end = self.evaluate(to)?.expect_number("loop `to`", to.span)?;
        let step = match step {
            Some(expr) => self.evaluate(expr)?.expect_number("loop `step`", expr.span)?,
            None if start > end => -1.0,
            None => 1.0,
        };
        if step == 0.0 || step.is_nan() {
            return Err(runtime_error("loop step must be non-zero", from.span));
        }
        let mut current = start;
        while (step > 0.0 && current <= end) || (step < 0.0 && current >= end) {
            let scope = Environment::with_parent(Rc::clone(&self.env));
            scope
                .borrow_mut()
                .define(binding, Value::number(current), true);
            if let Some(exit) = loop_exit(self.execute_in(scope, body)?) {
                return Ok(exit);
            }
            current += step;
        }
        Ok(Completion::Normal(Value::undefined()))
    }

    fn execute_for(
        &mut self,
        binding: &str,
        iterable: &Expr,
        body: &[Stmt],
        of: bool,
    ) -> Result<Completion> {
        let value = self.evaluate(iterable)?;
        for item in iteration_items(&value, of, iterable.span)? {
            let scope = Environment::with_parent(Rc::clone(&self.env));
            scope.borrow_mut().define(binding, item, true);
            if let Some(exit) = loop_exit(self.execute_in(scope, body)?) {
                return Ok(exit);
            }
        }
        Ok(Completion::Normal(Value::undefined()))
    }

    fn execute_try(
        &mut self,
        body: &[Stmt],
        catch_binding: Option<&str>,
        catch_body: Option<&[Stmt]>,
        finally_body: Option<&[Stmt]>,
    ) -> Result<Completion> {
        let outcome = match (self.execute_block(body), catch_body) {
            (Ok(Completion::Thrown { value, .. }), Some(handler)) => {
                self.execute_catch(catch_binding, handler, value)
            }
            (Err(LumenError::Diagnostic(diag)), Some(handler)) if diag.is_catchable() => {
                trace!("catching {:?} diagnostic: {}", diag.kind, diag.message);
                self.execute_catch(catch_binding, handler, error_object(&diag))
            }
            (other, _) => other,
        };
        if let Some(finally_body) = finally_body {
            match self.execute_block(finally_body)? {
                Completion::Normal(_) => {}
                overriding => return Ok(overriding),
            }
        }
        outcome
    }

    fn execute_catch(
        &mut self,
        binding: Option<&str>,
        handler: &[Stmt],
        value: Value,
    ) -> Result<Completion> {
        let scope = Environment::with_parent(Rc::clone(&self.env));
        if let Some(name) = binding {
            scope.borrow_mut().define(name, value, true);
        }
        self.execute_in(scope, handler)
    }

    fn evaluate(&mut self, expr: &Expr) -> Result<Value> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || self.evaluate_inner(expr))
    }

    fn evaluate_inner(&mut self, expr: &Expr) -> Result<Value> {
        match &expr.kind {
            ExprKind::Literal(literal) => Ok(literal_value(literal)),
            ExprKind::Template(parts) => {
                let mut text = String::new();
                for part in parts {
                    match part {
                        TemplatePart::Text(chunk) => text.push_str(chunk),
                        TemplatePart::Expr(inner) => {
                            text.push_str(&self.evaluate(inner)?.to_string())
                        }
                    }
                }
                Ok(Value::string(text))
            }
            ExprKind::Variable(name) => Environment::get(&self.env, name, expr.span),
            ExprKind::This => {
                Ok(Environment::lookup(&self.env, "this").unwrap_or_else(Value::undefined))
            }
            ExprKind::Array(elements) => Ok(Value::array(self.evaluate_elements(elements)?)),
            ExprKind::Object(entries) => self.evaluate_object(entries),
            ExprKind::Binary { op, left, right } => {
                let left_value = self.evaluate(left)?;
                let right_value = self.evaluate(right)?;
                operators::binary(*op, &left_value, &right_value, expr.span)
            }
            ExprKind::Logical { op, left, right } => {
                let left_value = self.evaluate(left)?;
                let short_circuit = match op {
                    LogicalOp::And => !left_value.is_truthy(),
                    LogicalOp::Or => left_value.is_truthy(),
                    LogicalOp::Nullish => !left_value.is_nullish(),
                };
                if short_circuit {
                    Ok(left_value)
                } else {
                    self.evaluate(right)
                }
            }
            ExprKind::Unary { op, expr: operand } => {
                let value = self.evaluate(operand)?;
                operators::unary(*op, &value, expr.span)
            }
            ExprKind::Update { op, prefix, target } => {
                let place = self.resolve_place(target)?;
                let old = self
                    .read_place(&place, target.span)?
                    .expect_number("increment/decrement", target.span)?;
                let new = match op {
                    UpdateOp::Increment => old + 1.0,
                    UpdateOp::Decrement => old - 1.0,
                };
                self.write_place(place, Value::number(new), target.span)?;
                Ok(Value::number(if *prefix { new } else { old }))
            }
            ExprKind::Ternary {
                condition,
                then_expr,
                else_expr,
            } => {
                if self.evaluate(condition)?.is_truthy() {
                    self.evaluate(then_expr)
                } else {
                    self.evaluate(else_expr)
                }
            }
            ExprKind::Pipe { value, function } => self.evaluate_pipe(value, function, expr.span),
            ExprKind::Range {
                start,
                end,
                inclusive,
            } => {
                let start = self.evaluate(start)?.expect_number("range", expr.span)?;
                let end = self.evaluate(end)?.expect_number("range", expr.span)?;
                range_values(start, end, *inclusive, expr.span)
            }
            ExprKind::Call {
                callee,
                args,
                optional,
            } => {
                let callee_value = self.evaluate(callee)?;
                if *optional && callee_value.is_nullish() {
                    return Ok(Value::undefined());
                }
                let args = self.evaluate_elements(args)?;
                self.call_value(&callee_value, args, expr.span)
            }
            ExprKind::New { class, args } => {
                let class_value = self.evaluate(class)?;
                let args = self.evaluate_elements(args)?;
                match class_value.kind() {
                    ValueKind::Class(class) => self.instantiate(class, args, expr.span),
                    _ => Err(runtime_error(
                        format!("`new` expects a class, found {}", class_value.type_name()),
                        class.span,
                    )),
                }
            }
            ExprKind::SuperCall(args) => {
                let args = self.evaluate_elements(args)?;
                let (parent, this) = self.super_context(expr.span)?;
                if let Some(constructor) = parent.find_method("constructor") {
                    self.call_function(&constructor.with_this(this), args, expr.span)?;
                }
                Ok(Value::undefined())
            }
            ExprKind::SuperMember(name) => {
                let (parent, this) = self.super_context(expr.span)?;
                match parent.find_method(name) {
                    Some(method) => Ok(method.bind(this)),
                    None => Err(runtime_error(
                        format!("parent class `{}` has no method `{name}`", parent.name),
                        expr.span,
                    )),
                }
            }
            ExprKind::Await(inner) => {
                let value = self.evaluate(inner)?;
                self.await_value(value, expr.span)
            }
            ExprKind::Member {
                target,
                name,
                optional,
            } => {
                let target_value = self.evaluate(target)?;
                if *optional && target_value.is_nullish() {
                    return Ok(Value::undefined());
                }
                get_member(&target_value, name, expr.span)
            }
            ExprKind::Index {
                target,
                index,
                optional,
            } => {
                let target_value = self.evaluate(target)?;
                if *optional && target_value.is_nullish() {
                    return Ok(Value::undefined());
                }
                let index_value = self.evaluate(index)?;
                get_index(&target_value, &index_value, expr.span)
            }
            ExprKind::Function(decl) => Ok(self.closure(decl)),
            ExprKind::Match { subject, arms } => self.evaluate_match(subject, arms, expr.span),
            ExprKind::TypeCheck {
                expr: inner,
                type_name,
            } => {
                let value = self.evaluate(inner)?;
                Ok(Value::bool(self.is_type(&value, type_name)))
            }
            ExprKind::Input(prompt) => {
                let prompt = match prompt {
                    Some(expr) => Some(self.evaluate(expr)?.to_string()),
                    None => None,
                };
                match self.host.input(prompt.as_deref())? {
                    Some(line) => Ok(Value::string(line)),
                    None => Ok(Value::null()),
                }
            }
        }
    }

    fn evaluate_in(&mut self, env: EnvironmentRef, expr: &Expr) -> Result<Value> {
        let previous = mem::replace(&mut self.env, env);
        let result = self.evaluate(expr);
        self.env = previous;
        result
    }

    /// Evaluate array elements or call arguments, flattening spreads.
    fn evaluate_elements(&mut self, elements: &[ArrayElement]) -> Result<Vec<Value>> {
        let mut values = Vec::with_capacity(elements.len());
        for element in elements {
            match element {
                ArrayElement::Item(expr) => values.push(self.evaluate(expr)?),
                ArrayElement::Spread(expr) => {
                    let spread = self.evaluate(expr)?;
                    match spread.kind() {
                        ValueKind::Array(items) => values.extend(items.borrow().iter().cloned()),
                        ValueKind::String(text) => {
                            values.extend(text.chars().map(|ch| Value::string(ch.to_string())))
                        }
                        _ => {
                            return Err(runtime_error(
                                format!("cannot spread value of type {}", spread.type_name()),
                                expr.span,
                            ))
                        }
                    }
                }
            }
        }
        Ok(values)
    }

    fn evaluate_object(&mut self, entries: &[ObjectEntry]) -> Result<Value> {
        let mut map = IndexMap::new();
        for entry in entries {
            match entry {
                ObjectEntry::Property { key, value } => {
                    let key = match key {
                        PropertyKey::Named(name) => name.clone(),
                        PropertyKey::Computed(expr) => property_key(&self.evaluate(expr)?),
                    };
                    let value = self.evaluate(value)?;
                    map.insert(key, value);
                }
                ObjectEntry::Spread(expr) => {
                    let spread = self.evaluate(expr)?;
                    match spread.kind() {
                        ValueKind::Object(source) => map.extend(
                            source
                                .borrow()
                                .iter()
                                .map(|(key, value)| (key.clone(), value.clone())),
                        ),
                        ValueKind::Instance(instance) => map.extend(
                            instance
                                .props
                                .borrow()
                                .iter()
                                .map(|(key, value)| (key.clone(), value.clone())),
                        ),
                        ValueKind::Null | ValueKind::Undefined => {}
                        _ => {
                            return Err(runtime_error(
                                format!(
                                    "cannot spread value of type {} into an object",
                                    spread.type_name()
                                ),
                                expr.span,
                            ))
                        }
                    }
                }
            }
        }
        Ok(Value::object(map))
    }

    /// `x |> f` calls `f(x)`; `x |> f(a)` calls `f(x, a)`.
    fn evaluate_pipe(&mut self, value: &Expr, function: &Expr, span: SourceSpan) -> Result<Value> {
        let piped = self.evaluate(value)?;
        if let ExprKind::Call { callee, args, .. } = &function.kind {
            let callee_value = self.evaluate(callee)?;
            let mut call_args = vec![piped];
            call_args.extend(self.evaluate_elements(args)?);
            return self.call_value(&callee_value, call_args, span);
        }
        let callee_value = self.evaluate(function)?;
        self.call_value(&callee_value, vec![piped], span)
    }

    fn evaluate_match(&mut self, subject: &Expr, arms: &[MatchArm], span: SourceSpan) -> Result<Value> {
        let value = self.evaluate(subject)?;
        for arm in arms {
            let scope = Environment::with_parent(Rc::clone(&self.env));
            if !self.match_pattern(&arm.pattern, &value, &scope) {
                continue;
            }
            if let Some(guard) = &arm.guard {
                if !self.evaluate_in(Rc::clone(&scope), guard)?.is_truthy() {
                    continue;
                }
            }
            return match &arm.body {
                FunctionBody::Expr(body) => self.evaluate_in(scope, body),
                FunctionBody::Block(items) => match self.execute_in(scope, items)? {
                    Completion::Normal(value) | Completion::Return(value) => Ok(value),
                    Completion::Thrown { value, span } => Err(LumenError::thrown(value, span)),
                    Completion::Break => Err(control_flow_error("break", arm.span)),
                    Completion::Continue => Err(control_flow_error("continue", arm.span)),
                },
            };
        }
        Err(LumenError::from(
            Diagnostic::new(
                DiagnosticKind::Match,
                format!("no match arm matched value `{value:?}`"),
            )
            .with_span(span),
        ))
    }

    fn match_pattern(&self, pattern: &Pattern, value: &Value, env: &EnvironmentRef) -> bool {
        match pattern {
            Pattern::Wildcard => true,
            Pattern::Literal(literal) => literal_value(literal).strict_equals(value),
            Pattern::Binding(name) => {
                env.borrow_mut().define(name.as_str(), value.clone(), true);
                true
            }
            Pattern::Array { elements, rest } => {
                let ValueKind::Array(items) = value.kind() else {
                    return false;
                };
                let items = items.borrow().clone();
                let length_ok = match rest {
                    Some(_) => items.len() >= elements.len(),
                    None => items.len() == elements.len(),
                };
                if !length_ok {
                    return false;
                }
                for (pattern, item) in elements.iter().zip(&items) {
                    if !self.match_pattern(pattern, item, env) {
                        return false;
                    }
                }
                if let Some(name) = rest {
                    let remaining = items[elements.len()..].to_vec();
                    env.borrow_mut()
                        .define(name.as_str(), Value::array(remaining), true);
                }
                true
            }
            Pattern::Object { fields, rest } => {
                let Some(props) = property_snapshot(value) else {
                    return false;
                };
                for (key, pattern) in fields {
                    match props.get(key) {
                        Some(field) if self.match_pattern(pattern, field, env) => {}
                        _ => return false,
                    }
                }
                if let Some(name) = rest {
                    let remaining = props
                        .into_iter()
                        .filter(|(key, _)| !fields.iter().any(|(field, _)| field == key))
                        .collect();
                    env.borrow_mut()
                        .define(name.as_str(), Value::object(remaining), true);
                }
                true
            }
            Pattern::Range {
                start,
                end,
                inclusive,
            } => match (start, end, value.kind()) {
                (Literal::Number(lo), Literal::Number(hi), ValueKind::Number(n)) => {
                    *n >= *lo && if *inclusive { *n <= *hi } else { *n < *hi }
                }
                (Literal::String(lo), Literal::String(hi), ValueKind::String(s)) => {
                    s >= lo && if *inclusive { s <= hi } else { s < hi }
                }
                _ => false,
            },
            Pattern::Type(name) => self.is_type(value, name),
            Pattern::Or(alternatives) => alternatives
                .iter()
                .any(|alternative| self.match_pattern(alternative, value, env)),
        }
    }

    /// `value is Name` for builtin type names or a class in scope.
    fn is_type(&self, value: &Value, name: &str) -> bool {
        let kind = value.kind();
        match name {
            "Number" | "number" => matches!(kind, ValueKind::Number(_)),
            "String" | "string" => matches!(kind, ValueKind::String(_)),
            "Boolean" | "boolean" | "Bool" => matches!(kind, ValueKind::Bool(_)),
            "Null" | "null" => matches!(kind, ValueKind::Null),
            "Undefined" | "undefined" => matches!(kind, ValueKind::Undefined),
            "Array" | "array" => matches!(kind, ValueKind::Array(_)),
            "Object" | "object" => matches!(kind, ValueKind::Object(_)),
            "Function" | "function" | "fn" => value.is_callable(),
            "Class" | "class" => matches!(kind, ValueKind::Class(_)),
            "Pending" | "pending" => matches!(kind, ValueKind::Pending(_)),
            _ => {
                let ValueKind::Instance(instance) = kind else {
                    return false;
                };
                match Environment::lookup(&self.env, name) {
                    Some(candidate) => match candidate.kind() {
                        ValueKind::Class(class) => instance.class.is_subclass_of(class),
                        _ => false,
                    },
                    None => {
                        let mut current = Some(&instance.class);
                        while let Some(class) = current {
                            if class.name == name {
                                return true;
                            }
                            current = class.parent.as_ref();
                        }
                        false
                    }
                }
            }
        }
    }

    fn bind_target(
        &mut self,
        target: &BindingTarget,
        value: Value,
        mutable: bool,
        span: SourceSpan,
    ) -> Result<()> {
        match target {
            BindingTarget::Name(name) => {
                self.env.borrow_mut().define(name.as_str(), value, mutable);
            }
            BindingTarget::Array { elements, rest } => {
                let ValueKind::Array(items) = value.kind() else {
                    return Err(runtime_error(
                        format!("cannot destructure {} as an array", value.type_name()),
                        span,
                    ));
                };
                let items = items.borrow().clone();
                for (idx, element) in elements.iter().enumerate() {
                    let mut item = items.get(idx).cloned().unwrap_or_else(Value::undefined);
                    if let Some(default) = &element.default {
                        if matches!(item.kind(), ValueKind::Undefined) {
                            item = self.evaluate(default)?;
                        }
                    }
                    self.bind_target(&element.target, item, mutable, span)?;
                }
                if let Some(name) = rest {
                    let remaining = items.get(elements.len()..).unwrap_or_default().to_vec();
                    self.env
                        .borrow_mut()
                        .define(name.as_str(), Value::array(remaining), mutable);
                }
            }
            BindingTarget::Object { fields, rest } => {
                let Some(props) = property_snapshot(&value) else {
                    return Err(runtime_error(
                        format!("cannot destructure {} as an object", value.type_name()),
                        span,
                    ));
                };
                for (key, element) in fields {
                    let mut item = props.get(key).cloned().unwrap_or_else(Value::undefined);
                    if let Some(default) = &element.default {
                        if matches!(item.kind(), ValueKind::Undefined) {
                            item = self.evaluate(default)?;
                        }
                    }
                    self.bind_target(&element.target, item, mutable, span)?;
                }
                if let Some(name) = rest {
                    let remaining = props
                        .into_iter()
                        .filter(|(key, _)| !fields.iter().any(|(field, _)| field == key))
                        .collect();
                    self.env
                        .borrow_mut()
                        .define(name.as_str(), Value::object(remaining), mutable);
                }
            }
        }
        Ok(())
    }

    fn assign(&mut self, target: &Expr, op: AssignOp, value: &Expr) -> Result<Value> {
        let place = self.resolve_place(target)?;
        let assigned = match op {
            AssignOp::Assign => self.evaluate(value)?,
            AssignOp::Compound(binary) => {
                let current = self.read_place(&place, target.span)?;
                let rhs = self.evaluate(value)?;
                operators::binary(binary, &current, &rhs, target.span.to(value.span))?
            }
            AssignOp::Nullish => {
                let current = self.read_place(&place, target.span)?;
                if !current.is_nullish() {
                    return Ok(current);
                }
                self.evaluate(value)?
            }
        };
        self.write_place(place, assigned.clone(), target.span)?;
        Ok(assigned)
    }

    fn resolve_place(&mut self, target: &Expr) -> Result<Place> {
        match &target.kind {
            ExprKind::Variable(name) => Ok(Place::Variable(name.clone())),
            ExprKind::Member {
                target: owner,
                name,
                ..
            } => Ok(Place::Member(self.evaluate(owner)?, name.clone())),
            ExprKind::Index {
                target: owner,
                index,
                ..
            } => {
                let owner = self.evaluate(owner)?;
                let index = self.evaluate(index)?;
                Ok(Place::Index(owner, index))
            }
            _ => Err(runtime_error("invalid assignment target", target.span)),
        }
    }

    fn read_place(&self, place: &Place, span: SourceSpan) -> Result<Value> {
        match place {
            Place::Variable(name) => Environment::get(&self.env, name, span),
            Place::Member(owner, name) => get_member(owner, name, span),
            Place::Index(owner, index) => get_index(owner, index, span),
        }
    }

    fn write_place(&mut self, place: Place, value: Value, span: SourceSpan) -> Result<()> {
        match place {
            Place::Variable(name) => Environment::assign(&self.env, &name, value, span),
            Place::Member(owner, name) => set_member(&owner, name, value, span),
            Place::Index(owner, index) => set_index(&owner, &index, value, span),
        }
    }

    fn closure(&self, decl: &Rc<FunctionDecl>) -> Value {
        Value::new(ValueKind::Function(UserFunction {
            decl: Rc::clone(decl),
            env: Rc::clone(&self.env),
            this: None,
            super_class: None,
        }))
    }

    /// Dispatch a call to a native or script callable.
    pub fn call_value(&mut self, callee: &Value, args: Vec<Value>, span: SourceSpan) -> Result<Value> {
        match callee.kind() {
            ValueKind::NativeFunction(native) => {
                let result = native.call(&args).map_err(|err| attach_span(err, span))?;
                self.await_value(result, span)
            }
            ValueKind::Function(function) => self.call_function(function, args, span),
            ValueKind::Class(class) => Err(runtime_error(
                format!("class `{}` must be constructed with `new`", class.name),
                span,
            )),
            _ => Err(runtime_error(
                format!("value of type {} is not callable", callee.type_name()),
                span,
            )),
        }
    }

    fn call_function(
        &mut self,
        function: &UserFunction,
        args: Vec<Value>,
        span: SourceSpan,
    ) -> Result<Value> {
        if self.depth >= self.context.max_call_depth {
            return Err(runtime_error(
                format!(
                    "maximum call depth of {} exceeded",
                    self.context.max_call_depth
                ),
                span,
            ));
        }
        let decl = &function.decl;
        trace!("calling `{}` with {} arguments", function.name(), args.len());
        let scope = Environment::with_parent(Rc::clone(&function.env));
        if !decl.is_arrow {
            let this = function.this.clone().unwrap_or_else(Value::undefined);
            let mut frame = scope.borrow_mut();
            frame.define("this", this, false);
            if let Some(parent) = &function.super_class {
                frame.define("super", Value::new(ValueKind::Class(Rc::clone(parent))), false);
            }
        }

        self.depth += 1;
        let previous = mem::replace(&mut self.env, scope);
        let result = self
            .bind_params(decl, args)
            .and_then(|()| self.run_body(&decl.body, span));
        self.env = previous;
        self.depth -= 1;

        if !decl.is_async {
            return result;
        }
        match result {
            Ok(value) if matches!(value.kind(), ValueKind::Pending(_)) => Ok(value),
            Ok(value) => Ok(Value::resolved(value)),
            Err(LumenError::Thrown { value, .. }) => Ok(Value::rejected(value)),
            Err(err) => Err(err),
        }
    }

    fn bind_params(&mut self, decl: &FunctionDecl, args: Vec<Value>) -> Result<()> {
        let mut args = args.into_iter();
        for param in &decl.params {
            let value = match &param.kind {
                ParamKind::Plain => args.next().unwrap_or_else(Value::undefined),
                ParamKind::Default(default) => match args.next() {
                    Some(value) => value,
                    None => self.evaluate(default)?,
                },
                ParamKind::Rest => Value::array(args.by_ref().collect()),
            };
            self.env
                .borrow_mut()
                .define(param.name.as_str(), value, true);
        }
        Ok(())
    }

    fn run_body(&mut self, body: &FunctionBody, span: SourceSpan) -> Result<Value> {
        match body {
            FunctionBody::Expr(expr) => self.evaluate(expr),
            FunctionBody::Block(items) => match self.execute_items(items)? {
                Completion::Normal(_) => Ok(Value::null()),
                Completion::Return(value) => Ok(value),
                Completion::Thrown { value, span } => Err(LumenError::thrown(value, span)),
                Completion::Break => Err(control_flow_error("break", span)),
                Completion::Continue => Err(control_flow_error("continue", span)),
            },
        }
    }

    fn super_context(&self, span: SourceSpan) -> Result<(Rc<ClassValue>, Value)> {
        let parent = match Environment::lookup(&self.env, "super") {
            Some(value) => match value.kind() {
                ValueKind::Class(class) => Rc::clone(class),
                _ => return Err(runtime_error("`super` is not a class", span)),
            },
            None => {
                return Err(runtime_error(
                    "`super` is only available in methods of a derived class",
                    span,
                ))
            }
        };
        let this = Environment::lookup(&self.env, "this").unwrap_or_else(Value::undefined);
        Ok((parent, this))
    }

    fn declare_class(&mut self, decl: &ClassDecl, span: SourceSpan) -> Result<()> {
        let parent = match &decl.parent {
            Some(name) => {
                let value = Environment::get(&self.env, name, span)?;
                match value.kind() {
                    ValueKind::Class(class) => Some(Rc::clone(class)),
                    _ => {
                        return Err(runtime_error(
                            format!("cannot extend `{name}`: it is a {}", value.type_name()),
                            span,
                        ))
                    }
                }
            }
            None => None,
        };

        let mut methods = IndexMap::new();
        let mut static_methods = IndexMap::new();
        let mut defaults: Vec<PropertyDefault> = parent
            .as_ref()
            .map(|parent| parent.defaults.clone())
            .unwrap_or_default();
        let mut static_props = Vec::new();
        for member in &decl.members {
            match member {
                ClassMember::Method {
                    name,
                    function,
                    is_static,
                } => {
                    let method = UserFunction {
                        decl: Rc::clone(function),
                        env: Rc::clone(&self.env),
                        this: None,
                        super_class: parent.clone(),
                    };
                    if *is_static {
                        static_methods.insert(name.clone(), method);
                    } else {
                        methods.insert(name.clone(), method);
                    }
                }
                ClassMember::Property {
                    name,
                    value,
                    is_static: true,
                } => static_props.push((name, value)),
                ClassMember::Property { name, value, .. } => {
                    defaults.retain(|default| &default.name != name);
                    defaults.push(PropertyDefault {
                        name: name.clone(),
                        value: value.clone(),
                        env: Rc::clone(&self.env),
                    });
                }
            }
        }

        let class = Rc::new(ClassValue {
            name: decl.name.clone(),
            parent,
            methods,
            static_methods,
            defaults,
            statics: RefCell::new(IndexMap::new()),
        });
        let class_value = Value::new(ValueKind::Class(Rc::clone(&class)));
        self.env
            .borrow_mut()
            .define(decl.name.as_str(), class_value.clone(), false);
        debug!(
            "declared class `{}`{}",
            class.name,
            class
                .parent
                .as_ref()
                .map(|parent| format!(" extends `{}`", parent.name))
                .unwrap_or_default()
        );

        for (name, value) in static_props {
            let value = match value {
                Some(expr) => {
                    let scope = Environment::with_parent(Rc::clone(&self.env));
                    scope
                        .borrow_mut()
                        .define("this", class_value.clone(), false);
                    self.evaluate_in(scope, expr)?
                }
                None => Value::undefined(),
            };
            class.statics.borrow_mut().insert(name.clone(), value);
        }
        Ok(())
    }

    fn instantiate(&mut self, class: &Rc<ClassValue>, args: Vec<Value>, span: SourceSpan) -> Result<Value> {
        let instance = Value::new(ValueKind::Instance(InstanceValue {
            class: Rc::clone(class),
            props: RefCell::new(IndexMap::new()),
        }));
        for default in &class.defaults {
            let value = match &default.value {
                Some(expr) => {
                    let scope = Environment::with_parent(Rc::clone(&default.env));
                    scope.borrow_mut().define("this", instance.clone(), false);
                    self.evaluate_in(scope, expr)?
                }
                None => Value::undefined(),
            };
            if let ValueKind::Instance(state) = instance.kind() {
                state.props.borrow_mut().insert(default.name.clone(), value);
            }
        }
        if let Some(constructor) = class.find_method("constructor") {
            self.call_function(&constructor.with_this(instance.clone()), args, span)?;
        }
        Ok(instance)
    }

    /// Settle a pending computation synchronously; other values pass through.
    fn await_value(&mut self, value: Value, span: SourceSpan) -> Result<Value> {
        let ValueKind::Pending(state) = value.kind() else {
            return Ok(value);
        };
        let current = state.borrow().clone();
        let settled = match current {
            PendingState::Resolved(inner) => return self.await_value(inner, span),
            PendingState::Rejected(reason) => return Err(LumenError::thrown(reason, span)),
            PendingState::Deferred(thunk) => match thunk() {
                Ok(result) => PendingState::Resolved(result),
                Err(LumenError::Thrown { value, .. }) => PendingState::Rejected(value),
                Err(err) => return Err(attach_span(err, span)),
            },
        };
        *state.borrow_mut() = settled;
        self.await_value(value.clone(), span)
    }

    fn import(&mut self, clause: &ImportClause, source: &str, span: SourceSpan) -> Result<()> {
        let module = self.load_module(source, span)?;
        match clause {
            ImportClause::SideEffect => {}
            ImportClause::Namespace(name) => {
                self.env.borrow_mut().define(name.as_str(), module, false);
            }
            ImportClause::Named(names) => {
                let Some(exports) = property_snapshot(&module) else {
                    return Ok(());
                };
                for (name, alias) in names {
                    let value = exports.get(name).cloned().ok_or_else(|| {
                        runtime_error(format!("module `{source}` has no export `{name}`"), span)
                    })?;
                    self.env.borrow_mut().define(alias.as_str(), value, false);
                }
            }
        }
        Ok(())
    }

    fn resolve_module(&self, source: &str) -> PathBuf {
        let mut path = self.context.base_dir.join(source);
        if path.extension().is_none() {
            path.set_extension("lm");
        }
        fs::canonicalize(&path).unwrap_or(path)
    }

    /// Load, run and cache a module, returning its exports as an object.
    fn load_module(&mut self, source: &str, span: SourceSpan) -> Result<Value> {
        let path = self.resolve_module(source);
        if let Some(module) = self.modules.get(&path) {
            return Ok(module.clone());
        }
        if self.loading.contains(&path) {
            return Err(runtime_error(format!("circular import of `{source}`"), span));
        }
        let text = fs::read_to_string(&path).map_err(|err| {
            runtime_error(format!("cannot load module `{source}`: {err}"), span)
        })?;
        let program = parser::parse_source(&text)
            .map_err(|diag| diag.with_note(format!("in module `{}`", path.display())))?;
        debug!("loading module {}", path.display());

        self.loading.push(path.clone());
        let module_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let previous_dir = mem::replace(&mut self.context.base_dir, module_dir);
        let previous_env = mem::replace(
            &mut self.env,
            Environment::with_parent(Rc::clone(&self.builtins)),
        );
        let previous_exports = self.exports.replace(Vec::new());
        let outcome = self.run(&program);
        let names = mem::replace(&mut self.exports, previous_exports).unwrap_or_default();
        let module_env = mem::replace(&mut self.env, previous_env);
        self.context.base_dir = previous_dir;
        self.loading.pop();
        outcome?;

        let mut exports = IndexMap::new();
        for (local, exported) in names {
            exports.insert(exported, Environment::get(&module_env, &local, span)?);
        }
        let module = Value::object(exports);
        self.modules.insert(path, module.clone());
        Ok(module)
    }
}

/// Map a loop-body completion to the loop's exit completion, if any.
fn loop_exit(completion: Completion) -> Option<Completion> {
    match completion {
        Completion::Normal(_) | Completion::Continue => None,
        Completion::Break => Some(Completion::Normal(Value::undefined())),
        other => Some(other),
    }
}

fn runtime_error(message: impl Into<String>, span: SourceSpan) -> LumenError {
    LumenError::from(Diagnostic::runtime(message, span))
}

fn control_flow_error(keyword: &str, span: SourceSpan) -> LumenError {
    LumenError::from(
        Diagnostic::new(
            DiagnosticKind::ControlFlow,
            format!("`{keyword}` outside of a loop"),
        )
        .with_span(span),
    )
}

/// Give span-less diagnostics from natives the call-site location.
fn attach_span(err: LumenError, span: SourceSpan) -> LumenError {
    match err {
        LumenError::Diagnostic(diag) if diag.span.is_none() => {
            LumenError::Diagnostic(diag.with_span(span))
        }
        LumenError::Thrown { value, span: None } => LumenError::thrown(value, span),
        other => other,
    }
}

/// Value bound by `catch` for interpreter-raised errors.
fn error_object(diag: &Diagnostic) -> Value {
    let name = match diag.kind {
        DiagnosticKind::Match => "MatchError",
        _ => "RuntimeError",
    };
    let mut map = IndexMap::new();
    map.insert("name".to_string(), Value::string(name));
    map.insert("message".to_string(), Value::string(diag.message.clone()));
    map.insert(
        "line".to_string(),
        diag.line()
            .map(|line| Value::number(line as f64))
            .unwrap_or_else(Value::null),
    );
    Value::object(map)
}

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Number(n) => Value::number(*n),
        Literal::String(s) => Value::string(s.clone()),
        Literal::Bool(b) => Value::bool(*b),
        Literal::Null => Value::null(),
        Literal::Undefined => Value::undefined(),
    }
}

fn property_key(value: &Value) -> String {
    match value.kind() {
        ValueKind::String(s) => s.clone(),
        ValueKind::Number(n) => format_number(*n),
        _ => value.to_string(),
    }
}

/// Own properties of an object or instance.
fn property_snapshot(value: &Value) -> Option<IndexMap<String, Value>> {
    match value.kind() {
        ValueKind::Object(map) => Some(map.borrow().clone()),
        ValueKind::Instance(instance) => Some(instance.props.borrow().clone()),
        _ => None,
    }
}

/// Arrays iterate values, strings characters, objects keys (`in`) or
/// values (`of`).
fn iteration_items(value: &Value, of: bool, span: SourceSpan) -> Result<Vec<Value>> {
    match value.kind() {
        ValueKind::Array(items) => Ok(items.borrow().clone()),
        ValueKind::String(text) => Ok(text.chars().map(|ch| Value::string(ch.to_string())).collect()),
        ValueKind::Object(_) | ValueKind::Instance(_) => {
            let props = property_snapshot(value).unwrap_or_default();
            Ok(if of {
                props.into_values().collect()
            } else {
                props.into_keys().map(Value::string).collect()
            })
        }
        _ => Err(runtime_error(
            format!("value of type {} is not iterable", value.type_name()),
            span,
        )),
    }
}

fn range_values(start: f64, end: f64, inclusive: bool, span: SourceSpan) -> Result<Value> {
    if !start.is_finite() || !end.is_finite() {
        return Err(runtime_error("range bounds must be finite", span));
    }
    if (end - start).abs() > MAX_RANGE_LEN {
        return Err(runtime_error("range is too large to materialize", span));
    }
    let step = if start <= end { 1.0 } else { -1.0 };
    let mut values = Vec::new();
    let mut current = start;
    loop {
        let within = if step > 0.0 {
            current < end || (inclusive && current == end)
        } else {
            current > end || (inclusive && current == end)
        };
        if !within {
            break;
        }
        values.push(Value::number(current));
        current += step;
    }
    Ok(Value::array(values))
}

fn get_member(target: &Value, name: &str, span: SourceSpan) -> Result<Value> {
    let value = match target.kind() {
        ValueKind::Null | ValueKind::Undefined => {
            return Err(runtime_error(
                format!("cannot read property `{name}` of {}", target.type_name()),
                span,
            ))
        }
        ValueKind::String(text) if name == "length" => Value::number(text.chars().count() as f64),
        ValueKind::Array(items) if name == "length" => Value::number(items.borrow().len() as f64),
        ValueKind::Object(map) => match map.borrow().get(name) {
            // Plain functions stored on an object act as its methods.
            Some(value) => match value.kind() {
                ValueKind::Function(function) if !function.decl.is_arrow && function.this.is_none() => {
                    function.bind(target.clone())
                }
                _ => value.clone(),
            },
            None => Value::undefined(),
        },
        ValueKind::Instance(instance) => {
            if let Some(value) = instance.props.borrow().get(name) {
                return Ok(value.clone());
            }
            match instance.class.find_method(name) {
                Some(method) => method.bind(target.clone()),
                None => Value::undefined(),
            }
        }
        ValueKind::Class(class) => match class.find_static(name) {
            Some(value) => value,
            None if name == "name" => Value::string(class.name.clone()),
            None => Value::undefined(),
        },
        _ => Value::undefined(),
    };
    Ok(value)
}

fn get_index(target: &Value, index: &Value, span: SourceSpan) -> Result<Value> {
    match (target.kind(), index.kind()) {
        (ValueKind::Array(items), ValueKind::Number(n)) => Ok(array_slot(*n)
            .and_then(|idx| items.borrow().get(idx).cloned())
            .unwrap_or_else(Value::undefined)),
        (ValueKind::String(text), ValueKind::Number(n)) => Ok(array_slot(*n)
            .and_then(|idx| text.chars().nth(idx))
            .map(|ch| Value::string(ch.to_string()))
            .unwrap_or_else(Value::undefined)),
        _ => get_member(target, &property_key(index), span),
    }
}

fn set_member(target: &Value, name: String, value: Value, span: SourceSpan) -> Result<()> {
    match target.kind() {
        ValueKind::Object(map) => {
            map.borrow_mut().insert(name, value);
            Ok(())
        }
        ValueKind::Instance(instance) => {
            instance.props.borrow_mut().insert(name, value);
            Ok(())
        }
        ValueKind::Class(class) => {
            class.statics.borrow_mut().insert(name, value);
            Ok(())
        }
        _ => Err(runtime_error(
            format!("cannot set property `{name}` on {}", target.type_name()),
            span,
        )),
    }
}

fn set_index(target: &Value, index: &Value, value: Value, span: SourceSpan) -> Result<()> {
    match (target.kind(), index.kind()) {
        (ValueKind::Array(items), ValueKind::Number(n)) => {
            let Some(idx) = array_slot(*n) else {
                return Err(runtime_error(
                    format!("invalid array index {}", format_number(*n)),
                    span,
                ));
            };
            let mut items = items.borrow_mut();
            if idx >= items.len() {
                if (idx - items.len()) as f64 > MAX_RANGE_LEN {
                    return Err(runtime_error(
                        format!("array index {} is too far past the end", format_number(*n)),
                        span,
                    ));
                }
                items.resize_with(idx + 1, Value::undefined);
            }
            items[idx] = value;
            Ok(())
        }
        (ValueKind::String(_), _) => Err(runtime_error("strings are immutable", span)),
        _ => set_member(target, property_key(index), value, span),
    }
}

/// Non-negative integral index, if `n` is one.
fn array_slot(n: f64) -> Option<usize> {
    (n >= 0.0 && n.fract() == 0.0 && n <= usize::MAX as f64).then_some(n as usize)
}
