use std::{cell::RefCell, fmt, rc::Rc};

use indexmap::IndexMap;

use crate::{
    ast::{Expr, FunctionDecl},
    diagnostics::{Diagnostic, DiagnosticKind, LumenError, Result, SourceSpan},
    environment::EnvironmentRef,
};

/// Arity marker for natives that validate their own argument count.
pub const VARIADIC: usize = usize::MAX;

#[derive(Clone)]
pub struct Value(pub Rc<ValueKind>);

impl Value {
    pub fn new(kind: ValueKind) -> Self {
        Self(Rc::new(kind))
    }

    pub fn null() -> Self {
        Self::new(ValueKind::Null)
    }

    pub fn undefined() -> Self {
        Self::new(ValueKind::Undefined)
    }

    pub fn bool(value: bool) -> Self {
        Self::new(ValueKind::Bool(value))
    }

    pub fn number(value: f64) -> Self {
        Self::new(ValueKind::Number(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::new(ValueKind::String(value.into()))
    }

    pub fn array(values: Vec<Value>) -> Self {
        Self::new(ValueKind::Array(RefCell::new(values)))
    }

    pub fn object(entries: IndexMap<String, Value>) -> Self {
        Self::new(ValueKind::Object(RefCell::new(entries)))
    }

    pub fn native(
        name: impl Into<String>,
        arity: usize,
        callback: impl Fn(&[Value]) -> Result<Value> + 'static,
    ) -> Self {
        Self::new(ValueKind::NativeFunction(NativeFunction {
            name: name.into(),
            arity,
            callback: Rc::new(callback),
        }))
    }

    pub fn resolved(value: Value) -> Self {
        Self::new(ValueKind::Pending(RefCell::new(PendingState::Resolved(value))))
    }

    pub fn rejected(value: Value) -> Self {
        Self::new(ValueKind::Pending(RefCell::new(PendingState::Rejected(value))))
    }

    /// A computation that runs the first time it is awaited.
    pub fn deferred(thunk: impl Fn() -> Result<Value> + 'static) -> Self {
        Self::new(ValueKind::Pending(RefCell::new(PendingState::Deferred(
            Rc::new(thunk),
        ))))
    }

    pub fn kind(&self) -> &ValueKind {
        &self.0
    }

    pub fn is_truthy(&self) -> bool {
        match &*self.0 {
            ValueKind::Null | ValueKind::Undefined => false,
            ValueKind::Bool(b) => *b,
            ValueKind::Number(n) => *n != 0.0 && !n.is_nan(),
            ValueKind::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(&*self.0, ValueKind::Null | ValueKind::Undefined)
    }

    pub fn as_number(&self) -> Option<f64> {
        match &*self.0 {
            ValueKind::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &*self.0 {
            ValueKind::String(s) => Some(s),
            _ => None,
        }
    }

    /// Name reported by `typeof`.
    pub fn type_name(&self) -> &'static str {
        match &*self.0 {
            ValueKind::Null => "null",
            ValueKind::Undefined => "undefined",
            ValueKind::Bool(_) => "boolean",
            ValueKind::Number(_) => "number",
            ValueKind::String(_) => "string",
            ValueKind::Array(_) => "array",
            ValueKind::Object(_) => "object",
            ValueKind::Function(_) | ValueKind::NativeFunction(_) => "function",
            ValueKind::Class(_) => "class",
            ValueKind::Instance(_) => "instance",
            ValueKind::Pending(_) => "pending",
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(
            &*self.0,
            ValueKind::Function(_) | ValueKind::NativeFunction(_)
        )
    }

    /// `===` semantics: primitives by value, everything else by identity.
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (&*self.0, &*other.0) {
            (ValueKind::Null, ValueKind::Null) => true,
            (ValueKind::Undefined, ValueKind::Undefined) => true,
            (ValueKind::Bool(a), ValueKind::Bool(b)) => a == b,
            (ValueKind::Number(a), ValueKind::Number(b)) => a == b,
            (ValueKind::String(a), ValueKind::String(b)) => a == b,
            (ValueKind::Null | ValueKind::Undefined, _)
            | (ValueKind::Bool(_) | ValueKind::Number(_) | ValueKind::String(_), _) => false,
            _ => Rc::ptr_eq(&self.0, &other.0),
        }
    }

    /// Numeric conversion used by the `num` builtin; never fails.
    pub fn to_number(&self) -> f64 {
        match &*self.0 {
            ValueKind::Number(n) => *n,
            ValueKind::Bool(b) => f64::from(u8::from(*b)),
            ValueKind::Null => 0.0,
            ValueKind::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    crate::lexer::parse_number(trimmed).unwrap_or(f64::NAN)
                }
            }
            _ => f64::NAN,
        }
    }

    pub fn expect_number(&self, what: &str, span: SourceSpan) -> Result<f64> {
        self.as_number().ok_or_else(|| {
            LumenError::from(Diagnostic::runtime(
                format!("{what} expects a number, found {}", self.type_name()),
                span,
            ))
        })
    }

    fn fmt_nested(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0 {
            ValueKind::String(s) => write!(f, "{s:?}"),
            _ => write!(f, "{self}"),
        }
    }
}

/// Render a number the way scripts see it: integral values drop the `.0`.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{n:.0}")
    } else {
        format!("{n}")
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0 {
            ValueKind::String(s) => write!(f, "{s:?}"),
            _ => write!(f, "{self}"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0 {
            ValueKind::Null => write!(f, "null"),
            ValueKind::Undefined => write!(f, "undefined"),
            ValueKind::Bool(b) => write!(f, "{b}"),
            ValueKind::Number(n) => write!(f, "{}", format_number(*n)),
            ValueKind::String(s) => write!(f, "{s}"),
            ValueKind::Array(values) => {
                write!(f, "[")?;
                for (idx, value) in values.borrow().iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    value.fmt_nested(f)?;
                }
                write!(f, "]")
            }
            ValueKind::Object(map) => fmt_entries(f, &map.borrow()),
            ValueKind::Instance(instance) => {
                write!(f, "{} ", instance.class.name)?;
                fmt_entries(f, &instance.props.borrow())
            }
            ValueKind::Class(class) => write!(f, "<class {}>", class.name),
            ValueKind::Function(fun) => write!(f, "<fn {}>", fun.name()),
            ValueKind::NativeFunction(fun) => write!(f, "<native fn {}>", fun.name),
            ValueKind::Pending(state) => match &*state.borrow() {
                PendingState::Resolved(value) => write!(f, "<resolved {value}>"),
                PendingState::Rejected(value) => write!(f, "<rejected {value}>"),
                PendingState::Deferred(_) => write!(f, "<pending>"),
            },
        }
    }
}

fn fmt_entries(f: &mut fmt::Formatter<'_>, map: &IndexMap<String, Value>) -> fmt::Result {
    if map.is_empty() {
        return write!(f, "{{}}");
    }
    write!(f, "{{ ")?;
    for (idx, (key, value)) in map.iter().enumerate() {
        if idx > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{key}: ")?;
        value.fmt_nested(f)?;
    }
    write!(f, " }}")
}

pub enum ValueKind {
    Null,
    Undefined,
    Bool(bool),
    Number(f64),
    String(String),
    Array(RefCell<Vec<Value>>),
    Object(RefCell<IndexMap<String, Value>>),
    Function(UserFunction),
    NativeFunction(NativeFunction),
    Class(Rc<ClassValue>),
    Instance(InstanceValue),
    Pending(RefCell<PendingState>),
}

/// A script closure: the declaration plus the scope it was created in.
#[derive(Clone)]
pub struct UserFunction {
    pub decl: Rc<FunctionDecl>,
    pub env: EnvironmentRef,
    /// Receiver for methods read off an instance or class.
    pub this: Option<Value>,
    /// Parent of the class that declared this method; bound as `super`.
    pub super_class: Option<Rc<ClassValue>>,
}

impl UserFunction {
    pub fn name(&self) -> &str {
        self.decl.name.as_deref().unwrap_or("anonymous")
    }

    pub fn with_this(&self, this: Value) -> UserFunction {
        UserFunction {
            this: Some(this),
            ..self.clone()
        }
    }

    pub fn bind(&self, this: Value) -> Value {
        Value::new(ValueKind::Function(self.with_this(this)))
    }
}

pub type NativeCallback = Rc<dyn Fn(&[Value]) -> Result<Value>>;

#[derive(Clone)]
pub struct NativeFunction {
    pub name: String,
    pub arity: usize,
    pub callback: NativeCallback,
}

impl NativeFunction {
    pub fn call(&self, args: &[Value]) -> Result<Value> {
        if self.arity != VARIADIC && args.len() != self.arity {
            return Err(LumenError::from(Diagnostic::new(
                DiagnosticKind::Runtime,
                format!(
                    "function `{}` expected {} arguments but received {}",
                    self.name,
                    self.arity,
                    args.len()
                ),
            )));
        }
        (self.callback)(args)
    }
}

/// Instance property initializer, evaluated once per `new`.
#[derive(Clone)]
pub struct PropertyDefault {
    pub name: String,
    pub value: Option<Rc<Expr>>,
    pub env: EnvironmentRef,
}

pub struct ClassValue {
    pub name: String,
    pub parent: Option<Rc<ClassValue>>,
    pub methods: IndexMap<String, UserFunction>,
    pub static_methods: IndexMap<String, UserFunction>,
    /// Parent defaults first, so child initializers override them.
    pub defaults: Vec<PropertyDefault>,
    pub statics: RefCell<IndexMap<String, Value>>,
}

impl ClassValue {
    /// Own methods, then the direct parent's. Grandparents are not searched.
    pub fn find_method(&self, name: &str) -> Option<&UserFunction> {
        self.methods.get(name).or_else(|| {
            self.parent
                .as_ref()
                .and_then(|parent| parent.methods.get(name))
        })
    }

    /// Static property or method, with the same one-level parent search.
    pub fn find_static(self: &Rc<Self>, name: &str) -> Option<Value> {
        let class_value = Value::new(ValueKind::Class(Rc::clone(self)));
        if let Some(value) = self.statics.borrow().get(name) {
            return Some(value.clone());
        }
        if let Some(method) = self.static_methods.get(name) {
            return Some(method.bind(class_value));
        }
        let parent = self.parent.as_ref()?;
        if let Some(value) = parent.statics.borrow().get(name) {
            return Some(value.clone());
        }
        parent
            .static_methods
            .get(name)
            .map(|method| method.bind(class_value))
    }

    pub fn is_subclass_of(&self, other: &Rc<ClassValue>) -> bool {
        let mut current = Some(self);
        while let Some(class) = current {
            if std::ptr::eq(class, Rc::as_ptr(other)) {
                return true;
            }
            current = class.parent.as_deref();
        }
        false
    }
}

pub struct InstanceValue {
    pub class: Rc<ClassValue>,
    pub props: RefCell<IndexMap<String, Value>>,
}

#[derive(Clone)]
pub enum PendingState {
    Resolved(Value),
    Rejected(Value),
    Deferred(Rc<dyn Fn() -> Result<Value>>),
}
