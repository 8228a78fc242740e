use std::rc::Rc;

use crate::diagnostics::SourceSpan;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    String(String),
    Bool(bool),
    Null,
    Undefined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    BitAnd,
    BitOr,
    BitXor,
    ShiftLeft,
    ShiftRight,
    InstanceOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Nullish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Plus,
    Not,
    BitNot,
    TypeOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOp {
    Increment,
    Decrement,
}

/// `=` plus the compound forms; compound operators reuse the binary table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Compound(BinaryOp),
    Nullish,
}

#[derive(Debug, Clone)]
pub enum ParamKind {
    Plain,
    Default(Expr),
    Rest,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub kind: ParamKind,
    pub span: SourceSpan,
}

/// Shared shape of every callable: declarations, methods, arrows.
#[derive(Debug, Clone)]
pub struct FunctionDecl {
    pub name: Option<String>,
    pub params: Vec<Param>,
    pub body: FunctionBody,
    pub is_async: bool,
    /// Arrow functions see the `this` of their defining scope.
    pub is_arrow: bool,
}

#[derive(Debug, Clone)]
pub enum FunctionBody {
    Block(Vec<Stmt>),
    Expr(Box<Expr>),
}

#[derive(Debug, Clone)]
pub enum TemplatePart {
    Text(String),
    Expr(Expr),
}

#[derive(Debug, Clone)]
pub enum ArrayElement {
    Item(Expr),
    Spread(Expr),
}

#[derive(Debug, Clone)]
pub enum PropertyKey {
    Named(String),
    Computed(Expr),
}

#[derive(Debug, Clone)]
pub enum ObjectEntry {
    Property { key: PropertyKey, value: Expr },
    Spread(Expr),
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: SourceSpan,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Literal(Literal),
    Template(Vec<TemplatePart>),
    Variable(String),
    This,
    Array(Vec<ArrayElement>),
    Object(Vec<ObjectEntry>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Update {
        op: UpdateOp,
        prefix: bool,
        target: Box<Expr>,
    },
    Ternary {
        condition: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    Pipe {
        value: Box<Expr>,
        function: Box<Expr>,
    },
    Range {
        start: Box<Expr>,
        end: Box<Expr>,
        inclusive: bool,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<ArrayElement>,
        optional: bool,
    },
    New {
        class: Box<Expr>,
        args: Vec<ArrayElement>,
    },
    SuperCall(Vec<ArrayElement>),
    SuperMember(String),
    Await(Box<Expr>),
    Member {
        target: Box<Expr>,
        name: String,
        optional: bool,
    },
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
        optional: bool,
    },
    Function(Rc<FunctionDecl>),
    Match {
        subject: Box<Expr>,
        arms: Vec<MatchArm>,
    },
    TypeCheck {
        expr: Box<Expr>,
        type_name: String,
    },
    Input(Option<Box<Expr>>),
}

#[derive(Debug, Clone)]
pub struct MatchArm {
    pub pattern: Pattern,
    pub guard: Option<Expr>,
    pub body: FunctionBody,
    pub span: SourceSpan,
}

#[derive(Debug, Clone)]
pub enum Pattern {
    Wildcard,
    Literal(Literal),
    Binding(String),
    Array {
        elements: Vec<Pattern>,
        rest: Option<String>,
    },
    Object {
        fields: Vec<(String, Pattern)>,
        rest: Option<String>,
    },
    Range {
        start: Literal,
        end: Literal,
        inclusive: bool,
    },
    Type(String),
    Or(Vec<Pattern>),
}

/// Left-hand side of a destructuring declaration.
#[derive(Debug, Clone)]
pub enum BindingTarget {
    Name(String),
    Array {
        elements: Vec<BindingElement>,
        rest: Option<String>,
    },
    Object {
        fields: Vec<(String, BindingElement)>,
        rest: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct BindingElement {
    pub target: BindingTarget,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone)]
pub enum ClassMember {
    Method {
        name: String,
        function: Rc<FunctionDecl>,
        is_static: bool,
    },
    Property {
        name: String,
        value: Option<Rc<Expr>>,
        is_static: bool,
    },
}

#[derive(Debug, Clone)]
pub struct ClassDecl {
    pub name: String,
    pub parent: Option<String>,
    pub members: Vec<ClassMember>,
}

#[derive(Debug, Clone)]
pub struct SwitchCase {
    /// `None` marks the `default` case.
    pub tests: Option<Vec<Expr>>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub enum ImportClause {
    Named(Vec<(String, String)>),
    Namespace(String),
    SideEffect,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    Let {
        target: BindingTarget,
        value: Option<Expr>,
        constant: bool,
    },
    Assign {
        target: Expr,
        op: AssignOp,
        value: Expr,
    },
    Function(Rc<FunctionDecl>),
    Class(ClassDecl),
    Expr(Expr),
    Print(Vec<Expr>),
    Block(Vec<Stmt>),
    If {
        condition: Expr,
        then_branch: Vec<Stmt>,
        else_branch: Option<Vec<Stmt>>,
    },
    Switch {
        subject: Expr,
        cases: Vec<SwitchCase>,
    },
    Loop {
        body: Vec<Stmt>,
    },
    LoopRange {
        binding: String,
        from: Expr,
        to: Expr,
        step: Option<Expr>,
        body: Vec<Stmt>,
    },
    ForIn {
        binding: String,
        iterable: Expr,
        body: Vec<Stmt>,
    },
    ForOf {
        binding: String,
        iterable: Expr,
        body: Vec<Stmt>,
    },
    While {
        condition: Expr,
        body: Vec<Stmt>,
    },
    DoWhile {
        body: Vec<Stmt>,
        condition: Expr,
    },
    Try {
        body: Vec<Stmt>,
        catch_binding: Option<String>,
        catch_body: Option<Vec<Stmt>>,
        finally_body: Option<Vec<Stmt>>,
    },
    Throw(Expr),
    Return(Option<Expr>),
    Break,
    Continue,
    Import {
        clause: ImportClause,
        source: String,
    },
    /// `export` wrapping a declaration.
    Export(Box<Stmt>),
    ExportNames(Vec<(String, String)>),
}

#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, Default)]
pub struct Program {
    pub items: Vec<Stmt>,
}

impl Stmt {
    /// Names a declaration statement introduces into its scope.
    pub fn declared_names(&self) -> Vec<String> {
        match &self.kind {
            StmtKind::Let { target, .. } => {
                let mut names = Vec::new();
                target.collect_names(&mut names);
                names
            }
            StmtKind::Function(decl) => decl.name.iter().cloned().collect(),
            StmtKind::Class(decl) => vec![decl.name.clone()],
            _ => Vec::new(),
        }
    }
}

impl BindingTarget {
    pub fn collect_names(&self, names: &mut Vec<String>) {
        match self {
            BindingTarget::Name(name) => names.push(name.clone()),
            BindingTarget::Array { elements, rest } => {
                for element in elements {
                    element.target.collect_names(names);
                }
                names.extend(rest.iter().cloned());
            }
            BindingTarget::Object { fields, rest } => {
                for (_, element) in fields {
                    element.target.collect_names(names);
                }
                names.extend(rest.iter().cloned());
            }
        }
    }
}
