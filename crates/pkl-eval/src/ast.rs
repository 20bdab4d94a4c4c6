//! The syntax tree the module driver consumes.
//!
//! A parser (external to this crate) produces a [`ModuleCst`]: a module
//! declaration, an import list, and a list of module entries. Every node
//! carries a [`Span`] with byte offsets plus line and column, used for
//! error reporting and the trace log.
//!
//! Name nodes ([`NameRef`]) carry a one-shot resolution cache: the first
//! evaluation of a call site decides between frame slot, lexical property,
//! base-module property, and implicit-`this` reads, and later evaluations
//! reuse the decision. See `resolve` for the decision procedure.

use std::{cell::RefCell, rc::Rc};

use serde::{Deserialize, Serialize};

use crate::{intern::Identifier, member::Modifiers, resolve::ResolvedRead};

/// A source span: start/end byte offsets plus the 1-based line and column
/// of the start position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    /// Start byte offset.
    pub start: u32,
    /// End byte offset (exclusive).
    pub end: u32,
    /// 1-based line of the start position.
    pub line: u32,
    /// 1-based column of the start position.
    pub column: u32,
}

impl Span {
    /// Creates a span.
    #[must_use]
    pub const fn new(start: u32, end: u32, line: u32, column: u32) -> Self {
        Self { start, end, line, column }
    }

    /// The empty span used for synthesized nodes (prelude members,
    /// generated `output` machinery).
    #[must_use]
    pub const fn none() -> Self {
        Self::new(0, 0, 0, 0)
    }
}

/// An expression together with its source span.
#[derive(Debug)]
pub struct ExprLoc {
    /// Source span of the expression.
    pub span: Span,
    /// The expression itself.
    pub expr: Expr,
}

impl ExprLoc {
    /// Creates an expression node.
    #[must_use]
    pub fn new(expr: Expr, span: Span) -> Self {
        Self { span, expr }
    }

    /// An integer literal node.
    #[must_use]
    pub fn int(value: i64, span: Span) -> Self {
        Self::new(Expr::Literal(Literal::Int(value)), span)
    }

    /// A float literal node.
    #[must_use]
    pub fn float(value: f64, span: Span) -> Self {
        Self::new(Expr::Literal(Literal::Float(value)), span)
    }

    /// A boolean literal node.
    #[must_use]
    pub fn bool(value: bool, span: Span) -> Self {
        Self::new(Expr::Literal(Literal::Bool(value)), span)
    }

    /// A string literal node.
    #[must_use]
    pub fn str(value: impl Into<Rc<str>>, span: Span) -> Self {
        Self::new(Expr::Literal(Literal::Str(value.into())), span)
    }

    /// The null literal node.
    #[must_use]
    pub fn null(span: Span) -> Self {
        Self::new(Expr::Literal(Literal::Null), span)
    }

    /// An unresolved name read.
    #[must_use]
    pub fn name(name: Identifier, span: Span) -> Self {
        Self::new(Expr::Name(NameRef::new(name)), span)
    }

    /// A property access `receiver.name`.
    #[must_use]
    pub fn access(receiver: Self, name: Identifier, span: Span) -> Self {
        Self::new(
            Expr::Access {
                receiver: Box::new(receiver),
                name,
                nullable: false,
            },
            span,
        )
    }

    /// A bare call `name(args...)` resolved through the lexical scope.
    #[must_use]
    pub fn call(name: Identifier, args: Vec<Self>, span: Span) -> Self {
        Self::new(
            Expr::Call {
                callee: Callee::Bare(NameRef::new(name)),
                args,
            },
            span,
        )
    }

    /// A method call `receiver.name(args...)`.
    #[must_use]
    pub fn method_call(receiver: Self, name: Identifier, args: Vec<Self>, span: Span) -> Self {
        Self::new(
            Expr::Call {
                callee: Callee::Member {
                    receiver: Box::new(receiver),
                    name,
                    nullable: false,
                },
                args,
            },
            span,
        )
    }

    /// A binary operation node.
    #[must_use]
    pub fn binop(op: BinOp, lhs: Self, rhs: Self, span: Span) -> Self {
        Self::new(
            Expr::BinOp {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            span,
        )
    }
}

/// A literal constant.
#[derive(Debug, Clone)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
}

/// An unresolved name read with its one-shot resolution cache.
///
/// The cache is interior-mutable: the AST is shared (`Rc`) between all
/// objects instantiated from the same body, and the resolved read is the
/// same for every instantiation because frame shapes are deterministic
/// per source location.
#[derive(Debug)]
pub struct NameRef {
    /// The interned name being read.
    pub name: Identifier,
    pub(crate) resolution: RefCell<Option<ResolvedRead>>,
}

impl NameRef {
    /// Creates an unresolved name node.
    #[must_use]
    pub fn new(name: Identifier) -> Self {
        Self {
            name,
            resolution: RefCell::new(None),
        }
    }
}

/// One segment of an interpolated string literal.
#[derive(Debug)]
pub enum StringPart {
    /// A literal text segment.
    Lit(Rc<str>),
    /// An interpolated `\(expr)` segment.
    Interp(ExprLoc),
}

/// Binary operators in the expression grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    /// `**` (right-associative).
    Pow,
    /// `*`
    Mul,
    /// `/` (float division).
    Div,
    /// `~/` (truncated integer division).
    IntDiv,
    /// `%` (remainder, sign of the dividend).
    Rem,
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `<`
    Lt,
    /// `>`
    Gt,
    /// `<=`
    Le,
    /// `>=`
    Ge,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `&&` (short-circuit).
    And,
    /// `||` (short-circuit).
    Or,
    /// `|>` — `a |> f` is `f(a)`.
    Pipe,
    /// `??` (null-coalescing).
    NullCoalesce,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Arithmetic negation.
    Neg,
    /// Boolean negation.
    Not,
}

/// The callee of a call expression.
#[derive(Debug)]
pub enum Callee {
    /// `foo(args)` — resolved through the lexical scope like a name read.
    Bare(NameRef),
    /// `recv.foo(args)` / `recv?.foo(args)` — method lookup on the receiver.
    Member {
        receiver: Box<ExprLoc>,
        name: Identifier,
        nullable: bool,
    },
    /// `(expr)(args)` — the callee evaluates to a function value.
    Expr(Box<ExprLoc>),
}

/// An expression.
#[derive(Debug)]
pub enum Expr {
    Literal(Literal),
    /// String interpolation; `multiline_indent` carries the closing
    /// delimiter's indent for multi-line literals (stripped from every
    /// line at evaluation time).
    StringInterp {
        parts: Vec<StringPart>,
        multiline_indent: Option<u32>,
    },
    /// The receiver of the current member evaluation, or the candidate
    /// value inside a constraint (custom-`this`) scope.
    This,
    /// An unresolved bare name.
    Name(NameRef),
    /// Property access `e.x` / `e?.x`.
    Access {
        receiver: Box<ExprLoc>,
        name: Identifier,
        nullable: bool,
    },
    /// Subscript `e[k]`.
    Subscript {
        receiver: Box<ExprLoc>,
        index: Box<ExprLoc>,
    },
    /// `if (cond) then else else` — both arms lazy.
    If {
        cond: Box<ExprLoc>,
        then_expr: Box<ExprLoc>,
        else_expr: Box<ExprLoc>,
    },
    /// `let (name = binding) body`; `name` is `None` for the underscore.
    Let {
        name: Option<Identifier>,
        binding: Box<ExprLoc>,
        body: Box<ExprLoc>,
    },
    UnaryOp {
        op: UnaryOp,
        operand: Box<ExprLoc>,
    },
    BinOp {
        op: BinOp,
        lhs: Box<ExprLoc>,
        rhs: Box<ExprLoc>,
    },
    /// Non-null assertion `e!!`.
    NonNull(Box<ExprLoc>),
    /// `e is T`.
    TypeTest { expr: Box<ExprLoc>, ty: Rc<TypeRef> },
    /// `e as T`.
    TypeCast { expr: Box<ExprLoc>, ty: Rc<TypeRef> },
    /// `throw(msg)`.
    Throw(Box<ExprLoc>),
    /// `trace(e)` — logs and returns `e`.
    Trace(Box<ExprLoc>),
    /// `import(uri)`, `import*(glob)`, `import?(uri)`.
    Import {
        uri: Rc<str>,
        glob: bool,
        nullable: bool,
    },
    /// `read(e)`, `read*(e)`, `read?(e)`.
    Read {
        uri: Box<ExprLoc>,
        glob: bool,
        nullable: bool,
    },
    /// `new T { body }` / `new { body }`.
    New {
        ty: Option<Rc<TypeRef>>,
        body: Rc<ObjectBody>,
    },
    /// `(parent) { body }` — amend the value of `parent`.
    Amend {
        parent: Box<ExprLoc>,
        body: Rc<ObjectBody>,
    },
    /// Function literal `(a, b) -> expr`.
    FunctionLit {
        params: Vec<Identifier>,
        body: Rc<ExprLoc>,
    },
    /// A call with any callee form.
    Call { callee: Callee, args: Vec<ExprLoc> },
}

/// A type as written in source; resolved to a `VmType` per module.
#[derive(Debug)]
pub enum TypeRef {
    /// `unknown` — accepts everything.
    Unknown,
    /// `nothing` — accepts nothing.
    Nothing,
    /// `module` — the enclosing module instance.
    Module,
    /// A string-constant type, e.g. `"north"`.
    StringConstant(Rc<str>),
    /// A named type, optionally qualified by an import alias, with type
    /// arguments: `Person`, `xs.Config`, `Listing<Int>`.
    Declared {
        qualifier: Option<Identifier>,
        name: Identifier,
        args: Vec<Rc<TypeRef>>,
    },
    /// `T?`
    Nullable(Rc<TypeRef>),
    /// `A|B`
    Union(Rc<TypeRef>, Rc<TypeRef>),
    /// `*T` inside a union — the default branch for contextual `new`.
    DefaultUnion(Rc<TypeRef>),
    /// `T(pred, ...)` — refinement constraints evaluated with
    /// custom-`this` bound to the candidate value.
    Constrained {
        base: Rc<TypeRef>,
        predicates: Vec<Rc<ExprLoc>>,
    },
    /// `(A, B) -> R`
    Function {
        params: Vec<Rc<TypeRef>>,
        ret: Rc<TypeRef>,
    },
    /// `(T)`
    Parenthesized(Rc<TypeRef>),
}

impl TypeRef {
    /// Convenience for an unqualified declared type without arguments.
    #[must_use]
    pub fn declared(name: Identifier) -> Rc<Self> {
        Rc::new(Self::Declared {
            qualifier: None,
            name,
            args: Vec::new(),
        })
    }
}

/// The value side of a property or entry declaration.
#[derive(Debug)]
pub enum MemberValueDecl {
    /// `= expr`
    Expr(Rc<ExprLoc>),
    /// `{ body }` — amend the inherited or default value.
    Body(Rc<ObjectBody>),
}

/// A property declaration inside an object body or at module level.
#[derive(Debug)]
pub struct PropertyDecl {
    /// The property name (public id; `local` is a modifier).
    pub name: Identifier,
    /// Modifier set (`local`, `hidden`, `fixed`, `const`, ...).
    pub modifiers: Modifiers,
    /// Declared type annotation, if any.
    pub ty: Option<Rc<TypeRef>>,
    /// The value: an expression or an amending body.
    pub value: MemberValueDecl,
    /// Source span of the declaration.
    pub span: Span,
    /// Doc comment, if present.
    pub doc: Option<Rc<str>>,
}

/// A method parameter.
#[derive(Debug)]
pub struct Param {
    pub name: Identifier,
    pub ty: Option<Rc<TypeRef>>,
}

/// A method declaration.
#[derive(Debug)]
pub struct MethodDecl {
    pub name: Identifier,
    pub modifiers: Modifiers,
    pub params: Vec<Param>,
    /// Declared return type; checked after each invocation when present.
    pub return_ty: Option<Rc<TypeRef>>,
    pub body: Rc<ExprLoc>,
    pub span: Span,
    pub doc: Option<Rc<str>>,
}

/// A member of an object body, in source order.
#[derive(Debug)]
pub enum ObjectMemberDecl {
    /// `name = value` / `name { ... }`
    Property(PropertyDecl),
    /// `function name(params) = expr`
    Method(Rc<MethodDecl>),
    /// `[key] = value` / `[key] { ... }`
    Entry { key: ExprLoc, value: MemberValueDecl },
    /// A plain element, appended at the next integer index.
    Element(Rc<ExprLoc>),
    /// `...e` / `...?e`
    Spread { expr: ExprLoc, nullable: bool },
    /// `when (cond) { ... } else { ... }`
    When {
        cond: ExprLoc,
        then_body: Vec<ObjectMemberDecl>,
        else_body: Vec<ObjectMemberDecl>,
    },
    /// `for (key, value in e) { ... }`
    For {
        key_var: Option<Identifier>,
        value_var: Identifier,
        iterable: ExprLoc,
        body: Vec<ObjectMemberDecl>,
    },
    /// `[[cond]] = value` — a conditional entry matched against the
    /// parent's members at force time.
    Predicate { cond: Rc<ExprLoc>, value: MemberValueDecl },
}

/// An object body: optional parameters plus members in source order.
#[derive(Debug)]
pub struct ObjectBody {
    /// Body parameters (bound when the body is applied as an amending
    /// function; must be empty for plain instantiation).
    pub params: Vec<Identifier>,
    /// Members in source order.
    pub members: Vec<ObjectMemberDecl>,
    /// Span of the whole body.
    pub span: Span,
}

impl ObjectBody {
    /// Creates a parameterless body.
    #[must_use]
    pub fn new(members: Vec<ObjectMemberDecl>, span: Span) -> Rc<Self> {
        Rc::new(Self {
            params: Vec::new(),
            members,
            span,
        })
    }
}

/// A class property declaration.
#[derive(Debug)]
pub struct ClassPropertyDecl {
    pub name: Identifier,
    pub modifiers: Modifiers,
    pub ty: Option<Rc<TypeRef>>,
    /// Default value, if declared.
    pub default: Option<MemberValueDecl>,
    pub span: Span,
    pub doc: Option<Rc<str>>,
}

/// A member of a class body.
#[derive(Debug)]
pub enum ClassMemberDecl {
    Property(Rc<ClassPropertyDecl>),
    Method(Rc<MethodDecl>),
}

/// A class declaration.
#[derive(Debug)]
pub struct ClassDecl {
    pub name: Identifier,
    pub modifiers: Modifiers,
    pub type_params: Vec<Identifier>,
    /// Supertype reference; `None` means the class extends `Typed`.
    pub supertype: Option<Rc<TypeRef>>,
    pub members: Vec<ClassMemberDecl>,
    pub span: Span,
    pub doc: Option<Rc<str>>,
}

/// A type alias declaration.
#[derive(Debug)]
pub struct TypeAliasDecl {
    pub name: Identifier,
    pub type_params: Vec<Identifier>,
    pub ty: Rc<TypeRef>,
    pub span: Span,
    pub doc: Option<Rc<str>>,
}

/// An import declaration.
#[derive(Debug)]
pub struct ImportDecl {
    /// The (possibly relative) module URI, or glob pattern for `import*`.
    pub uri: Rc<str>,
    /// Binding name; defaults to the last URI segment's stem when absent.
    pub alias: Option<Identifier>,
    /// Whether this is a globbed `import*`.
    pub glob: bool,
    pub span: Span,
}

/// The `extends`/`amends` clause of a module declaration.
#[derive(Debug)]
pub enum ModuleClause {
    Extends { uri: Rc<str>, span: Span },
    Amends { uri: Rc<str>, span: Span },
}

/// A top-level module entry.
#[derive(Debug)]
pub enum ModuleEntry {
    Class(Rc<ClassDecl>),
    TypeAlias(Rc<TypeAliasDecl>),
    Property(PropertyDecl),
    Method(Rc<MethodDecl>),
}

/// A parsed module: the root of the CST handed to the driver.
#[derive(Debug)]
pub struct ModuleCst {
    /// The module's canonical URI (set by the loader).
    pub uri: Rc<str>,
    /// The declared module name, when the module has a declaration.
    pub name: Option<Rc<str>>,
    /// The `extends`/`amends` clause, if any.
    pub clause: Option<ModuleClause>,
    /// Imports in source order.
    pub imports: Vec<ImportDecl>,
    /// Top-level entries in source order.
    pub entries: Vec<ModuleEntry>,
}

impl ModuleCst {
    /// Creates an undeclared module with the given URI and entries.
    #[must_use]
    pub fn new(uri: impl Into<Rc<str>>, entries: Vec<ModuleEntry>) -> Rc<Self> {
        Rc::new(Self {
            uri: uri.into(),
            name: None,
            clause: None,
            imports: Vec::new(),
            entries,
        })
    }
}
