//! Member descriptors: the entries of an object's ordered member table.

use std::rc::Rc;

use bitflags::bitflags;

use crate::{
    ast::{ExprLoc, MethodDecl, ObjectBody, Span},
    frame::Frame,
    intern::Identifier,
    types::VmType,
    value::Value,
};

bitflags! {
    /// Member modifiers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Modifiers: u16 {
        /// Not visible across amend chains, never rendered.
        const LOCAL = 1 << 0;
        /// Skipped by renderers, still readable.
        const HIDDEN = 1 << 1;
        /// May not be overridden by amending.
        const FIXED = 1 << 2;
        /// Readable from const scopes; body checked under the const discipline.
        const CONST = 1 << 3;
        /// Implemented outside the language (prelude members).
        const EXTERNAL = 1 << 4;
        /// Abstract class or method.
        const ABSTRACT = 1 << 5;
        /// Class open for extension.
        const OPEN = 1 << 6;
    }
}

impl Modifiers {
    /// Whether the member is `local`.
    #[must_use]
    pub fn is_local(self) -> bool {
        self.contains(Self::LOCAL)
    }

    /// Whether the member is `hidden`.
    #[must_use]
    pub fn is_hidden(self) -> bool {
        self.contains(Self::HIDDEN)
    }

    /// Whether the member is `const`.
    #[must_use]
    pub fn is_const(self) -> bool {
        self.contains(Self::CONST)
    }
}

/// The key of a member: a named property, an integer element index, or an
/// arbitrary-value entry key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MemberKey {
    /// A named property (`local` names use the identifier's companion id).
    Prop(Identifier),
    /// An element index (listings).
    Index(i64),
    /// An entry key (mappings, dynamic objects); the key value is forced
    /// eagerly at installation time.
    Entry(Value),
}

impl MemberKey {
    /// The property identifier, if this is a named member.
    #[must_use]
    pub fn as_prop(&self) -> Option<Identifier> {
        match self {
            Self::Prop(id) => Some(*id),
            _ => None,
        }
    }
}

/// Members synthesized by the evaluator rather than declared in source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntheticMember {
    /// The module's `output` object.
    ModuleOutput,
    /// `output.value` — the module instance itself.
    OutputValue,
    /// `output.text` — the rendered form of `output.value`.
    OutputText,
}

/// The unforced body of a member.
#[derive(Debug)]
pub enum MemberBody {
    /// A precomputed constant; reads return it directly.
    Constant(Value),
    /// A lazy expression thunk, bound to its defining scope.
    Expr(Rc<ExprLoc>),
    /// An amending object body: forcing builds a child of the member's
    /// inherited value (or of the declared type's default).
    Body(Rc<ObjectBody>),
    /// A method; reads yield a function bound to the receiver.
    Method(Rc<MethodDecl>),
    /// An evaluator-synthesized member.
    Synthetic(SyntheticMember),
}

/// A member: key, modifiers, source location, optional doc string,
/// optional declared type, and an unforced body.
///
/// Members are immutable and shared (`Rc`) between the objects of an
/// amend chain. Members installed from inside a `for` generator carry
/// their iteration frame in `env`; all others evaluate in their owning
/// object's frame.
#[derive(Debug)]
pub struct Member {
    pub key: MemberKey,
    pub modifiers: Modifiers,
    pub span: Span,
    pub doc: Option<Rc<str>>,
    /// Declared type, checked when the member is forced.
    pub ty: Option<Rc<VmType>>,
    /// Per-member frame override (for-generator iterations).
    pub env: Option<Rc<Frame>>,
    pub body: MemberBody,
}

impl Member {
    /// Creates a plain member with no type, doc, or frame override.
    #[must_use]
    pub fn new(key: MemberKey, modifiers: Modifiers, span: Span, body: MemberBody) -> Rc<Self> {
        Rc::new(Self {
            key,
            modifiers,
            span,
            doc: None,
            ty: None,
            env: None,
            body,
        })
    }

    /// Creates a constant-valued member, the common case for prelude
    /// properties and spread results.
    #[must_use]
    pub fn constant(key: MemberKey, modifiers: Modifiers, value: Value) -> Rc<Self> {
        Self::new(key, modifiers, Span::none(), MemberBody::Constant(value))
    }

    /// Whether this member is a method rather than a property.
    #[must_use]
    pub fn is_method(&self) -> bool {
        matches!(self.body, MemberBody::Method(_))
    }
}
