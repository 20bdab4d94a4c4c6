//! Activation records.
//!
//! A frame holds typed slots for `let` bindings and function parameters,
//! an auxiliary untyped slot region that `for` generators use to pass
//! iteration variables into nested object bodies, and the custom-`this`
//! slot consulted inside type-constraint and member-predicate scopes.
//!
//! Frames are immutable once created; every binding form pushes a child
//! frame. Each object construction pushes a *boundary* frame, so the
//! frame chain crosses owner levels in lockstep with the enclosing-owner
//! chain: the name resolver walks slots up to the next boundary, checks
//! the level's owner members, crosses the boundary, and repeats. The
//! chain is materialized into each object at construction time so member
//! thunks can be forced long after their defining scope's evaluation has
//! returned.

use std::rc::Rc;

use crate::{intern::Identifier, module::ModuleScope, value::Value};

/// The kind tag of a typed slot, set on first write.
///
/// Slots are written exactly once (frames are immutable), so "never
/// downgraded" holds by construction; the tag is kept for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    Int,
    Float,
    Bool,
    Object,
}

impl SlotKind {
    fn of(value: &Value) -> Self {
        match value {
            Value::Int(_) => Self::Int,
            Value::Float(_) => Self::Float,
            Value::Bool(_) => Self::Bool,
            _ => Self::Object,
        }
    }
}

/// A typed frame slot.
#[derive(Debug, Clone)]
pub struct Slot {
    pub kind: SlotKind,
    pub value: Value,
}

impl Slot {
    fn new(value: Value) -> Self {
        Self {
            kind: SlotKind::of(&value),
            value,
        }
    }
}

/// The const discipline in effect for code evaluated under a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConstMode {
    /// No const restriction.
    #[default]
    None,
    /// Reads targeting the module object must resolve to `const` members
    /// (class bodies).
    Module,
    /// Every owner read at or beyond the given depth must resolve to
    /// `const` members (type-alias bodies, `const` member bodies). The
    /// depth counts owner levels belonging to the const expression
    /// itself: objects instantiated inside it are exempt.
    All(u16),
}

/// An activation record.
#[derive(Debug)]
pub struct Frame {
    parent: Option<Rc<Frame>>,
    /// Scope of the module whose source this frame evaluates.
    scope: Rc<ModuleScope>,
    /// Whether this frame starts a new owner level (object construction
    /// sites and module roots).
    boundary: bool,
    /// Slot names, parallel to `slots`.
    names: Vec<Identifier>,
    slots: Vec<Slot>,
    /// Auxiliary region: `for`-generator iteration variables.
    aux: Vec<(Identifier, Value)>,
    /// Candidate value inside constraint/predicate scopes.
    custom_this: Option<Value>,
    const_mode: ConstMode,
}

impl Frame {
    fn child(parent: &Rc<Self>) -> Self {
        Self {
            parent: Some(Rc::clone(parent)),
            scope: Rc::clone(&parent.scope),
            boundary: false,
            names: Vec::new(),
            slots: Vec::new(),
            aux: Vec::new(),
            custom_this: None,
            const_mode: parent.const_mode,
        }
    }

    /// Creates a module root frame: the outermost boundary.
    #[must_use]
    pub fn module_root(scope: Rc<ModuleScope>) -> Rc<Self> {
        Rc::new(Self {
            parent: None,
            scope,
            boundary: true,
            names: Vec::new(),
            slots: Vec::new(),
            aux: Vec::new(),
            custom_this: None,
            const_mode: ConstMode::None,
        })
    }

    /// Creates the boundary frame of a new object construction.
    #[must_use]
    pub fn child_boundary(parent: &Rc<Self>) -> Rc<Self> {
        let mut frame = Self::child(parent);
        frame.boundary = true;
        Rc::new(frame)
    }

    /// Creates a child frame with a single `let`-bound slot.
    #[must_use]
    pub fn child_let(parent: &Rc<Self>, name: Identifier, value: Value) -> Rc<Self> {
        let mut frame = Self::child(parent);
        frame.names = vec![name];
        frame.slots = vec![Slot::new(value)];
        Rc::new(frame)
    }

    /// Creates a call frame binding parameter slots.
    #[must_use]
    pub fn child_call(parent: &Rc<Self>, names: Vec<Identifier>, values: Vec<Value>) -> Rc<Self> {
        debug_assert_eq!(names.len(), values.len());
        let mut frame = Self::child(parent);
        frame.slots = values.into_iter().map(Slot::new).collect();
        frame.names = names;
        Rc::new(frame)
    }

    /// Creates an aux frame for one `for`-generator iteration; the parent
    /// level's iteration variables are copied in so nested bodies see the
    /// whole stack of loop variables.
    #[must_use]
    pub fn child_aux(parent: &Rc<Self>, vars: Vec<(Identifier, Value)>) -> Rc<Self> {
        let mut frame = Self::child(parent);
        let mut aux = parent.aux.clone();
        aux.extend(vars);
        frame.aux = aux;
        Rc::new(frame)
    }

    /// Creates a custom-`this` frame for constraint/predicate evaluation.
    #[must_use]
    pub fn child_custom_this(parent: &Rc<Self>, candidate: Value) -> Rc<Self> {
        let mut frame = Self::child(parent);
        frame.custom_this = Some(candidate);
        Rc::new(frame)
    }

    /// Creates a frame that switches the const discipline.
    #[must_use]
    pub fn child_const(parent: &Rc<Self>, const_mode: ConstMode) -> Rc<Self> {
        let mut frame = Self::child(parent);
        frame.const_mode = const_mode;
        Rc::new(frame)
    }

    /// The lexically enclosing frame, if any.
    #[must_use]
    pub fn parent(&self) -> Option<&Rc<Self>> {
        self.parent.as_ref()
    }

    /// The module scope this frame evaluates under.
    #[must_use]
    pub fn scope(&self) -> &Rc<ModuleScope> {
        &self.scope
    }

    /// Whether this frame starts a new owner level.
    #[must_use]
    pub fn is_boundary(&self) -> bool {
        self.boundary
    }

    /// Index of the named slot in this frame, if present.
    #[must_use]
    pub fn slot_index(&self, name: Identifier) -> Option<usize> {
        self.names.iter().position(|n| *n == name)
    }

    /// Reads a slot by index.
    #[must_use]
    pub fn slot(&self, index: usize) -> &Slot {
        &self.slots[index]
    }

    /// Index of the named aux variable, if present.
    #[must_use]
    pub fn aux_index(&self, name: Identifier) -> Option<usize> {
        self.aux.iter().position(|(n, _)| *n == name)
    }

    /// Reads an aux variable by index.
    #[must_use]
    pub fn aux(&self, index: usize) -> &Value {
        &self.aux[index].1
    }

    /// The nearest custom-`this` on the chain, if the current code sits
    /// inside a constraint or predicate scope.
    #[must_use]
    pub fn find_custom_this(&self) -> Option<Value> {
        if let Some(candidate) = &self.custom_this {
            return Some(candidate.clone());
        }
        self.parent.as_ref().and_then(|p| p.find_custom_this())
    }

    /// The const discipline in effect.
    #[must_use]
    pub fn const_mode(&self) -> ConstMode {
        self.const_mode
    }
}
