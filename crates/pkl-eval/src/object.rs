//! Objects: the four flavors, member storage, and the amend chain.
//!
//! A `VmObject` is created by an object literal, `new`, `amends`, or an
//! amending property expression, and is immutable afterwards; the only
//! observable mutation is the growth of the write-once memo cache. Member
//! lookup walks the parent chain (amend target or class prototype), and
//! the enclosing-owner chain roots at the module object.

use std::{cell::RefCell, rc::Rc};

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::{
    ast::{ExprLoc, ObjectBody, Span},
    frame::Frame,
    intern::Identifier,
    member::{Member, MemberKey},
    types::VmClass,
    value::{Value, ValueHashState},
};

/// The four object flavors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjKind {
    /// Bound to a class; the member key set is closed.
    Typed,
    /// Accepts any members.
    Dynamic,
    /// Integer-indexed elements.
    Listing,
    /// Keyed by arbitrary values.
    Mapping,
}

impl ObjKind {
    /// Kind name for error messages.
    #[must_use]
    pub fn type_name(self) -> &'static str {
        match self {
            Self::Typed => "Typed",
            Self::Dynamic => "Dynamic",
            Self::Listing => "Listing",
            Self::Mapping => "Mapping",
        }
    }
}

/// The value side of a member predicate.
#[derive(Debug)]
pub enum PredicateValue {
    Expr(Rc<ExprLoc>),
    Body(Rc<ObjectBody>),
}

/// A `[[cond]] = value` member: a conditional entry that decides at force
/// time which of the parent's members it amends.
#[derive(Debug)]
pub struct PredicateMember {
    pub cond: Rc<ExprLoc>,
    pub value: PredicateValue,
    /// Frame the predicate was installed under.
    pub env: Rc<Frame>,
    pub span: Span,
}

/// A runtime object.
#[derive(Debug)]
pub struct VmObject {
    pub kind: ObjKind,
    pub class: Rc<VmClass>,
    /// The amend target or class prototype; `None` only for prototypes
    /// themselves and the synthetic roots of the prelude.
    pub parent: Option<Value>,
    /// The enclosing owner at the construction site; `None` for module
    /// objects (the owner chain's roots).
    pub enclosing: Option<Value>,
    /// Materialized enclosing frame snapshot.
    pub frame: Rc<Frame>,
    members: IndexMap<MemberKey, Rc<Member>, ValueHashState>,
    predicates: Vec<PredicateMember>,
    memo: RefCell<AHashMap<MemberKey, Value>>,
}

impl VmObject {
    /// Creates an object. The member table must already be in source
    /// order; keys are unique by construction of the table.
    #[must_use]
    pub fn new(
        kind: ObjKind,
        class: Rc<VmClass>,
        parent: Option<Value>,
        enclosing: Option<Value>,
        frame: Rc<Frame>,
        members: IndexMap<MemberKey, Rc<Member>, ValueHashState>,
        predicates: Vec<PredicateMember>,
    ) -> Rc<Self> {
        Rc::new(Self {
            kind,
            class,
            parent,
            enclosing,
            frame,
            members,
            predicates,
            memo: RefCell::new(AHashMap::new()),
        })
    }

    /// The object's own member for a key, not following the chain.
    #[must_use]
    pub fn get_member(&self, key: &MemberKey) -> Option<&Rc<Member>> {
        self.members.get(key)
    }

    /// Local-first property lookup: a `local x` on the same object
    /// shadows a public `x` for reads from the defining scope.
    #[must_use]
    pub fn get_prop_local_first(&self, name: Identifier) -> Option<&Rc<Member>> {
        self.members
            .get(&MemberKey::Prop(name.local_of()))
            .or_else(|| self.members.get(&MemberKey::Prop(name.public_of())))
    }

    /// Own members in insertion order.
    pub fn own_members(&self) -> impl Iterator<Item = (&MemberKey, &Rc<Member>)> {
        self.members.iter()
    }

    /// Number of own members (shape hashing).
    #[must_use]
    pub fn own_member_count(&self) -> usize {
        self.members.len()
    }

    /// The object's member predicates, in source order.
    #[must_use]
    pub fn predicates(&self) -> &[PredicateMember] {
        &self.predicates
    }

    /// The parent as an object, when present.
    #[must_use]
    pub fn parent_object(&self) -> Option<&Rc<VmObject>> {
        self.parent.as_ref().and_then(Value::as_object)
    }

    /// The enclosing owner as an object, when present.
    #[must_use]
    pub fn enclosing_object(&self) -> Option<&Rc<VmObject>> {
        self.enclosing.as_ref().and_then(Value::as_object)
    }

    /// Memoized value for a key, if already forced on this object.
    #[must_use]
    pub fn memo_get(&self, key: &MemberKey) -> Option<Value> {
        self.memo.borrow().get(key).cloned()
    }

    /// Memoizes a forced value. Write-once per key: a second write for
    /// the same key must carry the identical value.
    pub fn memo_put(&self, key: MemberKey, value: Value) {
        self.memo.borrow_mut().insert(key, value);
    }

    /// The chain from this object to the root, leaf first.
    #[must_use]
    pub fn chain(self: &Rc<Self>) -> Vec<Rc<Self>> {
        let mut chain = vec![Rc::clone(self)];
        let mut cur = Rc::clone(self);
        loop {
            let Some(parent) = cur.parent_object().cloned() else {
                break;
            };
            chain.push(Rc::clone(&parent));
            cur = parent;
        }
        chain
    }

    /// Effective member keys over the whole chain: parent key order wins,
    /// new keys append in installation order. `local` members never cross
    /// amend chains and methods are not part of the value surface, so
    /// both are excluded.
    #[must_use]
    pub fn effective_keys(self: &Rc<Self>) -> Vec<MemberKey> {
        let chain = self.chain();
        let mut keys: IndexMap<MemberKey, (), ValueHashState> = IndexMap::default();
        for obj in chain.iter().rev() {
            for (key, member) in obj.own_members() {
                if member.modifiers.is_local() || member.is_method() {
                    continue;
                }
                // first installation fixes the position
                keys.entry(key.clone()).or_insert(());
            }
        }
        keys.into_keys().collect()
    }

    /// The effective member for a key, walking the chain leaf-first,
    /// together with the object that defines it. Local-first for
    /// property keys. Predicates and defaults are the evaluator's
    /// concern; this is the raw chain lookup.
    #[must_use]
    pub fn find_member(self: &Rc<Self>, key: &MemberKey) -> Option<(Rc<Self>, Rc<Member>)> {
        let mut cur = Rc::clone(self);
        loop {
            let found = match key {
                MemberKey::Prop(name) => cur.get_prop_local_first(*name),
                other => cur.get_member(other),
            };
            if let Some(member) = found {
                return Some((Rc::clone(&cur), Rc::clone(member)));
            }
            let next = cur.parent_object().cloned()?;
            cur = next;
        }
    }

    /// The number of elements of a listing, over the whole chain.
    ///
    /// Elements are installed with absolute indices (a child's new
    /// elements start at the parent's length), so the length is one past
    /// the largest index seen on the chain.
    #[must_use]
    pub fn listing_length(self: &Rc<Self>) -> i64 {
        let mut max: i64 = -1;
        for obj in self.chain() {
            for (key, _) in obj.own_members() {
                if let MemberKey::Index(i) = key
                    && *i > max
                {
                    max = *i;
                }
            }
        }
        max + 1
    }

}

/// Structural equality of two objects.
///
/// Callers must deep-force both sides first (the evaluator's `==` and
/// map-key insertion do); unforced members compare unequal unless the
/// two objects are the same allocation.
#[must_use]
pub fn object_eq(a: &Rc<VmObject>, b: &Rc<VmObject>) -> bool {
    if Rc::ptr_eq(a, b) {
        return true;
    }
    if a.kind != b.kind || !Rc::ptr_eq(&a.class, &b.class) {
        return false;
    }
    let keys_a = a.effective_keys();
    let keys_b = b.effective_keys();
    if keys_a.len() != keys_b.len() {
        return false;
    }
    for key in &keys_a {
        if let MemberKey::Prop(_) = key {
            if !keys_b.contains(key) {
                return false;
            }
        }
        let (Some(va), Some(vb)) = (a.memo_get(key), b.memo_get(key)) else {
            return false;
        };
        if va != vb {
            return false;
        }
    }
    // listings compare index-by-index above; mappings need the key sets
    // to match, which the containment check on props plus equal lengths
    // does not guarantee for entry keys
    for key in &keys_b {
        if matches!(key, MemberKey::Entry(_)) && !keys_a.contains(key) {
            return false;
        }
    }
    true
}
