//! Name resolution.
//!
//! An unresolved name is decided once per call site: frame slots (let
//! bindings, parameters, generator variables) on the lexical chain
//! outward, then the `local` companion member, then the public member on
//! each enclosing owner, then the base-module prototype, and finally an
//! implicit-`this` property read. The decision is cached on the name node
//! (one-shot specialization), so later evaluations skip the walk — the
//! walk is the expensive part for deeply nested configurations.
//!
//! The frame chain and the owner chain advance in lockstep: every object
//! construction pushed a boundary frame, so the walk consumes slot frames
//! up to the next boundary, checks that level's owner members, crosses
//! the boundary, and steps one owner out.
//!
//! The const discipline is enforced here, at resolve time: a resolve from
//! a const scope that lands on a non-`const` member outside the scope's
//! own depth fails with `propertyMustBeConst`/`methodMustBeConst`.

use std::rc::Rc;

use crate::{
    ast::{NameRef, Span},
    error::{Error, ErrorKind, EvalResult},
    eval::{Ctx, Evaluator},
    frame::{ConstMode, Frame},
    intern::Identifier,
    io::TraceWriter,
    member::{Member, MemberBody, MemberKey},
    object::VmObject,
    resource::ResourceTracker,
    stdlib,
    value::Value,
};

/// A specialized read, produced by the first execution of a name node.
#[derive(Debug, Clone)]
pub(crate) enum ResolvedRead {
    /// A typed frame slot `hops` frames up the chain.
    FrameSlot { hops: u16, index: u16 },
    /// A generator variable in the aux region `hops` frames up.
    AuxSlot { hops: u16, index: u16 },
    /// A `local` member of the owner `depth` levels out. Locals are not
    /// late-bound: the read targets the owner object itself.
    LocalMember { depth: u16, key: Identifier },
    /// A public member found lexically `depth` levels out. Depth 0 reads
    /// on the receiver (`this`), late-bound; outer levels read on the
    /// captured enclosing objects.
    OwnerMember { depth: u16, key: Identifier },
    /// A member of the candidate value in a custom-`this` scope.
    CustomThisMember { key: Identifier },
    /// A member of the base module.
    BaseMember { key: Identifier },
    /// A pre-materialized constant (immutable base-module values).
    Constant(Value),
}

/// Walks `levels` owners out from the lexical owner.
fn owner_at(start: &Value, levels: u16) -> Option<Value> {
    let mut cur = start.clone();
    for _ in 0..levels {
        let next = cur.as_object()?.enclosing.clone()?;
        cur = next;
    }
    Some(cur)
}

/// Finds a member (local companion first) anywhere on an owner's amend
/// chain, for resolve-time existence and const checks.
fn owner_chain_member(obj: &Rc<VmObject>, name: Identifier) -> Option<(Rc<Member>, Identifier)> {
    let mut cur = Rc::clone(obj);
    loop {
        if let Some(member) = cur.get_member(&MemberKey::Prop(name.local_of())) {
            return Some((Rc::clone(member), name.local_of()));
        }
        if let Some(member) = cur.get_member(&MemberKey::Prop(name.public_of())) {
            return Some((Rc::clone(member), name.public_of()));
        }
        let next = cur.parent_object().cloned()?;
        cur = next;
    }
}

/// Resolves and reads a name, caching the decision on the node.
pub(crate) fn resolve_and_read<T: ResourceTracker, W: TraceWriter>(
    eval: &mut Evaluator<'_, T, W>,
    node: &NameRef,
    ctx: &Ctx,
    span: Span,
) -> EvalResult<Value> {
    let cached = node.resolution.borrow().clone();
    let read = match cached {
        Some(read) => read,
        None => {
            let read = resolve(eval, node.name, ctx, span)?;
            *node.resolution.borrow_mut() = Some(read.clone());
            read
        }
    };
    execute(eval, &read, ctx, span)
}

/// The decision procedure.
pub(crate) fn resolve<T: ResourceTracker, W: TraceWriter>(
    eval: &mut Evaluator<'_, T, W>,
    name: Identifier,
    ctx: &Ctx,
    span: Span,
) -> EvalResult<ResolvedRead> {
    // custom-this scopes bind bare names to the candidate's members first
    if let Some(candidate) = ctx.frame.find_custom_this()
        && value_has_member(eval, &candidate, name)
    {
        return Ok(ResolvedRead::CustomThisMember { key: name.public_of() });
    }

    let mut frame: Option<Rc<Frame>> = Some(Rc::clone(&ctx.frame));
    let mut hops: u16 = 0;
    let mut owner: Option<Value> = Some(ctx.owner.clone());
    let mut depth: u16 = 0;

    while let Some(owner_value) = owner {
        // slot frames of this level, up to the next boundary
        while let Some(f) = frame.clone() {
            if f.is_boundary() {
                break;
            }
            if let Some(index) = f.aux_index(name).or_else(|| f.aux_index(name.local_of())) {
                return Ok(ResolvedRead::AuxSlot {
                    hops,
                    index: index as u16,
                });
            }
            if let Some(index) = f.slot_index(name).or_else(|| f.slot_index(name.local_of())) {
                return Ok(ResolvedRead::FrameSlot {
                    hops,
                    index: index as u16,
                });
            }
            frame = f.parent().cloned();
            hops += 1;
        }

        // members of this level's owner
        if let Some(obj) = owner_value.as_object()
            && let Some((member, key)) = owner_chain_member(obj, name)
        {
            check_const(eval, ctx, &member, depth, &owner_value, key, span)?;
            return Ok(if key.is_local() {
                ResolvedRead::LocalMember { depth, key }
            } else {
                ResolvedRead::OwnerMember { depth, key }
            });
        }

        // cross the boundary and step one owner out
        if let Some(f) = frame.clone() {
            frame = f.parent().cloned();
            hops += 1;
        }
        owner = owner_value.as_object().and_then(|o| o.enclosing.clone());
        depth += 1;
    }

    // import bindings of the enclosing module; imported modules are
    // cached by URI and implicitly const, so the binding is a constant
    if let Some(value) = ctx.frame.scope().import(name) {
        return Ok(ResolvedRead::Constant(value));
    }

    // the base module, unless this call site is inside it
    if !ctx.frame.scope().is_base
        && let Some(member) = eval.stdlib.base_object().get_prop_local_first(name)
    {
        // immutable primitive constants are specialized all the way
        if let MemberBody::Constant(value) = &member.body
            && !matches!(value, Value::Object(_))
        {
            return Ok(ResolvedRead::Constant(value.clone()));
        }
        return Ok(ResolvedRead::BaseMember { key: name.public_of() });
    }

    // implicit-this read; a const scope requires the target to be const
    if ctx.frame.const_mode() != ConstMode::None
        && let Some(obj) = ctx.this.as_object()
        && let Some((member, key)) = owner_chain_member(obj, name)
    {
        check_const(eval, ctx, &member, 0, &ctx.this, key, span)?;
    }
    Ok(ResolvedRead::OwnerMember {
        depth: 0,
        key: name.public_of(),
    })
}

/// Const discipline check for a member hit at `depth` owner levels out.
fn check_const<T: ResourceTracker, W: TraceWriter>(
    eval: &Evaluator<'_, T, W>,
    ctx: &Ctx,
    member: &Rc<Member>,
    depth: u16,
    owner_value: &Value,
    key: Identifier,
    span: Span,
) -> EvalResult<()> {
    let violation = match ctx.frame.const_mode() {
        ConstMode::None => false,
        ConstMode::All(own_depth) => depth >= own_depth && !member.modifiers.is_const(),
        ConstMode::Module => {
            let is_module = owner_value
                .as_object()
                .is_some_and(|o| o.enclosing.is_none());
            is_module && !member.modifiers.is_const()
        }
    };
    if violation {
        let (kind, what) = if member.is_method() {
            (ErrorKind::MethodMustBeConst, "method")
        } else {
            (ErrorKind::PropertyMustBeConst, "property")
        };
        let name = eval.interner.display(key);
        return Err(eval.err(
            kind,
            format!("cannot reference {what} `{name}` from a const scope unless it is `const`"),
            span,
        ));
    }
    Ok(())
}

/// Whether a value has a member under `name` (for custom-this scopes).
fn value_has_member<T: ResourceTracker, W: TraceWriter>(
    eval: &mut Evaluator<'_, T, W>,
    value: &Value,
    name: Identifier,
) -> bool {
    if let Some(obj) = value.as_object() {
        if owner_chain_member(obj, name).is_some() {
            return true;
        }
        if obj.class.lookup_property(name).is_some() || obj.class.lookup_method(name).is_some() {
            return true;
        }
    }
    stdlib::has_builtin_member(eval, value, name)
}

/// Executes a specialized read.
pub(crate) fn execute<T: ResourceTracker, W: TraceWriter>(
    eval: &mut Evaluator<'_, T, W>,
    read: &ResolvedRead,
    ctx: &Ctx,
    span: Span,
) -> EvalResult<Value> {
    match read {
        ResolvedRead::FrameSlot { hops, index } => {
            let frame = frame_at(&ctx.frame, *hops);
            Ok(frame.slot(*index as usize).value.clone())
        }
        ResolvedRead::AuxSlot { hops, index } => {
            let frame = frame_at(&ctx.frame, *hops);
            Ok(frame.aux(*index as usize).clone())
        }
        ResolvedRead::LocalMember { depth, key } => {
            let owner = self_owner(eval, ctx, *depth, span)?;
            eval.read_member(&owner, &MemberKey::Prop(*key), span)
        }
        ResolvedRead::OwnerMember { depth, key } => {
            let receiver = if *depth == 0 {
                ctx.this.clone()
            } else {
                self_owner(eval, ctx, *depth, span)?
            };
            eval.read_member(&receiver, &MemberKey::Prop(*key), span)
        }
        ResolvedRead::CustomThisMember { key } => {
            let candidate = ctx
                .frame
                .find_custom_this()
                .ok_or_else(|| eval.err(ErrorKind::CannotFindProperty, "no candidate value in scope", span))?;
            eval.read_member(&candidate, &MemberKey::Prop(*key), span)
        }
        ResolvedRead::BaseMember { key } => {
            let base = eval.stdlib.base_value();
            eval.read_member(&base, &MemberKey::Prop(*key), span)
        }
        ResolvedRead::Constant(value) => Ok(value.clone()),
    }
}

fn self_owner<T: ResourceTracker, W: TraceWriter>(
    eval: &Evaluator<'_, T, W>,
    ctx: &Ctx,
    depth: u16,
    span: Span,
) -> Result<Value, Box<Error>> {
    owner_at(&ctx.owner, depth)
        .ok_or_else(|| eval.err(ErrorKind::CannotFindProperty, "owner chain ended unexpectedly", span))
}

/// Walks `hops` frames up the chain.
fn frame_at(start: &Rc<Frame>, hops: u16) -> Rc<Frame> {
    let mut cur = Rc::clone(start);
    for _ in 0..hops {
        let next = cur.parent().cloned().expect("specialized frame depth is stable");
        cur = next;
    }
    cur
}
