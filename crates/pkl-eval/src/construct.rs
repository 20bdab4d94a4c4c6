//! Object construction.
//!
//! Turns an object body into a `VmObject`: installs properties, entries,
//! and elements in source order, expands `when` and `for` generators,
//! merges spreads, and records member predicates. Generator control
//! expressions (`when` conditions, `for` iterables, entry keys, spread
//! sources) evaluate eagerly in the surrounding scope; everything else
//! becomes a lazy member.
//!
//! Two frames are threaded through the walk: the *control* frame (the
//! construction site's scope, extended with iteration variables so that
//! nested control expressions see them) and the *env* frame (anchored at
//! the new object's boundary, captured into members installed inside
//! generator iterations so their thunks see the iteration variables when
//! forced later).

use std::rc::Rc;

use indexmap::IndexMap;

use crate::{
    ast::{MemberValueDecl, ObjectBody, ObjectMemberDecl, Span},
    error::{ErrorKind, EvalResult},
    eval::{Ctx, Evaluator},
    frame::{ConstMode, Frame},
    io::TraceWriter,
    member::{Member, MemberBody, MemberKey, Modifiers},
    object::{ObjKind, PredicateMember, PredicateValue, VmObject},
    resource::ResourceTracker,
    types::{self, VmClass, VmType},
    value::{Value, ValueHashState},
};

/// Evaluates `new T { body }` / contextual `new { body }`.
pub(crate) fn new_object<T: ResourceTracker, W: TraceWriter>(
    eval: &mut Evaluator<'_, T, W>,
    expected: Option<&Rc<VmType>>,
    body: &Rc<ObjectBody>,
    ctx: &Ctx,
    span: Span,
) -> EvalResult<Value> {
    let class = match expected.and_then(|ty| types::instantiable_class(ty)) {
        Some(class) => class,
        None => eval.stdlib.dynamic_class(),
    };
    if class.modifiers.contains(Modifiers::ABSTRACT) {
        return Err(eval.err(
            ErrorKind::TypeMismatch,
            format!("cannot instantiate abstract class {}", class.qualified_name),
            span,
        ));
    }
    let parent = class_prototype(eval, &class, span)?;
    construct(eval, parent, body, expected, ctx)
}

/// Evaluates `(parent) { body }` and amending property bodies.
pub(crate) fn amend_object<T: ResourceTracker, W: TraceWriter>(
    eval: &mut Evaluator<'_, T, W>,
    parent: Value,
    body: &Rc<ObjectBody>,
    ctx: &Ctx,
    _span: Span,
) -> EvalResult<Value> {
    let expected = ctx.expected.clone();
    construct(eval, parent, body, expected.as_ref(), ctx)
}

struct Builder {
    members: IndexMap<MemberKey, Rc<Member>, ValueHashState>,
    predicates: Vec<PredicateMember>,
    /// Index for the next appended element: continues the parent chain.
    next_index: i64,
}

/// The shared construction path: a parent value plus a body.
fn construct<T: ResourceTracker, W: TraceWriter>(
    eval: &mut Evaluator<'_, T, W>,
    parent: Value,
    body: &Rc<ObjectBody>,
    expected: Option<&Rc<VmType>>,
    ctx: &Ctx,
) -> EvalResult<Value> {
    let parent_obj = parent
        .as_object()
        .cloned()
        .expect("construction parents are always objects");
    if !body.params.is_empty() {
        return Err(eval.err(
            ErrorKind::WrongArgumentCount,
            "an object body with parameters can only be applied through amendment",
            body.span,
        ));
    }
    let kind = parent_obj.kind;
    let class = Rc::clone(&parent_obj.class);
    let (elem_ty, key_ty, val_ty) = element_types(eval, expected);

    let boundary = Frame::child_boundary(&ctx.frame);
    let mut builder = Builder {
        members: IndexMap::default(),
        predicates: Vec::new(),
        next_index: parent_obj.listing_length(),
    };
    let walk = Walk {
        kind,
        class: &class,
        elem_ty: elem_ty.as_ref(),
        key_ty: key_ty.as_ref(),
        val_ty: val_ty.as_ref(),
    };
    install_members(
        eval,
        &body.members,
        &ctx.frame,
        &boundary,
        false,
        &mut builder,
        &walk,
        ctx,
    )?;
    let object = VmObject::new(
        kind,
        class,
        Some(parent),
        Some(ctx.this.clone()),
        boundary,
        builder.members,
        builder.predicates,
    );
    Ok(Value::Object(object))
}

/// Construction-invariant context for the member walk.
struct Walk<'a> {
    kind: ObjKind,
    class: &'a Rc<VmClass>,
    elem_ty: Option<&'a Rc<VmType>>,
    key_ty: Option<&'a Rc<VmType>>,
    val_ty: Option<&'a Rc<VmType>>,
}

#[expect(clippy::too_many_arguments, reason = "the walk threads two frames plus the builder")]
fn install_members<T: ResourceTracker, W: TraceWriter>(
    eval: &mut Evaluator<'_, T, W>,
    decls: &[ObjectMemberDecl],
    control: &Rc<Frame>,
    env: &Rc<Frame>,
    in_generator: bool,
    builder: &mut Builder,
    walk: &Walk<'_>,
    ctx: &Ctx,
) -> EvalResult<()> {
    let control_ctx = Ctx::new(ctx.this.clone(), ctx.owner.clone(), Rc::clone(control));
    for decl in decls {
        match decl {
            ObjectMemberDecl::Property(p) => {
                let key_id = if p.modifiers.is_local() {
                    p.name.local_of()
                } else {
                    p.name
                };
                if walk.kind == ObjKind::Typed
                    && !p.modifiers.is_local()
                    && walk.class.lookup_property(p.name).is_none()
                {
                    return Err(eval.err(
                        ErrorKind::CannotFindProperty,
                        format!(
                            "cannot find property `{}` in class {}",
                            eval.interner.display(p.name),
                            walk.class.qualified_name
                        ),
                        p.span,
                    ));
                }
                let ty = match &p.ty {
                    Some(tr) => Some(types::resolve_type(eval, tr, control.scope(), control, &[])?),
                    None => {
                        if walk.kind == ObjKind::Typed {
                            walk.class
                                .lookup_property(p.name)
                                .and_then(|cp| cp.ty.borrow().clone())
                        } else {
                            None
                        }
                    }
                };
                let body = member_value_body(&p.value);
                let member = Rc::new(Member {
                    key: MemberKey::Prop(key_id),
                    modifiers: p.modifiers,
                    span: p.span,
                    doc: p.doc.clone(),
                    ty,
                    env: in_generator.then(|| Rc::clone(env)),
                    body,
                });
                builder.members.insert(MemberKey::Prop(key_id), member);
            }
            ObjectMemberDecl::Method(m) => {
                let key_id = if m.modifiers.is_local() {
                    m.name.local_of()
                } else {
                    m.name
                };
                let member = Rc::new(Member {
                    key: MemberKey::Prop(key_id),
                    modifiers: m.modifiers,
                    span: m.span,
                    doc: m.doc.clone(),
                    ty: None,
                    env: in_generator.then(|| Rc::clone(env)),
                    body: MemberBody::Method(Rc::clone(m)),
                });
                builder.members.insert(MemberKey::Prop(key_id), member);
            }
            ObjectMemberDecl::Entry { key, value } => {
                let key_value = eval.eval_expr(key, &control_ctx)?;
                eval.force_deep(&key_value, key.span)?;
                let member_key = match walk.kind {
                    ObjKind::Listing => {
                        let Value::Int(index) = key_value else {
                            return Err(eval.err(
                                ErrorKind::TypeMismatch,
                                format!("a listing entry key must be an Int but got {}", key_value.type_name()),
                                key.span,
                            ));
                        };
                        if index < 0 || index >= builder.next_index {
                            return Err(eval.err(
                                ErrorKind::ElementIndexOutOfRange,
                                format!(
                                    "element index {index} is out of range for a listing of length {}",
                                    builder.next_index
                                ),
                                key.span,
                            ));
                        }
                        MemberKey::Index(index)
                    }
                    ObjKind::Mapping | ObjKind::Dynamic => {
                        if let Some(key_ty) = walk.key_ty {
                            types::check_value(eval, &key_value, key_ty, key.span)?;
                        }
                        MemberKey::Entry(key_value)
                    }
                    ObjKind::Typed => {
                        return Err(eval.err(
                            ErrorKind::TypeMismatch,
                            "cannot add entries to a typed object",
                            key.span,
                        ));
                    }
                };
                let ty = match walk.kind {
                    ObjKind::Listing => walk.elem_ty.cloned(),
                    _ => walk.val_ty.cloned(),
                };
                let member = Rc::new(Member {
                    key: member_key.clone(),
                    modifiers: Modifiers::default(),
                    span: key.span,
                    doc: None,
                    ty,
                    env: in_generator.then(|| Rc::clone(env)),
                    body: member_value_body(value),
                });
                builder.members.insert(member_key, member);
            }
            ObjectMemberDecl::Element(expr) => {
                if matches!(walk.kind, ObjKind::Mapping | ObjKind::Typed) {
                    return Err(eval.err(
                        ErrorKind::TypeMismatch,
                        format!("cannot add elements to a {} object", walk.kind.type_name()),
                        expr.span,
                    ));
                }
                let key = MemberKey::Index(builder.next_index);
                builder.next_index += 1;
                let member = Rc::new(Member {
                    key: key.clone(),
                    modifiers: Modifiers::default(),
                    span: expr.span,
                    doc: None,
                    ty: walk.elem_ty.cloned(),
                    env: in_generator.then(|| Rc::clone(env)),
                    body: MemberBody::Expr(Rc::clone(expr)),
                });
                builder.members.insert(key, member);
            }
            ObjectMemberDecl::Spread { expr, nullable } => {
                let value = eval.eval_expr(expr, &control_ctx)?;
                if value.is_null() && *nullable {
                    continue;
                }
                spread_into(eval, &value, builder, walk, expr.span)?;
            }
            ObjectMemberDecl::When {
                cond,
                then_body,
                else_body,
            } => {
                let verdict = eval.eval_expr(cond, &control_ctx)?;
                let Value::Bool(selected) = verdict else {
                    return Err(eval.err(
                        ErrorKind::TypeMismatch,
                        format!("a when condition must be a Boolean but got {}", verdict.type_name()),
                        cond.span,
                    ));
                };
                let branch = if selected { then_body } else { else_body };
                install_members(eval, branch, control, env, in_generator, builder, walk, ctx)?;
            }
            ObjectMemberDecl::For {
                key_var,
                value_var,
                iterable,
                body,
            } => {
                let source = eval.eval_expr(iterable, &control_ctx)?;
                let pairs = iteration_pairs(eval, &source, iterable.span)?;
                for (key_value, item) in pairs {
                    let mut vars = Vec::with_capacity(2);
                    if let Some(key_var) = key_var {
                        vars.push((*key_var, key_value));
                    }
                    vars.push((*value_var, item));
                    let iter_control = Frame::child_aux(control, vars.clone());
                    let iter_env = Frame::child_aux(env, vars);
                    install_members(eval, body, &iter_control, &iter_env, true, builder, walk, ctx)?;
                }
            }
            ObjectMemberDecl::Predicate { cond, value } => {
                let predicate_value = match value {
                    MemberValueDecl::Expr(expr) => PredicateValue::Expr(Rc::clone(expr)),
                    MemberValueDecl::Body(body) => PredicateValue::Body(Rc::clone(body)),
                };
                builder.predicates.push(PredicateMember {
                    cond: Rc::clone(cond),
                    value: predicate_value,
                    env: Rc::clone(env),
                    span: cond.span,
                });
            }
        }
    }
    Ok(())
}

fn member_value_body(decl: &MemberValueDecl) -> MemberBody {
    match decl {
        MemberValueDecl::Expr(expr) => MemberBody::Expr(Rc::clone(expr)),
        MemberValueDecl::Body(body) => MemberBody::Body(Rc::clone(body)),
    }
}

/// Merges a spread source's members into the builder, in source order.
/// Elements re-index at the end of the listing under construction;
/// entries and properties overwrite like direct installs. Object sources
/// are forced shallowly first, per spread semantics.
fn spread_into<T: ResourceTracker, W: TraceWriter>(
    eval: &mut Evaluator<'_, T, W>,
    value: &Value,
    builder: &mut Builder,
    walk: &Walk<'_>,
    span: Span,
) -> EvalResult<()> {
    let mut append_element = |builder: &mut Builder, item: Value| {
        let key = MemberKey::Index(builder.next_index);
        builder.next_index += 1;
        let mut member = Member::constant(key.clone(), Modifiers::default(), item);
        if let Some(elem_ty) = walk.elem_ty {
            member = with_type(&member, Rc::clone(elem_ty));
        }
        builder.members.insert(key, member);
    };
    match value {
        Value::List(items) => {
            for item in items.iter() {
                append_element(builder, item.clone());
            }
            Ok(())
        }
        Value::Set(set) => {
            for item in &set.items {
                append_element(builder, item.clone());
            }
            Ok(())
        }
        Value::Map(map) => {
            if walk.kind == ObjKind::Listing {
                return Err(eval.err(
                    ErrorKind::TypeMismatch,
                    "cannot spread a Map into a listing",
                    span,
                ));
            }
            for (k, v) in &map.entries {
                let key = MemberKey::Entry(k.clone());
                builder
                    .members
                    .insert(key.clone(), Member::constant(key, Modifiers::default(), v.clone()));
            }
            Ok(())
        }
        Value::Object(source) => {
            for key in source.effective_keys() {
                let forced = eval.read_member(value, &key, span)?;
                match key {
                    MemberKey::Index(_) => append_element(builder, forced),
                    MemberKey::Entry(entry_key) => {
                        if walk.kind == ObjKind::Listing {
                            return Err(eval.err(
                                ErrorKind::TypeMismatch,
                                "cannot spread keyed entries into a listing",
                                span,
                            ));
                        }
                        let key = MemberKey::Entry(entry_key);
                        builder
                            .members
                            .insert(key.clone(), Member::constant(key, Modifiers::default(), forced));
                    }
                    MemberKey::Prop(name) => {
                        if walk.kind == ObjKind::Typed && walk.class.lookup_property(name).is_none() {
                            return Err(eval.err(
                                ErrorKind::CannotFindProperty,
                                format!(
                                    "cannot find property `{}` in class {}",
                                    eval.interner.display(name),
                                    walk.class.qualified_name
                                ),
                                span,
                            ));
                        }
                        let key = MemberKey::Prop(name);
                        builder
                            .members
                            .insert(key.clone(), Member::constant(key, Modifiers::default(), forced));
                    }
                }
            }
            Ok(())
        }
        other => Err(eval.err(
            ErrorKind::TypeMismatch,
            format!("cannot spread a value of type {}", other.type_name()),
            span,
        )),
    }
}

/// The `(key, value)` pairs a `for` generator iterates, in declared
/// order.
fn iteration_pairs<T: ResourceTracker, W: TraceWriter>(
    eval: &mut Evaluator<'_, T, W>,
    source: &Value,
    span: Span,
) -> EvalResult<Vec<(Value, Value)>> {
    match source {
        Value::List(items) => Ok(items
            .iter()
            .enumerate()
            .map(|(i, v)| (Value::Int(i as i64), v.clone()))
            .collect()),
        Value::Set(set) => Ok(set
            .items
            .iter()
            .enumerate()
            .map(|(i, v)| (Value::Int(i as i64), v.clone()))
            .collect()),
        Value::Map(map) => Ok(map.entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
        Value::Object(obj) => {
            let mut pairs = Vec::new();
            for key in obj.effective_keys() {
                match key {
                    MemberKey::Index(i) => {
                        let item = eval.read_member(source, &MemberKey::Index(i), span)?;
                        pairs.push((Value::Int(i), item));
                    }
                    MemberKey::Entry(entry_key) => {
                        let item = eval.read_member(source, &MemberKey::Entry(entry_key.clone()), span)?;
                        pairs.push((entry_key, item));
                    }
                    // named properties are not part of the iteration order
                    MemberKey::Prop(_) => {}
                }
            }
            Ok(pairs)
        }
        other => Err(eval.err(
            ErrorKind::TypeMismatch,
            format!("cannot iterate over a value of type {}", other.type_name()),
            span,
        )),
    }
}

/// Builds (and caches) the prototype object of a class: the parent of
/// every `new` instance, carrying the class's property defaults as lazy
/// members. Class bodies are const scopes at module level.
pub(crate) fn class_prototype<T: ResourceTracker, W: TraceWriter>(
    eval: &mut Evaluator<'_, T, W>,
    class: &Rc<VmClass>,
    span: Span,
) -> EvalResult<Value> {
    if let Some(prototype) = class.prototype() {
        return Ok(prototype);
    }
    let parent = match class.superclass() {
        Some(superclass) => Some(class_prototype(eval, &superclass, span)?),
        None => None,
    };
    let module_frame = class
        .module_frame()
        .unwrap_or_else(|| eval.stdlib.base_frame());
    let const_frame = Frame::child_const(&module_frame, ConstMode::Module);
    let boundary = Frame::child_boundary(&const_frame);
    let mut members: IndexMap<MemberKey, Rc<Member>, ValueHashState> = IndexMap::default();
    for name in class.own_property_names() {
        let property = class.own_property(name).expect("name comes from the table");
        let Some(decl) = &property.decl else {
            continue;
        };
        let Some(default) = &decl.default else {
            continue;
        };
        let key = MemberKey::Prop(name);
        let member = Rc::new(Member {
            key: key.clone(),
            modifiers: decl.modifiers,
            span: decl.span,
            doc: decl.doc.clone(),
            ty: property.ty.borrow().clone(),
            env: None,
            body: member_value_body(default),
        });
        members.insert(key, member);
    }
    let enclosing = module_frame.scope().module_value();
    let object = VmObject::new(
        class.instance_kind,
        Rc::clone(class),
        parent,
        enclosing,
        boundary,
        members,
        Vec::new(),
    );
    let prototype = Value::Object(object);
    class.set_prototype(prototype.clone());
    Ok(prototype)
}

/// Element/key/value types for contextual checking, extracted from a
/// Listing/Mapping expected type.
fn element_types<T: ResourceTracker, W: TraceWriter>(
    eval: &Evaluator<'_, T, W>,
    expected: Option<&Rc<VmType>>,
) -> (Option<Rc<VmType>>, Option<Rc<VmType>>, Option<Rc<VmType>>) {
    let Some(mut ty) = expected.cloned() else {
        return (None, None, None);
    };
    loop {
        ty = match &*ty {
            VmType::Nullable(inner) | VmType::DefaultUnion(inner) => Rc::clone(inner),
            VmType::Constrained { base, .. } => Rc::clone(base),
            VmType::Alias { alias, args } => match types::expand_alias(alias, args) {
                Some(body) => body,
                None => return (None, None, None),
            },
            VmType::Class { class, args } => {
                if Rc::ptr_eq(class, &eval.stdlib.listing_class()) && args.len() == 1 {
                    return (Some(Rc::clone(&args[0])), None, None);
                }
                if Rc::ptr_eq(class, &eval.stdlib.mapping_class()) && args.len() == 2 {
                    return (None, Some(Rc::clone(&args[0])), Some(Rc::clone(&args[1])));
                }
                return (None, None, None);
            }
            _ => return (None, None, None),
        };
    }
}

fn with_type(member: &Rc<Member>, ty: Rc<VmType>) -> Rc<Member> {
    Rc::new(Member {
        key: member.key.clone(),
        modifiers: member.modifiers,
        span: member.span,
        doc: member.doc.clone(),
        ty: Some(ty),
        env: member.env.clone(),
        body: match &member.body {
            MemberBody::Constant(v) => MemberBody::Constant(v.clone()),
            _ => unreachable!("only constant members get retyped"),
        },
    })
}

