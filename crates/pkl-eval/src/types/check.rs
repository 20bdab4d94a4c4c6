//! Type resolution and value checking.

use std::rc::Rc;

use ahash::AHashMap;

use crate::{
    ast::{Span, TypeRef},
    error::{ErrorKind, EvalResult},
    eval::{Ctx, Evaluator},
    frame::Frame,
    intern::Identifier,
    io::TraceWriter,
    module::ModuleScope,
    resource::ResourceTracker,
    types::{VmClass, VmType, VmTypeAlias},
    value::Value,
};

/// Resolves a source type to a [`VmType`] under a module scope.
///
/// `type_params` are the parameters in scope (class or alias
/// declarations); matching bare names resolve to `VmType::Parameter`.
pub(crate) fn resolve_type<T: ResourceTracker, W: TraceWriter>(
    eval: &mut Evaluator<'_, T, W>,
    type_ref: &TypeRef,
    scope: &Rc<ModuleScope>,
    frame: &Rc<Frame>,
    type_params: &[Identifier],
) -> EvalResult<Rc<VmType>> {
    let resolved = match type_ref {
        TypeRef::Unknown => VmType::Unknown,
        TypeRef::Nothing => VmType::Nothing,
        TypeRef::Module => VmType::Module,
        TypeRef::StringConstant(s) => VmType::StringConstant(Rc::clone(s)),
        TypeRef::Parenthesized(inner) => return resolve_type(eval, inner, scope, frame, type_params),
        TypeRef::Nullable(inner) => VmType::Nullable(resolve_type(eval, inner, scope, frame, type_params)?),
        TypeRef::Union(left, right) => VmType::Union(
            resolve_type(eval, left, scope, frame, type_params)?,
            resolve_type(eval, right, scope, frame, type_params)?,
        ),
        TypeRef::DefaultUnion(inner) => VmType::DefaultUnion(resolve_type(eval, inner, scope, frame, type_params)?),
        TypeRef::Constrained { base, predicates } => VmType::Constrained {
            base: resolve_type(eval, base, scope, frame, type_params)?,
            predicates: predicates.clone(),
            env: Rc::clone(frame),
        },
        TypeRef::Function { params, ret } => {
            let mut resolved_params = Vec::with_capacity(params.len());
            for param in params {
                resolved_params.push(resolve_type(eval, param, scope, frame, type_params)?);
            }
            VmType::Function {
                params: resolved_params,
                ret: resolve_type(eval, ret, scope, frame, type_params)?,
            }
        }
        TypeRef::Declared { qualifier, name, args } => {
            if qualifier.is_none() && args.is_empty() && type_params.contains(name) {
                return Ok(Rc::new(VmType::Parameter(*name)));
            }
            let mut resolved_args = Vec::with_capacity(args.len());
            for arg in args {
                resolved_args.push(resolve_type(eval, arg, scope, frame, type_params)?);
            }
            return resolve_declared(eval, *qualifier, *name, resolved_args, scope, Span::none());
        }
    };
    Ok(Rc::new(resolved))
}

/// Resolves a declared type name to a class or alias handle.
fn resolve_declared<T: ResourceTracker, W: TraceWriter>(
    eval: &mut Evaluator<'_, T, W>,
    qualifier: Option<Identifier>,
    name: Identifier,
    args: Vec<Rc<VmType>>,
    scope: &Rc<ModuleScope>,
    span: Span,
) -> EvalResult<Rc<VmType>> {
    let target_scope: Rc<ModuleScope> = match qualifier {
        Some(qualifier) => {
            let Some(import) = scope.import(qualifier) else {
                return Err(eval.err(
                    ErrorKind::TypeMismatch,
                    format!("cannot find import `{}`", eval.interner.display(qualifier)),
                    span,
                ));
            };
            let Some(module) = import.as_object() else {
                return Err(eval.err(
                    ErrorKind::TypeMismatch,
                    format!("`{}` is not a module", eval.interner.display(qualifier)),
                    span,
                ));
            };
            Rc::clone(module.frame.scope())
        }
        None => Rc::clone(scope),
    };
    if let Some(class) = target_scope
        .class(name)
        .or_else(|| eval.stdlib.base_class(name))
    {
        return Ok(Rc::new(VmType::Class { class, args }));
    }
    if let Some(alias) = target_scope
        .alias(name)
        .or_else(|| eval.stdlib.base_alias(name))
    {
        return Ok(Rc::new(VmType::Alias { alias, args }));
    }
    Err(eval.err(
        ErrorKind::TypeMismatch,
        format!("cannot find type `{}`", eval.interner.display(name)),
        span,
    ))
}

/// Substitutes an alias application's arguments into its body.
///
/// `None` when the alias body is not yet resolved — which only happens
/// for an alias referring to itself during its own resolution.
pub(crate) fn expand_alias(alias: &Rc<VmTypeAlias>, args: &[Rc<VmType>]) -> Option<Rc<VmType>> {
    let body = alias.body()?;
    if alias.type_params.is_empty() {
        return Some(body);
    }
    let mut env: AHashMap<Identifier, Rc<VmType>> = AHashMap::with_capacity(alias.type_params.len());
    for (param, arg) in alias.type_params.iter().zip(args) {
        env.insert(*param, Rc::clone(arg));
    }
    Some(body.substitute(&env))
}

/// Checks `value : ty`, failing with `typeMismatch` or
/// `typeConstraintViolated`.
pub(crate) fn check_value<T: ResourceTracker, W: TraceWriter>(
    eval: &mut Evaluator<'_, T, W>,
    value: &Value,
    ty: &Rc<VmType>,
    span: Span,
) -> EvalResult<()> {
    match &**ty {
        VmType::Unknown | VmType::Parameter(_) => Ok(()),
        VmType::Nothing => Err(mismatch(eval, value, ty, span)),
        VmType::Module => {
            let is_module = value.as_object().is_some_and(|o| o.enclosing.is_none());
            if is_module { Ok(()) } else { Err(mismatch(eval, value, ty, span)) }
        }
        VmType::StringConstant(expected) => match value {
            Value::Str(s) if s == expected => Ok(()),
            _ => Err(mismatch(eval, value, ty, span)),
        },
        VmType::Class { class, .. } => {
            let value_class = eval.stdlib.class_of(value);
            if value_class.is_subclass_of(class) {
                Ok(())
            } else {
                Err(mismatch(eval, value, ty, span))
            }
        }
        VmType::Alias { alias, args } => match expand_alias(alias, args) {
            Some(body) => check_value(eval, value, &body, span),
            None => Err(eval.err(
                ErrorKind::CircularReference,
                format!("type alias {} refers to itself", alias.qualified_name),
                span,
            )),
        },
        VmType::Nullable(inner) => {
            if value.is_null() {
                Ok(())
            } else {
                check_value(eval, value, inner, span)
            }
        }
        VmType::Union(left, right) => {
            if test_value(eval, value, left, span)? || test_value(eval, value, right, span)? {
                Ok(())
            } else {
                Err(mismatch(eval, value, ty, span))
            }
        }
        VmType::DefaultUnion(inner) => check_value(eval, value, inner, span),
        VmType::Constrained { base, predicates, env } => {
            check_value(eval, value, base, span)?;
            for predicate in predicates {
                check_constraint(eval, value, predicate, env, span)?;
            }
            Ok(())
        }
        VmType::Function { params, .. } => match value {
            Value::Function(f) if f.params.len() == params.len() => Ok(()),
            _ => Err(mismatch(eval, value, ty, span)),
        },
    }
}

/// Tests `value : ty` for `is`: mismatches and failed constraints are
/// `false`; genuine evaluation errors inside predicates propagate.
pub(crate) fn test_value<T: ResourceTracker, W: TraceWriter>(
    eval: &mut Evaluator<'_, T, W>,
    value: &Value,
    ty: &Rc<VmType>,
    span: Span,
) -> EvalResult<bool> {
    match &**ty {
        VmType::Unknown | VmType::Parameter(_) => Ok(true),
        VmType::Nothing => Ok(false),
        VmType::Module => Ok(value.as_object().is_some_and(|o| o.enclosing.is_none())),
        VmType::StringConstant(expected) => Ok(matches!(value, Value::Str(s) if s == expected)),
        VmType::Class { class, .. } => Ok(eval.stdlib.class_of(value).is_subclass_of(class)),
        VmType::Alias { alias, args } => match expand_alias(alias, args) {
            Some(body) => test_value(eval, value, &body, span),
            None => Err(eval.err(
                ErrorKind::CircularReference,
                format!("type alias {} refers to itself", alias.qualified_name),
                span,
            )),
        },
        VmType::Nullable(inner) => {
            if value.is_null() {
                Ok(true)
            } else {
                test_value(eval, value, inner, span)
            }
        }
        VmType::Union(left, right) => {
            Ok(test_value(eval, value, left, span)? || test_value(eval, value, right, span)?)
        }
        VmType::DefaultUnion(inner) => test_value(eval, value, inner, span),
        VmType::Constrained { base, predicates, env } => {
            if !test_value(eval, value, base, span)? {
                return Ok(false);
            }
            for predicate in predicates {
                match eval_constraint(eval, value, predicate, env)? {
                    Some(true) => {}
                    _ => return Ok(false),
                }
            }
            Ok(true)
        }
        VmType::Function { params, .. } => {
            Ok(matches!(value, Value::Function(f) if f.params.len() == params.len()))
        }
    }
}

/// Evaluates one constraint predicate with custom-`this` bound to the
/// candidate. `Some(b)` is the boolean verdict; `None` a non-boolean
/// result (treated as a violation by the caller).
fn eval_constraint<T: ResourceTracker, W: TraceWriter>(
    eval: &mut Evaluator<'_, T, W>,
    candidate: &Value,
    predicate: &Rc<crate::ast::ExprLoc>,
    env: &Rc<Frame>,
) -> EvalResult<Option<bool>> {
    // the candidate rides in the custom-this slot; `this` and the owner
    // stay lexical so fallback reads resolve against the defining module
    let frame = Frame::child_custom_this(env, candidate.clone());
    let owner = frame
        .scope()
        .module_value()
        .unwrap_or_else(|| eval.stdlib.base_value());
    let ctx = Ctx::new(owner.clone(), owner, frame);
    let verdict = eval.eval_expr(predicate, &ctx)?;
    match verdict {
        Value::Bool(b) => Ok(Some(b)),
        _ => Ok(None),
    }
}

fn check_constraint<T: ResourceTracker, W: TraceWriter>(
    eval: &mut Evaluator<'_, T, W>,
    candidate: &Value,
    predicate: &Rc<crate::ast::ExprLoc>,
    env: &Rc<Frame>,
    span: Span,
) -> EvalResult<()> {
    // a predicate that throws is itself a failed check
    let verdict = match eval_constraint(eval, candidate, predicate, env) {
        Ok(verdict) => verdict,
        Err(e) if e.kind == ErrorKind::UserThrow => {
            return Err(eval.err(
                ErrorKind::TypeConstraintViolated,
                format!("type constraint violated: {}", e.message),
                span,
            ));
        }
        Err(e) => return Err(e),
    };
    match verdict {
        Some(true) => Ok(()),
        _ => Err(eval.err(
            ErrorKind::TypeConstraintViolated,
            format!(
                "type constraint violated for value `{candidate}` (at {}:{})",
                predicate.span.line, predicate.span.column
            ),
            span,
        )),
    }
}

/// The class a contextual `new` without an explicit type instantiates:
/// the default branch of a union, or the named Listing/Mapping/class.
pub(crate) fn instantiable_class(ty: &Rc<VmType>) -> Option<Rc<VmClass>> {
    match &**ty {
        VmType::Class { class, .. } => Some(Rc::clone(class)),
        VmType::Nullable(inner) | VmType::DefaultUnion(inner) => instantiable_class(inner),
        VmType::Constrained { base, .. } => instantiable_class(base),
        VmType::Alias { alias, args } => expand_alias(alias, args).and_then(|body| instantiable_class(&body)),
        // the `*`-marked branch wins; otherwise no contextual default
        VmType::Union(_, _) => default_branch(ty).and_then(|branch| instantiable_class(&branch)),
        _ => None,
    }
}

/// The `*`-marked branch of a (possibly nested) union.
fn default_branch(ty: &Rc<VmType>) -> Option<Rc<VmType>> {
    match &**ty {
        VmType::DefaultUnion(inner) => Some(Rc::clone(inner)),
        VmType::Union(left, right) => default_branch(left).or_else(|| default_branch(right)),
        _ => None,
    }
}

fn mismatch<T: ResourceTracker, W: TraceWriter>(
    eval: &Evaluator<'_, T, W>,
    value: &Value,
    ty: &Rc<VmType>,
    span: Span,
) -> Box<crate::error::Error> {
    eval.err(
        ErrorKind::TypeMismatch,
        format!(
            "expected a value of type {} but got {}",
            ty.display_name(),
            value.type_name()
        ),
        span,
    )
}
