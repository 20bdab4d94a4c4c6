//! Shared CST-building helpers for the integration suites.
//!
//! The evaluator consumes CSTs produced by an external parser; tests
//! build them directly through the `ast` constructors. Spans carry fake
//! line/column positions so error-stack assertions have something to
//! check.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use std::rc::Rc;

use pkl_eval::{
    Identifier, Modifiers, NoLimitTracker, NoModuleLoader, NoResourceReader, NoTrace,
    ast::{
        BinOp, ExprLoc, MemberValueDecl, ModuleCst, ModuleEntry, ObjectBody, ObjectMemberDecl, PropertyDecl, Span,
        TypeRef,
    },
};

pub type Eval<'io> = pkl_eval::Evaluator<'io, NoLimitTracker, NoTrace>;

/// A span at the given 1-based line.
pub fn at(line: u32) -> Span {
    Span::new(0, 1, line, 1)
}

/// A module-level `name = expr` property.
pub fn prop(name: Identifier, expr: ExprLoc) -> ModuleEntry {
    ModuleEntry::Property(prop_decl(name, Modifiers::default(), None, expr))
}

/// A module-level property with modifiers and an optional type.
pub fn prop_full(name: Identifier, modifiers: Modifiers, ty: Option<Rc<TypeRef>>, expr: ExprLoc) -> ModuleEntry {
    ModuleEntry::Property(prop_decl(name, modifiers, ty, expr))
}

/// A module-level `name { ... }` amending property.
pub fn body_prop(name: Identifier, body: Rc<ObjectBody>) -> ModuleEntry {
    ModuleEntry::Property(PropertyDecl {
        name,
        modifiers: Modifiers::default(),
        ty: None,
        value: MemberValueDecl::Body(body),
        span: at(1),
        doc: None,
    })
}

pub fn prop_decl(name: Identifier, modifiers: Modifiers, ty: Option<Rc<TypeRef>>, expr: ExprLoc) -> PropertyDecl {
    let span = expr.span;
    PropertyDecl {
        name,
        modifiers,
        ty,
        value: MemberValueDecl::Expr(Rc::new(expr)),
        span,
        doc: None,
    }
}

/// An object-body `name = expr` member.
pub fn obj_prop(name: Identifier, expr: ExprLoc) -> ObjectMemberDecl {
    ObjectMemberDecl::Property(PropertyDecl {
        name,
        modifiers: Modifiers::default(),
        ty: None,
        value: MemberValueDecl::Expr(Rc::new(expr)),
        span: at(1),
        doc: None,
    })
}

/// An object-body `local name = expr` member.
pub fn obj_local(name: Identifier, expr: ExprLoc) -> ObjectMemberDecl {
    ObjectMemberDecl::Property(PropertyDecl {
        name,
        modifiers: Modifiers::LOCAL,
        ty: None,
        value: MemberValueDecl::Expr(Rc::new(expr)),
        span: at(1),
        doc: None,
    })
}

/// A plain element member.
pub fn element(expr: ExprLoc) -> ObjectMemberDecl {
    ObjectMemberDecl::Element(Rc::new(expr))
}

/// An `[key] = value` entry member.
pub fn entry(key: ExprLoc, value: ExprLoc) -> ObjectMemberDecl {
    ObjectMemberDecl::Entry {
        key,
        value: MemberValueDecl::Expr(Rc::new(value)),
    }
}

/// `a + b` and friends.
pub fn binop(op: BinOp, lhs: ExprLoc, rhs: ExprLoc) -> ExprLoc {
    ExprLoc::binop(op, lhs, rhs, at(1))
}

/// A fresh evaluator over the no-op loader/reader.
pub fn evaluator<'io>(loader: &'io mut NoModuleLoader, reader: &'io mut NoResourceReader) -> Eval<'io> {
    pkl_eval::Evaluator::new(loader, reader, NoLimitTracker, NoTrace)
}

/// A one-off module CST under a test URI.
pub fn module(entries: Vec<ModuleEntry>) -> Rc<ModuleCst> {
    ModuleCst::new("test:module", entries)
}

/// Evaluates a single expression as the `result` property of a fresh
/// module on a fresh evaluator.
pub fn eval_single(build: impl FnOnce(&mut Eval<'_>) -> ExprLoc) -> Result<pkl_eval::Value, Box<pkl_eval::Error>> {
    let mut loader = NoModuleLoader;
    let mut reader = NoResourceReader;
    let mut eval = evaluator(&mut loader, &mut reader);
    let result = eval.intern("result");
    let expr = build(&mut eval);
    let cst = module(vec![prop(result, expr)]);
    let module = eval.evaluate_module(&cst)?;
    eval.get_property(&module, result)
}
