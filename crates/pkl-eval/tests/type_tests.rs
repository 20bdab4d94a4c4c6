//! The type system: `is`/`as`, declared property types, unions, string
//! constants, aliases, class hierarchy rules, and the const discipline.

mod common;

use std::rc::Rc;

use common::{at, eval_single, evaluator, module, prop, prop_full};
use pkl_eval::{
    ErrorKind, Modifiers, NoModuleLoader, NoResourceReader, Value,
    ast::{ClassDecl, Expr, ExprLoc, ModuleEntry, TypeAliasDecl, TypeRef},
};
use pretty_assertions::assert_eq;

fn is_expr(value: ExprLoc, ty: Rc<TypeRef>) -> ExprLoc {
    ExprLoc::new(
        Expr::TypeTest {
            expr: Box::new(value),
            ty,
        },
        at(1),
    )
}

fn as_expr(value: ExprLoc, ty: Rc<TypeRef>) -> ExprLoc {
    ExprLoc::new(
        Expr::TypeCast {
            expr: Box::new(value),
            ty,
        },
        at(1),
    )
}

/// `is` follows the builtin class hierarchy, including `Number` and
/// `Any`.
#[test]
fn type_test_follows_hierarchy() {
    let check = |value: fn() -> ExprLoc, ty: &'static str, expected: bool| {
        let got = eval_single(|eval| {
            let id = eval.intern(ty);
            is_expr(value(), TypeRef::declared(id))
        })
        .unwrap();
        assert_eq!(got, Value::Bool(expected), "{ty}");
    };
    check(|| ExprLoc::int(5, at(1)), "Int", true);
    check(|| ExprLoc::int(5, at(1)), "Number", true);
    check(|| ExprLoc::int(5, at(1)), "Any", true);
    check(|| ExprLoc::int(5, at(1)), "String", false);
    check(|| ExprLoc::float(1.5, at(1)), "Float", true);
    check(|| ExprLoc::null(at(1)), "Any", true);
    check(|| ExprLoc::null(at(1)), "Int", false);
}

/// Nullable types accept null and the base type.
#[test]
fn nullable_type() {
    let nullable_string = |eval: &mut common::Eval<'_>| {
        let id = eval.intern("String");
        Rc::new(TypeRef::Nullable(TypeRef::declared(id)))
    };
    assert_eq!(
        eval_single(|eval| {
            let ty = nullable_string(eval);
            is_expr(ExprLoc::null(at(1)), ty)
        })
        .unwrap(),
        Value::Bool(true)
    );
    assert_eq!(
        eval_single(|eval| {
            let ty = nullable_string(eval);
            is_expr(ExprLoc::str("x", at(1)), ty)
        })
        .unwrap(),
        Value::Bool(true)
    );
    assert_eq!(
        eval_single(|eval| {
            let ty = nullable_string(eval);
            is_expr(ExprLoc::int(1, at(1)), ty)
        })
        .unwrap(),
        Value::Bool(false)
    );
}

/// String-constant types accept exactly their literal.
#[test]
fn string_constant_type() {
    let ty = || Rc::new(TypeRef::StringConstant("north".into()));
    assert_eq!(
        eval_single(|_| is_expr(ExprLoc::str("north", at(1)), ty())).unwrap(),
        Value::Bool(true)
    );
    assert_eq!(
        eval_single(|_| is_expr(ExprLoc::str("south", at(1)), ty())).unwrap(),
        Value::Bool(false)
    );
}

/// A union accepts either side.
#[test]
fn union_type() {
    let union = |eval: &mut common::Eval<'_>| {
        let int_id = eval.intern("Int");
        let string_id = eval.intern("String");
        Rc::new(TypeRef::Union(TypeRef::declared(int_id), TypeRef::declared(string_id)))
    };
    for (value, expected) in [
        (ExprLoc::int(1, at(1)), true),
        (ExprLoc::str("x", at(1)), true),
        (ExprLoc::bool(true, at(1)), false),
    ] {
        let got = eval_single(|eval| {
            let ty = union(eval);
            is_expr(value, ty)
        })
        .unwrap();
        assert_eq!(got, Value::Bool(expected));
    }
}

/// `v as T` returns `v` when it conforms and fails otherwise, so
/// `v : T` implies `v as T == v`.
#[test]
fn cast_returns_value_or_fails() {
    let got = eval_single(|eval| {
        let id = eval.intern("Int");
        as_expr(ExprLoc::int(5, at(1)), TypeRef::declared(id))
    })
    .unwrap();
    assert_eq!(got, Value::Int(5));
    let err = eval_single(|eval| {
        let id = eval.intern("String");
        as_expr(ExprLoc::int(5, at(1)), TypeRef::declared(id))
    })
    .expect_err("5 as String must fail");
    assert_eq!(err.kind, ErrorKind::TypeMismatch);
}

/// A declared property type is checked when the member is forced.
#[test]
fn declared_property_type_is_checked() {
    let mut loader = NoModuleLoader;
    let mut reader = NoResourceReader;
    let mut eval = evaluator(&mut loader, &mut reader);
    let v = eval.intern("v");
    let int_id = eval.intern("Int");
    let cst = module(vec![prop_full(
        v,
        Modifiers::default(),
        Some(TypeRef::declared(int_id)),
        ExprLoc::str("oops", at(1)),
    )]);
    let m = eval.evaluate_module(&cst).expect("module evaluates");
    let err = eval.get_property(&m, v).expect_err("String is not an Int");
    assert_eq!(err.kind, ErrorKind::TypeMismatch);
}

/// Aliases resolve eagerly and substitute like their bodies.
#[test]
fn type_alias_checks_like_its_body() {
    let run = |value: ExprLoc| {
        let mut loader = NoModuleLoader;
        let mut reader = NoResourceReader;
        let mut eval = evaluator(&mut loader, &mut reader);
        let name = eval.intern("Name");
        let v = eval.intern("v");
        let string_id = eval.intern("String");
        let alias = Rc::new(TypeAliasDecl {
            name,
            type_params: vec![],
            ty: TypeRef::declared(string_id),
            span: at(1),
            doc: None,
        });
        let cst = module(vec![
            ModuleEntry::TypeAlias(alias),
            prop_full(v, Modifiers::default(), Some(TypeRef::declared(name)), value),
        ]);
        let m = eval.evaluate_module(&cst).expect("module evaluates");
        eval.get_property(&m, v)
    };
    assert_eq!(run(ExprLoc::str("ok", at(2))).unwrap(), Value::Str("ok".into()));
    let err = run(ExprLoc::int(5, at(2))).expect_err("Int is not a Name");
    assert_eq!(err.kind, ErrorKind::TypeMismatch);
}

/// Function types check arity at assignment.
#[test]
fn function_type_checks_arity() {
    let fn_ty = |eval: &mut common::Eval<'_>, params: usize| {
        let int_id = eval.intern("Int");
        Rc::new(TypeRef::Function {
            params: (0..params).map(|_| TypeRef::declared(int_id)).collect(),
            ret: TypeRef::declared(int_id),
        })
    };
    let lambda = |eval: &mut common::Eval<'_>| {
        let x = eval.intern("x");
        ExprLoc::new(
            Expr::FunctionLit {
                params: vec![x],
                body: Rc::new(ExprLoc::name(x, at(1))),
            },
            at(1),
        )
    };
    assert_eq!(
        eval_single(|eval| {
            let ty = fn_ty(eval, 1);
            let f = lambda(eval);
            is_expr(f, ty)
        })
        .unwrap(),
        Value::Bool(true)
    );
    assert_eq!(
        eval_single(|eval| {
            let ty = fn_ty(eval, 2);
            let f = lambda(eval);
            is_expr(f, ty)
        })
        .unwrap(),
        Value::Bool(false),
        "arity mismatch"
    );
}

/// Extending a final (non-open, non-abstract) class is rejected.
#[test]
fn cannot_extend_final_class() {
    let mut loader = NoModuleLoader;
    let mut reader = NoResourceReader;
    let mut eval = evaluator(&mut loader, &mut reader);
    let sub = eval.intern("Sub");
    let string_id = eval.intern("String");
    let decl = Rc::new(ClassDecl {
        name: sub,
        modifiers: Modifiers::default(),
        type_params: vec![],
        supertype: Some(TypeRef::declared(string_id)),
        members: vec![],
        span: at(1),
        doc: None,
    });
    let cst = module(vec![ModuleEntry::Class(decl)]);
    let err = eval.evaluate_module(&cst).expect_err("extending String must fail");
    assert_eq!(err.kind, ErrorKind::CannotExtendFinalClass);
}

/// A class naming itself as its supertype is rejected.
#[test]
fn class_cannot_extend_self() {
    let mut loader = NoModuleLoader;
    let mut reader = NoResourceReader;
    let mut eval = evaluator(&mut loader, &mut reader);
    let a = eval.intern("A");
    let decl = Rc::new(ClassDecl {
        name: a,
        modifiers: Modifiers::OPEN,
        type_params: vec![],
        supertype: Some(TypeRef::declared(a)),
        members: vec![],
        span: at(1),
        doc: None,
    });
    let cst = module(vec![ModuleEntry::Class(decl)]);
    let err = eval.evaluate_module(&cst).expect_err("A extends A must fail");
    assert_eq!(err.kind, ErrorKind::ClassCannotExtendSelf);
}

/// A supertype reference that is not a class is rejected.
#[test]
fn invalid_supertype() {
    let mut loader = NoModuleLoader;
    let mut reader = NoResourceReader;
    let mut eval = evaluator(&mut loader, &mut reader);
    let (a, t) = (eval.intern("A"), eval.intern("T"));
    let string_id = eval.intern("String");
    let alias = Rc::new(TypeAliasDecl {
        name: t,
        type_params: vec![],
        ty: TypeRef::declared(string_id),
        span: at(1),
        doc: None,
    });
    let decl = Rc::new(ClassDecl {
        name: a,
        modifiers: Modifiers::default(),
        type_params: vec![],
        supertype: Some(TypeRef::declared(t)),
        members: vec![],
        span: at(2),
        doc: None,
    });
    let cst = module(vec![ModuleEntry::TypeAlias(alias), ModuleEntry::Class(decl)]);
    let err = eval.evaluate_module(&cst).expect_err("extending an alias must fail");
    assert_eq!(err.kind, ErrorKind::InvalidSupertype);
}

/// A `const` member may only reference `const` members of its scope.
#[test]
fn const_member_references_must_be_const() {
    let run = |make_target_const: bool| {
        let mut loader = NoModuleLoader;
        let mut reader = NoResourceReader;
        let mut eval = evaluator(&mut loader, &mut reader);
        let (c, x) = (eval.intern("c"), eval.intern("x"));
        let target_modifiers = if make_target_const {
            Modifiers::CONST
        } else {
            Modifiers::default()
        };
        let cst = module(vec![
            prop_full(x, target_modifiers, None, ExprLoc::int(1, at(1))),
            prop_full(c, Modifiers::CONST, None, ExprLoc::name(x, at(2))),
        ]);
        let m = eval.evaluate_module(&cst).expect("module evaluates");
        eval.get_property(&m, c)
    };
    let err = run(false).expect_err("const reading non-const must fail");
    assert_eq!(err.kind, ErrorKind::PropertyMustBeConst);
    assert_eq!(run(true).unwrap(), Value::Int(1));
}

/// Amending a typed object may only override declared properties.
#[test]
fn typed_objects_reject_undeclared_properties() {
    let mut loader = NoModuleLoader;
    let mut reader = NoResourceReader;
    let mut eval = evaluator(&mut loader, &mut reader);
    let (q, inst) = (eval.intern("Q"), eval.intern("inst"));
    let (a, b) = (eval.intern("a"), eval.intern("b"));
    let int_id = eval.intern("Int");
    let decl = Rc::new(ClassDecl {
        name: q,
        modifiers: Modifiers::default(),
        type_params: vec![],
        supertype: None,
        members: vec![pkl_eval::ast::ClassMemberDecl::Property(Rc::new(
            pkl_eval::ast::ClassPropertyDecl {
                name: a,
                modifiers: Modifiers::default(),
                ty: Some(TypeRef::declared(int_id)),
                default: None,
                span: at(1),
                doc: None,
            },
        ))],
        span: at(1),
        doc: None,
    });
    let cst = module(vec![
        ModuleEntry::Class(decl),
        prop(
            inst,
            ExprLoc::new(
                Expr::New {
                    ty: Some(TypeRef::declared(q)),
                    body: pkl_eval::ast::ObjectBody::new(vec![common::obj_prop(b, ExprLoc::int(1, at(2)))], at(2)),
                },
                at(2),
            ),
        ),
    ]);
    let m = eval.evaluate_module(&cst).expect("module evaluates");
    let err = eval.get_property(&m, inst).expect_err("undeclared property must fail");
    assert_eq!(err.kind, ErrorKind::CannotFindProperty);
}
