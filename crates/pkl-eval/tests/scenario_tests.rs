//! End-to-end evaluation scenarios: whole modules evaluated through the
//! public driver API, checking both values and error envelopes.

mod common;

use std::rc::Rc;

use common::{at, binop, body_prop, element, evaluator, module, obj_prop, prop, prop_full};
use pkl_eval::{
    ErrorKind, Modifiers, NoModuleLoader, NoResourceReader, Value,
    ast::{
        BinOp, ClassDecl, ClassMemberDecl, ClassPropertyDecl, Expr, ExprLoc, ModuleEntry, ObjectBody,
        ObjectMemberDecl, TypeAliasDecl, TypeRef,
    },
};
use pretty_assertions::assert_eq;

/// `x = 1; y = x + 2` evaluates to `{x: 1, y: 3}`.
#[test]
fn property_reference_and_addition() {
    let mut loader = NoModuleLoader;
    let mut reader = NoResourceReader;
    let mut eval = evaluator(&mut loader, &mut reader);
    let x = eval.intern("x");
    let y = eval.intern("y");
    let cst = module(vec![
        prop(x, ExprLoc::int(1, at(1))),
        prop(y, binop(BinOp::Add, ExprLoc::name(x, at(2)), ExprLoc::int(2, at(2)))),
    ]);
    let m = eval.evaluate_module(&cst).expect("module evaluates");
    assert_eq!(eval.get_property(&m, x).unwrap(), Value::Int(1));
    assert_eq!(eval.get_property(&m, y).unwrap(), Value::Int(3), "y = x + 2 with x = 1");
}

/// Amending keeps inherited members and overrides named ones:
/// `parrot = (bird) { name = "Parrot" }` keeps `diet`.
#[test]
fn amending_overrides_and_inherits() {
    let mut loader = NoModuleLoader;
    let mut reader = NoResourceReader;
    let mut eval = evaluator(&mut loader, &mut reader);
    let bird = eval.intern("bird");
    let parrot = eval.intern("parrot");
    let name = eval.intern("name");
    let diet = eval.intern("diet");
    let cst = module(vec![
        body_prop(
            bird,
            ObjectBody::new(
                vec![
                    obj_prop(name, ExprLoc::str("Pigeon", at(1))),
                    obj_prop(diet, ExprLoc::str("Seeds", at(2))),
                ],
                at(1),
            ),
        ),
        prop(
            parrot,
            ExprLoc::new(
                Expr::Amend {
                    parent: Box::new(ExprLoc::name(bird, at(4))),
                    body: ObjectBody::new(vec![obj_prop(name, ExprLoc::str("Parrot", at(4)))], at(4)),
                },
                at(4),
            ),
        ),
    ]);
    let m = eval.evaluate_module(&cst).expect("module evaluates");
    let parrot_value = eval.get_property(&m, parrot).expect("parrot forces");
    assert_eq!(
        eval.get_property(&parrot_value, name).unwrap(),
        Value::Str("Parrot".into()),
        "override wins"
    );
    assert_eq!(
        eval.get_property(&parrot_value, diet).unwrap(),
        Value::Str("Seeds".into()),
        "inherited member survives"
    );
}

/// A refinement constraint on a class property fails the assignment:
/// `class P { name: String(length >= 3) }; p = new P { name = "Al" }`.
#[test]
fn class_property_constraint_violation() {
    let mut loader = NoModuleLoader;
    let mut reader = NoResourceReader;
    let mut eval = evaluator(&mut loader, &mut reader);
    let p_class = eval.intern("P");
    let p = eval.intern("p");
    let name = eval.intern("name");
    let length = eval.intern("length");
    let string_ty = eval.intern("String");

    let constraint = Rc::new(binop(
        BinOp::Ge,
        ExprLoc::name(length, at(1)),
        ExprLoc::int(3, at(1)),
    ));
    let name_ty = Rc::new(TypeRef::Constrained {
        base: TypeRef::declared(string_ty),
        predicates: vec![constraint],
    });
    let class_decl = Rc::new(ClassDecl {
        name: p_class,
        modifiers: Modifiers::default(),
        type_params: vec![],
        supertype: None,
        members: vec![ClassMemberDecl::Property(Rc::new(ClassPropertyDecl {
            name,
            modifiers: Modifiers::default(),
            ty: Some(name_ty),
            default: None,
            span: at(1),
            doc: None,
        }))],
        span: at(1),
        doc: None,
    });
    let cst = module(vec![
        ModuleEntry::Class(class_decl),
        prop(
            p,
            ExprLoc::new(
                Expr::New {
                    ty: Some(TypeRef::declared(p_class)),
                    body: ObjectBody::new(vec![obj_prop(name, ExprLoc::str("Al", at(2)))], at(2)),
                },
                at(2),
            ),
        ),
    ]);
    let m = eval.evaluate_module(&cst).expect("module evaluates");
    let err = eval.get_property(&m, p).expect_err("constraint must fail");
    assert_eq!(err.kind, ErrorKind::TypeConstraintViolated, "got: {err}");
}

/// `a = b; b = a` fails with a circular reference and a two-frame stack.
#[test]
fn circular_reference_carries_frames() {
    let mut loader = NoModuleLoader;
    let mut reader = NoResourceReader;
    let mut eval = evaluator(&mut loader, &mut reader);
    let a = eval.intern("a");
    let b = eval.intern("b");
    let cst = module(vec![
        prop(a, ExprLoc::name(b, at(1))),
        prop(b, ExprLoc::name(a, at(2))),
    ]);
    let m = eval.evaluate_module(&cst).expect("module evaluates");
    let err = eval.get_property(&m, a).expect_err("cycle must fail");
    assert_eq!(err.kind, ErrorKind::CircularReference, "got: {err}");
    assert!(
        err.frames.len() >= 2,
        "both member frames should be on the stack, got {:?}",
        err.frames
    );
}

/// A for-generator over a list appends squared elements in order.
#[test]
fn listing_for_generator() {
    let mut loader = NoModuleLoader;
    let mut reader = NoResourceReader;
    let mut eval = evaluator(&mut loader, &mut reader);
    let xs = eval.intern("xs");
    let i = eval.intern("i");
    let list_fn = eval.intern("List");
    let listing_ty = eval.intern("Listing");
    let body = ObjectBody::new(
        vec![ObjectMemberDecl::For {
            key_var: None,
            value_var: i,
            iterable: ExprLoc::call(
                list_fn,
                vec![
                    ExprLoc::int(1, at(1)),
                    ExprLoc::int(2, at(1)),
                    ExprLoc::int(3, at(1)),
                ],
                at(1),
            ),
            body: vec![element(binop(
                BinOp::Mul,
                ExprLoc::name(i, at(1)),
                ExprLoc::name(i, at(1)),
            ))],
        }],
        at(1),
    );
    let cst = module(vec![prop(
        xs,
        ExprLoc::new(
            Expr::New {
                ty: Some(TypeRef::declared(listing_ty)),
                body,
            },
            at(1),
        ),
    )]);
    let m = eval.evaluate_module(&cst).expect("module evaluates");
    let listing = eval.get_property(&m, xs).expect("xs forces");
    for (index, expected) in [1_i64, 4, 9].into_iter().enumerate() {
        let got = eval.get_entry(&listing, &Value::Int(index as i64)).expect("element forces");
        assert_eq!(got, Value::Int(expected), "xs[{index}]");
    }
}

/// A type-alias body may only reference `const` members.
#[test]
fn type_alias_body_requires_const() {
    let run = |make_const: bool| {
        let mut loader = NoModuleLoader;
        let mut reader = NoResourceReader;
        let mut eval = evaluator(&mut loader, &mut reader);
        let t = eval.intern("T");
        let is_valid = eval.intern("isValid");
        let v = eval.intern("v");
        let string_ty = eval.intern("String");
        let alias = Rc::new(TypeAliasDecl {
            name: t,
            type_params: vec![],
            ty: Rc::new(TypeRef::Constrained {
                base: TypeRef::declared(string_ty),
                predicates: vec![Rc::new(ExprLoc::name(is_valid, at(1)))],
            }),
            span: at(1),
            doc: None,
        });
        let modifiers = if make_const { Modifiers::CONST } else { Modifiers::default() };
        let cst = module(vec![
            ModuleEntry::TypeAlias(alias),
            prop_full(is_valid, modifiers, None, ExprLoc::bool(true, at(2))),
            prop_full(v, Modifiers::default(), Some(TypeRef::declared(t)), ExprLoc::str("hi", at(3))),
        ]);
        let m = eval.evaluate_module(&cst).expect("module evaluates");
        eval.get_property(&m, v)
    };

    let err = run(false).expect_err("non-const reference from alias body must fail");
    assert_eq!(err.kind, ErrorKind::PropertyMustBeConst, "got: {err}");

    let ok = run(true).expect("const reference is fine");
    assert_eq!(ok, Value::Str("hi".into()));
}

/// Forcing the module through `output.value` yields the module itself,
/// and repeated reads of a member return the identical value.
#[test]
fn output_value_and_memoization_identity() {
    let mut loader = NoModuleLoader;
    let mut reader = NoResourceReader;
    let mut eval = evaluator(&mut loader, &mut reader);
    let nested = eval.intern("nested");
    let x = eval.intern("x");
    let cst = module(vec![body_prop(
        nested,
        ObjectBody::new(vec![obj_prop(x, ExprLoc::int(1, at(1)))], at(1)),
    )]);
    let m = eval.evaluate_module(&cst).expect("module evaluates");

    let output_value = eval.force_output(&m).expect("output.value forces");
    assert!(
        matches!((&output_value, &m), (Value::Object(a), Value::Object(b)) if Rc::ptr_eq(a, b)),
        "output.value is the module instance"
    );

    let first = eval.get_property(&m, nested).expect("first read");
    let second = eval.get_property(&m, nested).expect("second read");
    assert!(
        matches!((&first, &second), (Value::Object(a), Value::Object(b)) if Rc::ptr_eq(a, b)),
        "memoized reads return the identical object"
    );
}
