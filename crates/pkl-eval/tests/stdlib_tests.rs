//! The prelude surface: builtin members on primitive values and
//! collections, the `pkl:math` and `pkl:test` modules, and number unit
//! properties.

mod common;

use std::rc::Rc;

use common::{at, binop, eval_single};
use pkl_eval::{
    ErrorKind, Value,
    ast::{BinOp, Callee, Expr, ExprLoc, NameRef},
};
use pretty_assertions::assert_eq;

fn access(recv: ExprLoc, eval: &mut common::Eval<'_>, name: &str) -> ExprLoc {
    let id = eval.intern(name);
    ExprLoc::access(recv, id, at(1))
}

fn call(recv: ExprLoc, eval: &mut common::Eval<'_>, name: &str, args: Vec<ExprLoc>) -> ExprLoc {
    let id = eval.intern(name);
    ExprLoc::method_call(recv, id, args, at(1))
}

fn import_of(uri: &str) -> ExprLoc {
    ExprLoc::new(
        Expr::Import {
            uri: uri.into(),
            glob: false,
            nullable: false,
        },
        at(1),
    )
}

/// `String.length` counts code points; `isEmpty` agrees.
#[test]
fn string_length_and_is_empty() {
    assert_eq!(
        eval_single(|eval| access(ExprLoc::str("a😀b", at(1)), eval, "length")).unwrap(),
        Value::Int(3)
    );
    assert_eq!(
        eval_single(|eval| access(ExprLoc::str("", at(1)), eval, "isEmpty")).unwrap(),
        Value::Bool(true)
    );
}

/// Core string methods.
#[test]
fn string_methods() {
    assert_eq!(
        eval_single(|eval| call(ExprLoc::str("hello", at(1)), eval, "contains", vec![ExprLoc::str("ell", at(1))]))
            .unwrap(),
        Value::Bool(true)
    );
    assert_eq!(
        eval_single(|eval| call(ExprLoc::str("hello", at(1)), eval, "toUpperCase", vec![])).unwrap(),
        Value::Str("HELLO".into())
    );
    // substring is code-point indexed
    assert_eq!(
        eval_single(|eval| {
            call(
                ExprLoc::str("a😀bc", at(1)),
                eval,
                "substring",
                vec![ExprLoc::int(1, at(1)), ExprLoc::int(3, at(1))],
            )
        })
        .unwrap(),
        Value::Str("😀b".into())
    );
    assert_eq!(
        eval_single(|eval| call(ExprLoc::str("42", at(1)), eval, "toInt", vec![])).unwrap(),
        Value::Int(42)
    );
    assert_eq!(
        eval_single(|eval| call(ExprLoc::str("x", at(1)), eval, "toIntOrNull", vec![])).unwrap(),
        Value::Null
    );
    let err = eval_single(|eval| call(ExprLoc::str("x", at(1)), eval, "toInt", vec![]))
        .expect_err("unparseable toInt must fail");
    assert_eq!(err.kind, ErrorKind::TypeMismatch);
}

/// `matches` is a whole-string regex test.
#[test]
fn string_matches_regex() {
    let matches_of = |text: &'static str| {
        eval_single(move |eval| {
            let regex_fn = eval.intern("Regex");
            let pattern = ExprLoc::call(regex_fn, vec![ExprLoc::str("[a-z]+", at(1))], at(1));
            call(ExprLoc::str(text, at(1)), eval, "matches", vec![pattern])
        })
        .unwrap()
    };
    assert_eq!(matches_of("abc"), Value::Bool(true));
    assert_eq!(matches_of("abc1"), Value::Bool(false), "matches anchors both ends");
}

/// `List().first` fails, `List().firstOrNull` is null.
#[test]
fn empty_list_first() {
    let empty = |eval: &mut common::Eval<'_>| {
        let list_fn = eval.intern("List");
        ExprLoc::call(list_fn, vec![], at(1))
    };
    let err = eval_single(|eval| {
        let list = empty(eval);
        access(list, eval, "first")
    })
    .expect_err("List().first must fail");
    assert_eq!(err.kind, ErrorKind::ElementIndexOutOfRange);
    assert_eq!(
        eval_single(|eval| {
            let list = empty(eval);
            access(list, eval, "firstOrNull")
        })
        .unwrap(),
        Value::Null
    );
}

/// `map`, `filter`, and `fold` thread lambdas over lists.
#[test]
fn list_higher_order_methods() {
    let list123 = |eval: &mut common::Eval<'_>| {
        let list_fn = eval.intern("List");
        ExprLoc::call(
            list_fn,
            vec![
                ExprLoc::int(1, at(1)),
                ExprLoc::int(2, at(1)),
                ExprLoc::int(3, at(1)),
            ],
            at(1),
        )
    };
    let lambda = |eval: &mut common::Eval<'_>, body: fn(ExprLoc) -> ExprLoc| {
        let x = eval.intern("x");
        ExprLoc::new(
            Expr::FunctionLit {
                params: vec![x],
                body: Rc::new(body(ExprLoc::name(x, at(1)))),
            },
            at(1),
        )
    };
    let got = eval_single(|eval| {
        let list = list123(eval);
        let doubled = lambda(eval, |x| binop(BinOp::Mul, x, ExprLoc::int(2, at(1))));
        call(list, eval, "map", vec![doubled])
    })
    .unwrap();
    let Value::List(items) = got else { panic!("map returns a List") };
    assert_eq!(*items, vec![Value::Int(2), Value::Int(4), Value::Int(6)]);

    let got = eval_single(|eval| {
        let list = list123(eval);
        let odd = lambda(eval, |x| {
            binop(BinOp::Eq, binop(BinOp::Rem, x, ExprLoc::int(2, at(1))), ExprLoc::int(1, at(1)))
        });
        call(list, eval, "filter", vec![odd])
    })
    .unwrap();
    let Value::List(items) = got else { panic!("filter returns a List") };
    assert_eq!(*items, vec![Value::Int(1), Value::Int(3)]);

    let got = eval_single(|eval| {
        let list = list123(eval);
        let acc = eval.intern("acc");
        let x = eval.intern("x");
        let add = ExprLoc::new(
            Expr::FunctionLit {
                params: vec![acc, x],
                body: Rc::new(binop(BinOp::Add, ExprLoc::name(acc, at(1)), ExprLoc::name(x, at(1)))),
            },
            at(1),
        );
        call(list, eval, "fold", vec![ExprLoc::int(0, at(1)), add])
    })
    .unwrap();
    assert_eq!(got, Value::Int(6));
}

/// Sets are order-insensitive for equality but keep insertion order.
#[test]
fn set_equality_ignores_order() {
    let got = eval_single(|eval| {
        let set_fn = eval.intern("Set");
        let lhs = ExprLoc::call(set_fn, vec![ExprLoc::int(1, at(1)), ExprLoc::int(2, at(1))], at(1));
        let rhs = ExprLoc::call(set_fn, vec![ExprLoc::int(2, at(1)), ExprLoc::int(1, at(1))], at(1));
        binop(BinOp::Eq, lhs, rhs)
    })
    .unwrap();
    assert_eq!(got, Value::Bool(true));
}

/// Map members: `keys`, `getOrNull`, `containsKey`.
#[test]
fn map_members() {
    let map_ab = |eval: &mut common::Eval<'_>| {
        let map_fn = eval.intern("Map");
        ExprLoc::call(
            map_fn,
            vec![
                ExprLoc::str("a", at(1)),
                ExprLoc::int(1, at(1)),
                ExprLoc::str("b", at(1)),
                ExprLoc::int(2, at(1)),
            ],
            at(1),
        )
    };
    assert_eq!(
        eval_single(|eval| {
            let map = map_ab(eval);
            call(map, eval, "containsKey", vec![ExprLoc::str("a", at(1))])
        })
        .unwrap(),
        Value::Bool(true)
    );
    assert_eq!(
        eval_single(|eval| {
            let map = map_ab(eval);
            call(map, eval, "getOrNull", vec![ExprLoc::str("z", at(1))])
        })
        .unwrap(),
        Value::Null
    );
    assert_eq!(
        eval_single(|eval| {
            let map = map_ab(eval);
            access(map, eval, "length")
        })
        .unwrap(),
        Value::Int(2)
    );
}

/// Number unit properties build durations and data sizes; equality is
/// canonical across units.
#[test]
fn number_unit_properties() {
    let got = eval_single(|eval| {
        let min = access(ExprLoc::int(1, at(1)), eval, "min");
        let s = access(ExprLoc::int(60, at(1)), eval, "s");
        binop(BinOp::Eq, min, s)
    })
    .unwrap();
    assert_eq!(got, Value::Bool(true), "1.min == 60.s");

    let got = eval_single(|eval| {
        let kb = access(ExprLoc::int(1, at(1)), eval, "kb");
        let b = access(ExprLoc::int(1000, at(1)), eval, "b");
        binop(BinOp::Eq, kb, b)
    })
    .unwrap();
    assert_eq!(got, Value::Bool(true), "1.kb == 1000.b");

    let got = eval_single(|eval| {
        let d = access(ExprLoc::int(5, at(1)), eval, "min");
        access(d, eval, "value")
    })
    .unwrap();
    assert_eq!(got, Value::Int(5), "the written magnitude is preserved");

    let got = eval_single(|eval| {
        let d = access(ExprLoc::int(5, at(1)), eval, "min");
        access(d, eval, "unit")
    })
    .unwrap();
    assert_eq!(got, Value::Str("min".into()));
}

/// Duration arithmetic stays on the left operand's unit scale.
#[test]
fn duration_arithmetic() {
    let got = eval_single(|eval| {
        let min = access(ExprLoc::int(1, at(1)), eval, "min");
        let s = access(ExprLoc::int(30, at(1)), eval, "s");
        let sum = binop(BinOp::Add, min, s);
        let expected = access(ExprLoc::int(90, at(1)), eval, "s");
        binop(BinOp::Eq, sum, expected)
    })
    .unwrap();
    assert_eq!(got, Value::Bool(true), "1.min + 30.s == 90.s");
}

/// The `pkl:math` module exposes constants and functions.
#[test]
fn math_module() {
    let got = eval_single(|eval| {
        let abs = eval.intern("abs");
        ExprLoc::method_call(import_of("pkl:math"), abs, vec![ExprLoc::int(-3, at(1))], at(1))
    })
    .unwrap();
    assert_eq!(got, Value::Int(3));

    let got = eval_single(|eval| {
        let max_int = eval.intern("maxInt");
        ExprLoc::access(import_of("pkl:math"), max_int, at(1))
    })
    .unwrap();
    assert_eq!(got, Value::Int(i64::MAX));

    let got = eval_single(|eval| {
        let min = eval.intern("min");
        ExprLoc::method_call(
            import_of("pkl:math"),
            min,
            vec![ExprLoc::int(3, at(1)), ExprLoc::int(7, at(1))],
            at(1),
        )
    })
    .unwrap();
    assert_eq!(got, Value::Int(3));
}

/// `test.catch` reifies evaluator errors as strings and fails when
/// nothing fails.
#[test]
fn test_catch_reifies_errors() {
    let thunk = |body: ExprLoc| {
        ExprLoc::new(
            Expr::FunctionLit {
                params: vec![],
                body: Rc::new(body),
            },
            at(1),
        )
    };
    let got = eval_single(|eval| {
        let catch = eval.intern("catch");
        let throwing = thunk(ExprLoc::new(
            Expr::Throw(Box::new(ExprLoc::str("boom", at(1)))),
            at(1),
        ));
        ExprLoc::method_call(import_of("pkl:test"), catch, vec![throwing], at(1))
    })
    .unwrap();
    assert_eq!(got, Value::Str("boom".into()));

    let err = eval_single(|eval| {
        let catch = eval.intern("catch");
        let fine = thunk(ExprLoc::int(1, at(1)));
        ExprLoc::method_call(import_of("pkl:test"), catch, vec![fine], at(1))
    })
    .expect_err("catch without an error must fail");
    assert_eq!(err.kind, ErrorKind::UserThrow);
}

/// `getClass` and `toString` exist on every value.
#[test]
fn any_surface() {
    let got = eval_single(|eval| call(ExprLoc::int(5, at(1)), eval, "toString", vec![])).unwrap();
    assert_eq!(got, Value::Str("5".into()));

    let got = eval_single(|eval| {
        let class_value = call(ExprLoc::int(5, at(1)), eval, "getClass", vec![]);
        let int_id = eval.intern("Int");
        binop(BinOp::Eq, class_value, ExprLoc::name(int_id, at(1)))
    });
    // `Int` resolves to the constructor-free class value in base scope
    assert_eq!(got.unwrap(), Value::Bool(true));
}

/// `ifNonNull` applies the function only to non-null receivers.
#[test]
fn if_non_null() {
    let lambda = |eval: &mut common::Eval<'_>| {
        let x = eval.intern("x");
        ExprLoc::new(
            Expr::FunctionLit {
                params: vec![x],
                body: Rc::new(binop(BinOp::Add, ExprLoc::name(x, at(1)), ExprLoc::int(1, at(1)))),
            },
            at(1),
        )
    };
    assert_eq!(
        eval_single(|eval| {
            let f = lambda(eval);
            call(ExprLoc::int(1, at(1)), eval, "ifNonNull", vec![f])
        })
        .unwrap(),
        Value::Int(2)
    );
    assert_eq!(
        eval_single(|eval| {
            let f = lambda(eval);
            call(ExprLoc::null(at(1)), eval, "ifNonNull", vec![f])
        })
        .unwrap(),
        Value::Null
    );
}

/// Listings convert to lists and expose `length`.
#[test]
fn listing_surface() {
    let listing = |eval: &mut common::Eval<'_>| {
        let listing_id = eval.intern("Listing");
        ExprLoc::new(
            Expr::New {
                ty: Some(pkl_eval::ast::TypeRef::declared(listing_id)),
                body: pkl_eval::ast::ObjectBody::new(
                    vec![common::element(ExprLoc::int(7, at(1))), common::element(ExprLoc::int(8, at(1)))],
                    at(1),
                ),
            },
            at(1),
        )
    };
    assert_eq!(
        eval_single(|eval| {
            let l = listing(eval);
            access(l, eval, "length")
        })
        .unwrap(),
        Value::Int(2)
    );
    let got = eval_single(|eval| {
        let l = listing(eval);
        call(l, eval, "toList", vec![])
    })
    .unwrap();
    let Value::List(items) = got else { panic!("toList returns a List") };
    assert_eq!(*items, vec![Value::Int(7), Value::Int(8)]);
}

/// A bare unknown name at a call site stays an implicit-this read and
/// reports `cannotFindProperty` with the module as receiver.
#[test]
fn unknown_name_reports_cannot_find_property() {
    let err = eval_single(|eval| {
        let ghost = eval.intern("ghost");
        ExprLoc::new(Expr::Name(NameRef::new(ghost)), at(7))
    })
    .expect_err("unknown name must fail");
    assert_eq!(err.kind, ErrorKind::CannotFindProperty);
    assert_eq!(err.span.line, 7, "the error points at the read site");
}

/// Bare `Callee` calls resolve through the same scopes as names.
#[test]
fn bare_call_through_function_value() {
    let got = eval_single(|eval| {
        let f = eval.intern("f");
        let x = eval.intern("x");
        let lambda = ExprLoc::new(
            Expr::FunctionLit {
                params: vec![x],
                body: Rc::new(binop(BinOp::Mul, ExprLoc::name(x, at(1)), ExprLoc::int(3, at(1)))),
            },
            at(1),
        );
        ExprLoc::new(
            Expr::Let {
                name: Some(f),
                binding: Box::new(lambda),
                body: Box::new(ExprLoc::new(
                    Expr::Call {
                        callee: Callee::Bare(NameRef::new(f)),
                        args: vec![ExprLoc::int(2, at(1))],
                    },
                    at(1),
                )),
            },
            at(1),
        )
    })
    .unwrap();
    assert_eq!(got, Value::Int(6));
}
