//! Operator semantics: checked integer arithmetic, float edge cases,
//! short-circuiting, subscripts, and string building.

mod common;

use common::{at, binop, eval_single};
use pkl_eval::{
    ErrorKind, Value,
    ast::{BinOp, Expr, ExprLoc, StringPart, UnaryOp},
};
use pretty_assertions::assert_eq;

fn unary(op: UnaryOp, operand: ExprLoc) -> ExprLoc {
    ExprLoc::new(
        Expr::UnaryOp {
            op,
            operand: Box::new(operand),
        },
        at(1),
    )
}

/// Integer addition overflows instead of wrapping.
#[test]
fn integer_addition_overflow() {
    let err = eval_single(|_| binop(BinOp::Add, ExprLoc::int(i64::MAX, at(1)), ExprLoc::int(1, at(1))))
        .expect_err("i64::MAX + 1 must overflow");
    assert_eq!(err.kind, ErrorKind::IntegerOverflow);
}

/// Unary minus on `Int.MIN_VALUE` overflows.
#[test]
fn integer_negation_overflow() {
    let err = eval_single(|_| unary(UnaryOp::Neg, ExprLoc::int(i64::MIN, at(1))))
        .expect_err("-Int.MIN_VALUE must overflow");
    assert_eq!(err.kind, ErrorKind::IntegerOverflow);
}

/// `**` overflows past the 64-bit range and stays exact below it.
#[test]
fn integer_pow() {
    assert_eq!(
        eval_single(|_| binop(BinOp::Pow, ExprLoc::int(2, at(1)), ExprLoc::int(62, at(1)))).unwrap(),
        Value::Int(1 << 62)
    );
    let err = eval_single(|_| binop(BinOp::Pow, ExprLoc::int(2, at(1)), ExprLoc::int(63, at(1))))
        .expect_err("2 ** 63 must overflow");
    assert_eq!(err.kind, ErrorKind::IntegerOverflow);
    // a negative exponent produces a Float
    assert_eq!(
        eval_single(|_| binop(BinOp::Pow, ExprLoc::int(2, at(1)), ExprLoc::int(-1, at(1)))).unwrap(),
        Value::Float(0.5)
    );
}

/// `~/` is truncated division; division by zero fails.
#[test]
fn truncated_division() {
    assert_eq!(
        eval_single(|_| binop(BinOp::IntDiv, ExprLoc::int(7, at(1)), ExprLoc::int(2, at(1)))).unwrap(),
        Value::Int(3)
    );
    assert_eq!(
        eval_single(|_| binop(BinOp::IntDiv, ExprLoc::int(-7, at(1)), ExprLoc::int(2, at(1)))).unwrap(),
        Value::Int(-3)
    );
    let err = eval_single(|_| binop(BinOp::IntDiv, ExprLoc::int(1, at(1)), ExprLoc::int(0, at(1))))
        .expect_err("~/ 0 must fail");
    assert_eq!(err.kind, ErrorKind::DivisionByZero);
}

/// `%` follows truncated division with the sign of the dividend, for
/// both Int and Float operands.
#[test]
fn remainder_sign_follows_dividend() {
    assert_eq!(
        eval_single(|_| binop(BinOp::Rem, ExprLoc::int(-7, at(1)), ExprLoc::int(2, at(1)))).unwrap(),
        Value::Int(-1)
    );
    assert_eq!(
        eval_single(|_| binop(BinOp::Rem, ExprLoc::int(7, at(1)), ExprLoc::int(-2, at(1)))).unwrap(),
        Value::Int(1)
    );
    assert_eq!(
        eval_single(|_| binop(BinOp::Rem, ExprLoc::float(-7.5, at(1)), ExprLoc::float(2.0, at(1)))).unwrap(),
        Value::Float(-1.5)
    );
}

/// `/` always produces a Float.
#[test]
fn division_produces_float() {
    assert_eq!(
        eval_single(|_| binop(BinOp::Div, ExprLoc::int(5, at(1)), ExprLoc::int(2, at(1)))).unwrap(),
        Value::Float(2.5)
    );
}

/// `NaN != NaN` under `==`; ordering comparisons with NaN fail.
#[test]
fn nan_equality_and_comparison() {
    let nan = |eval: &mut common::Eval<'_>| {
        let id = eval.intern("NaN");
        ExprLoc::name(id, at(1))
    };
    assert_eq!(
        eval_single(|eval| binop(BinOp::Eq, nan(eval), nan(eval))).unwrap(),
        Value::Bool(false),
        "NaN == NaN is false"
    );
    let err = eval_single(|eval| binop(BinOp::Lt, nan(eval), ExprLoc::float(1.0, at(1))))
        .expect_err("NaN ordering must fail");
    assert_eq!(err.kind, ErrorKind::CannotCompareValues);
}

/// `Int` and `Float` compare equal across the numeric promotion.
#[test]
fn numeric_promotion_equality() {
    assert_eq!(
        eval_single(|_| binop(BinOp::Eq, ExprLoc::int(1, at(1)), ExprLoc::float(1.0, at(1)))).unwrap(),
        Value::Bool(true)
    );
}

/// `&&` and `||` short-circuit: the failing right side is never touched.
#[test]
fn logical_short_circuit() {
    let poison = || {
        binop(
            BinOp::Eq,
            binop(BinOp::IntDiv, ExprLoc::int(1, at(1)), ExprLoc::int(0, at(1))),
            ExprLoc::int(0, at(1)),
        )
    };
    assert_eq!(
        eval_single(|_| binop(BinOp::And, ExprLoc::bool(false, at(1)), poison())).unwrap(),
        Value::Bool(false)
    );
    assert_eq!(
        eval_single(|_| binop(BinOp::Or, ExprLoc::bool(true, at(1)), poison())).unwrap(),
        Value::Bool(true)
    );
}

/// `??` takes the right side only for null.
#[test]
fn null_coalescing() {
    assert_eq!(
        eval_single(|_| binop(BinOp::NullCoalesce, ExprLoc::null(at(1)), ExprLoc::int(5, at(1)))).unwrap(),
        Value::Int(5)
    );
    assert_eq!(
        eval_single(|_| binop(BinOp::NullCoalesce, ExprLoc::int(3, at(1)), ExprLoc::int(5, at(1)))).unwrap(),
        Value::Int(3)
    );
}

/// `a |> f` applies the function on the right to the value on the left.
#[test]
fn pipe_applies_function() {
    let got = eval_single(|eval| {
        let x = eval.intern("x");
        let lambda = ExprLoc::new(
            Expr::FunctionLit {
                params: vec![x],
                body: std::rc::Rc::new(binop(BinOp::Add, ExprLoc::name(x, at(1)), ExprLoc::int(1, at(1)))),
            },
            at(1),
        );
        binop(BinOp::Pipe, ExprLoc::int(2, at(1)), lambda)
    })
    .unwrap();
    assert_eq!(got, Value::Int(3));
}

/// `e!!` rejects null and passes everything else through.
#[test]
fn non_null_assertion() {
    let err = eval_single(|_| ExprLoc::new(Expr::NonNull(Box::new(ExprLoc::null(at(1)))), at(1)))
        .expect_err("null!! must fail");
    assert_eq!(err.kind, ErrorKind::TypeMismatch);
    assert_eq!(
        eval_single(|_| ExprLoc::new(Expr::NonNull(Box::new(ExprLoc::int(5, at(1)))), at(1))).unwrap(),
        Value::Int(5)
    );
}

/// An `if` condition must be a Boolean; the arms stay lazy.
#[test]
fn if_condition_is_typed() {
    let err = eval_single(|_| {
        ExprLoc::new(
            Expr::If {
                cond: Box::new(ExprLoc::int(1, at(1))),
                then_expr: Box::new(ExprLoc::int(1, at(1))),
                else_expr: Box::new(ExprLoc::int(2, at(1))),
            },
            at(1),
        )
    })
    .expect_err("non-boolean condition must fail");
    assert_eq!(err.kind, ErrorKind::TypeMismatch);
}

/// `let` binds eagerly and the body sees the slot.
#[test]
fn let_binding() {
    let got = eval_single(|eval| {
        let k = eval.intern("k");
        ExprLoc::new(
            Expr::Let {
                name: Some(k),
                binding: Box::new(ExprLoc::int(2, at(1))),
                body: Box::new(binop(BinOp::Mul, ExprLoc::name(k, at(1)), ExprLoc::int(3, at(1)))),
            },
            at(1),
        )
    })
    .unwrap();
    assert_eq!(got, Value::Int(6));
}

/// String subscripts index Unicode code points, including astral ones.
#[test]
fn string_subscript_is_code_point_based() {
    let subscript = |s: &str, i: i64| {
        let text: std::rc::Rc<str> = s.into();
        eval_single(move |_| {
            ExprLoc::new(
                Expr::Subscript {
                    receiver: Box::new(ExprLoc::str(text, at(1))),
                    index: Box::new(ExprLoc::int(i, at(1))),
                },
                at(1),
            )
        })
    };
    assert_eq!(subscript("héllo", 1).unwrap(), Value::Str("é".into()));
    assert_eq!(
        subscript("a😀b", 1).unwrap(),
        Value::Str("😀".into()),
        "indexing across a surrogate boundary yields the full code point"
    );
    let err = subscript("ab", 5).expect_err("out-of-range index must fail");
    assert_eq!(err.kind, ErrorKind::CharIndexOutOfRange);
}

/// String interpolation concatenates display forms.
#[test]
fn string_interpolation() {
    let got = eval_single(|_| {
        ExprLoc::new(
            Expr::StringInterp {
                parts: vec![
                    StringPart::Lit("a=".into()),
                    StringPart::Interp(binop(BinOp::Add, ExprLoc::int(1, at(1)), ExprLoc::int(2, at(1)))),
                ],
                multiline_indent: None,
            },
            at(1),
        )
    })
    .unwrap();
    assert_eq!(got, Value::Str("a=3".into()));
}

/// Multi-line strings strip the closing delimiter's indent.
#[test]
fn multiline_string_strips_common_indent() {
    let got = eval_single(|_| {
        ExprLoc::new(
            Expr::StringInterp {
                parts: vec![StringPart::Lit("\n    foo\n    bar\n    ".into())],
                multiline_indent: Some(4),
            },
            at(1),
        )
    })
    .unwrap();
    assert_eq!(got, Value::Str("foo\nbar".into()));
}

/// `+` concatenates strings and lists.
#[test]
fn addition_concatenates() {
    assert_eq!(
        eval_single(|_| binop(BinOp::Add, ExprLoc::str("ab", at(1)), ExprLoc::str("cd", at(1)))).unwrap(),
        Value::Str("abcd".into())
    );
    let got = eval_single(|eval| {
        let list = eval.intern("List");
        binop(
            BinOp::Add,
            ExprLoc::call(list, vec![ExprLoc::int(1, at(1))], at(1)),
            ExprLoc::call(list, vec![ExprLoc::int(2, at(1))], at(1)),
        )
    })
    .unwrap();
    let Value::List(items) = got else {
        panic!("expected a List");
    };
    assert_eq!(*items, vec![Value::Int(1), Value::Int(2)]);
}

/// `throw` aborts with a user error carrying the message.
#[test]
fn throw_is_user_error() {
    let err = eval_single(|_| ExprLoc::new(Expr::Throw(Box::new(ExprLoc::str("boom", at(1)))), at(1)))
        .expect_err("throw must fail");
    assert_eq!(err.kind, ErrorKind::UserThrow);
    assert_eq!(err.message, "boom");
}

/// Ordering across unrelated types fails rather than guessing.
#[test]
fn mixed_type_comparison_fails() {
    let err = eval_single(|_| binop(BinOp::Lt, ExprLoc::int(1, at(1)), ExprLoc::str("a", at(1))))
        .expect_err("Int < String must fail");
    assert_eq!(err.kind, ErrorKind::CannotCompareValues);
}
