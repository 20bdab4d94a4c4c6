//! Builtin callables: prelude constructors, `math` functions, the test
//! harness hook, and the bound-method bridge.
//!
//! Each variant corresponds to one prelude function. The enum is both
//! the dispatch tag in `call()` and the identity stored inside builtin
//! function values.

use std::rc::Rc;

use crate::{
    ast::Span,
    error::{ErrorKind, EvalResult},
    eval::Evaluator,
    io::TraceWriter,
    resource::ResourceTracker,
    stdlib::methods::{BuiltinMethod, call_method},
    value::{Value, VmMap, VmPair, VmRegex, VmSet},
};

/// Prelude functions and bound builtin methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum BuiltinFunction {
    // constructors
    ListNew,
    SetNew,
    MapNew,
    PairNew,
    RegexNew,
    IntSeqNew,
    // math module
    MathAbs,
    MathCeil,
    MathFloor,
    MathRound,
    MathSqrt,
    MathCbrt,
    MathExp,
    MathLog,
    MathLog2,
    MathLog10,
    MathSin,
    MathCos,
    MathTan,
    MathAsin,
    MathAcos,
    MathAtan,
    MathAtan2,
    MathPow,
    MathMin,
    MathMax,
    MathIsPowerOfTwo,
    MathSign,
    MathGcd,
    // test module
    TestCatch,
    /// A builtin method bound to a receiver.
    Method(BuiltinMethod),
}

impl BuiltinFunction {
    /// Dispatches the call. `this` is the bound receiver for methods and
    /// null for free functions.
    pub(crate) fn call<T: ResourceTracker, W: TraceWriter>(
        self,
        eval: &mut Evaluator<'_, T, W>,
        this: &Value,
        args: Vec<Value>,
        span: Span,
    ) -> EvalResult<Value> {
        match self {
            Self::ListNew => Ok(Value::List(Rc::new(args))),
            Self::SetNew => Ok(Value::Set(Rc::new(VmSet::from_iter(args)))),
            Self::MapNew => {
                if args.len() % 2 != 0 {
                    return Err(eval.err(
                        ErrorKind::WrongArgumentCount,
                        "Map() expects an even number of arguments (alternating keys and values)",
                        span,
                    ));
                }
                let mut pairs = Vec::with_capacity(args.len() / 2);
                let mut iter = args.into_iter();
                while let (Some(k), Some(v)) = (iter.next(), iter.next()) {
                    eval.force_deep(&k, span)?;
                    pairs.push((k, v));
                }
                Ok(Value::Map(Rc::new(VmMap::from_pairs(pairs))))
            }
            Self::PairNew => {
                let [first, second] = take_args(eval, "Pair", args, span)?;
                Ok(Value::Pair(Rc::new(VmPair { first, second })))
            }
            Self::RegexNew => {
                let [pattern] = take_args(eval, "Regex", args, span)?;
                let Value::Str(source) = pattern else {
                    return Err(eval.err(
                        ErrorKind::TypeMismatch,
                        format!("Regex() expects a String pattern but got {}", pattern.type_name()),
                        span,
                    ));
                };
                match regex::Regex::new(&source) {
                    Ok(compiled) => Ok(Value::Regex(Rc::new(VmRegex {
                        source,
                        pattern: compiled,
                    }))),
                    Err(e) => Err(eval.err(
                        ErrorKind::TypeMismatch,
                        format!("invalid regular expression: {e}"),
                        span,
                    )),
                }
            }
            Self::IntSeqNew => {
                let [start, end] = take_args(eval, "IntSeq", args, span)?;
                let (Value::Int(start), Value::Int(end)) = (&start, &end) else {
                    return Err(eval.err(
                        ErrorKind::TypeMismatch,
                        "IntSeq() expects two Int arguments",
                        span,
                    ));
                };
                let items = (*start..=*end).map(Value::Int).collect();
                Ok(Value::List(Rc::new(items)))
            }
            Self::TestCatch => {
                let [thunk] = take_args(eval, "catch", args, span)?;
                match eval.apply(&thunk, Vec::new(), span) {
                    Ok(_) => Err(eval.err(
                        ErrorKind::UserThrow,
                        "expected an error, but none was thrown",
                        span,
                    )),
                    Err(e) => Ok(Value::Str(Rc::from(e.message.as_str()))),
                }
            }
            Self::MathAtan2 => {
                let [y, x] = take_numbers(eval, "atan2", args, span)?;
                Ok(Value::Float(y.atan2(x)))
            }
            Self::MathPow => {
                let [base, exp] = take_numbers(eval, "pow", args, span)?;
                Ok(Value::Float(base.powf(exp)))
            }
            Self::MathMin | Self::MathMax => {
                let [a, b] = take_args(eval, "min", args, span)?;
                let Some(ordering) = crate::value::compare_values(&a, &b) else {
                    return Err(eval.err(
                        ErrorKind::CannotCompareValues,
                        format!("cannot compare {} with {}", a.type_name(), b.type_name()),
                        span,
                    ));
                };
                let pick_a = if self == Self::MathMin {
                    ordering.is_le()
                } else {
                    ordering.is_ge()
                };
                Ok(if pick_a { a } else { b })
            }
            Self::MathIsPowerOfTwo => {
                let [value] = take_args(eval, "isPowerOfTwo", args, span)?;
                let Value::Int(i) = value else {
                    return Err(eval.err(
                        ErrorKind::TypeMismatch,
                        format!("isPowerOfTwo() expects an Int but got {}", value.type_name()),
                        span,
                    ));
                };
                Ok(Value::Bool(i > 0 && (i & (i - 1)) == 0))
            }
            Self::MathSign => {
                let [value] = take_args(eval, "sign", args, span)?;
                match value {
                    Value::Int(i) => Ok(Value::Int(i.signum())),
                    Value::Float(f) => Ok(Value::Float(if f == 0.0 { f } else { f.signum() })),
                    other => Err(eval.err(
                        ErrorKind::TypeMismatch,
                        format!("sign() expects a Number but got {}", other.type_name()),
                        span,
                    )),
                }
            }
            Self::MathGcd => {
                let [a, b] = take_args(eval, "gcd", args, span)?;
                let (Value::Int(a), Value::Int(b)) = (&a, &b) else {
                    return Err(eval.err(ErrorKind::TypeMismatch, "gcd() expects two Int arguments", span));
                };
                Ok(Value::Int(gcd(a.unsigned_abs(), b.unsigned_abs()) as i64))
            }
            Self::MathAbs => {
                let [value] = take_args(eval, "abs", args, span)?;
                match value {
                    Value::Int(i) => i.checked_abs().map(Value::Int).ok_or_else(|| {
                        eval.err(ErrorKind::IntegerOverflow, "integer overflow in `abs`", span)
                    }),
                    Value::Float(f) => Ok(Value::Float(f.abs())),
                    other => Err(eval.err(
                        ErrorKind::TypeMismatch,
                        format!("abs() expects a Number but got {}", other.type_name()),
                        span,
                    )),
                }
            }
            Self::MathCeil | Self::MathFloor | Self::MathRound => {
                let [value] = take_args(eval, "a rounding function", args, span)?;
                match value {
                    Value::Int(i) => Ok(Value::Int(i)),
                    Value::Float(f) => {
                        let rounded = match self {
                            Self::MathCeil => f.ceil(),
                            Self::MathFloor => f.floor(),
                            _ => f.round(),
                        };
                        Ok(Value::Float(rounded))
                    }
                    other => Err(eval.err(
                        ErrorKind::TypeMismatch,
                        format!("expected a Number but got {}", other.type_name()),
                        span,
                    )),
                }
            }
            Self::MathSqrt
            | Self::MathCbrt
            | Self::MathExp
            | Self::MathLog
            | Self::MathLog2
            | Self::MathLog10
            | Self::MathSin
            | Self::MathCos
            | Self::MathTan
            | Self::MathAsin
            | Self::MathAcos
            | Self::MathAtan => {
                let [x] = take_numbers(eval, "a math function", args, span)?;
                let result = match self {
                    Self::MathSqrt => x.sqrt(),
                    Self::MathCbrt => x.cbrt(),
                    Self::MathExp => x.exp(),
                    Self::MathLog => x.ln(),
                    Self::MathLog2 => x.log2(),
                    Self::MathLog10 => x.log10(),
                    Self::MathSin => x.sin(),
                    Self::MathCos => x.cos(),
                    Self::MathTan => x.tan(),
                    Self::MathAsin => x.asin(),
                    Self::MathAcos => x.acos(),
                    _ => x.atan(),
                };
                Ok(Value::Float(result))
            }
            Self::Method(method) => call_method(eval, method, this, args, span),
        }
    }
}

/// Exact-arity argument extraction.
fn take_args<const N: usize, T: ResourceTracker, W: TraceWriter>(
    eval: &Evaluator<'_, T, W>,
    name: &str,
    args: Vec<Value>,
    span: Span,
) -> EvalResult<[Value; N]> {
    let count = args.len();
    args.try_into().map_err(|_| {
        eval.err(
            ErrorKind::WrongArgumentCount,
            format!("{name} expects {N} argument(s) but got {count}"),
            span,
        )
    })
}

/// Exact-arity numeric argument extraction.
fn take_numbers<const N: usize, T: ResourceTracker, W: TraceWriter>(
    eval: &Evaluator<'_, T, W>,
    name: &str,
    args: Vec<Value>,
    span: Span,
) -> EvalResult<[f64; N]> {
    let values = take_args::<N, T, W>(eval, name, args, span)?;
    let mut out = [0.0; N];
    for (slot, value) in out.iter_mut().zip(&values) {
        let Some(n) = value.as_number() else {
            return Err(eval.err(
                ErrorKind::TypeMismatch,
                format!("{name} expects Number arguments but got {}", value.type_name()),
                span,
            ));
        };
        *slot = n.as_f64();
    }
    Ok(out)
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}
