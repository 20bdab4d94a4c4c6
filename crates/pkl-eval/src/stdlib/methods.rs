//! The builtin member surface of primitive and collection values.
//!
//! Property reads compute immediately; method reads return a function
//! bound to the receiver, dispatched through
//! [`BuiltinFunction::Method`](super::BuiltinFunction). `member_kind` is
//! the single source of truth for which names exist on which receivers —
//! the resolver consults it (through `has_builtin_member`) when deciding
//! custom-`this` reads in constraint scopes.

use std::{rc::Rc, str::FromStr};

use crate::{
    ast::Span,
    error::{ErrorKind, EvalResult},
    eval::Evaluator,
    intern::Identifier,
    io::TraceWriter,
    member::MemberKey,
    object::ObjKind,
    resource::ResourceTracker,
    stdlib::BuiltinFunction,
    value::{
        DataSize, DataSizeUnit, Duration, DurationUnit, FunctionBody, Number, Value, VmFunction, VmSet,
    },
};

/// Builtin properties, shared across receiver types where the semantics
/// coincide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinProp {
    Length,
    IsEmpty,
    First,
    FirstOrNull,
    Last,
    LastOrNull,
    Rest,
    Keys,
    Values,
    Chars,
    CodePoints,
    Abs,
    IsPositive,
    IsEven,
    IsOdd,
    IsNaN,
    IsFinite,
    IsInfinite,
    /// `Duration`/`DataSize` magnitude.
    UnitValue,
    /// `Duration`/`DataSize` unit as a string.
    Unit,
    Second,
    Pattern,
    /// A `Number` unit suffix producing a Duration (`5.min`).
    TimeUnit(DurationUnit),
    /// A `Number` unit suffix producing a DataSize (`3.mb`).
    SizeUnit(DataSizeUnit),
}

/// Builtin methods; bound to their receiver on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinMethod {
    Contains,
    StartsWith,
    EndsWith,
    Substring,
    ToUpperCase,
    ToLowerCase,
    Trim,
    Split,
    Replace,
    Matches,
    Repeat,
    GetOrNull,
    Join,
    MapFn,
    Filter,
    Fold,
    Take,
    Drop,
    Add,
    Flatten,
    ToSet,
    ToList,
    ToMap,
    ContainsKey,
    Distinct,
    Reverse,
    ToInt,
    ToIntOrNull,
    ToFloat,
    ToFloatOrNull,
    ToBoolean,
    Round,
    Floor,
    Ceil,
    Truncated,
    ToUnit,
    DecodeToString,
    FindMatchesIn,
    Apply,
    GetClass,
    ToString,
    IfNonNull,
    HasProperty,
    GetProperty,
    GetPropertyOrNull,
}

enum BuiltinEntry {
    Prop(BuiltinProp),
    Method(BuiltinMethod),
}

/// Reads a builtin member off a value; `Ok(None)` when the name is not
/// part of the receiver's surface.
pub(crate) fn read_builtin_member<T: ResourceTracker, W: TraceWriter>(
    eval: &mut Evaluator<'_, T, W>,
    value: &Value,
    name_id: Identifier,
    span: Span,
) -> EvalResult<Option<Value>> {
    if name_id.is_local() {
        return Ok(None);
    }
    let name = eval.interner.resolve(name_id).to_owned();
    match member_kind(value, &name) {
        None => Ok(None),
        Some(BuiltinEntry::Prop(prop)) => prop_value(eval, value, prop, span).map(Some),
        Some(BuiltinEntry::Method(method)) => Ok(Some(Value::Function(Rc::new(VmFunction {
            params: Vec::new(),
            param_tys: Vec::new(),
            this: value.clone(),
            owner: Value::Null,
            frame: None,
            return_ty: None,
            name: Some(name_id),
            body: FunctionBody::Builtin(BuiltinFunction::Method(method)),
        })))),
    }
}

/// Whether a value has a builtin member under `name`.
pub(crate) fn has_builtin_member<T: ResourceTracker, W: TraceWriter>(
    eval: &Evaluator<'_, T, W>,
    value: &Value,
    name_id: Identifier,
) -> bool {
    !name_id.is_local() && member_kind(value, eval.interner.resolve(name_id)).is_some()
}

fn member_kind(value: &Value, name: &str) -> Option<BuiltinEntry> {
    use BuiltinEntry::{Method as M, Prop as P};
    // the Any surface
    match name {
        "getClass" => return Some(M(BuiltinMethod::GetClass)),
        "toString" => return Some(M(BuiltinMethod::ToString)),
        "ifNonNull" => return Some(M(BuiltinMethod::IfNonNull)),
        _ => {}
    }
    let entry = match value {
        Value::Str(_) => match name {
            "length" => P(BuiltinProp::Length),
            "isEmpty" => P(BuiltinProp::IsEmpty),
            "chars" => P(BuiltinProp::Chars),
            "codePoints" => P(BuiltinProp::CodePoints),
            "contains" => M(BuiltinMethod::Contains),
            "startsWith" => M(BuiltinMethod::StartsWith),
            "endsWith" => M(BuiltinMethod::EndsWith),
            "substring" => M(BuiltinMethod::Substring),
            "toUpperCase" => M(BuiltinMethod::ToUpperCase),
            "toLowerCase" => M(BuiltinMethod::ToLowerCase),
            "trim" => M(BuiltinMethod::Trim),
            "split" => M(BuiltinMethod::Split),
            "replace" => M(BuiltinMethod::Replace),
            "matches" => M(BuiltinMethod::Matches),
            "repeat" => M(BuiltinMethod::Repeat),
            "getOrNull" => M(BuiltinMethod::GetOrNull),
            "reverse" => M(BuiltinMethod::Reverse),
            "toInt" => M(BuiltinMethod::ToInt),
            "toIntOrNull" => M(BuiltinMethod::ToIntOrNull),
            "toFloat" => M(BuiltinMethod::ToFloat),
            "toFloatOrNull" => M(BuiltinMethod::ToFloatOrNull),
            "toBoolean" => M(BuiltinMethod::ToBoolean),
            _ => return None,
        },
        Value::Int(_) => match name {
            "abs" => P(BuiltinProp::Abs),
            "isPositive" => P(BuiltinProp::IsPositive),
            "isEven" => P(BuiltinProp::IsEven),
            "isOdd" => P(BuiltinProp::IsOdd),
            "toFloat" => M(BuiltinMethod::ToFloat),
            _ => return number_unit(name),
        },
        Value::Float(_) => match name {
            "abs" => P(BuiltinProp::Abs),
            "isPositive" => P(BuiltinProp::IsPositive),
            "isNaN" => P(BuiltinProp::IsNaN),
            "isFinite" => P(BuiltinProp::IsFinite),
            "isInfinite" => P(BuiltinProp::IsInfinite),
            "round" => M(BuiltinMethod::Round),
            "floor" => M(BuiltinMethod::Floor),
            "ceil" => M(BuiltinMethod::Ceil),
            "truncated" => M(BuiltinMethod::Truncated),
            "toInt" => M(BuiltinMethod::ToInt),
            _ => return number_unit(name),
        },
        Value::Duration(_) | Value::DataSize(_) => match name {
            "value" => P(BuiltinProp::UnitValue),
            "unit" => P(BuiltinProp::Unit),
            "isPositive" => P(BuiltinProp::IsPositive),
            "toUnit" => M(BuiltinMethod::ToUnit),
            _ => return None,
        },
        Value::Bytes(_) => match name {
            "length" => P(BuiltinProp::Length),
            "isEmpty" => P(BuiltinProp::IsEmpty),
            "toList" => M(BuiltinMethod::ToList),
            "decodeToString" => M(BuiltinMethod::DecodeToString),
            _ => return None,
        },
        Value::Regex(_) => match name {
            "pattern" => P(BuiltinProp::Pattern),
            "findMatchesIn" => M(BuiltinMethod::FindMatchesIn),
            _ => return None,
        },
        Value::Pair(_) => match name {
            "first" => P(BuiltinProp::First),
            "second" => P(BuiltinProp::Second),
            _ => return None,
        },
        Value::List(_) => match name {
            "length" => P(BuiltinProp::Length),
            "isEmpty" => P(BuiltinProp::IsEmpty),
            "first" => P(BuiltinProp::First),
            "firstOrNull" => P(BuiltinProp::FirstOrNull),
            "last" => P(BuiltinProp::Last),
            "lastOrNull" => P(BuiltinProp::LastOrNull),
            "rest" => P(BuiltinProp::Rest),
            "contains" => M(BuiltinMethod::Contains),
            "reverse" => M(BuiltinMethod::Reverse),
            "join" => M(BuiltinMethod::Join),
            "getOrNull" => M(BuiltinMethod::GetOrNull),
            "take" => M(BuiltinMethod::Take),
            "drop" => M(BuiltinMethod::Drop),
            "map" => M(BuiltinMethod::MapFn),
            "filter" => M(BuiltinMethod::Filter),
            "fold" => M(BuiltinMethod::Fold),
            "flatten" => M(BuiltinMethod::Flatten),
            "add" => M(BuiltinMethod::Add),
            "distinct" => M(BuiltinMethod::Distinct),
            "toSet" => M(BuiltinMethod::ToSet),
            _ => return None,
        },
        Value::Set(_) => match name {
            "length" => P(BuiltinProp::Length),
            "isEmpty" => P(BuiltinProp::IsEmpty),
            "contains" => M(BuiltinMethod::Contains),
            "add" => M(BuiltinMethod::Add),
            "toList" => M(BuiltinMethod::ToList),
            _ => return None,
        },
        Value::Map(_) => match name {
            "length" => P(BuiltinProp::Length),
            "isEmpty" => P(BuiltinProp::IsEmpty),
            "keys" => P(BuiltinProp::Keys),
            "values" => P(BuiltinProp::Values),
            "containsKey" => M(BuiltinMethod::ContainsKey),
            "getOrNull" => M(BuiltinMethod::GetOrNull),
            _ => return None,
        },
        Value::Function(_) => match name {
            "apply" => M(BuiltinMethod::Apply),
            _ => return None,
        },
        Value::Object(obj) => match (obj.kind, name) {
            (ObjKind::Listing, "length") => P(BuiltinProp::Length),
            (ObjKind::Listing, "isEmpty") => P(BuiltinProp::IsEmpty),
            (ObjKind::Listing, "toList") => M(BuiltinMethod::ToList),
            (ObjKind::Listing, "join") => M(BuiltinMethod::Join),
            (ObjKind::Listing, "contains") => M(BuiltinMethod::Contains),
            (ObjKind::Listing, "distinct") => M(BuiltinMethod::Distinct),
            (ObjKind::Listing, "getOrNull") => M(BuiltinMethod::GetOrNull),
            (ObjKind::Mapping, "length") => P(BuiltinProp::Length),
            (ObjKind::Mapping, "isEmpty") => P(BuiltinProp::IsEmpty),
            (ObjKind::Mapping, "keys") => P(BuiltinProp::Keys),
            (ObjKind::Mapping, "containsKey") => M(BuiltinMethod::ContainsKey),
            (ObjKind::Mapping, "getOrNull") => M(BuiltinMethod::GetOrNull),
            (ObjKind::Mapping, "toMap") => M(BuiltinMethod::ToMap),
            (ObjKind::Dynamic, "hasProperty") => M(BuiltinMethod::HasProperty),
            (ObjKind::Dynamic, "getProperty") => M(BuiltinMethod::GetProperty),
            (ObjKind::Dynamic, "getPropertyOrNull") => M(BuiltinMethod::GetPropertyOrNull),
            (ObjKind::Dynamic, "toMap") => M(BuiltinMethod::ToMap),
            (ObjKind::Dynamic, "length") => P(BuiltinProp::Length),
            _ => return None,
        },
        Value::Null | Value::Bool(_) | Value::Class(_) | Value::TypeAlias(_) => return None,
    };
    Some(entry)
}

fn number_unit(name: &str) -> Option<BuiltinEntry> {
    if let Ok(unit) = DurationUnit::from_str(name) {
        return Some(BuiltinEntry::Prop(BuiltinProp::TimeUnit(unit)));
    }
    if let Ok(unit) = DataSizeUnit::from_str(name) {
        return Some(BuiltinEntry::Prop(BuiltinProp::SizeUnit(unit)));
    }
    None
}

fn prop_value<T: ResourceTracker, W: TraceWriter>(
    eval: &mut Evaluator<'_, T, W>,
    value: &Value,
    prop: BuiltinProp,
    span: Span,
) -> EvalResult<Value> {
    match (prop, value) {
        (BuiltinProp::Length, Value::Str(s)) => Ok(Value::Int(s.chars().count() as i64)),
        (BuiltinProp::Length, Value::Bytes(b)) => Ok(Value::Int(b.len() as i64)),
        (BuiltinProp::Length, Value::List(xs)) => Ok(Value::Int(xs.len() as i64)),
        (BuiltinProp::Length, Value::Set(s)) => Ok(Value::Int(s.items.len() as i64)),
        (BuiltinProp::Length, Value::Map(m)) => Ok(Value::Int(m.entries.len() as i64)),
        (BuiltinProp::Length, Value::Object(o)) => match o.kind {
            ObjKind::Listing | ObjKind::Dynamic => Ok(Value::Int(o.listing_length())),
            ObjKind::Mapping => Ok(Value::Int(
                o.effective_keys()
                    .iter()
                    .filter(|k| matches!(k, MemberKey::Entry(_)))
                    .count() as i64,
            )),
            ObjKind::Typed => unreachable!("typed objects have no length"),
        },
        (BuiltinProp::IsEmpty, _) => {
            let length = prop_value(eval, value, BuiltinProp::Length, span)?;
            let Value::Int(n) = length else {
                unreachable!("length is always an Int");
            };
            Ok(Value::Bool(n == 0))
        }
        (BuiltinProp::First, Value::List(xs)) => xs.first().cloned().ok_or_else(|| {
            eval.err(ErrorKind::ElementIndexOutOfRange, "cannot get the first element of an empty list", span)
        }),
        (BuiltinProp::FirstOrNull, Value::List(xs)) => Ok(xs.first().cloned().unwrap_or(Value::Null)),
        (BuiltinProp::Last, Value::List(xs)) => xs.last().cloned().ok_or_else(|| {
            eval.err(ErrorKind::ElementIndexOutOfRange, "cannot get the last element of an empty list", span)
        }),
        (BuiltinProp::LastOrNull, Value::List(xs)) => Ok(xs.last().cloned().unwrap_or(Value::Null)),
        (BuiltinProp::Rest, Value::List(xs)) => {
            if xs.is_empty() {
                return Err(eval.err(
                    ErrorKind::ElementIndexOutOfRange,
                    "cannot get the rest of an empty list",
                    span,
                ));
            }
            Ok(Value::List(Rc::new(xs[1..].to_vec())))
        }
        (BuiltinProp::Keys, Value::Map(m)) => Ok(Value::Set(Rc::new(VmSet::from_iter(
            m.entries.keys().cloned(),
        )))),
        (BuiltinProp::Keys, Value::Object(o)) => {
            let keys = o
                .effective_keys()
                .into_iter()
                .filter_map(|k| match k {
                    MemberKey::Entry(key) => Some(key),
                    _ => None,
                })
                .collect::<Vec<_>>();
            Ok(Value::Set(Rc::new(VmSet::from_iter(keys))))
        }
        (BuiltinProp::Values, Value::Map(m)) => Ok(Value::List(Rc::new(m.entries.values().cloned().collect()))),
        (BuiltinProp::Chars, Value::Str(s)) => Ok(Value::List(Rc::new(
            s.chars().map(|c| Value::Str(Rc::from(c.to_string()))).collect(),
        ))),
        (BuiltinProp::CodePoints, Value::Str(s)) => Ok(Value::List(Rc::new(
            s.chars().map(|c| Value::Int(i64::from(u32::from(c)))).collect(),
        ))),
        (BuiltinProp::Abs, Value::Int(i)) => i
            .checked_abs()
            .map(Value::Int)
            .ok_or_else(|| eval.err(ErrorKind::IntegerOverflow, "integer overflow in `abs`", span)),
        (BuiltinProp::Abs, Value::Float(f)) => Ok(Value::Float(f.abs())),
        (BuiltinProp::IsPositive, Value::Int(i)) => Ok(Value::Bool(*i >= 0)),
        (BuiltinProp::IsPositive, Value::Float(f)) => Ok(Value::Bool(*f >= 0.0)),
        (BuiltinProp::IsPositive, Value::Duration(d)) => Ok(Value::Bool(d.seconds() >= 0.0)),
        (BuiltinProp::IsPositive, Value::DataSize(d)) => Ok(Value::Bool(d.bytes() >= 0.0)),
        (BuiltinProp::IsEven, Value::Int(i)) => Ok(Value::Bool(i % 2 == 0)),
        (BuiltinProp::IsOdd, Value::Int(i)) => Ok(Value::Bool(i % 2 != 0)),
        (BuiltinProp::IsNaN, Value::Float(f)) => Ok(Value::Bool(f.is_nan())),
        (BuiltinProp::IsFinite, Value::Float(f)) => Ok(Value::Bool(f.is_finite())),
        (BuiltinProp::IsInfinite, Value::Float(f)) => Ok(Value::Bool(f.is_infinite())),
        (BuiltinProp::UnitValue, Value::Duration(d)) => Ok(number_value(d.value)),
        (BuiltinProp::UnitValue, Value::DataSize(d)) => Ok(number_value(d.value)),
        (BuiltinProp::Unit, Value::Duration(d)) => Ok(Value::Str(Rc::from(d.unit.to_string()))),
        (BuiltinProp::Unit, Value::DataSize(d)) => Ok(Value::Str(Rc::from(d.unit.to_string()))),
        (BuiltinProp::First, Value::Pair(p)) => Ok(p.first.clone()),
        (BuiltinProp::Second, Value::Pair(p)) => Ok(p.second.clone()),
        (BuiltinProp::Pattern, Value::Regex(r)) => Ok(Value::Str(Rc::clone(&r.source))),
        (BuiltinProp::TimeUnit(unit), _) => {
            let n = value.as_number().expect("unit suffixes only exist on numbers");
            Ok(Value::Duration(Duration::new(n, unit)))
        }
        (BuiltinProp::SizeUnit(unit), _) => {
            let n = value.as_number().expect("unit suffixes only exist on numbers");
            Ok(Value::DataSize(DataSize::new(n, unit)))
        }
        _ => unreachable!("member_kind only admits receiver/prop pairs handled above"),
    }
}

fn number_value(n: Number) -> Value {
    match n {
        Number::Int(i) => Value::Int(i),
        Number::Float(f) => Value::Float(f),
    }
}

/// Dispatches a bound builtin method.
pub(crate) fn call_method<T: ResourceTracker, W: TraceWriter>(
    eval: &mut Evaluator<'_, T, W>,
    method: BuiltinMethod,
    this: &Value,
    mut args: Vec<Value>,
    span: Span,
) -> EvalResult<Value> {
    use BuiltinMethod as BM;
    let arity: Option<usize> = match method {
        BM::Apply => None,
        BM::Substring | BM::Replace | BM::Fold => Some(2),
        BM::ToUpperCase
        | BM::ToLowerCase
        | BM::Trim
        | BM::Reverse
        | BM::Flatten
        | BM::ToSet
        | BM::ToList
        | BM::ToMap
        | BM::Distinct
        | BM::ToInt
        | BM::ToIntOrNull
        | BM::ToFloat
        | BM::ToFloatOrNull
        | BM::ToBoolean
        | BM::Round
        | BM::Floor
        | BM::Ceil
        | BM::Truncated
        | BM::DecodeToString
        | BM::GetClass
        | BM::ToString => Some(0),
        _ => Some(1),
    };
    if let Some(expected) = arity
        && args.len() != expected
    {
        return Err(eval.err(
            ErrorKind::WrongArgumentCount,
            format!("method expects {expected} argument(s) but got {}", args.len()),
            span,
        ));
    }
    match (method, this) {
        (BM::GetClass, _) => Ok(Value::Class(eval.stdlib.class_of(this))),
        (BM::ToString, _) => {
            let text = eval.string_of(this, span)?;
            Ok(Value::Str(Rc::from(text)))
        }
        (BM::IfNonNull, _) => {
            let f = args.remove(0);
            if this.is_null() {
                Ok(Value::Null)
            } else {
                eval.apply(&f, vec![this.clone()], span)
            }
        }
        (BM::Apply, Value::Function(f)) => eval.call_function(f, args, span),

        // strings
        (BM::Contains, Value::Str(s)) => {
            let needle = expect_str(eval, &args[0], span)?;
            Ok(Value::Bool(s.contains(&*needle)))
        }
        (BM::StartsWith, Value::Str(s)) => {
            let needle = expect_str(eval, &args[0], span)?;
            Ok(Value::Bool(s.starts_with(&*needle)))
        }
        (BM::EndsWith, Value::Str(s)) => {
            let needle = expect_str(eval, &args[0], span)?;
            Ok(Value::Bool(s.ends_with(&*needle)))
        }
        (BM::Substring, Value::Str(s)) => {
            let (Value::Int(start), Value::Int(end)) = (&args[0], &args[1]) else {
                return Err(eval.err(ErrorKind::TypeMismatch, "substring() expects two Int indices", span));
            };
            let count = s.chars().count() as i64;
            if *start < 0 || *end < *start || *end > count {
                return Err(eval.err(
                    ErrorKind::CharIndexOutOfRange,
                    format!("substring range {start}..{end} is out of range for {count} code points"),
                    span,
                ));
            }
            let sub: String = s
                .chars()
                .skip(*start as usize)
                .take((*end - *start) as usize)
                .collect();
            Ok(Value::Str(Rc::from(sub)))
        }
        (BM::ToUpperCase, Value::Str(s)) => Ok(Value::Str(Rc::from(s.to_uppercase()))),
        (BM::ToLowerCase, Value::Str(s)) => Ok(Value::Str(Rc::from(s.to_lowercase()))),
        (BM::Trim, Value::Str(s)) => Ok(Value::Str(Rc::from(s.trim()))),
        (BM::Split, Value::Str(s)) => {
            let sep = expect_str(eval, &args[0], span)?;
            let parts = s
                .split(&*sep)
                .map(|part| Value::Str(Rc::from(part)))
                .collect::<Vec<_>>();
            Ok(Value::List(Rc::new(parts)))
        }
        (BM::Replace, Value::Str(s)) => {
            let from = expect_str(eval, &args[0], span)?;
            let to = expect_str(eval, &args[1], span)?;
            Ok(Value::Str(Rc::from(s.replace(&*from, &to))))
        }
        (BM::Matches, Value::Str(s)) => {
            let Value::Regex(regex) = &args[0] else {
                return Err(eval.err(
                    ErrorKind::TypeMismatch,
                    format!("matches() expects a Regex but got {}", args[0].type_name()),
                    span,
                ));
            };
            // whole-string match
            let anchored = regex::Regex::new(&format!("\\A(?:{})\\z", regex.source))
                .expect("anchoring a valid pattern keeps it valid");
            Ok(Value::Bool(anchored.is_match(s)))
        }
        (BM::Repeat, Value::Str(s)) => {
            let Value::Int(n) = &args[0] else {
                return Err(eval.err(ErrorKind::TypeMismatch, "repeat() expects an Int", span));
            };
            let n = usize::try_from(*n)
                .map_err(|_| eval.err(ErrorKind::TypeMismatch, "repeat() expects a non-negative Int", span))?;
            Ok(Value::Str(Rc::from(s.repeat(n))))
        }
        (BM::Reverse, Value::Str(s)) => Ok(Value::Str(Rc::from(s.chars().rev().collect::<String>()))),
        (BM::GetOrNull, Value::Str(s)) => {
            let Value::Int(i) = &args[0] else {
                return Err(eval.err(ErrorKind::TypeMismatch, "getOrNull() expects an Int index", span));
            };
            Ok(usize::try_from(*i)
                .ok()
                .and_then(|i| s.chars().nth(i))
                .map_or(Value::Null, |c| Value::Str(Rc::from(c.to_string()))))
        }
        (BM::ToInt, Value::Str(s)) => s.trim().parse::<i64>().map(Value::Int).map_err(|_| {
            eval.err(ErrorKind::TypeMismatch, format!("cannot parse `{s}` as an Int"), span)
        }),
        (BM::ToIntOrNull, Value::Str(s)) => {
            Ok(s.trim().parse::<i64>().map_or(Value::Null, Value::Int))
        }
        (BM::ToFloat, Value::Str(s)) => s.trim().parse::<f64>().map(Value::Float).map_err(|_| {
            eval.err(ErrorKind::TypeMismatch, format!("cannot parse `{s}` as a Float"), span)
        }),
        (BM::ToFloatOrNull, Value::Str(s)) => {
            Ok(s.trim().parse::<f64>().map_or(Value::Null, Value::Float))
        }
        (BM::ToBoolean, Value::Str(s)) => match s.trim() {
            t if t.eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
            t if t.eq_ignore_ascii_case("false") => Ok(Value::Bool(false)),
            _ => Err(eval.err(
                ErrorKind::TypeMismatch,
                format!("cannot parse `{s}` as a Boolean"),
                span,
            )),
        },

        // numbers
        (BM::ToFloat, Value::Int(i)) => Ok(Value::Float(*i as f64)),
        (BM::Round, Value::Float(f)) => Ok(Value::Float(f.round())),
        (BM::Floor, Value::Float(f)) => Ok(Value::Float(f.floor())),
        (BM::Ceil, Value::Float(f)) => Ok(Value::Float(f.ceil())),
        (BM::Truncated, Value::Float(f)) => float_to_int(eval, f.trunc(), span),
        (BM::ToInt, Value::Float(f)) => float_to_int(eval, f.trunc(), span),

        // durations and data sizes
        (BM::ToUnit, Value::Duration(d)) => {
            let unit_name = expect_str(eval, &args[0], span)?;
            let Ok(unit) = DurationUnit::from_str(&unit_name) else {
                return Err(eval.err(
                    ErrorKind::TypeMismatch,
                    format!("`{unit_name}` is not a Duration unit"),
                    span,
                ));
            };
            Ok(Value::Duration(Duration::new(
                Number::Float(d.seconds() / unit.factor()),
                unit,
            )))
        }
        (BM::ToUnit, Value::DataSize(d)) => {
            let unit_name = expect_str(eval, &args[0], span)?;
            let Ok(unit) = DataSizeUnit::from_str(&unit_name) else {
                return Err(eval.err(
                    ErrorKind::TypeMismatch,
                    format!("`{unit_name}` is not a DataSize unit"),
                    span,
                ));
            };
            Ok(Value::DataSize(DataSize::new(
                Number::Float(d.bytes() / unit.factor()),
                unit,
            )))
        }

        // bytes
        (BM::ToList, Value::Bytes(b)) => Ok(Value::List(Rc::new(
            b.iter().map(|byte| Value::Int(i64::from(*byte))).collect(),
        ))),
        (BM::DecodeToString, Value::Bytes(b)) => match std::str::from_utf8(b) {
            Ok(s) => Ok(Value::Str(Rc::from(s))),
            Err(e) => Err(eval.err(ErrorKind::TypeMismatch, format!("invalid UTF-8: {e}"), span)),
        },

        // regexes
        (BM::FindMatchesIn, Value::Regex(r)) => {
            let input = expect_str(eval, &args[0], span)?;
            let found = r
                .pattern
                .find_iter(&input)
                .map(|m| Value::Str(Rc::from(m.as_str())))
                .collect::<Vec<_>>();
            Ok(Value::List(Rc::new(found)))
        }

        // lists and sets
        (BM::Contains, Value::List(xs)) => {
            let needle = args.remove(0);
            for item in xs.iter() {
                if eval.values_equal(item, &needle, span)? {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        (BM::Contains, Value::Set(set)) => {
            let needle = args.remove(0);
            for item in &set.items {
                if eval.values_equal(item, &needle, span)? {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        (BM::Reverse, Value::List(xs)) => {
            Ok(Value::List(Rc::new(xs.iter().rev().cloned().collect())))
        }
        (BM::Join, Value::List(xs)) => {
            let sep = expect_str(eval, &args[0], span)?;
            let mut parts = Vec::with_capacity(xs.len());
            for item in xs.iter() {
                parts.push(eval.string_of(item, span)?);
            }
            Ok(Value::Str(Rc::from(parts.join(&sep))))
        }
        (BM::GetOrNull, Value::List(xs)) => {
            let Value::Int(i) = &args[0] else {
                return Err(eval.err(ErrorKind::TypeMismatch, "getOrNull() expects an Int index", span));
            };
            Ok(usize::try_from(*i)
                .ok()
                .and_then(|i| xs.get(i))
                .cloned()
                .unwrap_or(Value::Null))
        }
        (BM::Take, Value::List(xs)) => {
            let n = expect_count(eval, &args[0], span)?;
            Ok(Value::List(Rc::new(xs.iter().take(n).cloned().collect())))
        }
        (BM::Drop, Value::List(xs)) => {
            let n = expect_count(eval, &args[0], span)?;
            Ok(Value::List(Rc::new(xs.iter().skip(n).cloned().collect())))
        }
        (BM::MapFn, Value::List(xs)) => {
            let f = args.remove(0);
            let mut out = Vec::with_capacity(xs.len());
            for item in xs.iter() {
                out.push(eval.apply(&f, vec![item.clone()], span)?);
            }
            Ok(Value::List(Rc::new(out)))
        }
        (BM::Filter, Value::List(xs)) => {
            let f = args.remove(0);
            let mut out = Vec::new();
            for item in xs.iter() {
                match eval.apply(&f, vec![item.clone()], span)? {
                    Value::Bool(true) => out.push(item.clone()),
                    Value::Bool(false) => {}
                    other => {
                        return Err(eval.err(
                            ErrorKind::TypeMismatch,
                            format!("a filter predicate must produce a Boolean but got {}", other.type_name()),
                            span,
                        ));
                    }
                }
            }
            Ok(Value::List(Rc::new(out)))
        }
        (BM::Fold, Value::List(xs)) => {
            let f = args.remove(1);
            let mut acc = args.remove(0);
            for item in xs.iter() {
                acc = eval.apply(&f, vec![acc, item.clone()], span)?;
            }
            Ok(acc)
        }
        (BM::Flatten, Value::List(xs)) => {
            let mut out = Vec::new();
            for item in xs.iter() {
                match item {
                    Value::List(inner) => out.extend(inner.iter().cloned()),
                    Value::Set(inner) => out.extend(inner.items.iter().cloned()),
                    other => {
                        return Err(eval.err(
                            ErrorKind::TypeMismatch,
                            format!("flatten() expects nested collections but found {}", other.type_name()),
                            span,
                        ));
                    }
                }
            }
            Ok(Value::List(Rc::new(out)))
        }
        (BM::Add, Value::List(xs)) => {
            let mut out = xs.as_ref().clone();
            out.push(args.remove(0));
            Ok(Value::List(Rc::new(out)))
        }
        (BM::Add, Value::Set(set)) => {
            let item = args.remove(0);
            eval.force_deep(&item, span)?;
            let merged = VmSet::from_iter(set.items.iter().cloned().chain([item]));
            Ok(Value::Set(Rc::new(merged)))
        }
        (BM::Distinct, Value::List(xs)) => {
            let mut out: Vec<Value> = Vec::new();
            for item in xs.iter() {
                let mut seen = false;
                for existing in &out {
                    if eval.values_equal(existing, item, span)? {
                        seen = true;
                        break;
                    }
                }
                if !seen {
                    out.push(item.clone());
                }
            }
            Ok(Value::List(Rc::new(out)))
        }
        (BM::ToSet, Value::List(xs)) => {
            for item in xs.iter() {
                eval.force_deep(item, span)?;
            }
            Ok(Value::Set(Rc::new(VmSet::from_iter(xs.iter().cloned()))))
        }
        (BM::ToList, Value::Set(set)) => Ok(Value::List(Rc::new(set.items.iter().cloned().collect()))),

        // maps
        (BM::ContainsKey, Value::Map(m)) => {
            let key = args.remove(0);
            eval.force_deep(&key, span)?;
            Ok(Value::Bool(m.entries.contains_key(&key)))
        }
        (BM::GetOrNull, Value::Map(m)) => {
            let key = args.remove(0);
            eval.force_deep(&key, span)?;
            Ok(m.entries.get(&key).cloned().unwrap_or(Value::Null))
        }

        // listings, mappings, dynamics
        (BM::ToList | BM::Join | BM::Contains | BM::Distinct | BM::GetOrNull, Value::Object(obj))
            if obj.kind == ObjKind::Listing =>
        {
            let length = obj.listing_length();
            let mut items = Vec::with_capacity(length as usize);
            for i in 0..length {
                items.push(eval.read_member(this, &MemberKey::Index(i), span)?);
            }
            let as_list = Value::List(Rc::new(items));
            match method {
                BM::ToList => Ok(as_list),
                BM::Distinct => {
                    let distinct = call_method(eval, BM::Distinct, &as_list, Vec::new(), span)?;
                    let Value::List(items) = distinct else {
                        unreachable!("List.distinct produces a List");
                    };
                    Ok(eval.stdlib.make_listing(items.as_ref().clone()))
                }
                _ => call_method(eval, method, &as_list, args, span),
            }
        }
        (BM::ContainsKey | BM::GetOrNull, Value::Object(obj)) if obj.kind == ObjKind::Mapping => {
            let key = args.remove(0);
            eval.force_deep(&key, span)?;
            let exists = obj.find_member(&MemberKey::Entry(key.clone())).is_some();
            if method == BM::ContainsKey {
                return Ok(Value::Bool(exists));
            }
            if exists {
                eval.read_member(this, &MemberKey::Entry(key), span)
            } else {
                Ok(Value::Null)
            }
        }
        (BM::ToMap, Value::Object(obj)) => {
            let mut pairs = Vec::new();
            for key in obj.effective_keys() {
                match key {
                    MemberKey::Entry(entry_key) => {
                        let item = eval.read_member(this, &MemberKey::Entry(entry_key.clone()), span)?;
                        pairs.push((entry_key, item));
                    }
                    MemberKey::Prop(name) if obj.kind == ObjKind::Dynamic => {
                        let item = eval.read_member(this, &MemberKey::Prop(name), span)?;
                        let key = Value::Str(Rc::from(eval.interner.resolve(name)));
                        pairs.push((key, item));
                    }
                    _ => {}
                }
            }
            Ok(Value::Map(Rc::new(crate::value::VmMap::from_pairs(pairs))))
        }
        (BM::HasProperty, Value::Object(_)) => {
            let name = expect_str(eval, &args[0], span)?;
            let id = eval.interner.intern(&name);
            let obj = this.as_object().expect("guard checked");
            Ok(Value::Bool(obj.find_member(&MemberKey::Prop(id)).is_some()))
        }
        (BM::GetProperty, Value::Object(_)) => {
            let name = expect_str(eval, &args[0], span)?;
            let id = eval.interner.intern(&name);
            eval.read_member(this, &MemberKey::Prop(id), span)
        }
        (BM::GetPropertyOrNull, Value::Object(_)) => {
            let name = expect_str(eval, &args[0], span)?;
            let id = eval.interner.intern(&name);
            match eval.read_member(this, &MemberKey::Prop(id), span) {
                Ok(value) => Ok(value),
                Err(e) if e.kind == ErrorKind::CannotFindProperty => Ok(Value::Null),
                Err(e) => Err(e),
            }
        }

        _ => Err(eval.err(
            ErrorKind::TypeMismatch,
            format!("method is not defined for {}", this.type_name()),
            span,
        )),
    }
}

fn expect_str<T: ResourceTracker, W: TraceWriter>(
    eval: &Evaluator<'_, T, W>,
    value: &Value,
    span: Span,
) -> EvalResult<Rc<str>> {
    match value {
        Value::Str(s) => Ok(Rc::clone(s)),
        other => Err(eval.err(
            ErrorKind::TypeMismatch,
            format!("expected a String argument but got {}", other.type_name()),
            span,
        )),
    }
}

fn expect_count<T: ResourceTracker, W: TraceWriter>(
    eval: &Evaluator<'_, T, W>,
    value: &Value,
    span: Span,
) -> EvalResult<usize> {
    match value {
        Value::Int(i) if *i >= 0 => Ok(*i as usize),
        other => Err(eval.err(
            ErrorKind::TypeMismatch,
            format!("expected a non-negative Int but got {}", other.type_name()),
            span,
        )),
    }
}

fn float_to_int<T: ResourceTracker, W: TraceWriter>(
    eval: &Evaluator<'_, T, W>,
    truncated: f64,
    span: Span,
) -> EvalResult<Value> {
    if truncated.is_nan() || truncated < i64::MIN as f64 || truncated > i64::MAX as f64 {
        return Err(eval.err(
            ErrorKind::IntegerOverflow,
            format!("{truncated} cannot be represented as an Int"),
            span,
        ));
    }
    Ok(Value::Int(truncated as i64))
}
