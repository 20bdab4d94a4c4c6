//! The runtime value algebra.
//!
//! [`Value`] is a closed sum. Small immediates (`Null`, `Bool`, `Int`,
//! `Float`) are stored inline; composites are shared via `Rc` — the
//! evaluator is single-threaded per module graph and every value is
//! immutable once forced, so plain reference counting is all the sharing
//! discipline we need.
//!
//! Structural equality is deep: order-sensitive for lists and listings,
//! order-insensitive for sets and maps, with numeric promotion between
//! `Int` and `Float` (and hashing consistent with it: integral floats
//! hash like the equal integer).

use std::{
    cmp::Ordering,
    collections::hash_map::DefaultHasher,
    fmt,
    hash::{Hash, Hasher},
    rc::Rc,
};

use indexmap::{IndexMap, IndexSet};
use strum::{Display, EnumString, IntoStaticStr};

use crate::{
    ast::ExprLoc,
    frame::Frame,
    intern::Identifier,
    object::{VmObject, object_eq},
    stdlib::BuiltinFunction,
    types::{VmClass, VmType, VmTypeAlias},
};

/// Hash state used for value-keyed tables.
pub type ValueHashState = ahash::RandomState;

/// Primary runtime value type.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Duration(Duration),
    DataSize(DataSize),
    Bytes(Rc<[u8]>),
    Regex(Rc<VmRegex>),
    Pair(Rc<VmPair>),
    List(Rc<Vec<Value>>),
    Set(Rc<VmSet>),
    Map(Rc<VmMap>),
    Object(Rc<VmObject>),
    Class(Rc<VmClass>),
    TypeAlias(Rc<VmTypeAlias>),
    Function(Rc<VmFunction>),
}

/// An `Int`-or-`Float` magnitude, used by durations and data sizes so the
/// written form survives into rendering (`5.min`, not `5.0.min`).
#[derive(Debug, Clone, Copy)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    /// The magnitude as a float.
    #[must_use]
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Int(i) => i as f64,
            Self::Float(f) => f,
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => f.write_str(&format_float(*x)),
        }
    }
}

/// Time units, smallest to largest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
pub enum DurationUnit {
    #[strum(serialize = "ns")]
    Nanos,
    #[strum(serialize = "us")]
    Micros,
    #[strum(serialize = "ms")]
    Millis,
    #[strum(serialize = "s")]
    Seconds,
    #[strum(serialize = "min")]
    Minutes,
    #[strum(serialize = "h")]
    Hours,
    #[strum(serialize = "d")]
    Days,
}

impl DurationUnit {
    /// Unit magnitude in seconds.
    #[must_use]
    pub fn factor(self) -> f64 {
        match self {
            Self::Nanos => 1e-9,
            Self::Micros => 1e-6,
            Self::Millis => 1e-3,
            Self::Seconds => 1.0,
            Self::Minutes => 60.0,
            Self::Hours => 3600.0,
            Self::Days => 86400.0,
        }
    }
}

/// A duration: magnitude plus unit. Equality and ordering compare the
/// canonical magnitude in seconds; the written unit is preserved.
#[derive(Debug, Clone, Copy)]
pub struct Duration {
    pub value: Number,
    pub unit: DurationUnit,
}

impl Duration {
    /// Creates a duration.
    #[must_use]
    pub fn new(value: Number, unit: DurationUnit) -> Self {
        Self { value, unit }
    }

    /// Canonical magnitude in seconds.
    #[must_use]
    pub fn seconds(self) -> f64 {
        self.value.as_f64() * self.unit.factor()
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.value, self.unit)
    }
}

/// Data-size units; decimal (kb) and binary (kib) kept distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
pub enum DataSizeUnit {
    #[strum(serialize = "b")]
    Bytes,
    #[strum(serialize = "kb")]
    Kilobytes,
    #[strum(serialize = "kib")]
    Kibibytes,
    #[strum(serialize = "mb")]
    Megabytes,
    #[strum(serialize = "mib")]
    Mebibytes,
    #[strum(serialize = "gb")]
    Gigabytes,
    #[strum(serialize = "gib")]
    Gibibytes,
    #[strum(serialize = "tb")]
    Terabytes,
    #[strum(serialize = "tib")]
    Tebibytes,
    #[strum(serialize = "pb")]
    Petabytes,
    #[strum(serialize = "pib")]
    Pebibytes,
}

impl DataSizeUnit {
    /// Unit magnitude in bytes.
    #[must_use]
    pub fn factor(self) -> f64 {
        match self {
            Self::Bytes => 1.0,
            Self::Kilobytes => 1e3,
            Self::Kibibytes => 1024.0,
            Self::Megabytes => 1e6,
            Self::Mebibytes => 1024.0 * 1024.0,
            Self::Gigabytes => 1e9,
            Self::Gibibytes => 1024.0 * 1024.0 * 1024.0,
            Self::Terabytes => 1e12,
            Self::Tebibytes => 1024.0f64.powi(4),
            Self::Petabytes => 1e15,
            Self::Pebibytes => 1024.0f64.powi(5),
        }
    }
}

/// A data size: magnitude plus unit, compared on the canonical byte scale.
#[derive(Debug, Clone, Copy)]
pub struct DataSize {
    pub value: Number,
    pub unit: DataSizeUnit,
}

impl DataSize {
    /// Creates a data size.
    #[must_use]
    pub fn new(value: Number, unit: DataSizeUnit) -> Self {
        Self { value, unit }
    }

    /// Canonical magnitude in bytes.
    #[must_use]
    pub fn bytes(self) -> f64 {
        self.value.as_f64() * self.unit.factor()
    }
}

impl fmt::Display for DataSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.value, self.unit)
    }
}

/// A compiled regular expression plus its source pattern.
///
/// Equality and hashing use the source pattern; the compiled form is a
/// cache.
#[derive(Debug)]
pub struct VmRegex {
    pub source: Rc<str>,
    pub pattern: regex::Regex,
}

/// An ordered pair.
#[derive(Debug)]
pub struct VmPair {
    pub first: Value,
    pub second: Value,
}

/// An insertion-ordered set with value equality.
#[derive(Debug, Default)]
pub struct VmSet {
    pub items: IndexSet<Value, ValueHashState>,
}

impl VmSet {
    /// Builds a set from an iterator, keeping first-insertion order.
    pub fn from_iter(values: impl IntoIterator<Item = Value>) -> Self {
        Self {
            items: values.into_iter().collect(),
        }
    }
}

/// An insertion-ordered map with value equality on keys.
#[derive(Debug, Default)]
pub struct VmMap {
    pub entries: IndexMap<Value, Value, ValueHashState>,
}

impl VmMap {
    /// Builds a map from key/value pairs; later duplicates overwrite
    /// earlier values but keep the original position.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (Value, Value)>) -> Self {
        let mut entries: IndexMap<Value, Value, ValueHashState> = IndexMap::default();
        for (k, v) in pairs {
            entries.insert(k, v);
        }
        Self { entries }
    }
}

/// The body of a function value.
#[derive(Debug)]
pub enum FunctionBody {
    /// A user function literal or method body.
    Expr(Rc<ExprLoc>),
    /// A prelude function, dispatched by enum.
    Builtin(BuiltinFunction),
}

/// A function value: closures and bound methods share this shape.
#[derive(Debug)]
pub struct VmFunction {
    /// Parameter names; the arity is `params.len()`.
    pub params: Vec<Identifier>,
    /// Declared parameter types, parallel to `params`; checked at call.
    pub param_tys: Vec<Option<Rc<VmType>>>,
    /// The captured receiver.
    pub this: Value,
    /// The captured lexical owner.
    pub owner: Value,
    /// The materialized defining frame.
    pub frame: Option<Rc<Frame>>,
    /// Declared return type, checked after each invocation.
    pub return_ty: Option<Rc<VmType>>,
    /// Name for error messages, when the function is a bound method.
    pub name: Option<Identifier>,
    pub body: FunctionBody,
}

impl Value {
    /// A short name of the value's kind for error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "Null",
            Self::Bool(_) => "Boolean",
            Self::Int(_) => "Int",
            Self::Float(_) => "Float",
            Self::Str(_) => "String",
            Self::Duration(_) => "Duration",
            Self::DataSize(_) => "DataSize",
            Self::Bytes(_) => "Bytes",
            Self::Regex(_) => "Regex",
            Self::Pair(_) => "Pair",
            Self::List(_) => "List",
            Self::Set(_) => "Set",
            Self::Map(_) => "Map",
            Self::Object(o) => o.kind.type_name(),
            Self::Class(_) => "Class",
            Self::TypeAlias(_) => "TypeAlias",
            Self::Function(_) => "Function",
        }
    }

    /// The value as a number, when it is one.
    #[must_use]
    pub fn as_number(&self) -> Option<Number> {
        match self {
            Self::Int(i) => Some(Number::Int(*i)),
            Self::Float(f) => Some(Number::Float(*f)),
            _ => None,
        }
    }

    /// Whether the value is null.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The object behind the value, when it is one.
    #[must_use]
    pub fn as_object(&self) -> Option<&Rc<VmObject>> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            // numeric promotion: 1 == 1.0
            (Self::Int(a), Self::Float(b)) | (Self::Float(b), Self::Int(a)) => (*a as f64) == *b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Duration(a), Self::Duration(b)) => a.seconds() == b.seconds(),
            (Self::DataSize(a), Self::DataSize(b)) => a.bytes() == b.bytes(),
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            (Self::Regex(a), Self::Regex(b)) => a.source == b.source,
            (Self::Pair(a), Self::Pair(b)) => a.first == b.first && a.second == b.second,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Set(a), Self::Set(b)) => a.items == b.items,
            (Self::Map(a), Self::Map(b)) => a.entries == b.entries,
            (Self::Object(a), Self::Object(b)) => object_eq(a, b),
            (Self::Class(a), Self::Class(b)) => Rc::ptr_eq(a, b),
            (Self::TypeAlias(a), Self::TypeAlias(b)) => Rc::ptr_eq(a, b),
            (Self::Function(a), Self::Function(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

// NaN breaks reflexivity, as in every interpreter that keys tables by
// user values; NaN-keyed entries are unfindable, nothing worse.
impl Eq for Value {}

/// Hashes a float consistently with Int/Float promoted equality.
fn hash_f64<H: Hasher>(value: f64, state: &mut H) {
    if value.fract() == 0.0 && value >= i64::MIN as f64 && value <= i64::MAX as f64 {
        (value as i64).hash(state);
    } else {
        value.to_bits().hash(state);
    }
}

/// Hash of a single value through a fresh hasher, for commutative
/// combination in sets and maps.
fn solo_hash(value: &Value) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Self::Null => state.write_u8(0),
            Self::Bool(b) => {
                state.write_u8(1);
                b.hash(state);
            }
            Self::Int(i) => {
                state.write_u8(2);
                i.hash(state);
            }
            Self::Float(f) => {
                state.write_u8(2);
                hash_f64(*f, state);
            }
            Self::Str(s) => {
                state.write_u8(3);
                s.hash(state);
            }
            Self::Duration(d) => {
                state.write_u8(4);
                hash_f64(d.seconds(), state);
            }
            Self::DataSize(d) => {
                state.write_u8(5);
                hash_f64(d.bytes(), state);
            }
            Self::Bytes(b) => {
                state.write_u8(6);
                b.hash(state);
            }
            Self::Regex(r) => {
                state.write_u8(7);
                r.source.hash(state);
            }
            Self::Pair(p) => {
                state.write_u8(8);
                p.first.hash(state);
                p.second.hash(state);
            }
            Self::List(xs) => {
                state.write_u8(9);
                for x in xs.iter() {
                    x.hash(state);
                }
            }
            Self::Set(s) => {
                state.write_u8(10);
                let mut acc: u64 = 0;
                for item in &s.items {
                    acc ^= solo_hash(item);
                }
                state.write_u64(acc);
            }
            Self::Map(m) => {
                state.write_u8(11);
                let mut acc: u64 = 0;
                for (k, v) in &m.entries {
                    acc ^= solo_hash(k).wrapping_mul(3).wrapping_add(solo_hash(v));
                }
                state.write_u64(acc);
            }
            Self::Object(o) => {
                state.write_u8(12);
                // cheap shape hash; structural equality does the real work
                o.class.qualified_name.hash(state);
                state.write_usize(o.own_member_count());
            }
            Self::Class(c) => {
                state.write_u8(13);
                state.write_usize(Rc::as_ptr(c) as usize);
            }
            Self::TypeAlias(a) => {
                state.write_u8(14);
                state.write_usize(Rc::as_ptr(a) as usize);
            }
            Self::Function(f) => {
                state.write_u8(15);
                state.write_usize(Rc::as_ptr(f).cast::<u8>() as usize);
            }
        }
    }
}

/// Formats a float the way the language writes them: shortest round-trip
/// form via ryu, with `NaN`/`Infinity` spelled as identifiers.
#[must_use]
pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_owned()
    } else if value.is_infinite() {
        if value > 0.0 { "Infinity".to_owned() } else { "-Infinity".to_owned() }
    } else {
        ryu::Buffer::new().format(value).to_owned()
    }
}

/// Partial ordering between two values for the comparison operators.
///
/// Numbers compare across `Int`/`Float`; strings compare lexicographically
/// by code point; durations and data sizes compare on their canonical
/// scale. Everything else (including NaN operands) returns `None` and the
/// caller reports the error.
#[must_use]
pub fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
        (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
        (Value::Str(a), Value::Str(b)) => Some(a.as_ref().cmp(b.as_ref())),
        (Value::Duration(a), Value::Duration(b)) => a.seconds().partial_cmp(&b.seconds()),
        (Value::DataSize(a), Value::DataSize(b)) => a.bytes().partial_cmp(&b.bytes()),
        _ => None,
    }
}

impl fmt::Display for Value {
    /// Display form for traces and error messages. Objects and functions
    /// show a placeholder; rendering proper goes through `ValueView`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => f.write_str(&format_float(*x)),
            Self::Str(s) => f.write_str(s),
            Self::Duration(d) => write!(f, "{d}"),
            Self::DataSize(d) => write!(f, "{d}"),
            Self::Bytes(b) => write!(f, "Bytes({})", b.len()),
            Self::Regex(r) => write!(f, "Regex({:?})", &*r.source),
            Self::Pair(p) => write!(f, "Pair({}, {})", p.first, p.second),
            Self::List(xs) => {
                f.write_str("List(")?;
                for (i, x) in xs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{x}")?;
                }
                f.write_str(")")
            }
            Self::Set(s) => {
                f.write_str("Set(")?;
                for (i, x) in s.items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{x}")?;
                }
                f.write_str(")")
            }
            Self::Map(m) => {
                f.write_str("Map(")?;
                for (i, (k, v)) in m.entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}, {v}")?;
                }
                f.write_str(")")
            }
            Self::Object(o) => write!(f, "new {} {{...}}", o.class.qualified_name),
            Self::Class(c) => write!(f, "Class({})", c.qualified_name),
            Self::TypeAlias(a) => write!(f, "TypeAlias({})", a.qualified_name),
            Self::Function(_) => f.write_str("Function"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_promotion_in_equality() {
        assert_eq!(Value::Int(1), Value::Float(1.0));
        assert_ne!(Value::Int(1), Value::Float(1.5));
    }

    #[test]
    fn nan_is_not_equal_to_itself() {
        assert_ne!(Value::Float(f64::NAN), Value::Float(f64::NAN));
    }

    #[test]
    fn promoted_numbers_hash_alike() {
        assert_eq!(solo_hash(&Value::Int(7)), solo_hash(&Value::Float(7.0)));
    }

    #[test]
    fn set_equality_ignores_order() {
        let a = Value::Set(Rc::new(VmSet::from_iter([Value::Int(1), Value::Int(2)])));
        let b = Value::Set(Rc::new(VmSet::from_iter([Value::Int(2), Value::Int(1)])));
        assert_eq!(a, b);
        assert_eq!(solo_hash(&a), solo_hash(&b));
    }

    #[test]
    fn list_equality_is_order_sensitive() {
        let a = Value::List(Rc::new(vec![Value::Int(1), Value::Int(2)]));
        let b = Value::List(Rc::new(vec![Value::Int(2), Value::Int(1)]));
        assert_ne!(a, b);
    }

    #[test]
    fn durations_compare_on_canonical_scale() {
        let a = Value::Duration(Duration::new(Number::Int(60), DurationUnit::Seconds));
        let b = Value::Duration(Duration::new(Number::Int(1), DurationUnit::Minutes));
        assert_eq!(a, b);
        assert_eq!(compare_values(&a, &b), Some(Ordering::Equal));
    }

    #[test]
    fn nan_comparison_is_undefined() {
        assert_eq!(compare_values(&Value::Float(f64::NAN), &Value::Float(1.0)), None);
    }

    #[test]
    fn float_formatting() {
        assert_eq!(format_float(1.0), "1.0");
        assert_eq!(format_float(f64::NAN), "NaN");
        assert_eq!(format_float(f64::NEG_INFINITY), "-Infinity");
    }
}
