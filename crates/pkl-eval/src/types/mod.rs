//! The type system: resolved type representation and checking.

mod check;
mod class;

use std::{fmt::Write as _, rc::Rc};

use ahash::AHashMap;

pub(crate) use self::check::{check_value, expand_alias, instantiable_class, resolve_type, test_value};
pub use self::class::{ClassProperty, VmClass, VmTypeAlias};
use crate::{ast::ExprLoc, frame::Frame, intern::Identifier};

/// A resolved type.
///
/// Produced from `ast::TypeRef` once per declaration site; class and
/// alias references are direct handles, so checking never re-resolves
/// names. `Parenthesized` source types are unwrapped here.
#[derive(Debug)]
pub enum VmType {
    /// Accepts every value.
    Unknown,
    /// Accepts no value.
    Nothing,
    /// Accepts the enclosing module instance.
    Module,
    /// Accepts exactly one string.
    StringConstant(Rc<str>),
    /// A class with (possibly empty) type arguments.
    Class { class: Rc<VmClass>, args: Vec<Rc<VmType>> },
    /// An alias application; checking substitutes `args` into the body.
    Alias {
        alias: Rc<VmTypeAlias>,
        args: Vec<Rc<VmType>>,
    },
    /// An unsubstituted type parameter (inside class/alias bodies).
    Parameter(Identifier),
    /// `T?`
    Nullable(Rc<VmType>),
    /// `A|B`
    Union(Rc<VmType>, Rc<VmType>),
    /// `*T`: the branch contextual `new` instantiates.
    DefaultUnion(Rc<VmType>),
    /// Refinement constraints over a base type. Predicates evaluate with
    /// custom-`this` bound to the candidate, under the declaring frame.
    Constrained {
        base: Rc<VmType>,
        predicates: Vec<Rc<ExprLoc>>,
        env: Rc<Frame>,
    },
    /// A function type; only arity is checked at assignment, argument and
    /// return types are deferred to call sites.
    Function {
        params: Vec<Rc<VmType>>,
        ret: Rc<VmType>,
    },
}

impl VmType {
    /// Substitutes type parameters, returning `self` unchanged when no
    /// parameter occurs (the common case shares the allocation).
    #[must_use]
    pub fn substitute(self: &Rc<Self>, env: &AHashMap<Identifier, Rc<Self>>) -> Rc<Self> {
        if env.is_empty() {
            return Rc::clone(self);
        }
        match &**self {
            Self::Parameter(name) => env.get(name).cloned().unwrap_or_else(|| Rc::clone(self)),
            Self::Nullable(inner) => Rc::new(Self::Nullable(inner.substitute(env))),
            Self::Union(left, right) => Rc::new(Self::Union(left.substitute(env), right.substitute(env))),
            Self::DefaultUnion(inner) => Rc::new(Self::DefaultUnion(inner.substitute(env))),
            Self::Constrained {
                base,
                predicates,
                env: frame,
            } => Rc::new(Self::Constrained {
                base: base.substitute(env),
                predicates: predicates.clone(),
                env: Rc::clone(frame),
            }),
            Self::Class { class, args } => Rc::new(Self::Class {
                class: Rc::clone(class),
                args: args.iter().map(|a| a.substitute(env)).collect(),
            }),
            Self::Alias { alias, args } => Rc::new(Self::Alias {
                alias: Rc::clone(alias),
                args: args.iter().map(|a| a.substitute(env)).collect(),
            }),
            Self::Function { params, ret } => Rc::new(Self::Function {
                params: params.iter().map(|p| p.substitute(env)).collect(),
                ret: ret.substitute(env),
            }),
            Self::Unknown | Self::Nothing | Self::Module | Self::StringConstant(_) => Rc::clone(self),
        }
    }

    /// Display form for error messages.
    #[must_use]
    pub fn display_name(&self) -> String {
        match self {
            Self::Unknown => "unknown".to_owned(),
            Self::Nothing => "nothing".to_owned(),
            Self::Module => "module".to_owned(),
            Self::StringConstant(s) => format!("{s:?}"),
            Self::Class { class, args } => {
                let mut out = class.qualified_name.to_string();
                write_args(&mut out, args);
                out
            }
            Self::Alias { alias, args } => {
                let mut out = alias.qualified_name.to_string();
                write_args(&mut out, args);
                out
            }
            Self::Parameter(_) => "<type parameter>".to_owned(),
            Self::Nullable(inner) => format!("{}?", inner.display_name()),
            Self::Union(left, right) => format!("{}|{}", left.display_name(), right.display_name()),
            Self::DefaultUnion(inner) => format!("*{}", inner.display_name()),
            Self::Constrained { base, .. } => format!("{}(...)", base.display_name()),
            Self::Function { params, ret } => {
                let mut out = String::from("(");
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(&p.display_name());
                }
                let _ = write!(out, ") -> {}", ret.display_name());
                out
            }
        }
    }
}

fn write_args(out: &mut String, args: &[Rc<VmType>]) {
    if args.is_empty() {
        return;
    }
    out.push('<');
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(&arg.display_name());
    }
    out.push('>');
}
