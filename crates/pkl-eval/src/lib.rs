#![doc = include_str!("../../../README.md")]

pub mod ast;
mod construct;
pub mod error;
mod eval;
pub mod frame;
pub mod intern;
pub mod io;
pub mod loader;
pub mod member;
pub mod module;
pub mod object;
pub mod render;
mod resolve;
pub mod resource;
pub mod stdlib;
pub mod types;
pub mod value;

pub use crate::{
    error::{Error, ErrorKind, EvalResult, StackFrame},
    eval::Evaluator,
    intern::{Identifier, Interner, WellKnown},
    io::{CollectStringTrace, NoTrace, StdTrace, TraceWriter},
    loader::{
        InMemoryModuleLoader, InMemoryResourceReader, IoFailure, ModuleLoader, NoModuleLoader, NoResourceReader,
        Resource, ResourceReader,
    },
    member::{MemberKey, Modifiers},
    module::ModuleScope,
    object::{ObjKind, VmObject},
    render::{PcfRenderer, Renderer, ValueView},
    resource::{DEFAULT_MAX_RECURSION_DEPTH, LimitedTracker, NoLimitTracker, ResourceError, ResourceTracker},
    types::{VmClass, VmType, VmTypeAlias},
    value::{DataSize, DataSizeUnit, Duration, DurationUnit, Number, Value},
};
