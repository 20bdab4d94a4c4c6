//! The standard library loader.
//!
//! The prelude is built programmatically at evaluator initialization:
//! the base module (builtin classes, constructor functions, `NaN` and
//! `Infinity`) plus the `pkl:` modules, cached under their URIs. The base
//! module's members form the implicit outer scope of every user module.

mod functions;
mod methods;

use std::rc::Rc;

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::{
    frame::Frame,
    intern::{Identifier, Interner},
    member::{Member, MemberKey, Modifiers},
    module::ModuleScope,
    object::{ObjKind, VmObject},
    types::{VmClass, VmTypeAlias},
    value::{FunctionBody, Value, ValueHashState, VmFunction},
};

pub use self::functions::BuiltinFunction;
pub use self::methods::BuiltinMethod;
pub(crate) use self::methods::{has_builtin_member, read_builtin_member};

/// Handles to the builtin classes.
#[derive(Debug)]
struct BaseClasses {
    any: Rc<VmClass>,
    null: Rc<VmClass>,
    boolean: Rc<VmClass>,
    number: Rc<VmClass>,
    int: Rc<VmClass>,
    float: Rc<VmClass>,
    string: Rc<VmClass>,
    duration: Rc<VmClass>,
    data_size: Rc<VmClass>,
    bytes: Rc<VmClass>,
    regex: Rc<VmClass>,
    pair: Rc<VmClass>,
    list: Rc<VmClass>,
    set: Rc<VmClass>,
    map: Rc<VmClass>,
    typed: Rc<VmClass>,
    dynamic: Rc<VmClass>,
    listing: Rc<VmClass>,
    mapping: Rc<VmClass>,
    function: Rc<VmClass>,
    class: Rc<VmClass>,
    type_alias: Rc<VmClass>,
    module: Rc<VmClass>,
}

/// The loaded prelude: base module, builtin classes, `pkl:` modules.
#[derive(Debug)]
pub(crate) struct StdLib {
    base_scope: Rc<ModuleScope>,
    base_frame: Rc<Frame>,
    base_module: Rc<VmObject>,
    classes: BaseClasses,
    modules: AHashMap<Rc<str>, Value>,
}

impl StdLib {
    /// Builds the prelude. Pure construction: nothing here evaluates.
    pub fn bootstrap(interner: &mut Interner) -> Self {
        let base_scope = ModuleScope::new("pkl:base", "pkl.base", true);
        let base_frame = Frame::module_root(Rc::clone(&base_scope));

        let mk = |interner: &mut Interner, name: &str, modifiers: Modifiers, kind: ObjKind| {
            let id = interner.intern(name);
            let class = VmClass::new(format!("pkl.base#{name}"), id, modifiers, kind);
            class.set_module_frame(Rc::clone(&base_frame));
            base_scope.define_class(Rc::clone(&class));
            class
        };
        let open_abstract = Modifiers::OPEN | Modifiers::ABSTRACT;
        let ext = Modifiers::EXTERNAL;

        let any = mk(interner, "Any", open_abstract | ext, ObjKind::Typed);
        let null = mk(interner, "Null", ext, ObjKind::Typed);
        let boolean = mk(interner, "Boolean", ext, ObjKind::Typed);
        let number = mk(interner, "Number", Modifiers::ABSTRACT | ext, ObjKind::Typed);
        let int = mk(interner, "Int", ext, ObjKind::Typed);
        let float = mk(interner, "Float", ext, ObjKind::Typed);
        let string = mk(interner, "String", ext, ObjKind::Typed);
        let duration = mk(interner, "Duration", ext, ObjKind::Typed);
        let data_size = mk(interner, "DataSize", ext, ObjKind::Typed);
        let bytes = mk(interner, "Bytes", ext, ObjKind::Typed);
        let regex = mk(interner, "Regex", ext, ObjKind::Typed);
        let pair = mk(interner, "Pair", ext, ObjKind::Typed);
        let list = mk(interner, "List", ext, ObjKind::Typed);
        let set = mk(interner, "Set", ext, ObjKind::Typed);
        let map = mk(interner, "Map", ext, ObjKind::Typed);
        let object = mk(interner, "Object", Modifiers::ABSTRACT | ext, ObjKind::Typed);
        let typed = mk(interner, "Typed", open_abstract | ext, ObjKind::Typed);
        let dynamic = mk(interner, "Dynamic", ext, ObjKind::Dynamic);
        let listing = mk(interner, "Listing", ext, ObjKind::Listing);
        let mapping = mk(interner, "Mapping", ext, ObjKind::Mapping);
        let function = mk(interner, "Function", ext, ObjKind::Typed);
        let class = mk(interner, "Class", ext, ObjKind::Typed);
        let type_alias = mk(interner, "TypeAlias", ext, ObjKind::Typed);
        let module = mk(interner, "Module", Modifiers::OPEN | ext, ObjKind::Typed);

        for c in [
            &null, &boolean, &number, &string, &duration, &data_size, &bytes, &regex, &pair, &list, &set, &map,
            &object, &function, &class, &type_alias,
        ] {
            c.set_superclass(Rc::clone(&any));
        }
        int.set_superclass(Rc::clone(&number));
        float.set_superclass(Rc::clone(&number));
        typed.set_superclass(Rc::clone(&object));
        dynamic.set_superclass(Rc::clone(&object));
        listing.set_superclass(Rc::clone(&object));
        mapping.set_superclass(Rc::clone(&object));
        module.set_superclass(Rc::clone(&typed));

        let classes = BaseClasses {
            any,
            null,
            boolean,
            number,
            int,
            float,
            string,
            duration,
            data_size,
            bytes,
            regex,
            pair,
            list,
            set,
            map,
            typed,
            dynamic,
            listing,
            mapping,
            function,
            class,
            type_alias,
            module,
        };

        // the base module's member table: class values, constants, and
        // constructor functions
        let mut members: IndexMap<MemberKey, Rc<Member>, ValueHashState> = IndexMap::default();
        let constant = Modifiers::CONST | Modifiers::EXTERNAL;
        let mut add = |key: Identifier, value: Value| {
            members.insert(MemberKey::Prop(key), Member::constant(MemberKey::Prop(key), constant, value));
        };
        for c in [
            &classes.any,
            &classes.null,
            &classes.boolean,
            &classes.number,
            &classes.int,
            &classes.float,
            &classes.string,
            &classes.duration,
            &classes.data_size,
            &classes.bytes,
            &classes.regex,
            &classes.pair,
            &classes.list,
            &classes.set,
            &classes.map,
            &classes.typed,
            &classes.dynamic,
            &classes.listing,
            &classes.mapping,
            &classes.function,
            &classes.class,
            &classes.type_alias,
            &classes.module,
        ] {
            add(c.simple_name, Value::Class(Rc::clone(c)));
        }
        add(object.simple_name, Value::Class(Rc::clone(&object)));
        add(interner.intern("NaN"), Value::Float(f64::NAN));
        add(interner.intern("Infinity"), Value::Float(f64::INFINITY));
        for (name, builtin) in [
            ("List", BuiltinFunction::ListNew),
            ("Set", BuiltinFunction::SetNew),
            ("Map", BuiltinFunction::MapNew),
            ("Pair", BuiltinFunction::PairNew),
            ("Regex", BuiltinFunction::RegexNew),
            ("IntSeq", BuiltinFunction::IntSeqNew),
        ] {
            let id = interner.intern(name);
            add(id, builtin_function(builtin, id));
        }

        let base_class = VmClass::new("pkl.base", interner.intern("base"), Modifiers::OPEN, ObjKind::Typed);
        base_class.set_module_frame(Rc::clone(&base_frame));
        base_class.set_superclass(Rc::clone(&classes.module));
        let base_module = VmObject::new(
            ObjKind::Typed,
            base_class,
            None,
            None,
            Rc::clone(&base_frame),
            members,
            Vec::new(),
        );
        base_scope.set_module(&base_module);

        let mut modules: AHashMap<Rc<str>, Value> = AHashMap::new();
        modules.insert(Rc::from("pkl:base"), Value::Object(Rc::clone(&base_module)));
        modules.insert(Rc::from("pkl:math"), math_module(interner, &classes.module));
        modules.insert(Rc::from("pkl:test"), test_module(interner, &classes.module));
        for name in [
            "reflect", "semver", "shell", "xml", "yaml", "json", "jsonnet", "protobuf", "settings",
        ] {
            let uri: Rc<str> = Rc::from(format!("pkl:{name}"));
            modules.insert(Rc::clone(&uri), stub_module(interner, name, &classes.module));
        }

        Self {
            base_scope,
            base_frame,
            base_module,
            classes,
            modules,
        }
    }

    /// The base module object.
    pub fn base_object(&self) -> &Rc<VmObject> {
        &self.base_module
    }

    /// The base module as a value.
    pub fn base_value(&self) -> Value {
        Value::Object(Rc::clone(&self.base_module))
    }

    /// The base module's root frame.
    pub fn base_frame(&self) -> Rc<Frame> {
        Rc::clone(&self.base_frame)
    }

    /// A builtin class by simple name.
    pub fn base_class(&self, name: Identifier) -> Option<Rc<VmClass>> {
        self.base_scope.class(name)
    }

    /// A builtin type alias by simple name.
    pub fn base_alias(&self, name: Identifier) -> Option<Rc<VmTypeAlias>> {
        self.base_scope.alias(name)
    }

    /// A prelude module by `pkl:` URI.
    pub fn prelude_module(&self, uri: &str) -> Option<Value> {
        self.modules.get(uri).cloned()
    }

    pub fn dynamic_class(&self) -> Rc<VmClass> {
        Rc::clone(&self.classes.dynamic)
    }

    pub fn listing_class(&self) -> Rc<VmClass> {
        Rc::clone(&self.classes.listing)
    }

    pub fn mapping_class(&self) -> Rc<VmClass> {
        Rc::clone(&self.classes.mapping)
    }

    pub fn typed_class(&self) -> Rc<VmClass> {
        Rc::clone(&self.classes.typed)
    }

    /// The `Module` class, the default supertype of module classes.
    pub fn module_base_class(&self) -> Rc<VmClass> {
        Rc::clone(&self.classes.module)
    }

    /// The class of a value, for subtype checks.
    pub fn class_of(&self, value: &Value) -> Rc<VmClass> {
        let class = match value {
            Value::Null => &self.classes.null,
            Value::Bool(_) => &self.classes.boolean,
            Value::Int(_) => &self.classes.int,
            Value::Float(_) => &self.classes.float,
            Value::Str(_) => &self.classes.string,
            Value::Duration(_) => &self.classes.duration,
            Value::DataSize(_) => &self.classes.data_size,
            Value::Bytes(_) => &self.classes.bytes,
            Value::Regex(_) => &self.classes.regex,
            Value::Pair(_) => &self.classes.pair,
            Value::List(_) => &self.classes.list,
            Value::Set(_) => &self.classes.set,
            Value::Map(_) => &self.classes.map,
            Value::Object(o) => return Rc::clone(&o.class),
            Value::Class(_) => &self.classes.class,
            Value::TypeAlias(_) => &self.classes.type_alias,
            Value::Function(_) => &self.classes.function,
        };
        Rc::clone(class)
    }

    /// Builds a Mapping object from forced key/value pairs (globbed
    /// imports and reads).
    pub fn make_mapping(&self, entries: Vec<(Value, Value)>) -> Value {
        let mut members: IndexMap<MemberKey, Rc<Member>, ValueHashState> = IndexMap::default();
        for (key, value) in entries {
            let key = MemberKey::Entry(key);
            members.insert(key.clone(), Member::constant(key, Modifiers::default(), value));
        }
        Value::Object(VmObject::new(
            ObjKind::Mapping,
            Rc::clone(&self.classes.mapping),
            None,
            None,
            Rc::clone(&self.base_frame),
            members,
            Vec::new(),
        ))
    }

    /// Builds a Listing object from forced elements.
    pub fn make_listing(&self, items: Vec<Value>) -> Value {
        let mut members: IndexMap<MemberKey, Rc<Member>, ValueHashState> = IndexMap::default();
        for (i, value) in items.into_iter().enumerate() {
            let key = MemberKey::Index(i as i64);
            members.insert(key.clone(), Member::constant(key, Modifiers::default(), value));
        }
        Value::Object(VmObject::new(
            ObjKind::Listing,
            Rc::clone(&self.classes.listing),
            None,
            None,
            Rc::clone(&self.base_frame),
            members,
            Vec::new(),
        ))
    }
}

/// Wraps a builtin in a function value.
fn builtin_function(builtin: BuiltinFunction, name: Identifier) -> Value {
    Value::Function(Rc::new(VmFunction {
        params: Vec::new(),
        param_tys: Vec::new(),
        this: Value::Null,
        owner: Value::Null,
        frame: None,
        return_ty: None,
        name: Some(name),
        body: FunctionBody::Builtin(builtin),
    }))
}

/// A prelude module object holding only constant and builtin members.
fn prelude_object(
    interner: &mut Interner,
    name: &str,
    module_class: &Rc<VmClass>,
    members: Vec<(Identifier, Modifiers, Value)>,
) -> Value {
    let scope = ModuleScope::new(format!("pkl:{name}"), name, true);
    let frame = Frame::module_root(Rc::clone(&scope));
    let class = VmClass::new(name, interner.intern(name), Modifiers::default(), ObjKind::Typed);
    class.set_module_frame(Rc::clone(&frame));
    class.set_superclass(Rc::clone(module_class));
    let mut table: IndexMap<MemberKey, Rc<Member>, ValueHashState> = IndexMap::default();
    for (id, modifiers, value) in members {
        let key = MemberKey::Prop(id);
        table.insert(key.clone(), Member::constant(key, modifiers, value));
    }
    let object = VmObject::new(ObjKind::Typed, class, None, None, frame, table, Vec::new());
    scope.set_module(&object);
    Value::Object(object)
}

/// The `pkl:math` module: constants and numeric functions.
fn math_module(interner: &mut Interner, module_class: &Rc<VmClass>) -> Value {
    let constant = Modifiers::CONST | Modifiers::EXTERNAL;
    let mut members: Vec<(Identifier, Modifiers, Value)> = vec![
        (interner.intern("pi"), constant, Value::Float(std::f64::consts::PI)),
        (interner.intern("e"), constant, Value::Float(std::f64::consts::E)),
        (interner.intern("maxInt"), constant, Value::Int(i64::MAX)),
        (interner.intern("minInt"), constant, Value::Int(i64::MIN)),
        (interner.intern("maxFiniteFloat"), constant, Value::Float(f64::MAX)),
        (interner.intern("minPositiveFloat"), constant, Value::Float(f64::MIN_POSITIVE)),
    ];
    for (name, builtin) in [
        ("abs", BuiltinFunction::MathAbs),
        ("ceil", BuiltinFunction::MathCeil),
        ("floor", BuiltinFunction::MathFloor),
        ("round", BuiltinFunction::MathRound),
        ("sqrt", BuiltinFunction::MathSqrt),
        ("cbrt", BuiltinFunction::MathCbrt),
        ("exp", BuiltinFunction::MathExp),
        ("log", BuiltinFunction::MathLog),
        ("log2", BuiltinFunction::MathLog2),
        ("log10", BuiltinFunction::MathLog10),
        ("sin", BuiltinFunction::MathSin),
        ("cos", BuiltinFunction::MathCos),
        ("tan", BuiltinFunction::MathTan),
        ("asin", BuiltinFunction::MathAsin),
        ("acos", BuiltinFunction::MathAcos),
        ("atan", BuiltinFunction::MathAtan),
        ("atan2", BuiltinFunction::MathAtan2),
        ("pow", BuiltinFunction::MathPow),
        ("min", BuiltinFunction::MathMin),
        ("max", BuiltinFunction::MathMax),
        ("isPowerOfTwo", BuiltinFunction::MathIsPowerOfTwo),
        ("sign", BuiltinFunction::MathSign),
        ("gcd", BuiltinFunction::MathGcd),
    ] {
        let id = interner.intern(name);
        members.push((id, constant, builtin_function(builtin, id)));
    }
    prelude_object(interner, "math", module_class, members)
}

/// The `pkl:test` module: the error-catching harness hook.
fn test_module(interner: &mut Interner, module_class: &Rc<VmClass>) -> Value {
    let id = interner.intern("catch");
    let members = vec![(id, Modifiers::CONST | Modifiers::EXTERNAL, builtin_function(BuiltinFunction::TestCatch, id))];
    prelude_object(interner, "test", module_class, members)
}

/// A named, empty prelude module; its feature surface lives outside this
/// crate.
fn stub_module(interner: &mut Interner, name: &str, module_class: &Rc<VmClass>) -> Value {
    prelude_object(interner, name, module_class, Vec::new())
}
