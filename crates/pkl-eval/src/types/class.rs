//! Classes and type aliases.
//!
//! Class instances are identity-cached singletons. To break nominal
//! cycles (a class whose members mention the class itself), the instance
//! is published into its module's registry *before* its supertype and
//! members are resolved; re-entrant references resolve to the partial
//! instance, and whole-hierarchy checks run post-initialization.

use std::{cell::RefCell, rc::Rc};

use indexmap::IndexMap;

use crate::{
    ast::{ClassPropertyDecl, MethodDecl, Span, TypeAliasDecl},
    frame::Frame,
    intern::Identifier,
    member::Modifiers,
    object::ObjKind,
    types::VmType,
    value::{Value, ValueHashState},
};

/// A property declared by a class.
#[derive(Debug)]
pub struct ClassProperty {
    pub name: Identifier,
    pub modifiers: Modifiers,
    /// Resolved declared type; filled during class population.
    pub ty: RefCell<Option<Rc<VmType>>>,
    /// The source declaration (carries the default value, if any).
    pub decl: Option<Rc<ClassPropertyDecl>>,
    pub span: Span,
}

impl ClassProperty {
    /// A synthesized property with no source declaration (prelude classes).
    #[must_use]
    pub fn synthetic(name: Identifier, modifiers: Modifiers) -> Rc<Self> {
        Rc::new(Self {
            name,
            modifiers,
            ty: RefCell::new(None),
            decl: None,
            span: Span::none(),
        })
    }
}

/// A runtime class.
#[derive(Debug)]
pub struct VmClass {
    /// Qualified display name, `module#Class`.
    pub qualified_name: Rc<str>,
    pub simple_name: Identifier,
    pub type_params: Vec<Identifier>,
    pub modifiers: Modifiers,
    /// What instances of this class are (Typed for user classes; the
    /// prelude's Listing/Mapping/Dynamic say otherwise).
    pub instance_kind: ObjKind,
    superclass: RefCell<Option<Rc<VmClass>>>,
    properties: RefCell<IndexMap<Identifier, Rc<ClassProperty>, ValueHashState>>,
    methods: RefCell<IndexMap<Identifier, Rc<MethodDecl>, ValueHashState>>,
    /// Lazily built prototype object for `new`.
    prototype: RefCell<Option<Value>>,
    /// The defining module's root frame; prototype members and defaults
    /// evaluate under it.
    module_frame: RefCell<Option<Rc<Frame>>>,
}

impl VmClass {
    /// Creates an empty class shell; supertype and members are populated
    /// afterwards (publish-then-populate).
    #[must_use]
    pub fn new(
        qualified_name: impl Into<Rc<str>>,
        simple_name: Identifier,
        modifiers: Modifiers,
        instance_kind: ObjKind,
    ) -> Rc<Self> {
        Rc::new(Self {
            qualified_name: qualified_name.into(),
            simple_name,
            type_params: Vec::new(),
            modifiers,
            instance_kind,
            superclass: RefCell::new(None),
            properties: RefCell::new(IndexMap::default()),
            methods: RefCell::new(IndexMap::default()),
            prototype: RefCell::new(None),
            module_frame: RefCell::new(None),
        })
    }

    /// Same as [`Self::new`] with type parameters.
    #[must_use]
    pub fn with_type_params(
        qualified_name: impl Into<Rc<str>>,
        simple_name: Identifier,
        modifiers: Modifiers,
        instance_kind: ObjKind,
        type_params: Vec<Identifier>,
    ) -> Rc<Self> {
        let class = Self::new(qualified_name, simple_name, modifiers, instance_kind);
        // the shell is not shared yet, so this unwrap cannot race anything
        let mut class = Rc::into_inner(class).expect("fresh class shell is unshared");
        class.type_params = type_params;
        Rc::new(class)
    }

    /// The superclass, if populated.
    #[must_use]
    pub fn superclass(&self) -> Option<Rc<Self>> {
        self.superclass.borrow().clone()
    }

    /// Sets the superclass during population.
    pub fn set_superclass(&self, superclass: Rc<Self>) {
        *self.superclass.borrow_mut() = Some(superclass);
    }

    /// The defining module's root frame.
    #[must_use]
    pub fn module_frame(&self) -> Option<Rc<Frame>> {
        self.module_frame.borrow().clone()
    }

    /// Sets the defining module frame during population.
    pub fn set_module_frame(&self, frame: Rc<Frame>) {
        *self.module_frame.borrow_mut() = Some(frame);
    }

    /// Adds an own property during population.
    pub fn add_property(&self, property: Rc<ClassProperty>) {
        self.properties.borrow_mut().insert(property.name, property);
    }

    /// Adds an own method during population.
    pub fn add_method(&self, method: Rc<MethodDecl>) {
        self.methods.borrow_mut().insert(method.name, method);
    }

    /// An own property by name.
    #[must_use]
    pub fn own_property(&self, name: Identifier) -> Option<Rc<ClassProperty>> {
        self.properties.borrow().get(&name).cloned()
    }

    /// Own property names in declaration order.
    #[must_use]
    pub fn own_property_names(&self) -> Vec<Identifier> {
        self.properties.borrow().keys().copied().collect()
    }

    /// A property by name, searching the superclass chain.
    #[must_use]
    pub fn lookup_property(&self, name: Identifier) -> Option<Rc<ClassProperty>> {
        if let Some(p) = self.own_property(name) {
            return Some(p);
        }
        self.superclass().and_then(|s| s.lookup_property(name))
    }

    /// A method by name, searching the superclass chain.
    #[must_use]
    pub fn lookup_method(&self, name: Identifier) -> Option<Rc<MethodDecl>> {
        if let Some(m) = self.methods.borrow().get(&name) {
            return Some(Rc::clone(m));
        }
        self.superclass().and_then(|s| s.lookup_method(name))
    }

    /// All property names in the hierarchy, supertype first, without
    /// duplicates; this is the declared key set of Typed instances.
    #[must_use]
    pub fn all_property_names(&self) -> Vec<Identifier> {
        let mut names = self.superclass().map(|s| s.all_property_names()).unwrap_or_default();
        for name in self.properties.borrow().keys() {
            if !names.contains(name) {
                names.push(*name);
            }
        }
        names
    }

    /// Whether `self` is `other` or inherits from it.
    #[must_use]
    pub fn is_subclass_of(self: &Rc<Self>, other: &Rc<Self>) -> bool {
        let mut cur = Rc::clone(self);
        loop {
            if Rc::ptr_eq(&cur, other) {
                return true;
            }
            match cur.superclass() {
                Some(superclass) => cur = superclass,
                None => return false,
            }
        }
    }

    /// The cached prototype object, if built.
    #[must_use]
    pub fn prototype(&self) -> Option<Value> {
        self.prototype.borrow().clone()
    }

    /// Caches the prototype object.
    pub fn set_prototype(&self, prototype: Value) {
        *self.prototype.borrow_mut() = Some(prototype);
    }

    /// Whether the class may be extended.
    #[must_use]
    pub fn is_extensible(&self) -> bool {
        self.modifiers.contains(Modifiers::OPEN) || self.modifiers.contains(Modifiers::ABSTRACT)
    }
}

/// A runtime type alias.
#[derive(Debug)]
pub struct VmTypeAlias {
    /// Qualified display name, `module#Alias`.
    pub qualified_name: Rc<str>,
    pub simple_name: Identifier,
    pub type_params: Vec<Identifier>,
    /// Resolved aliased type; filled during population.
    body: RefCell<Option<Rc<VmType>>>,
    /// The source declaration.
    pub decl: Option<Rc<TypeAliasDecl>>,
}

impl VmTypeAlias {
    /// Creates an alias shell; the body is resolved afterwards.
    #[must_use]
    pub fn new(
        qualified_name: impl Into<Rc<str>>,
        simple_name: Identifier,
        type_params: Vec<Identifier>,
        decl: Option<Rc<TypeAliasDecl>>,
    ) -> Rc<Self> {
        Rc::new(Self {
            qualified_name: qualified_name.into(),
            simple_name,
            type_params,
            body: RefCell::new(None),
            decl,
        })
    }

    /// The resolved aliased type, if populated.
    #[must_use]
    pub fn body(&self) -> Option<Rc<VmType>> {
        self.body.borrow().clone()
    }

    /// Sets the resolved body.
    pub fn set_body(&self, body: Rc<VmType>) {
        *self.body.borrow_mut() = Some(body);
    }
}
