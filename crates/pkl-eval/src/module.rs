//! The module driver.
//!
//! Receives a parsed module, publishes class and type-alias shells,
//! populates them (the publish-then-populate cycle break), wires imports
//! and the `extends`/`amends` parent, installs module-level properties
//! and methods as lazy members, and returns the module value. Reading
//! `output.value` or `output.text` forces the configuration.

use std::{
    cell::RefCell,
    rc::{Rc, Weak},
};

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::{
    ast::{ClassDecl, ClassMemberDecl, ModuleClause, ModuleCst, ModuleEntry, Span},
    error::{ErrorKind, EvalResult},
    eval::Evaluator,
    frame::{ConstMode, Frame},
    intern::{Identifier, WellKnown},
    io::TraceWriter,
    member::{Member, MemberBody, MemberKey, Modifiers, SyntheticMember},
    object::{ObjKind, VmObject},
    resource::ResourceTracker,
    types::{self, ClassProperty, VmClass, VmTypeAlias},
    value::{Value, ValueHashState},
};

/// Per-module name tables: classes, type aliases, and imports, plus the
/// module's identity. Reached from every frame of the module's code.
#[derive(Debug)]
pub struct ModuleScope {
    /// Canonical module URI.
    pub uri: Rc<str>,
    /// Declared (or URI-derived) module name.
    pub name: Rc<str>,
    /// Whether this is the base prelude module; its code skips the
    /// base-module fallback during name resolution.
    pub is_base: bool,
    module: RefCell<Weak<VmObject>>,
    classes: RefCell<AHashMap<Identifier, Rc<VmClass>>>,
    aliases: RefCell<AHashMap<Identifier, Rc<VmTypeAlias>>>,
    imports: RefCell<AHashMap<Identifier, Value>>,
}

impl ModuleScope {
    /// Creates an empty scope.
    #[must_use]
    pub fn new(uri: impl Into<Rc<str>>, name: impl Into<Rc<str>>, is_base: bool) -> Rc<Self> {
        Rc::new(Self {
            uri: uri.into(),
            name: name.into(),
            is_base,
            module: RefCell::new(Weak::new()),
            classes: RefCell::new(AHashMap::new()),
            aliases: RefCell::new(AHashMap::new()),
            imports: RefCell::new(AHashMap::new()),
        })
    }

    /// Attaches the module object once it exists.
    pub fn set_module(&self, module: &Rc<VmObject>) {
        *self.module.borrow_mut() = Rc::downgrade(module);
    }

    /// The module object, if already created.
    #[must_use]
    pub fn module_value(&self) -> Option<Value> {
        self.module.borrow().upgrade().map(Value::Object)
    }

    /// Publishes a class shell.
    pub fn define_class(&self, class: Rc<VmClass>) {
        self.classes.borrow_mut().insert(class.simple_name, class);
    }

    /// A class by simple name.
    #[must_use]
    pub fn class(&self, name: Identifier) -> Option<Rc<VmClass>> {
        self.classes.borrow().get(&name).cloned()
    }

    /// Publishes a type-alias shell.
    pub fn define_alias(&self, alias: Rc<VmTypeAlias>) {
        self.aliases.borrow_mut().insert(alias.simple_name, alias);
    }

    /// An alias by simple name.
    #[must_use]
    pub fn alias(&self, name: Identifier) -> Option<Rc<VmTypeAlias>> {
        self.aliases.borrow().get(&name).cloned()
    }

    /// Binds an import under its alias. Imported modules are implicitly
    /// `const`.
    pub fn define_import(&self, alias: Identifier, value: Value) {
        self.imports.borrow_mut().insert(alias, value);
    }

    /// An import binding by alias.
    #[must_use]
    pub fn import(&self, alias: Identifier) -> Option<Value> {
        self.imports.borrow().get(&alias).cloned()
    }
}

/// The last URI segment without its extension: the default import alias
/// and module name.
fn uri_stem(uri: &str) -> &str {
    let tail = uri.rsplit('/').next().unwrap_or(uri);
    let tail = tail.rsplit(':').next().unwrap_or(tail);
    tail.split('.').next().unwrap_or(tail)
}

impl<T: ResourceTracker, W: TraceWriter> Evaluator<'_, T, W> {
    /// Evaluates a parsed module into its module value.
    ///
    /// The module is cached under its URI: evaluating it again (or
    /// importing it) returns the identical value.
    pub fn evaluate_module(&mut self, cst: &Rc<ModuleCst>) -> EvalResult<Value> {
        self.evaluate_module_cst(cst, Span::none())
    }

    pub(crate) fn evaluate_module_cst(&mut self, cst: &Rc<ModuleCst>, _span: Span) -> EvalResult<Value> {
        if let Some(cached) = self.modules.get(&*cst.uri) {
            return Ok(cached.clone());
        }
        let name: Rc<str> = match &cst.name {
            Some(name) => Rc::clone(name),
            None => Rc::from(uri_stem(&cst.uri)),
        };
        let scope = ModuleScope::new(Rc::clone(&cst.uri), Rc::clone(&name), false);
        let frame = Frame::module_root(Rc::clone(&scope));

        // the extends/amends target evaluates first and becomes the parent
        let parent_module = match &cst.clause {
            Some(ModuleClause::Extends { uri, span } | ModuleClause::Amends { uri, span }) => {
                let resolved = crate::loader::resolve_uri(&cst.uri, uri);
                Some(self.load_module(&resolved, *span)?)
            }
            None => None,
        };
        let amending = matches!(cst.clause, Some(ModuleClause::Amends { .. }));

        // imports are visible to type resolution, so they wire up before
        // classes are populated
        for import in &cst.imports {
            let alias = match import.alias {
                Some(alias) => alias,
                None => {
                    let stem = uri_stem(&import.uri).to_owned();
                    self.interner.intern(&stem)
                }
            };
            let resolved = crate::loader::resolve_uri(&cst.uri, &import.uri);
            let value = if import.glob {
                let uris = match self.loader.glob(&resolved) {
                    Ok(uris) => uris,
                    Err(failure) => {
                        return Err(self.err(ErrorKind::CannotFindModuleImport, failure.message, import.span));
                    }
                };
                let mut entries = Vec::with_capacity(uris.len());
                for uri in uris {
                    let module = self.load_module(&uri, import.span)?;
                    entries.push((Value::Str(uri), module));
                }
                self.stdlib.make_mapping(entries)
            } else {
                self.load_module(&resolved, import.span)?
            };
            scope.define_import(alias, value);
        }

        // publish class and alias shells, then populate; recursive
        // references resolve to the partial instances
        for entry in &cst.entries {
            match entry {
                ModuleEntry::Class(decl) => {
                    let class = VmClass::with_type_params(
                        format!("{name}#{}", self.interner.resolve(decl.name)),
                        decl.name,
                        decl.modifiers,
                        ObjKind::Typed,
                        decl.type_params.clone(),
                    );
                    class.set_module_frame(Rc::clone(&frame));
                    scope.define_class(class);
                }
                ModuleEntry::TypeAlias(decl) => {
                    let alias = VmTypeAlias::new(
                        format!("{name}#{}", self.interner.resolve(decl.name)),
                        decl.name,
                        decl.type_params.clone(),
                        Some(Rc::clone(decl)),
                    );
                    scope.define_alias(alias);
                }
                ModuleEntry::Property(_) | ModuleEntry::Method(_) => {}
            }
        }
        for entry in &cst.entries {
            match entry {
                ModuleEntry::Class(decl) => {
                    let class = scope.class(decl.name).expect("shell published above");
                    self.populate_class(&scope, &frame, &class, decl)?;
                }
                ModuleEntry::TypeAlias(decl) => {
                    let alias = scope.alias(decl.name).expect("shell published above");
                    // type-alias bodies are const scopes
                    let const_frame = Frame::child_const(&frame, ConstMode::All(0));
                    let body = types::resolve_type(self, &decl.ty, &scope, &const_frame, &decl.type_params)?;
                    alias.set_body(body);
                }
                ModuleEntry::Property(_) | ModuleEntry::Method(_) => {}
            }
        }
        // whole-hierarchy checks run after every class is populated
        for entry in &cst.entries {
            if let ModuleEntry::Class(decl) = entry {
                let class = scope.class(decl.name).expect("shell published above");
                self.check_hierarchy(&class, decl.span)?;
            }
        }

        // the module's own class: carries its property table so amending
        // the module enforces the typed key-set rule
        let module_class = VmClass::new(Rc::clone(&name), self.interner.intern(&name), Modifiers::OPEN, ObjKind::Typed);
        module_class.set_module_frame(Rc::clone(&frame));
        let superclass = parent_module
            .as_ref()
            .and_then(Value::as_object)
            .map_or_else(|| self.stdlib.module_base_class(), |p| Rc::clone(&p.class));
        module_class.set_superclass(superclass);

        let parent_class = parent_module.as_ref().and_then(Value::as_object).map(|p| Rc::clone(&p.class));
        let mut members: IndexMap<MemberKey, Rc<Member>, ValueHashState> = IndexMap::default();
        for entry in &cst.entries {
            match entry {
                ModuleEntry::Property(p) => {
                    if amending
                        && !p.modifiers.is_local()
                        && parent_class
                            .as_ref()
                            .is_some_and(|pc| pc.lookup_property(p.name).is_none())
                    {
                        return Err(self.err(
                            ErrorKind::CannotFindProperty,
                            format!(
                                "cannot find property `{}` in the amended module",
                                self.interner.display(p.name)
                            ),
                            p.span,
                        ));
                    }
                    let ty = match &p.ty {
                        Some(tr) => Some(types::resolve_type(self, tr, &scope, &frame, &[])?),
                        None => parent_class
                            .as_ref()
                            .and_then(|pc| pc.lookup_property(p.name))
                            .and_then(|cp| cp.ty.borrow().clone()),
                    };
                    if !p.modifiers.is_local() {
                        module_class.add_property(Rc::new(ClassProperty {
                            name: p.name,
                            modifiers: p.modifiers,
                            ty: RefCell::new(ty.clone()),
                            decl: None,
                            span: p.span,
                        }));
                    }
                    let key_id = if p.modifiers.is_local() { p.name.local_of() } else { p.name };
                    let key = MemberKey::Prop(key_id);
                    let member = Rc::new(Member {
                        key: key.clone(),
                        modifiers: p.modifiers,
                        span: p.span,
                        doc: p.doc.clone(),
                        ty,
                        env: None,
                        body: match &p.value {
                            crate::ast::MemberValueDecl::Expr(expr) => MemberBody::Expr(Rc::clone(expr)),
                            crate::ast::MemberValueDecl::Body(body) => MemberBody::Body(Rc::clone(body)),
                        },
                    });
                    members.insert(key, member);
                }
                ModuleEntry::Method(m) => {
                    let key_id = if m.modifiers.is_local() { m.name.local_of() } else { m.name };
                    let key = MemberKey::Prop(key_id);
                    members.insert(
                        key.clone(),
                        Rc::new(Member {
                            key,
                            modifiers: m.modifiers,
                            span: m.span,
                            doc: m.doc.clone(),
                            ty: None,
                            env: None,
                            body: MemberBody::Method(Rc::clone(m)),
                        }),
                    );
                }
                ModuleEntry::Class(_) | ModuleEntry::TypeAlias(_) => {}
            }
        }

        // every module exposes `output`; declare it on the module class so
        // amending modules may override it
        if module_class.lookup_property(WellKnown::Output.identifier()).is_none() {
            module_class.add_property(Rc::new(ClassProperty {
                name: WellKnown::Output.identifier(),
                modifiers: Modifiers::HIDDEN,
                ty: RefCell::new(None),
                decl: None,
                span: Span::none(),
            }));
        }

        // synthesized output, unless the module declares its own
        let output_key = MemberKey::Prop(WellKnown::Output.identifier());
        if !members.contains_key(&output_key) {
            members.insert(
                output_key.clone(),
                Rc::new(Member {
                    key: output_key,
                    modifiers: Modifiers::HIDDEN,
                    span: Span::none(),
                    doc: None,
                    ty: None,
                    env: None,
                    body: MemberBody::Synthetic(SyntheticMember::ModuleOutput),
                }),
            );
        }

        let module_obj = VmObject::new(
            ObjKind::Typed,
            module_class,
            parent_module,
            None,
            Rc::clone(&frame),
            members,
            Vec::new(),
        );
        scope.set_module(&module_obj);
        let value = Value::Object(module_obj);
        self.modules.insert(Rc::clone(&cst.uri), value.clone());
        Ok(value)
    }

    fn populate_class(
        &mut self,
        scope: &Rc<ModuleScope>,
        frame: &Rc<Frame>,
        class: &Rc<VmClass>,
        decl: &Rc<ClassDecl>,
    ) -> EvalResult<()> {
        // class bodies are const scopes at module level
        let frame = Frame::child_const(frame, ConstMode::Module);
        let frame = &frame;
        let superclass = match &decl.supertype {
            Some(type_ref) => {
                let resolved = types::resolve_type(self, type_ref, scope, frame, &decl.type_params)?;
                let crate::types::VmType::Class { class: superclass, .. } = &*resolved else {
                    return Err(self.err(
                        ErrorKind::InvalidSupertype,
                        format!("a class can only extend another class, not {}", resolved.display_name()),
                        decl.span,
                    ));
                };
                if Rc::ptr_eq(superclass, class) {
                    return Err(self.err(
                        ErrorKind::ClassCannotExtendSelf,
                        format!("class {} extends itself", class.qualified_name),
                        decl.span,
                    ));
                }
                if !superclass.is_extensible() {
                    return Err(self.err(
                        ErrorKind::CannotExtendFinalClass,
                        format!("cannot extend final class {}", superclass.qualified_name),
                        decl.span,
                    ));
                }
                Rc::clone(superclass)
            }
            None => self.stdlib.typed_class(),
        };
        class.set_superclass(superclass);
        for member in &decl.members {
            match member {
                ClassMemberDecl::Property(p) => {
                    let ty = match &p.ty {
                        Some(tr) => Some(types::resolve_type(self, tr, scope, frame, &decl.type_params)?),
                        None => None,
                    };
                    class.add_property(Rc::new(ClassProperty {
                        name: p.name,
                        modifiers: p.modifiers,
                        ty: RefCell::new(ty),
                        decl: Some(Rc::clone(p)),
                        span: p.span,
                    }));
                }
                ClassMemberDecl::Method(m) => class.add_method(Rc::clone(m)),
            }
        }
        Ok(())
    }

    /// Post-population hierarchy check: a supertype cycle that survived
    /// shell publication (`A extends B; B extends A`).
    fn check_hierarchy(&self, class: &Rc<VmClass>, span: Span) -> EvalResult<()> {
        let mut seen: Vec<*const VmClass> = vec![Rc::as_ptr(class)];
        let mut cur = class.superclass();
        while let Some(next) = cur {
            if seen.contains(&Rc::as_ptr(&next)) {
                return Err(self.err(
                    ErrorKind::ClassCannotExtendSelf,
                    format!("class {} extends itself through its supertype chain", class.qualified_name),
                    span,
                ));
            }
            seen.push(Rc::as_ptr(&next));
            cur = next.superclass();
        }
        Ok(())
    }

    /// Loads and evaluates the module at a canonical URI through the
    /// module cache: the host-facing twin of `import`.
    pub fn load_module_by_uri(&mut self, uri: &str) -> EvalResult<Value> {
        self.load_module(uri, Span::none())
    }

    /// Forces and returns the module's `output.value`.
    pub fn force_output(&mut self, module: &Value) -> EvalResult<Value> {
        let output = self.read_member(module, &MemberKey::Prop(WellKnown::Output.identifier()), Span::none())?;
        self.read_member(&output, &MemberKey::Prop(WellKnown::Value.identifier()), Span::none())
    }

    /// Forces and returns the module's rendered `output.text`.
    pub fn output_text(&mut self, module: &Value) -> EvalResult<String> {
        let output = self.read_member(module, &MemberKey::Prop(WellKnown::Output.identifier()), Span::none())?;
        let text = self.read_member(&output, &MemberKey::Prop(WellKnown::Text.identifier()), Span::none())?;
        match text {
            Value::Str(s) => Ok(s.to_string()),
            other => Err(self.err(
                ErrorKind::CannotRenderValue,
                format!("output.text must be a String but is {}", other.type_name()),
                Span::none(),
            )),
        }
    }

    /// Reads a property of a value; the host-facing entry point for
    /// walking evaluated configurations.
    pub fn get_property(&mut self, value: &Value, name: Identifier) -> EvalResult<Value> {
        self.read_member(value, &MemberKey::Prop(name), Span::none())
    }

    /// Subscript-style read: a listing element or a mapping entry.
    pub fn get_entry(&mut self, value: &Value, key: &Value) -> EvalResult<Value> {
        match key {
            Value::Int(i) if value.as_object().is_some_and(|o| o.kind == ObjKind::Listing) => {
                self.read_member(value, &MemberKey::Index(*i), Span::none())
            }
            other => self.read_member(value, &MemberKey::Entry(other.clone()), Span::none()),
        }
    }
}
