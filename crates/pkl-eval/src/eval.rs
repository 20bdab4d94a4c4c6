//! The tree-walking expression evaluator.
//!
//! One [`Evaluator`] owns one module graph: the interner, the prelude,
//! the module cache, and the explicit force stack used for cycle
//! detection. Evaluation is single-threaded and cooperative; the resource
//! tracker is consulted at every node-execution step, so a deadline or
//! depth limit fails evaluation with `evaluationTimedOut` or
//! `stackOverflow` wherever the tree walk happens to be.

use std::rc::Rc;

use ahash::AHashMap;

use crate::{
    ast::{BinOp, Callee, Expr, ExprLoc, Literal, ModuleCst, Span, StringPart, UnaryOp},
    construct,
    error::{Error, ErrorKind, EvalResult, StackFrame},
    frame::{ConstMode, Frame},
    intern::{Identifier, Interner, WellKnown},
    io::TraceWriter,
    loader::{IoFailure, ModuleLoader, Resource, ResourceReader, resolve_uri},
    member::{Member, MemberBody, MemberKey, SyntheticMember},
    object::{ObjKind, PredicateValue, VmObject},
    render,
    resolve,
    resource::{ResourceError, ResourceTracker},
    stdlib::{self, StdLib},
    types::{self, VmType},
    value::{DataSize, Duration, FunctionBody, Number, Value, VmFunction, VmMap, compare_values},
};

/// The evaluation context threaded through the tree walk.
///
/// Cheap to clone: three `Rc` handles and an optional type. `this` is the
/// receiver of the current member evaluation (late-bound); `owner` is the
/// object whose body the current code lexically appears in; `expected`
/// carries the declared type for contextual `new`.
#[derive(Debug, Clone)]
pub(crate) struct Ctx {
    pub this: Value,
    pub owner: Value,
    pub frame: Rc<Frame>,
    pub expected: Option<Rc<VmType>>,
}

impl Ctx {
    pub(crate) fn new(this: Value, owner: Value, frame: Rc<Frame>) -> Self {
        Self {
            this,
            owner,
            frame,
            expected: None,
        }
    }

    /// The same context without an expected type; used when descending
    /// into positions that do not propagate it.
    pub(crate) fn plain(&self) -> Self {
        Self {
            this: self.this.clone(),
            owner: self.owner.clone(),
            frame: Rc::clone(&self.frame),
            expected: None,
        }
    }
}

/// The evaluator: owns one module graph.
pub struct Evaluator<'io, T: ResourceTracker, W: TraceWriter> {
    pub(crate) interner: Interner,
    pub(crate) stdlib: StdLib,
    /// Evaluated modules, cached by canonical URI.
    pub(crate) modules: AHashMap<Rc<str>, Value>,
    /// Members currently being forced, for cycle detection. Entries are
    /// `(object address, key)`; popped on success and on error.
    force_stack: Vec<(usize, MemberKey)>,
    /// Frames for error reporting, innermost last.
    pub(crate) call_stack: Vec<StackFrame>,
    tracker: T,
    trace: W,
    pub(crate) loader: &'io mut dyn ModuleLoader,
    pub(crate) reader: &'io mut dyn ResourceReader,
    depth: usize,
}

impl<'io, T: ResourceTracker, W: TraceWriter> Evaluator<'io, T, W> {
    /// Creates an evaluator with the prelude loaded.
    pub fn new(
        loader: &'io mut dyn ModuleLoader,
        reader: &'io mut dyn ResourceReader,
        tracker: T,
        trace: W,
    ) -> Self {
        Self::with_interner(Interner::new(), loader, reader, tracker, trace)
    }

    /// Creates an evaluator around an interner the host has already used
    /// to intern the names of parsed modules.
    pub fn with_interner(
        mut interner: Interner,
        loader: &'io mut dyn ModuleLoader,
        reader: &'io mut dyn ResourceReader,
        tracker: T,
        trace: W,
    ) -> Self {
        let stdlib = StdLib::bootstrap(&mut interner);
        Self {
            interner,
            stdlib,
            modules: AHashMap::new(),
            force_stack: Vec::new(),
            call_stack: Vec::new(),
            tracker,
            trace,
            loader,
            reader,
            depth: 0,
        }
    }

    /// Interns a name. CSTs reference names by [`Identifier`], so hosts
    /// intern through the evaluator that will run the module.
    pub fn intern(&mut self, name: &str) -> Identifier {
        self.interner.intern(name)
    }

    /// Read access to the interner, for hosts resolving identifiers in
    /// value views.
    #[must_use]
    pub fn interner(&self) -> &Interner {
        &self.interner
    }

    /// Read access to the trace writer, for hosts collecting trace output.
    #[must_use]
    pub fn trace_writer(&self) -> &W {
        &self.trace
    }

    /// Creates an error carrying the current frame stack.
    pub(crate) fn err(&self, kind: ErrorKind, message: impl Into<String>, span: Span) -> Box<Error> {
        let mut err = Error::new(kind, message, span);
        for frame in self.call_stack.iter().rev() {
            err.frames.push(frame.clone());
        }
        err
    }

    /// One node-execution step: deadline check.
    pub(crate) fn step(&mut self, span: Span) -> EvalResult<()> {
        match self.tracker.check_time() {
            Ok(()) => Ok(()),
            Err(re) => Err(self.resource_err(re, span)),
        }
    }

    fn resource_err(&self, re: ResourceError, span: Span) -> Box<Error> {
        let kind = match re {
            ResourceError::Time { .. } => ErrorKind::EvaluationTimedOut,
            ResourceError::Recursion { .. } => ErrorKind::StackOverflow,
        };
        self.err(kind, re.to_string(), span)
    }

    fn check_depth(&self, span: Span) -> EvalResult<()> {
        self.tracker
            .check_recursion_depth(self.depth)
            .map_err(|re| self.resource_err(re, span))
    }

    // ------------------------------------------------------------------
    // expression evaluation
    // ------------------------------------------------------------------

    pub(crate) fn eval_expr(&mut self, node: &ExprLoc, ctx: &Ctx) -> EvalResult<Value> {
        self.step(node.span)?;
        let span = node.span;
        match &node.expr {
            Expr::Literal(lit) => Ok(literal_value(lit)),
            Expr::StringInterp {
                parts,
                multiline_indent,
            } => self.eval_string_interp(parts, *multiline_indent, ctx, span),
            Expr::This => Ok(ctx.frame.find_custom_this().unwrap_or_else(|| ctx.this.clone())),
            Expr::Name(name) => resolve::resolve_and_read(self, name, ctx, span),
            Expr::Access {
                receiver,
                name,
                nullable,
            } => {
                let recv = self.eval_expr(receiver, &ctx.plain())?;
                if *nullable && recv.is_null() {
                    return Ok(Value::Null);
                }
                match self.read_member(&recv, &MemberKey::Prop(*name), span) {
                    Ok(v) => Ok(v),
                    Err(e) if *nullable && e.kind.is_recoverable_lookup() => Ok(Value::Null),
                    Err(e) => Err(e),
                }
            }
            Expr::Subscript { receiver, index } => {
                let recv = self.eval_expr(receiver, &ctx.plain())?;
                let key = self.eval_expr(index, &ctx.plain())?;
                self.subscript(&recv, &key, span)
            }
            Expr::If {
                cond,
                then_expr,
                else_expr,
            } => {
                let c = self.eval_expr(cond, &ctx.plain())?;
                match c {
                    Value::Bool(true) => self.eval_expr(then_expr, ctx),
                    Value::Bool(false) => self.eval_expr(else_expr, ctx),
                    other => Err(self.err(
                        ErrorKind::TypeMismatch,
                        format!("expected a Boolean condition but got {}", other.type_name()),
                        cond.span,
                    )),
                }
            }
            Expr::Let { name, binding, body } => {
                let bound = self.eval_expr(binding, &ctx.plain())?;
                match name {
                    Some(name) => {
                        let frame = Frame::child_let(&ctx.frame, *name, bound);
                        let inner = Ctx {
                            this: ctx.this.clone(),
                            owner: ctx.owner.clone(),
                            frame,
                            expected: ctx.expected.clone(),
                        };
                        self.eval_expr(body, &inner)
                    }
                    // underscore: evaluated for effect (or failure) only
                    None => self.eval_expr(body, ctx),
                }
            }
            Expr::UnaryOp { op, operand } => {
                let value = self.eval_expr(operand, &ctx.plain())?;
                self.unary_op(*op, value, span)
            }
            Expr::BinOp { op, lhs, rhs } => self.eval_binop(*op, lhs, rhs, ctx, span),
            Expr::NonNull(inner) => {
                let value = self.eval_expr(inner, &ctx.plain())?;
                if value.is_null() {
                    Err(self.err(ErrorKind::TypeMismatch, "expected a non-null value", span))
                } else {
                    Ok(value)
                }
            }
            Expr::TypeTest { expr, ty } => {
                let value = self.eval_expr(expr, &ctx.plain())?;
                let resolved = types::resolve_type(self, ty, ctx.frame.scope(), &ctx.frame, &[])?;
                let ok = types::test_value(self, &value, &resolved, span)?;
                Ok(Value::Bool(ok))
            }
            Expr::TypeCast { expr, ty } => {
                let value = self.eval_expr(expr, &ctx.plain())?;
                let resolved = types::resolve_type(self, ty, ctx.frame.scope(), &ctx.frame, &[])?;
                types::check_value(self, &value, &resolved, span)?;
                Ok(value)
            }
            Expr::Throw(message) => {
                let value = self.eval_expr(message, &ctx.plain())?;
                let text = self.string_of(&value, span)?;
                Err(self.err(ErrorKind::UserThrow, text, span))
            }
            Expr::Trace(inner) => {
                let value = self.eval_expr(inner, &ctx.plain())?;
                let text = self.string_of(&value, span)?;
                self.trace.trace(&text, span);
                Ok(value)
            }
            Expr::Import { uri, glob, nullable } => self.eval_import(uri, *glob, *nullable, ctx, span),
            Expr::Read { uri, glob, nullable } => {
                let uri_value = self.eval_expr(uri, &ctx.plain())?;
                let Value::Str(uri_str) = uri_value else {
                    return Err(self.err(
                        ErrorKind::TypeMismatch,
                        format!("expected a String resource URI but got {}", uri_value.type_name()),
                        uri.span,
                    ));
                };
                self.eval_read(&uri_str, *glob, *nullable, ctx, span)
            }
            Expr::New { ty, body } => {
                let expected = match ty {
                    Some(type_ref) => Some(types::resolve_type(self, type_ref, ctx.frame.scope(), &ctx.frame, &[])?),
                    None => ctx.expected.clone(),
                };
                construct::new_object(self, expected.as_ref(), body, ctx, span)
            }
            Expr::Amend { parent, body } => {
                let parent_value = self.eval_expr(parent, &ctx.plain())?;
                if parent_value.as_object().is_none() {
                    return Err(self.err(
                        ErrorKind::TypeMismatch,
                        format!("cannot amend a value of type {}", parent_value.type_name()),
                        parent.span,
                    ));
                }
                construct::amend_object(self, parent_value, body, ctx, span)
            }
            Expr::FunctionLit { params, body } => Ok(Value::Function(Rc::new(VmFunction {
                params: params.clone(),
                param_tys: vec![None; params.len()],
                this: ctx.this.clone(),
                owner: ctx.owner.clone(),
                frame: Some(Rc::clone(&ctx.frame)),
                return_ty: None,
                name: None,
                body: FunctionBody::Expr(Rc::clone(body)),
            }))),
            Expr::Call { callee, args } => self.eval_call(callee, args, ctx, span),
        }
    }

    fn eval_call(&mut self, callee: &Callee, args: &[ExprLoc], ctx: &Ctx, span: Span) -> EvalResult<Value> {
        let function = match callee {
            Callee::Bare(name) => resolve::resolve_and_read(self, name, ctx, span)?,
            Callee::Member {
                receiver,
                name,
                nullable,
            } => {
                let recv = self.eval_expr(receiver, &ctx.plain())?;
                if *nullable && recv.is_null() {
                    return Ok(Value::Null);
                }
                match self.read_member(&recv, &MemberKey::Prop(*name), span) {
                    Ok(v) => v,
                    Err(e) if e.kind == ErrorKind::CannotFindProperty => {
                        let name = self.interner.display(*name);
                        return Err(self.err(
                            ErrorKind::CannotFindMethod,
                            format!("cannot find method `{name}` on {}", recv.type_name()),
                            span,
                        ));
                    }
                    Err(e) => return Err(e),
                }
            }
            Callee::Expr(expr) => self.eval_expr(expr, &ctx.plain())?,
        };
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval_expr(arg, &ctx.plain())?);
        }
        self.apply(&function, values, span)
    }

    /// Invokes a value as a function.
    pub(crate) fn apply(&mut self, function: &Value, args: Vec<Value>, span: Span) -> EvalResult<Value> {
        match function {
            Value::Function(f) => self.call_function(f, args, span),
            other => Err(self.err(
                ErrorKind::NotInvokable,
                format!("a value of type {} cannot be invoked", other.type_name()),
                span,
            )),
        }
    }

    /// Calls a function value: argument binding, declared-type checks on
    /// parameters and return value, and depth accounting.
    pub(crate) fn call_function(&mut self, f: &Rc<VmFunction>, args: Vec<Value>, span: Span) -> EvalResult<Value> {
        self.check_depth(span)?;
        match &f.body {
            // builtins are variadic at this level and validate their own arity
            FunctionBody::Builtin(builtin) => builtin.call(self, &f.this, args, span),
            FunctionBody::Expr(body) => {
                if args.len() != f.params.len() {
                    let name = f
                        .name
                        .map_or_else(|| "function".to_owned(), |id| format!("method `{}`", self.interner.display(id)));
                    return Err(self.err(
                        ErrorKind::WrongArgumentCount,
                        format!("{name} expects {} argument(s) but got {}", f.params.len(), args.len()),
                        span,
                    ));
                }
                for (value, ty) in args.iter().zip(&f.param_tys) {
                    if let Some(ty) = ty {
                        types::check_value(self, value, ty, span)?;
                    }
                }
                let captured = f
                    .frame
                    .as_ref()
                    .expect("user functions always capture their defining frame");
                let frame = Frame::child_call(captured, f.params.clone(), args);
                let ctx = Ctx::new(f.this.clone(), f.owner.clone(), frame);
                self.depth += 1;
                self.call_stack.push(StackFrame::new(
                    span,
                    f.name.map_or_else(
                        || "<function>".to_owned(),
                        |id| self.interner.display(id),
                    ),
                ));
                let result = self.eval_expr(body, &ctx);
                self.call_stack.pop();
                self.depth -= 1;
                let value = result?;
                if let Some(ret) = &f.return_ty {
                    types::check_value(self, &value, ret, span)?;
                }
                Ok(value)
            }
        }
    }

    // ------------------------------------------------------------------
    // strings
    // ------------------------------------------------------------------

    fn eval_string_interp(
        &mut self,
        parts: &[StringPart],
        multiline_indent: Option<u32>,
        ctx: &Ctx,
        span: Span,
    ) -> EvalResult<Value> {
        let mut out = String::new();
        for part in parts {
            match part {
                StringPart::Lit(text) => out.push_str(text),
                StringPart::Interp(expr) => {
                    let value = self.eval_expr(expr, &ctx.plain())?;
                    out.push_str(&self.string_of(&value, expr.span)?);
                }
            }
        }
        if let Some(indent) = multiline_indent {
            out = strip_common_indent(&out, indent as usize);
        }
        Ok(Value::Str(Rc::from(out)))
    }

    /// The string form of a value for interpolation, `throw`, and
    /// `trace`: strings verbatim, objects rendered, everything else via
    /// its display form.
    pub(crate) fn string_of(&mut self, value: &Value, span: Span) -> EvalResult<String> {
        match value {
            Value::Str(s) => Ok(s.to_string()),
            Value::Object(_) => render::render_value(self, value, span),
            other => Ok(other.to_string()),
        }
    }

    // ------------------------------------------------------------------
    // operators
    // ------------------------------------------------------------------

    fn eval_binop(&mut self, op: BinOp, lhs: &ExprLoc, rhs: &ExprLoc, ctx: &Ctx, span: Span) -> EvalResult<Value> {
        // short-circuiting and laziness first
        match op {
            BinOp::And => {
                let left = self.eval_expr(lhs, &ctx.plain())?;
                return match left {
                    Value::Bool(false) => Ok(Value::Bool(false)),
                    Value::Bool(true) => self.expect_bool(rhs, ctx),
                    other => Err(self.type_error_operand("&&", &other, lhs.span)),
                };
            }
            BinOp::Or => {
                let left = self.eval_expr(lhs, &ctx.plain())?;
                return match left {
                    Value::Bool(true) => Ok(Value::Bool(true)),
                    Value::Bool(false) => self.expect_bool(rhs, ctx),
                    other => Err(self.type_error_operand("||", &other, lhs.span)),
                };
            }
            BinOp::NullCoalesce => {
                let left = self.eval_expr(lhs, &ctx.plain())?;
                return if left.is_null() {
                    self.eval_expr(rhs, ctx)
                } else {
                    Ok(left)
                };
            }
            BinOp::Pipe => {
                let left = self.eval_expr(lhs, &ctx.plain())?;
                let function = self.eval_expr(rhs, &ctx.plain())?;
                return self.apply(&function, vec![left], span);
            }
            _ => {}
        }
        let left = self.eval_expr(lhs, &ctx.plain())?;
        let right = self.eval_expr(rhs, &ctx.plain())?;
        match op {
            BinOp::Eq => Ok(Value::Bool(self.values_equal(&left, &right, span)?)),
            BinOp::Ne => Ok(Value::Bool(!self.values_equal(&left, &right, span)?)),
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                let Some(ordering) = compare_values(&left, &right) else {
                    return Err(self.err(
                        ErrorKind::CannotCompareValues,
                        format!(
                            "cannot compare {} with {}",
                            left.type_name(),
                            right.type_name()
                        ),
                        span,
                    ));
                };
                let ok = match op {
                    BinOp::Lt => ordering.is_lt(),
                    BinOp::Le => ordering.is_le(),
                    BinOp::Gt => ordering.is_gt(),
                    _ => ordering.is_ge(),
                };
                Ok(Value::Bool(ok))
            }
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::IntDiv | BinOp::Rem | BinOp::Pow => {
                self.arithmetic(op, &left, &right, span)
            }
            BinOp::And | BinOp::Or | BinOp::NullCoalesce | BinOp::Pipe => unreachable!("handled above"),
        }
    }

    fn expect_bool(&mut self, node: &ExprLoc, ctx: &Ctx) -> EvalResult<Value> {
        let value = self.eval_expr(node, &ctx.plain())?;
        match value {
            Value::Bool(_) => Ok(value),
            other => Err(self.type_error_operand("a logical operator", &other, node.span)),
        }
    }

    fn type_error_operand(&self, op: &str, value: &Value, span: Span) -> Box<Error> {
        self.err(
            ErrorKind::TypeMismatch,
            format!("operand of {op} must be a Boolean but got {}", value.type_name()),
            span,
        )
    }

    fn unary_op(&mut self, op: UnaryOp, value: Value, span: Span) -> EvalResult<Value> {
        match (op, value) {
            (UnaryOp::Neg, Value::Int(i)) => i
                .checked_neg()
                .map(Value::Int)
                .ok_or_else(|| self.overflow("-", span)),
            (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
            (UnaryOp::Neg, Value::Duration(d)) => Ok(Value::Duration(Duration::new(negate(d.value), d.unit))),
            (UnaryOp::Neg, Value::DataSize(d)) => Ok(Value::DataSize(DataSize::new(negate(d.value), d.unit))),
            (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
            (op, other) => Err(self.err(
                ErrorKind::TypeMismatch,
                format!(
                    "operator {} is not defined for {}",
                    match op {
                        UnaryOp::Neg => "-",
                        UnaryOp::Not => "!",
                    },
                    other.type_name()
                ),
                span,
            )),
        }
    }

    fn overflow(&self, op: &str, span: Span) -> Box<Error> {
        self.err(ErrorKind::IntegerOverflow, format!("integer overflow in `{op}`"), span)
    }

    fn arithmetic(&mut self, op: BinOp, left: &Value, right: &Value, span: Span) -> EvalResult<Value> {
        use Value::{DataSize as Vds, Duration as Vdur, Float, Int, List, Map, Set, Str};
        match (op, left, right) {
            // concatenation and merging
            (BinOp::Add, Str(a), Str(b)) => {
                let mut s = String::with_capacity(a.len() + b.len());
                s.push_str(a);
                s.push_str(b);
                Ok(Str(Rc::from(s)))
            }
            (BinOp::Add, List(a), List(b)) => {
                let mut items = Vec::with_capacity(a.len() + b.len());
                items.extend(a.iter().cloned());
                items.extend(b.iter().cloned());
                Ok(List(Rc::new(items)))
            }
            (BinOp::Add, Set(a), Set(b)) => {
                let merged = crate::value::VmSet::from_iter(a.items.iter().cloned().chain(b.items.iter().cloned()));
                Ok(Set(Rc::new(merged)))
            }
            (BinOp::Add, Map(a), Map(b)) => {
                let merged = VmMap::from_pairs(
                    a.entries
                        .iter()
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .chain(b.entries.iter().map(|(k, v)| (k.clone(), v.clone()))),
                );
                Ok(Map(Rc::new(merged)))
            }
            // durations and data sizes
            (BinOp::Add | BinOp::Sub, Vdur(a), Vdur(b)) => Ok(Vdur(duration_add(*a, *b, op == BinOp::Sub))),
            (BinOp::Add | BinOp::Sub, Vds(a), Vds(b)) => Ok(Vds(data_size_add(*a, *b, op == BinOp::Sub))),
            (BinOp::Mul, Vdur(d), n) | (BinOp::Mul, n, Vdur(d)) if n.as_number().is_some() => {
                let factor = n.as_number().expect("guard checked").as_f64();
                Ok(Vdur(Duration::new(Number::Float(d.value.as_f64() * factor), d.unit)))
            }
            (BinOp::Mul, Vds(d), n) | (BinOp::Mul, n, Vds(d)) if n.as_number().is_some() => {
                let factor = n.as_number().expect("guard checked").as_f64();
                Ok(Vds(DataSize::new(Number::Float(d.value.as_f64() * factor), d.unit)))
            }
            (BinOp::Div, Vdur(a), Vdur(b)) => Ok(Float(a.seconds() / b.seconds())),
            (BinOp::Div, Vds(a), Vds(b)) => Ok(Float(a.bytes() / b.bytes())),
            (BinOp::Div, Vdur(d), n) if n.as_number().is_some() => {
                let divisor = n.as_number().expect("guard checked").as_f64();
                Ok(Vdur(Duration::new(Number::Float(d.value.as_f64() / divisor), d.unit)))
            }
            (BinOp::Div, Vds(d), n) if n.as_number().is_some() => {
                let divisor = n.as_number().expect("guard checked").as_f64();
                Ok(Vds(DataSize::new(Number::Float(d.value.as_f64() / divisor), d.unit)))
            }
            // numbers
            (_, Int(a), Int(b)) => self.int_arithmetic(op, *a, *b, span),
            (_, l, r) => {
                let (Some(a), Some(b)) = (l.as_number(), r.as_number()) else {
                    return Err(self.err(
                        ErrorKind::TypeMismatch,
                        format!(
                            "operator {} is not defined for {} and {}",
                            op_symbol(op),
                            l.type_name(),
                            r.type_name()
                        ),
                        span,
                    ));
                };
                self.float_arithmetic(op, a.as_f64(), b.as_f64(), span)
            }
        }
    }

    fn int_arithmetic(&self, op: BinOp, a: i64, b: i64, span: Span) -> EvalResult<Value> {
        match op {
            BinOp::Add => a.checked_add(b).map(Value::Int).ok_or_else(|| self.overflow("+", span)),
            BinOp::Sub => a.checked_sub(b).map(Value::Int).ok_or_else(|| self.overflow("-", span)),
            BinOp::Mul => a.checked_mul(b).map(Value::Int).ok_or_else(|| self.overflow("*", span)),
            // `/` always produces a Float
            BinOp::Div => Ok(Value::Float(a as f64 / b as f64)),
            BinOp::IntDiv => {
                if b == 0 {
                    return Err(self.division_by_zero(span));
                }
                a.checked_div(b).map(Value::Int).ok_or_else(|| self.overflow("~/", span))
            }
            BinOp::Rem => {
                if b == 0 {
                    return Err(self.division_by_zero(span));
                }
                // i64::MIN % -1 overflows in hardware; the result is 0
                Ok(Value::Int(a.checked_rem(b).unwrap_or(0)))
            }
            BinOp::Pow => self.int_pow(a, b, span),
            _ => unreachable!("non-arithmetic op in int_arithmetic"),
        }
    }

    fn int_pow(&self, base: i64, exp: i64, span: Span) -> EvalResult<Value> {
        if exp < 0 {
            return Ok(Value::Float((base as f64).powf(exp as f64)));
        }
        match base {
            0 | 1 => return Ok(Value::Int(if exp == 0 { 1 } else { base })),
            -1 => return Ok(Value::Int(if exp % 2 == 0 { 1 } else { -1 })),
            _ => {}
        }
        let exp_u32 = u32::try_from(exp).map_err(|_| self.overflow("**", span))?;
        base.checked_pow(exp_u32)
            .map(Value::Int)
            .ok_or_else(|| self.overflow("**", span))
    }

    fn float_arithmetic(&self, op: BinOp, a: f64, b: f64, span: Span) -> EvalResult<Value> {
        match op {
            BinOp::Add => Ok(Value::Float(a + b)),
            BinOp::Sub => Ok(Value::Float(a - b)),
            BinOp::Mul => Ok(Value::Float(a * b)),
            BinOp::Div => Ok(Value::Float(a / b)),
            BinOp::IntDiv => {
                if b == 0.0 {
                    return Err(self.division_by_zero(span));
                }
                let truncated = (a / b).trunc();
                if truncated < i64::MIN as f64 || truncated > i64::MAX as f64 || truncated.is_nan() {
                    return Err(self.overflow("~/", span));
                }
                Ok(Value::Int(truncated as i64))
            }
            // truncated remainder with the dividend's sign
            BinOp::Rem => Ok(Value::Float(a % b)),
            BinOp::Pow => Ok(Value::Float(a.powf(b))),
            _ => unreachable!("non-arithmetic op in float_arithmetic"),
        }
    }

    fn division_by_zero(&self, span: Span) -> Box<Error> {
        self.err(ErrorKind::DivisionByZero, "cannot divide by zero", span)
    }

    // ------------------------------------------------------------------
    // subscripts
    // ------------------------------------------------------------------

    fn subscript(&mut self, recv: &Value, key: &Value, span: Span) -> EvalResult<Value> {
        match recv {
            Value::Str(s) => {
                let Value::Int(i) = key else {
                    return Err(self.subscript_key_error(recv, key, span));
                };
                let ch = usize::try_from(*i).ok().and_then(|i| s.chars().nth(i));
                match ch {
                    Some(c) => Ok(Value::Str(Rc::from(c.to_string()))),
                    None => Err(self.err(
                        ErrorKind::CharIndexOutOfRange,
                        format!("character index {i} is out of range for a string of {} code points", s.chars().count()),
                        span,
                    )),
                }
            }
            Value::Bytes(bytes) => {
                let Value::Int(i) = key else {
                    return Err(self.subscript_key_error(recv, key, span));
                };
                usize::try_from(*i)
                    .ok()
                    .and_then(|i| bytes.get(i))
                    .map(|b| Value::Int(i64::from(*b)))
                    .ok_or_else(|| {
                        self.err(
                            ErrorKind::ElementIndexOutOfRange,
                            format!("index {i} is out of range for {} bytes", bytes.len()),
                            span,
                        )
                    })
            }
            Value::List(items) => {
                let Value::Int(i) = key else {
                    return Err(self.subscript_key_error(recv, key, span));
                };
                usize::try_from(*i).ok().and_then(|i| items.get(i)).cloned().ok_or_else(|| {
                    self.err(
                        ErrorKind::ElementIndexOutOfRange,
                        format!("element index {i} is out of range for a list of length {}", items.len()),
                        span,
                    )
                })
            }
            Value::Map(map) => map.entries.get(key).cloned().ok_or_else(|| {
                self.err(ErrorKind::CannotFindKey, format!("cannot find key `{key}`"), span)
            }),
            Value::Pair(pair) => match key {
                Value::Int(0) => Ok(pair.first.clone()),
                Value::Int(1) => Ok(pair.second.clone()),
                _ => Err(self.subscript_key_error(recv, key, span)),
            },
            Value::Object(obj) => match (obj.kind, key) {
                (ObjKind::Listing, Value::Int(i)) => self.read_member(recv, &MemberKey::Index(*i), span),
                (ObjKind::Dynamic, Value::Int(i)) if has_index_member(obj, *i) => {
                    self.read_member(recv, &MemberKey::Index(*i), span)
                }
                (ObjKind::Mapping | ObjKind::Dynamic, k) => {
                    self.read_member(recv, &MemberKey::Entry(k.clone()), span)
                }
                _ => Err(self.subscript_key_error(recv, key, span)),
            },
            other => Err(self.err(
                ErrorKind::TypeMismatch,
                format!("a value of type {} cannot be subscripted", other.type_name()),
                span,
            )),
        }
    }

    fn subscript_key_error(&self, recv: &Value, key: &Value, span: Span) -> Box<Error> {
        self.err(
            ErrorKind::TypeMismatch,
            format!(
                "cannot subscript {} with a key of type {}",
                recv.type_name(),
                key.type_name()
            ),
            span,
        )
    }

    // ------------------------------------------------------------------
    // member reads and forcing
    // ------------------------------------------------------------------

    /// Reads a member of any value: the object path with memoization and
    /// cycle detection, or builtin member dispatch for primitives.
    pub(crate) fn read_member(&mut self, recv: &Value, key: &MemberKey, span: Span) -> EvalResult<Value> {
        self.step(span)?;
        match recv {
            Value::Object(obj) => self.read_object_member(&Rc::clone(obj), key, span),
            Value::Null => Err(self.err(
                ErrorKind::CannotFindProperty,
                format!("cannot read member `{}` of null", self.display_key(key)),
                span,
            )),
            other => {
                if let MemberKey::Prop(name) = key {
                    if let Some(value) = stdlib::read_builtin_member(self, other, *name, span)? {
                        return Ok(value);
                    }
                    Err(self.err(
                        ErrorKind::CannotFindProperty,
                        format!(
                            "cannot find property `{}` on a value of type {}",
                            self.interner.display(*name),
                            other.type_name()
                        ),
                        span,
                    ))
                } else {
                    Err(self.err(
                        ErrorKind::CannotFindKey,
                        format!("cannot find key `{}`", self.display_key(key)),
                        span,
                    ))
                }
            }
        }
    }

    pub(crate) fn display_key(&self, key: &MemberKey) -> String {
        match key {
            MemberKey::Prop(id) => self.interner.display(*id),
            MemberKey::Index(i) => i.to_string(),
            MemberKey::Entry(v) => v.to_string(),
        }
    }

    fn read_object_member(&mut self, obj: &Rc<VmObject>, key: &MemberKey, span: Span) -> EvalResult<Value> {
        if let Some(value) = obj.memo_get(key) {
            return Ok(value);
        }
        let token = (Rc::as_ptr(obj) as usize, key.clone());
        if self.force_stack.contains(&token) {
            return Err(self.err(
                ErrorKind::CircularReference,
                format!("circular reference while evaluating `{}`", self.display_key(key)),
                span,
            ));
        }
        self.force_stack.push(token);
        self.depth += 1;
        let result = self.compute_object_member(obj, key, span);
        self.depth -= 1;
        self.force_stack.pop();
        let value = result?;
        obj.memo_put(key.clone(), value.clone());
        Ok(value)
    }

    fn compute_object_member(&mut self, obj: &Rc<VmObject>, key: &MemberKey, span: Span) -> EvalResult<Value> {
        self.check_depth(span)?;
        if let Some(value) = self.compute_chain_member(obj, Rc::clone(obj), key, span)? {
            return Ok(value);
        }
        // defaults synthesize members for in-range keys
        if let Some(value) = self.synthesize_default(obj, key, span)? {
            return Ok(value);
        }
        // class methods bind on demand
        if let MemberKey::Prop(name) = key {
            if let Some(method) = obj.class.lookup_method(*name) {
                return self.bind_method(&Value::Object(Rc::clone(obj)), obj, &method, span);
            }
            // builtin surface shared by every object flavor
            let recv = Value::Object(Rc::clone(obj));
            if let Some(value) = stdlib::read_builtin_member(self, &recv, *name, span)? {
                return Ok(value);
            }
        }
        Err(self.missing_member_error(obj, key, span))
    }

    fn missing_member_error(&self, obj: &Rc<VmObject>, key: &MemberKey, span: Span) -> Box<Error> {
        match key {
            MemberKey::Index(i) => self.err(
                ErrorKind::ElementIndexOutOfRange,
                format!(
                    "element index {i} is out of range for a listing of length {}",
                    obj.listing_length()
                ),
                span,
            ),
            MemberKey::Entry(k) => self.err(ErrorKind::CannotFindKey, format!("cannot find key `{k}`"), span),
            MemberKey::Prop(name) => self.err(
                ErrorKind::CannotFindProperty,
                format!(
                    "cannot find property `{}` on {}",
                    self.interner.display(*name),
                    obj.class.qualified_name
                ),
                span,
            ),
        }
    }

    /// Walks the amend chain for a key, applying member predicates of
    /// intermediate levels; `None` means no level defines the key.
    fn compute_chain_member(
        &mut self,
        recv: &Rc<VmObject>,
        cur: Rc<VmObject>,
        key: &MemberKey,
        span: Span,
    ) -> EvalResult<Option<Value>> {
        let own = match key {
            MemberKey::Prop(name) => cur.get_prop_local_first(*name).cloned(),
            other => cur.get_member(other).cloned(),
        };
        if let Some(member) = own {
            let value = self.force_member_body(recv, &cur, &member, key, span)?;
            return Ok(Some(value));
        }
        let Some(parent) = cur.parent_object().cloned() else {
            return Ok(None);
        };
        let Some(inherited) = self.compute_chain_member(recv, parent, key, span)? else {
            return Ok(None);
        };
        // member predicates of this level amend matching inherited members
        let level_owner = Value::Object(Rc::clone(&cur));
        for predicate in cur.predicates() {
            // the candidate rides in the custom-this slot; `this` stays the
            // owner so lexical fallbacks resolve against the right scope
            let frame = Frame::child_custom_this(&predicate.env, inherited.clone());
            let ctx = Ctx::new(level_owner.clone(), level_owner.clone(), frame);
            let verdict = self.eval_expr(&predicate.cond, &ctx)?;
            let Value::Bool(selected) = verdict else {
                return Err(self.err(
                    ErrorKind::TypeMismatch,
                    format!("a member predicate must produce a Boolean but got {}", verdict.type_name()),
                    predicate.cond.span,
                ));
            };
            if !selected {
                continue;
            }
            let value = match &predicate.value {
                PredicateValue::Expr(expr) => {
                    let pctx = Ctx::new(inherited.clone(), level_owner.clone(), Rc::clone(&predicate.env));
                    self.eval_expr(expr, &pctx)?
                }
                PredicateValue::Body(body) => {
                    let pctx = Ctx::new(inherited.clone(), level_owner.clone(), Rc::clone(&predicate.env));
                    construct::amend_object(self, inherited.clone(), body, &pctx, predicate.span)?
                }
            };
            return Ok(Some(value));
        }
        Ok(Some(inherited))
    }

    /// Default-member synthesis for Listing/Mapping/Dynamic.
    fn synthesize_default(&mut self, obj: &Rc<VmObject>, key: &MemberKey, span: Span) -> EvalResult<Option<Value>> {
        let applicable = match (obj.kind, key) {
            (ObjKind::Listing, MemberKey::Index(i)) => *i >= 0 && *i < obj.listing_length(),
            (ObjKind::Mapping | ObjKind::Dynamic, MemberKey::Entry(_)) => true,
            _ => false,
        };
        if !applicable {
            return Ok(None);
        }
        let default_key = MemberKey::Prop(WellKnown::Default.identifier());
        if obj.find_member(&default_key).is_none() {
            return Ok(None);
        }
        let default = self.read_member(&Value::Object(Rc::clone(obj)), &default_key, span)?;
        let key_value = match key {
            MemberKey::Index(i) => Value::Int(*i),
            MemberKey::Entry(v) => v.clone(),
            MemberKey::Prop(_) => unreachable!("defaults only apply to indexes and entries"),
        };
        let value = self.apply(&default, vec![key_value], span)?;
        Ok(Some(value))
    }

    /// Forces one member body with the receiver/owner split: the thunk
    /// evaluates in the defining object's frame, but `this` stays the
    /// receiver, which is what makes amending late-bound.
    fn force_member_body(
        &mut self,
        recv: &Rc<VmObject>,
        def_obj: &Rc<VmObject>,
        member: &Rc<Member>,
        key: &MemberKey,
        span: Span,
    ) -> EvalResult<Value> {
        let member_span = if member.span == Span::none() { span } else { member.span };
        self.call_stack.push(StackFrame::new(
            member_span,
            format!("{}#{}", def_obj.class.qualified_name, self.display_key(key)),
        ));
        let env = member.env.clone().unwrap_or_else(|| Rc::clone(&def_obj.frame));
        let env = if member.modifiers.is_const() {
            Frame::child_const(&env, ConstMode::All(0))
        } else {
            env
        };
        let mut ctx = Ctx::new(Value::Object(Rc::clone(recv)), Value::Object(Rc::clone(def_obj)), env);
        ctx.expected = member.ty.clone();
        let result = (|| -> EvalResult<Value> {
            let value = match &member.body {
                MemberBody::Constant(value) => value.clone(),
                MemberBody::Expr(expr) => self.eval_expr(expr, &ctx)?,
                MemberBody::Body(body) => {
                    let parent = self.amend_parent_value(recv, def_obj, member, key, span)?;
                    construct::amend_object(self, parent, body, &ctx, member_span)?
                }
                MemberBody::Method(method) => {
                    return self.bind_method(&Value::Object(Rc::clone(recv)), def_obj, method, span);
                }
                MemberBody::Synthetic(which) => self.force_synthetic(recv, def_obj, *which, span)?,
            };
            if let Some(ty) = &member.ty {
                types::check_value(self, &value, ty, member_span)?;
            }
            Ok(value)
        })();
        self.call_stack.pop();
        result
    }

    /// The value an amending member body starts from: what the chain
    /// above the defining object yields for the key, or the declared
    /// type's instantiable default, or an empty Dynamic.
    fn amend_parent_value(
        &mut self,
        recv: &Rc<VmObject>,
        def_obj: &Rc<VmObject>,
        member: &Rc<Member>,
        key: &MemberKey,
        span: Span,
    ) -> EvalResult<Value> {
        if let Some(parent) = def_obj.parent_object().cloned()
            && let Some(value) = self.compute_chain_member(recv, parent, key, span)?
        {
            return Ok(value);
        }
        // the module's `output` keeps its synthesized base when amended
        if recv.enclosing.is_none()
            && *key == MemberKey::Prop(WellKnown::Output.identifier())
        {
            return self.force_synthetic(recv, def_obj, SyntheticMember::ModuleOutput, span);
        }
        if let Some(ty) = &member.ty
            && let Some(class) = types::instantiable_class(ty)
        {
            return construct::class_prototype(self, &class, span);
        }
        let dynamic = self.stdlib.dynamic_class();
        construct::class_prototype(self, &dynamic, span)
    }

    fn bind_method(
        &mut self,
        recv: &Value,
        def_obj: &Rc<VmObject>,
        method: &Rc<crate::ast::MethodDecl>,
        span: Span,
    ) -> EvalResult<Value> {
        let frame = Rc::clone(&def_obj.frame);
        let scope = Rc::clone(frame.scope());
        let mut param_tys = Vec::with_capacity(method.params.len());
        let mut params = Vec::with_capacity(method.params.len());
        for param in &method.params {
            params.push(param.name);
            param_tys.push(match &param.ty {
                Some(tr) => Some(types::resolve_type(self, tr, &scope, &frame, &[])?),
                None => None,
            });
        }
        let return_ty = match &method.return_ty {
            Some(tr) => Some(types::resolve_type(self, tr, &scope, &frame, &[])?),
            None => None,
        };
        let _ = span;
        Ok(Value::Function(Rc::new(VmFunction {
            params,
            param_tys,
            this: recv.clone(),
            owner: Value::Object(Rc::clone(def_obj)),
            frame: Some(frame),
            return_ty,
            name: Some(method.name),
            body: FunctionBody::Expr(Rc::clone(&method.body)),
        })))
    }

    fn force_synthetic(
        &mut self,
        recv: &Rc<VmObject>,
        def_obj: &Rc<VmObject>,
        which: SyntheticMember,
        span: Span,
    ) -> EvalResult<Value> {
        match which {
            SyntheticMember::ModuleOutput => {
                let mut members = indexmap::IndexMap::default();
                let value_key = MemberKey::Prop(WellKnown::Value.identifier());
                members.insert(
                    value_key.clone(),
                    Member::new(value_key, Default::default(), Span::none(), MemberBody::Synthetic(SyntheticMember::OutputValue)),
                );
                let text_key = MemberKey::Prop(WellKnown::Text.identifier());
                members.insert(
                    text_key.clone(),
                    Member::new(text_key, Default::default(), Span::none(), MemberBody::Synthetic(SyntheticMember::OutputText)),
                );
                Ok(Value::Object(VmObject::new(
                    ObjKind::Dynamic,
                    self.stdlib.dynamic_class(),
                    None,
                    Some(Value::Object(Rc::clone(recv))),
                    Rc::clone(&recv.frame),
                    members,
                    Vec::new(),
                )))
            }
            SyntheticMember::OutputValue => def_obj
                .enclosing
                .clone()
                .ok_or_else(|| self.err(ErrorKind::CannotRenderValue, "output has no enclosing module", span)),
            SyntheticMember::OutputText => {
                let value = self.read_member(
                    &Value::Object(Rc::clone(recv)),
                    &MemberKey::Prop(WellKnown::Value.identifier()),
                    span,
                )?;
                let text = render::render_module_text(self, &value, span)?;
                Ok(Value::Str(Rc::from(text)))
            }
        }
    }

    // ------------------------------------------------------------------
    // equality and deep forcing
    // ------------------------------------------------------------------

    /// `==` semantics: deep-force both sides, then structural equality.
    pub(crate) fn values_equal(&mut self, left: &Value, right: &Value, span: Span) -> EvalResult<bool> {
        self.force_deep(left, span)?;
        self.force_deep(right, span)?;
        Ok(left == right)
    }

    /// Forces a value tree transitively: every non-local, non-method
    /// member of every reachable object, in insertion order.
    pub fn force_deep(&mut self, value: &Value, span: Span) -> EvalResult<()> {
        let mut visited = ahash::AHashSet::new();
        self.force_deep_inner(value, span, &mut visited)
    }

    fn force_deep_inner(
        &mut self,
        value: &Value,
        span: Span,
        visited: &mut ahash::AHashSet<usize>,
    ) -> EvalResult<()> {
        match value {
            Value::Object(obj) => {
                if !visited.insert(Rc::as_ptr(obj) as usize) {
                    return Ok(());
                }
                for key in obj.effective_keys() {
                    let forced = self.read_member(value, &key, span)?;
                    self.force_deep_inner(&forced, span, visited)?;
                }
                Ok(())
            }
            Value::List(items) => {
                for item in items.iter() {
                    self.force_deep_inner(item, span, visited)?;
                }
                Ok(())
            }
            Value::Set(set) => {
                for item in &set.items {
                    self.force_deep_inner(item, span, visited)?;
                }
                Ok(())
            }
            Value::Map(map) => {
                for (k, v) in &map.entries {
                    self.force_deep_inner(k, span, visited)?;
                    self.force_deep_inner(v, span, visited)?;
                }
                Ok(())
            }
            Value::Pair(pair) => {
                self.force_deep_inner(&pair.first, span, visited)?;
                self.force_deep_inner(&pair.second, span, visited)
            }
            _ => Ok(()),
        }
    }

    // ------------------------------------------------------------------
    // import and read
    // ------------------------------------------------------------------

    fn io_err(&self, failure: &IoFailure, module: bool, span: Span) -> Box<Error> {
        let kind = if module && failure.not_found {
            ErrorKind::CannotFindModuleImport
        } else {
            ErrorKind::IoError
        };
        self.err(kind, failure.message.clone(), span)
    }

    /// Loads and evaluates a module by canonical URI, through the cache.
    pub(crate) fn load_module(&mut self, uri: &str, span: Span) -> EvalResult<Value> {
        if let Some(value) = self.modules.get(uri) {
            return Ok(value.clone());
        }
        if let Some(value) = self.stdlib.prelude_module(uri) {
            return Ok(value);
        }
        let cst = match self.loader.load(uri) {
            Ok(cst) => cst,
            Err(failure) => return Err(self.io_err(&failure, true, span)),
        };
        self.evaluate_module_cst(&cst, span)
    }

    fn eval_import(&mut self, uri: &str, glob: bool, nullable: bool, ctx: &Ctx, span: Span) -> EvalResult<Value> {
        let resolved = resolve_uri(&ctx.frame.scope().uri, uri);
        if glob {
            let uris = match self.loader.glob(&resolved) {
                Ok(uris) => uris,
                Err(failure) => return Err(self.io_err(&failure, true, span)),
            };
            let mut entries = Vec::with_capacity(uris.len());
            for matched in uris {
                let value = self.load_module(&matched, span)?;
                entries.push((Value::Str(matched), value));
            }
            return Ok(self.stdlib.make_mapping(entries));
        }
        match self.load_module(&resolved, span) {
            Ok(value) => Ok(value),
            Err(e) if nullable && e.kind.is_recoverable_io() => Ok(Value::Null),
            Err(e) => Err(e),
        }
    }

    fn eval_read(&mut self, uri: &str, glob: bool, nullable: bool, ctx: &Ctx, span: Span) -> EvalResult<Value> {
        let resolved = resolve_uri(&ctx.frame.scope().uri, uri);
        if glob {
            let matches = match self.reader.glob(&resolved) {
                Ok(matches) => matches,
                Err(failure) => return Err(self.io_err(&failure, false, span)),
            };
            let entries = matches
                .into_iter()
                .map(|(uri, resource)| (Value::Str(uri), resource_value(resource)))
                .collect();
            return Ok(self.stdlib.make_mapping(entries));
        }
        match self.reader.read(&resolved) {
            Ok(resource) => Ok(resource_value(resource)),
            Err(failure) => {
                if nullable {
                    Ok(Value::Null)
                } else {
                    Err(self.io_err(&failure, false, span))
                }
            }
        }
    }
}

// ----------------------------------------------------------------------
// free helpers
// ----------------------------------------------------------------------

fn literal_value(lit: &Literal) -> Value {
    match lit {
        Literal::Null => Value::Null,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Int(i) => Value::Int(*i),
        Literal::Float(f) => Value::Float(*f),
        Literal::Str(s) => Value::Str(Rc::clone(s)),
    }
}

fn negate(n: Number) -> Number {
    match n {
        Number::Int(i) => Number::Int(i.wrapping_neg()),
        Number::Float(f) => Number::Float(-f),
    }
}

fn duration_add(a: Duration, b: Duration, subtract: bool) -> Duration {
    let b_in_a = b.seconds() / a.unit.factor();
    let sum = if subtract {
        a.value.as_f64() - b_in_a
    } else {
        a.value.as_f64() + b_in_a
    };
    Duration::new(Number::Float(sum), a.unit)
}

fn data_size_add(a: DataSize, b: DataSize, subtract: bool) -> DataSize {
    let b_in_a = b.bytes() / a.unit.factor();
    let sum = if subtract {
        a.value.as_f64() - b_in_a
    } else {
        a.value.as_f64() + b_in_a
    };
    DataSize::new(Number::Float(sum), a.unit)
}

fn op_symbol(op: BinOp) -> &'static str {
    match op {
        BinOp::Pow => "**",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::IntDiv => "~/",
        BinOp::Rem => "%",
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Lt => "<",
        BinOp::Gt => ">",
        BinOp::Le => "<=",
        BinOp::Ge => ">=",
        BinOp::Eq => "==",
        BinOp::Ne => "!=",
        BinOp::And => "&&",
        BinOp::Or => "||",
        BinOp::Pipe => "|>",
        BinOp::NullCoalesce => "??",
    }
}

fn has_index_member(obj: &Rc<VmObject>, index: i64) -> bool {
    let mut cur = Rc::clone(obj);
    loop {
        if cur.get_member(&MemberKey::Index(index)).is_some() {
            return true;
        }
        match cur.parent_object().cloned() {
            Some(parent) => cur = parent,
            None => return false,
        }
    }
}

fn resource_value(resource: Resource) -> Value {
    match resource {
        Resource::Text(text) => Value::Str(text),
        Resource::Bytes(bytes) => Value::Bytes(bytes),
    }
}

/// Strips the closing-delimiter indent from every line of a multi-line
/// string and drops the delimiter-adjacent blank first and last lines.
#[must_use]
pub(crate) fn strip_common_indent(text: &str, indent: usize) -> String {
    let mut lines: Vec<&str> = text.split('\n').collect();
    if lines.first().is_some_and(|l| l.trim().is_empty()) {
        lines.remove(0);
    }
    if lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
    let stripped: Vec<&str> = lines
        .iter()
        .map(|line| {
            let boundary = line
                .char_indices()
                .take(indent)
                .take_while(|(_, c)| *c == ' ' || *c == '\t')
                .count();
            &line[boundary..]
        })
        .collect();
    stripped.join("\n")
}
