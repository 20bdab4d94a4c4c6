//! The renderer-facing value surface.
//!
//! Renderers receive the forced value tree: [`ValueView`] enumerates an
//! object's class name and its visible (public, non-hidden, non-local)
//! members in insertion order. The crate ships one minimal Pcf renderer
//! that backs `output.text`; full renderers live outside the crate and
//! implement [`Renderer`].

use std::rc::Rc;

use crate::{
    ast::Span,
    error::{ErrorKind, EvalResult},
    eval::Evaluator,
    io::TraceWriter,
    member::MemberKey,
    object::ObjKind,
    resource::ResourceTracker,
    value::{Value, format_float},
};

/// A shallow, forced view of an object for renderers.
#[derive(Debug)]
pub struct ValueView {
    /// The object's class qualified name.
    pub class_name: Rc<str>,
    /// Public non-hidden properties, in insertion order.
    pub properties: Vec<(Rc<str>, Value)>,
    /// Indexed elements, in order.
    pub elements: Vec<Value>,
    /// Keyed entries, in insertion order.
    pub entries: Vec<(Value, Value)>,
}

impl<T: ResourceTracker, W: TraceWriter> Evaluator<'_, T, W> {
    /// Builds the renderer-facing view of an object value, forcing its
    /// visible members.
    pub fn view(&mut self, value: &Value) -> EvalResult<ValueView> {
        let Some(obj) = value.as_object() else {
            return Err(self.err(
                ErrorKind::CannotRenderValue,
                format!("a value of type {} has no member view", value.type_name()),
                Span::none(),
            ));
        };
        let obj = Rc::clone(obj);
        let mut view = ValueView {
            class_name: Rc::clone(&obj.class.qualified_name),
            properties: Vec::new(),
            elements: Vec::new(),
            entries: Vec::new(),
        };
        for key in obj.effective_keys() {
            if let Some((_, member)) = obj.find_member(&key)
                && (member.modifiers.is_hidden() || member.is_method())
            {
                continue;
            }
            let forced = self.read_member(value, &key, Span::none())?;
            match key {
                MemberKey::Prop(name) => {
                    let name: Rc<str> = Rc::from(self.interner.resolve(name));
                    view.properties.push((name, forced));
                }
                MemberKey::Index(_) => view.elements.push(forced),
                MemberKey::Entry(entry_key) => view.entries.push((entry_key, forced)),
            }
        }
        Ok(view)
    }

    /// Renders a value with the crate's minimal Pcf renderer.
    pub fn render_pcf(&mut self, value: &Value) -> EvalResult<String> {
        render_module_text(self, value, Span::none())
    }
}

/// An external renderer for forced value trees.
pub trait Renderer<T: ResourceTracker, W: TraceWriter> {
    /// Renders `value` (typically a module's `output.value`). Renderer
    /// constraints surface as `cannotRenderValue` errors.
    fn render(&mut self, eval: &mut Evaluator<'_, T, W>, value: &Value) -> EvalResult<String>;
}

/// The built-in minimal Pcf renderer.
#[derive(Debug, Default)]
pub struct PcfRenderer;

impl<T: ResourceTracker, W: TraceWriter> Renderer<T, W> for PcfRenderer {
    fn render(&mut self, eval: &mut Evaluator<'_, T, W>, value: &Value) -> EvalResult<String> {
        render_module_text(eval, value, Span::none())
    }
}

/// Document form: the top-level members without an enclosing block.
pub(crate) fn render_module_text<T: ResourceTracker, W: TraceWriter>(
    eval: &mut Evaluator<'_, T, W>,
    value: &Value,
    span: Span,
) -> EvalResult<String> {
    let mut out = String::new();
    if value.as_object().is_some() {
        write_members(eval, &mut out, value, 0, span)?;
    } else {
        write_value(eval, &mut out, value, 0, span)?;
        out.push('\n');
    }
    Ok(out)
}

/// Expression form, used for interpolation and trace output.
pub(crate) fn render_value<T: ResourceTracker, W: TraceWriter>(
    eval: &mut Evaluator<'_, T, W>,
    value: &Value,
    span: Span,
) -> EvalResult<String> {
    let mut out = String::new();
    write_value(eval, &mut out, value, 0, span)?;
    Ok(out)
}

fn indent_str(out: &mut String, indent: usize) {
    for _ in 0..indent {
        out.push_str("  ");
    }
}

fn write_value<T: ResourceTracker, W: TraceWriter>(
    eval: &mut Evaluator<'_, T, W>,
    out: &mut String,
    value: &Value,
    indent: usize,
    span: Span,
) -> EvalResult<()> {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Int(i) => out.push_str(&i.to_string()),
        Value::Float(f) => out.push_str(&format_float(*f)),
        Value::Str(s) => quote_string(out, s),
        Value::Duration(d) => out.push_str(&d.to_string()),
        Value::DataSize(d) => out.push_str(&d.to_string()),
        Value::Bytes(bytes) => {
            out.push_str("Bytes(");
            for (i, byte) in bytes.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(&byte.to_string());
            }
            out.push(')');
        }
        Value::Regex(r) => {
            out.push_str("Regex(");
            quote_string(out, &r.source);
            out.push(')');
        }
        Value::Pair(p) => {
            out.push_str("Pair(");
            write_value(eval, out, &p.first, indent, span)?;
            out.push_str(", ");
            write_value(eval, out, &p.second, indent, span)?;
            out.push(')');
        }
        Value::List(items) => write_call(eval, out, "List", items.iter(), indent, span)?,
        Value::Set(set) => write_call(eval, out, "Set", set.items.iter(), indent, span)?,
        Value::Map(map) => {
            out.push_str("Map(");
            let mut first = true;
            for (k, v) in &map.entries {
                if !first {
                    out.push_str(", ");
                }
                first = false;
                write_value(eval, out, k, indent, span)?;
                out.push_str(", ");
                write_value(eval, out, v, indent, span)?;
            }
            out.push(')');
        }
        Value::Object(obj) => {
            if obj.kind == ObjKind::Typed {
                out.push_str("new ");
                out.push_str(&obj.class.qualified_name);
                out.push(' ');
            } else {
                out.push_str("new ");
                out.push_str(obj.kind.type_name());
                out.push(' ');
            }
            out.push_str("{\n");
            write_members(eval, out, value, indent + 1, span)?;
            indent_str(out, indent);
            out.push('}');
        }
        Value::Function(_) | Value::Class(_) | Value::TypeAlias(_) => {
            return Err(eval.err(
                ErrorKind::CannotRenderValue,
                format!("a value of type {} cannot be rendered", value.type_name()),
                span,
            ));
        }
    }
    Ok(())
}

fn write_call<'a, T: ResourceTracker, W: TraceWriter>(
    eval: &mut Evaluator<'_, T, W>,
    out: &mut String,
    name: &str,
    items: impl Iterator<Item = &'a Value>,
    indent: usize,
    span: Span,
) -> EvalResult<()> {
    out.push_str(name);
    out.push('(');
    for (i, item) in items.enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_value(eval, out, item, indent, span)?;
    }
    out.push(')');
    Ok(())
}

/// One member line per visible member of an object.
fn write_members<T: ResourceTracker, W: TraceWriter>(
    eval: &mut Evaluator<'_, T, W>,
    out: &mut String,
    value: &Value,
    indent: usize,
    span: Span,
) -> EvalResult<()> {
    let view = eval.view(value)?;
    for (name, member_value) in &view.properties {
        indent_str(out, indent);
        out.push_str(name);
        if member_value.as_object().is_some() {
            out.push(' ');
            write_block(eval, out, member_value, indent, span)?;
        } else {
            out.push_str(" = ");
            write_value(eval, out, member_value, indent, span)?;
        }
        out.push('\n');
    }
    for element in &view.elements {
        indent_str(out, indent);
        write_value(eval, out, element, indent, span)?;
        out.push('\n');
    }
    for (key, member_value) in &view.entries {
        indent_str(out, indent);
        out.push('[');
        write_value(eval, out, key, indent, span)?;
        out.push(']');
        if member_value.as_object().is_some() {
            out.push(' ');
            write_block(eval, out, member_value, indent, span)?;
        } else {
            out.push_str(" = ");
            write_value(eval, out, member_value, indent, span)?;
        }
        out.push('\n');
    }
    Ok(())
}

/// A `{ ... }` block for a nested object member, Pcf style.
fn write_block<T: ResourceTracker, W: TraceWriter>(
    eval: &mut Evaluator<'_, T, W>,
    out: &mut String,
    value: &Value,
    indent: usize,
    span: Span,
) -> EvalResult<()> {
    out.push_str("{\n");
    write_members(eval, out, value, indent + 1, span)?;
    indent_str(out, indent);
    out.push('}');
    Ok(())
}

/// Double-quotes a string with the language's escapes.
fn quote_string(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{{{:x}}}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoting_escapes_specials() {
        let mut out = String::new();
        quote_string(&mut out, "a\"b\\c\nd");
        assert_eq!(out, "\"a\\\"b\\\\c\\nd\"");
    }
}
