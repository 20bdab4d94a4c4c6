//! Host interfaces for fetching modules and resources.
//!
//! Transport, scheme allow-listing, and file-root confinement are the
//! host's concern; the evaluator only asks for a module's CST by URI or a
//! resource's contents. Relative URIs are resolved against the requesting
//! module's URI before the loader sees them.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::ast::ModuleCst;

/// A loader or reader failure, surfaced as `ioError` (or
/// `cannotFindModuleImport` for missing modules).
#[derive(Debug, Clone)]
pub struct IoFailure {
    /// Human-readable reason.
    pub message: String,
    /// Whether the URI simply did not resolve to anything (not-found
    /// rather than a transport failure).
    pub not_found: bool,
}

impl IoFailure {
    /// A not-found failure.
    #[must_use]
    pub fn not_found(uri: &str) -> Self {
        Self {
            message: format!("cannot find `{uri}`"),
            not_found: true,
        }
    }

    /// A transport-level failure.
    #[must_use]
    pub fn other(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            not_found: false,
        }
    }
}

/// Fetches parsed modules by canonical URI.
pub trait ModuleLoader {
    /// Loads the module at `uri`.
    fn load(&mut self, uri: &str) -> Result<Rc<ModuleCst>, IoFailure>;

    /// Expands a glob pattern to the matching module URIs, in a stable
    /// order chosen by the host (typically lexicographic).
    fn glob(&mut self, pattern: &str) -> Result<Vec<Rc<str>>, IoFailure> {
        let _ = pattern;
        Err(IoFailure::other("module loader does not support globbing"))
    }
}

/// A resource fetched by [`ResourceReader::read`].
#[derive(Debug, Clone)]
pub enum Resource {
    Text(Rc<str>),
    Bytes(Rc<[u8]>),
}

/// Fetches external resources by URI.
pub trait ResourceReader {
    /// Reads the resource at `uri`.
    fn read(&mut self, uri: &str) -> Result<Resource, IoFailure>;

    /// Expands a glob pattern to `(uri, resource)` pairs, in a stable
    /// order chosen by the host.
    fn glob(&mut self, pattern: &str) -> Result<Vec<(Rc<str>, Resource)>, IoFailure> {
        let _ = pattern;
        Err(IoFailure::other("resource reader does not support globbing"))
    }
}

/// Loader that refuses every request. The default for evaluations that
/// must not touch the outside world.
#[derive(Debug, Default)]
pub struct NoModuleLoader;

impl ModuleLoader for NoModuleLoader {
    fn load(&mut self, uri: &str) -> Result<Rc<ModuleCst>, IoFailure> {
        Err(IoFailure::not_found(uri))
    }
}

/// Reader that refuses every request.
#[derive(Debug, Default)]
pub struct NoResourceReader;

impl ResourceReader for NoResourceReader {
    fn read(&mut self, uri: &str) -> Result<Resource, IoFailure> {
        Err(IoFailure::not_found(uri))
    }
}

/// In-memory module loader keyed by exact URI; glob patterns match with
/// `*` wildcards against the registered URIs in insertion order.
#[derive(Debug, Default)]
pub struct InMemoryModuleLoader {
    modules: IndexMap<Rc<str>, Rc<ModuleCst>>,
}

impl InMemoryModuleLoader {
    /// Creates an empty loader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a module under its URI.
    pub fn add(&mut self, cst: Rc<ModuleCst>) {
        self.modules.insert(Rc::clone(&cst.uri), cst);
    }
}

impl ModuleLoader for InMemoryModuleLoader {
    fn load(&mut self, uri: &str) -> Result<Rc<ModuleCst>, IoFailure> {
        self.modules.get(uri).cloned().ok_or_else(|| IoFailure::not_found(uri))
    }

    fn glob(&mut self, pattern: &str) -> Result<Vec<Rc<str>>, IoFailure> {
        Ok(self
            .modules
            .keys()
            .filter(|uri| glob_match(pattern, uri))
            .cloned()
            .collect())
    }
}

/// In-memory resource reader keyed by exact URI.
#[derive(Debug, Default)]
pub struct InMemoryResourceReader {
    resources: IndexMap<Rc<str>, Resource>,
}

impl InMemoryResourceReader {
    /// Creates an empty reader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a text resource.
    pub fn add_text(&mut self, uri: impl Into<Rc<str>>, text: impl Into<Rc<str>>) {
        self.resources.insert(uri.into(), Resource::Text(text.into()));
    }

    /// Registers a binary resource.
    pub fn add_bytes(&mut self, uri: impl Into<Rc<str>>, bytes: impl Into<Rc<[u8]>>) {
        self.resources.insert(uri.into(), Resource::Bytes(bytes.into()));
    }
}

impl ResourceReader for InMemoryResourceReader {
    fn read(&mut self, uri: &str) -> Result<Resource, IoFailure> {
        self.resources.get(uri).cloned().ok_or_else(|| IoFailure::not_found(uri))
    }

    fn glob(&mut self, pattern: &str) -> Result<Vec<(Rc<str>, Resource)>, IoFailure> {
        Ok(self
            .resources
            .iter()
            .filter(|(uri, _)| glob_match(pattern, uri))
            .map(|(uri, res)| (Rc::clone(uri), res.clone()))
            .collect())
    }
}

/// Minimal `*` glob matching, sufficient for the in-memory hosts.
fn glob_match(pattern: &str, input: &str) -> bool {
    fn inner(p: &[u8], s: &[u8]) -> bool {
        match (p.first(), s.first()) {
            (None, None) => true,
            (Some(b'*'), _) => inner(&p[1..], s) || (!s.is_empty() && inner(p, &s[1..])),
            (Some(pc), Some(sc)) if pc == sc => inner(&p[1..], &s[1..]),
            _ => false,
        }
    }
    inner(pattern.as_bytes(), input.as_bytes())
}

/// Whether a URI reference starts with a scheme (`scheme:`).
fn has_scheme(reference: &str) -> bool {
    let Some((scheme, _)) = reference.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '.' | '-'))
}

/// Resolves a possibly relative URI against a base module URI.
///
/// URIs with a scheme are taken as-is; absolute paths replace the base
/// path; everything else resolves against the base's parent, collapsing
/// `.` and `..` segments.
#[must_use]
pub fn resolve_uri(base: &str, reference: &str) -> String {
    if has_scheme(reference) {
        return reference.to_owned();
    }
    let (scheme, base_path) = match base.find("://") {
        Some(pos) => (&base[..pos + 3], &base[pos + 3..]),
        None => ("", base),
    };
    if reference.starts_with('/') {
        return format!("{scheme}{reference}");
    }
    let mut segments: Vec<&str> = base_path.split('/').collect();
    segments.pop();
    for segment in reference.split('/') {
        match segment {
            "." | "" => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    format!("{scheme}{}", segments.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_uri_resolution() {
        assert_eq!(resolve_uri("file:///a/b/mod.pkl", "other.pkl"), "file:///a/b/other.pkl");
        assert_eq!(resolve_uri("file:///a/b/mod.pkl", "../up.pkl"), "file:///a/up.pkl");
        assert_eq!(resolve_uri("file:///a/b/mod.pkl", "pkl:base"), "pkl:base");
        assert_eq!(
            resolve_uri("file:///a/b/mod.pkl", "https://x/y.pkl"),
            "https://x/y.pkl"
        );
    }

    #[test]
    fn glob_matching() {
        assert!(glob_match("*.pkl", "a.pkl"));
        assert!(glob_match("dir/*.pkl", "dir/a.pkl"));
        assert!(!glob_match("dir/*.pkl", "other/a.pkl"));
    }
}
