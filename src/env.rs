//! Namespaced environments used for identifier resolution during
//! typechecking and evaluation.
//!
//! An environment is an immutable, persistent stack of frames. Prepending a
//! binding is O(1) and shares the tail with the original (the frames are
//! reference-counted), so scopes can be forked freely while typechecking
//! nested sections. Newer bindings shadow older ones with the same name.
//!
//! Names may be namespaced with dots (`ns.inner.x`); namespaces are always
//! written with a trailing dot. An `EmptyNamespace` frame records a namespace
//! that exists but currently has no bindings (e.g. a call with no outputs).

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// A single name bound to a value, with optional caller-supplied metadata.
///
/// `T` is typically a `Type` (type environments) or `Value` (value
/// environments).
#[derive(Debug, Clone, PartialEq)]
pub struct Binding<T> {
    name: String,
    value: T,
    info: Option<String>,
}

impl<T> Binding<T> {
    pub fn new(name: String, value: T, info: Option<String>) -> Self {
        Self { name, value, info }
    }

    /// The bound name; dot-separated if namespaced.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn info(&self) -> Option<&String> {
        self.info.as_ref()
    }
}

impl<T: fmt::Display> fmt::Display for Binding<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.name, self.value)
    }
}

#[derive(Debug)]
enum Frame<T> {
    Bind(Binding<T>),
    /// A namespace (with trailing dot) known to exist but without bindings.
    EmptyNamespace(String),
}

#[derive(Debug)]
struct Node<T> {
    frame: Frame<T>,
    next: Option<Arc<Node<T>>>,
}

/// Persistent environment of [`Binding`]s.
#[derive(Debug)]
pub struct Bindings<T> {
    head: Option<Arc<Node<T>>>,
}

impl<T> Clone for Bindings<T> {
    fn clone(&self) -> Self {
        Self {
            head: self.head.clone(),
        }
    }
}

impl<T> Default for Bindings<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Bindings<T> {
    pub fn new() -> Self {
        Self { head: None }
    }

    fn push(&self, frame: Frame<T>) -> Self {
        Self {
            head: Some(Arc::new(Node {
                frame,
                next: self.head.clone(),
            })),
        }
    }

    /// Return a new environment with `name` bound to `value`, shadowing any
    /// previous binding of the same name.
    pub fn bind(&self, name: String, value: T, info: Option<String>) -> Self {
        assert!(
            !name.is_empty() && !name.starts_with('.') && !name.ends_with('.'),
            "malformed binding name: {:?}",
            name
        );
        self.push(Frame::Bind(Binding::new(name, value, info)))
    }

    /// Record that namespace `ns` exists even if nothing is bound under it.
    pub fn with_empty_namespace(&self, ns: &str) -> Self {
        let ns = ensure_trailing_dot(ns);
        self.push(Frame::EmptyNamespace(ns))
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Number of distinct (unshadowed) bindings.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Find the newest binding of `name`.
    pub fn resolve_binding(&self, name: &str) -> Option<&Binding<T>> {
        self.iter().find(|b| b.name() == name)
    }

    pub fn resolve(&self, name: &str) -> Option<&T> {
        self.resolve_binding(name).map(|b| b.value())
    }

    pub fn has_binding(&self, name: &str) -> bool {
        self.resolve_binding(name).is_some()
    }

    pub fn get<'a>(&'a self, name: &str, default: Option<&'a T>) -> Option<&'a T> {
        self.resolve(name).or(default)
    }

    /// All namespaces (trailing-dot prefixes) present, whether from bound
    /// names or from `EmptyNamespace` frames. A binding `a.b.c` contributes
    /// `a.` and `a.b.`.
    pub fn namespaces(&self) -> HashSet<String> {
        let mut out = HashSet::new();
        let mut node = self.head.as_deref();
        while let Some(n) = node {
            match &n.frame {
                Frame::Bind(b) => {
                    let parts: Vec<&str> = b.name().split('.').collect();
                    for i in 1..parts.len() {
                        out.insert(parts[..i].join(".") + ".");
                    }
                }
                Frame::EmptyNamespace(ns) => {
                    let parts: Vec<&str> = ns.trim_end_matches('.').split('.').collect();
                    for i in 1..=parts.len() {
                        out.insert(parts[..i].join(".") + ".");
                    }
                }
            }
            node = n.next.as_deref();
        }
        out
    }

    pub fn has_namespace(&self, ns: &str) -> bool {
        self.namespaces().contains(&ensure_trailing_dot(ns))
    }

    /// Newest-first iterator over distinct bindings (shadowed frames and
    /// empty-namespace markers are skipped).
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            node: self.head.as_deref(),
            seen: HashSet::new(),
        }
    }
}

impl<T: Clone> Bindings<T> {
    /// Transform each binding with `f`, dropping those mapped to `None`.
    /// Relative order is preserved; empty-namespace frames carry over.
    pub fn map<U, F>(&self, f: F) -> Bindings<U>
    where
        U: Clone,
        F: Fn(&Binding<T>) -> Option<Binding<U>>,
    {
        let mut mapped: Vec<Frame<U>> = Vec::new();
        let mut seen = HashSet::new();
        let mut node = self.head.as_deref();
        while let Some(n) = node {
            match &n.frame {
                Frame::Bind(b) => {
                    if seen.insert(b.name().to_string()) {
                        if let Some(m) = f(b) {
                            mapped.push(Frame::Bind(m));
                        }
                    }
                }
                Frame::EmptyNamespace(ns) => mapped.push(Frame::EmptyNamespace(ns.clone())),
            }
            node = n.next.as_deref();
        }
        let mut out = Bindings::new();
        for frame in mapped.into_iter().rev() {
            out = out.push(frame);
        }
        out
    }

    pub fn filter<F>(&self, pred: F) -> Self
    where
        F: Fn(&Binding<T>) -> bool,
    {
        self.map(|b| if pred(b) { Some(b.clone()) } else { None })
    }

    /// Drop every binding whose name is also bound in `other`.
    pub fn subtract<U: Clone>(&self, other: &Bindings<U>) -> Self {
        self.filter(|b| !other.has_binding(b.name()))
    }

    /// Restrict to bindings under `ns`, stripping the namespace prefix.
    pub fn enter_namespace(&self, ns: &str) -> Self {
        let ns = ensure_trailing_dot(ns);
        self.map(|b| {
            b.name().strip_prefix(&ns).map(|rest| {
                Binding::new(rest.to_string(), b.value().clone(), b.info().cloned())
            })
        })
    }

    /// Prefix every binding name with `ns`.
    pub fn wrap_namespace(&self, ns: &str) -> Self {
        let ns = ensure_trailing_dot(ns);
        let wrapped = self.map(|b| {
            Some(Binding::new(
                format!("{}{}", ns, b.name()),
                b.value().clone(),
                b.info().cloned(),
            ))
        });
        if wrapped.is_empty() {
            wrapped.with_empty_namespace(&ns)
        } else {
            wrapped
        }
    }
}

fn ensure_trailing_dot(ns: &str) -> String {
    if ns.ends_with('.') {
        ns.to_string()
    } else {
        format!("{}.", ns)
    }
}

pub struct Iter<'a, T> {
    node: Option<&'a Node<T>>,
    seen: HashSet<String>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a Binding<T>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(n) = self.node {
            self.node = n.next.as_deref();
            if let Frame::Bind(b) = &n.frame {
                if self.seen.insert(b.name().to_string()) {
                    return Some(b);
                }
            }
        }
        None
    }
}

impl<T: PartialEq> PartialEq for Bindings<T> {
    fn eq(&self, other: &Self) -> bool {
        let a: Vec<&Binding<T>> = self.iter().collect();
        let b: Vec<&Binding<T>> = other.iter().collect();
        a.len() == b.len()
            && a.iter()
                .zip(b.iter())
                .all(|(x, y)| x.name() == y.name() && x.value() == y.value())
    }
}

/// Merge environments left to right; on a name collision the leftmost
/// environment wins.
pub fn merge<T: Clone>(envs: &[&Bindings<T>]) -> Bindings<T> {
    let mut out = match envs.last() {
        Some(last) => (*last).clone(),
        None => return Bindings::new(),
    };
    for env in envs.iter().rev().skip(1) {
        for b in env.iter().collect::<Vec<_>>().into_iter().rev() {
            out = out.bind(b.name().to_string(), b.value().clone(), b.info().cloned());
        }
    }
    out
}
