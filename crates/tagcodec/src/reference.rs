//! # Backend References
//!
//! Handles to objects that live inside a backend scope. They are never copied
//! onto the wire; only their names are.
//!
//! ## Wire Format
//!
//! - Body: `!scope::Body [scope_id, body_name]`
//! - Link: `!scope::Body::Link [scope_id, body_name, link_name]`
//!
//! Encoding reads the names off the handle. Decoding needs a `Resolver` and
//! fails with `Error::UnresolvedReference` at the first lookup that misses.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use tagpack::Node;
use tagpack::Tag;

use crate::error::Error;
use crate::error::Result;
use crate::resolve::Resolver;
use crate::resolve::Scope;
use crate::resolve::ScopeId;
use crate::tags;
use crate::value::Value;

/// A live body owned by a backend scope.
///
/// Two handles are equal when they name the same body in the same scope and
/// point at the same live allocation.
#[derive(Clone)]
pub struct Body {
    scope: ScopeId,
    name: Arc<str>,
    object: Arc<dyn Any + Send + Sync>,
}

impl Body {
    pub fn new(scope: ScopeId, name: &str, object: Arc<dyn Any + Send + Sync>) -> Self {
        Self { scope, name: name.into(), object }
    }

    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The backend's own representation of the body.
    pub fn object(&self) -> &Arc<dyn Any + Send + Sync> {
        &self.object
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.object.downcast_ref::<T>()
    }
}

impl PartialEq for Body {
    fn eq(&self, other: &Self) -> bool {
        self.scope == other.scope
            && self.name == other.name
            && std::ptr::addr_eq(Arc::as_ptr(&self.object), Arc::as_ptr(&other.object))
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Body")
            .field("scope", &self.scope)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// A named part of a live body.
#[derive(Clone)]
pub struct Link {
    body: Body,
    name: Arc<str>,
    object: Arc<dyn Any + Send + Sync>,
}

impl Link {
    pub fn new(body: Body, name: &str, object: Arc<dyn Any + Send + Sync>) -> Self {
        Self { body, name: name.into(), object }
    }

    /// The body this link belongs to.
    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn object(&self) -> &Arc<dyn Any + Send + Sync> {
        &self.object
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.object.downcast_ref::<T>()
    }
}

impl PartialEq for Link {
    fn eq(&self, other: &Self) -> bool {
        self.body == other.body
            && self.name == other.name
            && std::ptr::addr_eq(Arc::as_ptr(&self.object), Arc::as_ptr(&other.object))
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("body", &self.body)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

// ============================================================================
//  ENCODING
// ============================================================================

pub(crate) fn encode_body(body: &Body) -> Result<Node> {
    Ok(Node::seq(vec![
        scope_node(&tags::BODY, body.scope)?,
        Node::str(body.name()),
    ]))
}

pub(crate) fn encode_link(link: &Link) -> Result<Node> {
    let body = link.body();
    Ok(Node::seq(vec![
        scope_node(&tags::LINK, body.scope)?,
        Node::str(body.name()),
        Node::str(link.name()),
    ]))
}

fn scope_node(tag: &Tag, scope: ScopeId) -> Result<Node> {
    i64::try_from(scope.0)
        .map(Node::Int)
        .map_err(|_| Error::malformed(tag, format!("{} does not fit the wire", scope)))
}

// ============================================================================
//  DECODING
// ============================================================================

pub(crate) fn decode_body(node: &Node, resolver: &dyn Resolver) -> Result<Value> {
    let items = reference_items(node, &tags::BODY, 2, "[scope, body]")?;
    let scope = read_scope(&tags::BODY, &items[0])?;
    let body_name = read_name(&tags::BODY, &items[1])?;
    Ok(Value::object(resolve_body(resolver, scope, body_name)?))
}

pub(crate) fn decode_link(node: &Node, resolver: &dyn Resolver) -> Result<Value> {
    let items = reference_items(node, &tags::LINK, 3, "[scope, body, link]")?;
    let scope = read_scope(&tags::LINK, &items[0])?;
    let body_name = read_name(&tags::LINK, &items[1])?;
    let link_name = read_name(&tags::LINK, &items[2])?;
    Ok(Value::object(resolve_link(resolver, scope, body_name, link_name)?))
}

/// Resolves a body by scope id and name.
pub fn resolve_body(resolver: &dyn Resolver, scope: ScopeId, body_name: &str) -> Result<Body> {
    let env = lookup_scope(resolver, scope)?;
    find_body(env.as_ref(), scope, body_name)
}

/// Resolves a link by scope id, body name and link name.
pub fn resolve_link(resolver: &dyn Resolver, scope: ScopeId, body_name: &str, link_name: &str) -> Result<Link> {
    let env = lookup_scope(resolver, scope)?;
    let body = find_body(env.as_ref(), scope, body_name)?;
    env.lookup_link(&body, link_name).ok_or_else(|| Error::UnresolvedReference {
        scope,
        path: vec![body_name.to_string(), link_name.to_string()],
    })
}

fn lookup_scope(resolver: &dyn Resolver, scope: ScopeId) -> Result<Arc<dyn Scope>> {
    resolver
        .lookup_scope(scope)
        .ok_or(Error::UnresolvedReference { scope, path: Vec::new() })
}

fn find_body(env: &dyn Scope, scope: ScopeId, body_name: &str) -> Result<Body> {
    env.lookup_body(body_name).ok_or_else(|| Error::UnresolvedReference {
        scope,
        path: vec![body_name.to_string()],
    })
}

fn reference_items<'a>(node: &'a Node, tag: &Tag, arity: usize, format: &str) -> Result<&'a [Node]> {
    match node.as_seq() {
        Some(items) if items.len() == arity => Ok(items),
        _ => Err(Error::malformed(tag, format!("expected {}", format))),
    }
}

fn read_scope(tag: &Tag, node: &Node) -> Result<ScopeId> {
    node.as_i64()
        .and_then(|id| u64::try_from(id).ok())
        .map(ScopeId)
        .ok_or_else(|| Error::malformed(tag, "scope id must be a non-negative integer"))
}

fn read_name<'a>(tag: &Tag, node: &'a Node) -> Result<&'a str> {
    node.as_str().ok_or_else(|| Error::malformed(tag, "names must be strings"))
}
