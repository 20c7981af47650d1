//! # Resolution Context
//!
//! The live backend state a decoder may consult. It is handed to every
//! `decode` call and never stored by the registry.

use std::sync::Arc;

use crate::reference::Body;
use crate::reference::Link;

/// Stable identifier of a backend scope, assigned by the backend.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ScopeId(pub u64);

impl std::fmt::Display for ScopeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "scope-{}", self.0)
    }
}

/// Finds live scopes by id.
pub trait Resolver {
    fn lookup_scope(&self, id: ScopeId) -> Option<Arc<dyn Scope>>;
}

/// A backend runtime instance that owns a set of named bodies.
pub trait Scope: Send + Sync {
    fn id(&self) -> ScopeId;

    /// Looks up a body by its stable name.
    fn lookup_body(&self, name: &str) -> Option<Body>;

    /// Looks up a link by name within an already resolved body.
    fn lookup_link(&self, body: &Body, name: &str) -> Option<Link>;
}

/// A resolver with no scopes. Good enough for payloads without references.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoResolver;

impl Resolver for NoResolver {
    fn lookup_scope(&self, _id: ScopeId) -> Option<Arc<dyn Scope>> {
        None
    }
}

impl<R: Resolver + ?Sized> Resolver for Arc<R> {
    fn lookup_scope(&self, id: ScopeId) -> Option<Arc<dyn Scope>> {
        (**self).lookup_scope(id)
    }
}

impl<R: Resolver + ?Sized> Resolver for &R {
    fn lookup_scope(&self, id: ScopeId) -> Option<Arc<dyn Scope>> {
        (**self).lookup_scope(id)
    }
}
