//! # In-Memory Runtime
//!
//! A small `Backend` that keeps everything in process: environments full of
//! named bodies, and module factories keyed by name.
//!
//! Uses DashMap for concurrent access without global locking, so modules
//! may add bodies while another thread decodes references into them.

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use tagcodec::Body;
use tagcodec::Link;
use tagcodec::Resolver;
use tagcodec::Scope;
use tagcodec::ScopeId;
use tracing::debug;

use crate::transport::Backend;
use crate::transport::Module;

type ModuleFactory = dyn Fn(ScopeId) -> Box<dyn Module> + Send + Sync;

/// Owns environments and knows how to build modules.
pub struct Runtime {
    environments: DashMap<ScopeId, Arc<Environment>>,
    modules: DashMap<String, Arc<ModuleFactory>>,
    next_scope_id: AtomicU64,
}

impl Runtime {
    pub fn new() -> Self {
        Self {
            environments: DashMap::new(),
            modules: DashMap::new(),
            next_scope_id: AtomicU64::new(1),
        }
    }

    /// Creates an empty environment with a fresh id.
    pub fn create_environment(&self) -> Arc<Environment> {
        let id = ScopeId(self.next_scope_id.fetch_add(1, Ordering::Relaxed));
        let env = Arc::new(Environment::new(id));
        self.environments.insert(id, env.clone());
        debug!(scope = %id, "environment created");
        env
    }

    /// Removes an environment. References into it stop resolving.
    pub fn destroy_environment(&self, id: ScopeId) -> Option<Arc<Environment>> {
        let removed = self.environments.remove(&id).map(|(_, env)| env);
        if removed.is_some() {
            debug!(scope = %id, "environment destroyed");
        }
        removed
    }

    pub fn environment(&self, id: ScopeId) -> Option<Arc<Environment>> {
        self.environments.get(&id).map(|env| env.value().clone())
    }

    /// Makes a module loadable by name. Replaces any earlier factory.
    pub fn register_module<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn(ScopeId) -> Box<dyn Module> + Send + Sync + 'static,
    {
        self.modules.insert(name.into(), Arc::new(factory));
    }

    /// Names of the loadable modules.
    pub fn module_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.modules.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolver for Runtime {
    fn lookup_scope(&self, id: ScopeId) -> Option<Arc<dyn Scope>> {
        let env: Arc<dyn Scope> = self.environment(id)?;
        Some(env)
    }
}

impl Backend for Runtime {
    fn create_module(&self, scope: ScopeId, name: &str) -> Option<Box<dyn Module>> {
        // clone out so the factory runs without holding the shard lock
        let factory = self.modules.get(name)?.value().clone();
        Some(factory(scope))
    }
}

/// Backend-side state of a body.
#[derive(Debug)]
pub struct BodyState {
    pub name: String,
}

/// Backend-side state of a link.
#[derive(Debug)]
pub struct LinkState {
    pub body: String,
    pub name: String,
}

/// A scope holding named bodies and their links.
pub struct Environment {
    id: ScopeId,
    bodies: DashMap<String, Body>,
    links: DashMap<(String, String), Link>,
}

impl Environment {
    fn new(id: ScopeId) -> Self {
        Self {
            id,
            bodies: DashMap::new(),
            links: DashMap::new(),
        }
    }

    /// Adds a body with the given links, replacing any body of the same name.
    pub fn add_body(&self, name: &str, links: &[&str]) -> Body {
        self.remove_body(name);

        let body = Body::new(self.id, name, Arc::new(BodyState { name: name.to_string() }));
        for link in links {
            let state = LinkState { body: name.to_string(), name: link.to_string() };
            let handle = Link::new(body.clone(), link, Arc::new(state));
            self.links.insert((name.to_string(), link.to_string()), handle);
        }
        self.bodies.insert(name.to_string(), body.clone());
        body
    }

    /// Removes a body and its links.
    pub fn remove_body(&self, name: &str) -> Option<Body> {
        let (_, body) = self.bodies.remove(name)?;
        self.links.retain(|(owner, _), _| owner != name);
        Some(body)
    }

    /// Body names in sorted order.
    pub fn body_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.bodies.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }
}

impl Scope for Environment {
    fn id(&self) -> ScopeId {
        self.id
    }

    fn lookup_body(&self, name: &str) -> Option<Body> {
        self.bodies.get(name).map(|body| body.value().clone())
    }

    fn lookup_link(&self, body: &Body, name: &str) -> Option<Link> {
        let link = self.links.get(&(body.name().to_string(), name.to_string()))?;
        // a stale handle to a replaced body must not reach the new body's links
        (link.body() == body).then(|| link.value().clone())
    }
}
