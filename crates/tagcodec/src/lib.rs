//! # TagCodec
//!
//! A tag-driven serialization registry on top of `tagpack`.
//!
//! ## Philosophy
//!
//! Plain data (null, booleans, numbers, strings, lists, maps) needs no
//! registration and round-trips structurally. Everything else is an `Object`
//! whose runtime type selects an encoder, and comes back through whatever
//! decoder is registered for the tag it was written under.
//!
//! Some objects cannot be rebuilt from bytes at all. A `Body` or `Link` is a
//! handle to live backend state, so it is written as a name path and decoded
//! by looking that path up through a `Resolver`. A name that no longer exists
//! is an error, never a silent `Null`.
//!
//! ## Usage
//!
//! ```ignore
//! let registry = Registry::with_builtins();
//! let node = registry.encode(&Value::from(Transform::IDENTITY))?;
//! let text = tagpack::to_text(&node);
//! let back = registry.decode(&tagpack::from_text(&text)?, &NoResolver)?;
//! ```

mod array;
mod error;
mod reference;
mod registry;
mod resolve;
mod value;

#[cfg(test)]
mod tests;

pub use array::Array;
pub use array::Transform;
pub use error::Error;
pub use error::Result;
pub use reference::Body;
pub use reference::Link;
pub use reference::resolve_body;
pub use reference::resolve_link;
pub use registry::ChildrenFn;
pub use registry::Decoder;
pub use registry::RawFn;
pub use registry::Registry;
pub use resolve::NoResolver;
pub use resolve::Resolver;
pub use resolve::Scope;
pub use resolve::ScopeId;
pub use value::Object;
pub use value::Value;

pub use tagpack::Node;
pub use tagpack::Tag;

/// Wire tags of the built-in types.
pub mod tags {
    use tagpack::Tag;

    /// Dense numeric array of any rank.
    pub const ARRAY: Tag = Tag::from_static("ndarray");
    /// 4×4 spatial transform.
    pub const TRANSFORM: Tag = Tag::from_static("Transform");
    /// Body in a backend scope.
    pub const BODY: Tag = Tag::from_static("scope::Body");
    /// Link of a body in a backend scope.
    pub const LINK: Tag = Tag::from_static("scope::Body::Link");
}
