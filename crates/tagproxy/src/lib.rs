//! # TagProxy
//!
//! Invokes named commands on a backend module over a single text channel,
//! with arguments and results carried as tagged wire text.
//!
//! - `proxy`: the client side, bound to one module.
//! - `host`: a module built from node-to-node command handlers.
//! - `runtime`: an in-process backend with environments and module factories.
//! - `transport`: the `Module` and `Backend` seams between them.

pub mod host;
pub mod proxy;
pub mod runtime;
pub mod transport;

pub use proxy::Args;
pub use proxy::Error;
pub use proxy::Proxy;
pub use proxy::ProxyBuilder;
pub use proxy::Result;
