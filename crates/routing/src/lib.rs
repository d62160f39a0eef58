//! Routing: map an inbound message's context to an agent id through a fixed
//! priority chain. Bindings are immutable after construction, so resolution
//! is lock-free and safe for concurrent callers.

pub mod resolver;

pub use resolver::{Binding, BindingStore, ResolveParams, Resolver};
