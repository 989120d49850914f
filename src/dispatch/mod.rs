//! Dispatch registry for bots and skills
//!
//! Node code registers callables directly or through a [`RouterGroup`]; the
//! tool bridge registers proxies for remote tools. External callers invoke
//! everything by name.

mod callable;
mod registry;
mod router;

pub use callable::{
    Callable, CallableDefinition, CallableInfo, CallableKind, CallableOptions, Handler,
    HandlerFuture, Invocation, handler, validate_name,
};
pub use registry::DispatchRegistry;
pub use router::RouterGroup;
