//! Call Dispatch Module
//!
//! Entry point for inbound calls and the registry of business handlers they
//! are routed to.

pub mod dispatcher;
pub mod handlers;

pub use dispatcher::{
    AlertKind, CallError, CallPhase, CallResponse, Dispatcher, DispatcherParts, InboundCall,
    OperationalAlert, LOGIN_OPERATION, LOGOUT_OPERATION,
};
pub use handlers::{
    handler_fn, FnHandler, HandlerContext, HandlerError, HandlerRegistry, HandlerRegistryBuilder,
    OperationHandler,
};
