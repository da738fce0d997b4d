// ============================================================================
// RustDocDB Command Dispatch Core
// ============================================================================

//! The command-dispatch core of a document database server: the layer that
//! turns a decoded wire request into a validated, authorized, executed
//! operation and a reply, independent of what any individual command does.
//!
//! Commands are described by a process-lifetime [`Command`] descriptor,
//! looked up through a [`CommandRegistry`], and executed as per-request
//! [`CommandInvocation`]s by the pipeline in [`command::helpers`]. Typed
//! commands get a conforming descriptor/invocation pair for free through
//! [`TypedCommand`].
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//!
//! use rustdocdb::auth::AuthDisabledSession;
//! use rustdocdb::command::{
//!     execute_request, AllowedOnSecondary, CommandRegistry, TypedCommand, TypedCommandDef,
//!     TypedRequest,
//! };
//! use rustdocdb::{CommandRequest, Document, Namespace, OperationContext, Result, ServiceContext};
//!
//! struct PingRequest {
//!     db: String,
//! }
//!
//! impl TypedRequest for PingRequest {
//!     const COMMAND_NAME: &'static str = "ping";
//!
//!     fn parse(_name: &str, request: &CommandRequest) -> Result<Self> {
//!         Ok(Self {
//!             db: request.database().to_string(),
//!         })
//!     }
//!
//!     fn ns(&self) -> Namespace {
//!         Namespace::database(self.db.as_str())
//!     }
//! }
//!
//! struct PingCommand;
//!
//! impl TypedCommandDef for PingCommand {
//!     type Request = PingRequest;
//!     type Response = ();
//!
//!     fn typed_run(_opctx: &OperationContext, _request: &PingRequest) -> Result<()> {
//!         Ok(())
//!     }
//!
//!     fn do_check_authorization(_opctx: &OperationContext, _request: &PingRequest) -> Result<()> {
//!         Ok(())
//!     }
//!
//!     fn secondary_allowed(_context: &ServiceContext) -> AllowedOnSecondary {
//!         AllowedOnSecondary::Always
//!     }
//! }
//!
//! let registry = CommandRegistry::new();
//! registry.register(TypedCommand::<PingCommand>::boxed());
//!
//! let service = Arc::new(ServiceContext::default());
//! let opctx = OperationContext::new(service, Arc::new(AuthDisabledSession));
//! let request = CommandRequest::new("admin", Document::new().with("ping", 1));
//!
//! let reply = execute_request(&opctx, &registry, &request);
//! assert_eq!(reply.get("ok"), Some(&1.0.into()));
//! ```

pub mod auth;
pub mod command;
pub mod context;
pub mod core;
pub mod failpoint;
pub mod rpc;

// Re-export main types for convenience
pub use command::{
    execute_request, execute_request_async, global_registry, AllowedOnSecondary, Command,
    CommandInvocation, CommandInvocationHooks, CommandMetrics, CommandRegistry, ReadConcernLevel,
    ReadWriteType, TypedCommand, TypedCommandDef, TypedRequest,
};
pub use context::{OperationContext, ServiceConfig, ServiceContext};
pub use core::{DbError, Document, Namespace, Result, Value};
pub use rpc::{CommandRequest, DocumentSequence, ReplyBuilder};
