pub mod basic;
pub mod descriptor;
pub mod helpers;
pub mod hooks;
pub mod invocation;
pub mod registry;
pub mod typed;

pub use basic::{BasicCommand, BasicCommandAdapter};
pub use descriptor::{
    has_alias, AllowedOnSecondary, Command, CommandMetrics, ReadWriteType, API_VERSIONS_1,
    NO_API_VERSIONS,
};
pub use helpers::{
    execute_request, execute_request_async, run_command_directly, run_command_invocation,
    run_command_invocation_async,
};
pub use hooks::CommandInvocationHooks;
pub use invocation::{
    check_authorization, CommandInvocation, ReadConcernLevel, ReadConcernSupportResult, Verbosity,
};
pub use registry::{global_registry, CommandRegistry};
pub use typed::{TypedCommand, TypedCommandDef, TypedInvocation, TypedRequest};
