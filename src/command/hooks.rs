use async_trait::async_trait;

use crate::command::invocation::CommandInvocation;
use crate::context::OperationContext;
use crate::rpc::CommandRequest;

/// Pre/post observers wrapped around every invocation on the external
/// request path. Not applied to `run_command_directly` or to raw
/// `CommandInvocation::run` calls.
///
/// Installed through
/// [`ServiceContext::set_invocation_hooks`](crate::context::ServiceContext::set_invocation_hooks);
/// at most one hook set is active at a time.
#[async_trait]
pub trait CommandInvocationHooks: Send + Sync {
    fn on_before_run(
        &self,
        opctx: &OperationContext,
        request: &CommandRequest,
        invocation: &dyn CommandInvocation,
    );

    fn on_after_run(
        &self,
        opctx: &OperationContext,
        request: &CommandRequest,
        invocation: &dyn CommandInvocation,
    );

    /// Async-path variant, defaulting to `on_before_run`.
    async fn on_before_async_run(
        &self,
        opctx: &OperationContext,
        request: &CommandRequest,
        invocation: &dyn CommandInvocation,
    ) {
        self.on_before_run(opctx, request, invocation);
    }

    /// Async-path variant, defaulting to `on_after_run`.
    async fn on_after_async_run(
        &self,
        opctx: &OperationContext,
        request: &CommandRequest,
        invocation: &dyn CommandInvocation,
    ) {
        self.on_after_run(opctx, request, invocation);
    }
}
