use async_trait::async_trait;

use crate::command::descriptor::Command;
use crate::command::helpers::audit_log_auth_event;
use crate::context::OperationContext;
use crate::core::{DbError, Document, Namespace, Result};
use crate::rpc::{CommandRequest, ReplyBuilder};

/// Explain verbosity, in increasing order of detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    QueryPlanner,
    ExecutionStats,
    AllPlansExecution,
}

/// Caller-requested read isolation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadConcernLevel {
    Local,
    Available,
    Majority,
    Linearizable,
    Snapshot,
}

impl ReadConcernLevel {
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "local" => Ok(Self::Local),
            "available" => Ok(Self::Available),
            "majority" => Ok(Self::Majority),
            "linearizable" => Ok(Self::Linearizable),
            "snapshot" => Ok(Self::Snapshot),
            other => Err(DbError::FailedToParse(format!(
                "unknown read concern level '{}'",
                other
            ))),
        }
    }
}

/// Two independent verdicts on an invocation's read-concern support: is the
/// requested level accepted at all, and may the default (unspecified) read
/// concern be applied. A field of `None` means permitted.
#[derive(Debug, Clone)]
pub struct ReadConcernSupportResult {
    pub read_concern: Option<DbError>,
    pub default_read_concern: Option<DbError>,
}

impl ReadConcernSupportResult {
    /// Both verdicts permitted.
    pub fn supported() -> Self {
        Self {
            read_concern: None,
            default_read_concern: None,
        }
    }

    /// The conservative default: only local reads, no default read concern.
    pub fn local_only(level: ReadConcernLevel) -> Self {
        Self {
            read_concern: (level != ReadConcernLevel::Local).then(|| {
                DbError::InvalidOptions("read concern not supported".to_string())
            }),
            default_read_concern: Some(DbError::InvalidOptions(
                "default read concern not permitted".to_string(),
            )),
        }
    }

    pub fn permits_read_concern(&self) -> bool {
        self.read_concern.is_none()
    }

    pub fn permits_default_read_concern(&self) -> bool {
        self.default_read_concern.is_none()
    }

    /// The first failing verdict, if any.
    pub fn check(&self) -> Result<()> {
        if let Some(err) = &self.read_concern {
            return Err(err.clone());
        }
        if let Some(err) = &self.default_read_concern {
            return Err(err.clone());
        }
        Ok(())
    }
}

/// A single in-flight, parsed instance of a command request.
///
/// Invocations are created by [`Command::parse`], run at most once, and
/// dropped when the request completes or is abandoned. They are never
/// shared between requests. The definition reference never changes and the
/// descriptor it points to outlives every invocation.
#[async_trait]
pub trait CommandInvocation: Send + Sync {
    /// The command definition this invocation runs.
    fn definition(&self) -> &'static dyn Command;

    /// Runs the command synchronously on the calling thread, writing its
    /// outcome into the reply.
    ///
    /// Failure is indicated by returning an error (preferred); the pipeline
    /// discards any partially written reply content in that case. A return
    /// without an explicit ok field is treated as success and patched up by
    /// the pipeline.
    fn run(&mut self, opctx: &OperationContext, reply: &mut ReplyBuilder) -> Result<()>;

    /// Asynchronous counterpart of `run`.
    ///
    /// The default executes `run` on the caller and resolves immediately,
    /// so every command is usable on the async path for free. Commands that
    /// suspend on I/O override this to avoid blocking their caller.
    async fn run_async(
        &mut self,
        opctx: &OperationContext,
        reply: &mut ReplyBuilder,
    ) -> Result<()> {
        self.run(opctx, reply)
    }

    /// Explains the command instead of running it. Unsupported unless
    /// overridden; overriding only makes sense for commands that execute as
    /// a plan-stage tree and honor the verbosity protocol.
    fn explain(
        &mut self,
        _opctx: &OperationContext,
        _verbosity: Verbosity,
        _reply: &mut ReplyBuilder,
    ) -> Result<()> {
        Err(DbError::IllegalOperation(format!(
            "Cannot explain cmd: {}",
            self.definition().name()
        )))
    }

    /// The primary namespace this invocation targets, derived from parsed
    /// state. May be just the database.
    fn ns(&self) -> Namespace;

    /// Whether this invocation should be checked for a writeConcern field
    /// and wait for that write concern after running.
    fn supports_write_concern(&self) -> bool;

    /// This invocation's read-concern verdicts for the given level.
    fn supports_read_concern(&self, level: ReadConcernLevel) -> ReadConcernSupportResult {
        ReadConcernSupportResult::local_only(level)
    }

    fn allows_after_cluster_time(&self) -> bool {
        true
    }

    fn can_ignore_prepare_conflicts(&self) -> bool {
        false
    }

    /// Whether this read may be mirrored to secondaries for cache warming.
    /// Must return true before `append_mirrorable_request` is ever called.
    fn supports_read_mirroring(&self) -> bool {
        false
    }

    /// Appends a form of this request safe to mirror to secondaries.
    ///
    /// Calling this on an invocation that does not support read mirroring
    /// is a programming error, not a recoverable failure.
    fn append_mirrorable_request(&self, _request: &mut Document) {
        unreachable!(
            "append_mirrorable_request on '{}', which does not support read mirroring",
            self.definition().name()
        );
    }

    /// Per-command authorization policy. Called exactly once per
    /// invocation, through [`check_authorization`].
    fn do_check_authorization(&self, opctx: &OperationContext) -> Result<()>;
}

/// The uniform authorization boundary wrapped around every invocation.
///
/// Applies the checks shared by all commands (admin-only namespace,
/// authentication, localhost restriction), then delegates to the
/// command-specific `do_check_authorization`, and emits one audit record
/// for the decision either way.
pub fn check_authorization(
    invocation: &dyn CommandInvocation,
    opctx: &OperationContext,
    request: &CommandRequest,
) -> Result<()> {
    let definition = invocation.definition();
    let decision = authorization_decision(invocation, definition, opctx, request);
    match &decision {
        Ok(()) => audit_log_auth_event(opctx, Some(invocation), request, 0),
        Err(err) => {
            if definition.audit_authorization_failure() {
                audit_log_auth_event(opctx, Some(invocation), request, err.code());
            }
        }
    }
    decision
}

fn authorization_decision(
    invocation: &dyn CommandInvocation,
    definition: &'static dyn Command,
    opctx: &OperationContext,
    request: &CommandRequest,
) -> Result<()> {
    if definition.admin_only() && request.database() != "admin" {
        return Err(DbError::Unauthorized(format!(
            "{} may only be run against the admin database",
            definition.name()
        )));
    }
    let session = opctx.auth_session();
    if session.enabled() {
        if definition.requires_auth() && !session.is_authenticated() {
            return Err(DbError::Unauthorized(format!(
                "command {} requires authentication",
                definition.name()
            )));
        }
        invocation.do_check_authorization(opctx)
    } else {
        if definition.local_host_only_if_no_auth() && !opctx.client().is_local() {
            return Err(DbError::Unauthorized(format!(
                "{} must run from a local interface when access control is disabled",
                definition.name()
            )));
        }
        Ok(())
    }
}
