use crate::command::descriptor::{AllowedOnSecondary, Command, CommandMetrics, ReadWriteType};
use crate::command::helpers;
use crate::command::invocation::{
    CommandInvocation, ReadConcernLevel, ReadConcernSupportResult,
};
use crate::context::{OperationContext, ServiceContext};
use crate::core::{Document, Namespace, Result};
use crate::rpc::{CommandRequest, ReplyBuilder};

/// The legacy document-in/document-out command form.
///
/// A basic command sees the raw command document and writes its result
/// fields itself. Failure may be reported either by returning an error
/// (preferred) or by the old convention of returning `Ok(false)` after
/// placing an `errmsg` field in the result. New commands should use the
/// typed adapter instead; this form exists for forwarded and legacy
/// commands.
pub trait BasicCommand: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn aliases(&self) -> &[&str] {
        &[]
    }

    fn help(&self) -> String {
        "no help defined".to_string()
    }

    fn admin_only(&self) -> bool {
        false
    }

    fn requires_auth(&self) -> bool {
        true
    }

    fn secondary_allowed(&self, _context: &ServiceContext) -> AllowedOnSecondary {
        AllowedOnSecondary::Never
    }

    fn read_write_type(&self) -> ReadWriteType {
        ReadWriteType::Command
    }

    /// Namespace derivation, defaulting to the first-field convention.
    fn parse_ns(&self, db: &str, cmd: &Document) -> Namespace {
        helpers::parse_ns_from_command(db, cmd)
    }

    /// Doc-based write-concern eligibility: support may depend on the
    /// command's argument values.
    fn supports_write_concern(&self, _cmd: &Document) -> bool {
        false
    }

    fn supports_read_concern(
        &self,
        _cmd: &Document,
        level: ReadConcernLevel,
    ) -> ReadConcernSupportResult {
        ReadConcernSupportResult::local_only(level)
    }

    fn check_auth_for_operation(
        &self,
        opctx: &OperationContext,
        db: &str,
        cmd: &Document,
    ) -> Result<()>;

    /// Runs the command, appending result fields. `Ok(true)` is success;
    /// `Ok(false)` is the legacy explicit-failure convention.
    fn run(
        &self,
        opctx: &OperationContext,
        db: &str,
        cmd: &Document,
        result: &mut Document,
    ) -> Result<bool>;
}

/// Wraps a [`BasicCommand`] into a conforming descriptor.
pub struct BasicCommandAdapter<B: BasicCommand> {
    inner: B,
    metrics: CommandMetrics,
}

impl<B: BasicCommand> BasicCommandAdapter<B> {
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            metrics: CommandMetrics::new(),
        }
    }

    pub fn boxed(inner: B) -> Box<dyn Command> {
        Box::new(Self::new(inner))
    }
}

impl<B: BasicCommand> Command for BasicCommandAdapter<B> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn aliases(&self) -> &[&str] {
        self.inner.aliases()
    }

    fn metrics(&self) -> &CommandMetrics {
        &self.metrics
    }

    fn parse(
        &'static self,
        _opctx: &OperationContext,
        request: &CommandRequest,
    ) -> Result<Box<dyn CommandInvocation>> {
        Ok(Box::new(BasicInvocation {
            definition: self,
            ns: self.inner.parse_ns(request.database(), request.body()),
            db: request.database().to_string(),
            cmd: request.body().clone(),
        }))
    }

    fn admin_only(&self) -> bool {
        self.inner.admin_only()
    }

    fn secondary_allowed(&self, context: &ServiceContext) -> AllowedOnSecondary {
        self.inner.secondary_allowed(context)
    }

    fn requires_auth(&self) -> bool {
        self.inner.requires_auth()
    }

    fn help(&self) -> String {
        self.inner.help()
    }

    fn read_write_type(&self) -> ReadWriteType {
        self.inner.read_write_type()
    }
}

struct BasicInvocation<B: BasicCommand> {
    definition: &'static BasicCommandAdapter<B>,
    ns: Namespace,
    db: String,
    cmd: Document,
}

impl<B: BasicCommand> CommandInvocation for BasicInvocation<B> {
    fn definition(&self) -> &'static dyn Command {
        self.definition
    }

    fn run(&mut self, opctx: &OperationContext, reply: &mut ReplyBuilder) -> Result<()> {
        let mut result = Document::new();
        let ok = self
            .definition
            .inner
            .run(opctx, &self.db, &self.cmd, &mut result)?;
        for (name, value) in result.iter() {
            reply.append(name, value.clone());
        }
        if !ok {
            helpers::append_simple_command_status(reply.body_mut(), false, "command failed");
        }
        Ok(())
    }

    fn ns(&self) -> Namespace {
        self.ns.clone()
    }

    fn supports_write_concern(&self) -> bool {
        self.definition.inner.supports_write_concern(&self.cmd)
    }

    fn supports_read_concern(&self, level: ReadConcernLevel) -> ReadConcernSupportResult {
        self.definition.inner.supports_read_concern(&self.cmd, level)
    }

    fn do_check_authorization(&self, opctx: &OperationContext) -> Result<()> {
        self.definition
            .inner
            .check_auth_for_operation(opctx, &self.db, &self.cmd)
    }
}
