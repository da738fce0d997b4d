use std::collections::BTreeSet;
use std::marker::PhantomData;

use serde::Serialize;

use crate::command::descriptor::{
    AllowedOnSecondary, Command, CommandMetrics, ReadWriteType, NO_API_VERSIONS,
};
use crate::command::invocation::{
    CommandInvocation, ReadConcernLevel, ReadConcernSupportResult,
};
use crate::context::{OperationContext, ServiceContext};
use crate::core::{Document, Namespace, Result};
use crate::rpc::{CommandRequest, ReplyBuilder};

/// A parsed, typed request body.
///
/// Implement this for a struct holding the command's arguments, and the
/// typed adapter takes care of everything else.
pub trait TypedRequest: Sized + Send + Sync + 'static {
    /// The canonical command name.
    const COMMAND_NAME: &'static str;

    /// Parses the typed request out of the decoded envelope. `name` is the
    /// name the command was invoked under, for error messages.
    fn parse(name: &str, request: &CommandRequest) -> Result<Self>;

    /// The namespace this request targets.
    fn ns(&self) -> Namespace;
}

/// Definition of a typed command: a request type, a response type, and a
/// compute function, plus optional policy overrides.
///
/// The adapter synthesizes the descriptor and the invocation from this
/// definition through generics, so the typed path carries no dynamic
/// dispatch of its own:
///
/// - a `Response` of `()` produces a pass-fail command whose reply carries
///   nothing beyond the ok field;
/// - any other `Response` must serialize to an object, whose fields become
///   the reply body verbatim.
pub trait TypedCommandDef: Send + Sync + Sized + 'static {
    type Request: TypedRequest;
    type Response: Serialize + Send;

    /// The command's compute function.
    fn typed_run(opctx: &OperationContext, request: &Self::Request) -> Result<Self::Response>;

    /// The command's authorization policy.
    fn do_check_authorization(opctx: &OperationContext, request: &Self::Request) -> Result<()>;

    fn aliases() -> &'static [&'static str] {
        &[]
    }

    fn secondary_allowed(_context: &ServiceContext) -> AllowedOnSecondary {
        AllowedOnSecondary::Never
    }

    fn admin_only() -> bool {
        false
    }

    fn requires_auth() -> bool {
        true
    }

    fn api_versions() -> &'static BTreeSet<String> {
        &NO_API_VERSIONS
    }

    fn deprecated_api_versions() -> &'static BTreeSet<String> {
        &NO_API_VERSIONS
    }

    fn supports_document_sequences() -> bool {
        false
    }

    fn sensitive_field_name() -> Option<&'static str> {
        None
    }

    fn read_write_type() -> ReadWriteType {
        ReadWriteType::Command
    }

    fn help() -> String {
        "no help defined".to_string()
    }

    fn supports_write_concern(_request: &Self::Request) -> bool {
        false
    }

    fn supports_read_concern(
        _request: &Self::Request,
        level: ReadConcernLevel,
    ) -> ReadConcernSupportResult {
        ReadConcernSupportResult::local_only(level)
    }

    fn supports_read_mirroring(_request: &Self::Request) -> bool {
        false
    }

    fn append_mirrorable_request(_request: &Self::Request, _out: &mut Document) {
        unreachable!(
            "append_mirrorable_request on '{}', which does not support read mirroring",
            Self::Request::COMMAND_NAME
        );
    }
}

/// The descriptor synthesized from a [`TypedCommandDef`]. Register one of
/// these per typed command.
pub struct TypedCommand<D: TypedCommandDef> {
    metrics: CommandMetrics,
    _def: PhantomData<D>,
}

impl<D: TypedCommandDef> TypedCommand<D> {
    pub fn new() -> Self {
        Self {
            metrics: CommandMetrics::new(),
            _def: PhantomData,
        }
    }

    /// Convenience for registration.
    pub fn boxed() -> Box<dyn Command> {
        Box::new(Self::new())
    }
}

impl<D: TypedCommandDef> Default for TypedCommand<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: TypedCommandDef> Command for TypedCommand<D> {
    fn name(&self) -> &str {
        D::Request::COMMAND_NAME
    }

    fn aliases(&self) -> &[&str] {
        D::aliases()
    }

    fn metrics(&self) -> &CommandMetrics {
        &self.metrics
    }

    fn parse(
        &'static self,
        _opctx: &OperationContext,
        request: &CommandRequest,
    ) -> Result<Box<dyn CommandInvocation>> {
        let parsed = D::Request::parse(self.name(), request)?;
        Ok(Box::new(TypedInvocation::<D> {
            definition: self,
            request: parsed,
        }))
    }

    fn admin_only(&self) -> bool {
        D::admin_only()
    }

    fn secondary_allowed(&self, context: &ServiceContext) -> AllowedOnSecondary {
        D::secondary_allowed(context)
    }

    fn api_versions(&self) -> &BTreeSet<String> {
        D::api_versions()
    }

    fn deprecated_api_versions(&self) -> &BTreeSet<String> {
        D::deprecated_api_versions()
    }

    fn requires_auth(&self) -> bool {
        D::requires_auth()
    }

    fn help(&self) -> String {
        D::help()
    }

    fn sensitive_field_name(&self) -> Option<&'static str> {
        D::sensitive_field_name()
    }

    fn supports_document_sequences(&self) -> bool {
        D::supports_document_sequences()
    }

    fn read_write_type(&self) -> ReadWriteType {
        D::read_write_type()
    }
}

/// The invocation synthesized for a typed command: the parsed request plus
/// the definition back-reference.
pub struct TypedInvocation<D: TypedCommandDef> {
    definition: &'static TypedCommand<D>,
    request: D::Request,
}

impl<D: TypedCommandDef> TypedInvocation<D> {
    pub fn request(&self) -> &D::Request {
        &self.request
    }
}

impl<D: TypedCommandDef> CommandInvocation for TypedInvocation<D> {
    fn definition(&self) -> &'static dyn Command {
        self.definition
    }

    fn run(&mut self, opctx: &OperationContext, reply: &mut ReplyBuilder) -> Result<()> {
        let response = D::typed_run(opctx, &self.request)?;
        reply.fill_from(&response)
    }

    fn ns(&self) -> Namespace {
        self.request.ns()
    }

    fn supports_write_concern(&self) -> bool {
        D::supports_write_concern(&self.request)
    }

    fn supports_read_concern(&self, level: ReadConcernLevel) -> ReadConcernSupportResult {
        D::supports_read_concern(&self.request, level)
    }

    fn supports_read_mirroring(&self) -> bool {
        D::supports_read_mirroring(&self.request)
    }

    fn append_mirrorable_request(&self, out: &mut Document) {
        D::append_mirrorable_request(&self.request, out)
    }

    fn do_check_authorization(&self, opctx: &OperationContext) -> Result<()> {
        D::do_check_authorization(opctx, &self.request)
    }
}
