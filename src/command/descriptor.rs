use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

use lazy_static::lazy_static;

use crate::command::invocation::{CommandInvocation, Verbosity};
use crate::context::{OperationContext, ServiceContext};
use crate::core::{Document, Result};
use crate::rpc::CommandRequest;

lazy_static! {
    /// The version set for commands outside any stable API.
    pub static ref NO_API_VERSIONS: BTreeSet<String> = BTreeSet::new();

    /// The version set for commands in stable API version 1.
    pub static ref API_VERSIONS_1: BTreeSet<String> =
        BTreeSet::from(["1".to_string()]);
}

/// Whether a command may run on a secondary replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowedOnSecondary {
    Always,
    Never,
    OptIn,
}

/// Whether an operation counts as a read, a write, a plain command, or a
/// multi-document transaction for the aggregate counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadWriteType {
    Command,
    Read,
    Write,
    Transaction,
}

/// Per-command execution counters. Monotonic for the process lifetime and
/// safe to bump from any number of concurrent requests.
#[derive(Debug, Default)]
pub struct CommandMetrics {
    executed: AtomicU64,
    failed: AtomicU64,
}

impl CommandMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_executed(&self) {
        self.executed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn executed(&self) -> u64 {
        self.executed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Static definition of one command kind: its identity, its policy
/// attributes, and the parser that turns a request into an invocation.
///
/// One instance exists per command name for the lifetime of the process.
/// Instances are built during startup, registered into a
/// [`CommandRegistry`](crate::command::CommandRegistry), and dropped only
/// at process exit; the registry hands them out as `&'static` references
/// and every invocation keeps such a reference as its definition.
pub trait Command: Send + Sync {
    /// The canonical name. Never changes for the lifetime of the command.
    fn name(&self) -> &str;

    /// Old or alternative names this command also answers to.
    fn aliases(&self) -> &[&str] {
        &[]
    }

    /// The executed/failed counters for this command kind.
    fn metrics(&self) -> &CommandMetrics;

    /// Builds an invocation from a decoded request.
    ///
    /// Must be total over well-formed requests for this command and raise a
    /// structured parse error for malformed ones. Must not perform I/O,
    /// authorization, or side effects beyond allocation.
    fn parse(
        &'static self,
        opctx: &OperationContext,
        request: &CommandRequest,
    ) -> Result<Box<dyn CommandInvocation>>;

    /// Parser used on the explain path. Commands with a distinct explain
    /// grammar override this; everything else parses as usual.
    fn parse_for_explain(
        &'static self,
        opctx: &OperationContext,
        request: &CommandRequest,
        _verbosity: Option<Verbosity>,
    ) -> Result<Box<dyn CommandInvocation>> {
        self.parse(opctx, request)
    }

    /// True if only the admin database may run this command.
    fn admin_only(&self) -> bool {
        false
    }

    /// Stricter than `admin_only`: without access control the command must
    /// arrive over a local interface. Only valid when `admin_only` is also
    /// true; the registry enforces that at registration.
    fn local_host_only_if_no_auth(&self) -> bool {
        false
    }

    /// Secondary-execution policy, resolved against the service context.
    fn secondary_allowed(&self, context: &ServiceContext) -> AllowedOnSecondary;

    /// Stable API versions that include this command.
    fn api_versions(&self) -> &BTreeSet<String> {
        &NO_API_VERSIONS
    }

    /// Stable API versions in which this command is deprecated. Must be a
    /// subset of `api_versions`; the registry enforces that at
    /// registration.
    fn deprecated_api_versions(&self) -> &BTreeSet<String> {
        &NO_API_VERSIONS
    }

    /// Some commands accept any apiVersion parameter values at all.
    fn accepts_any_api_version_parameters(&self) -> bool {
        false
    }

    /// False if the aggregate operation counters should not be bumped on
    /// behalf of this command.
    fn should_affect_command_counter(&self) -> bool {
        true
    }

    fn should_affect_read_concern_counter(&self) -> bool {
        false
    }

    fn collects_resource_consumption_metrics(&self) -> bool {
        false
    }

    /// True if the command requires an authenticated client.
    fn requires_auth(&self) -> bool {
        true
    }

    fn help(&self) -> String {
        "no help defined".to_string()
    }

    /// A field name to strip from this command's documents before they are
    /// logged or audited.
    fn sensitive_field_name(&self) -> Option<&'static str> {
        None
    }

    /// Redacts a command document in place to a form suitable for logging.
    /// The default removes the sensitive field, if any.
    fn snip_for_logging(&self, cmd: &mut Document) {
        if let Some(field) = self.sensitive_field_name() {
            cmd.remove(field);
        }
    }

    /// Whether requests for this command may carry document sequences.
    fn supports_document_sequences(&self) -> bool {
        false
    }

    fn read_write_type(&self) -> ReadWriteType {
        ReadWriteType::Command
    }

    /// True if a secondary should become unreadable while running this.
    fn maintenance_mode(&self) -> bool {
        false
    }

    /// True if this command is permitted while a secondary is unreadable.
    fn maintenance_ok(&self) -> bool {
        true
    }

    /// Whether a failed authorization check for this command is audited.
    fn audit_authorization_failure(&self) -> bool {
        true
    }
}

/// Checks whether a command is also known by `alias`.
pub fn has_alias(command: &dyn Command, alias: &str) -> bool {
    command.aliases().iter().any(|a| *a == alias)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_version_sets() {
        assert!(NO_API_VERSIONS.is_empty());
        assert!(API_VERSIONS_1.contains("1"));
    }

    #[test]
    fn test_metrics_are_monotonic() {
        let metrics = CommandMetrics::new();
        metrics.increment_executed();
        metrics.increment_executed();
        metrics.increment_failed();
        assert_eq!(metrics.executed(), 2);
        assert_eq!(metrics.failed(), 1);
    }
}
