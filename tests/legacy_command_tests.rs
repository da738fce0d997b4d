/// Legacy command form tests
///
/// Document-in/document-out commands report failure either by raising or
/// by the old explicit errmsg/ok convention; both must land in the same
/// reply shape and counters. Run with: cargo test --test legacy_command_tests

use std::sync::Arc;

use serde_json::json;

use rustdocdb::auth::AuthDisabledSession;
use rustdocdb::command::{execute_request, BasicCommand, BasicCommandAdapter, CommandRegistry};
use rustdocdb::{CommandRequest, Document, OperationContext, Result, ServiceContext};

/// A stats-style legacy command. `{"fail": true}` triggers the explicit
/// failure convention instead of raising.
struct LegacyStatsCommand;

impl BasicCommand for LegacyStatsCommand {
    fn name(&self) -> &str {
        "legacyStats"
    }

    fn check_auth_for_operation(
        &self,
        _opctx: &OperationContext,
        _db: &str,
        _cmd: &Document,
    ) -> Result<()> {
        Ok(())
    }

    fn supports_write_concern(&self, cmd: &Document) -> bool {
        // Doc-dependent eligibility: only the flush sub-mode writes.
        cmd.get("flush").is_some_and(|v| v.as_bool().unwrap_or(false))
    }

    fn run(
        &self,
        _opctx: &OperationContext,
        _db: &str,
        cmd: &Document,
        result: &mut Document,
    ) -> Result<bool> {
        if cmd.get("fail").is_some_and(|v| v.as_bool().unwrap_or(false)) {
            result.append("errmsg", "collection not found");
            return Ok(false);
        }
        result.append("size", 42);
        result.append("count", 3);
        Ok(true)
    }
}

fn harness() -> (CommandRegistry, OperationContext) {
    let registry = CommandRegistry::new();
    registry.register(BasicCommandAdapter::boxed(LegacyStatsCommand));
    let service = Arc::new(ServiceContext::default());
    let opctx = OperationContext::new(service, Arc::new(AuthDisabledSession));
    (registry, opctx)
}

#[test]
fn test_legacy_success_keeps_result_fields() {
    let (registry, opctx) = harness();
    let command = registry.find_command("legacyStats").unwrap();

    let request = CommandRequest::new("app", Document::new().with("legacyStats", "orders"));
    let reply = execute_request(&opctx, &registry, &request);

    assert_eq!(reply.get("size"), Some(&json!(42)));
    assert_eq!(reply.get("count"), Some(&json!(3)));
    assert_eq!(reply.get("ok"), Some(&json!(1.0)));
    assert_eq!(command.metrics().executed(), 1);
    assert_eq!(command.metrics().failed(), 0);
}

#[test]
fn test_legacy_explicit_failure_counts_as_failed() {
    let (registry, opctx) = harness();
    let command = registry.find_command("legacyStats").unwrap();

    let request = CommandRequest::new(
        "app",
        Document::new().with("legacyStats", "orders").with("fail", true),
    );
    let reply = execute_request(&opctx, &registry, &request);

    assert_eq!(reply.get("ok"), Some(&json!(0.0)));
    assert_eq!(reply.get("errmsg"), Some(&json!("collection not found")));
    // The command did run, and its explicit ok:0 still counts as a failure.
    assert_eq!(command.metrics().executed(), 1);
    assert_eq!(command.metrics().failed(), 1);
}

#[test]
fn test_legacy_namespace_follows_first_field() {
    let (registry, opctx) = harness();
    let command = registry.find_command("legacyStats").unwrap();

    let request = CommandRequest::new("app", Document::new().with("legacyStats", "orders"));
    let invocation = command.parse(&opctx, &request).unwrap();
    assert_eq!(invocation.ns().full_name(), "app.orders");

    let request = CommandRequest::new("app", Document::new().with("legacyStats", 1));
    let invocation = command.parse(&opctx, &request).unwrap();
    assert_eq!(invocation.ns().full_name(), "app");
}

#[test]
fn test_legacy_write_concern_eligibility_depends_on_arguments() {
    let (registry, opctx) = harness();

    let request = CommandRequest::new(
        "app",
        Document::new()
            .with("legacyStats", "orders")
            .with("writeConcern", json!({"w": 1})),
    );
    let reply = execute_request(&opctx, &registry, &request);
    assert_eq!(reply.get("code"), Some(&json!(72)));

    let request = CommandRequest::new(
        "app",
        Document::new()
            .with("legacyStats", "orders")
            .with("flush", true)
            .with("writeConcern", json!({"w": 1})),
    );
    let reply = execute_request(&opctx, &registry, &request);
    assert_eq!(reply.get("ok"), Some(&json!(1.0)));
}
