/// Typed adapter tests
///
/// A typed command supplies a request parser and a compute function; the
/// adapter owes it a conforming descriptor/invocation pair. Run with:
/// cargo test --test typed_command_tests

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;

use rustdocdb::auth::AuthDisabledSession;
use rustdocdb::command::helpers::mirrorable_request;
use rustdocdb::command::{
    execute_request, has_alias, CommandRegistry, TypedCommand, TypedCommandDef, TypedRequest,
    Verbosity,
};
use rustdocdb::{
    CommandRequest, DbError, Document, Namespace, OperationContext, ReplyBuilder, Result,
    ServiceContext,
};

fn harness() -> (CommandRegistry, OperationContext) {
    let registry = CommandRegistry::new();
    let service = Arc::new(ServiceContext::default());
    let opctx = OperationContext::new(service, Arc::new(AuthDisabledSession));
    (registry, opctx)
}

// A pass-fail command: unit response, nothing in the body beyond ok.
struct TouchRequest {
    db: String,
}

impl TypedRequest for TouchRequest {
    const COMMAND_NAME: &'static str = "touch";

    fn parse(_name: &str, request: &CommandRequest) -> Result<Self> {
        Ok(Self {
            db: request.database().to_string(),
        })
    }

    fn ns(&self) -> Namespace {
        Namespace::database(self.db.as_str())
    }
}

struct TouchCommand;

impl TypedCommandDef for TouchCommand {
    type Request = TouchRequest;
    type Response = ();

    fn aliases() -> &'static [&'static str] {
        &["poke"]
    }

    fn typed_run(_opctx: &OperationContext, _request: &TouchRequest) -> Result<()> {
        Ok(())
    }

    fn do_check_authorization(_opctx: &OperationContext, _request: &TouchRequest) -> Result<()> {
        Ok(())
    }
}

// A value-returning command over a collection namespace.
struct TallyRequest {
    ns: Namespace,
    limit: Option<i64>,
}

impl TypedRequest for TallyRequest {
    const COMMAND_NAME: &'static str = "tally";

    fn parse(name: &str, request: &CommandRequest) -> Result<Self> {
        let coll = match request.body().first() {
            Some((_, v)) => v.as_str().ok_or_else(|| {
                DbError::TypeMismatch(format!("{} requires a collection name", name))
            })?,
            None => return Err(DbError::FailedToParse("empty command document".into())),
        };
        let limit = request.body().get("limit").and_then(|v| v.as_i64());
        Ok(Self {
            ns: Namespace::collection(request.database(), coll),
            limit,
        })
    }

    fn ns(&self) -> Namespace {
        self.ns.clone()
    }
}

#[derive(Serialize)]
struct TallyResponse {
    n: i64,
    ns: String,
}

struct TallyCommand;

impl TypedCommandDef for TallyCommand {
    type Request = TallyRequest;
    type Response = TallyResponse;

    fn sensitive_field_name() -> Option<&'static str> {
        Some("token")
    }

    fn typed_run(_opctx: &OperationContext, request: &TallyRequest) -> Result<TallyResponse> {
        Ok(TallyResponse {
            n: request.limit.unwrap_or(0),
            ns: request.ns.full_name(),
        })
    }

    fn do_check_authorization(_opctx: &OperationContext, _request: &TallyRequest) -> Result<()> {
        Ok(())
    }

    fn supports_read_mirroring(_request: &TallyRequest) -> bool {
        true
    }

    fn append_mirrorable_request(request: &TallyRequest, out: &mut Document) {
        out.append("tally", request.ns.coll().unwrap_or_default());
        if let Some(limit) = request.limit {
            out.append("limit", limit);
        }
    }
}

#[test]
fn test_unit_response_yields_bare_ok_reply() {
    let (registry, opctx) = harness();
    registry.register(TypedCommand::<TouchCommand>::boxed());

    let request = CommandRequest::new("app", Document::new().with("touch", 1));
    let reply = execute_request(&opctx, &registry, &request);

    assert_eq!(reply.len(), 1);
    assert_eq!(reply.get("ok"), Some(&json!(1.0)));
}

#[test]
fn test_value_response_serialized_verbatim() {
    let (registry, opctx) = harness();
    registry.register(TypedCommand::<TallyCommand>::boxed());

    let request = CommandRequest::new(
        "app",
        Document::new().with("tally", "orders").with("limit", 25),
    );
    let reply = execute_request(&opctx, &registry, &request);

    assert_eq!(reply.get("n"), Some(&json!(25)));
    assert_eq!(reply.get("ns"), Some(&json!("app.orders")));
    assert_eq!(reply.get("ok"), Some(&json!(1.0)));
}

#[test]
fn test_adapter_exposes_aliases() {
    let (registry, opctx) = harness();
    registry.register(TypedCommand::<TouchCommand>::boxed());

    let command = registry.find_command("poke").unwrap();
    assert_eq!(command.name(), "touch");
    assert!(has_alias(command, "poke"));

    // Invoking under the alias still reaches the same command.
    let request = CommandRequest::new("app", Document::new().with("poke", 1));
    let reply = execute_request(&opctx, &registry, &request);
    assert_eq!(reply.get("ok"), Some(&json!(1.0)));
}

#[test]
fn test_typed_parse_failure_is_a_parse_error() {
    let (registry, opctx) = harness();
    registry.register(TypedCommand::<TallyCommand>::boxed());

    let request = CommandRequest::new("app", Document::new().with("tally", 99));
    let reply = execute_request(&opctx, &registry, &request);

    assert_eq!(reply.get("ok"), Some(&json!(0.0)));
    assert_eq!(reply.get("code"), Some(&json!(14)));
}

#[test]
fn test_invocation_namespace_comes_from_parsed_state() {
    let (registry, opctx) = harness();
    let command = registry.register(TypedCommand::<TallyCommand>::boxed());

    let request = CommandRequest::new("app", Document::new().with("tally", "users"));
    let invocation = command.parse(&opctx, &request).unwrap();
    assert_eq!(invocation.ns().full_name(), "app.users");
}

#[test]
fn test_mirroring_pair() {
    let (registry, opctx) = harness();
    let tally = registry.register(TypedCommand::<TallyCommand>::boxed());
    let touch = registry.register(TypedCommand::<TouchCommand>::boxed());

    let request = CommandRequest::new(
        "app",
        Document::new().with("tally", "orders").with("limit", 5),
    );
    let invocation = tally.parse(&opctx, &request).unwrap();
    let mirrored = mirrorable_request(invocation.as_ref()).unwrap();
    assert_eq!(mirrored.get("tally"), Some(&json!("orders")));
    assert_eq!(mirrored.get("limit"), Some(&json!(5)));

    // Commands without mirroring support yield nothing.
    let request = CommandRequest::new("app", Document::new().with("touch", 1));
    let invocation = touch.parse(&opctx, &request).unwrap();
    assert!(mirrorable_request(invocation.as_ref()).is_none());
}

#[test]
fn test_sensitive_field_redaction() {
    let (registry, _opctx) = harness();
    let command = registry.register(TypedCommand::<TallyCommand>::boxed());

    let mut cmd = Document::new()
        .with("tally", "orders")
        .with("token", "hunter2")
        .with("limit", 1);
    command.snip_for_logging(&mut cmd);

    assert!(!cmd.contains_key("token"));
    assert!(cmd.contains_key("limit"));
}

#[test]
fn test_explain_unsupported_by_default() {
    let (registry, opctx) = harness();
    let command = registry.register(TypedCommand::<TouchCommand>::boxed());

    let request = CommandRequest::new("app", Document::new().with("touch", 1));
    let mut invocation = command.parse(&opctx, &request).unwrap();
    let mut reply = ReplyBuilder::new();
    let err = invocation
        .explain(&opctx, Verbosity::QueryPlanner, &mut reply)
        .unwrap_err();
    assert_eq!(err.code(), 20);
}
