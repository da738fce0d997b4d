//! Stateless orchestration helpers: everything between a decoded request
//! and a finished reply that is not specific to any single command.

use std::time::Duration;

use chrono::Utc;

use crate::auth::{AuthAuditEvent, ResourcePattern};
use crate::command::descriptor::{Command, ReadWriteType};
use crate::command::invocation::{
    check_authorization, CommandInvocation, ReadConcernLevel,
};
use crate::command::registry::CommandRegistry;
use crate::context::OperationContext;
use crate::core::{value_is_truthy, DbError, Document, Namespace, Result, Value};
use crate::failpoint::{FAIL_COMMAND, WAIT_IN_COMMAND_MARK_KILL_ON_CLIENT_DISCONNECT};
use crate::rpc::{CommandRequest, ReplyBuilder};

// ============================================================================
// Namespace parsing
// ============================================================================

/// The namespace a command document addresses: when the first field is a
/// string it names the collection, otherwise the namespace is the bare
/// database.
pub fn parse_ns_from_command(db: &str, cmd: &Document) -> Namespace {
    match cmd.first() {
        Some((_, Value::String(coll))) if !coll.is_empty() => Namespace::collection(db, coll.clone()),
        _ => Namespace::database(db),
    }
}

/// As `parse_ns_from_command`, but the collection part is mandatory.
pub fn parse_ns_collection_required(db: &str, cmd: &Document) -> Result<Namespace> {
    match cmd.first() {
        Some((_, Value::String(coll))) if !coll.is_empty() => {
            Ok(Namespace::collection(db, coll.clone()))
        }
        Some((name, _)) => Err(DbError::InvalidNamespace(format!(
            "invalid collection name specified in '{}'",
            name
        ))),
        None => Err(DbError::InvalidNamespace("empty command document".into())),
    }
}

/// The first field must spell out a full `db.collection` namespace.
pub fn parse_ns_fully_qualified(cmd: &Document) -> Result<Namespace> {
    match cmd.first() {
        Some((_, Value::String(full))) => {
            let ns = Namespace::from_full_name(full)?;
            if ns.is_collection() {
                Ok(ns)
            } else {
                Err(DbError::InvalidNamespace(format!(
                    "'{}' is not a fully qualified namespace",
                    full
                )))
            }
        }
        _ => Err(DbError::InvalidNamespace(
            "expected first field to name a fully qualified namespace".into(),
        )),
    }
}

/// Exact-namespace pattern for a collection namespace, database-wide
/// pattern otherwise.
pub fn resource_pattern_for_namespace(ns: &Namespace) -> ResourcePattern {
    ResourcePattern::for_namespace(ns)
}

// ============================================================================
// Audit and pre-parse gating
// ============================================================================

/// Emits one audit record for an authorization decision.
///
/// With no invocation we are logging about a command pre-parse: the body
/// has not been parsed, the collection part of the namespace is unknown,
/// and the record carries only the request's database.
pub fn audit_log_auth_event(
    opctx: &OperationContext,
    invocation: Option<&dyn CommandInvocation>,
    request: &CommandRequest,
    error_code: i32,
) {
    let namespace = invocation
        .map(|i| i.ns().full_name())
        .unwrap_or_else(|| request.database().to_string());
    opctx.service().audit_sink().record_authorization(AuthAuditEvent {
        at: Utc::now(),
        operation_id: opctx.operation_id(),
        command: request.command_name().to_string(),
        namespace,
        error_code,
    });
}

/// The gate in front of `Command::parse`: callers that could never be
/// authorized are rejected (and audited) before the command gets a chance
/// to parse anything. Returns false when no further auth checks apply.
pub fn should_attempt_parse(
    opctx: &OperationContext,
    command: &dyn Command,
    request: &CommandRequest,
) -> Result<bool> {
    let session = opctx.auth_session();
    if !session.enabled() {
        return Ok(false);
    }
    if command.requires_auth() && !session.is_authenticated() {
        let err = DbError::Unauthorized(format!(
            "command {} requires authentication",
            command.name()
        ));
        audit_log_auth_event(opctx, None, request, err.code());
        return Err(err);
    }
    Ok(true)
}

/// Rejects requests carrying document sequences when the command does not
/// declare support for them.
pub fn assert_no_document_sequences(
    command: &dyn Command,
    request: &CommandRequest,
) -> Result<()> {
    if !command.supports_document_sequences() && !request.sequences().is_empty() {
        return Err(DbError::InvalidOptions(format!(
            "command {} does not support document sequences",
            command.name()
        )));
    }
    Ok(())
}

/// Validates a request's apiVersion parameter against the command's
/// declared version sets.
pub fn check_api_versions(command: &dyn Command, request: &CommandRequest) -> Result<()> {
    let Some(value) = request.body().get("apiVersion") else {
        return Ok(());
    };
    if command.accepts_any_api_version_parameters() {
        return Ok(());
    }
    let Value::String(version) = value else {
        return Err(DbError::TypeMismatch("apiVersion must be a string".into()));
    };
    if !command.api_versions().contains(version) {
        return Err(DbError::ApiVersionError(format!(
            "command {} is not in API version {}",
            command.name(),
            version
        )));
    }
    let deprecation_errors = request
        .body()
        .get("apiDeprecationErrors")
        .is_some_and(value_is_truthy);
    if deprecation_errors && command.deprecated_api_versions().contains(version) {
        return Err(DbError::ApiDeprecationError(format!(
            "command {} is deprecated in API version {}",
            command.name(),
            version
        )));
    }
    Ok(())
}

// ============================================================================
// Reply status helpers
// ============================================================================

/// Sets the errmsg/ok pair in a result document, keeping any fields the
/// command already wrote. Dispatch-side use only; commands should raise.
pub fn append_simple_command_status(result: &mut Document, ok: bool, errmsg: &str) {
    if !ok && !errmsg.is_empty() && !result.contains_key("errmsg") {
        result.append("errmsg", errmsg);
    }
    if !result.contains_key("ok") {
        result.append("ok", if ok { 1.0 } else { 0.0 });
    }
}

/// Adds the status fields of an outcome to a result document. Deprecated
/// in favor of raising; retained for legacy replies. Returns whether the
/// outcome was a success.
pub fn append_command_status_no_throw(result: &mut Document, status: &Result<()>) -> bool {
    match status {
        Ok(()) => extract_or_append_ok(result),
        Err(err) => {
            if !result.contains_key("errmsg") {
                result.append("errmsg", err.message());
            }
            if !result.contains_key("code") {
                result.append("code", err.code());
            }
            if !result.contains_key("ok") {
                result.append("ok", 0.0);
            }
            false
        }
    }
}

/// If an ok field is present, its truthiness decides. Otherwise the
/// absence of failure is success, and the reply is patched to say so.
pub fn extract_or_append_ok(reply: &mut Document) -> bool {
    match reply.get("ok") {
        Some(value) => value_is_truthy(value),
        None => {
            reply.append("ok", 1.0);
            true
        }
    }
}

/// Appends a writeConcernError sub-document to a result.
pub fn append_write_concern_error(
    result: &mut Document,
    code: i32,
    errmsg: &str,
    err_info: Option<Document>,
) {
    let mut wce = Document::new().with("code", code).with("errmsg", errmsg);
    if let Some(info) = err_info {
        wce.append("errInfo", info.into_value());
    }
    result.append("writeConcernError", wce.into_value());
}

// ============================================================================
// Passthrough rewriting
// ============================================================================

// Fields the egress layer appends on its own when a command is forwarded
// to another server role. Stripped on the way out so they don't end up
// duplicated.
const REQUEST_FIELDS_NOT_FORWARDED: &[&str] = &[
    "$audit",
    "$client",
    "$clusterTime",
    "$configServerState",
    "$db",
    "$oplogQueryData",
    "$queryOptions",
    "$replData",
    "autocommit",
    "coordinator",
    "databaseVersion",
    "lsid",
    "maxTimeMS",
    "readConcern",
    "shardVersion",
    "startTransaction",
    "stmtId",
    "txnNumber",
    "writeConcern",
];

// Reply-side fields owned by the local topology, never forwarded back to
// the original caller.
const REPLY_FIELDS_NOT_FORWARDED: &[&str] = &[
    "$clusterTime",
    "$configServerState",
    "$gleStats",
    "$oplogQueryData",
    "$replData",
    "lastCommittedOpTime",
    "operationTime",
];

// Generic arguments that may ride along with any command.
const GENERIC_ARGUMENTS: &[&str] = &[
    "$audit",
    "$client",
    "$clusterTime",
    "$configServerState",
    "$db",
    "$oplogQueryData",
    "$queryOptions",
    "$readPreference",
    "$replData",
    "apiDeprecationErrors",
    "apiStrict",
    "apiVersion",
    "autocommit",
    "coordinator",
    "lsid",
    "maxTimeMS",
    "readConcern",
    "startTransaction",
    "stmtId",
    "txnNumber",
    "writeConcern",
];

/// Rewrites a command document into a form safe to blindly forward to
/// another server role: `$readPreference` moves into a `$queryOptions`
/// sub-document, and generic arguments the egress layer re-adds are
/// stripped.
pub fn filter_command_request_for_passthrough(cmd: &Document) -> Document {
    let mut request = Document::new();
    let mut query_options = Document::new();
    for (name, value) in cmd.iter() {
        if name == "$readPreference" {
            query_options.append("$readPreference", value.clone());
            continue;
        }
        if REQUEST_FIELDS_NOT_FORWARDED.iter().any(|f| *f == name) {
            continue;
        }
        request.append(name, value.clone());
    }
    if !query_options.is_empty() {
        request.append("$queryOptions", query_options.into_value());
    }
    request
}

/// The reverse rewrite for replies headed back to the original caller:
/// local topology fields are stripped and a wrapped read preference is
/// restored to its top-level spot, value untouched.
pub fn filter_command_reply_for_passthrough(reply: &Document) -> Document {
    let mut output = Document::new();
    for (name, value) in reply.iter() {
        if name == "$queryOptions" {
            if let Value::Object(options) = value {
                if let Some(pref) = options.get("$readPreference") {
                    output.append("$readPreference", pref.clone());
                }
            }
            continue;
        }
        if REPLY_FIELDS_NOT_FORWARDED.iter().any(|f| *f == name) {
            continue;
        }
        output.append(name, value.clone());
    }
    output
}

/// Copies the generic arguments of `source` onto `request`, skipping any
/// the request already carries.
pub fn append_passthrough_fields(source: &Document, request: &Document) -> Document {
    let mut out = request.clone();
    for (name, value) in source.iter() {
        if GENERIC_ARGUMENTS.iter().any(|f| *f == name) && !out.contains_key(name) {
            out.append(name, value.clone());
        }
    }
    out
}

/// Returns `cmd` with a majority writeConcern. An existing writeConcern
/// keeps its wtimeout; otherwise `default_wc` supplies the extra fields.
pub fn append_majority_write_concern(cmd: &Document, default_wc: Option<Document>) -> Document {
    let wc = match cmd.get("writeConcern") {
        Some(Value::Object(existing)) => {
            let mut wc = Document::new().with("w", "majority");
            if let Some(wtimeout) = existing.get("wtimeout") {
                wc.append("wtimeout", wtimeout.clone());
            }
            wc
        }
        _ => {
            let mut wc = Document::new().with("w", "majority");
            if let Some(default_wc) = default_wc {
                for (name, value) in default_wc.iter() {
                    if name != "w" {
                        wc.append(name, value.clone());
                    }
                }
            }
            wc
        }
    };
    let mut out = Document::new();
    for (name, value) in cmd.iter() {
        if name != "writeConcern" {
            out.append(name, value.clone());
        }
    }
    out.append("writeConcern", wc.into_value());
    out
}

// ============================================================================
// Help protocol
// ============================================================================

/// True if the request asks for the command's help text instead of a run.
pub fn is_help_request(cmd: &Document) -> bool {
    cmd.get("help").is_some_and(value_is_truthy)
}

pub fn generate_help_response(reply: &mut ReplyBuilder, command: &dyn Command) {
    reply.append(
        "help",
        format!("help for: {} {}", command.name(), command.help()),
    );
}

// ============================================================================
// Transactions eligibility
// ============================================================================

const TRANSACTION_COMMAND_ALLOWLIST: &[&str] = &[
    "abortTransaction",
    "aggregate",
    "commitTransaction",
    "delete",
    "distinct",
    "find",
    "findAndModify",
    "findandmodify",
    "getMore",
    "insert",
    "killCursors",
    "prepareTransaction",
    "update",
];

/// Verifies that a command may run inside a multi-document transaction on
/// the given namespace.
pub fn can_use_transactions(
    ns: &Namespace,
    cmd_name: &str,
    allow_transactions_on_config_db: bool,
) -> Result<()> {
    if cmd_name == "count" {
        return Err(DbError::OperationNotSupportedInTransaction(
            "Cannot run 'count' in a multi-document transaction; use an aggregation with $count instead".into(),
        ));
    }
    if !TRANSACTION_COMMAND_ALLOWLIST.iter().any(|c| *c == cmd_name) {
        return Err(DbError::OperationNotSupportedInTransaction(format!(
            "Cannot run '{}' in a multi-document transaction",
            cmd_name
        )));
    }
    if ns.db() == "local" {
        return Err(DbError::OperationNotSupportedInTransaction(
            "Cannot run a transaction against the 'local' database".into(),
        ));
    }
    if ns.db() == "config" && !allow_transactions_on_config_db {
        return Err(DbError::OperationNotSupportedInTransaction(
            "Cannot run a transaction against the 'config' database".into(),
        ));
    }
    if ns.is_system() {
        return Err(DbError::OperationNotSupportedInTransaction(format!(
            "Cannot run a transaction against the system collection '{}'",
            ns.full_name()
        )));
    }
    Ok(())
}

// ============================================================================
// Fail point evaluation
// ============================================================================

/// Whether a failCommand rule payload matches the invocation at hand.
pub fn should_activate_fail_command_fail_point(
    data: &Document,
    command_name: &str,
    ns: &Namespace,
    opctx: &OperationContext,
) -> bool {
    let Some(Value::Array(commands)) = data.get("failCommands") else {
        return false;
    };
    if !commands.iter().any(|c| c.as_str() == Some(command_name)) {
        return false;
    }
    if let Some(Value::String(target)) = data.get("namespace") {
        if &ns.full_name() != target {
            return false;
        }
    }
    if opctx.client().is_internal()
        && !data.get("failInternalCommands").is_some_and(value_is_truthy)
    {
        return false;
    }
    true
}

fn fail_command_error(data: &Document, command_name: &str) -> Option<DbError> {
    data.get("errorCode").and_then(Value::as_i64).map(|code| {
        DbError::custom(
            code as i32,
            format!("Failing command '{}' via 'failCommand' fail point", command_name),
        )
    })
}

/// Evaluates the failCommand fail point for one invocation: may raise a
/// configured error, block until the rule clears, or do nothing. The
/// disabled case costs a single atomic load.
pub fn evaluate_fail_command_fail_point(
    opctx: &OperationContext,
    invocation: &dyn CommandInvocation,
) -> Result<()> {
    let name = invocation.definition().name();
    let ns = invocation.ns();
    let Some(data) =
        FAIL_COMMAND.check(|data| should_activate_fail_command_fail_point(data, name, &ns, opctx))
    else {
        return Ok(());
    };
    if data.get("blockConnection").is_some_and(value_is_truthy) {
        match data.get("blockTimeMS").and_then(Value::as_u64) {
            Some(ms) => std::thread::sleep(Duration::from_millis(ms)),
            None => FAIL_COMMAND.wait_until_inactive(None),
        }
    }
    match fail_command_error(&data, name) {
        Some(err) => {
            log::debug!("failing command '{}' via 'failCommand' fail point", name);
            Err(err)
        }
        None => Ok(()),
    }
}

/// Async-path variant: blocking waits yield to the executor instead of
/// parking the thread.
pub async fn evaluate_fail_command_fail_point_async(
    opctx: &OperationContext,
    invocation: &dyn CommandInvocation,
) -> Result<()> {
    let name = invocation.definition().name();
    let ns = invocation.ns();
    let Some(data) =
        FAIL_COMMAND.check(|data| should_activate_fail_command_fail_point(data, name, &ns, opctx))
    else {
        return Ok(());
    };
    if data.get("blockConnection").is_some_and(value_is_truthy) {
        match data.get("blockTimeMS").and_then(Value::as_u64) {
            Some(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
            None => {
                while FAIL_COMMAND.is_active() {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }
    match fail_command_error(&data, name) {
        Some(err) => {
            log::debug!("failing command '{}' via 'failCommand' fail point", name);
            Err(err)
        }
        None => Ok(()),
    }
}

// ============================================================================
// Kill on client disconnect
// ============================================================================

/// Arms the operation's kill-on-disconnect marker for external clients.
/// Cancellation stays cooperative: the running command decides when to
/// observe the marker.
pub fn handle_mark_kill_on_client_disconnect(opctx: &OperationContext) {
    if opctx.client().is_internal() {
        return;
    }
    opctx.mark_kill_on_client_disconnect();
    if WAIT_IN_COMMAND_MARK_KILL_ON_CLIENT_DISCONNECT
        .check(|_| true)
        .is_some()
    {
        WAIT_IN_COMMAND_MARK_KILL_ON_CLIENT_DISCONNECT.wait_until_inactive(None);
    }
}

// ============================================================================
// Read mirroring
// ============================================================================

/// The request form to mirror to secondaries, when the invocation supports
/// mirroring at all.
pub fn mirrorable_request(invocation: &dyn CommandInvocation) -> Option<Document> {
    if !invocation.supports_read_mirroring() {
        return None;
    }
    let mut request = Document::new();
    invocation.append_mirrorable_request(&mut request);
    Some(request)
}

// ============================================================================
// Invocation orchestration
// ============================================================================

fn check_concern_eligibility(
    invocation: &dyn CommandInvocation,
    request: &CommandRequest,
) -> Result<()> {
    if request.body().contains_key("writeConcern") && !invocation.supports_write_concern() {
        return Err(DbError::InvalidOptions(format!(
            "Command does not support writeConcern: {}",
            invocation.definition().name()
        )));
    }
    if let Some(read_concern) = request.body().get("readConcern") {
        let Value::Object(read_concern) = read_concern else {
            return Err(DbError::TypeMismatch("readConcern must be an object".into()));
        };
        let level = match read_concern.get("level") {
            Some(Value::String(level)) => ReadConcernLevel::parse(level)?,
            Some(_) => {
                return Err(DbError::TypeMismatch(
                    "readConcern.level must be a string".into(),
                ))
            }
            None => ReadConcernLevel::Local,
        };
        if let Some(err) = invocation.supports_read_concern(level).read_concern {
            return Err(err);
        }
    }
    Ok(())
}

fn account_execution(opctx: &OperationContext, definition: &'static dyn Command) {
    definition.metrics().increment_executed();
    if definition.should_affect_command_counter() {
        let counters = opctx.service().op_counters();
        match definition.read_write_type() {
            ReadWriteType::Read => counters.got_read(),
            ReadWriteType::Write => counters.got_write(),
            ReadWriteType::Command | ReadWriteType::Transaction => counters.got_command(),
        }
    }
}

/// Runs a parsed invocation through the per-request stages, in order:
/// before-hooks, authorization, fail point, kill-on-disconnect arming,
/// concern eligibility, counters, the command itself, after-hooks.
///
/// Errors propagate to the caller, which owns discarding partial reply
/// content and serializing the failure.
pub fn run_command_invocation(
    opctx: &OperationContext,
    request: &CommandRequest,
    invocation: &mut dyn CommandInvocation,
    reply: &mut ReplyBuilder,
) -> Result<()> {
    let hooks = opctx.service().invocation_hooks();
    if let Some(hooks) = &hooks {
        hooks.on_before_run(opctx, request, &*invocation);
    }
    check_authorization(&*invocation, opctx, request)?;
    evaluate_fail_command_fail_point(opctx, &*invocation)?;
    handle_mark_kill_on_client_disconnect(opctx);
    check_concern_eligibility(&*invocation, request)?;
    account_execution(opctx, invocation.definition());
    invocation.run(opctx, reply)?;
    if let Some(hooks) = &hooks {
        hooks.on_after_run(opctx, request, &*invocation);
    }
    Ok(())
}

/// Future-based counterpart of [`run_command_invocation`]. Commands that
/// did not opt into true asynchrony fall back to their synchronous `run`
/// behind an immediately resolved future.
pub async fn run_command_invocation_async(
    opctx: &OperationContext,
    request: &CommandRequest,
    invocation: &mut dyn CommandInvocation,
    reply: &mut ReplyBuilder,
) -> Result<()> {
    let hooks = opctx.service().invocation_hooks();
    if let Some(hooks) = &hooks {
        hooks.on_before_async_run(opctx, request, &*invocation).await;
    }
    check_authorization(&*invocation, opctx, request)?;
    evaluate_fail_command_fail_point_async(opctx, &*invocation).await?;
    handle_mark_kill_on_client_disconnect(opctx);
    check_concern_eligibility(&*invocation, request)?;
    account_execution(opctx, invocation.definition());
    invocation.run_async(opctx, reply).await?;
    if let Some(hooks) = &hooks {
        hooks.on_after_async_run(opctx, request, &*invocation).await;
    }
    Ok(())
}

// ============================================================================
// Request execution
// ============================================================================

fn lookup_command(
    registry: &CommandRegistry,
    request: &CommandRequest,
) -> Result<&'static dyn Command> {
    let name = request.command_name();
    registry.find_command(name).ok_or_else(|| {
        registry.increment_unknown_commands();
        log::debug!("no such command: '{}'", name);
        DbError::CommandNotFound(format!("no such command: '{}'", name))
    })
}

fn run_command(
    opctx: &OperationContext,
    command: &'static dyn Command,
    request: &CommandRequest,
    reply: &mut ReplyBuilder,
) -> Result<()> {
    assert_no_document_sequences(command, request)?;
    should_attempt_parse(opctx, command, request)?;
    check_api_versions(command, request)?;
    if is_help_request(request.body()) {
        generate_help_response(reply, command);
        return Ok(());
    }
    let mut invocation = command.parse(opctx, request)?;
    run_command_invocation(opctx, request, invocation.as_mut(), reply)
}

async fn run_command_async(
    opctx: &OperationContext,
    command: &'static dyn Command,
    request: &CommandRequest,
    reply: &mut ReplyBuilder,
) -> Result<()> {
    assert_no_document_sequences(command, request)?;
    should_attempt_parse(opctx, command, request)?;
    check_api_versions(command, request)?;
    if is_help_request(request.body()) {
        generate_help_response(reply, command);
        return Ok(());
    }
    let mut invocation = command.parse(opctx, request)?;
    run_command_invocation_async(opctx, request, invocation.as_mut(), reply).await
}

fn finish_reply(
    opctx: &OperationContext,
    command_name: &str,
    command: Option<&'static dyn Command>,
    outcome: Result<()>,
    mut reply: ReplyBuilder,
) -> Document {
    match outcome {
        Ok(()) => {
            if !extract_or_append_ok(reply.body_mut()) {
                // Legacy explicit ok:0 replies count as failures too.
                if let Some(command) = command {
                    command.metrics().increment_failed();
                }
            }
            reply.into_body()
        }
        Err(err) => {
            log::debug!("command '{}' failed with code {}", command_name, err.code());
            reply.reset();
            let body = reply.body_mut();
            body.append("ok", 0.0);
            body.append("errmsg", err.message());
            body.append("code", err.code());
            if let Some(labels) = opctx.error_labels() {
                if !labels.is_empty() {
                    body.append(
                        "errorLabels",
                        Value::Array(labels.into_iter().map(Value::String).collect()),
                    );
                }
            }
            if let Some(command) = command {
                command.metrics().increment_failed();
            }
            reply.into_body()
        }
    }
}

/// The full external request path: registry lookup, pre-parse gating,
/// parse, the per-invocation stages, and the single catch-and-reconcile
/// point that turns any raised error into an error reply.
pub fn execute_request(
    opctx: &OperationContext,
    registry: &CommandRegistry,
    request: &CommandRequest,
) -> Document {
    let mut reply = ReplyBuilder::new();
    let (command, outcome) = match lookup_command(registry, request) {
        Ok(command) => (
            Some(command),
            run_command(opctx, command, request, &mut reply),
        ),
        Err(err) => (None, Err(err)),
    };
    finish_reply(opctx, request.command_name(), command, outcome, reply)
}

/// Future-based counterpart of [`execute_request`].
pub async fn execute_request_async(
    opctx: &OperationContext,
    registry: &CommandRegistry,
    request: &CommandRequest,
) -> Document {
    let mut reply = ReplyBuilder::new();
    let (command, outcome) = match lookup_command(registry, request) {
        Ok(command) => (
            Some(command),
            run_command_async(opctx, command, request, &mut reply).await,
        ),
        Err(err) => (None, Err(err)),
    };
    finish_reply(opctx, request.command_name(), command, outcome, reply)
}

/// Runs a command with none of the usual dispatch work: no hooks, no
/// authorization, no fail points, no counters. For internal callers and
/// tests that already hold a fully trusted request. The command must
/// exist.
pub fn run_command_directly(
    opctx: &OperationContext,
    registry: &CommandRegistry,
    request: &CommandRequest,
) -> Result<Document> {
    let command = registry.find_command(request.command_name()).ok_or_else(|| {
        DbError::CommandNotFound(format!("no such command: '{}'", request.command_name()))
    })?;
    let mut invocation = command.parse(opctx, request)?;
    let mut reply = ReplyBuilder::new();
    invocation.run(opctx, &mut reply)?;
    extract_or_append_ok(reply.body_mut());
    Ok(reply.into_body())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_ns_first_field_string() {
        let cmd = Document::new().with("find", "users").with("limit", 1);
        let ns = parse_ns_from_command("app", &cmd);
        assert_eq!(ns.full_name(), "app.users");
    }

    #[test]
    fn test_parse_ns_defaults_to_database() {
        let cmd = Document::new().with("ping", 1);
        assert_eq!(parse_ns_from_command("app", &cmd).full_name(), "app");
        assert_eq!(parse_ns_from_command("app", &Document::new()).full_name(), "app");
    }

    #[test]
    fn test_parse_ns_collection_required() {
        let ok = Document::new().with("count", "orders");
        assert!(parse_ns_collection_required("app", &ok).is_ok());

        let bad = Document::new().with("count", 1);
        assert!(parse_ns_collection_required("app", &bad).is_err());
    }

    #[test]
    fn test_parse_ns_fully_qualified() {
        let ok = Document::new().with("cloneCollection", "app.users");
        assert_eq!(
            parse_ns_fully_qualified(&ok).unwrap().full_name(),
            "app.users"
        );

        let bare_db = Document::new().with("cloneCollection", "app");
        assert!(parse_ns_fully_qualified(&bare_db).is_err());
    }

    #[test]
    fn test_extract_or_append_ok_is_idempotent() {
        let mut explicit = Document::new().with("n", 3).with("ok", 1.0);
        let before = explicit.clone();
        assert!(extract_or_append_ok(&mut explicit));
        assert_eq!(explicit, before);

        let mut missing = Document::new().with("n", 3);
        assert!(extract_or_append_ok(&mut missing));
        assert_eq!(missing.get("ok"), Some(&json!(1.0)));

        let mut failed = Document::new().with("ok", 0.0);
        assert!(!extract_or_append_ok(&mut failed));
    }

    #[test]
    fn test_append_command_status_no_throw() {
        let mut result = Document::new();
        let failed: Result<()> = Err(DbError::Unauthorized("nope".into()));
        assert!(!append_command_status_no_throw(&mut result, &failed));
        assert_eq!(result.get("code"), Some(&json!(13)));
        assert_eq!(result.get("ok"), Some(&json!(0.0)));

        let mut result = Document::new();
        assert!(append_command_status_no_throw(&mut result, &Ok(())));
        assert_eq!(result.get("ok"), Some(&json!(1.0)));
    }

    #[test]
    fn test_passthrough_request_wraps_read_preference() {
        let cmd = Document::new()
            .with("find", "users")
            .with("$readPreference", json!({"mode": "secondaryPreferred"}))
            .with("maxTimeMS", 100)
            .with("$db", "app");
        let filtered = filter_command_request_for_passthrough(&cmd);

        assert!(filtered.get("maxTimeMS").is_none());
        assert!(filtered.get("$db").is_none());
        assert!(filtered.get("$readPreference").is_none());
        assert_eq!(
            filtered.get("$queryOptions"),
            Some(&json!({"$readPreference": {"mode": "secondaryPreferred"}}))
        );
    }

    #[test]
    fn test_passthrough_reply_restores_read_preference() {
        let pref = json!({"mode": "nearest", "tags": [{"dc": "east"}]});
        let cmd = Document::new()
            .with("find", "users")
            .with("$readPreference", pref.clone());
        let forwarded = filter_command_request_for_passthrough(&cmd);
        let restored = filter_command_reply_for_passthrough(&forwarded);

        assert_eq!(restored.get("$readPreference"), Some(&pref));
    }

    #[test]
    fn test_passthrough_reply_strips_topology_fields() {
        let reply = Document::new()
            .with("n", 1)
            .with("$clusterTime", json!({"t": 5}))
            .with("operationTime", 5);
        let filtered = filter_command_reply_for_passthrough(&reply);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered.get("n"), Some(&json!(1)));
    }

    #[test]
    fn test_append_passthrough_fields_skips_existing() {
        let source = Document::new()
            .with("insert", "users")
            .with("lsid", json!({"id": 7}))
            .with("maxTimeMS", 50);
        let request = Document::new().with("insert", "users").with("maxTimeMS", 99);
        let out = append_passthrough_fields(&source, &request);
        assert_eq!(out.get("maxTimeMS"), Some(&json!(99)));
        assert_eq!(out.get("lsid"), Some(&json!({"id": 7})));
    }

    #[test]
    fn test_append_majority_write_concern_preserves_wtimeout() {
        let cmd = Document::new()
            .with("insert", "users")
            .with("writeConcern", json!({"w": 1, "wtimeout": 500}));
        let out = append_majority_write_concern(&cmd, None);
        assert_eq!(
            out.get("writeConcern"),
            Some(&json!({"w": "majority", "wtimeout": 500}))
        );
    }

    #[test]
    fn test_append_majority_write_concern_uses_default() {
        let cmd = Document::new().with("insert", "users");
        let out = append_majority_write_concern(
            &cmd,
            Some(Document::new().with("w", 2).with("wtimeout", 100)),
        );
        assert_eq!(
            out.get("writeConcern"),
            Some(&json!({"w": "majority", "wtimeout": 100}))
        );
    }

    #[test]
    fn test_is_help_request() {
        assert!(is_help_request(&Document::new().with("ping", 1).with("help", true)));
        assert!(!is_help_request(&Document::new().with("ping", 1)));
        assert!(!is_help_request(&Document::new().with("help", false)));
    }

    #[test]
    fn test_can_use_transactions() {
        let users = Namespace::collection("app", "users");
        assert!(can_use_transactions(&users, "find", false).is_ok());
        assert!(can_use_transactions(&users, "count", false).is_err());
        assert!(can_use_transactions(&users, "serverStatus", false).is_err());

        let local = Namespace::collection("local", "oplog");
        assert!(can_use_transactions(&local, "find", false).is_err());

        let config = Namespace::collection("config", "transactions");
        assert!(can_use_transactions(&config, "find", false).is_err());
        assert!(can_use_transactions(&config, "find", true).is_ok());

        let system = Namespace::collection("app", "system.views");
        assert!(can_use_transactions(&system, "find", false).is_err());
    }

    #[test]
    fn test_append_write_concern_error() {
        let mut result = Document::new().with("ok", 1.0);
        append_write_concern_error(&mut result, 64, "waiting for replication timed out", None);
        assert_eq!(
            result.get("writeConcernError"),
            Some(&json!({"code": 64, "errmsg": "waiting for replication timed out"}))
        );
    }
}
