pub mod config;

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use uuid::Uuid;

use crate::auth::{AuditSink, AuthorizationSession, LogAuditSink};
use crate::command::hooks::CommandInvocationHooks;
use crate::core::{DbError, Document, Result};

pub use config::ServiceConfig;

/// Aggregate operation counters for the whole service, reported alongside
/// the per-command counters.
#[derive(Debug, Default)]
pub struct OpCounters {
    reads: AtomicU64,
    writes: AtomicU64,
    commands: AtomicU64,
}

impl OpCounters {
    pub fn got_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn got_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn got_command(&self) {
        self.commands.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn commands(&self) -> u64 {
        self.commands.load(Ordering::Relaxed)
    }

    pub fn report(&self) -> Document {
        Document::new()
            .with("reads", self.reads())
            .with("writes", self.writes())
            .with("commands", self.commands())
    }
}

/// Process-wide dispatch state shared by every request: configuration, the
/// invocation hook slot, the audit sink, and aggregate counters.
///
/// The hook slot holds at most one hook set; replacing it is last-writer
/// wins and is not synchronized against in-flight requests, so swap hooks
/// only during quiescence.
pub struct ServiceContext {
    config: ServiceConfig,
    hooks: RwLock<Option<Arc<dyn CommandInvocationHooks>>>,
    audit: RwLock<Arc<dyn AuditSink>>,
    op_counters: OpCounters,
}

impl ServiceContext {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config,
            hooks: RwLock::new(None),
            audit: RwLock::new(Arc::new(LogAuditSink)),
            op_counters: OpCounters::default(),
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn op_counters(&self) -> &OpCounters {
        &self.op_counters
    }

    pub fn set_invocation_hooks(&self, hooks: Option<Arc<dyn CommandInvocationHooks>>) {
        *self.hooks.write().unwrap_or_else(|e| e.into_inner()) = hooks;
    }

    pub fn invocation_hooks(&self) -> Option<Arc<dyn CommandInvocationHooks>> {
        self.hooks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn set_audit_sink(&self, sink: Arc<dyn AuditSink>) {
        *self.audit.write().unwrap_or_else(|e| e.into_inner()) = sink;
    }

    pub fn audit_sink(&self) -> Arc<dyn AuditSink> {
        self.audit
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Default for ServiceContext {
    fn default() -> Self {
        Self::new(ServiceConfig::default())
    }
}

/// Facts about the client connection behind a request.
#[derive(Debug)]
pub struct ClientMetadata {
    local: bool,
    internal: bool,
    disconnected: AtomicBool,
}

impl ClientMetadata {
    pub fn external() -> Self {
        Self {
            local: false,
            internal: false,
            disconnected: AtomicBool::new(false),
        }
    }

    pub fn local() -> Self {
        Self {
            local: true,
            internal: false,
            disconnected: AtomicBool::new(false),
        }
    }

    pub fn internal() -> Self {
        Self {
            local: true,
            internal: true,
            disconnected: AtomicBool::new(false),
        }
    }

    pub fn is_local(&self) -> bool {
        self.local
    }

    pub fn is_internal(&self) -> bool {
        self.internal
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::Relaxed)
    }

    /// Flags the connection as gone. The transport layer calls this; the
    /// dispatch core only observes it.
    pub fn set_disconnected(&self) {
        self.disconnected.store(true, Ordering::Relaxed);
    }
}

impl Default for ClientMetadata {
    fn default() -> Self {
        Self::external()
    }
}

/// Per-request execution state.
///
/// One operation context exists per in-flight request. Cancellation is
/// cooperative: the pipeline arms kill markers, and a running command
/// observes them through `check_for_interrupt` at its own discretion.
pub struct OperationContext {
    service: Arc<ServiceContext>,
    auth: Arc<dyn AuthorizationSession>,
    client: ClientMetadata,
    operation_id: Uuid,
    kill_code: AtomicI32,
    kill_on_disconnect: AtomicBool,
    error_labels: Mutex<Option<Vec<String>>>,
}

impl OperationContext {
    pub fn new(service: Arc<ServiceContext>, auth: Arc<dyn AuthorizationSession>) -> Self {
        Self {
            service,
            auth,
            client: ClientMetadata::default(),
            operation_id: Uuid::new_v4(),
            kill_code: AtomicI32::new(0),
            kill_on_disconnect: AtomicBool::new(false),
            error_labels: Mutex::new(None),
        }
    }

    pub fn with_client(mut self, client: ClientMetadata) -> Self {
        self.client = client;
        self
    }

    pub fn service(&self) -> &Arc<ServiceContext> {
        &self.service
    }

    pub fn auth_session(&self) -> &Arc<dyn AuthorizationSession> {
        &self.auth
    }

    pub fn client(&self) -> &ClientMetadata {
        &self.client
    }

    pub fn operation_id(&self) -> Uuid {
        self.operation_id
    }

    /// Marks the operation killed with the given error code. The first
    /// marker wins.
    pub fn mark_killed(&self, code: i32) {
        let _ = self
            .kill_code
            .compare_exchange(0, code, Ordering::SeqCst, Ordering::SeqCst);
    }

    pub fn kill_code(&self) -> Option<i32> {
        match self.kill_code.load(Ordering::SeqCst) {
            0 => None,
            code => Some(code),
        }
    }

    /// Arms the kill-on-disconnect marker. If the client is already gone
    /// the operation is killed immediately.
    pub fn mark_kill_on_client_disconnect(&self) {
        self.kill_on_disconnect.store(true, Ordering::SeqCst);
        if self.client.is_disconnected() {
            self.mark_killed(DbError::ClientDisconnect(String::new()).code());
        }
    }

    /// Cooperative cancellation point for running commands.
    pub fn check_for_interrupt(&self) -> Result<()> {
        if self.kill_on_disconnect.load(Ordering::SeqCst) && self.client.is_disconnected() {
            self.mark_killed(DbError::ClientDisconnect(String::new()).code());
        }
        match self.kill_code() {
            None => Ok(()),
            Some(code) => Err(DbError::custom(
                code,
                format!("operation {} was interrupted", self.operation_id),
            )),
        }
    }

    /// Overrides the error labels attached to this operation's error reply.
    pub fn set_error_labels(&self, labels: Vec<String>) {
        *self.error_labels.lock().unwrap_or_else(|e| e.into_inner()) = Some(labels);
    }

    pub fn error_labels(&self) -> Option<Vec<String>> {
        self.error_labels
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}
