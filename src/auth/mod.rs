use std::collections::HashSet;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::core::Namespace;

/// Privileged actions a command may require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionType {
    Find,
    Insert,
    Update,
    Remove,
    CreateCollection,
    DropCollection,
    ServerStatus,
    Shutdown,
    Internal,
}

/// The resource a privilege applies to: one collection, one database, or
/// the cluster as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourcePattern {
    Cluster,
    Database(String),
    ExactNamespace(Namespace),
    AnyResource,
}

impl ResourcePattern {
    /// Exact-namespace pattern when the namespace has a collection part,
    /// database-wide pattern otherwise.
    pub fn for_namespace(ns: &Namespace) -> Self {
        if ns.is_collection() {
            Self::ExactNamespace(ns.clone())
        } else {
            Self::Database(ns.db().to_string())
        }
    }

    /// Whether a privilege granted on `self` covers a check on `target`.
    pub fn includes(&self, target: &ResourcePattern) -> bool {
        match (self, target) {
            (Self::AnyResource, _) => true,
            (Self::Database(db), Self::ExactNamespace(ns)) => db == ns.db(),
            (a, b) => a == b,
        }
    }
}

/// The per-request view of the external privilege-evaluation engine.
///
/// The dispatch core never decides policy itself; it asks this interface.
pub trait AuthorizationSession: Send + Sync {
    /// False when the deployment runs without access control, in which case
    /// per-command privilege checks are skipped entirely.
    fn enabled(&self) -> bool {
        true
    }

    fn is_authenticated(&self) -> bool;

    fn has_privilege(&self, resource: &ResourcePattern, action: ActionType) -> bool;
}

/// Session for deployments running without access control.
pub struct AuthDisabledSession;

impl AuthorizationSession for AuthDisabledSession {
    fn enabled(&self) -> bool {
        false
    }

    fn is_authenticated(&self) -> bool {
        true
    }

    fn has_privilege(&self, _resource: &ResourcePattern, _action: ActionType) -> bool {
        true
    }
}

/// A session backed by an explicit grant set. The real privilege engine is
/// external; this implementation wires the interface for embedders and
/// tests.
pub struct FixedPrivilegeSession {
    authenticated: bool,
    grants: HashSet<(ResourcePattern, ActionType)>,
}

impl FixedPrivilegeSession {
    pub fn unauthenticated() -> Self {
        Self {
            authenticated: false,
            grants: HashSet::new(),
        }
    }

    pub fn authenticated() -> Self {
        Self {
            authenticated: true,
            grants: HashSet::new(),
        }
    }

    pub fn grant(mut self, resource: ResourcePattern, action: ActionType) -> Self {
        self.grants.insert((resource, action));
        self
    }
}

impl AuthorizationSession for FixedPrivilegeSession {
    fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    fn has_privilege(&self, resource: &ResourcePattern, action: ActionType) -> bool {
        self.grants
            .iter()
            .any(|(granted, a)| *a == action && granted.includes(resource))
    }
}

/// One audit record: an authorization decision or a pre-parse rejection.
///
/// The namespace is the best known at the time of the decision; before the
/// command has parsed its request it can only be the bare database name.
#[derive(Debug, Clone)]
pub struct AuthAuditEvent {
    pub at: DateTime<Utc>,
    pub operation_id: Uuid,
    pub command: String,
    pub namespace: String,
    pub error_code: i32,
}

impl AuthAuditEvent {
    pub fn succeeded(&self) -> bool {
        self.error_code == 0
    }
}

pub trait AuditSink: Send + Sync {
    fn record_authorization(&self, event: AuthAuditEvent);
}

/// Default sink: structured log lines.
pub struct LogAuditSink;

impl AuditSink for LogAuditSink {
    fn record_authorization(&self, event: AuthAuditEvent) {
        if event.succeeded() {
            log::debug!(
                "audit: authorized command '{}' on '{}' (op {})",
                event.command,
                event.namespace,
                event.operation_id
            );
        } else {
            log::warn!(
                "audit: rejected command '{}' on '{}' with code {} (op {})",
                event.command,
                event.namespace,
                event.error_code,
                event.operation_id
            );
        }
    }
}

/// Sink that retains events in memory, for test assertions.
#[derive(Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuthAuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuthAuditEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record_authorization(&self, event: AuthAuditEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_pattern_for_namespace() {
        let coll = Namespace::collection("app", "users");
        let db = Namespace::database("app");
        assert_eq!(
            ResourcePattern::for_namespace(&coll),
            ResourcePattern::ExactNamespace(coll.clone())
        );
        assert_eq!(
            ResourcePattern::for_namespace(&db),
            ResourcePattern::Database("app".into())
        );
    }

    #[test]
    fn test_database_grant_covers_collections() {
        let session = FixedPrivilegeSession::authenticated()
            .grant(ResourcePattern::Database("app".into()), ActionType::Find);

        let users = ResourcePattern::ExactNamespace(Namespace::collection("app", "users"));
        let other = ResourcePattern::ExactNamespace(Namespace::collection("shop", "users"));
        assert!(session.has_privilege(&users, ActionType::Find));
        assert!(!session.has_privilege(&other, ActionType::Find));
        assert!(!session.has_privilege(&users, ActionType::Insert));
    }

    #[test]
    fn test_any_resource_grant() {
        let session = FixedPrivilegeSession::authenticated()
            .grant(ResourcePattern::AnyResource, ActionType::Shutdown);
        assert!(session.has_privilege(&ResourcePattern::Cluster, ActionType::Shutdown));
    }

    #[test]
    fn test_disabled_session_permits_everything() {
        let session = AuthDisabledSession;
        assert!(!session.enabled());
        assert!(session.has_privilege(&ResourcePattern::Cluster, ActionType::Shutdown));
    }
}
