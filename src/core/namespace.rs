use std::fmt;

use crate::core::{DbError, Result};

/// A database name plus an optional collection name.
///
/// `ns.full_name()` renders the familiar `db.collection` form; a namespace
/// without a collection part addresses the database as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    db: String,
    collection: Option<String>,
}

impl Namespace {
    pub fn database(db: impl Into<String>) -> Self {
        Self {
            db: db.into(),
            collection: None,
        }
    }

    pub fn collection(db: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            db: db.into(),
            collection: Some(collection.into()),
        }
    }

    /// Parses a `db.collection` string. Everything after the first dot is
    /// the collection name; a string without a dot is a bare database name.
    pub fn from_full_name(full: &str) -> Result<Self> {
        if full.is_empty() {
            return Err(DbError::InvalidNamespace("namespace cannot be empty".into()));
        }
        match full.split_once('.') {
            Some((db, coll)) if !db.is_empty() && !coll.is_empty() => {
                Ok(Self::collection(db, coll))
            }
            Some(_) => Err(DbError::InvalidNamespace(format!(
                "invalid namespace '{}'",
                full
            ))),
            None => Ok(Self::database(full)),
        }
    }

    pub fn db(&self) -> &str {
        &self.db
    }

    pub fn coll(&self) -> Option<&str> {
        self.collection.as_deref()
    }

    pub fn is_collection(&self) -> bool {
        self.collection.is_some()
    }

    /// True for namespaces in a reserved `system.` collection.
    pub fn is_system(&self) -> bool {
        self.coll().is_some_and(|c| c.starts_with("system."))
    }

    pub fn full_name(&self) -> String {
        match &self.collection {
            Some(coll) => format!("{}.{}", self.db, coll),
            None => self.db.clone(),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_name_round_trip() {
        let ns = Namespace::from_full_name("app.users").unwrap();
        assert_eq!(ns.db(), "app");
        assert_eq!(ns.coll(), Some("users"));
        assert_eq!(ns.full_name(), "app.users");
    }

    #[test]
    fn test_database_only() {
        let ns = Namespace::from_full_name("admin").unwrap();
        assert_eq!(ns.db(), "admin");
        assert!(ns.coll().is_none());
        assert!(!ns.is_collection());
    }

    #[test]
    fn test_collection_with_dots() {
        let ns = Namespace::from_full_name("app.system.views").unwrap();
        assert_eq!(ns.coll(), Some("system.views"));
        assert!(ns.is_system());
    }

    #[test]
    fn test_invalid() {
        assert!(Namespace::from_full_name("").is_err());
        assert!(Namespace::from_full_name(".users").is_err());
        assert!(Namespace::from_full_name("app.").is_err());
    }
}
