use serde::Serialize;

use crate::core::{DbError, Document, Result, Value};

/// Incremental builder for a command reply.
///
/// Commands append fields into the body as they run. The dispatch pipeline
/// owns the ok/error indicator: a command that returns without writing one
/// is considered successful, and on error the pipeline resets whatever was
/// partially written and rebuilds the body from the error.
#[derive(Debug, Default)]
pub struct ReplyBuilder {
    body: Document,
}

impl ReplyBuilder {
    pub fn new() -> Self {
        Self {
            body: Document::new(),
        }
    }

    pub fn body(&self) -> &Document {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut Document {
        &mut self.body
    }

    pub fn append(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.body.append(name, value);
        self
    }

    /// Discards everything written so far.
    pub fn reset(&mut self) {
        self.body.clear();
    }

    /// Serializes a typed payload into the body.
    ///
    /// A unit payload serializes to null and contributes nothing, leaving a
    /// bare-ok reply. Any other payload must serialize to an object, whose
    /// fields are appended verbatim.
    pub fn fill_from<T: Serialize>(&mut self, payload: &T) -> Result<()> {
        let value = serde_json::to_value(payload)
            .map_err(|e| DbError::Internal(format!("failed to serialize reply: {}", e)))?;
        match value {
            Value::Null => Ok(()),
            Value::Object(map) => {
                for (name, value) in map {
                    self.body.append(name, value);
                }
                Ok(())
            }
            other => Err(DbError::TypeMismatch(format!(
                "reply payload must serialize to an object, got {}",
                other
            ))),
        }
    }

    pub fn into_body(self) -> Document {
        self.body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    struct CountReply {
        n: u64,
    }

    #[test]
    fn test_fill_from_object() {
        let mut reply = ReplyBuilder::new();
        reply.fill_from(&CountReply { n: 42 }).unwrap();
        assert_eq!(reply.body().get("n"), Some(&json!(42)));
    }

    #[test]
    fn test_fill_from_unit_adds_nothing() {
        let mut reply = ReplyBuilder::new();
        reply.fill_from(&()).unwrap();
        assert!(reply.body().is_empty());
    }

    #[test]
    fn test_fill_from_scalar_is_rejected() {
        let mut reply = ReplyBuilder::new();
        assert!(reply.fill_from(&7).is_err());
    }

    #[test]
    fn test_reset_discards_partial_output() {
        let mut reply = ReplyBuilder::new();
        reply.append("partial", 1);
        reply.reset();
        assert!(reply.body().is_empty());
    }
}
