use crate::core::Document;

/// An auxiliary batch of documents attached to a request outside the
/// command body, keyed by the body field it stands in for.
#[derive(Debug, Clone, Default)]
pub struct DocumentSequence {
    pub identifier: String,
    pub documents: Vec<Document>,
}

impl DocumentSequence {
    pub fn new(identifier: impl Into<String>, documents: Vec<Document>) -> Self {
        Self {
            identifier: identifier.into(),
            documents,
        }
    }
}

/// The decoded request envelope handed to the dispatch layer: a target
/// database, an ordered command body, and optional document sequences.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    database: String,
    body: Document,
    sequences: Vec<DocumentSequence>,
}

impl CommandRequest {
    pub fn new(database: impl Into<String>, body: Document) -> Self {
        Self {
            database: database.into(),
            body,
            sequences: Vec::new(),
        }
    }

    pub fn with_sequence(mut self, sequence: DocumentSequence) -> Self {
        self.sequences.push(sequence);
        self
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn body(&self) -> &Document {
        &self.body
    }

    pub fn sequences(&self) -> &[DocumentSequence] {
        &self.sequences
    }

    /// The command name: the name of the first body field, by convention.
    pub fn command_name(&self) -> &str {
        self.body.first().map(|(name, _)| name).unwrap_or("")
    }
}
