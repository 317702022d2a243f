//! Mock service state
//!
//! Operations, classifiers and blobs held by the mock service.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use docintel_protocol::OperationState;
use serde_json::Value;

use crate::client::HttpRequest;

/// What a mock operation is doing
#[derive(Debug, Clone)]
pub enum OperationKind {
    Analyze { model_id: String },
    Classify { classifier_id: String },
    BuildClassifier { request: Value },
}

/// One submitted operation
#[derive(Debug, Clone)]
pub struct MockOperation {
    pub operation_id: String,
    pub kind: OperationKind,
    /// States reported by successive status queries; the last one repeats
    pub progression: Vec<OperationState>,
    /// Status queries answered so far
    pub polls: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MockOperation {
    pub fn new(operation_id: String, kind: OperationKind, progression: Vec<OperationState>) -> Self {
        let now = Utc::now();
        Self {
            operation_id,
            kind,
            progression,
            polls: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Advance by one status query and return the state to report
    pub fn advance(&mut self) -> OperationState {
        let index = self.polls.min(self.progression.len().saturating_sub(1));
        self.polls += 1;
        self.updated_at = Utc::now();
        self.progression
            .get(index)
            .copied()
            .unwrap_or(OperationState::Succeeded)
    }
}

/// Mutable state of the mock service
#[derive(Debug)]
pub struct MockState {
    pub operations: HashMap<String, MockOperation>,
    /// Classifiers by id, as service JSON
    pub classifiers: BTreeMap<String, Value>,
    pub container_exists: bool,
    pub blobs: BTreeMap<String, Vec<u8>>,
    /// Every request received, in order
    pub requests: Vec<HttpRequest>,
    /// Progression given to new operations
    pub progression: Vec<OperationState>,
    /// Overrides the `analyzeResult` of analyze operations
    pub analyze_result: Option<Value>,
    /// Overrides the detected documents of classify operations
    pub documents: Option<Vec<Value>>,
    next_operation: u64,
}

impl MockState {
    pub fn new() -> Self {
        Self {
            operations: HashMap::new(),
            classifiers: BTreeMap::new(),
            container_exists: false,
            blobs: BTreeMap::new(),
            requests: Vec::new(),
            progression: vec![OperationState::Succeeded],
            analyze_result: None,
            documents: None,
            next_operation: 0,
        }
    }

    /// Register a new operation and return its id
    pub fn start_operation(&mut self, kind: OperationKind) -> String {
        self.next_operation += 1;
        let id = format!("op-{:06}", self.next_operation);
        let op = MockOperation::new(id.clone(), kind, self.progression.clone());
        self.operations.insert(id.clone(), op);
        id
    }
}

impl Default for MockState {
    fn default() -> Self {
        Self::new()
    }
}
