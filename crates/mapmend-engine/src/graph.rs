//! Graph store seam: where compiled statements get applied.
//!
//! The canonical dataset lives in an external triple store reached over
//! SPARQL. The engine only needs two verbs, so the seam is a small trait
//! with three implementations: an HTTP client for a real endpoint, an
//! append-only statement log for offline use, and a recording double for
//! tests.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

/// One row of SPARQL SELECT results: variable name → bound value.
pub type Binding = BTreeMap<String, String>;

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("graph endpoint unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("graph endpoint rejected statement (HTTP {status}): {message}")]
    Endpoint { status: u16, message: String },

    #[error("malformed query response: {0}")]
    Response(String),

    #[error("graph log I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Textual mutation/query interface over the staging and canonical graphs.
pub trait GraphStore: Send + Sync {
    /// Apply a mutation statement (`INSERT DATA`, `DELETE`/`INSERT`).
    fn update(&self, statement: &str) -> Result<(), GraphError>;

    /// Run a `SELECT` and return its bindings.
    fn select(&self, query: &str) -> Result<Vec<Binding>, GraphError>;
}

// ============================================================================
// HTTP endpoint client
// ============================================================================

/// Client for a SPARQL 1.1 endpoint exposing `/update` and `/query`
/// (Fuseki-style layout).
pub struct HttpGraphStore {
    client: reqwest::blocking::Client,
    update_url: String,
    query_url: String,
}

impl HttpGraphStore {
    pub fn new(endpoint: &str) -> Self {
        let endpoint = endpoint.trim_end_matches('/');
        HttpGraphStore {
            client: reqwest::blocking::Client::new(),
            update_url: format!("{endpoint}/update"),
            query_url: format!("{endpoint}/query"),
        }
    }
}

impl GraphStore for HttpGraphStore {
    fn update(&self, statement: &str) -> Result<(), GraphError> {
        let response = self
            .client
            .post(&self.update_url)
            .form(&[("update", statement)])
            .send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(GraphError::Endpoint {
                status: status.as_u16(),
                message: response.text().unwrap_or_default(),
            });
        }
        Ok(())
    }

    fn select(&self, query: &str) -> Result<Vec<Binding>, GraphError> {
        let response = self
            .client
            .post(&self.query_url)
            .header("Accept", "application/sparql-results+json")
            .form(&[("query", query)])
            .send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(GraphError::Endpoint {
                status: status.as_u16(),
                message: response.text().unwrap_or_default(),
            });
        }

        let body: serde_json::Value = response.json()?;
        let bindings = body
            .pointer("/results/bindings")
            .and_then(|b| b.as_array())
            .ok_or_else(|| GraphError::Response("missing results.bindings".to_string()))?;

        let mut rows = Vec::with_capacity(bindings.len());
        for row in bindings {
            let obj = row
                .as_object()
                .ok_or_else(|| GraphError::Response("binding row is not an object".to_string()))?;
            let mut out = Binding::new();
            for (var, cell) in obj {
                if let Some(value) = cell.pointer("/value").and_then(|v| v.as_str()) {
                    out.insert(var.clone(), value.to_string());
                }
            }
            rows.push(out);
        }
        Ok(rows)
    }
}

// ============================================================================
// Offline statement log
// ============================================================================

/// Append-only file of applied statements, for running without an endpoint.
/// Queries return no bindings; the ledger stays the read path.
pub struct GraphLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl GraphLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        GraphLog {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }
}

impl GraphStore for GraphLog {
    fn update(&self, statement: &str) -> Result<(), GraphError> {
        let _guard = self.lock.lock();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{statement}\n")?;
        Ok(())
    }

    fn select(&self, _query: &str) -> Result<Vec<Binding>, GraphError> {
        Ok(Vec::new())
    }
}

// ============================================================================
// Recording double
// ============================================================================

/// Test double: records every applied statement and can be switched into a
/// failing mode to exercise rollback paths.
#[derive(Default)]
pub struct RecordingGraph {
    statements: Mutex<Vec<String>>,
    queries: Mutex<Vec<String>>,
    failing: AtomicBool,
}

impl RecordingGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// All mutation statements applied so far, in order.
    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().clone()
    }

    pub fn update_count(&self) -> usize {
        self.statements.lock().len()
    }

    /// All queries run so far, in order.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }

    /// When failing, every `update` errors without recording.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl GraphStore for RecordingGraph {
    fn update(&self, statement: &str) -> Result<(), GraphError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(GraphError::Endpoint {
                status: 503,
                message: "injected failure".to_string(),
            });
        }
        self.statements.lock().push(statement.to_string());
        Ok(())
    }

    fn select(&self, query: &str) -> Result<Vec<Binding>, GraphError> {
        self.queries.lock().push(query.to_string());
        Ok(Vec::new())
    }
}
