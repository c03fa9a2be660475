use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Progress and lifecycle events emitted by the pipeline.
///
/// Events are advisory: sinks render them for operators, tests snapshot them,
/// and nothing in the pipeline's control flow depends on them.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum Event {
    Unit(UnitEvent),
    Batch(BatchEvent),
    Run(RunEvent),
    Diagnostic(DiagnosticEvent),
}

impl Event {
    /// Event about one frontier unit, tagged with its cursor display form.
    pub fn unit(cursor: impl Into<String>, scope: impl Into<String>, message: impl Into<String>) -> Self {
        Event::Unit(UnitEvent::new(cursor.into(), None, scope.into(), message.into()))
    }

    pub fn unit_with_seq(
        cursor: impl Into<String>,
        seq: u64,
        scope: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Event::Unit(UnitEvent::new(
            cursor.into(),
            Some(seq),
            scope.into(),
            message.into(),
        ))
    }

    /// Indexing progress: how far the current submission has come, with the
    /// advisory time-remaining estimate when one is available.
    pub fn batch_progress(indexed: usize, total: usize, failed: usize, eta_secs: Option<f64>) -> Self {
        let message = match eta_secs {
            Some(eta) => format!("indexed {indexed}/{total} documents, ETA {eta:.0}s"),
            None => format!("indexed {indexed}/{total} documents"),
        };
        Event::Batch(BatchEvent {
            indexed,
            total,
            failed,
            eta_secs,
            message,
        })
    }

    pub fn run(run_id: impl Into<String>, scope: impl Into<String>, message: impl Into<String>) -> Self {
        Event::Run(RunEvent {
            run_id: run_id.into(),
            scope: scope.into(),
            message: message.into(),
        })
    }

    pub fn diagnostic(scope: impl Into<String>, message: impl Into<String>) -> Self {
        Event::Diagnostic(DiagnosticEvent {
            scope: scope.into(),
            message: message.into(),
        })
    }

    pub fn scope_label(&self) -> Option<&str> {
        match self {
            Event::Unit(unit) => Some(unit.scope()),
            Event::Batch(_) => Some("index"),
            Event::Run(run) => Some(run.scope()),
            Event::Diagnostic(diag) => Some(diag.scope()),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Event::Unit(unit) => unit.message(),
            Event::Batch(batch) => &batch.message,
            Event::Run(run) => &run.message,
            Event::Diagnostic(diag) => diag.message(),
        }
    }

    /// Convert to a structured JSON value with a normalized schema.
    ///
    /// ```
    /// use tideline::event_bus::Event;
    ///
    /// let event = Event::unit_with_seq("offset=40", 1, "fetch", "page retrieved");
    /// let json = event.to_json_value();
    ///
    /// assert_eq!(json["type"], "unit");
    /// assert_eq!(json["scope"], "fetch");
    /// assert_eq!(json["metadata"]["cursor"], "offset=40");
    /// assert_eq!(json["metadata"]["seq"], 1);
    /// ```
    pub fn to_json_value(&self) -> Value {
        use serde_json::json;

        let (event_type, metadata) = match self {
            Event::Unit(unit) => {
                let mut meta = serde_json::Map::new();
                meta.insert("cursor".to_string(), json!(unit.cursor()));
                if let Some(seq) = unit.seq() {
                    meta.insert("seq".to_string(), json!(seq));
                }
                ("unit", Value::Object(meta))
            }
            Event::Batch(batch) => {
                let mut meta = serde_json::Map::new();
                meta.insert("indexed".to_string(), json!(batch.indexed));
                meta.insert("total".to_string(), json!(batch.total));
                meta.insert("failed".to_string(), json!(batch.failed));
                if let Some(eta) = batch.eta_secs {
                    meta.insert("eta_secs".to_string(), json!(eta));
                }
                ("batch", Value::Object(meta))
            }
            Event::Run(run) => {
                let mut meta = serde_json::Map::new();
                meta.insert("run_id".to_string(), json!(run.run_id));
                ("run", Value::Object(meta))
            }
            Event::Diagnostic(_) => ("diagnostic", Value::Object(serde_json::Map::new())),
        };

        json!({
            "type": event_type,
            "scope": self.scope_label(),
            "message": self.message(),
            "timestamp": Utc::now().to_rfc3339(),
            "metadata": metadata,
        })
    }

    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.to_json_value())
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Unit(unit) => match unit.seq() {
                Some(seq) => write!(f, "[{}#{}] {}", unit.cursor(), seq, unit.message()),
                None => write!(f, "[{}] {}", unit.cursor(), unit.message()),
            },
            Event::Batch(batch) => write!(f, "{}", batch.message),
            Event::Run(run) => write!(f, "[run {}] {}", run.run_id, run.message),
            Event::Diagnostic(diag) => write!(f, "{}", diag.message()),
        }
    }
}

/// Progress for one frontier unit.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnitEvent {
    cursor: String,
    seq: Option<u64>,
    scope: String,
    message: String,
}

impl UnitEvent {
    pub fn new(cursor: String, seq: Option<u64>, scope: String, message: String) -> Self {
        Self {
            cursor,
            seq,
            scope,
            message,
        }
    }

    pub fn cursor(&self) -> &str {
        &self.cursor
    }

    pub fn seq(&self) -> Option<u64> {
        self.seq
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Indexing progress with advisory throughput numbers.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BatchEvent {
    pub indexed: usize,
    pub total: usize,
    pub failed: usize,
    pub eta_secs: Option<f64>,
    pub message: String,
}

/// Run lifecycle marker (started, finished, failed).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunEvent {
    pub run_id: String,
    pub scope: String,
    pub message: String,
}

impl RunEvent {
    pub fn scope(&self) -> &str {
        &self.scope
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiagnosticEvent {
    scope: String,
    message: String,
}

impl DiagnosticEvent {
    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_cursor_and_seq() {
        let event = Event::unit_with_seq("2021-03", 7, "fetch", "month retrieved");
        assert_eq!(event.to_string(), "[2021-03#7] month retrieved");
    }

    #[test]
    fn batch_progress_message_mentions_eta_when_known() {
        let with_eta = Event::batch_progress(50, 200, 0, Some(12.4));
        assert_eq!(with_eta.message(), "indexed 50/200 documents, ETA 12s");

        let without = Event::batch_progress(50, 200, 0, None);
        assert_eq!(without.message(), "indexed 50/200 documents");
    }

    #[test]
    fn json_value_carries_metadata() {
        let event = Event::batch_progress(10, 40, 2, Some(3.0));
        let json = event.to_json_value();
        assert_eq!(json["type"], "batch");
        assert_eq!(json["metadata"]["failed"], 2);
        assert_eq!(json["metadata"]["total"], 40);
    }

    #[test]
    fn diagnostic_scope_label() {
        let event = Event::diagnostic("driver", "frontier exhausted");
        assert_eq!(event.scope_label(), Some("driver"));
    }
}
