use crate::event_bus::Event;
use crate::index::IndexFailure;
use std::io::IsTerminal;
use tracing_error::ErrorLayer;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the crate's default tracing subscriber: an `EnvFilter` honoring
/// `RUST_LOG` (falling back to `default_directive`), a compact fmt layer
/// with span open/close events, and an `ErrorLayer` for span traces.
///
/// Safe to call more than once; later calls are no-ops. Demos and tests use
/// this; embedding applications usually install their own subscriber.
pub fn init_tracing(default_directive: &str) {
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE);

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(ErrorLayer::default())
        .try_init();
}

pub const CONTEXT_COLOR: &str = "\x1b[32m"; // green
pub const LINE_COLOR: &str = "\x1b[35m"; // magenta / dark pink
pub const RESET_COLOR: &str = "\x1b[0m";

/// Formatter color mode for telemetry output.
///
/// Controls whether ANSI color codes are included in formatted output:
/// - [`FormatterMode::Auto`]: Automatically detects TTY capability via `stderr.is_terminal()`
/// - [`FormatterMode::Colored`]: Always include color codes (for forced color output)
/// - [`FormatterMode::Plain`]: Never include color codes (for logs/files)
///
/// # Examples
/// ```
/// use tideline::telemetry::FormatterMode;
///
/// // Auto-detect based on TTY
/// let mode = FormatterMode::auto_detect();
///
/// // Force colored output
/// let mode = FormatterMode::Colored;
///
/// // Force plain output for logging
/// let mode = FormatterMode::Plain;
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatterMode {
    /// Auto-detect TTY capability (checks `stderr.is_terminal()`)
    #[default]
    Auto,
    /// Always include ANSI color codes
    Colored,
    /// Never include ANSI color codes
    Plain,
}

impl FormatterMode {
    /// Auto-detect formatter mode based on stderr TTY capability.
    ///
    /// Returns `FormatterMode::Colored` if stderr is a terminal, otherwise `FormatterMode::Plain`.
    pub fn auto_detect() -> Self {
        if std::io::stderr().is_terminal() {
            FormatterMode::Colored
        } else {
            FormatterMode::Plain
        }
    }

    /// Returns true if this mode should use colored output.
    ///
    /// For `Auto` mode, performs TTY detection on each call.
    pub fn is_colored(&self) -> bool {
        match self {
            FormatterMode::Auto => std::io::stderr().is_terminal(),
            FormatterMode::Colored => true,
            FormatterMode::Plain => false,
        }
    }
}

/// Rendered output for a telemetry item that can be consumed by sinks.
#[derive(Clone, Debug, Default)]
pub struct EventRender {
    pub context: Option<String>,
    pub lines: Vec<String>,
}

impl EventRender {
    pub fn join_lines(&self) -> String {
        self.lines.join("")
    }
}

pub trait TelemetryFormatter: Send + Sync {
    fn render_event(&self, event: &Event) -> EventRender;
    fn render_failures(&self, failures: &[IndexFailure]) -> Vec<EventRender>;
}

/// Plain text formatter with optional ANSI color codes.
///
/// Color output is controlled by [`FormatterMode`]:
/// - `Auto`: Uses color when stderr is a TTY
/// - `Colored`: Always uses color
/// - `Plain`: Never uses color
///
/// # Examples
/// ```
/// use tideline::telemetry::{FormatterMode, PlainFormatter};
///
/// // Auto-detect TTY
/// let formatter = PlainFormatter::new();
///
/// // Force colored output
/// let formatter = PlainFormatter::with_mode(FormatterMode::Colored);
///
/// // Force plain output (no colors)
/// let formatter = PlainFormatter::with_mode(FormatterMode::Plain);
/// ```
pub struct PlainFormatter {
    mode: FormatterMode,
}

impl PlainFormatter {
    /// Create a new formatter with auto-detected color mode.
    pub fn new() -> Self {
        Self {
            mode: FormatterMode::Auto,
        }
    }

    /// Create a new formatter with explicit color mode.
    pub fn with_mode(mode: FormatterMode) -> Self {
        Self { mode }
    }

    /// Get color prefix string based on current mode.
    fn color<'a>(&self, ansi_code: &'a str) -> &'a str {
        if self.mode.is_colored() {
            ansi_code
        } else {
            ""
        }
    }

    /// Get reset color string based on current mode.
    fn reset(&self) -> &str {
        if self.mode.is_colored() {
            RESET_COLOR
        } else {
            ""
        }
    }
}

impl Default for PlainFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryFormatter for PlainFormatter {
    fn render_event(&self, event: &Event) -> EventRender {
        let line = if self.mode.is_colored() {
            format!("{LINE_COLOR}{}{RESET_COLOR}\n", event)
        } else {
            format!("{}\n", event)
        };
        EventRender {
            context: event.scope_label().map(|s| s.to_string()),
            lines: vec![line],
        }
    }

    fn render_failures(&self, failures: &[IndexFailure]) -> Vec<EventRender> {
        let use_color = self.mode.is_colored();
        failures
            .iter()
            .enumerate()
            .map(|(i, f)| {
                let mut lines = Vec::new();
                let id_str = if use_color {
                    format!("{}{}{}", self.color(CONTEXT_COLOR), f.doc_id, self.reset())
                } else {
                    f.doc_id.clone()
                };
                match f.detail.status {
                    Some(status) => lines.push(format!("[{}] {} | status {}\n", i, id_str, status)),
                    None => lines.push(format!("[{}] {}\n", i, id_str)),
                }

                if use_color {
                    lines.push(format!(
                        "{}  error: {}{}\n",
                        self.color(LINE_COLOR),
                        f.detail.reason,
                        self.reset()
                    ));
                } else {
                    lines.push(format!("  error: {}\n", f.detail.reason));
                }

                let class = if f.detail.retryable {
                    "transient"
                } else {
                    "permanent"
                };
                if use_color {
                    lines.push(format!(
                        "{}  class: {}{}\n",
                        self.color(LINE_COLOR),
                        class,
                        self.reset()
                    ));
                } else {
                    lines.push(format!("  class: {}\n", class));
                }

                EventRender {
                    context: Some(f.doc_id.clone()),
                    lines,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::ErrorDetail;

    #[test]
    fn plain_mode_renders_without_ansi() {
        let formatter = PlainFormatter::with_mode(FormatterMode::Plain);
        let render = formatter.render_event(&Event::diagnostic("driver", "starting run"));
        assert_eq!(render.join_lines(), "starting run\n");
        assert_eq!(render.context.as_deref(), Some("driver"));
    }

    #[test]
    fn colored_mode_wraps_event_line() {
        let formatter = PlainFormatter::with_mode(FormatterMode::Colored);
        let render = formatter.render_event(&Event::diagnostic("driver", "starting run"));
        let line = render.join_lines();
        assert!(line.starts_with(LINE_COLOR));
        assert!(line.contains("starting run"));
    }

    #[test]
    fn failures_render_status_and_class() {
        let formatter = PlainFormatter::with_mode(FormatterMode::Plain);
        let failures = vec![IndexFailure {
            doc_id: "forum-topic-42".to_string(),
            detail: ErrorDetail {
                status: Some(503),
                reason: "service unavailable".to_string(),
                retryable: true,
            },
        }];
        let renders = formatter.render_failures(&failures);
        assert_eq!(renders.len(), 1);
        let text = renders[0].join_lines();
        assert!(text.contains("[0] forum-topic-42 | status 503"));
        assert!(text.contains("error: service unavailable"));
        assert!(text.contains("class: transient"));
    }
}
