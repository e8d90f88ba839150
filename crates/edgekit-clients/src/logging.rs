//! Fan-out logging sinks.
//!
//! The service installs one [`FanoutLayer`] next to the usual fmt layer at
//! construction time. The layer starts inert; once the effective
//! configuration is known, bring-up attaches a file sink and/or a remote
//! sink through the [`LogControl`] handle. Reconfiguration replaces the sink
//! list atomically, and stopping the service detaches every sink, which
//! also terminates the remote forwarding task.

use std::fmt::Write as _;
use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::sync::{Arc, Mutex, RwLock};

use serde::Serialize;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use edgekit_core::{time_millis, Endpoint};

/// One entry posted to the support-logging service.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub origin_service: String,
    pub log_level: String,
    pub message: String,
    /// Timestamp in milliseconds.
    pub created: u64,
}

enum Sink {
    File(Mutex<File>),
    Remote(tokio::sync::mpsc::UnboundedSender<LogEntry>),
}

struct Shared {
    service: String,
    max_level: RwLock<Level>,
    sinks: RwLock<Vec<Sink>>,
}

/// Layer that fans events out to the attached sinks.
pub struct FanoutLayer {
    shared: Arc<Shared>,
}

/// Handle for attaching and detaching sinks at runtime.
#[derive(Clone)]
pub struct LogControl {
    shared: Arc<Shared>,
}

/// Build the fan-out layer and its control handle for `service`.
pub fn fanout(service: &str) -> (FanoutLayer, LogControl) {
    let shared = Arc::new(Shared {
        service: service.to_string(),
        max_level: RwLock::new(Level::INFO),
        sinks: RwLock::new(Vec::new()),
    });
    (
        FanoutLayer {
            shared: shared.clone(),
        },
        LogControl { shared },
    )
}

/// Parse a configured level name; unknown names fall back to INFO.
pub fn parse_level(level: &str) -> Level {
    match level.to_ascii_uppercase().as_str() {
        "TRACE" => Level::TRACE,
        "DEBUG" => Level::DEBUG,
        "WARN" | "WARNING" => Level::WARN,
        "ERROR" => Level::ERROR,
        _ => Level::INFO,
    }
}

impl LogControl {
    /// Set the maximum verbosity forwarded to the sinks.
    pub fn set_level(&self, level: &str) {
        if let Ok(mut max) = self.shared.max_level.write() {
            *max = parse_level(level);
        }
    }

    /// Attach an append-mode file sink.
    pub fn attach_file(&self, path: &str) -> std::io::Result<()> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        if let Ok(mut sinks) = self.shared.sinks.write() {
            sinks.push(Sink::File(Mutex::new(file)));
        }
        Ok(())
    }

    /// Attach a remote sink posting entries to the support-logging service.
    ///
    /// Spawns the forwarding task; it exits when the sink is detached.
    pub fn attach_remote(&self, client: reqwest::Client, endpoint: &Endpoint) {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<LogEntry>();
        let url = format!("{}/api/v1/logs", endpoint.base_url());
        tokio::spawn(async move {
            while let Some(entry) = rx.recv().await {
                // Forwarding is best-effort; a failed post must not log,
                // or it would feed back into this sink.
                let _ = client.post(&url).json(&entry).send().await;
            }
        });
        if let Ok(mut sinks) = self.shared.sinks.write() {
            sinks.push(Sink::Remote(tx));
        }
    }

    /// Detach every sink. Closes the remote channel, which terminates the
    /// forwarding task after the queue drains.
    pub fn detach_all(&self) {
        if let Ok(mut sinks) = self.shared.sinks.write() {
            sinks.clear();
        }
    }
}

struct MessageVisitor<'a>(&'a mut String);

impl Visit for MessageVisitor<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.0, "{value:?}");
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.0.push_str(value);
        }
    }
}

impl<S: Subscriber> Layer<S> for FanoutLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let level = *event.metadata().level();
        match self.shared.max_level.read() {
            Ok(max) if level <= *max => {}
            _ => return,
        }

        let sinks = match self.shared.sinks.read() {
            Ok(sinks) if !sinks.is_empty() => sinks,
            _ => return,
        };

        let mut message = String::new();
        event.record(&mut MessageVisitor(&mut message));
        let created = time_millis();

        for sink in sinks.iter() {
            match sink {
                Sink::File(file) => {
                    if let Ok(mut file) = file.lock() {
                        let _ = writeln!(
                            file,
                            "{} {:5} {}: {}",
                            created, level, self.shared.service, message
                        );
                    }
                }
                Sink::Remote(tx) => {
                    let _ = tx.send(LogEntry {
                        origin_service: self.shared.service.clone(),
                        log_level: level.to_string(),
                        message: message.clone(),
                        created,
                    });
                }
            }
        }
    }
}
