use std::{fmt, path::PathBuf, sync::Arc};

use anyhow::Result;
use serde_json::Value;
use shared_event_bus::{EventPublisher, EventRecord};
use shared_logging::{JsonLogger, LogLevel, LogRecord};
use tokio::runtime::{Handle, Runtime};

/// Builder for wizard telemetry sinks.
pub struct WizardTelemetryBuilder {
    module: String,
    session: Option<String>,
    log_path: Option<PathBuf>,
    event_publisher: Option<Arc<dyn EventPublisher>>,
}

impl WizardTelemetryBuilder {
    /// Creates the builder scoped to a module label.
    #[must_use]
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            session: None,
            log_path: None,
            event_publisher: None,
        }
    }

    /// Tags every record with a session id.
    #[must_use]
    pub fn session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }

    /// Sets the log path.
    #[must_use]
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Sets the event publisher.
    #[must_use]
    pub fn event_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.event_publisher = Some(publisher);
        self
    }

    /// Builds the telemetry handle.
    pub fn build(self) -> Result<WizardTelemetry> {
        let logger = self.log_path.map(JsonLogger::new).transpose()?.map(Arc::new);
        Ok(WizardTelemetry {
            inner: Arc::new(TelemetryInner {
                module: self.module,
                session: self.session,
                logger,
                publisher: self.event_publisher,
            }),
        })
    }
}

/// Telemetry handle shared across wizard components.
#[derive(Clone)]
pub struct WizardTelemetry {
    inner: Arc<TelemetryInner>,
}

impl fmt::Debug for WizardTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WizardTelemetry")
            .field("module", &self.inner.module)
            .field("session", &self.inner.session)
            .finish()
    }
}

struct TelemetryInner {
    module: String,
    session: Option<String>,
    logger: Option<Arc<JsonLogger>>,
    publisher: Option<Arc<dyn EventPublisher>>,
}

impl WizardTelemetry {
    /// Returns a builder.
    #[must_use]
    pub fn builder(module: impl Into<String>) -> WizardTelemetryBuilder {
        WizardTelemetryBuilder::new(module)
    }

    /// Same sinks, different session tag.
    #[must_use]
    pub fn for_session(&self, session: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(TelemetryInner {
                module: self.inner.module.clone(),
                session: Some(session.into()),
                logger: self.inner.logger.clone(),
                publisher: self.inner.publisher.clone(),
            }),
        }
    }

    /// Logs structured metadata.
    pub fn log(&self, level: LogLevel, message: &str, metadata: Value) -> Result<()> {
        if let Some(logger) = &self.inner.logger {
            let mut record = LogRecord::new(&self.inner.module, level, message).with_metadata(metadata);
            record.session.clone_from(&self.inner.session);
            logger.log(&record)?;
        }
        Ok(())
    }

    /// Emits an event on the bus; the session id is folded into the payload.
    pub fn event(&self, event_type: &str, payload: Value) -> Result<()> {
        let Some(publisher) = &self.inner.publisher else {
            return Ok(());
        };
        let payload = match (payload, &self.inner.session) {
            (Value::Object(mut map), Some(session)) => {
                map.insert("session".into(), Value::String(session.clone()));
                Value::Object(map)
            }
            (other, _) => other,
        };
        let record = EventRecord::new(self.inner.module.clone(), event_type, payload);
        if let Ok(handle) = Handle::try_current() {
            let publisher = Arc::clone(publisher);
            handle.spawn(async move {
                if let Err(err) = publisher.publish(record).await {
                    eprintln!("wizard telemetry publish failed: {err:?}");
                }
            });
            Ok(())
        } else {
            Runtime::new()?.block_on(publisher.publish(record))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared_event_bus::MemoryEventBus;
    use tempfile::tempdir;

    #[test]
    fn telemetry_writes_log_and_event() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("wizard.log");
        let bus = Arc::new(MemoryEventBus::new(16));
        let telemetry = WizardTelemetry::builder("wizard")
            .session("sess-42")
            .log_path(&path)
            .event_publisher(bus.clone())
            .build()
            .unwrap();
        telemetry
            .log(LogLevel::Info, "wizard.step_changed", json!({ "to": "models" }))
            .unwrap();
        telemetry
            .event("wizard.training_completed", json!({ "models": 2 }))
            .unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("wizard.step_changed"));
        assert!(content.contains("sess-42"));
        let events = bus.snapshot();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload["session"], "sess-42");
    }

    #[test]
    fn session_handles_share_the_log_writer() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("wizard.log");
        let root = WizardTelemetry::builder("wizard").log_path(&path).build().unwrap();
        let tagged = root.for_session("sess-7");
        let (Some(shared), Some(own)) = (&root.inner.logger, &tagged.inner.logger) else {
            panic!("both handles should carry a logger");
        };
        assert!(Arc::ptr_eq(shared, own));

        root.log(LogLevel::Info, "first", json!({})).unwrap();
        tagged.log(LogLevel::Info, "second", json!({})).unwrap();
        let records = own.tail(10).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].session, None);
        assert_eq!(records[1].session.as_deref(), Some("sess-7"));
    }

    #[test]
    fn telemetry_without_sinks_is_silent() {
        let telemetry = WizardTelemetry::builder("wizard").build().unwrap();
        assert!(telemetry.log(LogLevel::Debug, "noop", json!({})).is_ok());
        assert!(telemetry.event("wizard.noop", json!({})).is_ok());
    }
}
