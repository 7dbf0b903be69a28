//! Tracing setup plus optional batched delivery of warnings and errors to a
//! remote collector.
//!
//! Events are namespaced by their tracing target. The remote layer only
//! queues events at the configured levels; a background task posts them as
//! JSON batches when a batch fills up or the flush interval elapses. Delivery
//! failures are dropped silently so logging can never take the service down.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use std::{
    collections::{BTreeMap, VecDeque},
    fmt,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};
use tokio::{sync::Notify, task::JoinHandle};
use tracing::{field::Field, Event, Level, Subscriber};
use tracing_subscriber::{
    fmt as fmt_layer, layer::Context, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
    Layer,
};

const REMOTE_TARGET: &str = "remote_log";

#[derive(Debug, Clone)]
pub struct RemoteLogConfig {
    pub url: String,
    pub levels: Vec<Level>,
    pub flush_interval: Duration,
    pub batch_size: usize,
    pub max_queue: usize,
}

impl RemoteLogConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            levels: vec![Level::WARN, Level::ERROR],
            flush_interval: Duration::from_millis(5000),
            batch_size: 10,
            max_queue: 100,
        }
    }

    fn accepts(&self, level: &Level) -> bool {
        self.levels.contains(level)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    pub level: String,
    pub namespace: String,
    pub message: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, Value>,
}

#[derive(Serialize)]
struct Batch<'a> {
    reason: &'a str,
    entries: &'a [LogRecord],
}

struct Shared {
    config: RemoteLogConfig,
    queue: Mutex<VecDeque<LogRecord>>,
    notify: Notify,
    client: reqwest::Client,
}

/// Handle to the remote log queue. Cheap to clone; every clone shares the
/// same queue.
#[derive(Clone)]
pub struct RemoteLogger {
    inner: Arc<Shared>,
}

impl RemoteLogger {
    pub fn new(config: RemoteLogConfig) -> Self {
        Self {
            inner: Arc::new(Shared {
                config,
                queue: Mutex::new(VecDeque::new()),
                notify: Notify::new(),
                client: reqwest::Client::new(),
            }),
        }
    }

    pub fn layer(&self) -> RemoteLogLayer {
        RemoteLogLayer {
            logger: self.clone(),
        }
    }

    pub fn queued(&self) -> usize {
        self.queue().len()
    }

    /// Queues a record, evicting the oldest one once the queue is full.
    pub fn enqueue(&self, record: LogRecord, level: &Level) {
        let config = &self.inner.config;
        if !config.accepts(level) {
            return;
        }
        let len = {
            let mut queue = self.queue();
            if queue.len() >= config.max_queue {
                queue.pop_front();
            }
            queue.push_back(record);
            queue.len()
        };
        if len >= config.batch_size {
            self.inner.notify.notify_one();
        }
    }

    fn take_batch(&self) -> Vec<LogRecord> {
        let mut queue = self.queue();
        let count = queue.len().min(self.inner.config.batch_size);
        queue.drain(..count).collect()
    }

    /// Posts up to one batch. Returns the number of records sent.
    pub async fn flush(&self, reason: &str) -> usize {
        let entries = self.take_batch();
        if entries.is_empty() {
            return 0;
        }
        let body = Batch {
            reason,
            entries: &entries,
        };
        let result = self
            .inner
            .client
            .post(&self.inner.config.url)
            .json(&body)
            .send()
            .await;
        if let Err(err) = result {
            tracing::debug!(target: REMOTE_TARGET, "remote log delivery failed: {err}");
        }
        entries.len()
    }

    /// Runs the flush loop until the runtime shuts down.
    pub fn spawn(&self) -> JoinHandle<()> {
        let logger = self.clone();
        tokio::spawn(async move {
            let interval = logger.inner.config.flush_interval;
            loop {
                let reason = tokio::select! {
                    _ = tokio::time::sleep(interval) => "interval",
                    _ = logger.inner.notify.notified() => "batch",
                };
                while logger.flush(reason).await > 0 {
                    if logger.queued() < logger.inner.config.batch_size {
                        break;
                    }
                }
            }
        })
    }

    fn queue(&self) -> MutexGuard<'_, VecDeque<LogRecord>> {
        self.inner
            .queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub struct RemoteLogLayer {
    logger: RemoteLogger,
}

impl<S: Subscriber> Layer<S> for RemoteLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let target = metadata.target();
        // the HTTP client's own diagnostics would feed back into the queue
        if target == REMOTE_TARGET
            || target.starts_with("reqwest")
            || target.starts_with("hyper")
        {
            return;
        }
        if !self.logger.inner.config.accepts(metadata.level()) {
            return;
        }

        let mut visitor = RecordVisitor::default();
        event.record(&mut visitor);
        let record = LogRecord {
            level: metadata.level().as_str().to_ascii_lowercase(),
            namespace: target.to_string(),
            message: visitor.message,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            fields: visitor.fields,
        };
        self.logger.enqueue(record, metadata.level());
    }
}

#[derive(Default)]
struct RecordVisitor {
    message: String,
    fields: BTreeMap<String, Value>,
}

impl tracing::field::Visit for RecordVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.insert(field.name().to_string(), Value::from(value));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let text = format!("{value:?}");
        if field.name() == "message" {
            self.message = text;
        } else {
            self.fields.insert(field.name().to_string(), Value::from(text));
        }
    }
}

/// Installs the global subscriber: stdout formatting filtered by `RUST_LOG`
/// (default `info`), plus the remote layer when one is configured.
///
/// Must be called from inside a tokio runtime when `remote` is set.
pub fn init_tracing(
    remote: Option<RemoteLogConfig>,
) -> Result<Option<RemoteLogger>, Box<dyn std::error::Error>> {
    let filter = EnvFilter::from_default_env().add_directive("info".parse()?);
    let remote = remote.map(RemoteLogger::new);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer::layer())
        .with(remote.as_ref().map(RemoteLogger::layer))
        .try_init()?;

    if let Some(logger) = &remote {
        logger.spawn();
        tracing::info!(url = %logger.inner.config.url, "remote logging enabled");
    }
    Ok(remote)
}
