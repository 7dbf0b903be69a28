use crate::models::QuitState;
use crate::storage::KeyValueStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Time source for handlers, swappable in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn KeyValueStore>,
    pub clock: Arc<dyn Clock>,
    pub data: Arc<Mutex<QuitState>>,
}

impl AppState {
    pub fn new(store: Arc<dyn KeyValueStore>, data: QuitState) -> Self {
        Self::with_clock(store, Arc::new(SystemClock), data)
    }

    pub fn with_clock(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        data: QuitState,
    ) -> Self {
        Self {
            store,
            clock,
            data: Arc::new(Mutex::new(data)),
        }
    }
}
