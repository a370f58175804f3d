//! Progress Reporter.
//!
//! Pushes [`ProgressEvent`]s to the owner's live connection, if one is
//! registered. Delivery is fire-and-forget: a missing connection is a no-op
//! and a failed send is logged and dropped. Never blocks the caller.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use aura_models::ProgressEvent;

use crate::metrics;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("connection closed")]
    Closed,

    #[error("connection outbound buffer full")]
    Full,
}

/// A client channel for progress push.
pub trait LiveConnection: Send + Sync {
    /// Queue `payload` for delivery without waiting.
    fn send(&self, payload: String) -> Result<(), DeliveryError>;
}

/// Lookup of live connections by owner identity.
pub trait ConnectionRegistry: Send + Sync {
    fn lookup(&self, owner_id: &str) -> Option<Arc<dyn LiveConnection>>;
}

/// Registry with no connections, for headless runs.
#[derive(Debug, Default, Clone)]
pub struct NoConnections;

impl ConnectionRegistry for NoConnections {
    fn lookup(&self, _owner_id: &str) -> Option<Arc<dyn LiveConnection>> {
        None
    }
}

#[derive(Clone)]
pub struct ProgressReporter {
    registry: Arc<dyn ConnectionRegistry>,
}

impl ProgressReporter {
    pub fn new(registry: Arc<dyn ConnectionRegistry>) -> Self {
        Self { registry }
    }

    pub fn disconnected() -> Self {
        Self::new(Arc::new(NoConnections))
    }

    pub fn notify(&self, owner_id: &str, event: &ProgressEvent) {
        let Some(connection) = self.registry.lookup(owner_id) else {
            return;
        };

        let payload = match event.to_json() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(task_id = %event.task_id, error = %e, "Failed to encode progress event");
                return;
            }
        };

        if let Err(e) = connection.send(payload) {
            debug!(task_id = %event.task_id, owner_id, error = %e, "Progress event dropped");
            metrics::record_progress_dropped();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aura_models::TaskId;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct Inbox {
        messages: Mutex<Vec<String>>,
        closed: bool,
    }

    impl LiveConnection for Inbox {
        fn send(&self, payload: String) -> Result<(), DeliveryError> {
            if self.closed {
                return Err(DeliveryError::Closed);
            }
            self.messages.lock().unwrap().push(payload);
            Ok(())
        }
    }

    struct Registry(HashMap<String, Arc<Inbox>>);

    impl ConnectionRegistry for Registry {
        fn lookup(&self, owner_id: &str) -> Option<Arc<dyn LiveConnection>> {
            self.0
                .get(owner_id)
                .map(|inbox| Arc::clone(inbox) as Arc<dyn LiveConnection>)
        }
    }

    fn inbox(closed: bool) -> Arc<Inbox> {
        Arc::new(Inbox {
            messages: Mutex::new(Vec::new()),
            closed,
        })
    }

    #[test]
    fn test_delivers_to_owner_only() {
        let alice = inbox(false);
        let reporter = ProgressReporter::new(Arc::new(Registry(HashMap::from([(
            "alice".to_string(),
            alice.clone(),
        )]))));
        let task = TaskId::from_string("t1");

        reporter.notify("alice", &ProgressEvent::progress(&task, 10));
        reporter.notify("bob", &ProgressEvent::progress(&task, 20));

        let messages = alice.messages.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("\"progress\":10"));
    }

    #[test]
    fn test_failed_delivery_is_swallowed() {
        let reporter = ProgressReporter::new(Arc::new(Registry(HashMap::from([(
            "alice".to_string(),
            inbox(true),
        )]))));
        reporter.notify("alice", &ProgressEvent::error(&TaskId::new(), "boom"));
    }

    #[test]
    fn test_disconnected_is_noop() {
        ProgressReporter::disconnected().notify("anyone", &ProgressEvent::progress(&TaskId::new(), 1));
    }
}
