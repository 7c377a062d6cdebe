//! Lifecycle events for observers.
//!
//! Emitted on a [`tokio::sync::broadcast`] channel so loggers or progress
//! displays can follow a run without hooking into the executor.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LifecycleEvent {
    RunStarted {
        target: Option<String>,
        order: Vec<String>,
    },
    NodeStarted {
        name: String,
        stage: u8,
    },
    StateEntered {
        name: String,
        state: String,
    },
    HookFinished {
        name: String,
        phase: String,
        hook: String,
        status: String,
    },
    NodeCompleted {
        name: String,
        duration_ms: u64,
    },
    NodeFailed {
        name: String,
        reason: String,
    },
    RunCompleted {
        target: Option<String>,
        success: bool,
        duration_ms: u64,
    },
}

#[derive(Clone)]
pub struct EventEmitter {
    sender: tokio::sync::broadcast::Sender<LifecycleEvent>,
}

impl EventEmitter {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    /// Dropped silently when nobody is subscribed.
    pub fn emit(&self, event: LifecycleEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_events_in_order() {
        let emitter = EventEmitter::new(16);
        let mut rx = emitter.subscribe();

        emitter.emit(LifecycleEvent::NodeStarted {
            name: "setup".into(),
            stage: 0,
        });
        emitter.emit(LifecycleEvent::NodeCompleted {
            name: "setup".into(),
            duration_ms: 5,
        });

        assert_eq!(
            rx.recv().await.unwrap(),
            LifecycleEvent::NodeStarted {
                name: "setup".into(),
                stage: 0
            }
        );
        assert!(matches!(
            rx.recv().await.unwrap(),
            LifecycleEvent::NodeCompleted { .. }
        ));
    }

    #[test]
    fn emit_without_subscribers_is_fine() {
        EventEmitter::new(4).emit(LifecycleEvent::RunCompleted {
            target: None,
            success: true,
            duration_ms: 0,
        });
    }
}
