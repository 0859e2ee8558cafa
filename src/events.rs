//! Notification broadcasting for preview consumers.
//!
//! The coordinator and the watch loop publish what happened; any number of
//! frontends (the CLI status line, tests) subscribe.

use std::path::PathBuf;
use tokio::sync::broadcast;

use crate::watcher::SignalOrigin;

#[derive(Debug, Clone, PartialEq)]
pub enum PreviewEvent {
    /// A change to watched files was detected and handed to the coordinator
    FileChanged {
        paths: Vec<PathBuf>,
        origin: SignalOrigin,
    },
    /// A new preview artifact replaced the previous one
    Regenerated { artifact: PathBuf, version: u64 },
    RegenerationFailed { message: String },
    /// Event-based watching is unreliable; polling keeps running
    WatcherDegraded { reason: String },
}

/// Fan-out of [`PreviewEvent`]s to every subscriber
#[derive(Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<PreviewEvent>,
}

impl EventBroadcaster {
    /// Create a new broadcaster with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Send an event to all subscribers
    pub fn send(&self, event: PreviewEvent) {
        match self.sender.send(event.clone()) {
            Ok(count) => {
                crate::debug_event!("broadcast", "sent", "{event:?} to {count} subscribers");
            }
            Err(_) => {
                // No receivers, this is fine
                crate::debug_event!("broadcast", "dropped", "no subscribers for {event:?}");
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PreviewEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_every_subscriber_receives() {
        let broadcaster = EventBroadcaster::new(8);
        let mut first = broadcaster.subscribe();
        let mut second = broadcaster.subscribe();

        broadcaster.send(PreviewEvent::WatcherDegraded {
            reason: "inotify limit".to_string(),
        });

        assert!(matches!(
            first.recv().await.unwrap(),
            PreviewEvent::WatcherDegraded { .. }
        ));
        assert!(matches!(
            second.recv().await.unwrap(),
            PreviewEvent::WatcherDegraded { .. }
        ));
    }

    #[test]
    fn test_send_without_subscribers_is_fine() {
        let broadcaster = EventBroadcaster::default();
        broadcaster.send(PreviewEvent::RegenerationFailed {
            message: "nobody listens".to_string(),
        });
    }
}
