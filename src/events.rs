use tokio::sync::mpsc;

/// Published by handlers after their writes commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeEvent {
    CourseChanged,
    UserChanged,
}

#[derive(Clone)]
pub struct EventBus {
    tx: mpsc::UnboundedSender<ChangeEvent>,
}

impl EventBus {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ChangeEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn publish(&self, event: ChangeEvent) {
        if self.tx.send(event).is_err() {
            tracing::warn!(?event, "change event dropped, aggregator not running");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_arrive_in_order() {
        let (bus, mut rx) = EventBus::new();
        bus.publish(ChangeEvent::UserChanged);
        bus.publish(ChangeEvent::CourseChanged);
        assert_eq!(rx.recv().await, Some(ChangeEvent::UserChanged));
        assert_eq!(rx.recv().await, Some(ChangeEvent::CourseChanged));
    }

    #[test]
    fn publish_without_receiver_does_not_panic() {
        let (bus, rx) = EventBus::new();
        drop(rx);
        bus.publish(ChangeEvent::CourseChanged);
    }
}
