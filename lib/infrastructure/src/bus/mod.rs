use tokio::sync::broadcast::error::RecvError;

pub struct EventBus<T> {
    tx: tokio::sync::broadcast::Sender<T>,
}

pub struct EventListener<T> {
    rx: tokio::sync::broadcast::Receiver<T>,
}

#[derive(Clone)]
pub struct EventEmitter<T> {
    tx: tokio::sync::broadcast::Sender<T>,
}

impl<T: Clone + std::fmt::Debug> EventBus<T> {
    pub fn new(buffer_size: usize) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(buffer_size);
        Self { tx }
    }

    pub fn subscribe(&self) -> EventListener<T> {
        EventListener::new(self.tx.subscribe())
    }

    pub fn emitter(&self) -> EventEmitter<T> {
        EventEmitter::new(self.tx.clone())
    }
}

impl<T: Clone> EventListener<T> {
    pub fn new(rx: tokio::sync::broadcast::Receiver<T>) -> Self {
        Self { rx }
    }

    /// Waits for the next event. Lagging listeners skip what they missed and keep going,
    /// `None` means every emitter is gone.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Closed) => {
                    tracing::debug!("Channel for event receiver of {} is closed", std::any::type_name::<T>());
                    return None;
                }
                Err(RecvError::Lagged(count)) => {
                    tracing::warn!(
                        "Channel for event receiver of {} lagged by {} messages",
                        std::any::type_name::<T>(),
                        count
                    );
                }
            }
        }
    }

}

impl<T: Clone + std::fmt::Debug> EventEmitter<T> {
    fn new(tx: tokio::sync::broadcast::Sender<T>) -> Self {
        Self { tx }
    }

    //no subscribers is a normal situation for most events
    pub fn send(&self, event: T) {
        if self.tx.receiver_count() == 0 {
            return;
        }

        if let Err(e) = self.tx.send(event) {
            tracing::error!("Error sending event {:?}", e.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn listener_receives_events_emitted_after_subscribe() {
        let bus = EventBus::<u32>::new(4);
        let mut listener = bus.subscribe();
        let emitter = bus.emitter();

        emitter.send(1);
        emitter.send(2);

        assert_eq!(listener.recv().await, Some(1));
        assert_eq!(listener.recv().await, Some(2));
        assert!(tokio::time::timeout(Duration::from_millis(10), listener.recv()).await.is_err());
    }

    #[tokio::test]
    async fn listener_ends_when_bus_is_dropped() {
        let bus = EventBus::<u32>::new(4);
        let mut listener = bus.subscribe();

        drop(bus);

        assert_eq!(listener.recv().await, None);
    }

    #[tokio::test]
    async fn lagging_listener_skips_to_buffered_events() {
        let bus = EventBus::<u32>::new(2);
        let mut listener = bus.subscribe();
        let emitter = bus.emitter();

        for i in 0..5 {
            emitter.send(i);
        }

        assert_eq!(listener.recv().await, Some(3));
        assert_eq!(listener.recv().await, Some(4));
    }
}
