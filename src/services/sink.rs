use tokio::sync::{broadcast, mpsc};

use crate::api::middleware::AppError;
use crate::models::Event;

/// Consumer-supplied destination for gateway events.
pub trait EventSink: Send + Sync {
    fn send(&self, event: Event);
}

impl EventSink for mpsc::UnboundedSender<Event> {
    fn send(&self, event: Event) {
        if mpsc::UnboundedSender::send(self, event).is_err() {
            tracing::debug!("Event receiver dropped; event discarded");
        }
    }
}

impl EventSink for broadcast::Sender<Event> {
    fn send(&self, event: Event) {
        // No subscribers is not an error: nobody is listening right now
        let _ = broadcast::Sender::send(self, event);
    }
}

/// Deliver every event to both sinks, in order.
impl<A: EventSink, B: EventSink> EventSink for (A, B) {
    fn send(&self, event: Event) {
        self.0.send(event.clone());
        self.1.send(event);
    }
}

/// Thin wrapper that mirrors consumer events into tracing.
#[derive(Clone, Copy)]
pub struct Emitter<'a> {
    sink: &'a dyn EventSink,
}

impl<'a> Emitter<'a> {
    pub fn new(sink: &'a dyn EventSink) -> Self {
        Self { sink }
    }

    pub fn emit(&self, event: Event) {
        tracing::debug!("Emitting {} event", event.kind());
        self.sink.send(event);
    }

    pub fn log(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("{}", message);
        self.sink.send(Event::log(message));
    }

    pub fn error(&self, err: &AppError) {
        tracing::error!("{}", err);
        self.sink.send(Event::error(err));
    }

    pub fn table_error(&self, table: &str, err: &AppError) {
        tracing::error!("Preview of table {} failed: {}", table, err);
        self.sink.send(Event::table_error(table, err));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbounded_sink_delivers_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
        let emitter = Emitter::new(&tx);
        emitter.log("first");
        emitter.emit(Event::Disconnected);

        assert!(matches!(rx.try_recv().unwrap(), Event::Log(entry) if entry.message == "first"));
        assert_eq!(rx.try_recv().unwrap(), Event::Disconnected);
    }

    #[test]
    fn test_dropped_receiver_is_ignored() {
        let (tx, rx) = mpsc::unbounded_channel::<Event>();
        drop(rx);
        EventSink::send(&tx, Event::Disconnected);
    }

    #[test]
    fn test_pair_sink_fans_out() {
        let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
        let (btx, mut brx) = broadcast::channel::<Event>(4);
        let pair = (tx, btx);
        EventSink::send(&pair, Event::Disconnected);

        assert_eq!(rx.try_recv().unwrap(), Event::Disconnected);
        assert_eq!(brx.try_recv().unwrap(), Event::Disconnected);
    }
}
