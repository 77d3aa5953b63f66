//! The transport seam.
//!
//! Concrete transports (a plugin-messaging relay, a Redis connection) live in
//! the embedding host; the core only sees [`Broker`] for outbound frames and
//! feeds inbound frames through [`FrameSink`]. Delivery is best effort: a
//! failed publish is reported once and never retried here.
//!
//! [`LoopbackHub`] is the one in-crate transport, an in-memory bus that
//! delivers every published frame to every attached sink, the publisher
//! included. Pub/sub stores behave the same way, so code written against the
//! hub tolerates hearing its own frames.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("Transport is closed")]
    Closed,

    #[error("Transport failure: {0}")]
    Failure(String),
}

/// Outbound side of a transport: fire a frame at a logical channel.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn publish(&self, channel: &str, frame: Bytes) -> Result<(), TransportError>;
}

/// Inbound side: the transport calls this for every frame arriving on a
/// subscribed channel. Implementations must not block the delivery path.
#[async_trait]
pub trait FrameSink: Send + Sync {
    async fn on_frame(&self, channel: &str, frame: Bytes);
}

type SinkList = Arc<Mutex<Vec<Arc<dyn FrameSink>>>>;

/// In-memory broker bus connecting any number of nodes in one process.
#[derive(Clone, Default)]
pub struct LoopbackHub {
    sinks: SinkList,
}

impl LoopbackHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a receiver for every frame published through this hub.
    pub fn attach(&self, sink: Arc<dyn FrameSink>) {
        self.sinks.lock().push(sink);
    }

    /// A publishing handle onto this hub.
    pub fn broker(&self) -> LoopbackBroker {
        LoopbackBroker {
            sinks: self.sinks.clone(),
        }
    }
}

#[derive(Clone)]
pub struct LoopbackBroker {
    sinks: SinkList,
}

#[async_trait]
impl Broker for LoopbackBroker {
    async fn publish(&self, channel: &str, frame: Bytes) -> Result<(), TransportError> {
        let sinks: Vec<_> = self.sinks.lock().iter().cloned().collect();
        for sink in sinks {
            sink.on_frame(channel, frame.clone()).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        frames: Mutex<Vec<(String, Bytes)>>,
    }

    #[async_trait]
    impl FrameSink for Recorder {
        async fn on_frame(&self, channel: &str, frame: Bytes) {
            self.frames.lock().push((channel.to_string(), frame));
        }
    }

    #[test_log::test(tokio::test)]
    async fn hub_delivers_to_every_sink() {
        let hub = LoopbackHub::new();
        let a = Arc::new(Recorder::default());
        let b = Arc::new(Recorder::default());
        hub.attach(a.clone());
        hub.attach(b.clone());

        let broker = hub.broker();
        broker
            .publish("waygate:main", Bytes::from_static(b"hello"))
            .await
            .unwrap();

        assert_eq!(a.frames.lock().len(), 1);
        assert_eq!(b.frames.lock().len(), 1);
        assert_eq!(a.frames.lock()[0].0, "waygate:main");
    }

    #[test_log::test(tokio::test)]
    async fn publisher_hears_its_own_frames() {
        let hub = LoopbackHub::new();
        let sink = Arc::new(Recorder::default());
        hub.attach(sink.clone());

        hub.broker()
            .publish("waygate:main", Bytes::from_static(b"self"))
            .await
            .unwrap();

        assert_eq!(sink.frames.lock().len(), 1);
    }
}
