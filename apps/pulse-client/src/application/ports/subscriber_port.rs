//! Subscriber Port (Driver Port)
//!
//! Anything that wants envelopes for a topic. Closures and unbounded
//! channel senders both qualify.

use std::sync::Arc;

use pulse_protocol::Envelope;
use tokio::sync::mpsc;

/// Receives envelopes for one local subscription.
///
/// Errors are logged by the dispatcher and never reach other subscribers.
pub trait Subscriber: Send + Sync {
    /// Handle one envelope.
    ///
    /// # Errors
    ///
    /// Any error the subscriber wants logged.
    fn notify(&self, envelope: &Envelope) -> anyhow::Result<()>;
}

/// Shared handle stored by the connection manager.
pub type SharedSubscriber = Arc<dyn Subscriber>;

impl<F> Subscriber for F
where
    F: Fn(&Envelope) -> anyhow::Result<()> + Send + Sync,
{
    fn notify(&self, envelope: &Envelope) -> anyhow::Result<()> {
        self(envelope)
    }
}

impl Subscriber for mpsc::UnboundedSender<Envelope> {
    fn notify(&self, envelope: &Envelope) -> anyhow::Result<()> {
        self.send(envelope.clone())
            .map_err(|_| anyhow::anyhow!("subscription receiver dropped"))
    }
}

#[cfg(test)]
mod tests {
    use pulse_protocol::Topic;
    use serde_json::json;

    use super::*;

    #[test]
    fn channel_subscriber_forwards_envelopes() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let envelope = Envelope::new(Topic::News, json!({ "headline": "hi" }));

        tx.notify(&envelope).unwrap();
        assert_eq!(rx.try_recv().unwrap(), envelope);

        drop(rx);
        tokio_test::assert_err!(tx.notify(&envelope));
    }

    #[test]
    fn closure_subscriber_returns_its_result() {
        let subscriber = |envelope: &Envelope| -> anyhow::Result<()> {
            anyhow::ensure!(envelope.kind == Topic::Trade, "unexpected topic");
            Ok(())
        };
        tokio_test::assert_ok!(subscriber.notify(&Envelope::new(Topic::Trade, json!({}))));
        tokio_test::assert_err!(subscriber.notify(&Envelope::new(Topic::Price, json!({}))));
    }
}
