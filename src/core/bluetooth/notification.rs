//! Notification handling for the Blox command characteristic
//! This module turns the BLE stack's notification stream into an owned
//! subscription that a command channel can hold and tear down.

use bluest::Characteristic;
use futures_util::StreamExt;
use log::{debug, error, info};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::core::bluetooth::constants::NOTIFICATION_QUEUE_CAPACITY;
use crate::error::{Result, TransportError};

/// Keeps a background forwarder alive; cancelling or dropping it stops the
/// forwarder. Cancelling twice is a no-op.
#[derive(Debug)]
pub struct Subscription {
    cancel_token: CancellationToken,
}

impl Subscription {
    pub fn new(cancel_token: CancellationToken) -> Self {
        Self { cancel_token }
    }

    pub fn token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    pub fn unsubscribe(&self) {
        self.cancel_token.cancel();
    }

    pub fn is_active(&self) -> bool {
        !self.cancel_token.is_cancelled()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

/// Raw notification payloads from one characteristic.
pub struct NotificationStream {
    receiver: mpsc::Receiver<Vec<u8>>,
    subscription: Subscription,
}

impl NotificationStream {
    pub fn new(receiver: mpsc::Receiver<Vec<u8>>, cancel_token: CancellationToken) -> Self {
        Self {
            receiver,
            subscription: Subscription::new(cancel_token),
        }
    }

    pub fn into_parts(self) -> (mpsc::Receiver<Vec<u8>>, Subscription) {
        (self.receiver, self.subscription)
    }
}

/// Enable notifications on `characteristic` and forward every value into a
/// queue until the returned stream's subscription is cancelled.
pub async fn forward_notifications(characteristic: Characteristic) -> Result<NotificationStream> {
    info!("Subscribing to notifications on {}...", characteristic.uuid());

    let (sender, receiver) = mpsc::channel(NOTIFICATION_QUEUE_CAPACITY);
    let (ready_tx, ready_rx) = oneshot::channel();
    let cancel_token = CancellationToken::new();
    let cancel_for_task = cancel_token.clone();

    tokio::spawn(async move {
        let mut notification_stream = match characteristic.notify().await {
            Ok(stream) => {
                let _ = ready_tx.send(Ok(()));
                stream
            }
            Err(e) => {
                let _ = ready_tx.send(Err(TransportError::from(e)));
                return;
            }
        };

        loop {
            tokio::select! {
                _ = cancel_for_task.cancelled() => break,
                result = notification_stream.next() => match result {
                    Some(Ok(value)) => {
                        debug!("Received notification: {} bytes", value.len());
                        if sender.send(value).await.is_err() {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        error!("Error in notification stream: {}", e);
                        break;
                    }
                    None => break,
                },
            }
        }

        // Dropping the stream disables notifications on the peripheral.
        info!("Notification stream ended");
    });

    match ready_rx.await {
        Ok(Ok(())) => Ok(NotificationStream::new(receiver, cancel_token)),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(TransportError::NotificationsUnavailable),
    }
}

/// Feed each queued payload to `handler` until the subscription is
/// cancelled or the queue closes.
pub async fn pump_notifications<F>(
    mut receiver: mpsc::Receiver<Vec<u8>>,
    cancel_token: CancellationToken,
    mut handler: F,
) where
    F: FnMut(Vec<u8>) + Send,
{
    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => break,
            value = receiver.recv() => match value {
                Some(value) => handler(value),
                None => break,
            },
        }
    }
    debug!("Notification pump stopped");
}
