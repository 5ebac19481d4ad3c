//! This module contains the [`Subscription`] type handed out by
//! [`crate::traits::AppChainClient::subscribe`].
use std::{
    pin::Pin,
    task::{Context, Poll},
};

use tokio::sync::mpsc;

/// A stream of App-chain events. Use it via its [`futures::Stream`] API.
///
/// The stream ends when the subscription is cancelled with
/// [`crate::traits::AppChainClient::unsubscribe`] or the connection is lost.
#[derive(Debug)]
pub struct Subscription<T> {
    receiver: mpsc::Receiver<T>,
}

impl<T> Subscription<T> {
    /// Wraps the receiving half of a channel.
    pub const fn from_receiver(receiver: mpsc::Receiver<T>) -> Subscription<T> {
        Subscription { receiver }
    }

    /// Creates a connected sender and subscription pair holding up to `capacity` events.
    pub fn channel(capacity: usize) -> (mpsc::Sender<T>, Subscription<T>) {
        let (send, recv) = mpsc::channel(capacity);
        (send, Subscription::from_receiver(recv))
    }
}

impl<T> futures::Stream for Subscription<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}
