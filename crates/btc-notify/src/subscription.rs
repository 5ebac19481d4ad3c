//! This module contains the core [`Subscription`] type that consumers of this API will use to
//! observe new events.
use std::{
    pin::Pin,
    task::{Context, Poll},
};

use tokio::sync::mpsc;

/// The primary type that consumers of this API will handle. It is created via one of the
/// `register_*` calls of a [`crate::traits::ChainNotifier`]. From there you should use it via its
/// [`futures::Stream`] API.
///
/// Dropping a subscription cancels it: the producer notices the closed channel and forgets the
/// registration.
#[derive(Debug)]
pub struct Subscription<T> {
    receiver: mpsc::UnboundedReceiver<T>,
}

impl<T> Subscription<T> {
    /// Wraps the receiving half of a channel.
    ///
    /// Exposed so that alternative [`crate::traits::ChainNotifier`] implementations can hand out
    /// subscriptions too.
    pub fn from_receiver(receiver: mpsc::UnboundedReceiver<T>) -> Subscription<T> {
        Subscription { receiver }
    }

    /// Creates a connected sender and subscription pair.
    pub fn channel() -> (mpsc::UnboundedSender<T>, Subscription<T>) {
        let (send, recv) = mpsc::unbounded_channel();
        (send, Subscription::from_receiver(recv))
    }
}

impl<T> futures::Stream for Subscription<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}
