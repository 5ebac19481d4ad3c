//! Capabilities the tracker requires from its environment.

use btc_notify::traits::{Broadcaster, Reader};

/// A Bitcoin node the tracker can both read from and broadcast to.
pub trait BtcNode: Reader + Broadcaster {}

impl<T: Reader + Broadcaster + ?Sized> BtcNode for T {}
