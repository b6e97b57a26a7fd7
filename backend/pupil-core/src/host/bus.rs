//! In-process notification fan-out.
//!
//! Every host component holds a clone of the bus. Publishing never blocks; a
//! subscriber that falls more than `capacity` notifications behind loses the
//! oldest ones and is told how many it skipped.

use crate::host::engine::TrackingEngine;
use crate::protocol::Notification;

use log::trace;
use tokio::sync::broadcast::{self, Receiver, Sender};

#[derive(Clone)]
pub struct NotificationBus {
    sender: Sender<Notification>,
}

impl NotificationBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Returns the number of subscribers that will see the notification.
    pub fn publish(&self, notification: Notification) -> usize {
        let subject = notification.subject();
        match self.sender.send(notification) {
            Ok(receivers) => receivers,
            Err(_) => {
                trace!("No subscribers for notification '{subject}'");
                0
            }
        }
    }

    pub fn subscribe(&self) -> Receiver<Notification> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl TrackingEngine for NotificationBus {
    fn notify_all(&mut self, notification: Notification) {
        self.publish(notification);
    }
}
