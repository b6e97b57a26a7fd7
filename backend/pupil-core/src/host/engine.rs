use crate::protocol::Notification;

/// The tracking engine as the dispatcher sees it: a sink for notifications.
///
/// Calibration and recording are performed elsewhere; the engine reports
/// progress by emitting lifecycle notifications, which are fed back to the
/// dispatcher through [`CommandDispatcher::on_notify`](crate::host::CommandDispatcher::on_notify).
pub trait TrackingEngine: Send {
    /// Deliver `notification` to every component of the host.
    fn notify_all(&mut self, notification: Notification);
}
