use crate::communicator::events::{Event, EventCategory};

pub type EventCallback = Box<dyn FnMut(&Event) + Send>;

/// One optional callback per category. Registering replaces the previous one.
#[derive(Default)]
pub struct Callbacks {
    calibration: Option<EventCallback>,
    recording: Option<EventCallback>,
    network: Option<EventCallback>,
    subscription: Option<EventCallback>,
}

impl Callbacks {
    pub fn set(&mut self, category: EventCategory, callback: EventCallback) {
        *self.slot_mut(category) = Some(callback);
    }

    /// Invoke the callback registered for the event's category, if any.
    pub fn dispatch(&mut self, event: &Event) {
        let Some(category) = event.kind.category() else {
            return;
        };
        if let Some(callback) = self.slot_mut(category) {
            callback(event);
        }
    }

    fn slot_mut(&mut self, category: EventCategory) -> &mut Option<EventCallback> {
        match category {
            EventCategory::Calibration => &mut self.calibration,
            EventCategory::Recording => &mut self.recording,
            EventCategory::Network => &mut self.network,
            EventCategory::Subscription => &mut self.subscription,
        }
    }
}
