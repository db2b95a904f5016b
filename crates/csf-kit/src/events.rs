//! State notifications delivered to the element hosting the secured fields.

use csf_core::{
    errors::{ConfigurationError, FrameLoadFailure},
    types::{Brand, FieldName},
};

use crate::controller::FieldState;

/// A state change, in the order the causing frame messages were received.
#[derive(Debug, Clone, PartialEq)]
pub enum CsfEvent {
    /// Every required field became valid, or stopped being so.
    AllValid(bool),
    /// A field's validity or error code changed.
    FieldValidation { field: FieldName, state: FieldState },
    /// The detected brand changed; `None` once the card number no longer identifies one.
    BrandDetected(Option<Brand>),
    Focus { field: FieldName, focused: bool },
    /// A frame never completed its handshake. The field is degraded.
    FrameLoadFailed(FrameLoadFailure),
    /// Every frame completed its handshake.
    AllFramesReady,
    Error(ConfigurationError),
}

/// Receives [`CsfEvent`]s.
pub trait Observer {
    fn notify(&mut self, event: &CsfEvent);
}

impl<F> Observer for F
where
    F: FnMut(&CsfEvent),
{
    fn notify(&mut self, event: &CsfEvent) {
        self(event)
    }
}

/// Handle for removing an observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
pub(crate) struct Observers {
    next_id: u64,
    entries: Vec<(SubscriptionId, Box<dyn Observer>)>,
}

impl Observers {
    pub fn subscribe(&mut self, observer: Box<dyn Observer>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, observer));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    pub fn emit(&mut self, event: CsfEvent) {
        for (_, observer) in self.entries.iter_mut() {
            observer.notify(&event);
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
