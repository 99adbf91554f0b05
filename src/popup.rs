use crate::city::Position;
use crate::sdk::{MarkerId, PopupFactory, PopupId, ReadyMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OpenPopup {
    id: PopupId,
    anchor: MarkerId,
}

/// Owns the single info popup that may be open at any time.
#[derive(Debug, Default)]
pub struct PopupManager {
    active: Option<OpenPopup>,
}

impl PopupManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Closes the current popup, if any, then opens one anchored to `anchor`.
    pub fn open<S: PopupFactory>(
        &mut self,
        sdk: &mut S,
        map: ReadyMap,
        anchor: MarkerId,
        position: Position,
        content: String,
    ) -> PopupId {
        self.close(sdk);
        let id = sdk.open_popup(map.id(), anchor, position, content);
        self.active = Some(OpenPopup { id, anchor });
        id
    }

    pub fn close<S: PopupFactory>(&mut self, sdk: &mut S) {
        if let Some(open) = self.active.take() {
            sdk.close_popup(open.id);
        }
    }

    /// The runtime already closed `popup` (user dismissed it).
    pub fn on_closed(&mut self, popup: PopupId) {
        if self.active.is_some_and(|open| open.id == popup) {
            self.active = None;
        }
    }

    /// Closes the popup if its anchor pin no longer exists.
    pub fn close_if_orphaned<S, F>(&mut self, sdk: &mut S, is_live: F)
    where
        S: PopupFactory,
        F: Fn(MarkerId) -> bool,
    {
        if self.active.is_some_and(|open| !is_live(open.anchor)) {
            self.close(sdk);
        }
    }

    pub fn active(&self) -> Option<PopupId> {
        self.active.map(|open| open.id)
    }

    pub fn anchor(&self) -> Option<MarkerId> {
        self.active.map(|open| open.anchor)
    }
}
