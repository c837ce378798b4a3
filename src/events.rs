//! Editor event fan-out.
//!
//! Subsystems stay decoupled from UI panels by publishing coarse change
//! notifications here; listeners are closures registered once at startup.

use crate::store::EntityId;

#[derive(Debug, Clone, PartialEq)]
pub enum EditorEvent {
    /// Object-level selection changed; `ids` is the new selection set.
    SelectionChanged { ids: Vec<EntityId> },
    /// Sub-object (vertex/edge/face/UV) selection changed on the active entity.
    SubSelectionChanged,
    /// A mesh asset's geometry buffers changed.
    GeometryChanged { mesh_id: u32 },
    /// A panel asked the viewport to frame these entities.
    FocusRequested { ids: Vec<EntityId> },
}

#[derive(Default)]
pub struct EventBus {
    listeners: Vec<Box<dyn FnMut(&EditorEvent)>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&mut self, listener: impl FnMut(&EditorEvent) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Deliver synchronously, in registration order.
    pub fn emit(&mut self, event: &EditorEvent) {
        for listener in &mut self.listeners {
            listener(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn listeners_fire_in_registration_order() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut bus = EventBus::new();
        for tag in ["a", "b"] {
            let seen = Rc::clone(&seen);
            bus.on(move |event| {
                if matches!(event, EditorEvent::SubSelectionChanged) {
                    seen.borrow_mut().push(tag);
                }
            });
        }
        bus.emit(&EditorEvent::SubSelectionChanged);
        bus.emit(&EditorEvent::GeometryChanged { mesh_id: 1 });
        assert_eq!(*seen.borrow(), vec!["a", "b"]);
    }
}
