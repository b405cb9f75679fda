//! Typed publish/subscribe notifications for simulation happenings.
//!
//! Subscribers register per event kind, so publishing only walks the sinks
//! that asked for that kind. Events are delivered synchronously and not
//! retained afterwards.

use crate::{AgentId, TargetId};
use std::fmt;

/// Something observable that happened inside the simulation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimEvent {
    /// An agent's ground-truth position changed.
    AgentMoved {
        agent_id: AgentId,
        x: f64,
        y: f64,
        heading: f64,
    },
    /// An agent's ground-truth heading changed in place.
    AgentRotated { agent_id: AgentId, heading: f64 },
    /// An agent surveyed its surroundings.
    AgentLooked {
        agent_id: AgentId,
        x: f64,
        y: f64,
        heading: f64,
    },
    /// A target was reported close enough to its true position to count.
    TargetFound {
        agent_id: AgentId,
        target_id: TargetId,
    },
}

impl SimEvent {
    /// Tag used for subscription routing.
    #[must_use]
    pub const fn kind(&self) -> SimEventKind {
        match self {
            Self::AgentMoved { .. } => SimEventKind::AgentMoved,
            Self::AgentRotated { .. } => SimEventKind::AgentRotated,
            Self::AgentLooked { .. } => SimEventKind::AgentLooked,
            Self::TargetFound { .. } => SimEventKind::TargetFound,
        }
    }
}

/// Event category a sink can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimEventKind {
    AgentMoved,
    AgentRotated,
    AgentLooked,
    TargetFound,
}

/// Receiver for published events.
pub trait SimEventSink: Send {
    fn on_event(&mut self, event: &SimEvent);
}

/// Per-kind subscription lists.
#[derive(Default)]
pub struct EventBus {
    moved: Vec<Box<dyn SimEventSink>>,
    rotated: Vec<Box<dyn SimEventSink>>,
    looked: Vec<Box<dyn SimEventSink>>,
    found: Vec<Box<dyn SimEventSink>>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a sink for one event kind.
    pub fn subscribe(&mut self, kind: SimEventKind, sink: Box<dyn SimEventSink>) {
        self.sinks_mut(kind).push(sink);
    }

    /// Delivers the event to every sink subscribed to its kind.
    pub fn publish(&mut self, event: &SimEvent) {
        for sink in self.sinks_mut(event.kind()) {
            sink.on_event(event);
        }
    }

    /// Number of sinks registered for a kind.
    #[must_use]
    pub fn subscriber_count(&self, kind: SimEventKind) -> usize {
        match kind {
            SimEventKind::AgentMoved => self.moved.len(),
            SimEventKind::AgentRotated => self.rotated.len(),
            SimEventKind::AgentLooked => self.looked.len(),
            SimEventKind::TargetFound => self.found.len(),
        }
    }

    fn sinks_mut(&mut self, kind: SimEventKind) -> &mut Vec<Box<dyn SimEventSink>> {
        match kind {
            SimEventKind::AgentMoved => &mut self.moved,
            SimEventKind::AgentRotated => &mut self.rotated,
            SimEventKind::AgentLooked => &mut self.looked,
            SimEventKind::TargetFound => &mut self.found,
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("moved", &self.moved.len())
            .field("rotated", &self.rotated.len())
            .field("looked", &self.looked.len())
            .field("found", &self.found.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;
    use std::sync::{Arc, Mutex};

    struct Recorder(Arc<Mutex<Vec<SimEvent>>>);

    impl SimEventSink for Recorder {
        fn on_event(&mut self, event: &SimEvent) {
            self.0.lock().unwrap().push(*event);
        }
    }

    fn fresh_agent_id() -> AgentId {
        let mut agents: SlotMap<AgentId, ()> = SlotMap::with_key();
        agents.insert(())
    }

    #[test]
    fn publish_reaches_only_matching_subscribers() {
        let agent_id = fresh_agent_id();
        let mut bus = EventBus::new();
        let moved_log = Arc::new(Mutex::new(Vec::new()));
        let rotated_log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe(
            SimEventKind::AgentMoved,
            Box::new(Recorder(Arc::clone(&moved_log))),
        );
        bus.subscribe(
            SimEventKind::AgentRotated,
            Box::new(Recorder(Arc::clone(&rotated_log))),
        );

        let event = SimEvent::AgentMoved {
            agent_id,
            x: 1.0,
            y: 2.0,
            heading: 90.0,
        };
        bus.publish(&event);

        assert_eq!(moved_log.lock().unwrap().as_slice(), &[event]);
        assert!(rotated_log.lock().unwrap().is_empty());
    }

    #[test]
    fn multiple_sinks_each_receive_the_event() {
        let agent_id = fresh_agent_id();
        let mut bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe(
            SimEventKind::AgentRotated,
            Box::new(Recorder(Arc::clone(&log))),
        );
        bus.subscribe(
            SimEventKind::AgentRotated,
            Box::new(Recorder(Arc::clone(&log))),
        );

        bus.publish(&SimEvent::AgentRotated {
            agent_id,
            heading: -45.0,
        });
        assert_eq!(log.lock().unwrap().len(), 2);
        assert_eq!(bus.subscriber_count(SimEventKind::AgentRotated), 2);
    }
}
