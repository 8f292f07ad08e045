//! Typed lifecycle events and the frame-batched event bus.
//!
//! Every mutating operation on the world produces exactly one [`EcsEvent`].
//! The world applies it to the index adapter synchronously, then queues it on
//! the [`BatchedEventBus`] for external subscribers. The bus defers delivery
//! to the next host-driven [`flush`](BatchedEventBus::flush) (once per frame),
//! coalescing duplicate payloads, unless the pending total hits the
//! configured maximum, in which case an immediate flush is forced.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

use crate::entity::EntityId;
use crate::registry::KindId;

// ---------------------------------------------------------------------------
// Event payloads
// ---------------------------------------------------------------------------

/// A lifecycle event emitted by the world.
#[derive(Debug, Clone, PartialEq)]
pub enum EcsEvent {
    /// A new entity came alive. `parent` is set when it was created as a
    /// child of an existing entity.
    EntityCreated {
        entity: EntityId,
        parent: Option<EntityId>,
    },
    /// Entity metadata changed (rename or reparent). `parent` is the
    /// post-change parent so indices can resync without a metadata lookup.
    EntityUpdated {
        entity: EntityId,
        parent: Option<EntityId>,
    },
    /// An entity was destroyed. All of its `ComponentRemoved` events were
    /// emitted before this one.
    EntityDestroyed { entity: EntityId },
    /// The whole world was torn down.
    WorldCleared,
    /// A component record was created for `(entity, kind)`.
    ComponentAdded {
        entity: EntityId,
        kind: KindId,
        data: Value,
    },
    /// A component record was merged and re-validated.
    ComponentUpdated {
        entity: EntityId,
        kind: KindId,
        data: Value,
    },
    /// A component record was cleared.
    ComponentRemoved { entity: EntityId, kind: KindId },
}

impl EcsEvent {
    /// The discriminant used for subscription and pending-queue bucketing.
    pub fn kind(&self) -> EventKind {
        match self {
            EcsEvent::EntityCreated { .. } => EventKind::EntityCreated,
            EcsEvent::EntityUpdated { .. } => EventKind::EntityUpdated,
            EcsEvent::EntityDestroyed { .. } => EventKind::EntityDestroyed,
            EcsEvent::WorldCleared => EventKind::WorldCleared,
            EcsEvent::ComponentAdded { .. } => EventKind::ComponentAdded,
            EcsEvent::ComponentUpdated { .. } => EventKind::ComponentUpdated,
            EcsEvent::ComponentRemoved { .. } => EventKind::ComponentRemoved,
        }
    }
}

/// Discriminant of [`EcsEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    EntityCreated,
    EntityUpdated,
    EntityDestroyed,
    WorldCleared,
    ComponentAdded,
    ComponentUpdated,
    ComponentRemoved,
}

impl EventKind {
    /// All kinds, in the fixed order used for flush delivery.
    pub const ALL: [EventKind; 7] = [
        EventKind::EntityCreated,
        EventKind::EntityUpdated,
        EventKind::EntityDestroyed,
        EventKind::WorldCleared,
        EventKind::ComponentAdded,
        EventKind::ComponentUpdated,
        EventKind::ComponentRemoved,
    ];

    /// The engine's wire-format key for this event family.
    pub fn key(self) -> &'static str {
        match self {
            EventKind::EntityCreated => "entity:created",
            EventKind::EntityUpdated => "entity:updated",
            EventKind::EntityDestroyed => "entity:destroyed",
            EventKind::WorldCleared => "world:cleared",
            EventKind::ComponentAdded => "component:added",
            EventKind::ComponentUpdated => "component:updated",
            EventKind::ComponentRemoved => "component:removed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

// ---------------------------------------------------------------------------
// BatchedEventBus
// ---------------------------------------------------------------------------

/// Handle returned by [`BatchedEventBus::on`], used to unsubscribe.
pub type SubscriberId = u64;

type Handler = Box<dyn FnMut(&EcsEvent)>;

/// Tuning knobs for the bus.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Skip queueing a payload when an equal one is already pending.
    pub coalesce: bool,
    /// Pending total at which a synchronous flush is forced.
    pub max_pending: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            coalesce: true,
            max_pending: 256,
        }
    }
}

/// Coalescing publish/subscribe channel with frame-deferred delivery.
///
/// The bus never delivers inside [`emit`](Self::emit) except under
/// backpressure; the host calls [`flush`](Self::flush) once per frame.
pub struct BatchedEventBus {
    config: BusConfig,
    handlers: HashMap<EventKind, Vec<(SubscriberId, Handler)>>,
    /// Subscriber id -> kind, for `off`.
    reverse: HashMap<SubscriberId, EventKind>,
    pending: HashMap<EventKind, Vec<EcsEvent>>,
    pending_total: usize,
    next_id: SubscriberId,
}

impl fmt::Debug for BatchedEventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchedEventBus")
            .field("subscriptions", &self.reverse.len())
            .field("pending", &self.pending_total)
            .finish()
    }
}

impl BatchedEventBus {
    /// Create a bus with default configuration.
    pub fn new() -> Self {
        Self::with_config(BusConfig::default())
    }

    /// Create a bus with explicit configuration. A zero `max_pending` would
    /// force-flush every emit; it is clamped to 1.
    pub fn with_config(mut config: BusConfig) -> Self {
        if config.max_pending == 0 {
            tracing::warn!("bus max_pending of 0 clamped to 1");
            config.max_pending = 1;
        }
        Self {
            config,
            handlers: HashMap::new(),
            reverse: HashMap::new(),
            pending: HashMap::new(),
            pending_total: 0,
            next_id: 0,
        }
    }

    /// Subscribe a handler to one event kind.
    pub fn on<F>(&mut self, kind: EventKind, handler: F) -> SubscriberId
    where
        F: FnMut(&EcsEvent) + 'static,
    {
        self.next_id += 1;
        let id = self.next_id;
        self.handlers
            .entry(kind)
            .or_default()
            .push((id, Box::new(handler)));
        self.reverse.insert(id, kind);
        id
    }

    /// Unsubscribe. If the kind loses its last handler, its pending queue is
    /// dropped too -- nobody is left to receive it.
    pub fn off(&mut self, id: SubscriberId) {
        let Some(kind) = self.reverse.remove(&id) else {
            tracing::warn!(subscriber = id, "off() for unknown subscriber id");
            return;
        };
        if let Some(list) = self.handlers.get_mut(&kind) {
            list.retain(|(sid, _)| *sid != id);
            if list.is_empty() {
                self.handlers.remove(&kind);
                if let Some(dropped) = self.pending.remove(&kind) {
                    self.pending_total -= dropped.len();
                }
            }
        }
    }

    /// Queue an event for the next flush.
    ///
    /// With coalescing enabled, a payload equal to one already pending for
    /// the same kind is skipped. Hitting `max_pending` forces an immediate
    /// synchronous flush (the backpressure valve).
    pub fn emit(&mut self, event: EcsEvent) {
        let kind = event.kind();
        let queue = self.pending.entry(kind).or_default();
        if self.config.coalesce && queue.contains(&event) {
            return;
        }
        queue.push(event);
        self.pending_total += 1;
        if self.pending_total >= self.config.max_pending {
            tracing::debug!(
                pending = self.pending_total,
                "pending event limit reached, forcing flush"
            );
            self.flush();
        }
    }

    /// Deliver every pending payload to every subscribed handler, then clear
    /// the pending state. Within one kind, delivery is emission order.
    pub fn flush(&mut self) {
        if self.pending_total == 0 {
            return;
        }
        let mut batches: Vec<(EventKind, Vec<EcsEvent>)> = Vec::new();
        for kind in EventKind::ALL {
            if let Some(queue) = self.pending.remove(&kind) {
                batches.push((kind, queue));
            }
        }
        self.pending_total = 0;

        for (kind, queue) in batches {
            let Some(handlers) = self.handlers.get_mut(&kind) else {
                continue;
            };
            for event in &queue {
                for (_, handler) in handlers.iter_mut() {
                    handler(event);
                }
            }
        }
    }

    /// Events queued and not yet delivered.
    pub fn pending_count(&self) -> usize {
        self.pending_total
    }

    /// Active subscriptions across all kinds.
    pub fn subscription_count(&self) -> usize {
        self.reverse.len()
    }
}

impl Default for BatchedEventBus {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn created(raw: u32) -> EcsEvent {
        EcsEvent::EntityCreated {
            entity: EntityId::new(raw),
            parent: None,
        }
    }

    fn recorder(bus: &mut BatchedEventBus, kind: EventKind) -> Rc<RefCell<Vec<EcsEvent>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        bus.on(kind, move |e| sink.borrow_mut().push(e.clone()));
        log
    }

    #[test]
    fn emit_defers_until_flush() {
        let mut bus = BatchedEventBus::new();
        let log = recorder(&mut bus, EventKind::EntityCreated);

        bus.emit(created(1));
        assert!(log.borrow().is_empty());
        assert_eq!(bus.pending_count(), 1);

        bus.flush();
        assert_eq!(log.borrow().len(), 1);
        assert_eq!(bus.pending_count(), 0);
    }

    #[test]
    fn equal_payloads_coalesce() {
        let mut bus = BatchedEventBus::new();
        let log = recorder(&mut bus, EventKind::EntityCreated);

        bus.emit(created(1));
        bus.emit(created(1));
        bus.flush();
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn distinct_payloads_delivered_in_order() {
        let mut bus = BatchedEventBus::new();
        let log = recorder(&mut bus, EventKind::EntityCreated);

        bus.emit(created(1));
        bus.emit(created(2));
        bus.flush();
        let seen = log.borrow();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], created(1));
        assert_eq!(seen[1], created(2));
    }

    #[test]
    fn coalescing_can_be_disabled() {
        let mut bus = BatchedEventBus::with_config(BusConfig {
            coalesce: false,
            max_pending: 256,
        });
        let log = recorder(&mut bus, EventKind::EntityCreated);

        bus.emit(created(1));
        bus.emit(created(1));
        bus.flush();
        assert_eq!(log.borrow().len(), 2);
    }

    #[test]
    fn backpressure_forces_synchronous_flush() {
        let mut bus = BatchedEventBus::with_config(BusConfig {
            coalesce: true,
            max_pending: 3,
        });
        let log = recorder(&mut bus, EventKind::EntityCreated);

        bus.emit(created(1));
        bus.emit(created(2));
        assert!(log.borrow().is_empty());
        bus.emit(created(3)); // hits the limit
        assert_eq!(log.borrow().len(), 3);
        assert_eq!(bus.pending_count(), 0);
    }

    #[test]
    fn off_drops_orphaned_pending_queue() {
        let mut bus = BatchedEventBus::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        let id = bus.on(EventKind::EntityCreated, move |e| {
            sink.borrow_mut().push(e.clone())
        });

        bus.emit(created(1));
        assert_eq!(bus.pending_count(), 1);
        bus.off(id);
        assert_eq!(bus.pending_count(), 0, "orphaned queue must be dropped");
        assert_eq!(bus.subscription_count(), 0);

        bus.flush();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn off_unknown_id_is_a_noop() {
        let mut bus = BatchedEventBus::new();
        bus.off(42); // logs, does not panic
    }

    #[test]
    fn handlers_only_see_their_kind() {
        let mut bus = BatchedEventBus::new();
        let created_log = recorder(&mut bus, EventKind::EntityCreated);
        let destroyed_log = recorder(&mut bus, EventKind::EntityDestroyed);

        bus.emit(created(1));
        bus.emit(EcsEvent::EntityDestroyed {
            entity: EntityId::new(1),
        });
        bus.flush();

        assert_eq!(created_log.borrow().len(), 1);
        assert_eq!(destroyed_log.borrow().len(), 1);
    }

    #[test]
    fn event_keys_match_wire_format() {
        assert_eq!(EventKind::EntityCreated.key(), "entity:created");
        assert_eq!(EventKind::ComponentAdded.key(), "component:added");
        assert_eq!(EventKind::ComponentRemoved.to_string(), "component:removed");
    }
}
