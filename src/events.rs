//! Event hub
//!
//! Minimal typed publish/subscribe registry decoupling the lifecycle manager
//! and session adapters from UI and host code.

use std::cell::RefCell;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;
use std::str::FromStr;

/// Names of the events published on a client's hub
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    RegistrationAttempt,
    RegistrationSuccess,
    RegistrationError,
    CallAnswered,
    /// Non-fatal failure swallowed by a mid-call control, device or greeting path
    Warning,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::RegistrationAttempt => "registration:attempt",
            EventKind::RegistrationSuccess => "registration:success",
            EventKind::RegistrationError => "registration:error",
            EventKind::CallAnswered => "call:answered",
            EventKind::Warning => "warning",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "registration:attempt" => Ok(EventKind::RegistrationAttempt),
            "registration:success" => Ok(EventKind::RegistrationSuccess),
            "registration:error" => Ok(EventKind::RegistrationError),
            "call:answered" => Ok(EventKind::CallAnswered),
            "warning" => Ok(EventKind::Warning),
            other => Err(format!("Unknown event: {}", other)),
        }
    }
}

/// Where a swallowed failure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningSource {
    CallControl,
    OutputDevice,
    Microphone,
    Greeting,
    Engine,
}

/// Event payloads
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    RegistrationAttempt,
    RegistrationSuccess,
    RegistrationError { cause: Option<String> },
    CallAnswered { call_id: String },
    Warning { source: WarningSource, message: String },
}

impl ClientEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ClientEvent::RegistrationAttempt => EventKind::RegistrationAttempt,
            ClientEvent::RegistrationSuccess => EventKind::RegistrationSuccess,
            ClientEvent::RegistrationError { .. } => EventKind::RegistrationError,
            ClientEvent::CallAnswered { .. } => EventKind::CallAnswered,
            ClientEvent::Warning { .. } => EventKind::Warning,
        }
    }
}

pub type EventHandler = Rc<dyn Fn(&ClientEvent)>;

/// Publish/subscribe registry. Clones share the same handler table.
#[derive(Clone, Default)]
pub struct EventHub {
    handlers: Rc<RefCell<HashMap<EventKind, Vec<EventHandler>>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Registering the same `Rc` twice is a no-op.
    pub fn on(&self, kind: EventKind, handler: EventHandler) {
        let mut handlers = self.handlers.borrow_mut();
        let list = handlers.entry(kind).or_default();
        if !list.iter().any(|h| Rc::ptr_eq(h, &handler)) {
            list.push(handler);
        }
    }

    pub fn off(&self, kind: EventKind, handler: &EventHandler) {
        if let Some(list) = self.handlers.borrow_mut().get_mut(&kind) {
            list.retain(|h| !Rc::ptr_eq(h, handler));
        }
    }

    /// Invoke every handler for the event's kind in registration order.
    ///
    /// A panicking handler is logged and does not stop its siblings. Handlers
    /// may subscribe or unsubscribe while an emission is running; the change
    /// applies to the next emission.
    pub fn emit(&self, event: ClientEvent) {
        let snapshot: Vec<EventHandler> = match self.handlers.borrow().get(&event.kind()) {
            Some(list) => list.clone(),
            None => return,
        };

        for handler in snapshot {
            if catch_unwind(AssertUnwindSafe(|| handler(&event))).is_err() {
                tracing::error!("Handler for {} panicked", event.kind());
            }
        }
    }

    /// Log and publish a swallowed failure.
    pub fn warn(&self, source: WarningSource, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{:?}: {}", source, message);
        self.emit(ClientEvent::Warning { source, message });
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers.borrow().get(&kind).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn counter() -> (Rc<Cell<u32>>, EventHandler) {
        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        (count, Rc::new(move |_: &ClientEvent| c.set(c.get() + 1)))
    }

    #[test]
    fn test_same_handler_registered_once() {
        let hub = EventHub::new();
        let (count, handler) = counter();

        hub.on(EventKind::RegistrationSuccess, handler.clone());
        hub.on(EventKind::RegistrationSuccess, handler.clone());
        hub.emit(ClientEvent::RegistrationSuccess);

        assert_eq!(count.get(), 1);
        assert_eq!(hub.handler_count(EventKind::RegistrationSuccess), 1);
    }

    #[test]
    fn test_off_removes_handler() {
        let hub = EventHub::new();
        let (count, handler) = counter();

        hub.on(EventKind::RegistrationAttempt, handler.clone());
        hub.off(EventKind::RegistrationAttempt, &handler);
        hub.emit(ClientEvent::RegistrationAttempt);

        assert_eq!(count.get(), 0);
    }

    #[test]
    fn test_handlers_run_in_registration_order() {
        let hub = EventHub::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        for i in 0..3 {
            let order = order.clone();
            hub.on(
                EventKind::CallAnswered,
                Rc::new(move |_: &ClientEvent| order.borrow_mut().push(i)),
            );
        }
        hub.emit(ClientEvent::CallAnswered { call_id: "c1".into() });

        assert_eq!(*order.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn test_panicking_handler_does_not_stop_siblings() {
        let hub = EventHub::new();
        let (count, handler) = counter();

        hub.on(
            EventKind::RegistrationError,
            Rc::new(|_: &ClientEvent| panic!("handler failure")),
        );
        hub.on(EventKind::RegistrationError, handler);
        hub.emit(ClientEvent::RegistrationError { cause: None });

        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_emit_without_handlers_is_noop() {
        let hub = EventHub::new();
        hub.emit(ClientEvent::RegistrationSuccess);
        assert_eq!(hub.handler_count(EventKind::RegistrationSuccess), 0);
    }

    #[test]
    fn test_event_names_round_trip() {
        for kind in [
            EventKind::RegistrationAttempt,
            EventKind::RegistrationSuccess,
            EventKind::RegistrationError,
            EventKind::CallAnswered,
            EventKind::Warning,
        ] {
            assert_eq!(kind.as_str().parse::<EventKind>(), Ok(kind));
        }
        assert!("registration:*".parse::<EventKind>().is_err());
    }
}
