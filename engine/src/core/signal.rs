//! Minimal multi-subscriber signal
//!
//! Used to deliver scene events (such as `touched`) on the consuming thread.
//! Handlers are invoked in connection order; a handler cannot disconnect
//! itself while firing.

use std::sync::{Mutex, PoisonError};

type Handler<T> = Box<dyn Fn(&T) + Send + Sync>;

/// Identifier returned by [`Signal::connect`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

/// A list of handlers invoked with a shared argument
pub struct Signal<T> {
    handlers: Mutex<Vec<(ConnectionId, Handler<T>)>>,
    next_id: Mutex<u64>,
}

impl<T> Default for Signal<T> {
    fn default() -> Self {
        Self {
            handlers: Mutex::new(Vec::new()),
            next_id: Mutex::new(0),
        }
    }
}

impl<T> std::fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("handlers", &self.len())
            .finish()
    }
}

impl<T> Signal<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler
    pub fn connect<F>(&self, handler: F) -> ConnectionId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let mut next_id = self.next_id.lock().unwrap_or_else(PoisonError::into_inner);
        let id = ConnectionId(*next_id);
        *next_id += 1;
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Box::new(handler)));
        id
    }

    /// Remove a handler; returns false if it was not connected
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        let mut handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
        let before = handlers.len();
        handlers.retain(|(handler_id, _)| *handler_id != id);
        handlers.len() != before
    }

    /// Invoke every handler with `value`
    pub fn fire(&self, value: &T) {
        let handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
        for (_, handler) in handlers.iter() {
            handler(value);
        }
    }

    pub fn len(&self) -> usize {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
