//! Single-slot callback registry shared by every transport implementation.

use std::sync::{Arc, PoisonError, RwLock};

use super::payload::Inbound;
use crate::error::Error;

pub type MessageHandler = Box<dyn Fn(Inbound) + Send + Sync + 'static>;
pub type ConnectHandler = Box<dyn Fn() + Send + Sync + 'static>;
pub type DisconnectHandler = Box<dyn Fn() + Send + Sync + 'static>;
pub type ErrorHandler = Box<dyn Fn(&Error) + Send + Sync + 'static>;

/// At most one handler per event kind. Registering replaces the previous handler.
///
/// Handlers are cloned out of the lock before being invoked so that a handler can
/// re-enter the transport (send, disconnect, or register another handler).
#[derive(Default)]
pub struct Handlers {
    message: Slot<dyn Fn(Inbound) + Send + Sync>,
    connect: Slot<dyn Fn() + Send + Sync>,
    disconnect: Slot<dyn Fn() + Send + Sync>,
    error: Slot<dyn Fn(&Error) + Send + Sync>,
    exhausted: Slot<dyn Fn() + Send + Sync>,
}

struct Slot<F: ?Sized>(RwLock<Option<Arc<F>>>);

impl<F: ?Sized> Default for Slot<F> {
    fn default() -> Self {
        Self(RwLock::new(None))
    }
}

impl<F: ?Sized> Slot<F> {
    fn set(&self, handler: Arc<F>) {
        // A poisoned slot holds either the old or the new handler, both are valid.
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }

    fn get(&self) -> Option<Arc<F>> {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn is_set(&self) -> bool {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl Handlers {
    pub fn set_message(&self, handler: MessageHandler) {
        self.message.set(Arc::from(handler));
    }

    pub fn set_connect(&self, handler: ConnectHandler) {
        self.connect.set(Arc::from(handler));
    }

    pub fn set_disconnect(&self, handler: DisconnectHandler) {
        self.disconnect.set(Arc::from(handler));
    }

    pub fn set_error(&self, handler: ErrorHandler) {
        self.error.set(Arc::from(handler));
    }

    pub fn set_exhausted(&self, handler: ConnectHandler) {
        self.exhausted.set(Arc::from(handler));
    }

    #[must_use]
    pub fn has_message(&self) -> bool {
        self.message.is_set()
    }

    pub fn emit_message(&self, message: Inbound) {
        if let Some(handler) = self.message.get() {
            handler(message);
        }
    }

    pub fn emit_connect(&self) {
        if let Some(handler) = self.connect.get() {
            handler();
        }
    }

    pub fn emit_disconnect(&self) {
        if let Some(handler) = self.disconnect.get() {
            handler();
        }
    }

    pub fn emit_error(&self, error: &Error) {
        if let Some(handler) = self.error.get() {
            handler(error);
        }
    }

    pub fn emit_exhausted(&self) {
        if let Some(handler) = self.exhausted.get() {
            handler();
        }
    }
}
