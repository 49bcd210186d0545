//! Callback sets for stream subscriptions.

use super::error::CallbackResult;

pub(super) type DataHandler<T> = Box<dyn FnMut(T) -> CallbackResult + Send>;
pub(super) type ErrorHandler<E> = Box<dyn FnMut(E) + Send>;
pub(super) type DoneHandler = Box<dyn FnOnce() + Send>;

/// Handlers invoked for items, errors and completion of a subscribed stream.
///
/// Only `on_data` is required. Stream errors without an `on_error` handler
/// are logged and the subscription keeps running.
pub struct SubscriptionHandlers<T, E> {
    pub(super) on_data: DataHandler<T>,
    pub(super) on_error: Option<ErrorHandler<E>>,
    pub(super) on_done: Option<DoneHandler>,
}

impl<T, E> SubscriptionHandlers<T, E> {
    pub fn new<F>(on_data: F) -> Self
    where
        F: FnMut(T) -> CallbackResult + Send + 'static,
    {
        Self {
            on_data: Box::new(on_data),
            on_error: None,
            on_done: None,
        }
    }

    pub fn with_on_error<F>(mut self, on_error: F) -> Self
    where
        F: FnMut(E) + Send + 'static,
    {
        self.on_error = Some(Box::new(on_error));
        self
    }

    pub fn with_on_done<F>(mut self, on_done: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_done = Some(Box::new(on_done));
        self
    }
}
