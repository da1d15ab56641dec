//! Inbound message parsing, handler registry and dispatch
//!
//! Inbound text is decoded into an [`InboundMessage`] before any handler
//! sees it. Handlers are looked up by the message's `type` discriminator and
//! then by the wildcard key, each group in registration order.

use crate::error::{HandlerError, ManagerError, ManagerResult};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error};

/// Registry key that receives every dispatched message
pub const WILDCARD: &str = "*";

/// Name of the discriminator field in inbound payloads
pub const TYPE_FIELD: &str = "type";

/// A decoded inbound message
///
/// The payload is always a JSON object. `message_type` is the value of its
/// `type` field when present and not null.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    message_type: Option<String>,
    payload: Value,
}

impl InboundMessage {
    /// Decode wire text, rejecting anything that is not a JSON object with an
    /// optional string `type`
    pub fn parse(text: &str) -> ManagerResult<Self> {
        let object: Map<String, Value> = serde_json::from_str(text)
            .map_err(|e| ManagerError::parse(format!("expected a JSON object: {e}")))?;

        let message_type = match object.get(TYPE_FIELD) {
            None | Some(Value::Null) => None,
            Some(Value::String(kind)) => Some(kind.clone()),
            Some(other) => {
                return Err(ManagerError::parse(format!(
                    "`{TYPE_FIELD}` must be a string, got {other}"
                )))
            }
        };

        Ok(Self {
            message_type,
            payload: Value::Object(object),
        })
    }

    pub fn message_type(&self) -> Option<&str> {
        self.message_type.as_deref()
    }

    /// The full decoded object, `type` included
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Look up one top-level field
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.payload.get(field)
    }

    pub fn into_payload(self) -> Value {
        self.payload
    }
}

/// Result returned by a message handler
pub type HandlerResult = Result<(), HandlerError>;

type Callback = dyn Fn(&InboundMessage) -> HandlerResult + Send + Sync;

/// A registered message callback
///
/// Clones share identity: [`HandlerRegistry::remove`] matches the exact
/// handler that was registered, or any clone of it.
#[derive(Clone)]
pub struct Handler {
    callback: Arc<Callback>,
}

impl Handler {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&InboundMessage) -> HandlerResult + Send + Sync + 'static,
    {
        Self {
            callback: Arc::new(callback),
        }
    }

    /// Wrap a callback that cannot fail
    pub fn infallible<F>(callback: F) -> Self
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        Self::new(move |message| {
            callback(message);
            Ok(())
        })
    }

    pub fn call(&self, message: &InboundMessage) -> HandlerResult {
        (self.callback)(message)
    }

    /// Whether both handles refer to the same registered callback
    pub fn same_as(&self, other: &Handler) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.callback) as *const (),
            Arc::as_ptr(&other.callback) as *const (),
        )
    }
}

impl PartialEq for Handler {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("callback", &(Arc::as_ptr(&self.callback) as *const ()))
            .finish()
    }
}

/// Ordered handler lists keyed by message type
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Vec<Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `handler` under `message_type`
    pub fn register(&mut self, message_type: &str, handler: Handler) {
        self.handlers
            .entry(message_type.to_string())
            .or_default()
            .push(handler);
    }

    /// Remove the first occurrence of `handler` under `message_type`
    pub fn remove(&mut self, message_type: &str, handler: &Handler) -> bool {
        let Some(list) = self.handlers.get_mut(message_type) else {
            return false;
        };
        let Some(index) = list.iter().position(|h| h.same_as(handler)) else {
            return false;
        };
        list.remove(index);
        if list.is_empty() {
            self.handlers.remove(message_type);
        }
        true
    }

    pub fn clear(&mut self) {
        self.handlers.clear();
    }

    pub fn count(&self, message_type: &str) -> usize {
        self.handlers.get(message_type).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Copy of the handlers a message should reach: exact type first, then
    /// wildcard
    pub fn snapshot(&self, message_type: Option<&str>) -> Vec<Handler> {
        let typed = message_type
            .and_then(|kind| self.handlers.get(kind))
            .into_iter()
            .flatten();
        let wildcard = self.handlers.get(WILDCARD).into_iter().flatten();
        typed.chain(wildcard).cloned().collect()
    }
}

/// Outcome of one dispatch pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub invoked: usize,
    pub failed: usize,
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Invoke every handler in order; a failing or panicking handler is logged
/// and does not stop the ones after it
pub fn dispatch(handlers: &[Handler], message: &InboundMessage) -> DispatchOutcome {
    let mut outcome = DispatchOutcome::default();

    for (position, handler) in handlers.iter().enumerate() {
        outcome.invoked += 1;
        match panic::catch_unwind(AssertUnwindSafe(|| handler.call(message))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                outcome.failed += 1;
                error!(
                    message_type = message.message_type().unwrap_or("<none>"),
                    position,
                    "Message handler failed: {}",
                    e
                );
            }
            Err(payload) => {
                outcome.failed += 1;
                error!(
                    message_type = message.message_type().unwrap_or("<none>"),
                    position,
                    "Message handler panicked: {}",
                    panic_message(payload.as_ref())
                );
            }
        }
    }

    debug!(
        invoked = outcome.invoked,
        failed = outcome.failed,
        "Dispatch complete"
    );
    outcome
}
