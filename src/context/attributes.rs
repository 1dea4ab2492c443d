//! One attribute store, two views.
//!
//! Public attributes are visible to policies and processors; internal
//! attributes carry pipeline signaling (limits, cursors, the execution
//! failure). Both live in the same map, internal keys under
//! [`INTERNAL_PREFIX`], so a value written through one handle is visible to
//! every other handle of the same request without copying.

use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// Namespace of internal keys inside the shared store.
pub const INTERNAL_PREFIX: &str = "gateway.internal.";

/// Last message id consumed by an entrypoint, used as the next cursor.
pub const ATTR_INTERNAL_LAST_MESSAGE_ID: &str = "messages.last-id";
/// Media type chosen by the entrypoint for the response body.
pub const ATTR_INTERNAL_RESPONSE_CONTENT_TYPE: &str = "response.content-type";
/// Maximum number of messages an entrypoint emits.
pub const ATTR_INTERNAL_MESSAGES_LIMIT_COUNT: &str = "messages.limit.count";
/// Maximum time, from request arrival, an entrypoint keeps streaming.
pub const ATTR_INTERNAL_MESSAGES_LIMIT_DURATION_MS: &str = "messages.limit.duration-ms";
/// Cursor the backend message source resumes after.
pub const ATTR_INTERNAL_MESSAGES_RESUME_LAST_ID: &str = "messages.resume.last-id";
/// The [`ExecutionFailure`](crate::failure::ExecutionFailure) of an interruption.
pub const ATTR_INTERNAL_EXECUTION_FAILURE: &str = "execution.failure";
/// Request log record created by the logging processors.
pub const ATTR_INTERNAL_REQUEST_LOG: &str = "request.log";
/// Id of the entrypoint connector serving the request.
pub const ATTR_INTERNAL_ENTRYPOINT_CONNECTOR: &str = "entrypoint.connector";
pub const ATTR_INTERNAL_SUBSCRIPTION_ID: &str = "subscription.id";
pub const ATTR_INTERNAL_PLAN_ID: &str = "plan.id";
pub const ATTR_INTERNAL_APPLICATION_ID: &str = "application.id";

/// Context path of the acceptor that matched the request.
pub const ATTR_CONTEXT_PATH: &str = "context-path";
pub const ATTR_API: &str = "api";
pub const ATTR_API_NAME: &str = "api.name";
pub const ATTR_CLIENT_IDENTIFIER: &str = "client-identifier";
pub const ATTR_REQUEST_ID: &str = "request.id";
pub const ATTR_TRANSACTION_ID: &str = "transaction.id";

type AttributeValue = Arc<dyn Any + Send + Sync>;

/// Errors raised by attribute access.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttributeError {
    #[error("attribute key '{0}' is reserved for internal use")]
    ReservedKey(String),
    #[error("attribute '{key}' does not hold a value of type {expected}")]
    TypeMismatch { key: String, expected: &'static str },
}

/// Backing store shared by every view of one request.
#[derive(Clone, Default)]
pub struct AttributeStore {
    inner: Arc<RwLock<HashMap<String, AttributeValue>>>,
}

impl AttributeStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn public(&self) -> PublicAttributes {
        PublicAttributes { store: self.clone() }
    }

    #[must_use]
    pub fn internal(&self) -> InternalAttributes {
        InternalAttributes { store: self.clone() }
    }

    /// Whether two handles share the same backing map.
    #[must_use]
    pub fn shares_store_with(&self, other: &AttributeStore) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn put_raw(&self, key: String, value: AttributeValue) {
        self.inner.write().insert(key, value);
    }

    fn get_raw(&self, key: &str) -> Option<AttributeValue> {
        self.inner.read().get(key).map(Arc::clone)
    }

    fn remove_raw(&self, key: &str) -> bool {
        self.inner.write().remove(key).is_some()
    }
}

impl std::fmt::Debug for AttributeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let map = self.inner.read();
        let mut keys: Vec<&String> = map.keys().collect();
        keys.sort();
        f.debug_struct("AttributeStore").field("keys", &keys).finish()
    }
}

fn downcast<T: Clone + 'static>(key: &str, value: &AttributeValue) -> Result<T, AttributeError> {
    value
        .downcast_ref::<T>()
        .cloned()
        .ok_or_else(|| AttributeError::TypeMismatch {
            key: key.to_string(),
            expected: std::any::type_name::<T>(),
        })
}

/// Attributes visible to policies and processors. Internal keys are rejected.
#[derive(Clone, Debug)]
pub struct PublicAttributes {
    store: AttributeStore,
}

impl PublicAttributes {
    pub fn put<T: Any + Send + Sync>(&self, key: &str, value: T) -> Result<(), AttributeError> {
        Self::check(key)?;
        self.store.put_raw(key.to_string(), Arc::new(value));
        Ok(())
    }

    /// Typed read; `None` when absent, internal, or of another type.
    #[must_use]
    pub fn get<T: Clone + 'static>(&self, key: &str) -> Option<T> {
        self.try_get(key).ok().flatten()
    }

    /// Typed read that reports a type mismatch instead of hiding it.
    pub fn try_get<T: Clone + 'static>(&self, key: &str) -> Result<Option<T>, AttributeError> {
        Self::check(key)?;
        match self.store.get_raw(key) {
            Some(value) => downcast(key, &value).map(Some),
            None => Ok(None),
        }
    }

    pub fn remove(&self, key: &str) -> bool {
        Self::check(key).is_ok() && self.store.remove_raw(key)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        Self::check(key).is_ok() && self.store.get_raw(key).is_some()
    }

    /// Public keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .store
            .inner
            .read()
            .keys()
            .filter(|k| !k.starts_with(INTERNAL_PREFIX))
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    fn check(key: &str) -> Result<(), AttributeError> {
        if key.starts_with(INTERNAL_PREFIX) {
            Err(AttributeError::ReservedKey(key.to_string()))
        } else {
            Ok(())
        }
    }
}

/// Attributes reserved for pipeline code.
#[derive(Clone, Debug)]
pub struct InternalAttributes {
    store: AttributeStore,
}

impl InternalAttributes {
    pub fn put<T: Any + Send + Sync>(&self, key: &str, value: T) {
        self.store.put_raw(internal_key(key), Arc::new(value));
    }

    #[must_use]
    pub fn get<T: Clone + 'static>(&self, key: &str) -> Option<T> {
        self.try_get(key).ok().flatten()
    }

    pub fn try_get<T: Clone + 'static>(&self, key: &str) -> Result<Option<T>, AttributeError> {
        match self.store.get_raw(&internal_key(key)) {
            Some(value) => downcast(key, &value).map(Some),
            None => Ok(None),
        }
    }

    pub fn remove(&self, key: &str) -> bool {
        self.store.remove_raw(&internal_key(key))
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.store.get_raw(&internal_key(key)).is_some()
    }
}

fn internal_key(key: &str) -> String {
    let mut full = String::with_capacity(INTERNAL_PREFIX.len() + key.len());
    full.push_str(INTERNAL_PREFIX);
    full.push_str(key);
    full
}
