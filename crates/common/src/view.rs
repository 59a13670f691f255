//! Values passed from request handling into the template layer.
//!
//! These types are serialised as JSON into the view-rendering context.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// View-context key holding the signed-in user (or the no-user marker).
pub const USER_KEY: &str = "user";

/// Session payload key holding the signed-in user's identifier.
pub const USER_ID_KEY: &str = "user_id";

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// The resolved application user for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable user identifier, stored in the session payload.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Sign-in email address.
    pub email: String,
}

// ---------------------------------------------------------------------------
// View context
// ---------------------------------------------------------------------------

/// Key/value bag rendered into a template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViewContext(Map<String, Value>);

impl ViewContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an already-built JSON value under `key`.
    pub fn insert_value(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// Serialise `value` and insert it under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` cannot be represented as JSON.
    pub fn insert<T: Serialize>(
        &mut self,
        key: impl Into<String>,
        value: T,
    ) -> Result<(), serde_json::Error> {
        let value = serde_json::to_value(value)?;
        self.insert_value(key, value);
        Ok(())
    }

    /// Builder-style variant of [`ViewContext::insert_value`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert_value(key, value.into());
        self
    }

    /// Copy every entry of `other` into this context, replacing duplicates.
    pub fn extend(&mut self, other: ViewContext) {
        self.0.extend(other.0);
    }

    /// Look up a value by key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Store `identity` under [`USER_KEY`], or JSON `null` when anonymous.
    pub fn set_user(&mut self, identity: Option<&Identity>) {
        let value = identity
            .and_then(|i| serde_json::to_value(i).ok())
            .unwrap_or(Value::Null);
        self.insert_value(USER_KEY, value);
    }

    /// The value stored under [`USER_KEY`], `None` when it is the no-user marker.
    pub fn user(&self) -> Option<&Value> {
        self.0.get(USER_KEY).filter(|v| !v.is_null())
    }
}
