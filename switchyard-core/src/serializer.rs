//! Typed payload serialization
//!
//! Application payloads travel through the store as opaque strings. The
//! serializer on each side must match; JSON via serde is the default.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;

use crate::error::{Error, Result};
use crate::models::id::Topic;

/// Serializes application payloads to and from the opaque `data` field.
pub trait PayloadSerializer<T>: Send + Sync {
    fn serialize(&self, value: &T) -> Result<String>;
    fn deserialize(&self, data: &str) -> Result<T>;
}

/// Default serializer: JSON via serde
pub struct JsonSerializer<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonSerializer<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonSerializer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonSerializer<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T: Serialize + DeserializeOwned> PayloadSerializer<T> for JsonSerializer<T> {
    fn serialize(&self, value: &T) -> Result<String> {
        Ok(serde_json::to_string(value)?)
    }

    fn deserialize(&self, data: &str) -> Result<T> {
        serde_json::from_str(data).map_err(|e| Error::Deserialization {
            context: format!("invalid {} payload: {e}", std::any::type_name::<T>()),
        })
    }
}

/// Default topic for typed traffic: the payload type's canonical name
#[must_use]
pub fn type_topic<T>() -> Topic {
    Topic::from_string(std::any::type_name::<T>().to_string())
}
