//! Transport-neutral message envelopes.
//!
//! Headers are plain string pairs in a `BTreeMap` so envelopes serialize
//! deterministically; lookups through [`HeaderSource`] are
//! case-insensitive.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::headers::HeaderSource;

/// Message received by an endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub message_id: String,
    pub headers: BTreeMap<String, String>,
    pub body: serde_json::Value,
}

impl IncomingMessage {
    #[must_use]
    pub fn new(message_id: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            message_id: message_id.into(),
            headers: BTreeMap::new(),
            body,
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

impl HeaderSource for IncomingMessage {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.header(name)
    }

    fn header_pairs(&self) -> Box<dyn Iterator<Item = (&str, &str)> + '_> {
        self.headers.header_pairs()
    }
}

/// Message produced during a flow, before dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub destination: String,
    pub headers: BTreeMap<String, String>,
    pub body: serde_json::Value,
}

impl OutgoingMessage {
    #[must_use]
    pub fn new(destination: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            destination: destination.into(),
            headers: BTreeMap::new(),
            body,
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// True when a header with this name (any case) is already set.
    #[must_use]
    pub fn has_header(&self, name: &str) -> bool {
        self.headers.header(name).is_some()
    }

    /// Sets the header unless one with the same name (any case) exists.
    /// Returns whether the header was inserted.
    pub fn insert_if_absent(&mut self, name: &str, value: &str) -> bool {
        if self.has_header(name) {
            return false;
        }
        self.headers.insert(name.to_string(), value.to_string());
        true
    }

    /// Converts into the envelope the receiving endpoint sees.
    #[must_use]
    pub fn into_incoming(self, message_id: impl Into<String>) -> IncomingMessage {
        IncomingMessage {
            message_id: message_id.into(),
            headers: self.headers,
            body: self.body,
        }
    }
}
