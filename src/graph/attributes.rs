//! Free-form attribute maps carried by agents and links.
//!
//! Values the engine reads or derives (speed, heading, lane, time-mean
//! speed, dynamism, link weight) live in typed fields on [`super::Agent`]
//! and [`super::Link`]. Everything else a driver wants to hang on the
//! graph goes here.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    /// Boolean flag.
    Flag(bool),
    /// Numeric value.
    Number(f64),
    /// Text value.
    Text(String),
}

impl AttrValue {
    /// Numeric view. Text that parses as a number is accepted.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            AttrValue::Number(n) => Some(*n),
            AttrValue::Text(s) => s.trim().parse().ok(),
            AttrValue::Flag(_) => None,
        }
    }

    /// Text view. Numbers are formatted.
    pub fn as_text(&self) -> Option<String> {
        match self {
            AttrValue::Text(s) => Some(s.clone()),
            AttrValue::Number(n) => Some(n.to_string()),
            AttrValue::Flag(_) => None,
        }
    }

    /// Flag view.
    pub fn as_flag(&self) -> Option<bool> {
        match self {
            AttrValue::Flag(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::Number(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Flag(value)
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Text(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Text(value)
    }
}

/// Name → value map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes {
    values: HashMap<String, AttrValue>,
}

impl Attributes {
    /// Empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `name` is set.
    pub fn has(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Value of `name`.
    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.values.get(name)
    }

    /// Numeric value of `name`.
    pub fn number(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(AttrValue::as_number)
    }

    /// Set `name`, returning the previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Option<AttrValue> {
        self.values.insert(name.into(), value.into())
    }

    /// Set `name` only if it is not already present.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Result<()> {
        let name = name.into();
        if self.values.contains_key(&name) {
            return Err(Error::AttributeExists(name));
        }
        self.values.insert(name, value.into());
        Ok(())
    }

    /// Remove `name`, returning its value.
    pub fn remove(&mut self, name: &str) -> Option<AttrValue> {
        self.values.remove(name)
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over all attributes in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}
