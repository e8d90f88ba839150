//! Event payloads: driver readings and the cooked events handed to the data
//! client.

use serde::{Deserialize, Serialize};

use crate::models::DeviceResource;
use crate::time_millis;

/// A single value produced or consumed by the driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Binary(Vec<u8>),
}

impl CommandValue {
    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CommandValue::Integer(n) => Some(*n as f64),
            CommandValue::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl std::fmt::Display for CommandValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandValue::Boolean(b) => write!(f, "{b}"),
            CommandValue::Integer(n) => write!(f, "{n}"),
            CommandValue::Float(x) => write!(f, "{x}"),
            CommandValue::String(s) => f.write_str(s),
            CommandValue::Binary(bytes) => write!(f, "<{} bytes>", bytes.len()),
        }
    }
}

/// One reading inside an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub resource: String,
    pub value: CommandValue,
    /// Capture timestamp in milliseconds.
    pub origin: u64,
}

/// A data-client-ready event payload.
///
/// Ownership moves into the posting work item; the event is dropped once the
/// data client call returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CookedEvent {
    pub device: String,
    pub origin: u64,
    pub readings: Vec<Reading>,
}

impl CookedEvent {
    /// Cook raw driver values into an event for `device`.
    ///
    /// When `transform` is set, numeric values pass through the resource's
    /// value transforms in base, scale, offset order.
    pub fn cook(
        device: &str,
        command: &DeviceResource,
        values: &[CommandValue],
        transform: bool,
    ) -> CookedEvent {
        let origin = time_millis();
        let readings = values
            .iter()
            .map(|value| Reading {
                resource: command.name.clone(),
                value: if transform {
                    apply_transform(value, command)
                } else {
                    value.clone()
                },
                origin,
            })
            .collect();
        CookedEvent {
            device: device.to_string(),
            origin,
            readings,
        }
    }
}

fn apply_transform(value: &CommandValue, command: &DeviceResource) -> CommandValue {
    let props = &command.properties;
    let Some(mut x) = value.as_f64() else {
        return value.clone();
    };
    if let Some(base) = props.base {
        x = base.powf(x);
    }
    if let Some(scale) = props.scale {
        x *= scale;
    }
    if let Some(offset) = props.offset {
        x += offset;
    }
    match value {
        CommandValue::Integer(_) => CommandValue::Integer(x.round() as i64),
        _ => CommandValue::Float(x),
    }
}
