//! Output fan-out: whole object on one port, or one field per port.

use serde_json::Value as Json;

use crate::item::{Emission, Payload, WorkItem};
use crate::schema::MessageType;

/// Upper bound on split output ports.
pub const MAX_OUTPUTS: usize = 1024;

/// Routes decoded objects to output ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputRouter {
    split: bool,
    outputs: usize,
}

impl Default for OutputRouter {
    fn default() -> Self {
        Self::single()
    }
}

impl OutputRouter {
    /// Whole object on port 0.
    pub fn single() -> Self {
        Self {
            split: false,
            outputs: 1,
        }
    }

    /// One field per port, in field-number order. Between one and
    /// [`MAX_OUTPUTS`] ports.
    pub fn split(outputs: usize) -> Self {
        Self {
            split: true,
            outputs: outputs.clamp(1, MAX_OUTPUTS),
        }
    }

    pub fn new(split: bool, outputs: usize) -> Self {
        if split {
            Self::split(outputs)
        } else {
            Self::single()
        }
    }

    pub fn is_split(&self) -> bool {
        self.split
    }

    pub fn outputs(&self) -> usize {
        self.outputs
    }

    /// Build the emission for `object`; `base` supplies the metadata copied
    /// onto every outgoing item.
    ///
    /// In split mode fields beyond the port count are dropped and fields
    /// absent from `object` leave their port empty.
    pub fn route(&self, object: Json, message_type: &MessageType, base: &WorkItem) -> Emission {
        if !self.split {
            let mut item = base.clone();
            item.payload = Payload::Object(object);
            return Emission::single(item);
        }

        let mut emission = Emission::with_ports(self.outputs);
        let fields = message_type.descriptor().fields();
        for (port, field) in fields.iter().take(self.outputs).enumerate() {
            let Some(value) = object.get(field.name()) else {
                continue;
            };
            let mut item = base.clone();
            item.payload = Payload::Object(value.clone());
            item.field = Some(field.name().to_string());
            item.field_type = Some(field.type_name());
            emission.set(port, item);
        }
        emission
    }
}
