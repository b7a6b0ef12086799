use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Message;

/// A request to be sent to the model backend.
///
/// This is also the JSON body posted to HTTP backends.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelRequest {
    /// The full conversation so far.
    pub messages: Vec<Message>,
    /// Capabilities the model may call in this turn.
    pub functions: Vec<FunctionDescriptor>,
}

/// Describes a callable capability to the model.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDescriptor {
    /// Name of the capability, unique within a request.
    pub name: String,
    /// Description of the capability.
    pub description: String,
    /// Parameters definition of the capability.
    ///
    /// This is a [JSON schema](https://json-schema.org/) object, an empty
    /// object schema when the capability takes no arguments.
    pub parameters: Value,
}

impl FunctionDescriptor {
    /// Returns the schema used for capabilities without parameters.
    #[inline]
    pub fn empty_parameters() -> Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }
}
