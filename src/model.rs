//! Records of the specification graph
//!
//! Request -> NodeAssemblyIndex -> Assembly -> Component -> requirements/inputs
//! -> PredefinedCloudSpec. Top-level records are decoded strictly by the
//! store layer; the opaque sub-structures hanging off a component or a cloud
//! spec go through [`LenientDecode`].

use log::debug;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Decode that never fails: a structural mismatch yields the zero value.
///
/// Callers treat zero-valued fields (an empty `host`, an empty `source`) as
/// "skip the step that needs them".
pub trait LenientDecode: DeserializeOwned + Default {
    fn parse_or_default(value: &JsonValue) -> Self {
        Self::deserialize(value).unwrap_or_else(|err| {
            debug!(
                "Lenient decode of {} fell back to default: {err}",
                std::any::type_name::<Self>()
            );
            Self::default()
        })
    }

    /// Same as [`parse_or_default`](Self::parse_or_default), starting from
    /// raw JSON bytes.
    fn parse_bytes_or_default(bytes: &[u8]) -> Self {
        serde_json::from_slice(bytes).unwrap_or_else(|err| {
            debug!(
                "Lenient decode of {} fell back to default: {err}",
                std::any::type_name::<Self>()
            );
            Self::default()
        })
    }
}

impl<T: DeserializeOwned + Default> LenientDecode for T {}

/// One provisioning job, created by whoever enqueues the message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: String,
    #[serde(default)]
    pub node_id: String,
    #[serde(default)]
    pub req_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub created_at: String,
}

/// Assemblies owned by one node, in deployment order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeAssemblyIndex {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub assemblies: Vec<String>,
}

/// Empty and single-character assembly ids are placeholders.
pub fn is_assembly_id(id: &str) -> bool {
    id.len() > 1
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Assembly {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub components: Vec<JsonValue>,
    #[serde(default)]
    pub shipper_arguments: String,
}

impl Assembly {
    /// Components in declaration order, decoded leniently.
    pub fn components(&self) -> impl Iterator<Item = Component> + '_ {
        self.components.iter().map(Component::parse_or_default)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Component {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub requirements: JsonValue,
    #[serde(default)]
    pub inputs: JsonValue,
}

impl Component {
    pub fn requirements(&self) -> ComponentRequirements {
        ComponentRequirements::parse_or_default(&self.requirements)
    }

    pub fn inputs(&self) -> ComponentInputs {
        ComponentInputs::parse_or_default(&self.inputs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentRequirements {
    /// Id of the predefined cloud the component targets
    #[serde(default)]
    pub host: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentInputs {
    /// Container image reference
    #[serde(default)]
    pub source: String,
}

/// Infrastructure descriptor referenced by `ComponentRequirements::host`.
///
/// Resolved for every component with a host, currently not consumed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredefinedCloudSpec {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub spec: JsonValue,
    #[serde(default)]
    pub access: JsonValue,
}

impl PredefinedCloudSpec {
    pub fn spec(&self) -> CloudSpec {
        CloudSpec::parse_or_default(&self.spec)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CloudSpec {
    #[serde(default)]
    pub type_name: String,
    #[serde(default)]
    pub groups: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub flavor: String,
}
