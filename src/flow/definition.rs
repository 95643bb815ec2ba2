use crate::error::AssetError;
use crate::scpi::ScpiComponent;
use crate::value::Value;
use bincode::config::standard;
use bincode::serde::{decode_from_slice, encode_to_vec};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{Read, Write};

/// A sequence connection from one component output to another component of the same flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub target: usize,
}

/// One `target = value` pair of a `SetVariable` component; both are expression encodings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub target: Vec<u8>,
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ComponentKind {
    /// Fires its output when the flow state is started.
    Start,
    /// Holds UI property bindings; executing it does nothing.
    Widget,
    SetVariable { assignments: Vec<Assignment> },
    Scpi(ScpiComponent),
    /// Waits for `duration` milliseconds (an expression) before firing its output.
    Delay { duration: Vec<u8> },
    /// Instantiates flow `flow` as a nested child state.
    UserWidget { flow: usize },
}

impl ComponentKind {
    pub fn name(&self) -> &'static str {
        match self {
            ComponentKind::Start => "Start",
            ComponentKind::Widget => "Widget",
            ComponentKind::SetVariable { .. } => "SetVariable",
            ComponentKind::Scpi(_) => "Scpi",
            ComponentKind::Delay { .. } => "Delay",
            ComponentKind::UserWidget { .. } => "UserWidget",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDefinition {
    pub kind: ComponentKind,
    /// Expression encodings, addressed by property index from update tasks.
    #[serde(default)]
    pub properties: Vec<Vec<u8>>,
    /// Connections per output; output 0 is the sequence output.
    #[serde(default)]
    pub outputs: Vec<Vec<Connection>>,
}

impl ComponentDefinition {
    pub fn new(kind: ComponentKind) -> Self {
        Self {
            kind,
            properties: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn with_property(mut self, code: Vec<u8>) -> Self {
        self.properties.push(code);
        self
    }

    /// Connects the sequence output to `target`.
    pub fn then(mut self, target: usize) -> Self {
        if self.outputs.is_empty() {
            self.outputs.push(Vec::new());
        }
        self.outputs[0].push(Connection { target });
        self
    }

    pub fn sequence_targets(&self) -> impl Iterator<Item = usize> + '_ {
        self.outputs.first().into_iter().flatten().map(|c| c.target)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowDefinition {
    pub name: String,
    /// Initial values of the flow's local variables.
    #[serde(default)]
    pub locals: Vec<Value>,
    pub components: Vec<ComponentDefinition>,
}

impl FlowDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            locals: Vec::new(),
            components: Vec::new(),
        }
    }

    pub fn with_local(mut self, value: impl Into<Value>) -> Self {
        self.locals.push(value.into());
        self
    }

    pub fn with_component(mut self, component: ComponentDefinition) -> Self {
        self.components.push(component);
        self
    }
}

/// Every flow of an application together with the initial global variables.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FlowAssets {
    pub flows: Vec<FlowDefinition>,
    #[serde(default)]
    pub globals: Vec<Value>,
}

impl FlowAssets {
    /// Parses and validates assets from their JSON form.
    pub fn from_json_str(json: &str) -> Result<Self, AssetError> {
        let assets: Self = serde_json::from_str(json)?;
        assets.validate()?;
        Ok(assets)
    }

    pub fn to_json_string(&self) -> Result<String, AssetError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Encodes the assets in the compact binary format.
    pub fn to_bytes(&self) -> Result<Vec<u8>, AssetError> {
        encode_to_vec(self, standard()).map_err(|e| AssetError::Encode(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AssetError> {
        let (assets, _): (Self, usize) =
            decode_from_slice(bytes, standard()).map_err(|e| AssetError::Decode(e.to_string()))?;
        assets.validate()?;
        Ok(assets)
    }

    /// Saves the assets to `path` in the binary format.
    pub fn save(&self, path: &str) -> Result<(), AssetError> {
        let bytes = self.to_bytes()?;
        let mut file = fs::File::create(path).map_err(|source| AssetError::Io {
            path: path.to_string(),
            source,
        })?;
        file.write_all(&bytes).map_err(|source| AssetError::Io {
            path: path.to_string(),
            source,
        })
    }

    /// Loads assets from `path`; files ending in `.json` are read as JSON, anything else as binary.
    pub fn from_file(path: &str) -> Result<Self, AssetError> {
        let mut file = fs::File::open(path).map_err(|source| AssetError::Io {
            path: path.to_string(),
            source,
        })?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)
            .map_err(|source| AssetError::Io {
                path: path.to_string(),
                source,
            })?;
        if path.ends_with(".json") {
            let json = String::from_utf8_lossy(&bytes);
            Self::from_json_str(&json)
        } else {
            Self::from_bytes(&bytes)
        }
    }

    /// Checks that every `UserWidget` names an existing flow and every connection an
    /// existing component.
    pub fn validate(&self) -> Result<(), AssetError> {
        for flow in &self.flows {
            for (index, component) in flow.components.iter().enumerate() {
                if let ComponentKind::UserWidget { flow: target } = component.kind {
                    if target >= self.flows.len() {
                        return Err(AssetError::DanglingFlowReference {
                            flow: flow.name.clone(),
                            component: index,
                            target,
                        });
                    }
                }
                let dangling = component
                    .outputs
                    .iter()
                    .flatten()
                    .find(|c| c.target >= flow.components.len());
                if let Some(connection) = dangling {
                    return Err(AssetError::DanglingConnection {
                        flow: flow.name.clone(),
                        component: index,
                        target: connection.target,
                    });
                }
            }
        }
        Ok(())
    }
}
