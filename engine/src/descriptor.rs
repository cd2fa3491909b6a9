// descriptor.rs — Already-parsed block descriptor tree
//
// This is the loader's input contract: a plain tree mirroring the descriptor
// layout (ids, registers, args, ports). Every expression and literal is kept
// as text; the schema builder parses and resolves them. The tree derives
// serde traits so descriptors can be stored as JSON.

use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    /// Human-readable block name, e.g. `FFT`.
    pub name: String,
    /// Name used for block instances, when different from `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blockname: Option<String>,
    #[serde(default)]
    pub ids: Vec<IdDesc>,
    #[serde(default)]
    pub registers: RegistersDesc,
    #[serde(default)]
    pub args: Vec<ArgDesc>,
    #[serde(default)]
    pub ports: PortsDesc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdDesc {
    /// Block id as a hex string (`FF70000000000000`, optional `0x`).
    pub id: String,
    #[serde(default)]
    pub revision: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistersDesc {
    #[serde(default)]
    pub setreg: Vec<RegisterDesc>,
    #[serde(default)]
    pub readback: Vec<RegisterDesc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterDesc {
    pub name: String,
    pub address: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgDesc {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    /// Default value literal.
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortsDesc {
    #[serde(default)]
    pub sink: Vec<PortDesc>,
    #[serde(default)]
    pub source: Vec<PortDesc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortDesc {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default = "default_vlen")]
    pub vlen: String,
    #[serde(default = "default_pkt_size")]
    pub pkt_size: String,
}

fn default_vlen() -> String {
    "1".to_string()
}

fn default_pkt_size() -> String {
    "0".to_string()
}

impl Descriptor {
    pub fn from_json(text: &str) -> Result<Descriptor, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn from_path(path: &Path) -> Result<Descriptor, DescriptorReadError> {
        let text = std::fs::read_to_string(path)?;
        Ok(Descriptor::from_json(&text)?)
    }

    /// Compact JSON with fields in declaration order. Used for fingerprints.
    pub fn canonical_json(&self) -> String {
        // Serializing plain structs of strings and integers cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Name given to instances of this block.
    pub fn instance_name(&self) -> &str {
        self.blockname.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DescriptorReadError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "name": "Gain",
        "ids": [{ "id": "0xB000000000000001" }],
        "registers": { "setreg": [{ "name": "GAIN", "address": 130 }] },
        "args": [{ "name": "gain", "type": "int", "value": "1",
                   "action": "SR_WRITE(\"GAIN\", $gain)" }],
        "ports": { "sink": [{ "name": "in", "type": "sc16" }] }
    }"#;

    #[test]
    fn deserializes_with_defaults() {
        let desc = Descriptor::from_json(MINIMAL).unwrap();
        assert_eq!(desc.name, "Gain");
        assert_eq!(desc.ids[0].revision, 0);
        assert!(desc.registers.readback.is_empty());
        assert_eq!(desc.args[0].check, None);
        assert_eq!(desc.ports.sink[0].vlen, "1");
        assert_eq!(desc.ports.sink[0].pkt_size, "0");
        assert!(desc.ports.source.is_empty());
        assert_eq!(desc.instance_name(), "Gain");
    }

    #[test]
    fn canonical_json_is_stable() {
        let a = Descriptor::from_json(MINIMAL).unwrap();
        let b = Descriptor::from_json(&a.canonical_json()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.canonical_json(), b.canonical_json());
        assert!(!a.canonical_json().contains('\n'));
    }

    #[test]
    fn missing_required_field_is_error() {
        assert!(Descriptor::from_json(r#"{ "ids": [] }"#).is_err());
    }
}
