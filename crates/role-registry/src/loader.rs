//! Registry table definitions and file loading.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use schoolgate_core_types::Role;
use serde::{Deserialize, Serialize};

use crate::errors::RegistryError;

/// On-disk shape of a registry table.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegistryFile {
    pub version: u32,
    pub roles: BTreeMap<Role, RoleSpec>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoleSpec {
    /// Role whose permissions are included before this role's own list.
    #[serde(default)]
    pub inherits: Option<Role>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

pub fn load_registry_from_reader<R: Read>(mut reader: R) -> Result<RegistryFile, RegistryError> {
    let mut buf = String::new();
    reader.read_to_string(&mut buf)?;
    parse_registry_str(&buf)
}

pub fn load_registry_from_path(path: impl AsRef<Path>) -> Result<RegistryFile, RegistryError> {
    let file = File::open(path.as_ref())?;
    load_registry_from_reader(file)
}

/// Accepts JSON first and falls back to YAML.
pub fn parse_registry_str(raw: &str) -> Result<RegistryFile, RegistryError> {
    match serde_json::from_str(raw) {
        Ok(file) => Ok(file),
        Err(json_err) => serde_yaml::from_str(raw).map_err(|yaml_err| {
            RegistryError::Deserialize(format!(
                "json error: {}; yaml error: {}",
                json_err, yaml_err
            ))
        }),
    }
}
