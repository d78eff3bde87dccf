//! Read-only function registry, loaded once at startup

use std::collections::BTreeMap;
use std::path::Path;

use qsse_proto::{DataType, FunctionType};
use tracing::info;

use crate::definition::DefinitionFile;
use crate::error::RegistryError;
use crate::validation::validate_definitions;

/// A declared parameter of a function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: String,
    pub data_type: DataType,
}

/// A validated function signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSpec {
    pub id: i32,
    pub name: String,
    pub kind: FunctionType,
    /// Sorted by name; this is the cell order of every inbound row.
    pub parameters: Vec<ParamSpec>,
    pub return_type: DataType,
}

impl FunctionSpec {
    /// Column position of the parameter called `name`.
    pub fn param_index(&self, name: &str) -> Option<usize> {
        self.parameters.iter().position(|p| p.name == name)
    }
}

/// Function id to signature. Never mutated after construction.
#[derive(Debug, Clone)]
pub struct FunctionRegistry {
    functions: BTreeMap<i32, FunctionSpec>,
}

impl FunctionRegistry {
    /// Load and validate a JSON definition file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: DefinitionFile =
            serde_json::from_str(&raw).map_err(|source| RegistryError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        let registry = Self::from_definitions(&file)?;
        info!(
            "Loaded {} function definitions from {}",
            registry.len(),
            path.display()
        );
        Ok(registry)
    }

    /// Build a registry from an already-parsed definition file.
    pub fn from_definitions(file: &DefinitionFile) -> Result<Self, RegistryError> {
        let specs = validate_definitions(file).map_err(RegistryError::Invalid)?;
        Ok(Self {
            functions: specs.into_iter().map(|s| (s.id, s)).collect(),
        })
    }

    pub fn resolve(&self, id: i32) -> Result<&FunctionSpec, RegistryError> {
        self.functions.get(&id).ok_or(RegistryError::NotFound(id))
    }

    /// All specs in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &FunctionSpec> {
        self.functions.values()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}
