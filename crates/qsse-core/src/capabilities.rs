//! Capability advertisement

use qsse_proto::{Capabilities, FunctionDefinition, Parameter};
use tracing::info;

use crate::registry::FunctionRegistry;

/// Identity reported to the host in `GetCapabilities`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginInfo {
    pub identifier: String,
    pub version: String,
    pub allow_script: bool,
}

impl Default for PluginInfo {
    fn default() -> Self {
        Self {
            identifier: "qsse directions".to_string(),
            version: concat!("v", env!("CARGO_PKG_VERSION")).to_string(),
            allow_script: true,
        }
    }
}

/// Describe every registered function, ordered by id, parameters sorted by name.
///
/// Built once at startup; the result is served verbatim on every call.
pub fn build_capabilities(registry: &FunctionRegistry, plugin: &PluginInfo) -> Capabilities {
    let functions = registry
        .iter()
        .map(|spec| {
            let mut params: Vec<Parameter> = spec
                .parameters
                .iter()
                .map(|p| Parameter {
                    data_type: p.data_type as i32,
                    name: p.name.clone(),
                })
                .collect();
            params.sort_by(|a, b| a.name.cmp(&b.name));

            info!(
                "Adding to capabilities: {}({:?})",
                spec.name,
                params.iter().map(|p| p.name.as_str()).collect::<Vec<_>>()
            );

            FunctionDefinition {
                name: spec.name.clone(),
                function_type: spec.kind as i32,
                return_type: spec.return_type as i32,
                params,
                function_id: spec.id,
            }
        })
        .collect();

    Capabilities {
        allow_script: plugin.allow_script,
        functions,
        plugin_identifier: plugin.identifier.clone(),
        plugin_version: plugin.version.clone(),
    }
}
