//! Function definition file: the declarative list of functions the plugin exposes

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One entry of the `Functions` list.
///
/// `Type`, `ReturnType` and the parameter types are the raw SSE wire values;
/// they are checked by [`crate::validate_definitions`] rather than at parse
/// time so that every problem in a file can be reported at once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct FunctionEntry {
    pub name: String,
    pub id: i32,
    #[serde(rename = "Type")]
    pub kind: i32,
    pub return_type: i32,
    /// Parameter name to data type. Kept sorted by name, which is the order
    /// parameters are advertised in and therefore the order cells arrive in.
    #[serde(default)]
    pub params: BTreeMap<String, i32>,
}

/// Top-level shape of a definition file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DefinitionFile {
    #[serde(rename = "Functions")]
    pub functions: Vec<FunctionEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_definition_file() {
        let json = r#"{
            "Functions": [
                {
                    "Id": 0,
                    "Name": "Directions",
                    "Type": 0,
                    "ReturnType": 0,
                    "Params": {
                        "origin": 0,
                        "destination": 0,
                        "mode": 0,
                        "response": 0,
                        "alternative": 0
                    }
                }
            ]
        }"#;
        let file: DefinitionFile = serde_json::from_str(json).unwrap();
        assert_eq!(file.functions.len(), 1);
        let entry = &file.functions[0];
        assert_eq!(entry.name, "Directions");
        assert_eq!(entry.kind, 0);
        let names: Vec<&str> = entry.params.keys().map(String::as_str).collect();
        assert_eq!(
            names,
            vec!["alternative", "destination", "mode", "origin", "response"]
        );
    }

    #[test]
    fn test_params_default_to_empty() {
        let json = r#"{"Functions":[{"Id":3,"Name":"Now","Type":0,"ReturnType":1}]}"#;
        let file: DefinitionFile = serde_json::from_str(json).unwrap();
        assert!(file.functions[0].params.is_empty());
    }

    #[test]
    fn test_missing_required_field() {
        let json = r#"{"Functions":[{"Id":3,"Type":0,"ReturnType":1}]}"#;
        assert!(serde_json::from_str::<DefinitionFile>(json).is_err());
    }

    #[test]
    fn test_missing_functions_key() {
        assert!(serde_json::from_str::<DefinitionFile>(r#"{"functions":[]}"#).is_err());
    }
}
