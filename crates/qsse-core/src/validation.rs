//! Definition file validation

use std::collections::HashSet;

use qsse_proto::{DataType, FunctionType};

use crate::definition::{DefinitionFile, FunctionEntry};
use crate::error::DefinitionError;
use crate::registry::{FunctionSpec, ParamSpec};

/// Validate every entry of a definition file and convert it into typed specs.
///
/// All problems are collected; the file is rejected if any are found.
pub fn validate_definitions(file: &DefinitionFile) -> Result<Vec<FunctionSpec>, Vec<DefinitionError>> {
    let mut errors = Vec::new();
    let mut specs = Vec::with_capacity(file.functions.len());
    let mut seen_ids = HashSet::new();

    if file.functions.is_empty() {
        errors.push(DefinitionError::NoFunctions);
    }

    for entry in &file.functions {
        if !seen_ids.insert(entry.id) {
            errors.push(DefinitionError::DuplicateId {
                id: entry.id,
                name: entry.name.clone(),
            });
        }
        if let Some(spec) = validate_entry(entry, &mut errors) {
            specs.push(spec);
        }
    }

    if errors.is_empty() {
        Ok(specs)
    } else {
        Err(errors)
    }
}

fn validate_entry(entry: &FunctionEntry, errors: &mut Vec<DefinitionError>) -> Option<FunctionSpec> {
    let before = errors.len();

    if entry.name.trim().is_empty() {
        errors.push(DefinitionError::EmptyName(entry.id));
    }

    let kind = FunctionType::try_from(entry.kind).ok();
    if kind.is_none() {
        errors.push(DefinitionError::UnknownKind {
            name: entry.name.clone(),
            value: entry.kind,
        });
    }

    let return_type = DataType::try_from(entry.return_type).ok();
    if return_type.is_none() {
        errors.push(DefinitionError::UnknownReturnType {
            name: entry.name.clone(),
            value: entry.return_type,
        });
    }

    let mut parameters = Vec::with_capacity(entry.params.len());
    for (param, &value) in &entry.params {
        if param.trim().is_empty() {
            errors.push(DefinitionError::EmptyParamName(entry.name.clone()));
            continue;
        }
        match DataType::try_from(value) {
            Ok(data_type) => parameters.push(ParamSpec {
                name: param.clone(),
                data_type,
            }),
            Err(_) => errors.push(DefinitionError::UnknownParamType {
                name: entry.name.clone(),
                param: param.clone(),
                value,
            }),
        }
    }

    if errors.len() > before {
        return None;
    }

    Some(FunctionSpec {
        id: entry.id,
        name: entry.name.clone(),
        kind: kind?,
        parameters,
        return_type: return_type?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn entry(id: i32, name: &str, kind: i32) -> FunctionEntry {
        FunctionEntry {
            name: name.to_string(),
            id,
            kind,
            return_type: 0,
            params: BTreeMap::from([("a".to_string(), 0)]),
        }
    }

    #[test]
    fn valid_file_produces_specs() {
        let file = DefinitionFile {
            functions: vec![entry(0, "Directions", 0), entry(1, "Waypoints", 1)],
        };
        let specs = validate_definitions(&file).unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[1].kind, FunctionType::Aggregation);
        assert_eq!(specs[0].parameters[0].data_type, DataType::String);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let file = DefinitionFile {
            functions: vec![entry(4, "first", 0), entry(4, "second", 0)],
        };
        let errors = validate_definitions(&file).unwrap_err();
        assert_eq!(
            errors,
            vec![DefinitionError::DuplicateId {
                id: 4,
                name: "second".to_string()
            }]
        );
    }

    #[test]
    fn unknown_kind_and_types_are_all_reported() {
        let mut bad = entry(0, "bad", 7);
        bad.return_type = 9;
        bad.params.insert("b".to_string(), 3);
        let file = DefinitionFile {
            functions: vec![bad],
        };
        let errors = validate_definitions(&file).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&DefinitionError::UnknownKind {
            name: "bad".to_string(),
            value: 7
        }));
        assert!(errors.contains(&DefinitionError::UnknownReturnType {
            name: "bad".to_string(),
            value: 9
        }));
        assert!(errors.contains(&DefinitionError::UnknownParamType {
            name: "bad".to_string(),
            param: "b".to_string(),
            value: 3
        }));
    }

    #[test]
    fn empty_names_are_rejected() {
        let mut f = entry(2, "  ", 0);
        f.params.insert(String::new(), 0);
        let errors = validate_definitions(&DefinitionFile { functions: vec![f] }).unwrap_err();
        assert!(errors.contains(&DefinitionError::EmptyName(2)));
        assert!(errors.contains(&DefinitionError::EmptyParamName("  ".to_string())));
    }

    #[test]
    fn empty_file_is_rejected() {
        let errors = validate_definitions(&DefinitionFile { functions: vec![] }).unwrap_err();
        assert_eq!(errors, vec![DefinitionError::NoFunctions]);
    }
}
