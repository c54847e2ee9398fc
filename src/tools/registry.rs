use std::collections::HashSet;

use super::handler::{ToolHandler, ToolSpec};
use super::schema::FunctionDeclaration;
use crate::error::ConfigurationError;

const MAX_NAME_LEN: usize = 64;

/// Ordered catalog of tools. Stores definitions, projects declarations for
/// the provider, and looks up handlers by name.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolSpec>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Register a tool. Names are checked in [`ToolRegistry::validate`].
    pub fn add(mut self, spec: ToolSpec) -> Self {
        self.tools.push(spec);
        self
    }

    /// Reject registries the model could not use unambiguously.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.tools.is_empty() {
            return Err(ConfigurationError::NoTools);
        }

        let mut seen = HashSet::new();
        for tool in &self.tools {
            let decl = &tool.declaration;
            if !valid_name(&decl.name) {
                return Err(ConfigurationError::InvalidToolName(decl.name.clone()));
            }
            if !seen.insert(decl.name.as_str()) {
                return Err(ConfigurationError::DuplicateTool(decl.name.clone()));
            }
            if let Some(ref params) = decl.parameters {
                if let Some(missing) = params
                    .required
                    .iter()
                    .find(|r| !params.properties.contains_key(*r))
                {
                    return Err(ConfigurationError::UnknownRequiredParameter {
                        tool: decl.name.clone(),
                        parameter: missing.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// All declarations, in registration order, for the provider request.
    pub fn declarations(&self) -> Vec<FunctionDeclaration> {
        self.tools.iter().map(|t| t.declaration.clone()).collect()
    }

    /// Declaration for a specific tool by name.
    pub fn get(&self, name: &str) -> Option<&FunctionDeclaration> {
        self.tools
            .iter()
            .find(|t| t.declaration.name == name)
            .map(|t| &t.declaration)
    }

    pub(crate) fn handler(&self, name: &str) -> Option<&dyn ToolHandler> {
        self.tools
            .iter()
            .find(|t| t.declaration.name == name)
            .map(|t| t.handler.as_ref())
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolError;
    use crate::tools::{FnHandler, FunctionParameters, SchemaType};
    use serde_json::{json, Map, Value};

    fn noop(_: &Map<String, Value>) -> Result<Value, ToolError> {
        Ok(json!({ "ok": true }))
    }

    fn test_registry() -> ToolRegistry {
        ToolRegistry::new()
            .add(ToolSpec::new(
                "getUserNames",
                "Get the list of user names",
                FnHandler(noop),
            ))
            .add(
                ToolSpec::new("addUser", "Add a user to the list", FnHandler(noop))
                    .with_parameters(
                        FunctionParameters::object()
                            .property("name", SchemaType::String, "The name of the user to add")
                            .required("name"),
                    ),
            )
    }

    #[test]
    fn declarations_keep_registration_order() {
        let reg = test_registry();
        let names: Vec<_> = reg.declarations().into_iter().map(|d| d.name).collect();
        assert_eq!(names, ["getUserNames", "addUser"]);
        assert_eq!(reg.names(), ["getUserNames", "addUser"]);
    }

    #[test]
    fn lookup_returns_registered_declaration() {
        let reg = test_registry();
        for decl in reg.declarations() {
            assert_eq!(reg.get(&decl.name), Some(&decl));
        }
        let add = reg.get("addUser").unwrap();
        assert_eq!(add.parameters.as_ref().unwrap().required, ["name"]);
    }

    #[test]
    fn lookup_unknown_is_none() {
        let reg = test_registry();
        assert!(reg.get("dropTable").is_none());
        assert!(reg.handler("dropTable").is_none());
        assert!(reg.handler("addUser").is_some());
    }

    #[test]
    fn valid_registry_passes() {
        assert_eq!(test_registry().validate(), Ok(()));
    }

    #[test]
    fn empty_registry_rejected() {
        assert_eq!(
            ToolRegistry::new().validate(),
            Err(ConfigurationError::NoTools)
        );
    }

    #[test]
    fn duplicate_name_rejected() {
        let reg = test_registry().add(ToolSpec::new("addUser", "again", FnHandler(noop)));
        assert_eq!(
            reg.validate(),
            Err(ConfigurationError::DuplicateTool("addUser".into()))
        );
    }

    #[test]
    fn bad_names_rejected() {
        let long = "x".repeat(65);
        for name in ["", "has space", "semi;colon", long.as_str()] {
            let reg = ToolRegistry::new().add(ToolSpec::new(name, "bad", FnHandler(noop)));
            assert_eq!(
                reg.validate(),
                Err(ConfigurationError::InvalidToolName(name.to_string())),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn undeclared_required_parameter_rejected() {
        let reg = ToolRegistry::new().add(
            ToolSpec::new("addUser", "Add a user", FnHandler(noop))
                .with_parameters(FunctionParameters::object().required("name")),
        );
        assert_eq!(
            reg.validate(),
            Err(ConfigurationError::UnknownRequiredParameter {
                tool: "addUser".into(),
                parameter: "name".into(),
            })
        );
    }
}
