//! Tool capability and the catalog of tool types agents may reference.

pub mod calculator;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{BuildError, ToolError, ToolSpec};

pub use calculator::Calculator;

/// What the model is told about a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    /// JSON Schema of the arguments object.
    pub parameters: Value,
}

/// Contract for an invocable tool.
#[async_trait]
pub trait Tool: Send + Sync + 'static {
    fn declaration(&self) -> ToolDeclaration;

    async fn call(&self, arguments: Value) -> Result<Value, ToolError>;
}

/// Builds a tool instance for one [`ToolSpec`].
pub type ToolFactory = Arc<dyn Fn(&ToolSpec) -> Arc<dyn Tool> + Send + Sync>;

/// Tool types available to agent configs, keyed by type name.
#[derive(Clone, Default)]
pub struct ToolCatalog {
    factories: HashMap<String, ToolFactory>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with every built-in tool type.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        catalog
            .factories
            .insert(calculator::TOOL_TYPE.to_string(), Arc::new(|spec: &ToolSpec| {
                Arc::new(Calculator::named(spec.effective_name())) as Arc<dyn Tool>
            }));
        catalog
    }

    pub fn register<F>(&mut self, tool_type: impl Into<String>, factory: F) -> Result<(), BuildError>
    where
        F: Fn(&ToolSpec) -> Arc<dyn Tool> + Send + Sync + 'static,
    {
        let tool_type = tool_type.into();
        if self.factories.contains_key(&tool_type) {
            return Err(BuildError::DuplicateToolType(tool_type));
        }
        self.factories.insert(tool_type, Arc::new(factory));
        Ok(())
    }

    pub fn contains(&self, tool_type: &str) -> bool {
        self.factories.contains_key(tool_type)
    }

    pub fn types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.keys().cloned().collect();
        types.sort();
        types
    }

    /// Instantiate the tools listed on an agent, in declaration order.
    pub fn build(&self, specs: &[ToolSpec]) -> Result<ToolSet, BuildError> {
        let mut set = ToolSet::default();
        for spec in specs {
            let factory = self
                .factories
                .get(&spec.tool_type)
                .ok_or_else(|| BuildError::UnknownTool(spec.tool_type.clone()))?;
            let name = spec.effective_name().to_string();
            if set.get(&name).is_some() {
                return Err(BuildError::DuplicateTool(name));
            }
            set.tools.push((name, factory(spec)));
        }
        Ok(set)
    }
}

impl std::fmt::Debug for ToolCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolCatalog")
            .field("types", &self.types())
            .finish()
    }
}

/// Tools bound to one agent instance.
#[derive(Clone, Default)]
pub struct ToolSet {
    tools: Vec<(String, Arc<dyn Tool>)>,
}

impl ToolSet {
    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        self.tools.iter().map(|(_, tool)| tool.declaration()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools
            .iter()
            .find(|(tool_name, _)| tool_name == name)
            .map(|(_, tool)| tool)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.tools.iter().map(|(n, _)| n.as_str()).collect();
        f.debug_struct("ToolSet").field("tools", &names).finish()
    }
}
