//! Agent registry: validated specs loaded once, agents built per request.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::debug;

use super::{Agent, AgentBuilder};
use crate::domain::{AgentConfig, AgentSpec, BuildError, ConfigError};
use crate::metrics::METRICS;
use crate::obs;

/// Immutable set of agent specs keyed by id.
#[derive(Debug, Clone)]
pub struct AgentRegistry {
    specs: BTreeMap<String, AgentSpec>,
    builder: AgentBuilder,
}

impl AgentRegistry {
    /// Load every `*.json` file in `dir`. A file without an `id` takes its
    /// file stem as id.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).map_err(|source| ConfigError::ReadDir {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| ConfigError::ReadDir {
                path: dir.to_path_buf(),
                source,
            })?;
            let path = entry.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut configs = Vec::with_capacity(paths.len());
        for path in paths {
            let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::ReadFile {
                path: path.clone(),
                source,
            })?;
            let mut config: AgentConfig =
                serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
                    path: path.clone(),
                    source,
                })?;
            if config.id.trim().is_empty() {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    config.id = stem.to_string();
                }
            }
            debug!(path = %path.display(), id = %config.id, "loaded agent config");
            configs.push(config);
        }

        if configs.is_empty() {
            return Err(ConfigError::Empty(dir.to_path_buf()));
        }
        Self::from_configs(configs)
    }

    pub fn from_configs(configs: Vec<AgentConfig>) -> Result<Self, ConfigError> {
        let specs = configs
            .into_iter()
            .map(AgentSpec::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_specs(specs)
    }

    pub fn from_specs(specs: Vec<AgentSpec>) -> Result<Self, ConfigError> {
        let mut map = BTreeMap::new();
        for spec in specs {
            if map.contains_key(&spec.id) {
                return Err(ConfigError::DuplicateId(spec.id));
            }
            map.insert(spec.id.clone(), spec);
        }
        Ok(Self {
            specs: map,
            builder: AgentBuilder::default(),
        })
    }

    pub fn with_builder(mut self, builder: AgentBuilder) -> Self {
        self.builder = builder;
        self
    }

    /// Known agent ids, sorted.
    pub fn list_agent_ids(&self) -> Vec<String> {
        self.specs.keys().cloned().collect()
    }

    pub fn spec(&self, id: &str) -> Option<&AgentSpec> {
        self.specs.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.specs.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Build a fresh agent instance for `id`.
    pub fn build(&self, id: &str) -> Result<Agent, BuildError> {
        let spec = self
            .specs
            .get(id)
            .ok_or_else(|| BuildError::NotFound(id.to_string()))?;

        match self.builder.build(spec) {
            Ok(agent) => {
                obs::emit_agent_built(id, agent.kind().as_str());
                Ok(agent)
            }
            Err(err) => {
                METRICS.inc_build_failures();
                obs::emit_agent_build_failed(id, &err);
                Err(err)
            }
        }
    }

    /// Try to build every agent, returning the failures by id.
    pub fn validate(&self) -> Vec<(String, BuildError)> {
        self.specs
            .keys()
            .filter_map(|id| self.build(id).err().map(|err| (id.clone(), err)))
            .collect()
    }
}
