//! Flow library: named flow sources, discovered on disk or registered
//! directly, instantiated into fresh models per run.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use tracing::info;
use uuid::Uuid;

use crate::parser::parse_flow;
use crate::types::FlowModel;

/// A named flow source, usually read from a `.flow` file.
#[derive(Debug, Clone)]
pub struct FlowFile {
    pub name: String,
    pub source: String,
    pub file_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
struct FlowEntry {
    source: String,
    version_hash: String,
    file_path: Option<PathBuf>,
}

/// Registry of parseable flow sources keyed by name.
#[derive(Debug, Clone, Default)]
pub struct FlowLibrary {
    entries: HashMap<String, FlowEntry>,
}

impl FlowLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a batch of flow files. Each source must parse cleanly;
    /// a later registration under the same name replaces the earlier one.
    pub fn register(&mut self, files: Vec<FlowFile>) -> Result<()> {
        for file in files {
            let probe = parse_flow(&file.name, &file.source);
            if !probe.success {
                match &file.file_path {
                    Some(path) => bail!(
                        "flow '{}' ({}) is invalid: {}",
                        file.name,
                        path.display(),
                        probe.error
                    ),
                    None => bail!("flow '{}' is invalid: {}", file.name, probe.error),
                }
            }
            let version_hash = hash_source(&file.source);
            info!(
                flow = %file.name,
                version = %&version_hash[..12],
                "flow_registered"
            );
            self.entries.insert(
                file.name,
                FlowEntry {
                    source: file.source,
                    version_hash,
                    file_path: file.file_path,
                },
            );
        }
        Ok(())
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn version_hash(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(|e| e.version_hash.as_str())
    }

    pub fn file_path(&self, name: &str) -> Option<&Path> {
        self.entries.get(name).and_then(|e| e.file_path.as_deref())
    }

    /// Build a fresh model for a run, with a generated unique flow id.
    pub fn instantiate(&self, name: &str) -> Result<FlowModel> {
        let id = format!("{}-{}", name, Uuid::new_v4());
        self.instantiate_with_id(name, &id)
    }

    /// Build a fresh model under a caller-chosen flow id.
    pub fn instantiate_with_id(&self, name: &str, flow_id: &str) -> Result<FlowModel> {
        let entry = self
            .entries
            .get(name)
            .with_context(|| format!("no flow named '{}' is registered", name))?;
        Ok(parse_flow(flow_id, &entry.source))
    }
}

/// Recursively collect `.flow` files under the given roots, sorted for a
/// stable registration order. Names are file stems.
pub fn discover_flow_files(roots: &[PathBuf]) -> Result<Vec<FlowFile>> {
    let mut found = Vec::new();
    for root in roots {
        if root.exists() {
            walk(root, &mut found)?;
        }
    }
    found.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(found)
}

fn walk(dir: &Path, out: &mut Vec<FlowFile>) -> Result<()> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory {}", dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            walk(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "flow") {
            let source = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            out.push(FlowFile {
                name,
                source,
                file_path: Some(path),
            });
        }
    }
    Ok(())
}

pub fn hash_source(source: &str) -> String {
    let digest = Sha256::digest(source.as_bytes());
    format!("{:x}", digest)
}
