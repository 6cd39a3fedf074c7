//! One-shot process initialization: load configuration, discover and
//! register flows, and expose both behind a process-wide handle.

use std::sync::OnceLock;

use anyhow::{Context, Result};

use crate::config::Config;
use crate::flows::{discover_flow_files, FlowFile, FlowLibrary};

struct InitState {
    config: Config,
    library: FlowLibrary,
}

static STATE: OnceLock<InitState> = OnceLock::new();

#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    /// Overrides `CASCADE_CONFIG_PATH` for this process.
    pub config_path: Option<String>,
    /// Flow sources registered in addition to the scanned paths.
    pub flow_files: Vec<FlowFile>,
    /// Whether configured flow paths are scanned for `.flow` files.
    pub scan_paths: bool,
}

impl InitOptions {
    pub fn builder() -> InitBuilder {
        InitBuilder::default()
    }
}

#[derive(Debug, Clone)]
pub struct InitBuilder {
    options: InitOptions,
}

impl Default for InitBuilder {
    fn default() -> Self {
        Self {
            options: InitOptions {
                config_path: None,
                flow_files: Vec::new(),
                scan_paths: true,
            },
        }
    }
}

impl InitBuilder {
    pub fn config_path(mut self, path: impl Into<String>) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn flow_file(mut self, file: FlowFile) -> Self {
        self.options.flow_files.push(file);
        self
    }

    pub fn scan_paths(mut self, scan: bool) -> Self {
        self.options.scan_paths = scan;
        self
    }

    pub fn build(self) -> InitOptions {
        self.options
    }
}

/// Initialize the process once. Later calls are no-ops; the first
/// successful call wins.
pub fn initialize(options: InitOptions) -> Result<()> {
    if STATE.get().is_some() {
        return Ok(());
    }

    if let Some(path) = &options.config_path {
        std::env::set_var("CASCADE_CONFIG_PATH", path);
    }
    let config = Config::load().context("configuration load failed")?;

    let mut library = FlowLibrary::new();
    if options.scan_paths {
        let discovered = discover_flow_files(&config.flows.paths)?;
        library.register(discovered)?;
    }
    library.register(options.flow_files)?;

    let _ = STATE.set(InitState { config, library });
    Ok(())
}

pub fn is_initialized() -> bool {
    STATE.get().is_some()
}

pub fn get_config() -> Result<&'static Config> {
    STATE
        .get()
        .map(|s| &s.config)
        .context("engine is not initialized")
}

pub fn get_library() -> Result<&'static FlowLibrary> {
    STATE
        .get()
        .map(|s| &s.library)
        .context("engine is not initialized")
}
