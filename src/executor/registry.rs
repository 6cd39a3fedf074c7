//! Running-flow registry.
//!
//! Maps each executing flow id to its cancellation token so control-plane
//! callers can stop an instance out of band. Cloning the registry shares
//! the underlying map.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::{FlowError, Result};

#[derive(Clone, Default)]
pub struct FlowRegistry {
    flows: Arc<RwLock<HashMap<String, CancellationToken>>>,
}

impl FlowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a flow id for execution. Fails if an instance with the same id
    /// is already running.
    pub(crate) fn register(&self, flow_id: &str) -> Result<CancellationToken> {
        let mut flows = self.flows.write().unwrap_or_else(|e| e.into_inner());
        if flows.contains_key(flow_id) {
            return Err(FlowError::AlreadyRunning(flow_id.to_string()));
        }
        let token = CancellationToken::new();
        flows.insert(flow_id.to_string(), token.clone());
        Ok(token)
    }

    pub(crate) fn unregister(&self, flow_id: &str) {
        let mut flows = self.flows.write().unwrap_or_else(|e| e.into_inner());
        flows.remove(flow_id);
    }

    /// Request cancellation of a running flow. The flow observes the token
    /// at its next cooperative checkpoint; other instances are unaffected.
    pub fn stop(&self, flow_id: &str) -> Result<()> {
        let flows = self.flows.read().unwrap_or_else(|e| e.into_inner());
        match flows.get(flow_id) {
            Some(token) => {
                token.cancel();
                info!(flow_id = %flow_id, "flow_stop_requested");
                Ok(())
            }
            None => Err(FlowError::NotRunning(flow_id.to_string())),
        }
    }

    pub fn is_running(&self, flow_id: &str) -> bool {
        let flows = self.flows.read().unwrap_or_else(|e| e.into_inner());
        flows.contains_key(flow_id)
    }

    pub fn running_flows(&self) -> Vec<String> {
        let flows = self.flows.read().unwrap_or_else(|e| e.into_inner());
        flows.keys().cloned().collect()
    }
}
