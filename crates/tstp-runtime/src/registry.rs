//! Protocol instances indexed by radio unit

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use tstp_core::{TstpError, TstpResult};

use crate::Protocol;

/// One protocol instance per radio unit
#[derive(Default)]
pub struct Network {
    instances: RwLock<BTreeMap<usize, Arc<Protocol>>>,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an instance under its unit. Fails if the unit is taken.
    pub fn register(&self, protocol: Arc<Protocol>) -> TstpResult<()> {
        let unit = protocol.unit();
        let mut instances = self.instances.write();
        if instances.contains_key(&unit) {
            return Err(TstpError::InvalidConfig(format!(
                "radio unit {} already has a protocol instance",
                unit
            )));
        }
        instances.insert(unit, protocol);
        Ok(())
    }

    pub fn get(&self, unit: usize) -> Option<Arc<Protocol>> {
        let instance = self.instances.read().get(&unit).cloned();
        if instance.is_none() {
            tracing::warn!(unit, "No protocol instance for radio unit");
        }
        instance
    }

    /// Like `get`, as an error
    pub fn require(&self, unit: usize) -> TstpResult<Arc<Protocol>> {
        self.get(unit).ok_or(TstpError::NoSuchRadio(unit))
    }

    pub fn remove(&self, unit: usize) -> Option<Arc<Protocol>> {
        self.instances.write().remove(&unit)
    }

    pub fn units(&self) -> Vec<usize> {
        self.instances.read().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.instances.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.read().is_empty()
    }
}

impl std::fmt::Debug for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Network").field("units", &self.units()).finish()
    }
}
