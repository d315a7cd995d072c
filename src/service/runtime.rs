//! Process-wide registry of service instances sharing one bridge.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::{info, warn};

use super::definition::ServiceDefinition;
use super::error::{ConfigurationError, StartError};
use super::instance::{RuntimeOptions, ServiceInstance};
use crate::bus::{EventBridge, SharedBridge, TransportError};

/// Owns the shared bridge and at most one instance per `(name, version)`.
pub struct Runtime {
    bridge: Arc<SharedBridge>,
    options: RuntimeOptions,
    instances: Mutex<Vec<Arc<ServiceInstance>>>,
}

impl Runtime {
    pub fn new(bridge: Arc<dyn EventBridge>) -> Self {
        Self {
            bridge: Arc::new(SharedBridge::new(bridge)),
            options: RuntimeOptions::default(),
            instances: Mutex::new(Vec::new()),
        }
    }

    pub fn with_options(mut self, options: RuntimeOptions) -> Self {
        self.options = options;
        self
    }

    pub fn bridge(&self) -> &Arc<SharedBridge> {
        &self.bridge
    }

    /// Connect the shared bridge. Safe to call from any number of places.
    pub async fn connect(&self) -> Result<(), TransportError> {
        self.bridge.ensure_connected().await
    }

    /// Get the instance for this definition's `(name, version)`, creating it
    /// after validation on first request. Later calls return the same
    /// instance and ignore the definition passed.
    pub fn instance(
        &self,
        definition: ServiceDefinition,
    ) -> Result<Arc<ServiceInstance>, ConfigurationError> {
        let mut instances = self.instances.lock().unwrap_or_else(PoisonError::into_inner);
        let key = definition.info();
        if let Some(existing) = instances
            .iter()
            .find(|i| i.info().name == key.name && i.info().version == key.version)
        {
            return Ok(Arc::clone(existing));
        }
        definition.validate()?;
        let instance = Arc::new(ServiceInstance::new(
            Arc::new(definition),
            Arc::clone(&self.bridge),
            self.options.clone(),
        ));
        info!(service = %instance.info(), "service instance created");
        instances.push(Arc::clone(&instance));
        Ok(instance)
    }

    pub fn get(&self, name: &str, version: &str) -> Option<Arc<ServiceInstance>> {
        self.instances()
            .into_iter()
            .find(|i| i.info().name == name && i.info().version == version)
    }

    /// Every instance, in creation order.
    pub fn instances(&self) -> Vec<Arc<ServiceInstance>> {
        self.instances
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Start every instance with its default configuration, in creation
    /// order. Stops at the first failure.
    pub async fn start_all(&self) -> Result<(), StartError> {
        for instance in self.instances() {
            instance.start(None).await?;
        }
        Ok(())
    }

    /// Stop every instance in reverse creation order. All instances are
    /// attempted; the first error is returned.
    pub async fn stop_all(&self) -> Result<(), TransportError> {
        let mut first_error = None;
        for instance in self.instances().into_iter().rev() {
            if let Err(e) = instance.stop().await {
                warn!(service = %instance.info(), error = %e, "service did not stop cleanly");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Stop everything, then disconnect the shared bridge.
    pub async fn shutdown(&self) -> Result<(), TransportError> {
        let stopped = self.stop_all().await;
        self.bridge.disconnect().await?;
        info!("runtime shut down");
        stopped
    }
}
