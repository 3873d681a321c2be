//! Service registry with async handlers
//!
//! Scenes act on devices exclusively through services (`scene.turn_on`,
//! `scene.apply`, `homeassistant.turn_off`). The registry maps
//! `domain.service` to a handler and, when attached to a bus, announces
//! every dispatched call as a `call_service` event.

use dashmap::DashMap;
use scenes_core::events::CallServiceData;
use scenes_core::{Context, ServiceCall};
use scenes_event_bus::EventBus;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Result type for service calls
pub type ServiceResult = Result<Option<serde_json::Value>, ServiceError>;

/// Future type for async service handlers
pub type ServiceFuture = Pin<Box<dyn Future<Output = ServiceResult> + Send>>;

/// Service handler function type
pub type ServiceHandler = Arc<dyn Fn(ServiceCall) -> ServiceFuture + Send + Sync>;

#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("service not found: {domain}.{service}")]
    NotFound { domain: String, service: String },

    #[error("service call failed: {0}")]
    CallFailed(String),

    #[error("invalid service data: {0}")]
    InvalidData(String),
}

pub struct ServiceRegistry {
    /// Handlers indexed by "domain.service"
    services: DashMap<String, ServiceHandler>,
    event_bus: Option<Arc<EventBus>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self {
            services: DashMap::new(),
            event_bus: None,
        }
    }

    /// Registry that fires `call_service` on `event_bus` for each dispatch
    pub fn with_event_bus(event_bus: Arc<EventBus>) -> Self {
        Self {
            services: DashMap::new(),
            event_bus: Some(event_bus),
        }
    }

    /// Register (or replace) the handler for `domain.service`
    #[instrument(skip(self, domain, service, handler))]
    pub fn register<F, Fut>(&self, domain: impl Into<String>, service: impl Into<String>, handler: F)
    where
        F: Fn(ServiceCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ServiceResult> + Send + 'static,
    {
        let domain = domain.into();
        let service = service.into();
        debug!(domain = %domain, service = %service, "Registering service");

        let handler: ServiceHandler =
            Arc::new(move |call| Box::pin(handler(call)) as ServiceFuture);

        self.services
            .insert(format!("{}.{}", domain, service), handler);
    }

    /// Call a service and wait for its handler to finish
    #[instrument(skip(self, service_data, context))]
    pub async fn call(
        &self,
        domain: &str,
        service: &str,
        service_data: serde_json::Value,
        context: Context,
    ) -> ServiceResult {
        let key = format!("{}.{}", domain, service);

        // Clone out of the map so the shard lock is not held across the await
        let handler = self
            .services
            .get(&key)
            .map(|h| h.clone())
            .ok_or_else(|| {
                warn!(domain = %domain, service = %service, "Service not found");
                ServiceError::NotFound {
                    domain: domain.to_string(),
                    service: service.to_string(),
                }
            })?;

        if let Some(bus) = &self.event_bus {
            bus.fire_typed(
                CallServiceData {
                    domain: domain.to_string(),
                    service: service.to_string(),
                    service_data: service_data.clone(),
                },
                context.clone(),
            );
        }

        debug!(domain = %domain, service = %service, "Calling service");
        handler(ServiceCall::new(domain, service, service_data, context)).await
    }

    pub fn has_service(&self, domain: &str, service: &str) -> bool {
        self.services.contains_key(&format!("{}.{}", domain, service))
    }

    #[instrument(skip(self))]
    pub fn unregister(&self, domain: &str, service: &str) -> bool {
        let removed = self
            .services
            .remove(&format!("{}.{}", domain, service))
            .is_some();

        if removed {
            debug!(domain = %domain, service = %service, "Unregistered service");
        }

        removed
    }

    pub fn service_count(&self) -> usize {
        self.services.len()
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedServiceRegistry = Arc<ServiceRegistry>;
