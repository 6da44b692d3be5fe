//! Hub port: the home-automation hub as seen by the control loop.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use zoneplan_domain::entity::EntityState;
use zoneplan_domain::error::HubError;

/// Read access to cached entity states plus remote service calls.
///
/// `state` is a synchronous cache lookup; only `call_service` goes over the
/// wire.
pub trait HubClient: Send + Sync {
    /// Latest known state of `entity_id`, or `None` if the hub never reported it.
    fn state(&self, entity_id: &str) -> Option<EntityState>;

    /// Invoke `domain.service` with `data` and wait for the acknowledgment.
    fn call_service(
        &self,
        domain: &str,
        service: &str,
        data: Value,
    ) -> impl Future<Output = Result<Value, HubError>> + Send;
}

impl<T: HubClient> HubClient for Arc<T> {
    fn state(&self, entity_id: &str) -> Option<EntityState> {
        (**self).state(entity_id)
    }

    fn call_service(
        &self,
        domain: &str,
        service: &str,
        data: Value,
    ) -> impl Future<Output = Result<Value, HubError>> + Send {
        (**self).call_service(domain, service, data)
    }
}
