//! Hub connection management.
//!
//! The control loop talks to a [`SharedHub`], which forwards to whichever
//! [`HassClient`] is current. [`supervise`] replaces that client whenever the
//! hub host or token in the planner configuration changes.

use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use tokio::sync::watch;
use zoneplan_adapter_hass::{HassClient, HassConfig};
use zoneplan_app::ports::HubClient;
use zoneplan_domain::config::{HubSettings, PlannerConfig};
use zoneplan_domain::entity::EntityState;
use zoneplan_domain::error::HubError;

/// The current hub client, if the hub is configured.
#[derive(Default)]
pub struct SharedHub {
    current: RwLock<Option<HassClient>>,
}

impl SharedHub {
    fn current(&self) -> Option<HassClient> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn replace(&self, next: Option<HassClient>) -> Option<HassClient> {
        std::mem::replace(
            &mut *self.current.write().unwrap_or_else(PoisonError::into_inner),
            next,
        )
    }

    /// Destroy the old client and, when `settings` are complete, connect a
    /// new one.
    pub fn reconnect(&self, base: &HassConfig, settings: &HubSettings) {
        let next = if settings.is_configured() {
            let client = HassClient::new(HassConfig {
                host: settings.host.clone(),
                token: settings.token.clone(),
                ..base.clone()
            });
            client.connect();
            Some(client)
        } else {
            tracing::warn!("hub host or token not configured, running without a hub");
            None
        };
        if let Some(previous) = self.replace(next) {
            previous.destroy();
        }
    }

    /// Destroy the current client, if any.
    pub fn shutdown(&self) {
        if let Some(client) = self.replace(None) {
            client.destroy();
        }
    }
}

impl HubClient for SharedHub {
    fn state(&self, entity_id: &str) -> Option<EntityState> {
        self.current().and_then(|client| client.state(entity_id))
    }

    fn call_service(
        &self,
        domain: &str,
        service: &str,
        data: Value,
    ) -> impl Future<Output = Result<Value, HubError>> + Send {
        let client = self.current();
        let domain = domain.to_string();
        let service = service.to_string();
        async move {
            match client {
                Some(client) => client.call(&domain, &service, data).await,
                None => Err(HubError::NotConnected),
            }
        }
    }
}

/// Keep `hub` connected according to the planner configuration until
/// `shutdown` fires, then destroy the client.
pub async fn supervise(
    hub: Arc<SharedHub>,
    base: HassConfig,
    mut config: watch::Receiver<Arc<PlannerConfig>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut active: Option<HubSettings> = None;
    loop {
        let settings = config.borrow_and_update().hub.clone();
        if active.as_ref() != Some(&settings) {
            tracing::info!(host = %settings.host, "hub settings changed");
            hub.reconnect(&base, &settings);
            active = Some(settings);
        }

        tokio::select! {
            changed = config.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    hub.shutdown();
    tracing::info!("hub supervisor stopped");
}
