//! Current planner configuration with change notification.
//!
//! Readers take cheap [`Arc`] snapshots or hold a [`watch::Receiver`] that
//! always sees the latest value. Writes go through [`ConfigStore::update`],
//! which validates and persists before anyone is notified.

use std::sync::Arc;

use tokio::sync::watch;
use zoneplan_domain::config::PlannerConfig;
use zoneplan_domain::error::ZoneplanError;

use crate::ports::ConfigRepository;

pub struct ConfigStore<R> {
    repo: R,
    sender: watch::Sender<Arc<PlannerConfig>>,
}

impl<R: ConfigRepository> ConfigStore<R> {
    /// Load the stored configuration.
    ///
    /// A missing or invalid stored configuration is replaced by the default
    /// one, which is persisted.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    pub async fn load(repo: R) -> Result<Self, ZoneplanError> {
        let stored = repo.load().await?;
        let config = match stored {
            Some(config) => match config.validate() {
                Ok(()) => config,
                Err(err) => {
                    tracing::error!(error = %err, "stored configuration is invalid, using defaults");
                    Self::persist_default(&repo).await?
                }
            },
            None => {
                tracing::info!("no stored configuration, using defaults");
                Self::persist_default(&repo).await?
            }
        };

        let (sender, _) = watch::channel(Arc::new(config));
        Ok(Self { repo, sender })
    }

    async fn persist_default(repo: &R) -> Result<PlannerConfig, ZoneplanError> {
        let config = PlannerConfig::default();
        repo.save(&config).await?;
        Ok(config)
    }

    /// The configuration as of now.
    #[must_use]
    pub fn snapshot(&self) -> Arc<PlannerConfig> {
        Arc::clone(&self.sender.borrow())
    }

    /// Receiver that sees the current configuration immediately and every
    /// later update.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<PlannerConfig>> {
        self.sender.subscribe()
    }

    /// Replace the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ZoneplanError::Validation`] when `config` fails its sanity
    /// check, or a storage error; in both cases nothing changes.
    pub async fn update(&self, config: PlannerConfig) -> Result<(), ZoneplanError> {
        config.validate()?;
        self.repo.save(&config).await?;
        tracing::info!(systems = config.systems.len(), "configuration updated");
        self.sender.send_replace(Arc::new(config));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::sync::Mutex;

    use zoneplan_domain::config::SystemConfig;
    use zoneplan_domain::error::ValidationError;

    #[derive(Default)]
    struct InMemoryConfigRepo {
        stored: Mutex<Option<PlannerConfig>>,
        saves: Mutex<usize>,
    }

    impl InMemoryConfigRepo {
        fn with(config: PlannerConfig) -> Self {
            Self {
                stored: Mutex::new(Some(config)),
                saves: Mutex::new(0),
            }
        }
    }

    impl ConfigRepository for InMemoryConfigRepo {
        fn load(&self) -> impl Future<Output = Result<Option<PlannerConfig>, ZoneplanError>> + Send {
            let result = self.stored.lock().unwrap().clone();
            async { Ok(result) }
        }

        fn save(&self, config: &PlannerConfig) -> impl Future<Output = Result<(), ZoneplanError>> + Send {
            *self.stored.lock().unwrap() = Some(config.clone());
            *self.saves.lock().unwrap() += 1;
            async { Ok(()) }
        }
    }

    fn with_system(id: &str) -> PlannerConfig {
        PlannerConfig {
            systems: vec![SystemConfig {
                thermostat_entity_id: id.to_string(),
                ..SystemConfig::default()
            }],
            ..PlannerConfig::default()
        }
    }

    #[tokio::test]
    async fn should_persist_defaults_when_nothing_is_stored() {
        let repo = Arc::new(InMemoryConfigRepo::default());
        let store = ConfigStore::load(Arc::clone(&repo)).await.unwrap();

        assert_eq!(*store.snapshot(), PlannerConfig::default());
        assert_eq!(*repo.saves.lock().unwrap(), 1);
        assert_eq!(*repo.stored.lock().unwrap(), Some(PlannerConfig::default()));
    }

    #[tokio::test]
    async fn should_use_stored_configuration() {
        let store = ConfigStore::load(InMemoryConfigRepo::with(with_system("climate.hall")))
            .await
            .unwrap();
        assert_eq!(store.snapshot().thermostat_ids(), vec!["climate.hall"]);
    }

    #[tokio::test]
    async fn should_fall_back_to_defaults_when_stored_config_is_invalid() {
        let invalid = PlannerConfig {
            tz: "Nowhere/Land".to_string(),
            ..PlannerConfig::default()
        };
        let store = ConfigStore::load(InMemoryConfigRepo::with(invalid)).await.unwrap();
        assert_eq!(store.snapshot().tz, "UTC");
    }

    #[tokio::test]
    async fn should_notify_subscribers_on_update() {
        let store = ConfigStore::load(InMemoryConfigRepo::default()).await.unwrap();
        let mut rx = store.subscribe();
        assert!(rx.borrow_and_update().systems.is_empty());

        store.update(with_system("climate.hall")).await.unwrap();

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().thermostat_ids(), vec!["climate.hall"]);
        assert_eq!(store.snapshot().thermostat_ids(), vec!["climate.hall"]);
    }

    #[tokio::test]
    async fn should_reject_invalid_update_without_notifying() {
        let store = ConfigStore::load(InMemoryConfigRepo::default()).await.unwrap();
        let rx = store.subscribe();

        let err = store
            .update(PlannerConfig {
                systems: vec![SystemConfig::default()],
                ..PlannerConfig::default()
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ZoneplanError::Validation(ValidationError::EmptyThermostatId)
        ));
        assert!(!rx.has_changed().unwrap());
    }
}
