//! [`ConfigRepository`] over a TOML file.

use std::future::Future;
use std::io::ErrorKind;
use std::path::PathBuf;

use zoneplan_app::ports::ConfigRepository;
use zoneplan_domain::config::PlannerConfig;
use zoneplan_domain::error::ZoneplanError;

/// Stores the planner configuration as a TOML document.
///
/// Writes go to a sibling temporary file first and are renamed into place.
#[derive(Debug, Clone)]
pub struct TomlConfigRepository {
    path: PathBuf,
}

impl TomlConfigRepository {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ConfigRepository for TomlConfigRepository {
    fn load(&self) -> impl Future<Output = Result<Option<PlannerConfig>, ZoneplanError>> + Send {
        let path = self.path.clone();
        async move {
            match tokio::fs::read_to_string(&path).await {
                Ok(content) => toml::from_str(&content)
                    .map(Some)
                    .map_err(ZoneplanError::storage),
                Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
                Err(err) => Err(ZoneplanError::storage(err)),
            }
        }
    }

    fn save(&self, config: &PlannerConfig) -> impl Future<Output = Result<(), ZoneplanError>> + Send {
        let path = self.path.clone();
        let encoded = toml::to_string_pretty(config);
        async move {
            let content = encoded.map_err(ZoneplanError::storage)?;
            let tmp = path.with_extension("toml.tmp");
            tokio::fs::write(&tmp, content)
                .await
                .map_err(ZoneplanError::storage)?;
            tokio::fs::rename(&tmp, &path)
                .await
                .map_err(ZoneplanError::storage)?;
            tracing::debug!(path = %path.display(), "planner configuration saved");
            Ok(())
        }
    }
}
