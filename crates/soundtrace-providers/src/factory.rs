//! Provider selection from explicit configuration.

use std::collections::HashMap;
use std::sync::Arc;

use soundtrace_core::{AppConfig, Platform};

use crate::error::ProviderError;
use crate::http::HttpSettings;
use crate::{InstagramProvider, SoundProvider, TiktokProvider, YoutubeProvider};

/// API key and optional base-URL override for one platform.
#[derive(Clone, Default)]
pub struct PlatformCredentials {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

impl std::fmt::Debug for PlatformCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformCredentials")
            .field("api_key", &self.api_key.as_ref().map(|_| "[redacted]"))
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Everything needed to construct providers. Built once from [`AppConfig`]
/// in binaries, or by hand in tests.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
    pub max_retries: u32,
    pub retry_backoff_base_ms: u64,
    pub tiktok: PlatformCredentials,
    pub instagram: PlatformCredentials,
    pub youtube: PlatformCredentials,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: "soundtrace/0.1 (sound-tracking)".to_string(),
            max_retries: 2,
            retry_backoff_base_ms: 500,
            tiktok: PlatformCredentials::default(),
            instagram: PlatformCredentials::default(),
            youtube: PlatformCredentials::default(),
        }
    }
}

impl From<&AppConfig> for ProviderConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            timeout_secs: config.provider_timeout_secs,
            user_agent: config.provider_user_agent.clone(),
            max_retries: config.provider_max_retries,
            retry_backoff_base_ms: config.provider_retry_backoff_base_ms,
            tiktok: PlatformCredentials {
                api_key: config.tiktok_api_key.clone(),
                base_url: config.tiktok_api_base_url.clone(),
            },
            instagram: PlatformCredentials {
                api_key: config.instagram_api_key.clone(),
                base_url: config.instagram_api_base_url.clone(),
            },
            youtube: PlatformCredentials {
                api_key: config.youtube_api_key.clone(),
                base_url: config.youtube_api_base_url.clone(),
            },
        }
    }
}

impl ProviderConfig {
    pub(crate) fn http_settings(&self) -> HttpSettings {
        HttpSettings {
            timeout_secs: self.timeout_secs,
            user_agent: self.user_agent.clone(),
            max_retries: self.max_retries,
            retry_backoff_base_ms: self.retry_backoff_base_ms,
        }
    }

    /// Longest a single provider call may take once in-call retries are
    /// counted. Outer timeouts around provider calls should use this rather
    /// than [`Self::timeout_secs`], or a timed-out first attempt would never
    /// be retried.
    #[must_use]
    pub fn call_budget(&self) -> std::time::Duration {
        crate::http::call_budget(&self.http_settings())
    }

    fn credentials(&self, platform: Platform) -> &PlatformCredentials {
        match platform {
            Platform::Tiktok => &self.tiktok,
            Platform::Instagram => &self.instagram,
            Platform::Youtube => &self.youtube,
        }
    }
}

fn api_key_var(platform: Platform) -> &'static str {
    match platform {
        Platform::Tiktok => "TIKTOK_API_KEY",
        Platform::Instagram => "INSTAGRAM_API_KEY",
        Platform::Youtube => "YOUTUBE_API_KEY",
    }
}

/// Constructs the provider for `platform`.
///
/// # Errors
///
/// Returns [`ProviderError::MissingConfig`] when the platform's API key is
/// absent, or [`ProviderError::Http`] / [`ProviderError::InvalidUrl`] if the
/// client or base URL cannot be built.
pub fn create_provider(
    platform: Platform,
    config: &ProviderConfig,
) -> Result<Arc<dyn SoundProvider>, ProviderError> {
    let creds = config.credentials(platform);
    let api_key = creds
        .api_key
        .as_deref()
        .filter(|k| !k.trim().is_empty())
        .ok_or(ProviderError::MissingConfig {
            platform,
            var: api_key_var(platform),
        })?;
    let settings = config.http_settings();
    let base_url = creds.base_url.as_deref();

    let provider: Arc<dyn SoundProvider> = match platform {
        Platform::Tiktok => Arc::new(TiktokProvider::new(api_key, base_url, &settings)?),
        Platform::Instagram => Arc::new(InstagramProvider::new(api_key, base_url, &settings)?),
        Platform::Youtube => Arc::new(YoutubeProvider::new(api_key, base_url, &settings)?),
    };
    Ok(provider)
}

/// The set of providers available to the engine, keyed by platform.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<Platform, Arc<dyn SoundProvider>>,
}

impl ProviderRegistry {
    /// Builds every configured provider. Platforms without credentials are
    /// skipped with a warning; their jobs fail as invalid input when run.
    ///
    /// # Errors
    ///
    /// Returns any construction error other than [`ProviderError::MissingConfig`].
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let mut registry = Self::default();
        for platform in Platform::ALL {
            match create_provider(platform, config) {
                Ok(provider) => {
                    registry.providers.insert(platform, provider);
                }
                Err(ProviderError::MissingConfig { var, .. }) => {
                    tracing::warn!(%platform, var, "provider not configured, skipping");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(registry)
    }

    /// Adds or replaces the provider for its platform.
    #[must_use]
    pub fn with(mut self, provider: Arc<dyn SoundProvider>) -> Self {
        self.providers.insert(provider.platform(), provider);
        self
    }

    #[must_use]
    pub fn get(&self, platform: Platform) -> Option<Arc<dyn SoundProvider>> {
        self.providers.get(&platform).cloned()
    }

    /// Like [`Self::get`] but reports an unconfigured platform as an error.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::MissingConfig`] if no provider is registered.
    pub fn require(&self, platform: Platform) -> Result<Arc<dyn SoundProvider>, ProviderError> {
        self.get(platform).ok_or(ProviderError::MissingConfig {
            platform,
            var: api_key_var(platform),
        })
    }

    #[must_use]
    pub fn platforms(&self) -> Vec<Platform> {
        Platform::ALL
            .into_iter()
            .filter(|p| self.providers.contains_key(p))
            .collect()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("platforms", &self.platforms())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_tiktok() -> ProviderConfig {
        ProviderConfig {
            tiktok: PlatformCredentials {
                api_key: Some("tt-key".to_string()),
                base_url: None,
            },
            ..ProviderConfig::default()
        }
    }

    #[test]
    fn create_provider_fails_without_key() {
        let err = create_provider(Platform::Instagram, &ProviderConfig::default())
            .err()
            .expect("missing key must fail");
        assert!(matches!(
            err,
            ProviderError::MissingConfig {
                platform: Platform::Instagram,
                var: "INSTAGRAM_API_KEY"
            }
        ));
    }

    #[test]
    fn create_provider_treats_blank_key_as_missing() {
        let mut config = ProviderConfig::default();
        config.youtube.api_key = Some("   ".to_string());
        assert!(create_provider(Platform::Youtube, &config).is_err());
    }

    #[test]
    fn create_provider_builds_configured_platform() {
        let provider = create_provider(Platform::Tiktok, &config_with_tiktok()).unwrap();
        assert_eq!(provider.platform(), Platform::Tiktok);
    }

    #[test]
    fn registry_skips_unconfigured_platforms() {
        let registry = ProviderRegistry::from_config(&config_with_tiktok()).unwrap();
        assert_eq!(registry.platforms(), vec![Platform::Tiktok]);
        assert!(registry.get(Platform::Youtube).is_none());
        assert!(matches!(
            registry.require(Platform::Youtube),
            Err(ProviderError::MissingConfig { .. })
        ));
    }

    #[test]
    fn call_budget_exceeds_request_timeout_when_retrying() {
        let config = ProviderConfig {
            timeout_secs: 30,
            max_retries: 2,
            ..ProviderConfig::default()
        };
        assert!(config.call_budget() > std::time::Duration::from_secs(90));

        let single = ProviderConfig {
            max_retries: 0,
            ..config
        };
        assert_eq!(single.call_budget(), std::time::Duration::from_secs(30));
    }

    #[test]
    fn credentials_debug_redacts_key() {
        let rendered = format!("{:?}", config_with_tiktok());
        assert!(!rendered.contains("tt-key"));
        assert!(rendered.contains("[redacted]"));
    }
}
