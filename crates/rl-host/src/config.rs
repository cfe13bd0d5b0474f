//! Host configuration with environment overrides.

use crate::NavigationType;
use rl_core::LayoutError;
use rl_core::LayoutResult;
use rl_net::DirectoryFetcher;
use rl_net::HttpFetcher;
use rl_net::LayoutFetcher;
use rl_net::PageLocation;
use rl_net::TlsPolicy;
use rl_net::TrustStoreMode;
use rl_storage::MemorySessionStore;
use rl_storage::SessionStore;
use rl_storage::StorageConfig;
use rl_storage::StorageManager;
use std::path::PathBuf;
use std::time::Duration;

pub const ORIGIN_ENV: &str = "RENDER_LAYOUT_ORIGIN";
pub const SESSION_DIR_ENV: &str = "RENDER_LAYOUT_SESSION_DIR";
pub const SITE_ROOT_ENV: &str = "RENDER_LAYOUT_SITE_ROOT";
pub const TRUST_STORE_ENV: &str = "RENDER_LAYOUT_TRUST_STORE";

const DEFAULT_PAGE_URL: &str = "http://localhost/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConfig {
    /// Address the page is considered to be loaded from.
    pub page_url: String,
    pub navigation: NavigationType,
    /// Serve layouts from this directory instead of the network.
    pub site_root: Option<PathBuf>,
    /// Persist session storage here; in-memory when unset.
    pub session_dir: Option<PathBuf>,
    pub connect_timeout: Duration,
    pub trust_store: TrustStoreMode,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            page_url: DEFAULT_PAGE_URL.to_owned(),
            navigation: NavigationType::Navigate,
            site_root: None,
            session_dir: None,
            connect_timeout: Duration::from_secs(10),
            trust_store: TrustStoreMode::WebPkiOnly,
        }
    }
}

impl HostConfig {
    pub fn from_env() -> LayoutResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for the
    /// `RENDER_LAYOUT_*` variables. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> LayoutResult<Self> {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();

        if let Some(origin) = get(ORIGIN_ENV) {
            config.page_url = origin;
        }
        if let Some(dir) = get(SESSION_DIR_ENV) {
            config.session_dir = Some(PathBuf::from(dir));
        }
        if let Some(root) = get(SITE_ROOT_ENV) {
            config.site_root = Some(PathBuf::from(root));
        }
        if let Some(mode) = get(TRUST_STORE_ENV) {
            config.trust_store = TrustStoreMode::from_name(&mode).ok_or_else(|| {
                LayoutError::new(
                    "host.config.trust_store_invalid",
                    format!("{TRUST_STORE_ENV} must be `webpki` or `webpki+os`, got `{mode}`"),
                )
            })?;
        }

        Ok(config)
    }

    pub fn with_page_url(mut self, url: impl Into<String>) -> Self {
        self.page_url = url.into();
        self
    }

    pub fn with_navigation(mut self, navigation: NavigationType) -> Self {
        self.navigation = navigation;
        self
    }

    pub fn with_site_root(mut self, root: PathBuf) -> Self {
        self.site_root = Some(root);
        self
    }

    pub fn with_session_dir(mut self, dir: PathBuf) -> Self {
        self.session_dir = Some(dir);
        self
    }

    pub fn location(&self) -> LayoutResult<PageLocation> {
        PageLocation::parse(&self.page_url)
    }

    /// Session storage scoped to the page origin.
    pub fn session_store(&self) -> LayoutResult<Box<dyn SessionStore>> {
        let Some(dir) = &self.session_dir else {
            return Ok(Box::new(MemorySessionStore::new()));
        };

        let origin = self.location()?.origin();
        let session = StorageManager::new(StorageConfig::default())
            .with_persistent_root(dir.clone())
            .session_for(&origin)?;
        Ok(Box::new(session))
    }

    pub fn fetcher(&self) -> LayoutResult<Box<dyn LayoutFetcher + Send>> {
        if let Some(root) = &self.site_root {
            return Ok(Box::new(DirectoryFetcher::new(root.clone())));
        }

        let policy = TlsPolicy::default().with_trust_store_mode(self.trust_store);
        let fetcher = HttpFetcher::new(policy)?.with_connect_timeout(self.connect_timeout);
        Ok(Box::new(fetcher))
    }
}
