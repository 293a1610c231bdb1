//! Client configuration.
//!
//! Layered, lowest precedence first: built-in defaults, an optional
//! `catalog.{toml,json,yaml}` file in the working directory, then `CATALOG_*`
//! environment variables (`CATALOG_BASE_URL`, `CATALOG_PAGE_SIZE`,
//! `CATALOG_TIMEOUT_SECS`).

use std::time::Duration;

use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use serde::Deserialize;

pub use config::ConfigError;

use crate::client::CatalogClient;
use crate::pagination::{PageController, PaginationError};
use crate::store::QueryStore;
use crate::transport::UreqTransport;

pub const DEFAULT_BASE_URL: &str = "https://library-management-drab-xi.vercel.app/api";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientConfig {
    pub base_url: String,
    pub page_size: u32,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl ClientConfig {
    pub fn load() -> Result<Self, ConfigError> {
        defaults()?
            .add_source(File::with_name("catalog").required(false))
            .add_source(Environment::with_prefix("CATALOG").try_parsing(true))
            .build()?
            .try_deserialize()
    }

    /// Defaults overlaid with a TOML document.
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        defaults()?
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn client(&self) -> CatalogClient {
        CatalogClient::new(&self.base_url)
    }

    pub fn store(&self) -> QueryStore {
        QueryStore::new(self.client())
    }

    pub fn transport(&self) -> UreqTransport {
        UreqTransport::new(self.timeout())
    }

    pub fn pager(&self) -> Result<PageController, PaginationError> {
        PageController::with_page_size(self.page_size)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            page_size: crate::pagination::DEFAULT_PAGE_SIZE,
            timeout_secs: None,
        }
    }
}

fn defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError> {
    let defaults = ClientConfig::default();
    Config::builder()
        .set_default("base_url", defaults.base_url)?
        .set_default("page_size", i64::from(defaults.page_size))
}
