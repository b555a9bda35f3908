//! Wiki families: a registry of sibling sites keyed by interwiki prefix.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Result;
use crate::site::{Site, SiteOptions};
use crate::transport::WikiClient;

/// A named set of sibling wikis (the Wikipedia language family, a wiki
/// farm, ...). Prefixes map to endpoints; the matching [`Site`]
/// controllers are constructed lazily, bootstrapped once and cached.
pub struct WikiFamily {
    client: Arc<WikiClient>,
    name: String,
    options: SiteOptions,
    endpoints: Mutex<HashMap<String, Url>>,
    sites: tokio::sync::Mutex<HashMap<String, Site>>,
}

impl WikiFamily {
    pub fn new(client: Arc<WikiClient>, name: impl Into<String>) -> Self {
        Self {
            client,
            name: name.into(),
            options: SiteOptions::default(),
            endpoints: Mutex::new(HashMap::new()),
            sites: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn with_site_options(mut self, options: SiteOptions) -> Self {
        self.options = options;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers a prefix, e.g. `("en", ".../w/api.php")`.
    pub fn register(&self, prefix: impl Into<String>, endpoint: Url) {
        self.endpoints
            .lock()
            .expect("family endpoints lock poisoned")
            .insert(prefix.into().to_lowercase(), endpoint);
    }

    /// Seeds a ready-made controller for a prefix, e.g. one restored with
    /// cached site info.
    pub fn register_site(&self, prefix: impl Into<String>, site: Site) {
        let prefix = prefix.into().to_lowercase();
        self.endpoints
            .lock()
            .expect("family endpoints lock poisoned")
            .insert(prefix.clone(), site.endpoint().clone());
        self.sites
            .try_lock()
            .expect("family sites lock contended during seeding")
            .insert(prefix, site);
    }

    pub fn knows(&self, prefix: &str) -> bool {
        self.endpoints
            .lock()
            .expect("family endpoints lock poisoned")
            .contains_key(&prefix.to_lowercase())
    }

    /// The controller for a prefix, constructing and bootstrapping it on
    /// first use. `None` when the prefix is not registered.
    pub async fn get_site(
        &self,
        prefix: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Site>> {
        let prefix = prefix.to_lowercase();
        let endpoint = {
            let endpoints = self
                .endpoints
                .lock()
                .expect("family endpoints lock poisoned");
            match endpoints.get(&prefix) {
                Some(url) => url.clone(),
                None => return Ok(None),
            }
        };
        let mut sites = self.sites.lock().await;
        if let Some(site) = sites.get(&prefix) {
            return Ok(Some(site.clone()));
        }
        let site = Site::with_options(
            self.client.clone(),
            endpoint.as_str(),
            self.options.clone(),
        )?;
        if site.site_info().is_err() {
            site.bootstrap(cancel).await?;
        }
        sites.insert(prefix, site.clone());
        Ok(Some(site))
    }
}
