//! Tenant config store
//!
//! One authoritative map of tenant configurations plus a TTL cache in front
//! of it. Readers get immutable `Arc` snapshots and never see torn state;
//! writes validate, atomically replace the entry and notify subscribers on
//! a broadcast channel so long-lived callers can refresh their local view.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::constants::cache;
use crate::tenant::TenantConfig;
use crate::ConfigError;

/// Change notification emitted by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantConfigEvent {
    Updated(String),
    Reset(String),
}

struct CacheEntry {
    config: Arc<TenantConfig>,
    loaded_at: Instant,
}

pub struct TenantConfigStore {
    /// Authoritative configs written through `update`.
    source: DashMap<String, TenantConfig>,
    /// Read cache with TTL; missing tenants cache the default config.
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
    events: broadcast::Sender<TenantConfigEvent>,
}

impl TenantConfigStore {
    pub fn new() -> Self {
        Self::with_ttl(Duration::from_secs(cache::TENANT_TTL_SECS))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            source: DashMap::new(),
            entries: DashMap::new(),
            ttl,
            events,
        }
    }

    /// Get the tenant's config snapshot. Unknown tenants resolve to the
    /// default config with the tenant id spliced in.
    pub fn get(&self, tenant_id: &str) -> Arc<TenantConfig> {
        if let Some(entry) = self.entries.get(tenant_id) {
            if entry.loaded_at.elapsed() < self.ttl {
                return Arc::clone(&entry.config);
            }
        }
        self.load(tenant_id)
    }

    fn load(&self, tenant_id: &str) -> Arc<TenantConfig> {
        let config = self
            .source
            .get(tenant_id)
            .map(|c| c.value().clone())
            .unwrap_or_else(|| TenantConfig::default_for(tenant_id));
        let config = Arc::new(config);
        self.entries.insert(
            tenant_id.to_string(),
            CacheEntry {
                config: Arc::clone(&config),
                loaded_at: Instant::now(),
            },
        );
        config
    }

    /// Validate and store a new config, invalidating the cached entry and
    /// notifying subscribers. Rejected configs leave the store untouched.
    pub fn update(&self, config: TenantConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let tenant_id = config.tenant_id.clone();
        self.source.insert(tenant_id.clone(), config);
        self.entries.remove(&tenant_id);
        tracing::info!(tenant = %tenant_id, "Tenant config updated");
        let _ = self.events.send(TenantConfigEvent::Updated(tenant_id));
        Ok(())
    }

    /// Drop a tenant back to defaults.
    pub fn reset(&self, tenant_id: &str) {
        self.source.remove(tenant_id);
        self.entries.remove(tenant_id);
        let _ = self
            .events
            .send(TenantConfigEvent::Reset(tenant_id.to_string()));
    }

    /// Subscribe to config-change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<TenantConfigEvent> {
        self.events.subscribe()
    }
}

impl Default for TenantConfigStore {
    fn default() -> Self {
        Self::new()
    }
}
