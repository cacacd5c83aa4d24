//! Address handling with DNS caching
//!
//! Provides address resolution with optional caching to reduce DNS lookups
//! when the tunnel connection is re-dialed.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Address that may have a cached resolved address
///
/// This type holds an address string and optionally caches the resolved
/// socket address to avoid repeated DNS lookups.
#[derive(Debug, Clone)]
pub struct AddrMaybeCached {
    /// The original address string
    addr: String,
    /// Cached resolved address
    cached: Arc<RwLock<Option<SocketAddr>>>,
}

impl AddrMaybeCached {
    /// Create a new address without cached resolution
    pub fn new(addr: &str) -> Self {
        AddrMaybeCached {
            addr: addr.to_string(),
            cached: Arc::new(RwLock::new(None)),
        }
    }

    /// Get the original address string
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Get the cached address if available
    pub async fn get_cached(&self) -> Option<SocketAddr> {
        *self.cached.read().await
    }

    /// Forget the cached address so the next resolve hits DNS again
    pub async fn clear_cache(&self) {
        *self.cached.write().await = None;
    }

    /// Resolve the address, using cache if available
    pub async fn resolve(&self) -> Result<SocketAddr> {
        if let Some(cached) = self.get_cached().await {
            return Ok(cached);
        }

        let resolved = tokio::net::lookup_host(self.addr.as_str())
            .await
            .with_context(|| format!("Failed to resolve address: {}", self.addr))?
            .next()
            .with_context(|| format!("No addresses found for: {}", self.addr))?;

        *self.cached.write().await = Some(resolved);

        Ok(resolved)
    }
}

impl From<SocketAddr> for AddrMaybeCached {
    fn from(addr: SocketAddr) -> Self {
        AddrMaybeCached {
            addr: addr.to_string(),
            cached: Arc::new(RwLock::new(Some(addr))),
        }
    }
}

impl From<&str> for AddrMaybeCached {
    fn from(addr: &str) -> Self {
        AddrMaybeCached::new(addr)
    }
}
