//! Access-point resolution and selection.
//!
//! Access points are discovered through an HTTPS directory returning
//! `{"accesspoint": ["host:port", ...]}`. Selection picks at random among
//! servers that are not inside their avoidance window. A server enters the
//! window once it accumulates `failure_threshold` consecutive failures and
//! leaves it after `avoid_window`. The directory is queried again only when
//! no candidate remains and `resolve_cooldown` has elapsed since the last
//! query; if nothing is usable the built-in fallback is returned.

use crate::http::{HttpClient, HttpRequest};
use crate::transport::{AccessPoint, TransportError, TransportResult};
use crate::{DEFAULT_RESOLVER_URL, FALLBACK_HOST, FALLBACK_PORT};
use rand::seq::SliceRandom;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Resolver configuration
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Directory endpoint
    pub url: String,
    /// Endpoint used when nothing else is available
    pub fallback: AccessPoint,
    /// How long a failing server is skipped
    pub avoid_window: Duration,
    /// Minimum delay between directory queries
    pub resolve_cooldown: Duration,
    /// Consecutive failures before a server is avoided
    pub failure_threshold: u32,
    /// Directory request timeout
    pub request_timeout: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_RESOLVER_URL.to_string(),
            fallback: AccessPoint::new(FALLBACK_HOST, FALLBACK_PORT),
            avoid_window: Duration::from_secs(300),
            resolve_cooldown: Duration::from_secs(60),
            failure_threshold: 1,
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// One known access point and its history.
#[derive(Debug, Clone)]
pub struct Server {
    /// Endpoint
    pub ap: AccessPoint,
    /// When the directory last listed it
    pub resolved_at: Instant,
    /// Last successful connection
    pub connected_at: Option<Instant>,
    /// Last failure
    pub failed_at: Option<Instant>,
    /// Consecutive failures
    pub failures: u32,
}

impl Server {
    fn new(ap: AccessPoint, now: Instant) -> Self {
        Self {
            ap,
            resolved_at: now,
            connected_at: None,
            failed_at: None,
            failures: 0,
        }
    }

    /// Whether the server is currently inside its avoidance window
    #[must_use]
    pub fn is_avoided(&self, now: Instant, config: &ResolverConfig) -> bool {
        if self.failures < config.failure_threshold {
            return false;
        }
        self.failed_at
            .is_some_and(|t| now.saturating_duration_since(t) < config.avoid_window)
    }
}

#[derive(Deserialize)]
struct DirectoryResponse {
    accesspoint: Vec<String>,
}

/// Access-point resolver
#[derive(Debug)]
pub struct ApResolver {
    config: ResolverConfig,
    servers: Vec<Server>,
    last_resolve: Option<Instant>,
}

impl ApResolver {
    /// Create a resolver with no known servers
    #[must_use]
    pub fn new(config: ResolverConfig) -> Self {
        Self {
            config,
            servers: Vec::new(),
            last_resolve: None,
        }
    }

    /// Known servers
    #[must_use]
    pub fn servers(&self) -> &[Server] {
        &self.servers
    }

    /// Resolver configuration
    #[must_use]
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    fn resolve_due(&self, now: Instant) -> bool {
        self.last_resolve
            .is_none_or(|t| now.saturating_duration_since(t) >= self.config.resolve_cooldown)
    }

    fn has_candidates(&self, now: Instant) -> bool {
        self.servers
            .iter()
            .any(|s| !s.is_avoided(now, &self.config))
    }

    /// Query the directory and merge its list.
    ///
    /// Returns the number of servers listed.
    ///
    /// # Errors
    /// Returns [`TransportError::Http`] if the request fails or the body is
    /// not a usable directory response.
    pub async fn resolve(&mut self, http: &dyn HttpClient) -> TransportResult<usize> {
        let now = Instant::now();
        self.last_resolve = Some(now);

        let request = HttpRequest::get(&self.config.url)
            .header("Accept", "application/json")
            .timeout(self.config.request_timeout);
        let response = http.execute(request).await?;
        if !response.is_success() {
            return Err(TransportError::Http(format!(
                "directory returned status {}",
                response.status
            )));
        }

        let body: DirectoryResponse = response.json()?;
        let listed: Vec<AccessPoint> = body
            .accesspoint
            .iter()
            .filter_map(|entry| match entry.parse() {
                Ok(ap) => Some(ap),
                Err(_) => {
                    debug!(entry = %entry, "Skipping malformed access point");
                    None
                }
            })
            .collect();

        if listed.is_empty() {
            return Err(TransportError::Http("directory listed no access points".into()));
        }

        self.merge(listed, now);
        info!(count = self.servers.len(), "Resolved access points");
        Ok(self.servers.len())
    }

    fn merge(&mut self, listed: Vec<AccessPoint>, now: Instant) {
        let mut merged = Vec::with_capacity(listed.len());
        for ap in listed {
            if merged.iter().any(|s: &Server| s.ap == ap) {
                continue;
            }
            match self.servers.iter().position(|s| s.ap == ap) {
                Some(i) => {
                    let mut server = self.servers.swap_remove(i);
                    server.resolved_at = now;
                    merged.push(server);
                }
                None => merged.push(Server::new(ap, now)),
            }
        }
        self.servers = merged;
    }

    /// Pick an access point, re-resolving when needed.
    pub async fn pick(&mut self, http: &dyn HttpClient) -> AccessPoint {
        let now = Instant::now();
        if !self.has_candidates(now) && self.resolve_due(now) {
            if let Err(e) = self.resolve(http).await {
                warn!(error = %e, fallback = %self.config.fallback, "Access point resolution failed");
            }
        }
        self.choose(Instant::now())
    }

    fn choose(&self, now: Instant) -> AccessPoint {
        let candidates: Vec<&Server> = self
            .servers
            .iter()
            .filter(|s| !s.is_avoided(now, &self.config))
            .collect();

        match candidates.choose(&mut rand::thread_rng()) {
            Some(server) => server.ap.clone(),
            None => {
                debug!(fallback = %self.config.fallback, "No usable access point, using fallback");
                self.config.fallback.clone()
            }
        }
    }

    /// Record a failed connection or session loss.
    pub fn mark_failed(&mut self, ap: &AccessPoint) {
        self.mark_failed_at(ap, Instant::now());
    }

    fn mark_failed_at(&mut self, ap: &AccessPoint, now: Instant) {
        let index = match self.servers.iter().position(|s| &s.ap == ap) {
            Some(i) => i,
            None => {
                self.servers.push(Server::new(ap.clone(), now));
                self.servers.len() - 1
            }
        };
        let server = &mut self.servers[index];
        server.failures += 1;
        server.failed_at = Some(now);
        warn!(access_point = %ap, failures = server.failures, "Access point marked failed");
    }

    /// Record a successful connection.
    pub fn mark_connected(&mut self, ap: &AccessPoint) {
        if let Some(server) = self.servers.iter_mut().find(|s| &s.ap == ap) {
            server.failures = 0;
            server.connected_at = Some(Instant::now());
        }
    }
}
