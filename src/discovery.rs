// ABOUTME: Server discovery boundary and the in-process server registry
// ABOUTME: A discovery transport feeds sightings; callers browse or wait for the first server

use std::fmt;
use std::future::Future;
use std::net::IpAddr;
use std::time::Duration;
use tokio::sync::watch;

/// A Sendspin server found on the network.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DiscoveredServer {
    /// Advertised instance name
    pub name: String,
    /// Host name or address
    pub host: String,
    /// TCP port
    pub port: u16,
    /// WebSocket URL to connect to
    pub url: String,
}

impl DiscoveredServer {
    /// Describe a server at `host:port` serving Sendspin under `path`.
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16, path: &str) -> Self {
        let host = host.into();
        let authority = match host.parse::<IpAddr>() {
            Ok(IpAddr::V6(_)) => format!("[{}]:{}", host, port),
            _ => format!("{}:{}", host, port),
        };
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };
        Self {
            name: name.into(),
            url: format!("ws://{}{}", authority, path),
            host,
            port,
        }
    }
}

impl fmt::Display for DiscoveredServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.url)
    }
}

/// Finds Sendspin servers.
pub trait Discovery: Send + Sync {
    /// Begin continuous browsing.
    fn start(&self);

    /// Stop browsing. Servers already found are kept.
    fn stop(&self);

    /// Servers seen so far.
    fn get_servers(&self) -> Vec<DiscoveredServer>;

    /// URL of the first server found, waiting as long as it takes.
    fn wait_for_first_server(&self) -> impl Future<Output = String> + Send;

    /// Browse for `duration` and return what was found.
    fn discover_servers(&self, duration: Duration) -> impl Future<Output = Vec<DiscoveredServer>> + Send {
        async move {
            self.start();
            tokio::time::sleep(duration).await;
            self.stop();
            self.get_servers()
        }
    }
}

/// Default browse window for a one-shot scan.
pub const DEFAULT_DISCOVERY_DURATION: Duration = Duration::from_secs(3);

/// Collects servers reported by a discovery transport.
///
/// The transport calls [`add`](Self::add) and [`remove`](Self::remove) for
/// every sighting; only sightings made while browsing is active are kept.
#[derive(Debug)]
pub struct ServerRegistry {
    servers: watch::Sender<Vec<DiscoveredServer>>,
    active: watch::Sender<bool>,
}

impl ServerRegistry {
    /// Create an idle registry.
    pub fn new() -> Self {
        let (servers, _) = watch::channel(Vec::new());
        let (active, _) = watch::channel(false);
        Self { servers, active }
    }

    /// Whether browsing is active.
    pub fn is_active(&self) -> bool {
        *self.active.borrow()
    }

    /// Watch the active flag; a transport can follow it to pause browsing.
    pub fn active_changes(&self) -> watch::Receiver<bool> {
        self.active.subscribe()
    }

    /// Record a sighting. A server with the same name is replaced.
    /// Returns false when browsing is not active.
    pub fn add(&self, server: DiscoveredServer) -> bool {
        if !self.is_active() {
            return false;
        }
        log::info!("Discovered server {}", server);
        self.servers.send_modify(|servers| {
            match servers.iter_mut().find(|known| known.name == server.name) {
                Some(known) => *known = server,
                None => servers.push(server),
            }
        });
        true
    }

    /// Forget a server that went away.
    pub fn remove(&self, name: &str) {
        self.servers.send_if_modified(|servers| {
            let before = servers.len();
            servers.retain(|server| server.name != name);
            let removed = servers.len() != before;
            if removed {
                log::info!("Server '{}' went away", name);
            }
            removed
        });
    }

    /// Forget every server.
    pub fn clear(&self) {
        self.servers.send_if_modified(|servers| {
            let had_any = !servers.is_empty();
            servers.clear();
            had_any
        });
    }
}

impl Default for ServerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Discovery for ServerRegistry {
    fn start(&self) {
        self.active.send_replace(true);
    }

    fn stop(&self) {
        self.active.send_replace(false);
    }

    fn get_servers(&self) -> Vec<DiscoveredServer> {
        self.servers.borrow().clone()
    }

    async fn wait_for_first_server(&self) -> String {
        let mut servers = self.servers.subscribe();
        loop {
            let first = servers.borrow_and_update().first().map(|s| s.url.clone());
            if let Some(url) = first {
                return url;
            }
            // The sender lives in `self`, so this only fails if it is dropped.
            if servers.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_is_built_from_host_port_path() {
        let server = DiscoveredServer::new("Living Room", "192.168.1.10", 8927, "/sendspin");
        assert_eq!(server.url, "ws://192.168.1.10:8927/sendspin");

        let v6 = DiscoveredServer::new("Den", "fe80::1", 8927, "sendspin");
        assert_eq!(v6.url, "ws://[fe80::1]:8927/sendspin");
    }

    #[test]
    fn test_sightings_ignored_while_idle() {
        let registry = ServerRegistry::new();
        assert!(!registry.add(DiscoveredServer::new("A", "a.local", 1, "/")));
        registry.start();
        assert!(registry.add(DiscoveredServer::new("A", "a.local", 1, "/")));
        assert!(registry.add(DiscoveredServer::new("A", "a.local", 2, "/")));
        assert_eq!(registry.get_servers().len(), 1);
        assert_eq!(registry.get_servers()[0].port, 2);
        registry.remove("A");
        assert!(registry.get_servers().is_empty());
    }
}
