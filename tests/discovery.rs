use sendspin_player::discovery::DEFAULT_DISCOVERY_DURATION;
use sendspin_player::{DiscoveredServer, Discovery, ServerRegistry};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

#[tokio::test]
async fn test_wait_for_first_server_resolves_on_sighting() {
    let registry = Arc::new(ServerRegistry::new());
    registry.start();

    let waiter = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move { registry.wait_for_first_server().await })
    };
    tokio::task::yield_now().await;
    registry.add(DiscoveredServer::new("Kitchen", "192.168.1.20", 8927, "/sendspin"));

    let url = timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
    assert_eq!(url, "ws://192.168.1.20:8927/sendspin");
}

#[tokio::test]
async fn test_wait_returns_immediately_when_already_known() {
    let registry = ServerRegistry::new();
    registry.start();
    registry.add(DiscoveredServer::new("Den", "den.local", 8927, "/sendspin"));
    let url = timeout(Duration::from_millis(100), registry.wait_for_first_server())
        .await
        .unwrap();
    assert_eq!(url, "ws://den.local:8927/sendspin");
}

#[tokio::test(start_paused = true)]
async fn test_discover_servers_browses_for_the_window() {
    let registry = Arc::new(ServerRegistry::new());
    let mut active = registry.active_changes();

    let transport = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move {
            active.wait_for(|browsing| *browsing).await.unwrap();
            registry.add(DiscoveredServer::new("Office", "10.0.0.5", 8927, "/sendspin"));
        })
    };

    let found = registry.discover_servers(DEFAULT_DISCOVERY_DURATION).await;
    transport.await.unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].name, "Office");
    assert!(!registry.is_active());

    // Sightings after the window are ignored.
    assert!(!registry.add(DiscoveredServer::new("Late", "10.0.0.6", 8927, "/sendspin")));
}
