//! End-to-end tests: discovery sweeps and inbound commands through one bridge.

mod common;

use std::time::Duration;

use lifx_mqtt_bridge::bus::{InboundMessage, MessageHandler};
use lifx_mqtt_bridge::device::PowerState;
use lifx_mqtt_bridge::discovery::DiscoveryConfig;
use lifx_mqtt_bridge::handlers::RouteOutcome;
use lifx_mqtt_bridge::Config;

use common::{bulb, TestBridge, PREFIX};

fn command(location: &str, group: &str, name: &str, payload: &str) -> InboundMessage {
    InboundMessage::new(
        format!("{PREFIX}/{location}/{group}/{name}/setPower"),
        payload.to_string(),
    )
}

#[tokio::test]
async fn test_sweep_then_command_uses_registry() {
    let ceiling = bulb(1, "Home", "Kitchen", "Ceiling", PowerState::Off);
    let t = TestBridge::new(vec![ceiling.clone()]);

    t.bridge.reconciler(t.bus.clone()).sweep().await.unwrap();
    assert_eq!(
        t.bus.payloads_for("lifx/Home/Kitchen/Ceiling").await,
        vec!["0"]
    );

    t.bridge
        .router()
        .handle(command("Home", "Kitchen", "Ceiling", "1"))
        .await;

    assert_eq!(ceiling.commands(), vec![PowerState::On]);
    assert_eq!(t.transport.discover_count(), 1);

    // Next sweep reports the new state.
    t.bridge.reconciler(t.bus.clone()).sweep().await.unwrap();
    assert_eq!(
        t.bus.payloads_for("lifx/Home/Kitchen/Ceiling").await,
        vec!["0", "1"]
    );
}

#[tokio::test]
async fn test_command_before_any_sweep_resolves_by_discovery() {
    let ceiling = bulb(1, "kitchen", "lights", "CEILING", PowerState::On);
    let t = TestBridge::new(vec![ceiling.clone()]);

    let outcome = t
        .bridge
        .router()
        .route(&command("Kitchen", "Lights", "Ceiling", "0"))
        .await;

    assert!(matches!(
        outcome,
        RouteOutcome::Dispatched {
            power: PowerState::Off,
            ..
        }
    ));
    assert_eq!(ceiling.commands(), vec![PowerState::Off]);
    assert!(t
        .bridge
        .registry()
        .lookup("lifx/kitchen/lights/CEILING")
        .await
        .is_some());
    // Resolution never publishes.
    assert_eq!(t.bus.published_count().await, 0);
}

#[tokio::test]
async fn test_vanished_device_published_off_once_per_sweep() {
    let t1 = bulb(1, "Home", "Kitchen", "Ceiling", PowerState::On);
    let t2 = bulb(2, "Home", "Kitchen", "Lamp", PowerState::On);
    let t3 = bulb(3, "Home", "Office", "Desk", PowerState::Off);
    let t = TestBridge::new(vec![t1.clone(), t2, t3.clone()]);
    let reconciler = t.bridge.reconciler(t.bus.clone());

    reconciler.sweep().await.unwrap();
    t.bus.take_published().await;

    t.transport.set_devices(vec![t1, t3]);
    reconciler.sweep().await.unwrap();

    assert_eq!(
        t.bus.payloads_for("lifx/Home/Kitchen/Ceiling").await,
        vec!["1"]
    );
    assert_eq!(t.bus.payloads_for("lifx/Home/Office/Desk").await, vec!["0"]);
    assert_eq!(t.bus.payloads_for("lifx/Home/Kitchen/Lamp").await, vec!["0"]);
    assert_eq!(t.bus.published_count().await, 3);
}

#[tokio::test]
async fn test_unresolvable_command_has_no_effect() {
    let ceiling = bulb(1, "Home", "Kitchen", "Ceiling", PowerState::Off);
    let t = TestBridge::new(vec![ceiling.clone()]);

    let outcome = t
        .bridge
        .router()
        .route(&command("Home", "Garage", "Door", "1"))
        .await;

    assert!(matches!(outcome, RouteOutcome::Unresolved { .. }));
    assert!(ceiling.commands().is_empty());
    assert_eq!(t.bus.published_count().await, 0);
    assert!(t.bridge.registry().is_empty().await);
}

#[tokio::test]
async fn test_unknown_suffix_is_ignored() {
    let ceiling = bulb(1, "Home", "Kitchen", "Ceiling", PowerState::Off);
    let t = TestBridge::new(vec![ceiling.clone()]);
    t.bridge.reconciler(t.bus.clone()).sweep().await.unwrap();

    let outcome = t
        .bridge
        .router()
        .route(&InboundMessage::new(
            "lifx/Home/Kitchen/Ceiling/setColor",
            "1",
        ))
        .await;

    assert_eq!(
        outcome,
        RouteOutcome::UnknownCommand {
            command: "setColor".to_string()
        }
    );
    assert!(ceiling.commands().is_empty());
}

#[tokio::test]
async fn test_discovery_outage_keeps_registry_for_commands() {
    let ceiling = bulb(1, "Home", "Kitchen", "Ceiling", PowerState::Off);
    let t = TestBridge::new(vec![ceiling.clone()]);
    let reconciler = t.bridge.reconciler(t.bus.clone());
    reconciler.sweep().await.unwrap();

    t.transport.set_fail_on_discover(true);
    assert!(reconciler.sweep().await.is_err());

    t.bridge
        .router()
        .handle(command("Home", "Kitchen", "Ceiling", "1"))
        .await;
    assert_eq!(ceiling.commands(), vec![PowerState::On]);
}

#[tokio::test(start_paused = true)]
async fn test_background_reconciler_follows_configured_interval() {
    let config = Config {
        discovery: DiscoveryConfig {
            initial_delay_secs: 1,
            interval_secs: 10,
            evict_after_missed_sweeps: 2,
            ..DiscoveryConfig::default()
        },
        ..Config::default()
    };
    let ceiling = bulb(1, "Home", "Kitchen", "Ceiling", PowerState::On);
    let mut t = TestBridge::with_config(config, vec![ceiling]);
    t.bridge.spawn_reconciler(t.bus.clone());

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(t.transport.discover_count(), 1);
    assert_eq!(
        t.bus.payloads_for("lifx/Home/Kitchen/Ceiling").await,
        vec!["1"]
    );

    // Two misses publish off, then eviction stops further publications.
    t.transport.set_devices(vec![]);
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(t.transport.discover_count(), 4);
    assert_eq!(
        t.bus.payloads_for("lifx/Home/Kitchen/Ceiling").await,
        vec!["1", "0", "0"]
    );
    assert!(t.bridge.registry().is_empty().await);

    t.bridge.shutdown().await;
}
