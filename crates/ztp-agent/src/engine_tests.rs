// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use indexmap::IndexMap;

use super::*;

/// A scripted fleet: each method looks up a queue of canned results for
/// the target IP and pops one per call, repeating the last entry once
/// the queue is drained. Lets a test script "device fails twice then
/// succeeds" without a real SSH server (engine.rs's own rationale for
/// putting a trait at this seam).
#[derive(Default)]
struct FakeOps {
    identities: StdMutex<HashMap<String, VecDeque<Result<Identity, AgentError>>>>,
    neighbors:
        StdMutex<HashMap<String, VecDeque<Result<(IndexMap<String, (DeviceType, Neighbor)>, Vec<L2Hop>), AgentError>>>>,
    base_config: StdMutex<HashMap<String, VecDeque<Result<(), AgentError>>>>,
    device_config: StdMutex<HashMap<String, VecDeque<Result<(), AgentError>>>>,
    ap_port: StdMutex<HashMap<String, VecDeque<Result<(), AgentError>>>>,
}

fn pop_or_repeat<T: Clone>(queues: &StdMutex<HashMap<String, VecDeque<T>>>, ip: &str, default: T) -> T {
    let mut guard = queues.lock().unwrap();
    let queue = guard.entry(ip.to_owned()).or_default();
    match queue.pop_front() {
        Some(front) => {
            if queue.is_empty() {
                queue.push_back(front.clone());
            }
            front
        }
        None => default,
    }
}

impl FakeOps {
    fn new() -> Self {
        Self::default()
    }

    fn script_identity(&self, ip: &str, result: Result<Identity, AgentError>) {
        self.identities.lock().unwrap().entry(ip.to_owned()).or_default().push_back(result);
    }

    fn script_neighbors(
        &self,
        ip: &str,
        result: Result<(IndexMap<String, (DeviceType, Neighbor)>, Vec<L2Hop>), AgentError>,
    ) {
        self.neighbors.lock().unwrap().entry(ip.to_owned()).or_default().push_back(result);
    }

    fn script_base_config(&self, ip: &str, result: Result<(), AgentError>) {
        self.base_config.lock().unwrap().entry(ip.to_owned()).or_default().push_back(result);
    }

    fn script_device_config(&self, ip: &str, result: Result<(), AgentError>) {
        self.device_config.lock().unwrap().entry(ip.to_owned()).or_default().push_back(result);
    }

    fn script_ap_port(&self, ip: &str, result: Result<(), AgentError>) {
        self.ap_port.lock().unwrap().entry(ip.to_owned()).or_default().push_back(result);
    }
}

#[async_trait]
impl SwitchOps for FakeOps {
    async fn discover_identity(&self, ip: &str, _credentials: &[Credential]) -> Result<Identity, AgentError> {
        pop_or_repeat(
            &self.identities,
            ip,
            Ok(Identity {
                model: "ICX7150-C12".to_owned(),
                serial: "FAKE0001".to_owned(),
                firmware: "SPR08030c".to_owned(),
                uptime: "1 day".to_owned(),
            }),
        )
    }

    async fn apply_base_config(
        &self,
        ip: &str,
        _credentials: &[Credential],
        _base_config: &str,
    ) -> Result<(), AgentError> {
        pop_or_repeat(&self.base_config, ip, Ok(()))
    }

    async fn apply_device_config(
        &self,
        ip: &str,
        _credentials: &[Credential],
        _plan: &VlanPlan,
        _hostname: Option<&str>,
    ) -> Result<(), AgentError> {
        pop_or_repeat(&self.device_config, ip, Ok(()))
    }

    async fn discover_neighbors(
        &self,
        ip: &str,
        _credentials: &[Credential],
    ) -> Result<(IndexMap<String, (DeviceType, Neighbor)>, Vec<L2Hop>), AgentError> {
        pop_or_repeat(&self.neighbors, ip, Ok((IndexMap::new(), Vec::new())))
    }

    async fn configure_ap_port(
        &self,
        switch_ip: &str,
        _credentials: &[Credential],
        _port: &str,
        _management_vlan: u16,
        _wireless_vlans: &[u16],
        _description: &str,
    ) -> Result<(), AgentError> {
        pop_or_repeat(&self.ap_port, switch_ip, Ok(()))
    }
}

fn neighbor_ap(mgmt_ip: &str) -> Neighbor {
    Neighbor {
        remote_chassis_mac: Some("38:45:3b:3c:db:36".to_owned()),
        remote_port_id: "1/1/4".to_owned(),
        remote_system_name: "r350-1".to_owned(),
        remote_system_description: "Ruckus R350 Multimedia Hotzone Wireless AP".to_owned(),
        remote_mgmt_ip: Some(mgmt_ip.to_owned()),
    }
}

fn neighbor_switch_no_mgmt_ip() -> Neighbor {
    Neighbor {
        remote_chassis_mac: Some("ac:1f:6b:00:00:02".to_owned()),
        remote_port_id: "1/1/1".to_owned(),
        remote_system_name: "icx-2".to_owned(),
        remote_system_description: "Ruckus ICX7150-C12 Switch".to_owned(),
        remote_mgmt_ip: Some("0.0.0.0".to_owned()),
    }
}

fn test_config(seed: &str) -> ConfigureDelta {
    ConfigureDelta {
        seeds: vec![seed.to_owned()],
        credentials: vec![crate::transport::frame::Credential {
            username: "super".to_owned(),
            password: "sp-admin".to_owned(),
        }],
        preferred_password: "sp-admin".to_owned(),
        base_config: "interface ethernet 1/1/1\n logging enable\nexit\n".to_owned(),
        vlan_plan: VlanPlan {
            management_vlan: 10,
            wireless_vlans: vec![20, 30],
            gateway: Some("192.168.1.1".to_owned()),
            dns: Some("192.168.1.2".to_owned()),
        },
        poll_interval_ms: Some(50),
        fast_discovery: true,
        settle_delay_ms: Some(0),
    }
}

fn new_test_engine(ops: FakeOps, config: ConfigureDelta) -> (Engine, EngineHandle, mpsc::UnboundedReceiver<Event>) {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (mut engine, handle) = Engine::new("agent-1", Arc::new(ops), events_tx);
    engine.config = config;
    engine.running = true;
    (engine, handle, events_rx)
}

#[tokio::test]
async fn single_seed_converges_to_configured_with_no_neighbors() {
    let ops = FakeOps::new();
    let (mut engine, _handle, _events) = new_test_engine(ops, test_config("192.168.1.10"));

    engine.run_tick().await;
    engine.run_tick().await;

    let device = engine.inventory.get("192.168.1.10").expect("seed device present");
    assert_eq!(device.status, DeviceStatus::Configured);
    assert!(device.base_config_applied);
    assert!(device.configured);
    assert!(device.tasks_completed.contains(&"base_config".to_owned()));
    assert!(device.tasks_completed.contains(&"device_config".to_owned()));
}

#[tokio::test]
async fn repeated_ticks_on_a_converged_device_emit_no_further_updates() {
    let ops = FakeOps::new();
    let (mut engine, _handle, mut events) = new_test_engine(ops, test_config("192.168.1.10"));

    engine.run_tick().await;
    engine.run_tick().await;
    while events.try_recv().is_ok() {}

    engine.run_tick().await;
    assert!(events.try_recv().is_err(), "a converged device must not re-emit events on a no-op tick");
}

#[tokio::test]
async fn ap_discovered_via_lldp_gets_its_own_device_and_port_config() {
    let ops = FakeOps::new();
    let mut neighbors = IndexMap::new();
    neighbors.insert("1/1/4".to_owned(), (DeviceType::Ap, neighbor_ap("172.16.128.13")));
    ops.script_neighbors("192.168.1.10", Ok((neighbors, Vec::new())));

    let (mut engine, _handle, _events) = new_test_engine(ops, test_config("192.168.1.10"));

    for _ in 0..4 {
        engine.run_tick().await;
    }

    let ap = engine.inventory.get("172.16.128.13").expect("ap discovered from lldp neighbor");
    assert_eq!(ap.device_type, DeviceType::Ap);
    assert_eq!(ap.connected_switch.as_deref(), Some("192.168.1.10"));
    assert_eq!(ap.connected_port.as_deref(), Some("1/1/4"));
    assert!(ap.configured, "ap port phase should have configured the new ap");

    let switch = engine.inventory.get("192.168.1.10").unwrap();
    assert!(switch.ap_ports.contains("1/1/4"));
}

#[tokio::test]
async fn l2_trace_hop_creates_switch_when_lldp_mgmt_ip_is_unusable() {
    let ops = FakeOps::new();
    let mut neighbors = IndexMap::new();
    neighbors.insert("1/1/1".to_owned(), (DeviceType::Switch, neighbor_switch_no_mgmt_ip()));
    let hops = vec![L2Hop { ip: "192.168.1.11".to_owned(), mac: "ac:1f:6b:00:00:02".to_owned() }];
    ops.script_neighbors("192.168.1.10", Ok((neighbors, hops)));

    let (mut engine, _handle, _events) = new_test_engine(ops, test_config("192.168.1.10"));

    for _ in 0..2 {
        engine.run_tick().await;
    }

    assert!(!engine.inventory.contains("0.0.0.0"));
    let discovered = engine.inventory.get("192.168.1.11").expect("l2 trace hop creates the neighbor switch");
    assert_eq!(discovered.mac.as_deref(), Some("ac:1f:6b:00:00:02"));
}

#[tokio::test]
async fn retryable_failure_only_fails_device_after_threshold() {
    let ops = FakeOps::new();
    ops.script_identity("192.168.1.10", Err(AgentError::timeout("no response")));
    ops.script_identity("192.168.1.10", Err(AgentError::timeout("no response")));
    ops.script_identity("192.168.1.10", Err(AgentError::timeout("no response")));

    let (mut engine, _handle, _events) = new_test_engine(ops, test_config("192.168.1.10"));

    engine.run_tick().await;
    assert_eq!(engine.inventory.get("192.168.1.10").unwrap().status, DeviceStatus::Connecting);

    engine.run_tick().await;
    assert_eq!(engine.inventory.get("192.168.1.10").unwrap().status, DeviceStatus::Connecting);

    engine.run_tick().await;
    assert_eq!(engine.inventory.get("192.168.1.10").unwrap().status, DeviceStatus::Error);
}

#[tokio::test]
async fn auth_error_fails_device_immediately_without_threshold() {
    let ops = FakeOps::new();
    ops.script_identity("192.168.1.10", Err(AgentError::auth("all credentials rejected")));

    let (mut engine, _handle, mut events) = new_test_engine(ops, test_config("192.168.1.10"));

    engine.run_tick().await;

    assert_eq!(engine.inventory.get("192.168.1.10").unwrap().status, DeviceStatus::Error);
    let mut saw_error_event = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event.event_type, EventType::Error) {
            saw_error_event = true;
        }
    }
    assert!(saw_error_event, "an immediate auth failure must be reported as an error event");
}

#[tokio::test]
async fn base_config_phase_is_skipped_when_config_is_empty() {
    let ops = FakeOps::new();
    let mut config = test_config("192.168.1.10");
    config.base_config = String::new();
    let (mut engine, _handle, _events) = new_test_engine(ops, config);

    engine.run_tick().await;
    engine.run_tick().await;

    let device = engine.inventory.get("192.168.1.10").unwrap();
    assert!(!device.base_config_applied);
    assert_eq!(device.status, DeviceStatus::Configuring);
}

#[tokio::test]
async fn control_start_and_stop_emit_lifecycle_events() {
    let ops = FakeOps::new();
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let (mut engine, handle) = Engine::new("agent-1", Arc::new(ops), events_tx);
    engine.config = test_config("192.168.1.10");

    handle.push_control(ControlAction::Start);
    engine.drain_intake();
    assert!(engine.is_running());

    handle.push_control(ControlAction::Stop);
    engine.drain_intake();
    assert!(!engine.is_running());

    let mut saw_start = false;
    let mut saw_stop = false;
    while let Ok(event) = events_rx.try_recv() {
        match event.event_type {
            EventType::ZtpStarted => saw_start = true,
            EventType::ZtpStopped => saw_stop = true,
            _ => {}
        }
    }
    assert!(saw_start && saw_stop);
}
