// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The ZTP engine: a cooperative, convergent periodic tick loop (design
//! §4.4 / C4). Each tick re-evaluates the whole inventory; there is no
//! one-shot linear workflow anywhere in this module.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use indexmap::IndexMap;
use serde_json::json;
use tokio::sync::{mpsc, watch, Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::device_ops::{self, Identity, L2Hop, VlanMode};
use crate::error::{AgentError, ErrorKind};
use crate::event::{Event, EventType};
use crate::inventory::{Device, DeviceStatus, DeviceType, Inventory, Neighbor};
use crate::ssh::{Credential, SwitchSession};
use crate::time::now_iso8601;
use crate::transport::frame::{ConfigureDelta, ControlAction, VlanPlan};

/// Consecutive-tick failure threshold before a retryable error is
/// surfaced and the device is parked in `status=error` (design §7).
const FAIL_THRESHOLD: u32 = 3;

/// Default per-switch fan-out inside one tick (design §4.4, §5).
pub const DEFAULT_FANOUT: usize = 4;

/// A pending mutation delivered asynchronously by the transport layer,
/// applied atomically at the next tick boundary (design §4.4 step 1).
#[derive(Debug, Clone)]
pub enum Intake {
    Configure(ConfigureDelta),
    Control(ControlAction),
}

/// The device-facing operations the engine needs, abstracted behind a
/// trait so the tick logic can be exercised against a fake fleet in
/// tests without a real SSH server (design §9: model control flow
/// explicitly rather than folding it into one concrete type).
#[async_trait]
pub trait SwitchOps: Send + Sync {
    async fn discover_identity(
        &self,
        ip: &str,
        credentials: &[Credential],
    ) -> Result<Identity, AgentError>;

    async fn apply_base_config(
        &self,
        ip: &str,
        credentials: &[Credential],
        base_config: &str,
    ) -> Result<(), AgentError>;

    async fn apply_device_config(
        &self,
        ip: &str,
        credentials: &[Credential],
        plan: &VlanPlan,
        hostname: Option<&str>,
    ) -> Result<(), AgentError>;

    async fn discover_neighbors(
        &self,
        ip: &str,
        credentials: &[Credential],
    ) -> Result<(IndexMap<String, (DeviceType, Neighbor)>, Vec<L2Hop>), AgentError>;

    async fn configure_ap_port(
        &self,
        switch_ip: &str,
        credentials: &[Credential],
        port: &str,
        management_vlan: u16,
        wireless_vlans: &[u16],
        description: &str,
    ) -> Result<(), AgentError>;
}

/// The real, SSH-backed implementation of [`SwitchOps`]. Opens a fresh
/// `SwitchSession` per call, per the design's "one Switch Session per IP
/// at a time" discipline, and releases it on every exit path.
pub struct SshSwitchOps {
    pub port: u16,
    pub preferred_password: String,
    pub command_timeout: Duration,
}

#[async_trait]
impl SwitchOps for SshSwitchOps {
    async fn discover_identity(
        &self,
        ip: &str,
        credentials: &[Credential],
    ) -> Result<Identity, AgentError> {
        let (mut session, _outcome) =
            SwitchSession::open(ip, self.port, credentials, &self.preferred_password, self.command_timeout)
                .await?;
        let result = device_ops::discover_identity(&mut session, self.command_timeout).await;
        session.close().await;
        result
    }

    async fn apply_base_config(
        &self,
        ip: &str,
        credentials: &[Credential],
        base_config: &str,
    ) -> Result<(), AgentError> {
        let (mut session, _outcome) =
            SwitchSession::open(ip, self.port, credentials, &self.preferred_password, self.command_timeout)
                .await?;
        let result = apply_base_config_lines(&mut session, base_config, self.command_timeout).await;
        session.close().await;
        result
    }

    async fn apply_device_config(
        &self,
        ip: &str,
        credentials: &[Credential],
        plan: &VlanPlan,
        hostname: Option<&str>,
    ) -> Result<(), AgentError> {
        let (mut session, _outcome) =
            SwitchSession::open(ip, self.port, credentials, &self.preferred_password, self.command_timeout)
                .await?;
        let result = apply_device_settings(&mut session, plan, hostname, self.command_timeout).await;
        session.close().await;
        result
    }

    async fn discover_neighbors(
        &self,
        ip: &str,
        credentials: &[Credential],
    ) -> Result<(IndexMap<String, (DeviceType, Neighbor)>, Vec<L2Hop>), AgentError> {
        let (mut session, _outcome) =
            SwitchSession::open(ip, self.port, credentials, &self.preferred_password, self.command_timeout)
                .await?;
        let result = async {
            let neighbors = device_ops::lldp_neighbors(&mut session, self.command_timeout).await?;
            let hops = device_ops::l2_trace(&mut session, self.command_timeout).await?;
            Ok((neighbors, hops))
        }
        .await;
        session.close().await;
        result
    }

    async fn configure_ap_port(
        &self,
        switch_ip: &str,
        credentials: &[Credential],
        port: &str,
        management_vlan: u16,
        wireless_vlans: &[u16],
        description: &str,
    ) -> Result<(), AgentError> {
        let (mut session, _outcome) = SwitchSession::open(
            switch_ip,
            self.port,
            credentials,
            &self.preferred_password,
            self.command_timeout,
        )
        .await?;
        let result = async {
            device_ops::set_port_vlan(&mut session, port, management_vlan, VlanMode::Access, self.command_timeout)
                .await?;
            for vlan in wireless_vlans {
                device_ops::set_port_vlan(&mut session, port, *vlan, VlanMode::TrunkNative, self.command_timeout)
                    .await?;
            }
            device_ops::set_poe(&mut session, port, true, self.command_timeout).await?;
            device_ops::set_port_description(&mut session, port, description, self.command_timeout).await?;
            let saved = session.save(Duration::from_secs(60)).await?;
            if !saved {
                return Err(AgentError::protocol("write memory did not confirm for AP port"));
            }
            Ok(())
        }
        .await;
        session.close().await;
        result
    }
}

/// Paste the base-config snippet line by line: blank lines and `!`
/// comment lines are skipped, a bare `exit` drops back to enable mode
/// and re-enters config (design §4.4 step 3).
async fn apply_base_config_lines(
    session: &mut SwitchSession,
    base_config: &str,
    timeout: Duration,
) -> Result<(), AgentError> {
    session.enter_config(timeout).await?;
    for raw_line in base_config.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('!') {
            continue;
        }
        if line.eq_ignore_ascii_case("exit") {
            session.exit_config(timeout).await?;
            session.enter_config(timeout).await?;
            continue;
        }
        let (_out, ok) = session.run(line, timeout).await?;
        if !ok {
            session.exit_config(timeout).await?;
            return Err(AgentError::protocol(format!("base config line rejected: {line}")));
        }
    }
    session.exit_config(timeout).await?;
    let saved = session.save(Duration::from_secs(60)).await?;
    if !saved {
        return Err(AgentError::protocol("write memory did not confirm for base config"));
    }
    Ok(())
}

/// Apply per-device management settings from the VLAN plan (design §4.4
/// step 4): hostname, management VLAN, gateway, DNS.
async fn apply_device_settings(
    session: &mut SwitchSession,
    plan: &VlanPlan,
    hostname: Option<&str>,
    timeout: Duration,
) -> Result<(), AgentError> {
    session.enter_config(timeout).await?;
    let result = async {
        if let Some(name) = hostname {
            let (_out, ok) = session.run(&format!("hostname {name}"), timeout).await?;
            if !ok {
                return Err(AgentError::protocol("hostname rejected"));
            }
        }
        let (_out, ok) =
            session.run(&format!("vlan {} name management", plan.management_vlan), timeout).await?;
        if !ok {
            return Err(AgentError::protocol("management vlan declaration rejected"));
        }
        if let Some(gateway) = &plan.gateway {
            let (_out, ok) = session.run(&format!("ip default-gateway {gateway}"), timeout).await?;
            if !ok {
                return Err(AgentError::protocol("default gateway rejected"));
            }
        }
        if let Some(dns) = &plan.dns {
            let (_out, ok) = session.run(&format!("ip dns server-address {dns}"), timeout).await?;
            if !ok {
                return Err(AgentError::protocol("dns server-address rejected"));
            }
        }
        Ok(())
    }
    .await;
    session.exit_config(timeout).await?;
    result?;
    let saved = session.save(Duration::from_secs(60)).await?;
    if !saved {
        return Err(AgentError::protocol("write memory did not confirm for device config"));
    }
    Ok(())
}

/// The read side handed to the transport and RPC layers: a live
/// inventory snapshot feed and the intake channel to push configuration
/// and control changes into the engine.
#[derive(Clone)]
pub struct EngineHandle {
    pub intake_tx: mpsc::UnboundedSender<Intake>,
    pub inventory_rx: watch::Receiver<Vec<Device>>,
    pub busy_ips: Arc<Mutex<std::collections::HashSet<String>>>,
}

impl EngineHandle {
    pub fn push_configure(&self, delta: ConfigureDelta) {
        let _ = self.intake_tx.send(Intake::Configure(delta));
    }

    pub fn push_control(&self, action: ControlAction) {
        let _ = self.intake_tx.send(Intake::Control(action));
    }

    pub fn snapshot(&self) -> Vec<Device> {
        self.inventory_rx.borrow().clone()
    }

    /// Fail-fast `Busy` check for RPC dispatch against a switch the
    /// engine currently holds a live session to (design §5).
    pub async fn is_busy(&self, ip: &str) -> bool {
        self.busy_ips.lock().await.contains(ip)
    }
}

/// Owns the device inventory exclusively and runs the periodic tick
/// loop. Never cloned or shared; external readers use [`EngineHandle`].
pub struct Engine {
    agent_id: String,
    ops: Arc<dyn SwitchOps>,
    inventory: Inventory,
    config: ConfigureDelta,
    running: bool,
    tick: u64,
    seq: u64,
    fanout: usize,
    fail_counts: HashMap<String, u32>,
    intake_rx: mpsc::UnboundedReceiver<Intake>,
    events_tx: mpsc::UnboundedSender<Event>,
    inventory_tx: watch::Sender<Vec<Device>>,
    busy_ips: Arc<Mutex<std::collections::HashSet<String>>>,
}

impl Engine {
    pub fn new(
        agent_id: impl Into<String>,
        ops: Arc<dyn SwitchOps>,
        events_tx: mpsc::UnboundedSender<Event>,
    ) -> (Self, EngineHandle) {
        let (intake_tx, intake_rx) = mpsc::unbounded_channel();
        let (inventory_tx, inventory_rx) = watch::channel(Vec::new());
        let busy_ips = Arc::new(Mutex::new(std::collections::HashSet::new()));
        let handle =
            EngineHandle { intake_tx, inventory_rx, busy_ips: Arc::clone(&busy_ips) };
        let engine = Self {
            agent_id: agent_id.into(),
            ops,
            inventory: Inventory::new(),
            config: ConfigureDelta::default(),
            running: false,
            tick: 0,
            seq: 0,
            fanout: DEFAULT_FANOUT,
            fail_counts: HashMap::new(),
            intake_rx,
            events_tx,
            inventory_tx,
            busy_ips,
        };
        (engine, handle)
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    fn settle_delay(&self) -> Duration {
        if self.config.fast_discovery {
            Duration::ZERO
        } else {
            Duration::from_millis(self.config.settle_delay_ms.unwrap_or(250))
        }
    }

    fn poll_interval(&self) -> Duration {
        let base = self.config.poll_interval_ms.unwrap_or(10_000);
        let ms = if self.config.fast_discovery { base.min(1_000) } else { base };
        Duration::from_millis(ms.max(50))
    }

    /// Drive the tick loop until `cancel` fires. Cancellation is
    /// observed at interval boundaries, never mid-command (design §4.4
    /// "Cancellation").
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.poll_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut last_period = self.poll_interval();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    if self.running {
                        self.running = false;
                        self.emit(EventType::ZtpStopped, json!({"reason": "shutdown"}));
                    }
                    info!(agent_id = %self.agent_id, "engine stopped on cancellation");
                    break;
                }
                _ = interval.tick() => {
                    self.drain_intake();
                    let period = self.poll_interval();
                    if period != last_period {
                        interval = tokio::time::interval(period);
                        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                        last_period = period;
                    }
                    if self.running {
                        self.run_tick().await;
                    }
                }
            }
        }
    }

    /// Apply any queued `configure`/`control` intake atomically (design
    /// §4.4 step 1). Never blocks: drains whatever has arrived so far.
    fn drain_intake(&mut self) {
        while let Ok(item) = self.intake_rx.try_recv() {
            match item {
                Intake::Configure(delta) => {
                    debug!(agent_id = %self.agent_id, seeds = delta.seeds.len(), "applying configuration delta");
                    self.config = delta;
                }
                Intake::Control(ControlAction::Start) => {
                    if !self.running {
                        self.running = true;
                        self.emit(EventType::ZtpStarted, json!({}));
                    }
                }
                Intake::Control(ControlAction::Stop) => {
                    if self.running {
                        self.running = false;
                        self.emit(EventType::ZtpStopped, json!({"reason": "control"}));
                    }
                }
            }
        }
    }

    /// One full convergent pass over the inventory (design §4.4 steps
    /// 2-7).
    async fn run_tick(&mut self) {
        self.tick += 1;
        let now = crate::time::epoch_ms();

        for seed in self.config.seeds.clone() {
            if self.inventory.upsert_seed(&seed, now) {
                self.emit_device_snapshot(&seed, EventType::DeviceDiscovered);
            }
        }

        self.seed_reconciliation(now).await;
        self.base_config_phase(now).await;
        self.device_config_phase(now).await;
        self.discovery_phase(now).await;
        self.ap_port_phase(now).await;

        self.publish_snapshot();
    }

    fn publish_snapshot(&mut self) {
        let snapshot = self.inventory.snapshot();
        let _ = self.inventory_tx.send(snapshot);
    }

    fn credentials(&self) -> Vec<Credential> {
        self.config
            .credentials
            .iter()
            .map(|c| Credential { username: c.username.clone(), password: c.password.clone() })
            .collect()
    }

    async fn seed_reconciliation(&mut self, now: u64) {
        let targets: Vec<String> = self
            .inventory
            .iter()
            .filter(|d| d.device_type == DeviceType::Switch && d.status == DeviceStatus::Discovered)
            .map(|d| d.ip.clone())
            .collect();
        if targets.is_empty() {
            return;
        }

        let creds = self.credentials();
        let ops = Arc::clone(&self.ops);
        let busy = Arc::clone(&self.busy_ips);
        let fanout = self.fanout;

        let results = stream::iter(targets.into_iter().map(|ip| {
            let ops = Arc::clone(&ops);
            let creds = creds.clone();
            let busy = Arc::clone(&busy);
            async move {
                busy.lock().await.insert(ip.clone());
                let outcome = ops.discover_identity(&ip, &creds).await;
                busy.lock().await.remove(&ip);
                (ip, outcome)
            }
        }))
        .buffer_unordered(fanout.max(1))
        .collect::<Vec<_>>()
        .await;

        for (ip, outcome) in results {
            let _ = self.inventory.transition(&ip, DeviceStatus::Connecting, None, now);
            match outcome {
                Ok(identity) => {
                    self.reset_failures(&ip);
                    if let Some(device) = self.inventory.get_mut(&ip) {
                        device.model = Some(identity.model);
                        device.serial = Some(identity.serial);
                        device.last_seen = now;
                    }
                    if let Err(e) = self.inventory.transition(&ip, DeviceStatus::Configuring, None, now) {
                        warn!(%ip, error = %e, "illegal transition after identity discovery");
                    }
                    self.emit_device_snapshot(&ip, EventType::DeviceUpdated);
                }
                Err(err) => self.record_failure(&ip, "discover_identity", err, now),
            }
        }
    }

    async fn base_config_phase(&mut self, now: u64) {
        let base_config = self.config.base_config.clone();
        if base_config.trim().is_empty() {
            return;
        }
        let targets: Vec<String> = self
            .inventory
            .iter()
            .filter(|d| {
                d.device_type == DeviceType::Switch
                    && d.status == DeviceStatus::Configuring
                    && !d.base_config_applied
            })
            .map(|d| d.ip.clone())
            .collect();
        if targets.is_empty() {
            return;
        }

        let creds = self.credentials();
        let ops = Arc::clone(&self.ops);
        let busy = Arc::clone(&self.busy_ips);
        let fanout = self.fanout;

        let results = stream::iter(targets.into_iter().map(|ip| {
            let ops = Arc::clone(&ops);
            let creds = creds.clone();
            let busy = Arc::clone(&busy);
            let base_config = base_config.clone();
            async move {
                busy.lock().await.insert(ip.clone());
                let outcome = ops.apply_base_config(&ip, &creds, &base_config).await;
                busy.lock().await.remove(&ip);
                (ip, outcome)
            }
        }))
        .buffer_unordered(fanout.max(1))
        .collect::<Vec<_>>()
        .await;

        for (ip, outcome) in results {
            match outcome {
                Ok(()) => {
                    self.reset_failures(&ip);
                    if let Some(device) = self.inventory.get_mut(&ip) {
                        device.base_config_applied = true;
                        device.tasks_completed.push("base_config".to_owned());
                        device.last_seen = now;
                    }
                    self.emit_device_snapshot(&ip, EventType::DeviceUpdated);
                }
                Err(err) => self.record_failure(&ip, "base_config", err, now),
            }
            self.sleep_settle().await;
        }
    }

    async fn device_config_phase(&mut self, now: u64) {
        let targets: Vec<String> = self
            .inventory
            .iter()
            .filter(|d| {
                d.device_type == DeviceType::Switch && d.base_config_applied && !d.configured
            })
            .map(|d| d.ip.clone())
            .collect();
        if targets.is_empty() {
            return;
        }

        let creds = self.credentials();
        let plan = self.config.vlan_plan.clone();
        let ops = Arc::clone(&self.ops);
        let busy = Arc::clone(&self.busy_ips);
        let fanout = self.fanout;
        let hostnames: HashMap<String, Option<String>> = targets
            .iter()
            .map(|ip| (ip.clone(), self.inventory.get(ip).and_then(|d| d.hostname.clone())))
            .collect();

        let results = stream::iter(targets.into_iter().map(|ip| {
            let ops = Arc::clone(&ops);
            let creds = creds.clone();
            let busy = Arc::clone(&busy);
            let plan = plan.clone();
            let hostname = hostnames.get(&ip).cloned().flatten();
            async move {
                busy.lock().await.insert(ip.clone());
                let outcome = ops.apply_device_config(&ip, &creds, &plan, hostname.as_deref()).await;
                busy.lock().await.remove(&ip);
                (ip, outcome)
            }
        }))
        .buffer_unordered(fanout.max(1))
        .collect::<Vec<_>>()
        .await;

        for (ip, outcome) in results {
            match outcome {
                Ok(()) => {
                    self.reset_failures(&ip);
                    if let Some(device) = self.inventory.get_mut(&ip) {
                        device.configured = true;
                        device.tasks_completed.push("device_config".to_owned());
                        device.last_seen = now;
                    }
                    if let Err(e) = self.inventory.transition(&ip, DeviceStatus::Configured, None, now) {
                        warn!(%ip, error = %e, "illegal transition after device config");
                    }
                    self.emit_device_snapshot(&ip, EventType::DeviceUpdated);
                    self.emit(EventType::DeviceConfigured, json!({"ip": ip}));
                }
                Err(err) => self.record_failure(&ip, "device_config", err, now),
            }
            self.sleep_settle().await;
        }
    }

    async fn discovery_phase(&mut self, now: u64) {
        let targets: Vec<String> = self
            .inventory
            .iter()
            .filter(|d| d.device_type == DeviceType::Switch && d.status == DeviceStatus::Configured)
            .map(|d| d.ip.clone())
            .collect();
        if targets.is_empty() {
            return;
        }

        let creds = self.credentials();
        let ops = Arc::clone(&self.ops);
        let busy = Arc::clone(&self.busy_ips);
        let fanout = self.fanout;

        let results = stream::iter(targets.into_iter().map(|ip| {
            let ops = Arc::clone(&ops);
            let creds = creds.clone();
            let busy = Arc::clone(&busy);
            async move {
                busy.lock().await.insert(ip.clone());
                let outcome = ops.discover_neighbors(&ip, &creds).await;
                busy.lock().await.remove(&ip);
                (ip, outcome)
            }
        }))
        .buffer_unordered(fanout.max(1))
        .collect::<Vec<_>>()
        .await;

        for (ip, outcome) in results {
            match outcome {
                Ok((neighbors, hops)) => {
                    self.reset_failures(&ip);
                    let mut newly_created = Vec::new();
                    for (port, (kind, neighbor)) in neighbors {
                        if let Some(new_key) = self.inventory.observe_neighbor(&ip, &port, neighbor, kind, now) {
                            newly_created.push(new_key);
                        }
                    }
                    for hop in hops {
                        if self.inventory.observe_l2_trace_hop(&hop.ip, &hop.mac, now) {
                            newly_created.push(hop.ip);
                        }
                    }
                    if let Some(device) = self.inventory.get_mut(&ip) {
                        device.last_seen = now;
                    }
                    for new_ip in newly_created {
                        self.emit_device_snapshot(&new_ip, EventType::DeviceDiscovered);
                    }
                }
                Err(err) => self.record_failure(&ip, "discovery", err, now),
            }
            self.sleep_settle().await;
        }
    }

    async fn ap_port_phase(&mut self, now: u64) {
        let targets: Vec<(String, String, String)> = self
            .inventory
            .iter()
            .filter_map(|d| {
                if d.device_type != DeviceType::Ap || d.configured {
                    return None;
                }
                let switch = d.connected_switch.clone()?;
                let port = d.connected_port.clone()?;
                Some((d.ip.clone(), switch, port))
            })
            .collect();
        if targets.is_empty() {
            return;
        }

        let creds = self.credentials();
        let plan = self.config.vlan_plan.clone();
        let ops = Arc::clone(&self.ops);
        let busy = Arc::clone(&self.busy_ips);
        let fanout = self.fanout;
        let descriptions: HashMap<String, String> = targets
            .iter()
            .map(|(ip, _, _)| {
                let desc = self
                    .inventory
                    .get(ip)
                    .and_then(|d| d.hostname.clone().or_else(|| d.mac.clone()))
                    .unwrap_or_else(|| ip.clone());
                (ip.clone(), desc)
            })
            .collect();

        let results = stream::iter(targets.into_iter().map(|(ip, switch, port)| {
            let ops = Arc::clone(&ops);
            let creds = creds.clone();
            let busy = Arc::clone(&busy);
            let plan = plan.clone();
            let description = descriptions.get(&ip).cloned().unwrap_or_else(|| ip.clone());
            async move {
                busy.lock().await.insert(switch.clone());
                let outcome = ops
                    .configure_ap_port(
                        &switch,
                        &creds,
                        &port,
                        plan.management_vlan,
                        &plan.wireless_vlans,
                        &description,
                    )
                    .await;
                busy.lock().await.remove(&switch);
                (ip, outcome)
            }
        }))
        .buffer_unordered(fanout.max(1))
        .collect::<Vec<_>>()
        .await;

        for (ip, outcome) in results {
            let _ = self.inventory.transition(&ip, DeviceStatus::Connecting, None, now);
            match outcome {
                Ok(()) => {
                    self.reset_failures(&ip);
                    if let Some(device) = self.inventory.get_mut(&ip) {
                        device.configured = true;
                        device.tasks_completed.push("port_config".to_owned());
                        device.last_seen = now;
                    }
                    let _ = self.inventory.transition(&ip, DeviceStatus::Configuring, None, now);
                    let _ = self.inventory.transition(&ip, DeviceStatus::Configured, None, now);
                    self.emit_device_snapshot(&ip, EventType::DeviceUpdated);
                    self.emit(EventType::DeviceConfigured, json!({"ip": ip}));
                }
                Err(err) => self.record_failure(&ip, "port_config", err, now),
            }
            self.sleep_settle().await;
        }
    }

    async fn sleep_settle(&self) {
        let delay = self.settle_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    fn reset_failures(&mut self, ip: &str) {
        self.fail_counts.remove(ip);
    }

    /// Classify a phase failure per the error handling policy (design
    /// §7): `AuthError` surfaces immediately; `TransientError`/`Timeout`
    /// accumulate toward the 3-tick threshold; everything else fails
    /// only the current command/phase.
    fn record_failure(&mut self, ip: &str, phase: &str, err: AgentError, now: u64) {
        match err.kind {
            ErrorKind::AuthError => {
                self.fail_counts.remove(ip);
                self.fail_device(ip, phase, &err, now);
            }
            _ if err.kind.is_retryable() => {
                let count = self.fail_counts.entry(ip.to_owned()).or_insert(0);
                *count += 1;
                if *count >= FAIL_THRESHOLD {
                    self.fail_counts.remove(ip);
                    self.fail_device(ip, phase, &err, now);
                } else {
                    debug!(%ip, phase, attempt = *count, "retryable failure, retrying next tick");
                }
            }
            _ => {
                if let Some(device) = self.inventory.get_mut(ip) {
                    device.tasks_failed.push(format!("{phase}: {err}"));
                    device.last_seen = now;
                }
                warn!(%ip, phase, error = %err, "command failed, continuing tick");
            }
        }
    }

    fn fail_device(&mut self, ip: &str, phase: &str, err: &AgentError, now: u64) {
        if let Err(e) = self.inventory.transition(ip, DeviceStatus::Error, Some(phase), now) {
            warn!(%ip, error = %e, "could not transition to error");
        }
        self.emit(
            EventType::Error,
            json!({"ip": ip, "phase": phase, "kind": err.kind.as_str(), "message": err.message}),
        );
    }

    /// Emit a device lifecycle event carrying the current device snapshot
    /// (design §4.4 step 7): `device_discovered`/`device_updated` as
    /// requested by the caller, plus `device_configured` whenever the
    /// device's `configured` flag is set.
    fn emit_device_snapshot(&mut self, ip: &str, event_type: EventType) {
        let Some(device) = self.inventory.get(ip).cloned() else { return };
        let configured = device.configured;
        self.emit(event_type, json!({"device": device}));
        if configured && !matches!(event_type, EventType::DeviceConfigured) {
            // device_configured is emitted explicitly by the phase that
            // flips `configured`, not duplicated here; this branch only
            // guards against a future caller forgetting to do so.
        }
    }

    fn emit(&mut self, event_type: EventType, mut payload: serde_json::Value) {
        self.seq += 1;
        if let Some(obj) = payload.as_object_mut() {
            obj.insert("tick".to_owned(), json!(self.tick));
            obj.insert("seq".to_owned(), json!(self.seq));
        }
        let event = Event::new(&self.agent_id, event_type, payload, &now_iso8601());
        let _ = self.events_tx.send(event);
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
