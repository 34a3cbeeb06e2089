//! The node: one owned context threading every protocol layer together.
//!
//! A single async event loop consumes radio frames, dispatches them,
//! transmits replies, forwards repeats, and drives the stream auto-flush
//! timer. The interrupt-driven globals of the original firmware become
//! explicit owned state mutated only from this loop; the application talks
//! to it through the command channel and the stream handle.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

use swap_core::constants::{SystemState, REG_SECU_OPTION, REG_SYSTEM_STATE, REG_TX_INTERVAL};
use swap_core::packet::control::Security;
use swap_core::packet::wire::Packet;
use swap_core::types::{DeviceAddress, Nonce, RegisterId};
use swap_transport::dispatch::{Dispatcher, PacketEvent};
use swap_transport::repeater::{Repeater, TX_DELAY_MS};
use swap_transport::stream::StreamMessage;

use crate::config::NodeConfig;
use crate::error::NodeError;
use crate::radio::{Radio, RadioFrame};
use crate::registers::{build_register_table, settings_from_table, REG_STREAM};
use crate::storage::{DeviceSettings, Storage};
use crate::stream::{stream_pair, StreamHandle, StreamShared};

/// Callback for observed Status/Info packets.
pub type PacketCallback = Box<dyn FnMut(&Packet) + Send>;

/// Requests the application can make of a running node.
#[derive(Debug)]
pub enum NodeCommand {
    SendCommand {
        dest: DeviceAddress,
        reg_id: RegisterId,
        value: Vec<u8>,
        /// Explicit nonce for secured commands; the transmit counter is
        /// used when absent.
        nonce: Option<Nonce>,
    },
    SendQuery {
        dest: DeviceAddress,
        reg_id: RegisterId,
    },
    Reset,
    Sleep(Duration),
}

/// Requests a shutdown of the node's event loop.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

/// Cloneable handle for talking to a running node.
#[derive(Clone)]
pub struct NodeHandle {
    address: DeviceAddress,
    commands: mpsc::Sender<NodeCommand>,
    stream: StreamHandle,
    shutdown: ShutdownHandle,
}

impl NodeHandle {
    pub fn address(&self) -> DeviceAddress {
        self.address
    }

    /// The reliable byte stream to this node's stream peer.
    pub fn stream(&self) -> StreamHandle {
        self.stream.clone()
    }

    /// Send a Command writing a register on another node.
    pub async fn send_command(&self, dest: DeviceAddress, reg_id: RegisterId, value: Vec<u8>) {
        let _ = self
            .commands
            .send(NodeCommand::SendCommand {
                dest,
                reg_id,
                value,
                nonce: None,
            })
            .await;
    }

    /// Send a Command with an explicit nonce (anti-replay networks).
    pub async fn send_command_with_nonce(
        &self,
        dest: DeviceAddress,
        reg_id: RegisterId,
        value: Vec<u8>,
        nonce: Nonce,
    ) {
        let _ = self
            .commands
            .send(NodeCommand::SendCommand {
                dest,
                reg_id,
                value,
                nonce: Some(nonce),
            })
            .await;
    }

    /// Send a Query for a register on another node.
    pub async fn send_query(&self, dest: DeviceAddress, reg_id: RegisterId) {
        let _ = self
            .commands
            .send(NodeCommand::SendQuery { dest, reg_id })
            .await;
    }

    /// Reset the node (broadcasts the restarting state first).
    pub async fn reset(&self) {
        let _ = self.commands.send(NodeCommand::Reset).await;
    }

    /// Power the node down for `duration`, then wake.
    pub async fn sleep_for(&self, duration: Duration) {
        let _ = self.commands.send(NodeCommand::Sleep(duration)).await;
    }

    pub fn shutdown(&self) {
        self.shutdown.shutdown();
    }
}

/// A SWAP node bound to one radio.
pub struct Node {
    config: NodeConfig,
    settings: DeviceSettings,
    storage: Option<Storage>,
    dispatcher: Dispatcher,
    repeater: Repeater,
    radio: Box<dyn Radio>,
    frames: mpsc::Receiver<RadioFrame>,
    stream: Arc<StreamShared>,
    stream_handle: StreamHandle,
    stream_out: mpsc::Receiver<Vec<u8>>,
    commands_tx: mpsc::Sender<NodeCommand>,
    commands: mpsc::Receiver<NodeCommand>,
    status_callback: Option<PacketCallback>,
    info_callback: Option<PacketCallback>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
    epoch: Instant,
}

impl Node {
    /// Build a node from configuration, a radio, and the radio's receive
    /// channel. Loads persisted settings when present, otherwise
    /// initializes them from the config and saves.
    pub fn new(
        config: NodeConfig,
        radio: Box<dyn Radio>,
        frames: mpsc::Receiver<RadioFrame>,
    ) -> Result<Self, NodeError> {
        let storage = if config.device.enable_storage {
            let storage = match config.device.storage_path.as_deref() {
                Some(path) => Storage::new(path.into())?,
                None => Storage::default_path()?,
            };
            Some(storage)
        } else {
            None
        };

        let stored = match storage.as_ref() {
            Some(storage) => storage.load()?,
            None => None,
        };
        let settings = match stored {
            Some(settings) => {
                tracing::info!("loaded persisted device settings");
                settings
            }
            None => {
                let settings = DeviceSettings {
                    address: config.device.address,
                    channel: config.device.channel,
                    security: config.device.security,
                    network_id: config.device.network_id.to_be_bytes(),
                    tx_interval: config.device.tx_interval,
                };
                if let Some(storage) = storage.as_ref() {
                    storage.save(&settings)?;
                    tracing::info!("initialized device settings from config");
                }
                settings
            }
        };
        if settings.address == 0 {
            return Err(NodeError::Config(
                "device address 0 is reserved for broadcast".into(),
            ));
        }

        let address = DeviceAddress::new(settings.address);
        let security = Security::from_nibble(settings.security);
        let dispatcher = Dispatcher::new(build_register_table(&settings), address, security);

        let mut repeater = Repeater::new(address, config.repeater.max_hop.min(15));
        if config.repeater.enabled {
            repeater.enable();
        }

        let (stream_out_tx, stream_out) = mpsc::channel(64);
        let (stream_handle, stream) = stream_pair(stream_out_tx);
        let (commands_tx, commands) = mpsc::channel(64);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut node = Self {
            config,
            settings,
            storage,
            dispatcher,
            repeater,
            radio,
            frames,
            stream,
            stream_handle,
            stream_out,
            commands_tx,
            commands,
            status_callback: None,
            info_callback: None,
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
            epoch: Instant::now(),
        };
        node.program_radio();
        Ok(node)
    }

    /// Register the node-wide Status observation callback.
    pub fn on_status(&mut self, callback: PacketCallback) {
        self.status_callback = Some(callback);
    }

    /// Register the node-wide Info observation callback.
    pub fn on_info(&mut self, callback: PacketCallback) {
        self.info_callback = Some(callback);
    }

    /// Handle for the application side.
    pub fn handle(&self) -> NodeHandle {
        NodeHandle {
            address: self.dispatcher.address(),
            commands: self.commands_tx.clone(),
            stream: self.stream_handle.clone(),
            shutdown: ShutdownHandle {
                tx: self.shutdown_tx.clone(),
            },
        }
    }

    /// Run the event loop until shutdown.
    pub async fn run(mut self) {
        tracing::info!(
            address = %self.dispatcher.address(),
            channel = self.settings.channel,
            repeater = self.repeater.is_enabled(),
            "swap node up"
        );
        let mut shutdown_rx = self.shutdown_rx.clone();
        let mut period = self.autoflush_period();
        let mut autoflush = tokio::time::interval(period);
        autoflush.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                maybe = self.frames.recv() => match maybe {
                    Some(frame) => self.on_frame(frame).await,
                    None => break,
                },
                Some(value) = self.stream_out.recv() => {
                    self.send_stream_status(value);
                }
                Some(command) = self.commands.recv() => {
                    self.on_command(command).await;
                }
                _ = autoflush.tick() => {
                    if let Some(value) = self.stream.autoflush() {
                        self.send_stream_status(value);
                    }
                    let current = self.autoflush_period();
                    if current != period {
                        period = current;
                        autoflush = tokio::time::interval(period);
                        autoflush.set_missed_tick_behavior(MissedTickBehavior::Skip);
                    }
                }
            }
        }
        tracing::info!("swap node stopped");
    }

    async fn on_frame(&mut self, frame: RadioFrame) {
        if !frame.crc_ok {
            tracing::trace!("dropping frame with bad CRC");
            return;
        }
        let packet = match Packet::parse(&frame.bytes) {
            Ok(packet) => packet,
            Err(e) => {
                tracing::trace!(error = %e, "dropping malformed frame");
                return;
            }
        };

        let outcome = self.dispatcher.handle_packet(&packet);
        for reply in &outcome.replies {
            self.transmit(reply);
        }
        if !outcome.reset {
            self.sync_security();
        }
        match outcome.event {
            Some(PacketEvent::Status(status)) => {
                if status.reg_id == RegisterId::new(REG_STREAM) {
                    self.on_stream_status(&status);
                }
                if let Some(callback) = self.status_callback.as_mut() {
                    callback(&status);
                }
            }
            Some(PacketEvent::Info(info)) => {
                if let Some(callback) = self.info_callback.as_mut() {
                    callback(&info);
                }
            }
            None => {}
        }
        if outcome.reset {
            self.reset().await;
        }

        // Multi-hop forwarding, after local handling so replies are not
        // delayed behind the collision-avoidance wait.
        if let Some(forward) = self.repeater.consider(&packet, self.now_ms()) {
            tokio::time::sleep(Duration::from_millis(TX_DELAY_MS)).await;
            if self.transmit(&forward) {
                let now = self.now_ms();
                self.repeater.record(&forward, now);
            }
        }
    }

    fn on_stream_status(&mut self, status: &Packet) {
        let msg = match StreamMessage::parse(&status.value) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::trace!(error = %e, "dropping malformed stream status");
                return;
            }
        };
        if let Some(reply) = self.stream.handle_status(&msg) {
            self.send_stream_status(reply);
        }
    }

    async fn on_command(&mut self, command: NodeCommand) {
        match command {
            NodeCommand::SendCommand {
                dest,
                reg_id,
                value,
                nonce,
            } => {
                let nonce = nonce.unwrap_or_else(|| self.dispatcher.next_nonce());
                let packet = Packet::command(
                    dest,
                    self.dispatcher.address(),
                    self.dispatcher.security(),
                    nonce,
                    reg_id,
                    value,
                );
                self.transmit(&packet);
            }
            NodeCommand::SendQuery { dest, reg_id } => {
                let nonce = self.dispatcher.next_nonce();
                let packet = Packet::query(
                    dest,
                    self.dispatcher.address(),
                    self.dispatcher.security(),
                    nonce,
                    reg_id,
                );
                self.transmit(&packet);
            }
            NodeCommand::Reset => self.reset().await,
            NodeCommand::Sleep(duration) => self.sleep_for(duration).await,
        }
    }

    /// Broadcast the restarting state, persist settings, and rebuild the
    /// protocol state as a power cycle would.
    async fn reset(&mut self) {
        let info = self.dispatcher.make_info(
            RegisterId::new(REG_SYSTEM_STATE),
            vec![SystemState::Restart as u8],
        );
        self.transmit(&info);

        self.settings = settings_from_table(self.dispatcher.registers());
        if let Some(storage) = self.storage.as_ref() {
            if let Err(e) = storage.save(&self.settings) {
                tracing::warn!(error = %e, "failed to persist settings");
            }
        }

        let address = DeviceAddress::new(self.settings.address);
        let security = Security::from_nibble(self.settings.security);
        self.dispatcher =
            Dispatcher::new(build_register_table(&self.settings), address, security);
        self.repeater.set_address(address);
        self.stream.clear();
        self.program_radio();
        tracing::info!(address = %address, "device reset complete");
    }

    /// Power-down with timed wake. Nothing is received while asleep.
    async fn sleep_for(&mut self, duration: Duration) {
        tracing::debug!(?duration, "entering power-down");
        self.radio.power_down();
        tokio::time::sleep(duration).await;
        self.radio.wake_up();
        tracing::debug!("woke from power-down");
    }

    fn send_stream_status(&mut self, value: Vec<u8>) {
        let packet = self
            .dispatcher
            .make_status(RegisterId::new(REG_STREAM), value);
        self.transmit(&packet);
    }

    fn transmit(&mut self, packet: &Packet) -> bool {
        match self.radio.send(&packet.serialize()) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "transmit failed");
                false
            }
        }
    }

    fn program_radio(&mut self) {
        self.radio
            .set_address(DeviceAddress::new(self.settings.address));
        self.radio.set_channel(self.settings.channel);
        self.radio.set_sync_word(self.settings.network_id);
        // A repeater must see traffic not addressed to it.
        self.radio
            .set_address_check(!self.repeater.is_enabled());
    }

    /// A security-option command takes effect without a reset: pick the
    /// new policy up from the register and persist it.
    fn sync_security(&mut self) {
        let nibble = self
            .dispatcher
            .registers()
            .value(RegisterId::new(REG_SECU_OPTION))
            .and_then(|v| v.first().copied())
            .unwrap_or(0);
        if nibble != self.settings.security {
            tracing::info!(security = nibble, "security option changed");
            self.settings.security = nibble;
            self.dispatcher.set_security(Security::from_nibble(nibble));
            if let Some(storage) = self.storage.as_ref() {
                if let Err(e) = storage.save(&self.settings) {
                    tracing::warn!(error = %e, "failed to persist settings");
                }
            }
        }
    }

    fn autoflush_period(&self) -> Duration {
        let from_register = self
            .dispatcher
            .registers()
            .value(RegisterId::new(REG_TX_INTERVAL))
            .map(|v| ((v[0] as u16) << 8) | v[1] as u16)
            .unwrap_or(0);
        let ms = if from_register > 0 {
            from_register as u64
        } else {
            self.config.stream.autoflush_ms
        };
        Duration::from_millis(ms.max(1))
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }
}
