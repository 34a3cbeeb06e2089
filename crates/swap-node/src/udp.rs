//! UDP shared-channel radio: a broadcast stand-in for the RF medium.
//!
//! Every node binds the same UDP port and transmits to the broadcast
//! address, so all nodes on the segment share one channel the way radios
//! share the air. Each datagram carries a three-byte carrier header
//! `[channel, sync0, sync1]`; receivers drop datagrams whose carrier does
//! not match their tuning, which is what channel and sync-word separation
//! look like from above the driver.

use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use swap_core::constants::MTU;
use swap_core::types::DeviceAddress;

use crate::radio::{Radio, RadioError, RadioFrame};

/// Carrier header bytes prefixed to every datagram.
const CARRIER_LEN: usize = 3;

#[derive(Debug, Clone, Copy)]
struct Tuning {
    address: u8,
    channel: u8,
    sync: [u8; 2],
    address_check: bool,
    powered: bool,
}

/// A [`Radio`] implementation over UDP broadcast.
pub struct UdpRadio {
    socket: UdpSocket,
    target: SocketAddr,
    tuning: Arc<Mutex<Tuning>>,
    shutdown: Arc<AtomicBool>,
    recv_thread: Option<std::thread::JoinHandle<()>>,
}

impl UdpRadio {
    /// Bind the shared port and start the receive bridge.
    pub fn bind(
        port: u16,
        broadcast: &str,
        frames: mpsc::Sender<RadioFrame>,
    ) -> Result<Self, RadioError> {
        let socket = UdpSocket::bind(("0.0.0.0", port))?;
        socket.set_broadcast(true)?;
        let target: SocketAddr = format!("{broadcast}:{port}")
            .parse()
            .map_err(|e| RadioError::Send(format!("invalid broadcast address: {e}")))?;

        let tuning = Arc::new(Mutex::new(Tuning {
            address: 0,
            channel: 0,
            sync: [0, 0],
            address_check: true,
            powered: true,
        }));
        let shutdown = Arc::new(AtomicBool::new(false));

        let recv_socket = socket.try_clone()?;
        recv_socket.set_read_timeout(Some(Duration::from_millis(200)))?;
        let recv_tuning = tuning.clone();
        let recv_shutdown = shutdown.clone();
        let recv_thread = std::thread::spawn(move || {
            receive_loop(recv_socket, recv_tuning, recv_shutdown, frames);
        });

        Ok(Self {
            socket,
            target,
            tuning,
            shutdown,
            recv_thread: Some(recv_thread),
        })
    }
}

fn receive_loop(
    socket: UdpSocket,
    tuning: Arc<Mutex<Tuning>>,
    shutdown: Arc<AtomicBool>,
    frames: mpsc::Sender<RadioFrame>,
) {
    let mut buf = [0u8; CARRIER_LEN + MTU];
    while !shutdown.load(Ordering::Relaxed) {
        let n = match socket.recv(&mut buf) {
            Ok(n) => n,
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(e) => {
                tracing::warn!(error = %e, "udp radio receive failed");
                continue;
            }
        };
        if n < CARRIER_LEN {
            continue;
        }

        let state = *tuning.lock().unwrap();
        if !state.powered {
            continue;
        }
        if buf[0] != state.channel || [buf[1], buf[2]] != state.sync {
            continue;
        }
        let raw = &buf[CARRIER_LEN..n];
        let dest = raw.first().copied().unwrap_or(0);
        if state.address_check && dest != 0 && dest != state.address {
            continue;
        }

        // UDP already guarantees datagram integrity.
        if frames
            .blocking_send(RadioFrame {
                bytes: raw.to_vec(),
                crc_ok: true,
            })
            .is_err()
        {
            break;
        }
    }
}

impl Radio for UdpRadio {
    fn send(&mut self, raw: &[u8]) -> Result<(), RadioError> {
        let state = *self.tuning.lock().unwrap();
        if !state.powered {
            return Err(RadioError::Send("radio powered down".into()));
        }
        let mut datagram = Vec::with_capacity(CARRIER_LEN + raw.len());
        datagram.push(state.channel);
        datagram.extend_from_slice(&state.sync);
        datagram.extend_from_slice(raw);
        self.socket.send_to(&datagram, self.target)?;
        Ok(())
    }

    fn set_address(&mut self, address: DeviceAddress) {
        self.tuning.lock().unwrap().address = address.as_u8();
    }

    fn set_channel(&mut self, channel: u8) {
        self.tuning.lock().unwrap().channel = channel;
    }

    fn set_sync_word(&mut self, sync: [u8; 2]) {
        self.tuning.lock().unwrap().sync = sync;
    }

    fn set_address_check(&mut self, enabled: bool) {
        self.tuning.lock().unwrap().address_check = enabled;
    }

    fn power_down(&mut self) {
        self.tuning.lock().unwrap().powered = false;
    }

    fn wake_up(&mut self) {
        self.tuning.lock().unwrap().powered = true;
    }
}

impl Drop for UdpRadio {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.recv_thread.take() {
            let _ = handle.join();
        }
    }
}
