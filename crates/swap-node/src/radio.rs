//! The radio interface boundary.
//!
//! The [`Radio`] trait is the contract with the physical transceiver
//! driver: raw frame transmit, channel/address/sync-word configuration,
//! hardware address filtering, and power state. Received frames are
//! delivered into the node's event loop through an mpsc channel, each
//! tagged with the driver's CRC verdict.
//!
//! [`channel_hub`] provides an in-memory shared channel connecting any
//! number of radios, used by the integration tests (and by simulations):
//! it honors channel/sync-word separation, hardware address filtering and
//! power state, and can inject transmission loss.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use swap_core::types::DeviceAddress;

/// A raw frame handed up by the radio driver.
#[derive(Debug, Clone)]
pub struct RadioFrame {
    pub bytes: Vec<u8>,
    /// The driver's frame integrity verdict. Frames with a bad CRC are
    /// dropped by the dispatcher, never parsed.
    pub crc_ok: bool,
}

/// Errors surfaced by a radio driver.
#[derive(Debug, thiserror::Error)]
pub enum RadioError {
    #[error("transmit failed: {0}")]
    Send(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Contract with the physical transceiver driver.
pub trait Radio: Send {
    /// Transmit one raw frame. A failed transmission aborts that single
    /// send; retries are the protocol layers' business.
    fn send(&mut self, raw: &[u8]) -> Result<(), RadioError>;

    /// Program the hardware address used for address filtering.
    fn set_address(&mut self, address: DeviceAddress);

    /// Tune to a frequency channel.
    fn set_channel(&mut self, channel: u8);

    /// Program the sync word (network id).
    fn set_sync_word(&mut self, sync: [u8; 2]);

    /// Enable or disable hardware address filtering. A repeater disables
    /// it so it can see packets not addressed to it.
    fn set_address_check(&mut self, enabled: bool);

    /// Enter power-down state: nothing is received until [`wake_up`].
    ///
    /// [`wake_up`]: Radio::wake_up
    fn power_down(&mut self);

    /// Leave power-down state.
    fn wake_up(&mut self);
}

// ---------------------------------------------------------------------- //
// In-memory shared channel
// ---------------------------------------------------------------------- //

#[derive(Debug, Clone, Copy)]
struct MemberState {
    address: u8,
    channel: u8,
    sync: [u8; 2],
    address_check: bool,
    powered: bool,
}

struct Member {
    state: Arc<Mutex<MemberState>>,
    frames: mpsc::Sender<RadioFrame>,
}

struct HubInner {
    members: Vec<Member>,
}

/// An in-memory shared RF channel.
#[derive(Clone)]
pub struct ChannelHub {
    inner: Arc<Mutex<HubInner>>,
}

/// Create a new empty shared channel.
pub fn channel_hub() -> ChannelHub {
    ChannelHub {
        inner: Arc::new(Mutex::new(HubInner {
            members: Vec::new(),
        })),
    }
}

impl ChannelHub {
    /// Attach a radio to the channel. Received frames go to `frames`.
    pub fn join(&self, frames: mpsc::Sender<RadioFrame>) -> ChannelRadio {
        let state = Arc::new(Mutex::new(MemberState {
            address: 0,
            channel: 0,
            sync: [0, 0],
            address_check: true,
            powered: true,
        }));
        let mut inner = self.inner.lock().unwrap();
        inner.members.push(Member {
            state: state.clone(),
            frames,
        });
        ChannelRadio {
            hub: self.inner.clone(),
            index: inner.members.len() - 1,
            state,
            loss: LossControl::default(),
        }
    }
}

#[derive(Debug, Default)]
struct LossState {
    /// Transmissions to silently lose (send succeeds, nothing delivered).
    drop_next: usize,
    /// Transmissions to fail outright (send returns an error).
    fail_next: usize,
}

/// Shared handle for injecting transmission loss into a [`ChannelRadio`],
/// usable after the radio has been handed to a node.
#[derive(Clone, Default)]
pub struct LossControl {
    inner: Arc<Mutex<LossState>>,
}

impl LossControl {
    /// Lose the next `n` transmissions on the air.
    pub fn drop_next(&self, n: usize) {
        self.inner.lock().unwrap().drop_next = n;
    }

    /// Fail the next `n` transmit attempts.
    pub fn fail_next(&self, n: usize) {
        self.inner.lock().unwrap().fail_next = n;
    }
}

/// One radio attached to a [`ChannelHub`].
pub struct ChannelRadio {
    hub: Arc<Mutex<HubInner>>,
    index: usize,
    state: Arc<Mutex<MemberState>>,
    loss: LossControl,
}

impl ChannelRadio {
    /// Handle for injecting loss into this radio's transmissions.
    pub fn loss_control(&self) -> LossControl {
        self.loss.clone()
    }
}

impl Radio for ChannelRadio {
    fn send(&mut self, raw: &[u8]) -> Result<(), RadioError> {
        {
            let mut loss = self.loss.inner.lock().unwrap();
            if loss.fail_next > 0 {
                loss.fail_next -= 1;
                return Err(RadioError::Send("injected failure".into()));
            }
            if loss.drop_next > 0 {
                loss.drop_next -= 1;
                return Ok(());
            }
        }
        let own = *self.state.lock().unwrap();
        if !own.powered {
            return Err(RadioError::Send("radio powered down".into()));
        }

        let dest = raw.first().copied().unwrap_or(0);
        let hub = self.hub.lock().unwrap();
        for (i, member) in hub.members.iter().enumerate() {
            if i == self.index {
                continue;
            }
            let state = *member.state.lock().unwrap();
            if !state.powered || state.channel != own.channel || state.sync != own.sync {
                continue;
            }
            if state.address_check && dest != 0 && dest != state.address {
                continue;
            }
            let _ = member.frames.try_send(RadioFrame {
                bytes: raw.to_vec(),
                crc_ok: true,
            });
        }
        Ok(())
    }

    fn set_address(&mut self, address: DeviceAddress) {
        self.state.lock().unwrap().address = address.as_u8();
    }

    fn set_channel(&mut self, channel: u8) {
        self.state.lock().unwrap().channel = channel;
    }

    fn set_sync_word(&mut self, sync: [u8; 2]) {
        self.state.lock().unwrap().sync = sync;
    }

    fn set_address_check(&mut self, enabled: bool) {
        self.state.lock().unwrap().address_check = enabled;
    }

    fn power_down(&mut self) {
        self.state.lock().unwrap().powered = false;
    }

    fn wake_up(&mut self) {
        self.state.lock().unwrap().powered = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> (ChannelRadio, ChannelRadio, mpsc::Receiver<RadioFrame>) {
        let hub = channel_hub();
        let (tx_a, _rx_a) = mpsc::channel(16);
        let (tx_b, rx_b) = mpsc::channel(16);
        let a = hub.join(tx_a);
        let b = hub.join(tx_b);
        (a, b, rx_b)
    }

    #[test]
    fn test_broadcast_reaches_other_member() {
        let (mut a, mut b, mut rx_b) = pair();
        b.set_address(DeviceAddress::new(2));
        a.send(&[0x00, 0x01, 0x02]).unwrap();
        let frame = rx_b.try_recv().unwrap();
        assert_eq!(frame.bytes, vec![0x00, 0x01, 0x02]);
        assert!(frame.crc_ok);
    }

    #[test]
    fn test_address_check_filters_foreign_dest() {
        let (mut a, mut b, mut rx_b) = pair();
        b.set_address(DeviceAddress::new(2));
        a.send(&[0x07, 0x01, 0x02]).unwrap();
        assert!(rx_b.try_recv().is_err());

        // Disabling the check lets everything through.
        b.set_address_check(false);
        a.send(&[0x07, 0x01, 0x02]).unwrap();
        assert!(rx_b.try_recv().is_ok());
    }

    #[test]
    fn test_channel_separation() {
        let (mut a, mut b, mut rx_b) = pair();
        b.set_address(DeviceAddress::new(2));
        b.set_channel(4);
        a.send(&[0x02, 0x01, 0x02]).unwrap();
        assert!(rx_b.try_recv().is_err());

        a.set_channel(4);
        a.send(&[0x02, 0x01, 0x02]).unwrap();
        assert!(rx_b.try_recv().is_ok());
    }

    #[test]
    fn test_sync_word_separation() {
        let (mut a, mut b, mut rx_b) = pair();
        b.set_address(DeviceAddress::new(2));
        b.set_sync_word([0xB5, 0x47]);
        a.send(&[0x02, 0x01, 0x02]).unwrap();
        assert!(rx_b.try_recv().is_err());

        a.set_sync_word([0xB5, 0x47]);
        a.send(&[0x02, 0x01, 0x02]).unwrap();
        assert!(rx_b.try_recv().is_ok());
    }

    #[test]
    fn test_powered_down_receiver_hears_nothing() {
        let (mut a, mut b, mut rx_b) = pair();
        b.set_address(DeviceAddress::new(2));
        b.power_down();
        a.send(&[0x00, 0x01, 0x02]).unwrap();
        assert!(rx_b.try_recv().is_err());

        b.wake_up();
        a.send(&[0x00, 0x01, 0x02]).unwrap();
        assert!(rx_b.try_recv().is_ok());
    }

    #[test]
    fn test_drop_next_loses_transmission() {
        let (mut a, _b, mut rx_b) = pair();
        a.loss_control().drop_next(1);
        a.send(&[0x00, 0x01]).unwrap();
        assert!(rx_b.try_recv().is_err());
        a.send(&[0x00, 0x02]).unwrap();
        assert_eq!(rx_b.try_recv().unwrap().bytes, vec![0x00, 0x02]);
    }

    #[test]
    fn test_fail_next_errors() {
        let (mut a, _b, _rx_b) = pair();
        a.loss_control().fail_next(1);
        assert!(a.send(&[0x00]).is_err());
        assert!(a.send(&[0x00]).is_ok());
    }
}
