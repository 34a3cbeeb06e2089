//! Blocking stream facade over the pure stream state machine.
//!
//! The application side gets standard blocking-stream semantics: `write`
//! suspends when the 64-byte send buffer is full and resumes when an
//! acknowledgement frees space — bytes are never dropped. The radio side
//! (the node event loop) feeds inbound stream Status values in and
//! transmits whatever the state machine wants sent.
//!
//! One mutex guards the shared state against the two writers (application
//! calls and the receive path), standing in for the original's
//! interrupt-masked critical sections. An unresponsive peer stalls the
//! writer indefinitely; that is the documented contract, not a defect.

use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, Notify};

use swap_transport::stream::{StreamMessage, StreamState};

/// Shared stream state between the application handle and the node loop.
pub(crate) struct StreamShared {
    state: Mutex<StreamState>,
    /// Signaled when send-buffer space frees.
    space: Notify,
    /// Signaled when delivered bytes become readable.
    readable: Notify,
    /// Status values the node loop must wrap in packets and transmit.
    outgoing: mpsc::Sender<Vec<u8>>,
}

impl StreamShared {
    /// Inbound stream Status from the peer. Returns the Status value to
    /// transmit in response, if any.
    pub(crate) fn handle_status(&self, msg: &StreamMessage) -> Option<Vec<u8>> {
        let mut state = self.state.lock().unwrap();
        let had_space = state.writable();
        let reply = state.on_status(msg);
        if state.writable() > had_space {
            self.space.notify_one();
        }
        if state.available() > 0 {
            self.readable.notify_one();
        }
        reply
    }

    /// Periodic flush of buffered bytes (the auto-flush timer).
    pub(crate) fn autoflush(&self) -> Option<Vec<u8>> {
        self.state.lock().unwrap().flush()
    }

    /// Drop all stream state, as a power cycle would.
    pub(crate) fn clear(&self) {
        *self.state.lock().unwrap() = StreamState::new();
        self.space.notify_one();
    }
}

/// Create the shared state and its application-facing handle.
pub(crate) fn stream_pair(outgoing: mpsc::Sender<Vec<u8>>) -> (StreamHandle, Arc<StreamShared>) {
    let shared = Arc::new(StreamShared {
        state: Mutex::new(StreamState::new()),
        space: Notify::new(),
        readable: Notify::new(),
        outgoing,
    });
    (
        StreamHandle {
            shared: shared.clone(),
        },
        shared,
    )
}

/// Application-facing reliable byte stream.
#[derive(Clone)]
pub struct StreamHandle {
    shared: Arc<StreamShared>,
}

impl StreamHandle {
    /// Write all of `bytes`, suspending while the send buffer is full.
    ///
    /// There is no timeout: if the peer never acknowledges, the writer
    /// stays blocked until the node resets.
    pub async fn write(&self, mut bytes: &[u8]) {
        while !bytes.is_empty() {
            let (written, emit) = {
                let mut state = self.shared.state.lock().unwrap();
                let n = state.write(bytes);
                // A full chunk's worth is buffered: get it on the air.
                let emit = if state.chunk_ready() { state.flush() } else { None };
                (n, emit)
            };
            if let Some(value) = emit {
                let _ = self.shared.outgoing.send(value).await;
            }
            bytes = &bytes[written..];
            if !bytes.is_empty() && written == 0 {
                self.shared.space.notified().await;
            }
        }
    }

    /// Start transmission of anything buffered.
    pub async fn flush(&self) {
        let emit = self.shared.state.lock().unwrap().flush();
        if let Some(value) = emit {
            let _ = self.shared.outgoing.send(value).await;
        }
    }

    /// Delivered bytes not yet consumed.
    pub fn available(&self) -> usize {
        self.shared.state.lock().unwrap().available()
    }

    /// Pop one delivered byte if there is one.
    pub fn try_read(&self) -> Option<u8> {
        self.shared.state.lock().unwrap().read()
    }

    /// Look at the next delivered byte without consuming it.
    pub fn peek(&self) -> Option<u8> {
        self.shared.state.lock().unwrap().peek()
    }

    /// Read up to `buf.len()` bytes, waiting until at least one arrives.
    pub async fn read(&self, buf: &mut [u8]) -> usize {
        loop {
            {
                let mut state = self.shared.state.lock().unwrap();
                if state.available() > 0 {
                    let mut n = 0;
                    while n < buf.len() {
                        match state.read() {
                            Some(byte) => {
                                buf[n] = byte;
                                n += 1;
                            }
                            None => break,
                        }
                    }
                    return n;
                }
            }
            self.shared.readable.notified().await;
        }
    }
}
