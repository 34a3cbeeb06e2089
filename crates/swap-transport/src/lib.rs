//! Protocol state machines for SWAP nodes.
//!
//! Everything in this crate is deliberately decoupled from I/O: the register
//! table, the receive dispatcher, the repeater and the stream transport all
//! track pure protocol state and produce decisions (packets to send, events
//! to deliver) that the caller acts on. Time enters through explicit
//! parameters, never through the clock.

pub mod dispatch;
pub mod error;
pub mod registers;
pub mod repeater;
pub mod stream;

pub use dispatch::{DispatchOutcome, Dispatcher, DropReason, PacketEvent};
pub use error::{RegisterError, StreamError};
pub use registers::{Register, RegisterTable, SetDecision, SetEffects};
pub use repeater::Repeater;
pub use stream::{StreamMessage, StreamState};
