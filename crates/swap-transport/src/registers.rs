//! The register table: the addressable state of a SWAP device.
//!
//! Registers are constructed once at startup into an append-only table.
//! Ids are assigned in registration order and are wire compatibility:
//! the standard set occupies 0..=10 on every device, custom registers
//! follow from 11. Reordering registrations changes ids and breaks the
//! network's view of the device.

use swap_core::types::RegisterId;

use crate::error::RegisterError;

/// Refresh hook run before a register value is reported (Query replies).
/// Receives the value buffer to update in place from the live source.
pub type UpdateHook = Box<dyn FnMut(&mut [u8]) + Send>;

/// Validation/application hook run when a Command arrives for a register.
/// Receives (current value, incoming bytes) and decides what happens.
pub type SetHook = Box<dyn FnMut(&[u8], &[u8]) -> SetDecision + Send>;

/// What a [`SetHook`] decided about an incoming Command value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetDecision {
    /// Commit the incoming bytes to the register.
    pub accept: bool,
    /// Broadcast an Info carrying the pre-change value before committing,
    /// so listeners can track the transition.
    pub announce_prior: bool,
    /// Perform a full device reset once the change is committed and
    /// acknowledged.
    pub reset: bool,
}

impl Default for SetDecision {
    fn default() -> Self {
        SetDecision {
            accept: true,
            announce_prior: false,
            reset: false,
        }
    }
}

impl SetDecision {
    /// Plain acceptance, no side effects.
    pub fn accept() -> Self {
        SetDecision::default()
    }

    /// Leave the register untouched.
    pub fn reject() -> Self {
        SetDecision {
            accept: false,
            announce_prior: false,
            reset: false,
        }
    }
}

/// The effects of applying a Command to a register, for the caller to act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetEffects {
    /// Whether the register value changed.
    pub applied: bool,
    /// Pre-change value to broadcast as an Info before the acknowledging
    /// Status, when the hook asked for it.
    pub announce_prior: Option<Vec<u8>>,
    /// Whether the node must reset after acknowledging.
    pub reset: bool,
}

/// A named, fixed-length value cell.
pub struct Register {
    id: RegisterId,
    value: Vec<u8>,
    on_update: Option<UpdateHook>,
    on_set: Option<SetHook>,
}

impl Register {
    pub fn id(&self) -> RegisterId {
        self.id
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Declared value length, fixed at registration.
    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

/// Fixed, indexed collection of registers forming the device state.
#[derive(Default)]
pub struct RegisterTable {
    registers: Vec<Register>,
}

impl RegisterTable {
    pub fn new() -> Self {
        Self {
            registers: Vec::new(),
        }
    }

    /// Append a register, assigning the next sequential id. The value
    /// length is fixed by `initial` for the life of the table.
    pub fn register(
        &mut self,
        initial: Vec<u8>,
        on_update: Option<UpdateHook>,
        on_set: Option<SetHook>,
    ) -> RegisterId {
        let id = RegisterId::new(self.registers.len() as u8);
        self.registers.push(Register {
            id,
            value: initial,
            on_update,
            on_set,
        });
        id
    }

    pub fn len(&self) -> usize {
        self.registers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }

    pub fn get(&self, id: RegisterId) -> Option<&Register> {
        self.registers.get(id.as_u8() as usize)
    }

    /// Current raw value of a register.
    pub fn value(&self, id: RegisterId) -> Option<&[u8]> {
        self.get(id).map(|r| r.value())
    }

    /// Overwrite a register value directly, bypassing hooks. Used by the
    /// node to mirror internal state (nonce counter, system state) into
    /// the table. Lengths must already match.
    pub fn mirror(&mut self, id: RegisterId, value: &[u8]) -> Result<(), RegisterError> {
        let reg = self
            .registers
            .get_mut(id.as_u8() as usize)
            .ok_or(RegisterError::Unknown(id))?;
        if value.len() != reg.value.len() {
            return Err(RegisterError::LengthMismatch {
                id,
                expected: reg.value.len(),
                actual: value.len(),
            });
        }
        reg.value.copy_from_slice(value);
        Ok(())
    }

    /// Refresh a register from its live source and return the value.
    pub fn update_value(&mut self, id: RegisterId) -> Result<&[u8], RegisterError> {
        let reg = self
            .registers
            .get_mut(id.as_u8() as usize)
            .ok_or(RegisterError::Unknown(id))?;
        if let Some(hook) = reg.on_update.as_mut() {
            hook(&mut reg.value);
        }
        Ok(&reg.value)
    }

    /// Apply an incoming Command value to a register.
    ///
    /// Length mismatches are rejected before the hook runs; the dispatcher
    /// turns that into a Status echo of the unchanged value.
    pub fn set_value(
        &mut self,
        id: RegisterId,
        incoming: &[u8],
    ) -> Result<SetEffects, RegisterError> {
        let reg = self
            .registers
            .get_mut(id.as_u8() as usize)
            .ok_or(RegisterError::Unknown(id))?;
        if incoming.len() != reg.value.len() {
            return Err(RegisterError::LengthMismatch {
                id,
                expected: reg.value.len(),
                actual: incoming.len(),
            });
        }

        let decision = match reg.on_set.as_mut() {
            Some(hook) => hook(&reg.value, incoming),
            None => SetDecision::accept(),
        };

        let announce_prior = decision.announce_prior.then(|| reg.value.clone());
        if decision.accept {
            reg.value.copy_from_slice(incoming);
        }

        Ok(SetEffects {
            applied: decision.accept,
            announce_prior,
            reset: decision.reset,
        })
    }
}
