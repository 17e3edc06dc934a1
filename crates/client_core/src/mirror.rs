//! Local, pull-refreshed mirror of the connected account's balance and opt-in flag.

use std::sync::atomic::{AtomicU64, Ordering};

use alloy_primitives::Address;
use parking_lot::RwLock;
use shared::{domain::AccountState, error::ControllerError};
use tracing::debug;

use crate::contract::ContractProxy;

#[derive(Debug, Clone, Copy)]
struct Snapshot {
    address: Address,
    state: AccountState,
    ticket: u64,
}

#[derive(Debug, Default)]
struct MirrorSlot {
    snapshot: Option<Snapshot>,
    /// Refreshes holding a ticket at or below this were started before the last `clear`.
    floor: u64,
}

pub struct StateMirror {
    contract: ContractProxy,
    slot: RwLock<MirrorSlot>,
    tickets: AtomicU64,
}

impl StateMirror {
    pub fn new(contract: ContractProxy) -> Self {
        Self {
            contract,
            slot: RwLock::new(MirrorSlot::default()),
            tickets: AtomicU64::new(0),
        }
    }

    /// Reads balance and opt-in status for `address` and installs them as one snapshot.
    ///
    /// Returns the mirror's view of `address` afterwards. That is the freshly read pair
    /// unless a newer refresh or a `clear` overtook this one while it was in flight.
    pub async fn refresh(&self, address: Address) -> Result<AccountState, ControllerError> {
        let ticket = self.tickets.fetch_add(1, Ordering::SeqCst) + 1;
        let (balance_raw, opted_in) = futures::try_join!(
            self.contract.balance_of(address),
            self.contract.opted_in(address)
        )?;
        self.install(
            address,
            ticket,
            AccountState {
                balance_raw,
                opted_in,
            },
        );
        Ok(self.current_for(address))
    }

    fn install(&self, address: Address, ticket: u64, mut fresh: AccountState) -> bool {
        let mut slot = self.slot.write();
        if ticket <= slot.floor {
            debug!("mirror: dropping refresh started before clear ticket={ticket}");
            return false;
        }
        if let Some(current) = slot.snapshot {
            if current.ticket > ticket {
                debug!(
                    "mirror: dropping stale refresh ticket={ticket} installed={}",
                    current.ticket
                );
                return false;
            }
            if current.address == address {
                fresh.opted_in |= current.state.opted_in;
            }
        }
        slot.snapshot = Some(Snapshot {
            address,
            state: fresh,
            ticket,
        });
        true
    }

    /// Last installed snapshot, whichever address it belongs to.
    pub fn current(&self) -> AccountState {
        self.slot
            .read()
            .snapshot
            .map(|snapshot| snapshot.state)
            .unwrap_or_default()
    }

    /// Snapshot for `address`, or defaults when the mirror holds another account.
    pub fn current_for(&self, address: Address) -> AccountState {
        match self.slot.read().snapshot {
            Some(snapshot) if snapshot.address == address => snapshot.state,
            _ => AccountState::default(),
        }
    }

    pub fn cached_address(&self) -> Option<Address> {
        self.slot.read().snapshot.map(|snapshot| snapshot.address)
    }

    /// Opt-in fast path: flips the flag for `address` without a chain read.
    pub fn mark_opted_in(&self, address: Address) -> Option<AccountState> {
        let mut slot = self.slot.write();
        let snapshot = slot.snapshot.as_mut().filter(|s| s.address == address)?;
        snapshot.state.opted_in = true;
        Some(snapshot.state)
    }

    pub fn clear(&self) {
        let mut slot = self.slot.write();
        slot.snapshot = None;
        slot.floor = self.tickets.load(Ordering::SeqCst);
    }
}

#[cfg(test)]
#[path = "tests/mirror_tests.rs"]
mod tests;
