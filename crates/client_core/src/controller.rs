use alloy_primitives::{Address, TxHash};
use parking_lot::Mutex;
use shared::{
    domain::{
        AccountState, ChaosStatus, Confirmation, ControllerPhase, PendingTransaction,
        RefreshPolicy, Session, TransferOrder, TxRequest, TxVerb,
    },
    error::{ControllerError, RemoteCallError, ValidationError},
    protocol::{ContractInterface, InterfaceError},
};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::{
    chain::{ChainHandle, WalletCapability},
    contract::ContractProxy,
    events::{Action, ControllerEvent, Outcome},
    mirror::StateMirror,
};

const DEFAULT_EVENT_CAPACITY: usize = 256;

struct Binding {
    chain: ChainHandle,
    contract: ContractProxy,
    mirror: StateMirror,
}

struct ControllerState {
    phase: ControllerPhase,
    session: Option<Session>,
    /// Bumped on every connect attempt and disconnect; in-flight work started under an
    /// older epoch must not write back.
    epoch: u64,
}

/// Drives connect, refresh and submission for one wallet against one contract.
///
/// No lock is held across a wallet prompt, remote read or confirmation wait, so reads
/// stay available while a submission is in flight.
pub struct InteractionController {
    binding: Option<Binding>,
    state: Mutex<ControllerState>,
    events: broadcast::Sender<ControllerEvent>,
}

impl InteractionController {
    pub fn new(
        capability: WalletCapability,
        contract_address: Address,
    ) -> Result<Self, InterfaceError> {
        Self::with_interface(
            capability,
            contract_address,
            ContractInterface::chaos_coin()?,
            DEFAULT_EVENT_CAPACITY,
        )
    }

    pub fn with_interface(
        capability: WalletCapability,
        contract_address: Address,
        interface: ContractInterface,
        event_capacity: usize,
    ) -> Result<Self, InterfaceError> {
        let binding = match ChainHandle::acquire(&capability) {
            Ok(chain) => {
                let contract = ContractProxy::bind(chain.clone(), contract_address, interface)?;
                Some(Binding {
                    chain,
                    mirror: StateMirror::new(contract.clone()),
                    contract,
                })
            }
            Err(_) => {
                warn!("wallet: no provider detected, connect will fail");
                None
            }
        };

        let (events, _) = broadcast::channel(event_capacity.max(1));
        Ok(Self {
            binding,
            state: Mutex::new(ControllerState {
                phase: ControllerPhase::Disconnected,
                session: None,
                epoch: 0,
            }),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    pub fn phase(&self) -> ControllerPhase {
        self.state.lock().phase
    }

    pub fn session(&self) -> Option<Session> {
        self.state.lock().session
    }

    pub fn has_provider(&self) -> bool {
        self.binding.is_some()
    }

    /// Cached account view for the connected address; defaults when disconnected.
    pub fn current(&self) -> AccountState {
        match (self.session(), &self.binding) {
            (Some(session), Some(binding)) => binding.mirror.current_for(session.address),
            _ => AccountState::default(),
        }
    }

    pub async fn connect(&self) -> Result<AccountState, ControllerError> {
        let result = self.connect_inner().await;
        self.emit_outcome(Action::Connect, result.as_ref().map(|_| None));
        result
    }

    async fn connect_inner(&self) -> Result<AccountState, ControllerError> {
        let epoch = {
            let mut state = self.state.lock();
            if state.phase != ControllerPhase::Disconnected {
                return Err(ControllerError::InvalidPhase {
                    phase: state.phase,
                    operation: "connect",
                });
            }
            state.epoch += 1;
            state.phase = ControllerPhase::Connecting;
            state.epoch
        };
        self.emit(ControllerEvent::PhaseChanged(ControllerPhase::Connecting));
        let guard = PhaseGuard::new(
            self,
            epoch,
            ControllerPhase::Connecting,
            ControllerPhase::Disconnected,
        );

        let (address, account) = match self.establish().await {
            Ok(established) => established,
            Err(err) => {
                warn!("wallet: connect failed: {err}");
                guard.release();
                return Err(err);
            }
        };

        let session = Session::new(address);
        {
            let mut state = self.state.lock();
            if state.epoch != epoch || state.phase != ControllerPhase::Connecting {
                drop(state);
                guard.disarm();
                error!("wallet: session changed while connecting address={address}");
                return Err(ControllerError::StateInconsistency(
                    "session changed while connecting".into(),
                ));
            }
            state.session = Some(session);
            state.phase = ControllerPhase::Idle;
        }
        guard.disarm();

        info!("wallet: connected address={address}");
        self.emit(ControllerEvent::SessionChanged(Some(session)));
        self.emit(ControllerEvent::AccountStateChanged(account));
        self.emit(ControllerEvent::PhaseChanged(ControllerPhase::Idle));
        Ok(account)
    }

    async fn establish(&self) -> Result<(Address, AccountState), ControllerError> {
        let binding = self.binding.as_ref().ok_or(ControllerError::NoProvider)?;
        let accounts = binding.chain.request_accounts().await?;
        let address = *accounts.first().ok_or(ControllerError::UserDeclined)?;
        let account = binding.mirror.refresh(address).await?;
        Ok((address, account))
    }

    /// External disconnect signal (wallet locked, account switched, user logout).
    pub fn disconnect(&self) {
        {
            let mut state = self.state.lock();
            if state.phase == ControllerPhase::Disconnected {
                return;
            }
            state.epoch += 1;
            state.session = None;
            state.phase = ControllerPhase::Disconnected;
        }
        if let Some(binding) = &self.binding {
            binding.mirror.clear();
        }
        info!("wallet: disconnected");
        self.emit(ControllerEvent::SessionChanged(None));
        self.emit(ControllerEvent::AccountStateChanged(AccountState::default()));
        self.emit(ControllerEvent::PhaseChanged(ControllerPhase::Disconnected));
    }

    /// Re-reads the connected account. Allowed while a submission is in flight.
    pub async fn refresh(&self) -> Result<AccountState, ControllerError> {
        let (binding, address) = self.connected_binding("refresh")?;
        let account = binding.mirror.refresh(address).await?;
        if self.session().map(|session| session.address) != Some(address) {
            error!("wallet: session ended during refresh address={address}");
            return Err(ControllerError::StateInconsistency(
                "session ended during refresh".into(),
            ));
        }
        self.emit(ControllerEvent::AccountStateChanged(account));
        Ok(account)
    }

    /// Contract-wide batch status. Does not need a session.
    pub async fn contract_status(&self) -> Result<ChaosStatus, ControllerError> {
        let binding = self.binding.as_ref().ok_or(ControllerError::NoProvider)?;
        let (last_executed, chaos_executed) = futures::try_join!(
            binding.contract.last_executed(),
            binding.contract.chaos_executed()
        )?;
        Ok(ChaosStatus {
            last_executed,
            chaos_executed,
        })
    }

    /// Submits one state-changing call and waits for its confirmation.
    ///
    /// Only one submission may be in flight; a second call is rejected, not queued.
    /// Failures are terminal for this call and are never retried.
    pub async fn submit(&self, request: TxRequest) -> Result<PendingTransaction, ControllerError> {
        let verb = request.verb();
        let result = self.submit_inner(request).await;
        self.emit_outcome(
            Action::Submit(verb),
            result.as_ref().map(|pending| Some(pending.hash)),
        );
        result
    }

    async fn submit_inner(&self, request: TxRequest) -> Result<PendingTransaction, ControllerError> {
        let verb = request.verb();
        let transfer = match &request {
            TxRequest::Transfer(intent) => Some(intent.validate()?),
            _ => None,
        };
        // The raw transfer input is not needed past validation.
        drop(request);
        if verb == TxVerb::OptInToChaos && self.current().opted_in {
            return Err(ValidationError::AlreadyOptedIn.into());
        }

        let (binding, address, epoch) = self.begin_submission(verb)?;
        let guard = PhaseGuard::new(
            self,
            epoch,
            ControllerPhase::Submitting(verb),
            ControllerPhase::Idle,
        );

        let result = self
            .execute(binding, address, epoch, verb, transfer)
            .await;
        if let Err(err) = &result {
            warn!("tx: {verb} failed: {err}");
        }
        guard.release();
        result
    }

    fn begin_submission(
        &self,
        verb: TxVerb,
    ) -> Result<(&Binding, Address, u64), ControllerError> {
        let (binding, address, epoch) = {
            let mut state = self.state.lock();
            let (binding, session) = match (state.phase, state.session, &self.binding) {
                (ControllerPhase::Idle, Some(session), Some(binding)) => (binding, session),
                (phase, _, _) => {
                    return Err(ControllerError::InvalidPhase {
                        phase,
                        operation: "submit",
                    })
                }
            };
            state.phase = ControllerPhase::Submitting(verb);
            (binding, session.address, state.epoch)
        };
        self.emit(ControllerEvent::PhaseChanged(ControllerPhase::Submitting(
            verb,
        )));
        Ok((binding, address, epoch))
    }

    async fn execute(
        &self,
        binding: &Binding,
        address: Address,
        epoch: u64,
        verb: TxVerb,
        transfer: Option<TransferOrder>,
    ) -> Result<PendingTransaction, ControllerError> {
        let signer = binding.chain.get_signer(address).await?;
        let contract = &binding.contract;
        let pending = match (verb, transfer) {
            (TxVerb::RequestChaos, _) => contract.request_chaos(signer.as_ref()).await?,
            (TxVerb::OptInToChaos, _) => contract.opt_in_to_chaos(signer.as_ref()).await?,
            (TxVerb::ExecuteChaosBatch, _) => {
                contract.execute_chaos_batch(signer.as_ref()).await?
            }
            (TxVerb::Transfer, Some(order)) => {
                contract
                    .transfer(signer.as_ref(), order.to, order.amount)
                    .await?
            }
            (TxVerb::Transfer, None) => {
                return Err(ControllerError::StateInconsistency(
                    "transfer submitted without a validated order".into(),
                ))
            }
        };
        self.emit(ControllerEvent::TransactionSubmitted(pending));

        match contract.await_confirmation(&pending).await? {
            Confirmation::Confirmed { .. } => {}
            Confirmation::Failed { reason, .. } => {
                return Err(RemoteCallError::Reverted(reason).into());
            }
        }

        if !self.is_current_epoch(epoch) {
            warn!("tx: {verb} confirmed after the session ended, mirror left untouched");
            return Ok(pending);
        }

        match verb.refresh_policy() {
            RefreshPolicy::OptInFlag => {
                if let Some(account) = binding.mirror.mark_opted_in(address) {
                    self.emit(ControllerEvent::AccountStateChanged(account));
                }
            }
            RefreshPolicy::FullRefresh => match binding.mirror.refresh(address).await {
                Ok(account) if self.is_current_epoch(epoch) => {
                    self.emit(ControllerEvent::AccountStateChanged(account));
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("tx: {verb} confirmed but refresh failed: {err}");
                    self.emit(ControllerEvent::RefreshFailed(err));
                }
            },
        }

        info!("tx: {verb} confirmed hash={}", pending.hash);
        Ok(pending)
    }

    fn connected_binding(
        &self,
        operation: &'static str,
    ) -> Result<(&Binding, Address), ControllerError> {
        let state = self.state.lock();
        match (&self.binding, state.session) {
            (Some(binding), Some(session)) if state.phase.is_connected() => {
                Ok((binding, session.address))
            }
            _ => Err(ControllerError::InvalidPhase {
                phase: state.phase,
                operation,
            }),
        }
    }

    fn is_current_epoch(&self, epoch: u64) -> bool {
        self.state.lock().epoch == epoch
    }

    /// Moves `held` to `fallback` unless someone else already changed the phase.
    fn restore_phase(&self, epoch: u64, held: ControllerPhase, fallback: ControllerPhase) {
        {
            let mut state = self.state.lock();
            if state.epoch != epoch || state.phase != held {
                return;
            }
            state.phase = fallback;
            if fallback == ControllerPhase::Disconnected {
                state.session = None;
            }
        }
        if fallback == ControllerPhase::Disconnected {
            if let Some(binding) = &self.binding {
                binding.mirror.clear();
            }
        }
        self.emit(ControllerEvent::PhaseChanged(fallback));
    }

    fn emit_outcome(&self, action: Action, result: Result<Option<TxHash>, &ControllerError>) {
        let outcome = match result {
            Ok(hash) => Outcome::Succeeded { action, hash },
            Err(error) => Outcome::Failed {
                action,
                error: error.clone(),
            },
        };
        self.emit(ControllerEvent::Outcome(outcome));
    }

    fn emit(&self, event: ControllerEvent) {
        let _ = self.events.send(event);
    }
}

/// Returns the controller to `fallback` when an operation ends, including when the
/// caller abandons the future mid-flight.
struct PhaseGuard<'a> {
    controller: &'a InteractionController,
    epoch: u64,
    held: ControllerPhase,
    fallback: ControllerPhase,
    armed: bool,
}

impl<'a> PhaseGuard<'a> {
    fn new(
        controller: &'a InteractionController,
        epoch: u64,
        held: ControllerPhase,
        fallback: ControllerPhase,
    ) -> Self {
        Self {
            controller,
            epoch,
            held,
            fallback,
            armed: true,
        }
    }

    fn release(mut self) {
        self.armed = false;
        self.controller
            .restore_phase(self.epoch, self.held, self.fallback);
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!("controller: {} abandoned, returning to {}", self.held, self.fallback);
            self.controller
                .restore_phase(self.epoch, self.held, self.fallback);
        }
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
