//! Lifecycle state machines for the client and server.
//!
//! Both sides keep their state and the resources that only exist in one
//! state (a live connection, a running listener) in a single mutex-guarded
//! cell. Every transition reads, validates and assigns under that lock.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{Result, RpcError};

/// Client lifecycle.
///
/// `Initialized → Connecting → Connected → Disconnecting → Disconnected`,
/// and from `Disconnected` back to `Connecting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Initialized,
    Connecting,
    Connected,
    Disconnecting,
    Disconnected,
}

impl ClientState {
    pub fn as_str(self) -> &'static str {
        match self {
            ClientState::Initialized => "initialized",
            ClientState::Connecting => "connecting",
            ClientState::Connected => "connected",
            ClientState::Disconnecting => "disconnecting",
            ClientState::Disconnected => "disconnected",
        }
    }
}

/// Server lifecycle.
///
/// `Initialized → Starting → Started → Stopping → Stopped`, and from
/// `Stopped` back to `Starting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Initialized,
    Starting,
    Started,
    Stopping,
    Stopped,
}

impl ServerState {
    pub fn as_str(self) -> &'static str {
        match self {
            ServerState::Initialized => "initialized",
            ServerState::Starting => "starting",
            ServerState::Started => "started",
            ServerState::Stopping => "stopping",
            ServerState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) trait LifecycleState: Copy + Eq {
    fn name(self) -> &'static str;
}

impl LifecycleState for ClientState {
    fn name(self) -> &'static str {
        self.as_str()
    }
}

impl LifecycleState for ServerState {
    fn name(self) -> &'static str {
        self.as_str()
    }
}

pub(crate) struct Slot<S, R> {
    pub state: S,
    /// Present exactly while in the "live" state.
    pub resource: Option<R>,
}

/// Mutex-guarded state plus the resource owned by the live state.
pub(crate) struct StateCell<S, R> {
    slot: Mutex<Slot<S, R>>,
}

impl<S: LifecycleState, R> StateCell<S, R> {
    pub fn new(initial: S) -> Self {
        Self {
            slot: Mutex::new(Slot {
                state: initial,
                resource: None,
            }),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, Slot<S, R>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get_mut(&mut self) -> &mut Slot<S, R> {
        self.slot.get_mut().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn current(&self) -> S {
        self.lock().state
    }

    /// Move to `to` if the current state is one of `from`.
    pub fn transition(&self, operation: &'static str, from: &[S], to: S) -> Result<()> {
        let mut slot = self.lock();
        if !from.contains(&slot.state) {
            return Err(RpcError::InvalidState {
                operation,
                state: slot.state.name(),
            });
        }
        slot.state = to;
        Ok(())
    }

    /// If in `live`, move to `interim` and hand back the live resource.
    pub fn take_live(&self, live: S, interim: S) -> Option<R> {
        let mut slot = self.lock();
        if slot.state != live {
            return None;
        }
        slot.state = interim;
        slot.resource.take()
    }

    /// Unconditionally settle into `state`, installing `resource`.
    pub fn settle(&self, state: S, resource: Option<R>) {
        let mut slot = self.lock();
        slot.state = state;
        slot.resource = resource;
    }

    /// Run `f` on the live resource without leaving the lock.
    pub fn with_live<T>(
        &self,
        operation: &'static str,
        live: S,
        f: impl FnOnce(&R) -> T,
    ) -> Result<T> {
        let slot = self.lock();
        match (&slot.resource, slot.state == live) {
            (Some(resource), true) => Ok(f(resource)),
            _ => Err(RpcError::InvalidState {
                operation,
                state: slot.state.name(),
            }),
        }
    }
}
