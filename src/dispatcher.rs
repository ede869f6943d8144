//! Idle/Busy gate for application control-plane requests

use crate::{BluetoothAddress, InternalCommand, Request, constants::MAX_SAVED_REQUESTS, fmt::Dbg};
use heapless::Deque;

/// Operation that made the dispatcher busy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PendingOp {
    /// PSM registration at start-up
    Init,
    /// Service record (re)configuration
    Config,
    /// Accept cancellation
    Deactivate,
    /// Outgoing connect to a device
    Connect(BluetoothAddress),
}

/// Dispatcher state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DispatcherState {
    /// Ready for the next control-plane request
    Idle,
    /// An operation is in progress
    Busy(PendingOp),
}

/// Serialises control-plane requests
///
/// While busy, config, activate, deactivate and connect requests are saved
/// in FIFO order. Going idle with saved requests emits a house-cleaning
/// command; each one restores exactly one saved request.
///
/// Cancel and disconnect requests act on their connection record and never
/// occupy the dispatcher, so they cannot displace the operation in progress.
#[derive(Debug)]
pub struct Dispatcher {
    state: DispatcherState,
    saved: Deque<Request, MAX_SAVED_REQUESTS>,
    restoring: bool,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// A dispatcher busy with start-up
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: DispatcherState::Busy(PendingOp::Init),
            saved: Deque::new(),
            restoring: false,
        }
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> DispatcherState {
        self.state
    }

    /// Whether no operation is in progress
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.state == DispatcherState::Idle
    }

    /// Operation in progress, if any
    #[must_use]
    pub fn pending_op(&self) -> Option<PendingOp> {
        match self.state {
            DispatcherState::Idle => None,
            DispatcherState::Busy(op) => Some(op),
        }
    }

    /// Whether a house-cleaning command is in flight
    #[must_use]
    pub fn is_restoring(&self) -> bool {
        self.restoring
    }

    /// Number of saved requests
    #[must_use]
    pub fn saved_len(&self) -> usize {
        self.saved.len()
    }

    /// Whether `request` has to wait behind the current operation
    #[must_use]
    pub fn must_defer(&self, request: &Request) -> bool {
        request.is_deferrable() && (!self.is_idle() || self.restoring)
    }

    /// Enter the busy state for `op`
    pub fn go_busy(&mut self, op: PendingOp) {
        let state = DispatcherState::Busy(op);
        if self.state != state {
            debug!(
                "[AVRCP] Dispatcher {:?} -> {:?}",
                Dbg(&self.state),
                Dbg(&state)
            );
            self.state = state;
        }
    }

    /// Return to idle, asking for house cleaning when requests are saved
    pub fn go_idle(&mut self) -> Option<InternalCommand> {
        if self.state != DispatcherState::Idle {
            debug!("[AVRCP] Dispatcher {:?} -> Idle", Dbg(&self.state));
            self.state = DispatcherState::Idle;
        }
        if self.saved.is_empty() || self.restoring {
            return None;
        }
        self.restoring = true;
        Some(InternalCommand::HouseCleaning)
    }

    /// Save a request for later
    ///
    /// # Errors
    /// Hands the request back when the save queue is full.
    pub fn save(&mut self, request: Request) -> Result<(), Request> {
        trace!("[AVRCP] Saving {:?}", Dbg(&request));
        self.saved.push_back(request)
    }

    /// Take the oldest saved request for house cleaning
    ///
    /// Returns `None` while busy; the next transition to idle asks again.
    pub fn restore(&mut self) -> Option<Request> {
        self.restoring = false;
        if !self.is_idle() {
            return None;
        }
        self.saved.pop_front()
    }

    /// Drop a saved connect request for `address`
    ///
    /// Returns whether one was found.
    pub fn cancel_saved_connect(&mut self, address: &BluetoothAddress) -> bool {
        let mut found = false;
        for _ in 0..self.saved.len() {
            let Some(request) = self.saved.pop_front() else {
                break;
            };
            if !found && matches!(&request, Request::Connect(saved) if saved == address) {
                found = true;
                continue;
            }
            // Capacity was freed by the pop above
            let _ = self.saved.push_back(request);
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(last: u8) -> BluetoothAddress {
        BluetoothAddress::new([0x10, 0x20, 0x30, 0x40, 0x50, last])
    }

    #[test]
    fn test_starts_busy_with_init() {
        let dispatcher = Dispatcher::new();
        assert_eq!(dispatcher.pending_op(), Some(PendingOp::Init));
        assert!(dispatcher.must_defer(&Request::Deactivate));
        assert!(!dispatcher.must_defer(&Request::Disconnect(0)));
        assert!(!dispatcher.must_defer(&Request::CancelConnect(addr(1))));
    }

    #[test]
    fn test_idle_without_saved_requests() {
        let mut dispatcher = Dispatcher::new();
        assert!(dispatcher.go_idle().is_none());
        assert!(dispatcher.is_idle());
        assert!(!dispatcher.must_defer(&Request::Connect(addr(1))));
    }

    #[test]
    fn test_house_cleaning_restores_fifo() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.save(Request::Connect(addr(1))).unwrap();
        dispatcher.save(Request::Activate { max_incoming: 1 }).unwrap();

        assert_eq!(dispatcher.go_idle(), Some(InternalCommand::HouseCleaning));
        assert!(dispatcher.is_restoring());
        // Fresh requests queue up behind the saved ones
        assert!(dispatcher.must_defer(&Request::Deactivate));
        dispatcher.save(Request::Deactivate).unwrap();

        assert_eq!(dispatcher.restore(), Some(Request::Connect(addr(1))));
        dispatcher.go_busy(PendingOp::Connect(addr(1)));
        assert_eq!(dispatcher.go_idle(), Some(InternalCommand::HouseCleaning));
        assert_eq!(
            dispatcher.restore(),
            Some(Request::Activate { max_incoming: 1 })
        );
        assert_eq!(dispatcher.go_idle(), Some(InternalCommand::HouseCleaning));
        assert_eq!(dispatcher.restore(), Some(Request::Deactivate));
        assert!(dispatcher.go_idle().is_none());
    }

    #[test]
    fn test_restore_while_busy_waits() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.save(Request::Deactivate).unwrap();
        assert!(dispatcher.go_idle().is_some());
        dispatcher.go_busy(PendingOp::Config);
        assert_eq!(dispatcher.restore(), None);
        assert_eq!(dispatcher.saved_len(), 1);
        assert!(dispatcher.go_idle().is_some());
    }

    #[test]
    fn test_cancel_saved_connect() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.save(Request::Connect(addr(1))).unwrap();
        dispatcher.save(Request::Deactivate).unwrap();
        dispatcher.save(Request::Connect(addr(2))).unwrap();

        assert!(dispatcher.cancel_saved_connect(&addr(2)));
        assert!(!dispatcher.cancel_saved_connect(&addr(3)));
        assert_eq!(dispatcher.saved_len(), 2);

        dispatcher.go_idle();
        assert_eq!(dispatcher.restore(), Some(Request::Connect(addr(1))));
        dispatcher.go_idle();
        assert_eq!(dispatcher.restore(), Some(Request::Deactivate));
    }

    #[test]
    fn test_save_queue_full() {
        let mut dispatcher = Dispatcher::new();
        for _ in 0..MAX_SAVED_REQUESTS {
            dispatcher.save(Request::Deactivate).unwrap();
        }
        assert_eq!(
            dispatcher.save(Request::Connect(addr(1))),
            Err(Request::Connect(addr(1)))
        );
    }
}
