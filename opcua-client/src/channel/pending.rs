//! Outstanding requests of a channel
//!
//! Request id allocation and slot registration happen under one mutex, so a
//! response can never arrive for an id that is not yet registered. Each slot
//! resolves exactly once: by its response, by removal (timeout or
//! cancellation) or by `fail_all` when the channel goes away.

use opcua_core::{StatusCode, UaError, UaResult};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;
use tokio::sync::oneshot;

/// Receiver side of a registered request
pub(crate) type ResponseReceiver = oneshot::Receiver<UaResult<Vec<u8>>>;

#[derive(Debug)]
struct PendingRequest {
    request_type: &'static str,
    sender: oneshot::Sender<UaResult<Vec<u8>>>,
    sent_at: Instant,
}

#[derive(Debug)]
struct PendingTable {
    next_id: u32,
    requests: HashMap<u32, PendingRequest>,
    /// Set while the channel cannot accept requests
    closed: Option<StatusCode>,
}

/// Map of request id to waiting caller
#[derive(Debug)]
pub(crate) struct PendingRequests {
    table: Mutex<PendingTable>,
}

impl Default for PendingRequests {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingRequests {
    pub(crate) fn new() -> Self {
        Self {
            table: Mutex::new(PendingTable {
                next_id: 1,
                requests: HashMap::new(),
                closed: Some(StatusCode::BAD_SERVER_NOT_CONNECTED),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PendingTable> {
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn allocate(table: &mut PendingTable) -> u32 {
        loop {
            let id = table.next_id;
            table.next_id = table.next_id.wrapping_add(1);
            if id != 0 && !table.requests.contains_key(&id) {
                return id;
            }
        }
    }

    /// Accept requests again after the channel was (re)opened
    pub(crate) fn reopen(&self) {
        self.lock().closed = None;
    }

    /// Allocate a request id and register a slot for its response
    ///
    /// # Errors
    /// `ChannelAborted` when the channel is not accepting requests.
    pub(crate) fn register(&self, request_type: &'static str) -> UaResult<(u32, ResponseReceiver)> {
        let mut table = self.lock();
        if let Some(status) = table.closed {
            return Err(UaError::ChannelAborted(status));
        }
        let id = Self::allocate(&mut table);
        let (sender, receiver) = oneshot::channel();
        table.requests.insert(
            id,
            PendingRequest {
                request_type,
                sender,
                sent_at: Instant::now(),
            },
        );
        Ok((id, receiver))
    }

    /// Request id for a message that expects no response
    pub(crate) fn next_request_id(&self) -> u32 {
        let mut table = self.lock();
        Self::allocate(&mut table)
    }

    /// Hand a response to its waiting caller
    ///
    /// Returns false when nobody waits for `request_id`.
    pub(crate) fn resolve(&self, request_id: u32, result: UaResult<Vec<u8>>) -> bool {
        let Some(request) = self.lock().requests.remove(&request_id) else {
            log::warn!("Discarding response to unknown request {}", request_id);
            return false;
        };
        log::trace!(
            "{} {} answered after {:?}",
            request.request_type,
            request_id,
            request.sent_at.elapsed()
        );
        if request.sender.send(result).is_err() {
            log::debug!("Caller of {} {} is gone", request.request_type, request_id);
        }
        true
    }

    /// Drop the slot of a request that gave up waiting
    pub(crate) fn remove(&self, request_id: u32) {
        if let Some(request) = self.lock().requests.remove(&request_id) {
            log::debug!("{} {} abandoned", request.request_type, request_id);
        }
    }

    /// Fail every outstanding request and refuse new ones
    pub(crate) fn fail_all(&self, status: StatusCode) -> usize {
        let drained: Vec<(u32, PendingRequest)> = {
            let mut table = self.lock();
            table.closed = Some(status);
            table.requests.drain().collect()
        };
        let count = drained.len();
        for (_, request) in drained {
            let _ = request.sender.send(Err(UaError::ChannelAborted(status)));
        }
        if count > 0 {
            log::info!("Failed {} outstanding requests with {}", count, status);
        }
        count
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().requests.len()
    }
}

/// Removes a registered request when the waiting caller goes away
pub(crate) struct PendingGuard<'a> {
    pending: &'a PendingRequests,
    request_id: u32,
}

impl<'a> PendingGuard<'a> {
    pub(crate) fn new(pending: &'a PendingRequests, request_id: u32) -> Self {
        Self { pending, request_id }
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(self.request_id);
    }
}
