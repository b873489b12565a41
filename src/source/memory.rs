// Single-partition in-process log. Used by tests and local runs.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use super::{Delivery, DeliveryToken, LogSource, SourceError};

const PARTITION: i32 = 0;

#[derive(Default)]
struct LogState {
    pending: VecDeque<Delivery>,
    next_offset: i64,
    injected_fetch_failures: usize,
    fetch_attempts: usize,
    acknowledged: Vec<DeliveryToken>,
}

/// In-memory [`LogSource`]. `fetch_next` waits until a message is
/// published; fetch failures can be injected to exercise backoff.
#[derive(Default)]
pub struct MemoryLog {
    state: Mutex<LogState>,
    notify: Notify,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message and return the token it will be delivered with.
    pub fn publish(&self, payload: impl Into<Vec<u8>>) -> DeliveryToken {
        let token = {
            let mut state = self.state.lock();
            let token = DeliveryToken {
                partition: PARTITION,
                offset: state.next_offset,
            };
            state.next_offset += 1;
            state.pending.push_back(Delivery {
                payload: payload.into(),
                token,
            });
            token
        };
        self.notify.notify_one();
        token
    }

    /// Make the next `count` fetches fail before any message is handed out.
    pub fn fail_next_fetches(&self, count: usize) {
        self.state.lock().injected_fetch_failures += count;
        self.notify.notify_one();
    }

    pub fn acknowledged(&self) -> Vec<DeliveryToken> {
        self.state.lock().acknowledged.clone()
    }

    /// Next offset a restarted consumer would read, or `None` before the
    /// first acknowledgement.
    pub fn committed_offset(&self) -> Option<i64> {
        self.state
            .lock()
            .acknowledged
            .iter()
            .map(|t| t.offset + 1)
            .max()
    }

    pub fn pending(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn fetch_attempts(&self) -> usize {
        self.state.lock().fetch_attempts
    }
}

#[async_trait]
impl LogSource for MemoryLog {
    async fn fetch_next(&self) -> Result<Delivery, SourceError> {
        loop {
            {
                let mut state = self.state.lock();
                if state.injected_fetch_failures > 0 {
                    state.injected_fetch_failures -= 1;
                    state.fetch_attempts += 1;
                    return Err(SourceError::Fetch("broker unavailable".to_string()));
                }
                if let Some(delivery) = state.pending.pop_front() {
                    state.fetch_attempts += 1;
                    return Ok(delivery);
                }
            }
            self.notify.notified().await;
        }
    }

    async fn acknowledge(&self, token: DeliveryToken) -> Result<(), SourceError> {
        self.state.lock().acknowledged.push(token);
        Ok(())
    }
}
