use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Process-wide admission control over in-flight image payload bytes.
///
/// Admission is non-blocking: a request that would push the counter past
/// the ceiling is rejected immediately, never queued. The counter itself is
/// a lock-free atomic.
#[derive(Debug)]
pub struct MemoryGovernor {
    ceiling_bytes: u64,
    in_flight_bytes: AtomicU64,
}

impl MemoryGovernor {
    pub fn new(ceiling_bytes: u64) -> Self {
        Self {
            ceiling_bytes,
            in_flight_bytes: AtomicU64::new(0),
        }
    }

    /// Reserve `bytes` against the ceiling. Returns `None` when the
    /// reservation would exceed it; the caller converts that into a
    /// failure response.
    pub fn admit(self: &Arc<Self>, bytes: u64) -> Option<ByteReservation> {
        let mut current = self.in_flight_bytes.load(Ordering::Relaxed);
        loop {
            let next = current.checked_add(bytes)?;
            if next > self.ceiling_bytes {
                return None;
            }
            match self.in_flight_bytes.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    return Some(ByteReservation {
                        governor: Arc::clone(self),
                        bytes,
                    })
                }
                Err(observed) => current = observed,
            }
        }
    }

    pub fn in_flight_bytes(&self) -> u64 {
        self.in_flight_bytes.load(Ordering::Acquire)
    }

    pub fn ceiling_bytes(&self) -> u64 {
        self.ceiling_bytes
    }

    fn release(&self, bytes: u64) {
        self.in_flight_bytes.fetch_sub(bytes, Ordering::AcqRel);
    }
}

/// Admit token for one payload. The bytes return to the governor when the
/// reservation drops, whatever path the task takes to get there.
#[derive(Debug)]
pub struct ByteReservation {
    governor: Arc<MemoryGovernor>,
    bytes: u64,
}

impl ByteReservation {
    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

impl Drop for ByteReservation {
    fn drop(&mut self) {
        self.governor.release(self.bytes);
    }
}
