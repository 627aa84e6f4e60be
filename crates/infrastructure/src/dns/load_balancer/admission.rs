use dns_forward_domain::DomainError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Non-blocking ceiling on in-flight forwarded queries.
///
/// A limit of 0 means unbounded: permits are always granted and only counted
/// for introspection.
pub struct AdmissionGate {
    limit: usize,
    semaphore: Option<Arc<Semaphore>>,
    in_flight: Arc<AtomicUsize>,
}

/// Held for the whole lifetime of one forwarded query.
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: Option<OwnedSemaphorePermit>,
    in_flight: Arc<AtomicUsize>,
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

impl AdmissionGate {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            semaphore: (limit > 0).then(|| Arc::new(Semaphore::new(limit))),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Takes a permit without waiting. Fails with `AdmissionDenied` when the
    /// ceiling is reached.
    pub fn try_acquire(&self) -> Result<AdmissionPermit, DomainError> {
        let permit = match &self.semaphore {
            Some(semaphore) => Some(
                Arc::clone(semaphore)
                    .try_acquire_owned()
                    .map_err(|_| DomainError::AdmissionDenied { limit: self.limit })?,
            ),
            None => None,
        };

        self.in_flight.fetch_add(1, Ordering::AcqRel);
        Ok(AdmissionPermit {
            _permit: permit,
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn is_bounded(&self) -> bool {
        self.semaphore.is_some()
    }
}
