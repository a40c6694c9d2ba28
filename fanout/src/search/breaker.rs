//! Request circuit breaker.
//!
//! Memory-intensive steps (buffering shard results, aggregation buckets)
//! reserve an estimate before allocating. A reservation that would push the
//! breaker past its limit fails with [`Error::CircuitBreaking`] and nothing
//! is charged. Reservations release their bytes on drop.

use crate::config::BreakerConfig;
use crate::error::{Error, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    limit: u64,
    used: AtomicU64,
    trips: AtomicU64,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, limit: u64) -> Self {
        Self {
            name: name.into(),
            limit,
            used: AtomicU64::new(0),
            trips: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &BreakerConfig) -> Self {
        Self::new("request", config.request_limit_bytes)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn used(&self) -> u64 {
        self.used.load(Ordering::Acquire)
    }

    pub fn trip_count(&self) -> u64 {
        self.trips.load(Ordering::Relaxed)
    }

    /// Reserve `bytes` for `label`, returning a guard that releases them on drop
    pub fn reserve(self: &Arc<Self>, bytes: u64, label: &str) -> Result<Reservation> {
        self.add_estimate(bytes, label)?;
        Ok(Reservation {
            breaker: self.clone(),
            bytes,
            label: label.to_string(),
        })
    }

    fn add_estimate(&self, bytes: u64, label: &str) -> Result<()> {
        if bytes == 0 {
            return Ok(());
        }
        let mut current = self.used.load(Ordering::Acquire);
        loop {
            let next = current.saturating_add(bytes);
            if next > self.limit {
                self.trips.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("fanout_breaker_trips_total", "breaker" => self.name.clone())
                    .increment(1);
                warn!(
                    breaker = %self.name,
                    label = %label,
                    wanted = bytes,
                    used = current,
                    limit = self.limit,
                    "Circuit breaker tripped"
                );
                return Err(Error::CircuitBreaking {
                    label: label.to_string(),
                    wanted: bytes,
                    used: current,
                    limit: self.limit,
                });
            }
            match self
                .used
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }

    fn release(&self, bytes: u64) {
        if bytes > 0 {
            self.used.fetch_sub(bytes, Ordering::AcqRel);
        }
    }
}

/// Bytes held against a [`CircuitBreaker`]
#[derive(Debug)]
pub struct Reservation {
    breaker: Arc<CircuitBreaker>,
    bytes: u64,
    label: String,
}

impl Reservation {
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn grow(&mut self, additional: u64) -> Result<()> {
        self.breaker.add_estimate(additional, &self.label)?;
        self.bytes += additional;
        Ok(())
    }

    pub fn shrink(&mut self, by: u64) {
        let by = by.min(self.bytes);
        self.breaker.release(by);
        self.bytes -= by;
    }

    /// Grow or shrink so that exactly `target` bytes are held
    pub fn resize(&mut self, target: u64) -> Result<()> {
        if target > self.bytes {
            self.grow(target - self.bytes)
        } else {
            self.shrink(self.bytes - target);
            Ok(())
        }
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.breaker.release(self.bytes);
        self.bytes = 0;
    }
}
