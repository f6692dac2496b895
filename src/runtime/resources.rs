//! Process-wide CPU/memory slot scheduler.
//!
//! Task attempts request up to `cpu` CPUs and `memory` bytes before handing
//! off to the container backend, blocking on a condition variable until the
//! shared pool can satisfy them. Waits poll the termination flag so
//! cancellation is never stuck behind a full pool.

use super::error::{RuntimeError, RuntimeResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

#[derive(Debug)]
struct Pool {
    host_cpu: u32,
    host_memory: u64,
    used_cpu: u32,
    used_memory: u64,
}

#[derive(Debug)]
pub struct ResourceScheduler {
    pool: Mutex<Pool>,
    available: Condvar,
}

impl ResourceScheduler {
    pub fn new(host_cpu: u32, host_memory: u64) -> Arc<Self> {
        Arc::new(Self {
            pool: Mutex::new(Pool {
                host_cpu: host_cpu.max(1),
                host_memory,
                used_cpu: 0,
                used_memory: 0,
            }),
            available: Condvar::new(),
        })
    }

    pub fn capacity(&self) -> (u32, u64) {
        let p = self.pool.lock().unwrap();
        (p.host_cpu, p.host_memory)
    }

    /// Block until `cpu`/`memory` can be claimed; requests exceeding the
    /// whole pool are clamped so they can eventually run alone.
    pub fn acquire(
        self: &Arc<Self>,
        cpu: u32,
        memory: u64,
        terminating: &AtomicBool,
    ) -> RuntimeResult<ResourceClaim> {
        let mut pool = self.pool.lock().unwrap();
        let cpu = cpu.clamp(1, pool.host_cpu);
        let memory = memory.min(pool.host_memory);
        loop {
            if terminating.load(Ordering::SeqCst) {
                return Err(RuntimeError::Terminated);
            }
            if pool.used_cpu + cpu <= pool.host_cpu && pool.used_memory + memory <= pool.host_memory
            {
                pool.used_cpu += cpu;
                pool.used_memory += memory;
                return Ok(ResourceClaim {
                    scheduler: Arc::clone(self),
                    cpu,
                    memory,
                });
            }
            let (guard, _timeout) = self
                .available
                .wait_timeout(pool, Duration::from_millis(200))
                .unwrap();
            pool = guard;
        }
    }

    fn release(&self, cpu: u32, memory: u64) {
        let mut pool = self.pool.lock().unwrap();
        pool.used_cpu = pool.used_cpu.saturating_sub(cpu);
        pool.used_memory = pool.used_memory.saturating_sub(memory);
        drop(pool);
        self.available.notify_all();
    }
}

/// A granted reservation; releases its share of the pool when dropped.
#[derive(Debug)]
pub struct ResourceClaim {
    scheduler: Arc<ResourceScheduler>,
    cpu: u32,
    memory: u64,
}

impl ResourceClaim {
    pub fn cpu(&self) -> u32 {
        self.cpu
    }

    pub fn memory(&self) -> u64 {
        self.memory
    }
}

impl Drop for ResourceClaim {
    fn drop(&mut self) {
        self.scheduler.release(self.cpu, self.memory);
    }
}
