//! Bounds how many native codec calls run at once.
//!
//! One-shot compression is CPU bound; letting every caller into the codec at
//! the same time only oversubscribes the cores.

use std::sync::OnceLock;

use parking_lot::{Condvar, Mutex};

/// A counting semaphore.
#[derive(Debug)]
pub struct Limiter {
    capacity: usize,
    free: Mutex<usize>,
    released: Condvar,
}

impl Limiter {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 1);
        Self {
            capacity,
            free: Mutex::new(capacity),
            released: Condvar::new(),
        }
    }

    /// Blocks until a slot is free. The slot is returned when the permit drops.
    pub fn acquire(&self) -> Permit<'_> {
        let mut free = self.free.lock();
        while *free == 0 {
            self.released.wait(&mut free);
        }
        *free -= 1;
        Permit { limiter: self }
    }

    pub fn try_acquire(&self) -> Option<Permit<'_>> {
        let mut free = self.free.lock();
        if *free == 0 {
            return None;
        }
        *free -= 1;
        Some(Permit { limiter: self })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        *self.free.lock()
    }

    fn release(&self) {
        let mut free = self.free.lock();
        *free += 1;
        debug_assert!(*free <= self.capacity);
        drop(free);
        self.released.notify_one();
    }
}

/// A slot held in a [`Limiter`].
#[must_use = "the slot is released as soon as the permit is dropped"]
#[derive(Debug)]
pub struct Permit<'l> {
    limiter: &'l Limiter,
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        self.limiter.release();
    }
}

/// The process wide limiter, sized to the number of usable CPUs.
pub fn global() -> &'static Limiter {
    static GLOBAL: OnceLock<Limiter> = OnceLock::new();
    GLOBAL.get_or_init(|| {
        let capacity = num_cpus::get().max(1);
        tracing::debug!(capacity, "sizing codec concurrency limit");
        Limiter::new(capacity)
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_permits() {
        let limiter = Limiter::new(2);
        let a = limiter.acquire();
        let b = limiter.acquire();
        assert_eq!(limiter.available(), 0);
        assert!(limiter.try_acquire().is_none());

        drop(a);
        assert_eq!(limiter.available(), 1);
        let c = limiter.try_acquire();
        assert!(c.is_some());

        drop((b, c));
        assert_eq!(limiter.available(), 2);
    }

    #[test]
    fn test_bounds_concurrency() {
        let limiter = Limiter::new(3);
        let running = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);

        std::thread::scope(|s| {
            for _ in 0..12 {
                s.spawn(|| {
                    let _permit = limiter.acquire();
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(5));
                    running.fetch_sub(1, Ordering::SeqCst);
                });
            }
        });

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(limiter.available(), 3);
    }

    #[test]
    fn test_global_matches_cpus() {
        assert_eq!(global().capacity(), num_cpus::get().max(1));
    }
}
