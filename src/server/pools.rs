use crossbeam::queue::ArrayQueue;

/// Restores a pooled value to its acquisition state.
///
/// Runs on every return to the pool, so cleared buffers never leak data
/// into a later request even when the value is recycled immediately.
pub(crate) trait Recycle {
    fn recycle(&mut self);
}

// Lock-free bounded pool of reusable values.
//
// Acquire always succeeds: an empty pool allocates a fresh value. Return is
// best-effort: once `retention` values are parked, further returns drop the
// value instead of growing the pool.
pub(crate) struct Pool<T> {
    slots: ArrayQueue<T>,
    build: fn() -> T,
}

impl<T: Recycle> Pool<T> {
    #[inline]
    pub(crate) fn new(retention: usize, build: fn() -> T) -> Self {
        Pool {
            slots: ArrayQueue::new(retention.max(1)),
            build,
        }
    }

    #[inline]
    pub(crate) fn acquire(&self) -> T {
        self.slots.pop().unwrap_or_else(self.build)
    }

    #[inline]
    pub(crate) fn release(&self, mut value: T) {
        value.recycle();
        let _ = self.slots.push(value);
    }

    #[cfg(test)]
    pub(crate) fn parked(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Probe {
        payload: Vec<u8>,
        recycled: usize,
    }

    impl Recycle for Probe {
        fn recycle(&mut self) {
            self.payload.clear();
            self.recycled += 1;
        }
    }

    #[test]
    fn acquire_allocates_when_empty() {
        let pool: Pool<Probe> = Pool::new(4, Probe::default);

        let value = pool.acquire();
        assert_eq!(value.recycled, 0);
        assert_eq!(pool.parked(), 0);
    }

    #[test]
    fn release_recycles_and_parks() {
        let pool: Pool<Probe> = Pool::new(4, Probe::default);

        let mut value = pool.acquire();
        value.payload.extend_from_slice(b"sensitive");
        pool.release(value);
        assert_eq!(pool.parked(), 1);

        let value = pool.acquire();
        assert!(value.payload.is_empty());
        assert_eq!(value.recycled, 1);
    }

    #[test]
    fn retention_bounds_parked_values() {
        let pool: Pool<Probe> = Pool::new(2, Probe::default);

        for _ in 0..5 {
            pool.release(Probe::default());
        }

        assert_eq!(pool.parked(), 2);
    }

    #[test]
    fn zero_retention_still_works() {
        let pool: Pool<Probe> = Pool::new(0, Probe::default);

        pool.release(Probe::default());
        let _ = pool.acquire();
    }
}
