//! Fixed-cadence sampling scheduler.
//!
//! One detection cycle fires per tick. The tick timer is an owned handle:
//! `stop()` cancels the timer thread and joins it, so no tick callback runs
//! after `stop()` returns. Reconfiguration is tear-down-and-restart; a
//! running scheduler is never mutated in place.

use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};

/// Default sampling cadence between detection cycles.
pub const DEFAULT_CADENCE: Duration = Duration::from_millis(100);

/// Periodic tick driver for the detection pipeline.
///
/// At most one tick thread is live per scheduler. Dropping the scheduler
/// stops it.
pub struct SamplingScheduler {
    inner: Option<Ticker>,
}

struct Ticker {
    stop: Arc<(Mutex<bool>, Condvar)>,
    thread: JoinHandle<()>,
}

impl SamplingScheduler {
    /// Start firing `on_tick` every `cadence` until `stop()`.
    ///
    /// Ticks fire on a fixed-rate timeline; if a callback overruns its slot
    /// the missed ticks are skipped, not bursted, so late cycles never pile
    /// up.
    pub fn start<F>(cadence: Duration, mut on_tick: F) -> Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        if cadence.is_zero() {
            return Err(anyhow!("sampling cadence must be greater than zero"));
        }

        let stop = Arc::new((Mutex::new(false), Condvar::new()));
        let thread_stop = Arc::clone(&stop);

        let thread = std::thread::spawn(move || {
            let (lock, cvar) = &*thread_stop;
            let mut next_tick = Instant::now() + cadence;

            let Ok(mut stopped) = lock.lock() else {
                return;
            };
            loop {
                while !*stopped {
                    let now = Instant::now();
                    if now >= next_tick {
                        break;
                    }
                    let Ok((guard, _)) = cvar.wait_timeout(stopped, next_tick - now) else {
                        return;
                    };
                    stopped = guard;
                }
                if *stopped {
                    return;
                }

                drop(stopped);
                on_tick();

                // Re-anchor if the callback overran the slot.
                next_tick += cadence;
                let now = Instant::now();
                if next_tick < now {
                    next_tick = now + cadence;
                }

                match lock.lock() {
                    Ok(guard) => stopped = guard,
                    Err(_) => return,
                }
            }
        });

        Ok(Self {
            inner: Some(Ticker { stop, thread }),
        })
    }

    /// Start with the default 100 ms cadence.
    pub fn start_default<F>(on_tick: F) -> Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        Self::start(DEFAULT_CADENCE, on_tick)
    }

    /// True while the tick thread is live.
    pub fn is_running(&self) -> bool {
        self.inner.is_some()
    }

    /// Stop the scheduler. Idempotent. Joins the tick thread, so zero ticks
    /// fire after this returns.
    pub fn stop(&mut self) {
        let Some(ticker) = self.inner.take() else {
            return;
        };
        {
            let (lock, cvar) = &*ticker.stop;
            if let Ok(mut stopped) = lock.lock() {
                *stopped = true;
            }
            cvar.notify_all();
        }
        if ticker.thread.join().is_err() {
            log::error!("sampling tick thread panicked");
        }
    }
}

impl Drop for SamplingScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn ticks_fire_at_roughly_the_cadence() {
        let count = Arc::new(AtomicU64::new(0));
        let tick_count = Arc::clone(&count);
        let mut scheduler = SamplingScheduler::start(Duration::from_millis(20), move || {
            tick_count.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        std::thread::sleep(Duration::from_millis(250));
        scheduler.stop();

        let ticks = count.load(Ordering::SeqCst);
        assert!(ticks >= 5, "expected at least 5 ticks, got {}", ticks);
        assert!(ticks <= 15, "expected at most 15 ticks, got {}", ticks);
    }

    #[test]
    fn no_ticks_after_stop_returns() {
        let count = Arc::new(AtomicU64::new(0));
        let tick_count = Arc::clone(&count);
        let mut scheduler = SamplingScheduler::start(Duration::from_millis(10), move || {
            tick_count.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        std::thread::sleep(Duration::from_millis(50));
        scheduler.stop();
        let at_stop = count.load(Ordering::SeqCst);

        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), at_stop);
    }

    #[test]
    fn stop_is_idempotent() {
        let mut scheduler = SamplingScheduler::start(Duration::from_millis(10), || {}).unwrap();
        scheduler.stop();
        scheduler.stop();
        assert!(!scheduler.is_running());
    }

    #[test]
    fn zero_cadence_is_rejected() {
        assert!(SamplingScheduler::start(Duration::ZERO, || {}).is_err());
    }

    #[test]
    fn dropping_the_scheduler_stops_ticks() {
        let count = Arc::new(AtomicU64::new(0));
        let tick_count = Arc::clone(&count);
        {
            let _scheduler = SamplingScheduler::start(Duration::from_millis(10), move || {
                tick_count.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
            std::thread::sleep(Duration::from_millis(40));
        }
        let at_drop = count.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(count.load(Ordering::SeqCst), at_drop);
    }
}
