//! Fixed-period cycle driver
//!
//! The first cycle runs immediately, then one per period. Cancellation only
//! stops future cycles: a cycle in flight always completes. Errors and
//! panics inside a cycle are logged and the schedule continues.

use std::io::BufRead;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::Result;

/// Work performed on every tick
#[async_trait]
pub trait Cycle: Send {
    async fn run_once(&mut self) -> Result<()>;
}

pub struct Scheduler {
    period: Duration,
    cancel: CancellationToken,
}

impl Scheduler {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            cancel: CancellationToken::new(),
        }
    }

    /// Handle that stops the schedule when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drive `cycle` until cancelled; returns the number of cycles started
    pub async fn run<C: Cycle>(&self, cycle: &mut C) -> usize {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut started = 0usize;

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    info!("Scheduler stopped after {} cycle(s)", started);
                    break;
                }

                _ = ticker.tick() => {
                    started += 1;
                    debug!("Cycle #{} starting", started);

                    match AssertUnwindSafe(cycle.run_once()).catch_unwind().await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => error!("Cycle #{} failed: {}", started, e),
                        Err(_) => error!("Cycle #{} panicked, schedule continues", started),
                    }
                }
            }
        }

        started
    }
}

/// A line typed by the operator that asks to stop
pub fn is_quit_command(line: &str) -> bool {
    line.to_uppercase().contains('Q')
}

/// Cancel `token` when the operator types a line containing 'Q'
///
/// Runs on a detached thread because stdin reads block; the thread ends on
/// the quit line or at end of input.
pub fn spawn_quit_listener(token: CancellationToken) -> std::io::Result<()> {
    std::thread::Builder::new()
        .name("quit-listener".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(line) if is_quit_command(&line) => {
                        info!("Stop requested, finishing current cycle");
                        token.cancel();
                        return;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        debug!("stdin closed: {}", e);
                        return;
                    }
                }
            }
            debug!("stdin reached end of input, quit listener stopped");
        })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    enum Behaviour {
        Succeed,
        Fail,
        PanicOnFirst,
    }

    struct Counting {
        runs: usize,
        stop_after: usize,
        token: CancellationToken,
        behaviour: Behaviour,
    }

    impl Counting {
        fn new(scheduler: &Scheduler, stop_after: usize, behaviour: Behaviour) -> Self {
            Self {
                runs: 0,
                stop_after,
                token: scheduler.cancellation_token(),
                behaviour,
            }
        }
    }

    #[async_trait]
    impl Cycle for Counting {
        async fn run_once(&mut self) -> Result<()> {
            self.runs += 1;
            if self.runs >= self.stop_after {
                self.token.cancel();
            }
            match self.behaviour {
                Behaviour::Succeed => Ok(()),
                Behaviour::Fail => Err(Error::Rpc("node unreachable".into())),
                Behaviour::PanicOnFirst if self.runs == 1 => panic!("boom"),
                Behaviour::PanicOnFirst => Ok(()),
            }
        }
    }

    #[tokio::test]
    async fn test_runs_until_cancelled() {
        let scheduler = Scheduler::new(Duration::from_millis(20));
        let mut cycle = Counting::new(&scheduler, 3, Behaviour::Succeed);

        let started = scheduler.run(&mut cycle).await;
        assert_eq!(started, 3);
        assert_eq!(cycle.runs, 3);
    }

    #[tokio::test]
    async fn test_first_cycle_is_immediate() {
        let scheduler = Scheduler::new(Duration::from_secs(3600));
        let mut cycle = Counting::new(&scheduler, 1, Behaviour::Succeed);

        let started = tokio::time::timeout(Duration::from_secs(5), scheduler.run(&mut cycle))
            .await
            .unwrap();
        assert_eq!(started, 1);
    }

    #[tokio::test]
    async fn test_errors_do_not_stop_schedule() {
        let scheduler = Scheduler::new(Duration::from_millis(10));
        let mut cycle = Counting::new(&scheduler, 3, Behaviour::Fail);

        assert_eq!(scheduler.run(&mut cycle).await, 3);
    }

    #[tokio::test]
    async fn test_panic_does_not_stop_schedule() {
        let scheduler = Scheduler::new(Duration::from_millis(10));
        let mut cycle = Counting::new(&scheduler, 2, Behaviour::PanicOnFirst);

        assert_eq!(scheduler.run(&mut cycle).await, 2);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let scheduler = Scheduler::new(Duration::from_millis(10));
        scheduler.cancellation_token().cancel();
        let mut cycle = Counting::new(&scheduler, 100, Behaviour::Succeed);

        assert_eq!(scheduler.run(&mut cycle).await, 0);
        assert_eq!(cycle.runs, 0);
    }

    #[test]
    fn test_quit_command() {
        assert!(is_quit_command("q"));
        assert!(is_quit_command("  Quit "));
        assert!(!is_quit_command(""));
        assert!(!is_quit_command("status"));
    }
}
