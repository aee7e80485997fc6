//! Host-provided delays.
//!
//! The selector never sleeps on its own; the host supplies a [`Timer`]
//! (tokio natively, `setTimeout` in the browser).

use std::future::Future;
use std::pin::pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{select, Either};

#[async_trait(?Send)]
pub trait Timer {
    async fn sleep(&self, duration: Duration);
}

#[cfg(feature = "tokio-timer")]
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTimer;

#[cfg(feature = "tokio-timer")]
#[async_trait(?Send)]
impl Timer for TokioTimer {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Run `fut` unless `duration` elapses first
pub async fn with_timeout<F: Future>(
    timer: &dyn Timer,
    duration: Duration,
    fut: F,
) -> Option<F::Output> {
    let fut = pin!(fut);
    match select(fut, timer.sleep(duration)).await {
        Either::Left((output, _)) => Some(output),
        Either::Right(_) => None,
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    /// Completes every sleep at once and records what was asked for
    #[derive(Clone, Default)]
    pub struct InstantTimer {
        pub sleeps: Rc<RefCell<Vec<Duration>>>,
    }

    impl InstantTimer {
        pub fn requested(&self) -> Vec<Duration> {
            self.sleeps.borrow().clone()
        }
    }

    #[async_trait(?Send)]
    impl Timer for InstantTimer {
        async fn sleep(&self, duration: Duration) {
            self.sleeps.borrow_mut().push(duration);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::InstantTimer;
    use super::*;

    #[tokio::test]
    async fn test_ready_future_beats_timer() {
        let timer = InstantTimer::default();
        let out = with_timeout(&timer, Duration::from_millis(5), async { 7 }).await;
        assert_eq!(out, Some(7));
    }

    #[tokio::test]
    async fn test_pending_future_times_out() {
        let timer = InstantTimer::default();
        let out = with_timeout(&timer, Duration::from_millis(5), futures::future::pending::<u8>())
            .await;
        assert_eq!(out, None);
        assert_eq!(timer.requested(), vec![Duration::from_millis(5)]);
    }

    #[cfg(feature = "tokio-timer")]
    #[tokio::test]
    async fn test_tokio_timer_times_out() {
        let out = with_timeout(
            &TokioTimer,
            Duration::from_millis(10),
            tokio::time::sleep(Duration::from_secs(5)),
        )
        .await;
        assert!(out.is_none());
    }
}
