//! Render Strategy Selector
//!
//! Tries the configured backends strictly in order until one produces a
//! non-empty artifact. Per backend the selector:
//! 1. probes it, retrying with doubling backoff while the probe is pending
//! 2. for DOM backends, verifies the target has a non-zero size, forcing it
//!    visible and re-measuring once before giving up
//! 3. runs it under the backend's timeout
//!
//! A skipped backend (unavailable, unregistered, unmeasurable target) is
//! recorded separately from a failed one. Only when every backend has been
//! skipped or has failed does the caller get an error, and that error
//! carries the full attempt list.

use std::cell::Cell;
use std::rc::Rc;

use certificate_core::{DeviceClass, PageDescription, RenderConfig};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::artifact::RenderedArtifact;
use crate::backend::{BackendParams, Probe, RenderBackend, RenderContext, RenderTarget, TargetSize};
use crate::error::{BackendError, RenderError};
use crate::fallback::ExhaustionReport;
use crate::timer::{with_timeout, Timer};

/// How one backend's turn ended
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Succeeded,
    Skipped { reason: String },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptRecord {
    pub backend: String,
    /// Capability probes issued, including retries
    pub probes: u32,
    pub outcome: AttemptOutcome,
}

/// Result of invoking one backend
#[derive(Debug)]
pub enum BackendAttemptResult {
    Success(RenderedArtifact),
    Unavailable(String),
    Failed(BackendError),
}

#[derive(Debug)]
pub struct RenderOutcome {
    pub artifact: RenderedArtifact,
    pub attempts: Vec<AttemptRecord>,
}

/// Session-scoped cancellation flag, checked between awaits
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Rc<Cell<bool>>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.get()
    }

    fn reset(&self) {
        self.0.set(false);
    }
}

/// Clears the in-flight flag however the render ends
struct InFlight<'a>(&'a Cell<bool>);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

pub struct RenderStrategySelector {
    backends: Vec<Rc<dyn RenderBackend>>,
    config: RenderConfig,
    timer: Rc<dyn Timer>,
    in_flight: Cell<bool>,
    cancel: CancelToken,
}

impl RenderStrategySelector {
    pub fn new(config: RenderConfig, timer: Rc<dyn Timer>) -> Self {
        Self {
            backends: Vec::new(),
            config,
            timer,
            in_flight: Cell::new(false),
            cancel: CancelToken::default(),
        }
    }

    /// Make a backend available under its own name. Registration order is
    /// irrelevant; the configured order decides priority.
    pub fn register(&mut self, backend: Rc<dyn RenderBackend>) {
        self.backends.retain(|b| b.name() != backend.name());
        self.backends.push(backend);
    }

    pub fn with_backend(mut self, backend: Rc<dyn RenderBackend>) -> Self {
        self.register(backend);
        self
    }

    pub fn order(&self) -> &[String] {
        &self.config.backend_order
    }

    pub fn registered(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.get()
    }

    fn lookup(&self, name: &str) -> Option<Rc<dyn RenderBackend>> {
        self.backends.iter().find(|b| b.name() == name).cloned()
    }

    fn check_cancelled(&self) -> Result<(), RenderError> {
        if self.cancel.is_cancelled() {
            Err(RenderError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Render `page` with the first backend that succeeds.
    ///
    /// The device class adjusts scale, quality and timeouts only; the set
    /// and order of backends is the same on every device.
    pub async fn render(
        &self,
        page: &PageDescription,
        target: Option<&dyn RenderTarget>,
        device: DeviceClass,
    ) -> Result<RenderOutcome, RenderError> {
        if self.in_flight.replace(true) {
            warn!("render requested while another is in flight");
            return Err(RenderError::Busy);
        }
        let _guard = InFlight(&self.in_flight);
        self.cancel.reset();

        let mut attempts = Vec::new();

        for (index, name) in self.config.backend_order.iter().enumerate() {
            self.check_cancelled()?;
            let attempt = index + 1;

            let Some(backend) = self.lookup(name) else {
                debug!(backend = %name, attempt, "backend not registered on this host");
                attempts.push(AttemptRecord {
                    backend: name.clone(),
                    probes: 0,
                    outcome: AttemptOutcome::Skipped {
                        reason: "not registered on this host".to_string(),
                    },
                });
                continue;
            };

            let (probes, result) = self
                .attempt(backend.as_ref(), page, target, device, attempt)
                .await?;

            let outcome = match result {
                BackendAttemptResult::Success(artifact) => {
                    info!(
                        backend = %name,
                        attempt,
                        bytes = artifact.len(),
                        "render succeeded"
                    );
                    attempts.push(AttemptRecord {
                        backend: name.clone(),
                        probes,
                        outcome: AttemptOutcome::Succeeded,
                    });
                    return Ok(RenderOutcome { artifact, attempts });
                }
                BackendAttemptResult::Unavailable(reason) => {
                    info!(backend = %name, attempt, %reason, "backend skipped");
                    AttemptOutcome::Skipped { reason }
                }
                BackendAttemptResult::Failed(error) => {
                    warn!(backend = %name, attempt, %error, "backend failed");
                    AttemptOutcome::Failed {
                        error: error.to_string(),
                    }
                }
            };
            attempts.push(AttemptRecord {
                backend: name.clone(),
                probes,
                outcome,
            });
        }

        let report = ExhaustionReport { attempts };
        warn!(%report, "all render backends exhausted");
        Err(RenderError::AllBackendsExhausted(report))
    }

    async fn attempt(
        &self,
        backend: &dyn RenderBackend,
        page: &PageDescription,
        target: Option<&dyn RenderTarget>,
        device: DeviceClass,
        attempt: usize,
    ) -> Result<(u32, BackendAttemptResult), RenderError> {
        let name = backend.name();
        let retry = self.config.probe_retry;
        let mut probes = 0u32;

        loop {
            probes += 1;
            match backend.probe().await {
                Probe::Available => break,
                Probe::Unavailable(reason) => {
                    return Ok((probes, BackendAttemptResult::Unavailable(reason)));
                }
                Probe::Pending(reason) => {
                    if probes >= retry.attempts {
                        return Ok((
                            probes,
                            BackendAttemptResult::Unavailable(format!(
                                "{} (still pending after {} probes)",
                                reason, probes
                            )),
                        ));
                    }
                    let delay = retry.delay_after(probes - 1);
                    debug!(
                        backend = name,
                        attempt,
                        probe = probes,
                        delay_ms = delay.as_millis() as u64,
                        %reason,
                        "backend pending, waiting before next probe"
                    );
                    self.timer.sleep(delay).await;
                    self.check_cancelled()?;
                    backend.reload().await;
                }
            }
            self.check_cancelled()?;
        }

        let target_size = if backend.kind().needs_target() {
            match self.verify_target(target, name, attempt).await? {
                Ok(size) => Some(size),
                Err(reason) => return Ok((probes, BackendAttemptResult::Unavailable(reason))),
            }
        } else {
            target.and_then(|t| t.measure()).filter(|s| !s.is_zero())
        };

        let params = BackendParams::resolve(&self.config, name, device);
        let ctx = RenderContext {
            params,
            device,
            target,
            target_size,
        };

        debug!(backend = name, attempt, timeout_ms = params.timeout.as_millis() as u64, "executing backend");
        let result = with_timeout(self.timer.as_ref(), params.timeout, backend.execute(page, &ctx)).await;
        self.check_cancelled()?;

        let result = match result {
            None => BackendAttemptResult::Failed(BackendError::Timeout(
                params.timeout.as_millis() as u64,
            )),
            Some(Err(error)) => BackendAttemptResult::Failed(error),
            Some(Ok(artifact)) if artifact.is_empty() => {
                BackendAttemptResult::Failed(BackendError::EmptyArtifact)
            }
            Some(Ok(artifact)) => BackendAttemptResult::Success(artifact),
        };
        Ok((probes, result))
    }

    /// Inner `Err` is a skip reason; outer `Err` is cancellation
    async fn verify_target(
        &self,
        target: Option<&dyn RenderTarget>,
        backend: &str,
        attempt: usize,
    ) -> Result<Result<TargetSize, String>, RenderError> {
        let Some(target) = target else {
            return Ok(Err("no render target on this page".to_string()));
        };

        match target.measure() {
            None => return Ok(Err(format!("target {} not found", target.describe()))),
            Some(size) if !size.is_zero() => return Ok(Ok(size)),
            Some(_) => {}
        }

        debug!(backend, attempt, target = %target.describe(), "target has zero size, forcing it visible");
        if !target.force_visible() {
            return Ok(Err(format!(
                "target {} has zero size and cannot be shown",
                target.describe()
            )));
        }
        self.timer.sleep(self.config.settle_delay()).await;
        self.check_cancelled()?;

        match target.measure() {
            Some(size) if !size.is_zero() => Ok(Ok(size)),
            _ => Ok(Err(format!(
                "target {} still has zero size after forcing visibility",
                target.describe()
            ))),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    use async_trait::async_trait;

    use super::*;
    use crate::artifact::ArtifactKind;
    use crate::backend::BackendKind;

    /// What a scripted backend does when executed
    #[derive(Clone)]
    pub enum Script {
        Produce(Vec<u8>),
        Fail(String),
        Hang,
    }

    /// Backend driven by a queue of probe answers and one execute script
    pub struct ScriptedBackend {
        pub name: String,
        pub kind: BackendKind,
        pub probes: RefCell<VecDeque<Probe>>,
        pub script: Script,
        pub executed: Cell<u32>,
        pub reloads: Cell<u32>,
    }

    impl ScriptedBackend {
        pub fn new(name: &str, kind: BackendKind, probes: Vec<Probe>, script: Script) -> Rc<Self> {
            Rc::new(Self {
                name: name.to_string(),
                kind,
                probes: RefCell::new(probes.into()),
                script,
                executed: Cell::new(0),
                reloads: Cell::new(0),
            })
        }

        pub fn working(name: &str, kind: BackendKind) -> Rc<Self> {
            Self::new(name, kind, vec![], Script::Produce(vec![1, 2, 3]))
        }

        pub fn unavailable(name: &str) -> Rc<Self> {
            Self::new(
                name,
                BackendKind::Vector,
                vec![Probe::Unavailable("library missing".to_string())],
                Script::Produce(vec![1]),
            )
        }
    }

    #[async_trait(?Send)]
    impl RenderBackend for ScriptedBackend {
        fn name(&self) -> &str {
            &self.name
        }

        fn kind(&self) -> BackendKind {
            self.kind
        }

        async fn probe(&self) -> Probe {
            // An exhausted script keeps answering with its last word
            let mut probes = self.probes.borrow_mut();
            if probes.len() > 1 {
                probes.pop_front().unwrap_or(Probe::Available)
            } else {
                probes.front().cloned().unwrap_or(Probe::Available)
            }
        }

        async fn reload(&self) {
            self.reloads.set(self.reloads.get() + 1);
        }

        async fn execute(
            &self,
            _page: &PageDescription,
            _ctx: &RenderContext<'_>,
        ) -> Result<RenderedArtifact, BackendError> {
            self.executed.set(self.executed.get() + 1);
            match &self.script {
                Script::Produce(bytes) => Ok(RenderedArtifact::new(
                    ArtifactKind::Png,
                    bytes.clone(),
                    self.name.clone(),
                )),
                Script::Fail(message) => Err(BackendError::Execution(message.clone())),
                Script::Hang => futures::future::pending().await,
            }
        }
    }

    /// Target whose measurements are scripted
    pub struct FakeTarget {
        pub sizes: RefCell<VecDeque<Option<TargetSize>>>,
        pub forced: Cell<u32>,
    }

    impl FakeTarget {
        pub fn new(sizes: Vec<Option<TargetSize>>) -> Self {
            Self {
                sizes: RefCell::new(sizes.into()),
                forced: Cell::new(0),
            }
        }

        pub fn visible() -> Self {
            Self::new(vec![Some(TargetSize::new(794.0, 1123.0))])
        }
    }

    impl RenderTarget for FakeTarget {
        fn describe(&self) -> String {
            "#hojaDocumento".to_string()
        }

        fn measure(&self) -> Option<TargetSize> {
            let mut sizes = self.sizes.borrow_mut();
            if sizes.len() > 1 {
                sizes.pop_front().flatten()
            } else {
                sizes.front().copied().flatten()
            }
        }

        fn force_visible(&self) -> bool {
            self.forced.set(self.forced.get() + 1);
            true
        }
    }
}
