//! The polling driver.
//!
//! [`wait`] calls a [`Probe`] at a fixed interval until it reports a target
//! label, a terminal failure, or the deadline passes. Each call owns its own
//! counters and deadline; nothing is shared between concurrent waits.
//!
//! Loop rules:
//! - backend and transport failures end the wait on the probe that saw them;
//! - missing metadata is absorbed up to `missing_metadata_tolerance`
//!   consecutive reads, then escalates to [`ClassifiedError::ToleranceExceeded`];
//! - the deadline is checked before every sleep and again after it, so no probe
//!   is issued once the deadline has passed;
//! - cancellation is observed between probes and while sleeping, never while a
//!   probe is in flight.

use std::time::Duration;

use settle_types::{OperationHandle, PollLabel, PollOutcome};
use settle_util::{RuntimeError, block_on_future, format_duration};
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    classify::{ClassifiedError, classify_backend_failure},
    probe::Probe,
    settings::DEFAULT_MISSING_METADATA_TOLERANCE,
};

/// Interval, deadline and tolerance for one wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub poll_interval: Duration,
    pub timeout: Duration,
    /// Consecutive missing-metadata reads absorbed before escalating.
    pub missing_metadata_tolerance: u32,
}

impl WaitPolicy {
    pub fn new(poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            poll_interval,
            timeout,
            missing_metadata_tolerance: DEFAULT_MISSING_METADATA_TOLERANCE,
        }
    }

    pub fn with_tolerance(mut self, missing_metadata_tolerance: u32) -> Self {
        self.missing_metadata_tolerance = missing_metadata_tolerance;
        self
    }

    /// Interval and timeout taken from a resolved handle.
    pub fn from_handle(handle: &OperationHandle, missing_metadata_tolerance: u32) -> Self {
        Self::new(handle.poll_interval(), handle.timeout()).with_tolerance(missing_metadata_tolerance)
    }
}

/// How a wait ended.
#[derive(Debug, Clone, PartialEq)]
pub enum WaitOutcome {
    /// A target label was reached.
    Settled(PollOutcome),
    /// The deadline passed; `last` is the most recent decoded outcome, if any.
    TimedOut { last: Option<PollOutcome> },
    Cancelled,
    /// A terminal error ended the wait early.
    Aborted,
}

/// The single value a wait produces.
#[derive(Debug, Clone, PartialEq)]
pub struct WaitResult {
    pub outcome: WaitOutcome,
    /// Set for every outcome except [`WaitOutcome::Settled`].
    pub error: Option<ClassifiedError>,
    /// Number of probe calls made.
    pub attempts: u32,
    pub elapsed: Duration,
}

impl WaitResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, WaitOutcome::Settled(_))
    }

    /// Collapse into the settled outcome or the classified error.
    pub fn into_result(self) -> Result<PollOutcome, ClassifiedError> {
        match (self.outcome, self.error) {
            (WaitOutcome::Settled(outcome), _) => Ok(outcome),
            (_, Some(error)) => Err(error),
            (WaitOutcome::TimedOut { .. }, None) => Err(ClassifiedError::Timeout {
                after: self.elapsed,
                attempts: self.attempts,
            }),
            (WaitOutcome::Cancelled | WaitOutcome::Aborted, None) => Err(ClassifiedError::Cancelled {
                attempts: self.attempts,
            }),
        }
    }
}

/// Run `probe` until it reports a label in `target`.
///
/// # Arguments
/// * `probe` - the single-fetch check to repeat
/// * `pending` - labels that mean "keep waiting"
/// * `target` - labels that end the wait successfully
/// * `policy` - interval, timeout and missing-metadata tolerance
/// * `cancel` - caller-owned cancellation signal
///
/// # Returns
/// Exactly one [`WaitResult`]; no probe is issued after it is produced.
pub async fn wait(
    probe: &dyn Probe,
    pending: &[PollLabel],
    target: &[PollLabel],
    policy: WaitPolicy,
    cancel: &CancellationToken,
) -> WaitResult {
    let start = Instant::now();
    let deadline = start.checked_add(policy.timeout);
    let description = probe.describe();
    let mut attempts = 0u32;
    let mut consecutive_missing = 0u32;
    let mut last: Option<PollOutcome> = None;

    let finish = |outcome: WaitOutcome, error: Option<ClassifiedError>, attempts: u32| WaitResult {
        outcome,
        error,
        attempts,
        elapsed: start.elapsed(),
    };

    debug!(
        probe = %description,
        interval = %format_duration(policy.poll_interval),
        timeout = %format_duration(policy.timeout),
        "wait started"
    );

    loop {
        if cancel.is_cancelled() {
            info!(probe = %description, attempts, "wait cancelled");
            return finish(WaitOutcome::Cancelled, Some(ClassifiedError::Cancelled { attempts }), attempts);
        }

        attempts += 1;
        match probe.probe().await {
            Ok(outcome) => {
                consecutive_missing = 0;
                debug!(probe = %description, attempt = attempts, label = %outcome.label, "probe returned");

                if target.contains(&outcome.label) {
                    info!(
                        probe = %description,
                        attempts,
                        label = %outcome.label,
                        elapsed_ms = start.elapsed().as_millis(),
                        "wait settled"
                    );
                    return finish(WaitOutcome::Settled(outcome), None, attempts);
                }
                if !pending.contains(&outcome.label) {
                    let error = match outcome.label {
                        PollLabel::Failed => classify_backend_failure(outcome.message.as_deref()),
                        other => ClassifiedError::BackendFailure {
                            message: format!("unexpected {other} state while waiting for {}", join_labels(target)),
                        },
                    };
                    warn!(probe = %description, attempts, error = %error, "wait aborted");
                    return finish(WaitOutcome::Aborted, Some(error), attempts);
                }
                last = Some(outcome);
            }
            Err(ClassifiedError::MissingMetadata(missing)) => {
                consecutive_missing += 1;
                if consecutive_missing > policy.missing_metadata_tolerance {
                    let error = ClassifiedError::ToleranceExceeded {
                        attempts: consecutive_missing,
                        last: missing,
                    };
                    warn!(probe = %description, attempts, error = %error, "wait aborted");
                    return finish(WaitOutcome::Aborted, Some(error), attempts);
                }
                debug!(
                    probe = %description,
                    attempt = attempts,
                    consecutive_missing,
                    detail = %missing,
                    "status metadata unavailable; treating as pending"
                );
            }
            Err(error) => {
                warn!(probe = %description, attempts, error = %error, "wait aborted");
                return finish(WaitOutcome::Aborted, Some(error), attempts);
            }
        }

        let remaining = match deadline {
            Some(deadline) => deadline.saturating_duration_since(Instant::now()),
            None => policy.poll_interval,
        };
        if remaining.is_zero() {
            return timed_out(&description, last, attempts, start, finish);
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(probe = %description, attempts, "wait cancelled");
                return finish(WaitOutcome::Cancelled, Some(ClassifiedError::Cancelled { attempts }), attempts);
            }
            _ = sleep(policy.poll_interval.min(remaining)) => {}
        }

        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return timed_out(&description, last, attempts, start, finish);
        }
    }
}

fn timed_out<F>(description: &str, last: Option<PollOutcome>, attempts: u32, start: Instant, finish: F) -> WaitResult
where
    F: Fn(WaitOutcome, Option<ClassifiedError>, u32) -> WaitResult,
{
    let error = ClassifiedError::Timeout {
        after: start.elapsed(),
        attempts,
    };
    warn!(probe = %description, attempts, error = %error, "wait timed out");
    finish(WaitOutcome::TimedOut { last }, Some(error), attempts)
}

fn join_labels(labels: &[PollLabel]) -> String {
    labels.iter().map(|label| label.as_str()).collect::<Vec<_>>().join("/")
}

/// A [`wait`] bound to one policy, reusable across probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitEngine {
    policy: WaitPolicy,
}

impl WaitEngine {
    pub fn new(policy: WaitPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> WaitPolicy {
        self.policy
    }

    pub async fn wait(
        &self,
        probe: &dyn Probe,
        pending: &[PollLabel],
        target: &[PollLabel],
        cancel: &CancellationToken,
    ) -> WaitResult {
        wait(probe, pending, target, self.policy, cancel).await
    }

    /// Wait using the interval and timeout carried by `handle`; the tolerance
    /// still comes from this engine's policy.
    pub async fn wait_for(
        &self,
        handle: &OperationHandle,
        probe: &dyn Probe,
        pending: &[PollLabel],
        target: &[PollLabel],
        cancel: &CancellationToken,
    ) -> WaitResult {
        let policy = WaitPolicy::from_handle(handle, self.policy.missing_metadata_tolerance);
        wait(probe, pending, target, policy, cancel).await
    }

    /// Blocking variant for synchronous call sites.
    ///
    /// # Errors
    /// [`RuntimeError`] when called from a current-thread runtime or when no
    /// runtime could be built.
    pub fn wait_blocking(
        &self,
        probe: &dyn Probe,
        pending: &[PollLabel],
        target: &[PollLabel],
        cancel: &CancellationToken,
    ) -> Result<WaitResult, RuntimeError> {
        block_on_future(self.wait(probe, pending, target, cancel))
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{
            Arc, Mutex,
            atomic::{AtomicU32, Ordering},
        },
    };

    use super::*;
    use crate::classify::{ErrorKind, MissingMetadata, TransportError};

    const PENDING: &[PollLabel] = &[PollLabel::Pending];
    const DONE: &[PollLabel] = &[PollLabel::Done];

    /// Replays scripted results, repeating the last one, and records when each call happened.
    struct ScriptedProbe {
        script: Mutex<VecDeque<Result<PollOutcome, ClassifiedError>>>,
        repeat: Mutex<Option<Result<PollOutcome, ClassifiedError>>>,
        calls: AtomicU32,
        called_at: Mutex<Vec<Instant>>,
        latency: Duration,
    }

    impl ScriptedProbe {
        fn new(script: Vec<Result<PollOutcome, ClassifiedError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                repeat: Mutex::new(None),
                calls: AtomicU32::new(0),
                called_at: Mutex::new(Vec::new()),
                latency: Duration::ZERO,
            }
        }

        fn always(result: Result<PollOutcome, ClassifiedError>) -> Self {
            Self::new(vec![result])
        }

        fn with_latency(mut self, latency: Duration) -> Self {
            self.latency = latency;
            self
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }

        fn called_at(&self) -> Vec<Instant> {
            self.called_at.lock().expect("called_at lock").clone()
        }
    }

    #[async_trait::async_trait]
    impl Probe for ScriptedProbe {
        async fn probe(&self) -> Result<PollOutcome, ClassifiedError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.called_at.lock().expect("called_at lock").push(Instant::now());
            if !self.latency.is_zero() {
                sleep(self.latency).await;
            }
            let next = self.script.lock().expect("script lock").pop_front();
            let mut repeat = self.repeat.lock().expect("repeat lock");
            match next {
                Some(result) => {
                    *repeat = Some(result.clone());
                    result
                }
                None => repeat.clone().unwrap_or_else(|| Ok(PollOutcome::pending())),
            }
        }

        fn describe(&self) -> String {
            "scripted".into()
        }
    }

    fn running() -> Result<PollOutcome, ClassifiedError> {
        Ok(PollOutcome::pending().with_message(Some("RUNNING")))
    }

    fn done() -> Result<PollOutcome, ClassifiedError> {
        Ok(PollOutcome::done())
    }

    fn missing() -> Result<PollOutcome, ClassifiedError> {
        Err(MissingMetadata::new(Some("/metadata/state"), "response has no '/metadata/state' field").into())
    }

    fn policy(interval_secs: u64, timeout_secs: u64) -> WaitPolicy {
        WaitPolicy::new(Duration::from_secs(interval_secs), Duration::from_secs(timeout_secs))
    }

    #[tokio::test(start_paused = true)]
    async fn settles_after_fourth_call() {
        let probe = ScriptedProbe::new(vec![running(), running(), running(), done()]);
        let result = wait(&probe, PENDING, DONE, policy(5, 600), &CancellationToken::new()).await;

        assert!(result.is_success());
        assert_eq!(result.attempts, 4);
        assert_eq!(probe.calls(), 4);
        assert_eq!(result.elapsed, Duration::from_secs(15));
        assert_eq!(result.into_result().expect("settled").label, PollLabel::Done);
    }

    #[tokio::test(start_paused = true)]
    async fn converges_after_exactly_n_calls() {
        for n in 1..=6usize {
            let mut script = vec![running(); n - 1];
            script.push(done());
            let probe = ScriptedProbe::new(script);
            let result = wait(&probe, PENDING, DONE, policy(1, 60), &CancellationToken::new()).await;
            assert!(result.is_success(), "n = {n}");
            assert_eq!(probe.calls() as usize, n);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn always_running_times_out_after_two_calls() {
        let probe = ScriptedProbe::always(running());
        let result = wait(&probe, PENDING, DONE, policy(5, 10), &CancellationToken::new()).await;

        assert_eq!(probe.calls(), 2);
        assert_eq!(result.attempts, 2);
        assert_eq!(result.elapsed, Duration::from_secs(10));
        assert!(matches!(
            &result.outcome,
            WaitOutcome::TimedOut { last: Some(last) } if last.message.as_deref() == Some("RUNNING")
        ));
        assert_eq!(result.error.as_ref().map(ClassifiedError::kind), Some(ErrorKind::Timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn no_probe_after_deadline() {
        let probe = ScriptedProbe::always(running());
        let policy = policy(3, 10);
        let start = Instant::now();
        let result = wait(&probe, PENDING, DONE, policy, &CancellationToken::new()).await;

        assert_eq!(result.error.as_ref().map(ClassifiedError::kind), Some(ErrorKind::Timeout));
        for called in probe.called_at() {
            assert!(called < start + policy.timeout, "probe issued at or after the deadline");
        }
        // 0s, 3s, 6s, 9s; the last sleep is cut to the 1s that remains.
        assert_eq!(probe.calls(), 4);
        assert_eq!(result.elapsed, Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_probe_overruns_deadline_by_at_most_one_probe() {
        let probe = ScriptedProbe::always(running()).with_latency(Duration::from_secs(4));
        let result = wait(&probe, PENDING, DONE, policy(5, 10), &CancellationToken::new()).await;

        // Probe at 0s (returns at 4s), sleep 5s, probe at 9s (returns at 13s).
        assert_eq!(probe.calls(), 2);
        assert_eq!(result.elapsed, Duration::from_secs(13));
        assert_eq!(result.error.as_ref().map(ClassifiedError::kind), Some(ErrorKind::Timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn backend_failure_on_first_call_returns_immediately() {
        let probe = ScriptedProbe::always(Err(ClassifiedError::BackendFailure {
            message: "quota exceeded".into(),
        }));
        let result = wait(&probe, PENDING, DONE, policy(5, 3600), &CancellationToken::new()).await;

        assert_eq!(probe.calls(), 1);
        assert_eq!(result.elapsed, Duration::ZERO);
        assert_eq!(result.outcome, WaitOutcome::Aborted);
        assert_eq!(
            result.into_result(),
            Err(ClassifiedError::BackendFailure {
                message: "quota exceeded".into()
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_label_outside_target_is_backend_failure() {
        let probe = ScriptedProbe::new(vec![running(), Ok(PollOutcome::new(PollLabel::Failed))]);
        let result = wait(&probe, PENDING, DONE, policy(5, 3600), &CancellationToken::new()).await;

        assert_eq!(probe.calls(), 2);
        assert_eq!(
            result.error,
            Some(ClassifiedError::BackendFailure {
                message: "request failed".into()
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unexpected_label_is_backend_failure() {
        let probe = ScriptedProbe::always(Ok(PollOutcome::deleted()));
        let result = wait(&probe, PENDING, DONE, policy(5, 3600), &CancellationToken::new()).await;

        assert_eq!(probe.calls(), 1);
        let error = result.error.expect("error");
        assert_eq!(error.kind(), ErrorKind::BackendFailure);
        assert!(error.to_string().contains("unexpected deleted state"), "{error}");
    }

    #[tokio::test(start_paused = true)]
    async fn transport_errors_are_not_retried() {
        let transport: ClassifiedError = TransportError::new(Some(500), "HTTP 500: internal error").into();
        let probe = ScriptedProbe::new(vec![running(), Err(transport.clone()), done()]);
        let result = wait(&probe, PENDING, DONE, policy(5, 3600), &CancellationToken::new()).await;

        assert_eq!(probe.calls(), 2);
        assert_eq!(result.into_result(), Err(transport));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_metadata_within_tolerance_succeeds() {
        let probe = ScriptedProbe::new(vec![missing(), missing(), missing(), done()]);
        let result = wait(&probe, PENDING, DONE, policy(5, 3600).with_tolerance(3), &CancellationToken::new()).await;

        assert!(result.is_success());
        assert_eq!(probe.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_metadata_beyond_tolerance_escalates() {
        let probe = ScriptedProbe::new(vec![missing(), missing(), missing(), missing(), done()]);
        let result = wait(&probe, PENDING, DONE, policy(5, 3600).with_tolerance(3), &CancellationToken::new()).await;

        assert_eq!(probe.calls(), 4);
        match result.error {
            Some(ClassifiedError::ToleranceExceeded { attempts, last }) => {
                assert_eq!(attempts, 4);
                assert_eq!(last.field.as_deref(), Some("/metadata/state"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn decoded_read_resets_missing_metadata_counter() {
        let probe = ScriptedProbe::new(vec![missing(), missing(), running(), missing(), missing(), done()]);
        let result = wait(&probe, PENDING, DONE, policy(5, 3600).with_tolerance(2), &CancellationToken::new()).await;

        assert!(result.is_success());
        assert_eq!(probe.calls(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_tolerance_fails_on_first_missing_read() {
        let probe = ScriptedProbe::always(missing());
        let result = wait(&probe, PENDING, DONE, policy(5, 3600).with_tolerance(0), &CancellationToken::new()).await;

        assert_eq!(probe.calls(), 1);
        assert_eq!(result.error.map(|error| error.kind()), Some(ErrorKind::ToleranceExceeded));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_before_start_makes_no_probe() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let probe = ScriptedProbe::always(running());
        let result = wait(&probe, PENDING, DONE, policy(5, 60), &cancel).await;

        assert_eq!(probe.calls(), 0);
        assert_eq!(result.outcome, WaitOutcome::Cancelled);
        assert_eq!(result.into_result(), Err(ClassifiedError::Cancelled { attempts: 0 }));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_sleep() {
        let cancel = CancellationToken::new();
        let probe = Arc::new(ScriptedProbe::always(running()));
        let task = {
            let cancel = cancel.clone();
            let probe = Arc::clone(&probe);
            tokio::spawn(async move { wait(probe.as_ref(), PENDING, DONE, policy(30, 3600), &cancel).await })
        };

        sleep(Duration::from_secs(40)).await;
        cancel.cancel();
        let result = task.await.expect("wait task");

        assert_eq!(probe.calls(), 2);
        assert_eq!(result.outcome, WaitOutcome::Cancelled);
        assert!(result.elapsed < Duration::from_secs(60), "stopped within one interval");
        let error = result.error.expect("error");
        assert_eq!(error.kind(), ErrorKind::Cancelled);
        assert_ne!(error.kind(), ErrorKind::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn engine_wait_for_uses_handle_budget() {
        let handle = OperationHandle::new("/requests/r-1/status", Duration::from_secs(2), Duration::from_secs(5)).expect("handle");
        let engine = WaitEngine::new(policy(60, 3600).with_tolerance(7));
        let probe = ScriptedProbe::always(running());
        let result = engine.wait_for(&handle, &probe, PENDING, DONE, &CancellationToken::new()).await;

        // 0s, 2s, 4s, then the deadline at 5s.
        assert_eq!(probe.calls(), 3);
        assert_eq!(result.elapsed, Duration::from_secs(5));
        assert_eq!(engine.policy().missing_metadata_tolerance, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn independent_waits_do_not_interfere() {
        let fast = ScriptedProbe::new(vec![running(), done()]);
        let slow = ScriptedProbe::new(vec![missing(), running(), running(), done()]);
        let cancel = CancellationToken::new();
        let (fast_result, slow_result) = tokio::join!(
            wait(&fast, PENDING, DONE, policy(1, 60).with_tolerance(0), &cancel),
            wait(&slow, PENDING, DONE, policy(2, 60).with_tolerance(1), &cancel),
        );

        assert!(fast_result.is_success());
        assert!(slow_result.is_success());
        assert_eq!(fast.calls(), 2);
        assert_eq!(slow.calls(), 4);
    }

    #[test]
    fn blocking_wait_runs_without_a_runtime() {
        let engine = WaitEngine::new(WaitPolicy::new(Duration::from_millis(1), Duration::from_secs(5)));
        let probe = ScriptedProbe::new(vec![running(), done()]);
        let result = engine
            .wait_blocking(&probe, PENDING, DONE, &CancellationToken::new())
            .expect("runtime");
        assert!(result.is_success());
        assert_eq!(result.attempts, 2);
    }
}
