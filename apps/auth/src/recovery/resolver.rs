//! Conflict Resolver — the effect runner behind the resolution machine.
//!
//! # Architecture
//! - `ConflictResolver` is a cheap-to-clone handle over shared state. It
//!   dispatches events through the pure reducer, then executes the returned
//!   effects: store writes, recovery cycles, and timers.
//! - Scheduled work (cycle, countdown, linger) lives in a single outstanding
//!   task handle, replaced atomically on each new schedule. Cancellation
//!   bumps a generation counter AND aborts the handle; every callback
//!   re-checks the generation before dispatching, so a stale timer can never
//!   act on a resolution that has moved on.
//! - Subscribers watch a `ResolutionView` channel for the current state,
//!   conflict record, and countdown.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Level};

use crate::errors::AuthError;
use crate::models::conflict::{ConflictRecord, ErrorInfo, ResolutionMethod};
use crate::provider::IdentityProvider;
use crate::recovery::classify::{classify, severity, FailureClass};
use crate::recovery::machine::{reduce, Effect, ResolutionEvent, ResolutionState};
use crate::recovery::oracle::{SessionOracle, Validity};
use crate::recovery::RecoveryPolicy;
use crate::store::AuthStore;

/// Read-only snapshot published to subscribers after every transition.
#[derive(Debug, Clone)]
pub struct ResolutionView {
    pub state: ResolutionState,
    pub record: Option<ConflictRecord>,
}

impl ResolutionView {
    /// Seconds left on the auto-retry countdown, for display.
    pub fn countdown(&self) -> Option<u32> {
        self.state.countdown()
    }
}

/// What a login call came back with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Signed in directly; no conflict.
    SignedIn,
    /// The provider reported a session collision; automatic recovery is now
    /// running in the background. Watch `subscribe()` for the outcome.
    RecoveryStarted,
}

struct ResolverInner {
    provider: Arc<dyn IdentityProvider>,
    oracle: SessionOracle,
    store: AuthStore,
    policy: RecoveryPolicy,
    state: Mutex<ResolutionState>,
    /// Single outstanding scheduled task (cycle, countdown, or linger).
    task: Mutex<Option<JoinHandle<()>>>,
    /// Liveness counter. Bumped on cancellation; scheduled callbacks must
    /// present the generation they were created under.
    generation: AtomicU64,
    view_tx: watch::Sender<ResolutionView>,
}

/// Handle to the resolution engine. Clones share one machine.
#[derive(Clone)]
pub struct ConflictResolver {
    inner: Arc<ResolverInner>,
}

impl ConflictResolver {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        store: AuthStore,
        policy: RecoveryPolicy,
    ) -> Self {
        let oracle = SessionOracle::new(Arc::clone(&provider));
        let (view_tx, _) = watch::channel(ResolutionView {
            state: ResolutionState::Idle,
            record: None,
        });
        Self {
            inner: Arc::new(ResolverInner {
                provider,
                oracle,
                store,
                policy,
                state: Mutex::new(ResolutionState::Idle),
                task: Mutex::new(None),
                generation: AtomicU64::new(0),
                view_tx,
            }),
        }
    }

    // ── Public surface ──────────────────────────────────────────────────────

    pub fn subscribe(&self) -> watch::Receiver<ResolutionView> {
        self.inner.view_tx.subscribe()
    }

    pub fn state(&self) -> ResolutionState {
        self.inner
            .state
            .lock()
            .expect("resolution state lock poisoned")
            .clone()
    }

    /// The in-progress flag: true while a resolution sequence owns the
    /// credential blob.
    pub fn resolution_in_progress(&self) -> bool {
        self.state().in_progress()
    }

    pub fn store(&self) -> &AuthStore {
        &self.inner.store
    }

    /// Submits a login. Any in-flight resolution is cancelled first — a new
    /// login attempt always resets the machine to `Idle` and discards the
    /// old conflict record before anything else happens.
    ///
    /// A conflict-classified failure starts automatic recovery and returns
    /// `RecoveryStarted`; every other failure propagates to the caller for a
    /// human decision.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, AuthError> {
        self.cancel();

        match self.inner.provider.sign_in(email, password).await {
            Ok(grant) => {
                info!("Signed in as {}", grant.identity.email);
                self.inner.store.set_identity(grant.identity);
                self.inner.store.set_session(grant.session);
                self.inner.store.persist_credentials();
                self.publish();
                Ok(LoginOutcome::SignedIn)
            }
            Err(err) => {
                let class = classify(&err);
                log_failure(class, &err.info());
                if class == FailureClass::ExistingSession {
                    self.start_resolution()?;
                    Ok(LoginOutcome::RecoveryStarted)
                } else {
                    Err(err)
                }
            }
        }
    }

    /// Skips a pending countdown and runs the next cycle immediately; after
    /// exhaustion, starts a fresh sequence.
    pub fn retry_now(&self) {
        self.dispatch(ResolutionEvent::RetryNow);
    }

    /// Abandons any in-flight resolution and returns the machine to `Idle`.
    pub fn cancel(&self) {
        self.dispatch(ResolutionEvent::Cancelled);
    }

    /// Full logout. Always wins over an in-flight resolution: the pending
    /// timer dies first, then identity, session, and conflict record are
    /// cleared in one step.
    pub fn logout(&self) {
        self.cancel();
        self.inner.store.logout();
        self.publish();
    }

    /// The user-conscious escape hatch after exhaustion: clear the colliding
    /// session (or every session) server-side, then try to mint a fresh one.
    /// The outcome is reported back through the machine, so subscribers see
    /// `Success` or an updated failure on the record.
    pub async fn manual_clear(&self, method: ResolutionMethod) -> Result<(), AuthError> {
        self.inner.store.set_conflict_method(method);
        info!(?method, "Manual session clear requested");

        let cleared = match method {
            ResolutionMethod::Current => self.inner.provider.clear_current_session().await,
            ResolutionMethod::All => self.inner.provider.clear_all_sessions().await,
        };
        if let Err(err) = cleared {
            let class = classify(&err);
            let info = err.info();
            log_failure(class, &info);
            self.dispatch(ResolutionEvent::CycleFailed { class, info });
            return Err(err);
        }

        match self.inner.oracle.refresh_and_validate().await {
            Ok(Validity {
                session: Some(session),
                identity: Some(identity),
                ..
            }) => {
                self.dispatch(ResolutionEvent::CycleSucceeded { identity, session });
                Ok(())
            }
            Ok(_) => Err(AuthError::SessionMissing),
            Err(err) => {
                let class = classify(&err);
                let info = err.info();
                log_failure(class, &info);
                self.dispatch(ResolutionEvent::CycleFailed { class, info });
                Err(err)
            }
        }
    }

    // ── Machine plumbing ────────────────────────────────────────────────────

    /// Starts a resolution sequence from rest. Rejected while one is in
    /// flight — two sequences must never interleave.
    fn start_resolution(&self) -> Result<(), AuthError> {
        if self.resolution_in_progress() {
            return Err(AuthError::ResolutionInProgress);
        }
        self.dispatch(ResolutionEvent::ConflictDetected);
        Ok(())
    }

    fn dispatch(&self, event: ResolutionEvent) {
        let transition = {
            let mut state = self
                .inner
                .state
                .lock()
                .expect("resolution state lock poisoned");
            let transition = reduce(&state, event, &self.inner.policy);
            *state = transition.next.clone();
            transition
        };
        for effect in transition.effects {
            self.run_effect(effect);
        }
        self.publish();
    }

    /// Dispatches only if the callback's generation is still current — the
    /// defensive double-check for timers that were cancelled but already in
    /// flight.
    fn dispatch_if_current(&self, generation: u64, event: ResolutionEvent) {
        if self.inner.generation.load(Ordering::SeqCst) == generation {
            self.dispatch(event);
        } else {
            debug!("Dropping stale scheduled event: {event:?}");
        }
    }

    fn run_effect(&self, effect: Effect) {
        match effect {
            Effect::RecordStart => self.inner.store.record_conflict_start(),
            Effect::StartCycle {
                attempt,
                destructive,
            } => self.spawn_cycle(attempt, destructive),
            Effect::StartCountdown { seconds } => self.spawn_countdown(seconds),
            Effect::CancelTimer => self.cancel_scheduled(),
            Effect::RecordSuccess { identity, session } => {
                info!("Session conflict resolved for {}", identity.email);
                self.inner.store.set_identity(identity);
                self.inner.store.set_session(session);
                self.inner.store.persist_credentials();
                self.inner.store.record_conflict_resolved();
            }
            Effect::RecordFailure { class, info } => {
                log_failure(class, &info);
                self.inner.store.record_conflict_failed(class.into(), info);
            }
            Effect::ScheduleLinger => self.spawn_linger(),
            Effect::DiscardRecord => self.inner.store.clear_conflict_record(),
        }
    }

    // ── Scheduled tasks ─────────────────────────────────────────────────────

    fn cancel_scheduled(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = self.inner.task.lock().expect("task lock poisoned").take() {
            handle.abort();
        }
    }

    /// Installs the new outstanding task. The previous one is finished or
    /// finishing; if it somehow is not, its callbacks fail the generation
    /// check and die quietly.
    fn replace_task(&self, handle: JoinHandle<()>) {
        *self.inner.task.lock().expect("task lock poisoned") = Some(handle);
    }

    fn stale(&self, generation: u64) -> bool {
        self.inner.generation.load(Ordering::SeqCst) != generation
    }

    fn spawn_cycle(&self, attempt: u32, destructive: bool) {
        let generation = self.inner.generation.load(Ordering::SeqCst);
        let resolver = self.clone();
        let handle = tokio::spawn(async move {
            resolver.run_cycle(attempt, destructive, generation).await;
        });
        self.replace_task(handle);
    }

    fn spawn_countdown(&self, seconds: u32) {
        let generation = self.inner.generation.load(Ordering::SeqCst);
        let resolver = self.clone();
        let handle = tokio::spawn(async move {
            for _ in 0..seconds {
                tokio::time::sleep(Duration::from_secs(1)).await;
                if resolver.stale(generation) {
                    return;
                }
                resolver.dispatch(ResolutionEvent::Tick);
            }
        });
        self.replace_task(handle);
    }

    fn spawn_linger(&self) {
        let generation = self.inner.generation.load(Ordering::SeqCst);
        let linger = self.inner.policy.success_linger;
        let resolver = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(linger).await;
            resolver.dispatch_if_current(generation, ResolutionEvent::LingerElapsed);
        });
        self.replace_task(handle);
    }

    /// One recovery cycle: validate → (clear → settle →) refresh.
    async fn run_cycle(&self, attempt: u32, destructive: bool, generation: u64) {
        info!(attempt, "Starting conflict recovery cycle");

        // (a) Oracle first. A session that is actually fine must never be
        // torn down — zero destructive calls on a healthy session.
        match self.inner.oracle.check_validity().await {
            Ok(validity) if validity.valid => {
                if let (Some(identity), Some(session)) = (validity.identity, validity.session) {
                    info!(attempt, "Stored session is already valid; recovery complete");
                    self.dispatch_if_current(
                        generation,
                        ResolutionEvent::CycleSucceeded { identity, session },
                    );
                    return;
                }
            }
            Ok(validity) => debug!(
                reason = validity.reason.as_deref().unwrap_or("unspecified"),
                "Stored session unusable; continuing recovery"
            ),
            Err(err) => warn!("Validity probe failed: {err}"),
        }

        if self.stale(generation) {
            return;
        }

        if destructive {
            // (b) Drop the local credential blob before asking for a fresh
            // session, then (c) give the provider time to settle.
            self.inner.store.clear_credentials();
            tokio::time::sleep(self.inner.policy.settle_delay).await;
            if self.stale(generation) {
                return;
            }
        }

        // (d) Ask the provider to mint a fresh session.
        match self.inner.oracle.refresh_and_validate().await {
            Ok(Validity {
                session: Some(session),
                identity: Some(identity),
                ..
            }) => {
                self.dispatch_if_current(
                    generation,
                    ResolutionEvent::CycleSucceeded { identity, session },
                );
            }
            Ok(_) => {
                let err = AuthError::SessionMissing;
                self.dispatch_if_current(
                    generation,
                    ResolutionEvent::CycleFailed {
                        class: classify(&err),
                        info: err.info(),
                    },
                );
            }
            Err(err) => {
                let class = classify(&err);
                self.dispatch_if_current(
                    generation,
                    ResolutionEvent::CycleFailed {
                        class,
                        info: err.info(),
                    },
                );
            }
        }
    }

    fn publish(&self) {
        let view = ResolutionView {
            state: self.state(),
            record: self.inner.store.conflict_record(),
        };
        self.inner.view_tx.send_replace(view);
    }
}

fn log_failure(class: FailureClass, info: &ErrorInfo) {
    let level = severity(class);
    if level == Level::ERROR {
        error!(code = %info.code, class = ?class, "{}", info.message);
    } else if level == Level::WARN {
        warn!(code = %info.code, class = ?class, "{}", info.message);
    } else {
        info!(code = %info.code, class = ?class, "{}", info.message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering as AtomicOrdering;

    use crate::models::conflict::ConflictCategory;
    use crate::provider::fake::{
        clear_failed_error, existing_session_error, make_grant, unauthorized_error, FakeProvider,
    };
    use crate::store::persist::CredentialCache;

    fn make_resolver(provider: &Arc<FakeProvider>, dir: &tempfile::TempDir) -> ConflictResolver {
        let cache = CredentialCache::new(dir.path().join("session.json"));
        let store = AuthStore::new(cache);
        ConflictResolver::new(
            Arc::clone(provider) as Arc<dyn IdentityProvider>,
            store,
            RecoveryPolicy::default(),
        )
    }

    /// Waits until the published view satisfies the predicate. The paused
    /// test clock auto-advances through settle delays and countdowns.
    async fn wait_until(
        rx: &mut watch::Receiver<ResolutionView>,
        mut pred: impl FnMut(&ResolutionView) -> bool,
    ) -> ResolutionView {
        loop {
            {
                let view = rx.borrow();
                if pred(&view) {
                    return view.clone();
                }
            }
            tokio::time::timeout(Duration::from_secs(300), rx.changed())
                .await
                .expect("timed out waiting for resolution view")
                .expect("resolver dropped");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_login_signs_in_without_recovery() {
        let provider = Arc::new(FakeProvider::new());
        let dir = tempfile::tempdir().unwrap();
        let resolver = make_resolver(&provider, &dir);

        let outcome = resolver.login("ada@example.com", "pw").await.unwrap();
        assert_eq!(outcome, LoginOutcome::SignedIn);
        assert_eq!(resolver.state(), ResolutionState::Idle);
        assert!(resolver.store().session().is_some());
        assert!(resolver.store().conflict_record().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unauthorized_login_goes_to_manual_path_without_attempts() {
        let provider = Arc::new(FakeProvider::new());
        provider.push_sign_in(Err(unauthorized_error()));
        let dir = tempfile::tempdir().unwrap();
        let resolver = make_resolver(&provider, &dir);

        let err = resolver.login("ada@example.com", "pw").await.unwrap_err();
        assert_eq!(classify(&err), FailureClass::Unauthorized);
        // No record, no attempt counter, no background recovery.
        assert_eq!(resolver.state(), ResolutionState::Idle);
        assert!(resolver.store().conflict_record().is_none());
        assert_eq!(provider.session_calls.load(AtomicOrdering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_healthy_session_short_circuits_with_zero_destructive_calls() {
        let provider = Arc::new(FakeProvider::new());
        provider.push_sign_in(Err(existing_session_error()));
        provider.push_session(Ok(make_grant("ada@example.com")));
        let dir = tempfile::tempdir().unwrap();
        let resolver = make_resolver(&provider, &dir);
        // Seed a persisted blob so a destructive clear would be visible.
        let grant = make_grant("ada@example.com");
        resolver.store().set_identity(grant.identity);
        resolver.store().set_session(grant.session);
        resolver.store().persist_credentials();
        let cache = CredentialCache::new(dir.path().join("session.json"));

        let mut rx = resolver.subscribe();
        let outcome = resolver.login("ada@example.com", "pw").await.unwrap();
        assert_eq!(outcome, LoginOutcome::RecoveryStarted);

        wait_until(&mut rx, |v| v.state == ResolutionState::Success).await;
        assert_eq!(
            provider.refresh_calls.load(AtomicOrdering::SeqCst),
            0,
            "no refresh on a healthy session"
        );
        assert!(cache.exists(), "no clear on a healthy session");
        assert!(resolver.store().session().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_recovery_clears_then_refreshes() {
        let provider = Arc::new(FakeProvider::new());
        provider.push_sign_in(Err(existing_session_error()));
        // Oracle probe finds nothing usable; refresh mints a session.
        provider.push_refresh(Ok(make_grant("ada@example.com")));
        let dir = tempfile::tempdir().unwrap();
        let resolver = make_resolver(&provider, &dir);

        let mut rx = resolver.subscribe();
        resolver.login("ada@example.com", "pw").await.unwrap();

        let mut saw_resolved = false;
        let final_view = wait_until(&mut rx, |v| {
            if v.record.as_ref().map_or(false, |r| r.resolved) {
                saw_resolved = true;
            }
            v.state == ResolutionState::Success && v.record.is_none()
        })
        .await;

        assert!(saw_resolved, "record must be visible as resolved before dismissal");
        assert_eq!(final_view.state, ResolutionState::Success);
        assert!(resolver.store().session().is_some());
        assert!(resolver.store().identity().is_some());
        assert_eq!(provider.refresh_calls.load(AtomicOrdering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_failed_cycles_exhaust_with_attempts_at_budget() {
        let provider = Arc::new(FakeProvider::new());
        provider.push_sign_in(Err(existing_session_error()));
        for _ in 0..3 {
            provider.push_refresh(Err(existing_session_error()));
        }
        let dir = tempfile::tempdir().unwrap();
        let resolver = make_resolver(&provider, &dir);

        let mut rx = resolver.subscribe();
        resolver.login("ada@example.com", "pw").await.unwrap();

        let view = wait_until(&mut rx, |v| v.state == ResolutionState::Exhausted).await;
        let record = view.record.expect("record survives exhaustion");
        assert_eq!(record.attempts, 3);
        assert!(!record.resolved);
        assert_eq!(provider.refresh_calls.load(AtomicOrdering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_all_failure_exhausts_on_first_occurrence() {
        let provider = Arc::new(FakeProvider::new());
        provider.push_sign_in(Err(existing_session_error()));
        provider.push_refresh(Err(clear_failed_error()));
        let dir = tempfile::tempdir().unwrap();
        let resolver = make_resolver(&provider, &dir);

        let mut rx = resolver.subscribe();
        resolver.login("ada@example.com", "pw").await.unwrap();

        let view = wait_until(&mut rx, |v| v.state == ResolutionState::Exhausted).await;
        let record = view.record.unwrap();
        assert_eq!(record.attempts, 1, "never auto-retried");
        assert_eq!(record.category, ConflictCategory::AllSessionsClearFailed);
        assert_eq!(provider.refresh_calls.load(AtomicOrdering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_countdown_defuses_the_timer() {
        let provider = Arc::new(FakeProvider::new());
        provider.push_sign_in(Err(existing_session_error()));
        provider.push_refresh(Err(existing_session_error()));
        let dir = tempfile::tempdir().unwrap();
        let resolver = make_resolver(&provider, &dir);

        let mut rx = resolver.subscribe();
        resolver.login("ada@example.com", "pw").await.unwrap();
        wait_until(&mut rx, |v| {
            matches!(v.state, ResolutionState::AwaitingRetry { .. })
        })
        .await;
        let refreshes_before = provider.refresh_calls.load(AtomicOrdering::SeqCst);

        resolver.cancel();
        assert_eq!(resolver.state(), ResolutionState::Idle);
        assert!(resolver.store().conflict_record().is_none());

        // Sail far past the countdown deadline; the cancelled timer must
        // never fire another cycle.
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(
            provider.refresh_calls.load(AtomicOrdering::SeqCst),
            refreshes_before,
            "no cycle may run after cancellation"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_login_during_countdown_cancels_and_starts_fresh() {
        let provider = Arc::new(FakeProvider::new());
        provider.push_sign_in(Err(existing_session_error()));
        provider.push_refresh(Err(existing_session_error()));
        let dir = tempfile::tempdir().unwrap();
        let resolver = make_resolver(&provider, &dir);

        let mut rx = resolver.subscribe();
        resolver.login("ada@example.com", "pw").await.unwrap();
        wait_until(&mut rx, |v| {
            matches!(v.state, ResolutionState::AwaitingRetry { .. })
        })
        .await;

        // Second submission: default script signs straight in.
        let outcome = resolver.login("ada@example.com", "pw").await.unwrap();
        assert_eq!(outcome, LoginOutcome::SignedIn);
        assert_eq!(resolver.state(), ResolutionState::Idle);
        assert!(resolver.store().conflict_record().is_none());

        let refreshes = provider.refresh_calls.load(AtomicOrdering::SeqCst);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(
            provider.refresh_calls.load(AtomicOrdering::SeqCst),
            refreshes,
            "the superseded countdown must stay dead"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribers_observe_countdown_decrements() {
        let provider = Arc::new(FakeProvider::new());
        provider.push_sign_in(Err(existing_session_error()));
        provider.push_refresh(Err(existing_session_error()));
        let dir = tempfile::tempdir().unwrap();
        let resolver = make_resolver(&provider, &dir);

        let mut rx = resolver.subscribe();
        resolver.login("ada@example.com", "pw").await.unwrap();

        // The countdown starts at the policy default and ticks down second
        // by second; each value is published for display.
        let view = wait_until(&mut rx, |v| v.countdown() == Some(5)).await;
        assert!(matches!(view.state, ResolutionState::AwaitingRetry { .. }));
        wait_until(&mut rx, |v| v.countdown() == Some(4)).await;
        wait_until(&mut rx, |v| v.countdown() == Some(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_now_runs_the_next_cycle() {
        let provider = Arc::new(FakeProvider::new());
        provider.push_sign_in(Err(existing_session_error()));
        provider.push_refresh(Err(existing_session_error()));
        provider.push_refresh(Ok(make_grant("ada@example.com")));
        let dir = tempfile::tempdir().unwrap();
        let resolver = make_resolver(&provider, &dir);

        let mut rx = resolver.subscribe();
        resolver.login("ada@example.com", "pw").await.unwrap();
        wait_until(&mut rx, |v| {
            matches!(v.state, ResolutionState::AwaitingRetry { .. })
        })
        .await;

        resolver.retry_now();
        wait_until(&mut rx, |v| v.state == ResolutionState::Success).await;
        assert_eq!(provider.refresh_calls.load(AtomicOrdering::SeqCst), 2);
        assert!(resolver.store().session().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_wins_over_inflight_resolution() {
        let provider = Arc::new(FakeProvider::new());
        provider.push_sign_in(Err(existing_session_error()));
        provider.push_refresh(Err(existing_session_error()));
        let dir = tempfile::tempdir().unwrap();
        let resolver = make_resolver(&provider, &dir);

        let mut rx = resolver.subscribe();
        resolver.login("ada@example.com", "pw").await.unwrap();
        wait_until(&mut rx, |v| {
            matches!(v.state, ResolutionState::AwaitingRetry { .. })
        })
        .await;

        resolver.logout();
        assert!(resolver.store().identity().is_none());
        assert!(resolver.store().session().is_none());
        assert!(resolver.store().conflict_record().is_none());
        assert_eq!(resolver.state(), ResolutionState::Idle);

        let refreshes = provider.refresh_calls.load(AtomicOrdering::SeqCst);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(provider.refresh_calls.load(AtomicOrdering::SeqCst), refreshes);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_resolution_start_is_rejected() {
        let provider = Arc::new(FakeProvider::new());
        provider.push_sign_in(Err(existing_session_error()));
        provider.push_refresh(Err(existing_session_error()));
        let dir = tempfile::tempdir().unwrap();
        let resolver = make_resolver(&provider, &dir);

        let mut rx = resolver.subscribe();
        resolver.login("ada@example.com", "pw").await.unwrap();
        wait_until(&mut rx, |v| {
            matches!(v.state, ResolutionState::AwaitingRetry { .. })
        })
        .await;

        let err = resolver.start_resolution().unwrap_err();
        assert!(matches!(err, AuthError::ResolutionInProgress));
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_clear_all_failure_is_recorded_and_stays_exhausted() {
        let provider = Arc::new(FakeProvider::new());
        provider.push_sign_in(Err(existing_session_error()));
        provider.push_refresh(Err(clear_failed_error()));
        let dir = tempfile::tempdir().unwrap();
        let resolver = make_resolver(&provider, &dir);

        let mut rx = resolver.subscribe();
        resolver.login("ada@example.com", "pw").await.unwrap();
        wait_until(&mut rx, |v| v.state == ResolutionState::Exhausted).await;

        provider.push_clear_all(Err(clear_failed_error()));
        let err = resolver
            .manual_clear(ResolutionMethod::All)
            .await
            .unwrap_err();
        assert_eq!(classify(&err), FailureClass::AllSessionsClearFailed);

        let record = resolver.store().conflict_record().unwrap();
        assert_eq!(record.method, Some(ResolutionMethod::All));
        assert_eq!(record.category, ConflictCategory::AllSessionsClearFailed);
        assert_eq!(resolver.state(), ResolutionState::Exhausted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_clear_then_refresh_recovers_after_exhaustion() {
        let provider = Arc::new(FakeProvider::new());
        provider.push_sign_in(Err(existing_session_error()));
        provider.push_refresh(Err(clear_failed_error()));
        let dir = tempfile::tempdir().unwrap();
        let resolver = make_resolver(&provider, &dir);

        let mut rx = resolver.subscribe();
        resolver.login("ada@example.com", "pw").await.unwrap();
        wait_until(&mut rx, |v| v.state == ResolutionState::Exhausted).await;

        provider.push_refresh(Ok(make_grant("ada@example.com")));
        resolver.manual_clear(ResolutionMethod::All).await.unwrap();

        wait_until(&mut rx, |v| v.state == ResolutionState::Success).await;
        assert!(resolver.store().session().is_some());
        assert_eq!(provider.clear_all_calls.load(AtomicOrdering::SeqCst), 1);
    }
}
