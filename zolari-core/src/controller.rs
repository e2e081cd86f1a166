//! Application controller: owns session and result state and runs the
//! periodic refresh loop.
//!
//! State is published through a `watch` channel so views re-render on every
//! change. Each session gets a generation number; a fetch started under an
//! older generation never touches the state, which is how responses that
//! arrive after logout are dropped. Overlapping fetches within one session are
//! ordered by a request sequence number and a response older than the last
//! applied one is discarded.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::DEFAULT_REFRESH_INTERVAL_SECS;
use crate::error::{AuthError, SubmissionError};
use crate::research::{ResultFetcher, SubmissionGateway};
use crate::session::Authenticator;
use crate::types::{ResearchDraft, ResearchResult, UserProfile};

pub const AUTH_FAILED_MESSAGE: &str = "Authentication process failed.";
pub const RESULTS_FAILED_MESSAGE: &str = "Could not load research results. Please try again later.";
pub const LOGIN_FAILED_MESSAGE: &str = "Login failed. Please try again.";
pub const LOGOUT_FAILED_MESSAGE: &str = "Logout failed. Please try again.";

/// How long the inline submission message stays up.
pub const FORM_MESSAGE_TTL: Duration = Duration::from_secs(3);

/// Where the user stands with the identity provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AuthState {
    /// Session status not yet known.
    #[default]
    Loading,
    Anonymous,
    Authenticated(UserProfile),
}

/// Outcome of the last form submission, shown inline under the form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormMessage {
    Submitted,
    Failed,
}

impl FormMessage {
    pub fn text(&self) -> &'static str {
        match self {
            FormMessage::Submitted => "Research request submitted successfully!",
            FormMessage::Failed => "Submission failed. Please try again.",
        }
    }
}

/// Snapshot of everything the views render.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppState {
    pub auth: AuthState,
    /// Exactly the last successfully fetched list, or empty.
    pub results: Vec<ResearchResult>,
    pub results_loading: bool,
    /// Banner text.
    pub error: Option<String>,
    pub form_message: Option<FormMessage>,
}

impl AppState {
    pub fn profile(&self) -> Option<&UserProfile> {
        match &self.auth {
            AuthState::Authenticated(profile) => Some(profile),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.auth, AuthState::Authenticated(_))
    }

    /// The email research requests are filed under, if signed in with one.
    pub fn email(&self) -> Option<&str> {
        self.profile()
            .filter(|p| p.has_email())
            .map(|p| p.email.as_str())
    }
}

struct Shared {
    fetcher: Arc<dyn ResultFetcher>,
    state: watch::Sender<AppState>,
    generation: AtomicU64,
    next_seq: AtomicU64,
    applied_seq: AtomicU64,
    form_seq: AtomicU64,
}

impl Shared {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// One fetch, applied only if the session and ordering still allow it.
    async fn fetch_results(&self, generation: u64, email: &str) {
        // Checked under the state lock so a concurrent logout cannot be
        // overwritten with a loading flag.
        let mut issued = None;
        self.state.send_if_modified(|state| {
            if !self.is_current(generation) {
                return false;
            }
            issued = Some(self.next_seq.fetch_add(1, Ordering::SeqCst) + 1);
            let changed = !state.results_loading;
            state.results_loading = true;
            changed
        });
        let Some(seq) = issued else {
            return;
        };

        let outcome = self.fetcher.fetch_results(email).await;
        match &outcome {
            Ok(results) => debug!(seq, count = results.len(), "Research results fetched"),
            Err(e) => warn!(seq, error = %e, "Failed to fetch research results"),
        }

        self.state.send_if_modified(|state| {
            if !self.is_current(generation) {
                debug!(seq, generation, "Discarding results from an ended session");
                return false;
            }
            let applied = self.applied_seq.load(Ordering::SeqCst);
            if seq < applied {
                debug!(seq, applied, "Discarding out-of-order results");
                return false;
            }
            self.applied_seq.store(seq, Ordering::SeqCst);
            state.results_loading = self.next_seq.load(Ordering::SeqCst) != seq;
            match outcome {
                Ok(results) => {
                    state.results = results;
                    state.error = None;
                }
                Err(_) => state.error = Some(RESULTS_FAILED_MESSAGE.to_string()),
            }
            true
        });
    }

    /// Show `message` under the form and clear it after [`FORM_MESSAGE_TTL`],
    /// unless a newer message or another session replaced it first.
    fn show_form_message(self: &Arc<Self>, generation: u64, message: FormMessage) {
        let ticket = self.form_seq.fetch_add(1, Ordering::SeqCst) + 1;
        self.state
            .send_modify(|state| state.form_message = Some(message));

        let shared = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(FORM_MESSAGE_TTL).await;
            shared.state.send_if_modified(|state| {
                if !shared.is_current(generation)
                    || shared.form_seq.load(Ordering::SeqCst) != ticket
                {
                    return false;
                }
                state.form_message.take().is_some()
            });
        });
    }
}

/// Background task that refetches on a fixed cadence until cancelled.
struct RefreshLoop {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl RefreshLoop {
    fn spawn(shared: Arc<Shared>, generation: u64, email: String, period: Duration) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        debug!(generation, "Refresh loop cancelled");
                        break;
                    }
                    _ = ticker.tick() => shared.fetch_results(generation, &email).await,
                }
            }
        });
        info!(generation, period_secs = period.as_secs(), "Refresh loop started");
        Self { cancel, handle }
    }

    fn stop(self) -> JoinHandle<()> {
        self.cancel.cancel();
        self.handle
    }
}

/// Wires the session manager into result fetching and submission.
pub struct AppController {
    auth: Arc<dyn Authenticator>,
    gateway: Arc<dyn SubmissionGateway>,
    shared: Arc<Shared>,
    refresh: Mutex<Option<RefreshLoop>>,
    interval: Duration,
}

impl AppController {
    pub fn new(
        auth: Arc<dyn Authenticator>,
        fetcher: Arc<dyn ResultFetcher>,
        gateway: Arc<dyn SubmissionGateway>,
    ) -> Self {
        let (state, _) = watch::channel(AppState::default());
        Self {
            auth,
            gateway,
            shared: Arc::new(Shared {
                fetcher,
                state,
                generation: AtomicU64::new(0),
                next_seq: AtomicU64::new(0),
                applied_seq: AtomicU64::new(0),
                form_seq: AtomicU64::new(0),
            }),
            refresh: Mutex::new(None),
            interval: Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECS),
        }
    }

    /// Override the 30-second refresh cadence.
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<AppState> {
        self.shared.state.subscribe()
    }

    pub fn snapshot(&self) -> AppState {
        self.shared.state.borrow().clone()
    }

    /// Resolve the session at startup, consuming a login redirect in
    /// `location` if there is one. Returns the location with the
    /// authorization response stripped when a redirect was consumed.
    pub async fn start(&self, location: Option<&Url>) -> Option<Url> {
        self.end_session();
        self.shared.state.send_modify(|state| state.auth = AuthState::Loading);

        match self.resolve_session(location).await {
            Ok((normalized, Some(profile))) => {
                self.enter_session(profile).await;
                normalized
            }
            Ok((normalized, None)) => {
                self.shared
                    .state
                    .send_modify(|state| state.auth = AuthState::Anonymous);
                normalized
            }
            Err(e) => {
                warn!(error = %e, "Authentication failed");
                self.shared.state.send_modify(|state| {
                    state.auth = AuthState::Anonymous;
                    state.error = Some(AUTH_FAILED_MESSAGE.to_string());
                });
                None
            }
        }
    }

    async fn resolve_session(
        &self,
        location: Option<&Url>,
    ) -> Result<(Option<Url>, Option<UserProfile>), AuthError> {
        let normalized = match location {
            Some(location) => self.auth.complete_redirect_if_present(location).await?,
            None => None,
        };
        if !self.auth.is_authenticated().await? {
            return Ok((normalized, None));
        }
        let profile = self.auth.profile().await?.unwrap_or_default();
        Ok((normalized, Some(profile)))
    }

    async fn enter_session(&self, profile: UserProfile) {
        let generation = self.shared.generation.load(Ordering::SeqCst);
        let email = profile.has_email().then(|| profile.email.clone());
        info!(generation, has_email = email.is_some(), "Session started");
        self.shared
            .state
            .send_modify(|state| state.auth = AuthState::Authenticated(profile));

        let Some(email) = email else {
            return;
        };
        self.shared.fetch_results(generation, &email).await;

        let mut refresh = self.lock_refresh();
        if self.shared.is_current(generation) && refresh.is_none() {
            *refresh = Some(RefreshLoop::spawn(
                self.shared.clone(),
                generation,
                email,
                self.interval,
            ));
        }
    }

    /// Cancel the refresh loop and bump the generation so that in-flight
    /// responses are dropped. Returns the loop's handle if one was running.
    fn end_session(&self) -> Option<JoinHandle<()>> {
        let mut refresh = self.lock_refresh();
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        refresh.take().map(RefreshLoop::stop)
    }

    fn lock_refresh(&self) -> std::sync::MutexGuard<'_, Option<RefreshLoop>> {
        self.refresh.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// URL of the hosted login page.
    pub async fn login(&self) -> Result<Url, AuthError> {
        self.auth.login().await.inspect_err(|e| {
            warn!(error = %e, "Login failed");
            self.shared
                .state
                .send_modify(|state| state.error = Some(LOGIN_FAILED_MESSAGE.to_string()));
        })
    }

    /// End the session locally and return the provider's logout URL.
    ///
    /// The refresh loop stops and results clear even if the stored session
    /// cannot be removed; that failure is reported through the banner.
    pub async fn logout(&self) -> Result<Url, AuthError> {
        self.end_session();
        self.shared.state.send_modify(|state| {
            state.auth = AuthState::Anonymous;
            state.results.clear();
            state.results_loading = false;
            state.error = None;
            state.form_message = None;
        });
        info!("Session ended");
        self.auth.logout().await.inspect_err(|e| {
            warn!(error = %e, "Logout failed");
            self.shared
                .state
                .send_modify(|state| state.error = Some(LOGOUT_FAILED_MESSAGE.to_string()));
        })
    }

    /// Submit the draft under the current user's email. On success the draft
    /// is reset and one fetch runs straight away.
    pub async fn submit(&self, draft: &mut ResearchDraft) -> Result<(), SubmissionError> {
        if !draft.has_topic() {
            return Err(SubmissionError::EmptyTopic);
        }
        let generation = self.shared.generation.load(Ordering::SeqCst);
        let Some(email) = self.snapshot().email().map(str::to_string) else {
            return Err(SubmissionError::NotSignedIn);
        };
        self.shared.form_seq.fetch_add(1, Ordering::SeqCst);
        self.shared
            .state
            .send_if_modified(|state| state.form_message.take().is_some());

        let payload = draft.clone().into_payload(email.clone());
        if !self.gateway.submit(&payload).await {
            self.shared
                .show_form_message(generation, FormMessage::Failed);
            return Err(SubmissionError::Rejected);
        }

        draft.reset();
        self.shared
            .show_form_message(generation, FormMessage::Submitted);
        self.shared.fetch_results(generation, &email).await;
        Ok(())
    }

    /// Fetch out of schedule. No-op without a signed-in email.
    pub async fn refresh_now(&self) {
        let generation = self.shared.generation.load(Ordering::SeqCst);
        let Some(email) = self.snapshot().email().map(str::to_string) else {
            return;
        };
        self.shared.fetch_results(generation, &email).await;
    }

    /// Stop the refresh loop and wait for it to exit.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.end_session() {
            let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
        }
        debug!("Controller shut down");
    }
}

impl Drop for AppController {
    fn drop(&mut self) {
        if let Some(refresh) = self.lock_refresh().take() {
            refresh.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::types::{ResearchRequestPayload, ResearchStatus};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    struct MockAuth {
        signed_in: AtomicBool,
        profile: UserProfile,
        fail_redirect: bool,
        fail_login: bool,
        fail_logout: bool,
    }

    impl MockAuth {
        fn signed_in(email: &str) -> Self {
            Self {
                signed_in: AtomicBool::new(true),
                profile: UserProfile::with_email(email),
                fail_redirect: false,
                fail_login: false,
                fail_logout: false,
            }
        }

        fn anonymous() -> Self {
            Self {
                signed_in: AtomicBool::new(false),
                ..Self::signed_in("a@b.com")
            }
        }
    }

    #[async_trait]
    impl Authenticator for MockAuth {
        async fn complete_redirect_if_present(
            &self,
            location: &Url,
        ) -> Result<Option<Url>, AuthError> {
            if location.query().is_none() {
                return Ok(None);
            }
            if self.fail_redirect {
                return Err(AuthError::StateMismatch);
            }
            self.signed_in.store(true, Ordering::SeqCst);
            let mut clean = location.clone();
            clean.set_query(None);
            Ok(Some(clean))
        }

        async fn is_authenticated(&self) -> Result<bool, AuthError> {
            Ok(self.signed_in.load(Ordering::SeqCst))
        }

        async fn profile(&self) -> Result<Option<UserProfile>, AuthError> {
            Ok(self
                .signed_in
                .load(Ordering::SeqCst)
                .then(|| self.profile.clone()))
        }

        async fn login(&self) -> Result<Url, AuthError> {
            if self.fail_login {
                return Err(AuthError::InvalidUrl {
                    message: "bad domain".into(),
                });
            }
            Ok(Url::parse("https://idp.test/authorize").unwrap())
        }

        async fn logout(&self) -> Result<Url, AuthError> {
            if self.fail_logout {
                return Err(AuthError::Storage {
                    message: "keychain locked".into(),
                });
            }
            self.signed_in.store(false, Ordering::SeqCst);
            Ok(Url::parse("https://idp.test/v2/logout").unwrap())
        }
    }

    /// Replies from a script of (delay, outcome); an empty script yields `fallback`.
    #[derive(Default)]
    struct ScriptedFetcher {
        calls: AtomicUsize,
        script: Mutex<VecDeque<(Duration, Result<Vec<ResearchResult>, u16>)>>,
        fallback: Vec<ResearchResult>,
    }

    impl ScriptedFetcher {
        fn returning(fallback: Vec<ResearchResult>) -> Self {
            Self {
                fallback,
                ..Default::default()
            }
        }

        fn then(self, delay: Duration, outcome: Result<Vec<ResearchResult>, u16>) -> Self {
            self.script.lock().unwrap().push_back((delay, outcome));
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ResultFetcher for ScriptedFetcher {
        async fn fetch_results(&self, _email: &str) -> Result<Vec<ResearchResult>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            let (delay, outcome) = next.unwrap_or((Duration::ZERO, Ok(self.fallback.clone())));
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            outcome.map_err(|status| FetchError::Server {
                status,
                body: "boom".into(),
            })
        }
    }

    struct MockGateway {
        accept: bool,
        submitted: Mutex<Vec<ResearchRequestPayload>>,
    }

    impl MockGateway {
        fn new(accept: bool) -> Self {
            Self {
                accept,
                submitted: Mutex::new(vec![]),
            }
        }
    }

    #[async_trait]
    impl SubmissionGateway for MockGateway {
        async fn submit(&self, payload: &ResearchRequestPayload) -> bool {
            self.submitted.lock().unwrap().push(payload.clone());
            self.accept
        }
    }

    fn result(id: &str, status: ResearchStatus) -> ResearchResult {
        ResearchResult {
            id: id.into(),
            topic: format!("topic {}", id),
            status,
            progress: None,
            time_remaining: None,
            completed_at: None,
            pdf_url: None,
        }
    }

    fn controller(
        auth: MockAuth,
        fetcher: &Arc<ScriptedFetcher>,
        gateway: &Arc<MockGateway>,
    ) -> AppController {
        AppController::new(Arc::new(auth), fetcher.clone(), gateway.clone())
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_authenticated_fetches_and_polls() {
        let fetcher = Arc::new(ScriptedFetcher::returning(vec![result(
            "1",
            ResearchStatus::Completed,
        )]));
        let gateway = Arc::new(MockGateway::new(true));
        let c = controller(MockAuth::signed_in("a@b.com"), &fetcher, &gateway);

        assert_eq!(c.start(None).await, None);
        let state = c.snapshot();
        assert_eq!(state.email(), Some("a@b.com"));
        assert_eq!(state.results.len(), 1);
        assert!(!state.results_loading);
        assert_eq!(fetcher.calls(), 1);

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(fetcher.calls(), 1);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fetcher.calls(), 2);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(fetcher.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_anonymous_does_not_fetch() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let gateway = Arc::new(MockGateway::new(true));
        let c = controller(MockAuth::anonymous(), &fetcher, &gateway);

        c.start(None).await;
        assert_eq!(c.snapshot().auth, AuthState::Anonymous);
        tokio::time::sleep(Duration::from_secs(90)).await;
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_without_email_does_not_fetch() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let gateway = Arc::new(MockGateway::new(true));
        let c = controller(MockAuth::signed_in(""), &fetcher, &gateway);

        c.start(None).await;
        assert!(c.snapshot().is_authenticated());
        tokio::time::sleep(Duration::from_secs(90)).await;
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_start_consumes_redirect() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let gateway = Arc::new(MockGateway::new(true));
        let c = controller(MockAuth::anonymous(), &fetcher, &gateway);

        let location = Url::parse("http://localhost:8844/?code=abc&state=xyz").unwrap();
        let normalized = c.start(Some(&location)).await;
        assert_eq!(normalized.unwrap().as_str(), "http://localhost:8844/");
        assert!(c.snapshot().is_authenticated());
    }

    #[tokio::test]
    async fn test_start_auth_failure_sets_banner() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let gateway = Arc::new(MockGateway::new(true));
        let auth = MockAuth {
            fail_redirect: true,
            ..MockAuth::anonymous()
        };
        let c = controller(auth, &fetcher, &gateway);

        let location = Url::parse("http://localhost:8844/?code=abc&state=xyz").unwrap();
        assert_eq!(c.start(Some(&location)).await, None);
        let state = c.snapshot();
        assert_eq!(state.auth, AuthState::Anonymous);
        assert_eq!(state.error.as_deref(), Some(AUTH_FAILED_MESSAGE));
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_previous_list() {
        let fetcher = Arc::new(
            ScriptedFetcher::default()
                .then(Duration::ZERO, Ok(vec![result("1", ResearchStatus::InProgress)]))
                .then(Duration::ZERO, Err(500)),
        );
        let gateway = Arc::new(MockGateway::new(true));
        let c = controller(MockAuth::signed_in("a@b.com"), &fetcher, &gateway);

        c.start(None).await;
        assert_eq!(c.snapshot().results.len(), 1);

        c.refresh_now().await;
        let state = c.snapshot();
        assert_eq!(state.results.len(), 1);
        assert_eq!(state.error.as_deref(), Some(RESULTS_FAILED_MESSAGE));

        // The next success clears the banner and replaces the list.
        c.refresh_now().await;
        let state = c.snapshot();
        assert!(state.results.is_empty());
        assert_eq!(state.error, None);
    }

    #[tokio::test]
    async fn test_first_fetch_failure_leaves_empty_list() {
        let fetcher = Arc::new(ScriptedFetcher::default().then(Duration::ZERO, Err(500)));
        let gateway = Arc::new(MockGateway::new(true));
        let c = controller(MockAuth::signed_in("a@b.com"), &fetcher, &gateway);

        c.start(None).await;
        let state = c.snapshot();
        assert!(state.is_authenticated());
        assert!(state.results.is_empty());
        assert_eq!(state.error.as_deref(), Some(RESULTS_FAILED_MESSAGE));
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_clears_results_and_stops_polling() {
        let fetcher = Arc::new(ScriptedFetcher::returning(vec![result(
            "1",
            ResearchStatus::Completed,
        )]));
        let gateway = Arc::new(MockGateway::new(true));
        let c = controller(MockAuth::signed_in("a@b.com"), &fetcher, &gateway);

        c.start(None).await;
        assert_eq!(fetcher.calls(), 1);

        let url = c.logout().await.unwrap();
        assert_eq!(url.path(), "/v2/logout");
        let state = c.snapshot();
        assert_eq!(state.auth, AuthState::Anonymous);
        assert!(state.results.is_empty());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_response_after_logout_is_discarded() {
        let fetcher = Arc::new(ScriptedFetcher::default().then(
            Duration::from_secs(10),
            Ok(vec![result("late", ResearchStatus::Completed)]),
        ));
        let gateway = Arc::new(MockGateway::new(true));
        let c = controller(MockAuth::signed_in("a@b.com"), &fetcher, &gateway);

        let logout = async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            c.logout().await.unwrap();
        };
        tokio::join!(c.start(None), logout);

        let state = c.snapshot();
        assert_eq!(state.auth, AuthState::Anonymous);
        assert!(state.results.is_empty());

        // No refresh loop was left behind by the cancelled start.
        tokio::time::sleep(Duration::from_secs(90)).await;
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_order_response_is_dropped() {
        let fetcher = Arc::new(
            ScriptedFetcher::default()
                .then(Duration::ZERO, Ok(vec![]))
                .then(
                    Duration::from_secs(5),
                    Ok(vec![result("old", ResearchStatus::InProgress)]),
                )
                .then(
                    Duration::from_secs(1),
                    Ok(vec![result("new", ResearchStatus::Completed)]),
                ),
        );
        let gateway = Arc::new(MockGateway::new(true));
        let c = controller(MockAuth::signed_in("a@b.com"), &fetcher, &gateway);
        c.start(None).await;

        let second = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            c.refresh_now().await;
            // The newer response is applied while the older one is in flight.
            assert_eq!(c.snapshot().results[0].id, "new");
        };
        tokio::join!(c.refresh_now(), second);

        let state = c.snapshot();
        assert_eq!(state.results.len(), 1);
        assert_eq!(state.results[0].id, "new");
        assert!(!state.results_loading);
    }

    #[tokio::test]
    async fn test_submit_empty_topic_never_reaches_gateway() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let gateway = Arc::new(MockGateway::new(true));
        let c = controller(MockAuth::signed_in("a@b.com"), &fetcher, &gateway);
        c.start(None).await;

        let mut draft = ResearchDraft::new("   \t");
        assert_eq!(c.submit(&mut draft).await, Err(SubmissionError::EmptyTopic));
        assert!(gateway.submitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_submit_requires_session() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let gateway = Arc::new(MockGateway::new(true));
        let c = controller(MockAuth::anonymous(), &fetcher, &gateway);
        c.start(None).await;

        let mut draft = ResearchDraft::new("Solar storage");
        assert_eq!(c.submit(&mut draft).await, Err(SubmissionError::NotSignedIn));
        assert!(gateway.submitted.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_success_fetches_once_and_resets_draft() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let gateway = Arc::new(MockGateway::new(true));
        let c = controller(MockAuth::signed_in("a@b.com"), &fetcher, &gateway);
        c.start(None).await;
        assert_eq!(fetcher.calls(), 1);

        let mut draft = ResearchDraft::new("Solar storage");
        c.submit(&mut draft).await.unwrap();
        assert_eq!(draft, ResearchDraft::default());
        assert_eq!(fetcher.calls(), 2);
        assert_eq!(c.snapshot().form_message, Some(FormMessage::Submitted));

        let submitted = gateway.submitted.lock().unwrap().clone();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].email, "a@b.com");
        assert_eq!(submitted[0].topic, "Solar storage");

        // The scheduled tick still lands 30 s after the session started.
        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(fetcher.calls(), 2);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fetcher.calls(), 3);
    }

    #[tokio::test]
    async fn test_submit_rejected_keeps_draft() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let gateway = Arc::new(MockGateway::new(false));
        let c = controller(MockAuth::signed_in("a@b.com"), &fetcher, &gateway);
        c.start(None).await;

        let mut draft = ResearchDraft::new("Solar storage");
        assert_eq!(c.submit(&mut draft).await, Err(SubmissionError::Rejected));
        assert_eq!(draft.topic, "Solar storage");
        assert_eq!(c.snapshot().form_message, Some(FormMessage::Failed));
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_failure_sets_banner_and_stops_polling() {
        let fetcher = Arc::new(ScriptedFetcher::returning(vec![result(
            "1",
            ResearchStatus::Completed,
        )]));
        let gateway = Arc::new(MockGateway::new(true));
        let auth = MockAuth {
            fail_logout: true,
            ..MockAuth::signed_in("a@b.com")
        };
        let c = controller(auth, &fetcher, &gateway);
        c.start(None).await;

        let err = c.logout().await.unwrap_err();
        assert!(matches!(err, AuthError::Storage { .. }));
        let state = c.snapshot();
        assert_eq!(state.auth, AuthState::Anonymous);
        assert!(state.results.is_empty());
        assert_eq!(state.error.as_deref(), Some(LOGOUT_FAILED_MESSAGE));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_for_ended_session_leaves_no_loading_flag() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let gateway = Arc::new(MockGateway::new(true));
        let c = controller(MockAuth::signed_in("a@b.com"), &fetcher, &gateway);
        c.start(None).await;

        let generation = c.shared.generation.load(Ordering::SeqCst);
        c.logout().await.unwrap();
        c.shared.fetch_results(generation, "a@b.com").await;

        let state = c.snapshot();
        assert!(!state.results_loading);
        assert!(state.results.is_empty());
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_form_message_clears_after_delay() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let gateway = Arc::new(MockGateway::new(true));
        let c = controller(MockAuth::signed_in("a@b.com"), &fetcher, &gateway);
        c.start(None).await;

        c.submit(&mut ResearchDraft::new("Solar storage")).await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(c.snapshot().form_message, Some(FormMessage::Submitted));

        // A second submission restarts the window.
        c.submit(&mut ResearchDraft::new("Wind farms")).await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(c.snapshot().form_message, Some(FormMessage::Submitted));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(c.snapshot().form_message, None);
    }

    #[tokio::test]
    async fn test_login_failure_sets_banner() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let gateway = Arc::new(MockGateway::new(true));
        let auth = MockAuth {
            fail_login: true,
            ..MockAuth::anonymous()
        };
        let c = controller(auth, &fetcher, &gateway);
        c.start(None).await;

        assert!(c.login().await.is_err());
        assert_eq!(c.snapshot().error.as_deref(), Some(LOGIN_FAILED_MESSAGE));
    }

    #[tokio::test]
    async fn test_subscribe_sees_changes() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let gateway = Arc::new(MockGateway::new(true));
        let c = controller(MockAuth::signed_in("a@b.com"), &fetcher, &gateway);
        let mut rx = c.subscribe();
        assert_eq!(rx.borrow().auth, AuthState::Loading);

        c.start(None).await;
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().is_authenticated());
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_refresh_interval() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let gateway = Arc::new(MockGateway::new(true));
        let c = controller(MockAuth::signed_in("a@b.com"), &fetcher, &gateway)
            .with_refresh_interval(Duration::from_secs(5));
        c.start(None).await;

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(fetcher.calls(), 3);
        c.shutdown().await;
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(fetcher.calls(), 3);
    }
}
