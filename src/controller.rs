//! The options form controller.
//!
//! One controller is one session: it owns the options cache, the single
//! in-flight request slot and the defaults that blank form fields fall back
//! to. Submissions may overlap; the [`InFlightPolicy`] decides whether a new
//! one abandons the pending request or is refused.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use crate::cache::OptionsCache;
use crate::client::Generator;
use crate::config::{ClientConfig, InFlightPolicy};
use crate::download;
use crate::error::{ControllerError, DownloadError, GenerateError};
use crate::options::{FormData, GenerationOptions};
use crate::view::View;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Options equal the cache; no request was made.
    Unchanged,
    /// The response body replaced the image.
    Rendered { bytes: usize },
    /// The request failed and the error flag is set.
    Failed,
    /// A newer submission took over before this one settled.
    Superseded,
    /// Refused because another request is pending.
    Busy,
}

struct InFlight {
    id: u64,
    cancel: oneshot::Sender<()>,
}

#[derive(Default)]
struct Session {
    cache: OptionsCache,
    /// Options behind the image currently shown.
    rendered: Option<Arc<GenerationOptions>>,
    in_flight: Option<InFlight>,
    next_id: u64,
}

pub struct Controller<G, V> {
    generator: Arc<G>,
    view: Arc<V>,
    policy: InFlightPolicy,
    defaults: GenerationOptions,
    session: Mutex<Session>,
}

impl<G: Generator, V: View> Controller<G, V> {
    /// Start a session. The default seed is fixed now, so repeating a
    /// submission with a blank seed is recognised as unchanged.
    pub fn new(generator: G, view: Arc<V>, config: &ClientConfig) -> Self {
        Self {
            generator: Arc::new(generator),
            view,
            policy: config.policy,
            defaults: GenerationOptions::default(),
            session: Mutex::new(Session {
                cache: OptionsCache::new(config.variant.cache_strategy()),
                ..Session::default()
            }),
        }
    }

    pub fn with_defaults(mut self, defaults: GenerationOptions) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn defaults(&self) -> &GenerationOptions {
        &self.defaults
    }

    pub fn view(&self) -> &Arc<V> {
        &self.view
    }

    pub fn cached(&self) -> Option<Arc<GenerationOptions>> {
        self.lock().cache.get().cloned()
    }

    pub fn rendered(&self) -> Option<Arc<GenerationOptions>> {
        self.lock().rendered.clone()
    }

    pub fn is_pending(&self) -> bool {
        self.lock().in_flight.is_some()
    }

    /// Handle one form submission.
    ///
    /// Loading is cleared on every exit path unless another request is still
    /// pending, in which case that request owns the flag. A cancelled
    /// request's blocking call runs to completion but its result is dropped.
    pub async fn submit(&self, form: &FormData) -> Result<SubmitOutcome, ControllerError> {
        self.view.set_error(false);
        self.view.set_loading(true);
        let mut settle = Settle {
            session: &self.session,
            view: &*self.view,
            id: None,
        };

        let candidate = match GenerationOptions::from_form(form, &self.defaults) {
            Ok(options) => Arc::new(options),
            Err(err) => {
                tracing::warn!(%err, "rejected form submission");
                self.view.set_error(true);
                return Err(err.into());
            }
        };

        let (id, cancelled) = {
            let mut session = self.lock();
            if session.cache.matches(&candidate) {
                tracing::debug!(seed = %candidate.seed, "options unchanged, skipping request");
                return Ok(SubmitOutcome::Unchanged);
            }
            if let Some(pending) = &session.in_flight {
                match self.policy {
                    InFlightPolicy::IgnoreNew => {
                        tracing::debug!(
                            pending = pending.id,
                            "request pending, ignoring submission"
                        );
                        return Ok(SubmitOutcome::Busy);
                    }
                    InFlightPolicy::CancelPrevious => {}
                }
            }

            session.cache.replace(Arc::clone(&candidate));
            if let Some(prior) = session.in_flight.take() {
                tracing::debug!(id = prior.id, "cancelling pending request");
                let _ = prior.cancel.send(());
            }

            session.next_id += 1;
            let id = session.next_id;
            let (cancel, cancelled) = oneshot::channel();
            session.in_flight = Some(InFlight { id, cancel });
            (id, cancelled)
        };
        settle.id = Some(id);

        let generator = Arc::clone(&self.generator);
        let options = Arc::clone(&candidate);
        let task = tokio::task::spawn_blocking(move || generator.generate(&options));

        let result = tokio::select! {
            joined = task => match joined {
                Ok(result) => result,
                Err(err) => Err(GenerateError::Join(err.to_string())),
            },
            _ = cancelled => {
                tracing::info!(id, "request superseded");
                return Ok(SubmitOutcome::Superseded);
            }
        };

        let mut session = self.lock();
        if !session.in_flight.as_ref().is_some_and(|f| f.id == id) {
            tracing::warn!(id, "discarding response of superseded request");
            return Ok(SubmitOutcome::Superseded);
        }
        session.in_flight = None;

        // View updates happen under the session lock so a newer submission
        // can't interleave with them.
        let outcome = match result {
            Ok(markup) => {
                let bytes = markup.len();
                session.rendered = Some(candidate);
                self.view.render(markup);
                SubmitOutcome::Rendered { bytes }
            }
            Err(err) => {
                tracing::error!(%err, seed = %candidate.seed, "image generation failed");
                // Allow the same options to be retried.
                let last = session.rendered.clone();
                session.cache.restore(last);
                self.view.set_error(true);
                SubmitOutcome::Failed
            }
        };
        drop(session);
        Ok(outcome)
    }

    /// Save the current image as `{seed}-{density}-{canvasSize}-{minLeafSize}.svg`
    /// in `dir`, named after the options that produced it.
    pub fn download(&self, dir: &Path) -> Result<PathBuf, DownloadError> {
        let options = self.rendered().ok_or(DownloadError::NothingRendered)?;
        download::save_svg(dir, &options.file_name(), &self.view.image())
    }

    /// The current image as an SVG data URL.
    pub fn data_url(&self) -> Option<String> {
        let image = self.view.image();
        (!image.is_empty()).then(|| download::svg_data_url(&image))
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        lock(&self.session)
    }
}

fn lock(session: &Mutex<Session>) -> MutexGuard<'_, Session> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Releases the in-flight slot and the loading flag when a submission ends,
/// including when its future is dropped mid-request.
struct Settle<'a, V: View> {
    session: &'a Mutex<Session>,
    view: &'a V,
    id: Option<u64>,
}

impl<V: View> Drop for Settle<'_, V> {
    fn drop(&mut self) {
        let mut session = lock(self.session);
        if let Some(id) = self.id {
            if session.in_flight.as_ref().is_some_and(|f| f.id == id) {
                session.in_flight = None;
            }
        }
        if session.in_flight.is_none() {
            self.view.set_loading(false);
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc;

    use pretty_assertions::assert_eq;
    use tokio::sync::Notify;

    use super::*;
    use crate::config::Variant;
    use crate::view::{MemoryView, ViewState};

    /// Records every call; the seed "slow" blocks until released.
    #[derive(Default)]
    struct Scripted {
        calls: Mutex<Vec<GenerationOptions>>,
        fail: AtomicBool,
        entered: Arc<Notify>,
        release: Mutex<Option<mpsc::Receiver<()>>>,
    }

    impl Scripted {
        fn calls(&self) -> Vec<GenerationOptions> {
            self.calls.lock().unwrap().clone()
        }

        fn hold(&self) -> mpsc::Sender<()> {
            let (tx, rx) = mpsc::channel();
            *self.release.lock().unwrap() = Some(rx);
            tx
        }
    }

    impl Generator for Arc<Scripted> {
        fn generate(&self, options: &GenerationOptions) -> Result<String, GenerateError> {
            self.calls.lock().unwrap().push(options.clone());
            if options.seed == "slow" {
                let rx = self.release.lock().unwrap().take();
                self.entered.notify_one();
                if let Some(rx) = rx {
                    let _ = rx.recv();
                }
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(GenerateError::Transport("connection refused".into()));
            }
            Ok(format!("<svg data-seed=\"{}\"/>", options.seed))
        }
    }

    type TestController = Controller<Arc<Scripted>, MemoryView>;

    fn controller(policy: InFlightPolicy) -> (Arc<TestController>, Arc<Scripted>) {
        let generator = Arc::new(Scripted::default());
        let config = ClientConfig::default().with_policy(policy);
        let view = Arc::new(MemoryView::new());
        let controller = Controller::new(Arc::clone(&generator), view, &config)
            .with_defaults(GenerationOptions::with_seed("1700000000000"));
        (Arc::new(controller), generator)
    }

    fn form(seed: &str) -> FormData {
        FormData::new().with("seed", seed)
    }

    #[tokio::test]
    async fn unchanged_submission_skips_request() {
        let (controller, generator) = controller(InFlightPolicy::CancelPrevious);
        let form = FormData::new()
            .with("seed", "abc")
            .with("minLeafSize", "")
            .with("canvasSize", "80")
            .with("density", "5");

        assert_eq!(
            controller.submit(&form).await.unwrap(),
            SubmitOutcome::Rendered { bytes: 22 }
        );
        assert_eq!(controller.submit(&form).await.unwrap(), SubmitOutcome::Unchanged);

        assert_eq!(generator.calls().len(), 1);
        assert_eq!(
            controller.view().snapshot(),
            ViewState {
                loading: false,
                error: false,
                image: "<svg data-seed=\"abc\"/>".into(),
            }
        );
    }

    #[tokio::test]
    async fn blank_seed_resubmission_is_unchanged() {
        let (controller, generator) = controller(InFlightPolicy::CancelPrevious);
        controller.submit(&FormData::new()).await.unwrap();
        assert_eq!(controller.submit(&form("")).await.unwrap(), SubmitOutcome::Unchanged);
        assert_eq!(generator.calls()[0].seed, "1700000000000");
    }

    #[tokio::test]
    async fn failure_sets_error_and_keeps_image() {
        let (controller, generator) = controller(InFlightPolicy::CancelPrevious);
        controller.submit(&form("a")).await.unwrap();

        generator.fail.store(true, Ordering::SeqCst);
        assert_eq!(controller.submit(&form("b")).await.unwrap(), SubmitOutcome::Failed);

        let state = controller.view().snapshot();
        assert!(state.error);
        assert!(!state.loading);
        assert_eq!(state.image, "<svg data-seed=\"a\"/>");
        assert_eq!(controller.cached().unwrap().seed, "a");

        // Same options again are retried, and success clears the error.
        generator.fail.store(false, Ordering::SeqCst);
        assert!(matches!(
            controller.submit(&form("b")).await.unwrap(),
            SubmitOutcome::Rendered { .. }
        ));
        assert!(!controller.view().snapshot().error);
        assert_eq!(generator.calls().len(), 3);
    }

    #[tokio::test]
    async fn invalid_form_never_reaches_generator() {
        let (controller, generator) = controller(InFlightPolicy::CancelPrevious);
        let err = controller
            .submit(&FormData::new().with("density", "lots"))
            .await
            .unwrap_err();

        assert!(matches!(err, ControllerError::Options(_)));
        assert!(generator.calls().is_empty());
        let state = controller.view().snapshot();
        assert!(state.error);
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn cache_is_adopted_before_response() {
        let (controller, generator) = controller(InFlightPolicy::CancelPrevious);
        let release = generator.hold();
        let entered = Arc::clone(&generator.entered);

        let pending = tokio::spawn({
            let controller = Arc::clone(&controller);
            async move { controller.submit(&form("slow")).await }
        });
        entered.notified().await;

        assert_eq!(controller.cached().unwrap().seed, "slow");
        assert!(controller.view().snapshot().loading);
        assert!(controller.is_pending());

        release.send(()).unwrap();
        assert!(matches!(pending.await.unwrap().unwrap(), SubmitOutcome::Rendered { .. }));
        assert!(!controller.view().snapshot().loading);
    }

    #[tokio::test]
    async fn newer_submission_supersedes_pending_one() {
        let (controller, generator) = controller(InFlightPolicy::CancelPrevious);
        let release = generator.hold();
        let entered = Arc::clone(&generator.entered);

        let slow = tokio::spawn({
            let controller = Arc::clone(&controller);
            async move { controller.submit(&form("slow")).await }
        });
        entered.notified().await;

        assert!(matches!(
            controller.submit(&form("fast")).await.unwrap(),
            SubmitOutcome::Rendered { .. }
        ));
        assert_eq!(slow.await.unwrap().unwrap(), SubmitOutcome::Superseded);

        // Let the abandoned call finish; its markup must not show up.
        release.send(()).unwrap();
        tokio::task::yield_now().await;

        let state = controller.view().snapshot();
        assert_eq!(state.image, "<svg data-seed=\"fast\"/>");
        assert!(!state.loading);
        assert_eq!(controller.rendered().unwrap().seed, "fast");
    }

    #[tokio::test]
    async fn ignore_policy_refuses_while_pending() {
        let (controller, generator) = controller(InFlightPolicy::IgnoreNew);
        let release = generator.hold();
        let entered = Arc::clone(&generator.entered);

        let slow = tokio::spawn({
            let controller = Arc::clone(&controller);
            async move { controller.submit(&form("slow")).await }
        });
        entered.notified().await;

        assert_eq!(controller.submit(&form("fast")).await.unwrap(), SubmitOutcome::Busy);
        assert!(controller.view().snapshot().loading);

        release.send(()).unwrap();
        assert!(matches!(slow.await.unwrap().unwrap(), SubmitOutcome::Rendered { .. }));

        let state = controller.view().snapshot();
        assert_eq!(state.image, "<svg data-seed=\"slow\"/>");
        assert!(!state.loading);
        assert_eq!(generator.calls().len(), 1);
    }

    #[tokio::test]
    async fn serialized_variant_behaves_the_same() {
        let generator = Arc::new(Scripted::default());
        let config = ClientConfig::default().with_variant(Variant::Trails);
        let view = Arc::new(MemoryView::new());
        let controller = Controller::new(Arc::clone(&generator), view, &config);

        controller.submit(&form("t")).await.unwrap();
        assert_eq!(controller.submit(&form("t")).await.unwrap(), SubmitOutcome::Unchanged);
        controller.submit(&form("t").with("density", "4")).await.unwrap();
        assert_eq!(generator.calls().len(), 2);
    }

    #[tokio::test]
    async fn download_uses_rendered_options() {
        let (controller, _) = controller(InFlightPolicy::CancelPrevious);
        let dir = tempfile::tempdir().unwrap();

        assert!(matches!(
            controller.download(dir.path()),
            Err(DownloadError::NothingRendered)
        ));
        assert_eq!(controller.data_url(), None);

        let form = form("abc").with("canvasSize", "80").with("density", "5");
        controller.submit(&form).await.unwrap();

        let path = controller.download(dir.path()).unwrap();
        assert_eq!(path.file_name().unwrap(), "abc-5-80-3.svg");
        assert_eq!(
            std::fs::read_to_string(path).unwrap(),
            "<svg data-seed=\"abc\"/>"
        );
        assert!(controller.data_url().unwrap().starts_with("data:image/svg+xml;base64,"));
    }

    #[tokio::test]
    async fn download_stays_inside_output_directory() {
        let (controller, _) = controller(InFlightPolicy::CancelPrevious);
        let root = tempfile::tempdir().unwrap();
        let out = root.path().join("out");

        for seed in ["../escaped", "a/b"] {
            controller.submit(&form(seed)).await.unwrap();
            assert!(matches!(
                controller.download(&out),
                Err(DownloadError::InvalidFileName(_))
            ));
        }
        assert!(!root.path().join("escaped-2-40-3.svg").exists());
        assert!(!out.exists());
    }
}
