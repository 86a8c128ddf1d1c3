use std::sync::Mutex;

/// Display surface driven by the controller: a loading flag, an error flag
/// and the rendered image markup. The two flags are independent.
pub trait View: Send + Sync + 'static {
    fn set_loading(&self, loading: bool);
    fn set_error(&self, error: bool);
    /// Replace the image content verbatim.
    fn render(&self, markup: String);
    fn image(&self) -> String;
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ViewState {
    pub loading: bool,
    pub error: bool,
    pub image: String,
}

/// In-memory view used by the CLI and tests.
#[derive(Debug, Default)]
pub struct MemoryView {
    state: Mutex<ViewState>,
}

impl MemoryView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ViewState {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ViewState> {
        // State is plain data; a panic elsewhere doesn't invalidate it.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl View for MemoryView {
    fn set_loading(&self, loading: bool) {
        self.lock().loading = loading;
    }

    fn set_error(&self, error: bool) {
        self.lock().error = error;
    }

    fn render(&self, markup: String) {
        self.lock().image = markup;
    }

    fn image(&self) -> String {
        self.lock().image.clone()
    }
}
