//! Editor session: the state machine behind the editor and output panels.
//!
//! ```text
//! Idle ──run──▶ Running ──▶ Success | Error ──run──▶ Running ...
//!   └──empty buffer──▶ Error (no request made)
//! ```
//!
//! Invariants:
//! - `is_running` is true only while an execution request is in flight, and
//!   is cleared on every exit path, including a panicking or dropped run.
//! - `output` and `error` are cleared together with setting `is_running`,
//!   before the request starts.
//! - `execution_result` is a snapshot taken when the run settled; later
//!   state changes do not touch it.
//!
//! A session is created per UI session with its collaborators injected and
//! dropped on unmount. The editor handle is held weakly; the UI owns it.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use shared_types::{clamp_font_size, ExecutionResult, Language, NewExecutionRecord, User};
use tracing::{debug, error, info, warn};

use crate::auth::IdentityService;
use crate::drafts::{DraftStore, Preference};
use crate::editor::EditorHandle;
use crate::gateway::{ExecutionGateway, ExecutionOutcome, GatewayError};
use crate::history::HistoryLogger;

pub const EMPTY_SOURCE_MESSAGE: &str = "No code to run.";
pub const TRANSPORT_FAILURE_MESSAGE: &str = "Error running code";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunPhase {
    #[default]
    Idle,
    Running,
    Success,
    Error,
}

/// Why the last run ended in [`RunPhase::Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Empty buffer; no request was made
    Validation,
    General,
    Compile,
    Runtime,
    /// Network or decode failure; the user sees a fixed message
    Transport,
}

/// Everything the UI reads from the session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub language: Language,
    pub theme: String,
    pub font_size: u32,
    pub output: String,
    pub error: Option<String>,
    pub is_running: bool,
    pub phase: RunPhase,
    pub failure: Option<FailureKind>,
    pub execution_result: Option<ExecutionResult>,
}

struct SessionState {
    language: Language,
    theme: String,
    font_size: u32,
    output: String,
    error: Option<String>,
    is_running: bool,
    phase: RunPhase,
    failure: Option<FailureKind>,
    execution_result: Option<ExecutionResult>,
    editor: Option<Weak<dyn EditorHandle>>,
}

impl SessionState {
    fn editor(&self) -> Option<Arc<dyn EditorHandle>> {
        self.editor.as_ref().and_then(Weak::upgrade)
    }

    fn fail(&mut self, kind: FailureKind, message: String) {
        self.output.clear();
        self.error = Some(message);
        self.phase = RunPhase::Error;
        self.failure = Some(kind);
    }
}

/// Clears the running flag when dropped, so a run can never leave the
/// session stuck in `Running`.
struct RunningGuard<'a> {
    state: &'a Mutex<SessionState>,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.is_running = false;
        if state.phase == RunPhase::Running {
            state.phase = RunPhase::Idle;
        }
    }
}

pub struct EditorSession {
    state: Mutex<SessionState>,
    drafts: DraftStore,
    gateway: ExecutionGateway,
    identity: Arc<dyn IdentityService>,
    history: HistoryLogger,
}

impl EditorSession {
    /// Create a session, restoring language, theme and font size from the
    /// draft store.
    pub fn new(
        drafts: DraftStore,
        gateway: ExecutionGateway,
        identity: Arc<dyn IdentityService>,
        history: HistoryLogger,
    ) -> Self {
        let prefs = drafts.load_preferences();
        debug!(
            language = %prefs.language,
            theme = %prefs.theme,
            font_size = prefs.font_size,
            "Editor session created"
        );

        Self {
            state: Mutex::new(SessionState {
                language: prefs.language,
                theme: prefs.theme,
                font_size: prefs.font_size,
                output: String::new(),
                error: None,
                is_running: false,
                phase: RunPhase::Idle,
                failure: None,
                execution_result: None,
                editor: None,
            }),
            drafts,
            gateway,
            identity,
            history,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().expect("EditorSession lock poisoned")
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.lock();
        SessionSnapshot {
            language: state.language,
            theme: state.theme.clone(),
            font_size: state.font_size,
            output: state.output.clone(),
            error: state.error.clone(),
            is_running: state.is_running,
            phase: state.phase,
            failure: state.failure,
            execution_result: state.execution_result.clone(),
        }
    }

    pub fn language(&self) -> Language {
        self.lock().language
    }

    pub fn is_running(&self) -> bool {
        self.lock().is_running
    }

    pub fn execution_result(&self) -> Option<ExecutionResult> {
        self.lock().execution_result.clone()
    }

    pub fn history(&self) -> &HistoryLogger {
        &self.history
    }

    // ------------------------------------------------------------------------
    // Editor buffer
    // ------------------------------------------------------------------------

    /// Attach the UI's editor and load the current language's draft (or
    /// template) into it.
    pub fn attach_editor(&self, editor: &Arc<dyn EditorHandle>) {
        let language = {
            let mut state = self.lock();
            state.editor = Some(Arc::downgrade(editor));
            state.language
        };
        editor.set_value(&self.drafts.draft_or_template(language));
    }

    pub fn detach_editor(&self) {
        self.lock().editor = None;
    }

    /// Current buffer contents; empty when no editor is attached.
    pub fn code(&self) -> String {
        self.lock()
            .editor()
            .map(|editor| editor.value())
            .unwrap_or_default()
    }

    /// Persist an edit reported by the editor as the current language's draft.
    pub fn on_code_changed(&self, value: &str) {
        let language = {
            let state = self.lock();
            if state.editor().is_none() {
                return;
            }
            state.language
        };
        if let Err(e) = self.drafts.save_draft(language, value) {
            warn!(error = %e, %language, "Failed to persist draft");
        }
    }

    /// Switch language. The outgoing buffer is saved under its own key before
    /// the incoming draft (or template) is loaded.
    pub fn set_language(&self, language: Language) {
        let (outgoing, editor) = {
            let state = self.lock();
            (state.language, state.editor())
        };

        if let Some(editor) = editor.as_ref() {
            if let Err(e) = self.drafts.save_draft(outgoing, &editor.value()) {
                warn!(error = %e, language = %outgoing, "Failed to persist outgoing draft");
            }
        }
        if let Err(e) = self
            .drafts
            .save_preference(Preference::Language, language.as_str())
        {
            warn!(error = %e, "Failed to persist editor language");
        }

        {
            let mut state = self.lock();
            state.language = language;
            state.output.clear();
            state.error = None;
            state.failure = None;
            if !state.is_running {
                state.phase = RunPhase::Idle;
            }
        }

        if let Some(editor) = editor {
            editor.set_value(&self.drafts.draft_or_template(language));
        }
        debug!(from = %outgoing, to = %language, "Editor language changed");
    }

    /// Restore the language template and forget the stored draft. Returns the
    /// template.
    pub fn reset_to_default(&self) -> String {
        let (language, editor) = {
            let state = self.lock();
            (state.language, state.editor())
        };
        let template = language.default_code().to_string();
        if let Some(editor) = editor {
            editor.set_value(&template);
        }
        if let Err(e) = self.drafts.clear_draft(language) {
            warn!(error = %e, %language, "Failed to clear draft");
        }
        template
    }

    // ------------------------------------------------------------------------
    // Preferences
    // ------------------------------------------------------------------------

    pub fn set_theme(&self, theme: &str) {
        if let Err(e) = self.drafts.save_preference(Preference::Theme, theme) {
            warn!(error = %e, "Failed to persist editor theme");
        }
        self.lock().theme = theme.to_string();
    }

    /// Clamp to the supported range, persist, and return the applied size.
    pub fn set_font_size(&self, size: i64) -> u32 {
        let size = clamp_font_size(size);
        if let Err(e) = self
            .drafts
            .save_preference(Preference::FontSize, &size.to_string())
        {
            warn!(error = %e, "Failed to persist editor font size");
        }
        self.lock().font_size = size;
        size
    }

    // ------------------------------------------------------------------------
    // Running code
    // ------------------------------------------------------------------------

    /// Run the current buffer and return the phase the session settled in.
    ///
    /// A second call while one is in flight is not blocked here; the UI
    /// disables its trigger while [`is_running`](Self::is_running) is true.
    pub async fn run_code(&self) -> RunPhase {
        let (language, code) = {
            let state = self.lock();
            let code = state.editor().map(|e| e.value()).unwrap_or_default();
            (state.language, code)
        };

        if code.trim().is_empty() {
            let mut state = self.lock();
            state.fail(FailureKind::Validation, EMPTY_SOURCE_MESSAGE.to_string());
            state.execution_result = None;
            return RunPhase::Error;
        }

        {
            let mut state = self.lock();
            state.output.clear();
            state.error = None;
            state.failure = None;
            state.is_running = true;
            state.phase = RunPhase::Running;
        }

        let (phase, result) = {
            let _guard = RunningGuard { state: &self.state };
            let response = self.gateway.execute(language, &code).await;
            self.settle(language, &code, response)
        };

        if let Some(user) = self.signed_in_user().await {
            self.history.record(NewExecutionRecord {
                user_id: user.id,
                language,
                code,
                output: result.output,
                error: result.error,
            });
        }

        phase
    }

    fn settle(
        &self,
        language: Language,
        code: &str,
        response: Result<ExecutionOutcome, GatewayError>,
    ) -> (RunPhase, ExecutionResult) {
        let mut state = self.lock();
        state.is_running = false;

        let result = match response {
            Ok(outcome) => {
                let result = outcome.to_result(code);
                match outcome {
                    ExecutionOutcome::Success { text } => {
                        state.output = text;
                        state.error = None;
                        state.failure = None;
                        state.phase = RunPhase::Success;
                    }
                    ExecutionOutcome::GeneralFailure { message } => {
                        state.fail(FailureKind::General, message)
                    }
                    ExecutionOutcome::CompileFailure { text } => {
                        state.fail(FailureKind::Compile, text)
                    }
                    ExecutionOutcome::RuntimeFailure { text } => {
                        state.fail(FailureKind::Runtime, text)
                    }
                }
                result
            }
            Err(e) => {
                error!(error = %e, %language, "Code execution request failed");
                state.fail(FailureKind::Transport, TRANSPORT_FAILURE_MESSAGE.to_string());
                ExecutionResult {
                    code: code.to_string(),
                    output: String::new(),
                    error: Some(TRANSPORT_FAILURE_MESSAGE.to_string()),
                }
            }
        };

        state.execution_result = Some(result.clone());
        info!(%language, phase = ?state.phase, failure = ?state.failure, "Run settled");
        (state.phase, result)
    }

    async fn signed_in_user(&self) -> Option<User> {
        match self.identity.current_user().await {
            Ok(user) => user,
            Err(e) => {
                warn!(error = %e, "Identity lookup failed; skipping execution history");
                None
            }
        }
    }
}
