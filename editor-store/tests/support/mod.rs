//! Fakes for the remote collaborators shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use editor_store::auth::{
    AuthSession, IdentityError, IdentityService, OAuthProvider, SignInCredentials,
    SignUpCredentials,
};
use editor_store::drafts::DraftStore;
use editor_store::editor::{EditorHandle, TextBuffer};
use editor_store::gateway::{ExecutionApi, ExecutionGateway, GatewayError};
use editor_store::history::HistoryLogger;
use editor_store::sqlite::SqliteDataStore;
use editor_store::storage::MemoryStorage;
use editor_store::store::{DataStore, StoreError};
use editor_store::EditorSession;
use shared_types::{
    Comment, ExecuteRequest, ExecuteResponse, ExecutionRecord, Language, NewComment,
    NewExecutionRecord, NewSnippet, Snippet, Star, User, UserMetadata, UserRecord,
};

// ============================================================================
// Execution API
// ============================================================================

/// Execution API answering from a queue of scripted responses
#[derive(Default)]
pub struct ScriptedApi {
    responses: Mutex<VecDeque<Result<ExecuteResponse, GatewayError>>>,
    requests: Mutex<Vec<ExecuteRequest>>,
    hold: Mutex<Option<oneshot::Receiver<()>>>,
}

impl ScriptedApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, json: serde_json::Value) {
        let response = serde_json::from_value(json).expect("scripted response should decode");
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    pub fn fail(&self, error: GatewayError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    /// Make the next call wait until the returned sender fires.
    pub fn hold_next(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.hold.lock().unwrap() = Some(rx);
        tx
    }

    pub fn requests(&self) -> Vec<ExecuteRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExecutionApi for ScriptedApi {
    async fn execute(&self, request: &ExecuteRequest) -> Result<ExecuteResponse, GatewayError> {
        self.requests.lock().unwrap().push(request.clone());
        let hold = self.hold.lock().unwrap().take();
        if let Some(rx) = hold {
            let _ = rx.await;
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(GatewayError::Transport("no scripted response".into())))
    }
}

// ============================================================================
// Identity
// ============================================================================

pub fn user(id: &str) -> User {
    User {
        id: id.to_string(),
        email: Some(format!("{id}@example.com")),
        metadata: UserMetadata {
            full_name: Some(format!("User {id}")),
            name: None,
            user_name: None,
        },
        provider: Some("email".to_string()),
    }
}

/// Identity service whose current user is set by the test
#[derive(Default)]
pub struct FixedIdentity {
    current: Mutex<Option<User>>,
    lookups: AtomicUsize,
}

impl FixedIdentity {
    pub fn signed_in(user: User) -> Arc<Self> {
        Arc::new(Self {
            current: Mutex::new(Some(user)),
            lookups: AtomicUsize::new(0),
        })
    }

    pub fn signed_out() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(&self, user: Option<User>) {
        *self.current.lock().unwrap() = user;
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityService for FixedIdentity {
    async fn current_user(&self) -> Result<Option<User>, IdentityError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.current.lock().unwrap().clone())
    }

    async fn sign_up(&self, _credentials: SignUpCredentials) -> Result<AuthSession, IdentityError> {
        Err(IdentityError::Backend("sign-up not supported".into()))
    }

    async fn sign_in(&self, _credentials: SignInCredentials) -> Result<AuthSession, IdentityError> {
        Err(IdentityError::Backend("sign-in not supported".into()))
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        self.set(None);
        Ok(())
    }

    fn oauth_authorize_url(&self, provider: OAuthProvider) -> Result<String, IdentityError> {
        Ok(format!("https://auth.test/authorize?provider={}", provider.as_str()))
    }

    async fn primary_provider(&self, _email: &str) -> Result<Option<String>, IdentityError> {
        Ok(None)
    }
}

// ============================================================================
// Data Store
// ============================================================================

pub async fn memory_store() -> SqliteDataStore {
    let store = SqliteDataStore::connect("sqlite::memory:")
        .await
        .expect("in-memory database should open");
    store.migrate().await.expect("schema should apply");
    store
}

fn injected() -> StoreError {
    StoreError::Database("injected failure".into())
}

/// SQLite store whose writes can be made to fail or to wait
pub struct FlakyStore {
    inner: SqliteDataStore,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
    hold: Mutex<Option<oneshot::Receiver<()>>>,
}

impl FlakyStore {
    pub async fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: memory_store().await,
            fail_writes: AtomicBool::new(false),
            writes: AtomicUsize::new(0),
            hold: Mutex::new(None),
        })
    }

    pub fn inner(&self) -> &SqliteDataStore {
        &self.inner
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of write calls attempted, failed ones included
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make the next write wait until the returned sender fires.
    pub fn hold_next_write(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.hold.lock().unwrap() = Some(rx);
        tx
    }

    async fn write_gate(&self) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let hold = self.hold.lock().unwrap().take();
        if let Some(rx) = hold {
            let _ = rx.await;
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(injected());
        }
        Ok(())
    }

    pub async fn seed_snippet(&self, owner: &str, title: &str, language: Language) -> Snippet {
        self.inner
            .insert_snippet(NewSnippet {
                user_id: owner.to_string(),
                title: title.to_string(),
                language,
                code: language.default_code().to_string(),
                name: format!("User {owner}"),
            })
            .await
            .expect("seed snippet")
    }
}

#[async_trait]
impl DataStore for FlakyStore {
    async fn insert_execution(
        &self,
        record: NewExecutionRecord,
    ) -> Result<ExecutionRecord, StoreError> {
        self.write_gate().await?;
        self.inner.insert_execution(record).await
    }

    async fn list_executions(&self, user_id: &str) -> Result<Vec<ExecutionRecord>, StoreError> {
        self.inner.list_executions(user_id).await
    }

    async fn count_executions(
        &self,
        user_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<i64, StoreError> {
        self.inner.count_executions(user_id, since).await
    }

    async fn insert_snippet(&self, snippet: NewSnippet) -> Result<Snippet, StoreError> {
        self.write_gate().await?;
        self.inner.insert_snippet(snippet).await
    }

    async fn get_snippet(&self, id: i64) -> Result<Snippet, StoreError> {
        self.inner.get_snippet(id).await
    }

    async fn list_snippets(&self) -> Result<Vec<Snippet>, StoreError> {
        self.inner.list_snippets().await
    }

    async fn list_snippets_by_ids(&self, ids: &[i64]) -> Result<Vec<Snippet>, StoreError> {
        self.inner.list_snippets_by_ids(ids).await
    }

    async fn list_snippet_languages(&self, user_id: &str) -> Result<Vec<Language>, StoreError> {
        self.inner.list_snippet_languages(user_id).await
    }

    async fn delete_snippet(&self, id: i64, user_id: &str) -> Result<(), StoreError> {
        self.write_gate().await?;
        self.inner.delete_snippet(id, user_id).await
    }

    async fn insert_star(&self, star: Star) -> Result<(), StoreError> {
        self.write_gate().await?;
        self.inner.insert_star(star).await
    }

    async fn delete_star(&self, star: &Star) -> Result<(), StoreError> {
        self.write_gate().await?;
        self.inner.delete_star(star).await
    }

    async fn list_starred_ids(&self, user_id: &str) -> Result<Vec<i64>, StoreError> {
        self.inner.list_starred_ids(user_id).await
    }

    async fn count_stars(&self, user_id: &str) -> Result<i64, StoreError> {
        self.inner.count_stars(user_id).await
    }

    async fn list_comments(&self, snippet_id: i64) -> Result<Vec<Comment>, StoreError> {
        self.inner.list_comments(snippet_id).await
    }

    async fn insert_comment(&self, comment: NewComment) -> Result<Comment, StoreError> {
        self.write_gate().await?;
        self.inner.insert_comment(comment).await
    }

    async fn delete_comment(&self, id: i64, user_id: &str) -> Result<(), StoreError> {
        self.write_gate().await?;
        self.inner.delete_comment(id, user_id).await
    }

    async fn upsert_user(&self, user: UserRecord) -> Result<(), StoreError> {
        self.write_gate().await?;
        self.inner.upsert_user(user).await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        self.inner.find_user_by_email(email).await
    }
}

// ============================================================================
// Session Harness
// ============================================================================

pub struct Harness {
    pub session: EditorSession,
    pub api: Arc<ScriptedApi>,
    pub storage: Arc<MemoryStorage>,
    pub store: Arc<FlakyStore>,
    pub identity: Arc<FixedIdentity>,
    pub editor: Arc<dyn EditorHandle>,
}

impl Harness {
    /// Session over fresh storage with an attached, empty-drafted editor.
    pub async fn new(identity: Arc<FixedIdentity>) -> Self {
        Self::with_storage(identity, Arc::new(MemoryStorage::new())).await
    }

    pub async fn with_storage(identity: Arc<FixedIdentity>, storage: Arc<MemoryStorage>) -> Self {
        let api = ScriptedApi::new();
        let store = FlakyStore::new().await;
        let session = EditorSession::new(
            DraftStore::new(storage.clone()),
            ExecutionGateway::new(api.clone()),
            identity.clone(),
            HistoryLogger::new(store.clone()),
        );
        let editor: Arc<dyn EditorHandle> = Arc::new(TextBuffer::default());
        session.attach_editor(&editor);

        Self {
            session,
            api,
            storage,
            store,
            identity,
            editor,
        }
    }

    /// Type `code` into the editor the way the UI would.
    pub fn type_code(&self, code: &str) {
        self.editor.set_value(code);
        self.session.on_code_changed(code);
    }
}
