use std::path::Path;
use std::sync::Arc;

use editor_store::auth::{AuthActions, IdentityService, SignInCredentials};
use editor_store::config::Config;
use editor_store::drafts::DraftStore;
use editor_store::editor::{EditorHandle, TextBuffer};
use editor_store::gateway::{ExecutionGateway, PistonClient};
use editor_store::history::HistoryLogger;
use editor_store::local_identity::LocalIdentity;
use editor_store::sqlite::SqliteDataStore;
use editor_store::storage::FileStorage;
use editor_store::store::DataStore;
use editor_store::{EditorSession, RunPhase};
use shared_types::Language;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn language_for_path(path: &Path) -> Option<Language> {
    let language = match path.extension()?.to_str()? {
        "js" | "mjs" => Language::JavaScript,
        "ts" => Language::TypeScript,
        "py" => Language::Python,
        "java" => Language::Java,
        "go" => Language::Go,
        "rs" => Language::Rust,
        "cpp" | "cc" | "cxx" => Language::Cpp,
        "cs" => Language::CSharp,
        "rb" => Language::Ruby,
        "swift" => Language::Swift,
        _ => return None,
    };
    Some(language)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "editor_store=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::from_env()?;

    let mut args = std::env::args().skip(1);
    let file = args
        .next()
        .ok_or_else(|| anyhow::anyhow!("usage: editor-store <file> [language]"))?;
    let language = match args.next() {
        Some(id) => id.parse::<Language>()?,
        None => language_for_path(Path::new(&file)).ok_or_else(|| {
            anyhow::anyhow!("Cannot infer language for {file}; pass it explicitly")
        })?,
    };
    let source = tokio::fs::read_to_string(&file).await?;
    info!(%file, %language, api = %config.execution_api_url, "editor-store starting");

    // Local storage and data store
    let storage = Arc::new(FileStorage::open(&config.local_storage_path)?);
    let data_store = SqliteDataStore::connect(&config.database_url).await?;
    data_store.migrate().await?;

    let identity = Arc::new(LocalIdentity::new(
        data_store.pool().clone(),
        config.oauth_base_url.clone(),
        config.oauth_redirect_path.clone(),
    ));
    identity.migrate().await?;

    let data_store: Arc<dyn DataStore> = Arc::new(data_store);
    let identity: Arc<dyn IdentityService> = identity;

    if let (Some(email), Some(password)) = (config.email.clone(), config.password.clone()) {
        let auth = AuthActions::new(identity.clone(), data_store.clone());
        match auth.sign_in(SignInCredentials { email, password }).await {
            Ok(session) => info!(user_id = %session.user.id, "Signed in"),
            Err(e) => warn!(error = %e, "Sign-in failed; running without history"),
        }
    }

    let api = Arc::new(PistonClient::new(
        config.execution_api_url.clone(),
        config.execution_timeout,
    )?);
    let history = HistoryLogger::new(data_store.clone());
    let mut history_errors = history.take_errors();

    let session = EditorSession::new(
        DraftStore::new(storage),
        ExecutionGateway::new(api),
        identity,
        history,
    );
    session.set_language(language);

    let editor: Arc<dyn EditorHandle> = Arc::new(TextBuffer::default());
    session.attach_editor(&editor);
    editor.set_value(&source);
    session.on_code_changed(&source);

    let phase = session.run_code().await;
    session.history().flush().await;

    if let Some(errors) = history_errors.as_mut() {
        while let Ok(e) = errors.try_recv() {
            warn!(error = %e, "Execution history not saved");
        }
    }

    let snapshot = session.snapshot();
    match phase {
        RunPhase::Success => {
            println!("{}", snapshot.output);
            Ok(())
        }
        _ => {
            eprintln!("{}", snapshot.error.unwrap_or_default());
            std::process::exit(1);
        }
    }
}
