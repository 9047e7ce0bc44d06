//! Local draft store: per-language buffers and editor preferences.
//!
//! Keys follow the browser layout: `editor-code-<language>`,
//! `editor-font-size`, `editor-theme`, `editor-language`. Integers are stored
//! as their decimal string.

use std::sync::Arc;

use shared_types::{clamp_font_size, Language, DEFAULT_FONT_SIZE, DEFAULT_THEME};
use tracing::debug;

use crate::storage::{KeyValueStorage, StorageError};

pub fn draft_key(language: Language) -> String {
    format!("editor-code-{language}")
}

/// Editor preferences kept between sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preference {
    FontSize,
    Theme,
    Language,
}

impl Preference {
    pub fn key(&self) -> &'static str {
        match self {
            Preference::FontSize => "editor-font-size",
            Preference::Theme => "editor-theme",
            Preference::Language => "editor-language",
        }
    }
}

/// Preferences restored when a session is created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorPreferences {
    pub language: Language,
    pub theme: String,
    pub font_size: u32,
}

impl Default for EditorPreferences {
    fn default() -> Self {
        Self {
            language: Language::default(),
            theme: DEFAULT_THEME.to_string(),
            font_size: DEFAULT_FONT_SIZE,
        }
    }
}

#[derive(Clone)]
pub struct DraftStore {
    storage: Arc<dyn KeyValueStorage>,
}

impl DraftStore {
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self { storage }
    }

    pub fn save_draft(&self, language: Language, content: &str) -> Result<(), StorageError> {
        self.storage.set(&draft_key(language), content)
    }

    /// Stored buffer for `language`. An empty stored buffer is still a draft.
    pub fn load_draft(&self, language: Language) -> Option<String> {
        self.storage.get(&draft_key(language))
    }

    pub fn clear_draft(&self, language: Language) -> Result<(), StorageError> {
        self.storage.remove(&draft_key(language))
    }

    /// Stored draft, or the language template when none is stored.
    pub fn draft_or_template(&self, language: Language) -> String {
        self.load_draft(language)
            .unwrap_or_else(|| language.default_code().to_string())
    }

    pub fn save_preference(&self, preference: Preference, value: &str) -> Result<(), StorageError> {
        self.storage.set(preference.key(), value)
    }

    pub fn load_preference(&self, preference: Preference) -> Option<String> {
        self.storage.get(preference.key())
    }

    /// Restore preferences, falling back to defaults for missing or
    /// unparsable values.
    pub fn load_preferences(&self) -> EditorPreferences {
        let defaults = EditorPreferences::default();

        let language = self
            .load_preference(Preference::Language)
            .and_then(|raw| match raw.parse::<Language>() {
                Ok(language) => Some(language),
                Err(e) => {
                    debug!(error = %e, "Ignoring stored editor language");
                    None
                }
            })
            .unwrap_or(defaults.language);

        let theme = self
            .load_preference(Preference::Theme)
            .filter(|theme| !theme.trim().is_empty())
            .unwrap_or(defaults.theme);

        let font_size = self
            .load_preference(Preference::FontSize)
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .map(clamp_font_size)
            .unwrap_or(defaults.font_size);

        EditorPreferences {
            language,
            theme,
            font_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn store() -> (Arc<MemoryStorage>, DraftStore) {
        let storage = Arc::new(MemoryStorage::new());
        (storage.clone(), DraftStore::new(storage))
    }

    #[test]
    fn test_drafts_are_keyed_per_language() {
        let (storage, drafts) = store();
        drafts.save_draft(Language::Python, "print(1)").unwrap();
        drafts.save_draft(Language::Rust, "fn main() {}").unwrap();

        assert_eq!(storage.get("editor-code-python").as_deref(), Some("print(1)"));
        assert_eq!(drafts.load_draft(Language::Rust).as_deref(), Some("fn main() {}"));
        assert_eq!(drafts.load_draft(Language::Go), None);
    }

    #[test]
    fn test_clear_draft_falls_back_to_template() {
        let (_, drafts) = store();
        drafts.save_draft(Language::Ruby, "puts 1").unwrap();
        drafts.clear_draft(Language::Ruby).unwrap();
        assert_eq!(
            drafts.draft_or_template(Language::Ruby),
            Language::Ruby.default_code()
        );
    }

    #[test]
    fn test_preferences_default_when_missing() {
        let (_, drafts) = store();
        assert_eq!(drafts.load_preferences(), EditorPreferences::default());
    }

    #[test]
    fn test_preferences_restore_and_clamp() {
        let (storage, drafts) = store();
        storage.set("editor-language", "go").unwrap();
        storage.set("editor-theme", "monokai").unwrap();
        storage.set("editor-font-size", "40").unwrap();

        let prefs = drafts.load_preferences();
        assert_eq!(prefs.language, Language::Go);
        assert_eq!(prefs.theme, "monokai");
        assert_eq!(prefs.font_size, 24);
    }

    #[test]
    fn test_unparsable_preferences_fall_back() {
        let (storage, drafts) = store();
        storage.set("editor-language", "brainfuck").unwrap();
        storage.set("editor-font-size", "large").unwrap();

        let prefs = drafts.load_preferences();
        assert_eq!(prefs.language, Language::JavaScript);
        assert_eq!(prefs.font_size, DEFAULT_FONT_SIZE);
    }
}
