//! Editor handle owned by the UI layer.

use std::sync::Mutex;

/// Read/write access to the editor widget's buffer.
///
/// The UI owns the handle; the session only keeps a weak reference.
pub trait EditorHandle: Send + Sync {
    fn value(&self) -> String;

    fn set_value(&self, value: &str);
}

/// Plain text buffer, used headless and in tests
#[derive(Debug, Default)]
pub struct TextBuffer {
    text: Mutex<String>,
}

impl TextBuffer {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: Mutex::new(text.into()),
        }
    }
}

impl EditorHandle for TextBuffer {
    fn value(&self) -> String {
        self.text.lock().expect("TextBuffer lock poisoned").clone()
    }

    fn set_value(&self, value: &str) {
        *self.text.lock().expect("TextBuffer lock poisoned") = value.to_string();
    }
}
