//! Shared types between the editor store and its consumers
//!
//! These types are used by:
//! - the editor store (native Rust, talking to the execution API and data store)
//! - the web frontend (TypeScript bindings exported through ts-rs)
//!
//! Serializable with serde; row types keep the column names the data store uses.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ============================================================================
// Languages
// ============================================================================

/// Languages the editor can run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "../../bindings/editor.ts")]
pub enum Language {
    #[default]
    JavaScript,
    TypeScript,
    Python,
    Java,
    Go,
    Rust,
    Cpp,
    CSharp,
    Ruby,
    Swift,
}

/// Runtime identifier/version pair understood by the execution API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LanguageRuntime {
    pub language: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unsupported language: {0}")]
pub struct UnknownLanguage(pub String);

impl Language {
    pub const ALL: [Language; 10] = [
        Language::JavaScript,
        Language::TypeScript,
        Language::Python,
        Language::Java,
        Language::Go,
        Language::Rust,
        Language::Cpp,
        Language::CSharp,
        Language::Ruby,
        Language::Swift,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Python => "python",
            Language::Java => "java",
            Language::Go => "go",
            Language::Rust => "rust",
            Language::Cpp => "cpp",
            Language::CSharp => "csharp",
            Language::Ruby => "ruby",
            Language::Swift => "swift",
        }
    }

    /// Runtime the execution API should use for this language.
    pub fn runtime(&self) -> LanguageRuntime {
        let (language, version) = match self {
            Language::JavaScript => ("javascript", "18.15.0"),
            Language::TypeScript => ("typescript", "5.0.3"),
            Language::Python => ("python", "3.10.0"),
            Language::Java => ("java", "15.0.2"),
            Language::Go => ("go", "1.16.2"),
            Language::Rust => ("rust", "1.68.2"),
            Language::Cpp => ("cpp", "10.2.0"),
            Language::CSharp => ("csharp", "6.12.0"),
            Language::Ruby => ("ruby", "3.0.1"),
            Language::Swift => ("swift", "5.3.3"),
        };
        LanguageRuntime { language, version }
    }

    /// Identifier the editor widget uses for syntax highlighting
    pub fn monaco_language(&self) -> &'static str {
        self.as_str()
    }

    /// Template loaded into the editor when no draft is stored
    pub fn default_code(&self) -> &'static str {
        match self {
            Language::JavaScript => {
                "// JavaScript Playground\nconst numbers = [1, 2, 3, 4, 5];\n\nconst squares = numbers.map(n => n * n);\nconsole.log('Squares:', squares);\n"
            }
            Language::TypeScript => {
                "// TypeScript Playground\nconst numbers: number[] = [1, 2, 3, 4, 5];\n\nconst squares: number[] = numbers.map((n) => n * n);\nconsole.log('Squares:', squares);\n"
            }
            Language::Python => {
                "# Python Playground\nnumbers = [1, 2, 3, 4, 5]\n\nsquares = [n * n for n in numbers]\nprint(f\"Squares: {squares}\")\n"
            }
            Language::Java => {
                "public class Main {\n    public static void main(String[] args) {\n        int[] numbers = {1, 2, 3, 4, 5};\n        for (int n : numbers) {\n            System.out.println(n * n);\n        }\n    }\n}\n"
            }
            Language::Go => {
                "package main\n\nimport \"fmt\"\n\nfunc main() {\n\tnumbers := []int{1, 2, 3, 4, 5}\n\tfor _, n := range numbers {\n\t\tfmt.Println(n * n)\n\t}\n}\n"
            }
            Language::Rust => {
                "fn main() {\n    let numbers = vec![1, 2, 3, 4, 5];\n    let squares: Vec<i32> = numbers.iter().map(|n| n * n).collect();\n    println!(\"Squares: {:?}\", squares);\n}\n"
            }
            Language::Cpp => {
                "#include <iostream>\n#include <vector>\n\nint main() {\n    std::vector<int> numbers = {1, 2, 3, 4, 5};\n    for (int n : numbers) {\n        std::cout << n * n << std::endl;\n    }\n    return 0;\n}\n"
            }
            Language::CSharp => {
                "using System;\nusing System.Linq;\n\nclass Program {\n    static void Main() {\n        var numbers = new[] { 1, 2, 3, 4, 5 };\n        Console.WriteLine(string.Join(\", \", numbers.Select(n => n * n)));\n    }\n}\n"
            }
            Language::Ruby => {
                "# Ruby Playground\nnumbers = [1, 2, 3, 4, 5]\n\nsquares = numbers.map { |n| n * n }\nputs \"Squares: #{squares}\"\n"
            }
            Language::Swift => {
                "// Swift Playground\nlet numbers = [1, 2, 3, 4, 5]\n\nlet squares = numbers.map { $0 * $0 }\nprint(\"Squares: \\(squares)\")\n"
            }
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = UnknownLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Language::ALL
            .into_iter()
            .find(|lang| lang.as_str() == s)
            .ok_or_else(|| UnknownLanguage(s.to_string()))
    }
}

// ============================================================================
// Editor Preferences
// ============================================================================

pub const FONT_SIZE_MIN: u32 = 12;
pub const FONT_SIZE_MAX: u32 = 24;
pub const DEFAULT_FONT_SIZE: u32 = 16;
pub const DEFAULT_THEME: &str = "github-dark";

/// Themes registered with the editor widget
pub const THEMES: [&str; 5] = [
    "vs-dark",
    "vs-light",
    "github-dark",
    "monokai",
    "solarized-dark",
];

pub fn clamp_font_size(size: i64) -> u32 {
    size.clamp(FONT_SIZE_MIN as i64, FONT_SIZE_MAX as i64) as u32
}

// ============================================================================
// Execution API Wire Format
// ============================================================================

/// Request body for the remote execution API
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecuteRequest {
    pub language: String,
    pub version: String,
    pub files: Vec<SourceFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceFile {
    pub content: String,
}

impl ExecuteRequest {
    pub fn new(language: Language, source: impl Into<String>) -> Self {
        let runtime = language.runtime();
        Self {
            language: runtime.language.to_string(),
            version: runtime.version.to_string(),
            files: vec![SourceFile {
                content: source.into(),
            }],
        }
    }
}

/// Response body from the remote execution API.
///
/// `message` is set on a general failure (unknown runtime, rate limit).
/// `compile` is only present for compiled languages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ExecuteResponse {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub compile: Option<StageResult>,
    #[serde(default)]
    pub run: Option<StageResult>,
}

/// One phase (compile or run) of a remote execution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StageResult {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub signal: Option<String>,
}

impl StageResult {
    /// Non-zero exit code. An absent code counts as success.
    pub fn failed(&self) -> bool {
        matches!(self.code, Some(code) if code != 0)
    }

    /// Diagnostic text: stderr, or combined output when stderr is empty.
    pub fn diagnostic(&self) -> &str {
        if self.stderr.is_empty() {
            &self.output
        } else {
            &self.stderr
        }
    }
}

/// Normalized result of the last run, independent of UI-visible state
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, TS)]
#[ts(export, export_to = "../../bindings/editor.ts")]
pub struct ExecutionResult {
    pub code: String,
    pub output: String,
    pub error: Option<String>,
}

// ============================================================================
// Data Store Rows
// ============================================================================

/// Append-only log entry of a completed run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../../bindings/editor.ts")]
pub struct ExecutionRecord {
    pub id: i64,
    pub user_id: String,
    pub language: Language,
    pub code: String,
    pub output: String,
    pub error: Option<String>,
    #[serde(rename = "created_at")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewExecutionRecord {
    pub user_id: String,
    pub language: Language,
    pub code: String,
    pub output: String,
    pub error: Option<String>,
}

/// Shared code snippet
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../../bindings/editor.ts")]
pub struct Snippet {
    pub id: i64,
    pub user_id: String,
    pub title: String,
    pub language: Language,
    pub code: String,
    /// Author display name at the time of sharing
    pub name: String,
    #[serde(default)]
    pub star_count: i64,
    #[serde(rename = "created_at")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewSnippet {
    pub user_id: String,
    pub title: String,
    pub language: Language,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../../bindings/editor.ts")]
pub struct Comment {
    pub id: i64,
    pub snippet_id: i64,
    pub user_id: String,
    pub name: String,
    pub content: String,
    #[serde(rename = "created_at")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewComment {
    pub snippet_id: i64,
    pub user_id: String,
    pub name: String,
    pub content: String,
}

/// Join row between a user and a snippet they starred
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../../bindings/editor.ts")]
pub struct Star {
    pub snippet_id: i64,
    pub user_id: String,
}

/// Mirror of an identity in the data store's `users` table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub user_id: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

// ============================================================================
// Identity
// ============================================================================

/// Signed-in identity as reported by the identity service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[ts(export, export_to = "../../bindings/editor.ts")]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    #[serde(default)]
    pub metadata: UserMetadata,
    /// Provider the account was created with ("email", "google", "github")
    pub provider: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default, TS)]
#[ts(export, export_to = "../../bindings/editor.ts")]
pub struct UserMetadata {
    pub full_name: Option<String>,
    pub name: Option<String>,
    pub user_name: Option<String>,
}

// ============================================================================
// Profile
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../../bindings/editor.ts")]
pub struct UserStats {
    pub total_executions: i64,
    pub executions_24h: i64,
    pub starred_snippets: i64,
    pub most_starred_language: Option<Language>,
    pub languages_used: i64,
    pub most_used_language: Option<Language>,
}

// ============================================================================
// Tests
// ============================================================================
