//! Target-ecosystem profiles: file extensions, entry-point candidates, and
//! run commands per supported language.

use std::path::Path;

/// Static description of one target language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LanguageProfile {
    pub name: &'static str,
    pub extensions: &'static [&'static str],
    /// Conventional entry files, probed in order by the run loop.
    pub entry_candidates: &'static [&'static str],
}

pub const PROFILES: &[LanguageProfile] = &[
    LanguageProfile {
        name: "python",
        extensions: &["py"],
        entry_candidates: &["main.py", "app.py", "index.py"],
    },
    LanguageProfile {
        name: "javascript",
        extensions: &["js"],
        entry_candidates: &["index.js", "main.js", "server.js"],
    },
    LanguageProfile {
        name: "typescript",
        extensions: &["ts"],
        entry_candidates: &["index.ts", "main.ts"],
    },
    LanguageProfile {
        name: "go",
        extensions: &["go"],
        entry_candidates: &["main.go"],
    },
    LanguageProfile {
        name: "rust",
        extensions: &["rs"],
        entry_candidates: &["src/main.rs", "main.rs"],
    },
];

/// Look up a profile by name; unknown or missing languages fall back to
/// python, mirroring the detection fallback.
pub fn profile_for(language: Option<&str>) -> &'static LanguageProfile {
    language
        .and_then(|name| {
            let wanted = name.trim().to_ascii_lowercase();
            PROFILES.iter().find(|profile| profile.name == wanted)
        })
        .unwrap_or(&PROFILES[0])
}

/// True when `language` names a supported profile.
pub fn is_supported(language: &str) -> bool {
    let wanted = language.trim().to_ascii_lowercase();
    PROFILES.iter().any(|profile| profile.name == wanted)
}

impl LanguageProfile {
    /// Does the path carry one of this language's source extensions?
    pub fn matches_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.contains(&ext))
    }

    /// Command line that executes `entry` (relative to the project root).
    pub fn run_command(&self, entry: &Path) -> Vec<String> {
        let entry = entry.display().to_string();
        match self.name {
            "python" => vec!["python".to_string(), entry],
            "javascript" => vec!["node".to_string(), entry],
            "typescript" => vec!["ts-node".to_string(), entry],
            "go" => vec!["go".to_string(), "run".to_string(), entry],
            "rust" => vec!["cargo".to_string(), "run".to_string()],
            _ => vec!["python".to_string(), entry],
        }
    }
}
