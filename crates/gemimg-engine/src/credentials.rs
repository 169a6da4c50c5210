use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub const API_KEY_VAR: &str = "GEMINI_API_KEY";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    ExplicitFile(PathBuf),
    Environment,
    LocalFile(PathBuf),
    HomeFile(PathBuf),
}

impl fmt::Display for KeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySource::ExplicitFile(path) => write!(f, "--env-file {}", path.display()),
            KeySource::Environment => write!(f, "{API_KEY_VAR} environment variable"),
            KeySource::LocalFile(path) | KeySource::HomeFile(path) => {
                write!(f, "{}", path.display())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedKey {
    pub key: String,
    pub source: KeySource,
}

/// Looks up the API key, first non-empty source wins:
/// explicit file, environment, `./.env.local`, `./.env`, `~/.env.local`, `~/.env`.
#[derive(Debug, Clone, Default)]
pub struct KeyResolver {
    pub explicit_file: Option<PathBuf>,
    pub env_value: Option<String>,
    pub working_dir: PathBuf,
    pub home_dir: Option<PathBuf>,
}

impl KeyResolver {
    pub fn from_process(explicit_file: Option<&Path>) -> Self {
        Self {
            explicit_file: explicit_file.map(Path::to_path_buf),
            env_value: env::var(API_KEY_VAR).ok(),
            working_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            home_dir: env::var_os("HOME")
                .filter(|value| !value.is_empty())
                .map(PathBuf::from),
        }
    }

    pub fn resolve(&self) -> Option<ResolvedKey> {
        if let Some(path) = self.explicit_file.as_ref() {
            if let Some(key) = read_key_from_file(path) {
                return Some(ResolvedKey {
                    key,
                    source: KeySource::ExplicitFile(path.clone()),
                });
            }
        }

        if let Some(key) = self
            .env_value
            .as_deref()
            .filter(|value| !value.is_empty())
        {
            return Some(ResolvedKey {
                key: key.to_string(),
                source: KeySource::Environment,
            });
        }

        for name in [".env.local", ".env"] {
            let path = self.working_dir.join(name);
            if let Some(key) = read_key_from_file(&path) {
                return Some(ResolvedKey {
                    key,
                    source: KeySource::LocalFile(path),
                });
            }
        }

        let home = self.home_dir.as_ref()?;
        for name in [".env.local", ".env"] {
            let path = home.join(name);
            if let Some(key) = read_key_from_file(&path) {
                return Some(ResolvedKey {
                    key,
                    source: KeySource::HomeFile(path),
                });
            }
        }
        None
    }
}

/// First non-empty `GEMINI_API_KEY=` value in the file. Unreadable files yield `None`.
pub fn read_key_from_file(path: &Path) -> Option<String> {
    let raw = fs::read_to_string(path).ok()?;
    parse_key_lines(&raw)
}

fn parse_key_lines(raw: &str) -> Option<String> {
    let prefix = format!("{API_KEY_VAR}=");
    raw.lines()
        .map(str::trim)
        .filter_map(|line| line.strip_prefix(prefix.as_str()))
        .map(|value| value.trim().trim_matches('"').trim_matches('\''))
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

pub fn missing_key_help() -> String {
    [
        format!("{API_KEY_VAR} not found"),
        String::new(),
        "Please set your API key in one of these locations (checked in order):".to_string(),
        "  1. --env-file <path>     (explicit path)".to_string(),
        format!("  2. {API_KEY_VAR}        (environment variable)"),
        "  3. .env.local            (current directory)".to_string(),
        "  4. .env                  (current directory)".to_string(),
        "  5. ~/.env.local          (home directory)".to_string(),
        "  6. ~/.env                (home directory)".to_string(),
        String::new(),
        "Get your API key from: https://aistudio.google.com/".to_string(),
    ]
    .join("\n")
}
