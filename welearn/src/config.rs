use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::sync::engine::IgnoreList;

pub const DEFAULT_BASE_URL: &str = "https://welearn.iiserkol.ac.in/";
pub const DEFAULT_CALENDAR_ID: &str = "primary";
pub const DEFAULT_TIME_ZONE: &str = "Asia/Kolkata";

#[cfg(windows)]
const CONFIG_FILE_NAME: &str = "welearn.toml";
#[cfg(not(windows))]
const CONFIG_FILE_NAME: &str = ".welearnrc";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("home directory is unavailable")]
    NoHome,
    #[error("cannot read config {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("{} does not exist! Please create an empty directory there", .0.display())]
    PrefixNotDirectory(PathBuf),
    #[error("cannot read credentials: {0}")]
    Prompt(#[source] io::Error),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    pub username: Option<String>,
    pub password: Option<String>,
    pub baseurl: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CoursesSection {
    pub ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FilesSection {
    pub ignore: Vec<String>,
    pub pathprefix: Option<String>,
    pub workers: Option<usize>,
    pub extract: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GcalConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub calendar_id: Option<String>,
    pub timezone: Option<String>,
}

impl GcalConfig {
    pub fn calendar_id(&self) -> &str {
        non_blank(self.calendar_id.as_deref()).unwrap_or(DEFAULT_CALENDAR_ID)
    }

    pub fn time_zone(&self) -> &str {
        non_blank(self.timezone.as_deref()).unwrap_or(DEFAULT_TIME_ZONE)
    }

    /// `(client_id, client_secret)` when both are configured.
    pub fn client_credentials(&self) -> Option<(&str, &str)> {
        Some((
            non_blank(self.client_id.as_deref())?,
            non_blank(self.client_secret.as_deref())?,
        ))
    }
}

/// Contents of the user's config file, after environment overrides.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub auth: AuthSection,
    pub courses: CoursesSection,
    pub files: FilesSection,
    /// Course short name -> roll numbers whose submissions are downloaded.
    pub submissions: BTreeMap<String, Vec<String>>,
    pub gcal: GcalConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Config {
    /// `WELEARN_CONFIG` if set, else the per-user file in the home directory.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHome)?;
        Ok(std::env::var("WELEARN_CONFIG")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(|value| expand_with_home(&value, &home))
            .unwrap_or_else(|| home.join(CONFIG_FILE_NAME)))
    }

    /// Loads the config file and applies environment overrides. A missing file
    /// yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = match std::fs::read_to_string(path) {
            Ok(raw) => Self::parse(path, &raw)?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "config file absent, using defaults");
                Self::default()
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        config.apply_env();
        Ok(config)
    }

    pub fn parse(path: &Path, raw: &str) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply_env(&mut self) {
        if let Some(value) = read_string_env("WELEARN_USERNAME") {
            self.auth.username = Some(value);
        }
        if let Some(value) = read_string_env("WELEARN_PASSWORD") {
            self.auth.password = Some(value);
        }
        if let Some(value) = read_string_env("WELEARN_BASEURL") {
            self.auth.baseurl = Some(value);
        }
        if let Some(value) = read_usize_env("WELEARN_WORKERS") {
            self.files.workers = Some(value);
        }
    }

    pub fn base_url(&self) -> &str {
        non_blank(self.auth.baseurl.as_deref()).unwrap_or(DEFAULT_BASE_URL)
    }

    /// Courses selected by the word `ALL`.
    pub fn all_courses(&self) -> Vec<String> {
        self.courses.ids.iter().filter_map(|id| normalize_course(id)).collect()
    }

    /// The command-line list replaces the configured one.
    pub fn ignore_list(&self, cli: Option<&[String]>) -> IgnoreList {
        match cli {
            Some(types) => IgnoreList::new(types),
            None => IgnoreList::new(&self.files.ignore),
        }
    }

    /// Destination root for downloads and link caches. The command-line value
    /// wins over the config file; whichever is used must be an existing directory.
    pub fn resolve_prefix(&self, cli: Option<&str>) -> Result<PathBuf, ConfigError> {
        let Some(raw) = cli.or(self.files.pathprefix.as_deref()).and_then(|v| non_blank(Some(v)))
        else {
            return Ok(PathBuf::new());
        };
        let home = dirs::home_dir().ok_or(ConfigError::NoHome)?;
        let expanded = expand_with_home(raw, &home);
        let prefix = std::path::absolute(&expanded).unwrap_or(expanded);
        if !prefix.is_dir() {
            return Err(ConfigError::PrefixNotDirectory(prefix));
        }
        Ok(prefix)
    }

    pub fn workers(&self, cli: Option<usize>) -> Option<usize> {
        cli.or(self.files.workers).filter(|value| *value > 0)
    }

    /// Rolls configured under `[submissions]` for `course`.
    pub fn submission_rolls(&self, course: &str) -> Option<Vec<String>> {
        self.submissions
            .iter()
            .find(|(key, _)| key.trim().eq_ignore_ascii_case(course))
            .map(|(_, rolls)| split_rolls(rolls))
    }

    /// Credentials from the config or the environment; anything missing is
    /// asked for on the terminal.
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        let username = match non_blank(self.auth.username.as_deref()) {
            Some(username) => username.to_string(),
            None => prompt_line("Username : ").map_err(ConfigError::Prompt)?,
        };
        let password = match self.auth.password.as_deref().filter(|p| !p.is_empty()) {
            Some(password) => password.to_string(),
            None => rpassword::prompt_password("Password : ").map_err(ConfigError::Prompt)?,
        };
        Ok(Credentials { username, password })
    }
}

/// Roll numbers given as `a,b c`, uppercased, empties dropped.
pub fn split_rolls<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
    raw.iter()
        .flat_map(|chunk| {
            chunk
                .as_ref()
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|roll| !roll.is_empty())
                .map(str::to_uppercase)
                .collect::<Vec<_>>()
        })
        .collect()
}

pub fn normalize_course(id: &str) -> Option<String> {
    let id = id.trim();
    (!id.is_empty()).then(|| id.to_uppercase())
}

pub fn expand_with_home(value: &str, home: &Path) -> PathBuf {
    if value == "~" {
        return home.to_path_buf();
    }
    if let Some(rest) = value.strip_prefix("~/") {
        return home.join(rest);
    }
    PathBuf::from(value)
}

fn prompt_line(prompt: &str) -> io::Result<String> {
    print!("{prompt}");
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn read_string_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn read_usize_env(name: &str) -> Option<usize> {
    std::env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .filter(|value| *value > 0)
}
