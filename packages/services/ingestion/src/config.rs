use std::path::{Path, PathBuf};
use std::str::FromStr;

/// How a committed dataset reaches the serving process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadMode {
    /// Container supervisor when the environment check succeeds, manual otherwise
    Auto,
    Container,
    InProcess,
    Manual,
}

impl FromStr for ReloadMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(ReloadMode::Auto),
            "container" | "docker" => Ok(ReloadMode::Container),
            "in-process" | "inprocess" | "cache" => Ok(ReloadMode::InProcess),
            "manual" | "none" => Ok(ReloadMode::Manual),
            other => Err(format!("unknown reload mode: {}", other)),
        }
    }
}

#[derive(Clone)]
pub struct Config {
    pub port: u16,
    pub active_dataset_path: PathBuf,
    pub backup_dir: PathBuf,
    pub admin_password: String,
    pub required_columns: Vec<String>,
    pub numeric_columns: Vec<String>,
    pub temporal_column: Option<String>,
    pub max_missing_pct: f64,
    pub csv_delimiter: char,
    pub max_upload_mb: u64,
    pub reload_mode: ReloadMode,
    // Docker Engine API endpoint, e.g. tcp://docker-proxy:2375
    pub docker_host: Option<String>,
    // Falls back to the container hostname when unset
    pub container_name: Option<String>,
    pub container_marker: PathBuf,
    pub reload_grace_ms: u64,
    pub http_timeout_ms: u64,
    pub http_user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8050,
            active_dataset_path: PathBuf::from("FS_selection.csv"),
            backup_dir: PathBuf::from("./backups"),
            admin_password: String::new(),
            required_columns: ["Area", "Year", "Item", "Value", "Unit"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            numeric_columns: vec!["Value".to_string()],
            temporal_column: Some("Year".to_string()),
            max_missing_pct: 98.0,
            csv_delimiter: ',',
            max_upload_mb: 100,
            reload_mode: ReloadMode::Auto,
            docker_host: None,
            container_name: None,
            container_marker: PathBuf::from("/.dockerenv"),
            reload_grace_ms: 1500,
            http_timeout_ms: 5000,
            http_user_agent: "dataset-ingestion/1.0".to_string(),
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("active_dataset_path", &self.active_dataset_path)
            .field("backup_dir", &self.backup_dir)
            .field("admin_password", &"<redacted>")
            .field("required_columns", &self.required_columns)
            .field("numeric_columns", &self.numeric_columns)
            .field("temporal_column", &self.temporal_column)
            .field("max_missing_pct", &self.max_missing_pct)
            .field("reload_mode", &self.reload_mode)
            .field("docker_host", &self.docker_host)
            .field("container_name", &self.container_name)
            .finish_non_exhaustive()
    }
}

impl Config {
    pub fn from_env() -> Self {
    let get = |k: &str| std::env::var(k).ok().filter(|v| !v.trim().is_empty());
    let list = |v: String| -> Vec<String> {
        v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect()
    };
    let defaults = Config::default();

    let port: u16 = get("PORT").and_then(|s| s.parse().ok()).unwrap_or(defaults.port);
    let active_dataset_path = get("ACTIVE_DATASET_PATH").map(PathBuf::from).unwrap_or(defaults.active_dataset_path);
    let container_marker = get("CONTAINER_MARKER").map(PathBuf::from).unwrap_or(defaults.container_marker);
    let backup_dir = resolve_backup_dir(get("BACKUP_DIR").map(PathBuf::from), &container_marker);
    let admin_password = get("ADMIN_PASSWORD").unwrap_or_default();
    let required_columns = get("REQUIRED_COLUMNS").map(list).unwrap_or(defaults.required_columns);
    let numeric_columns = get("NUMERIC_COLUMNS").map(list).unwrap_or(defaults.numeric_columns);
    // TEMPORAL_COLUMN=none turns the year-format check off
    let temporal_column = match get("TEMPORAL_COLUMN") {
        Some(v) if v.eq_ignore_ascii_case("none") => None,
        Some(v) => Some(v),
        None => defaults.temporal_column,
    };
    let max_missing_pct: f64 = get("MAX_MISSING_PCT").and_then(|s| s.parse().ok()).unwrap_or(defaults.max_missing_pct);
    let csv_delimiter = get("CSV_DELIMITER").and_then(|s| s.chars().next()).unwrap_or(defaults.csv_delimiter);
    let max_upload_mb: u64 = get("MAX_UPLOAD_MB").and_then(|s| s.parse().ok()).unwrap_or(defaults.max_upload_mb);
    let reload_mode = match get("RELOAD_MODE") {
        Some(v) => v.parse().unwrap_or_else(|e: String| {
            tracing::warn!(error = %e, "Invalid RELOAD_MODE; using auto");
            ReloadMode::Auto
        }),
        None => defaults.reload_mode,
    };
    let docker_host = get("DOCKER_HOST");
    let container_name = get("CONTAINER_NAME");
    let reload_grace_ms: u64 = get("RELOAD_GRACE_MS").and_then(|s| s.parse().ok()).unwrap_or(defaults.reload_grace_ms);
    let http_timeout_ms: u64 = get("HTTP_TIMEOUT_MS").and_then(|s| s.parse().ok()).unwrap_or(defaults.http_timeout_ms);
    let http_user_agent = get("HTTP_USER_AGENT").unwrap_or(defaults.http_user_agent);

        Self {
            port,
            active_dataset_path,
            backup_dir,
            admin_password,
            required_columns,
            numeric_columns,
            temporal_column,
            max_missing_pct,
            csv_delimiter,
            max_upload_mb,
            reload_mode,
            docker_host,
            container_name,
            container_marker,
            reload_grace_ms,
            http_timeout_ms,
            http_user_agent,
        }
    }

    pub fn max_upload_bytes(&self) -> usize {
        (self.max_upload_mb as usize).saturating_mul(1024 * 1024)
    }
}

pub fn running_in_container(marker: &Path) -> bool {
    marker.exists()
}

/// Picks the backup directory: explicit setting first, then `/app/backups` inside a
/// container image, `./backups` otherwise. Falls back to `./backups` when the preferred
/// directory cannot be created.
pub fn resolve_backup_dir(configured: Option<PathBuf>, container_marker: &Path) -> PathBuf {
    if let Some(dir) = configured {
        return dir;
    }
    let local = PathBuf::from("./backups");
    let preferred = if running_in_container(container_marker) || Path::new("/app").is_dir() {
        PathBuf::from("/app/backups")
    } else {
        local.clone()
    };
    match std::fs::create_dir_all(&preferred) {
        Ok(()) => preferred,
        Err(e) => {
            tracing::warn!(dir = %preferred.display(), error = %e, "Cannot create backup directory; using ./backups");
            local
        }
    }
}
