//! Pre-connection validation of MCP server configurations.
//!
//! `validate` answers "can this plausibly be connected to" without starting
//! an MCP session: required fields, path and command existence, argument
//! sanity. Every finding becomes structured data; the call itself never
//! fails. Results are cached per config fingerprint so the UI can re-render
//! without hammering the filesystem.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

use super::config::{
    CustomConfig, FilesystemConfig, GithubConfig, PostgresConfig, ServerConfig, ServerDefinition,
    SqliteConfig,
};

/// MCP protocol revision this client speaks.
pub const SUPPORTED_PROTOCOL_VERSION: &str = "2024-11-05";

/// Cached results are trusted for this long before the probes re-run.
const CACHE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    RequiredFieldMissing,
    InvalidFormat,
    FileNotFound,
    DirectoryNotFound,
    CommandNotFound,
    InvalidEnvVar,
    InvalidPort,
    InvalidUrl,
    PermissionDenied,
    McpVersionMismatch,
    NpxNotAvailable,
    GithubTokenInvalid,
    DatabaseConnectionStringInvalid,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
    pub code: ErrorCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolCompatibility {
    pub compatible: bool,
    pub supported: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared: Option<String>,
}

struct CacheEntry {
    result: ValidationResult,
    inserted_at: Instant,
}

/// Validates server definitions and caches the verdicts.
pub struct McpValidator {
    cache: Mutex<HashMap<String, CacheEntry>>,
    supported_protocol: &'static str,
}

impl Default for McpValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl McpValidator {
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
            supported_protocol: SUPPORTED_PROTOCOL_VERSION,
        }
    }

    /// Validate a server definition. Never fails; all findings land in the
    /// returned `errors` and `warnings`. A repeated call with an identical
    /// id + config inside the cache TTL returns the cached result without
    /// touching the filesystem.
    pub async fn validate(&self, server: &ServerDefinition) -> ValidationResult {
        let fingerprint = fingerprint(server);

        {
            let cache = self.cache.lock().await;
            if let Some(entry) = cache.get(&fingerprint) {
                if entry.inserted_at.elapsed() < CACHE_TTL {
                    debug!(server = %server.id, "validation cache hit");
                    return entry.result.clone();
                }
            }
        }

        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        validate_basics(server, &mut errors, &mut warnings);

        match &server.config {
            ServerConfig::Filesystem(config) => {
                validate_filesystem(config, &mut errors, &mut warnings).await;
            }
            ServerConfig::Github(config) => validate_github(config, &mut errors),
            ServerConfig::Postgres(config) => validate_postgres(config, &mut errors),
            ServerConfig::Sqlite(config) => {
                validate_sqlite(config, &mut errors, &mut warnings).await;
            }
            ServerConfig::Custom(config) => {
                validate_custom(config, &mut errors, &mut warnings).await;
            }
        }

        // Built-in server types are launched through npx, so its absence
        // breaks every one of them regardless of the per-type findings.
        if !matches!(server.config, ServerConfig::Custom(_)) && which::which("npx").is_err() {
            errors.push(ValidationError {
                field: "config".to_string(),
                message: "npx is not available on PATH".to_string(),
                code: ErrorCode::NpxNotAvailable,
                remediation: Some(
                    "Install Node.js (which provides npx) and restart the application".to_string(),
                ),
            });
        }

        let compatibility = self.protocol_compatibility();
        if !compatibility.compatible {
            warnings.push(ValidationWarning {
                field: "protocolVersion".to_string(),
                message: format!(
                    "server declares protocol {} but this client supports {}",
                    compatibility.declared.as_deref().unwrap_or("unknown"),
                    compatibility.supported
                ),
                suggestion: Some("Update the server package to a compatible release".to_string()),
            });
        }

        let result = ValidationResult {
            valid: errors.is_empty(),
            errors,
            warnings,
        };

        let mut cache = self.cache.lock().await;
        cache.insert(
            fingerprint,
            CacheEntry {
                result: result.clone(),
                inserted_at: Instant::now(),
            },
        );

        result
    }

    /// Drop every cached verdict.
    pub async fn clear_cache(&self) {
        self.cache.lock().await.clear();
    }

    /// Protocol compatibility against the single supported revision. No
    /// handshake happens during validation, so nothing is declared and the
    /// check passes.
    pub fn protocol_compatibility(&self) -> ProtocolCompatibility {
        // TODO(negotiation): compare the candidate server's revision once the
        // connection layer surfaces it from the MCP initialize response.
        ProtocolCompatibility {
            compatible: true,
            supported: self.supported_protocol.to_string(),
            declared: None,
        }
    }

    /// Flatten errors into display strings, folding in remediation text.
    pub fn error_messages(&self, errors: &[ValidationError]) -> Vec<String> {
        errors
            .iter()
            .map(|error| match &error.remediation {
                Some(remediation) => format!("{} ({})", error.message, remediation),
                None => error.message.clone(),
            })
            .collect()
    }

    /// Flatten warnings into display strings, folding in suggestion text.
    pub fn warning_messages(&self, warnings: &[ValidationWarning]) -> Vec<String> {
        warnings
            .iter()
            .map(|warning| match &warning.suggestion {
                Some(suggestion) => format!("{} ({})", warning.message, suggestion),
                None => warning.message.clone(),
            })
            .collect()
    }
}

/// Cache key: server id plus a digest of the serialized config. Any change
/// inside `config` produces a different key; unrelated definition fields
/// (status, tools) do not.
fn fingerprint(server: &ServerDefinition) -> String {
    let serialized = serde_json::to_string(&server.config)
        .unwrap_or_else(|_| format!("{:?}", server.config));
    let mut hasher = Sha256::new();
    hasher.update(serialized.as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|byte| format!("{byte:02x}")).collect();
    format!("{}:{}", server.id, hex)
}

fn required(field: &str) -> ValidationError {
    ValidationError {
        field: field.to_string(),
        message: format!("{field} is required"),
        code: ErrorCode::RequiredFieldMissing,
        remediation: Some(format!("Set {field} in the server configuration")),
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map(str::trim).unwrap_or("").is_empty()
}

fn validate_basics(
    server: &ServerDefinition,
    errors: &mut Vec<ValidationError>,
    warnings: &mut Vec<ValidationWarning>,
) {
    if server.id.trim().is_empty() {
        errors.push(required("id"));
    }
    if server.name.trim().is_empty() {
        errors.push(required("name"));
    } else if !server
        .name
        .chars()
        .all(|ch| ch.is_alphanumeric() || matches!(ch, ' ' | '-' | '_' | '.'))
    {
        warnings.push(ValidationWarning {
            field: "name".to_string(),
            message: "name contains unusual characters".to_string(),
            suggestion: Some(
                "Stick to letters, digits, spaces, dashes and underscores".to_string(),
            ),
        });
    }
}

async fn validate_filesystem(
    config: &FilesystemConfig,
    errors: &mut Vec<ValidationError>,
    warnings: &mut Vec<ValidationWarning>,
) {
    let Some(root_path) = config.root_path.as_deref().filter(|p| !p.trim().is_empty()) else {
        errors.push(required("config.rootPath"));
        return;
    };

    match fs::metadata(root_path).await {
        Ok(metadata) if metadata.is_dir() => {}
        Ok(_) => errors.push(ValidationError {
            field: "config.rootPath".to_string(),
            message: format!("{root_path} exists but is not a directory"),
            code: ErrorCode::DirectoryNotFound,
            remediation: Some("Point rootPath at a directory".to_string()),
        }),
        Err(error) if error.kind() == std::io::ErrorKind::PermissionDenied => {
            errors.push(ValidationError {
                field: "config.rootPath".to_string(),
                message: format!("{root_path} is not accessible"),
                code: ErrorCode::PermissionDenied,
                remediation: Some("Grant read access to the directory".to_string()),
            });
        }
        Err(_) => errors.push(ValidationError {
            field: "config.rootPath".to_string(),
            message: format!("directory does not exist: {root_path}"),
            code: ErrorCode::DirectoryNotFound,
            remediation: Some("Create the directory or pick an existing one".to_string()),
        }),
    }

    for (field, entries) in [
        ("config.allowedPaths", &config.allowed_paths),
        ("config.excludePaths", &config.exclude_paths),
    ] {
        for entry in entries {
            if !Path::new(entry).is_absolute() {
                warnings.push(ValidationWarning {
                    field: field.to_string(),
                    message: format!("{entry} is not an absolute path"),
                    suggestion: Some("Use absolute paths to avoid ambiguity".to_string()),
                });
            }
        }
    }
}

fn validate_github(config: &GithubConfig, errors: &mut Vec<ValidationError>) {
    match config.token.as_deref().map(str::trim) {
        None | Some("") => errors.push(required("config.token")),
        Some(token) if !github_token_pattern().is_match(token) => {
            errors.push(ValidationError {
                field: "config.token".to_string(),
                message: "token does not look like a GitHub personal access token".to_string(),
                code: ErrorCode::GithubTokenInvalid,
                remediation: Some(
                    "Generate a token under GitHub Settings > Developer settings; it starts with ghp_, gho_, ghu_ or ghs_".to_string(),
                ),
            });
        }
        Some(_) => {}
    }

    if is_blank(&config.owner) {
        errors.push(required("config.owner"));
    }
    if is_blank(&config.repo) {
        errors.push(required("config.repo"));
    }
}

fn validate_postgres(config: &PostgresConfig, errors: &mut Vec<ValidationError>) {
    if is_blank(&config.host) {
        errors.push(required("config.host"));
    }
    if is_blank(&config.database) {
        errors.push(required("config.database"));
    }
    if is_blank(&config.username) {
        errors.push(required("config.username"));
    }
    // An empty password counts as provided; only an absent value errors.
    if config.password.is_none() {
        errors.push(required("config.password"));
    }
    if let Some(port) = config.port {
        if port == 0 || port > 65_535 {
            errors.push(ValidationError {
                field: "config.port".to_string(),
                message: format!("port {port} is out of range"),
                code: ErrorCode::InvalidPort,
                remediation: Some("Use a port between 1 and 65535".to_string()),
            });
        }
    }
}

async fn validate_sqlite(
    config: &SqliteConfig,
    errors: &mut Vec<ValidationError>,
    warnings: &mut Vec<ValidationWarning>,
) {
    let Some(path) = config.path.as_deref().filter(|p| !p.trim().is_empty()) else {
        errors.push(required("config.path"));
        return;
    };

    match fs::metadata(path).await {
        Ok(metadata) if metadata.is_file() => {}
        Ok(_) => warnings.push(ValidationWarning {
            field: "config.path".to_string(),
            message: format!("{path} exists but is not a regular file"),
            suggestion: Some("Point path at a SQLite database file".to_string()),
        }),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            // The database may be created on first connect, but only inside
            // an existing, writable directory.
            let parent = match Path::new(path).parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => Path::new(".").to_path_buf(),
            };
            match fs::metadata(&parent).await {
                Ok(metadata) if metadata.is_dir() => {
                    if metadata.permissions().readonly() {
                        errors.push(ValidationError {
                            field: "config.path".to_string(),
                            message: format!(
                                "parent directory {} is not writable",
                                parent.display()
                            ),
                            code: ErrorCode::PermissionDenied,
                            remediation: Some(
                                "Make the directory writable or pick another location".to_string(),
                            ),
                        });
                    }
                }
                _ => errors.push(ValidationError {
                    field: "config.path".to_string(),
                    message: format!("parent directory {} does not exist", parent.display()),
                    code: ErrorCode::DirectoryNotFound,
                    remediation: Some("Create the parent directory first".to_string()),
                }),
            }
        }
        Err(error) if error.kind() == std::io::ErrorKind::PermissionDenied => {
            errors.push(ValidationError {
                field: "config.path".to_string(),
                message: format!("{path} is not accessible"),
                code: ErrorCode::PermissionDenied,
                remediation: Some("Grant read access to the database file".to_string()),
            });
        }
        Err(_) => errors.push(ValidationError {
            field: "config.path".to_string(),
            message: format!("cannot inspect {path}"),
            code: ErrorCode::FileNotFound,
            remediation: None,
        }),
    }
}

async fn validate_custom(
    config: &CustomConfig,
    errors: &mut Vec<ValidationError>,
    warnings: &mut Vec<ValidationWarning>,
) {
    let Some(command) = config.command.as_deref().filter(|c| !c.trim().is_empty()) else {
        errors.push(required("config.command"));
        return;
    };

    validate_command_exists(command, errors).await;

    match command {
        "npx" => validate_npx_args(&config.args, warnings),
        "uvx" | "pipx" => {
            if first_positional(&config.args).is_none() {
                warnings.push(ValidationWarning {
                    field: "config.args".to_string(),
                    message: format!("{command} is given no package to run"),
                    suggestion: Some(
                        "Pass the server package name, e.g. mcp-server-fetch".to_string(),
                    ),
                });
            }
        }
        _ => {}
    }

    for (name, value) in &config.env {
        if !env_name_pattern().is_match(name) {
            errors.push(ValidationError {
                field: "config.env".to_string(),
                message: format!("{name} is not a valid environment variable name"),
                code: ErrorCode::InvalidEnvVar,
                remediation: Some(
                    "Names must start with a letter or underscore and contain only letters, digits and underscores".to_string(),
                ),
            });
        }
        if !value.is_string() {
            errors.push(ValidationError {
                field: "config.env".to_string(),
                message: format!("value of {name} must be a string"),
                code: ErrorCode::InvalidEnvVar,
                remediation: Some("Quote the value in the server configuration".to_string()),
            });
        }
    }

    if let Some(cwd) = config.cwd.as_deref().filter(|c| !c.trim().is_empty()) {
        match fs::metadata(cwd).await {
            Ok(metadata) if metadata.is_dir() => {}
            _ => errors.push(ValidationError {
                field: "config.cwd".to_string(),
                message: format!("working directory does not exist: {cwd}"),
                code: ErrorCode::DirectoryNotFound,
                remediation: Some("Create the directory or remove cwd".to_string()),
            }),
        }
    }
}

async fn validate_command_exists(command: &str, errors: &mut Vec<ValidationError>) {
    let path = Path::new(command);
    if path.is_absolute() {
        match fs::metadata(path).await {
            Ok(metadata) if metadata.is_file() => {
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    if metadata.permissions().mode() & 0o111 == 0 {
                        errors.push(ValidationError {
                            field: "config.command".to_string(),
                            message: format!("{command} is not executable"),
                            code: ErrorCode::PermissionDenied,
                            remediation: Some(format!("Run chmod +x {command}")),
                        });
                    }
                }
            }
            Ok(_) => errors.push(ValidationError {
                field: "config.command".to_string(),
                message: format!("{command} is not a regular file"),
                code: ErrorCode::CommandNotFound,
                remediation: None,
            }),
            Err(_) => errors.push(ValidationError {
                field: "config.command".to_string(),
                message: format!("command not found: {command}"),
                code: ErrorCode::CommandNotFound,
                remediation: Some("Install the command or correct the path".to_string()),
            }),
        }
    } else if which::which(command).is_err() {
        errors.push(ValidationError {
            field: "config.command".to_string(),
            message: format!("command not found on PATH: {command}"),
            code: ErrorCode::CommandNotFound,
            remediation: Some(format!("Install {command} or use an absolute path")),
        });
    }
}

fn validate_npx_args(args: &[String], warnings: &mut Vec<ValidationWarning>) {
    let Some(target) = first_positional(args) else {
        warnings.push(ValidationWarning {
            field: "config.args".to_string(),
            message: "npx is given no package to run".to_string(),
            suggestion: Some(
                "Pass the server package, e.g. -y @modelcontextprotocol/server-filesystem"
                    .to_string(),
            ),
        });
        return;
    };

    if let Some(spec) = target.strip_prefix("github:") {
        let mut segments = spec.split('/').filter(|s| !s.is_empty());
        let owner = segments.next();
        let repo = segments.next();
        if owner.is_none() || repo.is_none() || segments.next().is_some() {
            warnings.push(ValidationWarning {
                field: "config.args".to_string(),
                message: format!("{target} is not a valid github:owner/repo spec"),
                suggestion: Some("Use the form github:owner/repo".to_string()),
            });
        }
    } else if !is_valid_npm_package_name(target) {
        warnings.push(ValidationWarning {
            field: "config.args".to_string(),
            message: format!("{target} does not look like an npm package name"),
            suggestion: Some(
                "npm names are lowercase, optionally scoped as @scope/name".to_string(),
            ),
        });
    }
}

/// First argument that is not a flag: the package the runner targets.
fn first_positional(args: &[String]) -> Option<&str> {
    args.iter()
        .map(String::as_str)
        .find(|arg| !arg.starts_with('-'))
}

fn is_valid_npm_package_name(name: &str) -> bool {
    fn valid_segment(segment: &str) -> bool {
        !segment.is_empty()
            && segment.chars().all(|ch| {
                ch.is_ascii_lowercase() || ch.is_ascii_digit() || matches!(ch, '.' | '-' | '_')
            })
    }

    if name.is_empty() || name.chars().any(|ch| ch.is_ascii_uppercase()) {
        return false;
    }

    if let Some(rest) = name.strip_prefix('@') {
        let mut parts = rest.split('/');
        let scope = parts.next().unwrap_or_default();
        let package = parts.next().unwrap_or_default();
        if parts.next().is_some() {
            return false;
        }
        return valid_segment(scope) && valid_segment(package);
    }

    valid_segment(name)
}

fn github_token_pattern() -> &'static regex::Regex {
    static PATTERN: OnceLock<regex::Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        regex::Regex::new(r"^(ghp|gho|ghu|ghs)_[A-Za-z0-9]+$").expect("valid token pattern")
    })
}

fn env_name_pattern() -> &'static regex::Regex {
    static PATTERN: OnceLock<regex::Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        regex::Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("valid env name pattern")
    })
}
