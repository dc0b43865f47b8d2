//! Input validation and secure command construction
//!
//! All checks are allow-list based: the set of legitimate MCP launch
//! commands is small and known, and deny-listing special characters alone
//! does not survive encoding tricks. The only side effects here are
//! filesystem existence/permission probes during command resolution.
//!
//! `build_secure_command` is the single entry point the server lifecycle
//! calls before spawning anything. It fails closed: no partially validated
//! result is ever returned.

use regex::Regex;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use crate::core::{SecurityError, ValidationError, WardenResult};

use super::policy::SecurityPolicy;

/// Maximum length of a server name
const MAX_SERVER_NAME_LEN: usize = 64;

/// Server name grammar
static SERVER_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").unwrap());

/// Shell metacharacters usable for injection. Checked in arguments and in
/// environment values.
const SHELL_METACHARACTERS: &[char] = &[
    ';', '&', '|', '`', '$', '(', ')', '>', '<', '\n', '\r',
];

/// Percent-encoded spellings of a traversal dot pair
const ENCODED_TRAVERSAL: &[&str] = &["%2e%2e", "%2e.", ".%2e"];

/// A fully validated launch command: resolved program, vetted argv tail,
/// filtered environment with an explicit minimal PATH.
#[derive(Debug, Clone)]
pub struct SecureCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
}

impl SecureCommand {
    /// Single-line rendering for logs. Never used to execute anything;
    /// execution always goes through the argv array.
    pub fn display_line(&self) -> String {
        let mut parts = vec![shell_quote(&self.program.to_string_lossy())];
        parts.extend(self.args.iter().map(|a| shell_quote(a)));
        parts.join(" ")
    }
}

/// POSIX single-quote escaping, for display and logging only
fn shell_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_@%+=:,./-".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// Whether two paths refer to the same file (symlink-substitution defense)
fn is_same_file(a: &Path, b: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        match (std::fs::metadata(a), std::fs::metadata(b)) {
            (Ok(ma), Ok(mb)) => ma.dev() == mb.dev() && ma.ino() == mb.ino(),
            _ => false,
        }
    }
    #[cfg(not(unix))]
    {
        match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
            (Ok(ca), Ok(cb)) => ca == cb,
            _ => false,
        }
    }
}

/// Whether a path points at an existing executable regular file
fn is_executable_file(path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

/// Validates launch input against a [`SecurityPolicy`]
#[derive(Debug, Clone, Default)]
pub struct SecurityValidator {
    policy: SecurityPolicy,
}

impl SecurityValidator {
    /// Create a validator over the given policy
    pub fn new(policy: SecurityPolicy) -> Self {
        Self { policy }
    }

    /// The active policy
    pub fn policy(&self) -> &SecurityPolicy {
        &self.policy
    }

    /// Validate a server name: non-empty, at most 64 characters, matching
    /// `[A-Za-z_][A-Za-z0-9_-]*`, and not reserved.
    pub fn validate_server_name(&self, name: &str) -> Result<(), ValidationError> {
        let reject = |reason: &str| ValidationError::ServerName {
            name: name.to_string(),
            reason: reason.to_string(),
        };

        if name.is_empty() {
            return Err(reject("name is empty"));
        }
        if name.len() > MAX_SERVER_NAME_LEN {
            return Err(reject("name is longer than 64 characters"));
        }
        if !SERVER_NAME_RE.is_match(name) {
            return Err(reject(
                "name must start with a letter or underscore and contain only \
                 letters, digits, underscores and dashes",
            ));
        }
        if self
            .policy
            .reserved_server_names
            .contains(&name.to_ascii_lowercase())
        {
            return Err(reject("name is reserved"));
        }
        Ok(())
    }

    /// Validate a single command argument before any escaping happens.
    ///
    /// Rejects shell metacharacters, traversal sequences (plain and
    /// percent-encoded), NUL bytes and over-long arguments.
    pub fn validate_command_argument(&self, arg: &str) -> Result<(), ValidationError> {
        let reject = |reason: String| ValidationError::Argument {
            argument: arg.to_string(),
            reason,
        };

        if arg.contains('\0') {
            return Err(reject("null byte".to_string()));
        }
        if arg.len() > self.policy.max_argument_length {
            return Err(reject(format!(
                "argument exceeds {} characters",
                self.policy.max_argument_length
            )));
        }
        if let Some(c) = arg.chars().find(|c| SHELL_METACHARACTERS.contains(c)) {
            return Err(reject(format!("shell metacharacter {:?}", c)));
        }
        if arg.contains("..") {
            return Err(reject("path traversal sequence".to_string()));
        }
        let lowered = arg.to_ascii_lowercase();
        if ENCODED_TRAVERSAL.iter().any(|t| lowered.contains(t)) {
            return Err(reject("percent-encoded traversal sequence".to_string()));
        }
        Ok(())
    }

    /// Resolve a bare command name to an absolute path.
    ///
    /// Only the policy's fixed directories are searched; the caller's PATH
    /// is never consulted. Names containing separators are rejected
    /// outright.
    pub fn resolve_command_path(&self, base_command: &str) -> Result<PathBuf, SecurityError> {
        let not_resolvable = || SecurityError::CommandNotResolvable {
            command: base_command.to_string(),
        };

        if base_command.is_empty() || base_command.contains('/') || base_command.contains('\\') {
            return Err(not_resolvable());
        }

        for dir in &self.policy.command_search_dirs {
            let candidate = dir.join(base_command);
            if is_executable_file(&candidate) {
                return Ok(candidate);
            }
        }
        Err(not_resolvable())
    }

    /// Validate a resolved command path and its arguments.
    ///
    /// The basename must be allow-listed, the file must be the same one
    /// the allow-listed search directories resolve to (device+inode, not
    /// string equality), and every argument must match one of the
    /// command's allowed patterns. Unmatched arguments are rejected, never
    /// dropped.
    pub fn validate_command(
        &self,
        resolved_path: &Path,
        args: &[String],
    ) -> Result<(), SecurityError> {
        let basename = resolved_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| SecurityError::CommandNotAllowed {
                command: resolved_path.to_string_lossy().into_owned(),
            })?;

        let patterns =
            self.policy
                .arg_patterns_for(basename)
                .ok_or_else(|| SecurityError::CommandNotAllowed {
                    command: basename.to_string(),
                })?;

        let expected = self.resolve_command_path(basename)?;
        if !is_same_file(resolved_path, &expected) {
            return Err(SecurityError::ExecutableMismatch {
                command: basename.to_string(),
            });
        }

        for arg in args {
            if !patterns.iter().any(|re| re.is_match(arg)) {
                return Err(SecurityError::ArgumentNotAllowed {
                    command: basename.to_string(),
                    argument: arg.clone(),
                });
            }
        }
        Ok(())
    }

    /// Quote arguments for display and logging.
    ///
    /// Execution never uses these: processes are spawned from argv arrays,
    /// never from a shell string.
    pub fn sanitize_command_arguments(&self, args: &[String]) -> Vec<String> {
        args.iter().map(|a| shell_quote(a)).collect()
    }

    /// Filter an environment map down to safe entries.
    ///
    /// Denied keys (PATH, LD_PRELOAD, SHELL, ...) are dropped regardless of
    /// value; remaining entries are dropped when the value carries shell
    /// metacharacters or NUL bytes. No PATH is inserted here; the launch
    /// path supplies the explicit minimal one.
    pub fn filter_environment(&self, env: &HashMap<String, String>) -> HashMap<String, String> {
        let mut safe = HashMap::new();
        for (key, value) in env {
            if self
                .policy
                .denied_env_keys
                .contains(&key.to_ascii_uppercase())
            {
                tracing::debug!("[SecurityValidator] Dropping denied env key '{}'", key);
                continue;
            }
            if value.contains('\0')
                || value.chars().any(|c| SHELL_METACHARACTERS.contains(&c))
            {
                tracing::debug!(
                    "[SecurityValidator] Dropping env key '{}' with unsafe value",
                    key
                );
                continue;
            }
            safe.insert(key.clone(), value.clone());
        }
        safe
    }

    /// Validate a file path: absolute, traversal-free, inside one of the
    /// allow-listed directory prefixes.
    pub fn validate_file_path(&self, path: &str) -> Result<(), ValidationError> {
        if path.contains('\0') || path.contains("..") {
            return Err(ValidationError::PathTraversal {
                path: path.to_string(),
            });
        }
        let lowered = path.to_ascii_lowercase();
        if ENCODED_TRAVERSAL.iter().any(|t| lowered.contains(t)) {
            return Err(ValidationError::PathTraversal {
                path: path.to_string(),
            });
        }

        let candidate = Path::new(path);
        let absolute = candidate
            .components()
            .next()
            .is_some_and(|c| matches!(c, Component::RootDir));
        let allowed = absolute
            && self
                .policy
                .allowed_path_prefixes
                .iter()
                .any(|prefix| candidate.starts_with(prefix));
        if !allowed {
            return Err(ValidationError::PathNotAllowed {
                path: path.to_string(),
            });
        }
        Ok(())
    }

    /// Validate a resource URI: allow-listed scheme, and for `file` URIs
    /// the embedded path is re-validated.
    pub fn validate_resource_uri(&self, uri: &str) -> Result<(), ValidationError> {
        let Some((scheme, rest)) = uri.split_once("://") else {
            return Err(ValidationError::Uri {
                uri: uri.to_string(),
                reason: "missing scheme".to_string(),
            });
        };
        let scheme = scheme.to_ascii_lowercase();
        if !self.policy.allowed_uri_schemes.contains(&scheme) {
            return Err(ValidationError::UriScheme {
                uri: uri.to_string(),
            });
        }
        if rest.is_empty() {
            return Err(ValidationError::Uri {
                uri: uri.to_string(),
                reason: "empty body".to_string(),
            });
        }
        if scheme == "file" {
            // file:///tmp/x carries its path after the authority slashes
            self.validate_file_path(rest.trim_start_matches('/'))
                .or_else(|_| self.validate_file_path(&format!("/{}", rest.trim_start_matches('/'))))
                .map_err(|_| ValidationError::Uri {
                    uri: uri.to_string(),
                    reason: "embedded file path is not allowed".to_string(),
                })?;
        }
        Ok(())
    }

    /// Validate the URL of an http-type server against the transport policy
    pub fn validate_http_url(&self, url: &str) -> Result<(), SecurityError> {
        let reject = |reason: &str| SecurityError::UrlNotAllowed {
            url: url.to_string(),
            reason: reason.to_string(),
        };

        let Some((scheme, rest)) = url.split_once("://") else {
            return Err(reject("missing scheme"));
        };
        if !self
            .policy
            .allowed_url_schemes
            .contains(&scheme.to_ascii_lowercase())
        {
            return Err(reject("scheme is not allowed"));
        }
        let host = rest.split('/').next().unwrap_or("");
        if host.is_empty() {
            return Err(reject("missing host"));
        }
        if url.chars().any(|c| c.is_whitespace() || SHELL_METACHARACTERS.contains(&c)) {
            return Err(reject("unsafe character"));
        }
        Ok(())
    }

    /// Build a launch command from untrusted input.
    ///
    /// Validates every argument, resolves the program inside the fixed
    /// search directories, checks command and arguments against the
    /// allow-lists, filters the environment and injects the minimal PATH.
    /// Any failure aborts before a process exists.
    pub fn build_secure_command(
        &self,
        command: &[String],
        env: &HashMap<String, String>,
    ) -> WardenResult<SecureCommand> {
        let (base, args) = command.split_first().ok_or(ValidationError::Argument {
            argument: String::new(),
            reason: "command is empty".to_string(),
        })?;

        self.validate_command_argument(base)?;
        for arg in args {
            self.validate_command_argument(arg)?;
        }

        if !self.policy.is_command_allowed(base) {
            tracing::warn!("[SecurityValidator] Rejected command '{}'", base);
            return Err(SecurityError::CommandNotAllowed {
                command: base.clone(),
            }
            .into());
        }

        let program = self.resolve_command_path(base)?;
        self.validate_command(&program, args)?;

        let mut safe_env = self.filter_environment(env);
        safe_env.insert("PATH".to_string(), self.policy.child_path.clone());

        let secure = SecureCommand {
            program,
            args: args.to_vec(),
            env: safe_env,
        };
        tracing::debug!(
            "[SecurityValidator] Approved launch command: {}",
            secure.display_line()
        );
        Ok(secure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::WardenError;
    use std::fs;
    use tempfile::TempDir;

    fn validator() -> SecurityValidator {
        SecurityValidator::new(SecurityPolicy::default())
    }

    /// Policy whose search directory is a TempDir seeded with fake
    /// executables for the given basenames.
    fn sandboxed_validator(commands: &[&str]) -> (SecurityValidator, TempDir) {
        let dir = TempDir::new().unwrap();
        for name in commands {
            let path = dir.path().join(name);
            fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            }
        }
        let policy = SecurityPolicy::default().with_search_dirs(vec![dir.path().to_path_buf()]);
        (SecurityValidator::new(policy), dir)
    }

    // ── Server names ──

    #[test]
    fn test_valid_server_names() {
        let v = validator();
        for name in ["filesystem", "my-server", "srv_2", "_internal2", "A"] {
            assert!(v.validate_server_name(name).is_ok(), "'{}' should pass", name);
        }
    }

    #[test]
    fn test_invalid_server_names() {
        let v = validator();
        let bad = [
            "",
            "9lives",
            "-dash",
            "has space",
            "has.dot",
            "semi;colon",
            "system",
            "ADMIN",
        ];
        for name in bad {
            assert!(
                v.validate_server_name(name).is_err(),
                "'{}' should be rejected",
                name
            );
        }
        let long = "a".repeat(65);
        assert!(v.validate_server_name(&long).is_err());
    }

    // ── Arguments ──

    #[test]
    fn test_injection_arguments_rejected() {
        let v = validator();
        let hostile = [
            "a;b",
            "a && b",
            "a | b",
            "`id`",
            "$(id)",
            "a\nb",
            "\nrm -rf",
            "a\rb",
            "../etc/passwd",
            "foo/../bar",
            "%2e%2e/secret",
            "%2E%2E/secret",
            ".%2e/secret",
            "a>b",
            "a<b",
            "arg\0null",
        ];
        for arg in hostile {
            assert!(
                v.validate_command_argument(arg).is_err(),
                "'{}' should be rejected",
                arg.escape_debug()
            );
        }
    }

    #[test]
    fn test_benign_arguments_pass() {
        let v = validator();
        for arg in [
            "@modelcontextprotocol/server-filesystem",
            "/tmp",
            "-y",
            "hello world",
            "en_US.UTF-8",
        ] {
            assert!(v.validate_command_argument(arg).is_ok(), "'{}' should pass", arg);
        }
    }

    #[test]
    fn test_overlong_argument_rejected() {
        let v = validator();
        let long = "a".repeat(2049);
        assert!(v.validate_command_argument(&long).is_err());
        let ok = "a".repeat(2048);
        assert!(v.validate_command_argument(&ok).is_ok());
    }

    // ── Resolution ──

    #[test]
    fn test_resolve_in_search_dirs() {
        let (v, dir) = sandboxed_validator(&["npx"]);
        let resolved = v.resolve_command_path("npx").unwrap();
        assert_eq!(resolved, dir.path().join("npx"));
    }

    #[test]
    fn test_resolve_rejects_paths_and_missing() {
        let (v, _dir) = sandboxed_validator(&["npx"]);
        assert!(v.resolve_command_path("missing").is_err());
        assert!(v.resolve_command_path("bin/npx").is_err());
        assert!(v.resolve_command_path("/usr/bin/npx").is_err());
        assert!(v.resolve_command_path("").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_requires_executable_bit() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("npx");
        fs::write(&path, "data").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
        let policy = SecurityPolicy::default().with_search_dirs(vec![dir.path().to_path_buf()]);
        let v = SecurityValidator::new(policy);
        assert!(v.resolve_command_path("npx").is_err());
    }

    // ── Command validation ──

    #[test]
    fn test_disallowed_commands_rejected() {
        let v = validator();
        for cmd in ["/bin/bash", "/usr/bin/curl", "/bin/rm", "/usr/bin/sudo"] {
            let err = v
                .validate_command(Path::new(cmd), &["anything".to_string()])
                .unwrap_err();
            assert!(
                matches!(err, SecurityError::CommandNotAllowed { .. }),
                "'{}' should be CommandNotAllowed, got {:?}",
                cmd,
                err
            );
        }
    }

    #[test]
    fn test_npx_package_allow_list() {
        let (v, _dir) = sandboxed_validator(&["npx"]);
        let resolved = v.resolve_command_path("npx").unwrap();

        assert!(v
            .validate_command(
                &resolved,
                &["@modelcontextprotocol/server-filesystem".to_string()]
            )
            .is_ok());

        let err = v
            .validate_command(&resolved, &["evil-package".to_string()])
            .unwrap_err();
        assert!(matches!(err, SecurityError::ArgumentNotAllowed { .. }));
    }

    #[test]
    fn test_python_dash_c_rejected() {
        let (v, _dir) = sandboxed_validator(&["python3"]);
        let resolved = v.resolve_command_path("python3").unwrap();
        let err = v
            .validate_command(
                &resolved,
                &["-c".to_string(), "print(1)".to_string()],
            )
            .unwrap_err();
        assert!(matches!(err, SecurityError::ArgumentNotAllowed { .. }));

        assert!(v
            .validate_command(&resolved, &["-m".to_string(), "mcp_server".to_string()])
            .is_ok());
    }

    #[test]
    fn test_symlink_substitution_detected() {
        // A different file with the allow-listed basename, outside the
        // search directories, must not validate.
        let (v, _dir) = sandboxed_validator(&["npx"]);
        let other = TempDir::new().unwrap();
        let impostor = other.path().join("npx");
        fs::write(&impostor, "#!/bin/sh\nexit 0\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&impostor, fs::Permissions::from_mode(0o755)).unwrap();
        }
        let err = v.validate_command(&impostor, &[]).unwrap_err();
        assert!(matches!(err, SecurityError::ExecutableMismatch { .. }));
    }

    // ── Quoting ──

    #[test]
    fn test_sanitize_for_display() {
        let v = validator();
        let out = v.sanitize_command_arguments(&[
            "plain".to_string(),
            "has space".to_string(),
            "it's".to_string(),
        ]);
        assert_eq!(out[0], "plain");
        assert_eq!(out[1], "'has space'");
        assert_eq!(out[2], r"'it'\''s'");
    }

    // ── Environment ──

    #[test]
    fn test_filter_environment_drops_path() {
        let v = validator();
        let mut env = HashMap::new();
        env.insert("PATH".to_string(), "/evil".to_string());
        env.insert("LANG".to_string(), "en_US.UTF-8".to_string());

        let safe = v.filter_environment(&env);
        assert!(safe.contains_key("LANG"));
        assert!(!safe.contains_key("PATH"));
    }

    #[test]
    fn test_filter_environment_drops_hijack_keys_and_unsafe_values() {
        let v = validator();
        let mut env = HashMap::new();
        env.insert("LD_PRELOAD".to_string(), "/lib/evil.so".to_string());
        env.insert("path".to_string(), "/evil".to_string());
        env.insert("API_KEY".to_string(), "$(leak)".to_string());
        env.insert("SAFE".to_string(), "value".to_string());

        let safe = v.filter_environment(&env);
        assert_eq!(safe.len(), 1);
        assert!(safe.contains_key("SAFE"));
    }

    // ── Paths and URIs ──

    #[test]
    fn test_file_path_allow_list() {
        let v = validator();
        assert!(v.validate_file_path("/tmp/data.txt").is_ok());
        assert!(v.validate_file_path("/home/user/notes.md").is_ok());
        assert!(v.validate_file_path("/etc/passwd").is_err());
        assert!(v.validate_file_path("relative/path").is_err());
        assert!(matches!(
            v.validate_file_path("/tmp/../etc/passwd"),
            Err(ValidationError::PathTraversal { .. })
        ));
    }

    #[test]
    fn test_resource_uri_schemes() {
        let v = validator();
        assert!(v.validate_resource_uri("file:///tmp/data.txt").is_ok());
        assert!(v.validate_resource_uri("mcp://files/config").is_ok());
        assert!(matches!(
            v.validate_resource_uri("https://example.com/x"),
            Err(ValidationError::UriScheme { .. })
        ));
        assert!(v.validate_resource_uri("no-scheme-here").is_err());
        assert!(v.validate_resource_uri("file:///etc/passwd").is_err());
    }

    #[test]
    fn test_http_url_policy() {
        let v = validator();
        assert!(v.validate_http_url("http://localhost:8005/mcp").is_ok());
        assert!(v.validate_http_url("https://tools.internal/mcp").is_ok());
        assert!(v.validate_http_url("ftp://files.internal/x").is_err());
        assert!(v.validate_http_url("http://").is_err());
        assert!(v.validate_http_url("not a url").is_err());
    }

    // ── build_secure_command ──

    #[test]
    fn test_build_secure_command_full_flow() {
        let (v, dir) = sandboxed_validator(&["npx"]);
        let mut env = HashMap::new();
        env.insert("PATH".to_string(), "/evil".to_string());
        env.insert("LANG".to_string(), "en_US.UTF-8".to_string());

        let secure = v
            .build_secure_command(
                &[
                    "npx".to_string(),
                    "@modelcontextprotocol/server-filesystem".to_string(),
                    "/tmp".to_string(),
                ],
                &env,
            )
            .unwrap();

        assert_eq!(secure.program, dir.path().join("npx"));
        assert_eq!(secure.args.len(), 2);
        assert_eq!(secure.env.get("PATH"), Some(&v.policy().child_path));
        assert_eq!(secure.env.get("LANG"), Some(&"en_US.UTF-8".to_string()));
    }

    #[test]
    fn test_build_secure_command_rejects_bash() {
        let (v, _dir) = sandboxed_validator(&["npx", "bash"]);
        let err = v
            .build_secure_command(
                &["bash".to_string(), "-c".to_string(), "echo hi".to_string()],
                &HashMap::new(),
            )
            .unwrap_err();
        assert!(err.is_security());
    }

    #[test]
    fn test_build_secure_command_validates_arguments_first() {
        let (v, _dir) = sandboxed_validator(&["npx"]);
        let err = v
            .build_secure_command(
                &["npx".to_string(), "pkg; rm -rf /".to_string()],
                &HashMap::new(),
            )
            .unwrap_err();
        assert!(matches!(err, WardenError::Validation(_)));
    }

    #[test]
    fn test_build_secure_command_empty() {
        let v = validator();
        assert!(v.build_secure_command(&[], &HashMap::new()).is_err());
    }
}
