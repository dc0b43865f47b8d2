//! Launch policy data
//!
//! The allow-lists enforced by the validator. They are plain data rather
//! than hardcoded checks so a deployment can review and amend the set
//! (extra commands, different package prefixes, wider path roots) without
//! touching validation logic.

use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

/// Pattern for an absolute-path operand (root directories, script paths).
///
/// Deliberately character-restricted; traversal dots are additionally
/// rejected by argument validation before patterns are consulted.
const ABS_PATH_PATTERN: &str = r"^/[A-Za-z0-9_./-]*$";

/// Per-command argument allow-lists for the launchers MCP servers are
/// started with. Every argument must match at least one pattern.
fn default_command_patterns() -> Vec<(&'static str, Vec<Regex>)> {
    vec![
        // npx: node package launcher. Non-interactive flags plus
        // MCP-shaped package names; operands must be absolute paths.
        (
            "npx",
            vec![
                Regex::new(r"^-y$").unwrap(),
                Regex::new(r"^--yes$").unwrap(),
                Regex::new(r"^@modelcontextprotocol/[A-Za-z0-9_-]+$").unwrap(),
                Regex::new(r"^@[a-z0-9][a-z0-9-]*/mcp-[A-Za-z0-9_-]+$").unwrap(),
                Regex::new(r"^mcp-[A-Za-z0-9_-]+$").unwrap(),
                Regex::new(ABS_PATH_PATTERN).unwrap(),
            ],
        ),
        // node: scripts by explicit path only, no eval flags.
        (
            "node",
            vec![
                Regex::new(r"^--version$").unwrap(),
                Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_./-]*\.(js|mjs|cjs)$").unwrap(),
                Regex::new(ABS_PATH_PATTERN).unwrap(),
            ],
        ),
        // python3: module execution only. `-c` matches nothing here and
        // can never pass.
        (
            "python3",
            vec![
                Regex::new(r"^-m$").unwrap(),
                Regex::new(r"^[A-Za-z_][A-Za-z0-9_.]*$").unwrap(),
                Regex::new(ABS_PATH_PATTERN).unwrap(),
            ],
        ),
        // uvx: python package launcher, MCP-shaped packages only.
        (
            "uvx",
            vec![
                Regex::new(r"^mcp-[A-Za-z0-9_-]+$").unwrap(),
                Regex::new(ABS_PATH_PATTERN).unwrap(),
            ],
        ),
    ]
}

/// Environment keys that can hijack process startup. Dropped regardless of
/// the requested value.
const DENIED_ENV_KEYS: &[&str] = &[
    "PATH",
    "LD_PRELOAD",
    "LD_LIBRARY_PATH",
    "LD_AUDIT",
    "DYLD_INSERT_LIBRARIES",
    "DYLD_LIBRARY_PATH",
    "DYLD_FRAMEWORK_PATH",
    "SHELL",
    "PROMPT_COMMAND",
    "IFS",
    "ENV",
    "BASH_ENV",
    "ZDOTDIR",
    "PYTHONSTARTUP",
    "PYTHONPATH",
    "NODE_OPTIONS",
    "PERL5LIB",
    "RUBYOPT",
];

/// Names that can never be registered as servers
const RESERVED_SERVER_NAMES: &[&str] = &["system", "admin", "root", "internal", "default", "all"];

/// Allow-lists consulted by the [`SecurityValidator`](super::SecurityValidator)
#[derive(Debug, Clone)]
pub struct SecurityPolicy {
    /// Command basename to argument patterns; an argument must match one
    pub allowed_commands: HashMap<String, Vec<Regex>>,

    /// Directories searched when resolving a bare command name.
    /// The caller-supplied PATH is never consulted.
    pub command_search_dirs: Vec<PathBuf>,

    /// Environment keys dropped regardless of value (uppercase)
    pub denied_env_keys: HashSet<String>,

    /// PATH handed to child processes in place of the caller-supplied one
    pub child_path: String,

    /// Directory prefixes file paths must stay inside
    pub allowed_path_prefixes: Vec<PathBuf>,

    /// Schemes accepted for resource URIs
    pub allowed_uri_schemes: Vec<String>,

    /// Schemes accepted for http-type server URLs
    pub allowed_url_schemes: Vec<String>,

    /// Server names that can never be registered (lowercase)
    pub reserved_server_names: HashSet<String>,

    /// Maximum length of a single command argument
    pub max_argument_length: usize,
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self {
            allowed_commands: default_command_patterns()
                .into_iter()
                .map(|(name, patterns)| (name.to_string(), patterns))
                .collect(),
            command_search_dirs: vec![
                PathBuf::from("/usr/local/bin"),
                PathBuf::from("/usr/bin"),
                PathBuf::from("/bin"),
                PathBuf::from("/opt/homebrew/bin"),
            ],
            denied_env_keys: DENIED_ENV_KEYS.iter().map(|k| k.to_string()).collect(),
            child_path: "/usr/local/bin:/usr/bin:/bin".to_string(),
            allowed_path_prefixes: vec![
                PathBuf::from("/tmp"),
                PathBuf::from("/var/tmp"),
                PathBuf::from("/home"),
                PathBuf::from("/Users"),
                PathBuf::from("/workspace"),
                PathBuf::from("/opt/mcp"),
            ],
            allowed_uri_schemes: vec!["file".to_string(), "mcp".to_string()],
            allowed_url_schemes: vec!["http".to_string(), "https".to_string()],
            reserved_server_names: RESERVED_SERVER_NAMES.iter().map(|n| n.to_string()).collect(),
            max_argument_length: 2048,
        }
    }
}

impl SecurityPolicy {
    /// Create the default policy
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the executable search directories
    pub fn with_search_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.command_search_dirs = dirs;
        self
    }

    /// Allow an additional command with its argument patterns
    pub fn with_command(mut self, basename: impl Into<String>, patterns: Vec<Regex>) -> Self {
        self.allowed_commands.insert(basename.into(), patterns);
        self
    }

    /// Allow an additional file-path prefix
    pub fn with_path_prefix(mut self, prefix: impl Into<PathBuf>) -> Self {
        self.allowed_path_prefixes.push(prefix.into());
        self
    }

    /// Whether a command basename is on the allow-list
    pub fn is_command_allowed(&self, basename: &str) -> bool {
        self.allowed_commands.contains_key(basename)
    }

    /// Argument patterns for a command basename
    pub fn arg_patterns_for(&self, basename: &str) -> Option<&[Regex]> {
        self.allowed_commands.get(basename).map(|v| v.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_commands() {
        let policy = SecurityPolicy::default();
        for cmd in ["npx", "node", "python3", "uvx"] {
            assert!(policy.is_command_allowed(cmd), "'{}' should be allowed", cmd);
        }
        for cmd in ["bash", "sh", "curl", "rm", "sudo", "python"] {
            assert!(!policy.is_command_allowed(cmd), "'{}' should not be allowed", cmd);
        }
    }

    #[test]
    fn test_npx_patterns() {
        let policy = SecurityPolicy::default();
        let patterns = policy.arg_patterns_for("npx").unwrap();

        let accepted = [
            "-y",
            "--yes",
            "@modelcontextprotocol/server-filesystem",
            "@acme/mcp-search",
            "mcp-weather",
            "/tmp",
        ];
        for arg in accepted {
            assert!(
                patterns.iter().any(|re| re.is_match(arg)),
                "'{}' should match an npx pattern",
                arg
            );
        }

        let rejected = ["evil-package", "@evil/package", "--eval", "tmp"];
        for arg in rejected {
            assert!(
                !patterns.iter().any(|re| re.is_match(arg)),
                "'{}' should not match any npx pattern",
                arg
            );
        }
    }

    #[test]
    fn test_python3_never_accepts_dash_c() {
        let policy = SecurityPolicy::default();
        let patterns = policy.arg_patterns_for("python3").unwrap();
        assert!(!patterns.iter().any(|re| re.is_match("-c")));
        assert!(patterns.iter().any(|re| re.is_match("-m")));
        assert!(patterns.iter().any(|re| re.is_match("mcp_server.files")));
    }

    #[test]
    fn test_denied_env_keys() {
        let policy = SecurityPolicy::default();
        assert!(policy.denied_env_keys.contains("PATH"));
        assert!(policy.denied_env_keys.contains("LD_PRELOAD"));
        assert!(!policy.denied_env_keys.contains("LANG"));
    }

    #[test]
    fn test_reserved_names() {
        let policy = SecurityPolicy::default();
        assert!(policy.reserved_server_names.contains("system"));
        assert!(policy.reserved_server_names.contains("admin"));
        assert!(!policy.reserved_server_names.contains("filesystem"));
    }

    #[test]
    fn test_builders() {
        let policy = SecurityPolicy::default()
            .with_command("deno", vec![Regex::new(r"^run$").unwrap()])
            .with_path_prefix("/srv/data");
        assert!(policy.is_command_allowed("deno"));
        assert!(policy
            .allowed_path_prefixes
            .contains(&PathBuf::from("/srv/data")));
    }
}
