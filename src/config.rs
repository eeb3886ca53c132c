//! Bridge configuration
//!
//! Script file names are relative to the server's `scriptfiles/` directory.
//! Leading `.`, `\` and `/` characters are stripped so a script cannot climb
//! out of it with `../`, and the result is cut to the platform's
//! `FILENAME_MAX - 1` bytes.

use std::num::NonZeroUsize;

/// Directory every script path is resolved under
pub const SCRIPT_ROOT: &str = "scriptfiles/";

/// C `FILENAME_MAX` of the platform the host was built for
#[cfg(windows)]
pub const FILENAME_MAX: usize = 260;
#[cfg(not(windows))]
pub const FILENAME_MAX: usize = 4096;

/// Compiled XPath expressions kept by default
pub const DEFAULT_XPATH_CACHE: usize = 64;

/// Environment variable holding the tracing filter
pub const LOG_ENV: &str = "SAMP_XML_LOG";

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Prefix for every normalized path, `scriptfiles/` in production
    pub root: String,
    /// Longest normalized path in bytes
    pub max_path: usize,
    pub xpath_cache_capacity: NonZeroUsize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            root: SCRIPT_ROOT.to_string(),
            max_path: FILENAME_MAX - 1,
            xpath_cache_capacity: NonZeroUsize::new(DEFAULT_XPATH_CACHE).unwrap_or(NonZeroUsize::MIN),
        }
    }
}

impl BridgeConfig {
    /// Production settings with paths resolved under `root` instead.
    /// `root` should end with a separator.
    pub fn with_root(root: impl Into<String>) -> Self {
        BridgeConfig {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Map a script-supplied file name to the path actually opened.
    pub fn complete_path(&self, filename: &str) -> String {
        let relative = filename.trim_start_matches(['.', '\\', '/']);
        let mut path = String::with_capacity(self.root.len() + relative.len());
        path.push_str(&self.root);
        path.push_str(relative);

        if path.len() > self.max_path {
            let mut end = self.max_path;
            while !path.is_char_boundary(end) {
                end -= 1;
            }
            path.truncate(end);
        }
        path
    }
}
