//! Extraction target description
//!
//! Where the key routine lives and how its arguments are laid out. The
//! defaults describe the QQNT desktop client.

use std::path::PathBuf;

/// Native addon that embeds the patched SQLite
pub const DEFAULT_MODULE: &str = "wrapper.node";
pub const DEFAULT_CODE_SECTION: &str = ".text";
pub const DEFAULT_DATA_SECTION: &str = ".rdata";
/// Diagnostic format string logged by the key routine
pub const DEFAULT_MARKER: &str = "nt_sqlite3_key_v2: db=%p zDb=%s";
/// Schema name passed in `rdx` for the message database
pub const DEFAULT_DATABASE: &str = "main";
pub const DEFAULT_KEY_LEN: usize = 16;
/// Upper bound for the input-idle wait after launching
pub const DEFAULT_IDLE_TIMEOUT_MS: u32 = 30_000;

/// Everything the extractor needs to know about the target binary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionTarget {
    pub module: String,
    pub code_section: String,
    pub data_section: String,
    pub marker: String,
    pub database: String,
    pub key_len: usize,
}

impl Default for ExtractionTarget {
    fn default() -> Self {
        Self {
            module: DEFAULT_MODULE.into(),
            code_section: DEFAULT_CODE_SECTION.into(),
            data_section: DEFAULT_DATA_SECTION.into(),
            marker: DEFAULT_MARKER.into(),
            database: DEFAULT_DATABASE.into(),
            key_len: DEFAULT_KEY_LEN,
        }
    }
}

/// Usual install locations of `QQ.exe`, most specific first
pub fn default_install_paths() -> Vec<PathBuf> {
    let program_files =
        std::env::var("ProgramFiles").unwrap_or_else(|_| r"C:\Program Files".to_string());

    let mut paths = vec![
        PathBuf::from(program_files).join("Tencent").join("QQNT").join("QQ.exe"),
        PathBuf::from(r"C:\Program Files\Tencent\QQNT\QQ.exe"),
        PathBuf::from(r"D:\Program Files\Tencent\QQNT\QQ.exe"),
    ];
    paths.dedup();
    paths
}

/// First existing default install path
pub fn find_installed_client() -> Option<PathBuf> {
    default_install_paths().into_iter().find(|path| path.is_file())
}
