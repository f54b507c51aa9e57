use std::path::{Path, PathBuf};

pub const STORAGE_DIR: [&str; 2] = [".chat_client", "storage"];

#[must_use]
pub fn storage_root(base: &Path) -> PathBuf {
    base.join(STORAGE_DIR[0]).join(STORAGE_DIR[1])
}

#[must_use]
pub fn storage_file_name(key: &str) -> String {
    format!("{key}.json")
}
