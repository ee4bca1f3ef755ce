//! Purpose: Shared local store-directory resolution.
//! Exports: `default_store_dir`.
//! Role: Keep the CLI and embedders on the same default location.
//! Invariants: Default store directory remains `~/.basalt/store`.

use std::path::PathBuf;

pub fn default_store_dir() -> PathBuf {
    let home = std::env::var_os("HOME").unwrap_or_default();
    PathBuf::from(home).join(".basalt").join("store")
}

#[cfg(test)]
mod tests {
    use super::default_store_dir;

    #[test]
    fn default_dir_is_under_home() {
        assert!(default_store_dir().ends_with(".basalt/store"));
    }
}
