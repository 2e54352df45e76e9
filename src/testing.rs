//! Fixtures shared by unit tests.

use crate::store::FsRuleStore;
use std::path::Path;

/// Write `content` to `root/rel`, creating parent directories.
pub(crate) fn write_rule(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

/// Store over `root` with the default directory names.
pub(crate) fn store_for(root: &Path) -> FsRuleStore {
    FsRuleStore::new(root, "errors", "_errors")
}
