//! Integrity Checker.
//!
//! A package must not be built against linked dependencies: every immediate
//! entry of the dependency root has to be a plain file or directory.

use camino::{Utf8Path, Utf8PathBuf};
use tokio::task::JoinSet;

use crate::error::IntegrityError;

/// Checks every entry under `dependency_root` concurrently, without
/// following links. Fails with the first linked entry in path order.
pub async fn verify_no_linked_modules(dependency_root: &Utf8Path) -> Result<(), IntegrityError> {
    let read_dir = |source| IntegrityError::ReadDir {
        path: dependency_root.to_path_buf(),
        source,
    };

    let mut entries = tokio::fs::read_dir(dependency_root)
        .await
        .map_err(read_dir)?;
    let mut checks = JoinSet::new();

    while let Some(entry) = entries.next_entry().await.map_err(read_dir)? {
        let path = Utf8PathBuf::try_from(entry.path())?;
        checks.spawn(verify_not_linked(path));
    }

    let mut linked = Vec::new();
    let mut checked = 0;
    while let Some(result) = checks.join_next().await {
        checked += 1;
        match result? {
            Ok(()) => {}
            Err(IntegrityError::LinkedModule { path }) => linked.push(path),
            Err(e) => return Err(e),
        }
    }

    linked.sort();
    if let Some(path) = linked.into_iter().next() {
        return Err(IntegrityError::LinkedModule { path });
    }

    tracing::debug!("checked {checked} module(s) in {dependency_root}");
    Ok(())
}

async fn verify_not_linked(path: Utf8PathBuf) -> Result<(), IntegrityError> {
    let metadata = tokio::fs::symlink_metadata(&path)
        .await
        .map_err(|source| IntegrityError::Stat {
            path: path.clone(),
            source,
        })?;

    if metadata.file_type().is_symlink() {
        return Err(IntegrityError::LinkedModule { path });
    }

    Ok(())
}
