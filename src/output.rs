//! The output sink.
//!
//! Artifacts are written as they arrive, concurrently. Compiled units land
//! under the output root; bundler resources are relative to the workspace
//! root. Every file is overwritten wholesale.

use camino::{Utf8Path, Utf8PathBuf};
use tokio::task::JoinSet;

use crate::compiler::CompiledUnit;
use crate::error::BuildError;
use crate::nls::Artifact;

pub struct OutputSink {
    root: Utf8PathBuf,
    out_dir: Utf8PathBuf,
    writes: JoinSet<Result<Utf8PathBuf, BuildError>>,
}

impl OutputSink {
    pub fn new(root: impl Into<Utf8PathBuf>, out_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            root: root.into(),
            out_dir: out_dir.into(),
            writes: JoinSet::new(),
        }
    }

    /// Schedules the write of one artifact.
    pub fn write(&mut self, artifact: Artifact) -> Result<(), BuildError> {
        match artifact {
            Artifact::Unit(unit) => self.write_unit(unit)?,
            Artifact::Localized(bundle) => {
                let contents = bundle.to_json()?;
                self.spawn(self.root.join(&bundle.path), contents);
            }
            Artifact::Resource(file) => self.spawn(self.root.join(&file.path), file.contents),
        }
        Ok(())
    }

    fn write_unit(&mut self, unit: CompiledUnit) -> Result<(), BuildError> {
        let path = self.out_dir.join(&unit.path);
        let mut contents = unit.contents;

        if let Some(map) = &unit.source_map {
            let name = format!(
                "{}.map",
                unit.path.file_name().unwrap_or(unit.path.as_str())
            );
            let map_path = path.with_file_name(&name);
            let map = crate::nls::to_json(&map_path, map)?;

            if !contents.is_empty() && !contents.ends_with('\n') {
                contents.push('\n');
            }
            contents.push_str(&format!("//# sourceMappingURL={name}\n"));
            self.spawn(map_path, map);
        }

        self.spawn(path, contents);
        Ok(())
    }

    fn spawn(&mut self, path: Utf8PathBuf, contents: String) {
        self.writes.spawn(async move {
            write_file(&path, contents.as_bytes()).await?;
            Ok(path)
        });
    }

    /// Waits for every scheduled write. Returns the written paths, sorted.
    pub async fn finish(mut self) -> Result<Vec<Utf8PathBuf>, BuildError> {
        let mut written = Vec::new();
        while let Some(result) = self.writes.join_next().await {
            written.push(result??);
        }
        written.sort();
        Ok(written)
    }
}

pub(crate) async fn write_file(path: &Utf8Path, contents: &[u8]) -> Result<(), BuildError> {
    if let Some(parent) = path.parent()
        && !parent.as_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| BuildError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
    }

    tokio::fs::write(path, contents)
        .await
        .map_err(|source| BuildError::Write {
            path: path.to_path_buf(),
            source,
        })
}
