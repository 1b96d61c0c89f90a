//! The external packager and publisher.

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use tokio::process::Command;

use crate::config::PackagerConfig;
use crate::error::PackageError;

/// The fields of `package.json` the packager cares about.
#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    pub name: String,
    pub version: String,
}

impl Manifest {
    pub async fn load(path: &Utf8Path) -> Result<Self, PackageError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| PackageError::Manifest {
                path: path.to_path_buf(),
                source,
            })?;

        serde_json::from_str(&text).map_err(|source| PackageError::ManifestFormat {
            path: path.to_path_buf(),
            source,
        })
    }

    /// `<name>-<version>.vsix`
    pub fn artifact_name(&self) -> String {
        format!("{}-{}.vsix", self.name, self.version)
    }
}

/// Packages the extension at `root` into a single installable artifact.
///
/// The artifact lands at `package_path` when given, otherwise at
/// `<root>/<name>-<version>.vsix`. Returns its path.
pub async fn package(
    root: &Utf8Path,
    config: &PackagerConfig,
    manifest: &Utf8Path,
    package_path: Option<&Utf8Path>,
) -> Result<Utf8PathBuf, PackageError> {
    let mut args = config.package_args.clone();

    let artifact = match package_path {
        Some(path) => {
            args.push(config.out_flag.clone());
            args.push(path.to_string());
            root.join(path)
        }
        None => {
            let manifest = Manifest::load(&root.join(manifest)).await?;
            root.join(manifest.artifact_name())
        }
    };

    run(root, &config.program, &args).await?;
    tracing::info!("packaged {artifact}");
    Ok(artifact)
}

/// Publishes the extension at `root`.
pub async fn publish(root: &Utf8Path, config: &PackagerConfig) -> Result<(), PackageError> {
    run(root, &config.program, &config.publish_args).await?;
    tracing::info!("published");
    Ok(())
}

async fn run(root: &Utf8Path, program: &str, args: &[String]) -> Result<(), PackageError> {
    tracing::debug!("{program} {}", args.join(" "));

    let output = Command::new(program)
        .args(args)
        .current_dir(root)
        .output()
        .await
        .map_err(|source| PackageError::Spawn {
            program: program.to_string(),
            source,
        })?;

    for line in String::from_utf8_lossy(&output.stdout).lines() {
        if !line.trim().is_empty() {
            tracing::info!("{program}: {line}");
        }
    }

    if !output.status.success() {
        return Err(PackageError::Failed {
            program: program.to_string(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn workspace() -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        fs::write(
            root.join("package.json"),
            r#"{ "name": "tool", "version": "0.1.0", "publisher": "acme" }"#,
        )
        .unwrap();
        (dir, root)
    }

    #[cfg(unix)]
    fn shell(script: &str) -> PackagerConfig {
        PackagerConfig {
            program: "sh".into(),
            package_args: vec!["-c".into(), script.into(), "sh".into()],
            publish_args: vec!["-c".into(), "exit 3".into()],
            out_flag: "--out".into(),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn artifact_named_after_manifest() {
        let (_dir, root) = workspace();
        let config = shell("touch tool-0.1.0.vsix");

        let artifact = package(&root, &config, Utf8Path::new("package.json"), None)
            .await
            .unwrap();
        assert_eq!(artifact, root.join("tool-0.1.0.vsix"));
        assert!(artifact.is_file());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn override_path_is_passed_through() {
        let (_dir, root) = workspace();
        let config = shell(r#"test "$1" = --out && touch "$2""#);

        let manifest = Utf8Path::new("package.json");
        let artifact = package(&root, &config, manifest, Some(Utf8Path::new("dist.vsix")))
            .await
            .unwrap();
        assert_eq!(artifact, root.join("dist.vsix"));
        assert!(artifact.is_file());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_publisher_is_reported() {
        let (_dir, root) = workspace();
        let result = publish(&root, &shell("")).await;
        assert!(matches!(result, Err(PackageError::Failed { .. })));
    }

    #[tokio::test]
    async fn missing_program() {
        let (_dir, root) = workspace();
        let config = PackagerConfig {
            program: "extforge-no-such-packager".into(),
            ..PackagerConfig::default()
        };
        let result = package(&root, &config, Utf8Path::new("package.json"), None)
            .await;
        assert!(matches!(result, Err(PackageError::Spawn { .. })));
    }
}
