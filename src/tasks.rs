//! The task catalogue of an extension workspace.
//!
//! | task                       | depends on     |
//! |----------------------------|----------------|
//! | `copy-scripts`             |                |
//! | `build`                    | `copy-scripts` |
//! | `dev-build`                | `copy-scripts` |
//! | `default`                  | `build`        |
//! | `transifex-push`           | `build`        |
//! | `transifex-push-test`      | `build`        |
//!
//! Everything else stands alone. `package` and `publish` are sequences,
//! `watch` is handled by [`execute`].

use crate::build::{build, clean, copy_scripts};
use crate::core::{Environment, FailurePolicy, Mode};
use crate::engine::{Diagnostics, Orchestrator};
use crate::error::{ExtforgeError, GraphError};
use crate::nls::Localization;
use crate::nls::languages::package_language_files;
use crate::output::write_file;
use crate::sync::SyncTarget;
use crate::workspace::Workspace;

/// Not a graph task: `dev-build` once, then again on every change.
pub const WATCH_TASK: &str = "watch";

pub const PACKAGE_STAGES: [&str; 4] = [
    "verify-no-linked-modules",
    "build",
    "add-i18n",
    "vsce-package",
];
pub const PUBLISH_STAGES: [&str; 4] = [
    "verify-no-linked-modules",
    "build",
    "add-i18n",
    "vsce-publish",
];

/// Builds the orchestrator with every task declared.
pub fn orchestrator(
    workspace: Workspace,
    mode: Mode,
    policy: FailurePolicy,
) -> Result<Orchestrator<Workspace>, GraphError> {
    let mut tasks = Orchestrator::new(Environment::new(mode, workspace), policy);
    declare(&mut tasks)?;
    Ok(tasks)
}

pub fn declare(tasks: &mut Orchestrator<Workspace>) -> Result<(), GraphError> {
    tasks.task("copy-scripts").run(|ctx| async move {
        let ws = ctx.data();
        let out = ws.root.join(ws.out_dir());
        copy_scripts(&ws.root, &ws.config.scripts, &out).await?;
        Ok(())
    })?;

    tasks
        .task("build")
        .depends_on(["copy-scripts"])
        .run(|ctx| async move {
            let ws = ctx.data();
            let localization = Localization::FullLocalize(ws.localize_options().await?);
            build(ws.compiler(), &ws.root, &localization, true).await?;
            Ok(())
        })?;

    tasks
        .task("dev-build")
        .depends_on(["copy-scripts"])
        .run(|ctx| async move {
            let ws = ctx.data();
            build(ws.compiler(), &ws.root, &Localization::PassThrough, false)
                .await?;
            Ok(())
        })?;

    tasks.task("default").depends_on(["build"]).group()?;

    tasks.task("lint").run(|ctx| async move {
        let ws = ctx.data();
        let report = crate::lint::lint(&ws.root, &ws.config.lint).await?;
        if !report.clean {
            tracing::warn!("{} reported problems", ws.config.lint.program);
        }
        Ok(())
    })?;

    tasks.task("clean").run(|ctx| async move {
        let ws = ctx.data();
        let patterns = vec![
            "package.nls.*.json".to_string(),
            format!("{}-*.vsix", ws.config.transifex.extension),
        ];
        let removed = clean(&ws.root, ws.out_dir(), patterns).await?;
        tracing::info!("removed {} path(s)", removed.len());
        Ok(())
    })?;

    tasks.task("verify-no-linked-modules").run(|ctx| async move {
        let ws = ctx.data();
        let dependencies = ws.root.join(&ws.config.dependency_root);
        crate::integrity::verify_no_linked_modules(&dependencies)
            .await?;
        Ok(())
    })?;

    tasks.task("add-i18n").run(|ctx| async move {
        let ws = ctx.data();
        let options = ws.localize_options().await?;
        let files = package_language_files(
            &ws.root,
            &ws.config.package_nls,
            &options.languages,
            &options.translations,
        )
        .await?;

        for file in &files {
            let path = ws.root.join(&file.path);
            write_file(&path, file.contents.as_bytes()).await?;
        }
        tracing::info!("wrote {} manifest translation(s)", files.len());
        Ok(())
    })?;

    tasks.task("vsce-package").run(|ctx| async move {
        let ws = ctx.data();
        crate::package::package(
            &ws.root,
            &ws.config.packager,
            &ws.config.manifest,
            ws.package_path.as_deref(),
        )
        .await?;
        Ok(())
    })?;

    tasks.task("vsce-publish").run(|ctx| async move {
        let ws = ctx.data();
        crate::package::publish(&ws.root, &ws.config.packager).await?;
        Ok(())
    })?;

    tasks
        .task("transifex-push")
        .depends_on(["build"])
        .run(|ctx| async move {
            let ws = ctx.data();
            let unit = crate::sync::exchange_unit(&ws.root, &ws.config.package_nls, ws.out_dir())
                .await?;
            crate::sync::push(ws.service().as_ref(), &ws.config.transifex, &unit)
                .await?;
            Ok(())
        })?;

    tasks
        .task("transifex-push-test")
        .depends_on(["build"])
        .run(|ctx| async move {
            let ws = ctx.data();
            let unit = crate::sync::exchange_unit(&ws.root, &ws.config.package_nls, ws.out_dir())
                .await?;
            let dir = ws.config.push_test_dir(&ws.root);
            crate::sync::push_test(&dir, &ws.config.transifex, &unit)
                .await?;
            Ok(())
        })?;

    tasks.task("transifex-pull").run(|ctx| async move {
        let ws = ctx.data();
        crate::sync::pull(
            ws.service(),
            &ws.config.transifex,
            &ws.config.languages,
            &ws.localization_dir(),
        )
        .await
        .into_result()?;
        Ok(())
    })?;

    tasks.task("i18n-import").run(|ctx| async move {
        let ws = ctx.data();
        crate::sync::import(
            &ws.root,
            &ws.config.translations_dir,
            &ws.localization_dir(),
            &ws.config.languages,
        )
        .await?;
        Ok(())
    })?;

    tasks.task("transifex-sync").run(|ctx| async move {
        let ws = ctx.data();
        let localization_dir = ws.localization_dir();
        let target = SyncTarget {
            root: &ws.root,
            translations_dir: &ws.config.translations_dir,
            localization_dir: &localization_dir,
            languages: &ws.config.languages,
            policy: ws.config.partial_pull,
        };
        crate::sync::sync(ws.service(), &ws.config.transifex, target)
            .await?;
        Ok(())
    })?;

    tasks.sequence("package", PACKAGE_STAGES)?;
    tasks.sequence("publish", PUBLISH_STAGES)?;

    Ok(())
}

/// Runs the task, sequence or watch loop named `name`.
pub async fn execute(
    tasks: &Orchestrator<Workspace>,
    name: &str,
) -> Result<Diagnostics, ExtforgeError> {
    if name == WATCH_TASK {
        return watch(tasks).await;
    }
    Ok(tasks.invoke(name).await?)
}

#[cfg(feature = "live")]
async fn watch(tasks: &Orchestrator<Workspace>) -> Result<Diagnostics, ExtforgeError> {
    let ws = &tasks.env().data;
    let diagnostics = match tasks.run("dev-build").await {
        Ok(diagnostics) => diagnostics,
        Err(e) => {
            tracing::error!("dev-build failed, watching for changes...\n{e}");
            Diagnostics::default()
        }
    };

    tasks.watch(&ws.root, &ws.config.watch, "dev-build").await?;
    Ok(diagnostics)
}

#[cfg(not(feature = "live"))]
async fn watch(_: &Orchestrator<Workspace>) -> Result<Diagnostics, ExtforgeError> {
    Err(GraphError::NotFound(WATCH_TASK.to_string()).into())
}
