use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::Parser;
use console::style;
use extforge::{FailurePolicy, Mode, Workspace, tasks};

/// Builds, localizes, packages and publishes an editor extension.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Task or sequence to run, `watch` to keep rebuilding.
    #[arg(default_value = "default")]
    task: String,

    /// Where to write the packaged extension.
    #[arg(long = "packagePath", alias = "package-path")]
    package_path: Option<Utf8PathBuf>,

    /// Config file, `extforge.json` by default.
    #[arg(long)]
    config: Option<Utf8PathBuf>,

    /// Workspace root.
    #[arg(long, default_value = ".")]
    cwd: Utf8PathBuf,

    #[arg(long, env = "TRANSIFEX_API_TOKEN", hide_env_values = true)]
    transifex_token: Option<String>,

    /// Skip the dependents of a failed task instead of stopping at once.
    #[arg(long)]
    keep_going: bool,

    /// Print the available tasks and exit.
    #[arg(long)]
    list: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    extforge::init_logging();

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> anyhow::Result<ExitCode> {
    let mode = match args.task.as_str() {
        tasks::WATCH_TASK => Mode::Watch,
        _ => Mode::Build,
    };
    let policy = match (mode, args.keep_going) {
        (Mode::Watch, _) | (_, true) => FailurePolicy::Continue,
        _ => FailurePolicy::FailFast,
    };

    let root = args.cwd.canonicalize_utf8()?;
    let workspace = Workspace::load(&root, args.config.as_deref(), args.transifex_token)?
        .with_package_path(args.package_path);
    let orchestrator = tasks::orchestrator(workspace, mode, policy)?;

    if args.list {
        for name in orchestrator.task_names() {
            println!("{name}");
        }
        println!("{}", tasks::WATCH_TASK);
        return Ok(ExitCode::SUCCESS);
    }

    eprintln!(
        "Running {} in {} mode.",
        style("extforge").red(),
        style(mode).blue()
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    match runtime.block_on(tasks::execute(&orchestrator, &args.task)) {
        Ok(diagnostics) => tracing::info!("finished {}\n{diagnostics}", args.task),
        Err(e) => {
            tracing::error!("{e}");
            return Ok(ExitCode::FAILURE);
        }
    }

    if orchestrator.has_failed() {
        return Ok(ExitCode::FAILURE);
    }

    Ok(ExitCode::SUCCESS)
}
