//! Command dispatch: wires CLI arguments to services

use std::io;
use std::path::{Path, PathBuf};

use clap::CommandFactory;
use clap_complete::{generate, Shell};
use tracing::{debug, instrument};

use crate::application::services::BuildRequest;
use crate::cli::args::{Cli, Commands, ConfigCommands};
use crate::cli::error::{CliError, CliResult};
use crate::cli::output;
use crate::config::{global_config_path, local_config_path, OutputFormat, Settings};
use crate::domain::ExpandFields;
use crate::infrastructure::{InfraError, ServiceContainer};

/// Options of the `build` subcommand, resolved against settings.
struct BuildArgs<'a> {
    file: &'a Path,
    request: BuildRequest,
    format: OutputFormat,
    output: Option<&'a Path>,
    strict: bool,
}

pub fn execute(cli: &Cli) -> CliResult<()> {
    let config_dir = cli
        .config_dir
        .clone()
        .or_else(|| std::env::current_dir().ok());
    let settings = Settings::load(config_dir.as_deref())?;
    debug!("settings: {:?}", settings);
    let container = ServiceContainer::new(settings);

    match &cli.command {
        Some(Commands::Build {
            file,
            root,
            expand,
            format,
            sort,
            strategy,
            output,
            strict,
        }) => {
            let settings = &container.settings;
            let mut request = BuildRequest::from_settings(settings);
            request.root = root.clone();
            if let Some(expand) = expand {
                request.expand = expand.split(',').collect::<ExpandFields>();
            }
            if let Some(sort) = sort {
                request.sort = *sort;
            }
            if let Some(strategy) = strategy {
                request.strategy = *strategy;
            }
            let args = BuildArgs {
                file,
                request,
                format: format.unwrap_or(settings.output.format),
                output: output.as_deref(),
                strict: *strict,
            };
            cmd_build(&container, args)
        }
        Some(Commands::Roots { file }) => cmd_roots(&container, file),
        Some(Commands::Config { command }) => cmd_config(&container, command, config_dir),
        Some(Commands::Completion { shell }) => {
            cmd_completion(*shell);
            Ok(())
        }
        None => Err(CliError::Usage(
            "no command given, run with --help for usage".to_string(),
        )),
    }
}

#[instrument(level = "debug", skip(container, args), fields(file = %args.file.display()))]
fn cmd_build(container: &ServiceContainer, args: BuildArgs<'_>) -> CliResult<()> {
    let service = container.tree_service();
    let records = service.load_records(args.file)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| InfraError::Runtime {
            message: e.to_string(),
        })?;
    let token = service.cancellation_token();
    let report = runtime.block_on(async {
        let watcher = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                token.cancel();
            }
        });
        let report = service.build(records, &args.request).await;
        watcher.abort();
        report
    })?;

    if report.was_cancelled() {
        return Err(CliError::Cancelled);
    }
    for failure in &report.failures {
        output::warning(failure);
    }

    let rendered = match args.format {
        OutputFormat::Tree => report
            .trees
            .iter()
            .map(|tree| tree.to_tree_string().to_string())
            .collect::<Vec<_>>()
            .join("\n"),
        OutputFormat::Json => report.to_json()?,
    };

    match args.output {
        Some(path) => {
            container
                .fs
                .write(path, &rendered)
                .map_err(|e| InfraError::io(format!("write {}", path.display()), e))?;
            output::success(&format!(
                "wrote {} tree(s) to {}",
                report.trees.len(),
                path.display()
            ));
        }
        None => output::info(&rendered),
    }

    if args.strict && report.has_failures() {
        return Err(CliError::Incomplete {
            count: report.failures.len(),
        });
    }
    Ok(())
}

fn cmd_roots(container: &ServiceContainer, file: &Path) -> CliResult<()> {
    let service = container.tree_service();
    let records = service.load_records(file)?;
    let roots = crate::application::services::TreeService::roots(&records);
    if roots.is_empty() {
        output::warning("no root-level records");
        return Ok(());
    }
    output::header(&format!("{} root record(s)", roots.len()));
    for root in roots {
        let code = root.code.as_deref().unwrap_or("<no code>");
        let id = root
            .id
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "<no id>".to_string());
        match &root.name {
            Some(name) => output::detail(&format!("{} ({}) id={}", code, name, id)),
            None => output::detail(&format!("{} id={}", code, id)),
        }
    }
    Ok(())
}

fn cmd_config(
    container: &ServiceContainer,
    command: &ConfigCommands,
    config_dir: Option<PathBuf>,
) -> CliResult<()> {
    match command {
        ConfigCommands::Show => output::info(&container.settings.to_toml()?),
        ConfigCommands::Path => {
            match global_config_path() {
                Some(path) => output::action("global", &path.display()),
                None => output::action("global", "<unavailable>"),
            }
            match config_dir {
                Some(dir) => output::action("local", &local_config_path(&dir).display()),
                None => output::action("local", "<unavailable>"),
            }
        }
    }
    Ok(())
}

fn cmd_completion(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
}
