use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use clap::Parser;
use indicatif::MultiProgress;

use kvmcli::batch::{self, BatchOptions};
use kvmcli::cli::{Cli, Command};
use kvmcli::config::{self, Settings};
use kvmcli::declaration;
use kvmcli::error::KvmError;
use kvmcli::provision::Handoff;
use kvmcli::{init, logging, paths, report};

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.log_file.as_deref())?;

    let config_path = paths::find_config(cli.config.as_deref());

    // init works without a config; it only borrows `template_name` if one loads
    if let Command::Init { output } = &cli.command {
        let path = match output {
            Some(p) => p.clone(),
            None => match config::load_config(&config_path) {
                Ok(settings) => settings.template_name,
                Err(e) => {
                    if config_path.exists() {
                        tracing::warn!(
                            path = %config_path.display(),
                            "ignoring unreadable config, writing template to {}: {e}",
                            paths::DEFAULT_BATCH
                        );
                    }
                    None
                }
            }
            .unwrap_or_else(|| PathBuf::from(paths::DEFAULT_BATCH)),
        };
        return init::run(&path).map_err(Into::into);
    }

    let settings = config::load_config(&config_path)?;

    match cli.command {
        Command::Init { .. } => unreachable!(),
        Command::Info { file } => {
            let path = batch_path(file, &settings);
            let batch = declaration::load_batch(&path)?;
            print!(
                "{}",
                report::render_info(&path.display().to_string(), &batch, &settings.defaults)
            );
        }
        Command::Apply {
            file,
            stage_only,
            jobs,
            json,
            virt_install,
        } => {
            let opts = BatchOptions {
                jobs,
                provision: !stage_only,
                virt_install,
            };
            run_apply(&batch_path(file, &settings), &settings, &opts, json, cli.verbose).await?;
        }
    }

    Ok(())
}

fn batch_path(file: Option<PathBuf>, settings: &Settings) -> PathBuf {
    file.or_else(|| settings.yaml_path.clone())
        .unwrap_or_else(|| PathBuf::from(paths::DEFAULT_BATCH))
}

async fn run_apply(
    path: &Path,
    settings: &Settings,
    opts: &BatchOptions,
    json: bool,
    verbose: bool,
) -> Result<(), KvmError> {
    let batch = declaration::load_batch(path)?;

    let progress = (!json && !verbose && std::io::stderr().is_terminal()).then(MultiProgress::new);
    let outcomes = batch::run_batch(&batch, &settings.defaults, opts, progress).await?;

    if json {
        let handoffs: Vec<Handoff> = outcomes
            .iter()
            .map(|o| Handoff::new(o, batch.vms[o.index].provisioner.clone()))
            .collect();
        println!(
            "{}",
            facet_json::to_string(&handoffs).expect("JSON serialization")
        );
    } else {
        print!("{}", report::render_summary(&outcomes));
    }

    let failed = outcomes.iter().filter(|o| o.is_failure()).count();
    if failed > 0 {
        return Err(KvmError::Incomplete {
            failed,
            total: outcomes.len(),
        });
    }
    Ok(())
}
