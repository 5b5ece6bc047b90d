use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::provision::VIRT_INSTALL;

#[derive(Parser, Debug)]
#[command(
    name = "kvmcli",
    about = "Provision KVM virtual machines from a YAML declaration file"
)]
pub struct Cli {
    /// Path to config file (default: ./kvmcli.toml, then ~/.config/kvmcli/kvmcli.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Also append logs to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the resolved VMs of a declaration file as a table
    Info {
        /// Declaration file (overrides `yaml_path` from the config)
        file: Option<PathBuf>,
    },

    /// Stage disk images and create the declared VMs
    Apply {
        /// Declaration file (overrides `yaml_path` from the config)
        file: Option<PathBuf>,

        /// Copy images but do not run virt-install
        #[arg(long)]
        stage_only: bool,

        /// Number of VMs processed concurrently
        #[arg(short, long, default_value_t = 1)]
        jobs: usize,

        /// Print the per-VM hand-off as JSON
        #[arg(long)]
        json: bool,

        /// Provisioning program to invoke
        #[arg(long, default_value = VIRT_INSTALL)]
        virt_install: String,
    },

    /// Write a starter declaration file
    Init {
        /// Output path (overrides `template_name` from the config)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}
