// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use bundlesync::{
    config::Settings,
    ingest::IngestionController,
    path::config_file,
    report::Reporter,
    watch::ArchiveWatcher,
    workspace::Workspace,
};

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::{
    fs::{canonicalize, read_to_string},
    io::{stdout, IsTerminal},
    path::PathBuf,
    process::exit,
};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(about, version)]
struct Cli {
    /// Directory to watch for new bundles.
    #[arg(short, long, value_name = "path")]
    pub root: Option<PathBuf>,

    /// Settings file to use instead of the default lookup.
    #[arg(short, long, value_name = "path")]
    pub config: Option<PathBuf>,

    /// Name of project, used for archive names and remote URL.
    #[arg(short, long, env = "PROJECT_NAME", value_name = "name")]
    pub project: Option<String>,
}

impl Cli {
    async fn run(self) -> Result<()> {
        let settings = self.settings()?;
        if settings.project.name.is_empty() {
            bail!("no project name given, use --project or set PROJECT_NAME");
        }

        let workspace = Workspace::new(&settings);
        workspace.prepare()?;

        let mut settings = settings;
        settings.project.root = canonicalize(workspace.root())
            .with_context(|| format!("failed to resolve {:?}", workspace.root().display()))?;

        print_banner(&settings);

        let reporter = if stdout().is_terminal() {
            Reporter::spinner(settings.status.tick())?
        } else {
            Reporter::hidden()
        };

        let (watcher, events) =
            ArchiveWatcher::spawn(&settings.project.root, settings.archive.extension.clone())?;
        let controller = IngestionController::with_git(settings, reporter.clone())?;
        tokio::task::spawn_blocking(move || controller.run(events));

        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for interrupt")?;

        // INVARIANT: Dropping the watcher closes the event stream.
        drop(watcher);
        reporter.stop("Monitoring stopped");

        Ok(())
    }

    fn settings(&self) -> Result<Settings> {
        let root = self.root.clone().unwrap_or_else(|| PathBuf::from("."));
        let mut settings = match config_file(&root, self.config.clone()) {
            Some(path) => {
                info!("load settings from {:?}", path.display());
                let data = read_to_string(&path)
                    .with_context(|| format!("failed to read {:?}", path.display()))?;
                data.parse::<Settings>()?
            }
            None => Settings::default(),
        };

        if let Some(root) = &self.root {
            settings.project.root = root.clone();
        }

        if let Some(project) = &self.project {
            settings.project.name = project.clone();
        }

        Ok(settings)
    }
}

fn print_banner(settings: &Settings) {
    let rule = "=".repeat(50);
    println!("\n{rule}");
    println!("Starting file monitor");
    println!("Project name: {}", settings.project.name);
    println!("Monitoring directory: {}", settings.project.root.display());
    println!("{rule}\n");
}

#[tokio::main]
async fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_timer(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run().await {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

async fn run() -> Result<()> {
    Cli::parse().run().await
}
