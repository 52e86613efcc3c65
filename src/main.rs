use std::{path::PathBuf, time::Duration};

use anyhow::anyhow;
use clap::Parser;
use log::{error, warn};
use recipefetch::{
    cli::args::{CliArgs, Command},
    model::package::ProjectId,
    Cancellation, RecipeFetch, RecipeFetchBuilder, RecipeFetchConfig,
};

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run().await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli_args: CliArgs = CliArgs::parse();
    let config = RecipeFetchConfig::load()?;
    let cancellation = Cancellation::new();

    let mut builder = RecipeFetch::builder().cancellation(cancellation.clone());
    if let Some(root) = cli_args.root {
        builder = builder.root(root);
    }
    if let Some(cache_directory) = cli_args
        .cache_directory
        .map(PathBuf::from)
        .or(config.cache_dir)
    {
        builder = builder.cache_directory(cache_directory);
    }
    if let Some(git_binary) = cli_args.git_binary.map(PathBuf::from).or(config.git_binary) {
        builder = builder.git_binary(git_binary);
    }
    if let Some(timeout) = cli_args
        .timeout
        .map(Duration::from_secs)
        .or(config.fetch_timeout)
    {
        builder = builder.timeout(timeout);
    }

    // VCS work blocks on subprocesses; keep the runtime free to watch for Ctrl-C.
    let command = cli_args.cmd;
    let mut worker = tokio::task::spawn_blocking(move || execute(builder, command));
    tokio::select! {
        result = &mut worker => result?,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            warn!("Interrupted, stopping running git commands");
            cancellation.cancel();
            // The worker returns once its subprocess is killed.
            let _ = worker.await;
            Err(anyhow!("Interrupted"))
        }
    }
}

fn execute(builder: RecipeFetchBuilder, command: Command) -> anyhow::Result<()> {
    let recipefetch = builder.try_build()?;

    match command {
        Command::Fetch => {
            recipefetch.fetch()?;
        }
        Command::Metadata { project, revision } => {
            let metadata = recipefetch.metadata(&ProjectId::new(project), revision.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&metadata)?);
        }
        Command::List { package } => {
            let package = package.map(ProjectId::new);
            let listing = recipefetch.list(package.as_ref())?;
            println!("{}", serde_json::to_string_pretty(&listing)?);
        }
        Command::FindRecipe { name, package } => {
            let package = package.map(ProjectId::new);
            let path = recipefetch.find_recipe(&name, package.as_ref())?;
            println!("{}", path.display());
        }
        Command::ClearCache => recipefetch.clear_cache()?,
    }
    Ok(())
}
