//! lars2aws - LARS build promotion to S3 and EC2
//!
//! Usage:
//!   lars2aws streams Landmark          # Streams visible for an application
//!   lars2aws plan MIG <stream> <build> # Show what an upload would copy
//!   lars2aws upload ...                # Stream artifacts into S3
//!   lars2aws inject <instance> ...     # Copy landed artifacts onto a host

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use console::style;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lars2aws_core::prelude::*;

#[derive(Parser)]
#[command(name = "lars2aws")]
#[command(about = "Promote LARS build artifacts to S3 and inject them onto EC2 hosts", long_about = None)]
struct Cli {
    /// Path to lars2aws.toml (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List visible streams of an application
    Streams {
        /// Application (MIG, HCM, IEFin, Landmark)
        app: String,
        #[command(flatten)]
        page: PageArgs,
    },

    /// List builds of a stream
    Builds {
        app: String,
        stream: String,
        #[command(flatten)]
        page: PageArgs,
    },

    /// Check live that a stream exists in the catalog
    Exists { app: String, stream: String },

    /// Show the upload plan for a build
    Plan {
        app: String,
        stream: String,
        build: String,
        /// Destination folder under LARS/ (e.g. MT/AUG)
        #[arg(long, short, default_value = "")]
        suffix: String,
    },

    /// Stream a build's artifacts into S3
    Upload {
        app: String,
        stream: String,
        build: String,
        /// Destination folder under LARS/ (e.g. MT/AUG)
        #[arg(long, short, default_value = "")]
        suffix: String,
    },

    /// Show the two-level view of landed artifacts
    Index {
        /// Root prefix (defaults to the configured root)
        #[arg(long)]
        root: Option<String>,
    },

    /// Show version metadata of one landed artifact
    Meta {
        /// Key relative to the root, e.g. MT/AUG/Install-LMMIG.jar
        key: String,
        #[arg(long)]
        root: Option<String>,
    },

    /// Copy landed artifacts onto an EC2 instance
    Inject {
        /// Target instance id
        instance: String,
        /// File to copy, relative to the prefix (repeatable)
        #[arg(long = "file", required = true)]
        files: Vec<String>,
        /// Folder under the root holding the files
        #[arg(long, default_value = "")]
        prefix: String,
        /// Destination directory on the host
        #[arg(long)]
        dest: Option<String>,
        /// File names removed from the destination first (repeatable)
        #[arg(long)]
        preclear: Option<Vec<String>>,
        /// Poll until the command finishes
        #[arg(long)]
        wait: bool,
    },

    /// Show the status of a dispatched inject command
    Status { command_id: String, instance: String },

    /// Show configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the effective configuration
    Show,
    /// Print the config file path
    Path,
}

#[derive(clap::Args)]
struct PageArgs {
    /// Case-insensitive substring filter
    #[arg(long, short, default_value = "")]
    query: String,
    /// 1-based page number
    #[arg(long, default_value_t = 1)]
    page: usize,
    #[arg(long, default_value_t = 50)]
    per_page: usize,
}

#[derive(Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// Machine-readable JSON
    Json,
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lars2aws=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    let exit_code = runtime.block_on(run_cli(cli))?;
    debug!(exit_code, "command finished");
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}

fn config_store(path: Option<PathBuf>) -> Result<ConfigStore> {
    match path {
        Some(path) => Ok(ConfigStore::from_path(path)),
        None => ConfigStore::from_default_location(),
    }
}

async fn run_cli(cli: Cli) -> Result<i32> {
    let store = config_store(cli.config)?;
    let format = cli.format;

    if let Commands::Config { command } = &cli.command {
        match command {
            ConfigCommand::Path => println!("{}", store.config_path().display()),
            ConfigCommand::Show => {
                let config = store.load_with_env()?;
                match format {
                    OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
                    OutputFormat::Table => {
                        print!("{}", lars2aws_core::config::to_toml(&config)?)
                    }
                }
            }
        }
        return Ok(0);
    }

    let config = store.load_with_env()?;
    let ctx = AppContext::from_config(config).await?;

    match cli.command {
        Commands::Streams { app, page } => {
            let streams = ctx.catalog_client().list_streams(&app).await?;
            let page = search_page(&streams, &page.query, page.page, page.per_page, |s| s.as_str());
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&page)?),
                OutputFormat::Table => {
                    for stream in &page.items {
                        println!("{}", stream);
                    }
                    print_more(page.more);
                }
            }
        }
        Commands::Builds { app, stream, page } => {
            let builds = ctx.catalog_client().list_builds(&app, &stream).await?;
            let page = search_page(&builds, &page.query, page.page, page.per_page, |b| {
                b.release_id.as_str()
            });
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&page)?),
                OutputFormat::Table => {
                    for build in &page.items {
                        println!("{}", build.label());
                    }
                    print_more(page.more);
                }
            }
        }
        Commands::Exists { app, stream } => {
            let exists = ctx.catalog_client().stream_exists(&app, &stream).await;
            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::json!({ "app": app, "stream": stream, "exists": exists }))
                }
                OutputFormat::Table => println!("{}", exists),
            }
            return Ok(if exists { 0 } else { 1 });
        }
        Commands::Plan {
            app,
            stream,
            build,
            suffix,
        } => {
            let plan = ctx.planner().plan(&app, &stream, &build, &suffix).await;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&plan)?),
                OutputFormat::Table => print_plan(&plan),
            }
        }
        Commands::Upload {
            app,
            stream,
            build,
            suffix,
        } => {
            let plan = ctx.planner().plan(&app, &stream, &build, &suffix).await;
            if plan.is_empty() {
                anyhow::bail!("Nothing to upload for application '{}'", app);
            }
            let results = ctx.upload_executor().upload_many(&plan).await;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&results)?),
                OutputFormat::Table => print_upload_results(&results),
            }
            if results.iter().any(|r| !r.ok) {
                return Ok(1);
            }
        }
        Commands::Index { root } => {
            let root = root.unwrap_or_else(|| ctx.root().to_string());
            let index = ctx.prefix_indexer().build_index(ctx.bucket(), &root).await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&index)?),
                OutputFormat::Table => print_index(&index),
            }
        }
        Commands::Meta { key, root } => {
            let root = root.unwrap_or_else(|| ctx.root().to_string());
            let meta = ctx
                .prefix_indexer()
                .object_version(ctx.bucket(), &root, &key)
                .await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&meta)?),
                OutputFormat::Table => {
                    println!("Key:      {}", meta.key);
                    println!("Version:  {}", meta.version.as_deref().unwrap_or("-"));
                    println!(
                        "Size:     {}",
                        meta.content_length.map(|n| n.to_string()).unwrap_or_else(|| "-".into())
                    );
                    println!("Type:     {}", meta.content_type.as_deref().unwrap_or("-"));
                    println!("Modified: {}", meta.last_modified.as_deref().unwrap_or("-"));
                }
            }
        }
        Commands::Inject {
            instance,
            files,
            prefix,
            dest,
            preclear,
            wait,
        } => {
            let request = InjectRequest {
                instance: instance.clone(),
                bucket: ctx.bucket().to_string(),
                root: ctx.root().to_string(),
                key_prefix: prefix,
                files,
                preclear,
                dest_dir: dest,
            };
            let injector = ctx.remote_injector();
            let command_id = injector.dispatch(&request).await?;
            info!(
                command_id = %command_id,
                instance = %instance,
                wait,
                "inject command dispatched"
            );
            if !wait {
                match format {
                    OutputFormat::Json => println!(
                        "{}",
                        serde_json::json!({ "command_id": command_id, "instance": instance })
                    ),
                    OutputFormat::Table => println!("Dispatched command {}", command_id),
                }
                return Ok(0);
            }

            eprintln!("Dispatched command {}, waiting (Ctrl-C stops waiting)", command_id);
            let outcome = tokio::select! {
                outcome = watch(&injector, &command_id, &instance, ctx.poll_policy()) => outcome?,
                _ = tokio::signal::ctrl_c() => {
                    info!(command_id = %command_id, "stopped waiting on interrupt");
                    eprintln!("Stopped waiting; check later with: lars2aws status {} {}", command_id, instance);
                    return Ok(130);
                }
            };
            let still_running = matches!(outcome, PollOutcome::StillRunning(_));
            return print_command(outcome.command(), format, still_running);
        }
        Commands::Status {
            command_id,
            instance,
        } => {
            let command = ctx.remote_injector().poll(&command_id, &instance).await?;
            return print_command(&command, format, false);
        }
        Commands::Config { .. } => {}
    }
    Ok(0)
}

fn print_more(more: bool) {
    if more {
        println!("{}", style("(more results on the next page)").dim());
    }
}

fn print_plan(plan: &[ArtifactPlanItem]) {
    if plan.is_empty() {
        println!("No artifacts for this selection.");
        return;
    }

    println!("{:<28} {:<14} Destination", "File", "Version");
    println!("{}", "-".repeat(80));
    for item in plan {
        let version = item
            .metadata
            .as_ref()
            .and_then(|m| m.get("version"))
            .map(String::as_str)
            .unwrap_or("-");
        println!("{:<28} {:<14} {}", item.file_name(), version, item.destination_uri());
    }
}

fn print_upload_results(results: &[UploadResult]) {
    for result in results {
        let mark = if result.ok {
            style("ok").green()
        } else {
            style("FAILED").red()
        };
        println!("{:<7} s3://{}/{}", mark, result.bucket, result.key);
        if let Some(error) = &result.error {
            println!("        {}", error);
        }
    }
    let failed = results.iter().filter(|r| !r.ok).count();
    println!();
    println!("Summary: {} uploaded, {} failed", results.len() - failed, failed);
}

fn print_index(index: &PrefixIndex) {
    for (prefix, files) in index {
        println!("{} ({})", style(prefix).bold(), files.len());
        for file in files {
            println!("  {}", file);
        }
    }
}

fn print_command(command: &RemoteCommand, format: OutputFormat, still_running: bool) -> Result<i32> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(command)?),
        OutputFormat::Table => {
            let status = match command.status {
                CommandStatus::Success => style(command.status.to_string()).green(),
                CommandStatus::Failed | CommandStatus::Cancelled | CommandStatus::TimedOut => {
                    style(command.status.to_string()).red()
                }
                _ => style(command.status.to_string()).yellow(),
            };
            println!("Command:  {}", command.command_id);
            println!("Instance: {}", command.target_instance);
            println!("Status:   {}", status);
            if let Some(details) = &command.status_details {
                println!("Details:  {}", details);
            }
            if still_running {
                println!("Still running; check later with: lars2aws status {} {}", command.command_id, command.target_instance);
            }
            if command.is_terminal() {
                if !command.stdout.is_empty() {
                    println!("\n{}\n{}", style("stdout").bold(), command.stdout.trim_end());
                }
                if !command.stderr.is_empty() {
                    println!("\n{}\n{}", style("stderr").bold(), command.stderr.trim_end());
                }
                if let Some(url) = &command.stdout_url {
                    println!("stdout log: {}", url);
                }
                if let Some(url) = &command.stderr_url {
                    println!("stderr log: {}", url);
                }
            }
        }
    }

    Ok(match command.status {
        CommandStatus::Success => 0,
        _ if !command.is_terminal() => 2,
        _ => 1,
    })
}
