use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use iamviz_cloudrun::{default_token_provider, infer_project, CloudRunClient, GcloudCli};
use iamviz_core::{ConfigManager, IamVizConfig};
use iamviz_graph::{
    ArtifactTarget, GraphvizRenderer, OutputFormat, Pipeline, PipelineOptions, Renderer,
    SystemViewer,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

mod logging;
mod output;

use output::ConsoleFormat;

#[derive(Parser, Debug)]
#[command(name = "cloudrun-iamviz")]
#[command(about = "Visualize which Cloud Run services are allowed to invoke which", long_about = None)]
#[command(version)]
struct Cli {
    /// Project to inspect (defaults to the active gcloud project)
    #[arg(short, long, global = true)]
    project: Option<String>,

    /// Config file to load instead of .iamviz.toml / ~/.iamviz/config.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Image format of the rendered graph
    #[arg(short, long, global = true, value_enum)]
    format: Option<FormatArg>,

    /// Write the rendered graph to this path instead of a temp file
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Directory for generated temp files
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    /// Graphviz layout program
    #[arg(long, global = true)]
    renderer: Option<String>,

    /// Do not open the rendered graph
    #[arg(long, global = true)]
    no_open: bool,

    /// Also print the DOT description to stdout
    #[arg(long, global = true)]
    print_dot: bool,

    /// Console output format (json, pretty, table)
    #[arg(long, global = true, value_enum, default_value = "pretty")]
    output_format: ConsoleFormat,

    /// Log format (compact, pretty, json)
    #[arg(long, global = true, value_parser = ["compact", "pretty", "json"])]
    log_format: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    Svg,
    Png,
    Pdf,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Svg => OutputFormat::Svg,
            FormatArg::Png => OutputFormat::Png,
            FormatArg::Pdf => OutputFormat::Pdf,
        }
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum Commands {
    /// Discover services, render the invocation graph and open it (default)
    Render,

    /// Print the DOT description without rendering it
    Dot,

    /// List discovered services with their identities and invokers
    List,

    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum ConfigCommands {
    /// Write a default configuration file
    Init {
        /// Destination (defaults to ~/.iamviz/config.toml)
        path: Option<PathBuf>,

        /// Write ./.iamviz.toml instead of the user config
        #[arg(long, conflicts_with = "path")]
        local: bool,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(e) = execute(cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
    Ok(())
}

async fn execute(cli: Cli) -> Result<()> {
    if let Some(Commands::Config(cmd)) = &cli.command {
        return execute_config_command(cmd);
    }

    // Diagnostics emitted while loading go to a scoped subscriber, the
    // configured one is only known afterwards
    let bootstrap =
        logging::bootstrap_subscriber(logging::bootstrap_filter(cli.verbose), std::io::stderr);
    let mut manager = tracing::subscriber::with_default(bootstrap, || match &cli.config {
        Some(path) => ConfigManager::from_file(path),
        None => ConfigManager::load(),
    })
    .context("Failed to load configuration")?;
    apply_overrides(&cli, manager.config_mut());
    manager.validate().context("Invalid configuration")?;

    let config = manager.config().clone();
    logging::init(&config.logging, cli.verbose);

    let command = cli.command.clone().unwrap_or(Commands::Render);

    // Fail on a missing renderer before any remote call is made
    let renderer: Arc<dyn Renderer> = match command {
        Commands::Render => Arc::new(GraphvizRenderer::locate(&config.render.program)?),
        _ => Arc::new(GraphvizRenderer::with_path(&config.render.program)),
    };

    let gcloud = GcloudCli::new();
    let project = infer_project(config.project.id.as_deref(), &gcloud)
        .await
        .context("Failed to determine project")?;

    let client = CloudRunClient::new(config.api.clone(), default_token_provider(gcloud))?;
    let pipeline = Pipeline::new(Arc::new(client), renderer, Arc::new(SystemViewer::new()));
    let options = pipeline_options(&cli, &config, project)?;

    match command {
        Commands::Render => {
            let summary = pipeline
                .run(&options)
                .await
                .context("Failed to visualize invoker permissions")?;
            if cli.print_dot {
                print!("{}", summary.dot);
                if let Some(path) = &summary.artifact {
                    info!("graph written to {}", path.display());
                }
            } else {
                output::print_summary(cli.output_format, &summary)?;
            }
        }
        Commands::Dot => {
            let summary = pipeline
                .describe(&options)
                .await
                .context("Failed to build invocation graph")?;
            print!("{}", summary.dot);
        }
        Commands::List => {
            let inventory = pipeline
                .discover(&options.project, options.permission_concurrency)
                .await
                .context("Failed to discover services")?;
            output::print_inventory(cli.output_format, &inventory)?;
        }
        Commands::Config(cmd) => execute_config_command(&cmd)?,
    }

    Ok(())
}

/// Command-line flags take precedence over file and environment settings.
fn apply_overrides(cli: &Cli, config: &mut IamVizConfig) {
    if let Some(project) = &cli.project {
        config.project.id = Some(project.clone());
    }
    if let Some(format) = cli.format {
        config.render.format = OutputFormat::from(format).as_str().to_string();
    }
    if let Some(dir) = &cli.output_dir {
        config.render.output_dir = Some(dir.clone());
    }
    if let Some(renderer) = &cli.renderer {
        config.render.program = renderer.clone();
    }
    if cli.no_open {
        config.render.open = false;
    }
    if let Some(format) = &cli.log_format {
        config.logging.format = format.clone();
    }
}

fn pipeline_options(cli: &Cli, config: &IamVizConfig, project: String) -> Result<PipelineOptions> {
    let target = match &cli.output {
        Some(path) => ArtifactTarget::Path(path.clone()),
        None => ArtifactTarget::TempFile {
            dir: config.render.output_dir.clone(),
        },
    };

    Ok(PipelineOptions {
        project,
        format: config.render.format.parse()?,
        target,
        open: config.render.open,
        permission_concurrency: config.api.permission_concurrency,
    })
}

fn execute_config_command(cmd: &ConfigCommands) -> Result<()> {
    match cmd {
        ConfigCommands::Init { path, local, force } => {
            let path = match (path, local) {
                (Some(path), _) => path.clone(),
                (None, true) => PathBuf::from(".iamviz.toml"),
                (None, false) => ConfigManager::user_config_path()
                    .context("Could not determine the home directory")?,
            };
            init_config(&path, *force)?;
            println!(
                "{} {}",
                "Created config file:".green().bold(),
                path.display()
            );
            Ok(())
        }
    }
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists, pass --force to overwrite it",
            path.display()
        );
    }
    ConfigManager::create_default_config(path)
        .with_context(|| format!("Failed to write {}", path.display()))
}
