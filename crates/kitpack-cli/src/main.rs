//! Kitpack - release packaging and installer
//!
//! Usage:
//!   kitpack versions                       # List released versions
//!   kitpack integrations                   # List integration branches
//!   kitpack assemble latest postgres       # Build a combined package locally
//!   kitpack install --license license.key  # Download and deploy via the front door
//!   kitpack deploy widget-postgres.zip     # Deploy an already downloaded package

mod interactive;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use console::style;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kitpack_core::config::Settings;
use kitpack_core::context::AppContext;
use kitpack_core::deploy::{self, BuildRunner, Deployment};
use kitpack_core::remote;
use kitpack_core::resolver::VersionListing;

use crate::interactive::{PrefilledSelection, SelectionFlow};

/// Package name prefix when no product token is configured.
const DEFAULT_PACKAGE_PREFIX: &str = "kitpack";

#[derive(Parser)]
#[command(name = "kitpack")]
#[command(about = "Release packaging and installer", long_about = None)]
struct Cli {
    /// Path to kitpack.toml (defaults to the user config directory)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List released versions, newest first
    Versions {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// List available integrations
    Integrations {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Combine a release binary with an integration branch into one package
    Assemble {
        /// Release tag, or "latest"
        version: String,
        /// Integration branch name
        integration: String,
        /// Where to write the package (defaults to ./<token>-<integration>.zip)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Download a package from the front door and deploy it
    Install(InstallArgs),

    /// Deploy an already downloaded package
    Deploy {
        /// Path to the package archive
        archive: PathBuf,
        /// Only extract and print the deploy root, do not run the build
        #[arg(long)]
        locate_only: bool,
    },
}

#[derive(Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// Machine-readable JSON
    Json,
}

#[derive(Args)]
struct InstallArgs {
    /// File holding the license key
    #[arg(long, short, value_name = "FILE")]
    license: PathBuf,
    /// Version to install (prompted when omitted)
    #[arg(long = "version", value_name = "TAG")]
    version: Option<String>,
    /// Integration to install (prompted when omitted)
    #[arg(long, short)]
    integration: Option<String>,
    /// Front door base URL (overrides API_URL and the config file)
    #[arg(long, value_name = "URL")]
    api_url: Option<String>,
    /// Where to save the package
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Stop after downloading
    #[arg(long)]
    download_only: bool,
    /// Skip the confirmation prompt
    #[arg(short = 'y', long)]
    yes: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing on stderr so stdout stays parseable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kitpack=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let settings =
        Settings::load(cli.config.as_deref()).context("failed to load configuration")?;

    run_cli(cli.command, settings).await
}

async fn run_cli(command: Commands, settings: Settings) -> Result<()> {
    match command {
        Commands::Versions { format } => {
            let ctx = AppContext::new(settings)?;
            run_versions(&ctx, format).await?;
        }
        Commands::Integrations { format } => {
            let ctx = AppContext::new(settings)?;
            run_integrations(&ctx, format).await?;
        }
        Commands::Assemble {
            version,
            integration,
            output,
        } => {
            let ctx = AppContext::new(settings)?;
            run_assemble(&ctx, &version, &integration, output).await?;
        }
        Commands::Install(args) => {
            run_install(settings, args).await?;
        }
        Commands::Deploy {
            archive,
            locate_only,
        } => {
            run_deploy(&archive, locate_only)?;
        }
    }
    Ok(())
}

// =============================================================================
// Operator commands
// =============================================================================

async fn run_versions(ctx: &AppContext, format: OutputFormat) -> Result<()> {
    let VersionListing { versions, latest } = ctx.release_resolver()?.listing().await?;

    match format {
        OutputFormat::Table => print_versions_table(&versions, latest.as_deref()),
        OutputFormat::Json => print_listing_json("versions", &versions, latest.as_deref())?,
    }
    Ok(())
}

async fn run_integrations(ctx: &AppContext, format: OutputFormat) -> Result<()> {
    let integrations = ctx.integration_resolver()?.integrations().await?;

    match format {
        OutputFormat::Table => {
            if integrations.is_empty() {
                println!("No integrations available.");
                return Ok(());
            }
            println!("Integrations ({}):", integrations.len());
            for name in &integrations {
                println!("  {name}");
            }
        }
        OutputFormat::Json => print_listing_json("integrations", &integrations, None)?,
    }
    Ok(())
}

async fn run_assemble(
    ctx: &AppContext,
    version: &str,
    integration: &str,
    output: Option<PathBuf>,
) -> Result<()> {
    let assembler = ctx.assembler()?;
    let package = assembler.assemble(version, integration).await?;

    let dest = output.unwrap_or_else(|| PathBuf::from(package.file_name()));
    let tag = package.tag().to_string();
    let size = package.size();
    let entries = package.summary().copied + 1;
    let delivered = package.deliver_to(&dest)?;

    println!(
        "{} {} ({} + {}, {} entries, {} bytes)",
        style("Assembled").green().bold(),
        delivered.display(),
        tag,
        integration,
        entries,
        size
    );
    Ok(())
}

fn print_versions_table(versions: &[String], latest: Option<&str>) {
    if versions.is_empty() {
        println!("No releases published.");
        return;
    }

    println!("{:<24} Status", "Version");
    println!("{}", "-".repeat(32));
    for version in versions {
        let marker = if Some(version.as_str()) == latest {
            "latest"
        } else {
            ""
        };
        println!("{:<24} {}", version, marker);
    }
}

fn print_listing_json(key: &str, items: &[String], latest: Option<&str>) -> Result<()> {
    let mut output = serde_json::Map::new();
    output.insert(key.to_string(), serde_json::json!(items));
    if let Some(latest) = latest {
        output.insert("latest".to_string(), latest.into());
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::Value::Object(output))?
    );
    Ok(())
}

// =============================================================================
// Consumer commands
// =============================================================================

async fn run_install(mut settings: Settings, args: InstallArgs) -> Result<()> {
    let license = remote::read_license_key(&args.license)?;
    if let Some(url) = &args.api_url {
        settings.installer.api_url = url
            .parse()
            .with_context(|| format!("invalid --api-url: {url}"))?;
    }
    let ctx = AppContext::new(settings)?;
    let client = ctx.api_client(license)?;

    let mut flow = SelectionFlow::new(PrefilledSelection {
        version: args.version.clone(),
        integration: args.integration.clone(),
        yes: args.yes,
    });

    let versions = if flow.needs_versions() {
        println!("{}", style("Fetching available versions...").cyan());
        client
            .versions()
            .await
            .context("failed to fetch versions")?
    } else {
        Vec::new()
    };
    let integrations = if flow.needs_integrations() {
        println!("{}", style("Fetching available integrations...").cyan());
        client
            .integrations()
            .await
            .context("failed to fetch integrations")?
    } else {
        Vec::new()
    };

    let selection = flow.collect(&versions, &integrations)?;
    if !selection.confirmed {
        println!("Installation cancelled.");
        return Ok(());
    }

    let prefix = ctx
        .settings()
        .product
        .asset_token()
        .unwrap_or(DEFAULT_PACKAGE_PREFIX);
    let dest = args
        .output
        .unwrap_or_else(|| remote::default_download_path(prefix, &selection.integration));

    println!(
        "{}",
        style(format!(
            "Downloading package for version {} with integration {}...",
            selection.version, selection.integration
        ))
        .magenta()
    );
    let fetched = client
        .download_package(&selection.version, &selection.integration, &dest)
        .await
        .context("failed to download package")?;
    println!(
        "{} {} ({} bytes)",
        style("Package downloaded:").green().bold(),
        fetched.path.display(),
        fetched.bytes
    );

    if args.download_only {
        return Ok(());
    }
    run_deploy(&dest, false)
}

fn run_deploy(archive: &Path, locate_only: bool) -> Result<()> {
    let deployment = Deployment::prepare(archive)
        .with_context(|| format!("failed to prepare {}", archive.display()))?;
    println!(
        "{} {}",
        style("Deploy root:").cyan(),
        deployment.root().display()
    );

    if locate_only {
        deployment.keep();
        return Ok(());
    }

    deploy::check_docker().context("docker is not available")?;
    BuildRunner::default().run(deployment.root())?;

    // The started services run from the extracted tree.
    let root = deployment.keep();
    println!(
        "{} {}",
        style("Deployment started from").green().bold(),
        root.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{Cli, Commands, OutputFormat};
    use clap::Parser;

    #[test]
    fn versions_parses_with_default_format() {
        let cli = Cli::try_parse_from(["kitpack", "versions"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Versions {
                format: OutputFormat::Table
            }
        ));
    }

    #[test]
    fn integrations_with_format_json_parses() {
        let cli = Cli::try_parse_from(["kitpack", "integrations", "-f", "json"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Integrations {
                format: OutputFormat::Json
            }
        ));
    }

    #[test]
    fn assemble_parses_positional_arguments() {
        let cli = Cli::try_parse_from([
            "kitpack",
            "assemble",
            "latest",
            "postgres",
            "-o",
            "/tmp/pkg.zip",
        ])
        .unwrap();

        match cli.command {
            Commands::Assemble {
                version,
                integration,
                output,
            } => {
                assert_eq!(version, "latest");
                assert_eq!(integration, "postgres");
                assert_eq!(output.unwrap().to_str(), Some("/tmp/pkg.zip"));
            }
            _ => panic!("expected assemble"),
        }
    }

    #[test]
    fn assemble_requires_integration() {
        assert!(Cli::try_parse_from(["kitpack", "assemble", "latest"]).is_err());
    }

    #[test]
    fn install_requires_license() {
        assert!(Cli::try_parse_from(["kitpack", "install"]).is_err());
    }

    #[test]
    fn install_with_all_flags_parses() {
        let cli = Cli::try_parse_from([
            "kitpack",
            "install",
            "--license=license.key",
            "--version",
            "v1.2.0",
            "--integration",
            "kafka",
            "--api-url",
            "http://front.example:1207",
            "--download-only",
            "-y",
        ])
        .unwrap();

        match cli.command {
            Commands::Install(args) => {
                assert_eq!(args.license.to_str(), Some("license.key"));
                assert_eq!(args.version.as_deref(), Some("v1.2.0"));
                assert_eq!(args.integration.as_deref(), Some("kafka"));
                assert_eq!(args.api_url.as_deref(), Some("http://front.example:1207"));
                assert!(args.download_only);
                assert!(args.yes);
            }
            _ => panic!("expected install"),
        }
    }

    #[test]
    fn deploy_locate_only_parses() {
        let cli =
            Cli::try_parse_from(["kitpack", "deploy", "widget-kafka.zip", "--locate-only"])
                .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Deploy {
                locate_only: true,
                ..
            }
        ));
    }

    #[test]
    fn global_config_flag_parses_after_subcommand() {
        let cli =
            Cli::try_parse_from(["kitpack", "versions", "--config", "/etc/kitpack.toml"]).unwrap();
        assert_eq!(
            cli.config.as_deref().and_then(|p| p.to_str()),
            Some("/etc/kitpack.toml")
        );
    }

    #[test]
    fn unknown_format_is_rejected() {
        assert!(Cli::try_parse_from(["kitpack", "versions", "-f", "yaml"]).is_err());
    }
}
