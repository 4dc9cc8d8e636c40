use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use policypack_core::{
    HttpPolicyClient, Installer, LocalRegistry, PackIdentity, PolicyClient, PolicyConfig,
    Publisher, RequiredPolicy, SystemCommandRunner,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "policypack", about = "Publish and install policy packs")]
struct Cli {
    /// Use a directory-backed registry instead of the policy service
    #[arg(long, global = true, value_name = "DIR")]
    registry: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Package a local policy pack and upload it
    Publish {
        /// Target pack as <org-name>/<policy-pack-name>
        pack: String,

        /// Directory containing the pack's manifest
        #[arg(long, value_name = "DIR", default_value = ".")]
        dir: PathBuf,
    },
    /// Download, place and bootstrap one pack version
    Install {
        /// Pack as <org-name>/<policy-pack-name>[/<version-tag>]
        pack: String,

        /// Numeric version, used when no version tag is given
        #[arg(long, default_value_t = 1)]
        version: u64,

        /// Download locator; defaults to the registry location
        #[arg(long, value_name = "LOCATOR")]
        location: Option<String>,
    },
    /// Print where a pack version is (or would be) installed
    Path {
        /// Pack as <org-name>/<policy-pack-name>/<version>
        pack: String,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run() {
        tracing::error!(error = %format!("{err:#}"), "policypack failed");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let cfg = PolicyConfig::from_env()?;
    let cancel = CancellationToken::new();
    let runner = Arc::new(SystemCommandRunner::new());

    match cli.command {
        Command::Publish { pack, dir } => {
            let identity = PackIdentity::parse(&pack, &cfg.default_org)?;
            let client = client(&cfg, cli.registry.as_ref())?;
            let published = Publisher::new(&cfg, client, runner).publish(&identity, &dir, &cancel)?;
            println!("{}", published.permalink);
        }
        Command::Install {
            pack,
            version,
            location,
        } => {
            let identity = PackIdentity::parse_versioned(&pack, &cfg.default_org)?;
            let mut policy = RequiredPolicy {
                name: identity.name.clone(),
                version,
                version_tag: identity.version_tag.clone(),
                config: Default::default(),
                pack_location: String::new(),
            };
            policy.pack_location = match (location, cli.registry.as_ref()) {
                (Some(location), _) => location,
                (None, Some(dir)) => LocalRegistry::new(dir).location_for(
                    &identity.org,
                    &identity.name,
                    &policy.version_label(),
                ),
                (None, None) => bail!("--location is required without --registry"),
            };
            let client = client(&cfg, cli.registry.as_ref())?;
            let installer = Installer::new(&cfg, client, runner);
            let path = installer.install(&identity.org, &policy, &cancel)?;
            println!("{}", path.display());
        }
        Command::Path { pack } => {
            let identity = PackIdentity::parse_versioned(&pack, &cfg.default_org)?;
            if identity.is_latest() {
                bail!("`{pack}` has no version; expected <org-name>/<policy-pack-name>/<version>");
            }
            let path = identity.install_path(&cfg.install_root, &identity.version_tag)?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

fn client(cfg: &PolicyConfig, registry: Option<&PathBuf>) -> Result<Arc<dyn PolicyClient>> {
    match registry {
        Some(dir) => Ok(Arc::new(LocalRegistry::new(dir))),
        None => Ok(Arc::new(
            HttpPolicyClient::from_config(cfg).context("policy service client")?,
        )),
    }
}
