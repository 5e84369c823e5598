//! epsync: manage service endpoints described by JSON records.
//!
//! Each subcommand reads a record file, runs the matching reconciliation
//! against the organization and prints the resulting record as JSON.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use epsync_core::model::EndpointType;
use epsync_core::{
    AuditLogger, CancellationToken, EndpointClient, EndpointConfig, EndpointId, EndpointResource,
    ReconcilerConfig, ReferenceFields, ScopeId,
};
use epsync_rest::{RestClient, RestConfig};
use tabled::{Table, Tabled};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "epsync", version)]
#[command(about = "Reconcile Azure DevOps service endpoints", long_about = None)]
struct Cli {
    /// Organization url (e.g., https://dev.azure.com/contoso)
    #[arg(long, env = "EPSYNC_ORG_URL")]
    org_url: String,

    /// Personal access token
    #[arg(long, env = "EPSYNC_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Reconciler settings (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Check endpoints against the service's type catalog before creating them
    #[arg(long)]
    check_types: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the endpoint described by a record
    Create {
        /// Record file
        file: PathBuf,

        /// Write the resulting record back to the file
        #[arg(short, long)]
        write: bool,
    },

    /// Refresh a record from the service
    Get {
        /// Record file
        file: PathBuf,

        /// Write the resulting record back to the file
        #[arg(short, long)]
        write: bool,
    },

    /// Push a record's fields to its endpoint
    Update {
        /// Record file
        file: PathBuf,

        /// Write the resulting record back to the file
        #[arg(short, long)]
        write: bool,
    },

    /// Delete a record's endpoint from every project it is shared with
    Delete {
        /// Record file
        file: PathBuf,
    },

    /// Run the service's connectivity check for a record's endpoint
    Validate {
        /// Record file
        file: PathBuf,
    },

    /// Share a record's endpoint with more projects
    Share {
        /// Record file
        file: PathBuf,

        /// Project ids to share with
        #[arg(required = true)]
        projects: Vec<String>,
    },

    /// Stop sharing a record's endpoint with projects
    Unshare {
        /// Record file
        file: PathBuf,

        /// Project ids to remove
        #[arg(required = true)]
        projects: Vec<String>,
    },

    /// Build a record from an existing endpoint (<project-id>/<endpoint-id>)
    Import {
        /// Import id
        id: String,
    },

    /// List the endpoint types the service supports
    Types,
}

#[derive(Tabled)]
struct TypeRow {
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "DISPLAY NAME")]
    display_name: String,
    #[tabled(rename = "SCHEMES")]
    schemes: String,
}

impl From<EndpointType> for TypeRow {
    fn from(t: EndpointType) -> Self {
        let schemes = t
            .authentication_schemes
            .iter()
            .map(|s| s.scheme.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        Self {
            name: t.name,
            display_name: t.display_name.unwrap_or_else(|| "-".to_string()),
            schemes: if schemes.is_empty() { "-".to_string() } else { schemes },
        }
    }
}

async fn load_config(path: Option<&Path>) -> Result<ReconcilerConfig> {
    let Some(path) = path else {
        return Ok(ReconcilerConfig::default());
    };
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

async fn load_record(path: &Path) -> Result<EndpointConfig> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing record {}", path.display()))
}

async fn emit(record: &EndpointConfig, write_to: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(record)?;
    if let Some(path) = write_to {
        tokio::fs::write(path, format!("{}\n", json))
            .await
            .with_context(|| format!("writing {}", path.display()))?;
    }
    println!("{}", json);
    Ok(())
}

fn record_id(record: &EndpointConfig) -> Result<EndpointId> {
    match &record.id {
        Some(id) => Ok(id.clone()),
        None => bail!("record {:?} has no id, create or import it first", record.name),
    }
}

/// Cancel in-flight waits on the first Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let handle = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            handle.cancel();
        }
    });
    cancel
}

async fn share(
    resource: &EndpointResource,
    record: &EndpointConfig,
    projects: Vec<String>,
) -> Result<()> {
    let id = record_id(record)?;
    let Some(endpoint) = resource.lifecycle().read(&id, &record.project_id).await? else {
        bail!("service endpoint {} no longer exists", id);
    };

    let mut desired: BTreeMap<ScopeId, ReferenceFields> = endpoint
        .scope_references
        .iter()
        .map(|r| {
            (
                r.scope_id.clone(),
                ReferenceFields::new(r.display_name.clone(), r.description.clone()),
            )
        })
        .collect();
    for project in projects {
        desired.entry(ScopeId::new(project)).or_insert_with(|| {
            ReferenceFields::new(record.name.clone(), record.description.clone())
        });
    }

    resource
        .references()
        .reconcile(&id, &record.project_id, &desired)
        .await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr, records to stdout
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "epsync=info,epsync_core=info,epsync_rest=info,reqwest=warn,hyper=warn".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref()).await?;
    config.check_types |= cli.check_types;

    let mut rest = RestConfig::new(&cli.org_url);
    if let Some(token) = cli.token {
        rest = rest.with_token(token);
    }
    let client: Arc<dyn EndpointClient> =
        Arc::new(RestClient::new(&rest).context("setting up REST client")?);

    let audit = AuditLogger::new("epsync");
    info!("Organization: {} (run {})", cli.org_url, audit.run_id());
    let resource = EndpointResource::with_audit(Arc::clone(&client), config, audit);
    let cancel = cancel_on_ctrl_c();

    match cli.command {
        Commands::Create { file, write } => {
            let record = load_record(&file).await?;
            let created = resource.create(&record, &cancel).await?;
            emit(&created, write.then_some(file.as_path())).await?;
        }

        Commands::Get { file, write } => {
            let record = load_record(&file).await?;
            let current = resource.read(&record).await?;
            if current.id.is_none() {
                warn!("Service endpoint {:?} no longer exists", record.name);
            }
            emit(&current, write.then_some(file.as_path())).await?;
        }

        Commands::Update { file, write } => {
            let record = load_record(&file).await?;
            let updated = resource.update(&record, &cancel).await?;
            emit(&updated, write.then_some(file.as_path())).await?;
        }

        Commands::Delete { file } => {
            let record = load_record(&file).await?;
            resource.delete(&record, &cancel).await?;
            println!("Deleted {}", record.name);
        }

        Commands::Validate { file } => {
            let record = load_record(&file).await?;
            resource.validate(&record, &cancel).await?;
            println!("{}: connection verified", record.name);
        }

        Commands::Share { file, projects } => {
            let record = load_record(&file).await?;
            share(&resource, &record, projects).await?;
            emit(&resource.read(&record).await?, None).await?;
        }

        Commands::Unshare { file, projects } => {
            let record = load_record(&file).await?;
            let id = record_id(&record)?;
            let scopes: Vec<ScopeId> = projects.into_iter().map(ScopeId::new).collect();
            resource
                .references()
                .release(&id, &record.project_id, &scopes)
                .await?;
            emit(&resource.read(&record).await?, None).await?;
        }

        Commands::Import { id } => {
            let record = resource.import(&id).await?;
            emit(&record, None).await?;
        }

        Commands::Types => {
            let types = client
                .list_types()
                .await
                .context("listing service endpoint types")?;
            if types.is_empty() {
                println!("No endpoint types found");
            } else {
                let rows: Vec<TypeRow> = types.into_iter().map(TypeRow::from).collect();
                println!("{}", Table::new(rows));
            }
        }
    }

    Ok(())
}
