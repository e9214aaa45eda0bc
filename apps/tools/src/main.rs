use std::{path::PathBuf, sync::Arc};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    config::load_settings_from, load_settings, prepare_database_url, DatabaseClient,
    LocalSessionProvider, MutationGate, SessionContext, SessionOrchestrator, SqliteItemStore,
};
use numbering::{classify, NumberKind};
use shared::{
    domain::{FlatRecord, ItemKind},
    protocol::CheckOutcome,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "proacid", about = "Manage PROACID-numbered item databases")]
struct Cli {
    /// Settings file to use instead of ./proacid.toml.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Overrides `database_url` from proacid.toml / APP__DATABASE_URL.
    #[arg(long)]
    database_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Prints which kind of number the input is.
    Classify { number: String },
    CreateDatabase { project: String, title: String },
    ListDatabases,
    /// Adds an area, category or ID to a project.
    Add {
        project: String,
        number: String,
        title: String,
    },
    Rename {
        project: String,
        number: String,
        title: String,
    },
    Remove { project: String, number: String },
    /// Prints the project's tree as JSON.
    Tree { project: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    if let Command::Classify { number } = &cli.command {
        println!("{}", kind_label(classify(number)));
        return Ok(());
    }

    let mut settings = match &cli.config {
        Some(path) => load_settings_from(path)?,
        None => load_settings(),
    };
    if let Some(database_url) = cli.database_url {
        settings.database_url = database_url;
    }
    let database_url = prepare_database_url(&settings.database_url);
    let store = SqliteItemStore::connect(&database_url)
        .await
        .with_context(|| format!("failed to open item store at {database_url}"))?;
    info!("tools: using store database_url={database_url}");

    let context = SessionContext::new(
        Arc::new(LocalSessionProvider::new(settings.identity.clone())),
        Arc::new(store),
    )
    .with_refresh_interval(settings.refresh_interval());
    let session = SessionOrchestrator::spawn(context);
    let database = session
        .authenticated_database()
        .await
        .context("no signed-in identity; set `identity` in proacid.toml or APP__IDENTITY")?;
    database.list_databases_now().await?;

    match cli.command {
        // Answered above without a store.
        Command::Classify { .. } => {}
        Command::CreateDatabase { project, title } => {
            let outcome = database
                .mutation_gate()
                .create_database(FlatRecord::new(ItemKind::Project, project.clone(), title))
                .await;
            report(outcome)?;
            println!("created project {project}");
        }
        Command::ListDatabases => {
            for handle in database.list_databases_now().await?.iter() {
                println!("{}\t{}", handle.project, handle.title);
            }
        }
        Command::Add {
            project,
            number,
            title,
        } => {
            let gate = open(&database, &project).await?;
            let kind = item_kind(&number)?;
            report(
                gate.request_insert(FlatRecord::new(kind, number.clone(), title))
                    .await,
            )?;
            println!("added {kind} {number}");
        }
        Command::Rename {
            project,
            number,
            title,
        } => {
            let gate = open(&database, &project).await?;
            let kind = item_kind(&number)?;
            report(
                gate.request_update(FlatRecord::new(kind, number.clone(), title))
                    .await,
            )?;
            println!("renamed {kind} {number}");
        }
        Command::Remove { project, number } => {
            let gate = open(&database, &project).await?;
            let kind = item_kind(&number)?;
            report(gate.request_delete(kind, &number).await)?;
            println!("removed {kind} {number}");
        }
        Command::Tree { project } => {
            database.switch_database(&project).await?;
            let system = database.wait_for_tree(&project).await?;
            println!("{}", serde_json::to_string_pretty(system.as_ref())?);
        }
    }

    session.shutdown();
    Ok(())
}

async fn open(database: &DatabaseClient, project: &str) -> Result<MutationGate> {
    database.switch_database(project).await?;
    database.wait_for_tree(project).await?;
    Ok(database.mutation_gate())
}

fn item_kind(number: &str) -> Result<ItemKind> {
    classify(number)
        .item_kind()
        .ok_or_else(|| anyhow!("'{number}' is not a valid PROACID number"))
}

fn report(outcome: CheckOutcome) -> Result<()> {
    if outcome.success {
        return Ok(());
    }
    bail!(
        "{}",
        outcome.message.unwrap_or_else(|| "rejected".to_string())
    )
}

fn kind_label(kind: NumberKind) -> &'static str {
    match kind {
        NumberKind::Project => "project",
        NumberKind::Area => "area",
        NumberKind::Category => "category",
        NumberKind::Id => "ID",
        NumberKind::Invalid => "invalid",
    }
}
