use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use mlhub::assets::AssetRef;
use mlhub::catalog;
use mlhub::client::ApiClient;
use mlhub::download_plan::DownloadPlan;
use mlhub::landcovernet;
use mlhub::selection::DownloadSelection;

#[derive(Parser)]
#[command(name = "mlhub", about = "Radiant MLHub catalog browser and asset downloader")]
struct Cli {
    /// API token; read from MLHUB_ACCESS_TOKEN when not given
    #[arg(long, global = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write the LandCoverNet selection template
    Template {
        #[arg(long, default_value = "./inputs/download_selection.toml")]
        output: PathBuf,
    },
    /// List the collections in the catalog
    Collections,
    /// Print a collection summary
    Describe {
        #[arg(long)]
        collection: String,
    },
    /// Print one item and its assets
    Item {
        #[arg(long)]
        collection: String,
        #[arg(long)]
        id: String,
    },
    /// Generate a download plan from a selection
    Plan {
        #[arg(long, default_value = "./inputs/download_selection.toml")]
        selection: PathBuf,
        #[arg(long, default_value = "./outputs")]
        output_dir: PathBuf,
    },
    /// Execute a previously generated plan, or plan and download in one go
    Download {
        #[arg(long)]
        plan: Option<PathBuf>,
        #[arg(long, default_value = "./inputs/download_selection.toml")]
        selection: PathBuf,
        #[arg(long, default_value = "./outputs")]
        output_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let token = cli
        .token
        .or_else(|| std::env::var(mlhub::client::TOKEN_ENV_VAR).ok());
    let client = ApiClient::new(token)?;

    match cli.command {
        Command::Template { output } => {
            if let Some(parent) = output.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let selection =
                DownloadSelection::from_template(&landcovernet::download_selection_toml());
            selection.write(&output)?;
            info!(path = %output.display(), "wrote selection template");
        }
        Command::Collections => {
            for collection in catalog::list_collections(&client).await? {
                println!("{:<48} {}", collection.id, collection.title.unwrap_or_default());
            }
        }
        Command::Describe { collection } => {
            let collection = catalog::get_collection(&client, &collection).await?;
            println!("Collection:      {}", collection.id);
            if let Some(title) = &collection.title {
                println!("Title:           {}", title);
            }
            println!("License:         {}", collection.license);
            println!("Description:     {}", collection.description);
            println!("Spatial extent:  {:?}", collection.extent.spatial.bbox);
            println!("Temporal extent: {:?}", collection.extent.temporal.interval);
            println!("Providers:       {:?}", collection.providers);
            if let Some(doi) = collection.additional_fields.get("sci:doi") {
                println!("DOI:             {}", doi);
            }
            if let Some(citation) = collection.additional_fields.get("sci:citation") {
                println!("Citation:        {}", citation);
            }
        }
        Command::Item { collection, id } => {
            let item = catalog::get_item(&client, &collection, &id).await?;
            println!("Item: {}", item.id);
            for asset in AssetRef::all(&item) {
                println!(
                    "  {:<16} {:<32} {}",
                    asset.key,
                    asset.title.as_deref().unwrap_or("-"),
                    asset.href
                );
            }
        }
        Command::Plan {
            selection,
            output_dir,
        } => {
            let selection = DownloadSelection::read(&selection)?;
            let plan =
                landcovernet::generate_download_plan(&client, &selection, output_dir.clone())
                    .await?;
            std::fs::create_dir_all(&output_dir)?;
            let path = output_dir.join("download_plan.json");
            plan.write(&path)?;
            info!(tasks = plan.len(), path = %path.display(), "wrote download plan");
        }
        Command::Download {
            plan,
            selection,
            output_dir,
        } => {
            let plan = match plan {
                Some(path) => DownloadPlan::read(&path)?,
                None => {
                    let selection = DownloadSelection::read(&selection)?;
                    landcovernet::generate_download_plan(&client, &selection, output_dir.clone())
                        .await?
                }
            };
            info!(tasks = plan.len(), "executing download plan");
            plan.execute(&client).await?;
        }
    }

    Ok(())
}
