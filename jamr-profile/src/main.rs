//! jamr-profile - operator CLI for the profile core
//!
//! Opens (or creates) the JAMR database under the resolved root folder and
//! runs one search or maintenance command, printing JSON to stdout.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use jamr_common::config::{database_path, resolve_root_folder, ProfileConfig, ROOT_ENV_VAR};
use jamr_common::db::{init_database, Sex};
use jamr_profile::{ProfileCore, RelationKind, SearchCriteria};
use serde::Serialize;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "jamr-profile", version, about = "Search and maintain JAMR profiles")]
struct Cli {
    /// Root folder holding jamr.db and profile.toml
    #[arg(long)]
    root_folder: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show one profile with its genres and instruments
    Show { id: String },

    /// Search profiles (offset pages by default, keyset with --cursor/--scroll)
    Search {
        #[arg(long)]
        city: Option<String>,
        /// Nickname substring (case-insensitive)
        #[arg(long)]
        nickname: Option<String>,
        #[arg(long, value_parser = parse_sex)]
        sex: Option<Sex>,
        /// Genre id; repeat for "any of"
        #[arg(long = "genre")]
        genres: Vec<i64>,
        /// Instrument id; repeat for "any of"
        #[arg(long = "instrument")]
        instruments: Vec<i64>,
        #[arg(long, default_value_t = 1, conflicts_with_all = ["cursor", "scroll"])]
        page: i64,
        /// Resume a keyset walk after this profile id
        #[arg(long)]
        cursor: Option<String>,
        /// Start a keyset walk from the first page
        #[arg(long)]
        scroll: bool,
        #[arg(long)]
        size: Option<i64>,
    },

    /// Summaries for a list of profile ids
    Batch { ids: Vec<String> },

    /// Set a profile image URL
    SetImage { id: String, url: String },

    /// Print the genre and instrument name tables
    Lookup,
}

fn parse_sex(value: &str) -> std::result::Result<Sex, String> {
    value.parse::<Sex>().map_err(|e| e.to_string())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Starting jamr-profile v{}", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();

    let root_folder = resolve_root_folder(cli.root_folder.as_deref(), ROOT_ENV_VAR);
    let config = ProfileConfig::load(&root_folder).context("Failed to load profile config")?;
    let db_path = database_path(&root_folder);
    info!("Database path: {}", db_path.display());

    let pool = init_database(&db_path, config.busy_timeout_ms)
        .await
        .context("Failed to open database")?;
    let core = ProfileCore::new(pool, config)
        .await
        .context("Failed to initialize profile core")?;

    match cli.command {
        Command::Show { id } => print_json(&core.search_by_id(&id).await?)?,
        Command::Search {
            city,
            nickname,
            sex,
            genres,
            instruments,
            page,
            cursor,
            scroll,
            size,
        } => {
            let criteria = SearchCriteria {
                city,
                nickname,
                sex,
                genre_ids: (!genres.is_empty()).then_some(genres),
                instrument_ids: (!instruments.is_empty()).then_some(instruments),
            };
            if scroll || cursor.is_some() {
                print_json(&core.search_by_cursor(&criteria, cursor.as_deref(), size).await?)?;
            } else {
                print_json(&core.search_page(&criteria, page, size).await?)?;
            }
        }
        Command::Batch { ids } => print_json(&core.search_by_ids(&ids).await?)?,
        Command::SetImage { id, url } => print_json(&core.update_image(&id, &url).await?)?,
        Command::Lookup => {
            let tables = serde_json::json!({
                "genres": core.lookup.entries(RelationKind::Genre),
                "instruments": core.lookup.entries(RelationKind::Instrument),
            });
            print_json(&tables)?;
        }
    }

    Ok(())
}
