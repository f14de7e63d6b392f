//! Playground Explorer CLI
//!
//! Search, rate and favorite playgrounds from the command line, or run the
//! HTTP service.
//!
//! Usage:
//!     playground-explorer serve --port 3000
//!     playground-explorer search "Hyde Park" --region gb
//!     playground-explorer nearby 40.7831 -73.9712 --radius 2000
//!     playground-explorer --user alice rate google-abc overall=5 shade=3

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

use playground_explorer::core::ratings::Score;
use playground_explorer::ports::{FavoriteStore, PhotoStore, RatingStore, Session, SessionContext};
use playground_explorer::{AppState, Config, Coordinates, PlaygroundId, PlaygroundRecord, SearchRequest};

/// Playground Explorer - find, rate and favorite playgrounds
#[derive(Parser)]
#[command(name = "playground-explorer")]
#[command(version)]
#[command(about = "Multi-source playground search with community ratings", long_about = None)]
struct Cli {
    /// Act as this signed-in user
    #[arg(long, global = true)]
    user: Option<String>,

    /// Database file (overrides DATABASE_PATH)
    #[arg(long, global = true)]
    database: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service
    Serve {
        /// Listen port (overrides PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Search by place or playground name
    Search {
        /// Free-text query
        query: String,

        /// Country code scoping the search (overrides REGION)
        #[arg(long)]
        region: Option<String>,
    },

    /// Search around a location
    Nearby {
        #[arg(allow_hyphen_values = true)]
        lat: f64,

        #[arg(allow_hyphen_values = true)]
        lon: f64,

        /// Radius in meters
        #[arg(short, long)]
        radius: Option<u32>,
    },

    /// Toggle a favorite, or list favorites when no id is given
    Favorite {
        /// Playground id, e.g. google-ChIJ... or osm-node-123
        id: Option<String>,
    },

    /// Rate a playground: category=score pairs, scores 1-5
    Rate {
        id: String,

        #[arg(required = true)]
        scores: Vec<String>,

        /// Optional written review
        #[arg(long)]
        review: Option<String>,
    },

    /// Show a playground's ratings
    Ratings { id: String },

    /// Show the best-rated playgrounds
    Top {
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Upload a private photo of a playground
    UploadPhoto { id: String, file: String },
}

fn expand_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

fn parse_id(raw: &str) -> Result<PlaygroundId> {
    raw.parse().with_context(|| format!("invalid playground id {raw:?}"))
}

fn parse_scores(pairs: &[String]) -> Result<BTreeMap<String, Score>> {
    let mut scores = BTreeMap::new();
    for pair in pairs {
        let Some((category, value)) = pair.split_once('=') else {
            bail!("expected category=score, got {pair:?}");
        };
        let value: u8 = value.trim().parse().with_context(|| format!("bad score in {pair:?}"))?;
        let Some(score) = Score::new(value) else {
            bail!("score for {category} must be between 1 and 5");
        };
        scores.insert(category.to_string(), score);
    }
    Ok(scores)
}

fn print_record(index: usize, record: &PlaygroundRecord, reference: Option<&Coordinates>) {
    let distance = reference
        .map(|r| format!("{:.1} km", playground_explorer::core::distance::haversine_km(r, &record.coordinates)))
        .unwrap_or_else(|| "-".to_string());
    println!("{:>3}. {} [{}]  {}", index + 1, record.name, record.id, distance);

    if let Some(address) = &record.address {
        println!("     {address}");
    }
    if !record.amenities.is_empty() {
        let amenities: Vec<&str> = record.amenities.iter().map(String::as_str).collect();
        println!("     amenities: {}", amenities.join(", "));
    }
    if let Some(avg) = record.rating.community_average {
        println!("     community: {avg:.1}/5 ({} raters)", record.rating.community_count.unwrap_or(0));
    } else if let Some(avg) = record.rating.provider_average {
        println!("     rated {avg:.1}/5 ({} reviews)", record.rating.provider_count.unwrap_or(0));
    }
    if record.approximate_location {
        println!("     (approximate location)");
    }
}

async fn cmd_search(state: &AppState, request: SearchRequest) {
    let response = state.pipeline.search(request).await;
    match &response.reference {
        Some(reference) => println!("Sorted by distance from {reference}"),
        None => println!("No reference point; results in source order"),
    }
    println!();

    if response.results.is_empty() {
        println!("No playgrounds found.");
        return;
    }
    for (i, record) in response.results.iter().enumerate() {
        print_record(i, record, response.reference.as_ref());
    }
}

async fn cmd_favorite(state: &AppState, session: &Session, id: Option<String>) -> Result<()> {
    match id {
        Some(id) => {
            let id = parse_id(&id)?;
            let favorite = state.favorites.toggle_favorite(session, &id).await?;
            println!("{id} {}", if favorite { "added to favorites" } else { "removed from favorites" });
        }
        None => {
            let favorites = state.favorites.favorites(session).await?;
            if favorites.is_empty() {
                println!("No favorites yet.");
            }
            for id in favorites {
                println!("  - {id}");
            }
        }
    }
    Ok(())
}

async fn cmd_ratings(state: &AppState, id: &str) -> Result<()> {
    let id = parse_id(id)?;
    let aggregate = state.ratings.aggregate_ratings(&id).await?;

    println!("Ratings for {id} ({} raters)", aggregate.total);
    println!("  overall: {:.2}", aggregate.overall);
    for (category, mean) in &aggregate.categories {
        println!("  {category:<14} {mean:.2}");
    }

    for entry in state.ratings.ratings_for(&id).await? {
        if let Some(review) = &entry.review {
            println!("  \"{review}\" ({})", entry.user_id);
        }
    }
    Ok(())
}

async fn cmd_top(state: &AppState, limit: usize) -> Result<()> {
    let top = state.ratings.top_rated(limit).await?;
    if top.is_empty() {
        println!("Nothing rated yet.");
    }
    for (i, entry) in top.iter().enumerate() {
        let name = entry.name.as_deref().unwrap_or("");
        println!(
            "{:>3}. {:.2}  {} {}  ({} raters)",
            i + 1,
            entry.overall,
            entry.playground_id,
            name,
            entry.total
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if let Some(database) = &cli.database {
        config = config.with_database_path(expand_path(database));
    }
    if let Commands::Serve { port: Some(port) } = &cli.command {
        config = config.with_port(*port);
    }
    if let Commands::Search { region: Some(region), .. } = &cli.command {
        config = config.with_region(region.as_str());
    }

    let state = AppState::from_config(config).context("cannot start")?;

    let context = SessionContext::new(cli.user.as_deref().map(Session::authenticated).unwrap_or_default());
    let _subscription = context.subscribe(|session| debug!(user = ?session.user_id(), "session changed"));
    let session = context.current();

    match cli.command {
        Commands::Serve { .. } => {
            playground_explorer::server::serve(state).await?;
        }
        Commands::Search { query, .. } => {
            cmd_search(&state, SearchRequest::text(query)).await;
        }
        Commands::Nearby { lat, lon, radius } => {
            let Some(center) = Coordinates::new(lat, lon) else {
                bail!("coordinates out of range: {lat},{lon}");
            };
            let mut request = SearchRequest::near(center);
            request.radius_m = radius;
            cmd_search(&state, request).await;
        }
        Commands::Favorite { id } => {
            cmd_favorite(&state, &session, id).await?;
        }
        Commands::Rate { id, scores, review } => {
            let id = parse_id(&id)?;
            let scores = parse_scores(&scores)?;
            let written = state
                .ratings
                .submit_ratings(&session, &id, &scores, review.as_deref())
                .await?;
            println!("Saved {written} rating(s) for {id}");
        }
        Commands::Ratings { id } => {
            cmd_ratings(&state, &id).await?;
        }
        Commands::Top { limit } => {
            cmd_top(&state, limit).await?;
        }
        Commands::UploadPhoto { id, file } => {
            let id = parse_id(&id)?;
            let path = expand_path(&file);
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("cannot read {}", path.display()))?;
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "photo.jpg".to_string());
            let photo = state.photos.upload(&session, &id, &filename, bytes).await?;
            println!("Uploaded: {}", photo.url);
        }
    }

    Ok(())
}
