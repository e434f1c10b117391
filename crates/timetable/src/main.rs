use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use timetable::{Room, RunMode, ScrapeConfig, Scraper};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "timetable-scrape")]
#[command(about = "Scrape room timetables into a SQLite store", long_about = None)]
struct Args {
    /// JSON array of {building_code, name, url} rooms
    room_list: PathBuf,

    /// Archive the existing store and start a new run
    #[arg(long)]
    fresh: bool,

    /// Continue the run in the existing store
    #[arg(long, conflicts_with = "fresh")]
    resume: bool,
}

impl Args {
    fn mode(&self) -> RunMode {
        if self.fresh {
            RunMode::Fresh
        } else if self.resume {
            RunMode::Resume
        } else {
            RunMode::Auto
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("timetable=info".parse()?),
        )
        .init();

    let rooms = Room::load_list(&args.room_list).with_context(|| {
        format!("failed to load room list from {}", args.room_list.display())
    })?;
    let config = ScrapeConfig::from_env();
    let mode = args.mode();
    info!(
        rooms = rooms.len(),
        db = %config.db_path.display(),
        mode = ?mode,
        "Loaded room list"
    );

    let scraper = Scraper::new(config)?;
    let stats = scraper.run(&rooms, mode).await?;

    println!("{}", serde_json::to_string_pretty(&stats)?);
    if stats.rooms_failed > 0 {
        info!(failed = stats.rooms_failed, "Some rooms could not be scraped");
    }
    Ok(())
}
