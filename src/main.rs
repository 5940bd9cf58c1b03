use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use photoscore::store::PhotoStore;
use photoscore::{config, detect, gallery, FileStore, Handled, ScoringContext, UploadEvent};

#[derive(Parser)]
#[command(name = "photoscore")]
#[command(
    version,
    about = "Score contest photos against reference face galleries"
)]
struct Cli {
    /// Config file (defaults to the installed location)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score an uploaded photo from its detected faces
    Score {
        /// Object path of the photo, e.g. wedding-photos/abc.jpg
        object: String,
        /// JSON file with the detector output for the photo
        #[arg(short, long)]
        faces: PathBuf,
        /// Bucket the photo was uploaded to
        #[arg(short, long, default_value = "")]
        bucket: String,
        /// Submitter display name
        #[arg(short, long)]
        user: Option<String>,
    },
    /// List the loaded galleries
    Galleries,
    /// Print the stored record for a photo
    Show {
        /// File name of the photo, e.g. abc.jpg
        file_name: String,
    },
    /// List the highest scoring photos
    Rank {
        /// Rank by this gallery's score instead of the overall score
        #[arg(short, long)]
        gallery: Option<String>,
        /// Number of photos to print
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    /// Open config file in editor
    Config,
}

fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Score {
            object,
            faces,
            bucket,
            user,
        } => score(cfg, &object, &faces, &bucket, user),
        Commands::Galleries => galleries(&cfg),
        Commands::Show { file_name } => show(&cfg, &file_name),
        Commands::Rank { gallery, limit } => rank(&cfg, gallery.as_deref(), limit),
        Commands::Config => open_config(cli.config),
    }
}

fn score(
    cfg: config::Config,
    object: &str,
    faces_path: &std::path::Path,
    bucket: &str,
    user: Option<String>,
) -> Result<()> {
    let store = FileStore::open(&cfg.store_dir, &cfg.collection)
        .with_context(|| format!("opening store in {}", cfg.store_dir.display()))?;
    let ctx = ScoringContext::init(cfg).context("Failed to load galleries")?;

    let faces = detect::load_detections(faces_path)?;

    let mut event = UploadEvent::new(bucket, object);
    if let Some(user) = user {
        event = event.with_user_name(user);
    }

    match photoscore::score_faces(&ctx, &store, &event, &faces)
        .with_context(|| format!("scoring {}", object))?
    {
        Handled::Processed(report) => {
            for (name, score) in report.scores.iter() {
                info!("{}: {:.4}", name, score);
            }
            info!(
                "✓ {:?} record {} (score {:.4}, {} face(s))",
                report.outcome, report.id, report.record.score, report.record.face_count
            );
            println!("{}", serde_json::to_string_pretty(&report.record.to_document())?);
        }
        Handled::Skipped(reason) => warn!("Not scored: {}", reason),
    }
    Ok(())
}

fn galleries(cfg: &config::Config) -> Result<()> {
    let collection = gallery::load(&cfg.gallery_dir, cfg.gallery_prefix.as_deref())
        .context("Failed to load galleries")?;

    let primary = &cfg.primary_gallery;
    if collection.get(primary).is_none() {
        warn!(
            "Primary gallery '{}' not found; overall score falls back to '{}'",
            primary,
            collection.names().next().unwrap_or_default()
        );
    }
    for g in collection.iter() {
        let marker = if g.name() == primary { " (primary)" } else { "" };
        println!("{}{}: {} x {}", g.name(), marker, g.len(), g.dim());
    }
    Ok(())
}

fn show(cfg: &config::Config, file_name: &str) -> Result<()> {
    let store = FileStore::open(&cfg.store_dir, &cfg.collection)
        .with_context(|| format!("opening store in {}", cfg.store_dir.display()))?;
    let matches = store
        .find_by_file_name(file_name, usize::MAX)
        .context("Failed to read store")?;

    if matches.is_empty() {
        anyhow::bail!("No record for {}", file_name);
    }
    if matches.len() > 1 {
        warn!("{} records share file name {}", matches.len(), file_name);
    }
    for stored in matches {
        println!("{}", serde_json::to_string_pretty(&stored.record.to_document())?);
    }
    Ok(())
}

fn rank(cfg: &config::Config, gallery: Option<&str>, limit: usize) -> Result<()> {
    let store = FileStore::open(&cfg.store_dir, &cfg.collection)
        .with_context(|| format!("opening store in {}", cfg.store_dir.display()))?;
    let ranked = store.top(gallery, limit).context("Failed to read store")?;

    if ranked.is_empty() {
        info!("No scored photos yet");
    }
    for stored in ranked {
        println!("{}", serde_json::to_string(&stored.record.to_document())?);
    }
    Ok(())
}

fn open_config(path: Option<PathBuf>) -> Result<()> {
    let config_path = path.unwrap_or_else(|| config::CONFIG_PATH.to_path_buf());
    if !config_path.exists() {
        config::save_config(&config::Config::default(), Some(&config_path))
            .context("Failed to write default config")?;
    }
    let editor = env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());

    info!("Opening config file: {:?}", config_path);

    let status = std::process::Command::new(editor)
        .arg(&config_path)
        .status()
        .context("Failed to open editor")?;

    if !status.success() {
        anyhow::bail!("Editor exited with non-zero status");
    }

    Ok(())
}
