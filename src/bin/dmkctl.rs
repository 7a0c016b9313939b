//! dmkctl - operational tool over the provenance kernel.
//!
//! Everything the platform does to an upload, runnable against local files:
//! register users, run the full ingest decision, and inspect the three
//! provenance channels (stamp, watermark, fingerprint) one at a time.

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;

use deepmark_kernel::fingerprint::{self, face_backend};
use deepmark_kernel::media::codec;
use deepmark_kernel::stamp::{read_stamp, Stamp};
use deepmark_kernel::watermark::{extract_clip, WatermarkReadout};
use deepmark_kernel::{Decider, DeepmarkConfig, IngestOutcome, MediaType};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, env = "DEEPMARK_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the database schema and the blob root.
    InitDb,
    /// Register a user; mints and seals the per-user key.
    AddUser {
        #[arg(long)]
        name: String,
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        /// Opaque password hash supplied by the auth layer.
        #[arg(long)]
        password_hash: String,
    },
    /// Run the full ingest decision procedure on a local file.
    Ingest {
        #[arg(long)]
        user: String,
        #[arg(long)]
        file: PathBuf,
        /// Declared content type, e.g. video/mp4 or image/jpeg.
        #[arg(long)]
        content_type: String,
        #[arg(long, default_value = "")]
        caption: String,
    },
    /// Print the provenance stamp carried by a media file.
    StampRead {
        #[arg(long)]
        file: PathBuf,
        /// "image" or "video".
        #[arg(long)]
        media_type: String,
    },
    /// Blind-extract the watermark from a video file.
    WatermarkExtract {
        #[arg(long)]
        file: PathBuf,
    },
    /// Compute the facial-geometry content hash of a video file.
    Fingerprint {
        #[arg(long)]
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = DeepmarkConfig::load(args.config.as_deref())?;

    match args.command {
        Command::InitDb => {
            let _decider = Decider::from_config(&config)?;
            println!("schema ready at {}", config.db_path);
        }
        Command::AddUser {
            name,
            username,
            email,
            password_hash,
        } => {
            let mut decider = Decider::from_config(&config)?;
            let user = decider.register_user(&name, &username, &email, &password_hash)?;
            println!("created user {} (id {})", user.username, user.user_id);
        }
        Command::Ingest {
            user,
            file,
            content_type,
            caption,
        } => {
            let bytes = std::fs::read(&file)?;
            let filename = file
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| anyhow!("file path has no usable name"))?;
            let mut decider = Decider::from_config(&config)?;

            let bar = stage_bar("deciding");
            let outcome = decider.ingest(&user, filename, &content_type, &caption, &bytes)?;
            bar.finish_and_clear();

            match outcome {
                IngestOutcome::Accepted(post) => {
                    println!("201 created post {} at {}", post.id, post.media_url)
                }
                IngestOutcome::Rejected { kind, detail } => {
                    println!("{} {}", kind.status_code(), detail)
                }
            }
        }
        Command::StampRead { file, media_type } => {
            let bytes = std::fs::read(&file)?;
            let media_type = parse_media_type(&media_type)?;
            match read_stamp(media_type, &bytes)? {
                Stamp::Absent => println!("no stamp"),
                Stamp::Video { copyright } => println!("copyright: {}", copyright),
                Stamp::Image { deepmark } => {
                    println!("deepmark: {}", serde_json::Value::Object(deepmark))
                }
            }
        }
        Command::WatermarkExtract { file } => {
            let bytes = std::fs::read(&file)?;
            let bar = stage_bar("extracting watermark");
            let clip = codec::decode(&bytes)?;
            let readout = extract_clip(&clip, &config.watermark);
            bar.finish_and_clear();
            match readout {
                WatermarkReadout::Absent => println!("no watermark"),
                WatermarkReadout::Id(id) => println!("watermark: {}", id),
                WatermarkReadout::Manipulated => println!("video manipulated"),
            }
        }
        Command::Fingerprint { file } => {
            let bytes = std::fs::read(&file)?;
            let bar = stage_bar("fingerprinting");
            let clip = codec::decode(&bytes)?;
            let mut backend = face_backend(&config.face_backend)?;
            let hash = fingerprint::fingerprint_clip(
                &clip,
                backend.as_mut(),
                config.fingerprint_stride,
            )?;
            bar.finish_and_clear();
            println!("{}", hash);
        }
    }
    Ok(())
}

fn parse_media_type(value: &str) -> Result<MediaType> {
    match value {
        "image" => Ok(MediaType::Image),
        "video" => Ok(MediaType::Video),
        other => Err(anyhow!("media type must be image or video, got '{}'", other)),
    }
}

fn stage_bar(message: &'static str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner} {msg}").expect("static progress template"),
    );
    bar.set_message(message);
    bar
}
