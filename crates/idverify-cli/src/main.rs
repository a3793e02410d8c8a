use anyhow::Result;
use clap::{Parser, Subcommand};
use idverify_core::MatchResult;
use idverify_doc::DocumentReport;
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod config;
mod engine;

use config::Config;
use engine::EngineHandle;

#[derive(Parser)]
#[command(name = "idverify", about = "Identity document verification: selfie face match and document field extraction")]
struct Cli {
    /// TOML configuration file (overrides defaults; IDVERIFY_* variables override the file)
    #[arg(long, global = true, env = "IDVERIFY_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare the portrait on a document with a selfie
    Verify {
        /// Document image (path or http(s) URL)
        #[arg(short, long)]
        document: String,
        /// Selfie image (path or http(s) URL)
        #[arg(short, long)]
        selfie: String,
        /// Cosine similarity threshold for a match
        #[arg(short, long)]
        threshold: Option<f32>,
    },
    /// Read date of birth and name from a document
    Extract {
        /// Document image (path or http(s) URL)
        #[arg(short, long)]
        document: String,
    },
    /// Run both pipelines and print the combined result
    Check {
        #[arg(short, long)]
        document: String,
        #[arg(short, long)]
        selfie: String,
        #[arg(short, long)]
        threshold: Option<f32>,
    },
}

/// Combined output of `check`.
#[derive(Serialize)]
struct CheckReport {
    name: Option<String>,
    name_local: Option<String>,
    dob: Option<String>,
    age: u32,
    is_adult: bool,
    face_match: MatchResult,
}

impl CheckReport {
    fn new(doc: DocumentReport, face_match: MatchResult) -> Self {
        Self {
            name: doc.name_alt,
            name_local: doc.name_local,
            dob: doc.date_of_birth,
            age: doc.age,
            is_adult: doc.is_adult,
            face_match,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    tracing::debug!(?config, "configuration loaded");

    let (verifier, extractor) = engine::load_pipelines(&config)?;
    let engine = EngineHandle::spawn(verifier, extractor, config.request_timeout())?;
    tracing::info!("models loaded");

    match cli.command {
        Commands::Verify { document, selfie, threshold } => {
            let result = engine.verify_references(&document, &selfie, threshold).await?;
            print_json(&result)?;
        }
        Commands::Extract { document } => {
            let report = engine.extract_reference(&document).await?;
            print_json(&report)?;
        }
        Commands::Check { document, selfie, threshold } => {
            let (face, doc) = tokio::join!(
                engine.verify_references(&document, &selfie, threshold),
                engine.extract_reference(&document),
            );
            print_json(&CheckReport::new(doc?, face?))?;
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
