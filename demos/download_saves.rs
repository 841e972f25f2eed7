//! Download the saves of one registered title
//!
//! This demo shows the core flow of xbox-savegame-dl:
//! - Loading configuration from the environment (and an optional `.env`)
//! - Creating a save manager
//! - Subscribing to pipeline events
//! - Downloading and archiving a title's saves
//!
//! ```bash
//! XBOX_CLIENT_ID=... REDIRECT_URI=http://localhost:8080/auth/callback \
//!     cargo run --example download_saves -- cli_user "Project Spark"
//! ```
//!
//! The user must already have a bundle in the credential store.

use tracing_subscriber::EnvFilter;
use xbox_savegame_dl::{Config, Event, SaveManager};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut args = std::env::args().skip(1);
    let (Some(user_id), Some(title)) = (args.next(), args.next()) else {
        eprintln!("usage: download_saves <user id> <game name>");
        std::process::exit(2);
    };

    let manager = SaveManager::new(Config::from_env()?).await?;

    println!("Known titles:");
    for descriptor in manager.registry().iter() {
        println!("  {} ({})", descriptor.name, descriptor.package_family_name);
    }

    let mut events = manager.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                Event::Authenticated { gamertag, .. } => {
                    println!("✓ Authenticated as {}", gamertag.unwrap_or_default());
                }
                Event::CatalogListed { blobs, .. } => println!("⬇ Catalog lists {} blobs", blobs),
                Event::SelectionSkipped { blob, reason } => {
                    println!("⚠ Skipped {}: {}", blob, reason)
                }
                Event::Archived { path, size_bytes } => {
                    println!("📦 Archive {:?} ({} bytes)", path, size_bytes)
                }
                other => println!("  {:?}", other),
            }
        }
    });

    match manager.download_title(&user_id, &title).await {
        Ok(download) => {
            println!("Saves written to {}", download.archive_path.display());
        }
        Err(e) => {
            eprintln!("✗ {} ({})", e.user_message(), e.error_code());
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}
