mod cli;

use streamgate::{
    backend::{BackendIdentity, DirectoryBackend, DirectoryStore},
    config::{self, Config},
    server,
    streaming::Dispatcher,
};
use streamgate_common::{DcId, ReferenceTuple};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::path::Path;
use std::sync::Arc;

fn directory_backend(config: &Config) -> DirectoryBackend {
    DirectoryBackend::new(config.stores.iter().map(DirectoryStore::from))
}

fn identities(config: &Config, backend: &DirectoryBackend) -> Vec<Arc<dyn BackendIdentity>> {
    config
        .identities
        .iter()
        .map(|identity| {
            Arc::new(backend.identity(identity.name.clone(), DcId(identity.home_dc)))
                as Arc<dyn BackendIdentity>
        })
        .collect()
}

async fn start_server(
    host: Option<String>,
    port: Option<u16>,
    config_path: Option<&Path>,
) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;

    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    config::validate_config(&config)?;

    tracing::info!("Starting Streamgate server");
    tracing::info!(
        "Server will listen on {}:{}",
        config.server.host,
        config.server.port
    );

    let backend = directory_backend(&config);
    tracing::info!(
        identities = config.identities.len(),
        stores = backend.store_count(),
        "Directory backend ready"
    );

    let dispatcher = Dispatcher::new(identities(&config, &backend), config.streaming.settings())?;
    server::start_server(config, Arc::new(dispatcher)).await
}

async fn encode_link(
    store_id: i64,
    message_id: i64,
    hash: Option<String>,
    name: Option<String>,
    config_path: Option<&Path>,
) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;

    let hash = match hash {
        Some(hash) => hash,
        None => {
            let backend = directory_backend(&config);
            let identity = backend.identity("cli", DcId(0));
            let object = identity
                .get_object(store_id, message_id)
                .await
                .context("Failed to look up object")?;
            let media = object
                .and_then(|object| object.media)
                .with_context(|| format!("No media for store {store_id}, message {message_id}"))?;
            media.unique_id
        }
    };

    let tuple = ReferenceTuple::from_unique_id(store_id, message_id, &hash);
    let link = streamgate_codec::encode(&tuple)?;
    let name = name.unwrap_or_else(|| "file".to_string());

    println!("{link}");
    println!(
        "{}/dl/{}/{}",
        config.server.base_url.trim_end_matches('/'),
        link,
        name
    );
    Ok(())
}

fn decode_link(link: &str) -> Result<()> {
    let tuple = streamgate_codec::decode(link)?;
    println!("{}", serde_json::to_string_pretty(&tuple)?);
    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(path) => config::load_config(path)?,
        None => {
            let config = config::load_config_or_default(None)?;
            config::validate_config(&config)?;
            config
        }
    };

    println!("Configuration is valid");
    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!("  Chunk size: {} bytes", config.streaming.chunk_size);
    println!("  Identities: {}", config.identities.len());
    for identity in &config.identities {
        println!("    - {} (home DC {})", identity.name, identity.home_dc);
    }
    println!("  Stores: {}", config.stores.len());
    for store in &config.stores {
        println!("    - {} in DC {} at {:?}", store.id, store.dc, store.path);
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "streamgate=trace,streamgate_codec=debug,tower_http=debug".to_string()
        } else {
            "streamgate=debug,tower_http=info".to_string()
        }
    });

    // Logs go to stderr so `encode` and `decode` output stays pipeable
    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Start { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(host, port, cli.config.as_deref()))
        }
        Commands::Encode {
            store_id,
            message_id,
            hash,
            name,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(encode_link(
                store_id,
                message_id,
                hash,
                name,
                cli.config.as_deref(),
            ))
        }
        Commands::Decode { link } => decode_link(&link),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("streamgate {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
