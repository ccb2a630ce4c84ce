use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "streamgate")]
#[command(author, version, about = "HTTP range streaming gateway for chunked media backends")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the streaming server
    Start {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Mint an opaque download link for a stored object
    Encode {
        /// Store (channel) id
        #[arg(allow_hyphen_values = true)]
        store_id: i64,

        /// Message id inside the store
        message_id: i64,

        /// Verification hash; looked up through the configured stores when omitted
        #[arg(long)]
        hash: Option<String>,

        /// Display name appended to the printed URL
        #[arg(long)]
        name: Option<String>,
    },

    /// Decode an opaque link back into its reference tuple
    Decode {
        /// The opaque link
        link: String,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
