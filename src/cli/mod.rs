use clap::{Parser, Subcommand};

/// `prompt-enhancer` - rate-limited prompt generation and refinement service.
#[derive(Parser, Debug)]
#[command(name = "prompt-enhancer")]
#[command(version)]
#[command(about = "Turn short topics into detailed prompts for a generative model.", long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP service
    Serve {
        /// Port to listen on (use 0 for random available port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,
    },

    /// Show trailing 24h usage for a client identifier
    Usage {
        /// Client identifier (the caller's IP address)
        client: String,
    },

    /// Delete usage records older than the given age
    Prune {
        /// Age threshold in hours
        #[arg(long, default_value_t = 24)]
        older_than_hours: u32,
    },

    /// List template categories
    Templates,

    /// Show resolved configuration
    Status,
}
