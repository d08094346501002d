//! Command-line client for a fileshelf server.
//!
//! Opens one connection, runs one command, prints the result.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use fileshelf::Client;

/// Command-line arguments for the client
#[derive(Parser, Debug)]
#[command(name = "fileshelf-client")]
#[command(version = "0.1.0")]
#[command(about = "Talk to a fileshelf server", long_about = None)]
struct Cli {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:45000")]
    addr: String,

    #[command(subcommand)]
    command: Action,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// List files stored on the server
    List,
    /// Download a file
    Get {
        /// Remote filename
        filename: String,
        /// Local path to write (defaults to the remote name)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Upload a file
    Upload {
        /// Local file to send
        path: PathBuf,
        /// Remote name to store it under (defaults to the file's basename)
        #[arg(long = "as", value_name = "NAME")]
        name: Option<String>,
    },
    /// Delete a remote file
    Delete {
        /// Remote filename
        filename: String,
    },
}

#[tokio::main]
async fn main() -> fileshelf::Result<()> {
    let cli = Cli::parse();
    let mut client = Client::connect(&cli.addr).await?;

    match cli.command {
        Action::List => {
            for name in client.list().await? {
                println!("{name}");
            }
        }
        Action::Get { filename, output } => {
            let bytes = client.get(&filename).await?;
            let path = output.unwrap_or_else(|| PathBuf::from(&filename));
            tokio::fs::write(&path, &bytes).await?;
            println!("{} ({} bytes) -> {}", filename, bytes.len(), path.display());
        }
        Action::Upload { path, name } => {
            let bytes = tokio::fs::read(&path).await?;
            let name = match name {
                Some(name) => name,
                None => path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(str::to_string)
                    .ok_or("cannot derive a remote name from the path; use --as")?,
            };
            client.upload(&name, &bytes).await?;
            println!("{} ({} bytes) uploaded as {}", path.display(), bytes.len(), name);
        }
        Action::Delete { filename } => {
            let message = client.delete(&filename).await?;
            println!("{message}");
        }
    }

    Ok(())
}
