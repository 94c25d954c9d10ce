use clap::{Parser, Subcommand};
use std::net::SocketAddr;

#[derive(Parser, Debug)]
#[command(name = "mediabox")]
#[command(about = "Media download service", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP server
    Serve(ServeArgs),
    /// List the formats available for a URL without downloading
    Formats(FormatsArgs),
}

#[derive(clap::Args, Debug)]
pub struct ServeArgs {
    /// Address to bind, overriding `server.bind_addr`
    #[arg(long)]
    pub address: Option<SocketAddr>,
}

#[derive(clap::Args, Debug)]
pub struct FormatsArgs {
    /// Media page URL
    pub url: String,
}
