mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use mediabox::config::{Config, config_path};
use mediabox::engines::{FormatOption, Fetcher, YtDlpFetcher};
use mediabox::observability::init_logging;
use mediabox::registry::canonical_url;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    let config = Config::load()?;
    let _log_guard = init_logging(&config.logging)?;
    info!(path = %config_path().display(), "Configuration loaded");

    match cli.command {
        Commands::Serve(args) => {
            let address = args.address.unwrap_or(config.server.bind_addr);
            mediabox::api::run(config, address).await?
        }
        Commands::Formats(args) => {
            let url = canonical_url(&args.url)?;
            let fetcher = YtDlpFetcher::new(&config.fetcher);
            let info = fetcher.list_formats(url.as_str()).await?;

            println!("{}", info.title);
            println!("{:<12} {:<14} {:<12} {:<6} SIZE", "ID", "QUALITY", "RESOLUTION", "EXT");
            for format in &info.formats {
                print_format(format);
            }
        }
    }

    Ok(())
}

fn print_format(format: &FormatOption) {
    println!(
        "{:<12} {:<14} {:<12} {:<6} {}",
        format.format_id,
        format.quality_label,
        format.resolution,
        format.file_extension,
        format.size_label().unwrap_or_else(|| "-".to_string()),
    );
}
