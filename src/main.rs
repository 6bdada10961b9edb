use std::path::PathBuf;
use std::process;

use accountd::config::{CommonConfig, PathSet, ServerConfig};
use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct ServerArgs {
    /// Print server configuration data (JSON) and exit.
    #[arg(long)]
    pub print_config: bool,

    /// The config directory, default is `$ACCOUNTD_CONFIG` or `~/.config/accountd`.
    #[arg(long)]
    pub config_dir: Option<PathBuf>,

    /// The data directory, default is `$ACCOUNTD_DATA` or `~/.local/share/accountd`.
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
}

async fn run(args: ServerArgs) -> Result<()> {
    let ps = PathSet::new(args.config_dir, args.data_dir).context("init paths")?;
    let cfg: ServerConfig = ps.load_config("accountd", ServerConfig::default)?;

    if args.print_config {
        println!("{}", serde_json::to_string_pretty(&cfg)?);
        return Ok(());
    }

    cfg.logs.init()?;

    let ctx = cfg.build_ctx()?;
    let restful_server = cfg.build_restful_server(ctx)?;

    restful_server.run().await.context("run restful server")?;

    info!("Server exited by user");
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = ServerArgs::parse();
    if let Err(e) = run(args).await {
        error!("Error: {:#}", e);
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}
