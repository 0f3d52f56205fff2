use clap::{Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use colored::Colorize;
use macros_rs::crashln;

use tpadmin::{
    AdminServer, config,
    config::structs::Config,
    helpers,
    transport::ws::WsTransport,
};

#[derive(Parser)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    #[clap(flatten)]
    verbose: Verbosity<InfoLevel>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the admin server and wait for agents
    #[command(visible_alias = "start")]
    Serve {
        /// Address to listen on
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Show the effective configuration
    Config,
}

fn main() {
    let cli = Cli::parse();
    env_logger::Builder::new().filter_level(cli.verbose.log_level_filter()).init();

    let config = match config::read() {
        Ok(config) => config,
        Err(err) => crashln!("{} Cannot read config.\n{}", *helpers::FAIL, format!("{err:#}").white()),
    };

    match cli.command {
        Commands::Serve { host, port } => serve(config.with_overrides(host, port)),
        Commands::Config => show(&config),
    }
}

fn serve(config: Config) {
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => crashln!("{} Cannot start async runtime.\n{}", *helpers::FAIL, err.to_string().white()),
    };

    runtime.block_on(async {
        let transport = WsTransport::new();
        let server = match AdminServer::builder(transport).config(config).start().await {
            Ok(server) => server,
            Err(err) => crashln!("{} Cannot start admin server.\n{}", *helpers::FAIL, format!("{err:#}").white()),
        };

        if let Some(addr) = server.transport().local_addr() {
            println!("{} Admin server listening on ws://{addr}", *helpers::SUCCESS);
        }

        if let Err(err) = tokio::signal::ctrl_c().await {
            log::error!("failed to listen for shutdown signal: {err}");
        }

        let connected = server.connected_count();
        if connected > 0 {
            println!("{} Shutting down with {connected} agent(s) connected", *helpers::WARN);
        }

        server.shutdown().await;
        println!("{} Admin server stopped", *helpers::SUCCESS);
    });
}

fn show(config: &Config) {
    match config::path() {
        Ok(path) => println!("{} {}", *helpers::SUCCESS, path.display()),
        Err(err) => println!("{} {err}", *helpers::WARN),
    }

    match toml::to_string_pretty(config) {
        Ok(contents) => println!("{contents}"),
        Err(err) => crashln!("{} Cannot display config.\n{}", *helpers::FAIL, err.to_string().white()),
    }
}
