use std::path::PathBuf;

use anyhow::Result;
use blox_transport_lib::{
    commands,
    config::{CONFIG_FILE_NAME, TransportConfig},
    logging,
    state::AppState,
};
use clap::{Parser, Subcommand};
use log::{Level, info};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "blox-transport", about = "Talk to a Blox appliance over BLE, falling back to HTTP")]
struct Cli {
    /// Path of the transport configuration file
    #[arg(long, default_value = CONFIG_FILE_NAME)]
    config: PathBuf,

    #[arg(long, default_value = "info")]
    log_level: Level,

    /// Also append log records to this file as JSON lines
    #[arg(long)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List nearby Blox devices
    Scan,
    /// Connect to the Blox device
    Connect,
    /// Disconnect from the Blox device
    Disconnect,
    /// List Wi-Fi networks visible to the appliance
    WifiList,
    /// Show the appliance's Wi-Fi status
    WifiStatus,
    /// Join the appliance to a Wi-Fi network
    WifiConnect {
        ssid: String,
        password: String,
        country_code: String,
    },
    /// Fetch appliance logs; params is a JSON object
    Logs {
        #[arg(default_value = "{}")]
        params: String,
    },
    /// Send a raw command over BLE
    Raw {
        #[arg(required = true, num_args = 1..)]
        command: Vec<String>,
    },
    /// Write the effective configuration to the config path
    InitConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match logging::init(cli.log_level) {
        Ok(feed) => {
            if let Some(path) = cli.log_file.clone() {
                tokio::spawn(async move {
                    if let Err(e) = logging::write_feed_to_file(feed, path).await {
                        eprintln!("Log file sink stopped: {}", e);
                    }
                });
            }
        }
        // Only fall back to env_logger if the feed logger could not be installed
        Err(_) => env_logger::builder()
            .filter_level(cli.log_level.to_level_filter())
            .init(),
    }

    let config = TransportConfig::load(&cli.config).await?;
    if let Command::InitConfig = cli.command {
        config.save(&cli.config).await?;
        return Ok(());
    }

    info!("Starting Blox transport");
    let app_state = AppState::new(config).await?;

    let output: Value = match &cli.command {
        Command::Scan => commands::scan_devices(&app_state).await?,
        Command::Connect => commands::connect_to_device(&app_state).await?,
        Command::Disconnect => {
            commands::disconnect(&app_state).await?;
            Value::Null
        }
        Command::WifiList => commands::wifi_list(&app_state).await?,
        Command::WifiStatus => commands::wifi_status(&app_state).await?,
        Command::WifiConnect {
            ssid,
            password,
            country_code,
        } => commands::wifi_connect(&app_state, ssid, password, country_code).await?,
        Command::Logs { params } => commands::logs(&app_state, params).await?,
        Command::Raw { command } => commands::raw_command(&app_state, &command.join(" ")).await?,
        Command::InitConfig => Value::Null,
    };

    app_state.get_transport_arc().cleanup().await;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
