// streetpass: command-line front end for Streetpass Core
//
// Encode and decode advertisement payloads, manage the device configuration,
// and run two simulated devices that discover each other over a loopback radio.

mod config;
mod simulate;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use streetpass_core::codec::LEGACY_PDU_LEN;
use streetpass_core::config::default_app_tag;
use streetpass_core::{FieldKind, FieldValue, IdentityToken, PayloadFormat};

#[derive(Parser)]
#[command(name = "streetpass")]
#[command(about = "Streetpass: passive peer discovery over radio advertisements", long_about = None)]
#[command(version)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode an identity into advertisement fields
    Encode {
        /// App tag (defaults to the configured one)
        #[arg(long)]
        app_tag: Option<String>,
        /// User id (defaults to the configured one)
        #[arg(long)]
        user_id: Option<String>,
        /// local_name or manufacturer_data
        #[arg(long)]
        format: Option<PayloadFormat>,
    },
    /// Decode a received advertisement field
    Decode {
        /// Local name text, or hex bytes for manufacturer data
        payload: String,
        /// local_name or manufacturer_data
        #[arg(long)]
        format: Option<PayloadFormat>,
    },
    /// Run two simulated devices that discover each other
    Simulate {
        /// Times each advertisement is relayed
        #[arg(short, long)]
        rounds: Option<usize>,
        /// Print final display states as JSON
        #[arg(long)]
        json: bool,
    },
    /// Configure settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Set { key: String, value: String },
    Get { key: String },
    List,
    /// Restore defaults
    Reset,
    /// Print the config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Commands::Encode {
            app_tag,
            user_id,
            format,
        } => cmd_encode(app_tag, user_id, format),
        Commands::Decode { payload, format } => cmd_decode(&payload, format),
        Commands::Simulate { rounds, json } => {
            let config = config::Config::load()?;
            simulate::run(&config, rounds, json).await
        }
        Commands::Config { action } => cmd_config(action),
    }
}

fn cmd_encode(
    app_tag: Option<String>,
    user_id: Option<String>,
    format: Option<PayloadFormat>,
) -> Result<()> {
    let config = config::Config::load()?;
    let mut device = config.device;
    if let Some(format) = format {
        if device.app_tag == default_app_tag(device.payload_format) {
            device.app_tag = default_app_tag(format).to_string();
        }
        device.payload_format = format;
    }
    if let Some(tag) = app_tag {
        device.app_tag = tag;
    }
    if let Some(user) = user_id {
        device.user_id = user;
    }

    let token = device.token();
    let payload = device
        .codec()
        .encode(&token)
        .with_context(|| format!("Cannot encode {}", token))?;

    println!("{}", "Advertisement".bold());
    println!("  {} {}", "Format:".bright_black(), device.payload_format);
    println!("  {} {}", "Identity:".bright_black(), token);
    if let Some(name) = &payload.local_name {
        println!("  {} {}", "Local name:".bright_black(), name.bright_cyan());
    }
    if let Some(data) = &payload.manufacturer_data {
        println!(
            "  {} {} ({} bytes)",
            "Manufacturer data:".bright_black(),
            hex::encode(data).bright_cyan(),
            data.len()
        );
    }
    println!(
        "  {} {}/{} bytes",
        "Advertising data:".bright_black(),
        payload.advertising_data_len(),
        LEGACY_PDU_LEN
    );
    if payload.scan_response_len() > 0 {
        println!(
            "  {} {}/{} bytes",
            "Scan response:".bright_black(),
            payload.scan_response_len(),
            LEGACY_PDU_LEN
        );
    }
    Ok(())
}

fn cmd_decode(payload: &str, format: Option<PayloadFormat>) -> Result<()> {
    let config = config::Config::load()?;
    let mut device = config.device;
    if let Some(format) = format {
        if device.app_tag == default_app_tag(device.payload_format) {
            device.app_tag = default_app_tag(format).to_string();
        }
        device.payload_format = format;
    }

    let field = match device.payload_format.field_kind() {
        FieldKind::LocalName => FieldValue::Text(payload.to_string()),
        FieldKind::ManufacturerData => {
            FieldValue::Bytes(hex::decode(payload.trim()).context("Payload is not valid hex")?)
        }
    };

    let token: IdentityToken = device
        .codec()
        .decode(&field)
        .with_context(|| format!("Cannot decode {} payload", device.payload_format))?;

    println!("{} Decoded {}", "✓".green(), device.payload_format);
    println!("  {} {}", "App tag:".bright_black(), token.app_tag.bright_cyan());
    println!("  {} {}", "User ID:".bright_black(), token.user_id.bright_cyan());
    if token.app_tag != device.app_tag {
        println!(
            "  {} app tag differs from configured {}; a scanner would ignore it",
            "!".yellow(),
            device.app_tag
        );
    }
    Ok(())
}

fn cmd_config(action: ConfigAction) -> Result<()> {
    // Reset must work even when the stored file no longer loads
    if let ConfigAction::Reset = action {
        config::Config::default().save()?;
        println!("{} Configuration reset to defaults", "✓".green());
        return Ok(());
    }

    let mut config = config::Config::load()?;

    match action {
        ConfigAction::Set { key, value } => {
            config.set(&key, &value)?;
            config.save()?;
            println!("{} Set {} = {}", "✓".green(), key.bright_cyan(), value);
        }

        ConfigAction::Get { key } => {
            if let Some(value) = config.get(&key) {
                println!("{} = {}", key.bright_cyan(), value);
            } else {
                anyhow::bail!("Unknown config key: {}", key);
            }
        }

        ConfigAction::List => {
            println!("{}", "Configuration".bold());
            println!();

            for (key, value) in config.list() {
                println!("  {} = {}", key.bright_cyan(), value);
            }

            println!();
            println!(
                "{} {}",
                "Config file:".bright_black(),
                config::Config::config_file()?.display()
            );
        }

        ConfigAction::Reset => {}

        ConfigAction::Path => {
            println!("{}", config::Config::config_file()?.display());
        }
    }

    Ok(())
}
