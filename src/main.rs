//! canmb CLI entry point.
//!
//! Offline document tooling (`validate`, `show`, `decode`, `encode`) works
//! in any build; the `run` command needs the `can` and `modbus-rtu`
//! features and a Linux host:
//! ```bash
//! cargo run --features full -- run --can-if can0 --serial /dev/ttyUSB0
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use canmb::codec::{decode_frame, encode_frame};
use canmb::core::error::{BridgeError, Result};
use canmb::gateway::{load_translator, BridgePaths};
use canmb::schema::parser::parse_uint_flexible;

/// canmb - configuration-driven CAN/Modbus-RTU bridge
#[derive(Parser, Debug)]
#[command(name = "canmb", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Locations of the three configuration documents.
#[derive(Args, Debug)]
struct DocArgs {
    /// CAN schema document
    #[arg(long, default_value = "can.json")]
    can: PathBuf,

    /// Modbus schema document
    #[arg(long, default_value = "modbus.json")]
    modbus: PathBuf,

    /// Mapping document
    #[arg(long, default_value = "mapping.json")]
    mapping: PathBuf,
}

impl DocArgs {
    fn paths(&self) -> BridgePaths {
        BridgePaths::new(&self.can, &self.modbus, &self.mapping)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load and resolve the three documents, reporting any problems
    Validate {
        #[command(flatten)]
        docs: DocArgs,
    },

    /// Print the resolved translation plan
    Show {
        #[command(flatten)]
        docs: DocArgs,

        /// Emit the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Decode a frame payload against the CAN schema
    Decode {
        #[command(flatten)]
        docs: DocArgs,

        /// CAN identifier (decimal, 0x hex or 0 octal)
        id: String,

        /// Payload as hex bytes, e.g. "780A" or "78 0A"
        payload: String,

        /// Emit the decoded frame as JSON
        #[arg(long)]
        json: bool,
    },

    /// Build a frame from a message name and field=value assignments
    Encode {
        #[command(flatten)]
        docs: DocArgs,

        /// Message name from the CAN schema
        message: String,

        /// Field assignments, e.g. speed=120 on=true
        #[arg(value_name = "FIELD=VALUE")]
        assignments: Vec<String>,
    },

    /// Run the bridge against real buses (features `can` + `modbus-rtu`)
    Run {
        #[command(flatten)]
        docs: DocArgs,

        /// SocketCAN interface name
        #[arg(long, default_value = "can0")]
        can_if: String,

        /// Serial device of the Modbus RTU line
        #[arg(long, default_value = "/dev/ttyUSB0")]
        serial: String,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = dispatch(cli.command) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn dispatch(command: Commands) -> Result<()> {
    match command {
        Commands::Validate { docs } => validate(&docs),
        Commands::Show { docs, json } => show(&docs, json),
        Commands::Decode {
            docs,
            id,
            payload,
            json,
        } => decode(&docs, &id, &payload, json),
        Commands::Encode {
            docs,
            message,
            assignments,
        } => encode(&docs, &message, &assignments),
        Commands::Run {
            docs,
            can_if,
            serial,
        } => run(&docs, &can_if, &serial),
    }
}

fn validate(docs: &DocArgs) -> Result<()> {
    let translator = load_translator(&docs.paths())?;
    println!(
        "ok: {} CAN messages, {} Modbus resources, {} rules",
        translator.can_schema().messages.len(),
        translator.modbus_schema().resources.len(),
        translator.rules().len()
    );
    Ok(())
}

fn show(docs: &DocArgs, json: bool) -> Result<()> {
    let translator = load_translator(&docs.paths())?;
    let can = translator.can_schema();
    let modbus = translator.modbus_schema();

    if json {
        let plan = serde_json::json!({
            "can": can,
            "modbus": modbus,
            "rules": translator.rules(),
        });
        let text = serde_json::to_string_pretty(&plan)
            .map_err(|e| BridgeError::Internal(e.to_string()))?;
        println!("{}", text);
        return Ok(());
    }

    println!("CAN bus at {} bit/s:", can.bitrate);
    for message in &can.messages {
        println!(
            "  0x{:03X} {} dlc={} dir={}",
            message.id,
            message.name,
            message.dlc,
            message.direction.as_str()
        );
        for field in &message.fields {
            println!(
                "    {} {} @{}+{} scale={}",
                field.name, field.field_type, field.offset, field.size, field.scale
            );
        }
    }

    println!(
        "Modbus line at {} baud, slave {}:",
        modbus.rtu.baud, modbus.rtu.slave_id
    );
    for resource in &modbus.resources {
        println!(
            "  {} {} addr={} count={} period_ms={}",
            resource.name,
            resource.function.as_str(),
            resource.address,
            resource.count,
            resource.period_ms
        );
        for field in &resource.fields {
            println!(
                "    {} {} reg[{}] scale={}",
                field.name, field.field_type, field.index, field.scale
            );
        }
    }

    println!("Rules:");
    for rule in translator.rules() {
        println!("  {} {}", rule.direction, rule.label());
        for pair in &rule.pairs {
            println!("    {} -> {}", pair.src_name, pair.dst_name);
        }
    }
    Ok(())
}

fn decode(docs: &DocArgs, id: &str, payload: &str, json: bool) -> Result<()> {
    let translator = load_translator(&docs.paths())?;
    let id = parse_uint_flexible(id)
        .ok_or_else(|| BridgeError::translation(format!("'{}' is not a CAN id", id)))?;
    let payload = parse_hex_payload(payload)?;

    match decode_frame(translator.can_schema(), id, &payload) {
        Some(decoded) if json => {
            let text = serde_json::to_string_pretty(&decoded)
                .map_err(|e| BridgeError::Internal(e.to_string()))?;
            println!("{}", text);
            Ok(())
        }
        Some(decoded) => {
            println!("{}", decoded);
            Ok(())
        }
        None => Err(BridgeError::translation(format!(
            "no message matches id 0x{:X}",
            id
        ))),
    }
}

fn encode(docs: &DocArgs, message: &str, assignments: &[String]) -> Result<()> {
    let translator = load_translator(&docs.paths())?;
    let assignments = parse_assignments(assignments)?;
    let frame = encode_frame(translator.can_schema(), message, &assignments)?;
    println!("{}", frame);
    Ok(())
}

/// Parse `FIELD=VALUE` command-line tokens.
fn parse_assignments(tokens: &[String]) -> Result<Vec<(String, String)>> {
    tokens
        .iter()
        .map(|token| {
            token
                .split_once('=')
                .filter(|(name, _)| !name.is_empty())
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .ok_or_else(|| {
                    BridgeError::translation(format!("'{}' is not a FIELD=VALUE pair", token))
                })
        })
        .collect()
}

/// Parse a hex payload string, with or without separators.
fn parse_hex_payload(s: &str) -> Result<Vec<u8>> {
    let digits: String = s.chars().filter(|c| !c.is_whitespace() && *c != ':').collect();
    if digits.len() % 2 != 0 || digits.len() > 16 {
        return Err(BridgeError::translation(format!(
            "'{}' is not a payload of up to 8 hex bytes",
            s
        )));
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16).map_err(|_| {
                BridgeError::translation(format!("'{}' contains non-hex digits", s))
            })
        })
        .collect()
}

#[cfg(all(feature = "can", feature = "modbus-rtu", target_os = "linux"))]
fn run(docs: &DocArgs, can_if: &str, serial: &str) -> Result<()> {
    use canmb::gateway::{Bridge, BridgeConfig};
    use canmb::transport::{RtuMasterLink, SocketCanLink};

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| BridgeError::Internal(format!("failed to start runtime: {}", e)))?;

    runtime.block_on(async {
        let translator = load_translator(&docs.paths())?;
        let rtu = translator.modbus_schema().rtu;

        let mut bridge = Bridge::new(
            translator,
            SocketCanLink::new(can_if),
            RtuMasterLink::new(serial, &rtu),
            &BridgeConfig::default(),
        );
        bridge.start().await?;
        tracing::info!("bridging {} <-> {} (Ctrl-C to stop)", can_if, serial);

        tokio::signal::ctrl_c()
            .await
            .map_err(|e| BridgeError::Internal(format!("signal wait failed: {}", e)))?;
        bridge.stop().await
    })
}

#[cfg(not(all(feature = "can", feature = "modbus-rtu", target_os = "linux")))]
fn run(_docs: &DocArgs, _can_if: &str, _serial: &str) -> Result<()> {
    Err(BridgeError::unsupported(
        "this build has no bus transports; rebuild with --features full on Linux",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_payload() {
        assert_eq!(parse_hex_payload("780A").unwrap(), vec![0x78, 0x0A]);
        assert_eq!(parse_hex_payload("78 0a").unwrap(), vec![0x78, 0x0A]);
        assert_eq!(parse_hex_payload("78:0A:FF").unwrap(), vec![0x78, 0x0A, 0xFF]);
        assert!(parse_hex_payload("7").is_err());
        assert!(parse_hex_payload("7G").is_err());
        // 9 bytes do not fit a frame
        assert!(parse_hex_payload("001122334455667788").is_err());
    }

    #[test]
    fn test_parse_assignments() {
        let parsed = parse_assignments(&["speed=120".into(), "on=true".into()]).unwrap();
        assert_eq!(parsed[0], ("speed".into(), "120".into()));
        assert_eq!(parsed[1], ("on".into(), "true".into()));
        assert!(parse_assignments(&["speed".into()]).is_err());
        assert!(parse_assignments(&["=120".into()]).is_err());
    }
}
