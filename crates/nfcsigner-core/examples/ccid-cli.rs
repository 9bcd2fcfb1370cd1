//! NFC Signer CCID CLI Example
//!
//! Drives the signing applet through a USB CCID reader claimed directly over
//! libusb, without a PC/SC service in between.
//!
//! # Prerequisites
//!
//! - A USB CCID reader (or a token exposing a CCID interface)
//! - A card carrying the signing applet
//! - Permission to claim the device (udev rule on Linux, or root)
//!
//! # Quick Start
//!
//! ```bash
//! cargo run --example ccid-cli -p nfcsigner-core --features usb -- list
//! cargo run --example ccid-cli -p nfcsigner-core --features usb -- info
//! cargo run --example ccid-cli -p nfcsigner-core --features usb -- sign $(sha256sum contract.pdf | cut -c1-64) 1
//! ```
//!
//! Set `RUST_LOG=nfcsigner_core=debug` to trace every APDU and CCID frame.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `list` | List attached CCID readers |
//! | `info` | Power the card on and print its ATR |
//! | `sign <sha256-hex> [key-index]` | Sign a SHA-256 digest wrapped in `DigestInfo` |
//! | `pubkey <role>` | Read a public key (`sig`, `dec`, `aut`, `sm`) |
//! | `cert <role>` | Read a certificate |
//!
//! The applet is selected by `NFCSIGNER_AID` (hex), defaulting to
//! `A0000000011000`.

#![expect(unused_crate_dependencies, reason = "needed for CLI example")]

use std::env;
use std::io::{self, Write};

use nfcsigner_core::card::command::parse_aid;
use nfcsigner_core::ccid::RusbPipe;
use nfcsigner_core::digest::{HashAlgorithm, digest_info};
use nfcsigner_core::transport::UsbReader;
use nfcsigner_core::{DebugLog, SessionConfig, Transport};
use tracing_subscriber::EnvFilter;

const DEFAULT_AID: &str = "A0000000011000";

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_help();
        return;
    }

    match args[1].as_str() {
        "list" => cmd_list(),
        "info" => cmd_info(),
        "sign" => cmd_sign(&args[2..]),
        "pubkey" => cmd_pubkey(&args[2..]),
        "cert" => cmd_cert(&args[2..]),
        "--help" | "-h" | "help" => print_help(),
        _ => {
            eprintln!("Unknown command: {}", args[1]);
            print_help();
        }
    }
}

fn print_help() {
    println!(
        r"NFC Signer CCID CLI

USAGE:
    ccid-cli <COMMAND>

COMMANDS:
    list                     List attached CCID readers
    info                     Power the card on and print its ATR
    sign <hex> [key-index]   Sign a SHA-256 digest as DigestInfo (requires PIN)
    pubkey <role>            Read the public key for sig, dec, aut or sm
    cert <role>              Read the certificate for sig, dec, aut or sm
    help                     Show this help message

ENVIRONMENT:
    NFCSIGNER_AID            Applet id in hex (default A0000000011000)
    RUST_LOG                 Log filter, e.g. nfcsigner_core=debug
"
    );
}

fn session_config() -> SessionConfig {
    SessionConfig {
        debug_logging: env::var_os("RUST_LOG").is_some(),
        ..SessionConfig::default()
    }
}

fn open_reader() -> Option<UsbReader<RusbPipe>> {
    let config = session_config();
    match RusbPipe::open_first(DebugLog::new("usb", config.debug_logging)) {
        Ok(pipe) => Some(UsbReader::new(pipe, config)),
        Err(e) => {
            eprintln!("Failed to open reader: {e}");
            None
        }
    }
}

fn applet_id() -> Option<Vec<u8>> {
    let aid = env::var("NFCSIGNER_AID").unwrap_or_else(|_| DEFAULT_AID.to_string());
    match parse_aid(&aid) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            eprintln!("{e}");
            None
        }
    }
}

fn cmd_list() {
    println!("Searching for CCID readers...\n");

    match RusbPipe::list_readers() {
        Ok(readers) => {
            if readers.is_empty() {
                println!("No CCID readers found.");
                println!("\nMake sure:");
                println!("  - The reader is plugged in");
                println!("  - You may claim it (udev rule or root)");
            } else {
                println!("Found {} reader(s):\n", readers.len());
                for (i, reader) in readers.iter().enumerate() {
                    println!("  [{}] {}", i + 1, reader);
                }
            }
        }
        Err(e) => {
            eprintln!("Error listing readers: {e}");
        }
    }
}

fn cmd_info() {
    let Some(mut reader) = open_reader() else {
        return;
    };

    if let Some(descriptor) = reader.pipe().descriptor() {
        println!("Exchange level: {}", descriptor.exchange_level());
        println!("Max message length: {}", descriptor.max_message_length);
    }

    let mut transport = reader.session();
    match transport.connect() {
        Ok(()) => {
            println!("ATR: {}", hex::encode(transport.atr()));
        }
        Err(e) => {
            eprintln!("Power-on failed: {e}");
        }
    }
}

fn cmd_sign(args: &[String]) {
    if args.is_empty() {
        eprintln!("Usage: sign <sha256-hex> [key-index]");
        eprintln!(
            "Example: sign ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad 1"
        );
        return;
    }

    let hash_hex = args[0].strip_prefix("0x").unwrap_or(&args[0]);
    let hash = match hex::decode(hash_hex) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Invalid hex: {e}");
            return;
        }
    };

    let key_index = match args.get(1).map(|s| s.parse::<i64>()) {
        None => 0,
        Some(Ok(index)) => index,
        Some(Err(e)) => {
            eprintln!("Invalid key index: {e}");
            return;
        }
    };

    let digest_info = match digest_info(HashAlgorithm::Sha256, &hash) {
        Ok(info) => info,
        Err(e) => {
            eprintln!("{e}");
            return;
        }
    };

    let Some(aid) = applet_id() else {
        return;
    };
    println!("DigestInfo: {}\n", hex::encode(&digest_info));

    let pin = prompt_pin();

    let Some(mut reader) = open_reader() else {
        return;
    };

    let result = reader.with_session(|card| {
        if !card.select_applet(&aid)? {
            eprintln!("Failed to select applet");
            return Ok(None);
        }
        let outcome = card.verify_pin(&pin)?;
        if !outcome.verified {
            eprintln!("PIN rejected, {} tries left", outcome.tries_left);
            return Ok(None);
        }
        card.generate_signature(&digest_info, key_index).map(Some)
    });

    match result {
        Ok(Some(signature)) => {
            println!("Signature ({} bytes):", signature.len());
            println!("  {}", hex::encode(&signature));
        }
        Ok(None) => {}
        Err(e) => {
            eprintln!("Signing failed: {e}");
        }
    }
}

fn cmd_pubkey(args: &[String]) {
    let role = args.first().map_or("sig", String::as_str);
    let Some(aid) = applet_id() else {
        return;
    };
    let Some(mut reader) = open_reader() else {
        return;
    };

    let result = reader.with_session(|card| {
        card.select_applet(&aid)?;
        card.get_rsa_public_key(role)
    });

    match result {
        Ok(key) => {
            println!("Public key ({role}, {} bytes):", key.len());
            println!("  {}", hex::encode(&key));
        }
        Err(e) => {
            eprintln!("Failed to read public key: {e}");
        }
    }
}

fn cmd_cert(args: &[String]) {
    let role = args.first().map_or("sig", String::as_str);
    let Some(aid) = applet_id() else {
        return;
    };
    let Some(mut reader) = open_reader() else {
        return;
    };

    let result = reader.with_session(|card| {
        card.select_applet(&aid)?;
        card.get_certificate(role)
    });

    match result {
        Ok(cert) => {
            println!("Certificate ({role}, {} bytes):", cert.len());
            println!("  {}", hex::encode(&cert));
        }
        Err(e) => {
            eprintln!("Failed to read certificate: {e}");
        }
    }
}

fn prompt_pin() -> String {
    print!("Enter PIN: ");
    io::stdout().flush().unwrap();

    let mut pin = String::new();
    io::stdin().read_line(&mut pin).unwrap();
    pin.trim().to_string()
}
