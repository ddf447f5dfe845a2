//! Interactive terminal client for the assistant server.
//!
//! One prompt, one streamed answer. Each user-visible failure class exits
//! with its own code so wrapping scripts can tell them apart.

mod config;
mod transfer;

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::Parser;
use crossterm::style::Stylize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

use assistant_protocol::Greeting;

use crate::config::{ClientConfig, ConfigError, default_path, load_or_create};
use crate::transfer::{ReceiveOutcome, read_greeting, receive_reply, send_prompt};

/// Exit codes, one per user-visible failure class.
mod exit {
    pub const CONNECT_FAILURE: i32 = 1;
    pub const TRANSFER_FAILURE: i32 = 2;
    pub const EMPTY_PROMPT: i32 = 3;
    pub const CONFIG_FAILURE: i32 = 4;
}

const CONNECT_TIMEOUT: Duration = Duration::from_secs(6);

#[derive(Parser, Debug)]
#[command(
    name = "assistant-client",
    about = "Interactive client for the assistant TCP server"
)]
struct Args {
    /// Path to the client config file (defaults to the per-user config dir).
    #[arg(long)]
    config: Option<PathBuf>,
}

fn load_config(args: &Args) -> ClientConfig {
    let path = match &args.config {
        Some(path) => path.clone(),
        None => match default_path() {
            Ok(path) => path,
            Err(e) => {
                eprintln!("{}", format!("Error: {e}").red());
                process::exit(exit::CONFIG_FAILURE);
            }
        },
    };

    match load_or_create(&path) {
        Ok(config) => config,
        Err(e @ ConfigError::Created(_)) => {
            println!("{}", format!("{e}").yellow());
            process::exit(exit::CONFIG_FAILURE);
        }
        Err(e) => {
            eprintln!("{}", format!("Error: {e}").red());
            process::exit(exit::CONFIG_FAILURE);
        }
    }
}

/// Read one prompt line; interrupt or EOF is a clean exit.
async fn read_prompt() -> String {
    print!("{}", "Prompt: ".blue());
    use std::io::Write as _;
    if std::io::stdout().flush().is_err() {
        process::exit(exit::TRANSFER_FAILURE);
    }

    let mut line = String::new();
    let mut stdin = BufReader::new(tokio::io::stdin());

    tokio::select! {
        read = stdin.read_line(&mut line) => {
            match read {
                Ok(0) | Err(_) => {
                    println!("\n{}", "Goodbye".green());
                    process::exit(0);
                }
                Ok(_) => {}
            }
        }
        _ = tokio::signal::ctrl_c() => {
            println!("\n{}", "Goodbye".green());
            process::exit(0);
        }
    }

    let prompt = line.trim().to_string();
    if prompt.is_empty() {
        eprintln!("{}", "No prompt given".red());
        process::exit(exit::EMPTY_PROMPT);
    }
    prompt
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config = load_config(&args);
    let addr = format!("{}:{}", config.client.host, config.client.port);

    let mut stream = match timeout(CONNECT_TIMEOUT, TcpStream::connect(&addr)).await {
        Ok(Ok(stream)) => stream,
        _ => {
            eprintln!("{}", format!("Cannot connect to server {addr}").red());
            process::exit(exit::CONNECT_FAILURE);
        }
    };

    match read_greeting(&mut stream).await {
        Ok(Some(Greeting::Granted)) => {}
        Ok(Some(Greeting::Busy)) => {
            eprintln!("{}", "Server busy, try again later".yellow());
            process::exit(exit::CONNECT_FAILURE);
        }
        Ok(None) | Err(_) => {
            eprintln!("{}", "Server closed the connection before granting access".red());
            process::exit(exit::TRANSFER_FAILURE);
        }
    }

    let prompt = read_prompt().await;

    if let Err(e) = send_prompt(&mut stream, &prompt).await {
        eprintln!("{}", format!("Error: {e}").red());
        process::exit(exit::TRANSFER_FAILURE);
    }

    println!("\n{}", "Response:".cyan());
    let outcome = receive_reply(&mut stream, |chunk| {
        use std::io::Write as _;
        print!("{}", chunk.green());
        let _ = std::io::stdout().flush();
    })
    .await;

    match outcome {
        Ok(ReceiveOutcome::Complete) => {
            println!();
            let _ = stream.shutdown().await;
        }
        Ok(ReceiveOutcome::Busy) => {
            eprintln!("\n{}", "Server busy, try again later".yellow());
            process::exit(exit::CONNECT_FAILURE);
        }
        Ok(ReceiveOutcome::TimedOut) => {
            eprintln!("\n{}", "TIMEOUT".red());
        }
        Err(e) => {
            eprintln!("\n{}", format!("Error: {e}").red());
            process::exit(exit::TRANSFER_FAILURE);
        }
    }
}
