//! gatelink CLI — probe a gateway from the terminal.
//!
//! Usage:
//! ```bash
//! # Connect and print the server snapshot
//! gatelink check
//!
//! # Send a raw RPC
//! gatelink call --method health
//! gatelink call --method chat.history --params '{"sessionKey":"s-1"}'
//!
//! # Stream a session's events to stdout
//! gatelink watch --session s-1
//! ```
//!
//! Configuration comes from the environment: `GATEWAY_URL`, `GATEWAY_TOKEN`
//! or `GATEWAY_PASSWORD`, `GATEWAY_SCOPES`.

use std::env;
use std::process;
use std::time::Duration;

use gatelink_client::{GatewayClient, SessionEvent};
use gatelink_core::config::GatewayConfig;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let result = match args[1].as_str() {
        "check" => cmd_check().await,
        "call" => cmd_call(&args[2..]).await,
        "watch" => cmd_watch(&args[2..]).await,
        "version" | "--version" | "-V" => {
            println!("gatelink {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_usage();
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn print_usage() {
    println!("gatelink {}", env!("CARGO_PKG_VERSION"));
    println!("Probe a gateway over its WebSocket protocol\n");
    println!("USAGE:");
    println!("    gatelink <COMMAND>\n");
    println!("COMMANDS:");
    println!("    check      Connect, handshake and print the server snapshot");
    println!("    call       Send a raw RPC and print the payload");
    println!("    watch      Stream one session's events to stdout");
    println!("    version    Print version");
    println!("    help       Print this help\n");
    println!("CALL FLAGS:");
    println!("    --method <NAME>     RPC method  [required]");
    println!("    --params <JSON>     Params object  [default: omitted]");
    println!("    --timeout-ms <N>    Per-call deadline  [default: 30000]\n");
    println!("WATCH FLAGS:");
    println!("    --session <KEY>     Session key to subscribe to  [required]\n");
    println!("ENVIRONMENT:");
    println!("    GATEWAY_URL         ws endpoint  [default: ws://127.0.0.1:18789]");
    println!("    GATEWAY_TOKEN       token credential");
    println!("    GATEWAY_PASSWORD    password credential");
    println!("    GATEWAY_SCOPES      comma-separated  [default: operator.admin]");
}

async fn cmd_check() -> Result<(), String> {
    let client = GatewayClient::new(GatewayConfig::from_env());

    let start = std::time::Instant::now();
    let hello = client.server_info().await.map_err(|e| e.to_string())?;
    let latency = start.elapsed();

    println!("  Status:     OK");
    println!("  Protocol:   v{}", hello.protocol);
    println!("  Server:     {} ({})", hello.server.version, hello.server.host);
    println!("  Conn id:    {}", hello.server.conn_id);
    println!("  Latency:    {}ms", latency.as_millis());
    println!("  State:      {}", client.state());
    Ok(())
}

async fn cmd_call(args: &[String]) -> Result<(), String> {
    let method = parse_flag(args, "--method").ok_or("--method is required")?;
    let params = match parse_flag(args, "--params") {
        Some(raw) => Some(serde_json::from_str(&raw).map_err(|e| format!("bad --params: {e}"))?),
        None => None,
    };
    let timeout = parse_flag(args, "--timeout-ms")
        .map(|raw| raw.parse::<u64>().map_err(|e| format!("bad --timeout-ms: {e}")))
        .transpose()?
        .map(Duration::from_millis);

    let client = GatewayClient::new(GatewayConfig::from_env());
    let payload = client
        .call_value(&method, params, timeout)
        .await
        .map_err(|e| e.to_string())?;

    println!("{}", serde_json::to_string_pretty(&payload).unwrap_or_default());
    Ok(())
}

async fn cmd_watch(args: &[String]) -> Result<(), String> {
    let session = parse_flag(args, "--session").ok_or("--session is required")?;

    let client = GatewayClient::new(GatewayConfig::from_env());
    let mut handle = client.acquire(&session).await.map_err(|e| e.to_string())?;
    eprintln!("watching session {session} (ctrl-c to stop)");

    let result = loop {
        tokio::select! {
            event = handle.next_event() => {
                match event {
                    Some(SessionEvent::Event(frame)) => {
                        let line = serde_json::to_string(&frame).unwrap_or_default();
                        println!("{line}");
                    }
                    Some(SessionEvent::Closed { reason }) => {
                        break Err(format!("connection closed: {reason}"));
                    }
                    None => break Ok(()),
                }
            }
            _ = tokio::signal::ctrl_c() => break Ok(()),
        }
    };
    handle.release();
    result
}

fn parse_flag(args: &[String], flag: &str) -> Option<String> {
    let pos = args.iter().position(|a| a == flag)?;
    args.get(pos + 1).cloned()
}
