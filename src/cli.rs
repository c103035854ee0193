use anyhow::Result;
use clap::{Parser, Subcommand};
use futures_util::{SinkExt, StreamExt};
use tokio::time::{timeout, Duration};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error};

use crate::protocol::{ClientMessage, ServerMessage};

#[derive(Parser, Debug)]
#[command(name = "wa-session-gen")]
#[command(about = "WhatsApp session generator server and debug client")]
pub struct Cli {
    /// With no subcommand the binary runs the server.
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Join a session room over WebSocket and print relay events
    Debug {
        /// Session server URL
        #[arg(short, long, default_value = "ws://localhost:3000")]
        url: String,

        /// Session ID to join
        #[arg(short, long)]
        session: String,

        /// Give up after this many seconds without a terminal event
        #[arg(short, long, default_value_t = 120)]
        timeout_secs: u64,
    },
}

/// Connect to a running server, join the given session room, and print every
/// relay event until `connected`/`error` arrives or the timeout elapses.
pub async fn run_debug_client(url: String, session: String, timeout_secs: u64) -> Result<()> {
    let ws_url = format!("{}/ws/{}", url.trim_end_matches('/'), session);
    debug!("connecting to {ws_url}");

    let (ws_stream, _) = match timeout(Duration::from_secs(5), connect_async(&ws_url)).await {
        Ok(Ok(conn)) => conn,
        Ok(Err(e)) => {
            error!("failed to connect: {e}");
            return Err(e.into());
        }
        Err(_) => {
            return Err(anyhow::anyhow!(
                "connection timeout - is the session server running?"
            ));
        }
    };
    let (mut write, mut read) = ws_stream.split();

    let join = ClientMessage::Join {
        session_id: session.clone(),
    };
    write
        .send(Message::Text(serde_json::to_string(&join)?.into()))
        .await?;

    let deadline = Duration::from_secs(timeout_secs);
    let outcome = timeout(deadline, async {
        while let Some(msg) = read.next().await {
            let msg = msg?;
            let Message::Text(text) = msg else { continue };
            let server_msg: ServerMessage = serde_json::from_str(&text)?;
            match server_msg {
                ServerMessage::Qr { image } => {
                    println!("qr: {} bytes (open /session/{} to scan)", image.len(), session);
                }
                ServerMessage::Status { message } => {
                    println!("status: {message}");
                }
                ServerMessage::Connected { payload } => {
                    println!("connected: user={:?}", payload.user_info);
                    println!("{}", payload.base64_string);
                    return Ok::<_, anyhow::Error>(());
                }
                ServerMessage::Error { message } => {
                    return Err(anyhow::anyhow!("relay error: {message}"));
                }
            }
        }
        Err(anyhow::anyhow!("connection closed before pairing finished"))
    })
    .await;

    match outcome {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!(
            "timed out after {timeout_secs}s waiting for pairing to finish"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_invocation_runs_the_server() {
        let cli = Cli::try_parse_from(["wa-session-gen"]).unwrap();
        assert!(cli.command.is_none());
        // No stray flags survive beside the subcommands.
        assert!(Cli::try_parse_from(["wa-session-gen", "--server"]).is_err());
    }

    #[test]
    fn debug_subcommand_parses_session_and_defaults() {
        let cli = Cli::try_parse_from(["wa-session-gen", "debug", "--session", "sess_1"]).unwrap();
        let Some(Commands::Debug {
            url,
            session,
            timeout_secs,
        }) = cli.command
        else {
            panic!("expected debug subcommand");
        };
        assert_eq!(url, "ws://localhost:3000");
        assert_eq!(session, "sess_1");
        assert_eq!(timeout_secs, 120);
    }
}
