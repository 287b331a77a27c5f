//! Interactive chat client: prints the history, then polls for new
//! messages while sending each stdin line. `quit` leaves the room.

use std::sync::Arc;

use agora_chat::{ChatClient, DEFAULT_POLL_INTERVAL};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "agora-client", version, about = "Chat room client")]
struct Cli {
    /// User id to join as
    user: String,
    /// Server WebSocket URL
    #[arg(long, default_value = "ws://127.0.0.1:8080", value_name = "URL")]
    server: String,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let client = Arc::new(ChatClient::connect(&cli.server, cli.user.as_str()).await?);
    let history = client.join().await?;

    println!("Connected as [{}]", client.user_id());
    println!("--- Chat History ---");
    for msg in &history {
        println!("{}", msg.render());
    }
    println!("--- End History ---");
    println!("Type messages and press Enter. Type 'quit' to exit.");

    let (mut incoming, poller) = client.spawn_poller(DEFAULT_POLL_INTERVAL);
    let printer = tokio::spawn(async move {
        while let Some(msg) = incoming.recv().await {
            println!("{}", msg.render());
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let text = line.trim();
        if text == "quit" {
            break;
        }
        if text.is_empty() {
            continue;
        }
        if let Err(e) = client.send_message(text).await {
            eprintln!("Send error: {e}");
        }
    }

    poller.abort();
    printer.abort();
    client.leave().await?;
    println!("Goodbye!");
    Ok(())
}
