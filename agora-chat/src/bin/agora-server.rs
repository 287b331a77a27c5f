//! Chat room server.

use agora_chat::{ChatServer, ServerConfig, ServiceConfig, DEFAULT_MAILBOX_CAPACITY};
use clap::Parser;

#[derive(Parser)]
#[command(name = "agora-server", version, about = "Multi-client chat room server")]
struct Cli {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:8080", value_name = "ADDR")]
    bind: String,
    /// Undrained messages kept per client
    #[arg(long, default_value_t = DEFAULT_MAILBOX_CAPACITY)]
    mailbox_capacity: usize,
    /// Reject messages from authors that have not joined
    #[arg(long)]
    require_membership: bool,
    /// Leave on behalf of clients that disconnect without leaving
    #[arg(long)]
    idle_leave: bool,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = ServerConfig {
        bind_addr: cli.bind,
        service: ServiceConfig {
            mailbox_capacity: cli.mailbox_capacity,
            require_membership: cli.require_membership,
        },
        idle_leave: cli.idle_leave,
    };

    let server = ChatServer::new(config);
    if let Err(e) = server.run().await {
        log::error!("Listen error on {}: {e}", server.bind_addr());
        std::process::exit(1);
    }
}
