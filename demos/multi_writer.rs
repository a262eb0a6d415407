use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use clap::Parser;
use hearth::{mock::MockNetwork, RoomConfig, RoomResult};
use serde_json::json;
use tokio::time::sleep;
use tracing::info;

/// Open a room, invite a few peers into it and have every peer announce
/// itself as a user. All peers share one in-process network.
#[derive(Debug, Parser)]
#[command(name = "multi_writer")]
struct Args {
    /// Storage location of the hosting peer.
    #[arg(short, long, default_value = "./storage")]
    storage: PathBuf,
    /// Number of peers to invite.
    #[arg(short, long, default_value_t = 2)]
    peers: usize,
    /// Namespace of every tag and collection.
    #[arg(long, default_value = "multiWriter")]
    namespace: String,
}

fn announce(storage: &Path) -> serde_json::Value {
    json!({
        "hostname": std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_owned()),
        "cwd": std::env::current_dir().map(|dir| dir.display().to_string()).unwrap_or_default(),
        "storage": storage.display().to_string(),
        "joined": chrono::Utc::now().to_rfc3339(),
    })
}

#[tokio::main]
async fn main() -> RoomResult<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let network = MockNetwork::new();
    let host = network.room(RoomConfig::new(&args.storage).with_namespace(&args.namespace));
    host.ready().await?;
    info!(
        "Room {} open in {}",
        host.key().await?,
        host.config().storage.display()
    );

    let invite = host.create_invite().await?;
    println!("invite: {}", invite);
    host.add_user("host", &announce(&args.storage)).await?;

    let mut peers = Vec::with_capacity(args.peers);
    for i in 0..args.peers {
        let storage = args.storage.join(format!("peer-{}", i));
        let peer = network.room(
            RoomConfig::new(&storage)
                .with_namespace(&args.namespace)
                .with_invite(invite.clone()),
        );
        peer.ready().await?;
        peer.add_user(format!("peer-{}", i), &announce(&storage)).await?;
        info!("Peer {} joined as {}", i, peer.local_key().await?);
        peers.push(peer);
    }

    while host.get_users().await?.len() < args.peers + 1 {
        sleep(Duration::from_millis(50)).await;
    }
    for user in host.get_users().await? {
        println!("{}: {}", user.id, user.info);
    }

    for peer in peers {
        peer.close().await?;
    }
    host.close().await
}
