//! Council member peer process.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use council_paxos::{proposer, server, Member, MemberId, PeerTable, Profile, ProposeOutcome};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "council-member")]
#[command(about = "Run one council member peer (acceptor, learner, proposer)")]
struct Args {
    /// Member identifier, e.g. M1
    member_id: MemberId,

    /// Network behaviour profile; unknown names fall back to standard
    #[arg(long, default_value = "standard")]
    profile: String,

    /// Propose this candidate value after startup
    #[arg(long)]
    propose: Option<String>,

    /// Delay before proposing, in milliseconds
    #[arg(long, default_value_t = 300)]
    propose_delay: u64,

    /// Peer table path
    #[arg(long, default_value = council_paxos::DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let table = PeerTable::load(&args.config)?;
    let profile = Profile::from_name(&args.profile);
    let member = Arc::new(Member::new(args.member_id, table, profile)?);

    let endpoint = member.self_entry().endpoint();
    let listener = TcpListener::bind(endpoint).await?;
    info!(
        member = %member.id(),
        host = endpoint.0,
        port = endpoint.1,
        profile = member.profile().name(),
        "listening"
    );

    let server_member = Arc::clone(&member);
    tokio::spawn(async move {
        if let Err(e) = server::serve(server_member, listener).await {
            error!(error = %e, "listener terminated");
        }
    });

    if let Some(candidate) = args.propose {
        tokio::time::sleep(Duration::from_millis(args.propose_delay)).await;
        match proposer::propose(&member, &candidate).await {
            ProposeOutcome::Decided { n, value } => {
                info!(n = %n, value = %value, "proposal decided");
            }
            ProposeOutcome::PreparePhaseFailed { promises } => {
                warn!(promises, "proposal aborted in prepare phase");
            }
            ProposeOutcome::AcceptPhaseFailed { accepted } => {
                warn!(accepted, "proposal aborted in accept phase");
            }
        }
    }

    tokio::signal::ctrl_c().await?;
    info!(member = %member.id(), "shutting down");
    Ok(())
}
