use std::sync::Arc;

use anyhow::Result;
use clap::{error::ErrorKind, Parser};
use peerlink::{
    config::{self, Config},
    engine, log, relay,
    session::TransportSession,
    setup::{self, Mode, Options},
    turn,
};
use tokio::io::BufReader;
use tracing::info;
use webrtc::api::API;

const USAGE: &str = "Usage: turnpair <cloudflare_turn_api_token> <cloudflare_turn_account_id>";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// API token allowed to issue TURN credentials
    turn_api_token: String,
    /// TURN key id the credentials are issued for
    turn_account_id: String,
}

fn parse_args() -> Args {
    match Args::try_parse() {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.exit()
        }
        Err(_) => {
            println!("{USAGE}");
            std::process::exit(1)
        }
    }
}

async fn open(
    api: &API,
    turn: &libcalls::Client,
    account_id: &str,
    cfg: &Config,
    label: &str,
) -> Result<Arc<TransportSession>> {
    let rtc = turn::relay_configuration(turn, account_id, &cfg.turn).await?;
    Ok(TransportSession::new(api, rtc, label).await?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args();
    let cfg = config::load_env();
    log::set(log::filter(env!("CARGO_PKG_NAME"), &cfg.log.level));
    cfg.validate()?;

    let turn = libcalls::Client::with_timeout(
        cfg.api.base_url.clone(),
        args.turn_api_token,
        cfg.api.timeout(),
    )?;
    let api = engine::default_api()?;
    let peer1 = open(&api, &turn, &args.turn_account_id, &cfg, "peer1").await?;
    let peer2 = open(&api, &turn, &args.turn_account_id, &cfg, "peer2").await?;

    let link = setup::establish(&peer1, &peer2, Mode::Direct, &Options::from(&cfg)).await?;

    let report = relay::run(
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        &link.publisher,
        relay::stop_signal(),
    )
    .await;
    link.close().await;

    let report = report?;
    info!(
        "Relay stopped ({:?}): {} sent, {} dropped, {} failed",
        report.reason, report.sent, report.dropped, report.failed
    );
    Ok(())
}
