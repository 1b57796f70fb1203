//! Mint participant tokens for a pitboss deployment.
//!
//! ```text
//! pitboss-token <config.toml> <participant-uuid> [ttl-secs]
//! pitboss-token --gen-secret
//! ```

use anyhow::{Context, bail};
use chrono::{Duration, Utc};
use pitboss::config::Config;
use pitboss::security::HmacTokenVerifier;
use rand::Rng;
use rand::distributions::Alphanumeric;
use uuid::Uuid;

const DEFAULT_TTL_SECS: i64 = 24 * 60 * 60;

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.first().map(String::as_str) == Some("--gen-secret") {
        let secret: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(48)
            .map(char::from)
            .collect();
        println!("{secret}");
        return Ok(());
    }

    let (config_path, participant) = match args.as_slice() {
        [config, participant, ..] => (config, participant),
        _ => bail!("usage: pitboss-token <config.toml> <participant-uuid> [ttl-secs]"),
    };

    let config = Config::load(config_path)
        .with_context(|| format!("failed to load config from {config_path}"))?;
    let participant = Uuid::parse_str(participant)
        .with_context(|| format!("not a participant id: {participant}"))?;
    let ttl = match args.get(2) {
        Some(raw) => raw
            .parse::<i64>()
            .with_context(|| format!("not a number of seconds: {raw}"))?,
        None => DEFAULT_TTL_SECS,
    };
    if ttl <= 0 {
        bail!("ttl must be positive");
    }

    let verifier = HmacTokenVerifier::new(&config.auth.token_secret);
    println!("{}", verifier.issue(participant, Utc::now() + Duration::seconds(ttl)));
    Ok(())
}
