//! Click-to-call configuration checker
//!
//! Reads the `C2C_*` environment (and `.env`), validates it and prints the
//! ICE servers, target URI and outbound headers a client would use.
//!
//! Usage:
//!   click2call               check the environment configuration
//!   click2call --ice "<raw>" parse a raw ICE-server string

#[cfg(not(target_arch = "wasm32"))]
fn main() -> std::process::ExitCode {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("click2call=info"));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .init();

    dotenvy::dotenv().ok();

    match run(std::env::args().skip(1).collect()) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            std::process::ExitCode::FAILURE
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn run(args: Vec<String>) -> anyhow::Result<()> {
    use anyhow::Context;
    use click2call::{ice, ClientConfig, SipHeaders};

    if let Some(pos) = args.iter().position(|a| a == "--ice") {
        let raw = args.get(pos + 1).map(String::as_str).unwrap_or_default();
        let servers = ice::parse_ice_servers(raw);
        println!("{}", serde_json::to_string_pretty(&servers)?);
        return Ok(());
    }

    let config = ClientConfig::from_env()
        .context("C2C_WSS_URL, C2C_SIP_DOMAIN, C2C_BOT_ID and C2C_PHONE_NUMBER must be set")?;
    config.validate()?;
    tracing::info!("Configuration for {} is valid", config.connection_key());

    let headers = SipHeaders::for_call(&config, &[]);
    let report = serde_json::json!({
        "signalingEndpoint": config.signaling_endpoint,
        "target": config.bot_uri(),
        "account": config.account_uri(),
        "iceServers": config.ice_servers,
        "headers": headers.to_map(),
        "autoGreet": config.auto_greet,
        "greetUrl": config.greet_url,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[cfg(target_arch = "wasm32")]
fn main() {}
