use clap::Parser;
use sip_registrator::{
    create_registrator, create_sip_client, registrator_config, utils, UserAgentEvent,
};
use tracing::{error, info, warn};

/// SIP Registrator CLI Application
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// SIP registrar address (e.g., example.com:5060)
    #[arg(short, long, env = "SIP_SERVER")]
    server: String,

    /// SIP username (e.g., alice or alice@example.com)
    #[arg(short, long, env = "SIP_USER")]
    user: String,

    /// SIP password
    #[arg(short, long, env = "SIP_PASSWORD", default_value = "password")]
    password: String,

    /// Registration expiry in seconds
    #[arg(short, long, default_value_t = 600)]
    expires: u32,

    /// Local UDP port
    #[arg(long, default_value_t = 5060)]
    local_port: u16,

    /// Remove all bindings of the AOR on exit (Contact: *)
    #[arg(long)]
    unregister_all: bool,

    /// Refresh from the CLI loop when the registration is about to expire
    /// instead of letting the registrator renew on its own
    #[arg(long)]
    defer_refresh: bool,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    utils::initialize_logging(args.log_level.as_str());

    info!("Creating SIP client for {}: {}", args.server, args.user);
    let client = create_sip_client(&args.user, &args.password, args.local_port).await?;

    let contact_host = format!("{}:{}", client.local_ip(), client.local_port());
    let config =
        registrator_config(&args.server, &args.user, &contact_host)?.with_expires(args.expires);

    let (handle, mut events) = create_registrator(&client, config, args.defer_refresh)?;
    handle.register()?;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(UserAgentEvent::Registered { response }) => {
                    info!("SIP registration completed successfully");
                    info!("Registration response: {}", response.status_code);
                }
                Some(UserAgentEvent::RegistrationFailed { response, cause }) => {
                    error!("SIP registration failed: {} ({})", cause, response.status_code);
                    error!("Error code: {}", cause.error_code());
                }
                Some(UserAgentEvent::Unregistered { cause, .. }) => {
                    warn!("Registration lost: {:?}", cause);
                }
                Some(UserAgentEvent::RegistrationExpiring) => {
                    info!("Registration expiring, refreshing");
                    handle.register()?;
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down...");
                break;
            }
        }
    }

    if args.unregister_all && handle.is_registered() {
        handle.unregister(true)?;
    }
    handle.close().await;
    client.shutdown();

    Ok(())
}
