//! Standalone x402 facilitator HTTP server.
//!
//! # Usage
//!
//! ```bash
//! # Run with default config (config.toml in current directory)
//! cargo run -p x402-facilitator --release
//!
//! # Run with a custom config path
//! CONFIG=/path/to/config.toml cargo run -p x402-facilitator
//!
//! # Configure logging level
//! RUST_LOG=info cargo run -p x402-facilitator
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG` — path to the TOML configuration file (default: `config.toml`)
//! - `HOST` — overrides the bind address (default: `0.0.0.0`)
//! - `PORT` — overrides the port (default: `4021`)
//! - `RUST_LOG` — log level filter (default: `info`)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::http::Method;
use axum::{Json, Router};
use tower_http::cors;
use tracing_subscriber::EnvFilter;

use x402_core::chain::ChainId;
use x402_core::facilitator::Facilitator;
use x402_extensions::bazaar::{BazaarExtension, catalog_after_verify_hook};

use x402_facilitator::config::FacilitatorConfig;
use x402_facilitator::handlers::{FacilitatorState, facilitator_router};
use x402_facilitator::shutdown::SigDown;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))).init();

    if let Err(e) = run().await {
        tracing::error!("facilitator failed: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = FacilitatorConfig::load()?;
    tracing::info!(host = %config.host, port = config.port, chains = config.chains.len(), "loaded configuration");

    if config.chains.is_empty() {
        tracing::warn!("no chains configured — facilitator will report no supported schemes");
    }

    let mut facilitator = Facilitator::new();

    #[cfg(feature = "chain-eip155")]
    register_eip155_chains(&mut facilitator, &config).await;
    #[cfg(feature = "chain-solana")]
    register_solana_chains(&mut facilitator, &config);

    facilitator.register_extension(Box::new(BazaarExtension));
    let catalog = Arc::new(x402_extensions::bazaar::ResourceCatalog::new());
    facilitator.on_after_verify(catalog_after_verify_hook(Arc::clone(&catalog), now_secs));

    let state = FacilitatorState { facilitator: Arc::new(facilitator), catalog };

    let app = Router::new().merge(facilitator_router(state)).route("/health", axum::routing::get(health)).layer(
        cors::CorsLayer::new().allow_origin(cors::Any).allow_methods([Method::GET, Method::POST]).allow_headers(cors::Any),
    );

    let sig_down = SigDown::try_new()?;
    let token = sig_down.cancellation_token();

    let addr = SocketAddr::new(config.host, config.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("facilitator listening on http://{addr}");

    axum::serve(listener, app).with_graceful_shutdown(async move { token.cancelled().await }).await?;
    sig_down.recv().await;

    tracing::info!("facilitator shut down gracefully");
    Ok(())
}

fn now_secs() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or_default()
}

#[cfg(feature = "chain-eip155")]
async fn register_eip155_chains(facilitator: &mut Facilitator, config: &FacilitatorConfig) {
    use alloy_signer_local::PrivateKeySigner;
    use x402_core::chain::NetworkPattern;
    use x402_evm::chain::Eip155Provider;
    use x402_evm::exact::SCHEME;
    use x402_evm::exact::facilitator::Eip155ExactFacilitator;

    const RECEIPT_TIMEOUT_SECS: u64 = 30;

    for (network_id, chain_cfg) in &config.chains {
        let Ok(chain_id) = network_id.parse::<ChainId>() else { continue };
        if chain_id.namespace() != "eip155" {
            continue;
        }
        let Ok(numeric_chain_id) = chain_id.reference().parse::<u64>() else {
            tracing::warn!(network = %network_id, "skipping chain: reference is not numeric");
            continue;
        };

        let key_str = chain_cfg.signer_private_key.trim();
        if key_str.is_empty() || key_str.starts_with('$') {
            tracing::warn!(network = %network_id, "skipping chain: signer_private_key not resolved (missing env var?)");
            continue;
        }
        let Ok(signer) = key_str.parse::<PrivateKeySigner>() else {
            tracing::warn!(network = %network_id, "skipping chain: invalid signer_private_key");
            continue;
        };
        let Ok(rpc_url) = chain_cfg.rpc_url.parse::<url::Url>() else {
            tracing::warn!(network = %network_id, "skipping chain: invalid rpc_url");
            continue;
        };

        let signer_address = signer.address();
        match Eip155Provider::connect(numeric_chain_id, &rpc_url, signer, RECEIPT_TIMEOUT_SECS).await {
            Ok(provider) => {
                tracing::info!(network = %network_id, signer = %signer_address, "registered eip155 exact scheme");
                let mechanism = Eip155ExactFacilitator::new(vec![(numeric_chain_id, provider)]);
                facilitator.register(2, vec![NetworkPattern::exact(chain_id.namespace(), chain_id.reference())], SCHEME, Arc::new(mechanism));
            }
            Err(error) => {
                tracing::warn!(network = %network_id, %error, "skipping chain: failed to connect provider");
            }
        }
    }
}

#[cfg(feature = "chain-solana")]
fn register_solana_chains(facilitator: &mut Facilitator, config: &FacilitatorConfig) {
    use solana_keypair::Keypair;
    use x402_core::chain::NetworkPattern;
    use x402_svm::chain::SvmConnection;
    use x402_svm::exact::SCHEME;
    use x402_svm::exact::facilitator::SolanaExactFacilitator;

    for (network_id, chain_cfg) in &config.chains {
        let Ok(chain_id) = network_id.parse::<ChainId>() else { continue };
        if chain_id.namespace() != "solana" {
            continue;
        }

        let key_str = chain_cfg.signer_private_key.trim();
        if key_str.is_empty() || key_str.starts_with('$') {
            tracing::warn!(network = %network_id, "skipping chain: signer_private_key not resolved (missing env var?)");
            continue;
        }
        let Ok(rpc_url) = chain_cfg.rpc_url.parse::<url::Url>() else {
            tracing::warn!(network = %network_id, "skipping chain: invalid rpc_url");
            continue;
        };
        let keypair = match bs58::decode(key_str).into_vec().ok().and_then(|bytes| Keypair::from_bytes(&bytes).ok()) {
            Some(keypair) => keypair,
            None => {
                tracing::warn!(network = %network_id, "skipping chain: invalid signer_private_key");
                continue;
            }
        };

        let connection = SvmConnection::connect(chain_id.reference(), &rpc_url);
        tracing::info!(network = %network_id, "registered solana exact scheme");
        let mechanism = SolanaExactFacilitator::new(vec![(connection, keypair)]);
        facilitator.register(2, vec![NetworkPattern::exact(chain_id.namespace(), chain_id.reference())], SCHEME, Arc::new(mechanism));
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}
