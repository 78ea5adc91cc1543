use std::net::SocketAddr;
use std::sync::OnceLock;

use prometheus::{register_int_counter, IntCounter};

pub struct SolanaApiMetrics {
    pub send_transaction: IntCounter,
    pub get_signature_statuses: IntCounter,
    pub get_transaction: IntCounter,
    pub get_balance: IntCounter,
    pub get_account: IntCounter,
    pub get_recent_blockhash: IntCounter,
}

impl SolanaApiMetrics {
    pub fn expose(&self, addr: SocketAddr) -> Result<(), prometheus_exporter::Error> {
        prometheus_exporter::start(addr)?;
        tracing::info!("Prometheus metrics exposed at http://{}", addr);
        Ok(())
    }
}

pub fn metrics() -> &'static SolanaApiMetrics {
    static METRICS: OnceLock<SolanaApiMetrics> = OnceLock::new();

    METRICS.get_or_init(|| SolanaApiMetrics {
        send_transaction: register_int_counter!("send_transaction", "send_transaction").unwrap(),
        get_signature_statuses: register_int_counter!(
            "get_signature_statuses",
            "get_signature_statuses"
        )
        .unwrap(),
        get_transaction: register_int_counter!("get_transaction", "get_transaction").unwrap(),
        get_balance: register_int_counter!("get_balance", "get_balance").unwrap(),
        get_account: register_int_counter!("get_account", "get_account").unwrap(),
        get_recent_blockhash: register_int_counter!(
            "get_recent_blockhash",
            "get_recent_blockhash"
        )
        .unwrap(),
    })
}
