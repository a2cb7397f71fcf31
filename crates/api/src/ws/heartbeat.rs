use std::sync::Arc;
use std::time::Duration;

use crate::ws::manager::WsManager;

/// Seconds between keepalive pings on the realtime feed.
const HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// Spawn the keepalive task for the realtime feed.
///
/// Pings every open socket on a fixed interval so idle monitoring sessions
/// are not dropped by intermediaries. The task never exits on its own;
/// shutdown aborts it through the returned handle.
pub fn start_heartbeat(ws_manager: Arc<WsManager>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
        // The first tick fires immediately; a fresh socket needs no ping yet.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let open = ws_manager.connection_count().await;
            if open == 0 {
                continue;
            }
            tracing::trace!(open, "pinging realtime feed connections");
            ws_manager.ping_all().await;
        }
    })
}
