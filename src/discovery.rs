//! LAN discovery advertisement over mDNS.
//!
//! Publishes a `_telebridge._tcp.local.` service record carrying the
//! instance id and both listener ports so clients on the local network
//! can find the gateway without prior configuration. The record carries
//! no secret; discovery alone grants nothing — clients still present
//! the access key to the transport gateway.

use mdns_sd::{ServiceDaemon, ServiceInfo};
use tokio::sync::Mutex;

use crate::error::GatewayError;

/// mDNS service type advertised on the LAN.
pub const SERVICE_TYPE: &str = "_telebridge._tcp.local.";

struct Advertisement {
    daemon: ServiceDaemon,
    fullname: String,
}

impl std::fmt::Debug for Advertisement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Advertisement")
            .field("fullname", &self.fullname)
            .finish_non_exhaustive()
    }
}

/// Advertises (and withdraws) the gateway's mDNS service record.
///
/// `start` while already started replaces the record; `stop` while not
/// started is a no-op.
#[derive(Debug)]
pub struct DiscoveryAdvertiser {
    instance_id: String,
    current: Mutex<Option<Advertisement>>,
}

impl DiscoveryAdvertiser {
    /// Creates an advertiser for the given stable instance id.
    #[must_use]
    pub fn new(instance_id: String) -> Self {
        Self {
            instance_id,
            current: Mutex::new(None),
        }
    }

    /// The stable instance identifier baked into the record.
    #[must_use]
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Publishes (or replaces) the service record for the given ports.
    ///
    /// # Errors
    ///
    /// [`GatewayError::StartupFailed`] when the mDNS daemon cannot be
    /// created or the record cannot be registered.
    pub async fn start(&self, api_port: u16, ws_port: u16) -> Result<(), GatewayError> {
        let mut current = self.current.lock().await;
        if let Some(previous) = current.take() {
            withdraw(&previous);
        }

        let daemon = ServiceDaemon::new()
            .map_err(|e| GatewayError::StartupFailed(format!("mdns daemon: {e}")))?;

        let ws_port_txt = ws_port.to_string();
        let properties = [
            ("instanceId", self.instance_id.as_str()),
            ("wsPort", ws_port_txt.as_str()),
        ];
        let info = ServiceInfo::new(
            SERVICE_TYPE,
            &self.instance_id,
            &format!("{}.local.", self.instance_id),
            "",
            api_port,
            &properties[..],
        )
        .map_err(|e| GatewayError::StartupFailed(format!("mdns record: {e}")))?
        .enable_addr_auto();

        let fullname = info.get_fullname().to_string();
        daemon
            .register(info)
            .map_err(|e| GatewayError::StartupFailed(format!("mdns register: {e}")))?;
        tracing::info!(%fullname, api_port, ws_port, "discovery record advertised");

        *current = Some(Advertisement { daemon, fullname });
        Ok(())
    }

    /// Withdraws the record. No-op when nothing is advertised.
    pub async fn stop(&self) {
        if let Some(previous) = self.current.lock().await.take() {
            withdraw(&previous);
            tracing::info!("discovery record withdrawn");
        }
    }

    /// Returns `true` while a record is advertised.
    pub async fn is_running(&self) -> bool {
        self.current.lock().await.is_some()
    }
}

fn withdraw(ad: &Advertisement) {
    if let Err(e) = ad.daemon.unregister(&ad.fullname) {
        tracing::warn!(fullname = %ad.fullname, "mdns unregister failed: {e}");
    }
    let _ = ad.daemon.shutdown();
}
