//! Receiver discovery over mDNS/DNS-SD
//!
//! Cast receivers advertise `_googlecast._tcp.local.` with TXT records:
//! - `fn`: friendly name
//! - `md`: model name
//! - `id`: unique device identifier
//! - `ca`: capability bitmask

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};

use super::slug::slugify;
use super::{CastType, DeviceDescriptor};
use crate::{Error, Result};

/// mDNS service type advertised by Cast receivers
pub const SERVICE_TYPE: &str = "_googlecast._tcp.local.";

/// Capability bit for video output
const CAPABILITY_VIDEO_OUT: u32 = 1 << 0;

/// Capability bit for a multizone speaker group
const CAPABILITY_MULTIZONE_GROUP: u32 = 1 << 5;

/// Service record as resolved from mDNS, before interpretation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CastService {
    pub fullname: String,
    pub addresses: Vec<IpAddr>,
    pub port: u16,
    pub txt: HashMap<String, String>,
}

impl CastService {
    fn from_info(info: &ServiceInfo) -> Self {
        let txt = info
            .get_properties()
            .iter()
            .map(|prop| (prop.key().to_string(), prop.val_str().to_string()))
            .collect();

        let mut addresses: Vec<IpAddr> = info.get_addresses().iter().copied().collect();
        addresses.sort();

        Self {
            fullname: info.get_fullname().to_string(),
            addresses,
            port: info.get_port(),
            txt,
        }
    }

    /// Advertised name, falling back to the service instance name
    #[must_use]
    pub fn friendly_name(&self) -> String {
        self.txt.get("fn").cloned().unwrap_or_else(|| {
            self.fullname
                .strip_suffix(SERVICE_TYPE)
                .unwrap_or(&self.fullname)
                .trim_end_matches('.')
                .to_string()
        })
    }

    /// Interpret the record as a device descriptor
    ///
    /// Returns `None` when the record carries no usable address.
    #[must_use]
    pub fn describe(&self) -> Option<DeviceDescriptor> {
        let address = self
            .addresses
            .iter()
            .find(|a| a.is_ipv4())
            .or_else(|| self.addresses.first())
            .copied()?;

        let friendly_name = self.friendly_name();
        let model_name = self
            .txt
            .get("md")
            .cloned()
            .unwrap_or_else(|| "Unknown model".to_string());

        let uuid = self.txt.get("id").map_or_else(
            || self.fullname.clone(),
            |id| {
                uuid::Uuid::try_parse(id)
                    .map_or_else(|_| id.clone(), |u| u.hyphenated().to_string())
            },
        );

        let capabilities = self
            .txt
            .get("ca")
            .and_then(|ca| ca.parse::<u32>().ok())
            .unwrap_or(0);

        Some(DeviceDescriptor {
            key: slugify(&friendly_name),
            friendly_name,
            address,
            port: self.port,
            manufacturer: manufacturer_for(&model_name).to_string(),
            model_name,
            cast_type: cast_type_for(capabilities),
            service_name: self.fullname.clone(),
            uuid,
        })
    }
}

const fn cast_type_for(capabilities: u32) -> CastType {
    if capabilities & CAPABILITY_MULTIZONE_GROUP != 0 {
        CastType::Group
    } else if capabilities & CAPABILITY_VIDEO_OUT != 0 {
        CastType::Cast
    } else {
        CastType::Audio
    }
}

fn manufacturer_for(model: &str) -> &'static str {
    const GOOGLE_PREFIXES: [&str; 3] = ["Chromecast", "Google", "Nest"];
    if GOOGLE_PREFIXES.iter().any(|p| model.starts_with(p)) {
        "Google Inc."
    } else {
        "Unknown manufacturer"
    }
}

/// Source of advertised Cast services
#[async_trait]
pub trait ServiceBrowser: Send + Sync {
    /// Listen for up to `window`, returning every service seen
    ///
    /// When `name` is given, listening ends as soon as a service with that
    /// friendly name resolves.
    async fn browse(&self, window: Duration, name: Option<&str>) -> Result<Vec<CastService>>;
}

/// Browses the local network with a short-lived mDNS daemon
#[derive(Debug, Default, Clone, Copy)]
pub struct MdnsBrowser;

#[async_trait]
impl ServiceBrowser for MdnsBrowser {
    async fn browse(&self, window: Duration, name: Option<&str>) -> Result<Vec<CastService>> {
        let name = name.map(ToString::to_string);
        tokio::task::spawn_blocking(move || browse_blocking(window, name.as_deref()))
            .await
            .map_err(|e| Error::Discovery(format!("discovery task failed: {e}")))?
    }
}

fn browse_blocking(window: Duration, name: Option<&str>) -> Result<Vec<CastService>> {
    let daemon = ServiceDaemon::new()
        .map_err(|e| Error::Discovery(format!("failed to create mDNS daemon: {e}")))?;

    let receiver = daemon
        .browse(SERVICE_TYPE)
        .map_err(|e| Error::Discovery(format!("failed to browse for Cast services: {e}")))?;

    let deadline = Instant::now() + window;
    let mut found: HashMap<String, CastService> = HashMap::new();

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }

        match receiver.recv_timeout(remaining) {
            Ok(ServiceEvent::ServiceResolved(info)) => {
                let service = CastService::from_info(&info);
                tracing::debug!(service = %service.fullname, port = service.port, "resolved Cast service");
                let matched = name.is_some_and(|n| service.friendly_name() == n);
                found.insert(service.fullname.clone(), service);
                if matched {
                    break;
                }
            }
            Ok(ServiceEvent::ServiceRemoved(_, fullname)) => {
                found.remove(&fullname);
            }
            Ok(_) => {}
            // Window elapsed or the daemon went away
            Err(_) => break,
        }
    }

    // A browse left running keeps the daemon thread listening
    if let Err(e) = daemon.stop_browse(SERVICE_TYPE) {
        tracing::warn!(error = %e, "failed to stop mDNS browse");
    }
    if let Err(e) = daemon.shutdown() {
        tracing::trace!(error = %e, "mDNS daemon shutdown error");
    }

    Ok(found.into_values().collect())
}

/// Turns browsed services into device descriptors
#[derive(Clone)]
pub struct DiscoveryEngine {
    browser: Arc<dyn ServiceBrowser>,
    window: Duration,
}

impl DiscoveryEngine {
    #[must_use]
    pub fn new(browser: Arc<dyn ServiceBrowser>, window: Duration) -> Self {
        Self { browser, window }
    }

    /// Engine backed by the real mDNS browser
    #[must_use]
    pub fn mdns(window: Duration) -> Self {
        Self::new(Arc::new(MdnsBrowser), window)
    }

    /// Discover every receiver advertising during the window
    ///
    /// An empty network yields an empty vector.
    ///
    /// # Errors
    ///
    /// Returns `Discovery` if the network cannot be browsed at all
    pub async fn discover(&self) -> Result<Vec<DeviceDescriptor>> {
        tracing::info!("discovering Cast services on the network");
        let services = self.browser.browse(self.window, None).await?;

        let mut devices: Vec<DeviceDescriptor> =
            services.iter().filter_map(CastService::describe).collect();
        devices.sort_by(|a, b| a.key.cmp(&b.key));

        tracing::info!(count = devices.len(), "found Cast services");
        Ok(devices)
    }

    /// Look for one receiver by its advertised name
    ///
    /// # Errors
    ///
    /// Returns `Discovery` if the network cannot be browsed at all
    pub async fn find(&self, raw_name: &str) -> Result<Option<DeviceDescriptor>> {
        let services = self.browser.browse(self.window, Some(raw_name)).await?;
        Ok(services
            .iter()
            .filter(|s| s.friendly_name() == raw_name)
            .find_map(CastService::describe))
    }
}
