//! MemCard Pro device polling.
//!
//! Finds a reachable device among the configured endpoints and fetches its
//! `/api/currentState` document once per cycle. A device that stops answering
//! is reported lost, and discovery starts over on the next cycle.

use crate::config::DeviceConfig;
use crate::types::{DeviceMode, DeviceState};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Device returned status {0}")]
    Status(u16),

    #[error("Device state is not a JSON object")]
    InvalidDocument,
}

/// Fetches the current state document from a device
#[async_trait::async_trait]
pub trait StateProbe: Send + Sync {
    async fn fetch(&self, host: &str) -> Result<DeviceState, DeviceError>;
}

#[async_trait::async_trait]
impl<T: StateProbe + ?Sized> StateProbe for Box<T> {
    async fn fetch(&self, host: &str) -> Result<DeviceState, DeviceError> {
        (**self).fetch(host).await
    }
}

/// Plain HTTP probe with a per-request timeout
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Result<Self, DeviceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    pub fn state_url(host: &str) -> String {
        format!("http://{}/api/currentState", host.trim())
    }
}

#[async_trait::async_trait]
impl StateProbe for HttpProbe {
    async fn fetch(&self, host: &str) -> Result<DeviceState, DeviceError> {
        let response = self.client.get(Self::state_url(host)).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DeviceError::Status(status.as_u16()));
        }

        // An empty object means the device has nothing to report
        let document: Value = response.json().await?;
        match document.as_object() {
            Some(fields) if !fields.is_empty() => Ok(DeviceState::from_value(&document)),
            _ => Err(DeviceError::InvalidDocument),
        }
    }
}

/// A configured device address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    /// Mode every report from this endpoint is in, when it does not say
    pub implied_mode: Option<DeviceMode>,
}

impl Endpoint {
    /// Endpoints in discovery order: the MemCard Pro 2, then the GC model
    pub fn from_config(config: &DeviceConfig) -> Vec<Endpoint> {
        [
            (config.mcp2_host.trim(), None),
            (config.mcp_gc_host.trim(), Some(DeviceMode::Gc)),
        ]
        .into_iter()
        .filter(|(host, _)| !host.is_empty())
        .map(|(host, implied_mode)| Endpoint {
            host: host.to_string(),
            implied_mode,
        })
        .collect()
    }
}

/// Outcome of one device polling cycle
#[derive(Debug, Clone, PartialEq)]
pub enum DevicePoll {
    Observed {
        host: String,
        implied_mode: Option<DeviceMode>,
        state: DeviceState,
    },
    /// The current device stopped answering
    Lost(String),
    /// No endpoint answered discovery
    Offline,
}

/// Discovery plus polling over the configured endpoints
pub struct DeviceWatcher<P> {
    probe: P,
    endpoints: Vec<Endpoint>,
    current: Option<usize>,
}

impl<P: StateProbe> DeviceWatcher<P> {
    pub fn new(probe: P, endpoints: Vec<Endpoint>) -> Self {
        Self {
            probe,
            endpoints,
            current: None,
        }
    }

    /// Endpoint currently being polled
    pub fn current(&self) -> Option<&Endpoint> {
        self.current.and_then(|i| self.endpoints.get(i))
    }

    pub async fn poll(&mut self) -> DevicePoll {
        match self.current {
            Some(index) => self.poll_current(index).await,
            None => self.discover().await,
        }
    }

    async fn poll_current(&mut self, index: usize) -> DevicePoll {
        let endpoint = &self.endpoints[index];
        match self.probe.fetch(&endpoint.host).await {
            Ok(state) => DevicePoll::Observed {
                host: endpoint.host.clone(),
                implied_mode: endpoint.implied_mode.clone(),
                state,
            },
            Err(e) => {
                warn!("Lost connection to device at {}: {}", endpoint.host, e);
                self.current = None;
                DevicePoll::Lost(endpoint.host.clone())
            }
        }
    }

    async fn discover(&mut self) -> DevicePoll {
        for (index, endpoint) in self.endpoints.iter().enumerate() {
            match self.probe.fetch(&endpoint.host).await {
                Ok(state) => {
                    info!("Connected to device at {}", endpoint.host);
                    self.current = Some(index);
                    return DevicePoll::Observed {
                        host: endpoint.host.clone(),
                        implied_mode: endpoint.implied_mode.clone(),
                        state,
                    };
                }
                Err(e) => debug!("No device at {}: {}", endpoint.host, e),
            }
        }
        DevicePoll::Offline
    }
}
