//! REST implementation of [`FabricApi`].
//!
//! Devices are resolved by management IP with
//! `GET /v2.0/devices?ip_address=<ip>`; configuration is sent as
//! `PUT /v2.0/devices/<id>/<action>` with a JSON body.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::api::FabricApi;
use crate::error::{FabricError, FabricResult};
use crate::request::{L2Request, VrfRequest};
use crate::retry::RetryPolicy;

const API_PREFIX: &str = "v2.0";
const CREATE_NETWORK: &str = "neutron_create_network";
const DELETE_NETWORK: &str = "neutron_delete_network";

fn default_auth_uri() -> String {
    "http://127.0.0.1:9696".to_string()
}

fn default_dry_run() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_retries() -> u32 {
    3
}

fn default_retry_interval_ms() -> u64 {
    1000
}

/// Fabric controller endpoint settings.
#[derive(Debug, Clone, Deserialize)]
pub struct FabricConfig {
    /// Controller base URL.
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    /// When set, no request is sent to the controller.
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Extra attempts for idempotent verbs on transport failures.
    #[serde(default = "default_retries")]
    pub retries: u32,

    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
}

impl Default for FabricConfig {
    fn default() -> Self {
        Self {
            auth_uri: default_auth_uri(),
            username: String::new(),
            password: String::new(),
            dry_run: default_dry_run(),
            timeout_secs: default_timeout_secs(),
            retries: default_retries(),
            retry_interval_ms: default_retry_interval_ms(),
        }
    }
}

impl FabricConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            retries: self.retries,
            interval: Duration::from_millis(self.retry_interval_ms),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DeviceList {
    #[serde(default)]
    devices: Vec<Device>,
}

#[derive(Debug, Deserialize)]
struct Device {
    id: serde_json::Value,
}

impl Device {
    fn id(&self) -> String {
        match &self.id {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Fabric controller client over HTTP.
#[derive(Debug, Clone)]
pub struct RestFabricClient {
    client: Client,
    base: Url,
    username: String,
    password: String,
    dry_run: bool,
    retry: RetryPolicy,
}

impl RestFabricClient {
    /// Creates a client from the endpoint settings.
    pub fn new(config: &FabricConfig) -> FabricResult<Self> {
        let mut base = Url::parse(&config.auth_uri).map_err(|e| {
            FabricError::invalid_request(format!("invalid auth_uri '{}': {}", config.auth_uri, e))
        })?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| FabricError::invalid_request(format!("http client: {}", e)))?;

        Ok(Self {
            client,
            base,
            username: config.username.clone(),
            password: config.password.clone(),
            dry_run: config.dry_run,
            retry: config.retry_policy(),
        })
    }

    /// Returns true if requests are suppressed.
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    fn url(&self, path: &str) -> FabricResult<Url> {
        self.base
            .join(&format!("{}/{}", API_PREFIX, path))
            .map_err(|e| FabricError::invalid_request(format!("invalid path '{}': {}", path, e)))
    }

    /// Sends one request, retrying transport failures within the budget.
    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> FabricResult<String> {
        let attempts = self.retry.attempts_for(&method);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            let mut request = self.client.request(method.clone(), url.clone());
            if !self.username.is_empty() {
                request = request.basic_auth(&self.username, Some(&self.password));
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    let text = response
                        .text()
                        .await
                        .map_err(|e| FabricError::decode(url.as_str(), e.to_string()))?;
                    if !status.is_success() {
                        return Err(FabricError::Api {
                            status: status.as_u16(),
                            url: url.to_string(),
                            body: text,
                        });
                    }
                    debug!("{} {} -> {}", method, url, status);
                    return Ok(text);
                }
                Err(e) if e.is_connect() || e.is_timeout() => {
                    warn!(
                        "{} {} failed (attempt {}/{}): {}",
                        method, url, attempt, attempts, e
                    );
                    last_error = e.to_string();
                    if attempt < attempts {
                        tokio::time::sleep(self.retry.interval).await;
                    }
                }
                Err(e) => {
                    return Err(FabricError::connection_failed(
                        url.as_str(),
                        attempt,
                        e.to_string(),
                    ));
                }
            }
        }

        Err(FabricError::connection_failed(
            url.as_str(),
            attempts,
            last_error,
        ))
    }

    /// Resolves the controller's device id for a switch IP.
    #[instrument(skip(self))]
    pub async fn device_id(&self, switch_ip: &str) -> FabricResult<String> {
        let mut url = self.url("devices")?;
        url.query_pairs_mut().append_pair("ip_address", switch_ip);

        let text = self.send::<()>(Method::GET, url.clone(), None).await?;
        let list: DeviceList = serde_json::from_str(&text)
            .map_err(|e| FabricError::decode(url.as_str(), e.to_string()))?;

        list.devices
            .first()
            .map(Device::id)
            .ok_or_else(|| FabricError::switch_not_found(switch_ip))
    }

    async fn put_action<B: Serialize + ?Sized>(
        &self,
        switch_ip: &str,
        action: &str,
        body: &B,
    ) -> FabricResult<()> {
        if self.dry_run {
            info!("Dry run: {} on {} not sent", action, switch_ip);
            return Ok(());
        }

        let device = self.device_id(switch_ip).await?;
        let url = self.url(&format!("devices/{}/{}", device, action))?;
        self.send(Method::PUT, url, Some(body)).await?;
        info!("Sent {} to switch {} (device {})", action, switch_ip, device);
        Ok(())
    }
}

#[async_trait]
impl FabricApi for RestFabricClient {
    async fn push_l2(&self, request: &L2Request) -> FabricResult<()> {
        self.put_action(&request.switch_ip, CREATE_NETWORK, request)
            .await
    }

    async fn retract_l2(&self, request: &L2Request) -> FabricResult<()> {
        self.put_action(&request.switch_ip, DELETE_NETWORK, request)
            .await
    }

    async fn push_vrf(&self, request: &VrfRequest) -> FabricResult<()> {
        if !request.mode.is_push() {
            return Err(FabricError::invalid_request(format!(
                "{:?} is not a push mode",
                request.mode
            )));
        }
        self.put_action(&request.switch_ip, request.mode.action(), request)
            .await
    }

    async fn retract_vrf(&self, request: &VrfRequest) -> FabricResult<()> {
        if request.mode.is_push() {
            return Err(FabricError::invalid_request(format!(
                "{:?} is not a retract mode",
                request.mode
            )));
        }
        self.put_action(&request.switch_ip, request.mode.action(), request)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_base_url_normalized() {
        let config = FabricConfig {
            auth_uri: "http://afc:9696/api".to_string(),
            ..Default::default()
        };
        let client = RestFabricClient::new(&config).unwrap();
        assert_eq!(
            client.url("devices").unwrap().as_str(),
            "http://afc:9696/api/v2.0/devices"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let config = FabricConfig {
            auth_uri: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            RestFabricClient::new(&config),
            Err(FabricError::InvalidRequest { .. })
        ));
    }

    #[test]
    fn test_device_id_forms() {
        let list: DeviceList =
            serde_json::from_str(r#"{"devices":[{"id":7},{"id":"x"}]}"#).unwrap();
        assert_eq!(list.devices[0].id(), "7");
        assert_eq!(list.devices[1].id(), "x");
    }

    #[test]
    fn test_config_defaults() {
        let config = FabricConfig::default();
        assert!(config.dry_run);
        assert_eq!(config.retry_policy().retries, 3);
        assert_eq!(config.retry_policy().interval, Duration::from_secs(1));
    }
}
