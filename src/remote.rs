//! Remote firewall authority
//!
//! The appliance owns the live ruleset and the enabled flag. Everything the
//! engine needs from it is expressed by [`RemoteAuthority`]; [`HttpAuthority`]
//! binds those calls to the appliance's REST API.
//!
//! Every mutating call answers `{ "status": "ok" }` on success. Any other
//! status string is a [`Error::RemoteRejection`]; transport failures, non-2xx
//! HTTP codes and undecodable bodies are [`Error::Request`].

use crate::config::ConsoleConfig;
use crate::core::error::{Error, Result};
use crate::core::ruleset::{RulesetSnapshot, RulesetUpdate};
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

const RULES_PATH: &str = "/api/firewall/rules";
const ENABLE_PATH: &str = "/api/firewall/enable";
const DISABLE_PATH: &str = "/api/firewall/disable";
const SETTINGS_PATH: &str = "/api/firewall/settings";
const INTERFACES_PATH: &str = "/api/interfaces";

/// Acknowledgement body of every mutating call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }

    /// Maps a non-"ok" status to [`Error::RemoteRejection`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::RemoteRejection`] carrying the status text.
    pub fn into_result(self) -> Result<()> {
        if self.status == "ok" {
            Ok(())
        } else {
            Err(Error::RemoteRejection {
                status: self.status,
            })
        }
    }
}

/// Network interface reported by the appliance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceInfo {
    pub name: String,
    pub addr: String,
}

/// Appliance-wide firewall switches, read and written without staging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FirewallSettings {
    /// Keep the ruleset across appliance restarts
    pub keep_rules: bool,
    pub allow_loopback: bool,
    /// Accept packets of established/related connections before the rules
    pub allow_established: bool,
    pub allow_icmp: bool,
    pub multicast_dns: bool,
    pub allow_upnp: bool,
    pub drop_invalid: bool,
    pub allow_dhcp: bool,
}

impl Default for FirewallSettings {
    fn default() -> Self {
        Self {
            keep_rules: false,
            allow_loopback: true,
            allow_established: true,
            allow_icmp: true,
            multicast_dns: true,
            allow_upnp: true,
            drop_invalid: true,
            allow_dhcp: true,
        }
    }
}

impl FirewallSettings {
    /// `(name, value)` pairs in wire order, for listings
    pub fn entries(&self) -> [(&'static str, bool); 8] {
        [
            ("keep_rules", self.keep_rules),
            ("allow_loopback", self.allow_loopback),
            ("allow_established", self.allow_established),
            ("allow_icmp", self.allow_icmp),
            ("multicast_dns", self.multicast_dns),
            ("allow_upnp", self.allow_upnp),
            ("drop_invalid", self.drop_invalid),
            ("allow_dhcp", self.allow_dhcp),
        ]
    }

    /// Sets a switch by its wire name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Request`] for unknown names.
    pub fn set(&mut self, name: &str, value: bool) -> Result<()> {
        let slot = match name {
            "keep_rules" => &mut self.keep_rules,
            "allow_loopback" => &mut self.allow_loopback,
            "allow_established" => &mut self.allow_established,
            "allow_icmp" => &mut self.allow_icmp,
            "multicast_dns" => &mut self.multicast_dns,
            "allow_upnp" => &mut self.allow_upnp,
            "drop_invalid" => &mut self.drop_invalid,
            "allow_dhcp" => &mut self.allow_dhcp,
            _ => return Err(Error::Request(format!("Unknown firewall setting: {name}"))),
        };
        *slot = value;
        Ok(())
    }
}

/// The appliance as seen by the sync controller.
///
/// All calls are single request/response exchanges. Implementations must not
/// retry on their own.
pub trait RemoteAuthority: Send + Sync {
    fn fetch_ruleset(&self) -> impl Future<Output = Result<RulesetSnapshot>> + Send;

    /// Atomically replaces the ruleset and policy
    fn push_ruleset(&self, update: &RulesetUpdate) -> impl Future<Output = Result<()>> + Send;

    fn enable(&self) -> impl Future<Output = Result<()>> + Send;

    fn disable(&self) -> impl Future<Output = Result<()>> + Send;

    fn interfaces(&self) -> impl Future<Output = Result<Vec<InterfaceInfo>>> + Send;

    fn settings(&self) -> impl Future<Output = Result<FirewallSettings>> + Send;

    fn update_settings(
        &self,
        settings: &FirewallSettings,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// [`RemoteAuthority`] over the appliance's REST API (reqwest + rustls)
#[derive(Debug, Clone)]
pub struct HttpAuthority {
    endpoint: String,
    api_token: Option<String>,
    client: Client,
}

impl HttpAuthority {
    /// Builds the HTTP client from console configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Request`] if the TLS backend cannot be initialised.
    pub fn new(config: &ConsoleConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| Error::Request(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone().filter(|t| !t.is_empty()),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.endpoint)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, self.url(path));
        match &self.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder, what: &str) -> Result<T> {
        let response = builder
            .send()
            .await
            .map_err(|e| Error::Request(format!("{what}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unavailable>".to_string());
            return Err(Error::Request(format!("{what} returned {status}: {body}")));
        }

        response
            .json()
            .await
            .map_err(|e| Error::Request(format!("Failed to parse {what} response: {e}")))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        debug!("GET {path}");
        self.send(self.request(Method::GET, path), &format!("GET {path}"))
            .await
    }

    async fn acknowledged(&self, method: Method, path: &str, body: Option<&impl Serialize>) -> Result<()> {
        debug!("{method} {path}");
        let what = format!("{method} {path}");
        let mut builder = self.request(method, path);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        self.send::<StatusResponse>(builder, &what)
            .await?
            .into_result()
    }
}

impl RemoteAuthority for HttpAuthority {
    async fn fetch_ruleset(&self) -> Result<RulesetSnapshot> {
        self.get(RULES_PATH).await
    }

    async fn push_ruleset(&self, update: &RulesetUpdate) -> Result<()> {
        self.acknowledged(Method::PUT, RULES_PATH, Some(update)).await
    }

    async fn enable(&self) -> Result<()> {
        self.acknowledged(Method::POST, ENABLE_PATH, None::<&()>).await
    }

    async fn disable(&self) -> Result<()> {
        self.acknowledged(Method::POST, DISABLE_PATH, None::<&()>)
            .await
    }

    async fn interfaces(&self) -> Result<Vec<InterfaceInfo>> {
        self.get(INTERFACES_PATH).await
    }

    async fn settings(&self) -> Result<FirewallSettings> {
        self.get(SETTINGS_PATH).await
    }

    async fn update_settings(&self, settings: &FirewallSettings) -> Result<()> {
        self.acknowledged(Method::PUT, SETTINGS_PATH, Some(settings))
            .await
    }
}
