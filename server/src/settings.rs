// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde::Deserialize;
use sipcommon::SipUri;
use sipcore::push::HttpMethod;

/// Top-level configuration, deserialized from `configuration/base.yaml`
/// overlaid with `configuration/local.yaml` and `SIPSERVER_`-prefixed
/// environment variables (§6).
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub application: ApplicationSettings,
    #[serde(default)]
    pub firebase: FirebaseSettings,
    pub push_ios: Option<PushIosSettings>,
    pub generic_client: Option<GenericClientSettings>,
    pub transport: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApplicationSettings {
    #[serde(default = "default_listen_metrics")]
    pub listen_metrics: SocketAddr,
}

fn default_listen_metrics() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 9090)
}

/// `firebase-projects-api-keys`, `firebase-service-accounts` and friends
/// from §6's configuration table.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct FirebaseSettings {
    #[serde(default)]
    pub projects_api_keys: Vec<AppIdPair>,
    #[serde(default)]
    pub service_accounts: Vec<AppIdPair>,
    #[serde(default = "default_refresh_interval", with = "duration_seconds")]
    pub default_refresh_interval: Duration,
    #[serde(default = "default_anticipation", with = "duration_seconds")]
    pub token_expiration_anticipation_time: Duration,
    pub token_helper_path: Option<String>,
}

/// One `appId:value` pair, used for both the legacy-API-key and the
/// service-account-path configuration lists (§6).
#[derive(Debug, Deserialize, Clone)]
pub struct AppIdPair {
    pub app_id: String,
    pub value: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PushIosSettings {
    pub certdir: String,
    pub cafile: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenericClientSettings {
    pub url: String,
    pub method: GenericMethod,
    pub protocol: GenericProtocol,
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(rename_all = "UPPERCASE")]
pub enum GenericMethod {
    Get,
    Post,
}

impl From<GenericMethod> for HttpMethod {
    fn from(method: GenericMethod) -> Self {
        match method {
            GenericMethod::Get => HttpMethod::Get,
            GenericMethod::Post => HttpMethod::Post,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(rename_all = "UPPERCASE")]
pub enum GenericProtocol {
    Http,
    #[serde(rename = "HTTP/2")]
    Http2,
}

impl From<GenericProtocol> for sipcore::push::HttpProtocol {
    fn from(protocol: GenericProtocol) -> Self {
        match protocol {
            GenericProtocol::Http => sipcore::push::HttpProtocol::Http,
            GenericProtocol::Http2 => sipcore::push::HttpProtocol::Http2,
        }
    }
}

impl Settings {
    pub fn transport_uri(&self) -> Result<SipUri, sipcommon::SipUriError> {
        self.transport.parse()
    }
}

fn default_refresh_interval() -> Duration {
    Duration::from_secs(3600)
}

fn default_anticipation() -> Duration {
    Duration::from_secs(300)
}

mod duration_seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}
