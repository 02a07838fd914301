// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! A minimal SIP URI value type.
//!
//! Full SIP URI grammar (RFC 3261 §19.1) is out of scope here — parsing,
//! transcription and routing of URIs belong to the enclosing proxy. This
//! type covers exactly what the conference allocator and the registrar
//! interface need: scheme, user, host, port and `;key=value` parameters.

use std::fmt;
use std::str::FromStr;

use displaydoc::Display;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scheme {
    Sip,
    Sips,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Sip => write!(f, "sip"),
            Scheme::Sips => write!(f, "sips"),
        }
    }
}

#[derive(Debug, Display, thiserror::Error)]
pub enum SipUriError {
    /// URI is missing the `sip:`/`sips:` scheme
    MissingScheme,
    /// URI has no host part
    MissingHost,
    /// URI has a malformed port
    InvalidPort,
}

/// A parsed SIP URI, e.g. `sip:chatroom-3f2a@conference.example.com;transport=tcp`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SipUri {
    pub scheme: Scheme,
    pub user: Option<String>,
    pub host: String,
    pub port: Option<u16>,
    pub params: Vec<(String, String)>,
}

impl SipUri {
    pub fn new(scheme: Scheme, host: impl Into<String>) -> Self {
        Self {
            scheme,
            user: None,
            host: host.into(),
            port: None,
            params: Vec::new(),
        }
    }

    /// Returns a copy of this URI with the user part replaced.
    ///
    /// Used by the conference allocator to produce a fresh candidate URI
    /// after a collision without disturbing host, port or transport params.
    pub fn with_user(&self, user: impl Into<String>) -> Self {
        Self {
            user: Some(user.into()),
            ..self.clone()
        }
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }
}

impl fmt::Display for SipUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.scheme)?;
        if let Some(user) = &self.user {
            write!(f, "{user}@")?;
        }
        write!(f, "{}", self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        for (key, value) in &self.params {
            write!(f, ";{key}={value}")?;
        }
        Ok(())
    }
}

impl FromStr for SipUri {
    type Err = SipUriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scheme, rest) = if let Some(rest) = s.strip_prefix("sips:") {
            (Scheme::Sips, rest)
        } else if let Some(rest) = s.strip_prefix("sip:") {
            (Scheme::Sip, rest)
        } else {
            return Err(SipUriError::MissingScheme);
        };

        let mut parts = rest.split(';');
        let userhost = parts.next().unwrap_or_default();
        let params = parts
            .filter_map(|p| {
                let mut kv = p.splitn(2, '=');
                let key = kv.next()?.to_string();
                let value = kv.next().unwrap_or_default().to_string();
                Some((key, value))
            })
            .collect();

        let (user, hostport) = match userhost.split_once('@') {
            Some((user, hostport)) => (Some(user.to_string()), hostport),
            None => (None, userhost),
        };

        if hostport.is_empty() {
            return Err(SipUriError::MissingHost);
        }

        let (host, port) = match hostport.split_once(':') {
            Some((host, port)) => (
                host.to_string(),
                Some(port.parse::<u16>().map_err(|_| SipUriError::InvalidPort)?),
            ),
            None => (hostport.to_string(), None),
        };

        Ok(SipUri {
            scheme,
            user,
            host,
            port,
            params,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_basic_uri() {
        let uri: SipUri = "sip:alice@example.com".parse().unwrap();
        assert_eq!(uri.user.as_deref(), Some("alice"));
        assert_eq!(uri.host, "example.com");
        assert_eq!(uri.to_string(), "sip:alice@example.com");
    }

    #[test]
    fn parses_port_and_params() {
        let uri: SipUri = "sips:room@conf.example.com:5061;transport=tls"
            .parse()
            .unwrap();
        assert_eq!(uri.port, Some(5061));
        assert_eq!(uri.param("transport"), Some("tls"));
        assert_eq!(uri.scheme, Scheme::Sips);
    }

    #[test]
    fn with_user_preserves_rest() {
        let uri: SipUri = "sip:old@conf.example.com;transport=tcp".parse().unwrap();
        let next = uri.with_user("new");
        assert_eq!(next.user.as_deref(), Some("new"));
        assert_eq!(next.host, "conf.example.com");
        assert_eq!(next.param("transport"), Some("tcp"));
    }

    #[test]
    fn rejects_missing_scheme() {
        assert!(matches!(
            "alice@example.com".parse::<SipUri>(),
            Err(SipUriError::MissingScheme)
        ));
    }
}
