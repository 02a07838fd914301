// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::collections::HashMap;
use std::time::Duration;

use displaydoc::Display;
use serde::{Deserialize, Serialize};

/// Tag identifying the class of notification. Used purely as a key into
/// [`PushInfo::destinations`]; it is intentionally a narrower set than
/// [`PayloadCategory`] (no `RemoteBasic`), matching the asymmetry between the
/// two concepts in the wire-level design.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PushType {
    Message,
    Call,
    Background,
}

/// Payload category: controls templating, carried as a field on [`PushInfo`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayloadCategory {
    Message,
    Call,
    RemoteBasic,
    Background,
}

/// One entry of [`PushInfo::destinations`]: a device identifier paired with
/// the provider tag that resolves it to a registered [`PushClient`].
///
/// [`PushClient`]: crate::push::client::PushClient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    pub device_id: String,
    pub provider: String,
}

impl Destination {
    pub fn new(device_id: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            provider: provider.into(),
        }
    }
}

/// An immutable description of one notification intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushInfo {
    pub destinations: HashMap<PushType, Destination>,
    pub app_id: String,
    pub payload_category: PayloadCategory,
    pub caller_name: Option<String>,
    pub badge: Option<u32>,
    pub custom: HashMap<String, String>,
    #[serde(default, with = "duration_secs_opt")]
    pub ttl: Option<Duration>,
    pub collapse_key: Option<String>,
    pub event_id: Option<String>,
}

/// `PushInfo` failed the "at least one destination" invariant.
#[derive(Debug, Display, thiserror::Error)]
#[displaydoc("push info has no populated destinations")]
pub struct EmptyDestinations;

impl PushInfo {
    pub fn builder(app_id: impl Into<String>, payload_category: PayloadCategory) -> PushInfoBuilder {
        PushInfoBuilder {
            destinations: HashMap::new(),
            app_id: app_id.into(),
            payload_category,
            caller_name: None,
            badge: None,
            custom: HashMap::new(),
            ttl: None,
            collapse_key: None,
            event_id: None,
        }
    }

    pub fn destination_for(&self, push_type: PushType) -> Option<&Destination> {
        self.destinations.get(&push_type)
    }
}

/// Builder enforcing the "at least one destination" invariant at construction.
pub struct PushInfoBuilder {
    destinations: HashMap<PushType, Destination>,
    app_id: String,
    payload_category: PayloadCategory,
    caller_name: Option<String>,
    badge: Option<u32>,
    custom: HashMap<String, String>,
    ttl: Option<Duration>,
    collapse_key: Option<String>,
    event_id: Option<String>,
}

impl PushInfoBuilder {
    pub fn destination(mut self, push_type: PushType, destination: Destination) -> Self {
        self.destinations.insert(push_type, destination);
        self
    }

    pub fn caller_name(mut self, caller_name: impl Into<String>) -> Self {
        self.caller_name = Some(caller_name.into());
        self
    }

    pub fn badge(mut self, badge: u32) -> Self {
        self.badge = Some(badge);
        self
    }

    pub fn custom(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom.insert(key.into(), value.into());
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn collapse_key(mut self, collapse_key: impl Into<String>) -> Self {
        self.collapse_key = Some(collapse_key.into());
        self
    }

    pub fn event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }

    pub fn build(self) -> Result<PushInfo, EmptyDestinations> {
        if self.destinations.is_empty() {
            return Err(EmptyDestinations);
        }
        Ok(PushInfo {
            destinations: self.destinations,
            app_id: self.app_id,
            payload_category: self.payload_category,
            caller_name: self.caller_name,
            badge: self.badge,
            custom: self.custom,
            ttl: self.ttl,
            collapse_key: self.collapse_key,
            event_id: self.event_id,
        })
    }
}

mod duration_secs_opt {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.as_secs()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let secs: Option<u64> = Option::deserialize(d)?;
        Ok(secs.map(Duration::from_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_rejects_empty_destinations() {
        let err = PushInfo::builder("app1", PayloadCategory::Message).build();
        assert!(err.is_err());
    }

    #[test]
    fn builder_accepts_one_destination() {
        let info = PushInfo::builder("app1", PayloadCategory::Message)
            .destination(PushType::Message, Destination::new("tok", "apns"))
            .build()
            .unwrap();
        assert_eq!(info.destination_for(PushType::Message).unwrap().provider, "apns");
        assert!(info.destination_for(PushType::Call).is_none());
    }
}
