// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use chrono::{DateTime, Utc};
use sipcommon::SipUri;
use uuid::Uuid;

/// Globally routable user agent URI returned by the registrar after binding
/// (§3); becomes the durable conference address.
pub type Gruu = String;

/// A SIP URI whose user part is a random 128-bit token prefixed by a fixed
/// string (§3). Unique among live chat rooms for any registrar view.
#[derive(Debug, Clone)]
pub struct ChatRoomAddress {
    uri: Option<SipUri>,
}

impl ChatRoomAddress {
    pub fn new() -> Self {
        Self { uri: None }
    }

    pub fn uri(&self) -> Option<&SipUri> {
        self.uri.as_ref()
    }

    pub fn set(&mut self, uri: SipUri) {
        self.uri = Some(uri);
    }

    /// Clears the conference address after a transport error during either
    /// allocator phase (§4.8).
    pub fn nullify(&mut self) {
        self.uri = None;
    }
}

impl Default for ChatRoomAddress {
    fn default() -> Self {
        Self::new()
    }
}

/// One registrar binding for a chat-room's conference URI (§4.9).
#[derive(Debug, Clone)]
pub struct Contact {
    pub device_uuid: Uuid,
    pub public_gruu: Option<Gruu>,
    pub registration_time: DateTime<Utc>,
}

/// The registrar's view of a URI: zero or more contacts (§4.9).
#[derive(Debug, Clone, Default)]
pub struct RegistrarRecord {
    pub contacts: Vec<Contact>,
}

impl RegistrarRecord {
    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    /// The contact with the most recent `registration_time`, per §4.8
    /// ("extract the latest extended contact's public GRUU").
    pub fn latest_contact(&self) -> Option<&Contact> {
        self.contacts.iter().max_by_key(|c| c.registration_time)
    }
}
