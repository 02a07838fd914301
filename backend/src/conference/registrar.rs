// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use async_trait::async_trait;
use sipcommon::SipUri;
use uuid::Uuid;

use crate::conference::errors::ConferenceError;
use crate::conference::types::RegistrarRecord;

/// Storage boundary the allocator depends on; it never talks to a concrete
/// registrar implementation (§2, §4.9).
#[async_trait]
pub trait Registrar: Send + Sync {
    /// Returns the registrar's current view of `uri`, or `None` if nothing
    /// is bound there.
    async fn query(&self, uri: &SipUri) -> Result<Option<RegistrarRecord>, ConferenceError>;

    /// Binds `uri` to `device_uuid` over `transport`, returning the record
    /// the binding produced (including the new contact).
    async fn bind(
        &self,
        uri: &SipUri,
        device_uuid: Uuid,
        transport: &SipUri,
    ) -> Result<RegistrarRecord, ConferenceError>;
}
