// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::sync::Arc;

use sipcommon::{random_hex_token, SipUri};
use tracing::{info, warn};
use uuid::Uuid;

use crate::conference::errors::ConferenceError;
use crate::conference::registrar::Registrar;
use crate::conference::types::ChatRoomAddress;

const ADDRESS_TOKEN_BITS: u32 = 128;
const ADDRESS_PREFIX: &str = "chatroom-";
const DEFAULT_MAX_COLLISION_ATTEMPTS: u32 = 16;

/// Collision-free assignment of a group-chat SIP URI, followed by binding it
/// with the registrar to obtain a durable GRUU (§4.8). Owned by the
/// chat-room handshake for exactly the collision-retry-then-bind exchange;
/// does not outlive that exchange.
pub struct ConferenceAddressAllocator {
    registrar: Arc<dyn Registrar>,
    transport: SipUri,
    max_collision_attempts: u32,
}

impl ConferenceAddressAllocator {
    pub fn new(registrar: Arc<dyn Registrar>, transport: SipUri) -> Self {
        Self {
            registrar,
            transport,
            max_collision_attempts: DEFAULT_MAX_COLLISION_ATTEMPTS,
        }
    }

    pub fn with_max_collision_attempts(mut self, max_collision_attempts: u32) -> Self {
        self.max_collision_attempts = max_collision_attempts;
        self
    }

    /// Runs the Fetching/Binding protocol (§4.8) to completion, publishing
    /// the resulting GRUU into `address` or nullifying it on failure.
    pub async fn run(
        &self,
        address: &mut ChatRoomAddress,
        candidate: SipUri,
        device_uuid: Uuid,
    ) -> Result<(), ConferenceError> {
        match self.fetch(candidate).await {
            Ok(free_uri) => match self.bind(&free_uri, device_uuid).await {
                Ok(gruu) => match gruu.parse::<SipUri>() {
                    Ok(gruu_uri) => {
                        address.set(gruu_uri);
                        Ok(())
                    }
                    Err(error) => {
                        address.nullify();
                        Err(ConferenceError::InvalidGruu {
                            message: error.to_string(),
                        })
                    }
                },
                Err(error) => {
                    address.nullify();
                    Err(error)
                }
            },
            Err(error) => {
                address.nullify();
                Err(error)
            }
        }
    }

    /// Fetching phase: re-randomises the candidate's user part on every
    /// collision, capped at `max_collision_attempts` (§4.8, §9 Open
    /// Question — the unbounded loop is deliberately bounded here).
    async fn fetch(&self, mut candidate: SipUri) -> Result<SipUri, ConferenceError> {
        for attempt in 0..self.max_collision_attempts {
            match self.registrar.query(&candidate).await? {
                Some(record) if !record.is_empty() => {
                    info!(attempt, uri = %candidate, "conference address collision, retrying");
                    let token = random_hex_token(ADDRESS_TOKEN_BITS);
                    candidate = candidate.with_user(format!("{ADDRESS_PREFIX}{token}"));
                }
                _ => return Ok(candidate),
            }
        }
        Err(ConferenceError::AddressExhaustion {
            attempts: self.max_collision_attempts,
        })
    }

    /// Binding phase: binds the free URI, then extracts the latest
    /// contact's public GRUU (§4.8).
    async fn bind(&self, uri: &SipUri, device_uuid: Uuid) -> Result<String, ConferenceError> {
        let record = self.registrar.bind(uri, device_uuid, &self.transport).await?;

        if record.is_empty() {
            return Err(ConferenceError::BindFailed);
        }

        let contact = record
            .latest_contact()
            .expect("non-empty record has at least one contact");
        match &contact.public_gruu {
            Some(gruu) => Ok(gruu.clone()),
            None => {
                warn!(uri = %uri, "bound contact carries no public GRUU");
                Err(ConferenceError::NoGruu)
            }
        }
    }
}

/// Generates a fresh, unbound candidate URI: `<prefix><random>` under the
/// conference server's host, used by callers before the first `fetch`.
pub fn random_candidate(base: &SipUri) -> SipUri {
    let token = random_hex_token(ADDRESS_TOKEN_BITS);
    base.with_user(format!("{ADDRESS_PREFIX}{token}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conference::types::{Contact, RegistrarRecord};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct ScriptedRegistrar {
        query_responses: Mutex<Vec<Option<RegistrarRecord>>>,
        query_calls: AtomicUsize,
    }

    #[async_trait]
    impl Registrar for ScriptedRegistrar {
        async fn query(&self, _uri: &SipUri) -> Result<Option<RegistrarRecord>, ConferenceError> {
            self.query_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.query_responses.lock().unwrap().remove(0))
        }

        async fn bind(
            &self,
            _uri: &SipUri,
            device_uuid: Uuid,
            _transport: &SipUri,
        ) -> Result<RegistrarRecord, ConferenceError> {
            Ok(RegistrarRecord {
                contacts: vec![Contact {
                    device_uuid,
                    public_gruu: Some("sip:g@conf.example.com".to_string()),
                    registration_time: Utc::now(),
                }],
            })
        }
    }

    fn base_uri() -> SipUri {
        "sip:placeholder@conf.example.com".parse().unwrap()
    }

    #[tokio::test]
    async fn resolves_collision_then_binds() {
        let registrar = Arc::new(ScriptedRegistrar {
            query_responses: Mutex::new(vec![
                Some(RegistrarRecord {
                    contacts: vec![Contact {
                        device_uuid: Uuid::new_v4(),
                        public_gruu: Some("sip:taken@conf.example.com".to_string()),
                        registration_time: Utc::now(),
                    }],
                }),
                None,
            ]),
            query_calls: AtomicUsize::new(0),
        });
        let allocator =
            ConferenceAddressAllocator::new(registrar.clone(), base_uri());

        let mut address = ChatRoomAddress::new();
        allocator
            .run(&mut address, base_uri(), Uuid::new_v4())
            .await
            .unwrap();

        assert_eq!(registrar.query_calls.load(Ordering::SeqCst), 2);
        let expected: SipUri = "sip:g@conf.example.com".parse().unwrap();
        assert_eq!(address.uri(), Some(&expected));
    }

    #[tokio::test]
    async fn fails_with_no_gruu_when_contact_lacks_one() {
        struct NoGruuRegistrar;

        #[async_trait]
        impl Registrar for NoGruuRegistrar {
            async fn query(&self, _uri: &SipUri) -> Result<Option<RegistrarRecord>, ConferenceError> {
                Ok(None)
            }

            async fn bind(
                &self,
                _uri: &SipUri,
                device_uuid: Uuid,
                _transport: &SipUri,
            ) -> Result<RegistrarRecord, ConferenceError> {
                Ok(RegistrarRecord {
                    contacts: vec![Contact {
                        device_uuid,
                        public_gruu: None,
                        registration_time: Utc::now(),
                    }],
                })
            }
        }

        let allocator = ConferenceAddressAllocator::new(Arc::new(NoGruuRegistrar), base_uri());
        let mut address = ChatRoomAddress::new();
        let error = allocator
            .run(&mut address, base_uri(), Uuid::new_v4())
            .await
            .unwrap_err();

        assert!(matches!(error, ConferenceError::NoGruu));
        assert!(address.uri().is_none());
    }
}
