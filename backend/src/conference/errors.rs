// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use displaydoc::Display;

/// Fatal outcomes for one allocator run (§4.8, §7). `AddressCollision` is
/// deliberately absent: collisions are recovered internally by
/// re-randomising the candidate URI and never escape the allocator.
#[derive(Debug, Display, thiserror::Error)]
pub enum ConferenceError {
    /// registrar query failed: {message}
    Transport { message: String },
    /// binding succeeded but the registrar record has no contacts
    BindFailed,
    /// the latest contact carries no public GRUU
    NoGruu,
    /// exhausted {attempts} collision-retry attempts without a free address
    AddressExhaustion { attempts: u32 },
    /// registrar returned a malformed GRUU: {message}
    InvalidGruu { message: String },
}
