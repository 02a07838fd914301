// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Conference-address allocation: collision-free assignment of group-chat
//! SIP URIs against a shared registrar, and GRUU binding.

mod allocator;
mod errors;
mod registrar;
mod types;

pub use allocator::{random_candidate, ConferenceAddressAllocator};
pub use errors::ConferenceError;
pub use registrar::Registrar;
pub use types::{ChatRoomAddress, Contact, Gruu, RegistrarRecord};
