// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Small, dependency-light primitives shared by the push dispatch core and
//! the server binary: a SIP URI value type and a random-token helper.

pub mod rand_token;
pub mod uri;

pub use rand_token::random_hex_token;
pub use uri::{SipUri, SipUriError};
