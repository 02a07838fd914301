// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Push notification dispatch and conference-address allocation: the core
//! of the SIP proxy's outbound-notification and group-chat-addressing
//! machinery.

pub mod conference;
pub mod push;
