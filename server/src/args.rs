// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

#[derive(clap::Parser)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Option<Command>,
}

#[derive(Default, clap::Subcommand)]
pub enum Command {
    /// Run the server
    #[default]
    Run,
    /// Send a one-off test push through the configured clients
    TestPush(TestPushArgs),
}

#[derive(clap::Args)]
pub struct TestPushArgs {
    /// Registered app identifier to dispatch through
    pub app_id: String,
    /// Device token / registration id
    pub token: String,
    /// Provider tag (e.g. "apns", "fcm")
    pub provider: String,
}
