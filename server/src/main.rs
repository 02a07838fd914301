// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use anyhow::Context;
use clap::Parser;
use sipserver::{args::Command, configurations::get_configuration, logging::init_logging};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let args = sipserver::args::Args::parse();

    let settings =
        get_configuration("server/").context("could not load configuration")?;

    match args.cmd.unwrap_or_default() {
        Command::Run => sipserver::run(settings).await,
        Command::TestPush(push_args) => {
            let outcome = sipserver::send_test_push(
                &settings,
                &push_args.app_id,
                &push_args.token,
                &push_args.provider,
            )
            .await?;
            info!(?outcome, "test push completed");
            Ok(())
        }
    }
}
