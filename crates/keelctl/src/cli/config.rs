use clap::Parser;
use comfy_table::Cell;
use eyre::Result as EyreResult;
use keel_client::Transport;
use keel_config::ConnectionConfig;
use serde::Serialize;

use crate::cli::Environment;
use crate::output::{table, Report};

#[derive(Debug, Parser)]
#[command(about = "Print the resolved connection, with the token redacted")]
pub struct ConfigCommand {}

#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct ConfigReport<'a>(pub &'a ConnectionConfig);

impl Report for ConfigReport<'_> {
    fn report(&self) {
        let config = self.0;
        let context = config.current_context();

        let mut table = table(["SETTING", "VALUE"]);
        for (setting, value) in [
            ("context", context.name.as_str()),
            ("cluster", context.cluster.as_str()),
            ("server", config.server().as_str()),
            ("identity", context.identity.as_str()),
            ("token", "[REDACTED]"),
        ] {
            let _ = table.add_row(vec![Cell::new(setting), Cell::new(value)]);
        }
        let _ = table.add_row(vec![
            Cell::new("verify tls"),
            Cell::new(!config.tls().is_skipped()),
        ]);

        println!("{table}");
    }
}

impl ConfigCommand {
    pub fn run<T: Transport + Clone>(environment: &Environment<T>) -> EyreResult<()> {
        environment.output.write(&ConfigReport(environment.config()));
        Ok(())
    }
}
