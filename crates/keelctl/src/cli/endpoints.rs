use clap::Parser;
use eyre::{Result as EyreResult, WrapErr};
use keel_client::{ResourceKind, Transport, DEFAULT_NAMESPACE};
use serde::Serialize;
use serde_json::Value;

use crate::cli::Environment;
use crate::output::{pretty, Report};

#[derive(Debug, Parser)]
#[command(about = "Print the subsets of an Endpoints object")]
pub struct EndpointsCommand {
    /// Name of the Endpoints object, usually the name of its service
    #[arg(long, value_name = "NAME")]
    pub endpoint: String,

    #[arg(long, short, value_name = "NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,
}

#[derive(Debug, Serialize)]
pub struct EndpointsReport {
    pub name: String,
    pub subsets: Value,
}

impl Report for EndpointsReport {
    fn report(&self) {
        println!("endpoints: {}", pretty(&self.subsets));
    }
}

impl EndpointsCommand {
    pub async fn run<T: Transport + Clone>(self, environment: &Environment<T>) -> EyreResult<()> {
        let endpoints = environment
            .client(ResourceKind::ENDPOINTS, &self.namespace)
            .get(&self.endpoint)
            .await
            .wrap_err_with(|| format!("failed to get endpoints {}", self.endpoint))?;

        // Endpoints carry `subsets` at the top level rather than under `spec`.
        let subsets = endpoints
            .extra
            .get("subsets")
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new()));

        environment.output.write(&EndpointsReport {
            name: self.endpoint,
            subsets,
        });

        Ok(())
    }
}
