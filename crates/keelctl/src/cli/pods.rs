use clap::Parser;
use eyre::{Result as EyreResult, WrapErr};
use keel_client::{ClientError, ListParams, ResourceKind, Transport, DEFAULT_NAMESPACE};
use serde::Serialize;

use crate::cli::Environment;
use crate::output::Report;

#[derive(Debug, Parser)]
#[command(about = "Count pods in the cluster and look one of them up")]
pub struct PodsCommand {
    /// Pod to look up
    #[arg(long, value_name = "NAME", default_value = "example-xxxxx")]
    pub pod: String,

    /// Namespace of the pod to look up
    #[arg(long, short, value_name = "NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum PodLookup {
    Found,
    NotFound,
    /// The store answered, but refused the lookup.
    Rejected { message: String },
}

#[derive(Debug, Serialize)]
pub struct PodsReport {
    pub total: usize,
    pub namespace: String,
    pub pod: String,
    pub lookup: PodLookup,
}

impl Report for PodsReport {
    fn report(&self) {
        println!("There are {} pods in the cluster", self.total);
        match &self.lookup {
            PodLookup::Found => {
                println!("Found pod {} in namespace {}", self.pod, self.namespace);
            }
            PodLookup::NotFound => {
                println!("Pod {} in namespace {} not found", self.pod, self.namespace);
            }
            PodLookup::Rejected { message } => println!(
                "Error getting pod {} in namespace {}: {message}",
                self.pod, self.namespace
            ),
        }
    }
}

impl PodsCommand {
    pub async fn run<T: Transport + Clone>(self, environment: &Environment<T>) -> EyreResult<()> {
        let pods = environment
            .cluster_wide(ResourceKind::POD)
            .list(&ListParams::default())
            .await
            .wrap_err("failed to list pods")?;

        let lookup = match environment
            .client(ResourceKind::POD, &self.namespace)
            .get(&self.pod)
            .await
        {
            Ok(_) => PodLookup::Found,
            Err(err) if err.is_not_found() => PodLookup::NotFound,
            Err(err @ (ClientError::Validation(_) | ClientError::Transport(_))) => {
                return Err(err).wrap_err_with(|| format!("failed to get pod {}", self.pod));
            }
            Err(err) => PodLookup::Rejected {
                message: err.to_string(),
            },
        };

        environment.output.write(&PodsReport {
            total: pods.len(),
            namespace: self.namespace,
            pod: self.pod,
            lookup,
        });

        Ok(())
    }
}
