use std::collections::BTreeMap;

use clap::Parser;
use eyre::{Result as EyreResult, WrapErr};
use keel_client::{PropagationPolicy, Resource, ResourceKind, Transport, DEFAULT_NAMESPACE};
use serde::Serialize;
use serde_json::json;

use crate::cli::deployments::{hello_world, DEPLOYMENT_NAME};
use crate::cli::Environment;
use crate::output::{pretty, InfoLine, Report};

pub const ANNOTATION_KEY: &str = "how-do-you-do";
pub const ANNOTATION_VALUE: &str = "I'm fine";

#[derive(Debug, Parser)]
#[command(about = "Create an annotated deployment, read the annotations back and delete it")]
pub struct AnnotationsCommand {
    /// Namespace to run the demo in
    #[arg(long, short, value_name = "NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,
}

fn annotated() -> Resource {
    hello_world(
        1,
        json!({
            "name": DEPLOYMENT_NAME,
            "image": "busybox:1.33.0",
            "command": ["tail", "-f", "/dev/null"],
        }),
    )
    .with_annotation(ANNOTATION_KEY, ANNOTATION_VALUE)
}

#[derive(Debug, Serialize)]
pub struct AnnotationsReport {
    pub name: String,
    pub annotations: BTreeMap<String, String>,
}

impl Report for AnnotationsReport {
    fn report(&self) {
        println!("meta");
        println!("{}", pretty(&self.annotations));
    }
}

impl AnnotationsCommand {
    pub async fn run<T: Transport + Clone>(self, environment: &Environment<T>) -> EyreResult<()> {
        let output = environment.output;
        let deployments = environment.client(ResourceKind::DEPLOYMENT, &self.namespace);

        output.write(&InfoLine("Creating deployment..."));
        let created = deployments
            .create(&annotated())
            .await
            .wrap_err("failed to create deployment")?;
        output.write(&InfoLine(&format!("Created deployment {:?}", created.name())));

        let fetched = deployments
            .get(DEPLOYMENT_NAME)
            .await
            .wrap_err("failed to read deployment")?;
        output.write(&AnnotationsReport {
            name: fetched.metadata.name,
            annotations: fetched.metadata.annotations,
        });

        output.write(&InfoLine("Deleting deployment..."));
        deployments
            .delete(DEPLOYMENT_NAME, PropagationPolicy::Foreground)
            .await
            .wrap_err("failed to delete deployment")?;
        output.write(&InfoLine(&format!("Deleted deployment {DEPLOYMENT_NAME:?}")));

        Ok(())
    }
}
