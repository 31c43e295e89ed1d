use clap::Parser;
use eyre::{Result as EyreResult, WrapErr};
use keel_client::{
    ListParams, PropagationPolicy, Resource, ResourceKind, Transport, DEFAULT_NAMESPACE,
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::cli::Environment;
use crate::output::{table, InfoLine, Report};

pub const DEPLOYMENT_NAME: &str = "hello-world";
pub const INITIAL_IMAGE: &str = "nginx:1.19.3-alpine";
pub const UPDATED_IMAGE: &str = "nginx:1.19.2-alpine";

#[derive(Debug, Parser)]
#[command(about = "Create, list, update and delete a demo deployment")]
pub struct DeploymentsCommand {
    /// Namespace to run the demo in
    #[arg(long, short, value_name = "NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,
}

/// Deployment of a single `hello-world` container.
pub fn hello_world(replicas: u32, container: Value) -> Resource {
    Resource::new(&ResourceKind::DEPLOYMENT, DEPLOYMENT_NAME).with_spec(json!({
        "replicas": replicas,
        "selector": { "matchLabels": { "app": DEPLOYMENT_NAME } },
        "template": {
            "metadata": { "labels": { "app": DEPLOYMENT_NAME } },
            "spec": { "containers": [container] },
        },
    }))
}

fn nginx() -> Resource {
    hello_world(
        2,
        json!({
            "name": DEPLOYMENT_NAME,
            "image": INITIAL_IMAGE,
            "ports": [{ "name": "http", "protocol": "TCP", "containerPort": 80 }],
        }),
    )
}

/// Drops to one replica and rolls the first container back a patch release.
pub fn scale_down(mut deployment: Resource) -> Resource {
    if let Some(spec) = deployment.spec.as_object_mut() {
        let _ = spec.insert("replicas".to_owned(), json!(1));
    }

    if let Some(image) = deployment
        .spec
        .pointer_mut("/template/spec/containers/0/image")
    {
        *image = json!(UPDATED_IMAGE);
    }

    deployment
}

#[derive(Debug, Serialize)]
pub struct DeploymentRow {
    pub name: String,
    pub replicas: Option<u64>,
    pub image: Option<String>,
    pub version: Option<String>,
}

impl From<&Resource> for DeploymentRow {
    fn from(deployment: &Resource) -> Self {
        Self {
            name: deployment.name().to_owned(),
            replicas: deployment.spec.get("replicas").and_then(Value::as_u64),
            image: deployment
                .spec
                .pointer("/template/spec/containers/0/image")
                .and_then(Value::as_str)
                .map(str::to_owned),
            version: deployment.version().map(|v| v.as_str().to_owned()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeploymentList {
    pub namespace: String,
    pub deployments: Vec<DeploymentRow>,
}

impl DeploymentList {
    fn new(namespace: &str, deployments: &[Resource]) -> Self {
        Self {
            namespace: namespace.to_owned(),
            deployments: deployments.iter().map(DeploymentRow::from).collect(),
        }
    }
}

impl Report for DeploymentList {
    fn report(&self) {
        let mut table = table(["NAME", "REPLICAS", "IMAGE", "VERSION"]);
        for row in &self.deployments {
            let _ = table.add_row(vec![
                row.name.clone(),
                row.replicas.map_or_else(|| "-".to_owned(), |r| r.to_string()),
                row.image.clone().unwrap_or_else(|| "-".to_owned()),
                row.version.clone().unwrap_or_else(|| "-".to_owned()),
            ]);
        }
        println!("Deployments in namespace {}:", self.namespace);
        println!("{table}");
    }
}

impl DeploymentsCommand {
    pub async fn run<T: Transport + Clone>(self, environment: &Environment<T>) -> EyreResult<()> {
        let output = environment.output;
        let deployments = environment.client(ResourceKind::DEPLOYMENT, &self.namespace);

        output.write(&InfoLine("Creating deployment..."));
        let created = deployments
            .create(&nginx())
            .await
            .wrap_err("failed to create deployment")?;
        output.write(&InfoLine(&format!("Created deployment {:?}", created.name())));

        let listed = deployments
            .list(&ListParams::default())
            .await
            .wrap_err("failed to list deployments")?;
        output.write(&DeploymentList::new(&self.namespace, &listed));

        output.write(&InfoLine("Updating deployment..."));
        let updated = environment
            .update(&deployments, DEPLOYMENT_NAME)
            .run(scale_down)
            .await
            .wrap_err("failed to update deployment")?;
        output.write(&InfoLine(&format!(
            "Updated deployment {:?} to version {}",
            updated.name(),
            updated.version().map_or("-", |v| v.as_str()),
        )));

        let listed = deployments
            .list(&ListParams::default())
            .await
            .wrap_err("failed to list deployments")?;
        output.write(&DeploymentList::new(&self.namespace, &listed));

        output.write(&InfoLine("Deleting deployment..."));
        deployments
            .delete(DEPLOYMENT_NAME, PropagationPolicy::Foreground)
            .await
            .wrap_err("failed to delete deployment")?;
        output.write(&InfoLine(&format!("Deleted deployment {DEPLOYMENT_NAME:?}")));

        Ok(())
    }
}
