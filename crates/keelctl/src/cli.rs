use core::time::Duration;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use comfy_table::{Cell, Color, Table};
use const_format::concatcp;
use eyre::{Report as EyreReport, Result as EyreResult};
use keel_client::{ClientError, HttpTransport, ResourceClient, ResourceKind, Transport};
use keel_config::{
    ConfigError, ConnectionConfig, DEFAULT_CLUSTER_NAME, DEFAULT_CONTEXT_NAME,
    DEFAULT_IDENTITY_NAME,
};
use keel_retry::{ConflictRetry, PolicyError, RetryPolicy, UpdateError};
use serde::{Serialize, Serializer};
use thiserror::Error as ThisError;
use tracing::debug;

use crate::output::{Format, Output, Report};

mod annotations;
mod config;
pub mod deployments;
mod endpoints;
mod pods;

use annotations::AnnotationsCommand;
use config::ConfigCommand;
use deployments::DeploymentsCommand;
use endpoints::EndpointsCommand;
use pods::PodsCommand;

const RETRY_JITTER: Duration = Duration::from_millis(1);

pub const EXAMPLES: &str = r"
  # Count pods and look one of them up
  $ keelctl -m https://10.0.0.1:6443 -t $TOKEN pods --pod example-xxxxx

  # Walk a deployment through create, update and delete
  $ keelctl -m https://10.0.0.1:6443 -t $TOKEN deployments

  # Show the resolved connection without contacting the cluster
  $ keelctl -m https://10.0.0.1:6443 -t $TOKEN config
";

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
#[command(after_help = concatcp!(
    "Environment variables:\n",
    "  KEEL_MASTER    URL of the API server\n",
    "  KEEL_TOKEN     Bearer token to authenticate with\n\n",
    "Examples:",
    EXAMPLES
))]
pub struct RootCommand {
    #[command(flatten)]
    pub args: RootArgs,

    #[command(subcommand)]
    pub action: SubCommands,
}

#[derive(Debug, Subcommand)]
pub enum SubCommands {
    Pods(PodsCommand),
    Deployments(DeploymentsCommand),
    Annotations(AnnotationsCommand),
    Endpoints(EndpointsCommand),
    Config(ConfigCommand),
}

#[derive(Debug, Parser)]
pub struct RootArgs {
    /// URL of the API server, e.g. http://1.2.3.4:6443
    #[arg(long, short, value_name = "URL", env = "KEEL_MASTER", global = true)]
    pub master: Option<String>,

    /// Non-empty bearer token to authenticate with
    #[arg(long, short, value_name = "TOKEN", global = true)]
    #[arg(env = "KEEL_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Identity name the token belongs to
    #[arg(long, short, value_name = "NAME", default_value = DEFAULT_IDENTITY_NAME, global = true)]
    pub user: String,

    /// Name of the cluster
    #[arg(long, value_name = "NAME", default_value = DEFAULT_CLUSTER_NAME, global = true)]
    pub cluster: String,

    /// Context to use
    #[arg(long, value_name = "NAME", default_value = DEFAULT_CONTEXT_NAME, global = true)]
    pub ctx: String,

    /// Verify the API server's certificate
    #[arg(long, global = true)]
    pub verify_tls: bool,

    /// Maximum update attempts when a write conflicts
    #[arg(long, value_name = "N", default_value_t = 5, global = true)]
    pub retry_attempts: u32,

    /// Wait after the first conflict
    #[arg(long, value_name = "MS", default_value_t = 10, global = true)]
    pub retry_backoff_ms: u64,

    /// Growth of the wait after each further conflict
    #[arg(long, value_name = "FACTOR", default_value_t = 1.0, global = true)]
    pub retry_factor: f64,

    /// Give up on a conflicting update after this long
    #[arg(long, value_name = "MS", global = true)]
    pub deadline_ms: Option<u64>,

    #[arg(long, value_name = "FORMAT", default_value_t, value_enum, global = true)]
    pub output_format: Format,
}

impl RootArgs {
    pub fn connection_config(&self) -> Result<ConnectionConfig, ConfigError> {
        ConnectionConfig::builder(
            self.master.clone().unwrap_or_default(),
            self.token.clone().unwrap_or_default(),
        )
        .cluster_name(&self.cluster)
        .context_name(&self.ctx)
        .identity_name(&self.user)
        .verify_tls(self.verify_tls)
        .build()
    }

    pub fn retry_policy(&self) -> Result<RetryPolicy, PolicyError> {
        Ok(RetryPolicy::new(
            self.retry_attempts,
            Duration::from_millis(self.retry_backoff_ms),
            self.retry_factor,
        )?
        .with_jitter(RETRY_JITTER))
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }
}

#[derive(Debug)]
pub struct Environment<T> {
    pub output: Output,
    config: ConnectionConfig,
    transport: T,
    policy: RetryPolicy,
    deadline: Option<Duration>,
}

impl<T: Transport + Clone> Environment<T> {
    pub const fn new(
        output: Output,
        config: ConnectionConfig,
        transport: T,
        policy: RetryPolicy,
        deadline: Option<Duration>,
    ) -> Self {
        Self {
            output,
            config,
            transport,
            policy,
            deadline,
        }
    }

    pub const fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn client(&self, kind: ResourceKind, namespace: &str) -> ResourceClient<T> {
        ResourceClient::namespaced(self.transport.clone(), kind, namespace)
    }

    pub fn cluster_wide(&self, kind: ResourceKind) -> ResourceClient<T> {
        ResourceClient::all(self.transport.clone(), kind)
    }

    /// Conflict-retried update of `name`, paced by the command-line policy.
    pub fn update<'a>(&self, client: &'a ResourceClient<T>, name: &'a str) -> ConflictRetry<'a, T> {
        let update = ConflictRetry::new(client, name).policy(self.policy);
        match self.deadline {
            Some(timeout) => update.timeout(timeout),
            None => update,
        }
    }
}

impl RootCommand {
    pub async fn run(self) -> Result<(), CliError> {
        self.run_with(HttpTransport::new).await
    }

    /// Runs the command over the transport `connect` builds from the
    /// resolved connection. Malformed input is reported before `connect`
    /// is called.
    pub async fn run_with<T, F>(self, connect: F) -> Result<(), CliError>
    where
        T: Transport + Clone,
        F: FnOnce(&ConnectionConfig) -> Result<T, ClientError>,
    {
        let output = Output::new(self.args.output_format);

        if let Err(err) = self.dispatch(output, connect).await {
            let err = CliError::classify(err);
            output.write(&err);
            return Err(err);
        }

        Ok(())
    }

    async fn dispatch<T, F>(self, output: Output, connect: F) -> EyreResult<()>
    where
        T: Transport + Clone,
        F: FnOnce(&ConnectionConfig) -> Result<T, ClientError>,
    {
        let config = self.args.connection_config()?;
        let policy = self.args.retry_policy()?;
        let transport = connect(&config)?;

        debug!(
            server = %config.server(),
            context = %config.current_context().name,
            tls = ?config.tls(),
            "connection resolved"
        );

        let environment = Environment::new(output, config, transport, policy, self.args.deadline());

        match self.action {
            SubCommands::Pods(pods) => pods.run(&environment).await,
            SubCommands::Deployments(deployments) => deployments.run(&environment).await,
            SubCommands::Annotations(annotations) => annotations.run(&environment).await,
            SubCommands::Endpoints(endpoints) => endpoints.run(&environment).await,
            SubCommands::Config(_) => ConfigCommand::run(&environment),
        }
    }
}

#[derive(Debug, Serialize, ThisError)]
pub enum CliError {
    /// The input was rejected before or by the store, and retrying it
    /// unchanged cannot succeed.
    #[error(transparent)]
    Validation(#[serde(serialize_with = "serialize_eyre_report")] EyreReport),

    #[error(transparent)]
    Other(#[serde(serialize_with = "serialize_eyre_report")] EyreReport),
}

impl CliError {
    pub(crate) fn classify(report: EyreReport) -> Self {
        let invalid = report.chain().any(|cause| {
            cause.is::<ConfigError>()
                || cause.is::<PolicyError>()
                || cause
                    .downcast_ref::<ClientError>()
                    .is_some_and(ClientError::is_validation)
                || cause.downcast_ref::<UpdateError>().is_some_and(
                    |err| matches!(err, UpdateError::Client(inner) if inner.is_validation()),
                )
        });

        if invalid {
            Self::Validation(report)
        } else {
            Self::Other(report)
        }
    }
}

impl From<CliError> for ExitCode {
    fn from(error: CliError) -> Self {
        match error {
            CliError::Validation(_) => Self::from(2),
            CliError::Other(_) => Self::FAILURE,
        }
    }
}

impl Report for CliError {
    fn report(&self) {
        let mut table = Table::new();
        let _ = table.set_header(vec![Cell::new("ERROR").fg(Color::Red)]);
        let _ = table.add_row(vec![match self {
            Self::Validation(e) => format!("Invalid input: {e:?}"),
            Self::Other(e) => format!("Error: {e:?}"),
        }]);
        println!("{table}");
    }
}

fn serialize_eyre_report<S>(report: &EyreReport, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_seq(report.chain().map(ToString::to_string))
}
