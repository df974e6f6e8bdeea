use crate::{
    admission::{Admission, MUTATE_PATH, VALIDATE_PATH},
    ValidationMetrics,
};
use anyhow::{bail, Result};
use clap::Parser;
use prometheus_client::registry::Registry;
use tracing::info;

#[derive(Debug, Parser)]
#[clap(
    name = "prometheus-rules-admission",
    about = "Validating and mutating admission webhooks for PrometheusRule resources"
)]
pub struct Args {
    #[clap(
        long,
        default_value = "prometheus_rules_admission=info,warn",
        env = "PROMETHEUS_RULES_ADMISSION_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    server: kubert::ServerArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            admin,
            client,
            log_level,
            log_format,
            server,
        } = self;

        let mut prom = <Registry>::default();
        let metrics =
            ValidationMetrics::register(prom.sub_registry_with_prefix("prometheus_operator"));
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .with_server(server)
            .build()
            .await?;

        info!(validate = VALIDATE_PATH, mutate = MUTATE_PATH, "Serving admission webhooks");
        let runtime = runtime.spawn_server(Admission::new(metrics));

        // Block the main thread on the shutdown signal.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}
