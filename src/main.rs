mod error;
mod local_k8s;
mod reclaim;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use local_k8s::{ClusterConfig, KubeStore};
use reclaim::{ReclaimResult, Reclaimer};

/// Delete stale resources whose name matches a query from a namespace.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// API server URL; kubeconfig or in-cluster config is used when omitted
    #[arg(long, env = "OPENSHIFT_SERVER")]
    server: Option<String>,

    /// Bearer token for the API server
    #[arg(long, env = "OPENSHIFT_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Skip TLS certificate verification
    #[arg(long, env = "OPENSHIFT_INSECURE")]
    insecure_skip_tls_verify: bool,

    /// Namespace to clean
    #[arg(long, short, env = "CLEANER_NAMESPACE")]
    namespace: String,

    /// Resource kinds to clean (e.g. BuildConfig,ImageStream)
    #[arg(long = "kind", short, env = "CLEANER_KINDS", value_delimiter = ',', required = true)]
    kinds: Vec<String>,

    /// Resources older than this many days are removed
    #[arg(long, env = "CLEANER_INTERVAL_DAYS", default_value_t = 7)]
    interval_days: u64,

    /// Only names containing this text are considered
    #[arg(long, short, env = "CLEANER_QUERY", default_value = "")]
    query: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args)?;

    let config = ClusterConfig {
        server: args.server.clone(),
        token: args.token.clone(),
        accept_invalid_certs: args.insecure_skip_tls_verify,
    };
    let store = KubeStore::connect(&config).await?;
    let reclaimer = Reclaimer::new(store);

    let mut deleted = ReclaimResult::default();
    let mut failures = 0;
    for kind in &args.kinds {
        match reclaimer
            .reclaim(kind, &args.namespace, args.interval_days, &args.query)
            .await
        {
            Ok(result) => {
                info!(kind = %kind, namespace = %args.namespace, removed = result.len(), "clean pass done");
                deleted.append(result);
            }
            Err(e) => {
                error!(kind = %kind, namespace = %args.namespace, "clean pass failed: {}", e);
                failures += 1;
            }
        }
    }

    println!("{}", serde_json::to_string(&deleted)?);

    if failures > 0 {
        anyhow::bail!("{} of {} kinds could not be cleaned", failures, args.kinds.len());
    }

    Ok(())
}

fn init_logging(args: &Args) -> anyhow::Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive("hyper=warn".parse()?)
        .add_directive("tower=warn".parse()?)
        .add_directive("kube=info".parse()?);

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }

    Ok(())
}
