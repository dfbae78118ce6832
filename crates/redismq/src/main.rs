//! redismq binary entry point.
//!
//! Usage:
//!   redismq --stream <key> consume [--idle-ms <ms>] [--max-attempts <n>] ...
//!   redismq --stream <key> publish <payload>...

use async_trait::async_trait;
use clap::{Args, Parser, Subcommand};
use redismq::{
    Consumer, ConsumerConfig, HandlerContext, Message, MessageHandler, RedisMqResult, RedisStore,
    StreamStore,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// redismq: reliable Redis Streams consumer.
#[derive(Parser, Debug)]
#[command(name = "redismq")]
#[command(about = "At-least-once Redis Streams consumer with idle reclaim and bounded retry")]
struct Cli {
    /// Redis connection URL.
    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    redis_url: String,

    /// Stream key.
    #[arg(long, env = "REDISMQ_STREAM")]
    stream: String,

    /// Stream entry field holding the payload.
    #[arg(long, default_value = redismq::config::DEFAULT_PAYLOAD_FIELD)]
    payload_field: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Also append JSON logs to this file.
    #[arg(long)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Consume the stream, logging every message.
    Consume(ConsumeArgs),
    /// Append payloads to the stream.
    Publish {
        /// Payloads to append, one entry each.
        #[arg(required = true)]
        payloads: Vec<String>,
    },
}

#[derive(Args, Debug)]
struct ConsumeArgs {
    /// Consumer group name.
    #[arg(long, default_value = redismq::config::DEFAULT_GROUP)]
    group: String,

    /// Consumer name. Defaults to a random unique name.
    #[arg(long)]
    consumer: Option<String>,

    /// Maximum messages per round.
    #[arg(long, default_value = "100")]
    batch_size: usize,

    /// Reclaim entries idle longer than this (ms). 0 disables reclaim.
    #[arg(long, default_value = "0")]
    idle_ms: u64,

    /// Give up on a message once it has been delivered this many times.
    #[arg(long, default_value = "3")]
    max_attempts: u64,

    /// How long each read blocks waiting for new entries (ms).
    #[arg(long, default_value = "100")]
    block_ms: u64,

    /// Number of concurrent handler workers.
    #[arg(long, default_value = "16")]
    workers: usize,

    /// Per-message handler deadline (ms).
    #[arg(long, default_value = "30000")]
    handler_timeout_ms: u64,

    /// Fail payloads starting with this prefix, to exercise the retry path.
    #[arg(long)]
    fail_prefix: Option<String>,
}

/// Logs every message; optionally fails some of them.
struct LogHandler {
    fail_prefix: Option<String>,
}

#[async_trait]
impl MessageHandler for LogHandler {
    async fn process(&self, _ctx: &HandlerContext, message: &Message) -> anyhow::Result<()> {
        if let Some(prefix) = &self.fail_prefix {
            if message.payload.starts_with(prefix.as_str()) {
                anyhow::bail!("payload matches fail prefix {:?}", prefix);
            }
        }

        info!(
            message_id = %message.id,
            delivery_count = message.delivery_count,
            payload = %message.payload,
            "Processed message"
        );
        Ok(())
    }

    async fn give_up(&self, _ctx: &HandlerContext, message: &Message) {
        warn!(
            message_id = %message.id,
            delivery_count = message.delivery_count,
            payload = %message.payload,
            "Gave up on message"
        );
    }
}

fn consumer_config(stream: &str, args: &ConsumeArgs) -> ConsumerConfig {
    let mut config = ConsumerConfig::new(stream)
        .with_group(args.group.as_str())
        .with_batch_size(args.batch_size)
        .with_idle_threshold(Duration::from_millis(args.idle_ms))
        .with_max_delivery_attempts(args.max_attempts)
        .with_block_timeout(Duration::from_millis(args.block_ms))
        .with_max_concurrent_handlers(args.workers)
        .with_handler_timeout(Duration::from_millis(args.handler_timeout_ms));

    if let Some(consumer) = &args.consumer {
        config = config.with_consumer_name(consumer.as_str());
    }
    config
}

async fn consume(
    store: Arc<RedisStore>,
    config: ConsumerConfig,
    fail_prefix: Option<String>,
) -> RedisMqResult<()> {
    info!(
        stream = %config.stream,
        group = %config.group_name,
        consumer = %config.consumer_name,
        idle_threshold_ms = config.idle_threshold.as_millis() as u64,
        max_delivery_attempts = config.max_delivery_attempts,
        "Configuration loaded"
    );

    let consumer = Consumer::new(store, Arc::new(LogHandler { fail_prefix }), config)?;
    let shutdown = CancellationToken::new();

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal, stopping...");
            signal_token.cancel();
        }
    });

    if let Err(e) = consumer.run(shutdown).await {
        error!(error = %e, "Consumer exited with error");
        return Err(e);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> RedisMqResult<()> {
    let cli = Cli::parse();

    observability::init_with_config(observability::LogConfig {
        service_name: "redismq".into(),
        default_level: cli.log_level.clone(),
        log_path: cli.log_file.clone(),
        also_stderr: true,
    })?;

    info!("redismq starting...");

    let store = Arc::new(RedisStore::connect(&cli.redis_url, cli.payload_field.as_str()).await?);

    match cli.command {
        Command::Consume(args) => {
            let config = consumer_config(&cli.stream, &args);
            consume(store, config, args.fail_prefix).await
        }
        Command::Publish { payloads } => {
            for payload in payloads {
                let id = store.append(&cli.stream, &payload).await?;
                info!(stream = %cli.stream, message_id = %id, "Published message");
            }
            Ok(())
        }
    }
}
