use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use serde::Deserialize;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use till_core::app::{QueueBuilder, QueueConfig, QueueManager};
use till_core::domain::{
    ItemId, ProcessingState, ProcessorStartMode, QueueInputRequest, QueueInputResponse, RequestId,
    UserInputKind, UserInputRequest, UserInputResponse,
};
use till_core::domains::payment::{self, PaymentItem, PaymentMethod, PaymentProcessorType};

/// Runs a payment queue against the local processors with an automatic operator.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Queue configuration (JSON). Defaults apply to missing fields.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Payments to enqueue (JSON array of `{amount, method, processor_type}`).
    /// A built-in demo batch is used when omitted.
    #[arg(long)]
    items: Option<PathBuf>,

    /// Ask for confirmation before each payment.
    #[arg(long)]
    confirm: bool,

    /// Operator answer to a failed payment.
    #[arg(long, value_enum, default_value_t = OnError::Skip)]
    on_error: OnError,

    /// Failed attempts per payment before the operator drops it.
    #[arg(long, default_value_t = 2)]
    max_attempts: u32,

    /// PIX key the operator confirms for merchant PIX payments.
    #[arg(long, default_value = "caixa@till.example")]
    pix_key: String,

    /// Simulated hardware latency per processing step.
    #[arg(long, default_value_t = 200)]
    step_delay_ms: u64,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OnError {
    Retry,
    Skip,
    Abort,
    AbortAll,
}

#[derive(Debug, Deserialize)]
struct ItemEntry {
    amount: u64,
    method: PaymentMethod,
    processor_type: PaymentProcessorType,
}

fn demo_batch() -> Vec<PaymentItem> {
    vec![
        PaymentItem::new(2500, PaymentMethod::Cash, PaymentProcessorType::Cash),
        // at or below the cash minimum
        PaymentItem::new(800, PaymentMethod::Cash, PaymentProcessorType::Cash),
        PaymentItem::new(3990, PaymentMethod::MerchantPix, PaymentProcessorType::MerchantPix),
        PaymentItem::new(1500, PaymentMethod::Debit, PaymentProcessorType::Transactionless),
        // no acquirer integration in this build
        PaymentItem::new(4000, PaymentMethod::Credit, PaymentProcessorType::Acquirer),
    ]
}

fn load_items(path: &PathBuf) -> Result<Vec<PaymentItem>, Box<dyn std::error::Error>> {
    let entries: Vec<ItemEntry> = serde_json::from_str(&std::fs::read_to_string(path)?)?;
    Ok(entries
        .into_iter()
        .map(|entry| PaymentItem::new(entry.amount, entry.method, entry.processor_type))
        .collect())
}

/// Next value from a broadcast channel. Lagging drops the missed values and
/// keeps going; `None` once the channel closes.
async fn next<V: Clone>(rx: &mut broadcast::Receiver<V>) -> Option<V> {
    loop {
        match rx.recv().await {
            Ok(value) => return Some(value),
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "operator fell behind");
            }
            Err(RecvError::Closed) => return None,
        }
    }
}

fn error_answer(policy: OnError, request_id: RequestId) -> QueueInputResponse<PaymentItem> {
    match policy {
        OnError::Retry => QueueInputResponse::on_error_retry(request_id),
        OnError::Skip => QueueInputResponse::on_error_skip(request_id),
        OnError::Abort => QueueInputResponse::on_error_abort(request_id),
        OnError::AbortAll => QueueInputResponse::on_error_abort_all(request_id),
    }
}

/// Answers queue-level questions: confirm everything, resolve failures by policy.
async fn queue_operator(
    queue: QueueManager<PaymentItem>,
    mut requests: broadcast::Receiver<QueueInputRequest<PaymentItem>>,
    policy: OnError,
    max_attempts: u32,
) {
    let mut failures: HashMap<ItemId, u32> = HashMap::new();

    while let Some(request) = next(&mut requests).await {
        let answer = match &request {
            QueueInputRequest::ConfirmNextProcessor {
                current_index,
                total_items,
                item,
                ..
            } => {
                println!(
                    "confirm {current_index}/{total_items}: {:?} {} cents",
                    item.method, item.amount
                );
                QueueInputResponse::proceed(request.id())
            }
            QueueInputRequest::ErrorRetryOrSkip { item_id, error, .. } => {
                let attempts = failures.entry(*item_id).or_default();
                *attempts += 1;
                if *attempts >= max_attempts {
                    println!("giving up on {item_id} after {attempts} attempts ({error})");
                    QueueInputResponse::on_error_abort(request.id())
                } else {
                    error_answer(policy, request.id())
                }
            }
        };
        queue.provide_queue_input(answer);
    }
}

/// Answers processor questions the way a cashier at the counter would.
async fn user_operator(
    queue: QueueManager<PaymentItem>,
    mut requests: broadcast::Receiver<UserInputRequest>,
    pix_key: String,
) {
    while let Some(request) = next(&mut requests).await {
        let answer = match &request.kind {
            UserInputKind::ConfirmMerchantPixKey => {
                UserInputResponse::value(request.id, serde_json::json!(pix_key))
            }
            UserInputKind::MerchantPixScanning { pix_code } => {
                println!("customer scans {pix_code}");
                UserInputResponse::confirm(request.id, true)
            }
            other => {
                tracing::debug!(kind = ?other, "confirming");
                UserInputResponse::confirm(request.id, true)
            }
        };
        queue.provide_user_input(answer);
    }
}

fn describe(state: &ProcessingState<PaymentItem>) -> String {
    match state {
        ProcessingState::ItemDone { item, success } => format!(
            "done        {:?} {} cents -> {}",
            item.method, item.amount, success.transaction_id
        ),
        ProcessingState::ItemFailed { item, error } => {
            format!("failed      {:?} {} cents: {error}", item.method, item.amount)
        }
        other => match other.item() {
            Some(item) => format!("{:<11} {:?} {} cents", other.label(), item.method, item.amount),
            None => other.label().to_string(),
        },
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => QueueConfig::from_json_str(&std::fs::read_to_string(path)?)?,
        None => QueueConfig::default(),
    };
    if cli.confirm {
        config = config.with_start_mode(ProcessorStartMode::Confirmation);
    }

    let items = match &cli.items {
        Some(path) => load_items(path)?,
        None => demo_batch(),
    };

    let processor = payment::local_processor(Duration::from_millis(cli.step_delay_ms))?;
    let queue = QueueBuilder::new(Arc::new(processor)).config(config).build()?;

    // subscribe before anything can happen
    let mut transitions = queue.subscribe_transitions();
    let operators = [
        tokio::spawn(queue_operator(
            queue.clone(),
            queue.subscribe_queue_input_requests(),
            cli.on_error,
            cli.max_attempts,
        )),
        tokio::spawn(user_operator(
            queue.clone(),
            queue.subscribe_user_input_requests(),
            cli.pix_key.clone(),
        )),
    ];

    for item in items {
        queue.enqueue(item).await?;
    }
    queue.start_processing().await;

    while let Some(state) = next(&mut transitions).await {
        println!("{}", describe(&state));
        if state.is_terminal() || matches!(state, ProcessingState::Idle) {
            break;
        }
    }
    queue.wait_until_stopped().await;

    let counts = queue.counts();
    println!(
        "processed {} of {} payments, {} left in the queue",
        counts.full_size - counts.enqueued_size,
        counts.full_size,
        counts.enqueued_size
    );

    for operator in operators {
        operator.abort();
    }
    Ok(())
}
