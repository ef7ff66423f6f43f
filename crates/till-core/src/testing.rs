//! Test fixtures shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::domain::{
    ItemId, ProcessingError, ProcessingEvent, ProcessingResult, QueueItem, UserInputKind,
};
use crate::ports::QueueProcessor;
use crate::processor::{BaseProcessor, ProcessorContext, ProcessorHandler};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum TestKind {
    A,
    B,
    C,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TestEvent {
    Started,
    Canceled,
    Step(String),
}

impl ProcessingEvent for TestEvent {
    fn started() -> Self {
        TestEvent::Started
    }

    fn canceled() -> Self {
        TestEvent::Canceled
    }

    fn is_started(&self) -> bool {
        matches!(self, TestEvent::Started)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TestItem {
    pub(crate) id: ItemId,
    pub(crate) label: String,
    pub(crate) kind: TestKind,
    pub(crate) amount: u64,
}

impl TestItem {
    pub(crate) fn new(label: &str, kind: TestKind) -> Self {
        Self {
            id: ItemId::generate(),
            label: label.to_string(),
            kind,
            amount: 0,
        }
    }

    pub(crate) fn with_amount(mut self, amount: u64) -> Self {
        self.amount = amount;
        self
    }
}

impl QueueItem for TestItem {
    type ProcessorType = TestKind;
    type Success = String;
    type Event = TestEvent;

    fn id(&self) -> ItemId {
        self.id
    }

    fn processor_type(&self) -> TestKind {
        self.kind
    }
}

/// What the scripted processor does for one dispatch.
#[derive(Debug, Clone)]
pub(crate) enum Step {
    Succeed,
    Fail(ProcessingError),
    Panic,
    /// Ask the operator a yes/no question without a timeout.
    Ask,
    /// Emit `Step("blocked")`, then wait until aborted.
    Block,
    /// Never finish, even when aborted.
    Hang,
}

/// Per-label script plus a record of what happened.
#[derive(Default)]
pub(crate) struct Script {
    steps: Mutex<HashMap<String, VecDeque<Step>>>,
    dispatched: Mutex<Vec<String>>,
    aborts: AtomicUsize,
    abort_signal: Notify,
}

impl Script {
    /// Queue `step` for the next dispatch of `label`. Unscripted dispatches succeed.
    pub(crate) fn push(&self, label: &str, step: Step) {
        let mut steps = self.steps.lock().unwrap();
        steps.entry(label.to_string()).or_default().push_back(step);
    }

    /// Labels in dispatch order.
    pub(crate) fn dispatched(&self) -> Vec<String> {
        self.dispatched.lock().unwrap().clone()
    }

    pub(crate) fn aborts(&self) -> usize {
        self.aborts.load(Ordering::SeqCst)
    }

    fn next(&self, label: &str) -> Step {
        self.dispatched.lock().unwrap().push(label.to_string());
        let mut steps = self.steps.lock().unwrap();
        steps
            .get_mut(label)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Step::Succeed)
    }
}

struct ScriptedHandler {
    script: Arc<Script>,
}

#[async_trait]
impl ProcessorHandler<TestItem> for ScriptedHandler {
    async fn process_item(
        &self,
        item: &TestItem,
        ctx: &ProcessorContext<TestEvent>,
    ) -> ProcessingResult<String> {
        match self.script.next(&item.label) {
            Step::Succeed => Ok(format!("ok-{}", item.label)),
            Step::Fail(error) => Err(error),
            Step::Panic => panic!("scripted panic for {}", item.label),
            Step::Ask => {
                ctx.emit(TestEvent::Step("asking".into()));
                let answer = ctx
                    .request_user_input_with_timeout(
                        UserInputKind::ConfirmCustomerReceiptPrinting,
                        None,
                    )
                    .await;
                match answer.as_bool() {
                    Some(true) => Ok(format!("ok-{}", item.label)),
                    _ => Err(ProcessingError::OperationCanceled),
                }
            }
            Step::Block => {
                // registered before the event goes out, so no abort is missed
                let aborted = self.script.abort_signal.notified();
                ctx.emit(TestEvent::Step("blocked".into()));
                aborted.await;
                Err(ProcessingError::OperationCanceled)
            }
            Step::Hang => std::future::pending().await,
        }
    }

    async fn on_abort(&self, _item: Option<&TestItem>) -> bool {
        self.script.aborts.fetch_add(1, Ordering::SeqCst);
        self.script.abort_signal.notify_waiters();
        true
    }
}

/// A processor driven by a [`Script`].
pub(crate) fn scripted() -> (Arc<dyn QueueProcessor<TestItem>>, Arc<Script>) {
    let script = Arc::new(Script::default());
    let processor = BaseProcessor::new(ScriptedHandler {
        script: Arc::clone(&script),
    });
    (processor.into_shared(), script)
}
