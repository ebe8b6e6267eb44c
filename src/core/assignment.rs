//! Producer/consumer pairing for one fleet operation.
//!
//! A [`WorkAssignmentLoop`] is a single task that owns all pairing state.
//! Workers talk to it only through an [`AssignmentChannel`], so every pairing
//! decision is made one event at a time.
//!
//! - A consumer request is paired with the idle producer holding the most
//!   supply, or queued FIFO if none is idle.
//! - A producer announcement is paired with the longest-waiting consumer, or
//!   the producer joins the idle pool.
//! - A completion notice is relayed to the producer as a [`TransferReceipt`].
//!
//! When the operation's [`CancelSignal`] fires the loop ends and every
//! in-flight call resolves to `OperationShutdown`.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::AssignmentConfig;
use crate::core::{CancelSignal, CoordinationError, CoordinationResult, Spawn};

/// Producer handed to a consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerAssignment {
    /// Paired producer.
    pub producer_id: String,
    /// Producer's supply level when it announced itself.
    pub supply: u32,
}

/// Consumer handed to a producer, with the slot its receipt arrives on.
#[derive(Debug)]
pub struct ProducerAssignment {
    /// Paired consumer.
    pub consumer_id: String,
    receipt: oneshot::Receiver<TransferReceipt>,
}

impl ProducerAssignment {
    /// Wait until the consumer reports the exchange finished.
    ///
    /// Returns `None` if the consumer went away before pairing completed or
    /// the operation shut down.
    pub async fn receipt(self) -> Option<TransferReceipt> {
        self.receipt.await.ok()
    }
}

/// Confirmation that a consumer received a producer's cargo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    /// Consumer that received the cargo.
    pub consumer_id: String,
    /// Producer that supplied it.
    pub producer_id: String,
    /// Running count of transfers in this operation, starting at 1.
    pub transfer_number: u64,
}

/// A consumer asking for a producer.
#[derive(Debug)]
pub struct ConsumerRequest {
    /// Requesting consumer.
    pub consumer_id: String,
    reply: oneshot::Sender<ConsumerAssignment>,
}

/// A producer announcing it is ready to hand over cargo.
#[derive(Debug)]
pub struct ProducerAvailability {
    /// Announcing producer.
    pub producer_id: String,
    /// Producer's last known supply level.
    pub supply: u32,
    reply: oneshot::Sender<ProducerAssignment>,
}

/// A consumer reporting a finished exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferCompletion {
    /// Consumer that received the cargo.
    pub consumer_id: String,
    /// Producer that supplied it.
    pub producer_id: String,
}

/// One message consumed by the loop.
#[derive(Debug)]
pub enum AssignmentEvent {
    /// Consumer request.
    Request(ConsumerRequest),
    /// Producer availability.
    Availability(ProducerAvailability),
    /// Exchange completion.
    Completion(TransferCompletion),
}

/// Counters reported when a loop ends.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentStats {
    /// Consumer/producer pairs formed.
    pub pairings: u64,
    /// Completions relayed.
    pub transfers: u64,
    /// Requests or announcements dropped because the caller went away.
    pub skipped: u64,
    /// Consumers still queued at shutdown.
    pub queued_consumers: usize,
    /// Producers still idle at shutdown.
    pub idle_producers: usize,
}

/// Signaling surface used by workers; the transport behind it is swappable.
#[async_trait]
pub trait AssignmentChannel: Send + Sync {
    /// Ask for a producer and wait until one is paired.
    ///
    /// # Errors
    ///
    /// Returns `OperationShutdown` if the operation ends first.
    async fn request_producer(&self, consumer_id: &str) -> CoordinationResult<ConsumerAssignment>;

    /// Announce readiness with the current supply level and wait for a
    /// consumer.
    ///
    /// # Errors
    ///
    /// Returns `OperationShutdown` if the operation ends first.
    async fn announce_available(&self, producer_id: &str, supply: u32) -> CoordinationResult<ProducerAssignment>;

    /// Report that the consumer received the producer's cargo.
    ///
    /// # Errors
    ///
    /// Returns `OperationShutdown` if the loop is no longer running.
    async fn report_completion(&self, consumer_id: &str, producer_id: &str) -> CoordinationResult<()>;
}

/// Message-passing [`AssignmentChannel`] backed by bounded `mpsc` channels.
#[derive(Debug, Clone)]
pub struct AssignmentHandle {
    operation_id: String,
    requests: mpsc::Sender<ConsumerRequest>,
    availability: mpsc::Sender<ProducerAvailability>,
    completions: mpsc::Sender<TransferCompletion>,
    cancel: CancelSignal,
}

impl AssignmentHandle {
    /// Operation this handle talks to.
    #[must_use]
    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    async fn await_reply<T>(&self, rx: oneshot::Receiver<T>) -> CoordinationResult<T> {
        tokio::select! {
            reply = rx => reply.map_err(|_| CoordinationError::OperationShutdown),
            () = self.cancel.cancelled() => Err(CoordinationError::OperationShutdown),
        }
    }
}

#[async_trait]
impl AssignmentChannel for AssignmentHandle {
    async fn request_producer(&self, consumer_id: &str) -> CoordinationResult<ConsumerAssignment> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(ConsumerRequest {
                consumer_id: consumer_id.to_string(),
                reply,
            })
            .await
            .map_err(|_| CoordinationError::OperationShutdown)?;
        self.await_reply(rx).await
    }

    async fn announce_available(&self, producer_id: &str, supply: u32) -> CoordinationResult<ProducerAssignment> {
        let (reply, rx) = oneshot::channel();
        self.availability
            .send(ProducerAvailability {
                producer_id: producer_id.to_string(),
                supply,
                reply,
            })
            .await
            .map_err(|_| CoordinationError::OperationShutdown)?;
        self.await_reply(rx).await
    }

    async fn report_completion(&self, consumer_id: &str, producer_id: &str) -> CoordinationResult<()> {
        self.completions
            .send(TransferCompletion {
                consumer_id: consumer_id.to_string(),
                producer_id: producer_id.to_string(),
            })
            .await
            .map_err(|_| CoordinationError::OperationShutdown)
    }
}

struct WaitingConsumer {
    consumer_id: String,
    reply: oneshot::Sender<ConsumerAssignment>,
}

struct IdleProducer {
    producer_id: String,
    supply: u32,
    reply: oneshot::Sender<ProducerAssignment>,
}

/// Arbitration loop for one operation.
pub struct WorkAssignmentLoop {
    operation_id: String,
    requests: mpsc::Receiver<ConsumerRequest>,
    availability: mpsc::Receiver<ProducerAvailability>,
    completions: mpsc::Receiver<TransferCompletion>,
    cancel: CancelSignal,
    /// Idle producers in arrival order.
    producers: Vec<IdleProducer>,
    consumers: VecDeque<WaitingConsumer>,
    pending_receipts: HashMap<(String, String), oneshot::Sender<TransferReceipt>>,
    stats: AssignmentStats,
}

impl WorkAssignmentLoop {
    /// Create a loop and the handle workers use to reach it.
    #[must_use]
    pub fn channel(
        operation_id: impl Into<String>,
        config: &AssignmentConfig,
        cancel: CancelSignal,
    ) -> (AssignmentHandle, Self) {
        let operation_id = operation_id.into();
        let capacity = config.channel_capacity.max(1);
        let (requests_tx, requests) = mpsc::channel(capacity);
        let (availability_tx, availability) = mpsc::channel(capacity);
        let (completions_tx, completions) = mpsc::channel(capacity);

        let handle = AssignmentHandle {
            operation_id: operation_id.clone(),
            requests: requests_tx,
            availability: availability_tx,
            completions: completions_tx,
            cancel: cancel.clone(),
        };
        let event_loop = Self {
            operation_id,
            requests,
            availability,
            completions,
            cancel,
            producers: Vec::new(),
            consumers: VecDeque::new(),
            pending_receipts: HashMap::new(),
            stats: AssignmentStats::default(),
        };
        (handle, event_loop)
    }

    /// Run on a spawner; the returned receiver yields the final counters.
    pub fn spawn_on<S: Spawn>(self, spawner: &S) -> oneshot::Receiver<AssignmentStats> {
        let (tx, rx) = oneshot::channel();
        spawner.spawn(async move {
            let stats = self.run().await;
            let _ = tx.send(stats);
        });
        rx
    }

    /// Process events until the operation is cancelled or every handle is
    /// dropped.
    pub async fn run(mut self) -> AssignmentStats {
        info!(operation_id = %self.operation_id, "assignment loop started");
        loop {
            let event = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                Some(completion) = self.completions.recv() => AssignmentEvent::Completion(completion),
                Some(available) = self.availability.recv() => AssignmentEvent::Availability(available),
                Some(request) = self.requests.recv() => AssignmentEvent::Request(request),
                else => break,
            };
            self.handle_event(event);
        }

        self.stats.queued_consumers = self.consumers.len();
        self.stats.idle_producers = self.producers.len();
        self.consumers.clear();
        self.producers.clear();
        self.pending_receipts.clear();
        info!(
            operation_id = %self.operation_id,
            pairings = self.stats.pairings,
            transfers = self.stats.transfers,
            "assignment loop stopped"
        );
        self.stats
    }

    /// Apply one event to the pairing state.
    fn handle_event(&mut self, event: AssignmentEvent) {
        match event {
            AssignmentEvent::Request(request) => self.on_request(request),
            AssignmentEvent::Availability(available) => self.on_availability(available),
            AssignmentEvent::Completion(completion) => self.on_completion(completion),
        }
    }

    fn on_request(&mut self, request: ConsumerRequest) {
        let mut consumer = WaitingConsumer {
            consumer_id: request.consumer_id,
            reply: request.reply,
        };
        while let Some(producer) = self.take_best_producer() {
            match self.pair(consumer, producer) {
                Ok(()) => return,
                Err(Some(returned)) => consumer = returned,
                Err(None) => return,
            }
        }
        debug!(
            operation_id = %self.operation_id,
            consumer_id = %consumer.consumer_id,
            queued = self.consumers.len() + 1,
            "no idle producer, consumer queued"
        );
        self.consumers.push_back(consumer);
    }

    fn on_availability(&mut self, available: ProducerAvailability) {
        // A re-announcement replaces the producer's earlier idle entry.
        self.producers.retain(|p| p.producer_id != available.producer_id);
        let producer = IdleProducer {
            producer_id: available.producer_id,
            supply: available.supply,
            reply: available.reply,
        };
        while let Some(consumer) = self.consumers.pop_front() {
            if consumer.reply.is_closed() {
                self.stats.skipped += 1;
                continue;
            }
            if let Err(Some(returned)) = self.pair(consumer, producer) {
                // Producer went away; the consumer keeps its place.
                self.consumers.push_front(returned);
            }
            return;
        }
        if producer.reply.is_closed() {
            self.stats.skipped += 1;
            return;
        }
        debug!(
            operation_id = %self.operation_id,
            producer_id = %producer.producer_id,
            supply = producer.supply,
            "no waiting consumer, producer idle"
        );
        self.producers.push(producer);
    }

    fn on_completion(&mut self, completion: TransferCompletion) {
        let key = (completion.consumer_id, completion.producer_id);
        let Some(slot) = self.pending_receipts.remove(&key) else {
            warn!(
                operation_id = %self.operation_id,
                consumer_id = %key.0,
                producer_id = %key.1,
                "completion for unknown pairing"
            );
            return;
        };
        self.stats.transfers += 1;
        let (consumer_id, producer_id) = key;
        let _ = slot.send(TransferReceipt {
            consumer_id,
            producer_id,
            transfer_number: self.stats.transfers,
        });
    }

    /// Remove and return the idle producer with the highest supply; earlier
    /// arrivals win ties. Producers whose caller went away are discarded.
    fn take_best_producer(&mut self) -> Option<IdleProducer> {
        let before = self.producers.len();
        self.producers.retain(|p| !p.reply.is_closed());
        self.stats.skipped += (before - self.producers.len()) as u64;

        let mut best: Option<usize> = None;
        for (idx, producer) in self.producers.iter().enumerate() {
            if best.is_none_or(|b| producer.supply > self.producers[b].supply) {
                best = Some(idx);
            }
        }
        best.map(|idx| self.producers.remove(idx))
    }

    /// Deliver a pairing to both sides, producer first.
    ///
    /// On failure returns the side that is still usable: `Err(Some(consumer))`
    /// if the producer went away, `Err(None)` if the consumer did (the
    /// producer's receipt slot is dropped so it sees an abandoned exchange).
    fn pair(&mut self, consumer: WaitingConsumer, producer: IdleProducer) -> Result<(), Option<WaitingConsumer>> {
        let (receipt_tx, receipt_rx) = oneshot::channel();
        let assignment = ProducerAssignment {
            consumer_id: consumer.consumer_id.clone(),
            receipt: receipt_rx,
        };
        if producer.reply.send(assignment).is_err() {
            self.stats.skipped += 1;
            return Err(Some(consumer));
        }

        let reply = ConsumerAssignment {
            producer_id: producer.producer_id.clone(),
            supply: producer.supply,
        };
        if consumer.reply.send(reply).is_err() {
            self.stats.skipped += 1;
            debug!(
                operation_id = %self.operation_id,
                consumer_id = %consumer.consumer_id,
                "consumer left before pairing, producer released"
            );
            return Err(None);
        }

        self.stats.pairings += 1;
        info!(
            operation_id = %self.operation_id,
            consumer_id = %consumer.consumer_id,
            producer_id = %producer.producer_id,
            supply = producer.supply,
            "paired consumer with producer"
        );
        self.pending_receipts
            .insert((consumer.consumer_id, producer.producer_id), receipt_tx);
        Ok(())
    }
}
