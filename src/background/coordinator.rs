//! Upload coordination - accepts batches, fans measurement out over Tokio
//! tasks and fans the results back into one aggregator per batch.
//!
//! Each batch owns its own context (claimed slots, status, channel) in a
//! concurrent map, so batches submitted at the same time never share a
//! counter. The slot array itself lives only inside the aggregator task.

use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use log::{info, warn};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::background::flows::{compose_workflow, image_workflow};
use crate::background::processors::folder::{Paths, clean_name};
use crate::background::types::{
    Accepted, BatchId, BatchStatus, ImageOutcome, SlotUpdate, UploadBatch,
};
use crate::common::{FINISHED_BATCH_HISTORY, PHOTOSTRIP_FILE_NAME};
use crate::config::AppConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BatchError {
    #[error("batch contains no images")]
    EmptyBatch,
    #[error("image id {id} is outside the batch of {expected}")]
    SlotOutOfRange { id: usize, expected: usize },
    #[error("image id {id} was already submitted for this batch")]
    DuplicateSlot { id: usize },
    #[error("file name {name:?} is already used by another image in this batch")]
    DuplicateName { name: String },
    #[error("batch {0} has already been composed")]
    BatchClosed(BatchId),
    #[error("{limit} batches are already collecting images")]
    TooManyOpenBatches { limit: usize },
}

/// One accepted image: its slot and the name it is stored under.
type SlotClaim = (usize, String);

#[derive(Default)]
struct Claims {
    ids: HashSet<usize>,
    names: HashSet<String>,
}

struct BatchContext {
    expected: usize,
    claims: Mutex<Claims>,
    sender: mpsc::UnboundedSender<SlotUpdate>,
    status: watch::Sender<BatchStatus>,
}

impl BatchContext {
    /// Claim every slot and stored name, or none of them.
    fn claim_all(&self, slots: &[SlotClaim]) -> Result<(), BatchError> {
        let mut claims = self.claims.lock().unwrap_or_else(PoisonError::into_inner);
        for (id, name) in slots {
            if claims.ids.contains(id) {
                return Err(BatchError::DuplicateSlot { id: *id });
            }
            if claims.names.contains(name) {
                return Err(BatchError::DuplicateName { name: name.clone() });
            }
        }
        for (id, name) in slots {
            claims.ids.insert(*id);
            claims.names.insert(name.clone());
        }
        Ok(())
    }
}

pub struct UploadCoordinator {
    config: Arc<AppConfig>,
    paths: Arc<Paths>,
    runtime: Handle,
    batches: Arc<DashMap<BatchId, Arc<BatchContext>>>,
    finished: Arc<Mutex<VecDeque<BatchId>>>,
    /// Finished batches that dropped out of `finished`.
    closed: Arc<DashSet<BatchId>>,
    /// Batches whose aggregator is still collecting slots.
    open: Arc<AtomicUsize>,
}

impl UploadCoordinator {
    /// Background work is spawned onto `runtime`.
    pub fn new(config: AppConfig, paths: Paths, runtime: Handle) -> Self {
        Self {
            config: Arc::new(config),
            paths: Arc::new(paths),
            runtime,
            batches: Arc::new(DashMap::new()),
            finished: Arc::new(Mutex::new(VecDeque::new())),
            closed: Arc::new(DashSet::new()),
            open: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn paths(&self) -> &Paths {
        &self.paths
    }

    /// Accept (part of) a batch and start processing it in the background.
    ///
    /// Returns as soon as the images are validated; the photostrip is written
    /// once every slot of the batch has been delivered and measured.
    pub fn process_batch(&self, batch: UploadBatch) -> Result<Accepted, BatchError> {
        let expected = self.config.batch_size;
        let slots = validate_slots(&batch, expected)?;
        let batch_id = batch.batch_id.unwrap_or_else(Uuid::new_v4);

        let context = match self.batches.entry(batch_id) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                if self.closed.contains(&batch_id) {
                    return Err(BatchError::BatchClosed(batch_id));
                }
                self.reserve_open_slot()?;
                entry.insert(self.open_batch(batch_id)).clone()
            }
        };
        if context.status.borrow().is_finished() {
            return Err(BatchError::BatchClosed(batch_id));
        }
        context.claim_all(&slots)?;

        let accepted = batch.images.len();
        let thumbnail_size = self
            .config
            .use_thumbnail_sizes
            .then_some(self.config.thumbnail_size);
        for image in batch.images {
            let sender = context.sender.clone();
            let paths = self.paths.clone();
            self.runtime.spawn(async move {
                let update = image_workflow(image, paths, thumbnail_size).await;
                // the aggregator only goes away together with the coordinator
                let _ = sender.send(update);
            });
        }

        info!("Accepted {} image(s) for batch {}", accepted, batch_id);
        Ok(Accepted {
            filename: PHOTOSTRIP_FILE_NAME.to_string(),
            batch_id,
            accepted,
        })
    }

    pub fn subscribe(&self, batch_id: &BatchId) -> Option<watch::Receiver<BatchStatus>> {
        self.batches
            .get(batch_id)
            .map(|context| context.status.subscribe())
    }

    pub fn status(&self, batch_id: &BatchId) -> Option<BatchStatus> {
        self.batches
            .get(batch_id)
            .map(|context| context.status.borrow().clone())
    }

    /// Number of batches still waiting for slots.
    pub fn open_batches(&self) -> usize {
        self.open.load(Ordering::Acquire)
    }

    fn reserve_open_slot(&self) -> Result<(), BatchError> {
        let limit = self.config.max_open_batches;
        self.open
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |open| {
                (open < limit).then_some(open + 1)
            })
            .map(|_| ())
            .map_err(|_| {
                warn!("Refusing new batch: {} batches already collecting", limit);
                BatchError::TooManyOpenBatches { limit }
            })
    }

    fn open_batch(&self, batch_id: BatchId) -> Arc<BatchContext> {
        let expected = self.config.batch_size;
        let (sender, receiver) = mpsc::unbounded_channel();
        let (status, _) = watch::channel(BatchStatus::Collecting {
            completed: 0,
            expected,
        });
        let context = Arc::new(BatchContext {
            expected,
            claims: Mutex::new(Claims::default()),
            sender,
            status: status.clone(),
        });

        let config = self.config.clone();
        let paths = self.paths.clone();
        let batches = self.batches.clone();
        let finished = self.finished.clone();
        let closed = self.closed.clone();
        let open = self.open.clone();
        self.runtime.spawn(async move {
            let collected = collect_slots(receiver, expected, &status).await;
            open.fetch_sub(1, Ordering::AcqRel);
            let Some(outcomes) = collected else {
                return;
            };
            status.send_replace(BatchStatus::Composing);
            let result = compose_workflow(outcomes, config, paths).await;
            info!("Batch {} finished: {:?}", batch_id, result);
            status.send_replace(result);
            retire(&batches, &finished, &closed, batch_id);
        });

        info!("Opened batch {} expecting {} image(s)", batch_id, context.expected);
        context
    }
}

fn validate_slots(batch: &UploadBatch, expected: usize) -> Result<Vec<SlotClaim>, BatchError> {
    if batch.images.is_empty() {
        return Err(BatchError::EmptyBatch);
    }
    let mut seen_ids = HashSet::new();
    let mut seen_names = HashSet::new();
    batch
        .images
        .iter()
        .map(|image| {
            let name = clean_name(&image.file_name);
            if image.id >= expected {
                Err(BatchError::SlotOutOfRange {
                    id: image.id,
                    expected,
                })
            } else if !seen_ids.insert(image.id) {
                Err(BatchError::DuplicateSlot { id: image.id })
            } else if !seen_names.insert(name.clone()) {
                Err(BatchError::DuplicateName { name })
            } else {
                Ok((image.id, name))
            }
        })
        .collect()
}

/// Fill slots by id as updates arrive, in whatever order they finish.
///
/// Every update counts towards completion, failed or not. Returns the slots in
/// id order once all `expected` are filled, or `None` if the channel closes
/// first.
pub async fn collect_slots(
    mut receiver: mpsc::UnboundedReceiver<SlotUpdate>,
    expected: usize,
    status: &watch::Sender<BatchStatus>,
) -> Option<Vec<ImageOutcome>> {
    let mut slots: Vec<Option<ImageOutcome>> = vec![None; expected];
    let mut completed = 0;

    while let Some(SlotUpdate { id, outcome }) = receiver.recv().await {
        let Some(slot) = slots.get_mut(id) else {
            continue;
        };
        if slot.replace(outcome).is_none() {
            completed += 1;
        }
        status.send_replace(BatchStatus::Collecting {
            completed,
            expected,
        });
        if completed == expected {
            return slots.into_iter().collect();
        }
    }
    None
}

fn retire(
    batches: &DashMap<BatchId, Arc<BatchContext>>,
    finished: &Mutex<VecDeque<BatchId>>,
    closed: &DashSet<BatchId>,
    batch_id: BatchId,
) {
    let mut finished = finished.lock().unwrap_or_else(PoisonError::into_inner);
    finished.push_back(batch_id);
    while finished.len() > FINISHED_BATCH_HISTORY {
        if let Some(oldest) = finished.pop_front() {
            // tombstone before removal
            closed.insert(oldest);
            batches.remove(&oldest);
        }
    }
}
