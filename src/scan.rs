use std::sync::{Arc, OnceLock};
use tokio::task::JoinSet;
use tracing::{debug, debug_span, instrument, warn, Instrument};

use crate::dynamodb::{Attributes, Item};
use crate::error::{MapError, Result};
use crate::store::ConditionalStore;

/// Pagination state of one scan worker.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanCursor {
    segment: i32,
    total_segments: i32,
    exclusive_start_key: Option<Attributes>,
}

impl ScanCursor {
    pub fn new(segment: i32, total_segments: i32) -> Self {
        Self {
            segment,
            total_segments,
            exclusive_start_key: None,
        }
    }

    /// `(segment, total_segments)` to send, or `None` for an unsegmented scan.
    pub fn segment(&self) -> Option<(i32, i32)> {
        (self.total_segments > 1).then_some((self.segment, self.total_segments))
    }

    pub fn exclusive_start_key(&self) -> Option<&Attributes> {
        self.exclusive_start_key.as_ref()
    }

    /// Moves past a fetched page. Returns false when there are no more pages.
    pub fn advance(&mut self, last_evaluated_key: Option<Attributes>) -> bool {
        self.exclusive_start_key = last_evaluated_key;
        self.exclusive_start_key.is_some()
    }
}

/// Why a parallel scan stopped before every segment was exhausted.
#[derive(Debug)]
enum StopCause {
    EarlyStop,
    Failed(MapError),
}

/// Cancellation signal shared by scan workers. Only the first trigger is kept.
#[derive(Debug, Default)]
struct ScanControl {
    cause: OnceLock<StopCause>,
}

impl ScanControl {
    fn trigger(&self, cause: StopCause) {
        if let Err(StopCause::Failed(e)) = self.cause.set(cause) {
            warn!(error = %e, "discarding scan error after the scan was already stopped");
        }
    }

    fn is_triggered(&self) -> bool {
        self.cause.get().is_some()
    }

    fn into_result(self) -> Result<()> {
        match self.cause.into_inner() {
            None | Some(StopCause::EarlyStop) => Ok(()),
            Some(StopCause::Failed(e)) => Err(e),
        }
    }
}

enum SegmentEnd {
    Exhausted,
    /// The consumer asked to stop.
    Stopped,
    /// Another worker stopped the scan.
    Cancelled,
}

/// Full-table enumeration, serial or fanned out over parallel segments.
///
/// With a fan-out of N > 1, worker `i` scans segment `i` of N. Workers check the shared stop
/// signal before each page fetch and never abandon a page halfway, so each worker delivers at
/// most one more page after the scan is stopped. A consumer returning `false` ends the scan
/// successfully; the first error ends it with that error.
#[derive(Clone)]
pub struct ParallelScanner {
    store: ConditionalStore,
}

impl ParallelScanner {
    pub fn new(store: ConditionalStore) -> Self {
        Self { store }
    }

    pub fn concurrency(&self) -> usize {
        self.store.options().scan_concurrency
    }

    /// Feeds every item of the table to `consumer` until it returns `Ok(false)` or an error.
    ///
    /// With parallel workers the consumer is called from several tasks at once.
    #[instrument(skip_all, fields(table = %self.store.table_name(), workers = self.concurrency()))]
    pub async fn range_items<F>(&self, consumer: F) -> Result<()>
    where
        F: Fn(Item) -> Result<bool> + Send + Sync + 'static,
    {
        let workers = self.concurrency();
        if workers <= 1 {
            let mut cursor = ScanCursor::new(0, 1);
            scan_segment(&self.store, &mut cursor, &consumer, None).await?;
            return Ok(());
        }
        let workers = i32::try_from(workers).map_err(|_| {
            MapError::InvalidConfig(format!("scan concurrency {workers} is too large"))
        })?;
        self.range_parallel(workers, Arc::new(consumer)).await
    }

    async fn range_parallel<F>(&self, workers: i32, consumer: Arc<F>) -> Result<()>
    where
        F: Fn(Item) -> Result<bool> + Send + Sync + 'static,
    {
        let control = Arc::new(ScanControl::default());
        let mut tasks = JoinSet::new();

        for segment in 0..workers {
            let store = self.store.clone();
            let consumer = Arc::clone(&consumer);
            let control = Arc::clone(&control);
            let worker = async move {
                let mut cursor = ScanCursor::new(segment, workers);
                match scan_segment(&store, &mut cursor, consumer.as_ref(), Some(&control)).await {
                    Ok(SegmentEnd::Stopped) => debug!("consumer stopped the scan"),
                    Ok(SegmentEnd::Cancelled) => debug!("scan worker cancelled"),
                    Ok(SegmentEnd::Exhausted) => debug!("scan worker done"),
                    Err(e) => {
                        debug!(error = %e, "scan worker failed");
                        control.trigger(StopCause::Failed(e));
                    }
                }
            };
            tasks.spawn(worker.instrument(debug_span!("scan_worker", segment)));
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                control.trigger(StopCause::Failed(MapError::Fatal(format!(
                    "scan worker did not finish: {e}"
                ))));
            }
        }

        Arc::into_inner(control)
            .ok_or_else(|| MapError::Fatal("scan signal still shared after workers finished".into()))?
            .into_result()
    }
}

/// The page loop shared by serial scans and parallel workers.
async fn scan_segment<F>(
    store: &ConditionalStore,
    cursor: &mut ScanCursor,
    consumer: &F,
    control: Option<&ScanControl>,
) -> Result<SegmentEnd>
where
    F: Fn(Item) -> Result<bool> + ?Sized,
{
    loop {
        if control.is_some_and(ScanControl::is_triggered) {
            return Ok(SegmentEnd::Cancelled);
        }
        let page = store.fetch_page(cursor).await?;
        debug!(
            items = page.items.len(),
            more = page.last_evaluated_key.is_some(),
            "scan page"
        );
        for item in page.items {
            if !consumer(item)? {
                if let Some(control) = control {
                    control.trigger(StopCause::EarlyStop);
                }
                return Ok(SegmentEnd::Stopped);
            }
        }
        if !cursor.advance(page.last_evaluated_key) {
            return Ok(SegmentEnd::Exhausted);
        }
    }
}
