//! The analysis capture link: audio thread → analysis worker.
//!
//! Once per block the audio thread snapshots one channel's audio (or an
//! in-chain tap's audio) together with a reference to the signal bus and
//! the producer map at the capture point, and hands the record across a
//! bounded lock-free queue. Nothing is copied on the way over: the audio
//! slice storage comes from a fixed pool of blocks that rotates through the
//! link and back.
//!
//! On a full queue the *oldest* record is displaced (it is the stalest) and
//! its slice goes straight back to the pool; a drop counter is the only
//! trace. The audio thread never blocks.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_queue::ArrayQueue;

use crate::bus::SignalBus;
use crate::signal::ProducerMap;

/// Where a capture record was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureSource {
    /// The output pipeline's default capture (channel 0 post-chain).
    Output,
    /// An in-chain analysis tap claimed the block.
    PluginTap,
}

/// Pooled audio storage for one captured block.
///
/// Dereferences to the captured samples. Return it to the link's pool with
/// [`CaptureLink::recycle`] when done.
#[derive(Debug)]
pub struct AudioSlice {
    data: Box<[f32]>,
    len: usize,
}

impl AudioSlice {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0.0; capacity].into_boxed_slice(),
            len: 0,
        }
    }

    /// Copy a block into the slice (truncating to pool block size).
    pub fn fill_from(&mut self, samples: &[f32]) {
        let n = samples.len().min(self.data.len());
        self.data[..n].copy_from_slice(&samples[..n]);
        self.len = n;
    }

    /// The captured samples.
    #[inline]
    pub fn samples(&self) -> &[f32] {
        &self.data[..self.len]
    }
}

/// One record crossing the audio → analysis boundary.
#[derive(Debug)]
pub struct CaptureRecord {
    /// Latency-corrected time of the first captured sample.
    pub sample_time: i64,
    /// Output capture or in-chain tap capture.
    pub source: CaptureSource,
    /// Pooled audio storage.
    pub slice: AudioSlice,
    /// The bus this record's producer map refers to.
    pub bus: Arc<SignalBus>,
    /// Producer map snapshot at the capture point.
    pub producer_map: ProducerMap,
    /// Channel the audio came from.
    pub channel_id: usize,
}

/// Bounded lock-free capture queue with a rotating slice pool.
pub struct CaptureLink {
    queue: ArrayQueue<CaptureRecord>,
    pool: ArrayQueue<AudioSlice>,
    dropped: AtomicU64,
    starved: AtomicU64,
}

impl CaptureLink {
    /// Create a link holding up to `capacity` records of `block_size`
    /// samples each. The pool holds `capacity + 1` slices so the producer
    /// always has one in hand while the queue is full.
    pub fn new(capacity: usize, block_size: usize) -> Arc<Self> {
        let capacity = capacity.max(1);
        let pool = ArrayQueue::new(capacity + 1);
        for _ in 0..capacity + 1 {
            // Pool starts full; push cannot fail.
            let _ = pool.push(AudioSlice::with_capacity(block_size));
        }
        Arc::new(Self {
            queue: ArrayQueue::new(capacity),
            pool,
            dropped: AtomicU64::new(0),
            starved: AtomicU64::new(0),
        })
    }

    /// Take a slice from the pool. Audio thread.
    ///
    /// `None` means every slice is in flight *and* queued records have not
    /// been displaced yet; the caller skips this block's capture.
    pub fn acquire_slice(&self) -> Option<AudioSlice> {
        let slice = self.pool.pop();
        if slice.is_none() {
            self.starved.fetch_add(1, Ordering::Relaxed);
        }
        slice
    }

    /// Publish a record, displacing the oldest on overflow. Audio thread.
    pub fn publish(&self, record: CaptureRecord) {
        if let Some(displaced) = self.queue.force_push(record) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            // The displaced record is stale; only its storage matters now.
            let _ = self.pool.push(displaced.slice);
        }
    }

    /// Pop the next record in push order. Analysis thread.
    pub fn pop(&self) -> Option<CaptureRecord> {
        self.queue.pop()
    }

    /// Return a slice to the pool. Analysis thread.
    pub fn recycle(&self, slice: AudioSlice) {
        let _ = self.pool.push(slice);
    }

    /// Records displaced because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Captures skipped because no pool slice was available.
    pub fn starved(&self) -> u64 {
        self.starved.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::AnalysisSignal;

    fn record(link: &CaptureLink, bus: &Arc<SignalBus>, sample_time: i64) -> CaptureRecord {
        let mut slice = link.acquire_slice().unwrap();
        slice.fill_from(&[sample_time as f32; 8]);
        CaptureRecord {
            sample_time,
            source: CaptureSource::Output,
            slice,
            bus: Arc::clone(bus),
            producer_map: ProducerMap::empty(),
            channel_id: 0,
        }
    }

    #[test]
    fn records_arrive_in_push_order() {
        let link = CaptureLink::new(4, 8);
        let bus = Arc::new(SignalBus::new(0, 0, 8));
        for t in 0..3 {
            let rec = record(&link, &bus, t);
            link.publish(rec);
        }
        for t in 0..3 {
            let rec = link.pop().unwrap();
            assert_eq!(rec.sample_time, t);
            assert_eq!(rec.slice.samples()[0], t as f32);
            link.recycle(rec.slice);
        }
        assert!(link.pop().is_none());
        assert_eq!(link.dropped(), 0);
    }

    #[test]
    fn overflow_drops_oldest_and_keeps_order() {
        let link = CaptureLink::new(2, 8);
        let bus = Arc::new(SignalBus::new(0, 0, 8));
        for t in 0..3 {
            let rec = record(&link, &bus, t);
            link.publish(rec);
        }
        assert_eq!(link.dropped(), 1);

        // Oldest (t=0) was displaced; remaining order is preserved.
        let first = link.pop().unwrap();
        assert_eq!(first.sample_time, 1);
        let second = link.pop().unwrap();
        assert_eq!(second.sample_time, 2);
        link.recycle(first.slice);
        link.recycle(second.slice);
    }

    #[test]
    fn displaced_slices_return_to_pool() {
        let link = CaptureLink::new(2, 8);
        let bus = Arc::new(SignalBus::new(0, 0, 8));
        // Push far more records than capacity; the pool must never starve
        // because every displaced record recycles its slice.
        for t in 0..50 {
            let rec = record(&link, &bus, t);
            link.publish(rec);
        }
        assert_eq!(link.starved(), 0);
        assert_eq!(link.dropped(), 48);
    }

    #[test]
    fn pool_starves_when_consumer_hoards() {
        let link = CaptureLink::new(2, 8);
        let bus = Arc::new(SignalBus::new(0, 0, 8));
        let mut hoard = Vec::new();
        // Drain queue + pool without recycling.
        for t in 0..3 {
            let rec = record(&link, &bus, t);
            link.publish(rec);
            if let Some(r) = link.pop() {
                hoard.push(r);
            }
        }
        assert!(link.acquire_slice().is_none());
        assert!(link.starved() > 0);

        // Recycling restores capture.
        for r in hoard {
            link.recycle(r.slice);
        }
        assert!(link.acquire_slice().is_some());
    }

    #[test]
    fn record_carries_bus_generation() {
        let link = CaptureLink::new(2, 8);
        let bus = Arc::new(SignalBus::new(7, 1, 8));
        bus.write(0, AnalysisSignal::VoicingScore, 3, 0.5);
        let rec = record(&link, &bus, 3);
        assert_eq!(rec.bus.generation(), 7);
        assert_eq!(rec.bus.read(0, AnalysisSignal::VoicingScore, 3), 0.5);
    }
}
