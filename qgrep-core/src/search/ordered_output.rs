//! Ordered output aggregator, modeled on `orderedoutput.cpp`'s
//! `map<id, Chunk>` drained while `front == next`,
//! and ported the way `jafreck-lz4r`'s `WriteRegister`
//! (`io/compress_mt.rs`) reorders parallel compression output by a
//! monotonic id: a `BTreeMap` buffers out-of-order arrivals, and a
//! dedicated writer thread drains a bounded SPSC channel.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::thread::JoinHandle;

struct PendingState {
    next_to_emit: u64,
    buffered: BTreeMap<u64, Vec<u8>>,
}

pub struct OrderedOutput {
    state: Mutex<PendingState>,
    sink_tx: crossbeam_channel::Sender<Vec<u8>>,
    writer: Option<JoinHandle<()>>,
    lines_emitted: AtomicU64,
    /// 0 means unlimited.
    line_limit: u64,
}

impl OrderedOutput {
    pub fn new(mut sink: Box<dyn Write + Send>, line_limit: u64) -> Self {
        let (sink_tx, sink_rx) = crossbeam_channel::bounded::<Vec<u8>>(64);
        let writer = std::thread::spawn(move || {
            for buf in sink_rx {
                if sink.write_all(&buf).is_err() {
                    break;
                }
            }
            let _ = sink.flush();
        });
        Self {
            state: Mutex::new(PendingState {
                next_to_emit: 0,
                buffered: BTreeMap::new(),
            }),
            sink_tx,
            writer: Some(writer),
            lines_emitted: AtomicU64::new(0),
            line_limit,
        }
    }

    /// Submits a chunk's fully-scanned output buffer tagged by its
    /// monotonic `chunk_id`. Drains every already-complete run starting at
    /// `next_to_emit` in the same critical section.
    pub fn submit(&self, chunk_id: u64, buf: Vec<u8>) {
        let mut state = self.state.lock().unwrap();
        state.buffered.insert(chunk_id, buf);
        while let Some(buf) = state.buffered.remove(&state.next_to_emit) {
            if self.sink_tx.send(buf).is_err() {
                break;
            }
            state.next_to_emit += 1;
        }
    }

    /// Accounts `n` newly emitted lines toward the global limit.
    pub fn record_lines(&self, n: u64) {
        self.lines_emitted.fetch_add(n, Ordering::SeqCst);
    }

    pub fn lines_emitted(&self) -> u64 {
        self.lines_emitted.load(Ordering::SeqCst)
    }

    /// Cooperative cancellation point: once the limit is hit, the
    /// producer stops dispatching new chunks and workers may stop early.
    pub fn is_limit_reached(&self) -> bool {
        self.line_limit != 0 && self.lines_emitted() >= self.line_limit
    }

    pub fn remaining(&self) -> u64 {
        if self.line_limit == 0 {
            u64::MAX
        } else {
            self.line_limit.saturating_sub(self.lines_emitted())
        }
    }

    /// Closes the sink channel and joins the writer thread. Any chunks
    /// still buffered out of order at this point are dropped, which only
    /// happens if the producer exited early (e.g. on a fatal error).
    pub fn finish(self) {
        let OrderedOutput {
            sink_tx, writer, ..
        } = self;
        drop(sink_tx);
        if let Some(handle) = writer {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex as StdMutex};

    #[derive(Clone, Default)]
    struct VecSink(Arc<StdMutex<Vec<u8>>>);

    impl Write for VecSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn drains_out_of_order_submissions_in_chunk_order() {
        let sink = VecSink::default();
        let captured = sink.0.clone();
        let output = OrderedOutput::new(Box::new(sink), 0);

        output.submit(2, b"c".to_vec());
        output.submit(0, b"a".to_vec());
        output.submit(1, b"b".to_vec());
        output.finish();

        assert_eq!(&*captured.lock().unwrap(), b"abc");
    }

    #[test]
    fn limit_tracking() {
        let sink = VecSink::default();
        let output = OrderedOutput::new(Box::new(sink), 5);
        output.record_lines(3);
        assert!(!output.is_limit_reached());
        output.record_lines(2);
        assert!(output.is_limit_reached());
        output.finish();
    }
}
