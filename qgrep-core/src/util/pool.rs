//! Reusable buffer pool for the hot chunk-scan path. Buffers no
//! larger than `block_size` recycle on drop; oversize requests bypass the
//! pool entirely.

use std::sync::{Arc, Mutex};

struct Inner {
    block_size: usize,
    free: Mutex<Vec<Vec<u8>>>,
}

#[derive(Clone)]
pub struct BlockPool {
    inner: Arc<Inner>,
}

impl BlockPool {
    pub fn new(block_size: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                block_size,
                free: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Checks out a buffer of at least `len` capacity, zero-filled to `len`.
    pub fn acquire(&self, len: usize) -> PooledBuf {
        let mut buf = if len <= self.inner.block_size {
            let mut free = self.inner.free.lock().unwrap();
            free.pop().unwrap_or_default()
        } else {
            Vec::new()
        };
        buf.clear();
        buf.resize(len, 0);
        PooledBuf {
            buf: Some(buf),
            pool: self.inner.clone(),
        }
    }
}

/// Scoped buffer that returns to its pool on drop, unless it outgrew
/// `block_size` (bypasses recycling).
pub struct PooledBuf {
    buf: Option<Vec<u8>>,
    pool: Arc<Inner>,
}

impl PooledBuf {
    pub fn as_slice(&self) -> &[u8] {
        self.buf.as_deref().unwrap()
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        self.buf.as_deref_mut().unwrap()
    }

    /// Takes ownership of the underlying buffer, bypassing recycling. For
    /// buffers that must outlive the pooled scope, e.g. a chunk forwarded
    /// verbatim into a new store.
    pub fn into_vec(mut self) -> Vec<u8> {
        self.buf.take().unwrap()
    }
}

impl Drop for PooledBuf {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            if buf.capacity() <= self.pool.block_size {
                let mut free = self.pool.free.lock().unwrap();
                free.push(buf);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recycles_in_budget_buffers() {
        let pool = BlockPool::new(4096);
        {
            let buf = pool.acquire(1024);
            assert_eq!(buf.as_slice().len(), 1024);
        }
        assert_eq!(pool.inner.free.lock().unwrap().len(), 1);
    }

    #[test]
    fn oversize_bypasses_pool() {
        let pool = BlockPool::new(16);
        {
            let _buf = pool.acquire(1024);
        }
        assert_eq!(pool.inner.free.lock().unwrap().len(), 0);
    }

    #[test]
    fn into_vec_skips_recycling() {
        let pool = BlockPool::new(4096);
        let buf = pool.acquire(1024);
        let owned = buf.into_vec();
        assert_eq!(owned.len(), 1024);
        assert_eq!(pool.inner.free.lock().unwrap().len(), 0);
    }
}
