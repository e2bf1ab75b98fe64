//! Free lists for stream buffers and one-shot codec contexts.
//!
//! Both pools hand out RAII guards. Dropping a guard is the release: the
//! buffer is truncated, the context reset, and either goes back on the list.

use std::fmt;
use std::ops::{Deref, DerefMut};

use crossbeam::queue::SegQueue;
use zstd::zstd_safe::{CCtx, DCtx, ResetDirective};

use crate::zstd::{
    cstream_in_size, cstream_out_size, dstream_in_size, dstream_out_size, reset_cctx, reset_dctx,
};

/// What a pooled buffer is used for, which decides its minimum capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferRole {
    CompressIn,
    CompressOut,
    DecompressIn,
    DecompressOut,
}

impl BufferRole {
    pub fn min_capacity(self) -> usize {
        match self {
            BufferRole::CompressIn => cstream_in_size(),
            BufferRole::CompressOut => cstream_out_size(),
            BufferRole::DecompressIn => dstream_in_size(),
            BufferRole::DecompressOut => dstream_out_size(),
        }
    }

    /// The shared pool for this role.
    pub fn pool(self) -> &'static BufferPool {
        static POOLS: [BufferPool; 4] = [
            BufferPool::new(BufferRole::CompressIn),
            BufferPool::new(BufferRole::CompressOut),
            BufferPool::new(BufferRole::DecompressIn),
            BufferPool::new(BufferRole::DecompressOut),
        ];
        &POOLS[self as usize]
    }
}

pub struct BufferPool {
    role: BufferRole,
    free: SegQueue<Vec<u8>>,
}

impl BufferPool {
    pub const fn new(role: BufferRole) -> Self {
        Self {
            role,
            free: SegQueue::new(),
        }
    }

    /// Returns an empty buffer with at least the role's minimum capacity.
    pub fn acquire(&'static self) -> PooledBuf {
        let buf = match self.free.pop() {
            Some(buf) => buf,
            None => {
                let capacity = self.role.min_capacity();
                tracing::trace!(role = ?self.role, capacity, "allocating stream buffer");
                Vec::with_capacity(capacity)
            }
        };
        debug_assert!(buf.is_empty());
        PooledBuf { buf, pool: self }
    }

    /// Like [`acquire`](Self::acquire), with the length set to the full
    /// (zeroed) capacity. Streams track their own offsets into it.
    pub fn acquire_filled(&'static self) -> PooledBuf {
        let mut buf = self.acquire();
        let capacity = buf.capacity();
        buf.resize(capacity, 0);
        buf
    }

    /// Makes `buf` available to the next [`acquire`](Self::acquire).
    pub fn release(&self, mut buf: Vec<u8>) {
        buf.clear();
        if buf.capacity() < self.role.min_capacity() {
            return;
        }
        self.free.push(buf);
    }

    /// Number of buffers waiting for reuse.
    pub fn idle(&self) -> usize {
        self.free.len()
    }
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("role", &self.role)
            .field("idle", &self.idle())
            .finish()
    }
}

/// A buffer checked out of a [`BufferPool`].
pub struct PooledBuf {
    buf: Vec<u8>,
    pool: &'static BufferPool,
}

impl Deref for PooledBuf {
    type Target = Vec<u8>;

    fn deref(&self) -> &Vec<u8> {
        &self.buf
    }
}

impl DerefMut for PooledBuf {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        &mut self.buf
    }
}

impl Drop for PooledBuf {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.buf));
    }
}

impl fmt::Debug for PooledBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBuf")
            .field("role", &self.pool.role)
            .field("len", &self.buf.len())
            .field("capacity", &self.buf.capacity())
            .finish()
    }
}

/// Native codec state that can be recycled.
pub trait Context: Send + 'static {
    fn create() -> Self;

    /// Brings the context back to its freshly created state.
    ///
    /// Panics if the codec refuses, which only happens on a broken context.
    fn reset(&mut self);
}

impl Context for CCtx<'static> {
    fn create() -> Self {
        CCtx::create()
    }

    fn reset(&mut self) {
        if let Err(code) = reset_cctx(self, ResetDirective::SessionAndParameters) {
            panic!("BUG: cannot reset compression context: {code}");
        }
    }
}

impl Context for DCtx<'static> {
    fn create() -> Self {
        DCtx::create()
    }

    fn reset(&mut self) {
        if let Err(code) = reset_dctx(self, ResetDirective::SessionAndParameters) {
            panic!("BUG: cannot reset decompression context: {code}");
        }
    }
}

/// Whether a context is used together with a prepared dictionary.
///
/// Dictionary and plain operations draw from separate pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    Plain,
    Dict,
}

pub struct ContextPool<T> {
    free: SegQueue<T>,
}

impl<T: Context> ContextPool<T> {
    pub const fn new() -> Self {
        Self {
            free: SegQueue::new(),
        }
    }

    /// Returns a recycled context, or a new one when the pool is empty.
    pub fn acquire(&self) -> PooledContext<'_, T> {
        let ctx = self.free.pop().unwrap_or_else(|| {
            tracing::trace!(context = std::any::type_name::<T>(), "creating codec context");
            T::create()
        });
        PooledContext {
            ctx: Some(ctx),
            pool: self,
        }
    }

    /// Resets `ctx` and keeps it for the next [`acquire`](Self::acquire).
    pub fn release(&self, mut ctx: T) {
        ctx.reset();
        self.free.push(ctx);
    }

    /// Number of contexts waiting for reuse.
    pub fn idle(&self) -> usize {
        self.free.len()
    }
}

impl<T: Context> Default for ContextPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for ContextPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextPool")
            .field("idle", &self.free.len())
            .finish()
    }
}

/// The shared pool of one-shot compression contexts of the given kind.
pub fn compress_contexts(kind: ContextKind) -> &'static ContextPool<CCtx<'static>> {
    static PLAIN: ContextPool<CCtx<'static>> = ContextPool::new();
    static DICT: ContextPool<CCtx<'static>> = ContextPool::new();
    match kind {
        ContextKind::Plain => &PLAIN,
        ContextKind::Dict => &DICT,
    }
}

/// The shared pool of one-shot decompression contexts of the given kind.
pub fn decompress_contexts(kind: ContextKind) -> &'static ContextPool<DCtx<'static>> {
    static PLAIN: ContextPool<DCtx<'static>> = ContextPool::new();
    static DICT: ContextPool<DCtx<'static>> = ContextPool::new();
    match kind {
        ContextKind::Plain => &PLAIN,
        ContextKind::Dict => &DICT,
    }
}

/// A context checked out of a [`ContextPool`].
pub struct PooledContext<'p, T: Context> {
    ctx: Option<T>,
    pool: &'p ContextPool<T>,
}

impl<T: Context> Deref for PooledContext<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.ctx.as_ref().expect("context is present until drop")
    }
}

impl<T: Context> DerefMut for PooledContext<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.ctx.as_mut().expect("context is present until drop")
    }
}

impl<T: Context> Drop for PooledContext<'_, T> {
    fn drop(&mut self) {
        if let Some(ctx) = self.ctx.take() {
            self.pool.release(ctx);
        }
    }
}
