//! Deferred, chunked arrays
//!
//! A [`LazyArray`] is a shape plus a list of chunks along one axis. Each chunk
//! is a closure that produces its block of values when asked. Operations such
//! as [`LazyArray::map_chunks`] and [`LazyArray::index_axis`] only compose new
//! closures; values are produced by [`LazyArray::compute`].

use crate::config::ComputeConfig;
use crate::errors::{Result, UmRegridError};
use ndarray::{concatenate, ArrayD, ArrayViewD, Axis, Slice};
use rayon::prelude::*;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Closure producing one chunk of a deferred array
pub type ChunkFn = Arc<dyn Fn() -> Result<ArrayD<f64>> + Send + Sync>;

/// One block of a [`LazyArray`] along its chunk axis
#[derive(Clone)]
pub struct LazyChunk {
    len: usize,
    compute: ChunkFn,
}

impl LazyChunk {
    pub fn new<F>(len: usize, compute: F) -> Self
    where
        F: Fn() -> Result<ArrayD<f64>> + Send + Sync + 'static,
    {
        Self {
            len,
            compute: Arc::new(compute),
        }
    }

    /// Extent of this chunk along the chunk axis
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn compute(&self) -> Result<ArrayD<f64>> {
        (self.compute)()
    }
}

/// A chunk computed at most once while slices of it are still pending
struct SharedChunk {
    chunk: LazyChunk,
    state: Mutex<SharedState>,
}

struct SharedState {
    block: Option<Arc<ArrayD<f64>>>,
    pending: usize,
}

impl SharedChunk {
    fn new(chunk: LazyChunk) -> Self {
        let pending = chunk.len();
        Self {
            chunk,
            state: Mutex::new(SharedState { block: None, pending }),
        }
    }

    fn get(&self) -> Result<Arc<ArrayD<f64>>> {
        if let Some(block) = self.lock()?.block.as_ref() {
            return Ok(Arc::clone(block));
        }
        // Not held while computing: chunk closures may run rayon work
        let block = Arc::new(self.chunk.compute()?);
        let mut state = self.lock()?;
        if state.pending > 0 && state.block.is_none() {
            state.block = Some(Arc::clone(&block));
        }
        Ok(block)
    }

    fn release(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.pending = state.pending.saturating_sub(1);
            if state.pending == 0 {
                state.block = None;
            }
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, SharedState>> {
        self.state
            .lock()
            .map_err(|_| UmRegridError::Generic("Shared chunk lock poisoned".to_string()))
    }
}

/// A deferred N-dimensional array split into chunks along one axis
#[derive(Clone)]
pub struct LazyArray {
    shape: Vec<usize>,
    chunk_axis: usize,
    chunks: Vec<LazyChunk>,
}

impl fmt::Debug for LazyArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyArray")
            .field("shape", &self.shape)
            .field("chunk_axis", &self.chunk_axis)
            .field("chunks", &self.chunk_lens())
            .finish()
    }
}

impl LazyArray {
    /// Assemble a lazy array from chunks whose lengths tile `shape[chunk_axis]`
    pub fn from_chunks(shape: Vec<usize>, chunk_axis: usize, chunks: Vec<LazyChunk>) -> Result<Self> {
        if shape.is_empty() {
            if chunks.len() != 1 {
                return Err(UmRegridError::Generic(
                    "A 0-dimensional lazy array needs exactly one chunk".to_string(),
                ));
            }
            return Ok(Self {
                shape,
                chunk_axis: 0,
                chunks,
            });
        }

        if chunk_axis >= shape.len() {
            return Err(UmRegridError::Generic(format!(
                "Chunk axis {chunk_axis} is out of bounds for shape {shape:?}"
            )));
        }

        let total: usize = chunks.iter().map(LazyChunk::len).sum();
        if total != shape[chunk_axis] {
            return Err(UmRegridError::Generic(format!(
                "Chunks cover {total} elements along axis {chunk_axis}, shape {shape:?} needs {}",
                shape[chunk_axis]
            )));
        }

        Ok(Self {
            shape,
            chunk_axis,
            chunks,
        })
    }

    /// Wrap an in-memory array, splitting it into chunks of `chunk_len` along `chunk_axis`
    pub fn from_array(array: ArrayD<f64>, chunk_axis: usize, chunk_len: usize) -> Result<Self> {
        Self::from_shared(Arc::new(array), chunk_axis, chunk_len)
    }

    /// Like [`LazyArray::from_array`] but shares the array instead of moving it
    ///
    /// Each chunk copies only its own block when computed.
    pub fn from_shared(array: Arc<ArrayD<f64>>, chunk_axis: usize, chunk_len: usize) -> Result<Self> {
        let shape = array.shape().to_vec();

        if shape.is_empty() {
            let chunk = LazyChunk::new(1, move || Ok(array.as_ref().clone()));
            return Self::from_chunks(shape, 0, vec![chunk]);
        }

        if chunk_len == 0 {
            return Err(UmRegridError::Generic("Chunk length must be positive".to_string()));
        }
        if chunk_axis >= shape.len() {
            return Err(UmRegridError::Generic(format!(
                "Chunk axis {chunk_axis} is out of bounds for shape {shape:?}"
            )));
        }

        let axis_len = shape[chunk_axis];
        let mut chunks = Vec::new();
        let mut start = 0;
        while start < axis_len {
            let end = (start + chunk_len).min(axis_len);
            let source = Arc::clone(&array);
            chunks.push(LazyChunk::new(end - start, move || {
                Ok(source
                    .slice_axis(Axis(chunk_axis), Slice::from(start..end))
                    .to_owned())
            }));
            start = end;
        }

        Self::from_chunks(shape, chunk_axis, chunks)
    }

    /// A lazy array of zeros, mostly useful as a placeholder
    pub fn zeros(shape: Vec<usize>, chunk_axis: usize, chunk_len: usize) -> Result<Self> {
        let mut chunks = Vec::new();
        let axis_len = shape.get(chunk_axis).copied().unwrap_or(1);
        let step = chunk_len.max(1);
        let mut start = 0;
        while start < axis_len {
            let len = step.min(axis_len - start);
            let mut chunk_shape = shape.clone();
            if !chunk_shape.is_empty() {
                chunk_shape[chunk_axis] = len;
            }
            chunks.push(LazyChunk::new(len, move || Ok(ArrayD::zeros(chunk_shape.clone()))));
            start += len;
        }
        Self::from_chunks(shape, chunk_axis, chunks)
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn chunk_axis(&self) -> usize {
        self.chunk_axis
    }

    pub fn num_chunks(&self) -> usize {
        self.chunks.len()
    }

    pub fn chunk_lens(&self) -> Vec<usize> {
        self.chunks.iter().map(LazyChunk::len).collect()
    }

    pub fn chunks(&self) -> &[LazyChunk] {
        &self.chunks
    }

    fn chunk_shape(&self, len: usize) -> Vec<usize> {
        let mut shape = self.shape.clone();
        if !shape.is_empty() {
            shape[self.chunk_axis] = len;
        }
        shape
    }

    /// Apply `f` to every chunk, producing a new lazy array
    ///
    /// `f` must keep the chunk's extent along the chunk axis, which ends up at
    /// `out_chunk_axis` of `out_shape`.
    pub fn map_chunks<F>(&self, out_shape: Vec<usize>, out_chunk_axis: usize, f: F) -> Result<Self>
    where
        F: Fn(ArrayD<f64>) -> Result<ArrayD<f64>> + Send + Sync + 'static,
    {
        if out_shape.get(out_chunk_axis).copied() != self.shape.get(self.chunk_axis).copied() {
            return Err(UmRegridError::Generic(format!(
                "Chunk axis {} of {:?} cannot map onto axis {} of {:?}",
                self.chunk_axis, self.shape, out_chunk_axis, out_shape
            )));
        }

        let f = Arc::new(f);
        let chunks = self
            .chunks
            .iter()
            .map(|chunk| {
                let upstream = chunk.clone();
                let f = Arc::clone(&f);
                LazyChunk::new(chunk.len(), move || f(upstream.compute()?))
            })
            .collect();

        Self::from_chunks(out_shape, out_chunk_axis, chunks)
    }

    /// Apply `f` to the whole array at once, still deferred
    ///
    /// The result is a single chunk spanning `out_shape[out_chunk_axis]`.
    pub fn map_whole<F>(&self, out_shape: Vec<usize>, out_chunk_axis: usize, f: F) -> Result<Self>
    where
        F: Fn(ArrayD<f64>) -> Result<ArrayD<f64>> + Send + Sync + 'static,
    {
        let upstream = self.clone();
        let len = out_shape.get(out_chunk_axis).copied().unwrap_or(1);
        let chunk = LazyChunk::new(len, move || f(upstream.compute()?));
        Self::from_chunks(out_shape, out_chunk_axis, vec![chunk])
    }

    /// Select one index along `axis`, dropping that axis
    pub fn index_axis(&self, axis: usize, index: usize) -> Result<Self> {
        if axis >= self.ndim() || index >= self.shape[axis] {
            return Err(UmRegridError::Generic(format!(
                "Index {index} along axis {axis} is out of bounds for shape {:?}",
                self.shape
            )));
        }

        let mut out_shape = self.shape.clone();
        out_shape.remove(axis);

        if axis == self.chunk_axis {
            let (chunk, local) = self.locate(index);
            let upstream = chunk.clone();
            let len = out_shape.first().copied().unwrap_or(1);
            let selected = LazyChunk::new(len, move || {
                Ok(upstream.compute()?.index_axis(Axis(axis), local).to_owned())
            });
            return Self::from_chunks(out_shape, 0, vec![selected]);
        }

        let out_chunk_axis = if axis < self.chunk_axis {
            self.chunk_axis - 1
        } else {
            self.chunk_axis
        };
        let chunks = self
            .chunks
            .iter()
            .map(|chunk| {
                let upstream = chunk.clone();
                LazyChunk::new(chunk.len(), move || {
                    Ok(upstream.compute()?.index_axis(Axis(axis), index).to_owned())
                })
            })
            .collect();
        Self::from_chunks(out_shape, out_chunk_axis, chunks)
    }

    /// Split along `axis` into one lazy array per index, dropping that axis
    ///
    /// Along the chunk axis, slices cut from the same chunk share it: the chunk
    /// is computed once, kept until each of its slices has been taken, then
    /// released. Along any other axis this is [`LazyArray::index_axis`] per index.
    pub fn unstack(&self, axis: usize) -> Result<Vec<Self>> {
        if axis >= self.ndim() {
            return Err(UmRegridError::Generic(format!(
                "Axis {axis} is out of bounds for shape {:?}",
                self.shape
            )));
        }
        if axis != self.chunk_axis {
            return (0..self.shape[axis]).map(|i| self.index_axis(axis, i)).collect();
        }

        let mut out_shape = self.shape.clone();
        out_shape.remove(axis);
        let len = out_shape.first().copied().unwrap_or(1);

        let mut slices = Vec::with_capacity(self.shape[axis]);
        for chunk in &self.chunks {
            let shared = Arc::new(SharedChunk::new(chunk.clone()));
            for local in 0..chunk.len() {
                let shared = Arc::clone(&shared);
                let selected = LazyChunk::new(len, move || {
                    let block = shared.get()?;
                    let slice = block.index_axis(Axis(axis), local).to_owned();
                    shared.release();
                    Ok(slice)
                });
                slices.push(Self::from_chunks(out_shape.clone(), 0, vec![selected])?);
            }
        }
        Ok(slices)
    }

    fn locate(&self, index: usize) -> (&LazyChunk, usize) {
        let mut start = 0;
        for chunk in &self.chunks {
            if index < start + chunk.len() {
                return (chunk, index - start);
            }
            start += chunk.len();
        }
        // index_axis checks bounds before calling
        let last = &self.chunks[self.chunks.len() - 1];
        (last, last.len().saturating_sub(1))
    }

    /// Collapse all chunks into one, without computing anything
    pub fn rechunk_single(&self) -> Result<Self> {
        let upstream = self.clone();
        let len = self.shape.get(self.chunk_axis).copied().unwrap_or(1);
        let chunk = LazyChunk::new(len, move || upstream.compute());
        Self::from_chunks(self.shape.clone(), self.chunk_axis, vec![chunk])
    }

    /// Materialize all chunks on the current rayon pool and join them
    pub fn compute(&self) -> Result<ArrayD<f64>> {
        debug!(shape = ?self.shape, chunks = self.chunks.len(), "materializing lazy array");

        let mut blocks: Vec<ArrayD<f64>> = self
            .chunks
            .par_iter()
            .map(|chunk| {
                let block = chunk.compute()?;
                let expected = self.chunk_shape(chunk.len());
                if block.shape() != expected.as_slice() {
                    return Err(UmRegridError::Generic(format!(
                        "Chunk produced shape {:?}, expected {:?}",
                        block.shape(),
                        expected
                    )));
                }
                Ok(block)
            })
            .collect::<Result<_>>()?;

        if blocks.len() <= 1 {
            return Ok(blocks
                .pop()
                .unwrap_or_else(|| ArrayD::zeros(self.shape.clone())));
        }

        let views: Vec<ArrayViewD<f64>> = blocks.iter().map(|b| b.view()).collect();
        Ok(concatenate(Axis(self.chunk_axis), &views)?)
    }

    /// Materialize on a dedicated pool built from `config`
    pub fn compute_with(&self, config: &ComputeConfig) -> Result<ArrayD<f64>> {
        let pool = config.build_pool()?;
        pool.install(|| self.compute())
    }
}
