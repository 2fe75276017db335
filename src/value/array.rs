//! N-dimensional arrays
//!
//! An `Array` is a dtype, a row-major shape and a raw little-endian buffer.
//! Slicing is planned as a list of contiguous byte runs so the same plan
//! serves in-memory slices and windowed reads from the container file.

use std::ops::Range;

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StashError};

use super::dtype::{DType, Element};

/// Dense n-dimensional array with row-major layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ArrayRepr", into = "ArrayRepr")]
pub struct Array {
    dtype: DType,
    shape: Vec<usize>,
    data: Bytes,
}

#[derive(Serialize, Deserialize)]
struct ArrayRepr {
    dtype: DType,
    shape: Vec<usize>,
    data: Bytes,
}

impl TryFrom<ArrayRepr> for Array {
    type Error = StashError;

    fn try_from(repr: ArrayRepr) -> Result<Self> {
        Array::from_raw(repr.dtype, repr.shape, repr.data)
    }
}

impl From<Array> for ArrayRepr {
    fn from(array: Array) -> Self {
        Self {
            dtype: array.dtype,
            shape: array.shape,
            data: array.data,
        }
    }
}

impl Array {
    /// One-dimensional array from a vector
    pub fn from_vec<T: Element>(values: Vec<T>) -> Self {
        let len = values.len();
        Self {
            dtype: T::DTYPE,
            shape: vec![len],
            data: encode_elements(&values),
        }
    }

    /// Array of the given shape from row-major values
    pub fn from_shape_vec<T: Element>(shape: impl Into<Vec<usize>>, values: Vec<T>) -> Result<Self> {
        let shape = shape.into();
        let expected = element_count(&shape);
        if expected != values.len() {
            return Err(StashError::Shape(format!(
                "shape {:?} needs {} elements, got {}",
                shape,
                expected,
                values.len()
            )));
        }
        Ok(Self {
            dtype: T::DTYPE,
            shape,
            data: encode_elements(&values),
        })
    }

    /// Array over an existing little-endian buffer
    pub fn from_raw(dtype: DType, shape: impl Into<Vec<usize>>, data: Bytes) -> Result<Self> {
        let shape = shape.into();
        let expected = element_count(&shape) * dtype.size();
        if expected != data.len() {
            return Err(StashError::Shape(format!(
                "{} array of shape {:?} needs {} bytes, got {}",
                dtype,
                shape,
                expected,
                data.len()
            )));
        }
        Ok(Self { dtype, shape, data })
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        element_count(&self.shape)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of the raw buffer in bytes
    pub fn nbytes(&self) -> usize {
        self.data.len()
    }

    /// Raw little-endian buffer
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn raw(&self) -> &Bytes {
        &self.data
    }

    /// Copy the elements out as a flat row-major vector
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        if T::DTYPE != self.dtype {
            return Err(StashError::TypeMismatch {
                expected: T::DTYPE.to_string(),
                found: self.dtype.to_string(),
            });
        }
        Ok(self
            .data
            .chunks_exact(self.dtype.size())
            .map(T::read_le)
            .collect())
    }

    /// Same buffer under a new shape with the same element count
    pub fn reshape(&self, shape: impl Into<Vec<usize>>) -> Result<Self> {
        Self::from_raw(self.dtype, shape, self.data.clone())
    }

    /// Copy out a rectangular window
    ///
    /// `ranges` covers the leading axes; trailing axes are taken whole.
    pub fn slice(&self, ranges: &[Range<usize>]) -> Result<Self> {
        let window = Window::plan(&self.shape, ranges, self.dtype.size())?;

        let mut out = BytesMut::with_capacity(window.nbytes());
        for run in window.runs() {
            let start = run.offset as usize;
            out.extend_from_slice(&self.data[start..start + run.len]);
        }
        Self::from_raw(self.dtype, window.shape().to_vec(), out.freeze())
    }
}

fn encode_elements<T: Element>(values: &[T]) -> Bytes {
    let mut buf = Vec::with_capacity(values.len() * T::DTYPE.size());
    for v in values {
        v.write_le(&mut buf);
    }
    Bytes::from(buf)
}

fn element_count(shape: &[usize]) -> usize {
    shape.iter().product()
}

// =============================================================================
// Window Planning
// =============================================================================

/// One contiguous byte run, relative to the start of the array buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Run {
    pub offset: u64,
    pub len: usize,
}

/// Output shape plus the byte runs that make up a slice, in row-major order
#[derive(Debug)]
pub(crate) struct Window {
    shape: Vec<usize>,
    runs: Vec<Run>,
}

impl Window {
    /// Plan the runs for `ranges` over an array of `shape`
    pub fn plan(shape: &[usize], ranges: &[Range<usize>], item_size: usize) -> Result<Self> {
        let ndim = shape.len();
        if ranges.len() > ndim {
            return Err(StashError::InvalidSlice(format!(
                "{} ranges given for a {}-dimensional array",
                ranges.len(),
                ndim
            )));
        }

        let mut full: Vec<Range<usize>> = Vec::with_capacity(ndim);
        for (axis, &dim) in shape.iter().enumerate() {
            let range = ranges.get(axis).cloned().unwrap_or(0..dim);
            if range.start > range.end || range.end > dim {
                return Err(StashError::InvalidSlice(format!(
                    "range {:?} out of bounds for axis {} of length {}",
                    range, axis, dim
                )));
            }
            full.push(range);
        }

        let out_shape: Vec<usize> = full.iter().map(|r| r.end - r.start).collect();

        if ndim == 0 {
            return Ok(Self {
                shape: out_shape,
                runs: vec![Run {
                    offset: 0,
                    len: item_size,
                }],
            });
        }
        if out_shape.iter().any(|&n| n == 0) {
            return Ok(Self {
                shape: out_shape,
                runs: Vec::new(),
            });
        }

        // Row-major strides in elements
        let mut strides = vec![1usize; ndim];
        for axis in (0..ndim - 1).rev() {
            strides[axis] = strides[axis + 1] * shape[axis + 1];
        }

        // Run axis: innermost axis that is not taken whole; everything after
        // it is whole, so one run spans it.
        let mut run_axis = ndim - 1;
        while run_axis > 0 && full[run_axis].start == 0 && full[run_axis].end == shape[run_axis] {
            run_axis -= 1;
        }
        let run_len = out_shape[run_axis] * strides[run_axis] * item_size;
        let run_base = full[run_axis].start * strides[run_axis];

        let mut runs = Vec::new();
        let mut index: Vec<usize> = full[..run_axis].iter().map(|r| r.start).collect();
        'outer: loop {
            let element: usize = index
                .iter()
                .zip(&strides)
                .map(|(i, s)| i * s)
                .sum::<usize>()
                + run_base;
            runs.push(Run {
                offset: (element * item_size) as u64,
                len: run_len,
            });

            // Odometer over the outer axes
            let mut axis = run_axis;
            loop {
                if axis == 0 {
                    break 'outer;
                }
                axis -= 1;
                index[axis] += 1;
                if index[axis] < full[axis].end {
                    break;
                }
                index[axis] = full[axis].start;
            }
        }

        Ok(Self {
            shape: out_shape,
            runs,
        })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn runs(&self) -> &[Run] {
        &self.runs
    }

    /// Total bytes covered by the window
    pub fn nbytes(&self) -> usize {
        self.runs.iter().map(|r| r.len).sum()
    }
}
