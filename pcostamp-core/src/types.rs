//! Core types for PCO binary timestamp data.
//!
//! This module defines the sample abstraction, the shape-tagged sample buffer
//! and the values produced by the extractors.

use crate::decoder::DecodeError;
use byteorder::{ByteOrder, LittleEndian};
use chrono::NaiveDateTime;
use ndarray::{ArrayD, ArrayView1, ArrayView2, ArrayView3, ArrayViewD, Axis, Ix1, Ix2, Ix3, IxDyn};
use std::fmt;

/// A pixel sample that may carry a BCD byte.
///
/// Only the low 8 bits are meaningful; wider storage (16-bit camera pixels,
/// promoted integer arrays) is masked uniformly.
pub trait Sample: Copy {
    /// Returns the low byte of the sample.
    fn low_byte(self) -> u8;

    /// Builds a sample holding `byte` in its low 8 bits.
    fn from_byte(byte: u8) -> Self;
}

macro_rules! impl_sample {
    ($($t:ty),*) => {
        $(
            impl Sample for $t {
                #[inline]
                fn low_byte(self) -> u8 {
                    // truncating cast keeps bits 7:0 (two's complement for signed types)
                    self as u8
                }

                #[inline]
                fn from_byte(byte: u8) -> Self {
                    byte as $t
                }
            }
        )*
    };
}

impl_sample!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize);

/// Input buffer tagged by its rank.
///
/// - `Row`: a single stamp row of width W
/// - `Image`: one H×W image
/// - `Batch`: N images of H×W
#[derive(Debug, Clone)]
pub enum SampleBuffer<'a, T> {
    Row(ArrayView1<'a, T>),
    Image(ArrayView2<'a, T>),
    Batch(ArrayView3<'a, T>),
}

impl<'a, T> SampleBuffer<'a, T> {
    /// Width of each row (last axis).
    pub fn width(&self) -> usize {
        match self {
            Self::Row(row) => row.len(),
            Self::Image(image) => image.ncols(),
            Self::Batch(batch) => batch.len_of(Axis(2)),
        }
    }

    /// Number of images the buffer describes (1 unless it is a batch).
    pub fn len(&self) -> usize {
        match self {
            Self::Batch(batch) => batch.len_of(Axis(0)),
            _ => 1,
        }
    }

    /// Returns true for a batch holding no images.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if results should be reported per image.
    pub fn is_batch(&self) -> bool {
        matches!(self, Self::Batch(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Row(_) => "row",
            Self::Image(_) => "image",
            Self::Batch(_) => "batch",
        }
    }

    /// Selects row `line` of every image and returns them as an `(n, width)`
    /// view. A lone row is returned as a batch of one; `line` is ignored.
    pub fn rows(&self, line: isize) -> Result<ArrayView2<'a, T>, DecodeError> {
        match self {
            Self::Row(row) => Ok(row.clone().insert_axis(Axis(0))),
            Self::Image(image) => {
                let idx = resolve_line(line, image.nrows())?;
                Ok(image.clone().index_axis_move(Axis(0), idx).insert_axis(Axis(0)))
            }
            Self::Batch(batch) => {
                let idx = resolve_line(line, batch.len_of(Axis(1)))?;
                Ok(batch.clone().index_axis_move(Axis(1), idx))
            }
        }
    }

    /// Wraps per-image results in the shape matching this buffer.
    pub(crate) fn collect<U>(&self, values: Vec<U>) -> Extracted<U> {
        match <[U; 1]>::try_from(values) {
            Ok([value]) if !self.is_batch() => Extracted::Single(value),
            Ok(values) => Extracted::Batch(values.into()),
            Err(values) => Extracted::Batch(values),
        }
    }
}

impl<'a, T> From<ArrayView1<'a, T>> for SampleBuffer<'a, T> {
    fn from(row: ArrayView1<'a, T>) -> Self {
        Self::Row(row)
    }
}

impl<'a, T> From<ArrayView2<'a, T>> for SampleBuffer<'a, T> {
    fn from(image: ArrayView2<'a, T>) -> Self {
        Self::Image(image)
    }
}

impl<'a, T> From<ArrayView3<'a, T>> for SampleBuffer<'a, T> {
    fn from(batch: ArrayView3<'a, T>) -> Self {
        Self::Batch(batch)
    }
}

impl<'a, T> TryFrom<ArrayViewD<'a, T>> for SampleBuffer<'a, T> {
    type Error = DecodeError;

    fn try_from(data: ArrayViewD<'a, T>) -> Result<Self, Self::Error> {
        let ndim = data.ndim();
        let shape_err = |_| DecodeError::InvalidShape { ndim };
        match ndim {
            1 => Ok(Self::Row(data.into_dimensionality::<Ix1>().map_err(shape_err)?)),
            2 => Ok(Self::Image(data.into_dimensionality::<Ix2>().map_err(shape_err)?)),
            3 => Ok(Self::Batch(data.into_dimensionality::<Ix3>().map_err(shape_err)?)),
            _ => Err(DecodeError::InvalidShape { ndim }),
        }
    }
}

/// Resolves a signed row index against an image height.
///
/// Non-negative lines count from the first row, negative lines from the last
/// (`-1` is the last row).
pub fn resolve_line(line: isize, height: usize) -> Result<usize, DecodeError> {
    let out_of_range = DecodeError::InvalidLine { line, height };
    let idx = if line < 0 {
        height.checked_sub(line.unsigned_abs())
    } else {
        Some(line.unsigned_abs())
    };
    match idx {
        Some(idx) if idx < height => Ok(idx),
        _ => Err(out_of_range),
    }
}

/// Builds an owned sample array from little-endian 16-bit pixel bytes.
///
/// `shape` is the array shape in pixels; the byte count must be exactly two
/// bytes per pixel.
pub fn le_u16_samples(bytes: &[u8], shape: &[usize]) -> Result<ArrayD<u16>, DecodeError> {
    let pixels: usize = shape.iter().product();
    let expected = pixels * 2;
    if bytes.len() != expected {
        return Err(DecodeError::InvalidLength {
            expected,
            actual: bytes.len(),
        });
    }

    let mut words = vec![0u16; pixels];
    LittleEndian::read_u16_into(bytes, &mut words);

    ArrayD::from_shape_vec(IxDyn(shape), words).map_err(|_| DecodeError::InvalidLength {
        expected,
        actual: bytes.len(),
    })
}

/// Result of an extraction, shaped like the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted<T> {
    /// Row or image input
    Single(T),
    /// Batch input, one value per image in batch order
    Batch(Vec<T>),
}

impl<T> Extracted<T> {
    /// Returns the value of a single-image extraction.
    pub fn single(self) -> Option<T> {
        match self {
            Self::Single(value) => Some(value),
            Self::Batch(_) => None,
        }
    }

    /// Returns all values in image order.
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::Single(value) => vec![value],
            Self::Batch(values) => values,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Batch(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_batch(&self) -> bool {
        matches!(self, Self::Batch(_))
    }

    pub fn map<U, F: FnMut(T) -> U>(self, mut f: F) -> Extracted<U> {
        match self {
            Self::Single(value) => Extracted::Single(f(value)),
            Self::Batch(values) => Extracted::Batch(values.into_iter().map(f).collect()),
        }
    }
}

/// Date/time fields as decoded from the 20 timestamp digits.
///
/// Values are not validated; they may describe an impossible date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StampFields {
    pub year: u32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    pub microsecond: u32,
}

impl fmt::Display for StampFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:06}",
            self.year, self.month, self.day, self.hour, self.minute, self.second, self.microsecond
        )
    }
}

/// Frame id and recording time of one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameStamp {
    /// Camera frame counter
    pub id: u32,
    /// Recording time (camera local time, microsecond resolution)
    pub time: NaiveDateTime,
}

impl FrameStamp {
    #[inline]
    pub fn new(id: u32, time: NaiveDateTime) -> Self {
        Self { id, time }
    }
}
