//! BCD encoding of frame stamps.
//!
//! Writes a frame id and recording time the way the camera does, which is
//! mostly useful for building synthetic frames.

use crate::decoder::{FRAME_ID_PIXELS, FRAME_TIME_PIXELS, MAX_YEAR, MIN_YEAR};
use crate::types::{FrameStamp, Sample};
use chrono::{Datelike, NaiveDateTime, Timelike};
use ndarray::ArrayViewMut1;
use thiserror::Error;

/// Errors that can occur while encoding a stamp.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("Frame id {0} does not fit in 8 BCD digits")]
    IdOutOfRange(u32),

    #[error("Year {0} does not fit in 4 BCD digits")]
    YearOutOfRange(i32),

    #[error("Leap seconds cannot be encoded")]
    LeapSecond,

    #[error("Row too narrow: need {required} pixels, got {width}")]
    RowTooNarrow { width: usize, required: usize },

    #[error("Pixel offset {0} leaves no room for the stamp")]
    OffsetOutOfRange(usize),

    #[error("Frame id at pixel {id_offset} overlaps timestamp at pixel {time_offset}")]
    OverlappingWindows { id_offset: usize, time_offset: usize },
}

const MAX_FRAME_ID: u32 = 99_999_999;

/// Appends the `count` least significant decimal digits of `value`, most
/// significant first.
fn push_digits(digits: &mut Vec<u8>, value: u32, count: usize) {
    let start = digits.len();
    let mut rest = value;
    for _ in 0..count {
        digits.push((rest % 10) as u8);
        rest /= 10;
    }
    digits[start..].reverse();
}

/// Packs digit pairs into bytes, first digit in the high nibble.
fn pack_digits<const N: usize>(digits: &[u8]) -> [u8; N] {
    let mut bytes = [0u8; N];
    for (byte, pair) in bytes.iter_mut().zip(digits.chunks_exact(2)) {
        *byte = (pair[0] << 4) | pair[1];
    }
    bytes
}

/// Encodes a frame id into its 4 BCD bytes.
pub fn encode_frame_id(id: u32) -> Result<[u8; FRAME_ID_PIXELS], EncodeError> {
    if id > MAX_FRAME_ID {
        return Err(EncodeError::IdOutOfRange(id));
    }

    let mut digits = Vec::with_capacity(FRAME_ID_PIXELS * 2);
    push_digits(&mut digits, id, 8);
    Ok(pack_digits(&digits))
}

/// Encodes a recording time into its 10 BCD bytes.
///
/// Precision below one microsecond is dropped.
pub fn encode_frame_time(time: &NaiveDateTime) -> Result<[u8; FRAME_TIME_PIXELS], EncodeError> {
    let year = time.year();
    if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
        return Err(EncodeError::YearOutOfRange(year));
    }
    let microsecond = time.nanosecond() / 1_000;
    if microsecond > 999_999 {
        return Err(EncodeError::LeapSecond);
    }

    let mut digits = Vec::with_capacity(FRAME_TIME_PIXELS * 2);
    push_digits(&mut digits, year.unsigned_abs(), 4);
    push_digits(&mut digits, time.month(), 2);
    push_digits(&mut digits, time.day(), 2);
    push_digits(&mut digits, time.hour(), 2);
    push_digits(&mut digits, time.minute(), 2);
    push_digits(&mut digits, time.second(), 2);
    push_digits(&mut digits, microsecond, 6);
    Ok(pack_digits(&digits))
}

/// Number of pixels a row needs to hold both windows at the given offsets.
///
/// The frame id `[id_offset, id_offset + 4)` and the timestamp
/// `[time_offset, time_offset + 10)` must not overlap.
pub fn stamp_width(id_offset: usize, time_offset: usize) -> Result<usize, EncodeError> {
    let id_end = id_offset
        .checked_add(FRAME_ID_PIXELS)
        .ok_or(EncodeError::OffsetOutOfRange(id_offset))?;
    let time_end = time_offset
        .checked_add(FRAME_TIME_PIXELS)
        .ok_or(EncodeError::OffsetOutOfRange(time_offset))?;

    if id_offset < time_end && time_offset < id_end {
        return Err(EncodeError::OverlappingWindows {
            id_offset,
            time_offset,
        });
    }

    Ok(id_end.max(time_end))
}

/// Writes `stamp` into a row of samples at the given pixel offsets.
///
/// Pixels outside the two windows are left untouched.
pub fn write_stamp<T: Sample>(
    mut row: ArrayViewMut1<'_, T>,
    stamp: &FrameStamp,
    id_offset: usize,
    time_offset: usize,
) -> Result<(), EncodeError> {
    let width = row.len();
    let required = stamp_width(id_offset, time_offset)?;
    if width < required {
        return Err(EncodeError::RowTooNarrow { width, required });
    }

    let id = encode_frame_id(stamp.id)?;
    let time = encode_frame_time(&stamp.time)?;

    for (i, &byte) in id.iter().enumerate() {
        row[id_offset + i] = T::from_byte(byte);
    }
    for (i, &byte) in time.iter().enumerate() {
        row[time_offset + i] = T::from_byte(byte);
    }

    Ok(())
}
