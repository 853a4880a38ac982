//! Low-level BCD decoding of pixel samples.
//!
//! In BINARY timestamp mode the camera stores one packed-decimal byte in the
//! low byte of each leading pixel of the stamp row. This module splits those
//! bytes into their decimal digits and folds digit runs back into numbers.

use crate::decoder::DecodeError;
use crate::types::Sample;
use ndarray::{Array1, Array2, ArrayD, ArrayView1, ArrayView2, ArrayViewD, Axis, Ix1, Ix2};

/// Largest nibble value that is a valid decimal digit.
pub const MAX_DIGIT: i32 = 9;

// ============================================================================
// Nibbles
// Bits: [7:4] first (more significant) digit | [3:0] second digit
// ============================================================================

/// Extracts the first digit (bits 7:4) of a packed-decimal byte.
#[inline]
pub fn high_nibble(byte: u8) -> u8 {
    byte >> 4
}

/// Extracts the second digit (bits 3:0) of a packed-decimal byte.
#[inline]
pub fn low_nibble(byte: u8) -> u8 {
    byte & 0x0F
}

/// Decodes a batch of sample rows into digits.
///
/// Column `i` of each row becomes output columns `2i` (high nibble) and
/// `2i + 1` (low nibble), so an `(n, w)` input yields `(n, 2w)` digits.
/// Nibbles above 9 are passed through unchanged.
pub fn decode_bcd_rows<T: Sample>(samples: ArrayView2<'_, T>) -> Array2<i32> {
    let (rows, cols) = samples.dim();
    let mut digits = Array2::<i32>::zeros((rows, cols * 2));

    for ((r, c), &sample) in samples.indexed_iter() {
        let byte = sample.low_byte();
        digits[[r, 2 * c]] = i32::from(high_nibble(byte));
        digits[[r, 2 * c + 1]] = i32::from(low_nibble(byte));
    }

    digits
}

/// Decodes a single row of samples into `2 * len` digits.
pub fn decode_bcd_row<T: Sample>(samples: ArrayView1<'_, T>) -> Array1<i32> {
    decode_bcd_rows(samples.insert_axis(Axis(0))).index_axis_move(Axis(0), 0)
}

/// Decodes a row (rank 1) or a batch of rows (rank 2) of any rank known only
/// at runtime. The output has the same rank as the input.
pub fn decode_bcd<T: Sample>(samples: ArrayViewD<'_, T>) -> Result<ArrayD<i32>, DecodeError> {
    let ndim = samples.ndim();
    match ndim {
        1 => {
            let row = samples
                .into_dimensionality::<Ix1>()
                .map_err(|_| DecodeError::InvalidShape { ndim })?;
            Ok(decode_bcd_row(row).into_dyn())
        }
        2 => {
            let rows = samples
                .into_dimensionality::<Ix2>()
                .map_err(|_| DecodeError::InvalidShape { ndim })?;
            Ok(decode_bcd_rows(rows).into_dyn())
        }
        _ => Err(DecodeError::InvalidShape { ndim }),
    }
}

/// Folds a digit run into an integer, most significant digit first.
///
/// Runs of up to nine digits cannot overflow, even with nibbles up to 15.
#[inline]
pub(crate) fn fold_decimal(digits: ArrayView1<'_, i32>) -> u32 {
    digits
        .iter()
        .fold(0u32, |acc, &digit| acc * 10 + digit as u32)
}

/// Rejects the first digit above 9, reporting its image (row) and position.
pub fn check_digits(digits: ArrayView2<'_, i32>) -> Result<(), DecodeError> {
    match digits.indexed_iter().find(|(_, digit)| **digit > MAX_DIGIT) {
        Some(((image, position), &value)) => Err(DecodeError::InvalidDigit {
            image,
            position,
            value,
        }),
        None => Ok(()),
    }
}
