//! Frame id and timestamp extraction.
//!
//! This module locates the BCD windows in the stamp row of each image,
//! decodes them and rebuilds the frame counter and recording time.

use crate::bcd;
use crate::types::{Extracted, FrameStamp, Sample, SampleBuffer, StampFields};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use ndarray::{s, Array2, ArrayView1};
use thiserror::Error;
use tracing::{debug, trace};

/// Errors that can occur while decoding stamp data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Invalid data dimensions: rank {ndim} is not supported")]
    InvalidShape { ndim: usize },

    #[error("Invalid width (less than {required} pixels, got {width})")]
    InvalidWidth { width: usize, required: usize },

    #[error("Line {line} is out of range for image height {height}")]
    InvalidLine { line: isize, height: usize },

    #[error("Invalid calendar value: {0}")]
    InvalidCalendarValue(StampFields),

    #[error("Invalid BCD digit {value:#x} at position {position} of image {image}")]
    InvalidDigit {
        image: usize,
        position: usize,
        value: i32,
    },

    #[error("Invalid buffer length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// Number of pixels holding the frame id (8 digits).
pub const FRAME_ID_PIXELS: usize = 4;

/// Number of pixels holding the timestamp (20 digits).
pub const FRAME_TIME_PIXELS: usize = 10;

/// Default stamp row: the last row of the image.
pub const DEFAULT_LINE: isize = -1;

/// Default pixel offset of the frame id window.
pub const DEFAULT_ID_OFFSET: usize = 0;

/// Default pixel offset of the timestamp window, right after the frame id.
pub const DEFAULT_TIME_OFFSET: usize = DEFAULT_ID_OFFSET + FRAME_ID_PIXELS;

/// Digit counts of year, month, day, hour, minute, second, microsecond.
const TIME_FIELD_DIGITS: [usize; 7] = [4, 2, 2, 2, 2, 2, 6];

const MAX_MICROSECOND: u32 = 999_999;

/// Smallest year a stamp may carry.
pub const MIN_YEAR: i32 = 1;

/// Largest year that fits in the 4-digit year field.
pub const MAX_YEAR: i32 = 9999;

/// How strictly decoded digits are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Validation {
    /// Nibbles above 9 are folded as-is (camera firmware behaviour)
    #[default]
    Lenient,
    /// Nibbles above 9 fail with `DecodeError::InvalidDigit`
    Strict,
}

/// Location of the stamp data and validation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderOptions {
    /// Row holding the stamp; negative values count from the last row.
    ///
    /// Frames saved by CamWare may carry the stamp in row 0.
    pub line: isize,
    /// Pixel offset of the frame id window
    pub id_offset: usize,
    /// Pixel offset of the timestamp window
    pub time_offset: usize,
    pub validation: Validation,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            line: DEFAULT_LINE,
            id_offset: DEFAULT_ID_OFFSET,
            time_offset: DEFAULT_TIME_OFFSET,
            validation: Validation::Lenient,
        }
    }
}

impl DecoderOptions {
    pub fn with_line(mut self, line: isize) -> Self {
        self.line = line;
        self
    }

    pub fn with_id_offset(mut self, offset: usize) -> Self {
        self.id_offset = offset;
        self
    }

    pub fn with_time_offset(mut self, offset: usize) -> Self {
        self.time_offset = offset;
        self
    }

    pub fn with_validation(mut self, validation: Validation) -> Self {
        self.validation = validation;
        self
    }
}

/// Decoder for the binary frame stamp of PCO 2000/4000 images.
///
/// The images must have been recorded with the timestamp mode set to BINARY
/// or BINARY+ASCII.
#[derive(Debug, Clone, Default)]
pub struct StampDecoder {
    pub options: DecoderOptions,
}

impl StampDecoder {
    /// Creates a decoder with default options.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: DecoderOptions) -> Self {
        Self { options }
    }

    /// Extracts the frame id of each image.
    pub fn frame_id<T: Sample>(
        &self,
        data: &SampleBuffer<'_, T>,
    ) -> Result<Extracted<u32>, DecodeError> {
        debug!(
            kind = data.kind(),
            images = data.len(),
            line = self.options.line,
            offset = self.options.id_offset,
            "extracting frame id"
        );

        let digits = self.window(data, self.options.id_offset, FRAME_ID_PIXELS)?;
        let ids = digits.outer_iter().map(bcd::fold_decimal).collect();
        Ok(data.collect(ids))
    }

    /// Extracts the recording time of each image.
    ///
    /// Fails on the first image whose fields do not form a valid date/time.
    pub fn frame_time<T: Sample>(
        &self,
        data: &SampleBuffer<'_, T>,
    ) -> Result<Extracted<NaiveDateTime>, DecodeError> {
        debug!(
            kind = data.kind(),
            images = data.len(),
            line = self.options.line,
            offset = self.options.time_offset,
            "extracting frame time"
        );

        let digits = self.window(data, self.options.time_offset, FRAME_TIME_PIXELS)?;
        let times = digits
            .outer_iter()
            .map(|row| to_datetime(&stamp_fields(row)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(data.collect(times))
    }

    /// Extracts frame id and recording time together.
    pub fn frame_stamp<T: Sample>(
        &self,
        data: &SampleBuffer<'_, T>,
    ) -> Result<Extracted<FrameStamp>, DecodeError> {
        let ids = self.frame_id(data)?.into_vec();
        let times = self.frame_time(data)?.into_vec();
        let stamps = ids
            .into_iter()
            .zip(times)
            .map(|(id, time)| FrameStamp::new(id, time))
            .collect();
        Ok(data.collect(stamps))
    }

    /// Decodes the pixel window `[offset, offset + pixels)` of the stamp row
    /// of every image into an `(images, 2 * pixels)` digit array.
    fn window<T: Sample>(
        &self,
        data: &SampleBuffer<'_, T>,
        offset: usize,
        pixels: usize,
    ) -> Result<Array2<i32>, DecodeError> {
        let width = data.width();
        let required = offset.saturating_add(pixels);
        if width < required {
            return Err(DecodeError::InvalidWidth { width, required });
        }

        let rows = data.rows(self.options.line)?;
        let digits = bcd::decode_bcd_rows(rows.slice(s![.., offset..required]));

        if self.options.validation == Validation::Strict {
            bcd::check_digits(digits.view())?;
        }

        trace!(rows = digits.nrows(), digits = digits.ncols(), "decoded stamp window");
        Ok(digits)
    }
}

/// Splits 20 timestamp digits into their fields.
fn stamp_fields(digits: ArrayView1<'_, i32>) -> StampFields {
    let mut values = [0u32; 7];
    let mut start = 0;
    for (value, &len) in values.iter_mut().zip(TIME_FIELD_DIGITS.iter()) {
        *value = bcd::fold_decimal(digits.slice(s![start..start + len]));
        start += len;
    }

    let [year, month, day, hour, minute, second, microsecond] = values;
    StampFields {
        year,
        month,
        day,
        hour,
        minute,
        second,
        microsecond,
    }
}

/// Builds a calendar value, rejecting any field chrono does not accept.
fn to_datetime(fields: &StampFields) -> Result<NaiveDateTime, DecodeError> {
    let invalid = || DecodeError::InvalidCalendarValue(*fields);

    // chrono reads microseconds >= 1_000_000 as a leap second
    if fields.microsecond > MAX_MICROSECOND {
        return Err(invalid());
    }

    let year = i32::try_from(fields.year)
        .ok()
        .filter(|year| (MIN_YEAR..=MAX_YEAR).contains(year))
        .ok_or_else(invalid)?;
    let date = NaiveDate::from_ymd_opt(year, fields.month, fields.day).ok_or_else(invalid)?;
    let time = NaiveTime::from_hms_micro_opt(
        fields.hour,
        fields.minute,
        fields.second,
        fields.microsecond,
    )
    .ok_or_else(invalid)?;

    Ok(date.and_time(time))
}

/// Extracts the frame id using the signed stamp row `line` and pixel `offset`.
///
/// Returns one id per image for batch input, a single id otherwise.
pub fn frame_id<T: Sample>(
    data: &SampleBuffer<'_, T>,
    line: isize,
    offset: usize,
) -> Result<Extracted<u32>, DecodeError> {
    let options = DecoderOptions::default()
        .with_line(line)
        .with_id_offset(offset);
    StampDecoder::with_options(options).frame_id(data)
}

/// Extracts the recording time using the signed stamp row `line` and pixel
/// `offset`.
pub fn frame_time<T: Sample>(
    data: &SampleBuffer<'_, T>,
    line: isize,
    offset: usize,
) -> Result<Extracted<NaiveDateTime>, DecodeError> {
    let options = DecoderOptions::default()
        .with_line(line)
        .with_time_offset(offset);
    StampDecoder::with_options(options).frame_time(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, Array2, Array3};

    fn datetime(
        (y, mo, d): (i32, u32, u32),
        (h, mi, s): (u32, u32, u32),
        us: u32,
    ) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_micro_opt(h, mi, s, us)
            .unwrap()
    }

    /// Row with id 1234 and 2010-03-15 12:30:45.678900 at default offsets.
    fn stamp_row() -> Vec<u16> {
        vec![
            0x00, 0x00, 0x12, 0x34, // id
            0x20, 0x10, 0x03, 0x15, // date
            0x12, 0x30, 0x45, // time
            0x67, 0x89, 0x00, // microseconds
            0x00, 0x00,
        ]
    }

    #[test]
    fn test_frame_id_row() {
        let row = arr1(&[0x00u8, 0x00, 0x12, 0x34]);
        let id = frame_id(&SampleBuffer::from(row.view()), DEFAULT_LINE, 0).unwrap();
        assert_eq!(id, Extracted::Single(1234));
    }

    #[test]
    fn test_frame_id_invalid_width() {
        let row = arr1(&[0x00u8, 0x00, 0x12, 0x34]);
        let buffer = SampleBuffer::from(row.view());
        assert_eq!(
            frame_id(&buffer, DEFAULT_LINE, 1).unwrap_err(),
            DecodeError::InvalidWidth {
                width: 4,
                required: 5
            }
        );
    }

    #[test]
    fn test_frame_id_offset_window() {
        let row = arr1(&[0xFFu16, 0xFF, 0x87, 0x65, 0x43, 0x21]);
        let id = frame_id(&SampleBuffer::from(row.view()), DEFAULT_LINE, 2).unwrap();
        assert_eq!(id.single(), Some(87_654_321));
    }

    #[test]
    fn test_frame_time_image() {
        let mut image = Array2::<u16>::zeros((3, 16));
        image.row_mut(2).assign(&arr1(&stamp_row()));

        let decoder = StampDecoder::new();
        let time = decoder.frame_time(&SampleBuffer::from(image.view())).unwrap();
        assert_eq!(
            time,
            Extracted::Single(datetime((2010, 3, 15), (12, 30, 45), 678_900))
        );
    }

    #[test]
    fn test_frame_time_month_13() {
        let mut row = stamp_row();
        row[6] = 0x13;
        let row = arr1(&row);

        let err = StampDecoder::new()
            .frame_time(&SampleBuffer::from(row.view()))
            .unwrap_err();
        match err {
            DecodeError::InvalidCalendarValue(fields) => {
                assert_eq!(fields.month, 13);
                assert_eq!(fields.year, 2010);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_frame_time_rejects_bad_fields() {
        let cases: [&[(usize, u16)]; 6] = [
            &[(6, 0x00)],             // month 0
            &[(6, 0x02), (7, 0x30)],  // February 30th
            &[(8, 0x24)],             // hour 24
            &[(9, 0x60)],             // minute 60
            &[(10, 0x60)],            // second 60
            &[(11, 0xA0)],            // microsecond above 999999
        ];

        for (i, patch) in cases.iter().enumerate() {
            let mut row = stamp_row();
            for &(idx, value) in patch.iter() {
                row[idx] = value;
            }
            let row = arr1(&row);
            let result = StampDecoder::new().frame_time(&SampleBuffer::from(row.view()));
            assert!(
                matches!(result, Err(DecodeError::InvalidCalendarValue(_))),
                "case {} accepted: {:?}",
                i,
                result
            );
        }
    }

    #[test]
    fn test_frame_time_year_range() {
        let mut row = stamp_row();
        row[4] = 0x00;
        row[5] = 0x00;
        let year_zero = arr1(&row);
        match StampDecoder::new().frame_time(&SampleBuffer::from(year_zero.view())) {
            Err(DecodeError::InvalidCalendarValue(fields)) => assert_eq!(fields.year, 0),
            other => panic!("year 0 accepted: {:?}", other),
        }

        // nibble 0xA folds the year to 10010
        row[4] = 0xA0;
        row[5] = 0x10;
        let year_overflow = arr1(&row);
        match StampDecoder::new().frame_time(&SampleBuffer::from(year_overflow.view())) {
            Err(DecodeError::InvalidCalendarValue(fields)) => assert_eq!(fields.year, 10_010),
            other => panic!("year 10010 accepted: {:?}", other),
        }

        row[4] = 0x99;
        row[5] = 0x99;
        let year_max = arr1(&row);
        let time = StampDecoder::new()
            .frame_time(&SampleBuffer::from(year_max.view()))
            .unwrap();
        assert_eq!(
            time.single(),
            Some(datetime((9999, 3, 15), (12, 30, 45), 678_900))
        );
    }

    #[test]
    fn test_frame_time_leap_day() {
        let mut row = stamp_row();
        row[4] = 0x20;
        row[5] = 0x12;
        row[6] = 0x02;
        row[7] = 0x29;
        let row = arr1(&row);

        let time = StampDecoder::new()
            .frame_time(&SampleBuffer::from(row.view()))
            .unwrap();
        assert_eq!(
            time.single(),
            Some(datetime((2012, 2, 29), (12, 30, 45), 678_900))
        );
    }

    #[test]
    fn test_frame_time_invalid_width() {
        let row = arr1(&stamp_row()[..13]);
        assert_eq!(
            frame_time(&SampleBuffer::from(row.view()), DEFAULT_LINE, DEFAULT_TIME_OFFSET)
                .unwrap_err(),
            DecodeError::InvalidWidth {
                width: 13,
                required: 14
            }
        );
    }

    #[test]
    fn test_batch_matches_single() {
        let mut batch = Array3::<u16>::zeros((3, 2, 16));
        for n in 0..3 {
            let mut row = stamp_row();
            row[3] = 0x30 + n as u16;
            row[10] = 0x40 + n as u16;
            batch
                .index_axis_mut(ndarray::Axis(0), n)
                .row_mut(1)
                .assign(&arr1(&row));
        }

        let decoder = StampDecoder::new();
        let stamps = decoder
            .frame_stamp(&SampleBuffer::from(batch.view()))
            .unwrap();
        assert!(stamps.is_batch());
        let stamps = stamps.into_vec();
        assert_eq!(stamps.len(), 3);

        for (n, stamp) in stamps.iter().enumerate() {
            let image = batch.index_axis(ndarray::Axis(0), n);
            let single = decoder
                .frame_stamp(&SampleBuffer::from(image))
                .unwrap()
                .single()
                .unwrap();
            assert_eq!(*stamp, single);
            assert_eq!(stamp.id, 1230 + n as u32);
        }
    }

    #[test]
    fn test_strict_validation() {
        let row = arr1(&[0x00u8, 0x00, 0x1A, 0x34]);
        let buffer = SampleBuffer::from(row.view());

        // lenient: nibble 0xA folds as ten
        assert_eq!(frame_id(&buffer, DEFAULT_LINE, 0).unwrap().single(), Some(2034));

        let strict = StampDecoder::with_options(
            DecoderOptions::default().with_validation(Validation::Strict),
        );
        assert_eq!(
            strict.frame_id(&buffer).unwrap_err(),
            DecodeError::InvalidDigit {
                image: 0,
                position: 5,
                value: 10
            }
        );
    }

    #[test]
    fn test_line_selection() {
        let mut image = Array2::<u16>::zeros((4, 4));
        image.row_mut(0).assign(&arr1(&[0x00, 0x00, 0x00, 0x42]));
        image.row_mut(3).assign(&arr1(&[0x00, 0x00, 0x00, 0x07]));
        let buffer = SampleBuffer::from(image.view());

        assert_eq!(frame_id(&buffer, 0, 0).unwrap().single(), Some(42));
        assert_eq!(frame_id(&buffer, -4, 0).unwrap().single(), Some(42));
        assert_eq!(frame_id(&buffer, -1, 0).unwrap().single(), Some(7));
        assert_eq!(
            frame_id(&buffer, 4, 0).unwrap_err(),
            DecodeError::InvalidLine { line: 4, height: 4 }
        );
    }
}
