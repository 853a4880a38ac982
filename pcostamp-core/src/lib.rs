//! Decoder for the binary frame stamp of PCO 2000/4000 camera images.
//!
//! When the camera timestamp mode is set to BINARY (or BINARY+ASCII), the
//! camera writes a BCD-encoded frame counter and recording time into the low
//! bytes of the first pixels of one image row. This crate decodes them from
//! a single row, an image or a stack of images.
//!
//! # Example
//!
//! ```
//! use ndarray::Array2;
//! use pcostamp_core::{SampleBuffer, StampDecoder};
//!
//! let mut image = Array2::<u16>::zeros((4, 16));
//! image
//!     .row_mut(3)
//!     .slice_mut(ndarray::s![..4])
//!     .assign(&ndarray::arr1(&[0x00, 0x00, 0x12, 0x34]));
//!
//! let decoder = StampDecoder::new();
//! let id = decoder.frame_id(&SampleBuffer::from(image.view())).unwrap();
//! assert_eq!(id.single(), Some(1234));
//! ```
//!
//! # Layout
//!
//! - Frame id: pixels `[0, 4)` of the last row, 8 digits
//! - Timestamp: pixels `[4, 14)` of the last row, 20 digits
//!   (year, month, day, hour, minute, second, microsecond)
//! - Each pixel carries two digits in its low byte, high nibble first

pub mod bcd;
pub mod decoder;
pub mod encode;
pub mod types;

// Re-export commonly used types
pub use bcd::{decode_bcd, decode_bcd_row, decode_bcd_rows};
pub use decoder::{
    frame_id, frame_time, DecodeError, DecoderOptions, StampDecoder, Validation,
    DEFAULT_ID_OFFSET, DEFAULT_LINE, DEFAULT_TIME_OFFSET, MAX_YEAR, MIN_YEAR,
};
pub use encode::{encode_frame_id, encode_frame_time, stamp_width, write_stamp, EncodeError};
pub use types::{Extracted, FrameStamp, Sample, SampleBuffer, StampFields};
