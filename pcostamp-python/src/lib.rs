//! Python bindings for the PCO binary timestamp decoder with numpy support.
//!
//! The functions accept numpy arrays directly (a stamp row, an image or a
//! stack of images) and take `line` / `offs` keyword arguments.

use chrono::NaiveDateTime;
use ndarray::{Array1, ArrayViewD};
use numpy::{IntoPyArray, PyReadonlyArrayDyn};
use pcostamp_core::{
    bcd, stamp_width, write_stamp, DecodeError, DecoderOptions, EncodeError, Extracted,
    FrameStamp, Sample, SampleBuffer, StampDecoder, Validation, DEFAULT_ID_OFFSET,
    DEFAULT_TIME_OFFSET,
};
use pyo3::exceptions::{PyTypeError, PyValueError};
use pyo3::prelude::*;

/// Shape problems raise `TypeError`, bad stamp values raise `ValueError`.
fn decode_err(err: DecodeError) -> PyErr {
    match err {
        DecodeError::InvalidShape { .. }
        | DecodeError::InvalidWidth { .. }
        | DecodeError::InvalidLine { .. }
        | DecodeError::InvalidLength { .. } => PyTypeError::new_err(err.to_string()),
        DecodeError::InvalidCalendarValue(_) | DecodeError::InvalidDigit { .. } => {
            PyValueError::new_err(err.to_string())
        }
    }
}

fn encode_err(err: EncodeError) -> PyErr {
    PyValueError::new_err(err.to_string())
}

/// Calls a generic function with the array viewed as its numpy dtype.
macro_rules! with_samples {
    ($array:expr, $func:ident ( $($arg:expr),* )) => {{
        let array: &PyAny = $array;
        if let Ok(a) = array.extract::<PyReadonlyArrayDyn<u16>>() {
            $func($($arg,)* a.as_array())
        } else if let Ok(a) = array.extract::<PyReadonlyArrayDyn<u8>>() {
            $func($($arg,)* a.as_array())
        } else if let Ok(a) = array.extract::<PyReadonlyArrayDyn<u32>>() {
            $func($($arg,)* a.as_array())
        } else if let Ok(a) = array.extract::<PyReadonlyArrayDyn<i16>>() {
            $func($($arg,)* a.as_array())
        } else if let Ok(a) = array.extract::<PyReadonlyArrayDyn<i32>>() {
            $func($($arg,)* a.as_array())
        } else if let Ok(a) = array.extract::<PyReadonlyArrayDyn<i64>>() {
            $func($($arg,)* a.as_array())
        } else {
            Err(PyTypeError::new_err(
                "expected a numpy integer array (uint8, uint16, uint32, int16, int32 or int64)",
            ))
        }
    }};
}

fn decoder_options(
    line: isize,
    id_offs: usize,
    time_offs: usize,
    strict: bool,
) -> DecoderOptions {
    let validation = if strict {
        Validation::Strict
    } else {
        Validation::Lenient
    };
    DecoderOptions::default()
        .with_line(line)
        .with_id_offset(id_offs)
        .with_time_offset(time_offs)
        .with_validation(validation)
}

/// Hands an owned numpy array over to Python.
fn array_object<'py>(py: Python<'py>, array: &'py PyAny) -> PyObject {
    array.into_py(py)
}

fn decode_bcd_impl<T: Sample>(py: Python<'_>, samples: ArrayViewD<'_, T>) -> PyResult<PyObject> {
    let digits = bcd::decode_bcd(samples).map_err(decode_err)?;
    Ok(array_object(py, digits.into_pyarray(py)))
}

fn frame_id_impl<T: Sample>(
    py: Python<'_>,
    options: DecoderOptions,
    data: ArrayViewD<'_, T>,
) -> PyResult<PyObject> {
    let buffer = SampleBuffer::try_from(data).map_err(decode_err)?;
    let ids = StampDecoder::with_options(options)
        .frame_id(&buffer)
        .map_err(decode_err)?;

    Ok(match ids {
        Extracted::Single(id) => id.into_py(py),
        Extracted::Batch(ids) => {
            let ids = ids
                .into_iter()
                .map(i32::try_from)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| PyValueError::new_err(e.to_string()))?;
            array_object(py, ids.into_pyarray(py))
        }
    })
}

fn frame_time_impl<T: Sample>(
    py: Python<'_>,
    options: DecoderOptions,
    data: ArrayViewD<'_, T>,
) -> PyResult<PyObject> {
    let buffer = SampleBuffer::try_from(data).map_err(decode_err)?;
    let times = StampDecoder::with_options(options)
        .frame_time(&buffer)
        .map_err(decode_err)?;

    Ok(match times {
        Extracted::Single(time) => time.into_py(py),
        Extracted::Batch(times) => times.into_py(py),
    })
}

/// BCD-decodes the lowest bytes of all elements of an array.
///
/// Args:
///     a: integer array with 1 or 2 dimensions
///
/// Returns:
///     numpy.ndarray: int32 digits, the last axis twice as long as the input
#[pyfunction]
fn decode_bcd(py: Python<'_>, a: &PyAny) -> PyResult<PyObject> {
    with_samples!(a, decode_bcd_impl(py))
}

/// Extracts the frame number from images recorded by a PCO 2000/4000.
///
/// Args:
///     data: a stamp row (W), an image (HxW) or a stack of images (NxHxW)
///     line: row holding the stamp, default is the last row. Frames saved
///           by CamWare may need line=0.
///     offs: pixel offset of the frame id (default 0)
///     strict: raise ValueError on nibbles that are not decimal digits
///
/// Returns:
///     int for a row or image, numpy int32 array for a stack
///
/// Example:
///     >>> import pcostamp
///     >>> ids = pcostamp.frame_id(stack)
#[pyfunction]
#[pyo3(signature = (data, line=-1, offs=DEFAULT_ID_OFFSET, strict=false))]
fn frame_id(
    py: Python<'_>,
    data: &PyAny,
    line: isize,
    offs: usize,
    strict: bool,
) -> PyResult<PyObject> {
    let options = decoder_options(line, offs, DEFAULT_TIME_OFFSET, strict);
    with_samples!(data, frame_id_impl(py, options))
}

/// Extracts the recording date and time from images recorded by a
/// PCO 2000/4000.
///
/// Args:
///     data: a stamp row (W), an image (HxW) or a stack of images (NxHxW)
///     line: row holding the stamp, default is the last row
///     offs: pixel offset of the timestamp (default 4)
///     strict: raise ValueError on nibbles that are not decimal digits
///
/// Returns:
///     datetime.datetime for a row or image, list of them for a stack
#[pyfunction]
#[pyo3(signature = (data, line=-1, offs=DEFAULT_TIME_OFFSET, strict=false))]
fn frame_time(
    py: Python<'_>,
    data: &PyAny,
    line: isize,
    offs: usize,
    strict: bool,
) -> PyResult<PyObject> {
    let options = decoder_options(line, DEFAULT_ID_OFFSET, offs, strict);
    with_samples!(data, frame_time_impl(py, options))
}

/// Builds a stamp row (uint16) for a frame id and recording time.
///
/// Useful for producing synthetic frames.
#[pyfunction]
#[pyo3(signature = (frame_id, time, id_offs=DEFAULT_ID_OFFSET, time_offs=DEFAULT_TIME_OFFSET))]
fn encode_stamp(
    py: Python<'_>,
    frame_id: u32,
    time: NaiveDateTime,
    id_offs: usize,
    time_offs: usize,
) -> PyResult<PyObject> {
    let width = stamp_width(id_offs, time_offs).map_err(encode_err)?;
    let mut row = Array1::<u16>::zeros(width);
    write_stamp(
        row.view_mut(),
        &FrameStamp::new(frame_id, time),
        id_offs,
        time_offs,
    )
    .map_err(encode_err)?;
    Ok(array_object(py, row.into_pyarray(py)))
}

/// PCO binary timestamp module for Python.
#[pymodule]
fn _pcostamp(_py: Python<'_>, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(decode_bcd, m)?)?;
    m.add_function(wrap_pyfunction!(frame_id, m)?)?;
    m.add_function(wrap_pyfunction!(frame_time, m)?)?;
    m.add_function(wrap_pyfunction!(encode_stamp, m)?)?;
    Ok(())
}
