//! Reading and writing FITS files.
//!
//! The codec walks the HDU sequence of a file, decodes a chosen data segment
//! into an `f64` buffer, and writes buffers back out as big-endian data with
//! block padding. Buffers are stored row-major with the axis order reversed
//! relative to the NAXISn cards, so NAXIS1 varies fastest in both directions.

use std::fs;
use std::path::Path;

use ndarray::ArrayD;

use crate::datatype::DataType;
use crate::error::{Error, Result};
use crate::header::{parse_header_blocks, serialize_header, Header, Value, BLOCK_SIZE};

/// One scanned header-data unit.
pub(crate) struct RawHdu {
    pub header: Header,
    pub bitpix: i64,
    /// Storage-order shape (NAXISn reversed). Empty when NAXIS is 0.
    pub shape: Vec<usize>,
    pub header_start: usize,
    pub data_start: usize,
    /// Unpadded data segment length in bytes.
    pub data_len: usize,
}

fn load_err(path: &Path, reason: impl Into<String>) -> Error {
    Error::Load {
        path: path.display().to_string(),
        reason: reason.into(),
    }
}

fn save_err(path: &Path, reason: impl Into<String>) -> Error {
    Error::Save {
        path: path.display().to_string(),
        reason: reason.into(),
    }
}

pub(crate) fn padded(len: usize) -> usize {
    len.div_ceil(BLOCK_SIZE) * BLOCK_SIZE
}

/// Walk every HDU in `bytes`, collecting header and data-segment geometry.
pub(crate) fn scan_hdus(path: &Path, bytes: &[u8]) -> Result<Vec<RawHdu>> {
    let mut hdus = Vec::new();
    let mut offset = 0;
    while offset < bytes.len() {
        let header_start = offset;
        let (hdr, header_len) = parse_header_blocks(&bytes[offset..])
            .map_err(|e| load_err(path, e.to_string()))?;
        offset += header_len;

        let bitpix = hdr
            .int("BITPIX")
            .ok_or_else(|| load_err(path, "missing BITPIX card"))?;
        let naxis = hdr
            .int("NAXIS")
            .ok_or_else(|| load_err(path, "missing NAXIS card"))?;
        if naxis < 0 {
            return Err(load_err(path, format!("invalid NAXIS value {naxis}")));
        }

        let mut shape = Vec::with_capacity(naxis as usize);
        for n in (1..=naxis).rev() {
            let len = hdr
                .int(&format!("NAXIS{n}"))
                .ok_or_else(|| load_err(path, format!("missing NAXIS{n} card")))?;
            if len < 0 {
                return Err(load_err(path, format!("invalid NAXIS{n} value {len}")));
            }
            shape.push(len as usize);
        }

        let pcount = hdr.int("PCOUNT").unwrap_or(0).max(0) as usize;
        let gcount = hdr.int("GCOUNT").unwrap_or(1).max(1) as usize;
        let elements: usize = shape.iter().product();
        let data_len = if naxis == 0 {
            0
        } else {
            gcount * (pcount + elements) * (bitpix.unsigned_abs() as usize / 8)
        };

        let data_start = offset;
        offset += padded(data_len);

        hdus.push(RawHdu {
            header: hdr,
            bitpix,
            shape,
            header_start,
            data_start,
            data_len,
        });
    }
    Ok(hdus)
}

pub(crate) fn scan_file(path: &Path) -> Result<(Vec<u8>, Vec<RawHdu>)> {
    let bytes = fs::read(path).map_err(|e| load_err(path, e.to_string()))?;
    let hdus = scan_hdus(path, &bytes)?;
    Ok((bytes, hdus))
}

pub(crate) fn select<'a>(path: &Path, hdus: &'a [RawHdu], extension: usize) -> Result<&'a RawHdu> {
    hdus.get(extension).ok_or_else(|| {
        load_err(
            path,
            format!("extension {extension} not found ({} HDUs)", hdus.len()),
        )
    })
}

/// Read the header of the given extension.
pub(crate) fn open_header(path: &Path, extension: usize) -> Result<Header> {
    let (_, hdus) = scan_file(path)?;
    Ok(select(path, &hdus, extension)?.header.clone())
}

/// Read the data segment of the given extension into an `f64` buffer.
///
/// Returns `None` for a headerless data segment (NAXIS of 0) together with
/// the declared type implied by BITPIX.
pub(crate) fn open(path: &Path, extension: usize) -> Result<(Option<ArrayD<f64>>, DataType)> {
    let (bytes, hdus) = scan_file(path)?;
    let hdu = select(path, &hdus, extension)?;

    let datatype = DataType::from_bitpix(hdu.bitpix)
        .ok_or_else(|| load_err(path, format!("unsupported BITPIX {}", hdu.bitpix)))?;

    if hdu.shape.is_empty() {
        return Ok((None, datatype));
    }
    if bytes.len() < hdu.data_start + hdu.data_len {
        return Err(load_err(path, "truncated data segment"));
    }

    let raw = &bytes[hdu.data_start..hdu.data_start + hdu.data_len];
    let values = decode(raw, hdu.bitpix).map_err(|e| load_err(path, e.to_string()))?;
    let arr = ArrayD::from_shape_vec(hdu.shape.clone(), values)
        .map_err(|e| load_err(path, e.to_string()))?;
    Ok((Some(arr), datatype))
}

/// Decode a big-endian data segment into `f64` values.
fn decode(raw: &[u8], bitpix: i64) -> Result<Vec<f64>> {
    let values = match bitpix {
        8 => raw.iter().map(|&b| b as f64).collect(),
        16 => {
            let words: Vec<i16> = bytemuck::pod_collect_to_vec(raw);
            words.iter().map(|&w| i16::from_be(w) as f64).collect()
        }
        32 => {
            let words: Vec<i32> = bytemuck::pod_collect_to_vec(raw);
            words.iter().map(|&w| i32::from_be(w) as f64).collect()
        }
        -32 => {
            let words: Vec<u32> = bytemuck::pod_collect_to_vec(raw);
            words
                .iter()
                .map(|&w| f32::from_bits(u32::from_be(w)) as f64)
                .collect()
        }
        -64 => {
            let words: Vec<u64> = bytemuck::pod_collect_to_vec(raw);
            words
                .iter()
                .map(|&w| f64::from_bits(u64::from_be(w)))
                .collect()
        }
        other => return Err(Error::Data(format!("unsupported BITPIX {other}"))),
    };
    Ok(values)
}

/// Encode an `f64` buffer as a big-endian data segment of the given type.
///
/// Values are coerced to the target type's representable range first.
fn encode(data: &ArrayD<f64>, datatype: DataType) -> Result<Vec<u8>> {
    let bitpix = datatype.bitpix()?;
    let out = match bitpix {
        8 => data.iter().map(|&v| datatype.coerce(v) as u8).collect(),
        16 => {
            let words: Vec<i16> = data
                .iter()
                .map(|&v| (datatype.coerce(v) as i16).to_be())
                .collect();
            bytemuck::cast_slice(&words).to_vec()
        }
        32 => {
            let words: Vec<i32> = data
                .iter()
                .map(|&v| (datatype.coerce(v) as i32).to_be())
                .collect();
            bytemuck::cast_slice(&words).to_vec()
        }
        -32 => {
            let words: Vec<u32> = data
                .iter()
                .map(|&v| (v as f32).to_bits().to_be())
                .collect();
            bytemuck::cast_slice(&words).to_vec()
        }
        -64 => {
            let words: Vec<u64> = data.iter().map(|&v| v.to_bits().to_be()).collect();
            bytemuck::cast_slice(&words).to_vec()
        }
        other => return Err(Error::Data(format!("unsupported BITPIX {other}"))),
    };
    Ok(out)
}

const STRUCTURAL_KEYWORDS: &[&str] = &[
    "SIMPLE", "XTENSION", "BITPIX", "NAXIS", "EXTEND", "PCOUNT", "GCOUNT", "END",
];

fn is_structural(keyword: &str) -> bool {
    if STRUCTURAL_KEYWORDS.contains(&keyword) {
        return true;
    }
    keyword
        .strip_prefix("NAXIS")
        .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
}

/// Build a primary header for `data`, merging in caller cards.
///
/// Structural cards are always derived from the buffer; caller-supplied
/// copies of them are discarded.
pub(crate) fn build_primary_header(
    data: &ArrayD<f64>,
    datatype: DataType,
    extra: Option<&Header>,
) -> Result<Header> {
    let bitpix = datatype.bitpix()?;
    let mut hdr = Header::new();
    hdr.set("SIMPLE", Value::Logical(true), Some("file conforms to FITS standard"));
    hdr.set("BITPIX", Value::Integer(bitpix), Some("bits per data element"));
    hdr.set(
        "NAXIS",
        Value::Integer(data.ndim() as i64),
        Some("number of data axes"),
    );
    // NAXIS1 is the fastest-varying axis, i.e. the last storage axis.
    for (i, &len) in data.shape().iter().rev().enumerate() {
        hdr.set(
            &format!("NAXIS{}", i + 1),
            Value::Integer(len as i64),
            None,
        );
    }
    if let Some(extra) = extra {
        for card in extra.iter() {
            if !is_structural(&card.keyword) && card.keyword != "DATASUM" {
                hdr.push(card.clone());
            }
        }
    }
    Ok(hdr)
}

/// Write `data` as a single-HDU FITS file.
pub(crate) fn write(
    path: &Path,
    data: &ArrayD<f64>,
    datatype: DataType,
    extra: Option<&Header>,
    clobber: bool,
) -> Result<()> {
    if !clobber && path.exists() {
        return Err(save_err(path, "file exists and clobber is disabled"));
    }
    let hdr = build_primary_header(data, datatype, extra)
        .map_err(|e| save_err(path, e.to_string()))?;
    let segment = encode(data, datatype).map_err(|e| save_err(path, e.to_string()))?;

    let mut bytes = serialize_header(&hdr);
    let data_offset = bytes.len();
    bytes.resize(data_offset + padded(segment.len()), 0);
    bytes[data_offset..data_offset + segment.len()].copy_from_slice(&segment);

    fs::write(path, &bytes).map_err(|e| save_err(path, e.to_string()))
}

/// Replace the header of one HDU in place, preserving every data segment.
pub(crate) fn rewrite_header(path: &Path, extension: usize, header: &Header) -> Result<()> {
    let (bytes, hdus) = scan_file(path)?;
    let hdu = hdus
        .get(extension)
        .ok_or_else(|| save_err(path, format!("extension {extension} not found")))?;

    let mut out = Vec::with_capacity(bytes.len());
    out.extend_from_slice(&bytes[..hdu.header_start]);
    out.extend_from_slice(&serialize_header(header));
    out.extend_from_slice(&bytes[hdu.data_start..]);
    fs::write(path, &out).map_err(|e| save_err(path, e.to_string()))
}
