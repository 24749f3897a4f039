//! Two-dimensional data entity with lazy loading and an optional quality
//! mask.
//!
//! An [`Image`] couples an `f64` buffer, a declared [`DataType`], and an
//! optional [`Bitmask`]. The buffer is populated from its source file on
//! first access. All user-facing coordinates follow the FITS convention
//! (1-indexed `(X, Y)`, inclusive stops); see the [`coord`](crate::coord)
//! module.

use std::cell::{Cell, Ref};
use std::path::{Path, PathBuf};

use ndarray::{Array2, ArrayD, Axis, IxDyn, Zip};

use crate::bitmask::Bitmask;
use crate::checksum;
use crate::codec;
use crate::coord::{self, Key};
use crate::datatype::DataType;
use crate::error::{Error, Result};
use crate::header::Header;
use crate::lazy::LazySlot;
use crate::pixelmap::Pixelmap;

/// Where an entity's buffer comes from.
#[derive(Debug, Clone)]
pub(crate) struct FileSource {
    pub path: PathBuf,
    pub extension: usize,
    /// For 3-D data segments, the plane to take along the slowest axis.
    pub plane: Option<usize>,
}

impl FileSource {
    pub(crate) fn new(path: &Path) -> FileSource {
        FileSource {
            path: path.to_path_buf(),
            extension: 0,
            plane: None,
        }
    }
}

fn no_data(what: &str) -> Error {
    Error::Data(format!("{what} requires an image with data"))
}

#[derive(Debug, Clone)]
pub struct Image {
    source: Option<FileSource>,
    data: LazySlot<f64>,
    datatype: Cell<DataType>,
    bmask: Option<Bitmask>,
    readonly: bool,
}

impl Default for Image {
    fn default() -> Image {
        Image::new()
    }
}

impl Image {
    /// An entity with no data and nothing to load.
    pub fn new() -> Image {
        Image {
            source: None,
            data: LazySlot::empty(),
            datatype: Cell::new(DataType::Float32),
            bmask: None,
            readonly: false,
        }
    }

    /// An entity backed by `path`, loaded on first data access.
    ///
    /// The file must exist; decoding is deferred.
    pub fn from_file(path: &Path) -> Result<Image> {
        if !path.exists() {
            return Err(Error::Load {
                path: path.display().to_string(),
                reason: String::from("file not found"),
            });
        }
        Ok(Image {
            source: Some(FileSource::new(path)),
            data: LazySlot::unloaded(),
            datatype: Cell::new(DataType::Float32),
            bmask: None,
            readonly: false,
        })
    }

    /// Select a different extension of the source file (0 is the primary).
    pub fn extension(mut self, extension: usize) -> Image {
        if let Some(src) = &mut self.source {
            src.extension = extension;
        }
        self
    }

    /// Take one plane of a 3-D data segment (0-indexed along the slow axis).
    pub fn plane(mut self, plane: usize) -> Image {
        if let Some(src) = &mut self.source {
            src.plane = Some(plane);
        }
        self
    }

    /// Forbid saving back over the source file.
    pub fn read_only(mut self, readonly: bool) -> Image {
        self.readonly = readonly;
        self
    }

    /// An entity wrapping an in-memory buffer (storage order, Y rows by
    /// X columns).
    pub fn from_data(data: ArrayD<f64>) -> Image {
        Image::from_data_as(data, DataType::Float32)
    }

    pub fn from_data_as(data: ArrayD<f64>, datatype: DataType) -> Image {
        Image {
            source: None,
            data: LazySlot::filled(data),
            datatype: Cell::new(datatype),
            bmask: None,
            readonly: false,
        }
    }

    fn load(&self) -> Result<()> {
        let Some(src) = &self.source else {
            return Ok(());
        };
        self.data.ensure(|| {
            let (buf, dt) = codec::open(&src.path, src.extension)?;
            self.datatype.set(dt);
            match (buf, src.plane) {
                (Some(b), Some(p)) if b.ndim() == 3 => {
                    if p >= b.shape()[0] {
                        return Err(Error::Load {
                            path: src.path.display().to_string(),
                            reason: format!(
                                "plane {p} out of range for {} planes",
                                b.shape()[0]
                            ),
                        });
                    }
                    Ok(Some(b.index_axis(Axis(0), p).to_owned()))
                }
                (b, _) => Ok(b),
            }
        })
    }

    // ── Buffer access ──

    /// Borrow the data buffer, loading it from the source first if needed.
    ///
    /// `None` means the entity has no data. Drop the borrow before calling
    /// anything that mutates the buffer.
    pub fn data(&self) -> Result<Option<Ref<'_, ArrayD<f64>>>> {
        self.load()?;
        Ok(self.data.get())
    }

    /// Mutable access to the data buffer, loading first if needed.
    pub fn data_mut(&mut self) -> Result<Option<&mut ArrayD<f64>>> {
        self.load()?;
        Ok(self.data.get_mut())
    }

    /// Install (or clear) the buffer directly, suppressing any pending load.
    pub fn set_data(&mut self, data: Option<ArrayD<f64>>) {
        self.data.set(data);
    }

    /// Whether the buffer has been populated (true for in-memory entities).
    pub fn is_loaded(&self) -> bool {
        self.data.is_loaded()
    }

    /// User-facing shape, `(X, Y, ...)`. Empty when the entity has no data.
    pub fn shape(&self) -> Result<Vec<usize>> {
        self.load()?;
        Ok(match self.data.get() {
            Some(buf) => coord::to_user_shape(buf.shape()),
            None => Vec::new(),
        })
    }

    /// Extent along the user X axis (0 when there is no data).
    pub fn xsize(&self) -> Result<usize> {
        Ok(self.shape()?.first().copied().unwrap_or(0))
    }

    /// Extent along the user Y axis (0 when there is no data).
    pub fn ysize(&self) -> Result<usize> {
        Ok(self.shape()?.get(1).copied().unwrap_or(0))
    }

    /// Total element count.
    pub fn size(&self) -> Result<usize> {
        self.load()?;
        Ok(self.data.get().map_or(0, |b| b.len()))
    }

    /// The declared element type. For file-backed entities this is only
    /// meaningful once the data has been loaded.
    pub fn datatype(&self) -> DataType {
        self.datatype.get()
    }

    /// Change the declared type without touching the buffer. Use
    /// [`astype`](Image::astype) for an entity with coerced values.
    pub fn set_datatype(&mut self, datatype: DataType) {
        self.datatype.set(datatype);
    }

    // ── Indexing ──

    /// Extract the selection addressed by a user key as a new entity.
    ///
    /// The result is an eager copy carrying the same declared type; any
    /// quality mask is sliced identically. An entity without data yields
    /// another entity without data.
    pub fn get<K: Into<Key>>(&self, key: K) -> Result<Image> {
        let key = key.into();
        self.load()?;
        let sub = match self.data.get() {
            None => return Ok(self.derived(None)),
            Some(buf) => coord::slice_array(&*buf, &key)?,
        };
        let bmask = match &self.bmask {
            Some(m) => Some(m.slice(&key)?),
            None => None,
        };
        let mut out = Image::from_data_as(sub, self.datatype.get());
        out.bmask = bmask;
        Ok(out)
    }

    /// Assign another entity's data into the selection addressed by a user
    /// key. The value's element count must match the selection.
    pub fn set<K: Into<Key>>(&mut self, key: K, value: &Image) -> Result<()> {
        let key = key.into();
        value.load()?;
        let vbuf = value.data.get().ok_or_else(|| no_data("assignment value"))?;
        self.load()?;
        let buf = self
            .data
            .get_mut()
            .ok_or_else(|| no_data("indexed assignment"))?;
        coord::assign_array(buf, &key, &*vbuf)
    }

    /// The value at user coordinates `(x, y)`.
    pub fn pixel(&self, x: i64, y: i64) -> Result<f64> {
        self.load()?;
        let buf = self.data.get().ok_or_else(|| no_data("pixel access"))?;
        let sub = coord::slice_array(&*buf, &Key::from((x, y)))?;
        sub.first().copied().ok_or_else(|| no_data("pixel access"))
    }

    /// Set the value at user coordinates `(x, y)`.
    pub fn set_pixel(&mut self, x: i64, y: i64, value: f64) -> Result<()> {
        self.load()?;
        let buf = self.data.get_mut().ok_or_else(|| no_data("pixel access"))?;
        let v = ndarray::arr0(value).into_dyn();
        coord::assign_array(buf, &Key::from((x, y)), &v)
    }

    /// Extract a rectangular region bounded by user coordinates
    /// `(x0, y0)` through `(x1, y1)` inclusive.
    ///
    /// All four bounds must lie inside the data extents and be ordered.
    pub fn extract_region(&self, x0: i64, y0: i64, x1: i64, y1: i64) -> Result<Image> {
        let xsize = self.xsize()? as i64;
        let ysize = self.ysize()? as i64;
        if x0 < 1 || y0 < 1 || x1 < x0 || y1 < y0 || x1 > xsize || y1 > ysize {
            return Err(Error::Range(format!(
                "region ({x0}, {y0})..({x1}, {y1}) exceeds extents {xsize}x{ysize}"
            )));
        }
        self.get((x0..=x1, y0..=y1))
    }

    /// A new entity carrying the same declared type and mask.
    fn derived(&self, buf: Option<ArrayD<f64>>) -> Image {
        Image {
            source: None,
            data: match buf {
                Some(b) => LazySlot::filled(b),
                None => LazySlot::empty(),
            },
            datatype: Cell::new(self.datatype.get()),
            bmask: self.bmask.clone(),
            readonly: false,
        }
    }

    /// Deep copy with the source detached, or `None` when the entity has no
    /// data. Mutating the copy never affects the original.
    pub fn copy(&self) -> Result<Option<Image>> {
        self.load()?;
        match self.data.get() {
            None => Ok(None),
            Some(buf) => Ok(Some(self.derived(Some(buf.to_owned())))),
        }
    }

    // ── Arithmetic ──

    /// Elementwise binary arithmetic.
    ///
    /// The result carries this entity's declared type and quality mask. An
    /// operand entity without data leaves this entity's values unchanged;
    /// if this entity itself has no data the result is another empty
    /// entity. Mismatched shapes fail with a `Data` error.
    pub fn binary(&self, op: BinaryOp, rhs: Operand<'_>) -> Result<Image> {
        self.load()?;
        let Some(buf) = self.data.get() else {
            return Ok(self.derived(None));
        };
        let out = match rhs {
            Operand::Scalar(s) => buf.mapv(|a| op.apply(a, s)),
            Operand::Entity(other) => {
                other.load()?;
                match other.data.get() {
                    None => buf.to_owned(),
                    Some(b) => {
                        if b.shape() != buf.shape() {
                            return Err(shape_mismatch(buf.shape(), b.shape()));
                        }
                        Zip::from(&*buf).and(&*b).map_collect(|&a, &c| op.apply(a, c))
                    }
                }
            }
        };
        drop(buf);
        Ok(self.derived(Some(out)))
    }

    /// In-place counterpart of [`binary`](Image::binary).
    ///
    /// Fails with a `Data` error when this entity has no buffer; an operand
    /// entity without data is a no-op.
    pub fn binary_assign(&mut self, op: BinaryOp, rhs: Operand<'_>) -> Result<()> {
        self.load()?;
        let buf = self
            .data
            .get_mut()
            .ok_or_else(|| no_data("in-place arithmetic"))?;
        match rhs {
            Operand::Scalar(s) => buf.mapv_inplace(|a| op.apply(a, s)),
            Operand::Entity(other) => {
                other.load()?;
                let Some(b) = other.data.get() else {
                    return Ok(());
                };
                if b.shape() != buf.shape() {
                    return Err(shape_mismatch(buf.shape(), b.shape()));
                }
                Zip::from(&mut *buf)
                    .and(&*b)
                    .for_each(|a, &c| *a = op.apply(*a, c));
            }
        }
        Ok(())
    }

    // Scalar on the left of a non-commutative operation.
    fn binary_scalar_lhs(&self, op: BinaryOp, lhs: f64) -> Result<Image> {
        self.load()?;
        let Some(buf) = self.data.get() else {
            return Ok(self.derived(None));
        };
        let out = buf.mapv(|a| op.apply(lhs, a));
        drop(buf);
        Ok(self.derived(Some(out)))
    }

    /// Elementwise unary arithmetic; same result rules as
    /// [`binary`](Image::binary).
    pub fn unary(&self, op: UnaryOp) -> Result<Image> {
        self.load()?;
        let Some(buf) = self.data.get() else {
            return Ok(self.derived(None));
        };
        let out = buf.mapv(|a| op.apply(a));
        drop(buf);
        Ok(self.derived(Some(out)))
    }

    // ── Shape changes ──

    /// Reinterpret the buffer with a new user-facing shape. The element
    /// count must be unchanged. An entity without data is left untouched.
    pub fn reshape(&mut self, user_shape: &[usize]) -> Result<()> {
        self.load()?;
        let Some(buf) = self.data.take() else {
            return Ok(());
        };
        let storage: Vec<usize> = user_shape.iter().rev().copied().collect();
        let count: usize = storage.iter().product();
        if count != buf.len() {
            let len = buf.len();
            self.data.set(Some(buf));
            return Err(Error::Config(format!(
                "cannot reshape {len} elements to {user_shape:?}"
            )));
        }
        let reshaped = buf
            .into_shape_with_order(IxDyn(&storage))
            .map_err(|e| Error::Config(e.to_string()))?;
        self.data.set(Some(reshaped));
        if let Some(m) = &mut self.bmask {
            m.reshape(user_shape)?;
        }
        Ok(())
    }

    /// Transpose a 2-D entity, exchanging the X and Y axes.
    pub fn swapaxes(&mut self) -> Result<()> {
        self.load()?;
        let Some(mut buf) = self.data.take() else {
            return Ok(());
        };
        if buf.ndim() != 2 {
            let ndim = buf.ndim();
            self.data.set(Some(buf));
            return Err(Error::Config(format!(
                "axis swap requires 2-D data, got {ndim} axes"
            )));
        }
        buf.swap_axes(0, 1);
        self.data.set(Some(buf));
        if let Some(m) = &mut self.bmask {
            m.swapaxes()?;
        }
        Ok(())
    }

    /// Block-sum binning by `|xbin|` columns and `|ybin|` rows; a negative
    /// factor also reverses that axis. Trailing elements that do not fill a
    /// block are dropped. The result carries no quality mask.
    pub fn bin(&self, xbin: i64, ybin: i64) -> Result<Image> {
        if xbin == 0 || ybin == 0 {
            return Err(Error::Config(String::from("binning factor of 0")));
        }
        self.load()?;
        let buf = self.data.get().ok_or_else(|| no_data("binning"))?;
        if buf.ndim() != 2 {
            return Err(Error::Config(format!(
                "binning requires 2-D data, got {} axes",
                buf.ndim()
            )));
        }
        let rows = buf.shape()[0];
        let cols = buf.shape()[1];
        let by = ybin.unsigned_abs() as usize;
        let bx = xbin.unsigned_abs() as usize;
        let out_rows = rows / by;
        let out_cols = cols / bx;

        let mut out = Array2::<f64>::zeros((out_rows, out_cols));
        for r in 0..out_rows {
            for c in 0..out_cols {
                let mut sum = 0.0;
                for i in 0..by {
                    for j in 0..bx {
                        sum += buf[[r * by + i, c * bx + j]];
                    }
                }
                out[[r, c]] = sum;
            }
        }
        if ybin < 0 {
            out.invert_axis(Axis(0));
        }
        if xbin < 0 {
            out.invert_axis(Axis(1));
        }
        Ok(Image::from_data_as(out.into_dyn(), self.datatype.get()))
    }

    /// Reverse the Y axis.
    pub fn flip(&self) -> Result<Image> {
        self.bin(1, -1)
    }

    /// Reverse the X axis.
    pub fn flop(&self) -> Result<Image> {
        self.bin(-1, 1)
    }

    // ── Type coercion and fills ──

    /// A new entity declared as `datatype`, every stored value coerced to
    /// its representable range. The mask carries forward; the original is
    /// left untouched.
    pub fn astype(&self, datatype: DataType) -> Result<Image> {
        self.load()?;
        let buf = match self.data.get() {
            None => None,
            Some(b) => Some(b.mapv(|v| datatype.coerce(v))),
        };
        let out = self.derived(buf);
        out.datatype.set(datatype);
        Ok(out)
    }

    /// Coerce to 64-bit integer values.
    pub fn to_int(&self) -> Result<Image> {
        self.astype(DataType::Int64)
    }

    /// Coerce to 64-bit float values.
    pub fn to_float(&self) -> Result<Image> {
        self.astype(DataType::Float64)
    }

    /// Fill every element with `value`, coerced to the declared type.
    pub fn set_val(&mut self, value: f64) -> Result<()> {
        self.load()?;
        let buf = self.data.get_mut().ok_or_else(|| no_data("fill"))?;
        buf.fill(self.datatype.get().coerce(value));
        Ok(())
    }

    pub fn set_zero(&mut self) -> Result<()> {
        self.set_val(0.0)
    }

    // ── Quality mask ──

    pub fn has_bitmask(&self) -> bool {
        self.bmask.is_some()
    }

    pub fn bitmask(&self) -> Option<&Bitmask> {
        self.bmask.as_ref()
    }

    pub fn bitmask_mut(&mut self) -> Option<&mut Bitmask> {
        self.bmask.as_mut()
    }

    pub fn set_bitmask(&mut self, bmask: Option<Bitmask>) {
        self.bmask = bmask;
    }

    // ── Non-number handling ──

    /// Whether any element is NaN or infinite.
    pub fn has_nonnumbers(&self) -> Result<bool> {
        self.load()?;
        let buf = self.data.get().ok_or_else(|| no_data("non-number scan"))?;
        Ok(buf.iter().any(|v| !v.is_finite()))
    }

    pub fn count_nonnumbers(&self) -> Result<usize> {
        self.load()?;
        let buf = self.data.get().ok_or_else(|| no_data("non-number scan"))?;
        Ok(buf.iter().filter(|v| !v.is_finite()).count())
    }

    /// A pixelmap marking finite elements as good.
    pub fn map_nonnumbers(&self) -> Result<Pixelmap> {
        self.load()?;
        let buf = self.data.get().ok_or_else(|| no_data("non-number scan"))?;
        Ok(Pixelmap::from_data(buf.mapv(|v| v.is_finite())))
    }

    /// A pixelmap marking elements inside `[lo, hi]` as good. An open bound
    /// is unconstrained; non-finite elements are always bad.
    pub fn thresh_to_pixelmap(&self, lo: Option<f64>, hi: Option<f64>) -> Result<Pixelmap> {
        self.load()?;
        let buf = self.data.get().ok_or_else(|| no_data("thresholding"))?;
        Ok(Pixelmap::from_data(buf.mapv(|v| {
            v.is_finite() && lo.is_none_or(|l| v >= l) && hi.is_none_or(|h| v <= h)
        })))
    }

    // ── Statistics ──

    /// The values entering a statistic, optionally restricted to a
    /// pixelmap's good elements.
    fn stat_values(&self, pmap: Option<&Pixelmap>) -> Result<Vec<f64>> {
        self.load()?;
        let buf = self.data.get().ok_or_else(|| no_data("statistics"))?;
        match pmap {
            None => Ok(buf.iter().copied().collect()),
            Some(p) => {
                let mask = p.data()?.ok_or_else(|| no_data("pixelmap restriction"))?;
                if mask.shape() != buf.shape() {
                    return Err(shape_mismatch(buf.shape(), mask.shape()));
                }
                Ok(buf
                    .iter()
                    .zip(mask.iter())
                    .filter(|(_, &good)| good)
                    .map(|(&v, _)| v)
                    .collect())
            }
        }
    }

    pub fn mean(&self, pmap: Option<&Pixelmap>) -> Result<f64> {
        let vals = self.stat_values(pmap)?;
        if vals.is_empty() {
            return Err(no_data("mean"));
        }
        Ok(vals.iter().sum::<f64>() / vals.len() as f64)
    }

    /// Median of the selected values; even counts average the middle pair.
    pub fn median(&self, pmap: Option<&Pixelmap>) -> Result<f64> {
        let mut vals = self.stat_values(pmap)?;
        if vals.is_empty() {
            return Err(no_data("median"));
        }
        vals.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let n = vals.len();
        if n % 2 == 1 {
            Ok(vals[n / 2])
        } else {
            Ok((vals[n / 2 - 1] + vals[n / 2]) / 2.0)
        }
    }

    /// Sum of the selected values.
    pub fn flux(&self, pmap: Option<&Pixelmap>) -> Result<f64> {
        Ok(self.stat_values(pmap)?.iter().sum())
    }

    /// Sum of the absolute selected values.
    pub fn absflux(&self, pmap: Option<&Pixelmap>) -> Result<f64> {
        Ok(self.stat_values(pmap)?.iter().map(|v| v.abs()).sum())
    }

    fn normalize_by(&mut self, statistic: f64, scale: Option<f64>) -> Result<f64> {
        if statistic == 0.0 || !statistic.is_finite() {
            return Err(Error::Data(format!(
                "cannot normalize by statistic {statistic}"
            )));
        }
        let factor = scale.unwrap_or(1.0) / statistic;
        self.binary_assign(BinaryOp::Mul, Operand::Scalar(factor))?;
        Ok(factor)
    }

    /// Scale the data so its mean becomes `scale` (1 by default). Returns
    /// the applied factor.
    pub fn normalize_mean(&mut self, pmap: Option<&Pixelmap>, scale: Option<f64>) -> Result<f64> {
        let m = self.mean(pmap)?;
        self.normalize_by(m, scale)
    }

    /// Scale the data so its median becomes `scale` (1 by default).
    pub fn normalize_median(
        &mut self,
        pmap: Option<&Pixelmap>,
        scale: Option<f64>,
    ) -> Result<f64> {
        let m = self.median(pmap)?;
        self.normalize_by(m, scale)
    }

    /// Scale the data so its flux becomes `scale` (1 by default).
    pub fn normalize_flux(&mut self, pmap: Option<&Pixelmap>, scale: Option<f64>) -> Result<f64> {
        let m = self.flux(pmap)?;
        self.normalize_by(m, scale)
    }

    // ── Persistence ──

    /// Write the entity to `filename`, or back over its source file when no
    /// filename is given. A read-only entity refuses to overwrite its
    /// source.
    pub fn save(
        &self,
        filename: Option<&Path>,
        header: Option<&Header>,
        options: &SaveOptions,
    ) -> Result<()> {
        let source_path = self.source.as_ref().map(|s| s.path.as_path());
        let target = filename
            .or(source_path)
            .ok_or_else(|| Error::Data(String::from("no filename to save to")))?;
        if self.readonly && Some(target) == source_path {
            return Err(Error::Data(format!(
                "image is read-only: {}",
                target.display()
            )));
        }
        self.load()?;
        let buf = self.data.get().ok_or_else(|| no_data("saving"))?;
        codec::write(target, &buf, options.datatype, header, options.clobber)?;
        drop(buf);
        if options.update_datasum {
            checksum::update_datasum(target, 0)?;
        }
        Ok(())
    }
}

fn shape_mismatch(a: &[usize], b: &[usize]) -> Error {
    Error::Data(format!(
        "shape mismatch: {:?} against {:?}",
        coord::to_user_shape(a),
        coord::to_user_shape(b)
    ))
}

/// A blank entity of user extents `xsize` by `ysize`, filled with `value`
/// coerced to `datatype`.
pub fn make_image(xsize: usize, ysize: usize, datatype: DataType, value: f64) -> Result<Image> {
    if xsize == 0 || ysize == 0 {
        return Err(Error::Config(format!(
            "image extents must be positive, got {xsize}x{ysize}"
        )));
    }
    let buf = ArrayD::from_elem(IxDyn(&[ysize, xsize]), datatype.coerce(value));
    Ok(Image::from_data_as(buf, datatype))
}

/// Options for [`Image::save`].
#[derive(Debug, Clone, Copy)]
pub struct SaveOptions {
    /// On-disk element type.
    pub datatype: DataType,
    /// Overwrite an existing file.
    pub clobber: bool,
    /// Refresh the DATASUM card after writing.
    pub update_datasum: bool,
}

impl Default for SaveOptions {
    fn default() -> SaveOptions {
        SaveOptions {
            datatype: DataType::Float32,
            clobber: true,
            update_datasum: true,
        }
    }
}

// ── Arithmetic vocabulary ──

/// Elementwise binary operation over `f64` values.
///
/// Integer-flavored operations (shifts and bitwise logic) truncate both
/// operands; out-of-range shift amounts yield 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    /// Division rounded toward negative infinity.
    FloorDiv,
    /// Floored modulo; the result takes the divisor's sign.
    Rem,
    Pow,
    Shl,
    Shr,
    And,
    Or,
    Xor,
}

impl BinaryOp {
    pub fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::FloorDiv => (a / b).floor(),
            BinaryOp::Rem => a - b * (a / b).floor(),
            BinaryOp::Pow => a.powf(b),
            BinaryOp::Shl => {
                let s = b as i64;
                if (0..64).contains(&s) {
                    ((a as i64) << s) as f64
                } else {
                    0.0
                }
            }
            BinaryOp::Shr => {
                let s = b as i64;
                if (0..64).contains(&s) {
                    ((a as i64) >> s) as f64
                } else {
                    0.0
                }
            }
            BinaryOp::And => ((a as i64) & (b as i64)) as f64,
            BinaryOp::Or => ((a as i64) | (b as i64)) as f64,
            BinaryOp::Xor => ((a as i64) ^ (b as i64)) as f64,
        }
    }
}

/// Elementwise unary operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Identity; yields a fresh entity with the same values.
    Pos,
    Neg,
    Abs,
    /// Logical not: 0 becomes 1, everything else 0.
    Not,
}

impl UnaryOp {
    pub fn apply(self, a: f64) -> f64 {
        match self {
            UnaryOp::Pos => a,
            UnaryOp::Neg => -a,
            UnaryOp::Abs => a.abs(),
            UnaryOp::Not => {
                if a == 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

/// Right-hand side of a binary operation.
#[derive(Debug, Clone, Copy)]
pub enum Operand<'a> {
    Entity(&'a Image),
    Scalar(f64),
}

impl<'a> From<&'a Image> for Operand<'a> {
    fn from(img: &'a Image) -> Operand<'a> {
        Operand::Entity(img)
    }
}

impl From<f64> for Operand<'_> {
    fn from(v: f64) -> Operand<'static> {
        Operand::Scalar(v)
    }
}

// Operator sugar over the dispatchers. Like the storage library's own
// elementwise operators, these panic on shape mismatch; use the dispatcher
// methods to handle errors.
macro_rules! impl_image_binop {
    ($trait:ident, $method:ident, $op:expr) => {
        impl std::ops::$trait<&Image> for &Image {
            type Output = Image;
            fn $method(self, rhs: &Image) -> Image {
                self.binary($op, Operand::Entity(rhs))
                    .unwrap_or_else(|e| panic!("{e}"))
            }
        }

        impl std::ops::$trait<f64> for &Image {
            type Output = Image;
            fn $method(self, rhs: f64) -> Image {
                self.binary($op, Operand::Scalar(rhs))
                    .unwrap_or_else(|e| panic!("{e}"))
            }
        }
    };
}

macro_rules! impl_image_binop_assign {
    ($trait:ident, $method:ident, $op:expr) => {
        impl std::ops::$trait<&Image> for Image {
            fn $method(&mut self, rhs: &Image) {
                self.binary_assign($op, Operand::Entity(rhs))
                    .unwrap_or_else(|e| panic!("{e}"))
            }
        }

        impl std::ops::$trait<f64> for Image {
            fn $method(&mut self, rhs: f64) {
                self.binary_assign($op, Operand::Scalar(rhs))
                    .unwrap_or_else(|e| panic!("{e}"))
            }
        }
    };
}

// Scalar-on-the-left forms, so `2.0 * &img` reads as naturally as
// `&img * 2.0`.
macro_rules! impl_scalar_binop {
    ($trait:ident, $method:ident, $op:expr) => {
        impl std::ops::$trait<&Image> for f64 {
            type Output = Image;
            fn $method(self, rhs: &Image) -> Image {
                rhs.binary_scalar_lhs($op, self)
                    .unwrap_or_else(|e| panic!("{e}"))
            }
        }
    };
}

impl_image_binop!(Add, add, BinaryOp::Add);
impl_image_binop!(Sub, sub, BinaryOp::Sub);
impl_image_binop!(Mul, mul, BinaryOp::Mul);
impl_image_binop!(Div, div, BinaryOp::Div);
impl_image_binop!(Rem, rem, BinaryOp::Rem);
impl_image_binop!(Shl, shl, BinaryOp::Shl);
impl_image_binop!(Shr, shr, BinaryOp::Shr);
impl_image_binop!(BitAnd, bitand, BinaryOp::And);
impl_image_binop!(BitOr, bitor, BinaryOp::Or);
impl_image_binop!(BitXor, bitxor, BinaryOp::Xor);
impl_image_binop_assign!(AddAssign, add_assign, BinaryOp::Add);
impl_image_binop_assign!(SubAssign, sub_assign, BinaryOp::Sub);
impl_image_binop_assign!(MulAssign, mul_assign, BinaryOp::Mul);
impl_image_binop_assign!(DivAssign, div_assign, BinaryOp::Div);
impl_image_binop_assign!(RemAssign, rem_assign, BinaryOp::Rem);
impl_scalar_binop!(Add, add, BinaryOp::Add);
impl_scalar_binop!(Sub, sub, BinaryOp::Sub);
impl_scalar_binop!(Mul, mul, BinaryOp::Mul);
impl_scalar_binop!(Div, div, BinaryOp::Div);
impl_scalar_binop!(Rem, rem, BinaryOp::Rem);

impl std::ops::Neg for &Image {
    type Output = Image;
    fn neg(self) -> Image {
        self.unary(UnaryOp::Neg).unwrap_or_else(|e| panic!("{e}"))
    }
}

impl std::ops::Not for &Image {
    type Output = Image;
    fn not(self) -> Image {
        self.unary(UnaryOp::Not).unwrap_or_else(|e| panic!("{e}"))
    }
}
