//! Boolean quality map.
//!
//! A [`Pixelmap`] marks each element good (`true`) or bad (`false`). On
//! disk it is an integer image where zero means bad; in memory it is a
//! boolean buffer with the same lazy-loading behavior as [`Image`].

use std::cell::Ref;
use std::path::Path;

use ndarray::{ArrayD, IxDyn, Zip};

use crate::codec;
use crate::coord::{self, Key};
use crate::datatype::DataType;
use crate::error::{Error, Result};
use crate::header::Header;
use crate::image::{FileSource, Image};
use crate::lazy::LazySlot;

fn no_data(what: &str) -> Error {
    Error::Data(format!("{what} requires a pixelmap with data"))
}

#[derive(Debug, Clone)]
pub struct Pixelmap {
    source: Option<FileSource>,
    data: LazySlot<bool>,
    readonly: bool,
}

impl Default for Pixelmap {
    fn default() -> Pixelmap {
        Pixelmap::new()
    }
}

impl Pixelmap {
    /// A map with no data and nothing to load.
    pub fn new() -> Pixelmap {
        Pixelmap {
            source: None,
            data: LazySlot::empty(),
            readonly: false,
        }
    }

    /// A map backed by `path`; nonzero file values load as good.
    pub fn from_file(path: &Path) -> Result<Pixelmap> {
        if !path.exists() {
            return Err(Error::Load {
                path: path.display().to_string(),
                reason: String::from("file not found"),
            });
        }
        Ok(Pixelmap {
            source: Some(FileSource::new(path)),
            data: LazySlot::unloaded(),
            readonly: false,
        })
    }

    pub fn extension(mut self, extension: usize) -> Pixelmap {
        if let Some(src) = &mut self.source {
            src.extension = extension;
        }
        self
    }

    /// Select one plane of a 3-D source when loading.
    pub fn plane(mut self, plane: usize) -> Pixelmap {
        if let Some(src) = &mut self.source {
            src.plane = Some(plane);
        }
        self
    }

    pub fn read_only(mut self, readonly: bool) -> Pixelmap {
        self.readonly = readonly;
        self
    }

    pub fn from_data(data: ArrayD<bool>) -> Pixelmap {
        Pixelmap {
            source: None,
            data: LazySlot::filled(data),
            readonly: false,
        }
    }

    fn load(&self) -> Result<()> {
        let Some(src) = &self.source else {
            return Ok(());
        };
        self.data.ensure(|| {
            let (buf, _) = codec::open(&src.path, src.extension)?;
            let buf = match (buf, src.plane) {
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
                    Some(b.index_axis(ndarray::Axis(0), p).to_owned())
                }
                (b, _) => b,
            };
            Ok(buf.map(|b| b.mapv(|v| v != 0.0)))
        })
    }

    /// Borrow the boolean buffer, loading it first if needed.
    pub fn data(&self) -> Result<Option<Ref<'_, ArrayD<bool>>>> {
        self.load()?;
        Ok(self.data.get())
    }

    pub fn set_data(&mut self, data: Option<ArrayD<bool>>) {
        self.data.set(data);
    }

    pub fn is_loaded(&self) -> bool {
        self.data.is_loaded()
    }

    /// User-facing shape, `(X, Y)`. Empty when the map has no data.
    pub fn shape(&self) -> Result<Vec<usize>> {
        self.load()?;
        Ok(match self.data.get() {
            Some(buf) => coord::to_user_shape(buf.shape()),
            None => Vec::new(),
        })
    }

    pub fn xsize(&self) -> Result<usize> {
        Ok(self.shape()?.first().copied().unwrap_or(0))
    }

    pub fn ysize(&self) -> Result<usize> {
        Ok(self.shape()?.get(1).copied().unwrap_or(0))
    }

    pub fn size(&self) -> Result<usize> {
        self.load()?;
        Ok(self.data.get().map_or(0, |b| b.len()))
    }

    /// Number of good elements.
    pub fn count(&self) -> Result<usize> {
        self.load()?;
        let buf = self.data.get().ok_or_else(|| no_data("counting"))?;
        Ok(buf.iter().filter(|&&g| g).count())
    }

    /// Extract the selection addressed by a user key as a new map.
    pub fn get<K: Into<Key>>(&self, key: K) -> Result<Pixelmap> {
        let key = key.into();
        self.load()?;
        match self.data.get() {
            None => Ok(Pixelmap::new()),
            Some(buf) => Ok(Pixelmap::from_data(coord::slice_array(&*buf, &key)?)),
        }
    }

    /// Write another map's values into the selection addressed by a user
    /// key. Both maps need data.
    pub fn set<K: Into<Key>>(&mut self, key: K, value: &Pixelmap) -> Result<()> {
        let key = key.into();
        let vbuf = value.data()?.ok_or_else(|| no_data("assignment"))?;
        self.load()?;
        let buf = self.data.get_mut().ok_or_else(|| no_data("assignment"))?;
        coord::assign_array(buf, &key, &*vbuf)
    }

    /// Elementwise boolean combination with another map of the same shape.
    pub fn logic(&self, op: LogicOp, other: &Pixelmap) -> Result<Pixelmap> {
        self.load()?;
        let a = self.data.get().ok_or_else(|| no_data("logic"))?;
        other.load()?;
        let b = other.data.get().ok_or_else(|| no_data("logic"))?;
        if a.shape() != b.shape() {
            return Err(Error::Data(format!(
                "shape mismatch: {:?} against {:?}",
                coord::to_user_shape(a.shape()),
                coord::to_user_shape(b.shape())
            )));
        }
        Ok(Pixelmap::from_data(
            Zip::from(&*a).and(&*b).map_collect(|&x, &y| op.apply(x, y)),
        ))
    }

    /// In-place counterpart of [`logic`](Pixelmap::logic).
    pub fn logic_assign(&mut self, op: LogicOp, other: &Pixelmap) -> Result<()> {
        let combined = self.logic(op, other)?;
        self.data = combined.data;
        Ok(())
    }

    /// Flip every element, exchanging good and bad.
    pub fn invert(&mut self) -> Result<()> {
        self.load()?;
        let buf = self.data.get_mut().ok_or_else(|| no_data("inversion"))?;
        buf.mapv_inplace(|g| !g);
        Ok(())
    }

    /// Deep copy with the source detached, or `None` when the map has no
    /// data.
    pub fn copy(&self) -> Result<Option<Pixelmap>> {
        self.load()?;
        match self.data.get() {
            None => Ok(None),
            Some(buf) => Ok(Some(Pixelmap::from_data(buf.to_owned()))),
        }
    }

    /// Convert to an [`Image`] of 0/1 values with a `Bool` declared type.
    pub fn as_image(&self) -> Result<Image> {
        self.load()?;
        match self.data.get() {
            None => {
                let mut img = Image::new();
                img.set_datatype(DataType::Bool);
                Ok(img)
            }
            Some(buf) => Ok(Image::from_data_as(
                buf.mapv(|g| g as u8 as f64),
                DataType::Bool,
            )),
        }
    }

    /// Write the map as an integer image (good is 1, bad is 0). The on-disk
    /// type must come from the mask export set.
    pub fn save(
        &self,
        filename: Option<&Path>,
        header: Option<&Header>,
        datatype: DataType,
        clobber: bool,
    ) -> Result<()> {
        if !datatype.mask_export_ok() {
            return Err(Error::Config(format!(
                "datatype {datatype} is not valid for mask export"
            )));
        }
        let source_path = self.source.as_ref().map(|s| s.path.as_path());
        let target = filename
            .or(source_path)
            .ok_or_else(|| Error::Data(String::from("no filename to save to")))?;
        if self.readonly && Some(target) == source_path {
            return Err(Error::Data(format!(
                "pixelmap is read-only: {}",
                target.display()
            )));
        }
        self.load()?;
        let buf = self.data.get().ok_or_else(|| no_data("saving"))?;
        let numeric = buf.mapv(|g| g as u8 as f64);
        codec::write(target, &numeric, datatype, header, clobber)
    }
}

/// A blank map of user extents `xsize` by `ysize`, filled with `value`.
pub fn make_pixelmap(xsize: usize, ysize: usize, value: bool) -> Result<Pixelmap> {
    if xsize == 0 || ysize == 0 {
        return Err(Error::Config(format!(
            "pixelmap extents must be positive, got {xsize}x{ysize}"
        )));
    }
    Ok(Pixelmap::from_data(ArrayD::from_elem(
        IxDyn(&[ysize, xsize]),
        value,
    )))
}

/// Elementwise boolean combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicOp {
    And,
    Or,
    Xor,
}

impl LogicOp {
    pub fn apply(self, a: bool, b: bool) -> bool {
        match self {
            LogicOp::And => a && b,
            LogicOp::Or => a || b,
            LogicOp::Xor => a != b,
        }
    }
}

// Operator sugar; panics on shape mismatch like the dispatcher's error says.
macro_rules! impl_pixelmap_logic_op {
    ($trait:ident, $method:ident, $op:expr) => {
        impl std::ops::$trait<&Pixelmap> for &Pixelmap {
            type Output = Pixelmap;
            fn $method(self, rhs: &Pixelmap) -> Pixelmap {
                self.logic($op, rhs).unwrap_or_else(|e| panic!("{e}"))
            }
        }
    };
}

impl_pixelmap_logic_op!(BitAnd, bitand, LogicOp::And);
impl_pixelmap_logic_op!(BitOr, bitor, LogicOp::Or);
impl_pixelmap_logic_op!(BitXor, bitxor, LogicOp::Xor);

impl std::ops::Not for &Pixelmap {
    type Output = Pixelmap;
    fn not(self) -> Pixelmap {
        let mut out = self
            .copy()
            .unwrap_or_else(|e| panic!("{e}"))
            .unwrap_or_else(|| panic!("{}", no_data("inversion")));
        out.invert().unwrap_or_else(|e| panic!("{e}"));
        out
    }
}
