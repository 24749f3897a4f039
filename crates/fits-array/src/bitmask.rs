//! Bit-plane quality mask.
//!
//! A [`Bitmask`] packs up to 32 independent [`Pixelmap`] planes into one
//! integer buffer: bit `b` set at an element means that element is bad in
//! plane `b`, so a value of 0 means good everywhere. In conservation mode
//! an all-zero buffer is discarded entirely; an absent buffer always reads
//! as all-good.

use std::cell::{Cell, Ref};
use std::path::Path;

use ndarray::ArrayD;

use crate::codec;
use crate::coord::{self, Key};
use crate::datatype::DataType;
use crate::error::{Error, Result};
use crate::header::Header;
use crate::image::FileSource;
use crate::lazy::LazySlot;
use crate::pixelmap::Pixelmap;

fn no_data(what: &str) -> Error {
    Error::Data(format!("{what} requires a bitmask with data"))
}

#[derive(Debug, Clone)]
pub struct Bitmask {
    source: Option<FileSource>,
    data: LazySlot<u32>,
    datatype: Cell<DataType>,
    conserve: bool,
}

impl Bitmask {
    /// An empty mask. The datatype bounds how many planes fit and must come
    /// from the mask import set (boolean or an integer of at most 32 bits).
    pub fn new(datatype: DataType, conserve: bool) -> Result<Bitmask> {
        if !datatype.mask_import_ok() {
            return Err(Error::Config(format!(
                "datatype {datatype} is not valid for a bitmask"
            )));
        }
        Ok(Bitmask {
            source: None,
            data: LazySlot::empty(),
            datatype: Cell::new(datatype),
            conserve,
        })
    }

    /// A mask backed by `path`; the datatype is taken from the file.
    pub fn from_file(path: &Path, conserve: bool) -> Result<Bitmask> {
        if !path.exists() {
            return Err(Error::Load {
                path: path.display().to_string(),
                reason: String::from("file not found"),
            });
        }
        Ok(Bitmask {
            source: Some(FileSource::new(path)),
            data: LazySlot::unloaded(),
            datatype: Cell::new(DataType::UInt8),
            conserve,
        })
    }

    pub fn extension(mut self, extension: usize) -> Bitmask {
        if let Some(src) = &mut self.source {
            src.extension = extension;
        }
        self
    }

    /// A single-plane mask built from one pixelmap.
    pub fn from_pixelmap(
        pmap: &Pixelmap,
        bit: u32,
        datatype: DataType,
        conserve: bool,
    ) -> Result<Bitmask> {
        let mut mask = Bitmask::new(datatype, conserve)?;
        mask.add_pixelmap(pmap, bit)?;
        Ok(mask)
    }

    fn load(&self) -> Result<()> {
        let Some(src) = &self.source else {
            return Ok(());
        };
        self.data.ensure(|| {
            let (buf, dt) = codec::open(&src.path, src.extension)?;
            if !dt.mask_import_ok() {
                return Err(Error::Load {
                    path: src.path.display().to_string(),
                    reason: format!("datatype {dt} is not valid for a bitmask"),
                });
            }
            self.datatype.set(dt);
            Ok(buf.map(|b| b.mapv(|v| v.max(0.0) as u32)))
        })?;
        if self.conserve {
            self.clean();
        }
        Ok(())
    }

    pub fn datatype(&self) -> DataType {
        self.datatype.get()
    }

    pub fn conserve(&self) -> bool {
        self.conserve
    }

    /// Borrow the integer buffer. `None` means all-good.
    pub fn data(&self) -> Result<Option<Ref<'_, ArrayD<u32>>>> {
        self.load()?;
        Ok(self.data.get())
    }

    pub fn has_data(&self) -> Result<bool> {
        self.load()?;
        Ok(self.data.has_buffer())
    }

    /// Drop the buffer, returning the mask to all-good.
    pub fn del_data(&mut self) {
        self.data.set(None);
    }

    /// User-facing shape, `(X, Y)`. Empty when there is no buffer.
    pub fn shape(&self) -> Result<Vec<usize>> {
        self.load()?;
        Ok(match self.data.get() {
            Some(buf) => coord::to_user_shape(buf.shape()),
            None => Vec::new(),
        })
    }

    fn check_bit(&self, bit: u32) -> Result<()> {
        let bits = self.datatype.get().bits();
        if bit >= bits {
            return Err(Error::Config(format!(
                "bit {bit} does not fit a {}-bit bitmask",
                bits
            )));
        }
        Ok(())
    }

    // ── Plane operations ──

    /// Record `pmap`'s bad elements into plane `bit`.
    ///
    /// Good elements leave the plane untouched, so repeated imports
    /// accumulate badness rather than overwrite it.
    pub fn add_pixelmap(&mut self, pmap: &Pixelmap, bit: u32) -> Result<()> {
        self.check_bit(bit)?;
        let plane = {
            let pbuf = pmap.data()?.ok_or_else(|| {
                Error::Data(String::from("cannot import a pixelmap with no data"))
            })?;
            pbuf.mapv(|good| (!good as u32) << bit)
        };
        self.load()?;
        match self.data.get_mut() {
            Some(buf) => {
                if buf.shape() != plane.shape() {
                    return Err(shape_mismatch(buf.shape(), plane.shape()));
                }
                *buf |= &plane;
            }
            None => self.data.set(Some(plane)),
        }
        if self.conserve {
            self.clean();
        }
        Ok(())
    }

    /// Clear plane `bit` for the elements `pmap` marks bad.
    ///
    /// Elements the map marks good keep any flag they carry, so a partial
    /// removal leaves the rest of the plane intact. Use
    /// [`del_bit`](Bitmask::del_bit) to clear a whole plane.
    pub fn del_pixelmap(&mut self, pmap: &Pixelmap, bit: u32) -> Result<()> {
        self.check_bit(bit)?;
        let plane = {
            let pbuf = pmap.data()?.ok_or_else(|| {
                Error::Data(String::from("cannot remove a pixelmap with no data"))
            })?;
            pbuf.mapv(|good| (!good as u32) << bit)
        };
        self.load()?;
        if let Some(buf) = self.data.get_mut() {
            if buf.shape() != plane.shape() {
                return Err(shape_mismatch(buf.shape(), plane.shape()));
            }
            ndarray::Zip::from(&mut *buf)
                .and(&plane)
                .for_each(|a, &p| *a &= !p);
        }
        if self.conserve {
            self.clean();
        }
        Ok(())
    }

    /// Clear plane `bit` everywhere.
    pub fn del_bit(&mut self, bit: u32) -> Result<()> {
        self.check_bit(bit)?;
        self.load()?;
        if let Some(buf) = self.data.get_mut() {
            let keep = !(1u32 << bit);
            buf.mapv_inplace(|v| v & keep);
        }
        if self.conserve {
            self.clean();
        }
        Ok(())
    }

    /// Union with another mask's bad elements, across all planes.
    pub fn merge(&mut self, other: &Bitmask) -> Result<()> {
        other.load()?;
        let Some(obuf) = other.data.get() else {
            return Ok(());
        };
        self.load()?;
        match self.data.get_mut() {
            Some(buf) => {
                if buf.shape() != obuf.shape() {
                    return Err(shape_mismatch(buf.shape(), obuf.shape()));
                }
                *buf |= &*obuf;
            }
            None => {
                let owned = obuf.to_owned();
                drop(obuf);
                self.data.set(Some(owned));
            }
        }
        if self.conserve {
            self.clean();
        }
        Ok(())
    }

    /// Clear every bit that is set in another mask.
    pub fn unmerge(&mut self, other: &Bitmask) -> Result<()> {
        other.load()?;
        let Some(obuf) = other.data.get() else {
            return Ok(());
        };
        self.load()?;
        if let Some(buf) = self.data.get_mut() {
            if buf.shape() != obuf.shape() {
                return Err(shape_mismatch(buf.shape(), obuf.shape()));
            }
            ndarray::Zip::from(&mut *buf)
                .and(&*obuf)
                .for_each(|a, &b| *a &= !b);
        }
        if self.conserve {
            self.clean();
        }
        Ok(())
    }

    // ── Queries ──

    /// Whether any element is bad in plane `bit`, or in any plane when
    /// `bit` is `None`.
    pub fn has_bit(&self, bit: Option<u32>) -> Result<bool> {
        let mask = self.bit_selector(bit)?;
        self.load()?;
        Ok(match self.data.get() {
            None => false,
            Some(buf) => buf.iter().any(|&v| v & mask != 0),
        })
    }

    /// The planes with at least one bad element, ascending.
    pub fn which_bits(&self) -> Result<Vec<u32>> {
        self.load()?;
        let union = match self.data.get() {
            None => 0,
            Some(buf) => buf.iter().fold(0u32, |acc, &v| acc | v),
        };
        Ok((0..32).filter(|b| union & (1 << b) != 0).collect())
    }

    /// Number of elements bad in plane `bit` (any plane when `None`).
    pub fn count(&self, bit: Option<u32>) -> Result<usize> {
        let mask = self.bit_selector(bit)?;
        self.load()?;
        Ok(match self.data.get() {
            None => 0,
            Some(buf) => buf.iter().filter(|&&v| v & mask != 0).count(),
        })
    }

    /// Extract plane `bit` (or the union of all planes) as a pixelmap.
    ///
    /// An element is good when none of the selected bits are set. A mask
    /// with no buffer yields a pixelmap with no data.
    pub fn to_pixelmap(&self, bit: Option<u32>) -> Result<Pixelmap> {
        let mask = self.bit_selector(bit)?;
        self.load()?;
        match self.data.get() {
            None => Ok(Pixelmap::new()),
            Some(buf) => Ok(Pixelmap::from_data(buf.mapv(|v| v & mask == 0))),
        }
    }

    fn bit_selector(&self, bit: Option<u32>) -> Result<u32> {
        match bit {
            Some(b) => {
                self.check_bit(b)?;
                Ok(1 << b)
            }
            None => Ok(u32::MAX),
        }
    }

    // ── Maintenance ──

    /// In conservation mode, discard the buffer when nothing is bad.
    ///
    /// Which planes have been imported is not recorded, so a later
    /// [`del_bit`](Bitmask::del_bit) of a clean plane is
    /// indistinguishable from one never imported.
    pub fn clean(&self) {
        if !self.conserve {
            return;
        }
        let all_clear = match self.data.get() {
            Some(buf) => buf.iter().all(|&v| v == 0),
            None => false,
        };
        if all_clear {
            self.data.set(None);
        }
    }

    // ── Geometry ──

    /// Extract the selection addressed by a user key as a new mask.
    pub fn get<K: Into<Key>>(&self, key: K) -> Result<Bitmask> {
        self.slice(&key.into())
    }

    pub(crate) fn slice(&self, key: &Key) -> Result<Bitmask> {
        self.load()?;
        let buf = match self.data.get() {
            None => None,
            Some(b) => Some(coord::slice_array(&*b, key)?),
        };
        let out = Bitmask {
            source: None,
            data: match buf {
                Some(b) => LazySlot::filled(b),
                None => LazySlot::empty(),
            },
            datatype: Cell::new(self.datatype.get()),
            conserve: self.conserve,
        };
        out.clean();
        Ok(out)
    }

    /// Reinterpret the buffer with a new user-facing shape; a no-op when
    /// there is no buffer.
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
            .into_shape_with_order(ndarray::IxDyn(&storage))
            .map_err(|e| Error::Config(e.to_string()))?;
        self.data.set(Some(reshaped));
        Ok(())
    }

    /// Transpose a 2-D mask, exchanging the X and Y axes.
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
        Ok(())
    }

    /// Deep copy with the source detached. A bufferless mask copies to
    /// another bufferless (all-good) mask.
    pub fn copy(&self) -> Result<Bitmask> {
        self.load()?;
        let buf = self.data.get().map(|b| b.to_owned());
        Ok(Bitmask {
            source: None,
            data: match buf {
                Some(b) => LazySlot::filled(b),
                None => LazySlot::empty(),
            },
            datatype: Cell::new(self.datatype.get()),
            conserve: self.conserve,
        })
    }

    // ── Persistence ──

    /// Write the mask as an integer image. The on-disk type must come from
    /// the mask export set; a bufferless mask has nothing to write.
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
        self.load()?;
        let buf = self.data.get().ok_or_else(|| no_data("saving"))?;
        let numeric = buf.mapv(|v| v as f64);
        codec::write(target, &numeric, datatype, header, clobber)
    }
}

fn shape_mismatch(a: &[usize], b: &[usize]) -> Error {
    Error::Data(format!(
        "shape mismatch: {:?} against {:?}",
        coord::to_user_shape(a),
        coord::to_user_shape(b)
    ))
}
