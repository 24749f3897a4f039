//! Stack of equally-shaped image planes.
//!
//! A [`Cube`] owns a vector of [`Image`] planes and broadcasts arithmetic
//! and normalization across them. Reductions collapse the stack into a
//! single plane; the median reduction can work in row chunks to bound peak
//! memory on large stacks.

use std::path::Path;

use ndarray::{ArrayD, Axis, Dimension, IxDyn, Slice, Zip};

use crate::checksum;
use crate::codec;
use crate::datatype::DataType;
use crate::error::{Error, Result};
use crate::header::Header;
use crate::image::{BinaryOp, Image, Operand, SaveOptions};
use crate::pixelmap::Pixelmap;

fn no_data(what: &str) -> Error {
    Error::Data(format!("{what} requires planes with data"))
}

#[derive(Debug, Clone, Default)]
pub struct Cube {
    planes: Vec<Image>,
}

/// Right-hand side of a stack broadcast.
#[derive(Debug, Clone, Copy)]
pub enum CubeOperand<'a> {
    /// Plane-by-plane pairing; lengths must match.
    Cube(&'a Cube),
    /// The same image against every plane.
    Image(&'a Image),
    Scalar(f64),
}

/// Pixelmap restriction for stack normalization.
#[derive(Debug, Clone, Copy)]
pub enum PixmapArg<'a> {
    None,
    /// One map restricting every plane.
    Shared(&'a Pixelmap),
    /// One map per plane; the list length must match the stack.
    PerPlane(&'a [Pixelmap]),
}

impl Cube {
    pub fn new() -> Cube {
        Cube { planes: Vec::new() }
    }

    /// Build a stack from existing planes; all shapes must agree.
    pub fn from_images(images: Vec<Image>) -> Result<Cube> {
        let mut cube = Cube::new();
        for img in images {
            cube.push(img)?;
        }
        Ok(cube)
    }

    /// Load a stack from the primary HDU of `path`.
    ///
    /// 1-D and 2-D data become a single plane, 3-D one plane per slice of
    /// the slowest axis, 4-D the same after selecting slab 0.
    pub fn from_file(path: &Path) -> Result<Cube> {
        Cube::from_file_ext(path, 0, None)
    }

    /// As [`from_file`](Cube::from_file), with an explicit extension and,
    /// for 4-D data, the slab to take along the slowest axis.
    pub fn from_file_ext(path: &Path, extension: usize, index: Option<usize>) -> Result<Cube> {
        let load_err = |reason: String| Error::Load {
            path: path.display().to_string(),
            reason,
        };
        let (buf, dt) = codec::open(path, extension)?;
        let Some(buf) = buf else {
            return Ok(Cube::new());
        };
        let bufs: Vec<ArrayD<f64>> = match buf.ndim() {
            1 => {
                let n = buf.len();
                vec![buf
                    .into_shape_with_order(IxDyn(&[1, n]))
                    .map_err(|e| load_err(e.to_string()))?]
            }
            2 => vec![buf],
            3 => buf.axis_iter(Axis(0)).map(|v| v.to_owned()).collect(),
            4 => {
                let i = index.unwrap_or(0);
                if i >= buf.shape()[0] {
                    return Err(load_err(format!(
                        "index {i} out of range for {} slabs",
                        buf.shape()[0]
                    )));
                }
                buf.index_axis(Axis(0), i)
                    .axis_iter(Axis(0))
                    .map(|v| v.to_owned())
                    .collect()
            }
            n => return Err(load_err(format!("cannot stack {n}-dimensional data"))),
        };
        Ok(Cube {
            planes: bufs
                .into_iter()
                .map(|b| Image::from_data_as(b, dt))
                .collect(),
        })
    }

    // ── Plane access ──

    pub fn len(&self) -> usize {
        self.planes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.planes.is_empty()
    }

    pub fn plane(&self, i: usize) -> Option<&Image> {
        self.planes.get(i)
    }

    pub fn plane_mut(&mut self, i: usize) -> Option<&mut Image> {
        self.planes.get_mut(i)
    }

    pub fn planes(&self) -> &[Image] {
        &self.planes
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Image> {
        self.planes.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Image> {
        self.planes.iter_mut()
    }

    /// Append a plane; its shape must match the existing planes.
    pub fn push(&mut self, img: Image) -> Result<()> {
        if let Some(first) = self.planes.first() {
            let expected = first.shape()?;
            let actual = img.shape()?;
            if expected != actual {
                return Err(Error::Data(format!(
                    "plane shape {actual:?} does not match stack shape {expected:?}"
                )));
            }
        }
        self.planes.push(img);
        Ok(())
    }

    pub fn xsize(&self) -> Result<usize> {
        match self.planes.first() {
            Some(p) => p.xsize(),
            None => Ok(0),
        }
    }

    pub fn ysize(&self) -> Result<usize> {
        match self.planes.first() {
            Some(p) => p.ysize(),
            None => Ok(0),
        }
    }

    /// Number of planes.
    pub fn zsize(&self) -> usize {
        self.planes.len()
    }

    // ── Broadcast arithmetic ──

    /// Apply a binary operation across every plane.
    pub fn broadcast(&self, op: BinaryOp, rhs: CubeOperand<'_>) -> Result<Cube> {
        let planes = match rhs {
            CubeOperand::Scalar(s) => self
                .planes
                .iter()
                .map(|p| p.binary(op, Operand::Scalar(s)))
                .collect::<Result<Vec<_>>>()?,
            CubeOperand::Image(img) => self
                .planes
                .iter()
                .map(|p| p.binary(op, Operand::Entity(img)))
                .collect::<Result<Vec<_>>>()?,
            CubeOperand::Cube(c) => {
                self.check_len(c.len())?;
                self.planes
                    .iter()
                    .zip(&c.planes)
                    .map(|(p, q)| p.binary(op, Operand::Entity(q)))
                    .collect::<Result<Vec<_>>>()?
            }
        };
        Ok(Cube { planes })
    }

    /// In-place counterpart of [`broadcast`](Cube::broadcast).
    pub fn broadcast_assign(&mut self, op: BinaryOp, rhs: CubeOperand<'_>) -> Result<()> {
        match rhs {
            CubeOperand::Scalar(s) => {
                for p in &mut self.planes {
                    p.binary_assign(op, Operand::Scalar(s))?;
                }
            }
            CubeOperand::Image(img) => {
                for p in &mut self.planes {
                    p.binary_assign(op, Operand::Entity(img))?;
                }
            }
            CubeOperand::Cube(c) => {
                self.check_len(c.len())?;
                for (p, q) in self.planes.iter_mut().zip(&c.planes) {
                    p.binary_assign(op, Operand::Entity(q))?;
                }
            }
        }
        Ok(())
    }

    fn check_len(&self, actual: usize) -> Result<()> {
        if actual != self.planes.len() {
            return Err(Error::LengthMismatch {
                expected: self.planes.len(),
                actual,
            });
        }
        Ok(())
    }

    // ── Reductions ──

    fn reduce_start(&self, what: &str, min_planes: usize) -> Result<()> {
        if self.planes.len() < min_planes {
            return Err(Error::Data(format!(
                "{what} requires at least {min_planes} planes, got {}",
                self.planes.len()
            )));
        }
        Ok(())
    }

    /// Elementwise sum of all planes.
    pub fn sum(&self) -> Result<Image> {
        self.reduce_start("sum", 1)?;
        let mut acc: Option<ArrayD<f64>> = None;
        for p in &self.planes {
            let b = p.data()?.ok_or_else(|| no_data("sum"))?;
            match &mut acc {
                None => acc = Some(b.to_owned()),
                Some(a) => {
                    if a.shape() != b.shape() {
                        return Err(no_data("sum over mismatched planes"));
                    }
                    *a += &*b;
                }
            }
        }
        let acc = acc.ok_or_else(|| no_data("sum"))?;
        Ok(Image::from_data_as(acc, self.planes[0].datatype()))
    }

    /// Elementwise mean of all planes.
    pub fn average(&self) -> Result<Image> {
        let mut out = self.sum()?;
        out.binary_assign(BinaryOp::Div, Operand::Scalar(self.planes.len() as f64))?;
        Ok(out)
    }

    /// Elementwise sample standard deviation (n-1 denominator); requires at
    /// least 2 planes. An explicit `mean` plane avoids recomputing it.
    pub fn stdev(&self, mean: Option<&Image>) -> Result<Image> {
        self.reduce_start("standard deviation", 2)?;
        let mu: ArrayD<f64> = match mean {
            Some(m) => m
                .data()?
                .ok_or_else(|| no_data("standard deviation"))?
                .to_owned(),
            None => {
                let avg = self.average()?;
                let buf = avg.data()?.ok_or_else(|| no_data("standard deviation"))?;
                buf.to_owned()
            }
        };
        let mut acc = ArrayD::<f64>::zeros(mu.raw_dim());
        for p in &self.planes {
            let b = p.data()?.ok_or_else(|| no_data("standard deviation"))?;
            if b.shape() != mu.shape() {
                return Err(no_data("standard deviation over mismatched planes"));
            }
            Zip::from(&mut acc)
                .and(&*b)
                .and(&mu)
                .for_each(|a, &x, &m| *a += (x - m) * (x - m));
        }
        let denom = (self.planes.len() - 1) as f64;
        acc.mapv_inplace(|v| (v / denom).sqrt());
        Ok(Image::from_data_as(acc, self.planes[0].datatype()))
    }

    /// Elementwise median; requires at least 3 planes.
    ///
    /// `buffer_rows` bounds how many storage rows are processed at once
    /// (0 means the whole stack in one pass). The result is identical for
    /// any chunk size.
    pub fn median(&self, buffer_rows: usize) -> Result<Image> {
        self.reduce_start("median", 3)?;
        let n = self.planes.len();

        let bufs = self
            .planes
            .iter()
            .map(|p| p.data()?.ok_or_else(|| no_data("median")))
            .collect::<Result<Vec<_>>>()?;
        let shape = bufs[0].raw_dim();
        for b in &bufs[1..] {
            if b.shape() != shape.slice() {
                return Err(no_data("median over mismatched planes"));
            }
        }

        let rows = shape.slice().first().copied().unwrap_or(0);
        let chunk = if buffer_rows == 0 { rows.max(1) } else { buffer_rows };
        let mut out = ArrayD::<f64>::zeros(shape.clone());
        let mut vals = vec![0.0f64; n];

        let mut r0 = 0;
        while r0 < rows {
            let r1 = (r0 + chunk).min(rows);
            let mut window =
                out.slice_axis_mut(Axis(0), Slice::from(r0 as isize..r1 as isize));
            for (idx, v) in window.indexed_iter_mut() {
                let mut full = idx.slice().to_vec();
                full[0] += r0;
                for (k, b) in bufs.iter().enumerate() {
                    vals[k] = b[&full[..]];
                }
                vals.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                *v = if n % 2 == 1 {
                    vals[n / 2]
                } else {
                    (vals[n / 2 - 1] + vals[n / 2]) / 2.0
                };
            }
            r0 = r1;
        }
        Ok(Image::from_data_as(out, self.planes[0].datatype()))
    }

    // ── Normalization ──

    fn resolve_pmaps<'a>(&self, arg: &PixmapArg<'a>) -> Result<Vec<Option<&'a Pixelmap>>> {
        match *arg {
            PixmapArg::None => Ok(vec![None; self.planes.len()]),
            PixmapArg::Shared(p) => Ok(vec![Some(p); self.planes.len()]),
            PixmapArg::PerPlane(list) => {
                self.check_len(list.len())?;
                Ok(list.iter().map(Some).collect())
            }
        }
    }

    /// Normalize every plane by its mean; returns the per-plane factors.
    pub fn normalize_mean(
        &mut self,
        pmaps: PixmapArg<'_>,
        scale: Option<f64>,
    ) -> Result<Vec<f64>> {
        let maps = self.resolve_pmaps(&pmaps)?;
        self.planes
            .iter_mut()
            .zip(maps)
            .map(|(p, m)| p.normalize_mean(m, scale))
            .collect()
    }

    /// Normalize every plane by its median; returns the per-plane factors.
    pub fn normalize_median(
        &mut self,
        pmaps: PixmapArg<'_>,
        scale: Option<f64>,
    ) -> Result<Vec<f64>> {
        let maps = self.resolve_pmaps(&pmaps)?;
        self.planes
            .iter_mut()
            .zip(maps)
            .map(|(p, m)| p.normalize_median(m, scale))
            .collect()
    }

    /// Normalize every plane by its flux; returns the per-plane factors.
    pub fn normalize_flux(
        &mut self,
        pmaps: PixmapArg<'_>,
        scale: Option<f64>,
    ) -> Result<Vec<f64>> {
        let maps = self.resolve_pmaps(&pmaps)?;
        self.planes
            .iter_mut()
            .zip(maps)
            .map(|(p, m)| p.normalize_flux(m, scale))
            .collect()
    }

    // ── Conversions and persistence ──

    /// Deep copies of every plane.
    pub fn as_images(&self) -> Result<Vec<Image>> {
        self.planes
            .iter()
            .map(|p| p.copy()?.ok_or_else(|| no_data("plane extraction")))
            .collect()
    }

    /// One pixelmap per plane, marking nonzero elements good.
    pub fn as_pixelmaps(&self) -> Result<Vec<Pixelmap>> {
        self.planes
            .iter()
            .map(|p| {
                let b = p.data()?.ok_or_else(|| no_data("pixelmap conversion"))?;
                Ok(Pixelmap::from_data(b.mapv(|v| v != 0.0)))
            })
            .collect()
    }

    /// Deep copy of the whole stack.
    pub fn copy(&self) -> Result<Cube> {
        Ok(Cube {
            planes: self.as_images()?,
        })
    }

    /// Write the stack as a single 3-D primary HDU.
    pub fn save(
        &self,
        filename: &Path,
        header: Option<&Header>,
        options: &SaveOptions,
    ) -> Result<()> {
        self.reduce_start("saving", 1)?;
        let bufs = self
            .planes
            .iter()
            .map(|p| p.data()?.ok_or_else(|| no_data("saving")))
            .collect::<Result<Vec<_>>>()?;
        let plane_shape = bufs[0].shape().to_vec();
        for b in &bufs[1..] {
            if b.shape() != plane_shape {
                return Err(no_data("saving mismatched planes"));
            }
        }

        let mut shape = vec![self.planes.len()];
        shape.extend_from_slice(&plane_shape);
        let mut stacked = ArrayD::<f64>::zeros(IxDyn(&shape));
        for (i, b) in bufs.iter().enumerate() {
            stacked.index_axis_mut(Axis(0), i).assign(&**b);
        }
        drop(bufs);

        codec::write(filename, &stacked, options.datatype, header, options.clobber)?;
        if options.update_datasum {
            checksum::update_datasum(filename, 0)?;
        }
        Ok(())
    }
}

/// A stack of `zsize` blank planes of user extents `xsize` by `ysize`.
pub fn make_cube(
    xsize: usize,
    ysize: usize,
    zsize: usize,
    datatype: DataType,
    value: f64,
) -> Result<Cube> {
    if zsize == 0 {
        return Err(Error::Config(String::from(
            "cube depth must be positive, got 0",
        )));
    }
    let planes = (0..zsize)
        .map(|_| crate::image::make_image(xsize, ysize, datatype, value))
        .collect::<Result<Vec<_>>>()?;
    Ok(Cube { planes })
}

// Operator sugar over the broadcast dispatcher; panics on length or shape
// mismatch like the dispatcher's error says.
macro_rules! impl_cube_binop {
    ($trait:ident, $method:ident, $op:expr) => {
        impl std::ops::$trait<&Cube> for &Cube {
            type Output = Cube;
            fn $method(self, rhs: &Cube) -> Cube {
                self.broadcast($op, CubeOperand::Cube(rhs))
                    .unwrap_or_else(|e| panic!("{e}"))
            }
        }

        impl std::ops::$trait<f64> for &Cube {
            type Output = Cube;
            fn $method(self, rhs: f64) -> Cube {
                self.broadcast($op, CubeOperand::Scalar(rhs))
                    .unwrap_or_else(|e| panic!("{e}"))
            }
        }
    };
}

impl_cube_binop!(Add, add, BinaryOp::Add);
impl_cube_binop!(Sub, sub, BinaryOp::Sub);
impl_cube_binop!(Mul, mul, BinaryOp::Mul);
impl_cube_binop!(Div, div, BinaryOp::Div);

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array;
    use tempfile::tempdir;

    fn plane(fill: f64) -> Image {
        Image::from_data(ArrayD::from_elem(IxDyn(&[2, 3]), fill))
    }

    fn three_planes() -> Cube {
        Cube::from_images(vec![plane(1.0), plane(2.0), plane(6.0)]).unwrap()
    }

    // ---- construction ----

    #[test]
    fn from_images_checks_shapes() {
        let bad = Image::from_data(ArrayD::from_elem(IxDyn(&[4, 4]), 0.0));
        assert!(matches!(
            Cube::from_images(vec![plane(1.0), bad]),
            Err(Error::Data(_))
        ));
    }

    #[test]
    fn make_cube_dimensions() {
        let cube = make_cube(4, 3, 5, DataType::Float32, 1.0).unwrap();
        assert_eq!(cube.len(), 5);
        assert_eq!(cube.xsize().unwrap(), 4);
        assert_eq!(cube.ysize().unwrap(), 3);
        assert_eq!(cube.zsize(), 5);
    }

    #[test]
    fn make_cube_rejects_zero_depth() {
        assert!(matches!(
            make_cube(2, 2, 0, DataType::Float32, 0.0),
            Err(Error::Config(_))
        ));
    }

    // ---- broadcast ----

    #[test]
    fn broadcast_scalar() {
        let cube = three_planes();
        let out = cube.broadcast(BinaryOp::Mul, CubeOperand::Scalar(10.0)).unwrap();
        assert_eq!(out.plane(0).unwrap().pixel(1, 1).unwrap(), 10.0);
        assert_eq!(out.plane(2).unwrap().pixel(1, 1).unwrap(), 60.0);
        // Source is untouched.
        assert_eq!(cube.plane(0).unwrap().pixel(1, 1).unwrap(), 1.0);
    }

    #[test]
    fn broadcast_image_applies_to_every_plane() {
        let cube = three_planes();
        let flat = plane(1.0);
        let out = cube.broadcast(BinaryOp::Add, CubeOperand::Image(&flat)).unwrap();
        assert_eq!(out.plane(2).unwrap().pixel(1, 1).unwrap(), 7.0);
    }

    #[test]
    fn broadcast_cube_pairs_planes() {
        let a = three_planes();
        let b = three_planes();
        let out = a.broadcast(BinaryOp::Sub, CubeOperand::Cube(&b)).unwrap();
        for i in 0..3 {
            assert_eq!(out.plane(i).unwrap().pixel(1, 1).unwrap(), 0.0);
        }
    }

    #[test]
    fn broadcast_length_mismatch() {
        let a = three_planes();
        let b = Cube::from_images(vec![plane(1.0)]).unwrap();
        let r = a.broadcast(BinaryOp::Add, CubeOperand::Cube(&b));
        assert!(matches!(
            r,
            Err(Error::LengthMismatch {
                expected: 3,
                actual: 1
            })
        ));
    }

    #[test]
    fn broadcast_assign_in_place() {
        let mut cube = three_planes();
        cube.broadcast_assign(BinaryOp::Add, CubeOperand::Scalar(1.0)).unwrap();
        assert_eq!(cube.plane(0).unwrap().pixel(1, 1).unwrap(), 2.0);
    }

    #[test]
    fn operator_sugar() {
        let a = three_planes();
        let doubled = &a * 2.0;
        assert_eq!(doubled.plane(1).unwrap().pixel(1, 1).unwrap(), 4.0);
        let diff = &doubled - &a;
        assert_eq!(diff.plane(2).unwrap().pixel(1, 1).unwrap(), 6.0);
    }

    // ---- reductions ----

    #[test]
    fn sum_and_average() {
        let cube = three_planes();
        assert_eq!(cube.sum().unwrap().pixel(2, 2).unwrap(), 9.0);
        assert_eq!(cube.average().unwrap().pixel(2, 2).unwrap(), 3.0);
    }

    #[test]
    fn reductions_on_empty_cube_fail() {
        let cube = Cube::new();
        assert!(matches!(cube.sum(), Err(Error::Data(_))));
        assert!(matches!(cube.average(), Err(Error::Data(_))));
    }

    #[test]
    fn stdev_matches_hand_computation() {
        // Values 1, 2, 6: mean 3, sample variance ((4 + 1 + 9) / 2) = 7.
        let cube = three_planes();
        let s = cube.stdev(None).unwrap();
        let expected = 7.0f64.sqrt();
        assert!((s.pixel(1, 1).unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn stdev_requires_two_planes() {
        let cube = Cube::from_images(vec![plane(1.0)]).unwrap();
        assert!(matches!(cube.stdev(None), Err(Error::Data(_))));
    }

    #[test]
    fn stdev_with_supplied_mean() {
        let cube = three_planes();
        let mu = cube.average().unwrap();
        let a = cube.stdev(Some(&mu)).unwrap();
        let b = cube.stdev(None).unwrap();
        assert_eq!(a.pixel(1, 2).unwrap(), b.pixel(1, 2).unwrap());
    }

    #[test]
    fn median_of_three() {
        let cube = three_planes();
        assert_eq!(cube.median(0).unwrap().pixel(1, 1).unwrap(), 2.0);
    }

    #[test]
    fn median_requires_three_planes() {
        let cube = Cube::from_images(vec![plane(1.0), plane(2.0)]).unwrap();
        assert!(matches!(cube.median(0), Err(Error::Data(_))));
    }

    #[test]
    fn buffered_median_equals_unbuffered() {
        // Distinct values per element so chunk boundaries matter.
        let planes: Vec<Image> = (0..5)
            .map(|k| {
                Image::from_data(
                    Array::from_shape_fn((4, 3), |(r, c)| {
                        ((k * 7 + r * 3 + c) % 11) as f64
                    })
                    .into_dyn(),
                )
            })
            .collect();
        let cube = Cube::from_images(planes).unwrap();

        let full = cube.median(0).unwrap();
        for rows in [1, 2, 3, 100] {
            let chunked = cube.median(rows).unwrap();
            for y in 1..=4i64 {
                for x in 1..=3i64 {
                    assert_eq!(
                        chunked.pixel(x, y).unwrap(),
                        full.pixel(x, y).unwrap(),
                        "chunk size {rows} at ({x}, {y})"
                    );
                }
            }
        }
    }

    #[test]
    fn median_of_four_averages_the_middle_pair() {
        let cube =
            Cube::from_images(vec![plane(1.0), plane(2.0), plane(4.0), plane(9.0)]).unwrap();
        assert_eq!(cube.median(0).unwrap().pixel(1, 1).unwrap(), 3.0);
    }

    // ---- normalization ----

    #[test]
    fn normalize_mean_per_plane_factors() {
        let mut cube = three_planes();
        let factors = cube.normalize_mean(PixmapArg::None, None).unwrap();
        assert_eq!(factors, vec![1.0, 0.5, 1.0 / 6.0]);
        for p in cube.iter() {
            assert_eq!(p.mean(None).unwrap(), 1.0);
        }
    }

    #[test]
    fn normalize_per_plane_list_length_checked() {
        let mut cube = three_planes();
        let maps = vec![crate::pixelmap::make_pixelmap(3, 2, true).unwrap()];
        assert!(matches!(
            cube.normalize_mean(PixmapArg::PerPlane(&maps), None),
            Err(Error::LengthMismatch { .. })
        ));
    }

    #[test]
    fn normalize_flux_with_shared_pixelmap() {
        let mut cube = three_planes();
        let pmap = crate::pixelmap::make_pixelmap(3, 2, true).unwrap();
        let factors = cube
            .normalize_flux(PixmapArg::Shared(&pmap), Some(6.0))
            .unwrap();
        assert_eq!(factors.len(), 3);
        for p in cube.iter() {
            assert!((p.flux(None).unwrap() - 6.0).abs() < 1e-12);
        }
    }

    // ---- copies and conversions ----

    #[test]
    fn copy_is_exclusive() {
        let cube = three_planes();
        let mut dup = cube.copy().unwrap();
        dup.plane_mut(0).unwrap().set_val(99.0).unwrap();
        assert_eq!(cube.plane(0).unwrap().pixel(1, 1).unwrap(), 1.0);
    }

    #[test]
    fn as_pixelmaps_marks_nonzero_good() {
        let cube = Cube::from_images(vec![plane(0.0), plane(5.0)]).unwrap();
        let maps = cube.as_pixelmaps().unwrap();
        assert_eq!(maps[0].count().unwrap(), 0);
        assert_eq!(maps[1].count().unwrap(), 6);
    }

    // ---- persistence ----

    #[test]
    fn save_then_reload_as_planes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stack.fits");
        let cube = three_planes();

        cube.save(&path, None, &SaveOptions::default()).unwrap();

        let back = Cube::from_file(&path).unwrap();
        assert_eq!(back.len(), 3);
        assert_eq!(back.xsize().unwrap(), 3);
        assert_eq!(back.plane(1).unwrap().pixel(1, 1).unwrap(), 2.0);
        assert_eq!(back.plane(2).unwrap().pixel(3, 2).unwrap(), 6.0);
    }

    #[test]
    fn two_dimensional_file_loads_as_one_plane() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("flat.fits");
        let img = plane(3.0);
        img.save(Some(&path), None, &SaveOptions::default()).unwrap();

        let cube = Cube::from_file(&path).unwrap();
        assert_eq!(cube.len(), 1);
        assert_eq!(cube.plane(0).unwrap().pixel(2, 2).unwrap(), 3.0);
    }

    #[test]
    fn four_dimensional_file_selects_a_slab() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hyper.fits");
        let data = Array::from_shape_fn((2, 3, 2, 2), |(s, p, r, c)| {
            (s * 1000 + p * 100 + r * 10 + c) as f64
        })
        .into_dyn();
        codec::write(&path, &data, DataType::Float32, None, true).unwrap();

        let slab0 = Cube::from_file(&path).unwrap();
        assert_eq!(slab0.len(), 3);
        assert_eq!(slab0.plane(1).unwrap().pixel(1, 1).unwrap(), 100.0);

        let slab1 = Cube::from_file_ext(&path, 0, Some(1)).unwrap();
        assert_eq!(slab1.plane(0).unwrap().pixel(1, 1).unwrap(), 1000.0);

        assert!(Cube::from_file_ext(&path, 0, Some(5)).is_err());
    }
}
