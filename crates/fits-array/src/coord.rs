//! FITS-convention coordinate translation.
//!
//! User-facing coordinates are 1-indexed in natural `(X, Y)` axis order with
//! inclusive slice stops; the storage buffer is 0-indexed in reversed
//! `(row, col) = (Y, X)` order with exclusive stops. This module owns the
//! translation between the two and the eager-copy slicing built on it.
//!
//! Index `0` does not exist in the FITS convention and is rejected on every
//! axis. Negative indices count from the end (`-1` is the last element).

use ndarray::{ArrayD, Axis, IxDyn, Slice};

use crate::error::{Error, Result};

/// One axis selection: a single element or a span.
///
/// Values are in the user convention (1-indexed, inclusive stop). `Span`
/// endpoints of `None` mean "from the first" / "through the last".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Index {
    At(i64),
    Span {
        start: Option<i64>,
        stop: Option<i64>,
        step: i64,
    },
}

impl Index {
    /// Select a single element.
    pub fn at(i: i64) -> Index {
        Index::At(i)
    }

    /// Select a whole axis.
    pub fn full() -> Index {
        Index::Span {
            start: None,
            stop: None,
            step: 1,
        }
    }

    /// Select `start` through `stop` inclusive.
    pub fn span(start: i64, stop: i64) -> Index {
        Index::Span {
            start: Some(start),
            stop: Some(stop),
            step: 1,
        }
    }

    /// Select with an explicit step; negative steps walk the axis backwards
    /// from `start` down through `stop`.
    pub fn span_step(start: Option<i64>, stop: Option<i64>, step: i64) -> Index {
        Index::Span { start, stop, step }
    }
}

impl From<i64> for Index {
    fn from(i: i64) -> Index {
        Index::At(i)
    }
}

impl From<std::ops::RangeFull> for Index {
    fn from(_: std::ops::RangeFull) -> Index {
        Index::full()
    }
}

impl From<std::ops::RangeInclusive<i64>> for Index {
    fn from(r: std::ops::RangeInclusive<i64>) -> Index {
        Index::span(*r.start(), *r.end())
    }
}

impl From<std::ops::RangeFrom<i64>> for Index {
    fn from(r: std::ops::RangeFrom<i64>) -> Index {
        Index::Span {
            start: Some(r.start),
            stop: None,
            step: 1,
        }
    }
}

impl From<std::ops::RangeToInclusive<i64>> for Index {
    fn from(r: std::ops::RangeToInclusive<i64>) -> Index {
        Index::Span {
            start: None,
            stop: Some(r.end),
            step: 1,
        }
    }
}

/// A full user key: one axis selection or an `(X, Y)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    One(Index),
    Two(Index, Index),
}

impl From<Index> for Key {
    fn from(i: Index) -> Key {
        Key::One(i)
    }
}

impl From<i64> for Key {
    fn from(i: i64) -> Key {
        Key::One(Index::At(i))
    }
}

impl From<std::ops::RangeFull> for Key {
    fn from(r: std::ops::RangeFull) -> Key {
        Key::One(r.into())
    }
}

impl From<std::ops::RangeInclusive<i64>> for Key {
    fn from(r: std::ops::RangeInclusive<i64>) -> Key {
        Key::One(r.into())
    }
}

impl From<std::ops::RangeFrom<i64>> for Key {
    fn from(r: std::ops::RangeFrom<i64>) -> Key {
        Key::One(r.into())
    }
}

impl From<std::ops::RangeToInclusive<i64>> for Key {
    fn from(r: std::ops::RangeToInclusive<i64>) -> Key {
        Key::One(r.into())
    }
}

impl<A: Into<Index>, B: Into<Index>> From<(A, B)> for Key {
    fn from((x, y): (A, B)) -> Key {
        Key::Two(x.into(), y.into())
    }
}

// ── Translation ──

/// Translate a user key to 0-indexed selections in storage axis order.
///
/// Two-axis keys are swapped: user `(X, Y)` becomes storage `(Y, X)`.
/// The returned `Span` stops are exclusive bounds in the direction of
/// travel, with negative values counting from the end and `None` meaning
/// "to the axis boundary".
pub fn to_storage(key: &Key) -> Result<Vec<Index>> {
    match key {
        Key::One(i) => Ok(vec![translate(i)?]),
        Key::Two(x, y) => Ok(vec![translate(y)?, translate(x)?]),
    }
}

fn translate(idx: &Index) -> Result<Index> {
    match *idx {
        Index::At(0) => Err(zero_index()),
        Index::At(k) if k > 0 => Ok(Index::At(k - 1)),
        Index::At(k) => Ok(Index::At(k)),
        Index::Span { start, stop, step } => {
            if step == 0 {
                return Err(Error::Convention(String::from("slice step of 0")));
            }
            if start == Some(0) || stop == Some(0) {
                return Err(zero_index());
            }
            let start = start.map(|k| if k > 0 { k - 1 } else { k });
            let stop = if step > 0 {
                match stop {
                    None => None,
                    Some(k) if k > 0 => Some(k),
                    // -1 means "through the last element".
                    Some(-1) => None,
                    Some(k) => Some(k + 1),
                }
            } else {
                match stop {
                    None => None,
                    // Descending through element 1 means down to the start.
                    Some(1) => None,
                    Some(k) if k > 0 => Some(k - 2),
                    Some(k) => Some(k - 1),
                }
            };
            Ok(Index::Span { start, stop, step })
        }
    }
}

fn zero_index() -> Error {
    Error::Convention(String::from(
        "index 0 is illegal under the FITS convention",
    ))
}

/// The user-facing shape for a storage shape (axis order reversed).
pub fn to_user_shape(storage: &[usize]) -> Vec<usize> {
    storage.iter().rev().copied().collect()
}

// ── Resolution against a concrete axis length ──

/// A translated selection resolved against an axis length: either a single
/// in-bounds element (collapses the axis) or an in-bounds `ndarray` slice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum AxisSel {
    At(usize),
    Span(Slice),
}

fn empty_span() -> AxisSel {
    AxisSel::Span(Slice::new(0, Some(0), 1))
}

/// Resolve one translated axis selection against a concrete length.
///
/// Single indices are range-checked; span endpoints beyond the extents are
/// clamped, matching the storage library's slicing behavior.
pub(crate) fn resolve(idx: &Index, len: usize) -> Result<AxisSel> {
    let n = len as i64;
    match *idx {
        Index::At(i) => {
            let r = if i < 0 { i + n } else { i };
            if r < 0 || r >= n {
                return Err(Error::Range(format!(
                    "index {i} out of range for axis of length {len}"
                )));
            }
            Ok(AxisSel::At(r as usize))
        }
        Index::Span { start, stop, step } if step > 0 => {
            let s = match start {
                None => 0,
                Some(k) => clamp_bound(if k < 0 { k + n } else { k }, n),
            };
            let e = match stop {
                None => n,
                Some(k) => clamp_bound(if k < 0 { k + n } else { k }, n),
            };
            let e = e.max(s);
            Ok(AxisSel::Span(Slice::new(
                s as isize,
                Some(e as isize),
                step as isize,
            )))
        }
        Index::Span { start, stop, step } => {
            // Negative step: `start` anchors the first element taken,
            // `stop` is an exclusive bound walking downwards.
            if n == 0 {
                return Ok(empty_span());
            }
            let first = match start {
                None => n - 1,
                Some(k) => {
                    let r = if k < 0 { k + n } else { k };
                    if r < 0 {
                        return Ok(empty_span());
                    }
                    r.min(n - 1)
                }
            };
            let last = match stop {
                None => 0,
                Some(k) => {
                    let r = if k < 0 { k + n } else { k };
                    if r < 0 {
                        0
                    } else {
                        r + 1
                    }
                }
            };
            if last > first {
                return Ok(empty_span());
            }
            Ok(AxisSel::Span(Slice::new(
                last as isize,
                Some(first as isize + 1),
                step as isize,
            )))
        }
    }
}

fn clamp_bound(v: i64, n: i64) -> i64 {
    v.clamp(0, n)
}

fn resolve_key(key: &Key, shape: &[usize]) -> Result<Vec<AxisSel>> {
    let translated = to_storage(key)?;
    if translated.len() > shape.len() {
        return Err(Error::Convention(format!(
            "key selects {} axes but the data has {}",
            translated.len(),
            shape.len()
        )));
    }
    let mut sels = Vec::with_capacity(shape.len());
    for (ax, &len) in shape.iter().enumerate() {
        match translated.get(ax) {
            Some(idx) => sels.push(resolve(idx, len)?),
            None => sels.push(AxisSel::Span(Slice::new(0, None, 1))),
        }
    }
    Ok(sels)
}

// ── Array application ──

/// Apply a user key to a storage array, returning an owned (eager) copy.
///
/// Single-index axes are collapsed, so a `Two(At, At)` key on a 2-D array
/// yields a 0-dimensional result.
pub fn slice_array<T: Clone>(arr: &ArrayD<T>, key: &Key) -> Result<ArrayD<T>> {
    let sels = resolve_key(key, arr.shape())?;
    let mut view = arr.view();
    for (ax, sel) in sels.iter().enumerate() {
        match *sel {
            AxisSel::Span(s) => view.slice_axis_inplace(Axis(ax), s),
            AxisSel::At(i) => view.slice_axis_inplace(
                Axis(ax),
                Slice::new(i as isize, Some(i as isize + 1), 1),
            ),
        }
    }
    let mut out = view.to_owned();
    for (ax, sel) in sels.iter().enumerate().rev() {
        if let AxisSel::At(_) = sel {
            out = out.index_axis_move(Axis(ax), 0);
        }
    }
    Ok(out)
}

/// Assign `value` into the selection of `arr` addressed by a user key.
///
/// The value's shape must match the selection exactly (single-index axes
/// count as length 1).
pub fn assign_array<T: Clone>(arr: &mut ArrayD<T>, key: &Key, value: &ArrayD<T>) -> Result<()> {
    let sels = resolve_key(key, arr.shape())?;
    let mut view = arr.view_mut();
    for (ax, sel) in sels.iter().enumerate() {
        match *sel {
            AxisSel::Span(s) => view.slice_axis_inplace(Axis(ax), s),
            AxisSel::At(i) => view.slice_axis_inplace(
                Axis(ax),
                Slice::new(i as isize, Some(i as isize + 1), 1),
            ),
        }
    }
    // The value has single-index axes collapsed; reinstate them as length-1
    // axes so the shapes can be compared and assigned directly.
    let target_shape: Vec<usize> = view.shape().to_vec();
    let selected: usize = target_shape.iter().product();
    if selected != value.len() {
        return Err(Error::Data(format!(
            "cannot assign {} elements into a selection of {}",
            value.len(),
            selected
        )));
    }
    let reshaped = value
        .view()
        .into_shape_with_order(IxDyn(&target_shape))
        .map_err(|_| {
            Error::Data(format!(
                "cannot assign shape {:?} into a selection of shape {:?}",
                value.shape(),
                target_shape
            ))
        })?;
    view.assign(&reshaped);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array;

    fn axis(len: usize) -> ArrayD<f64> {
        Array::from_iter((0..len).map(|v| v as f64)).into_dyn()
    }

    fn values(arr: &ArrayD<f64>) -> Vec<f64> {
        arr.iter().copied().collect()
    }

    // ---- zero rejection ----

    #[test]
    fn integer_zero_is_illegal() {
        assert!(matches!(
            to_storage(&Key::from(0)),
            Err(Error::Convention(_))
        ));
    }

    #[test]
    fn span_zero_endpoint_is_illegal() {
        assert!(to_storage(&Key::One(Index::span(0, 5))).is_err());
        assert!(to_storage(&Key::One(Index::span(1, 0))).is_err());
    }

    #[test]
    fn zero_step_is_illegal() {
        let k = Key::One(Index::span_step(Some(1), Some(5), 0));
        assert!(matches!(to_storage(&k), Err(Error::Convention(_))));
    }

    // ---- integer translation ----

    #[test]
    fn positive_integers_shift_down_by_one() {
        assert_eq!(to_storage(&Key::from(1)).unwrap(), vec![Index::At(0)]);
        assert_eq!(to_storage(&Key::from(7)).unwrap(), vec![Index::At(6)]);
    }

    #[test]
    fn negative_integers_pass_through() {
        assert_eq!(to_storage(&Key::from(-1)).unwrap(), vec![Index::At(-1)]);
        assert_eq!(to_storage(&Key::from(-3)).unwrap(), vec![Index::At(-3)]);
    }

    #[test]
    fn integer_round_trip_on_axis() {
        // User index k must address element k-1 of the storage axis, and -1
        // must address the last element.
        let a = axis(20);
        for k in 1..=20i64 {
            let sub = slice_array(&a, &Key::from(k)).unwrap();
            assert_eq!(values(&sub), vec![(k - 1) as f64]);
        }
        let last = slice_array(&a, &Key::from(-1)).unwrap();
        assert_eq!(values(&last), vec![19.0]);
    }

    #[test]
    fn integer_out_of_range() {
        let a = axis(5);
        assert!(matches!(
            slice_array(&a, &Key::from(6)),
            Err(Error::Range(_))
        ));
        assert!(matches!(
            slice_array(&a, &Key::from(-6)),
            Err(Error::Range(_))
        ));
    }

    // ---- slice inclusivity ----

    #[test]
    fn user_slice_1_to_10_selects_10_elements() {
        let a = axis(20);
        let sub = slice_array(&a, &Key::from(1..=10)).unwrap();
        assert_eq!(sub.len(), 10);
        assert_eq!(values(&sub), (0..10).map(|v| v as f64).collect::<Vec<_>>());
    }

    #[test]
    fn full_slice_selects_all() {
        let a = axis(20);
        let sub = slice_array(&a, &Key::from(..)).unwrap();
        assert_eq!(sub.len(), 20);
    }

    #[test]
    fn open_start_means_from_first() {
        let a = axis(10);
        let sub = slice_array(&a, &Key::from(..=4)).unwrap();
        assert_eq!(values(&sub), vec![0.0, 1.0, 2.0, 3.0]);
        // User ..=4 selects elements 1 through 4.
        assert_eq!(sub.len(), 4);
    }

    #[test]
    fn open_stop_means_through_last() {
        let a = axis(10);
        let sub = slice_array(&a, &Key::from(8..)).unwrap();
        assert_eq!(values(&sub), vec![7.0, 8.0, 9.0]);
    }

    #[test]
    fn negative_stop_is_inclusive() {
        let a = axis(10);
        // 1 through -3 inclusive = storage 0..=7.
        let sub = slice_array(&a, &Key::One(Index::span(1, -3))).unwrap();
        assert_eq!(sub.len(), 8);
        assert_eq!(values(&sub).last().copied(), Some(7.0));
    }

    #[test]
    fn stop_minus_one_means_through_end() {
        let a = axis(10);
        let sub = slice_array(&a, &Key::One(Index::span(2, -1))).unwrap();
        assert_eq!(sub.len(), 9);
        assert_eq!(values(&sub).last().copied(), Some(9.0));
    }

    #[test]
    fn slice_endpoints_are_clamped() {
        let a = axis(5);
        let sub = slice_array(&a, &Key::One(Index::span(1, 100))).unwrap();
        assert_eq!(sub.len(), 5);
        let sub = slice_array(&a, &Key::One(Index::span(-100, 3))).unwrap();
        assert_eq!(sub.len(), 3);
    }

    #[test]
    fn stepped_slice() {
        let a = axis(10);
        let sub = slice_array(&a, &Key::One(Index::span_step(Some(1), Some(10), 2))).unwrap();
        assert_eq!(values(&sub), vec![0.0, 2.0, 4.0, 6.0, 8.0]);
    }

    // ---- negative step ----

    #[test]
    fn reversed_full_slice() {
        let a = axis(5);
        let sub = slice_array(&a, &Key::One(Index::span_step(None, None, -1))).unwrap();
        assert_eq!(values(&sub), vec![4.0, 3.0, 2.0, 1.0, 0.0]);
    }

    #[test]
    fn descending_span_is_inclusive_both_ends() {
        let a = axis(20);
        // User 5 down through 2: elements 5,4,3,2 = storage 4,3,2,1.
        let sub = slice_array(&a, &Key::One(Index::span_step(Some(5), Some(2), -1))).unwrap();
        assert_eq!(values(&sub), vec![4.0, 3.0, 2.0, 1.0]);
    }

    #[test]
    fn descending_through_first_element() {
        let a = axis(10);
        let sub = slice_array(&a, &Key::One(Index::span_step(Some(3), Some(1), -1))).unwrap();
        assert_eq!(values(&sub), vec![2.0, 1.0, 0.0]);
    }

    #[test]
    fn descending_with_negative_endpoints() {
        let a = axis(20);
        // -1 down through -5: storage 19,18,17,16,15.
        let sub = slice_array(&a, &Key::One(Index::span_step(Some(-1), Some(-5), -1))).unwrap();
        assert_eq!(values(&sub), vec![19.0, 18.0, 17.0, 16.0, 15.0]);
    }

    #[test]
    fn descending_round_trip_matches_ascending() {
        // Reversing a descending selection must equal the matching ascending
        // selection, for every sign combination of the endpoints.
        let a = axis(12);
        let cases: &[((i64, i64), (i64, i64))] = &[
            ((9, 3), (3, 9)),
            ((-2, 4), (4, -2)),
            ((12, 1), (1, 12)),
            ((-1, -6), (-6, -1)),
        ];
        for &((dstart, dstop), (astart, astop)) in cases {
            let desc =
                slice_array(&a, &Key::One(Index::span_step(Some(dstart), Some(dstop), -1)))
                    .unwrap();
            let asc = slice_array(&a, &Key::One(Index::span(astart, astop))).unwrap();
            let mut reversed = values(&desc);
            reversed.reverse();
            assert_eq!(
                reversed,
                values(&asc),
                "mismatch for descending {dstart}..{dstop}"
            );
        }
    }

    #[test]
    fn descending_step_two() {
        let a = axis(10);
        let sub = slice_array(&a, &Key::One(Index::span_step(Some(10), Some(1), -2))).unwrap();
        assert_eq!(values(&sub), vec![9.0, 7.0, 5.0, 3.0, 1.0]);
    }

    #[test]
    fn descending_empty_when_bounds_cross() {
        let a = axis(10);
        let sub = slice_array(&a, &Key::One(Index::span_step(Some(2), Some(8), -1))).unwrap();
        assert_eq!(sub.len(), 0);
    }

    // ---- axis swap ----

    #[test]
    fn two_axis_key_is_swapped_for_storage() {
        let key = Key::from((3, 5));
        let translated = to_storage(&key).unwrap();
        // Storage order is (Y, X): user Y=5 first, user X=3 second.
        assert_eq!(translated, vec![Index::At(4), Index::At(2)]);
    }

    #[test]
    fn two_axis_slice_on_2d_array() {
        // Storage shape (4 rows, 6 cols): user X spans columns.
        let a = Array::from_shape_fn((4, 6), |(r, c)| (r * 10 + c) as f64).into_dyn();
        let sub = slice_array(&a, &Key::from((1..=3, 2..=4))).unwrap();
        // User X 1..=3 -> columns 0..3, user Y 2..=4 -> rows 1..4.
        assert_eq!(sub.shape(), &[3, 3]);
        assert_eq!(sub[[0, 0]], 10.0);
        assert_eq!(sub[[2, 2]], 32.0);
    }

    #[test]
    fn single_element_key_collapses_to_scalar() {
        let a = Array::from_shape_fn((4, 6), |(r, c)| (r * 10 + c) as f64).into_dyn();
        let sub = slice_array(&a, &Key::from((3, 2))).unwrap();
        assert_eq!(sub.ndim(), 0);
        // User (X=3, Y=2) -> storage [1, 2].
        assert_eq!(values(&sub), vec![12.0]);
    }

    #[test]
    fn one_axis_key_on_2d_selects_storage_row() {
        let a = Array::from_shape_fn((4, 6), |(r, c)| (r * 10 + c) as f64).into_dyn();
        let sub = slice_array(&a, &Key::from(2)).unwrap();
        assert_eq!(sub.shape(), &[6]);
        assert_eq!(values(&sub)[0], 10.0);
    }

    #[test]
    fn too_many_axes_is_a_convention_error() {
        let a = axis(10);
        assert!(matches!(
            slice_array(&a, &Key::from((1, 1))),
            Err(Error::Convention(_))
        ));
    }

    // ---- shape reporting ----

    #[test]
    fn user_shape_is_reversed_storage_shape() {
        assert_eq!(to_user_shape(&[20, 10]), vec![10, 20]);
        assert_eq!(to_user_shape(&[3, 4, 5]), vec![5, 4, 3]);
        assert!(to_user_shape(&[]).is_empty());
    }

    // ---- assignment ----

    #[test]
    fn assign_into_span() {
        let mut a = axis(10);
        let v = Array::from_vec(vec![100.0, 101.0, 102.0]).into_dyn();
        assign_array(&mut a, &Key::from(2..=4), &v).unwrap();
        assert_eq!(values(&a)[1..4], [100.0, 101.0, 102.0]);
        assert_eq!(values(&a)[0], 0.0);
        assert_eq!(values(&a)[4], 4.0);
    }

    #[test]
    fn assign_single_element() {
        let mut a = Array::from_shape_fn((4, 6), |_| 0.0).into_dyn();
        let v = ndarray::arr0(9.0).into_dyn();
        assign_array(&mut a, &Key::from((2, 3)), &v).unwrap();
        assert_eq!(a[[2, 1]], 9.0);
        assert_eq!(a.sum(), 9.0);
    }

    #[test]
    fn assign_shape_mismatch_is_a_data_error() {
        let mut a = axis(10);
        let v = Array::from_vec(vec![1.0, 2.0]).into_dyn();
        assert!(matches!(
            assign_array(&mut a, &Key::from(1..=5), &v),
            Err(Error::Data(_))
        ));
    }

    #[test]
    fn slice_is_an_eager_copy() {
        let mut a = axis(10);
        let sub = slice_array(&a, &Key::from(1..=5)).unwrap();
        a.fill(-1.0);
        assert_eq!(values(&sub), vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    }
}
