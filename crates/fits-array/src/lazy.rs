//! Deferred-population buffer slot.
//!
//! Every data entity owns exactly one buffer, populated on first access
//! rather than at construction. The slot tracks an explicit loaded state so
//! that a buffer installed directly (arithmetic results, copies, `set_data`)
//! never re-triggers file I/O. Interior mutability keeps the getter `&self`;
//! the type is deliberately not `Sync` and entities require external locking
//! for cross-thread use.

use std::cell::{Cell, Ref, RefCell};

use ndarray::ArrayD;

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct LazySlot<T> {
    buf: RefCell<Option<ArrayD<T>>>,
    loaded: Cell<bool>,
}

impl<T: Clone> LazySlot<T> {
    /// A slot with no buffer and nothing to load.
    pub fn empty() -> LazySlot<T> {
        LazySlot {
            buf: RefCell::new(None),
            loaded: Cell::new(true),
        }
    }

    /// A slot that will be populated by its loader on first access.
    pub fn unloaded() -> LazySlot<T> {
        LazySlot {
            buf: RefCell::new(None),
            loaded: Cell::new(false),
        }
    }

    /// A slot holding `buf`, already loaded.
    pub fn filled(buf: ArrayD<T>) -> LazySlot<T> {
        LazySlot {
            buf: RefCell::new(Some(standard(buf))),
            loaded: Cell::new(true),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.get()
    }

    /// Run `loader` if the slot has not been populated yet.
    ///
    /// The loader runs at most once; a buffer installed via [`set`] or
    /// [`filled`] suppresses it entirely.
    ///
    /// [`set`]: LazySlot::set
    /// [`filled`]: LazySlot::filled
    pub fn ensure<F>(&self, loader: F) -> Result<()>
    where
        F: FnOnce() -> Result<Option<ArrayD<T>>>,
    {
        if !self.loaded.get() {
            let buf = loader()?;
            *self.buf.borrow_mut() = buf.map(standard);
            self.loaded.set(true);
        }
        Ok(())
    }

    /// Borrow the buffer, if present. Does not trigger loading.
    pub fn get(&self) -> Option<Ref<'_, ArrayD<T>>> {
        Ref::filter_map(self.buf.borrow(), |b| b.as_ref()).ok()
    }

    /// Mutable access to the buffer, if present. Does not trigger loading.
    pub fn get_mut(&mut self) -> Option<&mut ArrayD<T>> {
        self.buf.get_mut().as_mut()
    }

    /// Install a buffer directly, marking the slot loaded without invoking
    /// any loader. The buffer is normalized to standard (contiguous,
    /// row-major) layout.
    pub fn set(&self, buf: Option<ArrayD<T>>) {
        *self.buf.borrow_mut() = buf.map(standard);
        self.loaded.set(true);
    }

    /// Remove and return the buffer, leaving the slot loaded and empty.
    pub fn take(&self) -> Option<ArrayD<T>> {
        self.loaded.set(true);
        self.buf.borrow_mut().take()
    }

    /// Whether a buffer is currently present (meaningful once loaded).
    pub fn has_buffer(&self) -> bool {
        self.buf.borrow().is_some()
    }
}

/// Copy a buffer into standard layout if it is not already contiguous.
///
/// Reversed or stepped slices produce non-contiguous arrays; downstream
/// arithmetic and the save path assume a well-formed buffer.
fn standard<T: Clone>(arr: ArrayD<T>) -> ArrayD<T> {
    if arr.is_standard_layout() {
        arr
    } else {
        arr.as_standard_layout().into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use ndarray::{Array, IxDyn};
    use std::cell::Cell as StdCell;

    fn arr(vals: &[f64]) -> ArrayD<f64> {
        Array::from_vec(vals.to_vec()).into_dyn()
    }

    #[test]
    fn empty_slot_is_loaded_with_no_buffer() {
        let slot: LazySlot<f64> = LazySlot::empty();
        assert!(slot.is_loaded());
        assert!(slot.get().is_none());
    }

    #[test]
    fn loader_runs_exactly_once() {
        let slot: LazySlot<f64> = LazySlot::unloaded();
        let calls = StdCell::new(0u32);
        assert!(!slot.is_loaded());

        for _ in 0..3 {
            slot.ensure(|| {
                calls.set(calls.get() + 1);
                Ok(Some(arr(&[1.0, 2.0])))
            })
            .unwrap();
        }
        assert!(slot.is_loaded());
        assert_eq!(calls.get(), 1);
        assert_eq!(slot.get().unwrap().len(), 2);
    }

    #[test]
    fn loader_failure_leaves_slot_unloaded() {
        let slot: LazySlot<f64> = LazySlot::unloaded();
        let r = slot.ensure(|| Err(Error::Data(String::from("boom"))));
        assert!(r.is_err());
        assert!(!slot.is_loaded());

        // A later attempt may still succeed.
        slot.ensure(|| Ok(Some(arr(&[3.0])))).unwrap();
        assert!(slot.is_loaded());
    }

    #[test]
    fn set_bypasses_the_loader() {
        let slot: LazySlot<f64> = LazySlot::unloaded();
        slot.set(Some(arr(&[5.0])));
        assert!(slot.is_loaded());

        slot.ensure(|| panic!("loader must not run after set")).unwrap();
        assert_eq!(slot.get().unwrap()[[0]], 5.0);
    }

    #[test]
    fn take_empties_the_slot() {
        let slot = LazySlot::filled(arr(&[1.0, 2.0, 3.0]));
        let buf = slot.take().unwrap();
        assert_eq!(buf.len(), 3);
        assert!(slot.get().is_none());
        assert!(slot.is_loaded());
    }

    #[test]
    fn non_contiguous_buffers_are_normalized() {
        let mut a = Array::from_shape_fn((4, 4), |(r, c)| (r * 4 + c) as f64).into_dyn();
        a.invert_axis(ndarray::Axis(0));
        assert!(!a.is_standard_layout());

        let slot = LazySlot::filled(a);
        let b = slot.get().unwrap();
        assert!(b.is_standard_layout());
        assert_eq!(b[IxDyn(&[0, 0])], 12.0);
    }

    #[test]
    fn clone_is_deep() {
        let slot = LazySlot::filled(arr(&[1.0]));
        let mut other = slot.clone();
        other.get_mut().unwrap().fill(9.0);
        assert_eq!(slot.get().unwrap()[[0]], 1.0);
    }
}
