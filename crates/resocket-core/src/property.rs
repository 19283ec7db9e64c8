//! Change-detecting value cells.
//!
//! A [`Property<T>`] wraps a value and reports whether a write actually changed
//! it. Pairing a property with a [`Signal`](crate::Signal) gives strict change
//! notification: emit only when [`Property::set`] returns `true`.
//!
//! # Example
//!
//! ```
//! use resocket_core::{Property, Signal};
//!
//! struct Counter {
//!     value: Property<i32>,
//!     value_changed: Signal<i32>,
//! }
//!
//! impl Counter {
//!     fn set_value(&self, new_value: i32) {
//!         if self.value.set(new_value) {
//!             self.value_changed.emit(new_value);
//!         }
//!     }
//! }
//!
//! let counter = Counter { value: Property::new(0), value_changed: Signal::new() };
//! counter.set_value(1);
//! assert_eq!(counter.value.get(), 1);
//! ```

use std::fmt;

use parking_lot::RwLock;

/// A value cell that tracks changes.
///
/// `Property<T>` uses interior mutability with `RwLock` and is `Send + Sync`
/// whenever `T` is.
pub struct Property<T> {
    value: RwLock<T>,
}

impl<T: Clone> Property<T> {
    /// Create a new property with an initial value.
    pub fn new(value: T) -> Self {
        Self {
            value: RwLock::new(value),
        }
    }

    /// Get the current value.
    pub fn get(&self) -> T {
        self.value.read().clone()
    }
}

impl<T: Clone + PartialEq> Property<T> {
    /// Set the value, returning `true` if the value changed.
    ///
    /// Equal values leave the property untouched and return `false`.
    pub fn set(&self, value: T) -> bool {
        let mut current = self.value.write();
        if *current != value {
            *current = value;
            true
        } else {
            false
        }
    }
}

impl<T: Clone + Default> Default for Property<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Clone + fmt::Debug> fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("value", &self.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_reports_change() {
        let prop = Property::new(42);
        assert!(!prop.set(42));
        assert!(prop.set(100));
        assert_eq!(prop.get(), 100);
    }

    #[test]
    fn test_optional_values() {
        let prop: Property<Option<bool>> = Property::default();
        assert_eq!(prop.get(), None);
        assert!(prop.set(Some(true)));
        assert!(!prop.set(Some(true)));
        assert!(prop.set(Some(false)));
    }
}
