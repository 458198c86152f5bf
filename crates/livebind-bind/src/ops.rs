//! The mutation interface between controllers and the cells they drive.

use livebind_reactive::ReactiveCell;
use livebind_types::Value;

/// How a controller writes into a target.
///
/// Controllers never touch a cell or an item array directly; every write
/// goes through these four calls. Replacing the implementation lets a host
/// route writes through its own reactivity system.
pub trait Operations: Send + Sync {
    /// Replace the whole value of `target`.
    fn set(&self, target: &ReactiveCell<Value>, value: Value);

    /// Replace the item at `index`, keeping its position.
    fn replace(&self, items: &mut Vec<Value>, index: usize, value: Value);

    /// Insert `value` at `index`, shifting later items.
    fn add(&self, items: &mut Vec<Value>, index: usize, value: Value);

    /// Remove and return the item at `index`.
    fn remove(&self, items: &mut Vec<Value>, index: usize) -> Option<Value>;
}

/// Plain writes. Out-of-range indexes are clamped on insert and ignored
/// otherwise.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultOperations;

impl Operations for DefaultOperations {
    fn set(&self, target: &ReactiveCell<Value>, value: Value) {
        target.set(value);
    }

    fn replace(&self, items: &mut Vec<Value>, index: usize, value: Value) {
        if let Some(slot) = items.get_mut(index) {
            *slot = value;
        }
    }

    fn add(&self, items: &mut Vec<Value>, index: usize, value: Value) {
        let index = index.min(items.len());
        items.insert(index, value);
    }

    fn remove(&self, items: &mut Vec<Value>, index: usize) -> Option<Value> {
        (index < items.len()).then(|| items.remove(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_clamps_index() {
        let mut items = vec![Value::from(1)];
        DefaultOperations.add(&mut items, 10, Value::from(2));
        DefaultOperations.add(&mut items, 0, Value::from(0));
        assert_eq!(items, vec![Value::from(0), Value::from(1), Value::from(2)]);
    }

    #[test]
    fn remove_and_replace_ignore_out_of_range() {
        let mut items = vec![Value::from("a")];
        assert_eq!(DefaultOperations.remove(&mut items, 3), None);
        DefaultOperations.replace(&mut items, 3, Value::from("z"));
        assert_eq!(items, vec![Value::from("a")]);
        DefaultOperations.replace(&mut items, 0, Value::from("b"));
        assert_eq!(DefaultOperations.remove(&mut items, 0), Some(Value::from("b")));
        assert!(items.is_empty());
    }

    #[test]
    fn set_writes_through_the_cell() {
        let cell = ReactiveCell::new(Value::Null);
        DefaultOperations.set(&cell, Value::from(true));
        assert_eq!(cell.get(), Value::Bool(true));
        assert_eq!(cell.version(), 1);
    }
}
