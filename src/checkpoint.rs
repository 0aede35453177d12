/// A value together with a stored copy that it can be rolled back to.
///
/// `store` copies the current value into the shadow, `restore` copies the
/// shadow back. Both are idempotent, so restoring twice in a row leaves the
/// same state as restoring once.
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint<T> {
    current: T,
    stored: T,
}

impl<T: Clone> Checkpoint<T> {
    pub fn new(value: T) -> Self {
        Checkpoint {
            stored: value.clone(),
            current: value,
        }
    }

    pub fn get(&self) -> &T {
        &self.current
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.current
    }

    pub fn stored(&self) -> &T {
        &self.stored
    }

    pub fn set(&mut self, value: T) {
        self.current = value;
    }

    pub fn store(&mut self) {
        self.stored.clone_from(&self.current);
    }

    pub fn restore(&mut self) {
        self.current.clone_from(&self.stored);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn store_mutate_restore(
            initial in proptest::collection::vec(-1e6f64..1e6, 1..16),
            offset in -1e3f64..1e3,
        ) {
            let mut cell = Checkpoint::new(initial.clone());
            cell.store();
            cell.get_mut().iter_mut().for_each(|x| *x += offset);
            cell.restore();
            prop_assert_eq!(cell.get(), &initial);
            prop_assert_eq!(cell.stored(), &initial);
        }
    }

    #[test]
    fn restore_without_mutation_is_noop() {
        let mut cell = Checkpoint::new(vec![1.5, -2.0]);
        cell.store();
        cell.restore();
        assert_eq!(cell.get(), &vec![1.5, -2.0]);
        assert_eq!(cell.stored(), &vec![1.5, -2.0]);
    }

    #[test]
    fn restore_is_idempotent() {
        let mut cell = Checkpoint::new(3);
        cell.store();
        cell.set(7);
        cell.restore();
        cell.restore();
        assert_eq!(*cell.get(), 3);
    }
}
