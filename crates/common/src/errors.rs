//! Error accumulation for sweeps that must not abort on the first failure.

use std::fmt;

/// A list of errors gathered while iterating over independent work items.
///
/// Sweeps push every per-item failure and convert the collection into a `Result` once the
/// iteration is complete, so one bad item never hides the outcome of the others.
#[derive(Debug)]
pub struct MultiError<E> {
    errors: Vec<E>,
}

impl<E> Default for MultiError<E> {
    fn default() -> Self {
        Self { errors: Vec::new() }
    }
}

impl<E> MultiError<E> {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a failure.
    pub fn push(&mut self, error: E) {
        self.errors.push(error);
    }

    /// Records the error of `result`, if any, and returns its success value.
    pub fn collect<T>(&mut self, result: Result<T, E>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(error) => {
                self.push(error);
                None
            }
        }
    }

    /// Moves every error of `other` into `self`.
    pub fn extend(&mut self, other: MultiError<E>) {
        self.errors.extend(other.errors);
    }

    /// Whether no failure has been recorded.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of recorded failures.
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// The recorded failures in the order they happened.
    pub fn errors(&self) -> &[E] {
        &self.errors
    }

    /// Returns `Ok(())` when nothing failed, or `Err(self)` otherwise.
    pub fn into_result(self) -> Result<(), Self> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl<E: fmt::Display> fmt::Display for MultiError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error(s)", self.errors.len())?;
        for (i, error) in self.errors.iter().enumerate() {
            write!(f, "; [{i}] {error}")?;
        }
        Ok(())
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for MultiError<E> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_failures_without_stopping() {
        let mut errs = MultiError::new();

        let values = (0..5)
            .filter_map(|i| {
                errs.collect(if i % 2 == 0 {
                    Ok(i)
                } else {
                    Err(format!("item {i} failed"))
                })
            })
            .collect::<Vec<_>>();

        assert_eq!(values, vec![0, 2, 4]);
        assert_eq!(errs.len(), 2);
        assert_eq!(
            errs.to_string(),
            "2 error(s); [0] item 1 failed; [1] item 3 failed"
        );
        assert!(errs.into_result().is_err());
    }

    #[test]
    fn empty_collection_is_ok() {
        let errs: MultiError<String> = MultiError::new();
        assert!(errs.into_result().is_ok());
    }
}
