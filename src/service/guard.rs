//! Per-request record count limit.

use crate::error::UserError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CountGuard {
    max: Option<usize>,
}

impl CountGuard {
    pub fn new(max: Option<usize>) -> Self {
        Self { max }
    }

    pub fn max(&self) -> Option<usize> {
        self.max
    }

    fn exceeded(&self, n: u64) -> Option<usize> {
        self.max.filter(|&max| n > max as u64)
    }

    /// Create, update and delete checkpoint.
    pub fn check(&self, n: u64) -> Result<(), UserError> {
        match self.exceeded(n) {
            Some(max) => {
                tracing::debug!(count = n, max, "count guard refused request");
                Err(UserError::MaxExceeded { max })
            }
            None => Ok(()),
        }
    }

    /// Find checkpoint; the message asks the caller to page.
    pub fn check_page(&self, n: u64) -> Result<(), UserError> {
        match self.exceeded(n) {
            Some(max) => {
                tracing::debug!(count = n, max, "count guard refused find");
                Err(UserError::MaxExceededPerPage { max })
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_limit_allows_anything() {
        assert!(CountGuard::new(None).check(u64::MAX).is_ok());
    }

    #[test]
    fn limit_is_inclusive() {
        let g = CountGuard::new(Some(5));
        assert!(g.check(5).is_ok());
        assert_eq!(g.check(6), Err(UserError::MaxExceeded { max: 5 }));
        assert_eq!(g.check_page(6), Err(UserError::MaxExceededPerPage { max: 5 }));
    }
}
