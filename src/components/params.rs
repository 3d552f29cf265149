//! Device parameters with given-or-default semantics.

/// A numeric parameter that remembers whether it was set explicitly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Parameter {
    value: f64,
    given: bool,
}

impl Parameter {
    /// A parameter holding its default value.
    pub const fn new(default: f64) -> Self {
        Self {
            value: default,
            given: false,
        }
    }

    /// An explicitly given parameter.
    pub const fn given(value: f64) -> Self {
        Self { value, given: true }
    }

    /// Set the value and mark it given.
    pub fn set(&mut self, value: f64) {
        self.value = value;
        self.given = true;
    }

    /// Current value (given or default).
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Whether the value was set explicitly.
    pub fn is_given(&self) -> bool {
        self.given
    }

    /// The given value, or `fallback` when only the default is known.
    pub fn or(&self, fallback: f64) -> f64 {
        if self.given {
            self.value
        } else {
            fallback
        }
    }
}

impl From<f64> for Parameter {
    fn from(value: f64) -> Self {
        Self::given(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_given_or_default() {
        let mut p = Parameter::new(300.15);
        assert!(!p.is_given());
        assert_eq!(p.value(), 300.15);
        assert_eq!(p.or(310.0), 310.0);

        p.set(290.0);
        assert!(p.is_given());
        assert_eq!(p.or(310.0), 290.0);

        let q: Parameter = 1e3.into();
        assert!(q.is_given());
    }
}
