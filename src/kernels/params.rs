//! Kernel parameters and their slider ranges

use thiserror::Error;

/// Parameter validation error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParameterError {
    #[error("Kernel `{kernel}` has no parameter `{name}`")]
    UnknownParameter { kernel: String, name: String },
    #[error("Parameter `{name}` of kernel `{kernel}` must be finite, got {value}")]
    InvalidParameterValue {
        kernel: String,
        name: String,
        value: f32,
    },
}

/// Range and default of one tunable parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterSpec {
    pub name: &'static str,
    pub min: f32,
    pub max: f32,
    pub step: f32,
    pub default: f32,
}

impl ParameterSpec {
    pub const fn new(name: &'static str, min: f32, max: f32, step: f32, default: f32) -> Self {
        Self {
            name,
            min,
            max,
            step,
            default,
        }
    }

    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.min, self.max)
    }
}

/// Current values of a kernel's parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSet {
    kernel: &'static str,
    specs: &'static [ParameterSpec],
    values: Vec<f32>,
}

impl ParameterSet {
    pub fn new(kernel: &'static str, specs: &'static [ParameterSpec]) -> Self {
        Self {
            kernel,
            specs,
            values: specs.iter().map(|s| s.default).collect(),
        }
    }

    pub fn specs(&self) -> &'static [ParameterSpec] {
        self.specs
    }

    /// Current value of `name`, or `None` if the kernel does not declare it
    pub fn get(&self, name: &str) -> Option<f32> {
        self.index_of(name).map(|i| self.values[i])
    }

    /// Validate every pair, then apply them all. Nothing changes if any
    /// pair is rejected. Values are clamped into their range.
    pub fn apply(&mut self, params: &[(&str, f32)]) -> Result<(), ParameterError> {
        let mut staged = Vec::with_capacity(params.len());
        for &(name, value) in params {
            let index = self
                .index_of(name)
                .ok_or_else(|| ParameterError::UnknownParameter {
                    kernel: self.kernel.to_string(),
                    name: name.to_string(),
                })?;
            if !value.is_finite() {
                return Err(ParameterError::InvalidParameterValue {
                    kernel: self.kernel.to_string(),
                    name: name.to_string(),
                    value,
                });
            }
            let clamped = self.specs[index].clamp(value);
            if clamped != value {
                log::debug!("{}: clamped `{}` from {} to {}", self.kernel, name, value, clamped);
            }
            staged.push((index, clamped));
        }

        for (index, value) in staged {
            self.values[index] = value;
        }
        Ok(())
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.specs.iter().position(|s| s.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const SPECS: &[ParameterSpec] = &[
        ParameterSpec::new("radius", 0.01, 60.0, 0.01, 2.0),
        ParameterSpec::new("tau", 0.0, 200.0, 0.01, 1.0),
    ];

    #[rstest]
    #[case(5.0, 5.0)]
    #[case(-3.0, 0.01)]
    #[case(1000.0, 60.0)]
    fn test_values_are_clamped(#[case] requested: f32, #[case] expected: f32) {
        let mut set = ParameterSet::new("blur", SPECS);
        set.apply(&[("radius", requested)]).unwrap();
        assert_eq!(set.get("radius"), Some(expected));
    }

    #[test]
    fn test_rejected_batch_changes_nothing() {
        let mut set = ParameterSet::new("blur", SPECS);
        let err = set.apply(&[("tau", 3.0), ("sigma", 1.0)]).unwrap_err();
        assert!(matches!(err, ParameterError::UnknownParameter { .. }));
        assert_eq!(set.get("tau"), Some(1.0));

        let err = set.apply(&[("radius", f32::NAN)]).unwrap_err();
        assert!(matches!(err, ParameterError::InvalidParameterValue { .. }));
        assert_eq!(set.get("radius"), Some(2.0));
    }
}
