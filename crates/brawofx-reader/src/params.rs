//! Host parameter model.
//!
//! [`HostParams`] is how the reader talks to the host's parameter
//! storage. [`ParamStore`] is an in-memory implementation built from the
//! descriptor table, used by the CLI and by tests.

use std::collections::HashMap;

use crate::descriptor::{param_descriptors, ParamDescriptor, ParamType, ParamValue};
use crate::error::{ReaderError, Result};

/// Parameter storage owned by the host.
pub trait HostParams {
    /// Selected index of a choice parameter.
    fn choice_index(&self, name: &str) -> Result<usize>;

    /// Option text at `index`. Empty when the index is out of range.
    fn choice_option(&self, name: &str, index: usize) -> Result<String>;

    fn choice_options(&self, name: &str) -> Result<Vec<String>>;

    /// Replace every option. The selection and default move to the first entry.
    fn reset_options(&mut self, name: &str, options: &[String]) -> Result<()>;

    fn set_choice_default(&mut self, name: &str, index: usize) -> Result<()>;

    /// Set a parameter's value back to its default.
    fn reset_to_default(&mut self, name: &str) -> Result<()>;

    fn int(&self, name: &str) -> Result<i32>;
    fn set_int(&mut self, name: &str, value: i32) -> Result<()>;
    fn set_int_default(&mut self, name: &str, value: i32) -> Result<()>;

    fn double(&self, name: &str) -> Result<f64>;
    fn set_double(&mut self, name: &str, value: f64) -> Result<()>;
    fn set_double_default(&mut self, name: &str, value: f64) -> Result<()>;

    fn boolean(&self, name: &str) -> Result<bool>;
    fn set_boolean(&mut self, name: &str, value: bool) -> Result<()>;
    fn set_boolean_default(&mut self, name: &str, value: bool) -> Result<()>;

    /// Text of the selected option of a choice parameter.
    fn selected_option(&self, name: &str) -> Result<String> {
        let index = self.choice_index(name)?;
        self.choice_option(name, index)
    }
}

#[derive(Debug, Clone)]
struct Slot {
    descriptor: ParamDescriptor,
    value: ParamValue,
    default: ParamValue,
    options: Vec<String>,
}

impl Slot {
    fn clamp(&self, value: f64) -> f64 {
        match self.descriptor.range {
            Some((min, max)) => value.clamp(min, max),
            None => value,
        }
    }
}

/// In-memory parameter storage. Numeric values are clamped to their range.
#[derive(Debug, Clone)]
pub struct ParamStore {
    slots: HashMap<String, Slot>,
}

impl Default for ParamStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ParamStore {
    /// A store holding every reader parameter at its default.
    pub fn new() -> Self {
        Self::from_descriptors(param_descriptors())
    }

    pub fn from_descriptors(descriptors: impl IntoIterator<Item = ParamDescriptor>) -> Self {
        let slots = descriptors
            .into_iter()
            .filter_map(|descriptor| {
                let default = descriptor.default?;
                Some((
                    descriptor.name.clone(),
                    Slot {
                        value: default,
                        default,
                        options: descriptor.options.clone(),
                        descriptor,
                    },
                ))
            })
            .collect();
        Self { slots }
    }

    fn slot(&self, name: &str, expected: ParamType) -> Result<&Slot> {
        match self.slots.get(name) {
            Some(slot) if slot.descriptor.param_type == expected => Ok(slot),
            Some(slot) => Err(ReaderError::InvalidParameter(format!(
                "{name} is {:?}, not {expected:?}",
                slot.descriptor.param_type
            ))),
            None => Err(ReaderError::InvalidParameter(format!("unknown parameter {name}"))),
        }
    }

    fn slot_mut(&mut self, name: &str, expected: ParamType) -> Result<&mut Slot> {
        self.slot(name, expected)?;
        self.slots
            .get_mut(name)
            .ok_or_else(|| ReaderError::InvalidParameter(format!("unknown parameter {name}")))
    }

    /// Select a choice option by index.
    pub fn set_choice(&mut self, name: &str, index: usize) -> Result<()> {
        let slot = self.slot_mut(name, ParamType::Choice)?;
        if index >= slot.options.len() {
            return Err(ReaderError::InvalidParameter(format!(
                "{name} has {} options, index {index} requested",
                slot.options.len()
            )));
        }
        slot.value = ParamValue::Choice(index);
        Ok(())
    }

    /// Select a choice option by its text.
    pub fn select_option(&mut self, name: &str, option: &str) -> Result<()> {
        let index = self
            .slot(name, ParamType::Choice)?
            .options
            .iter()
            .position(|o| o == option)
            .ok_or_else(|| ReaderError::InvalidParameter(format!("{name} has no option {option:?}")))?;
        self.set_choice(name, index)
    }
}

impl HostParams for ParamStore {
    fn choice_index(&self, name: &str) -> Result<usize> {
        match self.slot(name, ParamType::Choice)?.value {
            ParamValue::Choice(i) => Ok(i),
            _ => Ok(0),
        }
    }

    fn choice_option(&self, name: &str, index: usize) -> Result<String> {
        Ok(self
            .slot(name, ParamType::Choice)?
            .options
            .get(index)
            .cloned()
            .unwrap_or_default())
    }

    fn choice_options(&self, name: &str) -> Result<Vec<String>> {
        Ok(self.slot(name, ParamType::Choice)?.options.clone())
    }

    fn reset_options(&mut self, name: &str, options: &[String]) -> Result<()> {
        let slot = self.slot_mut(name, ParamType::Choice)?;
        slot.options = options.to_vec();
        slot.value = ParamValue::Choice(0);
        slot.default = ParamValue::Choice(0);
        Ok(())
    }

    fn set_choice_default(&mut self, name: &str, index: usize) -> Result<()> {
        self.slot_mut(name, ParamType::Choice)?.default = ParamValue::Choice(index);
        Ok(())
    }

    fn reset_to_default(&mut self, name: &str) -> Result<()> {
        let slot = self
            .slots
            .get_mut(name)
            .ok_or_else(|| ReaderError::InvalidParameter(format!("unknown parameter {name}")))?;
        slot.value = slot.default;
        Ok(())
    }

    fn int(&self, name: &str) -> Result<i32> {
        match self.slot(name, ParamType::Int)?.value {
            ParamValue::Int(v) => Ok(v),
            _ => Ok(0),
        }
    }

    fn set_int(&mut self, name: &str, value: i32) -> Result<()> {
        let slot = self.slot_mut(name, ParamType::Int)?;
        slot.value = ParamValue::Int(slot.clamp(value as f64) as i32);
        Ok(())
    }

    fn set_int_default(&mut self, name: &str, value: i32) -> Result<()> {
        let slot = self.slot_mut(name, ParamType::Int)?;
        slot.default = ParamValue::Int(slot.clamp(value as f64) as i32);
        Ok(())
    }

    fn double(&self, name: &str) -> Result<f64> {
        match self.slot(name, ParamType::Double)?.value {
            ParamValue::Double(v) => Ok(v),
            _ => Ok(0.0),
        }
    }

    fn set_double(&mut self, name: &str, value: f64) -> Result<()> {
        let slot = self.slot_mut(name, ParamType::Double)?;
        slot.value = ParamValue::Double(slot.clamp(value));
        Ok(())
    }

    fn set_double_default(&mut self, name: &str, value: f64) -> Result<()> {
        let slot = self.slot_mut(name, ParamType::Double)?;
        slot.default = ParamValue::Double(slot.clamp(value));
        Ok(())
    }

    fn boolean(&self, name: &str) -> Result<bool> {
        match self.slot(name, ParamType::Bool)?.value {
            ParamValue::Bool(v) => Ok(v),
            _ => Ok(false),
        }
    }

    fn set_boolean(&mut self, name: &str, value: bool) -> Result<()> {
        self.slot_mut(name, ParamType::Bool)?.value = ParamValue::Bool(value);
        Ok(())
    }

    fn set_boolean_default(&mut self, name: &str, value: bool) -> Result<()> {
        self.slot_mut(name, ParamType::Bool)?.default = ParamValue::Bool(value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::names;

    #[test]
    fn test_defaults_from_descriptors() {
        let store = ParamStore::new();
        assert_eq!(store.choice_index(names::QUALITY).unwrap(), 0);
        assert_eq!(store.selected_option(names::QUALITY).unwrap(), "Full");
        assert_eq!(store.int(names::COLOR_TEMP).unwrap(), 5600);
        assert!(!store.boolean(names::RECOVERY).unwrap());
    }

    #[test]
    fn test_numeric_values_are_clamped() {
        let mut store = ParamStore::new();
        store.set_int(names::TINT, 250).unwrap();
        assert_eq!(store.int(names::TINT).unwrap(), 100);
        store.set_double(names::EXPOSURE, -9.0).unwrap();
        assert_eq!(store.double(names::EXPOSURE).unwrap(), -5.0);
    }

    #[test]
    fn test_reset_options_and_default() {
        let mut store = ParamStore::new();
        let isos: Vec<String> = ["200", "400", "800"].iter().map(|s| s.to_string()).collect();
        store.reset_options(names::ISO, &isos).unwrap();
        store.set_choice_default(names::ISO, 2).unwrap();
        assert_eq!(store.choice_index(names::ISO).unwrap(), 0);
        store.reset_to_default(names::ISO).unwrap();
        assert_eq!(store.selected_option(names::ISO).unwrap(), "800");
    }

    #[test]
    fn test_empty_choice_reads_empty_option() {
        let store = ParamStore::new();
        assert_eq!(store.selected_option(names::GAMMA).unwrap(), "");
    }

    #[test]
    fn test_type_mismatch_and_unknown_names() {
        let mut store = ParamStore::new();
        assert!(store.int(names::EXPOSURE).is_err());
        assert!(store.set_boolean("sharpness", true).is_err());
        assert!(store.set_choice(names::QUALITY, 4).is_err());
        assert!(store.select_option(names::QUALITY, "Quarter").is_ok());
        assert_eq!(store.choice_index(names::QUALITY).unwrap(), 2);
    }
}
