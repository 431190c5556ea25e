// Sound parameter schema
// Declared ranges, sanitizing, and the name/category fields embedded in the vector.

pub mod names;

use crate::constants::*;
use crate::error::{LibraryError, Result};

/// Declared numeric range of one parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamRange {
    pub min: i32,
    pub max: i32,
    pub step: i32,
}

impl ParamRange {
    const fn new(min: i32, max: i32, step: i32) -> Self {
        Self { min, max, step }
    }

    /// Clamp into range, then snap to the nearest valid step.
    pub fn sanitize(&self, value: i32) -> i32 {
        let clamped = value.clamp(self.min, self.max);
        if self.step <= 1 {
            return clamped;
        }
        let offset = clamped - self.min;
        let snapped = self.min + ((offset + self.step / 2) / self.step) * self.step;
        if snapped > self.max {
            snapped - self.step
        } else {
            snapped
        }
    }
}

const DEFAULT_RANGE: ParamRange = ParamRange::new(0, PARAM_MAX, 1);
const RESERVED_RANGE: ParamRange = ParamRange::new(0, 0, 1);
const OCTAVE_RANGE: ParamRange = ParamRange::new(OCTAVE_MIN, OCTAVE_MAX, OCTAVE_STEP);
const NAME_RANGE: ParamRange = ParamRange::new(NAME_CHAR_MIN, NAME_CHAR_MAX, 1);
const CATEGORY_RANGE: ParamRange = ParamRange::new(0, CATEGORIES.len() as i32 - 1, 1);

/// Range declared for parameter `index`.
pub fn range_of(index: usize) -> ParamRange {
    if is_reserved(index) {
        RESERVED_RANGE
    } else if OCTAVE_PARAMS.contains(&index) {
        OCTAVE_RANGE
    } else if (NAME_OFFSET..NAME_OFFSET + NAME_LEN).contains(&index) {
        NAME_RANGE
    } else if index == CATEGORY_INDEX {
        CATEGORY_RANGE
    } else {
        DEFAULT_RANGE
    }
}

pub fn is_reserved(index: usize) -> bool {
    RESERVED_PARAMS.contains(&index)
}

/// Indices of the non-placeholder parameters, in vector order.
pub fn valid_indices() -> impl Iterator<Item = usize> {
    (0..PARAM_COUNT).filter(|i| !is_reserved(*i))
}

pub fn check_len(params: &[i32]) -> Result<()> {
    if params.len() != PARAM_COUNT {
        return Err(LibraryError::InvalidArgument(format!(
            "parameter vector has {} values, expected {}",
            params.len(),
            PARAM_COUNT
        )));
    }
    Ok(())
}

pub fn check_index(index: usize) -> Result<()> {
    if index >= PARAM_COUNT {
        return Err(LibraryError::InvalidArgument(format!(
            "parameter index {} out of range (0..{})",
            index, PARAM_COUNT
        )));
    }
    Ok(())
}

/// Sanitize every value against its declared range.
pub fn sanitize(params: &[i32]) -> Result<Vec<i32>> {
    check_len(params)?;
    Ok(params
        .iter()
        .enumerate()
        .map(|(i, v)| range_of(i).sanitize(*v))
        .collect())
}

/// Drop the reserved placeholder slots from a full vector.
pub fn strip_reserved(params: &[i32]) -> Vec<i32> {
    params
        .iter()
        .enumerate()
        .filter(|(i, _)| !is_reserved(*i))
        .map(|(_, v)| *v)
        .collect()
}

/// The Init sound: every parameter at its minimum, octaves centered, named "Init".
pub fn init_sound() -> Vec<i32> {
    let mut params: Vec<i32> = (0..PARAM_COUNT).map(|i| range_of(i).min).collect();
    for index in OCTAVE_PARAMS {
        params[index] = OCTAVE_DEFAULT;
    }
    names::write_name(&mut params, UNTITLED_NAME);
    params
}

pub fn category_of(params: &[i32]) -> i32 {
    params.get(CATEGORY_INDEX).copied().unwrap_or(0)
}

pub fn category_name(code: i64) -> &'static str {
    usize::try_from(code)
        .ok()
        .and_then(|i| CATEGORIES.get(i))
        .copied()
        .unwrap_or("Unknown")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_clamps_and_snaps() {
        let octave = range_of(OCTAVE_PARAMS[0]);
        assert_eq!(octave.sanitize(0), OCTAVE_MIN);
        assert_eq!(octave.sanitize(500), OCTAVE_MAX);
        assert_eq!(octave.sanitize(63), 64);
        assert_eq!(octave.sanitize(57), 52);
        assert_eq!(octave.sanitize(59), 64);
        assert_eq!(range_of(10).sanitize(-5), 0);
        assert_eq!(range_of(10).sanitize(200), 127);
        assert_eq!(range_of(0).sanitize(12), 0);
    }

    #[test]
    fn test_sanitize_rejects_wrong_length() {
        assert!(sanitize(&[1, 2, 3]).is_err());
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let raw: Vec<i32> = (0..PARAM_COUNT as i32).map(|i| i * 7 - 300).collect();
        let once = sanitize(&raw).unwrap();
        let twice = sanitize(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_init_sound_is_valid() {
        let init = init_sound();
        assert_eq!(init.len(), PARAM_COUNT);
        assert_eq!(sanitize(&init).unwrap(), init);
        assert_eq!(names::read_name(&init), "Init");
    }

    #[test]
    fn test_strip_reserved() {
        let init = init_sound();
        let valid = strip_reserved(&init);
        assert_eq!(valid.len(), PARAM_COUNT - RESERVED_PARAMS.len());
        assert_eq!(valid_indices().count(), valid.len());
    }

    #[test]
    fn test_category_name() {
        assert_eq!(category_name(7), "Lead");
        assert_eq!(category_name(99), "Unknown");
    }
}
