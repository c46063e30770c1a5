// SPDX-License-Identifier: MIT

//! Reducers for merging patch values into state fields
//!
//! A patch field left as `None` means "not emitted" and leaves state alone.

/// Replace the value (default)
pub fn overwrite<T>(slot: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *slot = v;
    }
}

/// Replace an optional field when the patch carries a value
pub fn overwrite_option<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

/// Append to an accumulating field
pub fn append<T>(slot: &mut Vec<T>, values: Vec<T>) {
    slot.extend(values);
}

/// Keep the maximum value
pub fn max<T: Ord + Copy>(slot: &mut T, value: Option<T>) {
    if let Some(v) = value {
        if v > *slot {
            *slot = v;
        }
    }
}
