//! Helpers for moving strings and value arrays across the binary interface.
//!
//! Call sites never touch raw buffers: strings become owned [`CString`]s for
//! the duration of a call, and value arrays travel as a [`RealBuffer`] whose
//! reference and value vectors are kept the same length.

use std::ffi::{CStr, CString, c_char};

use crate::error::MarshalError;

/// Splits a `;`-separated descriptor string into exactly `count` upper-cased
/// elements.
///
/// Surrounding whitespace is trimmed. Missing elements are returned as empty
/// strings; surplus elements are ignored.
pub fn split_delimited(s: &str, count: usize) -> Vec<String> {
    let mut parts = s.split(';').map(|p| p.trim().to_ascii_uppercase());
    (0..count).map(|_| parts.next().unwrap_or_default()).collect()
}

/// Joins elements into a `;`-terminated descriptor string.
pub fn join_delimited<'a>(items: impl IntoIterator<Item = &'a str>) -> String {
    items.into_iter().fold(String::new(), |mut acc, item| {
        acc.push_str(item);
        acc.push(';');
        acc
    })
}

/// Fails if `s` does not fit a buffer of `capacity` bytes.
///
/// # Errors
///
/// Returns [`MarshalError::BufferOverflow`] naming `field`.
pub fn check_capacity(field: &str, s: &str, capacity: usize) -> Result<(), MarshalError> {
    if s.len() > capacity {
        return Err(MarshalError::BufferOverflow {
            field: field.to_string(),
            len: s.len(),
            capacity,
        });
    }
    Ok(())
}

/// Copies `s` into a NUL-terminated string for one foreign call.
///
/// # Errors
///
/// Returns [`MarshalError::InteriorNul`] if `s` contains a NUL byte.
pub fn to_c_string(field: &str, s: &str) -> Result<CString, MarshalError> {
    CString::new(s).map_err(|_| MarshalError::InteriorNul {
        field: field.to_string(),
    })
}

/// Copies a foreign NUL-terminated string; a null pointer yields `""`.
///
/// # Safety
///
/// `ptr` must be null or point to a valid NUL-terminated string that stays
/// alive for the duration of the call.
pub unsafe fn from_c_str(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    // SAFETY: non-null and NUL-terminated per the caller's contract.
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

/// Value references and their values, index-aligned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RealBuffer {
    refs: Vec<u32>,
    values: Vec<f64>,
}

impl RealBuffer {
    /// Pairs references with values.
    ///
    /// # Errors
    ///
    /// Returns [`MarshalError::LengthMismatch`] if the lengths differ.
    pub fn new(refs: Vec<u32>, values: Vec<f64>) -> Result<Self, MarshalError> {
        if refs.len() != values.len() {
            return Err(MarshalError::LengthMismatch {
                refs: refs.len(),
                values: values.len(),
            });
        }
        Ok(Self { refs, values })
    }

    /// A buffer ready to receive values for `refs`.
    pub fn zeroed(refs: Vec<u32>) -> Self {
        let values = vec![0.0; refs.len()];
        Self { refs, values }
    }

    /// Number of pairs.
    pub fn len(&self) -> usize {
        self.refs.len()
    }

    /// Returns `true` if the buffer holds no pairs.
    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    /// Value references.
    pub fn refs(&self) -> &[u32] {
        &self.refs
    }

    /// Values.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Mutable values, for a foreign call to fill in.
    pub fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    /// Consumes the buffer, returning the values.
    pub fn into_values(self) -> Vec<f64> {
        self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_uppercases_and_pads() {
        let parts = split_delimited("Zone 1;  outdoor ;", 3);
        assert_eq!(parts, vec!["ZONE 1", "OUTDOOR", ""]);
    }

    #[test]
    fn split_ignores_surplus() {
        assert_eq!(split_delimited("a;b;c;", 2), vec!["A", "B"]);
        assert!(split_delimited("a;b", 0).is_empty());
    }

    #[test]
    fn join_terminates_every_element() {
        assert_eq!(join_delimited(["a", "b"]), "a;b;");
        assert_eq!(join_delimited(Vec::<&str>::new()), "");
    }

    #[test]
    fn capacity_is_checked() {
        assert!(check_capacity("names", "abc", 3).is_ok());
        let err = check_capacity("names", "abcd", 3);
        assert!(matches!(
            err,
            Err(MarshalError::BufferOverflow {
                len: 4,
                capacity: 3,
                ..
            })
        ));
    }

    #[test]
    fn c_string_round_trip() {
        let c = to_c_string("path", "tmp-fmus/room_1").expect("no NUL");
        // SAFETY: `c` is a valid NUL-terminated string.
        let back = unsafe { from_c_str(c.as_ptr()) };
        assert_eq!(back, "tmp-fmus/room_1");
        assert!(to_c_string("path", "a\0b").is_err());
        // SAFETY: null is explicitly allowed.
        assert_eq!(unsafe { from_c_str(std::ptr::null()) }, "");
    }

    #[test]
    fn real_buffer_requires_aligned_lengths() {
        assert!(RealBuffer::new(vec![1, 2], vec![0.0]).is_err());
        let mut buf = RealBuffer::zeroed(vec![7, 9]);
        buf.values_mut()[1] = 3.5;
        assert_eq!(buf.refs(), &[7, 9]);
        assert_eq!(buf.into_values(), vec![0.0, 3.5]);
    }
}
