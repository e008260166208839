#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::expr::{Expr, ExprRef, INT32, INT8, Width};

/// A named, byte-addressed symbolic input.
#[derive(Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Array {
    pub name: String,
    /// Number of bytes.
    pub size: u32,
    pub domain: Width,
    pub range: Width,
}

pub type ArrayRef = Rc<Array>;

impl Array {
    /// Byte array indexed by 32-bit offsets.
    pub fn new(name: impl Into<String>, size: u32) -> ArrayRef {
        Rc::new(Array {
            name: name.into(),
            size,
            domain: INT32,
            range: INT8,
        })
    }
}

impl fmt::Display for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}] : w{} -> w{}",
            self.name, self.size, self.domain, self.range
        )
    }
}

/// Interning table for arrays: one name, one identity.
#[derive(Debug, Default)]
pub struct ArrayCache {
    arrays: HashMap<String, ArrayRef>,
}

impl ArrayCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached array called `name`, creating it on first use.
    pub fn create_array(&mut self, name: &str, size: u32) -> ArrayRef {
        let array = self
            .arrays
            .entry(name.to_string())
            .or_insert_with(|| Array::new(name, size));
        assert_eq!(
            array.size, size,
            "array `{name}` re-declared with a different size"
        );
        array.clone()
    }

    pub fn get(&self, name: &str) -> Option<&ArrayRef> {
        self.arrays.get(name)
    }
}

/// Little-endian multi-byte read of `width` bits starting at byte `offset`.
///
/// The most significant byte ends up as the left-most child of the concat chain.
pub fn read_value(array: &ArrayRef, offset: u32, width: Width) -> ExprRef {
    assert!(
        width % 8 == 0 && width > 0,
        "multi-byte reads must be a whole number of bytes"
    );
    let bytes = width / 8;
    let byte_at = |i: u32| Expr::read(array, Expr::constant((offset + i) as u64, array.domain));
    let mut value = byte_at(0);
    for i in 1..bytes {
        value = Expr::concat(byte_at(i), value);
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::ExprKind;

    #[test]
    fn cache_returns_the_same_identity() {
        let mut cache = ArrayCache::new();
        let a = cache.create_array("in", 4);
        let b = cache.create_array("in", 4);
        assert!(Rc::ptr_eq(&a, &b));
        assert!(Rc::ptr_eq(cache.get("in").unwrap(), &a));
        assert!(cache.get("out").is_none());
    }

    #[test]
    #[should_panic(expected = "different size")]
    fn cache_rejects_conflicting_sizes() {
        let mut cache = ArrayCache::new();
        cache.create_array("in", 4);
        cache.create_array("in", 8);
    }

    #[test]
    fn read_value_puts_high_byte_on_the_left() {
        let arr = Array::new("v", 4);
        let v = read_value(&arr, 0, INT32);
        assert_eq!(v.width(), INT32);
        match v.kind() {
            ExprKind::Concat(left, _) => match left.kind() {
                ExprKind::Read { index, .. } => assert_eq!(index.as_constant(), Some(3)),
                other => panic!("unexpected left child {other:?}"),
            },
            other => panic!("unexpected shape {other:?}"),
        }
    }
}
