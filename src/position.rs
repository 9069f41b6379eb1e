//! Position keys and the allocator that places items between neighbors.
//!
//! Keys are strings of base-62 digits (`0-9A-Za-z`, in ASCII order) read as a
//! fraction in `[0, 1)`. A key never ends in `0`, which makes byte-wise string
//! order identical to numeric order: `ORDER BY position` in SQL and `Ord` on
//! [`Key`] both yield display order.
//!
//! Inserting between two keys only ever produces a new key for the moved
//! item. When the midpoint would need more digits than the configured maximum
//! key length the allocator reports [`AllocError::KeySpaceExhausted`] and the
//! caller renumbers the container with [`spaced_keys`].

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

const DIGITS: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
const BASE: u32 = 62;

/// Smallest accepted `max_key_length`. Renumbered keys stay short enough that
/// a fresh midpoint always fits for any realistic container size.
pub const MIN_KEY_LENGTH: usize = 8;

/// Default maximum key length before a renumbering pass is requested.
pub const DEFAULT_MAX_KEY_LENGTH: usize = 12;

/// An ordering key. See the module docs for the representation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Key(String);

/// Rejected key text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid position key {key:?}: {reason}")]
pub struct InvalidKey {
    pub key: String,
    pub reason: &'static str,
}

impl Key {
    /// Validate and wrap untrusted key text (e.g. a row read back from storage).
    pub fn parse(s: impl Into<String>) -> Result<Self, InvalidKey> {
        let key = s.into();
        if key.is_empty() {
            return Err(InvalidKey {
                key,
                reason: "key is empty",
            });
        }
        if key.bytes().any(|b| digit_value(b).is_none()) {
            return Err(InvalidKey {
                key,
                reason: "key contains a character outside 0-9A-Za-z",
            });
        }
        if key.ends_with('0') {
            return Err(InvalidKey {
                key,
                reason: "key ends with a zero digit",
            });
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn from_digits(bytes: Vec<u8>) -> Self {
        // Only ever called with bytes drawn from DIGITS.
        Self(bytes.into_iter().map(char::from).collect())
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Key {
    type Error = InvalidKey;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Key::parse(value)
    }
}

impl From<Key> for String {
    fn from(key: Key) -> Self {
        key.0
    }
}

/// Allocation failures. Both are recovered or reported inside the engine and
/// never reach an HTTP caller as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocError {
    #[error("no room between position keys {before:?} and {after:?}")]
    KeySpaceExhausted {
        before: Option<Key>,
        after: Option<Key>,
    },

    #[error("position keys out of order: {before} is not below {after}")]
    OutOfOrder { before: Key, after: Key },
}

/// Computes keys strictly between two neighbors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionAllocator {
    max_key_length: usize,
}

impl Default for PositionAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_KEY_LENGTH)
    }
}

impl PositionAllocator {
    /// Create an allocator; lengths below [`MIN_KEY_LENGTH`] are raised to it.
    pub fn new(max_key_length: usize) -> Self {
        Self {
            max_key_length: max_key_length.max(MIN_KEY_LENGTH),
        }
    }

    pub fn max_key_length(&self) -> usize {
        self.max_key_length
    }

    /// Return a key strictly between `before` and `after`.
    ///
    /// A missing `before` means "start of the container", a missing `after`
    /// means "end of the container"; with both missing the container is empty
    /// and the default key is returned.
    pub fn allocate(&self, before: Option<&Key>, after: Option<&Key>) -> Result<Key, AllocError> {
        if let (Some(b), Some(a)) = (before, after)
            && b >= a
        {
            return Err(AllocError::OutOfOrder {
                before: b.clone(),
                after: a.clone(),
            });
        }

        let lower = before.map(|k| k.0.as_bytes()).unwrap_or(&[]);
        let upper = after.map(|k| k.0.as_bytes());
        let digits = midpoint(lower, upper);

        if digits.len() > self.max_key_length {
            return Err(AllocError::KeySpaceExhausted {
                before: before.cloned(),
                after: after.cloned(),
            });
        }

        Ok(Key::from_digits(digits))
    }

    /// Key for appending after the current last item (or into an empty container).
    pub fn append_after(&self, last: Option<&Key>) -> Result<Key, AllocError> {
        self.allocate(last, None)
    }
}

/// Produce `count` evenly spaced, strictly increasing keys.
///
/// Keys share a fixed width chosen so that at least one full digit of room
/// remains between neighbors, then have trailing zeros trimmed.
pub fn spaced_keys(count: usize) -> Vec<Key> {
    if count == 0 {
        return Vec::new();
    }

    let slots = count as u128 + 1;
    let mut width = 2u32;
    while width < 21 && (BASE as u128).pow(width) < slots * BASE as u128 {
        width += 1;
    }
    let span = (BASE as u128).pow(width);
    let step = span / slots;

    (1..=count as u128)
        .map(|i| Key::from_digits(encode_fixed(i * step, width)))
        .collect()
}

fn digit_value(b: u8) -> Option<u32> {
    match b {
        b'0'..=b'9' => Some((b - b'0') as u32),
        b'A'..=b'Z' => Some((b - b'A') as u32 + 10),
        b'a'..=b'z' => Some((b - b'a') as u32 + 36),
        _ => None,
    }
}

fn value_of(b: u8) -> u32 {
    digit_value(b).unwrap_or(0)
}

fn digit(v: u32) -> u8 {
    DIGITS[v as usize]
}

/// Midpoint of two fractions given as digit strings. `lower` may be empty
/// (zero); `upper` of `None` is one. Requires `lower < upper` and no trailing
/// zero on either input; the result has no trailing zero either.
fn midpoint(lower: &[u8], upper: Option<&[u8]>) -> Vec<u8> {
    if let Some(upper) = upper {
        let mut shared = 0;
        while shared < upper.len() && lower.get(shared).copied().unwrap_or(b'0') == upper[shared] {
            shared += 1;
        }
        if shared > 0 {
            let rest = lower.get(shared..).unwrap_or(&[]);
            let mut out = upper[..shared].to_vec();
            out.extend(midpoint(rest, Some(&upper[shared..])));
            return out;
        }
    }

    let lo = lower.first().map(|&b| value_of(b)).unwrap_or(0);
    let hi = upper.map(|u| value_of(u[0])).unwrap_or(BASE);

    if hi - lo > 1 {
        vec![digit((lo + hi) / 2)]
    } else if let Some(upper) = upper.filter(|u| u.len() > 1) {
        vec![upper[0]]
    } else {
        let mut out = vec![digit(lo)];
        out.extend(midpoint(lower.get(1..).unwrap_or(&[]), None));
        out
    }
}

fn encode_fixed(mut value: u128, width: u32) -> Vec<u8> {
    let mut out = vec![b'0'; width as usize];
    for slot in out.iter_mut().rev() {
        *slot = digit((value % BASE as u128) as u32);
        value /= BASE as u128;
    }
    while out.last() == Some(&b'0') {
        out.pop();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> Key {
        Key::parse(s).unwrap()
    }

    #[test]
    fn test_empty_container_gets_default_key() {
        let alloc = PositionAllocator::default();
        assert_eq!(alloc.allocate(None, None).unwrap().as_str(), "V");
    }

    #[test]
    fn test_allocate_between() {
        let alloc = PositionAllocator::default();
        let a = key("A");
        let c = key("C");
        let b = alloc.allocate(Some(&a), Some(&c)).unwrap();
        assert!(a < b && b < c);
        assert_eq!(b.as_str(), "B");
    }

    #[test]
    fn test_allocate_between_adjacent_digits_extends() {
        let alloc = PositionAllocator::default();
        let a = key("A");
        let b = key("B");
        let mid = alloc.allocate(Some(&a), Some(&b)).unwrap();
        assert!(a < mid && mid < b);
        assert_eq!(mid.len(), 2);
    }

    #[test]
    fn test_allocate_before_first() {
        let alloc = PositionAllocator::default();
        let first = key("1");
        let k = alloc.allocate(None, Some(&first)).unwrap();
        assert!(k < first);
        assert_eq!(k.as_str(), "0V");
    }

    #[test]
    fn test_allocate_after_last() {
        let alloc = PositionAllocator::default();
        let last = key("z");
        let k = alloc.allocate(Some(&last), None).unwrap();
        assert!(k > last);
        assert_eq!(k.as_str(), "zV");
    }

    #[test]
    fn test_allocate_rejects_out_of_order() {
        let alloc = PositionAllocator::default();
        let a = key("b");
        let b = key("a");
        assert!(matches!(
            alloc.allocate(Some(&a), Some(&b)),
            Err(AllocError::OutOfOrder { .. })
        ));
        assert!(matches!(
            alloc.allocate(Some(&a), Some(&a)),
            Err(AllocError::OutOfOrder { .. })
        ));
    }

    #[test]
    fn test_repeated_head_inserts_exhaust_key_space() {
        let alloc = PositionAllocator::new(MIN_KEY_LENGTH);
        let mut head = alloc.allocate(None, None).unwrap();
        let mut inserted = 0;
        loop {
            match alloc.allocate(None, Some(&head)) {
                Ok(k) => {
                    assert!(k < head);
                    head = k;
                    inserted += 1;
                }
                Err(AllocError::KeySpaceExhausted { before, after }) => {
                    assert!(before.is_none());
                    assert_eq!(after, Some(head));
                    break;
                }
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert!(inserted > 10);
    }

    #[test]
    fn test_repeated_bisection_stays_ordered() {
        let alloc = PositionAllocator::new(64);
        let lo = key("A");
        let mut hi = key("B");
        for _ in 0..100 {
            let mid = alloc.allocate(Some(&lo), Some(&hi)).unwrap();
            assert!(lo < mid && mid < hi);
            assert!(!mid.as_str().ends_with('0'));
            hi = mid;
        }
    }

    #[test]
    fn test_spaced_keys_are_strictly_increasing() {
        for count in [1, 2, 61, 62, 500, 5000] {
            let keys = spaced_keys(count);
            assert_eq!(keys.len(), count);
            assert!(keys.windows(2).all(|w| w[0] < w[1]), "count {count}");
            assert!(keys.iter().all(|k| Key::parse(k.as_str()).is_ok()));
        }
    }

    #[test]
    fn test_spaced_keys_leave_room_for_inserts() {
        let alloc = PositionAllocator::default();
        let keys = spaced_keys(200);
        for pair in keys.windows(2) {
            let mid = alloc.allocate(Some(&pair[0]), Some(&pair[1])).unwrap();
            assert!(mid.len() <= pair[0].len().max(pair[1].len()) + 1);
        }
        assert!(alloc.allocate(None, Some(&keys[0])).is_ok());
        assert!(alloc.allocate(keys.last(), None).is_ok());
    }

    #[test]
    fn test_parse_rejects_bad_keys() {
        assert!(Key::parse("").is_err());
        assert!(Key::parse("a0").is_err());
        assert!(Key::parse("a-b").is_err());
        assert!(Key::parse("a01").is_ok());
    }

    #[test]
    fn test_key_serde_validates() {
        let k: Key = serde_json::from_str("\"aV\"").unwrap();
        assert_eq!(k.as_str(), "aV");
        assert!(serde_json::from_str::<Key>("\"a0\"").is_err());
        assert_eq!(serde_json::to_string(&k).unwrap(), "\"aV\"");
    }
}
