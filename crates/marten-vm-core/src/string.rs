//! Interned strings for property keys and binding names
//!
//! Every name the call path looks up (parameter names, `arguments`,
//! `length` and friends) goes through the intern table, so equal names
//! usually share one allocation and compare by pointer before content.

use dashmap::DashMap;
use rustc_hash::{FxBuildHasher, FxHasher};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, LazyLock};

use crate::value::INVALID_ARRAY_INDEX;

/// Process-wide intern table, keyed by content
static INTERNED: LazyLock<DashMap<Arc<str>, Arc<JsString>, FxBuildHasher>> =
    LazyLock::new(|| DashMap::with_hasher(FxBuildHasher));

/// Immutable string with a cached hash
#[derive(Clone)]
pub struct JsString {
    data: Arc<str>,
    hash: u64,
}

impl JsString {
    /// Shared instance for `s`, inserting it on first use
    pub fn intern(s: &str) -> Arc<Self> {
        if let Some(existing) = INTERNED.get(s) {
            return existing.value().clone();
        }
        let interned = Arc::new(Self::new(s));
        INTERNED
            .entry(interned.data.clone())
            .or_insert(interned)
            .value()
            .clone()
    }

    /// Uninterned string
    pub fn new(s: impl Into<Arc<str>>) -> Self {
        let data: Arc<str> = s.into();
        let mut hasher = FxHasher::default();
        data.hash(&mut hasher);
        Self {
            hash: hasher.finish(),
            data,
        }
    }

    /// String contents
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.data
    }

    /// Whether the string has no characters
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Length in UTF-16 code units, the unit script `length` reports
    pub fn utf16_len(&self) -> usize {
        self.data.encode_utf16().count()
    }

    /// Interpret the string as an array index
    ///
    /// Only canonical numeric strings qualify: no sign, no leading zeros
    /// (except `"0"` itself) and a value below 2^32 - 1.
    pub fn to_array_index(&self) -> Option<u32> {
        let bytes = self.data.as_bytes();
        if bytes.is_empty() || bytes.len() > 10 || (bytes.len() > 1 && bytes[0] == b'0') {
            return None;
        }
        let value = bytes.iter().try_fold(0u64, |acc, &b| {
            b.is_ascii_digit().then(|| acc * 10 + u64::from(b - b'0'))
        })?;
        u32::try_from(value).ok().filter(|&index| index != INVALID_ARRAY_INDEX)
    }
}

impl std::fmt::Debug for JsString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JsString({:?})", self.data)
    }
}

impl std::fmt::Display for JsString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.data)
    }
}

impl PartialEq for JsString {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && (Arc::ptr_eq(&self.data, &other.data) || self.data == other.data)
    }
}

impl Eq for JsString {}

impl Hash for JsString {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl AsRef<str> for JsString {
    fn as_ref(&self) -> &str {
        &self.data
    }
}

/// Names the runtime itself installs or looks up
pub mod well_known {
    use super::JsString;
    use std::sync::{Arc, LazyLock};

    macro_rules! well_known_string {
        ($($name:ident => $value:literal),* $(,)?) => {
            $(
                #[doc = concat!("`", $value, "`")]
                pub static $name: LazyLock<Arc<JsString>> = LazyLock::new(|| JsString::intern($value));
            )*
        };
    }

    well_known_string! {
        LENGTH => "length",
        PROTOTYPE => "prototype",
        CONSTRUCTOR => "constructor",
        NAME => "name",
        CALLER => "caller",
        CALLEE => "callee",
        ARGUMENTS => "arguments",
    }
}
