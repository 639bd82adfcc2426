//! Result shapes.
//!
//! The remote tier stores JSON, which forgets whether a value was a list, a
//! set or a map and what its elements were. Every cached result type
//! therefore describes itself through [`CacheValue::shape`], and the remote
//! codec uses that description to rebuild the exact declared type.
//!
//! ```
//! use memo_engine::{CacheValue, ResultShape};
//! use std::collections::HashMap;
//!
//! assert!(matches!(<Vec<String>>::shape(), ResultShape::List(_)));
//! assert!(matches!(<Option<u64>>::shape(), ResultShape::Optional(_)));
//! assert!(matches!(<HashMap<String, i64>>::shape(), ResultShape::Map(_, _)));
//! assert_eq!(<Vec<u32>>::shape().to_string(), "List<u32>");
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::hash::Hash;

/// Name of a concrete element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeToken(&'static str);

impl TypeToken {
    #[must_use]
    pub fn of<T: ?Sized>() -> Self {
        Self(std::any::type_name::<T>())
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for TypeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Structural shape of a cached result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultShape {
    Scalar(TypeToken),
    /// Absent values are never cached; present ones travel as the inner value.
    Optional(TypeToken),
    List(TypeToken),
    Set(TypeToken),
    Map(TypeToken, TypeToken),
}

impl fmt::Display for ResultShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(t) => write!(f, "{}", t),
            Self::Optional(t) => write!(f, "Optional<{}>", t),
            Self::List(t) => write!(f, "List<{}>", t),
            Self::Set(t) => write!(f, "Set<{}>", t),
            Self::Map(k, v) => write!(f, "Map<{}, {}>", k, v),
        }
    }
}

/// A value that can be memoized in both tiers.
///
/// User types only need an empty impl to be cached as scalars:
///
/// ```
/// use memo_engine::CacheValue;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Clone, Serialize, Deserialize)]
/// struct Roster { members: Vec<String> }
///
/// impl CacheValue for Roster {}
/// ```
pub trait CacheValue: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    fn shape() -> ResultShape {
        ResultShape::Scalar(TypeToken::of::<Self>())
    }

    /// An explicit "no value" that must not be memoized.
    fn is_absent(&self) -> bool {
        false
    }
}

macro_rules! scalar_cache_value {
    ($($t:ty),* $(,)?) => {
        $(impl CacheValue for $t {})*
    };
}

scalar_cache_value!(
    String, bool, char, i8, i16, i32, i64, i128, u8, u16, u32, u64, u128, usize, isize, f32, f64,
    serde_json::Value,
);

impl<T: CacheValue> CacheValue for Option<T> {
    fn shape() -> ResultShape {
        ResultShape::Optional(TypeToken::of::<T>())
    }

    fn is_absent(&self) -> bool {
        self.is_none()
    }
}

impl<T: CacheValue> CacheValue for Vec<T> {
    fn shape() -> ResultShape {
        ResultShape::List(TypeToken::of::<T>())
    }
}

impl<T: CacheValue + Eq + Hash> CacheValue for HashSet<T> {
    fn shape() -> ResultShape {
        ResultShape::Set(TypeToken::of::<T>())
    }
}

impl<T: CacheValue + Ord> CacheValue for BTreeSet<T> {
    fn shape() -> ResultShape {
        ResultShape::Set(TypeToken::of::<T>())
    }
}

impl<K, V> CacheValue for HashMap<K, V>
where
    K: CacheValue + Eq + Hash,
    V: CacheValue,
{
    fn shape() -> ResultShape {
        ResultShape::Map(TypeToken::of::<K>(), TypeToken::of::<V>())
    }
}

impl<K, V> CacheValue for BTreeMap<K, V>
where
    K: CacheValue + Ord,
    V: CacheValue,
{
    fn shape() -> ResultShape {
        ResultShape::Map(TypeToken::of::<K>(), TypeToken::of::<V>())
    }
}
