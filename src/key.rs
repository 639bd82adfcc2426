//! Cache key derivation from call arguments.
//!
//! Every argument type of a cached operation implements [`CacheArgs`]. The
//! derived key must be deterministic: equal arguments always produce the
//! same key, in every process sharing the remote tier.
//!
//! ```
//! use memo_engine::CacheArgs;
//!
//! assert_eq!(().cache_key(), "[]");
//! assert_eq!(42u64.cache_key(), "42");
//! assert_eq!(("user".to_string(), 7u32).cache_key(), "[\"user\",7]");
//! ```

use serde::Serialize;

/// Arguments of a cached operation.
///
/// `()` marks a zero-argument operation; it is the only argument type whose
/// [`unit`](CacheArgs::unit) yields a value, which is what lets the reload
/// scheduler invoke the operation with no caller present.
///
/// User types can implement this through [`json_key`]:
///
/// ```
/// use memo_engine::{CacheArgs, json_key};
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct Query { tenant: String, page: u32 }
///
/// impl CacheArgs for Query {
///     fn cache_key(&self) -> String {
///         json_key(self)
///     }
/// }
/// ```
pub trait CacheArgs: Send + 'static {
    fn cache_key(&self) -> String;

    /// The value to call a zero-argument operation with.
    fn unit() -> Option<Self>
    where
        Self: Sized,
    {
        None
    }
}

/// Key from the JSON form of a value.
///
/// Struct fields serialize in declaration order, so the key is stable for
/// plain data types. Falls back to the type name if the value
/// cannot be serialized at all.
pub fn json_key<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| std::any::type_name::<T>().to_string())
}

impl CacheArgs for () {
    fn cache_key(&self) -> String {
        "[]".to_string()
    }

    fn unit() -> Option<Self> {
        Some(())
    }
}

macro_rules! json_cache_args {
    ($($t:ty),* $(,)?) => {
        $(impl CacheArgs for $t {
            fn cache_key(&self) -> String {
                json_key(self)
            }
        })*
    };
}

json_cache_args!(
    String, &'static str, bool, char, i8, i16, i32, i64, i128, u8, u16, u32, u64, u128, usize, isize,
);

impl<T: CacheArgs + Serialize> CacheArgs for Option<T> {
    fn cache_key(&self) -> String {
        json_key(self)
    }
}

impl<T: CacheArgs + Serialize> CacheArgs for Vec<T> {
    fn cache_key(&self) -> String {
        json_key(self)
    }
}

macro_rules! tuple_cache_args {
    ($($name:ident),+) => {
        impl<$($name: CacheArgs + Serialize),+> CacheArgs for ($($name,)+) {
            fn cache_key(&self) -> String {
                json_key(self)
            }
        }
    };
}

tuple_cache_args!(A);
tuple_cache_args!(A, B);
tuple_cache_args!(A, B, C);
tuple_cache_args!(A, B, C, D);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_is_zero_arg() {
        assert_eq!(<()>::unit(), Some(()));
        assert_eq!(<u32>::unit(), None);
        assert_eq!(<(String, u32)>::unit(), None);
    }

    #[test]
    fn test_equal_args_equal_keys() {
        let a = ("tenant-a".to_string(), 3u32);
        let b = ("tenant-a".to_string(), 3u32);
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn test_distinct_args_distinct_keys() {
        assert_ne!(1u32.cache_key(), 2u32.cache_key());
        assert_ne!("1".cache_key(), 1u32.cache_key());
        assert_ne!(Some(1u32).cache_key(), None::<u32>.cache_key());
        assert_ne!(("a", "b").cache_key(), ("ab", "").cache_key());
    }

    #[test]
    fn test_zero_arg_key_is_constant() {
        assert_eq!(().cache_key(), ().cache_key());
    }
}
