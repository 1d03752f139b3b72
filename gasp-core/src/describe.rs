//! Descriptor construction from Rust type hints
//!
//! The binding layer: Rust types that know their own wire shape implement
//! [`Describe`], so a parser root can be written as `Vec<String>::describe()`
//! instead of hand-assembling the descriptor tree.

use crate::TypeDescriptor;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Types that can produce the descriptor the parser expects for them.
pub trait Describe {
    fn describe() -> TypeDescriptor;
}

impl Describe for String {
    fn describe() -> TypeDescriptor {
        TypeDescriptor::string()
    }
}

impl Describe for bool {
    fn describe() -> TypeDescriptor {
        TypeDescriptor::bool()
    }
}

macro_rules! describe_int {
    ($($ty:ty),*) => {
        $(impl Describe for $ty {
            fn describe() -> TypeDescriptor {
                TypeDescriptor::int()
            }
        })*
    };
}

describe_int!(i8, i16, i32, i64, u8, u16, u32);

macro_rules! describe_float {
    ($($ty:ty),*) => {
        $(impl Describe for $ty {
            fn describe() -> TypeDescriptor {
                TypeDescriptor::float()
            }
        })*
    };
}

describe_float!(f32, f64);

impl<T: Describe> Describe for Vec<T> {
    fn describe() -> TypeDescriptor {
        TypeDescriptor::list(T::describe())
    }
}

impl<T: Describe> Describe for HashSet<T> {
    fn describe() -> TypeDescriptor {
        TypeDescriptor::set(T::describe())
    }
}

impl<T: Describe> Describe for BTreeSet<T> {
    fn describe() -> TypeDescriptor {
        TypeDescriptor::set(T::describe())
    }
}

impl<V: Describe> Describe for HashMap<String, V> {
    fn describe() -> TypeDescriptor {
        TypeDescriptor::dict(TypeDescriptor::string(), V::describe())
    }
}

impl<V: Describe> Describe for BTreeMap<String, V> {
    fn describe() -> TypeDescriptor {
        TypeDescriptor::dict(TypeDescriptor::string(), V::describe())
    }
}

impl<T: Describe> Describe for Option<T> {
    fn describe() -> TypeDescriptor {
        TypeDescriptor::optional(T::describe())
    }
}

macro_rules! describe_tuple {
    ($($name:ident),+) => {
        impl<$($name: Describe),+> Describe for ($($name,)+) {
            fn describe() -> TypeDescriptor {
                TypeDescriptor::tuple(vec![$($name::describe()),+])
                    .expect("tuple descriptor from non-empty type list")
            }
        }
    };
}

describe_tuple!(A);
describe_tuple!(A, B);
describe_tuple!(A, B, C);
describe_tuple!(A, B, C, D);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TypeKind;

    #[test]
    fn std_containers_describe_themselves() {
        let desc = <HashMap<String, Vec<i64>>>::describe();
        assert_eq!(desc.kind, TypeKind::Dict);
        assert_eq!(desc.value_type().unwrap().kind, TypeKind::List);

        let desc = <Option<String>>::describe();
        assert_eq!(desc.kind, TypeKind::Optional);

        let desc = <(i64, String, bool)>::describe();
        assert_eq!(desc.kind, TypeKind::Tuple);
        assert_eq!(desc.args.len(), 3);
    }
}
