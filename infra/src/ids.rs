use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

pub use crate::untyped_ids::{IdGen, IdParseError};
use crate::untyped_ids::UntypedId;

pub struct Id<T> {
    inner: UntypedId,
    phantom: PhantomData<T>,
}

pub trait Entity {
    const PREFIX: &'static str;
}

const DIVIDER: &str = "-";

impl<T> Id<T> {
    pub fn hashed<H: Hash + ?Sized>(entity: &H) -> Self {
        Self::from_untyped(UntypedId::hashed(entity))
    }

    pub(crate) fn from_untyped(inner: UntypedId) -> Self {
        Id {
            inner,
            phantom: PhantomData,
        }
    }

    pub fn untyped(&self) -> UntypedId {
        self.inner
    }
}

impl<T: Entity> fmt::Display for Id<T> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}{}{}", T::PREFIX, DIVIDER, self.inner)
    }
}

impl<T> fmt::Debug for Id<T> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(&self.inner, fmt)
    }
}

impl<T: Entity> std::str::FromStr for Id<T> {
    type Err = IdParseError;
    fn from_str(src: &str) -> Result<Self, Self::Err> {
        if !src.starts_with(T::PREFIX) {
            return Err(IdParseError::InvalidPrefix);
        }
        let remainder = &src[T::PREFIX.len()..];
        if !remainder.starts_with(DIVIDER) {
            return Err(IdParseError::Unparseable);
        }
        let inner = UntypedId::parse_body(&remainder[DIVIDER.len()..])?;
        Ok(Self::from_untyped(inner))
    }
}

impl<T> Default for Id<T> {
    fn default() -> Self {
        Self::from_untyped(UntypedId::default())
    }
}

impl<T> Hash for Id<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.hash(state)
    }
}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl<T> Eq for Id<T> {}

impl<T> PartialOrd for Id<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Id<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.inner.cmp(&other.inner)
    }
}

impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Id<T> {}

impl<T: Entity> Serialize for Id<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de, T: Entity> Deserialize<'de> for Id<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct IdStrVisitor<T>(PhantomData<T>);
        impl<'vi, T: Entity> de::Visitor<'vi> for IdStrVisitor<T> {
            type Value = Id<T>;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                write!(formatter, "an Id string")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Id<T>, E> {
                value.parse::<Id<T>>().map_err(E::custom)
            }
        }

        deserializer.deserialize_str(IdStrVisitor(PhantomData))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Debug)]
    struct Shelf;

    impl Entity for Shelf {
        const PREFIX: &'static str = "shelf";
    }

    #[derive(Debug)]
    struct Jar;

    impl Entity for Jar {
        const PREFIX: &'static str = "jar";
    }

    #[test]
    fn hashed_ids_are_stable_per_key() {
        let alice = Id::<Shelf>::hashed(&("shelf", "alice"));

        assert_eq!(alice, Id::<Shelf>::hashed(&("shelf", "alice")));
        assert_ne!(alice, Id::<Shelf>::hashed(&("shelf", "bob")));
    }

    #[test]
    fn displayed_form_parses_back() {
        let id = IdGen::new().generate::<Shelf>();
        let text = id.to_string();

        assert!(text.starts_with("shelf-"), "{:?}", text);
        assert_eq!(text.parse::<Id<Shelf>>(), Ok(id));
    }

    #[test]
    fn json_form_is_the_displayed_string() {
        let id = Id::<Jar>::hashed("pickles");

        let json = serde_json::to_value(&id).expect("to_value");
        assert_eq!(json, serde_json::Value::String(id.to_string()));

        let back: Id<Jar> = serde_json::from_value(json).expect("from_value");
        assert_eq!(back, id);
    }

    #[test]
    fn later_ids_sort_after_earlier_ones() {
        let idgen = IdGen::new();
        let ids = (0..16).map(|_| idgen.generate::<Jar>()).collect::<Vec<_>>();

        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(sorted, ids);
    }

    #[test]
    fn ids_of_another_entity_are_rejected() {
        let jar = IdGen::new().generate::<Jar>().to_string();

        assert_eq!(jar.parse::<Id<Shelf>>(), Err(IdParseError::InvalidPrefix));
    }

    #[test]
    fn malformed_ids_are_unparseable() {
        let body = IdGen::new().untyped();
        for text in &[
            "shelf".to_string(),
            format!("shelf#{}", body),
            "shelf-!!!".to_string(),
        ] {
            assert_eq!(
                text.parse::<Id<Shelf>>(),
                Err(IdParseError::Unparseable),
                "{:?}",
                text
            );
        }
    }
}
