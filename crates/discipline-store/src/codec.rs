//! How a stored value is turned into text and back

use std::error::Error;

pub type BoxError = Box<dyn Error + Send + Sync>;

type SerializeFn<V> = Box<dyn Fn(&V) -> String + Send + Sync>;
type DeserializeFn<V> = Box<dyn Fn(&str) -> Result<V, BoxError> + Send + Sync>;
type FallbackFn<V> = Box<dyn Fn() -> V + Send + Sync>;

/// Serialize, deserialize and fallback functions for one kind of value.
///
/// The fallback is what a store returns (and writes) when nothing has been
/// stored yet.
pub struct Codec<V> {
    serialize: SerializeFn<V>,
    deserialize: DeserializeFn<V>,
    fallback: FallbackFn<V>,
}

impl<V> Codec<V> {
    pub fn new<S, D, F, E>(serialize: S, deserialize: D, fallback: F) -> Self
    where
        S: Fn(&V) -> String + Send + Sync + 'static,
        D: Fn(&str) -> Result<V, E> + Send + Sync + 'static,
        F: Fn() -> V + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        Self {
            serialize: Box::new(serialize),
            deserialize: Box::new(move |text| deserialize(text).map_err(Into::into)),
            fallback: Box::new(fallback),
        }
    }

    pub fn serialize(&self, value: &V) -> String {
        (self.serialize)(value)
    }

    pub fn deserialize(&self, text: &str) -> Result<V, BoxError> {
        (self.deserialize)(text)
    }

    pub fn fallback(&self) -> V {
        (self.fallback)()
    }
}
