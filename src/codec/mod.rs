//! Blob codec for derived lists.
//!
//! Derived lists (service items, materials, badges, photos) are the
//! authoritative in-memory representation; the store persists them as
//! opaque CBOR blobs that are regenerated on every save. The round-trip
//! guarantee is structural, not byte-identical.
//!
//! Transformers are looked up by name from a [`TransformerRegistry`]
//! that must be fully built before a store session opens. Decode
//! failures are surfaced as errors here; the store layer degrades to an
//! empty list and reports the problem rather than failing a load.

use std::any::Any;
use std::collections::HashMap;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::models::{Badge, Material, ServiceItem};

/// Registered transformer name for invoice service items.
pub const SERVICE_ITEMS: &str = "service-items";
/// Registered transformer name for work order materials.
pub const MATERIALS: &str = "materials";
/// Registered transformer name for tradesman badges.
pub const BADGES: &str = "badges";

/// Errors from blob encoding and decoding.
#[derive(Debug)]
pub enum CodecError {
    /// CBOR encoding failed
    Encode(String),
    /// CBOR decoding failed
    Decode(String),
    /// No transformer registered under the requested name
    UnknownTransformer(String),
    /// The value passed to a transformer was not its payload type
    PayloadType(String),
}

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodecError::Encode(e) => write!(f, "Encode error: {}", e),
            CodecError::Decode(e) => write!(f, "Decode error: {}", e),
            CodecError::UnknownTransformer(name) => {
                write!(f, "No transformer registered under '{}'", name)
            }
            CodecError::PayloadType(name) => {
                write!(f, "Wrong payload type for transformer '{}'", name)
            }
        }
    }
}

impl std::error::Error for CodecError {}

/// Encode a list of values as CBOR bytes.
pub fn encode_list<T: Serialize>(items: &[T]) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::new();
    ciborium::into_writer(items, &mut buf).map_err(|e| CodecError::Encode(e.to_string()))?;
    Ok(buf)
}

/// Decode a list of values from CBOR bytes.
pub fn decode_list<T: DeserializeOwned>(bytes: &[u8]) -> Result<Vec<T>, CodecError> {
    ciborium::from_reader(bytes).map_err(|e| CodecError::Decode(e.to_string()))
}

/// A named serializer for one derived-list payload type.
pub trait BlobTransformer: Send + Sync {
    fn name(&self) -> &'static str;
    fn encode_value(&self, value: &dyn Any) -> Result<Vec<u8>, CodecError>;
    fn decode_value(&self, bytes: &[u8]) -> Result<Box<dyn Any + Send>, CodecError>;
}

/// CBOR list transformer for a concrete element type.
pub struct ListTransformer<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ListTransformer<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }
}

impl<T> BlobTransformer for ListTransformer<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn encode_value(&self, value: &dyn Any) -> Result<Vec<u8>, CodecError> {
        let items = value
            .downcast_ref::<Vec<T>>()
            .ok_or_else(|| CodecError::PayloadType(self.name.to_string()))?;
        encode_list(items)
    }

    fn decode_value(&self, bytes: &[u8]) -> Result<Box<dyn Any + Send>, CodecError> {
        let items: Vec<T> = decode_list(bytes)?;
        Ok(Box::new(items))
    }
}

/// Name-keyed set of blob transformers.
///
/// The registry is immutable once handed to a store session, so every
/// transformer a stored row might need must be registered first.
#[derive(Default)]
pub struct TransformerRegistry {
    transformers: HashMap<&'static str, Box<dyn BlobTransformer>>,
}

impl TransformerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the three transformers the store requires.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(ListTransformer::<ServiceItem>::new(SERVICE_ITEMS)));
        registry.register(Box::new(ListTransformer::<Material>::new(MATERIALS)));
        registry.register(Box::new(ListTransformer::<Badge>::new(BADGES)));
        registry
    }

    pub fn register(&mut self, transformer: Box<dyn BlobTransformer>) {
        self.transformers.insert(transformer.name(), transformer);
    }

    pub fn get(&self, name: &str) -> Result<&dyn BlobTransformer, CodecError> {
        self.transformers
            .get(name)
            .map(|t| t.as_ref())
            .ok_or_else(|| CodecError::UnknownTransformer(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.transformers.contains_key(name)
    }

    /// Encode a typed list through the named transformer.
    pub fn encode<T: 'static>(&self, name: &str, items: &Vec<T>) -> Result<Vec<u8>, CodecError> {
        self.get(name)?.encode_value(items)
    }

    /// Decode a typed list through the named transformer.
    pub fn decode<T: 'static>(&self, name: &str, bytes: &[u8]) -> Result<Vec<T>, CodecError> {
        let boxed = self.get(name)?.decode_value(bytes)?;
        boxed
            .downcast::<Vec<T>>()
            .map(|items| *items)
            .map_err(|_| CodecError::PayloadType(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Photo;

    #[test]
    fn test_encode_decode_service_items() {
        let items = vec![
            ServiceItem::new("Drain cleaning", 149.0, 1),
            ServiceItem::new("Service call", 50.0, 2),
        ];

        let bytes = encode_list(&items).unwrap();
        let decoded: Vec<ServiceItem> = decode_list(&bytes).unwrap();

        assert_eq!(decoded, items);
    }

    #[test]
    fn test_encode_decode_materials_preserves_order() {
        let materials = vec![
            Material::new("PVC pipe", 3.0, 4.50),
            Material::new("Pipe cement", 1.0, 7.25),
            Material::new("Teflon tape", 2.0, 1.10),
        ];

        let bytes = encode_list(&materials).unwrap();
        let decoded: Vec<Material> = decode_list(&bytes).unwrap();

        assert_eq!(decoded, materials);
    }

    #[test]
    fn test_encode_decode_badges() {
        let badges = vec![Badge::new("First Job"), Badge::new("Ten Streak")];

        let bytes = encode_list(&badges).unwrap();
        let decoded: Vec<Badge> = decode_list(&bytes).unwrap();

        assert_eq!(decoded, badges);
    }

    #[test]
    fn test_encode_decode_photos() {
        let photos = vec![Photo::new(vec![0xff, 0xd8, 0xff]), Photo::new(vec![1, 2])];

        let bytes = encode_list(&photos).unwrap();
        let decoded: Vec<Photo> = decode_list(&bytes).unwrap();

        assert_eq!(decoded, photos);
    }

    #[test]
    fn test_decode_corrupt_bytes_is_error() {
        let garbage = [0x00, 0x01, 0xfe, 0xff, 0x42];
        let result: Result<Vec<ServiceItem>, _> = decode_list(&garbage);
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_empty_bytes_is_error() {
        let result: Result<Vec<Material>, _> = decode_list(&[]);
        assert!(result.is_err());
    }

    #[test]
    fn test_standard_registry_names() {
        let registry = TransformerRegistry::standard();
        assert!(registry.contains(SERVICE_ITEMS));
        assert!(registry.contains(MATERIALS));
        assert!(registry.contains(BADGES));
    }

    #[test]
    fn test_registry_roundtrip() {
        let registry = TransformerRegistry::standard();
        let badges = vec![Badge::new("First Job")];

        let bytes = registry.encode(BADGES, &badges).unwrap();
        let decoded: Vec<Badge> = registry.decode(BADGES, &bytes).unwrap();

        assert_eq!(decoded, badges);
    }

    #[test]
    fn test_registry_unknown_name() {
        let registry = TransformerRegistry::standard();
        let result: Result<Vec<Badge>, _> = registry.decode("signatures", &[]);

        match result {
            Err(CodecError::UnknownTransformer(name)) => assert_eq!(name, "signatures"),
            other => panic!("Expected UnknownTransformer, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_registry_wrong_payload_type() {
        let registry = TransformerRegistry::standard();
        let badges = vec![Badge::new("First Job")];

        // Encoding badges through the materials transformer is a type error
        let result = registry.encode(MATERIALS, &badges);
        assert!(matches!(result, Err(CodecError::PayloadType(_))));
    }
}
