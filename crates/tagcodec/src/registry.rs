//! # Codec Registry
//!
//! Two tables, filled once at setup and read-only afterwards:
//!
//! - **Encoders**, keyed by the runtime `TypeId` of an object value. Encoding
//!   must accept whatever a caller hands it, so it dispatches on type.
//! - **Decoders**, keyed by wire `Tag`. Decoding never guesses what untrusted
//!   text is supposed to be, so it dispatches only on tags it was told about.
//!
//! Encoders return an untagged body; the registry stamps the tag, so every
//! non-primitive node leaving `encode` carries exactly one tag.

use std::any::Any;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use tagpack::Node;
use tagpack::Tag;
use tracing::debug;
use tracing::trace;

use crate::array;
use crate::array::Array;
use crate::array::Transform;
use crate::error::Error;
use crate::error::Result;
use crate::reference;
use crate::reference::Body;
use crate::reference::Link;
use crate::resolve::Resolver;
use crate::tags;
use crate::value::Object;
use crate::value::Value;

type EncodeFn = dyn Fn(&dyn Any) -> Result<Node> + Send + Sync;

/// Signature of a decoder that receives its children already decoded.
pub type ChildrenFn = dyn Fn(Value, &dyn Resolver) -> Result<Value> + Send + Sync;

/// Signature of a decoder that receives the raw node.
pub type RawFn = dyn Fn(&Node, &dyn Resolver) -> Result<Value> + Send + Sync;

/// How a tag is turned back into a value.
#[derive(Clone)]
pub enum Decoder {
    /// Children are decoded first, bottom-up, and the decoder gets the result:
    /// a list for a sequence, a map for a mapping, or the primitive of a
    /// tagged scalar.
    Children(Arc<ChildrenFn>),
    /// The decoder interprets the node itself, e.g. reading leaf children as
    /// names instead of decoding them independently.
    Raw(Arc<RawFn>),
}

impl Decoder {
    pub fn children(f: impl Fn(Value, &dyn Resolver) -> Result<Value> + Send + Sync + 'static) -> Self {
        Decoder::Children(Arc::new(f))
    }

    pub fn raw(f: impl Fn(&Node, &dyn Resolver) -> Result<Value> + Send + Sync + 'static) -> Self {
        Decoder::Raw(Arc::new(f))
    }
}

struct EncoderEntry {
    tag: Tag,
    encode: Arc<EncodeFn>,
}

/// Tag-driven encode/decode tables.
///
/// Build it with `register` during setup, then share it (`Arc<Registry>`).
/// Lookups take `&self` and are safe from any number of threads.
pub struct Registry {
    encoders: HashMap<TypeId, EncoderEntry>,
    decoders: HashMap<Tag, Decoder>,
}

impl Registry {
    /// An empty registry: only primitives, plain sequences and plain mappings.
    pub fn new() -> Self {
        Self {
            encoders: HashMap::new(),
            decoders: HashMap::new(),
        }
    }

    /// A registry with arrays, transforms, bodies and links registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry
            .register::<Array, _>(tags::ARRAY, array::encode_array, Decoder::raw(array::decode_array))
            .register::<Transform, _>(tags::TRANSFORM, array::encode_transform, Decoder::raw(array::decode_transform))
            .register::<Body, _>(tags::BODY, reference::encode_body, Decoder::raw(reference::decode_body))
            .register::<Link, _>(tags::LINK, reference::encode_link, Decoder::raw(reference::decode_link));
        registry
    }

    /// Binds `T` to `tag` for encoding and `tag` to `decode` for decoding.
    ///
    /// Registration is open for extension: registering a tag or a type again
    /// replaces the earlier binding without error, and a replaced tag is
    /// unbound from whichever type held it before. The core tags `seq` and
    /// `map` are reserved.
    pub fn register<T, E>(&mut self, tag: impl Into<Tag>, encode: E, decode: Decoder) -> &mut Self
    where
        T: Any,
        E: Fn(&T) -> Result<Node> + Send + Sync + 'static,
    {
        let tag = tag.into();
        debug_assert!(!tag.is_core() && tag.is_wire_safe(), "unusable tag {:?}", tag);

        let type_id = TypeId::of::<T>();
        let before = self.encoders.len();
        self.encoders.retain(|id, entry| *id == type_id || entry.tag != tag);
        if self.encoders.len() != before {
            debug!(tag = %tag, "tag moved to a new type");
        }

        let encode: Arc<EncodeFn> = Arc::new(move |any: &dyn Any| match any.downcast_ref::<T>() {
            Some(value) => encode(value),
            None => Err(Error::UnencodableType(std::any::type_name::<T>())),
        });
        if let Some(old) = self.encoders.insert(type_id, EncoderEntry { tag: tag.clone(), encode }) {
            debug!(old = %old.tag, new = %tag, ty = std::any::type_name::<T>(), "encoder replaced");
        }

        self.register_decoder(tag, decode)
    }

    /// Binds a decoder alone, for tags that are produced elsewhere.
    pub fn register_decoder(&mut self, tag: impl Into<Tag>, decode: Decoder) -> &mut Self {
        let tag = tag.into();
        if self.decoders.insert(tag.clone(), decode).is_some() {
            debug!(tag = %tag, "decoder replaced");
        }
        self
    }

    /// True if `tag` has a decoder.
    pub fn knows_tag(&self, tag: &Tag) -> bool {
        tag.is_core() || self.decoders.contains_key(tag)
    }

    /// The tag objects of type `T` are encoded under, if any.
    pub fn tag_of<T: Any>(&self) -> Option<&Tag> {
        self.encoders.get(&TypeId::of::<T>()).map(|entry| &entry.tag)
    }

    // ========================================================================
    //  ENCODING
    // ========================================================================

    /// Encodes a value, recursing through lists and maps.
    ///
    /// Fails with `UnencodableType` on the first object whose type has no encoder.
    pub fn encode(&self, value: &Value) -> Result<Node> {
        match value {
            Value::Null => Ok(Node::Null),
            Value::Bool(b) => Ok(Node::Bool(*b)),
            Value::Int(v) => Ok(Node::Int(*v)),
            Value::Float(v) => Ok(Node::Float(*v)),
            Value::Str(s) => Ok(Node::Str(s.clone())),
            Value::List(items) => {
                let nodes = items.iter().map(|item| self.encode(item)).collect::<Result<Vec<_>>>()?;
                Ok(Node::seq(nodes))
            }
            Value::Map(entries) => {
                let nodes = entries
                    .iter()
                    .map(|(key, item)| Ok((key.clone(), self.encode(item)?)))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Node::map(nodes))
            }
            Value::Object(obj) => self.encode_object(obj),
        }
    }

    /// Encodes a typed value without wrapping it in a `Value` first.
    pub fn encode_typed<T: Any>(&self, value: &T) -> Result<Node> {
        self.encode_any(TypeId::of::<T>(), std::any::type_name::<T>(), value)
    }

    fn encode_object(&self, obj: &Object) -> Result<Node> {
        self.encode_any(obj.type_id(), obj.type_name(), obj.as_any())
    }

    fn encode_any(&self, type_id: TypeId, type_name: &'static str, value: &dyn Any) -> Result<Node> {
        let entry = self
            .encoders
            .get(&type_id)
            .ok_or(Error::UnencodableType(type_name))?;
        let body = (entry.encode)(value)?;
        Ok(body.with_tag(entry.tag.clone()))
    }

    // ========================================================================
    //  DECODING
    // ========================================================================

    /// Decodes a node, consulting `resolver` for any references it contains.
    ///
    /// Fails with `UnknownTag` on the first tag without a decoder.
    pub fn decode(&self, node: &Node, resolver: &dyn Resolver) -> Result<Value> {
        match node {
            Node::Null => Ok(Value::Null),
            Node::Bool(b) => Ok(Value::Bool(*b)),
            Node::Int(v) => Ok(Value::Int(*v)),
            Node::Float(v) => Ok(Value::Float(*v)),
            Node::Str(s) => Ok(Value::Str(s.clone())),
            Node::Seq(tag, _) | Node::Map(tag, _) if tag.is_core() => self.decode_body(node, resolver),
            Node::Scalar(tag, _) | Node::Seq(tag, _) | Node::Map(tag, _) => self.decode_tagged(tag, node, resolver),
        }
    }

    fn decode_tagged(&self, tag: &Tag, node: &Node, resolver: &dyn Resolver) -> Result<Value> {
        let decoder = self
            .decoders
            .get(tag)
            .ok_or_else(|| Error::UnknownTag(tag.clone()))?;
        trace!(tag = %tag, "decoding tagged node");
        match decoder {
            Decoder::Raw(decode) => decode(node, resolver),
            Decoder::Children(decode) => {
                let body = self.decode_body(node, resolver)?;
                decode(body, resolver)
            }
        }
    }

    /// Decodes a node's children, ignoring its own tag.
    fn decode_body(&self, node: &Node, resolver: &dyn Resolver) -> Result<Value> {
        match node {
            Node::Scalar(_, inner) => self.decode(inner, resolver),
            Node::Seq(_, items) => {
                let values = items
                    .iter()
                    .map(|item| self.decode(item, resolver))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Value::List(values))
            }
            Node::Map(_, entries) => {
                let values = entries
                    .iter()
                    .map(|(key, item)| Ok((key.clone(), self.decode(item, resolver)?)))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Value::Map(values))
            }
            leaf => self.decode(leaf, resolver),
        }
    }
}

impl Default for Registry {
    /// Same as `Registry::with_builtins`.
    fn default() -> Self {
        Self::with_builtins()
    }
}
