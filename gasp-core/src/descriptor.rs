//! Type descriptors consumed by the streaming parser
//!
//! A descriptor is a language-neutral description of the expected shape of
//! the value being extracted. Descriptors are immutable after construction
//! and freely shareable across parsers.

use crate::SchemaError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Nesting cap applied during descriptor construction and lazy reference
/// resolution. Cycles must be expressed with [`TypeKind::Ref`] nodes.
pub const MAX_TYPE_DEPTH: usize = 64;

// ============================================================================
// DESCRIPTOR TYPES
// ============================================================================

/// Structural kind of a descriptor.
///
/// `Null` is the explicit null alternative used by optional-shaped unions,
/// `Ref` is a lazy indirection into a [`DescriptorRegistry`], and `Ellipsis`
/// is the in-band sentinel marking a homogeneous variadic tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeKind {
    String,
    Int,
    Float,
    Bool,
    Any,
    Null,
    List,
    Set,
    Tuple,
    Dict,
    Class,
    Union,
    Optional,
    Ref,
    Ellipsis,
}

impl TypeKind {
    pub fn is_primitive(self) -> bool {
        matches!(
            self,
            TypeKind::String | TypeKind::Int | TypeKind::Float | TypeKind::Bool
        )
    }
}

/// A named field of a class descriptor. Declaration order is preserved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub ty: TypeDescriptor,
}

/// The structural type representation consumed by the parser.
///
/// `args` carries child descriptors: the element type for `List`/`Set`, key
/// and value for `Dict`, positional types for `Tuple`, alternatives for
/// `Union`, and the inner type for `Optional`. `fields` is populated for
/// `Class` only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    pub kind: TypeKind,
    pub name: String,
    pub args: Vec<TypeDescriptor>,
    pub fields: Vec<FieldDescriptor>,
}

impl TypeDescriptor {
    fn leaf(kind: TypeKind, name: &str) -> Self {
        Self {
            kind,
            name: name.to_string(),
            args: Vec::new(),
            fields: Vec::new(),
        }
    }

    pub fn string() -> Self {
        Self::leaf(TypeKind::String, "str")
    }

    pub fn int() -> Self {
        Self::leaf(TypeKind::Int, "int")
    }

    pub fn float() -> Self {
        Self::leaf(TypeKind::Float, "float")
    }

    pub fn bool() -> Self {
        Self::leaf(TypeKind::Bool, "bool")
    }

    pub fn any() -> Self {
        Self::leaf(TypeKind::Any, "any")
    }

    /// The null alternative of an optional-shaped union.
    pub fn none() -> Self {
        Self::leaf(TypeKind::Null, "None")
    }

    /// Variadic-tuple sentinel; only meaningful as a tuple's trailing arg.
    pub fn ellipsis() -> Self {
        Self::leaf(TypeKind::Ellipsis, "...")
    }

    pub fn list(element: TypeDescriptor) -> Self {
        Self {
            kind: TypeKind::List,
            name: "list".to_string(),
            args: vec![element],
            fields: Vec::new(),
        }
    }

    pub fn set(element: TypeDescriptor) -> Self {
        Self {
            kind: TypeKind::Set,
            name: "set".to_string(),
            args: vec![element],
            fields: Vec::new(),
        }
    }

    pub fn tuple(args: Vec<TypeDescriptor>) -> Result<Self, SchemaError> {
        if args.is_empty() {
            return Err(SchemaError::EmptyTuple);
        }
        Ok(Self {
            kind: TypeKind::Tuple,
            name: "tuple".to_string(),
            args,
            fields: Vec::new(),
        })
    }

    /// `Tuple[T, ...]`: every item is typed `T` and the positional index is
    /// unbounded.
    pub fn variadic_tuple(element: TypeDescriptor) -> Self {
        Self {
            kind: TypeKind::Tuple,
            name: "tuple".to_string(),
            args: vec![element, Self::ellipsis()],
            fields: Vec::new(),
        }
    }

    pub fn dict(key: TypeDescriptor, value: TypeDescriptor) -> Self {
        Self {
            kind: TypeKind::Dict,
            name: "dict".to_string(),
            args: vec![key, value],
            fields: Vec::new(),
        }
    }

    pub fn optional(inner: TypeDescriptor) -> Self {
        Self {
            kind: TypeKind::Optional,
            name: "optional".to_string(),
            args: vec![inner],
            fields: Vec::new(),
        }
    }

    /// Lazy indirection into a [`DescriptorRegistry`], for recursive types.
    pub fn reference(name: impl Into<String>) -> Result<Self, SchemaError> {
        let name = name.into();
        if !is_identifier(&name) {
            return Err(SchemaError::InvalidName { name });
        }
        Ok(Self {
            kind: TypeKind::Ref,
            name,
            args: Vec::new(),
            fields: Vec::new(),
        })
    }

    pub fn class(
        name: impl Into<String>,
        fields: Vec<(&str, TypeDescriptor)>,
    ) -> Result<Self, SchemaError> {
        let name = name.into();
        if !is_identifier(&name) {
            return Err(SchemaError::InvalidName { name });
        }
        for (field_name, _) in &fields {
            if !is_identifier(field_name) {
                return Err(SchemaError::InvalidName {
                    name: field_name.to_string(),
                });
            }
        }
        Ok(Self {
            kind: TypeKind::Class,
            name,
            args: Vec::new(),
            fields: fields
                .into_iter()
                .map(|(field_name, ty)| FieldDescriptor {
                    name: field_name.to_string(),
                    ty,
                })
                .collect(),
        })
    }

    /// An anonymous union. The optional-shaped form `[T, Null]` normalizes
    /// to `Optional[T]`.
    pub fn union(alternatives: Vec<TypeDescriptor>) -> Result<Self, SchemaError> {
        Self::union_named(String::new(), alternatives)
    }

    /// A named type alias whose underlying value is a union. The alias name
    /// stays on the descriptor; dispatch routes through the alternatives and
    /// the alias never appears as a wire tag on its own.
    pub fn union_alias(
        name: impl Into<String>,
        alternatives: Vec<TypeDescriptor>,
    ) -> Result<Self, SchemaError> {
        let name = name.into();
        if !is_identifier(&name) {
            return Err(SchemaError::InvalidName { name });
        }
        Self::union_named(name, alternatives)
    }

    fn union_named(name: String, alternatives: Vec<TypeDescriptor>) -> Result<Self, SchemaError> {
        if alternatives.len() < 2 {
            return Err(SchemaError::NotEnoughAlternatives {
                count: alternatives.len(),
            });
        }
        for alt in &alternatives {
            let ok = alt.kind.is_primitive()
                || matches!(alt.kind, TypeKind::Class | TypeKind::Ref | TypeKind::Null);
            if !ok {
                return Err(SchemaError::BadAlternative { kind: alt.kind });
            }
        }
        if alternatives.len() == 2 {
            let nulls = alternatives
                .iter()
                .filter(|a| a.kind == TypeKind::Null)
                .count();
            if nulls == 1 {
                let inner = alternatives
                    .into_iter()
                    .find(|a| a.kind != TypeKind::Null)
                    .unwrap_or_else(TypeDescriptor::any);
                return Ok(Self::optional(inner));
            }
        }
        Ok(Self {
            kind: TypeKind::Union,
            name,
            args: alternatives,
            fields: Vec::new(),
        })
    }

    // ------------------------------------------------------------------
    // Structural predicates
    // ------------------------------------------------------------------

    pub fn is_primitive(&self) -> bool {
        self.kind.is_primitive()
    }

    /// Element type of a `List`/`Set`, or the key/value-free fallback.
    pub fn element_type(&self) -> Option<&TypeDescriptor> {
        match self.kind {
            TypeKind::List | TypeKind::Set => self.args.first(),
            _ => None,
        }
    }

    /// Key type of a `Dict`.
    pub fn key_type(&self) -> Option<&TypeDescriptor> {
        match self.kind {
            TypeKind::Dict => self.args.first(),
            _ => None,
        }
    }

    /// Value type of a `Dict`.
    pub fn value_type(&self) -> Option<&TypeDescriptor> {
        match self.kind {
            TypeKind::Dict => self.args.get(1),
            _ => None,
        }
    }

    /// Positional type of a tuple item, honoring the variadic sentinel.
    pub fn tuple_arg(&self, index: usize) -> Option<&TypeDescriptor> {
        if self.kind != TypeKind::Tuple {
            return None;
        }
        if self.is_variadic_tuple() {
            return self.args.first();
        }
        let arg = self.args.get(index)?;
        if arg.kind == TypeKind::Ellipsis {
            None
        } else {
            Some(arg)
        }
    }

    pub fn is_variadic_tuple(&self) -> bool {
        self.kind == TypeKind::Tuple
            && self.args.len() == 2
            && self.args[1].kind == TypeKind::Ellipsis
    }

    pub fn lookup_field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Union alternatives, empty for any other kind.
    pub fn alternatives(&self) -> &[TypeDescriptor] {
        match self.kind {
            TypeKind::Union => &self.args,
            _ => &[],
        }
    }

    /// Find the union alternative a wire tag selects, by class (or reference,
    /// or primitive display) name.
    pub fn find_alternative(&self, tag: &str) -> Option<&TypeDescriptor> {
        self.alternatives().iter().find(|alt| alt.name == tag)
    }

    /// The display/tag name of this descriptor.
    pub fn tag_name(&self) -> &str {
        &self.name
    }

    /// Structural nesting depth. `Ref` nodes count as leaves; the laziness
    /// is what breaks cycles.
    pub fn depth(&self) -> usize {
        let child_depth = self
            .args
            .iter()
            .map(TypeDescriptor::depth)
            .chain(self.fields.iter().map(|f| f.ty.depth()))
            .max()
            .unwrap_or(0);
        1 + child_depth
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// ============================================================================
// DESCRIPTOR REGISTRY
// ============================================================================

/// Shared descriptors keyed by class name, used to resolve [`TypeKind::Ref`]
/// nodes lazily. Required for mutually-recursive records.
#[derive(Debug, Clone, Default)]
pub struct DescriptorRegistry {
    types: HashMap<String, Arc<TypeDescriptor>>,
}

impl DescriptorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor under its own name.
    pub fn register(&mut self, descriptor: TypeDescriptor) -> Result<(), SchemaError> {
        if descriptor.name.is_empty() || !is_identifier(&descriptor.name) {
            return Err(SchemaError::InvalidName {
                name: descriptor.name,
            });
        }
        if descriptor.depth() > MAX_TYPE_DEPTH {
            return Err(SchemaError::CyclicType {
                type_name: descriptor.name,
                limit: MAX_TYPE_DEPTH,
            });
        }
        self.types
            .insert(descriptor.name.clone(), Arc::new(descriptor));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<TypeDescriptor>> {
        self.types.get(name).cloned()
    }

    /// Chase a reference chain to a concrete descriptor.
    pub fn resolve(&self, name: &str) -> Result<Arc<TypeDescriptor>, SchemaError> {
        let mut current = self.get(name).ok_or_else(|| SchemaError::UnknownRef {
            name: name.to_string(),
        })?;
        for _ in 0..MAX_TYPE_DEPTH {
            if current.kind != TypeKind::Ref {
                return Ok(current);
            }
            let next = current.name.clone();
            current = self.get(&next).ok_or(SchemaError::UnknownRef { name: next })?;
        }
        Err(SchemaError::CyclicType {
            type_name: name.to_string(),
            limit: MAX_TYPE_DEPTH,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_requires_valid_identifier() {
        assert!(TypeDescriptor::class("Person", vec![]).is_ok());
        assert!(matches!(
            TypeDescriptor::class("1Person", vec![]),
            Err(SchemaError::InvalidName { .. })
        ));
        assert!(matches!(
            TypeDescriptor::class("Per son", vec![]),
            Err(SchemaError::InvalidName { .. })
        ));
    }

    #[test]
    fn union_needs_two_alternatives() {
        let person = TypeDescriptor::class("Person", vec![]).unwrap();
        assert!(matches!(
            TypeDescriptor::union(vec![person]),
            Err(SchemaError::NotEnoughAlternatives { count: 1 })
        ));
    }

    #[test]
    fn union_rejects_container_alternative() {
        let list = TypeDescriptor::list(TypeDescriptor::int());
        let person = TypeDescriptor::class("Person", vec![]).unwrap();
        assert!(matches!(
            TypeDescriptor::union(vec![list, person]),
            Err(SchemaError::BadAlternative {
                kind: TypeKind::List
            })
        ));
    }

    #[test]
    fn optional_shaped_union_normalizes() {
        let desc =
            TypeDescriptor::union(vec![TypeDescriptor::int(), TypeDescriptor::none()]).unwrap();
        assert_eq!(desc.kind, TypeKind::Optional);
        assert_eq!(desc.args[0].kind, TypeKind::Int);
    }

    #[test]
    fn union_alias_keeps_name() {
        let success = TypeDescriptor::class("Success", vec![]).unwrap();
        let error = TypeDescriptor::class("Error", vec![]).unwrap();
        let desc = TypeDescriptor::union_alias("ResponseType", vec![success, error]).unwrap();
        assert_eq!(desc.kind, TypeKind::Union);
        assert_eq!(desc.name, "ResponseType");
        assert!(desc.find_alternative("Success").is_some());
        assert!(desc.find_alternative("ResponseType").is_none());
    }

    #[test]
    fn variadic_tuple_indexing_is_unbounded() {
        let desc = TypeDescriptor::variadic_tuple(TypeDescriptor::int());
        assert!(desc.is_variadic_tuple());
        assert_eq!(desc.tuple_arg(0).unwrap().kind, TypeKind::Int);
        assert_eq!(desc.tuple_arg(500).unwrap().kind, TypeKind::Int);

        let fixed =
            TypeDescriptor::tuple(vec![TypeDescriptor::int(), TypeDescriptor::string()]).unwrap();
        assert_eq!(fixed.tuple_arg(1).unwrap().kind, TypeKind::String);
        assert!(fixed.tuple_arg(2).is_none());
    }

    #[test]
    fn registry_resolves_references() {
        let mut registry = DescriptorRegistry::new();
        let node = TypeDescriptor::class(
            "Node",
            vec![
                ("label", TypeDescriptor::string()),
                (
                    "children",
                    TypeDescriptor::list(TypeDescriptor::reference("Node").unwrap()),
                ),
            ],
        )
        .unwrap();
        registry.register(node).unwrap();
        let resolved = registry.resolve("Node").unwrap();
        assert_eq!(resolved.kind, TypeKind::Class);
        assert_eq!(resolved.fields.len(), 2);
    }

    #[test]
    fn registry_rejects_overdeep_descriptors() {
        let mut desc = TypeDescriptor::class("Deep", vec![("x", TypeDescriptor::int())]).unwrap();
        for _ in 0..MAX_TYPE_DEPTH {
            desc = TypeDescriptor::class("Deep", vec![("inner", desc)]).unwrap();
        }
        let mut registry = DescriptorRegistry::new();
        assert!(matches!(
            registry.register(desc),
            Err(SchemaError::CyclicType { .. })
        ));
    }
}
