//! Parser facade
//!
//! A `Parser` owns one scanner and one stack machine rooted at a type
//! descriptor. Each `feed` pushes bytes through the scanner, drains the
//! events into the machine, and returns a snapshot of the root partial.

use std::sync::Arc;

use gasp_core::{
    DescriptorRegistry, FieldMap, GaspResult, ParseError, ParseIssue, ParserConfig, SchemaError,
    TypeDescriptor, TypeKind, ValidateError, Value, MAX_TYPE_DEPTH,
};

use crate::machine::StackMachine;
use crate::scanner::TagScanner;

/// Materialization hook: turn a class name plus field map into a custom
/// value. Returning `None` falls back to the generic object map.
pub type MaterializeFn = Arc<dyn Fn(&str, &FieldMap) -> Option<Value> + Send + Sync>;

/// Streaming parser for one typed root value.
///
/// Single-writer: a parser is a sequential state machine owned by exactly
/// one caller; wrap it in external synchronization to cross threads.
pub struct Parser {
    root: TypeDescriptor,
    scanner: TagScanner,
    machine: StackMachine,
    issues: Vec<ParseIssue>,
    failure: Option<ParseError>,
}

impl Parser {
    pub fn new(root: TypeDescriptor) -> GaspResult<Self> {
        Self::with_registry(root, ParserConfig::default(), DescriptorRegistry::new())
    }

    pub fn with_config(root: TypeDescriptor, config: ParserConfig) -> GaspResult<Self> {
        Self::with_registry(root, config, DescriptorRegistry::new())
    }

    /// Construct with a registry resolving `Ref` descriptors; required for
    /// recursive types.
    pub fn with_registry(
        root: TypeDescriptor,
        config: ParserConfig,
        registry: DescriptorRegistry,
    ) -> GaspResult<Self> {
        if root.depth() > MAX_TYPE_DEPTH {
            return Err(SchemaError::CyclicType {
                type_name: root.name,
                limit: MAX_TYPE_DEPTH,
            }
            .into());
        }
        let registry = Arc::new(registry);
        let root = resolve_root(&root, &registry)?;
        let scanner = TagScanner::new(wanted_names(&root), config.ignored_tags.clone());
        let machine = StackMachine::new(root.clone(), Arc::clone(&registry), config.max_text_bytes);
        Ok(Self {
            root,
            scanner,
            machine,
            issues: Vec::new(),
            failure: None,
        })
    }

    /// Install the record materialization hook.
    pub fn with_materializer(mut self, hook: MaterializeFn) -> Self {
        self.machine.set_materializer(hook);
        self
    }

    /// Push bytes; return the current root partial, or `None` while the
    /// root tag has not been opened yet.
    pub fn feed(&mut self, chunk: impl AsRef<[u8]>) -> GaspResult<Option<Value>> {
        if let Some(err) = &self.failure {
            return Err(err.clone().into());
        }
        let events = self.scanner.consume(chunk.as_ref());
        for event in events {
            if let Err(err) = self.machine.handle_event(event) {
                self.failure = Some(err.clone());
                self.collect_issues();
                return Err(err.into());
            }
        }
        self.collect_issues();
        Ok(self.machine.partial())
    }

    /// True once the root's close has been consumed.
    pub fn is_complete(&self) -> bool {
        self.machine.is_complete()
    }

    /// Current root partial without re-running the scanner.
    pub fn get_partial(&self) -> Option<Value> {
        self.machine.partial()
    }

    /// The final value, with a whole-object check that every required
    /// record field was assigned.
    pub fn validate(&self) -> GaspResult<Value> {
        if let Some(err) = &self.failure {
            return Err(err.clone().into());
        }
        if !self.machine.is_complete() {
            return Err(ValidateError::Incomplete.into());
        }
        let value = self
            .machine
            .partial()
            .ok_or(ValidateError::Incomplete)?;
        let mut missing = Vec::new();
        check_required(&self.root, &value, &mut missing);
        if missing.is_empty() {
            Ok(value)
        } else {
            Err(ValidateError::MissingFields { fields: missing }.into())
        }
    }

    /// Recoverable issues recorded so far, in stream order.
    pub fn issues(&self) -> &[ParseIssue] {
        &self.issues
    }

    fn collect_issues(&mut self) {
        self.issues.extend(self.scanner.take_issues());
        self.issues.extend(self.machine.take_issues());
    }
}

/// Tag names that open the wanted region. A root union is opened by its
/// alternatives only; the alias name never appears as a wire tag. Container
/// and primitive roots have no fixed name; the first non-ignored tag starts
/// the region.
fn wanted_names(root: &TypeDescriptor) -> Option<Vec<String>> {
    match root.kind {
        TypeKind::Class => Some(vec![root.name.clone()]),
        TypeKind::Union => Some(
            root.alternatives()
                .iter()
                .map(|alt| alt.name.clone())
                .collect(),
        ),
        _ => None,
    }
}

/// Resolve the root descriptor to something a frame can be built from.
fn resolve_root(
    root: &TypeDescriptor,
    registry: &DescriptorRegistry,
) -> Result<TypeDescriptor, SchemaError> {
    let mut current = root.clone();
    for _ in 0..MAX_TYPE_DEPTH {
        match current.kind {
            TypeKind::Optional => {
                current = current
                    .args
                    .into_iter()
                    .next()
                    .unwrap_or_else(TypeDescriptor::any);
            }
            TypeKind::Ref => {
                current = (*registry.resolve(&current.name)?).clone();
            }
            TypeKind::Ellipsis => {
                return Err(SchemaError::UnsupportedType {
                    reason: "ellipsis sentinel is not a standalone type".to_string(),
                });
            }
            _ => return Ok(current),
        }
    }
    Err(SchemaError::CyclicType {
        type_name: root.name.clone(),
        limit: MAX_TYPE_DEPTH,
    })
}

/// Walk the final value against the descriptor, collecting required record
/// fields that were never assigned.
fn check_required(desc: &TypeDescriptor, value: &Value, missing: &mut Vec<String>) {
    match (desc.kind, value) {
        (TypeKind::Class, Value::Object(obj)) => {
            for field in &desc.fields {
                match obj.fields.get(&field.name) {
                    Some(child) => check_required(&field.ty, child, missing),
                    None if field.ty.kind == TypeKind::Optional => {}
                    None => missing.push(format!("{}.{}", desc.name, field.name)),
                }
            }
        }
        (TypeKind::Optional, _) => {
            if !value.is_null() {
                if let Some(inner) = desc.args.first() {
                    check_required(inner, value, missing);
                }
            }
        }
        (TypeKind::Union, Value::Object(obj)) => {
            if let Some(alt) = desc.find_alternative(&obj.class_name) {
                check_required(alt, value, missing);
            }
        }
        (TypeKind::List, _) | (TypeKind::Set, _) => {
            if let (Some(elem), Some(items)) = (desc.element_type(), value.as_items()) {
                for item in items {
                    check_required(elem, item, missing);
                }
            }
        }
        (TypeKind::Tuple, _) => {
            if let Some(items) = value.as_items() {
                for (i, item) in items.iter().enumerate() {
                    if let Some(arg) = desc.tuple_arg(i) {
                        check_required(arg, item, missing);
                    }
                }
            }
        }
        (TypeKind::Dict, _) => {
            if let (Some(vt), Some(entries)) = (desc.value_type(), value.as_dict()) {
                for (_, v) in entries {
                    check_required(vt, v, missing);
                }
            }
        }
        _ => {}
    }
}
