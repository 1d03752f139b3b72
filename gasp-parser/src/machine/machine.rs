//! Stack machine implementation
//!
//! Interprets scanner events against the root type descriptor, keeping a
//! frame stack whose top is always the value currently being filled. The
//! machine recovers locally wherever the stream can still yield structure;
//! only the text budget is fatal.

use std::sync::Arc;

use gasp_core::{
    DescriptorRegistry, FieldMap, ObjectValue, ParseError, ParseIssue, TypeDescriptor, TypeKind,
    Value, MAX_TYPE_DEPTH,
};
use tracing::{debug, trace};

use super::frame::{Frame, FrameKind};
use crate::parser::MaterializeFn;
use crate::scanner::{decode_entities, find_attr, Attribute, TagEvent};

pub(crate) struct StackMachine {
    registry: Arc<DescriptorRegistry>,
    frames: Vec<Frame>,
    root_opened: bool,
    complete: bool,
    final_value: Option<Value>,
    issues: Vec<ParseIssue>,
    text_bytes: usize,
    max_text_bytes: usize,
    materializer: Option<MaterializeFn>,
}

impl StackMachine {
    /// `root` must already be resolved: `Optional` unwrapped and `Ref`
    /// chased through the registry.
    pub fn new(
        root: TypeDescriptor,
        registry: Arc<DescriptorRegistry>,
        max_text_bytes: usize,
    ) -> Self {
        Self {
            registry,
            frames: vec![Frame::for_type(root, String::new(), None)],
            root_opened: false,
            complete: false,
            final_value: None,
            issues: Vec::new(),
            text_bytes: 0,
            max_text_bytes,
            materializer: None,
        }
    }

    pub fn set_materializer(&mut self, hook: MaterializeFn) {
        self.materializer = Some(hook);
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn take_issues(&mut self) -> Vec<ParseIssue> {
        std::mem::take(&mut self.issues)
    }

    pub fn handle_event(&mut self, event: TagEvent) -> Result<(), ParseError> {
        if self.complete {
            trace!("ignoring event after root completion");
            return Ok(());
        }
        match event {
            TagEvent::Open { name, attrs } => {
                self.on_open(name, attrs);
                Ok(())
            }
            TagEvent::Text(text) => self.on_text(text),
            TagEvent::Close { name } => {
                self.on_close(name);
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------
    // Open
    // ------------------------------------------------------------------

    fn on_open(&mut self, name: String, attrs: Vec<Attribute>) {
        if !self.root_opened {
            self.open_root(name, attrs);
            return;
        }
        let registry = &self.registry;
        let issues = &mut self.issues;
        let Some(top) = self.frames.last_mut() else {
            return;
        };

        let push = match &mut top.kind {
            FrameKind::Skip { depth } => {
                *depth += 1;
                None
            }
            FrameKind::Field { .. } => {
                trace!(tag = %name, "markup inside primitive content, skipping");
                Some(Frame::skip(name))
            }
            FrameKind::List { items } | FrameKind::Set { items } | FrameKind::Tuple { items } => {
                let declared = match top.desc.kind {
                    TypeKind::Tuple => top.desc.tuple_arg(items.len()).cloned(),
                    _ => top.desc.element_type().cloned(),
                };
                match declared {
                    None => {
                        issues.push(ParseIssue::ForeignTag {
                            tag: name.clone(),
                            context: top.desc.name.clone(),
                        });
                        Some(Frame::skip(name))
                    }
                    Some(elem) => {
                        let elem = resolve_desc(registry, issues, &elem);
                        Some(item_frame(registry, issues, elem, name, &attrs))
                    }
                }
            }
            FrameKind::Dict { current_key, .. } => {
                if name == "item" {
                    // A committed entry needs a non-empty key; an empty
                    // key attribute counts as missing.
                    match find_attr(&attrs, "key").filter(|k| !k.is_empty()) {
                        None => {
                            issues.push(ParseIssue::MissingKey { tag: name.clone() });
                            Some(Frame::skip(name))
                        }
                        Some(key) => {
                            *current_key = Some(key.to_string());
                            let value_ty = top
                                .desc
                                .value_type()
                                .cloned()
                                .unwrap_or_else(TypeDescriptor::any);
                            let value_ty = resolve_desc(registry, issues, &value_ty);
                            Some(dispatch_frame(registry, issues, value_ty, name, &attrs, None))
                        }
                    }
                } else {
                    issues.push(ParseIssue::ForeignTag {
                        tag: name.clone(),
                        context: "dict".to_string(),
                    });
                    Some(Frame::skip(name))
                }
            }
            FrameKind::Object { .. } => {
                Some(object_child_frame(registry, issues, &top.desc, name, &attrs))
            }
            FrameKind::Union { .. } => {
                let selected = find_attr(&attrs, "type")
                    .and_then(|ty| top.desc.find_alternative(ty))
                    .or_else(|| top.desc.find_alternative(&name))
                    .cloned();
                match selected {
                    Some(alt) => {
                        let alt = resolve_desc(registry, issues, &alt);
                        Some(Frame::for_type(alt, name, None))
                    }
                    None => {
                        issues.push(ParseIssue::UnresolvedUnion {
                            name: top.desc.name.clone(),
                            tag: name.clone(),
                        });
                        Some(Frame::skip(name))
                    }
                }
            }
        };

        if let Some(frame) = push {
            self.frames.push(frame);
        }
    }

    /// The first open event enters the pre-built root frame instead of
    /// pushing a new one. A root union resolves in place; the scanner only
    /// opens its region on an alternative tag, so the tag always selects.
    fn open_root(&mut self, name: String, attrs: Vec<Attribute>) {
        self.root_opened = true;
        let Some(root) = self.frames.first_mut() else {
            return;
        };
        root.tag = name.clone();
        if matches!(root.kind, FrameKind::Union { .. }) {
            let selected = find_attr(&attrs, "type")
                .and_then(|ty| root.desc.find_alternative(ty))
                .or_else(|| root.desc.find_alternative(&name))
                .cloned();
            if let Some(alt) = selected {
                let alt = resolve_desc(&self.registry, &mut self.issues, &alt);
                self.frames[0] = Frame::for_type(alt, name, None);
            }
        }
    }

    // ------------------------------------------------------------------
    // Text
    // ------------------------------------------------------------------

    fn on_text(&mut self, text: String) -> Result<(), ParseError> {
        let Some(top) = self.frames.last_mut() else {
            return Ok(());
        };
        match &mut top.kind {
            FrameKind::Field { buf } => {
                if top.desc.kind == TypeKind::Null {
                    return Ok(());
                }
                self.text_bytes += text.len();
                if self.text_bytes > self.max_text_bytes {
                    return Err(ParseError::TextBudgetExceeded {
                        limit: self.max_text_bytes,
                    });
                }
                buf.push_str(&text);
                Ok(())
            }
            FrameKind::Skip { .. } | FrameKind::Union { .. } => Ok(()),
            _ => {
                if !text.trim().is_empty() {
                    trace!("discarding stray text at structural scope");
                }
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------
    // Close
    // ------------------------------------------------------------------

    fn on_close(&mut self, name: String) {
        if let Some(top) = self.frames.last_mut() {
            if let FrameKind::Skip { depth } = &mut top.kind {
                if *depth > 0 {
                    *depth -= 1;
                } else {
                    self.frames.pop();
                }
                return;
            }
        }
        if !self.frames.iter().any(|f| f.tag == name) {
            debug!(tag = %name, "dropping close with no open frame");
            return;
        }
        // Pop (finalizing on the way) until the named frame itself pops.
        loop {
            let matched = self
                .frames
                .last()
                .map(|f| f.tag == name)
                .unwrap_or(true);
            self.pop_and_attach();
            if matched || self.frames.is_empty() {
                break;
            }
        }
    }

    fn pop_and_attach(&mut self) {
        let Some(frame) = self.frames.pop() else {
            return;
        };
        if frame.is_skip() {
            return;
        }
        let field_name = frame.field_name.clone();
        let tag = frame.tag.clone();
        let value = self.finalize_value(frame);
        match self.frames.last_mut() {
            None => {
                self.final_value = Some(value);
                self.complete = true;
            }
            Some(parent) => attach(parent, value, field_name, tag, &mut self.issues),
        }
    }

    // ------------------------------------------------------------------
    // Finalization
    // ------------------------------------------------------------------

    fn finalize_value(&mut self, frame: Frame) -> Value {
        match frame.kind {
            FrameKind::Field { buf } => self.finalize_primitive(&frame.desc, &buf),
            FrameKind::List { items } => Value::List(items),
            FrameKind::Set { items } => Value::Set(items),
            FrameKind::Tuple { items } => Value::Tuple(items),
            FrameKind::Dict { entries, .. } => Value::Dict(entries),
            FrameKind::Object { mut fields } => {
                fill_unset_optionals(&frame.desc, &mut fields);
                self.materialize(&frame.desc.name, fields)
            }
            FrameKind::Union { value } => match value {
                Some(v) => v,
                None => {
                    self.issues.push(ParseIssue::UnresolvedUnion {
                        name: frame.desc.name.clone(),
                        tag: frame.tag.clone(),
                    });
                    Value::Null
                }
            },
            FrameKind::Skip { .. } => Value::Null,
        }
    }

    fn finalize_primitive(&mut self, desc: &TypeDescriptor, buf: &str) -> Value {
        match desc.kind {
            TypeKind::String => Value::Str(decode_entities(buf.trim()).into_owned()),
            TypeKind::Int => match parse_int(buf.trim()) {
                Some(n) => Value::Int(n),
                None => self.literal_fallback(TypeKind::Int, buf),
            },
            TypeKind::Float => match buf.trim().parse::<f64>() {
                Ok(x) => Value::Float(x),
                Err(_) => self.literal_fallback(TypeKind::Float, buf),
            },
            TypeKind::Bool => match parse_bool(buf.trim()) {
                Some(b) => Value::Bool(b),
                None => self.literal_fallback(TypeKind::Bool, buf),
            },
            TypeKind::Any => any_value(buf),
            _ => Value::Null,
        }
    }

    fn literal_fallback(&mut self, kind: TypeKind, buf: &str) -> Value {
        self.issues.push(ParseIssue::InvalidLiteral {
            kind,
            text: buf.trim().to_string(),
        });
        Value::zero(kind)
    }

    fn materialize(&mut self, class_name: &str, fields: FieldMap) -> Value {
        if let Some(hook) = &self.materializer {
            if let Some(value) = hook(class_name, &fields) {
                return value;
            }
        }
        Value::Object(ObjectValue {
            class_name: class_name.to_string(),
            fields,
        })
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    /// Best-effort materialization of the root value at this instant.
    pub fn partial(&self) -> Option<Value> {
        if self.complete {
            return self.final_value.clone();
        }
        if !self.root_opened {
            return None;
        }
        let mut child: Option<(Value, Option<String>)> = None;
        for frame in self.frames.iter().rev() {
            if frame.is_skip() {
                child = None;
                continue;
            }
            let value = self.partial_of(frame, child.take());
            child = Some((value, frame.field_name.clone()));
        }
        child.map(|(v, _)| v)
    }

    fn partial_of(&self, frame: &Frame, child: Option<(Value, Option<String>)>) -> Value {
        match &frame.kind {
            FrameKind::Field { buf } => partial_primitive(&frame.desc, buf),
            FrameKind::List { items } => Value::List(with_child(items, child)),
            FrameKind::Tuple { items } => Value::Tuple(with_child(items, child)),
            FrameKind::Set { items } => {
                let mut items = items.clone();
                if let Some((v, _)) = child {
                    if !items.contains(&v) {
                        items.push(v);
                    }
                }
                Value::Set(items)
            }
            FrameKind::Dict {
                entries,
                current_key,
            } => {
                let mut entries = entries.clone();
                if let (Some(key), Some((v, _))) = (current_key, child) {
                    entries.push((key.clone(), v));
                }
                Value::Dict(entries)
            }
            FrameKind::Object { fields } => {
                let mut fields = fields.clone();
                if let Some((v, Some(name))) = child {
                    fields.insert(name, v);
                }
                if let Some(hook) = &self.materializer {
                    if let Some(value) = hook(&frame.desc.name, &fields) {
                        return value;
                    }
                }
                Value::Object(ObjectValue {
                    class_name: frame.desc.name.clone(),
                    fields,
                })
            }
            FrameKind::Union { value } => match child {
                Some((v, _)) => v,
                None => value.clone().unwrap_or(Value::Null),
            },
            FrameKind::Skip { .. } => Value::Null,
        }
    }
}

// ============================================================================
// DISPATCH HELPERS
// ============================================================================

/// Unwrap `Optional` and chase `Ref` nodes to the descriptor a frame is
/// built from.
fn resolve_desc(
    registry: &DescriptorRegistry,
    issues: &mut Vec<ParseIssue>,
    desc: &TypeDescriptor,
) -> TypeDescriptor {
    let mut current = desc.clone();
    for _ in 0..MAX_TYPE_DEPTH {
        match current.kind {
            TypeKind::Optional => {
                current = current
                    .args
                    .into_iter()
                    .next()
                    .unwrap_or_else(TypeDescriptor::any);
            }
            TypeKind::Ref => match registry.get(&current.name) {
                Some(resolved) => current = (*resolved).clone(),
                None => {
                    issues.push(ParseIssue::UnknownRefType { name: current.name });
                    return TypeDescriptor::any();
                }
            },
            _ => return current,
        }
    }
    issues.push(ParseIssue::UnknownRefType { name: current.name });
    TypeDescriptor::any()
}

/// Frame for a sequence item. Accepts the conventional `item` tag or the
/// element class name (or one union alternative); anything else is foreign.
fn item_frame(
    registry: &DescriptorRegistry,
    issues: &mut Vec<ParseIssue>,
    elem: TypeDescriptor,
    name: String,
    attrs: &[Attribute],
) -> Frame {
    let accepted = name == "item"
        || (elem.kind == TypeKind::Class && elem.name == name)
        || (elem.kind == TypeKind::Union && elem.find_alternative(&name).is_some());
    if !accepted {
        issues.push(ParseIssue::ForeignTag {
            tag: name.clone(),
            context: "sequence".to_string(),
        });
        return Frame::skip(name);
    }
    dispatch_frame(registry, issues, elem, name, attrs, None)
}

/// Build the frame for a typed slot, dispatching union alternatives by
/// `type` attribute first, tag name second. An undispatchable union stays a
/// union frame and resolves at its first child tag.
fn dispatch_frame(
    registry: &DescriptorRegistry,
    issues: &mut Vec<ParseIssue>,
    desc: TypeDescriptor,
    tag: String,
    attrs: &[Attribute],
    field_name: Option<String>,
) -> Frame {
    if desc.kind != TypeKind::Union {
        return Frame::for_type(desc, tag, field_name);
    }
    if let Some(ty) = find_attr(attrs, "type") {
        match desc.find_alternative(ty) {
            Some(alt) => {
                let alt = resolve_desc(registry, issues, alt);
                return Frame::for_type(alt, tag, field_name);
            }
            None => issues.push(ParseIssue::UnresolvedUnion {
                name: desc.name.clone(),
                tag: ty.to_string(),
            }),
        }
    }
    if let Some(alt) = desc.find_alternative(&tag) {
        let alt = resolve_desc(registry, issues, alt);
        return Frame::for_type(alt, tag, field_name);
    }
    Frame::for_type(desc, tag, field_name)
}

/// Frame for a child tag of an object. Only the object's own descriptor is
/// consulted; descendant fields never capture a parent's tags.
fn object_child_frame(
    registry: &DescriptorRegistry,
    issues: &mut Vec<ParseIssue>,
    class_desc: &TypeDescriptor,
    name: String,
    attrs: &[Attribute],
) -> Frame {
    if let Some(field) = class_desc.lookup_field(&name) {
        let field_name = field.name.clone();
        let ty = resolve_desc(registry, issues, &field.ty);
        return dispatch_frame(registry, issues, ty, name, attrs, Some(field_name));
    }
    // A tag naming an alternative class of a union-typed field selects both
    // the field and the alternative.
    for field in &class_desc.fields {
        let ty = resolve_desc(registry, issues, &field.ty);
        if ty.kind == TypeKind::Union {
            if let Some(alt) = ty.find_alternative(&name) {
                let alt = resolve_desc(registry, issues, alt);
                return Frame::for_type(alt, name, Some(field.name.clone()));
            }
        }
    }
    issues.push(ParseIssue::UnknownField {
        class: class_desc.name.clone(),
        field: name.clone(),
    });
    debug!(class = %class_desc.name, field = %name, "skipping unknown field");
    Frame::skip(name)
}

fn attach(
    parent: &mut Frame,
    value: Value,
    field_name: Option<String>,
    tag: String,
    issues: &mut Vec<ParseIssue>,
) {
    match &mut parent.kind {
        FrameKind::List { items } | FrameKind::Tuple { items } => items.push(value),
        FrameKind::Set { items } => {
            if !items.contains(&value) {
                items.push(value);
            }
        }
        FrameKind::Dict {
            entries,
            current_key,
        } => match current_key.take() {
            Some(key) => {
                // Duplicate keys: last write wins.
                if let Some(slot) = entries.iter_mut().find(|(k, _)| *k == key) {
                    slot.1 = value;
                } else {
                    entries.push((key, value));
                }
            }
            None => issues.push(ParseIssue::MissingKey { tag }),
        },
        FrameKind::Object { fields } => {
            let name = field_name.unwrap_or(tag);
            fields.insert(name, value);
        }
        FrameKind::Union { value: slot } => *slot = Some(value),
        FrameKind::Field { .. } | FrameKind::Skip { .. } => {
            trace!("dropping value with no attachable parent");
        }
    }
}

fn fill_unset_optionals(desc: &TypeDescriptor, fields: &mut FieldMap) {
    for field in &desc.fields {
        if field.ty.kind == TypeKind::Optional && !fields.contains(&field.name) {
            fields.insert(field.name.clone(), Value::Null);
        }
    }
}

fn with_child(items: &[Value], child: Option<(Value, Option<String>)>) -> Vec<Value> {
    let mut items = items.to_vec();
    if let Some((v, _)) = child {
        items.push(v);
    }
    items
}

fn partial_primitive(desc: &TypeDescriptor, buf: &str) -> Value {
    match desc.kind {
        TypeKind::Int => parse_int(buf.trim())
            .map(Value::Int)
            .unwrap_or_else(|| Value::Str(buf.to_string())),
        TypeKind::Float => buf
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .unwrap_or_else(|_| Value::Str(buf.to_string())),
        TypeKind::Bool => parse_bool(buf.trim())
            .map(Value::Bool)
            .unwrap_or_else(|| Value::Str(buf.to_string())),
        TypeKind::String => Value::Str(decode_entities(buf.trim()).into_owned()),
        TypeKind::Null => Value::Null,
        _ => Value::Str(buf.to_string()),
    }
}

// ============================================================================
// PRIMITIVE PARSING
// ============================================================================

/// Base-10 first, then sign-aware base-0 (`0x`/`0o`/`0b` prefixes).
fn parse_int(text: &str) -> Option<i64> {
    if let Ok(n) = text.parse::<i64>() {
        return Some(n);
    }
    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let (radix, rest) = if let Some(r) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        (16, r)
    } else if let Some(r) = digits
        .strip_prefix("0o")
        .or_else(|| digits.strip_prefix("0O"))
    {
        (8, r)
    } else if let Some(r) = digits
        .strip_prefix("0b")
        .or_else(|| digits.strip_prefix("0B"))
    {
        (2, r)
    } else {
        return None;
    };
    let magnitude = i64::from_str_radix(rest, radix).ok()?;
    if negative {
        magnitude.checked_neg()
    } else {
        Some(magnitude)
    }
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// Legacy recovery: JSON-looking content inside an `Any` slot becomes the
/// corresponding value tree; everything else stays raw text.
fn any_value(buf: &str) -> Value {
    let trimmed = buf.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Ok(json) = serde_json::from_str::<serde_json::Value>(trimmed) {
            return Value::from(json);
        }
    }
    Value::Str(decode_entities(buf).into_owned())
}
