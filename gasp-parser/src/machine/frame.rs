//! Stack frames for in-progress values

use gasp_core::{FieldMap, TypeDescriptor, TypeKind, Value};

/// One in-progress value on the interpreter stack.
///
/// `field_name` is set when the immediate parent is an object frame; it
/// names the slot the finished value attaches to. Frames are addressed only
/// through the stack top, never by name-matching against ancestors.
#[derive(Debug)]
pub(crate) struct Frame {
    pub desc: TypeDescriptor,
    pub tag: String,
    pub field_name: Option<String>,
    pub kind: FrameKind,
}

#[derive(Debug)]
pub(crate) enum FrameKind {
    /// Primitive (or `Any`/`Null`) content accumulator.
    Field { buf: String },
    List {
        items: Vec<Value>,
    },
    Set {
        items: Vec<Value>,
    },
    Tuple {
        items: Vec<Value>,
    },
    Dict {
        entries: Vec<(String, Value)>,
        current_key: Option<String>,
    },
    Object {
        fields: FieldMap,
    },
    /// Waiting for the first child tag (or a `type` attribute) to resolve
    /// the alternative.
    Union {
        value: Option<Value>,
    },
    /// Foreign subtree; content is ignored until the matching close.
    Skip {
        depth: usize,
    },
}

impl Frame {
    /// Build the frame a resolved descriptor calls for. `Optional` and
    /// `Ref` must be unwrapped by the caller first.
    pub fn for_type(desc: TypeDescriptor, tag: String, field_name: Option<String>) -> Self {
        let kind = match desc.kind {
            TypeKind::List => FrameKind::List { items: Vec::new() },
            TypeKind::Set => FrameKind::Set { items: Vec::new() },
            TypeKind::Tuple => FrameKind::Tuple { items: Vec::new() },
            TypeKind::Dict => FrameKind::Dict {
                entries: Vec::new(),
                current_key: None,
            },
            TypeKind::Class => FrameKind::Object {
                fields: FieldMap::new(),
            },
            TypeKind::Union => FrameKind::Union { value: None },
            _ => FrameKind::Field { buf: String::new() },
        };
        Self {
            desc,
            tag,
            field_name,
            kind,
        }
    }

    pub fn skip(tag: String) -> Self {
        Self {
            desc: TypeDescriptor::any(),
            tag,
            field_name: None,
            kind: FrameKind::Skip { depth: 0 },
        }
    }

    pub fn is_skip(&self) -> bool {
        matches!(self.kind, FrameKind::Skip { .. })
    }
}
