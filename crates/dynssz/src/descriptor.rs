//! Builds and caches [`TypeDescriptor`] trees: a [`crate::schema::SchemaNode`] plus a
//! [`crate::spec::SpecValues`] table resolved into concrete sizes and maxima.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::SszError;
use crate::schema::{ContainerKind, FieldAnnotations, SchemaNode, SszReflect};
use crate::spec::SpecValues;
use crate::tags::{self, SizeHint};

/// A fully resolved, immutable description of a type's on-wire shape under one spec-value
/// configuration.
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    /// What kind of SSZ value this is and its kind-specific detail.
    pub kind: DescriptorKind,
    /// The exact encoded byte length, if this type's size does not depend on the value
    /// (e.g. `u64`, a fixed-size container, a vector of fixed-size elements).
    pub static_size: Option<u64>,
    /// `true` if any size/maximum in this descriptor (or a descendant's) was resolved from a
    /// spec value rather than a literal. Such a descriptor cannot be handed to a
    /// statically-generated codec, since that codec was compiled against fixed defaults.
    pub has_dynamic_spec: bool,
}

/// The kind-specific payload of a [`TypeDescriptor`].
#[derive(Debug, Clone)]
pub enum DescriptorKind {
    /// `bool`.
    Bool,
    /// `u8`.
    U8,
    /// `u16`.
    U16,
    /// `u32`.
    U32,
    /// `u64`.
    U64,
    /// A 128-bit unsigned integer leaf.
    Uint128,
    /// A 256-bit unsigned integer leaf.
    Uint256,
    /// An ordinary container.
    Container(ContainerDescriptor),
    /// A progressive container, fields addressed by `ssz-index`.
    ProgressiveContainer(ContainerDescriptor),
    /// A stable container with a fixed Merkle capacity.
    StableContainer(ContainerDescriptor, u64),
    /// A fixed-length vector.
    Vector(SeqDescriptor),
    /// A variable-length, maximum-bearing list.
    List(SeqDescriptor),
    /// A fixed-length bit sequence.
    Bitvector(BitsDescriptor),
    /// A maximum-bearing bit sequence.
    Bitlist(BitsDescriptor),
    /// A progressive list.
    ProgressiveList(SeqDescriptor),
    /// A progressive bitlist.
    ProgressiveBitlist(BitsDescriptor),
    /// A single-field passthrough.
    Wrapper(Box<TypeDescriptor>),
    /// A compatible union: ordered `(selector, descriptor)` variants.
    Union(Vec<(u8, TypeDescriptor)>),
}

/// The resolved shape of a container.
#[derive(Debug, Clone)]
pub struct ContainerDescriptor {
    /// Fields in declaration order.
    pub fields: Vec<FieldDescriptor>,
    /// The byte size of the fixed prefix: the sum of fixed fields' sizes plus 4 bytes per
    /// dynamic field (the offset table).
    pub fixed_portion_size: u64,
}

/// One field of a [`ContainerDescriptor`].
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    /// The Rust field name.
    pub name: &'static str,
    /// The field's resolved descriptor.
    pub descriptor: Arc<TypeDescriptor>,
    /// `true` if this field's encoded size is not fixed (so it is framed with an offset).
    pub is_dynamic: bool,
    /// The `ssz-index`, present only for progressive-container fields.
    pub ssz_index: Option<u16>,
}

/// The resolved shape of a vector/list/progressive-list.
#[derive(Debug, Clone)]
pub struct SeqDescriptor {
    /// The element type's descriptor.
    pub element: Arc<TypeDescriptor>,
    /// The declared element count, for vectors.
    pub len: Option<u64>,
    /// The declared maximum element count, for lists.
    pub max: Option<u64>,
}

/// The resolved shape of a bitvector/bitlist/progressive-bitlist.
#[derive(Debug, Clone, Copy)]
pub struct BitsDescriptor {
    /// The declared bit count, for bitvectors.
    pub len: Option<u64>,
    /// The declared maximum bit count, for bitlists.
    pub max: Option<u64>,
}

fn parse_hints(
    static_tag: Option<&str>,
    dyn_tag: Option<&str>,
    spec: &SpecValues,
) -> Result<(Vec<u64>, bool), SszError> {
    let static_hints = static_tag.map(tags::parse_static_tag).transpose()?;
    let dyn_hints = dyn_tag.map(tags::parse_dyn_tag).transpose()?;
    let used_dynamic = dyn_hints
        .as_deref()
        .map(|hints| hints.iter().any(|h| matches!(h, SizeHint::Expr(_))))
        .unwrap_or(false);
    let resolved = tags::resolve_hints(static_hints.as_deref(), dyn_hints.as_deref(), spec)?;
    Ok((resolved, used_dynamic))
}

/// Context threaded through one field's descent through nested sequence dimensions.
struct BuildCtx<'a> {
    size_hints: Vec<u64>,
    max_hints: Vec<u64>,
    dim: usize,
    spec_influenced: bool,
    spec: &'a SpecValues,
}

impl BuildCtx<'_> {
    fn take_size(&mut self) -> Option<u64> {
        let v = self.size_hints.get(self.dim).copied();
        self.dim += 1;
        v.filter(|v| *v != u64::MAX)
    }

    fn take_max(&mut self) -> Option<u64> {
        // `max` is consulted at the same dimension as the `size` taken for this layer, so it
        // does not advance `dim` itself — `take_size` already did, immediately before.
        let idx = self.dim.saturating_sub(1);
        self.max_hints.get(idx).copied().filter(|v| *v != u64::MAX)
    }
}

/// Builds a [`TypeDescriptor`] for a type's top-level schema (no enclosing field
/// annotations).
pub fn build_root(schema: &SchemaNode, spec: &SpecValues) -> Result<TypeDescriptor, SszError> {
    build_node(schema, &FieldAnnotations::default(), spec)
}

/// Builds a [`TypeDescriptor`] for one field's schema plus its own annotations.
pub fn build_node(
    schema: &SchemaNode,
    annotations: &FieldAnnotations,
    spec: &SpecValues,
) -> Result<TypeDescriptor, SszError> {
    let (size_hints, size_dynamic) =
        parse_hints(annotations.ssz_size, annotations.dynssz_size, spec)?;
    let (max_hints, max_dynamic) = parse_hints(annotations.ssz_max, annotations.dynssz_max, spec)?;
    let mut ctx = BuildCtx {
        size_hints,
        max_hints,
        dim: 0,
        spec_influenced: size_dynamic || max_dynamic,
        spec,
    };
    build_inner(schema, &mut ctx)
}

fn build_inner(schema: &SchemaNode, ctx: &mut BuildCtx<'_>) -> Result<TypeDescriptor, SszError> {
    let spec_influenced = ctx.spec_influenced;
    match schema {
        SchemaNode::Bool => Ok(leaf(DescriptorKind::Bool, 1, spec_influenced)),
        SchemaNode::U8 => Ok(leaf(DescriptorKind::U8, 1, spec_influenced)),
        SchemaNode::U16 => Ok(leaf(DescriptorKind::U16, 2, spec_influenced)),
        SchemaNode::U32 => Ok(leaf(DescriptorKind::U32, 4, spec_influenced)),
        SchemaNode::U64 => Ok(leaf(DescriptorKind::U64, 8, spec_influenced)),
        SchemaNode::U128 => Ok(leaf(DescriptorKind::Uint128, 16, spec_influenced)),
        SchemaNode::U256 => Ok(leaf(DescriptorKind::Uint256, 32, spec_influenced)),

        SchemaNode::Container(c) => finish_container(c, ctx),

        SchemaNode::Vector(elem) => {
            let len = ctx
                .take_size()
                .ok_or_else(|| SszError::MalformedAnnotation("vector requires a size hint".into()))?;
            let element = Arc::new(build_inner(elem, ctx)?);
            let static_size = element.static_size.map(|s| s * len);
            Ok(TypeDescriptor {
                kind: DescriptorKind::Vector(SeqDescriptor {
                    element,
                    len: Some(len),
                    max: None,
                }),
                static_size,
                has_dynamic_spec: spec_influenced,
            })
        }

        SchemaNode::List(elem) => {
            ctx.take_size();
            let max = ctx
                .take_max()
                .ok_or_else(|| SszError::MalformedAnnotation("list requires a max hint".into()))?;
            let element = Arc::new(build_inner(elem, ctx)?);
            Ok(TypeDescriptor {
                kind: DescriptorKind::List(SeqDescriptor {
                    element,
                    len: None,
                    max: Some(max),
                }),
                static_size: None,
                has_dynamic_spec: spec_influenced,
            })
        }

        SchemaNode::ProgressiveList(elem) => {
            ctx.take_size();
            let element = Arc::new(build_inner(elem, ctx)?);
            Ok(TypeDescriptor {
                kind: DescriptorKind::ProgressiveList(SeqDescriptor {
                    element,
                    len: None,
                    max: None,
                }),
                static_size: None,
                has_dynamic_spec: spec_influenced,
            })
        }

        SchemaNode::Bitvector => {
            let len = ctx.take_size().ok_or_else(|| {
                SszError::MalformedAnnotation("bitvector requires a size hint".into())
            })?;
            Ok(TypeDescriptor {
                kind: DescriptorKind::Bitvector(BitsDescriptor {
                    len: Some(len),
                    max: None,
                }),
                static_size: Some(std::cmp::max(1, len.div_ceil(8))),
                has_dynamic_spec: spec_influenced,
            })
        }

        SchemaNode::Bitlist => {
            ctx.take_size();
            let max = ctx
                .take_max()
                .ok_or_else(|| SszError::MalformedAnnotation("bitlist requires a max hint".into()))?;
            Ok(TypeDescriptor {
                kind: DescriptorKind::Bitlist(BitsDescriptor {
                    len: None,
                    max: Some(max),
                }),
                static_size: None,
                has_dynamic_spec: spec_influenced,
            })
        }

        SchemaNode::ProgressiveBitlist => {
            ctx.take_size();
            Ok(TypeDescriptor {
                kind: DescriptorKind::ProgressiveBitlist(BitsDescriptor { len: None, max: None }),
                static_size: None,
                has_dynamic_spec: spec_influenced,
            })
        }

        SchemaNode::Wrapper(inner) => {
            let inner_descriptor = build_inner(inner, ctx)?;
            let static_size = inner_descriptor.static_size;
            Ok(TypeDescriptor {
                kind: DescriptorKind::Wrapper(Box::new(inner_descriptor)),
                static_size,
                has_dynamic_spec: spec_influenced,
            })
        }

        SchemaNode::Union(variants) => {
            let mut built = Vec::with_capacity(variants.len());
            let mut any_spec = spec_influenced;
            for (selector, variant_schema) in variants {
                let d = build_node(variant_schema, &FieldAnnotations::default(), ctx.spec)?;
                any_spec = any_spec || d.has_dynamic_spec;
                built.push((*selector, d));
            }
            Ok(TypeDescriptor {
                kind: DescriptorKind::Union(built),
                static_size: None,
                has_dynamic_spec: any_spec,
            })
        }
    }
}

fn build_container(
    c: &crate::schema::ContainerSchema,
    ctx: &mut BuildCtx<'_>,
) -> Result<(ContainerDescriptor, Option<u64>), SszError> {
    let mut fields = Vec::with_capacity(c.fields.len());
    let mut fixed_total = 0u64;
    let mut num_dynamic = 0u64;
    let mut any_dynamic_field = false;

    for f in &c.fields {
        let descriptor = build_node(&f.schema, &f.annotations, ctx.spec)?;
        let is_dynamic = descriptor.static_size.is_none();
        if is_dynamic {
            num_dynamic += 1;
            any_dynamic_field = true;
        } else {
            fixed_total += descriptor.static_size.expect("checked above");
        }
        fields.push(FieldDescriptor {
            name: f.name,
            descriptor: Arc::new(descriptor),
            is_dynamic,
            ssz_index: f.annotations.ssz_index,
        });
    }

    if matches!(c.kind, ContainerKind::Progressive) {
        for f in &fields {
            if f.ssz_index.is_none() {
                return Err(SszError::MalformedAnnotation(format!(
                    "progressive-container field `{}` is missing an ssz-index",
                    f.name
                )));
            }
        }
    }

    let fixed_portion_size = fixed_total + num_dynamic * 4;
    let static_size = if any_dynamic_field {
        None
    } else {
        Some(fixed_total)
    };

    Ok((
        ContainerDescriptor {
            fields,
            fixed_portion_size,
        },
        static_size,
    ))
}

fn leaf(kind: DescriptorKind, size: u64, spec_influenced: bool) -> TypeDescriptor {
    TypeDescriptor {
        kind,
        static_size: Some(size),
        has_dynamic_spec: spec_influenced,
    }
}

/// Finishes building a container once its kind (regular/progressive/stable) is known,
/// wrapping [`build_container`]'s result in the right [`DescriptorKind`] variant.
fn finish_container(
    c: &crate::schema::ContainerSchema,
    ctx: &mut BuildCtx<'_>,
) -> Result<TypeDescriptor, SszError> {
    let (cd, static_size) = build_container(c, ctx)?;
    let spec_influenced = ctx.spec_influenced || cd.fields.iter().any(|f| f.descriptor.has_dynamic_spec);
    let kind = match c.kind {
        ContainerKind::Regular => DescriptorKind::Container(cd),
        ContainerKind::Progressive => DescriptorKind::ProgressiveContainer(cd),
        ContainerKind::Stable { capacity } => DescriptorKind::StableContainer(cd, capacity),
    };
    Ok(TypeDescriptor {
        kind,
        static_size: if matches!(c.kind, ContainerKind::Regular) {
            static_size
        } else {
            // Progressive and stable containers are always Merkleized/encoded through their
            // own variable-aware path even when every field happens to be fixed-size.
            None
        },
        has_dynamic_spec: spec_influenced,
    })
}

/// Caches built descriptors keyed by `(Rust type identity, spec-value fingerprint)`.
///
/// Lookups take a shared lock; only a cache miss (first build under a given fingerprint, or
/// a prior build failure) takes the exclusive lock to insert. Build failures are cached too,
/// so a type that cannot be described under a given spec configuration fails fast on every
/// subsequent attempt instead of re-walking its schema.
#[derive(Debug, Default)]
pub struct DescriptorCache {
    entries: RwLock<HashMap<(TypeId, u64), CacheEntry>>,
}

#[derive(Debug, Clone)]
enum CacheEntry {
    Built(Arc<TypeDescriptor>),
    Failed(SszError),
}

impl DescriptorCache {
    /// A fresh, empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached descriptor for `T` under `spec`, building (and caching) it first if
    /// necessary. When `verbose` is set, prints a line to stderr on every cache miss (first
    /// build) and every replayed negative hit (a type that failed to describe under this spec
    /// before, and still does without re-walking its schema).
    pub fn get_or_build<T: SszReflect>(
        &self,
        spec: &SpecValues,
        verbose: bool,
    ) -> Result<Arc<TypeDescriptor>, SszError> {
        let key = (TypeId::of::<T>(), spec.fingerprint());

        if let Some(entry) = self.entries.read().expect("descriptor cache poisoned").get(&key) {
            return match entry {
                CacheEntry::Built(d) => Ok(Arc::clone(d)),
                CacheEntry::Failed(e) => {
                    if verbose {
                        eprintln!("dynssz: replaying cached descriptor-build failure: {e}");
                    }
                    Err(e.clone())
                }
            };
        }

        if verbose {
            eprintln!("dynssz: descriptor cache miss, building {}", std::any::type_name::<T>());
        }
        let result = build_root(&T::schema(), spec);

        let mut guard = self.entries.write().expect("descriptor cache poisoned");
        match result {
            Ok(descriptor) => {
                let arc = Arc::new(descriptor);
                guard.insert(key, CacheEntry::Built(Arc::clone(&arc)));
                Ok(arc)
            }
            Err(e) => {
                guard.insert(key, CacheEntry::Failed(e.clone()));
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ContainerSchema, FieldSchema};

    #[test]
    fn primitive_static_size() {
        let spec = SpecValues::empty();
        let d = build_root(&SchemaNode::U64, &spec).unwrap();
        assert_eq!(d.static_size, Some(8));
        assert!(!d.has_dynamic_spec);
    }

    #[test]
    fn nested_vector_dimensions_thread_through_the_outer_size_hint() {
        // `ssz-size: "4,2"` on a `vector<vector<u8,2>,4>` field: the outer dimension is
        // consumed building the outer vector, and the inner `2` must still be visible when
        // building the inner vector's own descriptor.
        let spec = SpecValues::empty();
        let annotations = FieldAnnotations {
            ssz_size: Some("4,2"),
            ..Default::default()
        };
        let schema =
            SchemaNode::Vector(Box::new(SchemaNode::Vector(Box::new(SchemaNode::U8))));
        let d = build_node(&schema, &annotations, &spec).unwrap();
        match d.kind {
            DescriptorKind::Vector(SeqDescriptor { len: Some(4), element, .. }) => {
                match element.kind {
                    DescriptorKind::Vector(SeqDescriptor { len: Some(2), .. }) => {}
                    ref other => panic!("expected inner vector of len 2, got {other:?}"),
                }
            }
            ref other => panic!("expected outer vector of len 4, got {other:?}"),
        }
    }

    #[test]
    fn vector_of_u8_with_spec_derived_length() {
        let spec = SpecValues::from_iter([("N".into(), 4u64)]);
        let annotations = FieldAnnotations {
            dynssz_size: Some("N"),
            ..Default::default()
        };
        let d = build_node(&SchemaNode::Vector(Box::new(SchemaNode::U8)), &annotations, &spec)
            .unwrap();
        assert_eq!(d.static_size, Some(4));
        assert!(d.has_dynamic_spec);
    }

    #[test]
    fn list_requires_a_max_hint() {
        let spec = SpecValues::empty();
        let annotations = FieldAnnotations {
            ssz_size: Some("?"),
            ..Default::default()
        };
        let err = build_node(&SchemaNode::List(Box::new(SchemaNode::U8)), &annotations, &spec);
        assert!(err.is_err());
    }

    #[test]
    fn container_fixed_portion_size_counts_offsets() {
        let spec = SpecValues::empty();
        let schema = SchemaNode::Container(Box::new(ContainerSchema {
            name: "Example",
            kind: ContainerKind::Regular,
            fields: vec![
                FieldSchema {
                    name: "a",
                    schema: SchemaNode::U8,
                    annotations: FieldAnnotations::default(),
                },
                FieldSchema {
                    name: "b",
                    schema: SchemaNode::List(Box::new(SchemaNode::U8)),
                    annotations: FieldAnnotations {
                        ssz_size: Some("?"),
                        ssz_max: Some("10"),
                        ..Default::default()
                    },
                },
            ],
        }));
        let mut ctx = BuildCtx {
            size_hints: vec![],
            max_hints: vec![],
            dim: 0,
            spec_influenced: false,
            spec: &spec,
        };
        let d = finish_container(
            match &schema {
                SchemaNode::Container(c) => c,
                _ => unreachable!(),
            },
            &mut ctx,
        )
        .unwrap();
        match d.kind {
            DescriptorKind::Container(cd) => assert_eq!(cd.fixed_portion_size, 1 + 4),
            _ => panic!("expected container"),
        }
    }
}
