//! Computes encoded byte sizes, statically from a descriptor alone and dynamically from a
//! descriptor plus a concrete value.

use crate::bits::BitsValue;
use crate::descriptor::{DescriptorKind, TypeDescriptor};
use crate::error::{PathSegment, ResultExt, SszError};
use crate::value::DynValue;

/// One node of the size tree the streaming marshaler consults to learn a dynamic child's
/// size before it has written the child's bytes.
#[derive(Debug, Clone)]
pub struct SizeNode {
    /// This value's own total encoded size.
    pub size: u64,
    /// Sizes of this value's dynamic children, in declaration/element order. Empty for
    /// values with no dynamic descendants.
    pub children: Vec<SizeNode>,
}

impl SizeNode {
    fn leaf(size: u64) -> Self {
        Self {
            size,
            children: Vec::new(),
        }
    }
}

/// Returns the static encoded size of `descriptor`, if it does not depend on a value.
pub fn type_size(descriptor: &TypeDescriptor) -> Option<u64> {
    descriptor.static_size
}

/// Computes the encoded size of `value` under `descriptor`, optionally emitting a size tree
/// for the streaming marshaler.
pub fn value_size(
    descriptor: &TypeDescriptor,
    value: &DynValue,
    emit_tree: bool,
) -> Result<(u64, Option<SizeNode>), SszError> {
    if let Some(static_size) = descriptor.static_size {
        return Ok((static_size, emit_tree.then(|| SizeNode::leaf(static_size))));
    }

    match (&descriptor.kind, value) {
        (DescriptorKind::Container(cd), DynValue::Container(fields))
        | (DescriptorKind::ProgressiveContainer(cd), DynValue::Container(fields))
        | (DescriptorKind::StableContainer(cd, _), DynValue::Container(fields)) => {
            let mut total = cd.fixed_portion_size;
            let mut children = Vec::new();
            for (field_desc, (name, field_value)) in cd.fields.iter().zip(fields.iter()) {
                if field_desc.is_dynamic {
                    let (size, child) = value_size(&field_desc.descriptor, field_value, emit_tree)
                        .context(PathSegment::Field(name))?;
                    total += size;
                    if let Some(child) = child {
                        children.push(child);
                    }
                }
            }
            Ok((total, emit_tree.then_some(SizeNode { size: total, children })))
        }

        (DescriptorKind::List(sd), DynValue::List(items))
        | (DescriptorKind::ProgressiveList(sd), DynValue::List(items)) => {
            check_max(items.len() as u64, sd.max)?;
            size_dynamic_sequence(&sd.element, items, emit_tree)
        }

        (DescriptorKind::Vector(sd), DynValue::Vector(items))
        | (DescriptorKind::Vector(sd), DynValue::List(items)) => {
            // A vector of dynamic-sized elements short of its declared length zero-pads up to
            // it, same as `marshal::marshal_sequence` and `hash::pad_to_len`.
            match sd.len {
                Some(len) if (items.len() as u64) < len => {
                    let mut padded = items.to_vec();
                    for _ in items.len() as u64..len {
                        padded.push(zero_value(&sd.element));
                    }
                    size_dynamic_sequence(&sd.element, &padded, emit_tree)
                }
                _ => size_dynamic_sequence(&sd.element, items, emit_tree),
            }
        }

        (DescriptorKind::Bitlist(bd), DynValue::Bitlist(bits))
        | (DescriptorKind::ProgressiveBitlist(bd), DynValue::Bitlist(bits)) => {
            check_max(bits.len() as u64, bd.max)?;
            let size = std::cmp::max(1, (bits.len() + 1).div_ceil(8)) as u64;
            Ok((size, emit_tree.then(|| SizeNode::leaf(size))))
        }

        (DescriptorKind::Wrapper(inner), DynValue::Wrapper(inner_value)) => {
            value_size(inner, inner_value, emit_tree)
        }

        (DescriptorKind::Union(variants), DynValue::Union { selector, value }) => {
            let variant = variants
                .iter()
                .find(|(sel, _)| sel == selector)
                .ok_or(SszError::InvalidUnionVariant(*selector))?;
            let (inner_size, child) = value_size(&variant.1, value, emit_tree)?;
            let size = 1 + inner_size;
            Ok((
                size,
                emit_tree.then(|| SizeNode {
                    size,
                    children: child.into_iter().collect(),
                }),
            ))
        }

        (kind, other) => Err(SszError::UnsupportedType(format!(
            "descriptor kind {kind:?} does not accept a {} value",
            other.kind_name()
        ))),
    }
}

fn size_dynamic_sequence(
    element: &TypeDescriptor,
    items: &[DynValue],
    emit_tree: bool,
) -> Result<(u64, Option<SizeNode>), SszError> {
    if let Some(elem_size) = element.static_size {
        let size = elem_size * items.len() as u64;
        return Ok((size, emit_tree.then(|| SizeNode::leaf(size))));
    }

    let mut total = 4 * items.len() as u64;
    let mut children = Vec::new();
    for (i, item) in items.iter().enumerate() {
        let (size, child) =
            value_size(element, item, emit_tree).context(PathSegment::Index(i))?;
        total += size;
        if let Some(child) = child {
            children.push(child);
        }
    }
    Ok((total, emit_tree.then_some(SizeNode { size: total, children })))
}

fn zero_value(descriptor: &TypeDescriptor) -> DynValue {
    match &descriptor.kind {
        DescriptorKind::Bool => DynValue::Bool(false),
        DescriptorKind::U8 => DynValue::U8(0),
        DescriptorKind::U16 => DynValue::U16(0),
        DescriptorKind::U32 => DynValue::U32(0),
        DescriptorKind::U64 => DynValue::U64(0),
        DescriptorKind::Uint128 => DynValue::U128(Default::default()),
        DescriptorKind::Uint256 => DynValue::U256(Default::default()),
        DescriptorKind::Container(cd)
        | DescriptorKind::ProgressiveContainer(cd)
        | DescriptorKind::StableContainer(cd, _) => DynValue::Container(
            cd.fields
                .iter()
                .map(|f| (f.name, zero_value(&f.descriptor)))
                .collect(),
        ),
        DescriptorKind::Vector(sd) => {
            let len = sd.len.unwrap_or(0);
            DynValue::Vector((0..len).map(|_| zero_value(&sd.element)).collect())
        }
        DescriptorKind::List(_) | DescriptorKind::ProgressiveList(_) => DynValue::List(Vec::new()),
        DescriptorKind::Bitvector(bd) => BitsValue::zeros(bd.len.unwrap_or(0) as usize).into(),
        DescriptorKind::Bitlist(_) | DescriptorKind::ProgressiveBitlist(_) => {
            BitsValue::zeros(0).into()
        }
        DescriptorKind::Wrapper(inner) => DynValue::Wrapper(Box::new(zero_value(inner))),
        DescriptorKind::Union(variants) => {
            let (selector, first) = &variants[0];
            DynValue::Union {
                selector: *selector,
                value: Box::new(zero_value(first)),
            }
        }
    }
}

fn check_max(len: u64, max: Option<u64>) -> Result<(), SszError> {
    if let Some(max) = max
        && len > max
    {
        return Err(SszError::ListTooBig {
            len: len as usize,
            max: max as usize,
        });
    }
    Ok(())
}
