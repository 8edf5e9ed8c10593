//! The marshal dispatcher: walks a [`TypeDescriptor`]/[`DynValue`] pair and writes SSZ bytes
//! through an [`Encoder`].

use crate::bits::BitsValue;
use crate::descriptor::{DescriptorKind, TypeDescriptor};
use crate::encode::Encoder;
use crate::error::{PathSegment, ResultExt, SszError};
use crate::size::{self, SizeNode};
use crate::value::DynValue;

/// Marshals `value` under `descriptor` into `enc`.
///
/// When `enc` is not seekable ([`Encoder::seekable`] is `false`), the dynamic regions of
/// every container/vector/list encountered must have their sizes known ahead of writing
/// their offset table; `size_tree` supplies them (see [`crate::size::value_size`] with
/// `emit_tree: true`). When `enc` is seekable, `size_tree` may be `None` and offsets are
/// back-patched instead.
pub fn marshal(
    descriptor: &TypeDescriptor,
    value: &DynValue,
    enc: &mut dyn Encoder,
    size_tree: Option<&SizeNode>,
) -> Result<(), SszError> {
    match (&descriptor.kind, value) {
        (DescriptorKind::Bool, DynValue::Bool(b)) => enc.write_bytes(&[*b as u8]),
        (DescriptorKind::U8, DynValue::U8(v)) => enc.write_bytes(&v.to_le_bytes()),
        (DescriptorKind::U16, DynValue::U16(v)) => enc.write_bytes(&v.to_le_bytes()),
        (DescriptorKind::U32, DynValue::U32(v)) => enc.write_bytes(&v.to_le_bytes()),
        (DescriptorKind::U64, DynValue::U64(v)) => enc.write_bytes(&v.to_le_bytes()),
        (DescriptorKind::Uint128, DynValue::U128(v)) => enc.write_bytes(&v.to_le_bytes::<16>()),
        (DescriptorKind::Uint256, DynValue::U256(v)) => enc.write_bytes(&v.to_le_bytes::<32>()),

        (DescriptorKind::Container(cd), DynValue::Container(fields))
        | (DescriptorKind::ProgressiveContainer(cd), DynValue::Container(fields))
        | (DescriptorKind::StableContainer(cd, _), DynValue::Container(fields)) => {
            let region_start = enc.position();
            let mut children = size_tree.map(|t| t.children.iter());
            let mut offset = cd.fixed_portion_size as u32;

            // First pass: fixed fields written directly; dynamic fields get an offset
            // (back-patched later if seekable, otherwise computed from the size tree now).
            let mut patch_positions = Vec::new();
            for (field_desc, (name, field_value)) in cd.fields.iter().zip(fields.iter()) {
                if field_desc.is_dynamic {
                    if enc.seekable() {
                        patch_positions.push(enc.position());
                        enc.write_offset(0).context(PathSegment::Field(name))?;
                    } else {
                        enc.write_offset(offset).context(PathSegment::Field(name))?;
                        let child = children
                            .as_mut()
                            .and_then(Iterator::next)
                            .ok_or(SszError::UnsupportedType(
                                "streaming marshal requires a size tree".into(),
                            ))
                            .context(PathSegment::Field(name))?;
                        offset += child.size as u32;
                    }
                } else {
                    marshal(&field_desc.descriptor, field_value, enc, None)
                        .context(PathSegment::Field(name))?;
                }
            }

            // Second pass: dynamic field bodies, in declaration order.
            let mut children = size_tree.map(|t| t.children.iter());
            for (pos, (field_desc, (name, field_value))) in
                patch_positions.iter().zip(
                    cd.fields
                        .iter()
                        .zip(fields.iter())
                        .filter(|(f, _)| f.is_dynamic),
                )
            {
                let body_start = enc.position();
                let child = children.as_mut().and_then(Iterator::next);
                marshal(&field_desc.descriptor, field_value, enc, child)
                    .context(PathSegment::Field(name))?;
                if enc.seekable() {
                    enc.patch_offset_at(*pos, (body_start - region_start) as u32)
                        .context(PathSegment::Field(name))?;
                }
            }
            Ok(())
        }

        (DescriptorKind::Vector(sd), DynValue::Vector(items))
        | (DescriptorKind::Vector(sd), DynValue::List(items)) => {
            if let Some(len) = sd.len
                && items.len() as u64 > len
            {
                return Err(SszError::ListTooBig {
                    len: items.len(),
                    max: len as usize,
                });
            }
            marshal_sequence(&sd.element, items, enc, size_tree, sd.len)
        }

        (DescriptorKind::List(sd), DynValue::List(items))
        | (DescriptorKind::ProgressiveList(sd), DynValue::List(items)) => {
            if let Some(max) = sd.max
                && items.len() as u64 > max
            {
                return Err(SszError::ListTooBig {
                    len: items.len(),
                    max: max as usize,
                });
            }
            marshal_sequence(&sd.element, items, enc, size_tree, None)
        }

        (DescriptorKind::Bitvector(bd), DynValue::Bitvector(bits)) => {
            marshal_bitvector(bits, bd.len, enc)
        }

        (DescriptorKind::Bitlist(bd), DynValue::Bitlist(bits))
        | (DescriptorKind::ProgressiveBitlist(bd), DynValue::Bitlist(bits)) => {
            if let Some(max) = bd.max
                && bits.len() as u64 > max
            {
                return Err(SszError::ListTooBig {
                    len: bits.len(),
                    max: max as usize,
                });
            }
            enc.write_bytes(&bits.encode_bitlist())
        }

        (DescriptorKind::Wrapper(inner), DynValue::Wrapper(inner_value)) => {
            marshal(inner, inner_value, enc, size_tree)
        }

        (DescriptorKind::Union(variants), DynValue::Union { selector, value }) => {
            let variant = variants
                .iter()
                .find(|(sel, _)| sel == selector)
                .ok_or(SszError::InvalidUnionVariant(*selector))?;
            enc.write_bytes(&[*selector])
                .context(PathSegment::Variant(*selector))?;
            marshal(&variant.1, value, enc, size_tree).context(PathSegment::Variant(*selector))
        }

        (kind, other) => Err(SszError::UnsupportedType(format!(
            "{kind:?} cannot marshal a {} value",
            other.kind_name()
        ))),
    }
}

fn marshal_sequence(
    element: &TypeDescriptor,
    items: &[DynValue],
    enc: &mut dyn Encoder,
    size_tree: Option<&SizeNode>,
    pad_to: Option<u64>,
) -> Result<(), SszError> {
    let region_start = enc.position();
    if element.static_size.is_some() {
        for (i, item) in items.iter().enumerate() {
            marshal(element, item, enc, None).context(PathSegment::Index(i))?;
        }
        if let Some(pad_to) = pad_to
            && (items.len() as u64) < pad_to
        {
            let elem_size = element.static_size.expect("checked above");
            for i in items.len() as u64..pad_to {
                let zero = size::value_size(element, &zero_value(element), false)
                    .context(PathSegment::Index(i as usize))?;
                debug_assert_eq!(zero.0, elem_size);
                enc.write_zero_padding(elem_size as usize)?;
            }
        }
        return Ok(());
    }

    // Dynamic elements: offset table first, bodies after, exactly as for a container's
    // dynamic fields. A vector short of its declared length is zero-padded up to it, the
    // same as the fixed-size-element branch above and `hash::pad_to_len`.
    let owned_items;
    let items: &[DynValue] = match pad_to {
        Some(pad_to) if (items.len() as u64) < pad_to => {
            let mut padded = items.to_vec();
            for _ in items.len() as u64..pad_to {
                padded.push(zero_value(element));
            }
            owned_items = padded;
            &owned_items
        }
        _ => items,
    };

    let mut children = size_tree.map(|t| t.children.iter());
    let mut offset = 4 * items.len() as u32;
    let mut patch_positions = Vec::new();
    for _ in items {
        if enc.seekable() {
            patch_positions.push(enc.position());
            enc.write_offset(0)?;
        } else {
            enc.write_offset(offset)?;
            let child = children
                .as_mut()
                .and_then(Iterator::next)
                .ok_or(SszError::UnsupportedType(
                    "streaming marshal requires a size tree".into(),
                ))?;
            offset += child.size as u32;
        }
    }

    let mut children = size_tree.map(|t| t.children.iter());
    for (i, item) in items.iter().enumerate() {
        let body_start = enc.position();
        let child = children.as_mut().and_then(Iterator::next);
        marshal(element, item, enc, child).context(PathSegment::Index(i))?;
        if enc.seekable() {
            enc.patch_offset_at(patch_positions[i], (body_start - region_start) as u32)
                .context(PathSegment::Index(i))?;
        }
    }
    Ok(())
}

fn marshal_bitvector(bits: &BitsValue, declared_len: Option<u64>, enc: &mut dyn Encoder) -> Result<(), SszError> {
    if let Some(len) = declared_len
        && bits.len() as u64 != len
    {
        return Err(SszError::IncorrectSize {
            got: bits.len(),
            expected: len as usize,
        });
    }
    bits.check_padding_zero()?;
    enc.write_bytes(bits.as_bytes())
}

/// A zero value of the same shape as `descriptor`, used to pad fixed-size vectors/lists
/// whose supplied element count is short of the declared length.
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

impl From<BitsValue> for DynValue {
    fn from(bits: BitsValue) -> Self {
        DynValue::Bitvector(bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{BitsDescriptor, SeqDescriptor};
    use crate::encode::BufferEncoder;
    use std::sync::Arc;

    #[test]
    fn marshals_primitive_little_endian() {
        let mut enc = BufferEncoder::new();
        marshal(
            &TypeDescriptor {
                kind: DescriptorKind::U16,
                static_size: Some(2),
                has_dynamic_spec: false,
            },
            &DynValue::U16(1337),
            &mut enc,
            None,
        )
        .unwrap();
        assert_eq!(enc.into_bytes(), vec![0x39, 0x05]);
    }

    #[test]
    fn marshals_fixed_vector_with_short_input_padded_with_zeros() {
        let descriptor = TypeDescriptor {
            kind: DescriptorKind::Vector(SeqDescriptor {
                element: Arc::new(TypeDescriptor {
                    kind: DescriptorKind::U8,
                    static_size: Some(1),
                    has_dynamic_spec: false,
                }),
                len: Some(10),
                max: None,
            }),
            static_size: Some(10),
            has_dynamic_spec: false,
        };
        let value = DynValue::Vector(vec![
            DynValue::U8(1),
            DynValue::U8(2),
            DynValue::U8(3),
            DynValue::U8(4),
            DynValue::U8(5),
        ]);
        let mut enc = BufferEncoder::new();
        marshal(&descriptor, &value, &mut enc, None).unwrap();
        assert_eq!(
            enc.into_bytes(),
            vec![1, 2, 3, 4, 5, 0, 0, 0, 0, 0]
        );
    }

    /// A `Vector` of dynamic-sized elements (here `List<u8>`) must zero-pad short input up to
    /// its declared length the same way a vector of fixed-size elements does, so its offset
    /// table always has exactly `len` entries, matching what `unmarshal` requires.
    #[test]
    fn marshals_dynamic_element_vector_with_short_input_padded_with_zeros() {
        let u8_list_d = Arc::new(TypeDescriptor {
            kind: DescriptorKind::List(SeqDescriptor {
                element: Arc::new(TypeDescriptor {
                    kind: DescriptorKind::U8,
                    static_size: Some(1),
                    has_dynamic_spec: false,
                }),
                len: None,
                max: Some(4),
            }),
            static_size: None,
            has_dynamic_spec: false,
        });
        let descriptor = TypeDescriptor {
            kind: DescriptorKind::Vector(SeqDescriptor {
                element: u8_list_d,
                len: Some(3),
                max: None,
            }),
            static_size: None,
            has_dynamic_spec: false,
        };
        let value = DynValue::Vector(vec![DynValue::List(vec![DynValue::U8(7)])]);
        let mut enc = BufferEncoder::new();
        marshal(&descriptor, &value, &mut enc, None).unwrap();
        assert_eq!(
            enc.into_bytes(),
            vec![
                0x0c, 0x00, 0x00, 0x00, // offset to item 0's body (relative 12)
                0x0d, 0x00, 0x00, 0x00, // offset to item 1's body (the zero-padded empty list)
                0x0d, 0x00, 0x00, 0x00, // offset to item 2's body (likewise empty)
                0x07, // item 0 = [7]
            ]
        );
    }

    #[test]
    fn marshals_dynamic_field_layout_with_offsets() {
        use crate::descriptor::{ContainerDescriptor, FieldDescriptor};

        let bool_d = Arc::new(TypeDescriptor {
            kind: DescriptorKind::Bool,
            static_size: Some(1),
            has_dynamic_spec: false,
        });
        let u8_list_d = Arc::new(TypeDescriptor {
            kind: DescriptorKind::List(SeqDescriptor {
                element: Arc::new(TypeDescriptor {
                    kind: DescriptorKind::U8,
                    static_size: Some(1),
                    has_dynamic_spec: false,
                }),
                len: None,
                max: Some(10),
            }),
            static_size: None,
            has_dynamic_spec: false,
        });
        let u32_d = Arc::new(TypeDescriptor {
            kind: DescriptorKind::U32,
            static_size: Some(4),
            has_dynamic_spec: false,
        });

        let container = TypeDescriptor {
            kind: DescriptorKind::Container(ContainerDescriptor {
                fields: vec![
                    FieldDescriptor {
                        name: "flag",
                        descriptor: bool_d,
                        is_dynamic: false,
                        ssz_index: None,
                    },
                    FieldDescriptor {
                        name: "items",
                        descriptor: u8_list_d,
                        is_dynamic: true,
                        ssz_index: None,
                    },
                    FieldDescriptor {
                        name: "count",
                        descriptor: u32_d,
                        is_dynamic: false,
                        ssz_index: None,
                    },
                ],
                fixed_portion_size: 1 + 4 + 4,
            }),
            static_size: None,
            has_dynamic_spec: false,
        };

        let value = DynValue::Container(vec![
            ("flag", DynValue::Bool(true)),
            (
                "items",
                DynValue::List(vec![DynValue::U8(1), DynValue::U8(1), DynValue::U8(1), DynValue::U8(1)]),
            ),
            ("count", DynValue::U32(3)),
        ]);

        let mut enc = BufferEncoder::new();
        marshal(&container, &value, &mut enc, None).unwrap();
        assert_eq!(
            enc.into_bytes(),
            vec![0x01, 0x09, 0x00, 0x00, 0x00, 0x03, 0x00, 0x00, 0x00, 0x01, 0x01, 0x01, 0x01]
        );
    }

    /// `Outer { x: List<u8>, y: List<List<u8>> }` with `x=[1,2]`, `y=[[3]]`: `y`'s own offset
    /// table starts at byte 10, not byte 0, so its first (and only) offset must be written
    /// relative to *its own* region start (`4`), not the absolute buffer position (`14`).
    #[test]
    fn nested_dynamic_region_offsets_are_relative_to_their_own_start() {
        use crate::descriptor::{ContainerDescriptor, FieldDescriptor};

        let u8_d = Arc::new(TypeDescriptor {
            kind: DescriptorKind::U8,
            static_size: Some(1),
            has_dynamic_spec: false,
        });
        let u8_list_d = Arc::new(TypeDescriptor {
            kind: DescriptorKind::List(SeqDescriptor {
                element: Arc::clone(&u8_d),
                len: None,
                max: Some(10),
            }),
            static_size: None,
            has_dynamic_spec: false,
        });
        let list_of_lists_d = Arc::new(TypeDescriptor {
            kind: DescriptorKind::List(SeqDescriptor {
                element: Arc::clone(&u8_list_d),
                len: None,
                max: Some(10),
            }),
            static_size: None,
            has_dynamic_spec: false,
        });

        let outer = TypeDescriptor {
            kind: DescriptorKind::Container(ContainerDescriptor {
                fields: vec![
                    FieldDescriptor {
                        name: "x",
                        descriptor: u8_list_d,
                        is_dynamic: true,
                        ssz_index: None,
                    },
                    FieldDescriptor {
                        name: "y",
                        descriptor: list_of_lists_d,
                        is_dynamic: true,
                        ssz_index: None,
                    },
                ],
                fixed_portion_size: 4 + 4,
            }),
            static_size: None,
            has_dynamic_spec: false,
        };

        let value = DynValue::Container(vec![
            ("x", DynValue::List(vec![DynValue::U8(1), DynValue::U8(2)])),
            (
                "y",
                DynValue::List(vec![DynValue::List(vec![DynValue::U8(3)])]),
            ),
        ]);

        let mut enc = BufferEncoder::new();
        marshal(&outer, &value, &mut enc, None).unwrap();
        assert_eq!(
            enc.into_bytes(),
            vec![
                0x08, 0x00, 0x00, 0x00, // offset to x's body (absolute 8, region starts at 0)
                0x0a, 0x00, 0x00, 0x00, // offset to y's body (absolute 10, region starts at 0)
                0x01, 0x02, // x = [1, 2]
                0x04, 0x00, 0x00, 0x00, // y's own offset table: item 0 at relative 4, not 14
                0x03, // y[0] = [3]
            ]
        );
    }

    #[test]
    fn marshals_compatible_union_selector_then_body() {
        let descriptor = TypeDescriptor {
            kind: DescriptorKind::Union(vec![
                (
                    0,
                    TypeDescriptor {
                        kind: DescriptorKind::U32,
                        static_size: Some(4),
                        has_dynamic_spec: false,
                    },
                ),
            ]),
            static_size: None,
            has_dynamic_spec: false,
        };
        let value = DynValue::Union {
            selector: 0,
            value: Box::new(DynValue::U32(0x1234_5678)),
        };
        let mut enc = BufferEncoder::new();
        marshal(&descriptor, &value, &mut enc, None).unwrap();
        assert_eq!(enc.into_bytes(), vec![0x00, 0x78, 0x56, 0x34, 0x12]);
    }

    #[test]
    fn bitvector_rejects_nonzero_padding() {
        let mut bits = BitsValue::zeros(4);
        bits.set(0, true).unwrap();
        let descriptor = TypeDescriptor {
            kind: DescriptorKind::Bitvector(BitsDescriptor { len: Some(4), max: None }),
            static_size: Some(1),
            has_dynamic_spec: false,
        };

        // Sanity: well-formed bits marshal fine.
        let mut enc = BufferEncoder::new();
        marshal(&descriptor, &DynValue::Bitvector(bits.clone()), &mut enc, None).unwrap();
        assert_eq!(enc.into_bytes(), vec![0b0000_0001]);

        // Force a set bit beyond the declared 4-bit length directly into the backing byte.
        let raw: smallvec::SmallVec<[u8; 32]> = smallvec::smallvec![bits.as_bytes()[0] | 0b1000_0000];
        let corrupted = BitsValue::from_raw(raw, 4).unwrap();
        let mut enc = BufferEncoder::new();
        assert!(matches!(
            marshal(&descriptor, &DynValue::Bitvector(corrupted), &mut enc, None),
            Err(SszError::BitvectorPaddingNonZero)
        ));
    }
}
