//! The unmarshal dispatcher: walks a [`TypeDescriptor`] and reconstructs a [`DynValue`] from
//! a [`Decoder`], honoring the same offset discipline [`crate::marshal`] wrote.

use dynssz_primitives::{U128, U256};

use crate::bits::BitsValue;
use crate::decode::{self, Decoder};
use crate::descriptor::{DescriptorKind, TypeDescriptor};
use crate::error::{PathSegment, ResultExt, SszError};
use crate::value::DynValue;

/// Unmarshals a value of `descriptor`'s shape from `dec`, starting at the decoder's current
/// position and ending no later than its current limit.
///
/// Does not check for trailing bytes after the value: that check only applies at the
/// top-level call, performed by [`crate::codec::Codec::unmarshal`].
pub fn unmarshal(descriptor: &TypeDescriptor, dec: &mut Decoder<'_>) -> Result<DynValue, SszError> {
    match &descriptor.kind {
        DescriptorKind::Bool => Ok(DynValue::Bool(dec.decode_bool()?)),
        DescriptorKind::U8 => Ok(DynValue::U8(dec.decode_u8()?)),
        DescriptorKind::U16 => Ok(DynValue::U16(dec.decode_u16()?)),
        DescriptorKind::U32 => Ok(DynValue::U32(dec.decode_u32()?)),
        DescriptorKind::U64 => Ok(DynValue::U64(dec.decode_u64()?)),
        DescriptorKind::Uint128 => {
            let bytes: [u8; 16] = dec.decode_bytes(16)?.try_into().expect("exactly 16 bytes");
            Ok(DynValue::U128(U128::from_le_bytes::<16>(bytes)))
        }
        DescriptorKind::Uint256 => {
            let bytes: [u8; 32] = dec.decode_bytes(32)?.try_into().expect("exactly 32 bytes");
            Ok(DynValue::U256(U256::from_le_bytes::<32>(bytes)))
        }

        DescriptorKind::Container(cd)
        | DescriptorKind::ProgressiveContainer(cd)
        | DescriptorKind::StableContainer(cd, _) => {
            let start = dec.position();
            let end = dec.limit();
            let total_len = end - start;

            let mut values: Vec<Option<DynValue>> = (0..cd.fields.len()).map(|_| None).collect();
            let mut dyn_offsets: Vec<(usize, u32)> = Vec::new();

            for (idx, field) in cd.fields.iter().enumerate() {
                if field.is_dynamic {
                    let offset = dec.decode_offset().context(PathSegment::Field(field.name))?;
                    decode::validate_offset(
                        offset,
                        dyn_offsets.is_empty(),
                        cd.fixed_portion_size as usize,
                        dyn_offsets.last().map(|(_, o)| *o as usize),
                        total_len,
                    )
                    .context(PathSegment::Field(field.name))?;
                    dyn_offsets.push((idx, offset as u32));
                } else {
                    let value = unmarshal(&field.descriptor, dec)
                        .context(PathSegment::Field(field.name))?;
                    values[idx] = Some(value);
                }
            }

            for (i, (field_idx, _offset)) in dyn_offsets.iter().enumerate() {
                let field = &cd.fields[*field_idx];
                let body_end = dyn_offsets
                    .get(i + 1)
                    .map(|(_, o)| start + *o as usize)
                    .unwrap_or(end);
                dec.push_limit_at(body_end).context(PathSegment::Field(field.name))?;
                let value = unmarshal(&field.descriptor, dec).context(PathSegment::Field(field.name))?;
                let leftover = dec.pop_limit();
                if leftover != 0 {
                    return Err(SszError::TrailingBytes { extra: leftover })
                        .context(PathSegment::Field(field.name));
                }
                values[*field_idx] = Some(value);
            }

            let fields = values
                .into_iter()
                .zip(cd.fields.iter())
                .map(|(v, f)| (f.name, v.expect("every field index is filled exactly once")))
                .collect();
            Ok(DynValue::Container(fields))
        }

        DescriptorKind::Vector(sd) => {
            if let Some(elem_size) = sd.element.static_size {
                let len = sd.len.expect("vector always declares a length");
                let total = elem_size * len;
                let bytes = dec.decode_bytes(total as usize)?;
                let mut inner = Decoder::new(bytes);
                let mut items = Vec::with_capacity(len as usize);
                for i in 0..len {
                    items.push(
                        unmarshal(&sd.element, &mut inner).context(PathSegment::Index(i as usize))?,
                    );
                }
                Ok(DynValue::Vector(items))
            } else {
                let items = unmarshal_dynamic_elements(&sd.element, dec, sd.len)?;
                Ok(DynValue::Vector(items))
            }
        }

        DescriptorKind::List(sd) | DescriptorKind::ProgressiveList(sd) => {
            if let Some(elem_size) = sd.element.static_size {
                let total_len = dec.remaining();
                if elem_size == 0 {
                    return Ok(DynValue::List(Vec::new()));
                }
                if total_len as u64 % elem_size != 0 {
                    return Err(SszError::IncorrectSize {
                        got: total_len,
                        expected: (total_len as u64 / elem_size * elem_size) as usize,
                    });
                }
                let count = total_len as u64 / elem_size;
                check_max(count, sd.max)?;
                let mut items = Vec::with_capacity(count as usize);
                for i in 0..count {
                    items.push(
                        unmarshal(&sd.element, dec).context(PathSegment::Index(i as usize))?,
                    );
                }
                Ok(DynValue::List(items))
            } else {
                let items = unmarshal_dynamic_elements(&sd.element, dec, None)?;
                check_max(items.len() as u64, sd.max)?;
                Ok(DynValue::List(items))
            }
        }

        DescriptorKind::Bitvector(bd) => {
            let len = bd.len.expect("bitvector always declares a length") as usize;
            let byte_len = std::cmp::max(1, len.div_ceil(8));
            let bytes = dec.decode_bytes(byte_len)?;
            let value = BitsValue::from_raw(smallvec::SmallVec::from_slice(bytes), len)?;
            value.check_padding_zero()?;
            Ok(DynValue::Bitvector(value))
        }

        DescriptorKind::Bitlist(bd) | DescriptorKind::ProgressiveBitlist(bd) => {
            let bytes = dec.decode_rest()?;
            let max = bd.max.unwrap_or(u64::MAX);
            Ok(DynValue::Bitlist(BitsValue::decode_bitlist(bytes, max)?))
        }

        DescriptorKind::Wrapper(inner) => {
            Ok(DynValue::Wrapper(Box::new(unmarshal(inner, dec)?)))
        }

        DescriptorKind::Union(variants) => {
            let selector = dec.decode_u8()?;
            let variant = variants
                .iter()
                .find(|(sel, _)| *sel == selector)
                .ok_or(SszError::InvalidUnionVariant(selector))?;
            let value =
                unmarshal(&variant.1, dec).context(PathSegment::Variant(selector))?;
            Ok(DynValue::Union {
                selector,
                value: Box::new(value),
            })
        }
    }
}

/// Decodes a dynamic-element sequence (a list, or a vector of dynamic elements): an offset
/// table followed by element bodies, framed the same way a container frames its dynamic
/// fields.
///
/// `known_len` is `Some(n)` for a vector (the element count is fixed by the descriptor);
/// `None` for a list, where the count is derived from the first offset (`first_offset / 4`).
fn unmarshal_dynamic_elements(
    element: &TypeDescriptor,
    dec: &mut Decoder<'_>,
    known_len: Option<u64>,
) -> Result<Vec<DynValue>, SszError> {
    let start = dec.position();
    let end = dec.limit();
    let total_len = end - start;

    let len = match known_len {
        Some(n) => n,
        None => {
            if total_len == 0 {
                return Ok(Vec::new());
            }
            let first_offset = dec.decode_offset()?;
            if first_offset % 4 != 0 {
                return Err(SszError::InvalidVariableOffset {
                    offset: first_offset,
                    expected: first_offset / 4 * 4,
                });
            }
            (first_offset / 4) as u64
        }
    };

    if len == 0 {
        return Ok(Vec::new());
    }

    let fixed_portion_size = (len * 4) as usize;
    let mut offsets = Vec::with_capacity(len as usize);

    // The list case already consumed the first offset above to learn `len`; the vector case
    // (`known_len` was `Some`) has not read anything yet.
    let already_read = known_len.is_none();
    if already_read {
        offsets.push((dec.position() - 4 - start) as u32);
    }
    for i in offsets.len()..len as usize {
        let offset = dec.decode_offset().context(PathSegment::Index(i))?;
        decode::validate_offset(
            offset,
            i == 0,
            fixed_portion_size,
            offsets.last().map(|o: &u32| *o as usize),
            total_len,
        )
        .context(PathSegment::Index(i))?;
        offsets.push(offset as u32);
    }
    if already_read {
        decode::validate_offset(offsets[0] as usize, true, fixed_portion_size, None, total_len)
            .context(PathSegment::Index(0))?;
    }

    let mut items = Vec::with_capacity(len as usize);
    for (i, offset) in offsets.iter().enumerate() {
        let body_start = start + *offset as usize;
        let body_end = offsets.get(i + 1).map(|o| start + *o as usize).unwrap_or(end);
        debug_assert_eq!(dec.position(), body_start);
        dec.push_limit_at(body_end).context(PathSegment::Index(i))?;
        let value = unmarshal(element, dec).context(PathSegment::Index(i))?;
        let leftover = dec.pop_limit();
        if leftover != 0 {
            return Err(SszError::TrailingBytes { extra: leftover }).context(PathSegment::Index(i));
        }
        items.push(value);
    }
    Ok(items)
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{BitsDescriptor, ContainerDescriptor, FieldDescriptor, SeqDescriptor};
    use std::sync::Arc;

    fn fixed(kind: DescriptorKind, size: u64) -> TypeDescriptor {
        TypeDescriptor {
            kind,
            static_size: Some(size),
            has_dynamic_spec: false,
        }
    }

    #[test]
    fn round_trips_primitive() {
        let bytes = [0x39, 0x05];
        let mut dec = Decoder::new(&bytes);
        let v = unmarshal(&fixed(DescriptorKind::U16, 2), &mut dec).unwrap();
        assert_eq!(v, DynValue::U16(1337));
        assert!(dec.at_end());
    }

    #[test]
    fn round_trips_fixed_vector() {
        let bytes = [1, 2, 3, 4, 5, 0, 0, 0, 0, 0];
        let descriptor = TypeDescriptor {
            kind: DescriptorKind::Vector(SeqDescriptor {
                element: Arc::new(fixed(DescriptorKind::U8, 1)),
                len: Some(10),
                max: None,
            }),
            static_size: Some(10),
            has_dynamic_spec: false,
        };
        let mut dec = Decoder::new(&bytes);
        let v = unmarshal(&descriptor, &mut dec).unwrap();
        let DynValue::Vector(items) = v else { panic!("expected vector") };
        assert_eq!(items.len(), 10);
        assert_eq!(items[4], DynValue::U8(5));
        assert_eq!(items[5], DynValue::U8(0));
    }

    #[test]
    fn round_trips_dynamic_field_layout() {
        let bytes = [
            0x01, 0x09, 0x00, 0x00, 0x00, 0x03, 0x00, 0x00, 0x00, 0x01, 0x01, 0x01, 0x01,
        ];
        let bool_d = Arc::new(fixed(DescriptorKind::Bool, 1));
        let u8_list_d = Arc::new(TypeDescriptor {
            kind: DescriptorKind::List(SeqDescriptor {
                element: Arc::new(fixed(DescriptorKind::U8, 1)),
                len: None,
                max: Some(10),
            }),
            static_size: None,
            has_dynamic_spec: false,
        });
        let u32_d = Arc::new(fixed(DescriptorKind::U32, 4));
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
        let mut dec = Decoder::new(&bytes);
        let value = unmarshal(&container, &mut dec).unwrap();
        assert!(dec.at_end());
        let DynValue::Container(fields) = value else { panic!("expected container") };
        assert_eq!(fields[0], ("flag", DynValue::Bool(true)));
        assert_eq!(
            fields[1],
            (
                "items",
                DynValue::List(vec![DynValue::U8(1), DynValue::U8(1), DynValue::U8(1), DynValue::U8(1)])
            )
        );
        assert_eq!(fields[2], ("count", DynValue::U32(3)));
    }

    #[test]
    fn first_offset_mismatch_is_rejected() {
        let bytes = [0x01, 0x05, 0x00, 0x00, 0x00, 0x03, 0x00, 0x00, 0x00];
        let bool_d = Arc::new(fixed(DescriptorKind::Bool, 1));
        let u32_d = Arc::new(fixed(DescriptorKind::U32, 4));
        let list_d = Arc::new(TypeDescriptor {
            kind: DescriptorKind::List(SeqDescriptor {
                element: Arc::new(fixed(DescriptorKind::U8, 1)),
                len: None,
                max: Some(10),
            }),
            static_size: None,
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
                        descriptor: list_d,
                        is_dynamic: true,
                        ssz_index: None,
                    },
                ],
                fixed_portion_size: 1 + 4,
            }),
            static_size: None,
            has_dynamic_spec: false,
        };
        let mut dec = Decoder::new(&bytes);
        assert!(matches!(
            unmarshal(&container, &mut dec),
            Err(SszError::WithPath { .. })
        ));
        let _ = u32_d;
    }

    #[test]
    fn bitvector_round_trips() {
        let mut bits = BitsValue::zeros(12);
        bits.set(3, true).unwrap();
        bits.set(11, true).unwrap();
        let raw = bits.as_bytes().to_vec();
        let descriptor = fixed(
            DescriptorKind::Bitvector(BitsDescriptor { len: Some(12), max: None }),
            2,
        );
        let mut dec = Decoder::new(&raw);
        let v = unmarshal(&descriptor, &mut dec).unwrap();
        assert_eq!(v, DynValue::Bitvector(bits));
    }

    #[test]
    fn bitlist_round_trips() {
        let bits = BitsValue::from_bits([true, false, true, true, false]);
        let encoded = bits.encode_bitlist();
        let descriptor = TypeDescriptor {
            kind: DescriptorKind::Bitlist(BitsDescriptor { len: None, max: Some(1024) }),
            static_size: None,
            has_dynamic_spec: false,
        };
        let mut dec = Decoder::new(&encoded);
        let v = unmarshal(&descriptor, &mut dec).unwrap();
        assert_eq!(v, DynValue::Bitlist(bits));
    }

    #[test]
    fn union_round_trips() {
        let bytes = [0x00, 0x78, 0x56, 0x34, 0x12];
        let descriptor = TypeDescriptor {
            kind: DescriptorKind::Union(vec![(0, fixed(DescriptorKind::U32, 4))]),
            static_size: None,
            has_dynamic_spec: false,
        };
        let mut dec = Decoder::new(&bytes);
        let v = unmarshal(&descriptor, &mut dec).unwrap();
        assert_eq!(
            v,
            DynValue::Union {
                selector: 0,
                value: Box::new(DynValue::U32(0x1234_5678)),
            }
        );
    }

    #[test]
    fn empty_dynamic_list_decodes_with_no_bytes() {
        let descriptor = TypeDescriptor {
            kind: DescriptorKind::List(SeqDescriptor {
                element: Arc::new(TypeDescriptor {
                    kind: DescriptorKind::List(SeqDescriptor {
                        element: Arc::new(fixed(DescriptorKind::U8, 1)),
                        len: None,
                        max: Some(5),
                    }),
                    static_size: None,
                    has_dynamic_spec: false,
                }),
                len: None,
                max: Some(10),
            }),
            static_size: None,
            has_dynamic_spec: false,
        };
        let bytes: [u8; 0] = [];
        let mut dec = Decoder::new(&bytes);
        let v = unmarshal(&descriptor, &mut dec).unwrap();
        assert_eq!(v, DynValue::List(Vec::new()));
    }
}
