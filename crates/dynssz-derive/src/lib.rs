//! `#[derive(SszReflect)]`: generates a `dynssz::SszReflect` implementation from a struct or
//! enum's shape plus its `#[dynssz(...)]` field/container annotations.
//!
//! Rust has no runtime reflection, so every SSZ-shaped type needs a hand-written bridge into
//! `dynssz`'s `SchemaNode`/`DynValue` pair. This macro writes that bridge so callers don't have
//! to: it inspects each field's Rust type and annotations once, at compile time, and decides
//! there whether a `Vec<T>`/`[T; N]`/`BitsValue` field is a vector or a list/bitlist (the
//! engine's own runtime descriptor builder only ever resolves *sizes*, never *shape*, from a
//! spec table — shape is a compile-time fact here).
//!
//! Container-level attributes: `#[dynssz(container = "progressive-container")]`,
//! `#[dynssz(container = "stable-container", capacity = 64)]`, or `#[dynssz(wrapper)]` for a
//! single-field passthrough. Omitted entirely, a struct is a regular container.
//!
//! Field-level attributes: `size`, `dyn_size`, `max`, `dyn_max` (comma-separated per-dimension
//! tag strings, exactly as consumed by `dynssz::tags`), `kind` (an explicit shape override),
//! and `index` (required on every field of a progressive container).
//!
//! Enums derive a compatible union: each variant must hold exactly one unnamed field. The
//! selector is the variant's declaration index, 0-based if any variant's own schema is a
//! progressive container, 1-based otherwise (selector 0 is conventionally reserved for "no
//! value" once a union has a non-progressive-container member).

use darling::ast::{Data, Fields};
use darling::{FromDeriveInput, FromField, FromVariant};
use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{parse_macro_input, DeriveInput, Type};

#[derive(Debug, FromField)]
#[darling(attributes(dynssz))]
struct FieldOpts {
    ident: Option<syn::Ident>,
    ty: Type,
    #[darling(default)]
    size: Option<String>,
    #[darling(default, rename = "dyn_size")]
    dyn_size: Option<String>,
    #[darling(default)]
    max: Option<String>,
    #[darling(default, rename = "dyn_max")]
    dyn_max: Option<String>,
    #[darling(default)]
    kind: Option<String>,
    #[darling(default)]
    index: Option<u16>,
}

#[derive(Debug, FromVariant)]
#[darling(attributes(dynssz))]
struct VariantOpts {
    ident: syn::Ident,
    fields: Fields<FieldOpts>,
}

#[derive(Debug, FromDeriveInput)]
#[darling(attributes(dynssz), supports(struct_named, struct_newtype, enum_newtype))]
struct ContainerOpts {
    ident: syn::Ident,
    data: Data<VariantOpts, FieldOpts>,
    #[darling(default)]
    container: Option<String>,
    #[darling(default)]
    capacity: Option<u64>,
    #[darling(default)]
    wrapper: bool,
}

/// Distinguishes how a field's Rust type maps onto a [`SchemaNode`] variant, independent of
/// any annotation.
enum FieldShape<'a> {
    /// `[Elem; N]`.
    Array(&'a Type),
    /// `Vec<Elem>`.
    Vec(Type),
    /// `dynssz::bits::BitsValue`.
    Bits,
    /// Anything else: a primitive, a nested `SszReflect` type, or a `dynssz-primitives` leaf.
    /// Its own `SszReflect::schema()`/`to_dyn`/`from_dyn` are used verbatim.
    Opaque,
}

fn classify(ty: &Type) -> FieldShape<'_> {
    match ty {
        Type::Array(arr) => FieldShape::Array(&arr.elem),
        Type::Path(p) => {
            let Some(seg) = p.path.segments.last() else {
                return FieldShape::Opaque;
            };
            if seg.ident == "Vec" {
                if let syn::PathArguments::AngleBracketed(args) = &seg.arguments
                    && let Some(syn::GenericArgument::Type(inner)) = args.args.first()
                {
                    return FieldShape::Vec(inner.clone());
                }
            }
            if seg.ident == "BitsValue" {
                return FieldShape::Bits;
            }
            FieldShape::Opaque
        }
        _ => FieldShape::Opaque,
    }
}

/// `true` if the outer (first) dimension of a `size`/`dyn_size` tag is a literal rather than
/// `?` or absent — the same rule the distilled spec gives for vector-vs-list inference.
fn outer_dim_is_static(opts: &FieldOpts) -> bool {
    let tag = opts.size.as_deref().or(opts.dyn_size.as_deref());
    match tag {
        None => false,
        Some(tag) => {
            let first = tag.split(',').next().unwrap_or("").trim();
            !first.is_empty() && first != "?"
        }
    }
}

fn annotations_tokens(opts: &FieldOpts) -> TokenStream2 {
    let size = opt_str_tokens(&opts.size);
    let dyn_size = opt_str_tokens(&opts.dyn_size);
    let max = opt_str_tokens(&opts.max);
    let dyn_max = opt_str_tokens(&opts.dyn_max);
    let kind = opt_str_tokens(&opts.kind);
    let index = match opts.index {
        Some(i) => quote! { ::core::option::Option::Some(#i) },
        None => quote! { ::core::option::Option::None },
    };
    quote! {
        ::dynssz::schema::FieldAnnotations {
            ssz_size: #size,
            dynssz_size: #dyn_size,
            ssz_max: #max,
            dynssz_max: #dyn_max,
            ssz_type: #kind,
            ssz_index: #index,
        }
    }
}

fn opt_str_tokens(value: &Option<String>) -> TokenStream2 {
    match value {
        Some(s) => quote! { ::core::option::Option::Some(#s) },
        None => quote! { ::core::option::Option::None },
    }
}

/// Builds the `SchemaNode` construction tokens for one field, given its declared (or inferred)
/// shape.
fn field_schema_tokens(opts: &FieldOpts) -> TokenStream2 {
    let ty = &opts.ty;
    if let Some(kind) = opts.kind.as_deref() {
        match kind {
            "vector" => {
                let elem = elem_type_tokens(opts);
                return quote! { ::dynssz::schema::SchemaNode::Vector(::std::boxed::Box::new(<#elem as ::dynssz::SszReflect>::schema())) };
            }
            "list" => {
                let elem = elem_type_tokens(opts);
                return quote! { ::dynssz::schema::SchemaNode::List(::std::boxed::Box::new(<#elem as ::dynssz::SszReflect>::schema())) };
            }
            "bitvector" => return quote! { ::dynssz::schema::SchemaNode::Bitvector },
            "bitlist" => return quote! { ::dynssz::schema::SchemaNode::Bitlist },
            "progressive-list" => {
                let elem = elem_type_tokens(opts);
                return quote! { ::dynssz::schema::SchemaNode::ProgressiveList(::std::boxed::Box::new(<#elem as ::dynssz::SszReflect>::schema())) };
            }
            "progressive-bitlist" => {
                return quote! { ::dynssz::schema::SchemaNode::ProgressiveBitlist }
            }
            _ => {}
        }
    }

    match classify(ty) {
        FieldShape::Array(elem) => {
            quote! { ::dynssz::schema::SchemaNode::Vector(::std::boxed::Box::new(<#elem as ::dynssz::SszReflect>::schema())) }
        }
        FieldShape::Vec(elem) => {
            if outer_dim_is_static(opts) {
                quote! { ::dynssz::schema::SchemaNode::Vector(::std::boxed::Box::new(<#elem as ::dynssz::SszReflect>::schema())) }
            } else {
                quote! { ::dynssz::schema::SchemaNode::List(::std::boxed::Box::new(<#elem as ::dynssz::SszReflect>::schema())) }
            }
        }
        FieldShape::Bits => {
            if outer_dim_is_static(opts) {
                quote! { ::dynssz::schema::SchemaNode::Bitvector }
            } else {
                quote! { ::dynssz::schema::SchemaNode::Bitlist }
            }
        }
        FieldShape::Opaque => quote! { <#ty as ::dynssz::SszReflect>::schema() },
    }
}

fn elem_type_tokens(opts: &FieldOpts) -> TokenStream2 {
    match classify(&opts.ty) {
        FieldShape::Array(elem) => quote! { #elem },
        FieldShape::Vec(elem) => quote! { #elem },
        _ => {
            let ty = &opts.ty;
            quote! { #ty }
        }
    }
}

/// Converts one field's value into `(name, DynValue)`. `BitsValue` fields need special
/// handling because the engine requires `DynValue::Bitvector`/`DynValue::Bitlist` to match the
/// schema's own choice exactly (unlike sequences, which tolerate either `Vector` or `List`).
fn field_to_dyn_tokens(field_access: &TokenStream2, opts: &FieldOpts) -> TokenStream2 {
    let bits_kind = match opts.kind.as_deref() {
        Some("bitvector") => Some(true),
        Some("bitlist") => Some(false),
        _ => None,
    };
    match classify(&opts.ty) {
        FieldShape::Bits => {
            let is_vector = bits_kind.unwrap_or_else(|| outer_dim_is_static(opts));
            if is_vector {
                quote! { ::dynssz::DynValue::Bitvector(::std::clone::Clone::clone(&#field_access)) }
            } else {
                quote! { ::dynssz::DynValue::Bitlist(::std::clone::Clone::clone(&#field_access)) }
            }
        }
        _ => quote! { ::dynssz::SszReflect::to_dyn(&#field_access) },
    }
}

/// Reconstructs one field's value from the `DynValue` the engine handed back for it.
fn field_from_dyn_tokens(value_expr: &TokenStream2, opts: &FieldOpts) -> TokenStream2 {
    let ty = &opts.ty;
    match classify(ty) {
        FieldShape::Bits => quote! {
            match #value_expr {
                ::dynssz::DynValue::Bitvector(b) | ::dynssz::DynValue::Bitlist(b) => b,
                other => return ::std::result::Result::Err(::dynssz::SszError::UnsupportedType(
                    ::std::format!("expected a bit sequence, got {}", other.kind_name())
                )),
            }
        },
        _ => quote! { <#ty as ::dynssz::SszReflect>::from_dyn(#value_expr)? },
    }
}

fn container_kind_tokens(opts: &ContainerOpts) -> Result<TokenStream2, syn::Error> {
    match opts.container.as_deref() {
        None => Ok(quote! { ::dynssz::schema::ContainerKind::Regular }),
        Some("progressive-container") => Ok(quote! { ::dynssz::schema::ContainerKind::Progressive }),
        Some("stable-container") => {
            let capacity = opts.capacity.ok_or_else(|| {
                syn::Error::new(
                    proc_macro2::Span::call_site(),
                    "`container = \"stable-container\"` requires a `capacity = N`",
                )
            })?;
            Ok(quote! { ::dynssz::schema::ContainerKind::Stable { capacity: #capacity } })
        }
        Some(other) => Err(syn::Error::new(
            proc_macro2::Span::call_site(),
            format!("unknown `container` value `{other}`"),
        )),
    }
}

fn derive_struct(
    opts: &ContainerOpts,
    fields: &Fields<FieldOpts>,
) -> Result<TokenStream2, syn::Error> {
    let name = &opts.ident;

    if opts.wrapper {
        let field = fields.fields.first().ok_or_else(|| {
            syn::Error::new(
                proc_macro2::Span::call_site(),
                "`#[dynssz(wrapper)]` requires exactly one field",
            )
        })?;
        let ty = &field.ty;
        let access = match &field.ident {
            Some(name) => quote! { self.#name },
            None => quote! { self.0 },
        };
        let ctor = match &field.ident {
            Some(name) => quote! { Self { #name: inner } },
            None => quote! { Self(inner) },
        };
        return Ok(quote! {
            impl ::dynssz::SszReflect for #name {
                fn schema() -> ::dynssz::schema::SchemaNode {
                    ::dynssz::schema::SchemaNode::Wrapper(::std::boxed::Box::new(
                        <#ty as ::dynssz::SszReflect>::schema(),
                    ))
                }

                fn to_dyn(&self) -> ::dynssz::DynValue {
                    ::dynssz::DynValue::Wrapper(::std::boxed::Box::new(
                        ::dynssz::SszReflect::to_dyn(&#access),
                    ))
                }

                fn from_dyn(value: ::dynssz::DynValue) -> ::std::result::Result<Self, ::dynssz::SszError> {
                    match value {
                        ::dynssz::DynValue::Wrapper(inner_value) => {
                            let inner = <#ty as ::dynssz::SszReflect>::from_dyn(*inner_value)?;
                            ::std::result::Result::Ok(#ctor)
                        }
                        other => ::std::result::Result::Err(::dynssz::SszError::UnsupportedType(
                            ::std::format!("expected a wrapper, got {}", other.kind_name())
                        )),
                    }
                }
            }
        });
    }

    let kind_tokens = container_kind_tokens(opts)?;
    let is_progressive = matches!(opts.container.as_deref(), Some("progressive-container"));
    if is_progressive {
        for f in &fields.fields {
            if f.index.is_none() {
                let field_name = f
                    .ident
                    .as_ref()
                    .map(|i| i.to_string())
                    .unwrap_or_else(|| "<unnamed>".into());
                return Err(syn::Error::new(
                    proc_macro2::Span::call_site(),
                    format!(
                        "progressive-container field `{field_name}` is missing `#[dynssz(index = ...)]`"
                    ),
                ));
            }
        }
    }

    let mut field_schema_entries = Vec::with_capacity(fields.fields.len());
    let mut to_dyn_entries = Vec::with_capacity(fields.fields.len());
    let mut from_dyn_bindings = Vec::with_capacity(fields.fields.len());
    let mut ctor_fields = Vec::with_capacity(fields.fields.len());

    for f in &fields.fields {
        let field_ident = f.ident.as_ref().ok_or_else(|| {
            syn::Error::new(
                proc_macro2::Span::call_site(),
                format!("{name}: container fields must be named (tuple structs can only use `#[dynssz(wrapper)]`)"),
            )
        })?;
        let field_name_str = field_ident.to_string();
        let schema_tokens = field_schema_tokens(f);
        let annotations = annotations_tokens(f);
        field_schema_entries.push(quote! {
            ::dynssz::schema::FieldSchema {
                name: #field_name_str,
                schema: #schema_tokens,
                annotations: #annotations,
            }
        });

        let access = quote! { self.#field_ident };
        let value_tokens = field_to_dyn_tokens(&access, f);
        to_dyn_entries.push(quote! { (#field_name_str, #value_tokens) });

        let slot_ident = format_ident!("__dynssz_field_{}", field_ident);
        let missing_msg = format!("{name}: missing field `{field_name_str}`");
        from_dyn_bindings.push(quote! {
            let (_, #slot_ident) = __dynssz_fields.next().ok_or_else(|| {
                ::dynssz::SszError::UnsupportedType(::std::string::String::from(#missing_msg))
            })?;
        });
        let value_expr = quote! { #slot_ident };
        let reconstructed = field_from_dyn_tokens(&value_expr, f);
        from_dyn_bindings.push(quote! { let #field_ident = #reconstructed; });

        ctor_fields.push(quote! { #field_ident });
    }

    let type_name_str = name.to_string();

    Ok(quote! {
        impl ::dynssz::SszReflect for #name {
            fn schema() -> ::dynssz::schema::SchemaNode {
                ::dynssz::schema::SchemaNode::Container(::std::boxed::Box::new(
                    ::dynssz::schema::ContainerSchema {
                        name: #type_name_str,
                        kind: #kind_tokens,
                        fields: ::std::vec![ #(#field_schema_entries),* ],
                    }
                ))
            }

            fn to_dyn(&self) -> ::dynssz::DynValue {
                ::dynssz::DynValue::Container(::std::vec![ #(#to_dyn_entries),* ])
            }

            fn from_dyn(value: ::dynssz::DynValue) -> ::std::result::Result<Self, ::dynssz::SszError> {
                let fields = match value {
                    ::dynssz::DynValue::Container(fields) => fields,
                    other => return ::std::result::Result::Err(::dynssz::SszError::UnsupportedType(
                        ::std::format!("expected a container, got {}", other.kind_name())
                    )),
                };
                let mut __dynssz_fields = fields.into_iter();
                #(#from_dyn_bindings)*
                ::std::result::Result::Ok(Self { #(#ctor_fields),* })
            }
        }
    })
}

/// `true` if the variant's own schema is a progressive container — the one case where the
/// distilled union-selector rule numbers variants from 0 instead of 1.
fn is_progressive_container_tokens(ty: &Type) -> TokenStream2 {
    quote! {
        ::core::matches!(
            <#ty as ::dynssz::SszReflect>::schema(),
            ::dynssz::schema::SchemaNode::Container(c)
                if ::core::matches!(c.kind, ::dynssz::schema::ContainerKind::Progressive)
        )
    }
}

fn derive_enum(opts: &ContainerOpts, variants: &[VariantOpts]) -> Result<TokenStream2, syn::Error> {
    let name = &opts.ident;
    let mut variant_types = Vec::with_capacity(variants.len());
    for v in variants {
        if v.fields.fields.len() != 1 {
            return Err(syn::Error::new(
                proc_macro2::Span::call_site(),
                format!(
                    "union variant `{}` must hold exactly one field, found {}",
                    v.ident,
                    v.fields.fields.len()
                ),
            ));
        }
        let field = &v.fields.fields[0];
        variant_types.push((v.ident.clone(), field.ty.clone()));
    }

    let base_checks: Vec<TokenStream2> = variant_types
        .iter()
        .map(|(_, ty)| is_progressive_container_tokens(ty))
        .collect();

    let schema_entries: Vec<TokenStream2> = variant_types
        .iter()
        .enumerate()
        .map(|(i, (_, ty))| {
            let i = i as u8;
            quote! { (__dynssz_base + #i, <#ty as ::dynssz::SszReflect>::schema()) }
        })
        .collect();

    let to_dyn_arms: Vec<TokenStream2> = variant_types
        .iter()
        .enumerate()
        .map(|(i, (ident, _))| {
            let i = i as u8;
            quote! {
                #name::#ident(inner) => ::dynssz::DynValue::Union {
                    selector: __dynssz_base + #i,
                    value: ::std::boxed::Box::new(::dynssz::SszReflect::to_dyn(inner)),
                }
            }
        })
        .collect();

    let from_dyn_arms: Vec<TokenStream2> = variant_types
        .iter()
        .enumerate()
        .map(|(i, (ident, ty))| {
            let i = i as u8;
            quote! {
                #i => {
                    let inner = <#ty as ::dynssz::SszReflect>::from_dyn(*value)?;
                    ::std::result::Result::Ok(#name::#ident(inner))
                }
            }
        })
        .collect();

    Ok(quote! {
        impl #name {
            /// Selector 0-based when any variant is itself a progressive container, 1-based
            /// otherwise (selector 0 is then reserved for "no value").
            fn __dynssz_selector_base() -> u8 {
                let any_progressive = false #(|| #base_checks)*;
                if any_progressive { 0 } else { 1 }
            }
        }

        impl ::dynssz::SszReflect for #name {
            fn schema() -> ::dynssz::schema::SchemaNode {
                let __dynssz_base = Self::__dynssz_selector_base();
                ::dynssz::schema::SchemaNode::Union(::std::vec![ #(#schema_entries),* ])
            }

            fn to_dyn(&self) -> ::dynssz::DynValue {
                let __dynssz_base = Self::__dynssz_selector_base();
                match self {
                    #(#to_dyn_arms),*
                }
            }

            fn from_dyn(value: ::dynssz::DynValue) -> ::std::result::Result<Self, ::dynssz::SszError> {
                let __dynssz_base = Self::__dynssz_selector_base();
                match value {
                    ::dynssz::DynValue::Union { selector, value } => match selector.wrapping_sub(__dynssz_base) {
                        #(#from_dyn_arms,)*
                        _ => ::std::result::Result::Err(::dynssz::SszError::InvalidUnionVariant(selector)),
                    },
                    other => ::std::result::Result::Err(::dynssz::SszError::UnsupportedType(
                        ::std::format!("expected a union, got {}", other.kind_name())
                    )),
                }
            }
        }
    })
}

fn expand(input: DeriveInput) -> Result<TokenStream2, syn::Error> {
    let opts = ContainerOpts::from_derive_input(&input)?;
    match &opts.data {
        Data::Struct(fields) => derive_struct(&opts, fields),
        Data::Enum(variants) => derive_enum(&opts, variants),
    }
}

/// Derives `dynssz::SszReflect` for a struct (container, stable container, progressive
/// container, or single-field wrapper) or an enum (compatible union).
#[proc_macro_derive(SszReflect, attributes(dynssz))]
pub fn derive_ssz_reflect(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}
