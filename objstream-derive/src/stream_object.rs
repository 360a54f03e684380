//! Derive macro implementation for `StreamObject`.

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Fields, Lit};

#[derive(Default)]
struct ContainerAttrs {
    name: Option<String>,
    serial_version_uid: Option<i64>,
}

#[derive(Default)]
struct FieldAttrs {
    rename: Option<String>,
    transient: bool,
    skip: bool,
}

pub fn derive_stream_object_impl(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(tokens) => TokenStream::from(tokens),
        Err(err) => TokenStream::from(err.to_compile_error()),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let container = parse_container_attrs(&input.attrs)?;
    let class_name = container.name.unwrap_or_else(|| name.to_string());
    let suid = container
        .serial_version_uid
        .map(|suid| quote! { .serial_version_uid(#suid) });

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    name,
                    "StreamObject only supports structs with named fields",
                ))
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                name,
                "StreamObject can only be derived for structs",
            ))
        }
    };

    let mut field_defs = Vec::new();
    let mut store_stmts = Vec::new();
    let mut load_fields = Vec::new();

    for field in fields {
        let Some(field_ident) = field.ident.as_ref() else {
            continue;
        };
        let field_ty = &field.ty;
        let attrs = parse_field_attrs(&field.attrs)?;

        if attrs.skip {
            load_fields.push(quote! { #field_ident: ::core::default::Default::default() });
            continue;
        }

        let wire_name = attrs.rename.unwrap_or_else(|| field_ident.to_string());

        if attrs.transient {
            field_defs.push(quote! {
                .field(<#field_ty as objstream_core::FieldValue>::field_def(#wire_name).transient())
            });
            load_fields.push(quote! { #field_ident: ::core::default::Default::default() });
            continue;
        }

        field_defs.push(quote! {
            .field(<#field_ty as objstream_core::FieldValue>::field_def(#wire_name))
        });
        store_stmts.push(quote! {
            let value = objstream_core::FieldValue::to_value(&self.#field_ident, heap);
            heap.set_field_of(id, #class_name, #wire_name, value)?;
        });
        load_fields.push(quote! {
            #field_ident: <#field_ty as objstream_core::FieldValue>::from_value(
                heap,
                heap.field_of(id, #class_name, #wire_name)?,
            )?
        });
    }

    Ok(quote! {
        impl #impl_generics objstream_core::DescribeType for #name #ty_generics #where_clause {
            fn type_def() -> objstream_core::TypeDef {
                objstream_core::TypeDef::builder(#class_name)
                    .serializable()
                    #suid
                    #(#field_defs)*
                    .build()
            }
        }

        impl #impl_generics objstream_core::StreamObject for #name #ty_generics #where_clause {
            fn to_heap(
                &self,
                heap: &mut objstream_core::Heap,
            ) -> objstream_core::Result<objstream_core::ObjectId> {
                let id = heap.new_instance(#class_name)?;
                #(#store_stmts)*
                Ok(id)
            }

            fn from_heap(
                heap: &objstream_core::Heap,
                id: objstream_core::ObjectId,
            ) -> objstream_core::Result<Self> {
                match heap.type_name(id) {
                    Some(#class_name) => {}
                    other => {
                        return Err(objstream_core::StreamError::IllegalState(format!(
                            "expected instance of {}, found {}",
                            #class_name,
                            other.unwrap_or("nothing"),
                        )))
                    }
                }
                Ok(Self {
                    #(#load_fields,)*
                })
            }
        }
    })
}

fn parse_container_attrs(attrs: &[syn::Attribute]) -> syn::Result<ContainerAttrs> {
    let mut parsed = ContainerAttrs::default();
    for attr in attrs {
        if !attr.path().is_ident("objstream") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                let lit: Lit = meta.value()?.parse()?;
                match lit {
                    Lit::Str(s) => parsed.name = Some(s.value()),
                    other => return Err(syn::Error::new_spanned(other, "expected a string")),
                }
            } else if meta.path.is_ident("serial_version_uid") {
                let value = meta.value()?;
                let negative = value.parse::<syn::Token![-]>().is_ok();
                let lit: Lit = value.parse()?;
                match lit {
                    Lit::Int(int_lit) => {
                        let suid: i64 = int_lit.base10_parse()?;
                        parsed.serial_version_uid = Some(if negative { -suid } else { suid });
                    }
                    other => return Err(syn::Error::new_spanned(other, "expected an integer")),
                }
            } else {
                return Err(meta.error("unknown objstream container attribute"));
            }
            Ok(())
        })?;
    }
    Ok(parsed)
}

fn parse_field_attrs(attrs: &[syn::Attribute]) -> syn::Result<FieldAttrs> {
    let mut parsed = FieldAttrs::default();
    for attr in attrs {
        if !attr.path().is_ident("objstream") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") {
                let lit: Lit = meta.value()?.parse()?;
                match lit {
                    Lit::Str(s) => parsed.rename = Some(s.value()),
                    other => return Err(syn::Error::new_spanned(other, "expected a string")),
                }
            } else if meta.path.is_ident("transient") {
                parsed.transient = true;
            } else if meta.path.is_ident("skip") {
                parsed.skip = true;
            } else {
                return Err(meta.error("unknown objstream field attribute"));
            }
            Ok(())
        })?;
    }
    Ok(parsed)
}
