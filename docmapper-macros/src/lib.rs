//! Procedural macros for the docmapper project.
//!
//! Provides `#[derive(Schema)]`, which declares the fields of a record type from a plain
//! struct so that the struct can be handed to `DocumentModel::keys_from`.

use proc_macro::TokenStream;
use quote::quote;
use syn::{
    Data, DeriveInput, Fields, GenericArgument, LitStr, PathArguments, Type, parse_macro_input,
    spanned::Spanned,
};

/// Derives `docmapper::plugins::keys::HasSchema` for a struct with named fields.
///
/// Field types map onto schema field types by their last path segment; `Option<T>` maps to
/// the type of `T`. Unrecognised types are declared as `any`.
///
/// Field attributes:
///
/// - `#[key(rename = "name")]` declares the field under another name
/// - `#[key(skip)]` leaves the field out of the schema
/// - `#[key(kind = "document")]` overrides the inferred field type
///
/// ```ignore
/// #[derive(Schema)]
/// struct Person {
///     #[key(rename = "_id")]
///     id: Option<ObjectId>,
///     name: String,
///     age: Option<i32>,
///     #[key(skip)]
///     cached: bool,
/// }
/// ```
#[proc_macro_derive(Schema, attributes(key))]
pub fn derive_schema(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    expand_schema(input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

struct KeyAttrs {
    rename: Option<String>,
    skip: bool,
    kind: Option<String>,
}

fn key_attrs(field: &syn::Field) -> syn::Result<KeyAttrs> {
    let mut attrs = KeyAttrs { rename: None, skip: false, kind: None };

    for attr in field.attrs.iter().filter(|attr| attr.path().is_ident("key")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("skip") {
                attrs.skip = true;
                Ok(())
            } else if meta.path.is_ident("rename") {
                attrs.rename = Some(meta.value()?.parse::<LitStr>()?.value());
                Ok(())
            } else if meta.path.is_ident("kind") {
                attrs.kind = Some(meta.value()?.parse::<LitStr>()?.value());
                Ok(())
            } else {
                Err(meta.error("expected `rename`, `skip` or `kind`"))
            }
        })?;
    }

    Ok(attrs)
}

fn variant_for_kind(kind: &str, span: proc_macro2::Span) -> syn::Result<proc_macro2::TokenStream> {
    Ok(match kind {
        "any" => quote!(Any),
        "string" => quote!(String),
        "int" => quote!(Int),
        "float" => quote!(Float),
        "boolean" => quote!(Boolean),
        "datetime" => quote!(DateTime),
        "object_id" => quote!(ObjectId),
        "array" => quote!(Array),
        "document" => quote!(Document),
        "binary" => quote!(Binary),
        other => return Err(syn::Error::new(span, format!("unknown field kind `{other}`"))),
    })
}

fn variant_for_type(ty: &Type) -> proc_macro2::TokenStream {
    let Type::Path(path) = ty else {
        return quote!(Any);
    };
    let Some(segment) = path.path.segments.last() else {
        return quote!(Any);
    };

    match segment.ident.to_string().as_str() {
        "Option" | "Box" => match &segment.arguments {
            PathArguments::AngleBracketed(args) => match args.args.first() {
                Some(GenericArgument::Type(inner)) => variant_for_type(inner),
                _ => quote!(Any),
            },
            _ => quote!(Any),
        },
        "String" | "str" | "char" => quote!(String),
        "i8" | "i16" | "i32" | "i64" | "u8" | "u16" | "u32" | "u64" | "isize" | "usize" => quote!(Int),
        "f32" | "f64" | "Decimal128" => quote!(Float),
        "bool" => quote!(Boolean),
        "DateTime" | "Timestamp" => quote!(DateTime),
        "ObjectId" => quote!(ObjectId),
        "Vec" | "VecDeque" | "HashSet" | "BTreeSet" | "Array" => quote!(Array),
        "Document" | "HashMap" | "BTreeMap" => quote!(Document),
        "Binary" => quote!(Binary),
        _ => quote!(Any),
    }
}

fn expand_schema(input: DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => return Err(syn::Error::new(input.span(), "Schema can only be derived for structs with named fields")),
        },
        _ => return Err(syn::Error::new(input.span(), "Schema can only be derived for structs")),
    };

    let mut keys = Vec::new();

    for field in fields {
        let attrs = key_attrs(field)?;

        if attrs.skip {
            continue;
        }

        let name = match (attrs.rename, &field.ident) {
            (Some(rename), _) => rename,
            (None, Some(ident)) => ident.to_string(),
            (None, None) => continue,
        };
        let variant = match attrs.kind {
            Some(kind) => variant_for_kind(&kind, field.span())?,
            None => variant_for_type(&field.ty),
        };

        keys.push(quote! {
            .key(#name, ::docmapper::plugins::keys::FieldType::#variant)
        });
    }

    let ident = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::docmapper::plugins::keys::HasSchema for #ident #ty_generics #where_clause {
            fn schema() -> ::docmapper::plugins::keys::Schema {
                ::docmapper::plugins::keys::Schema::new()
                    #(#keys)*
            }
        }
    })
}
