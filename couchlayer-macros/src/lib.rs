//! Procedural macros for the couchlayer project.
//!
//! This crate provides `#[derive(Shaped)]`, which describes a type's JSON
//! structure so the client can check caller types against the store protocol
//! before sending a request. The derive understands the serde attributes that
//! change wire keys: `rename`, `rename_all`, `flatten`, `skip` and
//! `skip_deserializing`.

#[allow(unused_extern_crates)]
extern crate self as couchlayer_macros;

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    Attribute, Data, DeriveInput, Fields, LitStr, Token, meta::ParseNestedMeta, parse_macro_input,
    parse_quote,
};

/// Derives `couchlayer::shape::Shaped` for a struct.
///
/// Structs with named fields become records. Newtype structs take the shape of
/// their inner type. Enums, unit structs and tuple structs with more than one
/// field are opaque and described as any JSON value.
#[proc_macro_derive(Shaped, attributes(serde))]
pub fn derive_shaped(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    expand(input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn expand(mut input: DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let container = SerdeAttrs::parse(&input.attrs)?;

    let body = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => {
                let mut fields = Vec::with_capacity(named.named.len());
                for field in &named.named {
                    let attrs = SerdeAttrs::parse(&field.attrs)?;
                    if attrs.skip {
                        continue;
                    }

                    let Some(ident) = field.ident.as_ref() else {
                        continue;
                    };
                    let ident = syn::ext::IdentExt::unraw(ident).to_string();
                    let key = match attrs.rename {
                        Some(rename) => rename,
                        None => container
                            .rename_all
                            .map(|rule| rule.apply(&ident))
                            .unwrap_or_else(|| ident.clone()),
                    };
                    let flatten = attrs.flatten;
                    let ty = &field.ty;

                    fields.push(quote! {
                        ::couchlayer::shape::FieldShape {
                            ident: #ident,
                            key: #key,
                            flatten: #flatten,
                            shape: <#ty as ::couchlayer::shape::Shaped>::shape,
                        }
                    });
                }

                let type_name = name.to_string();
                quote! {
                    ::couchlayer::shape::Shape::Record(::couchlayer::shape::RecordShape {
                        name: #type_name,
                        fields: ::std::vec![#(#fields),*],
                    })
                }
            }
            Fields::Unnamed(unnamed) if unnamed.unnamed.len() == 1 => {
                let ty = &unnamed.unnamed[0].ty;
                quote! { <#ty as ::couchlayer::shape::Shaped>::shape() }
            }
            _ => quote! { ::couchlayer::shape::Shape::Any },
        },
        Data::Enum(_) => quote! { ::couchlayer::shape::Shape::Any },
        Data::Union(_) => {
            return Err(syn::Error::new_spanned(
                &input.ident,
                "Shaped cannot be derived for unions",
            ));
        }
    };

    let type_params: Vec<_> = input
        .generics
        .type_params()
        .map(|param| param.ident.clone())
        .collect();
    let where_clause = input.generics.make_where_clause();
    for param in type_params {
        where_clause
            .predicates
            .push(parse_quote!(#param: ::couchlayer::shape::Shaped));
    }

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let name = &input.ident;

    Ok(quote! {
        #[automatically_derived]
        impl #impl_generics ::couchlayer::shape::Shaped for #name #ty_generics #where_clause {
            fn shape() -> ::couchlayer::shape::Shape {
                #body
            }
        }
    })
}

/// The subset of serde attributes that affect wire keys.
#[derive(Default)]
struct SerdeAttrs {
    rename: Option<String>,
    rename_all: Option<RenameRule>,
    flatten: bool,
    skip: bool,
}

impl SerdeAttrs {
    fn parse(attrs: &[Attribute]) -> syn::Result<Self> {
        let mut parsed = SerdeAttrs::default();

        for attr in attrs.iter().filter(|attr| attr.path().is_ident("serde")) {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("rename") {
                    parsed.rename = Some(deserialize_name(&meta)?);
                } else if meta.path.is_ident("rename_all") {
                    let rule = deserialize_name(&meta)?;
                    parsed.rename_all = Some(RenameRule::from_str(&rule).ok_or_else(|| {
                        meta.error(format!("unknown rename_all rule: {rule}"))
                    })?);
                } else if meta.path.is_ident("flatten") {
                    parsed.flatten = true;
                } else if meta.path.is_ident("skip") || meta.path.is_ident("skip_deserializing") {
                    parsed.skip = true;
                } else {
                    skip_meta(&meta)?;
                }
                Ok(())
            })?;
        }

        Ok(parsed)
    }
}

/// Reads `name = "..."` or `name(deserialize = "...")`, preferring the
/// deserialization name since shapes describe decoding targets.
fn deserialize_name(meta: &ParseNestedMeta) -> syn::Result<String> {
    if meta.input.peek(Token![=]) {
        let lit: LitStr = meta.value()?.parse()?;
        return Ok(lit.value());
    }

    let mut name = None;
    let mut fallback = None;
    meta.parse_nested_meta(|inner| {
        let lit: LitStr = inner.value()?.parse()?;
        if inner.path.is_ident("deserialize") {
            name = Some(lit.value());
        } else {
            fallback = Some(lit.value());
        }
        Ok(())
    })?;

    name.or(fallback)
        .ok_or_else(|| meta.error("expected a name"))
}

/// Consumes an attribute this derive does not interpret.
fn skip_meta(meta: &ParseNestedMeta) -> syn::Result<()> {
    if meta.input.peek(Token![=]) {
        meta.value()?.parse::<syn::Expr>()?;
    } else if meta.input.peek(syn::token::Paren) {
        meta.parse_nested_meta(|inner| skip_meta(&inner))?;
    }
    Ok(())
}

#[derive(Clone, Copy)]
enum RenameRule {
    Lower,
    Upper,
    Pascal,
    Camel,
    Snake,
    ScreamingSnake,
    Kebab,
    ScreamingKebab,
}

impl RenameRule {
    fn from_str(rule: &str) -> Option<Self> {
        Some(match rule {
            "lowercase" => RenameRule::Lower,
            "UPPERCASE" => RenameRule::Upper,
            "PascalCase" => RenameRule::Pascal,
            "camelCase" => RenameRule::Camel,
            "snake_case" => RenameRule::Snake,
            "SCREAMING_SNAKE_CASE" => RenameRule::ScreamingSnake,
            "kebab-case" => RenameRule::Kebab,
            "SCREAMING-KEBAB-CASE" => RenameRule::ScreamingKebab,
            _ => return None,
        })
    }

    /// Applies the rule to a snake_case field name, as serde does.
    fn apply(self, field: &str) -> String {
        match self {
            RenameRule::Lower | RenameRule::Snake => field.to_string(),
            RenameRule::Upper | RenameRule::ScreamingSnake => field.to_ascii_uppercase(),
            RenameRule::Kebab => field.replace('_', "-"),
            RenameRule::ScreamingKebab => field.to_ascii_uppercase().replace('_', "-"),
            RenameRule::Pascal => pascal_case(field),
            RenameRule::Camel => {
                let pascal = pascal_case(field);
                let mut chars = pascal.chars();
                match chars.next() {
                    Some(first) => first.to_ascii_lowercase().to_string() + chars.as_str(),
                    None => pascal,
                }
            }
        }
    }
}

fn pascal_case(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut capitalize = true;
    for ch in field.chars() {
        if ch == '_' {
            capitalize = true;
        } else if capitalize {
            out.push(ch.to_ascii_uppercase());
            capitalize = false;
        } else {
            out.push(ch);
        }
    }
    out
}
