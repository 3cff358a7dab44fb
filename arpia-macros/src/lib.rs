//! Derive macro backing `arpia`'s typed records.
//!
//! `#[derive(ApiType)]` reads the `#[bind(...)]`, `#[validate(...)]`,
//! `#[api(...)]` and `#[serde(...)]` attributes off a named struct and
//! emits the field specs the runtime compiles into a binding plan. All
//! semantic interpretation (bind grammar, rule parsing) happens at
//! runtime; the derive only captures what is written in the source.

use heck::{
    ToKebabCase, ToLowerCamelCase, ToPascalCase, ToShoutyKebabCase, ToShoutySnakeCase,
    ToSnakeCase,
};
use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    Data, DeriveInput, Expr, ExprLit, Field, Fields, GenericArgument, Lit, LitStr, Meta,
    PathArguments, Type, parse_macro_input,
};

#[proc_macro_derive(ApiType, attributes(bind, validate, api))]
pub fn derive_api_type(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn expand(input: DeriveInput) -> syn::Result<TokenStream2> {
    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => &named.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    &input.ident,
                    "ApiType requires named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                &input.ident,
                "ApiType can only be derived for structs",
            ));
        }
    };

    let rename_all = struct_rename_all(&input);
    let specs = fields
        .iter()
        .map(|field| field_spec(field, rename_all.as_deref()))
        .collect::<syn::Result<Vec<_>>>()?;

    let name = &input.ident;
    let base_name = name.to_string();

    let mut generics = input.generics.clone();
    let type_params: Vec<_> = generics.type_params().map(|p| p.ident.clone()).collect();
    for param in generics.type_params_mut() {
        param.bounds.push(syn::parse_quote!(arpia::plan::ApiType));
    }
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let generic_fns = if type_params.is_empty() {
        TokenStream2::new()
    } else {
        let pushes = type_params.iter().map(|param| {
            quote! {
                name.push('_');
                name.push_str(&<#param as arpia::plan::ApiType>::schema_name());
            }
        });
        quote! {
            fn schema_name() -> String {
                let mut name = Self::base_name().to_string();
                #(#pushes)*
                name
            }

            fn is_generic() -> bool {
                true
            }
        }
    };

    Ok(quote! {
        impl #impl_generics arpia::plan::ApiType for #name #ty_generics #where_clause {
            fn base_name() -> &'static str {
                #base_name
            }

            #generic_fns

            fn field_specs() -> Vec<arpia::plan::FieldSpec> {
                vec![#(#specs),*]
            }
        }
    })
}

struct SerdeField {
    rename: Option<String>,
    skip: bool,
    flatten: bool,
}

/// Extracts the struct-level `#[serde(rename_all = "...")]` case, if any.
/// Unrelated serde options are tolerated rather than parsed.
fn struct_rename_all(input: &DeriveInput) -> Option<String> {
    let mut rename_all = None;
    for attr in &input.attrs {
        if !attr.path().is_ident("serde") {
            continue;
        }
        let _ = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename_all") {
                let lit: LitStr = meta.value()?.parse()?;
                rename_all = Some(lit.value());
            } else if meta.input.peek(syn::Token![=]) {
                let _: Expr = meta.value()?.parse()?;
            }
            Ok(())
        });
    }
    rename_all
}

fn field_serde(field: &Field) -> SerdeField {
    let mut out = SerdeField {
        rename: None,
        skip: false,
        flatten: false,
    };
    for attr in &field.attrs {
        if !attr.path().is_ident("serde") {
            continue;
        }
        let _ = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") {
                let lit: LitStr = meta.value()?.parse()?;
                out.rename = Some(lit.value());
            } else if meta.path.is_ident("skip")
                || meta.path.is_ident("skip_serializing")
                || meta.path.is_ident("skip_deserializing")
            {
                out.skip = true;
            } else if meta.path.is_ident("flatten") {
                out.flatten = true;
            } else if meta.input.peek(syn::Token![=]) {
                let _: Expr = meta.value()?.parse()?;
            }
            Ok(())
        });
    }
    out
}

fn apply_rename_all(name: &str, case: &str) -> String {
    match case {
        "lowercase" => name.to_lowercase(),
        "UPPERCASE" => name.to_uppercase(),
        "PascalCase" => name.to_pascal_case(),
        "camelCase" => name.to_lower_camel_case(),
        "snake_case" => name.to_snake_case(),
        "SCREAMING_SNAKE_CASE" => name.to_shouty_snake_case(),
        "kebab-case" => name.to_kebab_case(),
        "SCREAMING-KEBAB-CASE" => name.to_shouty_kebab_case(),
        _ => name.to_string(),
    }
}

/// A `#[bind("...")]`-style attribute carrying a single string literal.
fn literal_attr(field: &Field, name: &str) -> syn::Result<Option<String>> {
    for attr in &field.attrs {
        if attr.path().is_ident(name) {
            let lit: LitStr = attr.parse_args()?;
            return Ok(Some(lit.value()));
        }
    }
    Ok(None)
}

struct ApiAttr {
    description: Option<String>,
    example: Option<String>,
}

fn api_attr(field: &Field) -> syn::Result<ApiAttr> {
    let mut out = ApiAttr {
        description: None,
        example: None,
    };
    for attr in &field.attrs {
        if !attr.path().is_ident("api") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("description") {
                let lit: LitStr = meta.value()?.parse()?;
                out.description = Some(lit.value());
            } else if meta.path.is_ident("example") {
                let lit: LitStr = meta.value()?.parse()?;
                out.example = Some(lit.value());
            } else {
                return Err(meta.error("expected `description` or `example`"));
            }
            Ok(())
        })?;
    }
    Ok(out)
}

/// Joined doc-comment text, used as the description fallback.
fn doc_comment(field: &Field) -> Option<String> {
    let lines: Vec<String> = field
        .attrs
        .iter()
        .filter_map(|attr| {
            if !attr.path().is_ident("doc") {
                return None;
            }
            match &attr.meta {
                Meta::NameValue(nv) => match &nv.value {
                    Expr::Lit(ExprLit {
                        lit: Lit::Str(lit), ..
                    }) => Some(lit.value().trim().to_string()),
                    _ => None,
                },
                _ => None,
            }
        })
        .filter(|line| !line.is_empty())
        .collect();
    if lines.is_empty() {
        None
    } else {
        Some(lines.join(" "))
    }
}

fn field_spec(field: &Field, rename_all: Option<&str>) -> syn::Result<TokenStream2> {
    let ident = field
        .ident
        .as_ref()
        .ok_or_else(|| syn::Error::new_spanned(field, "expected a named field"))?;
    let name = ident.to_string();

    let serde = field_serde(field);
    let renamed = serde.rename.is_some() || rename_all.is_some();
    let serde_name = match &serde.rename {
        Some(rename) => rename.clone(),
        None => match rename_all {
            Some(case) => apply_rename_all(&name, case),
            None => name.clone(),
        },
    };

    let bind = option_str(literal_attr(field, "bind")?);
    let rules = option_str(literal_attr(field, "validate")?);
    let api = api_attr(field)?;
    let description = option_str(api.description.or_else(|| doc_comment(field)));
    let example = option_str(api.example);

    let (ty, optional) = unwrap_option(&field.ty);
    let kind = kind_tokens(ty);
    let skip = serde.skip;
    let flatten = serde.flatten;

    Ok(quote! {
        arpia::plan::FieldSpec {
            name: #name,
            serde_name: #serde_name,
            bind: #bind,
            rules: #rules,
            description: #description,
            example: #example,
            kind: #kind,
            optional: #optional,
            renamed: #renamed,
            skip: #skip,
            flatten: #flatten,
        }
    })
}

fn option_str(value: Option<String>) -> TokenStream2 {
    match value {
        Some(v) => quote!(Some(#v)),
        None => quote!(None),
    }
}

/// Peels one level of `Option<T>`.
fn unwrap_option(ty: &Type) -> (&Type, bool) {
    match generic_inner(ty, "Option") {
        Some(inner) => (inner, true),
        None => (ty, false),
    }
}

fn generic_inner<'a>(ty: &'a Type, wrapper: &str) -> Option<&'a Type> {
    let Type::Path(path) = ty else { return None };
    let segment = path.path.segments.last()?;
    if segment.ident != wrapper {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    args.args.iter().find_map(|arg| match arg {
        GenericArgument::Type(inner) => Some(inner),
        _ => None,
    })
}

/// Maps a field type to its `FieldKind` expression. Unrecognized path
/// types are treated as nested records, which requires them to implement
/// `ApiType` themselves.
fn kind_tokens(ty: &Type) -> TokenStream2 {
    if let Some(inner) = generic_inner(ty, "Vec") {
        let inner = kind_tokens(inner);
        return quote!(arpia::plan::FieldKind::List(Box::new(#inner)));
    }
    let record = quote!(arpia::plan::FieldKind::Record(arpia::plan::PlanRef::of::<#ty>()));
    let Type::Path(path) = ty else { return record };
    let Some(segment) = path.path.segments.last() else {
        return record;
    };
    match segment.ident.to_string().as_str() {
        "String" => quote!(arpia::plan::FieldKind::String),
        "i8" | "i16" | "i32" | "i64" | "i128" | "isize" | "u8" | "u16" | "u32" | "u64"
        | "usize" => quote!(arpia::plan::FieldKind::Integer),
        "f32" | "f64" => quote!(arpia::plan::FieldKind::Float),
        "bool" => quote!(arpia::plan::FieldKind::Boolean),
        "DateTime" | "NaiveDateTime" | "NaiveDate" => quote!(arpia::plan::FieldKind::DateTime),
        "Uuid" => quote!(arpia::plan::FieldKind::Uuid),
        "Value" => quote!(arpia::plan::FieldKind::Any),
        _ => record,
    }
}
