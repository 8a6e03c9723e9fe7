//! Expansion of `#[derive(Params)]`.

use crate::parse::{ContainerAttrs, FieldAttrs};
use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::{Data, DeriveInput, Fields, GenericArgument, PathArguments, Type};

/// How a field is registered with the schema builder.
enum Kind {
    Field,
    Optional,
    List,
    File,
    Embed,
}

pub fn expand_params(input: DeriveInput) -> syn::Result<TokenStream> {
    let ident = &input.ident;

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "Params cannot be derived for generic structs",
        ));
    }

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => &named.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    ident,
                    "Params can only be derived for structs with named fields",
                ))
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                ident,
                "Params can only be derived for structs",
            ))
        }
    };

    let container = ContainerAttrs::from_attrs(&input.attrs)?;
    let krate = container
        .krate
        .map_or_else(|| quote!(::keystone_bind), |path| quote!(#path));

    let mut accessors = Vec::new();
    let mut registrations = Vec::new();

    for field in fields {
        let Some(attrs) = FieldAttrs::from_field(field)? else {
            continue;
        };
        let Some(field_ident) = &field.ident else {
            continue;
        };

        if attrs.skip {
            registrations.push(quote!(schema.skip();));
            continue;
        }

        let ty = &field.ty;
        let kind = classify(&attrs, ty);
        let accessor = format_ident!("__keystone_access_{}", field_ident);
        accessors.push(quote! {
            fn #accessor(target: &mut #ident) -> &mut #ty {
                &mut target.#field_ident
            }
        });

        if matches!(kind, Kind::Embed) {
            registrations.push(quote!(schema.embed(#accessor);));
            continue;
        }

        let field_name = field_ident.to_string();
        let annotation = annotation(&krate, &attrs, field_name.trim_start_matches("r#"));
        let method = match kind {
            Kind::Field => quote!(field),
            Kind::Optional => quote!(optional),
            Kind::List => quote!(list),
            Kind::File | Kind::Embed => quote!(file),
        };
        registrations.push(quote!(schema.#method(#annotation, #accessor);));
    }

    let self_validate = if container.validate {
        quote! {
            fn as_self_validate(&self) -> ::core::option::Option<&dyn #krate::SelfValidate> {
                ::core::option::Option::Some(self)
            }
        }
    } else {
        quote!()
    };

    Ok(quote! {
        #[automatically_derived]
        impl #krate::Params for #ident {
            fn describe(schema: &mut #krate::SchemaBuilder<Self>) {
                #(#accessors)*
                #(#registrations)*
            }

            #self_validate
        }
    })
}

fn classify(attrs: &FieldAttrs, ty: &Type) -> Kind {
    if attrs.flatten {
        Kind::Embed
    } else if attrs.from.as_deref().map(str::trim) == Some("file") {
        Kind::File
    } else if generic_wrapper(ty, "Option") {
        Kind::Optional
    } else if generic_wrapper(ty, "Vec") {
        Kind::List
    } else {
        Kind::Field
    }
}

/// Returns `true` for `Wrapper<T>` (with any path prefix).
fn generic_wrapper(ty: &Type, wrapper: &str) -> bool {
    let Type::Path(path) = ty else {
        return false;
    };
    if path.qself.is_some() {
        return false;
    }
    path.path.segments.last().is_some_and(|segment| {
        segment.ident == wrapper
            && matches!(
                &segment.arguments,
                PathArguments::AngleBracketed(args)
                    if args.args.len() == 1
                        && matches!(args.args.first(), Some(GenericArgument::Type(_)))
            )
    })
}

fn annotation(krate: &TokenStream, attrs: &FieldAttrs, field_name: &str) -> TokenStream {
    let from = attrs.from.clone().unwrap_or_default();
    let name = attrs.name.clone().unwrap_or_else(|| field_name.to_string());

    let mut tokens = quote!(#krate::FieldAnnotation::new(#from, #name));
    let optional = [
        ("rules", &attrs.rules),
        ("default_value", &attrs.default),
        ("max_len", &attrs.max_len),
        ("min", &attrs.min),
        ("max", &attrs.max),
        ("min_items", &attrs.min_items),
        ("max_items", &attrs.max_items),
        ("one_of", &attrs.one_of),
    ];
    for (setter, value) in optional {
        if let Some(value) = value {
            let setter = format_ident!("{}", setter);
            tokens = quote!(#tokens.#setter(#value));
        }
    }
    tokens
}
