//! Derive macros for `armature-di` parameter and result objects.
//!
//! `#[derive(ParamObject)]` turns a struct's fields into a constructor's
//! declared dependencies; `#[derive(ResultObject)]` turns them into
//! separate registrations. Field behavior is controlled with `#[di(...)]`
//! attributes: `key = "..."`, `group = "..."`, `optional`, `skip`, and
//! (result objects only) `disposable`.

use darling::{ast, FromDeriveInput, FromField};
use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::DeriveInput;

#[derive(FromField)]
#[darling(attributes(di))]
struct DiField {
    ident: Option<syn::Ident>,
    ty: syn::Type,
    #[darling(default)]
    key: Option<String>,
    #[darling(default)]
    group: Option<String>,
    #[darling(default)]
    optional: bool,
    #[darling(default)]
    skip: bool,
    #[darling(default)]
    disposable: bool,
}

#[derive(FromDeriveInput)]
#[darling(attributes(di), supports(struct_named))]
struct ObjectInput {
    ident: syn::Ident,
    generics: syn::Generics,
    data: ast::Data<(), DiField>,
}

/// Unwraps one level of a generic wrapper like `Arc<T>`, `Vec<T>`, or
/// `Option<T>`.
fn inner_of<'a>(ty: &'a syn::Type, wrapper: &str) -> Option<&'a syn::Type> {
    let syn::Type::Path(path) = ty else {
        return None;
    };
    let segment = path.path.segments.last()?;
    if segment.ident != wrapper {
        return None;
    }
    let syn::PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    match args.args.first()? {
        syn::GenericArgument::Type(inner) => Some(inner),
        _ => None,
    }
}

fn parse_object(input: TokenStream) -> Result<(ObjectInput, Vec<DiField>), TokenStream2> {
    let input = syn::parse::<DeriveInput>(input).map_err(|e| e.to_compile_error())?;
    let object = ObjectInput::from_derive_input(&input).map_err(|e| e.write_errors())?;
    let fields = match &object.data {
        ast::Data::Struct(fields) => fields.fields.iter().collect::<Vec<_>>(),
        ast::Data::Enum(_) => unreachable!("supports(struct_named)"),
    };
    // Reborrow into owned metadata so the object can be moved out.
    let fields = fields
        .into_iter()
        .map(|f| DiField {
            ident: f.ident.clone(),
            ty: f.ty.clone(),
            key: f.key.clone(),
            group: f.group.clone(),
            optional: f.optional,
            skip: f.skip,
            disposable: f.disposable,
        })
        .collect();
    Ok((object, fields))
}

fn error_at(ty: &syn::Type, message: &str) -> TokenStream {
    syn::Error::new_spanned(ty, message).to_compile_error().into()
}

/// Derives `armature_di::ParamObject`: each non-skipped field becomes a
/// declared dependency, resolved in field order.
///
/// Field shapes: `Arc<T>` (required), `Option<Arc<T>>` (optional),
/// `Vec<Arc<T>>` with `#[di(group = "...")]` (group). `#[di(key = "...")]`
/// resolves by key; `#[di(skip)]` fills the field from `Default`.
#[proc_macro_derive(ParamObject, attributes(di))]
pub fn derive_param_object(input: TokenStream) -> TokenStream {
    let (object, fields) = match parse_object(input) {
        Ok(parsed) => parsed,
        Err(err) => return err.into(),
    };

    let mut deps = Vec::new();
    let mut inits = Vec::new();

    for field in &fields {
        let name = field.ident.as_ref().expect("named struct field");
        let ty = &field.ty;

        if field.skip {
            inits.push(quote! { #name: ::core::default::Default::default() });
            continue;
        }

        if let Some(group) = &field.group {
            let Some(elem) = inner_of(ty, "Vec").and_then(|v| inner_of(v, "Arc")) else {
                return error_at(ty, "a #[di(group)] field must have type Vec<Arc<T>>");
            };
            deps.push(quote! { ::armature_di::Dependency::grouped::<#elem>(#group) });
            inits.push(quote! {
                #name: ::armature_di::Resolver::get_group::<#elem>(cx, #group)?
            });
            continue;
        }

        let optional = field.optional || inner_of(ty, "Option").is_some();
        if optional {
            let Some(elem) = inner_of(ty, "Option").and_then(|o| inner_of(o, "Arc")) else {
                return error_at(ty, "an optional field must have type Option<Arc<T>>");
            };
            match &field.key {
                Some(key) => {
                    deps.push(quote! {
                        {
                            let mut dep = ::armature_di::Dependency::keyed::<#elem>(#key);
                            dep.optional = true;
                            dep
                        }
                    });
                    inits.push(quote! {
                        #name: ::armature_di::Resolver::get_keyed_optional::<#elem>(cx, #key)?
                    });
                }
                None => {
                    deps.push(quote! { ::armature_di::Dependency::optional::<#elem>() });
                    inits.push(quote! {
                        #name: ::armature_di::Resolver::get_optional::<#elem>(cx)?
                    });
                }
            }
            continue;
        }

        let Some(elem) = inner_of(ty, "Arc") else {
            return error_at(ty, "a dependency field must have type Arc<T>");
        };
        match &field.key {
            Some(key) => {
                deps.push(quote! { ::armature_di::Dependency::keyed::<#elem>(#key) });
                inits.push(quote! {
                    #name: ::armature_di::Resolver::get_keyed::<#elem>(cx, #key)?
                });
            }
            None => {
                deps.push(quote! { ::armature_di::Dependency::required::<#elem>() });
                inits.push(quote! {
                    #name: ::armature_di::Resolver::get::<#elem>(cx)?
                });
            }
        }
    }

    let ident = &object.ident;
    let (impl_generics, ty_generics, where_clause) = object.generics.split_for_impl();

    quote! {
        impl #impl_generics ::armature_di::ParamObject for #ident #ty_generics #where_clause {
            fn dependencies() -> ::std::vec::Vec<::armature_di::Dependency> {
                ::std::vec![#(#deps),*]
            }

            fn build(cx: &::armature_di::ResolverContext<'_>) -> ::armature_di::DiResult<Self> {
                Ok(Self { #(#inits),* })
            }
        }
    }
    .into()
}

/// Derives `armature_di::ResultObject`: each non-skipped field becomes
/// one registration when the constructor runs.
///
/// `#[di(key = "...")]` registers the field under a key,
/// `#[di(group = "...")]` contributes it to a group, `#[di(disposable)]`
/// tracks it for disposal (the field type must implement `Dispose`),
/// and `#[di(skip)]` drops the field.
#[proc_macro_derive(ResultObject, attributes(di))]
pub fn derive_result_object(input: TokenStream) -> TokenStream {
    let (object, fields) = match parse_object(input) {
        Ok(parsed) => parsed,
        Err(err) => return err.into(),
    };

    let mut returns = Vec::new();
    let mut pushes = Vec::new();

    for field in &fields {
        if field.skip {
            continue;
        }
        let name = field.ident.as_ref().expect("named struct field");
        let ty = &field.ty;

        if field.key.is_some() && field.group.is_some() {
            return error_at(ty, "a field cannot carry both #[di(key)] and #[di(group)]");
        }

        let spec = match (&field.key, &field.group) {
            (Some(key), None) => quote! { ::armature_di::ReturnSpec::keyed::<#ty>(#key) },
            (None, Some(group)) => quote! { ::armature_di::ReturnSpec::grouped::<#ty>(#group) },
            _ => quote! { ::armature_di::ReturnSpec::of::<#ty>() },
        };
        returns.push(spec);

        let key_tokens = match &field.key {
            Some(key) => quote! { ::core::option::Option::Some(#key) },
            None => quote! { ::core::option::Option::None },
        };
        let group_tokens = match &field.group {
            Some(group) => quote! { ::core::option::Option::Some(#group) },
            None => quote! { ::core::option::Option::None },
        };
        let disposer_tokens = if field.disposable {
            quote! { ::core::option::Option::Some(::armature_di::disposer_for::<#ty>()) }
        } else {
            quote! { ::core::option::Option::None }
        };

        pushes.push(quote! {
            products.push(::armature_di::Product::parts::<#ty>(
                #key_tokens,
                #group_tokens,
                self.#name,
                #disposer_tokens,
            ));
        });
    }

    let ident = &object.ident;
    let (impl_generics, ty_generics, where_clause) = object.generics.split_for_impl();

    quote! {
        impl #impl_generics ::armature_di::ResultObject for #ident #ty_generics #where_clause {
            fn returns() -> ::std::vec::Vec<::armature_di::ReturnSpec> {
                ::std::vec![#(#returns),*]
            }

            fn into_products(self) -> ::armature_di::Products {
                let mut products = ::armature_di::Products::new();
                #(#pushes)*
                products
            }
        }
    }
    .into()
}
