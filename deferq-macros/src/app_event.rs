use proc_macro2::TokenStream;
use quote::quote;
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::{DeriveInput, Expr, Lit, Result, Token};

/// `#[derive(AppEvent)]` 展开
pub(crate) fn expand(input: DeriveInput) -> Result<TokenStream> {
    let cfg = AppEventAttrConfig::from_attrs(&input.attrs)?;
    let ident = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let event_type = match cfg.type_id {
        Some(lit) => quote! { #lit },
        None => quote! { ::core::concat!(::core::module_path!(), "::", ::core::stringify!(#ident)) },
    };

    Ok(quote! {
        impl #impl_generics ::deferq_core::event::AppEvent for #ident #ty_generics #where_clause {
            const EVENT_TYPE: &'static str = #event_type;
        }
    })
}

#[derive(Default)]
struct AppEventAttrConfig {
    type_id: Option<syn::LitStr>,
}

impl AppEventAttrConfig {
    fn from_attrs(attrs: &[syn::Attribute]) -> Result<Self> {
        let mut cfg = Self::default();

        for attr in attrs.iter().filter(|a| a.path().is_ident("app_event")) {
            let pairs = attr
                .parse_args_with(Punctuated::<syn::ExprAssign, Token![,]>::parse_terminated)?;

            for assign in pairs {
                let key_ident = match *assign.left {
                    Expr::Path(p) if p.path.segments.len() == 1 => p.path.segments[0].ident.clone(),
                    other => return Err(syn::Error::new(other.span(), "invalid attribute key")),
                };

                match key_ident.to_string().as_str() {
                    "type_id" => {
                        if cfg.type_id.is_some() {
                            return Err(syn::Error::new(
                                key_ident.span(),
                                "duplicate key 'type_id' in attribute",
                            ));
                        }
                        let lit = match *assign.right {
                            Expr::Lit(syn::ExprLit {
                                lit: Lit::Str(s), ..
                            }) => s,
                            other => {
                                return Err(syn::Error::new(
                                    other.span(),
                                    "type_id must be a string literal",
                                ));
                            }
                        };
                        if lit.value().trim().is_empty() {
                            return Err(syn::Error::new(lit.span(), "type_id must not be empty"));
                        }
                        cfg.type_id = Some(lit);
                    }
                    other => {
                        return Err(syn::Error::new(
                            key_ident.span(),
                            format!("unknown key '{other}', expected 'type_id'"),
                        ));
                    }
                }
            }
        }

        Ok(cfg)
    }
}
