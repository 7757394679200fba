//! Procedural macros for chainstep configuration types

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    Attribute, Data, DeriveInput, Error, Expr, ExprLit, Field, GenericArgument, Lit, Meta,
    PathArguments, Result, Type, parse_macro_input, spanned::Spanned,
};

/// Derive `Default` for a configuration section from per-field
/// `#[default(...)]` attributes.
///
/// Accepted attribute forms:
/// - `#[default(expr)]` or `#[default = expr]`: the field starts as `expr`.
/// - bare `#[default]`: the field starts as `Default::default()`, which is
///   what nested sections want.
///
/// Literal values are adapted to a few field types so config structs read
/// like the TOML they mirror:
/// - `String` and `Vec<T>` take the value through `Into`, so string and
///   array literals work.
/// - `Option<T>` wraps any literal other than `None` in `Some`, so
///   `#[default(1e-3)]` on an `Option<f64>` means `Some(1e-3)`.
///
/// # Example
/// ```
/// use chainstep_macros::ConfigDefaults;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(ConfigDefaults, Serialize, Deserialize, Debug, PartialEq)]
/// #[serde(default)]
/// pub struct ControllerConfig {
///     #[default(0.9)]
///     pub safety: f64,
/// }
///
/// #[derive(ConfigDefaults, Serialize, Deserialize)]
/// #[serde(default)]
/// pub struct IntegratorConfig {
///     #[default(1e-12)]
///     pub rtol: f64,
///
///     #[default([2, 4, 6, 8, 12])]
///     pub sequence: Vec<usize>,
///
///     #[default(None)]
///     pub initial_step: Option<f64>,
///
///     #[default("snapshots.csv")]
///     pub output: Option<String>,
///
///     #[default]
///     pub controller: ControllerConfig,
/// }
///
/// let config = IntegratorConfig::default();
/// assert_eq!(config.rtol, 1e-12);
/// assert_eq!(config.sequence, vec![2, 4, 6, 8, 12]);
/// assert_eq!(config.initial_step, None);
/// assert_eq!(config.output.as_deref(), Some("snapshots.csv"));
/// assert_eq!(config.controller.safety, 0.9);
/// ```
///
/// Deriving on anything other than a struct with named fields is a compile
/// error, as is a field without a `#[default]` attribute.
#[proc_macro_derive(ConfigDefaults, attributes(default))]
pub fn config_defaults(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(&input)
        .unwrap_or_else(Error::into_compile_error)
        .into()
}

fn expand(input: &DeriveInput) -> Result<TokenStream2> {
    let fields = match &input.data {
        Data::Struct(data) => &data.fields,
        Data::Enum(_) | Data::Union(_) => {
            return Err(Error::new_spanned(
                &input.ident,
                "ConfigDefaults can only be derived for structs",
            ));
        }
    };

    let mut inits = Vec::with_capacity(fields.len());
    for field in fields {
        let Some(ident) = &field.ident else {
            return Err(Error::new(
                field.span(),
                "ConfigDefaults needs named fields; tuple structs have no TOML keys",
            ));
        };
        let value = initial_value(field)?;
        inits.push(quote! { #ident: #value });
    }

    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    Ok(quote! {
        #[automatically_derived]
        impl #impl_generics ::std::default::Default for #name #ty_generics #where_clause {
            fn default() -> Self {
                Self { #(#inits),* }
            }
        }
    })
}

/// What a field's `#[default]` attribute asks for
enum DefaultValue {
    /// Bare `#[default]`
    Inherit,
    Expr(Expr),
}

fn default_attribute(field: &Field) -> Result<DefaultValue> {
    let Some(attr) = field.attrs.iter().find(|a| a.path().is_ident("default")) else {
        let name = field.ident.as_ref().map(ToString::to_string).unwrap_or_default();
        return Err(Error::new(
            field.span(),
            format!("field `{name}` needs a #[default(...)] attribute"),
        ));
    };
    parse_attribute(attr)
}

fn parse_attribute(attr: &Attribute) -> Result<DefaultValue> {
    match &attr.meta {
        Meta::Path(_) => Ok(DefaultValue::Inherit),
        Meta::List(list) => {
            if list.tokens.is_empty() {
                return Err(Error::new_spanned(
                    attr,
                    "empty #[default()]; write #[default] to use Default::default()",
                ));
            }
            list.parse_args::<Expr>().map(DefaultValue::Expr)
        }
        Meta::NameValue(pair) => Ok(DefaultValue::Expr(pair.value.clone())),
    }
}

fn initial_value(field: &Field) -> Result<TokenStream2> {
    let expr = match default_attribute(field)? {
        DefaultValue::Inherit => return Ok(quote! { ::std::default::Default::default() }),
        DefaultValue::Expr(expr) => expr,
    };

    let value = match outer_type(&field.ty) {
        Some(("String" | "Vec", _)) => quote! { ::std::convert::Into::into(#expr) },
        Some(("Option", Some(inner))) if is_literal(&expr) => {
            if outer_type(inner).is_some_and(|(name, _)| name == "String") {
                quote! { ::std::option::Option::Some(::std::convert::Into::into(#expr)) }
            } else {
                quote! { ::std::option::Option::Some(#expr) }
            }
        }
        _ => quote! { #expr },
    };
    Ok(value)
}

/// Last path segment of a type and its first generic argument, if any
fn outer_type(ty: &Type) -> Option<(&str, Option<&Type>)> {
    let Type::Path(path) = ty else {
        return None;
    };
    let segment = path.path.segments.last()?;
    let argument = match &segment.arguments {
        PathArguments::AngleBracketed(args) => args.args.iter().find_map(|arg| match arg {
            GenericArgument::Type(inner) => Some(inner),
            _ => None,
        }),
        _ => None,
    };
    let name = match segment.ident.to_string().as_str() {
        "String" => "String",
        "Vec" => "Vec",
        "Option" => "Option",
        _ => return Some(("", argument)),
    };
    Some((name, argument))
}

fn is_literal(expr: &Expr) -> bool {
    match expr {
        Expr::Lit(ExprLit { lit, .. }) => {
            matches!(lit, Lit::Str(_) | Lit::Int(_) | Lit::Float(_) | Lit::Bool(_))
        }
        Expr::Unary(unary) => is_literal(&unary.expr),
        _ => false,
    }
}
