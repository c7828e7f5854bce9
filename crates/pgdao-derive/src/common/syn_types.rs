//! Field type inspection.

/// The type argument of a single-parameter wrapper named `wrapper`
/// (`Option<T>`, `std::option::Option<T>`), matched on the last path segment.
fn wrapped_in<'a>(ty: &'a syn::Type, wrapper: &str) -> Option<&'a syn::Type> {
    let syn::Type::Path(path) = ty else {
        return None;
    };
    let last = path.path.segments.last().filter(|s| s.ident == wrapper)?;
    match &last.arguments {
        syn::PathArguments::AngleBracketed(generic) if generic.args.len() == 1 => {
            match generic.args.first() {
                Some(syn::GenericArgument::Type(inner)) => Some(inner),
                _ => None,
            }
        }
        _ => None,
    }
}

/// A field stores NULL when its Rust type is an `Option`.
pub fn is_nullable(ty: &syn::Type) -> bool {
    wrapped_in(ty, "Option").is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    #[test]
    fn option_fields_are_nullable() {
        assert!(is_nullable(&parse_quote!(Option<String>)));
        assert!(is_nullable(&parse_quote!(core::option::Option<i64>)));
        assert!(!is_nullable(&parse_quote!(String)));
        assert!(!is_nullable(&parse_quote!(Vec<Option<i32>>)));
        assert!(!is_nullable(&parse_quote!(Option)));
    }
}
