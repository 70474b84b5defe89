use proc_macro2::Span;
use quote::{quote, quote_spanned};
use syn::{DeriveInput, Type, parse_macro_input, spanned::Spanned};

/// Implements `picocompute::DescriptorSet` for a `#[repr(C)]` struct of descriptors
/// and generates one accessor per `binding<N>` field.
///
/// Plain fields get `fn bindingN(&mut self)`, array fields get `fn bindingN(&mut self, index: usize)`.
#[proc_macro_derive(DescriptorSet)]
pub fn derive_descriptor_set(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = input.ident;

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let mut repr_c = false;
    for attr in input.attrs.iter() {
        if attr.path().is_ident("repr") {
            let _ = attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("C") {
                    repr_c = true;
                }

                if meta.input.peek(syn::token::Paren) {
                    let content;
                    syn::parenthesized!(content in meta.input);
                    content.parse::<proc_macro2::TokenStream>()?;
                }

                Ok(())
            });
        }
    }

    if !repr_c {
        return quote_spanned! {
            name.span() =>
            compile_error!("DescriptorSet requires #[repr(C)]");
        }
        .into();
    }

    let fields = match input.data {
        syn::Data::Struct(syn::DataStruct {
            fields: syn::Fields::Named(fields),
            ..
        }) => fields,
        _ => {
            return quote_spanned! {
                Span::call_site() =>
                compile_error!("DescriptorSet can only be derived for structs with named fields");
            }
            .into();
        }
    };

    let mut accessors = Vec::new();
    for field in fields.named.iter() {
        let ident = field.ident.as_ref().unwrap();
        let binding = match ident
            .to_string()
            .strip_prefix("binding")
            .and_then(|n| n.parse::<u32>().ok())
        {
            Some(binding) => binding,
            None => {
                return quote_spanned! {
                    field.span() =>
                    compile_error!("DescriptorSet fields must be named `binding<N>`");
                }
                .into();
            }
        };

        let accessor = match &field.ty {
            Type::Array(array) => {
                let elem = &array.elem;
                quote! {
                    pub fn #ident(&mut self, index: usize) -> ::core::result::Result<&mut #elem, picocompute::RuntimeError> {
                        let count = self.#ident.len();
                        self.#ident
                            .get_mut(index)
                            .ok_or(picocompute::RuntimeError::BindingIndex { binding: #binding, index, count })
                    }
                }
            }
            ty => quote! {
                pub fn #ident(&mut self) -> ::core::result::Result<&mut #ty, picocompute::RuntimeError> {
                    ::core::result::Result::Ok(&mut self.#ident)
                }
            },
        };

        accessors.push(accessor);
    }

    quote! {
        unsafe impl #impl_generics picocompute::DescriptorSet for #name #ty_generics #where_clause {}

        impl #impl_generics #name #ty_generics #where_clause {
            #(#accessors)*
        }
    }
    .into()
}
