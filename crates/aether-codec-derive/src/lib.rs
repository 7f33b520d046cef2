use proc_macro::TokenStream;
use proc_macro_crate::{FoundCrate, crate_name};
use quote::quote;
use syn::{Data, DeriveInput, Fields, Index, parse_macro_input};

fn runtime_crate_path() -> proc_macro2::TokenStream {
    match crate_name("aether-codec") {
        // integration tests of aether-codec itself also land here, where
        // the absolute path is the one that resolves
        Ok(FoundCrate::Itself) => quote!(::aether_codec),
        Ok(FoundCrate::Name(name)) => {
            let ident = syn::Ident::new(&name, proc_macro2::Span::call_site());
            quote!(::#ident)
        }
        Err(_) => quote!(::aether_codec),
    }
}

/// Derives the field-ordered wire encoding for a struct.
///
/// Fields pack and unpack in declaration order; that order is the wire
/// layout, so reordering fields is a protocol change.
#[proc_macro_derive(Packable)]
pub fn derive_packable(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(&input).unwrap_or_else(|err| err.to_compile_error()).into()
}

fn expand(input: &DeriveInput) -> Result<proc_macro2::TokenStream, syn::Error> {
    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new_spanned(
            &input.ident,
            "Packable can only be derived for structs",
        ));
    };

    let codec = runtime_crate_path();
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let (pack_body, unpack_body) = match &data.fields {
        Fields::Named(fields) => {
            let idents: Vec<_> = fields.named.iter().map(|f| f.ident.as_ref()).collect();
            let types: Vec<_> = fields.named.iter().map(|f| &f.ty).collect();
            let pack = quote! {
                #( #codec::Packable::pack(&self.#idents, packer); )*
            };
            let unpack = quote! {
                Ok(Self {
                    #( #idents: <#types as #codec::Packable>::unpack(unpacker)?, )*
                })
            };
            (pack, unpack)
        }
        Fields::Unnamed(fields) => {
            let indices: Vec<Index> = (0..fields.unnamed.len()).map(Index::from).collect();
            let types: Vec<_> = fields.unnamed.iter().map(|f| &f.ty).collect();
            let pack = quote! {
                #( #codec::Packable::pack(&self.#indices, packer); )*
            };
            let unpack = quote! {
                Ok(Self(
                    #( <#types as #codec::Packable>::unpack(unpacker)?, )*
                ))
            };
            (pack, unpack)
        }
        Fields::Unit => (quote! {}, quote! { Ok(Self) }),
    };

    Ok(quote! {
        impl #impl_generics #codec::Packable for #name #ty_generics #where_clause {
            fn pack(&self, packer: &mut #codec::Packer) {
                #pack_body
            }

            fn unpack(
                unpacker: &mut #codec::Unpacker<'_>,
            ) -> ::core::result::Result<Self, #codec::CodecError> {
                #unpack_body
            }
        }
    })
}
