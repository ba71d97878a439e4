extern crate proc_macro;

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, Attribute, Data, DeriveInput, Fields, LitStr};

/// Derives `bitcoin::consensus::{Encodable, Decodable}` for a named-field
/// struct, encoding fields in declaration order. Declaration order therefore
/// IS the wire order. Expects `bitcoin::io` to be imported as `io` at the
/// derive site.
#[proc_macro_derive(ConsensusEncoding)]
pub fn consensus_encoding_derive(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => named
                .named
                .iter()
                .map(|f| f.ident.clone().expect("named field"))
                .collect::<Vec<_>>(),
            _ => panic!("ConsensusEncoding requires named fields"),
        },
        _ => panic!("ConsensusEncoding can only be derived for structs"),
    };

    let expanded = quote! {
        impl bitcoin::consensus::Encodable for #name {
            fn consensus_encode<W: io::Write + ?Sized>(
                &self,
                writer: &mut W,
            ) -> std::result::Result<usize, io::Error> {
                let mut len = 0;
                #(len += bitcoin::consensus::Encodable::consensus_encode(&self.#fields, writer)?;)*
                Ok(len)
            }
        }

        impl bitcoin::consensus::Decodable for #name {
            fn consensus_decode<R: io::Read + ?Sized>(
                reader: &mut R,
            ) -> std::result::Result<Self, bitcoin::consensus::encode::Error> {
                Ok(Self {
                    #(#fields: bitcoin::consensus::Decodable::consensus_decode(reader)?,)*
                })
            }
        }
    };

    TokenStream::from(expanded)
}

fn parse_repository_attr(attr: &Attribute) -> syn::Result<(String, String)> {
    let mut key_type = None;
    let mut value_type = None;

    attr.parse_nested_meta(|meta| {
        if meta.path.is_ident("K") {
            let val = meta.value()?;
            let s: LitStr = val.parse()?;
            key_type = Some(s);
        }
        if meta.path.is_ident("V") {
            let val = meta.value()?;
            let s: LitStr = val.parse()?;
            value_type = Some(s);
        }
        Ok(())
    })?;

    Ok((
        key_type.expect("Missing attribute 'K'").value(),
        value_type.expect("Missing attribute 'V'").value(),
    ))
}

/// Derives `RepositoryOps<K, V>` for a repository struct holding its typed
/// column in a `col` field. `RepositoryOps`, `Result` and `SortOrder` must be
/// in scope at the derive site.
#[proc_macro_derive(Repository, attributes(repository))]
pub fn repository_derive(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;

    let mut key_type_str = String::new();
    let mut value_type_str = String::new();

    for attr in &input.attrs {
        if attr.path().is_ident("repository") {
            let (key, value) =
                parse_repository_attr(attr).expect("Error parsing 'repository' attribute");
            key_type_str = key;
            value_type_str = value;
        }
    }

    let key_type_ident = syn::Ident::new(&key_type_str, proc_macro2::Span::call_site());
    let value_type_ident = syn::Ident::new(&value_type_str, proc_macro2::Span::call_site());

    let expanded = quote! {
        impl RepositoryOps<#key_type_ident, #value_type_ident> for #name {
            type ListItem = std::result::Result<(#key_type_ident, #value_type_ident), harbour_db::DBError>;

            fn get(&self, id: &#key_type_ident) -> Result<Option<#value_type_ident>> {
                Ok(self.col.get(id)?)
            }

            fn put(&self, id: &#key_type_ident, item: &#value_type_ident) -> Result<()> {
                Ok(self.col.put(id, item)?)
            }

            fn delete(&self, id: &#key_type_ident) -> Result<()> {
                Ok(self.col.delete(id)?)
            }

            fn list<'a>(
                &'a self,
                from: Option<#key_type_ident>,
                order: SortOrder,
            ) -> Result<Box<dyn Iterator<Item = Self::ListItem> + 'a>> {
                let it = self.col.iter(from, order)?;
                Ok(Box::new(it))
            }
        }
    };

    TokenStream::from(expanded)
}
