// SPDX-License-Identifier: MIT

/// Calculate the "map length" of a struct to be used for definite-length CBOR
/// and JSON map encoding. The first argument is the struct, followed by the
/// fixed part of the length (number of mandatory fields and extension
/// entries), followed by a list of optional fields that need to be evaluated.
///
/// For example, for [Signer](crate::corim::Signer) that has one mandatory
/// field and one optional `uri` field, this would be:
///
/// ```ignore
///  let len = map_len!(self, 1, uri);
/// ```
macro_rules! map_len {
    ($s:expr, $mandatory_count:expr, $($opt_field:ident),* $(,)?) => {
        $mandatory_count $(+ ($s.$opt_field.is_some() as usize))*
    };
}

pub(crate) use map_len;

/// Declares a type-choice kind: a marker type implementing
/// [`ChoiceKind`](crate::choice::ChoiceKind) with its own process-wide
/// registry, seeded with the built-in variants returned by `$builtins`.
///
/// ```ignore
/// choice_kind!(
///     /// Marker for group identifiers.
///     GroupKind,
///     "group",
///     Registry::new()
///         .with::<Uuid>(Some(UUID_TAG), uuid_factory)
///         .with::<TaggedBytes>(Some(BYTES_TAG), bytes_factory)
/// );
/// pub type Group = TypeChoice<GroupKind>;
/// ```
macro_rules! choice_kind {
    ($(#[$meta:meta])* $kind:ident, $name:literal, $builtins:expr $(,)?) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $kind;

        impl $crate::choice::ChoiceKind for $kind {
            const NAME: &'static str = $name;

            fn registry() -> &'static ::std::sync::RwLock<$crate::choice::Registry> {
                static REGISTRY: ::std::sync::LazyLock<
                    ::std::sync::RwLock<$crate::choice::Registry>,
                > = ::std::sync::LazyLock::new(|| ::std::sync::RwLock::new($builtins));
                &REGISTRY
            }
        }
    };
}

pub(crate) use choice_kind;
