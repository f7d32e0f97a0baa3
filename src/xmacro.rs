/// Declares a value enum together with a field-less key enum and an
/// `index()` accessor mapping every value to its key.
#[macro_export]
macro_rules! indexed_values {
    (
        $(#[$meta:meta])*
        pub enum $name:ident => $index:ident {
            $( $(#[$vmeta:meta])* $variant:ident($ty:ty), )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq)]
        pub enum $name {
            $( $(#[$vmeta])* $variant($ty), )*
        }

        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $index {
            $( $variant, )*
        }

        impl $name {
            pub fn index(&self) -> $index {
                match self {
                    $( $name::$variant(_) => $index::$variant, )*
                }
            }
        }
    };
}

/// Extracts the payload of an expected variant from a provider reply,
/// turning any other variant into `GraphError::Undefined`.
#[macro_export]
macro_rules! unpack {
    ($value:expr, $path:path) => {
        match $value {
            $path(inner) => Ok(inner),
            other => Err($crate::error::GraphError::Undefined(format!(
                "unexpected reply {:?}",
                other.index()
            ))),
        }
    };
}
