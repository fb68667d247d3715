/// Error types that can be built from a bare message.
pub trait FromMessage: Sized {
    fn from_message(message: String) -> Self;
}

/// Define a module-local `Context` trait that prefixes any displayable error
/// with a message and converts it into `$error`.
///
/// ```ignore
/// // crates/config/src/error.rs
/// taskrelay_common::impl_context!(Error);
/// ```
#[macro_export]
macro_rules! impl_context {
    ($error:ty) => {
        pub trait Context<T> {
            fn context(self, context: &str) -> std::result::Result<T, $error>;

            fn with_context<F>(self, f: F) -> std::result::Result<T, $error>
            where
                F: FnOnce() -> String;
        }

        impl<T, E: std::fmt::Display> Context<T> for std::result::Result<T, E> {
            fn context(self, context: &str) -> std::result::Result<T, $error> {
                self.with_context(|| context.to_string())
            }

            fn with_context<F>(self, f: F) -> std::result::Result<T, $error>
            where
                F: FnOnce() -> String,
            {
                self.map_err(|source| {
                    <$error as $crate::FromMessage>::from_message(format!("{}: {source}", f()))
                })
            }
        }
    };
}
