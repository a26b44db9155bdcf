//! Utility macros shared across the crate

/// Implement Debug for a type containing a PgPool field
///
/// PgPool doesn't implement Debug, so it is shown as the string "PgPool".
/// Fields not listed are omitted from the output.
///
/// # Examples
///
/// ```
/// use tasker_orm::debug_with_pgpool;
/// use sqlx::PgPool;
///
/// pub struct Reporter {
///     pool: PgPool,
///     name: String,
/// }
///
/// debug_with_pgpool!(Reporter { pool: PgPool, name });
/// ```
#[macro_export]
macro_rules! debug_with_pgpool {
    ($struct_name:ident { $pool_field:ident: PgPool $(, $field:ident)* $(,)? }) => {
        impl std::fmt::Debug for $struct_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($struct_name))
                    .field(stringify!($pool_field), &"PgPool")
                    $(
                        .field(stringify!($field), &self.$field)
                    )*
                    .finish()
            }
        }
    };
}
