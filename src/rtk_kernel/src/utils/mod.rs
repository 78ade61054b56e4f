//! Utility
//!
//! **This module is exempt from the API stability guarantee.** It's exposed
//! only because some of its types appear in the public kernel API.
pub(crate) mod ctz;
pub(crate) mod intrusive_list;
mod prio_bitmap;
pub use self::prio_bitmap::*;

/// Trait for types having a constant default value. This is essentially a
/// constant version of `Default`.
///
/// The kernel state is built entirely out of `Init` values so that a
/// [`Kernel`](crate::Kernel) can be constructed in a `static` initializer.
pub trait Init {
    /// The default value.
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self;
}

impl<T> Init for Option<T> {
    const INIT: Self = None;
}

impl Init for bool {
    const INIT: Self = false;
}

macro_rules! impl_init_zero {
    ($($ty:ty),*) => {
        $(
            impl Init for $ty {
                const INIT: Self = 0;
            }
        )*
    };
}

impl_init_zero!(u8, u16, u32, usize);
