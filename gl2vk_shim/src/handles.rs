/// Opaque handles exposed to API clients
///
/// Every handle kind is issued by its own `HandleAllocator`: values start
/// at 1, strictly increase in issuance order and are never reused.

use std::fmt;

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub(crate) u32);

        impl $name {
            /// Raw handle value, as a legacy API client would see it
            pub fn raw(self) -> u32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

define_handle!(
    /// Names one vertex input of one pipeline
    AttributeHandle
);
define_handle!(
    /// Names one push-constant field of one pipeline stage
    UniformHandle
);
define_handle!(
    /// Names one pipeline ("program" in legacy terms)
    PipelineHandle
);
define_handle!(
    /// Names one client buffer object
    BufferHandle
);
