#[macro_export]
macro_rules! dummy {
    ($t:expr) => {
        ()
    };
}

/// Defines an enum over a fixed hardware index range (buffers, filters,
/// masks), with `ALL`, `index()` and a checked `TryFrom<u8>` conversion.
#[macro_export]
macro_rules! index_def {
    (
        $(#[doc = $doc:expr])*
        $name:ident => {
            $(
                $(#[doc = $var_doc:expr])*
                $var:ident = $idx:literal
            ),*
        }
    ) => {
        $(#[doc = $doc])*
        #[repr(u8)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        #[cfg_attr(feature = "defmt", derive(defmt::Format))]
        #[cfg_attr(feature = "ufmt", derive(ufmt::derive::uDebug))]
        pub enum $name {
            $(
                $(#[doc = $var_doc])*
                $var = $idx,
            )*
        }

        impl $name {
            #[doc = concat!("All valid options for [`", stringify!($name), "`].")]
            pub const ALL: [Self; <[_]>::len(&[$($crate::dummy!($var)),*])] = [$(Self::$var),*];

            /// Hardware index of this item.
            #[inline]
            pub const fn index(self) -> usize {
                self as usize
            }
        }

        impl core::convert::TryFrom<u8> for $name {
            type Error = $crate::error::InvalidIndex;

            fn try_from(index: u8) -> core::result::Result<Self, Self::Error> {
                match index {
                    $($idx => Ok(Self::$var),)*
                    _ => Err($crate::error::InvalidIndex(index)),
                }
            }
        }
    };
}
