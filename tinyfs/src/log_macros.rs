//! Logging shims over the optional `log` dependency.
//!
//! Without the `log` feature the arguments are still type-checked, then
//! discarded.

#[cfg(feature = "log")]
macro_rules! trace {
    ($($arg:tt)+) => { ::log::trace!($($arg)+) };
}

#[cfg(not(feature = "log"))]
macro_rules! trace {
    ($($arg:tt)+) => {{ let _ = ::core::format_args!($($arg)+); }};
}

#[cfg(feature = "log")]
macro_rules! debug {
    ($($arg:tt)+) => { ::log::debug!($($arg)+) };
}

#[cfg(not(feature = "log"))]
macro_rules! debug {
    ($($arg:tt)+) => {{ let _ = ::core::format_args!($($arg)+); }};
}

#[cfg(feature = "log")]
macro_rules! warn {
    ($($arg:tt)+) => { ::log::warn!($($arg)+) };
}

#[cfg(not(feature = "log"))]
macro_rules! warn {
    ($($arg:tt)+) => {{ let _ = ::core::format_args!($($arg)+); }};
}

#[cfg(feature = "log")]
macro_rules! error {
    ($($arg:tt)+) => { ::log::error!($($arg)+) };
}

#[cfg(not(feature = "log"))]
macro_rules! error {
    ($($arg:tt)+) => {{ let _ = ::core::format_args!($($arg)+); }};
}
