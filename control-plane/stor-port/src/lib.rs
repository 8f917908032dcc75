#![allow(clippy::crate_in_macro_def)]

/// Resource kinds and error helpers shared by the control-plane components.
pub mod transport_api;
/// Common types for the various resources used by the control-plane internal components.
pub mod types;

/// Re-export pstor types and modules.
pub use pstor;

/// Helper to convert from Vec<F> into Vec<T>.
pub trait IntoVec<T>: Sized {
    /// Performs the conversion.
    fn into_vec(self) -> Vec<T>;
}

impl<F: Into<T>, T> IntoVec<T> for Vec<F> {
    fn into_vec(self) -> Vec<T> {
        self.into_iter().map(Into::into).collect()
    }
}

/// Helper to convert from Option<F> into Option<T>.
pub trait IntoOption<T>: Sized {
    /// Performs the conversion.
    fn into_opt(self) -> Option<T>;
}

impl<F: Into<T>, T> IntoOption<T> for Option<F> {
    fn into_opt(self) -> Option<T> {
        self.map(Into::into)
    }
}
