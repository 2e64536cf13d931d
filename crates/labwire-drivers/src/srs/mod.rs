//! Stanford Research Systems instruments.

pub mod sr830;

pub use sr830::{
    LocalMode, ReferenceSource, SnapParameter, Sr830, Sr830Factory, Sr830Properties, Sr830State,
};
