mod skeleton;

pub use skeleton::*;
