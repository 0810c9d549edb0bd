//! Address detection: pattern registry and match resolution

mod patterns;
mod resolver;

pub use patterns::{AddressPattern, LengthBounds, NetworkTag, PatternRegistry};
pub use resolver::{AddressMatch, resolve};
