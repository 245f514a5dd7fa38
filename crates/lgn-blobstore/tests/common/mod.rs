mod asserts;
mod gateways;

pub(crate) use asserts::*;
pub(crate) use gateways::*;
