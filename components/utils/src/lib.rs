#![cfg_attr(not(test), no_std)]

extern crate delog;
delog::generate_macros!();

#[cfg(any(feature = "ram", test))]
mod ram;

#[cfg(any(feature = "ram", test))]
pub use ram::{RamFlash, RamFlashError};
