//! Character LCD driven through a shift register.
//!
//! The controller's 8-bit data bus hangs off the parallel outputs of a shift register, while
//! register select, read/write and enable are wired to GPIO lines directly.

pub mod driver;
