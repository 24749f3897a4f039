//! FITS data-access layer with lazy buffers, unity-indexed coordinates,
//! and bit-plane quality masks.
//!
//! The central type is [`Image`]: a 2-D `f64` buffer populated from its
//! FITS file on first access, addressed in the FITS convention (1-indexed
//! `(X, Y)` with inclusive slice stops), and optionally paired with a
//! [`Bitmask`] packing up to 32 [`Pixelmap`] quality planes. [`Cube`]
//! stacks equally-shaped images and broadcasts arithmetic, normalization,
//! and reductions across them.

pub mod bitmask;
pub mod checksum;
mod codec;
pub mod coord;
pub mod cube;
pub mod datatype;
pub mod error;
pub mod header;
pub mod image;
mod lazy;
pub mod pixelmap;

pub use bitmask::Bitmask;
pub use coord::{Index, Key};
pub use cube::{make_cube, Cube, CubeOperand, PixmapArg};
pub use datatype::DataType;
pub use error::{Error, Result};
pub use header::{Card, Header, Value, BLOCK_SIZE, CARDS_PER_BLOCK, CARD_SIZE};
pub use image::{make_image, BinaryOp, Image, Operand, SaveOptions, UnaryOp};
pub use pixelmap::{make_pixelmap, LogicOp, Pixelmap};
