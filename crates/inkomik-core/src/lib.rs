//! Core of the inkomik comic/manga reader.
//!
//! Two subsystems do the heavy lifting:
//!
//! - the unified file/archive navigator ([`explorer::BookExplorer`],
//!   [`book::Book`]): one ordered sequence of pages across folder and
//!   archive boundaries, with bidirectional lazy navigation, neighbour
//!   prefetch and bookmarking;
//! - the image pipeline ([`img::Image`], the [`decoder`] registry, the
//!   [`scale`]/[`rotate`]/[`mirror`] transforms and [`scaler::CacheScaler`]):
//!   decoding untrusted page files into pixel buffers and fitting them onto
//!   a fixed-size display, splitting oversized pages into slices.
//!
//! Everything runs synchronously on the caller's thread; hosts hide decode
//! latency by calling [`book::Book::preload`] after drawing.

pub mod archive;
pub mod book;
pub mod bytes;
pub mod color;
pub mod decoder;
pub mod explorer;
pub mod filesystem;
pub mod img;
pub mod memory_filesystem;
pub mod mirror;
pub mod path;
pub mod rotate;
pub mod scale;
pub mod scaler;

pub use archive::{ArchiveError, ArchiveReader, ArchiveRegistry, ZipArchive};
pub use book::{Book, BookCache, Bookmark};
pub use bytes::ByteArray;
pub use decoder::{
    BmpDecoder, DecodeError, DecodeMode, DecodeOptions, DecoderRegistry, ImageDecoder,
    JpegDecoder, PngDecoder, TruncationPolicy,
};
pub use explorer::{BookExplorer, NumberOrder, PathOrder, SortOrder, WordNumberOrder};
pub use filesystem::{EntryKinds, FileManager, FsError, OsFileManager};
pub use img::{Image, Rect};
pub use memory_filesystem::MemoryFileManager;
pub use mirror::{mirror_in_place, mirror_into, MirrorType};
pub use path::{FilePath, PathToFile};
pub use rotate::{rotate, rotate_into, RotateAngle};
pub use scale::{scale, scale_into, ScaleQuality};
pub use scaler::{CacheScaler, Orientation, Represent, ScreenSize, SliceCache};
