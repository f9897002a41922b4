//! Training record formats.
//!
//! Examples are stored as `tf.train.Example` messages inside TFRecord files. The
//! [`RecordDecoder`] turns one message into fixed-shape arrays; the TFRecord reader
//! and writer handle the length-delimited, checksummed container around them.

mod decoder;
pub mod proto;
mod tfrecord;

pub use decoder::{DecodedExample, RecordDecoder, RecordLayout, StoredExample};
pub use tfrecord::{TFRECORD_EXTENSION, TfRecordReader, TfRecordWriter, read_tfrecord_file};

/// Feature names of a stored example. Renaming any of these breaks compatibility
/// with existing record files.
pub mod fields {
    pub const HEIGHT: &str = "height";
    pub const WIDTH: &str = "width";
    pub const DEPTH: &str = "depth";
    pub const NAME: &str = "img_name";
    pub const IMAGE: &str = "rgb";
    pub const WEIGHTS_UNARY: &str = "class_weights";
    pub const WEIGHTS_SURR: &str = "surr_weights";
    pub const WEIGHTS_AB: &str = "ab_weights";
    pub const LABELS_UNARY: &str = "labels_unary";
    pub const LABELS_ORIG: &str = "labels_orig";
    pub const LABELS_SURR: &str = "labels_binary_surrounding";
    pub const LABELS_AB: &str = "labels_binary_above_below";
}
